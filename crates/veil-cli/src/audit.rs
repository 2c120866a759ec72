//! # Audit Subcommands
//!
//! Offline checks anyone can run against published ledger data:
//!
//! - `select-committee` recomputes the seed and committee for a batch key
//!   and entropy, so a recorded selection can be reproduced.
//! - `verify-log` re-links an exported event log and reports the first
//!   broken record.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Args;
use serde::Serialize;
use veil_core::{Address, ContentDigest};
use veil_crypto::{HashSeedSource, SeedSource, SelectionSeed};
use veil_ledger::{select_committee, EventLog, EventRecord};

use crate::simulate::simulation_operator_key;

/// Arguments for `select-committee`.
#[derive(Args, Debug, Clone)]
pub struct SelectCommitteeArgs {
    /// Batch key, e.g. `swap:1` or `uei:1`.
    #[arg(long)]
    pub batch_key: String,

    /// Entropy as 64 hex characters (the event-log head at finalization).
    #[arg(long)]
    pub entropy: String,

    /// Operator addresses in registration order.
    #[arg(long = "operator", conflicts_with = "operators")]
    pub operator: Vec<String>,

    /// Use the first N simulation operators instead of explicit addresses.
    #[arg(long)]
    pub operators: Option<u8>,

    /// Committee size.
    #[arg(long, default_value_t = 3)]
    pub size: usize,
}

/// A recomputed selection.
#[derive(Debug, Clone, Serialize)]
pub struct CommitteeReport {
    /// Batch key the seed was derived for.
    pub batch_key: String,
    /// Entropy input.
    pub entropy: ContentDigest,
    /// Derived seed.
    pub seed: SelectionSeed,
    /// Operator pool sampled from.
    pub pool_size: usize,
    /// Drawn members, in draw order.
    pub committee: Vec<Address>,
}

/// Recompute a committee.
pub fn select(args: &SelectCommitteeArgs) -> anyhow::Result<CommitteeReport> {
    let entropy = ContentDigest::from_hex(&args.entropy)
        .map_err(anyhow::Error::msg)
        .context("parsing --entropy")?;
    let pool: Vec<Address> = match args.operators {
        Some(n) => (0..n).map(|i| simulation_operator_key(i).address()).collect(),
        None => args
            .operator
            .iter()
            .map(|s| {
                Address::from_hex(s)
                    .map_err(anyhow::Error::msg)
                    .with_context(|| format!("parsing operator {s}"))
            })
            .collect::<anyhow::Result<_>>()?,
    };
    if pool.is_empty() {
        bail!("no operators given; pass --operator or --operators");
    }
    let seed = HashSeedSource.derive(&args.batch_key, &entropy)?;
    let committee = select_committee(&pool, &seed.seed, args.size);
    Ok(CommitteeReport {
        batch_key: args.batch_key.clone(),
        entropy,
        seed,
        pool_size: pool.len(),
        committee,
    })
}

/// Arguments for `verify-log`.
#[derive(Args, Debug, Clone)]
pub struct VerifyLogArgs {
    /// Event log exported by `simulate --export-log`.
    pub path: PathBuf,
}

/// Result of a successful log check.
#[derive(Debug, Clone, Serialize)]
pub struct LogReport {
    /// Records checked.
    pub records: u64,
    /// Digest of the newest record.
    pub head: ContentDigest,
}

/// Check the hash chain of an exported event log.
pub fn verify_log(args: &VerifyLogArgs) -> anyhow::Result<LogReport> {
    let raw = std::fs::read_to_string(&args.path)
        .with_context(|| format!("reading {}", args.path.display()))?;
    let records: Vec<EventRecord> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", args.path.display()))?;
    let log = EventLog::from_records(records);
    if let Err(sequence) = log.verify_chain() {
        bail!("event log chain breaks at record {sequence}");
    }
    tracing::info!(records = log.len(), head = %log.head(), "event log verified");
    Ok(LogReport {
        records: log.len(),
        head: log.head(),
    })
}
