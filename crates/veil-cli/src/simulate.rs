//! # Simulate Subcommand
//!
//! Runs one full Veil round in-process: registers operators, submits swap
//! intents (the worked example, or a seeded random workload) and optional
//! UEI token transfers, finalizes the batches, and lets one concurrent
//! [`OperatorWorker`] per operator decrypt, match, attest and settle.
//! Prints a JSON report; the event log can be exported for `verify-log`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::watch;
use veil_core::{
    Address, Amount, AssetId, BatchId, ContentDigest, ManualClock, Plaintext, ProtocolConfig,
    UeiBatchId,
};
use veil_crypto::Ed25519KeyPair;
use veil_ledger::{
    ConfidentialCompute, ConstantProductPool, InMemoryCompute, IntentPayload, Ledger,
    LedgerEvent, LedgerServices, SelectionEvidence, TaskPayload,
};
use veil_operator::{AttestationBoard, LedgerClient, LocalLedger, OperatorConfig, OperatorWorker, WorkerStats};
use veil_state::BatchStatus;
use veil_uei::{ArgKind, ArgumentSchema, CallKey, EncryptedCall, InMemoryVault};

use crate::config::load_protocol_config;

const START_EPOCH: i64 = 1_700_000_000;
const POOL_LIQUIDITY: Amount = 100_000_000;
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

const DECODER: Address = Address([0xD0; 20]);
const TOKEN: Address = Address([0xA1; 20]);
const RECIPIENT: Address = Address([0xEE; 20]);
const TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Arguments for the simulate subcommand.
#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Protocol config YAML. Without it, `VEIL_*` variables and defaults apply.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Submit this many random intents instead of the worked example.
    #[arg(long)]
    pub random: Option<usize>,

    /// RNG seed for `--random`.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Operators to register.
    #[arg(long, default_value_t = 5)]
    pub operators: u8,

    /// UEI token transfers to the same recipient, aggregated into one call.
    #[arg(long, default_value_t = 0)]
    pub uei_transfers: usize,

    /// Worker poll interval.
    #[arg(long, default_value_t = 10)]
    pub poll_interval_ms: u64,

    /// Write the event log as JSON to this path.
    #[arg(long)]
    pub export_log: Option<PathBuf>,
}

impl Default for SimulateArgs {
    fn default() -> Self {
        Self {
            config: None,
            random: None,
            seed: 7,
            operators: 5,
            uei_transfers: 0,
            poll_interval_ms: 10,
            export_log: None,
        }
    }
}

/// Swap side of the report.
#[derive(Debug, Clone, Serialize)]
pub struct SwapSummary {
    /// Batch.
    pub batch_id: BatchId,
    /// Final status.
    pub status: BatchStatus,
    /// Intents in the batch.
    pub intents: usize,
    /// Drawn committee.
    pub committee: Vec<Address>,
    /// How it was drawn.
    pub selection: Option<SelectionEvidence>,
    /// Volume sent to the pool.
    pub net_amount: Option<Amount>,
    /// Pool output distributed to residual shares.
    pub amount_out: Option<Amount>,
    /// Accepted settlement digest.
    pub digest: Option<ContentDigest>,
}

/// UEI side of the report.
#[derive(Debug, Clone, Serialize)]
pub struct UeiSummary {
    /// Batch.
    pub batch_id: UeiBatchId,
    /// Final status.
    pub status: BatchStatus,
    /// Tasks in the batch.
    pub tasks: usize,
    /// Calls in the executed plan.
    pub steps: Option<usize>,
    /// Calls the custodial vault performed.
    pub vault_calls: usize,
}

/// Everything a simulation run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Swap batch outcome.
    pub swap: SwapSummary,
    /// UEI batch outcome, when transfers were submitted.
    pub uei: Option<UeiSummary>,
    /// Per-worker counters, in operator order.
    pub workers: Vec<WorkerStats>,
    /// Event log length.
    pub events: u64,
    /// Whether the hash chain verified.
    pub chain_verified: bool,
}

/// Deterministic operator key `i` used by simulations and audits.
pub fn simulation_operator_key(i: u8) -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed(&[i.wrapping_add(1); 32])
}

/// Run a simulation on a fresh multi-threaded runtime.
pub fn run(args: &SimulateArgs) -> anyhow::Result<SimulationReport> {
    let config = load_protocol_config(args.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting tokio runtime")?;
    runtime.block_on(simulate(args, config))
}

struct Order {
    user: Address,
    asset_in: AssetId,
    asset_out: AssetId,
    amount: Amount,
}

fn workload(args: &SimulateArgs, x: &AssetId, y: &AssetId) -> Vec<Order> {
    let order = |n: u8, forward: bool, amount: Amount| Order {
        user: Address([n; 20]),
        asset_in: if forward { x.clone() } else { y.clone() },
        asset_out: if forward { y.clone() } else { x.clone() },
        amount,
    };
    match args.random {
        None => vec![
            order(1, true, 12_000),
            order(2, false, 7_500),
            order(3, true, 4_000),
            order(4, false, 1_200),
        ],
        Some(count) => {
            let mut rng = rand::rngs::StdRng::seed_from_u64(args.seed);
            (0..count)
                .map(|_| order(rng.gen_range(1..=8), rng.gen_bool(0.5), rng.gen_range(100..=10_000)))
                .collect()
        }
    }
}

async fn simulate(args: &SimulateArgs, config: ProtocolConfig) -> anyhow::Result<SimulationReport> {
    let admin = config.admin;
    let clock = Arc::new(ManualClock::at_epoch(START_EPOCH));
    let compute = Arc::new(InMemoryCompute::default());
    let vault = Arc::new(InMemoryVault::new());
    let x = AssetId::new("X").map_err(anyhow::Error::msg)?;
    let y = AssetId::new("Y").map_err(anyhow::Error::msg)?;

    let mut pool = ConstantProductPool::new();
    pool.add_liquidity(&x, POOL_LIQUIDITY, &y, POOL_LIQUIDITY)?;
    let services =
        LedgerServices::new(compute.clone(), pool, clock.clone()).with_vault(vault.clone());
    let mut ledger = Ledger::new(config.clone(), services)?;

    let keys: Vec<Ed25519KeyPair> = (0..args.operators).map(simulation_operator_key).collect();
    for kp in &keys {
        ledger.register_operator(&admin, kp.public_key())?;
    }

    // ── Swap intents ────────────────────────────────────────────────
    let orders = workload(args, &x, &y);
    anyhow::ensure!(!orders.is_empty(), "the workload has no intents");
    let deadline = ledger
        .now()
        .plus_secs(config.max_response_interval_secs * 2)
        .context("deadline overflow")?;
    let mut batch_id = None;
    for o in &orders {
        ledger.deposit(o.user, &o.asset_in, o.amount)?;
        let payload = IntentPayload {
            asset_in: o.asset_in.clone(),
            asset_out: o.asset_out.clone(),
            amount: compute.encrypt(Plaintext::Uint(o.amount), o.user)?,
            collateral: o.amount,
            deadline,
        };
        let id = ledger.submit_intent(o.user, payload)?;
        batch_id = ledger.intent(&id).map(|r| r.batch_id);
    }
    let batch_id = batch_id.context("no batch was opened")?;

    // ── UEI transfers ───────────────────────────────────────────────
    let uei_batch = if args.uei_transfers > 0 {
        let local_domain = config.local_domain;
        ledger.register_schema(
            &admin,
            CallKey {
                decoder: DECODER,
                target: TOKEN,
                selector: TRANSFER,
            },
            ArgumentSchema {
                name: "transfer".to_string(),
                args: vec![ArgKind::Address, ArgKind::Uint],
                amount_index: 1,
                domain: local_domain,
            },
        )?;
        for i in 0..args.uei_transfers {
            let owner = Address([(i % 8) as u8 + 1; 20]);
            let enc = |p: Plaintext| compute.encrypt(p, owner);
            let call = EncryptedCall {
                decoder: enc(Plaintext::Address(DECODER))?,
                target: enc(Plaintext::Address(TOKEN))?,
                selector: enc(Plaintext::Selector(TRANSFER))?,
                args: vec![
                    enc(Plaintext::Address(RECIPIENT))?,
                    enc(Plaintext::Uint(100 + i as u64))?,
                ],
            };
            ledger.submit_task(owner, TaskPayload { call, value: 0, deadline })?;
        }
        Some(ledger.current_uei_batch())
    } else {
        None
    };

    clock.advance(config.batch_interval_secs.max(config.uei_idle_timeout_secs));
    ledger.finalize_batch(&admin, batch_id, false)?;
    if uei_batch.is_some() {
        ledger.finalize_uei_batch(&admin, false)?;
    }

    // ── Operators ───────────────────────────────────────────────────
    let shared = LocalLedger::new(ledger);
    let client: Arc<dyn LedgerClient> = Arc::new(shared.clone());
    let board = AttestationBoard::new();
    let operator_config = OperatorConfig {
        poll_interval_ms: args.poll_interval_ms,
        ..OperatorConfig::default()
    };
    operator_config.validate()?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles: Vec<_> = keys
        .into_iter()
        .map(|kp| {
            OperatorWorker::new(kp, Arc::clone(&client), board.clone(), &operator_config)
                .spawn(shutdown_rx.clone())
        })
        .collect();

    let done = |l: &Ledger| {
        let swap_done = l.batch(batch_id).map_or(true, |b| b.status().is_terminal());
        let uei_done = uei_batch
            .and_then(|id| l.uei_batch(id))
            .map_or(true, |b| b.status().is_terminal());
        swap_done && uei_done
    };
    let deadline_at = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    while !shared.with(|l| done(l)) {
        if tokio::time::Instant::now() >= deadline_at {
            tracing::warn!("simulation timed out waiting for settlement");
            break;
        }
        tokio::time::sleep(Duration::from_millis(args.poll_interval_ms)).await;
    }
    let _ = shutdown_tx.send(true);
    let mut workers = Vec::with_capacity(handles.len());
    for handle in handles {
        workers.push(handle.await.context("operator worker panicked")?);
    }

    let report = shared.with(|l| build_report(l, batch_id, uei_batch, vault.executed().len(), workers));
    if let Some(path) = &args.export_log {
        let json = shared.with(|l| serde_json::to_string_pretty(l.events().records()))?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "event log exported");
    }
    Ok(report)
}

fn build_report(
    ledger: &Ledger,
    batch_id: BatchId,
    uei_batch: Option<UeiBatchId>,
    vault_calls: usize,
    workers: Vec<WorkerStats>,
) -> SimulationReport {
    let mut swap = SwapSummary {
        batch_id,
        status: BatchStatus::Collecting,
        intents: 0,
        committee: Vec::new(),
        selection: None,
        net_amount: None,
        amount_out: None,
        digest: None,
    };
    if let Some(batch) = ledger.batch(batch_id) {
        swap.status = batch.status();
        swap.intents = batch.intent_ids.len();
        swap.committee = batch.committee.clone();
        swap.selection = batch.selection.clone();
    }
    let mut uei = uei_batch.and_then(|id| ledger.uei_batch(id)).map(|b| UeiSummary {
        batch_id: b.batch_id,
        status: b.status(),
        tasks: b.task_ids.len(),
        steps: None,
        vault_calls,
    });

    for record in ledger.events().records() {
        match &record.event {
            LedgerEvent::BatchSettled {
                batch_id: id,
                digest,
                net_amount,
                amount_out,
                ..
            } if *id == batch_id => {
                swap.net_amount = Some(*net_amount);
                swap.amount_out = Some(*amount_out);
                swap.digest = Some(*digest);
            }
            LedgerEvent::UeiBatchSettled { batch_id: id, steps, .. } => {
                if let Some(summary) = uei.as_mut().filter(|s| s.batch_id == *id) {
                    summary.steps = Some(*steps);
                }
            }
            _ => {}
        }
    }

    SimulationReport {
        swap,
        uei,
        workers,
        events: ledger.events().len(),
        chain_verified: ledger.events().verify_chain().is_ok(),
    }
}
