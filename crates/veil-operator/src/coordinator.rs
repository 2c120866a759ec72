//! # Settlement Coordinator
//!
//! Committee members never talk to the ledger one signature at a time.
//! Each member computes the settlement (or plan) for a batch, signs its
//! digest and posts the signature to a shared [`AttestationBoard`]. The
//! member whose post brings a digest to `min_attestations` distinct signers
//! is the one that submits. Members that computed a different digest post
//! under that digest instead, so a divergent member can never contribute
//! to the honest set.
//!
//! The board is the gossip surface. In-process it is a shared map; a
//! deployment would back it with whatever transport the committee uses.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use veil_core::{BatchId, ContentDigest, UeiBatchId};
use veil_crypto::{Attestation, Ed25519KeyPair};
use veil_ledger::{SettlementReceipt, UeiSettlementReceipt};
use veil_matching::{settlement_digest, SwapSettlement};
use veil_uei::{plan_digest, ExecutionPlan};

use crate::client::LedgerClient;
use crate::error::OperatorError;

/// Either kind of batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BatchRef {
    /// Swap batch.
    Swap(BatchId),
    /// UEI batch.
    Uei(UeiBatchId),
}

impl std::fmt::Display for BatchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Swap(id) => write!(f, "{id}"),
            Self::Uei(id) => write!(f, "{id}"),
        }
    }
}

/// Result of posting one attestation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// Below threshold.
    Collecting {
        /// Distinct signers so far.
        have: usize,
        /// Threshold.
        required: usize,
    },
    /// This post reached the threshold; the poster submits these.
    Reached(Vec<Attestation>),
    /// An earlier post already reached the threshold.
    AlreadyReached,
}

#[derive(Debug, Default)]
struct Posting {
    attestations: Vec<Attestation>,
    reached: bool,
}

/// Shared per-`(batch, digest)` signature collection.
#[derive(Debug, Clone, Default)]
pub struct AttestationBoard {
    inner: Arc<Mutex<BTreeMap<(BatchRef, ContentDigest), Posting>>>,
}

impl AttestationBoard {
    /// Empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Post `attestation` under `(batch, digest)`. A signer posting twice is
    /// counted once.
    pub fn post(
        &self,
        batch: BatchRef,
        digest: ContentDigest,
        attestation: Attestation,
        required: usize,
    ) -> PostOutcome {
        let mut inner = self.inner.lock();
        let posting = inner.entry((batch, digest)).or_default();
        if !posting
            .attestations
            .iter()
            .any(|a| a.signer == attestation.signer)
        {
            posting.attestations.push(attestation);
        }
        if posting.reached {
            return PostOutcome::AlreadyReached;
        }
        let have = posting.attestations.len();
        if have >= required {
            posting.reached = true;
            PostOutcome::Reached(posting.attestations.clone())
        } else {
            PostOutcome::Collecting { have, required }
        }
    }

    /// Everything posted under `(batch, digest)`.
    pub fn attestations(&self, batch: BatchRef, digest: &ContentDigest) -> Vec<Attestation> {
        self.inner
            .lock()
            .get(&(batch, *digest))
            .map(|p| p.attestations.clone())
            .unwrap_or_default()
    }

    /// Number of distinct digests posted for `batch`. Above one means the
    /// committee diverged.
    pub fn digest_count(&self, batch: BatchRef) -> usize {
        self.inner.lock().keys().filter(|(b, _)| *b == batch).count()
    }
}

/// What one member's contribution led to.
#[derive(Debug)]
pub enum Contribution<R> {
    /// Posted; waiting for more signers.
    Waiting {
        /// Distinct signers so far.
        have: usize,
        /// Threshold.
        required: usize,
    },
    /// This member submitted and the ledger accepted.
    Submitted(R),
    /// Another member already submitted this digest.
    Delegated,
}

/// Signs, posts and, when its post completes the threshold, submits.
#[derive(Clone)]
pub struct SettlementCoordinator {
    board: AttestationBoard,
    client: Arc<dyn LedgerClient>,
    required: usize,
}

impl std::fmt::Debug for SettlementCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettlementCoordinator")
            .field("required", &self.required)
            .finish()
    }
}

impl SettlementCoordinator {
    /// Coordinator posting to `board` and submitting through `client`.
    pub fn new(board: AttestationBoard, client: Arc<dyn LedgerClient>) -> Self {
        let required = client.protocol_config().min_attestations;
        Self {
            board,
            client,
            required,
        }
    }

    /// Contribute `key`'s signature over a swap settlement.
    pub fn contribute_swap(
        &self,
        key: &Ed25519KeyPair,
        settlement: &SwapSettlement,
    ) -> Result<Contribution<SettlementReceipt>, OperatorError> {
        let batch_id = settlement.batch_id;
        let digest = settlement_digest(settlement)?;
        match self.sign_and_post(key, BatchRef::Swap(batch_id), digest)? {
            PostOutcome::Reached(attestations) => {
                tracing::info!(%batch_id, %digest, signers = attestations.len(), "threshold reached, submitting settlement");
                let receipt = self
                    .client
                    .submit_settlement(batch_id, settlement, &attestations)?;
                Ok(Contribution::Submitted(receipt))
            }
            PostOutcome::Collecting { have, required } => Ok(Contribution::Waiting { have, required }),
            PostOutcome::AlreadyReached => Ok(Contribution::Delegated),
        }
    }

    /// Contribute `key`'s signature over a UEI plan.
    pub fn contribute_plan(
        &self,
        key: &Ed25519KeyPair,
        plan: &ExecutionPlan,
    ) -> Result<Contribution<UeiSettlementReceipt>, OperatorError> {
        let batch_id = plan.batch_id;
        let digest = plan_digest(plan)?;
        match self.sign_and_post(key, BatchRef::Uei(batch_id), digest)? {
            PostOutcome::Reached(attestations) => {
                tracing::info!(%batch_id, %digest, signers = attestations.len(), "threshold reached, submitting plan");
                let receipt = self.client.settle_uei_batch(batch_id, plan, &attestations)?;
                Ok(Contribution::Submitted(receipt))
            }
            PostOutcome::Collecting { have, required } => Ok(Contribution::Waiting { have, required }),
            PostOutcome::AlreadyReached => Ok(Contribution::Delegated),
        }
    }

    fn sign_and_post(
        &self,
        key: &Ed25519KeyPair,
        batch: BatchRef,
        digest: ContentDigest,
    ) -> Result<PostOutcome, OperatorError> {
        let attestation = Attestation::sign(key, &digest)?;
        let outcome = self.board.post(batch, digest, attestation, self.required);
        if self.board.digest_count(batch) > 1 {
            tracing::warn!(%batch, %digest, "committee members posted diverging digests");
        }
        tracing::debug!(%batch, %digest, operator = %key.address(), outcome = outcome_label(&outcome), "attestation posted");
        Ok(outcome)
    }
}

fn outcome_label(outcome: &PostOutcome) -> &'static str {
    match outcome {
        PostOutcome::Collecting { .. } => "collecting",
        PostOutcome::Reached(_) => "reached",
        PostOutcome::AlreadyReached => "already_reached",
    }
}
