//! # Intent Ledger
//!
//! The single-writer state machine at the centre of Veil. Every write takes
//! `&mut self`; operators reach it only through the gated write path
//! (finalize, acknowledge, settle) and read it through
//! [`Ledger::query_finalized_batches`].
//!
//! External effects go through the [`LedgerServices`] seams: the
//! confidential compute service, the exchange pool, the custodial vault
//! and cross-domain relay, the attestation verifier, the committee seed
//! source and the clock.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use veil_core::{
    sha256_digest, Address, Amount, AssetId, BatchId, CanonicalBytes, Clock, ConfigError,
    ContentDigest, IntentId, PoolKey, ProtocolConfig, TaskId, Timestamp, UeiBatchId, VeilError,
};
use veil_crypto::{
    AttestationVerifier, Ed25519AttestationVerifier, Ed25519PublicKey, HashSeedSource, SeedSource,
};
use veil_uei::{CrossDomainRelay, CustodialVault, InMemoryRelay, InMemoryVault, SchemaRegistry};

use crate::balances::BalanceBook;
use crate::compute::ConfidentialCompute;
use crate::events::{EventLog, EventRecord, LedgerEvent, SelectionEvidence};
use crate::exchange::ExchangePool;
use crate::records::{
    FinalizedBatch, FinalizedBatchPage, IntentRecord, SwapBatch, SwapBatchView, TaskRecord,
    UeiBatch, UeiBatchView,
};
use crate::selection::{select_committee, verify_committee, OperatorRegistry};

/// External services the ledger calls into.
pub struct LedgerServices {
    /// Ciphertext storage, proofs and access lists.
    pub compute: Arc<dyn ConfidentialCompute>,
    /// Swap venue for net residuals.
    pub exchange: Box<dyn ExchangePool>,
    /// Local executor of UEI calls.
    pub vault: Arc<dyn CustodialVault>,
    /// Bridge for UEI calls on other domains.
    pub relay: Arc<dyn CrossDomainRelay>,
    /// Settlement attestation verifier.
    pub verifier: Box<dyn AttestationVerifier>,
    /// Committee seed derivation.
    pub seed_source: Box<dyn SeedSource>,
    /// Ledger time.
    pub clock: Arc<dyn Clock>,
}

impl LedgerServices {
    /// Services with an in-memory vault and relay, Ed25519 attestation
    /// verification and hash-derived committee seeds.
    pub fn new(
        compute: Arc<dyn ConfidentialCompute>,
        exchange: impl ExchangePool + 'static,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            compute,
            exchange: Box::new(exchange),
            vault: Arc::new(InMemoryVault::new()),
            relay: Arc::new(InMemoryRelay::new()),
            verifier: Box::new(Ed25519AttestationVerifier),
            seed_source: Box::new(HashSeedSource),
            clock,
        }
    }

    /// Replace the custodial vault.
    pub fn with_vault(mut self, vault: Arc<dyn CustodialVault>) -> Self {
        self.vault = vault;
        self
    }

    /// Replace the cross-domain relay.
    pub fn with_relay(mut self, relay: Arc<dyn CrossDomainRelay>) -> Self {
        self.relay = relay;
        self
    }

    /// Replace the attestation verifier.
    pub fn with_verifier(mut self, verifier: impl AttestationVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    /// Replace the seed source.
    pub fn with_seed_source(mut self, seed_source: impl SeedSource + 'static) -> Self {
        self.seed_source = Box::new(seed_source);
        self
    }
}

/// The intent ledger.
pub struct Ledger {
    pub(crate) config: ProtocolConfig,
    pub(crate) services: LedgerServices,
    pub(crate) operators: OperatorRegistry,
    pub(crate) schemas: SchemaRegistry,
    pub(crate) balances: BalanceBook,
    pub(crate) escrow: BalanceBook,
    pub(crate) events: EventLog,
    pub(crate) next_sequence: u64,
    pub(crate) intents: BTreeMap<IntentId, IntentRecord>,
    pub(crate) batches: BTreeMap<BatchId, SwapBatch>,
    pub(crate) open_batches: BTreeMap<PoolKey, BatchId>,
    pub(crate) next_batch_id: u64,
    pub(crate) tasks: BTreeMap<TaskId, TaskRecord>,
    pub(crate) uei_batches: BTreeMap<UeiBatchId, UeiBatch>,
    pub(crate) current_uei_batch: UeiBatchId,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("operators", &self.operators.len())
            .field("intents", &self.intents.len())
            .field("batches", &self.batches.len())
            .field("tasks", &self.tasks.len())
            .field("uei_batches", &self.uei_batches.len())
            .field("events", &self.events.len())
            .finish()
    }
}

#[derive(Serialize)]
struct IdInput<'a, T: Serialize> {
    domain: &'static str,
    submitter: &'a Address,
    payload: &'a T,
    sequence: u64,
}

/// Content-derived id over canonical `(domain, submitter, payload, sequence)`.
pub(crate) fn derive_id<T: Serialize>(
    domain: &'static str,
    submitter: &Address,
    payload: &T,
    sequence: u64,
) -> Result<ContentDigest, VeilError> {
    let input = IdInput {
        domain,
        submitter,
        payload,
        sequence,
    };
    Ok(sha256_digest(&CanonicalBytes::new(&input)?))
}

/// Committee drawn for one batch, with its evidence.
/// Move `intent`'s collateral from `escrow` back to `balances`.
pub(crate) fn release_into(
    balances: &mut BalanceBook,
    escrow: &mut BalanceBook,
    intent: &IntentRecord,
) -> Result<(), VeilError> {
    escrow
        .debit(intent.submitter, &intent.asset_in, intent.collateral)
        .and_then(|()| balances.credit(intent.submitter, &intent.asset_in, intent.collateral))
        .map_err(|e| VeilError::Execution(format!("releasing collateral of {}: {e}", intent.intent_id)))
}

pub(crate) struct DrawnCommittee {
    pub(crate) committee: Vec<Address>,
    pub(crate) evidence: SelectionEvidence,
}

impl Ledger {
    /// A ledger with no operators, intents or balances.
    pub fn new(config: ProtocolConfig, services: LedgerServices) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = services.clock.now();
        let first_uei = UeiBatchId(1);
        let mut uei_batches = BTreeMap::new();
        uei_batches.insert(first_uei, UeiBatch::open(first_uei, now));
        tracing::info!(
            committee_size = config.committee_size,
            min_attestations = config.min_attestations,
            batch_interval_secs = config.batch_interval_secs,
            "ledger initialized"
        );
        Ok(Self {
            config,
            services,
            operators: OperatorRegistry::new(),
            schemas: SchemaRegistry::new(),
            balances: BalanceBook::new(),
            escrow: BalanceBook::new(),
            events: EventLog::new(),
            next_sequence: 0,
            intents: BTreeMap::new(),
            batches: BTreeMap::new(),
            open_batches: BTreeMap::new(),
            next_batch_id: 1,
            tasks: BTreeMap::new(),
            uei_batches,
            current_uei_batch: first_uei,
        })
    }

    // ── Shared helpers ──────────────────────────────────────────────

    /// Current ledger time.
    pub fn now(&self) -> Timestamp {
        self.services.clock.now()
    }

    pub(crate) fn require_admin(&self, caller: &Address, action: &str) -> Result<(), VeilError> {
        if *caller != self.config.admin {
            return Err(VeilError::Validation(format!(
                "{caller} is not the admin and may not {action}"
            )));
        }
        Ok(())
    }

    pub(crate) fn emit(&mut self, event: LedgerEvent) -> Result<(), VeilError> {
        let now = self.now();
        self.events.append(now, event)?;
        Ok(())
    }

    /// Draw the committee for `batch_key` from the current chain head.
    pub(crate) fn draw_committee(&self, batch_key: String) -> Result<DrawnCommittee, VeilError> {
        if self.operators.is_empty() {
            return Err(VeilError::Validation(
                "no operators are registered to form a committee".to_string(),
            ));
        }
        let entropy = self.events.head();
        let seed = self.services.seed_source.derive(&batch_key, &entropy)?;
        let operator_pool_size = self.operators.len();
        let committee = select_committee(
            &self.operators.pool(operator_pool_size),
            &seed.seed,
            self.config.committee_size,
        );
        Ok(DrawnCommittee {
            committee,
            evidence: SelectionEvidence {
                batch_key,
                entropy,
                seed,
                operator_pool_size,
            },
        })
    }

    /// End of the response window for a batch finalized at `finalized_at`.
    pub(crate) fn settle_by(&self, finalized_at: Timestamp) -> Result<Timestamp, VeilError> {
        finalized_at
            .plus_secs(self.config.max_response_interval_secs)
            .ok_or_else(|| VeilError::Temporal("response window exceeds the timestamp range".to_string()))
    }

    /// Reject work arriving after the response window of a batch.
    pub(crate) fn check_response_window(
        &self,
        label: &dyn std::fmt::Display,
        settle_by: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<Timestamp, VeilError> {
        let settle_by =
            settle_by.ok_or_else(|| VeilError::State(format!("{label} has not been finalized")))?;
        if now > settle_by {
            return Err(VeilError::Temporal(format!(
                "{label} had to settle by {settle_by}; the response window is {}s",
                self.config.max_response_interval_secs
            )));
        }
        Ok(settle_by)
    }

    /// Move `amount` of `user`'s `asset` from spendable balance into escrow.
    pub(crate) fn hold_collateral(
        &mut self,
        user: Address,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), VeilError> {
        self.balances
            .debit(user, asset, amount)
            .map_err(|e| VeilError::Validation(format!("collateral not available: {e}")))?;
        if let Err(e) = self.escrow.credit(user, asset, amount) {
            self.balances
                .credit(user, asset, amount)
                .map_err(|e| VeilError::Execution(e.to_string()))?;
            return Err(VeilError::Validation(e.to_string()));
        }
        Ok(())
    }

    /// Return an intent's escrowed collateral to its submitter.
    pub(crate) fn release_collateral(&mut self, intent_id: &IntentId) -> Result<(), VeilError> {
        let intent = self
            .intents
            .get(intent_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {intent_id}")))?;
        release_into(&mut self.balances, &mut self.escrow, intent)
    }

    // ── Administration ──────────────────────────────────────────────

    /// Register an operator key. Admin only.
    pub fn register_operator(
        &mut self,
        caller: &Address,
        public_key: Ed25519PublicKey,
    ) -> Result<Address, VeilError> {
        self.require_admin(caller, "register operators")?;
        let address = self.operators.register(public_key)?;
        tracing::info!(operator = %address, pool = self.operators.len(), "operator registered");
        Ok(address)
    }

    /// Credit custody funds to `user`.
    pub fn deposit(&mut self, user: Address, asset: &AssetId, amount: Amount) -> Result<(), VeilError> {
        self.balances
            .credit(user, asset, amount)
            .map_err(|e| VeilError::Validation(e.to_string()))?;
        tracing::debug!(%user, %asset, amount, "deposit credited");
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────────

    /// Protocol configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// The compute service, shared with operators for decryption.
    pub fn compute(&self) -> Arc<dyn ConfidentialCompute> {
        Arc::clone(&self.services.compute)
    }

    /// Custody balance.
    pub fn balance(&self, user: &Address, asset: &AssetId) -> Amount {
        self.balances.balance(user, asset)
    }

    /// Full balance table.
    pub fn balances(&self) -> &BalanceBook {
        &self.balances
    }

    /// Collateral held for live intents, by submitter.
    pub fn escrow(&self) -> &BalanceBook {
        &self.escrow
    }

    /// Registered operators.
    pub fn operators(&self) -> &OperatorRegistry {
        &self.operators
    }

    /// Registered UEI argument schemas.
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Event log.
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Stored intent.
    pub fn intent(&self, id: &IntentId) -> Option<&IntentRecord> {
        self.intents.get(id)
    }

    /// Swap batch.
    pub fn batch(&self, id: BatchId) -> Option<&SwapBatch> {
        self.batches.get(&id)
    }

    /// The open batch of `pool`, if any.
    pub fn open_batch(&self, pool: &PoolKey) -> Option<BatchId> {
        self.open_batches.get(pool).copied()
    }

    /// Stored UEI task.
    pub fn task(&self, id: &TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id)
    }

    /// UEI batch.
    pub fn uei_batch(&self, id: UeiBatchId) -> Option<&UeiBatch> {
        self.uei_batches.get(&id)
    }

    /// The rolling UEI batch currently collecting.
    pub fn current_uei_batch(&self) -> UeiBatchId {
        self.current_uei_batch
    }

    /// A swap batch together with its intents, in canonical order.
    pub fn swap_batch_view(&self, id: BatchId) -> Option<SwapBatchView> {
        let batch = self.batches.get(&id)?;
        let intents = batch
            .intent_ids
            .iter()
            .filter_map(|i| self.intents.get(i).cloned())
            .collect();
        Some(SwapBatchView {
            batch: batch.clone(),
            intents,
        })
    }

    /// A UEI batch together with its tasks, in canonical order.
    pub fn uei_batch_view(&self, id: UeiBatchId) -> Option<UeiBatchView> {
        let batch = self.uei_batches.get(&id)?;
        let tasks = batch
            .task_ids
            .iter()
            .filter_map(|t| self.tasks.get(t).cloned())
            .collect();
        Some(UeiBatchView {
            batch: batch.clone(),
            tasks,
        })
    }

    /// Batches whose finalization was logged at or after `cursor`.
    ///
    /// Views carry current status, so a consumer that sees a batch late
    /// can tell it was already settled or failed.
    pub fn query_finalized_batches(&self, cursor: u64) -> FinalizedBatchPage {
        let batches = self
            .events
            .since(cursor)
            .iter()
            .filter_map(|r: &EventRecord| match &r.event {
                LedgerEvent::BatchFinalized { batch_id, .. } => {
                    self.swap_batch_view(*batch_id).map(FinalizedBatch::Swap)
                }
                LedgerEvent::UeiBatchFinalized { batch_id, .. } => {
                    self.uei_batch_view(*batch_id).map(FinalizedBatch::Uei)
                }
                _ => None,
            })
            .collect();
        FinalizedBatchPage {
            next_cursor: self.events.len(),
            batches,
        }
    }

    /// Re-run committee selection for a finalized swap batch.
    pub fn verify_batch_committee(&self, id: BatchId) -> Result<(), VeilError> {
        let batch = self
            .batches
            .get(&id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {id}")))?;
        let evidence = batch
            .selection
            .as_ref()
            .ok_or_else(|| VeilError::State(format!("{id} has no committee yet")))?;
        verify_committee(
            self.services.seed_source.as_ref(),
            &self.operators,
            evidence,
            self.config.committee_size,
            &batch.committee,
        )
    }

    /// Re-run committee selection for a finalized UEI batch.
    pub fn verify_uei_committee(&self, id: UeiBatchId) -> Result<(), VeilError> {
        let batch = self
            .uei_batches
            .get(&id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {id}")))?;
        let evidence = batch
            .selection
            .as_ref()
            .ok_or_else(|| VeilError::State(format!("{id} has no committee yet")))?;
        verify_committee(
            self.services.seed_source.as_ref(),
            &self.operators,
            evidence,
            self.config.committee_size,
            &batch.committee,
        )
    }
}
