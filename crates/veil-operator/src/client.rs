//! # Ledger Client
//!
//! The operator's view of the ledger: one read (the finalized-batch poll)
//! and the gated write path. [`LocalLedger`] serves an in-process ledger
//! behind `Arc<parking_lot::Mutex<_>>`. Every method takes and releases
//! the lock synchronously, so no caller can hold it across an `.await`.

use std::sync::Arc;

use parking_lot::Mutex;
use veil_core::{Address, BatchId, ProtocolConfig, UeiBatchId, VeilError};
use veil_crypto::Attestation;
use veil_ledger::{
    ConfidentialCompute, FinalizedBatchPage, Ledger, SettlementReceipt, UeiSettlementReceipt,
};
use veil_matching::SwapSettlement;
use veil_uei::{ExecutionPlan, SchemaRegistry};

/// What an operator worker needs from the ledger.
pub trait LedgerClient: Send + Sync {
    /// Protocol parameters.
    fn protocol_config(&self) -> ProtocolConfig;

    /// The compute service operators decrypt through.
    fn compute(&self) -> Arc<dyn ConfidentialCompute>;

    /// Snapshot of the registered UEI argument schemas.
    fn schemas(&self) -> SchemaRegistry;

    /// Batches finalized at or after `cursor`.
    fn query_finalized_batches(&self, cursor: u64) -> FinalizedBatchPage;

    /// Acknowledge a finalized swap batch.
    fn begin_processing(&self, operator: &Address, batch_id: BatchId) -> Result<(), VeilError>;

    /// Acknowledge a finalized UEI batch.
    fn begin_uei_processing(&self, operator: &Address, batch_id: UeiBatchId) -> Result<(), VeilError>;

    /// Submit a threshold-signed swap settlement.
    fn submit_settlement(
        &self,
        batch_id: BatchId,
        settlement: &SwapSettlement,
        attestations: &[Attestation],
    ) -> Result<SettlementReceipt, VeilError>;

    /// Submit a threshold-signed UEI plan.
    fn settle_uei_batch(
        &self,
        batch_id: UeiBatchId,
        plan: &ExecutionPlan,
        attestations: &[Attestation],
    ) -> Result<UeiSettlementReceipt, VeilError>;
}

/// An in-process ledger shared by submitters and operator workers.
#[derive(Debug, Clone)]
pub struct LocalLedger {
    inner: Arc<Mutex<Ledger>>,
}

impl LocalLedger {
    /// Wrap `ledger` for shared access.
    pub fn new(ledger: Ledger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Run `f` with exclusive access.
    pub fn with<R>(&self, f: impl FnOnce(&mut Ledger) -> R) -> R {
        f(&mut self.inner.lock())
    }
}

impl LedgerClient for LocalLedger {
    fn protocol_config(&self) -> ProtocolConfig {
        self.inner.lock().config().clone()
    }

    fn compute(&self) -> Arc<dyn ConfidentialCompute> {
        self.inner.lock().compute()
    }

    fn schemas(&self) -> SchemaRegistry {
        self.inner.lock().schemas().clone()
    }

    fn query_finalized_batches(&self, cursor: u64) -> FinalizedBatchPage {
        self.inner.lock().query_finalized_batches(cursor)
    }

    fn begin_processing(&self, operator: &Address, batch_id: BatchId) -> Result<(), VeilError> {
        self.inner.lock().begin_processing(operator, batch_id)
    }

    fn begin_uei_processing(&self, operator: &Address, batch_id: UeiBatchId) -> Result<(), VeilError> {
        self.inner.lock().begin_uei_processing(operator, batch_id)
    }

    fn submit_settlement(
        &self,
        batch_id: BatchId,
        settlement: &SwapSettlement,
        attestations: &[Attestation],
    ) -> Result<SettlementReceipt, VeilError> {
        self.inner
            .lock()
            .submit_settlement(batch_id, settlement, attestations)
    }

    fn settle_uei_batch(
        &self,
        batch_id: UeiBatchId,
        plan: &ExecutionPlan,
        attestations: &[Attestation],
    ) -> Result<UeiSettlementReceipt, VeilError> {
        self.inner.lock().settle_uei_batch(batch_id, plan, attestations)
    }
}
