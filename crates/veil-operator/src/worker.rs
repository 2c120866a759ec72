//! # Operator Worker
//!
//! One committee member's polling loop. On every tick the worker asks the
//! ledger for batches finalized since its cursor, and for each live batch
//! whose committee includes it:
//!
//! 1. acknowledges the batch (`Finalized → Processing`) if nobody has yet,
//! 2. decrypts the amounts or calls in chunks, preserving canonical order,
//! 3. runs the matching engine or the plan builder at the batch's
//!    `settle_by`,
//! 4. signs the digest and posts it through the [`SettlementCoordinator`].
//!
//! Workers race freely. A worker whose submission hits a `State` rejection
//! lost the race to another member; that is counted and logged at debug
//! level, never treated as a fault.
//!
//! The cursor always advances. A batch that fails for any other reason is
//! kept and retried on later polls, up to `max_batch_attempts` tries or
//! until the ledger reports its response window closed.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use veil_core::{Address, CiphertextHandle, DomainId};
use veil_crypto::Ed25519KeyPair;
use veil_ledger::{FinalizedBatch, SwapBatchView, UeiBatchView};
use veil_matching::{match_batch, DecryptedIntent};
use veil_state::BatchStatus;
use veil_uei::{build_plan, DecryptedTask};

use crate::client::LedgerClient;
use crate::config::OperatorConfig;
use crate::coordinator::{AttestationBoard, Contribution, SettlementCoordinator};
use crate::decrypt::ChunkedDecryptor;
use crate::error::OperatorError;

/// Counters kept by one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    /// Completed polls.
    pub polls: u64,
    /// Batches this worker signed for without submitting.
    pub contributed: u64,
    /// Batches this worker submitted and the ledger accepted.
    pub submitted: u64,
    /// Submissions rejected because another member got there first.
    pub lost_races: u64,
    /// Failed attempts to contribute to a batch.
    pub failures: u64,
    /// Batches dropped after their last failed attempt.
    pub abandoned: u64,
}

struct Retry {
    batch: FinalizedBatch,
    attempts: u32,
}

/// A committee member's polling worker.
pub struct OperatorWorker {
    key: Ed25519KeyPair,
    address: Address,
    client: Arc<dyn LedgerClient>,
    coordinator: SettlementCoordinator,
    decryptor: ChunkedDecryptor,
    poll_interval: Duration,
    local_domain: DomainId,
    max_attempts: u32,
    cursor: u64,
    retries: Vec<Retry>,
    stats: WorkerStats,
}

impl std::fmt::Debug for OperatorWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorWorker")
            .field("address", &self.address)
            .field("cursor", &self.cursor)
            .field("retries", &self.retries.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl OperatorWorker {
    /// Worker for `key`, polling through `client` and gossiping on `board`.
    pub fn new(
        key: Ed25519KeyPair,
        client: Arc<dyn LedgerClient>,
        board: AttestationBoard,
        config: &OperatorConfig,
    ) -> Self {
        let address = key.address();
        let decryptor = ChunkedDecryptor::new(client.compute(), config.decrypt_chunk_size);
        let coordinator = SettlementCoordinator::new(board, Arc::clone(&client));
        let local_domain = client.protocol_config().local_domain;
        Self {
            key,
            address,
            client,
            coordinator,
            decryptor,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            local_domain,
            max_attempts: config.max_batch_attempts,
            cursor: 0,
            retries: Vec::new(),
            stats: WorkerStats::default(),
        }
    }

    /// This worker's operator address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Counters so far.
    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WorkerStats {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(operator = %self.address, interval_ms = self.poll_interval.as_millis() as u64, "operator worker started");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
            }
        }
        tracing::info!(operator = %self.address, stats = ?self.stats, "operator worker stopped");
        self.stats
    }

    /// Spawn [`Self::run`] on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<WorkerStats> {
        tokio::spawn(self.run(shutdown))
    }

    /// Batches waiting for another attempt.
    pub fn pending_retries(&self) -> usize {
        self.retries.len()
    }

    /// Poll once, retry earlier failures and process every new batch.
    /// Returns how many batches this worker acted on.
    pub async fn poll_once(&mut self) -> usize {
        let page = self.client.query_finalized_batches(self.cursor);
        self.cursor = page.next_cursor;
        self.stats.polls += 1;
        tracing::debug!(
            operator = %self.address,
            cursor = self.cursor,
            batches = page.batches.len(),
            retries = self.retries.len(),
            "polled"
        );
        let mut acted = 0;
        for retry in std::mem::take(&mut self.retries) {
            if self.attempt(&retry.batch, retry.attempts + 1).await {
                acted += 1;
            }
        }
        for batch in &page.batches {
            if self.process(batch).await {
                acted += 1;
            }
        }
        acted
    }

    /// Contribute to `batch` if this worker is on its committee and it is
    /// still live. Returns whether the worker acted.
    pub async fn process(&mut self, batch: &FinalizedBatch) -> bool {
        self.attempt(batch, 1).await
    }

    async fn attempt(&mut self, batch: &FinalizedBatch, attempt: u32) -> bool {
        if batch.status().is_terminal() || !batch.committee().contains(&self.address) {
            return false;
        }
        let label = batch.label();
        let result = match batch {
            FinalizedBatch::Swap(view) => self.process_swap(view).await,
            FinalizedBatch::Uei(view) => self.process_uei(view).await,
        };
        match result {
            Ok(Outcome::Submitted) => self.stats.submitted += 1,
            Ok(Outcome::Contributed) => self.stats.contributed += 1,
            Err(e) if e.is_lost_race() => {
                self.stats.lost_races += 1;
                tracing::debug!(operator = %self.address, batch = %label, error = %e, "batch already handled by another member");
            }
            Err(e) if e.is_window_closed() || attempt >= self.max_attempts => {
                self.stats.failures += 1;
                self.stats.abandoned += 1;
                tracing::warn!(operator = %self.address, batch = %label, attempt, error = %e, "giving up on batch");
            }
            Err(e) => {
                self.stats.failures += 1;
                tracing::warn!(operator = %self.address, batch = %label, attempt, error = %e, "could not contribute to batch; will retry");
                self.retries.push(Retry {
                    batch: batch.clone(),
                    attempts: attempt,
                });
            }
        }
        true
    }

    async fn process_swap(&self, view: &SwapBatchView) -> Result<Outcome, OperatorError> {
        let batch_id = view.batch.batch_id;
        if view.batch.status() == BatchStatus::Finalized {
            self.acknowledge(self.client.begin_processing(&self.address, batch_id))?;
        }
        let reference_time = view
            .batch
            .settle_by
            .ok_or_else(|| OperatorError::Malformed(format!("{batch_id} has no settlement deadline")))?;

        let handles: Vec<CiphertextHandle> = view.intents.iter().map(|i| i.amount).collect();
        let amounts = self.decryptor.decrypt(&self.key, &handles).await?;
        let mut intents = Vec::with_capacity(view.intents.len());
        for (record, plain) in view.intents.iter().zip(amounts) {
            let amount = plain.as_uint().ok_or_else(|| {
                OperatorError::Malformed(format!("{} amount is a {}", record.intent_id, plain.kind()))
            })?;
            intents.push(DecryptedIntent {
                intent_id: record.intent_id,
                submitter: record.submitter,
                asset_in: record.asset_in.clone(),
                asset_out: record.asset_out.clone(),
                amount,
                collateral: record.collateral,
                deadline: record.deadline,
            });
        }

        let settlement = match_batch(batch_id, reference_time, intents)?;
        Ok(self.coordinator.contribute_swap(&self.key, &settlement)?.into())
    }

    async fn process_uei(&self, view: &UeiBatchView) -> Result<Outcome, OperatorError> {
        let batch_id = view.batch.batch_id;
        if view.batch.status() == BatchStatus::Finalized {
            self.acknowledge(self.client.begin_uei_processing(&self.address, batch_id))?;
        }
        let reference_time = view
            .batch
            .settle_by
            .ok_or_else(|| OperatorError::Malformed(format!("{batch_id} has no settlement deadline")))?;

        let handles: Vec<CiphertextHandle> = view.tasks.iter().flat_map(|t| t.call.handles()).collect();
        let plaintexts = self.decryptor.decrypt(&self.key, &handles).await?;
        let mut tasks = Vec::with_capacity(view.tasks.len());
        let mut offset = 0;
        for record in &view.tasks {
            let end = offset + record.call.handle_count();
            let slice = plaintexts.get(offset..end).ok_or_else(|| {
                OperatorError::Malformed(format!("{} is missing plaintexts", record.task_id))
            })?;
            offset = end;
            let task = DecryptedTask::from_plaintexts(
                record.task_id,
                record.submitter,
                record.value,
                record.deadline,
                slice,
            )
            .ok_or_else(|| OperatorError::Malformed(format!("{} call has the wrong shape", record.task_id)))?;
            tasks.push(task);
        }

        let schemas = self.client.schemas();
        let plan = build_plan(batch_id, reference_time, &tasks, &schemas, self.local_domain)?;
        Ok(self.coordinator.contribute_plan(&self.key, &plan)?.into())
    }

    /// A `State` rejection here means another member acknowledged first.
    fn acknowledge(&self, result: Result<(), veil_core::VeilError>) -> Result<(), OperatorError> {
        match result {
            Err(e) if e.is_state() => Ok(()),
            other => other.map_err(OperatorError::from),
        }
    }
}

enum Outcome {
    Submitted,
    Contributed,
}

impl<R> From<Contribution<R>> for Outcome {
    fn from(c: Contribution<R>) -> Self {
        match c {
            Contribution::Submitted(_) => Self::Submitted,
            Contribution::Waiting { .. } | Contribution::Delegated => Self::Contributed,
        }
    }
}
