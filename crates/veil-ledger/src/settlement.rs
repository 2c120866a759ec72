//! # Swap Settlement
//!
//! The gated write path that settles a swap batch.
//!
//! [`Ledger::submit_settlement`] runs its checks in this order, and each
//! failure leaves state as described:
//!
//! 1. The batch exists and is finalized but not terminal (`State`).
//! 2. The response window since finalization is still open (`Temporal`).
//! 3. The payload is structurally sound against the ledger's own records
//!    (`Validation`). The first sound submission moves a `Finalized`
//!    batch to `Processing`.
//! 4. Enough committee members attested the payload digest (`Consensus`;
//!    the batch stays `Processing`).
//! 5. Collateral release, transfers, payouts and the single pool swap
//!    apply atomically (`Execution`; balances, escrow and pool unchanged,
//!    batch stays `Processing`). Payouts are credited against the pool's
//!    quote and the swap runs last.
//!
//! ## Security Invariant
//!
//! The ledger cannot read amounts, so it cannot recompute the match. It
//! relies on the attestation threshold for the amounts and checks
//! everything it can see: batch membership, transfer and share
//! directions against each intent's public asset pair, the expired set
//! against public deadlines, each intent's spend against its public
//! collateral, and the payload's internal conservation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use veil_core::{Address, Amount, BatchId, ContentDigest, IntentId, VeilError};
use veil_crypto::Attestation;
use veil_matching::{distribute_output, settlement_digest, Payout, SwapSettlement};
use veil_state::{BatchStatus, IntentStatus};

use crate::balances::BalanceBook;
use crate::consensus::check_threshold;
use crate::events::LedgerEvent;
use crate::ledger::{release_into, Ledger};
use crate::records::{IntentRecord, SwapBatch};

/// What an accepted swap settlement did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Settled batch.
    pub batch_id: BatchId,
    /// Attested digest.
    pub digest: ContentDigest,
    /// Committee members whose attestations counted.
    pub signers: Vec<Address>,
    /// Volume sent to the pool.
    pub net_amount: Amount,
    /// Pool output distributed to shareholders.
    pub amount_out: Amount,
    /// Per-intent payouts of the pool output.
    pub payouts: Vec<Payout>,
}

impl Ledger {
    /// Settle `batch_id` with `settlement`, attested by `attestations`.
    pub fn submit_settlement(
        &mut self,
        batch_id: BatchId,
        settlement: &SwapSettlement,
        attestations: &[Attestation],
    ) -> Result<SettlementReceipt, VeilError> {
        let now = self.now();
        let batch = self
            .batches
            .get(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        match batch.status() {
            BatchStatus::Finalized | BatchStatus::Processing => {}
            BatchStatus::Settled => {
                return Err(VeilError::State(format!("{batch_id} is already settled")));
            }
            other => {
                return Err(VeilError::State(format!(
                    "{batch_id} is {other} and cannot be settled"
                )));
            }
        }
        self.check_response_window(&batch_id, batch.settle_by, now)?;
        self.validate_settlement(batch, settlement)?;
        let digest = settlement_digest(settlement)?;
        let committee = batch.committee.clone();

        if batch.status() == BatchStatus::Finalized {
            self.enter_processing(batch_id, None, now)?;
        }

        let signers = check_threshold(
            self.services.verifier.as_ref(),
            &digest,
            attestations,
            &committee,
            self.config.min_attestations,
        )
        .map_err(|e| {
            tracing::warn!(%batch_id, error = %e, "settlement rejected by consensus gate");
            e
        })?;

        let (amount_out, payouts) = self.apply_settlement(batch_id, settlement).map_err(|e| {
            tracing::warn!(%batch_id, error = %e, "settlement execution failed; state unchanged");
            e
        })?;

        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        batch
            .lifecycle
            .try_transition(BatchStatus::Settled, now, Some(digest), None)?;
        batch.settlement_digest = Some(digest);
        let intent_ids = batch.intent_ids.clone();
        let rejected: BTreeSet<IntentId> = settlement.rejected.iter().copied().collect();
        for id in &intent_ids {
            if let Some(intent) = self.intents.get_mut(id) {
                if intent.status == IntentStatus::Matched {
                    let next = if rejected.contains(id) {
                        IntentStatus::Rejected
                    } else {
                        IntentStatus::Settled
                    };
                    intent.status = intent.status.transition(next)?;
                }
            }
        }

        let net_amount = settlement.net_amount();
        self.emit(LedgerEvent::BatchSettled {
            batch_id,
            digest,
            signers: signers.clone(),
            net_amount,
            amount_out,
        })?;
        tracing::info!(
            %batch_id,
            %digest,
            signers = signers.len(),
            transfers = settlement.transfers.len(),
            rejected = settlement.rejected.len(),
            net_amount,
            amount_out,
            "batch settled"
        );
        Ok(SettlementReceipt {
            batch_id,
            digest,
            signers,
            net_amount,
            amount_out,
            payouts,
        })
    }

    fn validate_settlement(&self, batch: &SwapBatch, settlement: &SwapSettlement) -> Result<(), VeilError> {
        let batch_id = batch.batch_id;
        if settlement.batch_id != batch_id {
            return Err(VeilError::Validation(format!(
                "settlement is for {}, not {batch_id}",
                settlement.batch_id
            )));
        }
        settlement.check_consistency()?;

        let members: BTreeSet<IntentId> = batch.intent_ids.iter().copied().collect();
        let accounted: BTreeSet<IntentId> = settlement.accounted_intents().copied().collect();
        if let Some(stray) = accounted.difference(&members).next() {
            return Err(VeilError::Validation(format!("{stray} is not in {batch_id}")));
        }
        if let Some(missing) = members.difference(&accounted).next() {
            return Err(VeilError::Validation(format!(
                "{missing} of {batch_id} is not accounted for"
            )));
        }

        let settle_by = batch
            .settle_by
            .ok_or_else(|| VeilError::State(format!("{batch_id} has not been finalized")))?;
        let expired: BTreeSet<IntentId> = settlement.expired.iter().copied().collect();
        for id in &batch.intent_ids {
            let intent = self.intent_record(id)?;
            let is_expired = intent.deadline < settle_by;
            if is_expired != expired.contains(id) {
                return Err(VeilError::Validation(format!(
                    "{id}: expired in payload is {}, deadline says {is_expired}",
                    expired.contains(id)
                )));
            }
        }

        for f in &settlement.fills {
            let intent = self.intent_record(&f.intent_id)?;
            if f.amount > intent.collateral {
                return Err(VeilError::Validation(format!(
                    "{} fills {} but holds {} collateral",
                    f.intent_id, f.amount, intent.collateral
                )));
            }
        }
        for (id, spent) in settlement.spent_by_intent()? {
            let intent = self.intent_record(&id)?;
            if spent > intent.collateral {
                return Err(VeilError::Validation(format!(
                    "{id} spends {spent} but holds {} collateral",
                    intent.collateral
                )));
            }
        }

        for t in &settlement.transfers {
            let from = self.intent_record(&t.from_intent)?;
            let to = self.intent_record(&t.to_intent)?;
            if t.from_user != from.submitter || t.to_user != to.submitter {
                return Err(VeilError::Validation(format!(
                    "transfer {} -> {} names the wrong users",
                    t.from_intent, t.to_intent
                )));
            }
            if t.asset != from.asset_in || t.asset != to.asset_out {
                return Err(VeilError::Validation(format!(
                    "transfer of {} from {} to {} does not follow their directions",
                    t.asset, t.from_intent, t.to_intent
                )));
            }
        }

        match &settlement.residual {
            Some(residual) => {
                for s in &settlement.shares {
                    let intent = self.intent_record(&s.intent_id)?;
                    if s.user != intent.submitter || !intent.trades(&residual.asset_in, &residual.asset_out) {
                        return Err(VeilError::Validation(format!(
                            "share of {} does not match the residual direction",
                            s.intent_id
                        )));
                    }
                }
                for f in settlement.fills.iter().filter(|f| f.unfilled > 0) {
                    let intent = self.intent_record(&f.intent_id)?;
                    if intent.trades(&residual.asset_in, &residual.asset_out) {
                        return Err(VeilError::Validation(format!(
                            "{} is in the dominant direction but reports unfilled volume",
                            f.intent_id
                        )));
                    }
                }
            }
            None => {
                if let Some(f) = settlement.fills.iter().find(|f| f.unfilled > 0) {
                    return Err(VeilError::Validation(format!(
                        "{} reports unfilled volume but there is no residual",
                        f.intent_id
                    )));
                }
            }
        }
        Ok(())
    }

    fn intent_record(&self, id: &IntentId) -> Result<&IntentRecord, VeilError> {
        self.intents
            .get(id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {id}")))
    }

    /// Apply every balance move on scratch books; commit only on success.
    ///
    /// Every live intent's collateral returns to its submitter first, so
    /// legs spend from funds the ledger already holds.
    fn apply_settlement(
        &mut self,
        batch_id: BatchId,
        settlement: &SwapSettlement,
    ) -> Result<(Amount, Vec<Payout>), VeilError> {
        let mut scratch: BalanceBook = self.balances.clone();
        let mut escrow: BalanceBook = self.escrow.clone();
        let batch = self
            .batches
            .get(&batch_id)
            .ok_or_else(|| VeilError::Validation(format!("unknown {batch_id}")))?;
        for id in &batch.intent_ids {
            let intent = self.intent_record(id)?;
            if intent.status == IntentStatus::Matched {
                release_into(&mut scratch, &mut escrow, intent)?;
            }
        }

        for t in &settlement.transfers {
            scratch
                .transfer(t.from_user, t.to_user, &t.asset, t.amount)
                .map_err(execution)?;
        }

        let Some(residual) = &settlement.residual else {
            self.balances = scratch;
            self.escrow = escrow;
            return Ok((0, Vec::new()));
        };
        for s in &settlement.shares {
            scratch
                .debit(s.user, &residual.asset_in, s.numerator)
                .map_err(execution)?;
        }
        let amount_out = self.services.exchange.quote(
            residual.total_amount,
            &residual.asset_in,
            &residual.asset_out,
        )?;
        let payouts = distribute_output(&settlement.shares, amount_out).map_err(execution)?;
        for p in &payouts {
            scratch
                .credit(p.user, &residual.asset_out, p.amount)
                .map_err(execution)?;
        }
        let executed = self.services.exchange.swap(
            residual.total_amount,
            &residual.asset_in,
            &residual.asset_out,
        )?;
        if executed != amount_out {
            return Err(VeilError::Execution(format!(
                "pool quoted {amount_out} but swapped {executed}"
            )));
        }
        self.balances = scratch;
        self.escrow = escrow;
        Ok((amount_out, payouts))
    }
}

fn execution(e: impl std::fmt::Display) -> VeilError {
    VeilError::Execution(e.to_string())
}

#[cfg(test)]
mod tests {
    use crate::exchange::ExchangePool;
    use crate::testing::{admin, user, worked_example, Fixture, FUNDING};
    use veil_core::{AssetId, VeilError};
    use veil_matching::{settlement_digest, InternalTransfer};
    use veil_state::{BatchStatus, IntentStatus};

    fn x() -> AssetId {
        AssetId::new("X").unwrap()
    }

    fn y() -> AssetId {
        AssetId::new("Y").unwrap()
    }

    #[test]
    fn worked_example_settles_and_pays_out() {
        let mut fx = Fixture::new();
        let (batch_id, ids) = worked_example(&mut fx);
        let settlement = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee[..2]);

        assert_eq!(fx.ledger.escrow().balance(&user(1), &x()), 12_000);
        let receipt = fx.ledger.submit_settlement(batch_id, &settlement, &atts).unwrap();
        assert_eq!(receipt.net_amount, 7_300);
        assert_eq!(receipt.signers.len(), 2);

        // A sold 7,500 X to B internally and 4,500 X to the pool.
        assert_eq!(fx.ledger.balance(&user(1), &x()), FUNDING - 12_000);
        let a_payout = receipt.payouts.iter().find(|p| p.intent_id == ids[0]).unwrap().amount;
        assert_eq!(fx.ledger.balance(&user(1), &y()), FUNDING + 7_500 + a_payout);
        assert_eq!(fx.ledger.escrow().total(&x()), 0);
        assert_eq!(fx.ledger.escrow().total(&y()), 0);
        let total_paid: u64 = receipt.payouts.iter().map(|p| p.amount).sum();
        assert_eq!(total_paid, receipt.amount_out);

        assert_eq!(fx.ledger.batch(batch_id).unwrap().status(), BatchStatus::Settled);
        for id in &ids {
            assert_eq!(fx.ledger.intent(id).unwrap().status, IntentStatus::Settled);
        }
    }

    #[test]
    fn second_settlement_is_a_state_error() {
        let mut fx = Fixture::new();
        let (batch_id, _) = worked_example(&mut fx);
        let settlement = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee);
        fx.ledger.submit_settlement(batch_id, &settlement, &atts).unwrap();
        let balances = fx.ledger.balances().clone();
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &settlement, &atts),
            Err(VeilError::State(_))
        ));
        assert_eq!(fx.ledger.balances(), &balances);
    }

    #[test]
    fn below_threshold_keeps_batch_processing() {
        let mut fx = Fixture::new();
        let (batch_id, _) = worked_example(&mut fx);
        let settlement = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee[..1]);
        let before = fx.ledger.balances().clone();
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &settlement, &atts),
            Err(VeilError::Consensus { valid: 1, required: 2, .. })
        ));
        assert_eq!(fx.ledger.batch(batch_id).unwrap().status(), BatchStatus::Processing);
        assert_eq!(fx.ledger.balances(), &before);
    }

    #[test]
    fn non_committee_signatures_do_not_count() {
        let mut fx = Fixture::new();
        let (batch_id, _) = worked_example(&mut fx);
        let settlement = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let outsiders: Vec<_> = fx
            .operator_addresses()
            .into_iter()
            .filter(|a| !committee.contains(a))
            .collect();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &outsiders);
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &settlement, &atts),
            Err(VeilError::Consensus { valid: 0, .. })
        ));
    }

    #[test]
    fn tampered_payload_rejected() {
        let mut fx = Fixture::new();
        let (batch_id, _) = worked_example(&mut fx);
        let honest = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();

        let mut redirected = honest.clone();
        let leg: &mut InternalTransfer = &mut redirected.transfers[0];
        leg.to_user = user(7);
        let atts = fx.attest(&settlement_digest(&redirected).unwrap(), &committee);
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &redirected, &atts),
            Err(VeilError::Validation(_))
        ));

        let mut dropped = honest.clone();
        dropped.expired.clear();
        dropped.fills.pop();
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &dropped, &[]),
            Err(VeilError::Validation(_))
        ));
        assert_eq!(fx.ledger.batch(batch_id).unwrap().status(), BatchStatus::Finalized);
    }

    #[test]
    fn attestations_over_other_payload_rejected() {
        let mut fx = Fixture::new();
        let (batch_id, _) = worked_example(&mut fx);
        let honest = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let mut other = honest.clone();
        other.fills.reverse();
        let atts = fx.attest(&settlement_digest(&other).unwrap(), &committee);
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &honest, &atts),
            Err(VeilError::Consensus { .. })
        ));
    }

    #[test]
    fn late_settlement_rejected() {
        let mut fx = Fixture::new();
        let (batch_id, _) = worked_example(&mut fx);
        let settlement = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee);
        fx.clock.advance(301);
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &settlement, &atts),
            Err(VeilError::Temporal(_))
        ));
    }

    #[test]
    fn unfunded_submitter_cannot_sink_the_batch() {
        let mut fx = Fixture::new();
        let broke = user(7);
        let payload = fx.payload(7, "X", "Y", 50_000, 600);
        assert!(matches!(
            fx.ledger.submit_intent(broke, payload),
            Err(VeilError::Validation(_))
        ));
        let (batch_id, ids) = worked_example(&mut fx);
        assert_eq!(fx.ledger.batch(batch_id).unwrap().intent_ids, ids);
        let settlement = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee);
        fx.ledger.submit_settlement(batch_id, &settlement, &atts).unwrap();
        assert_eq!(fx.ledger.batch(batch_id).unwrap().status(), BatchStatus::Settled);
    }

    #[test]
    fn amount_above_collateral_is_rejected_and_refunded() {
        let mut fx = Fixture::new();
        let a = fx.submit(1, "X", "Y", 12_000, 600);
        let b = fx.submit(2, "Y", "X", 7_500, 600);
        let mut oversized = fx.payload(5, "Y", "X", 900_000, 600);
        oversized.collateral = 1_000;
        let over = fx.ledger.submit_intent(user(5), oversized).unwrap();
        assert_eq!(fx.ledger.balance(&user(5), &y()), FUNDING - 1_000);
        let batch_id = fx.ledger.intent(&a).unwrap().batch_id;
        fx.ledger.finalize_batch(&admin(), batch_id, true).unwrap();

        let settlement = fx.match_batch(batch_id);
        assert_eq!(settlement.rejected, vec![over]);
        assert_eq!(settlement.net_amount(), 4_500);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee);
        fx.ledger.submit_settlement(batch_id, &settlement, &atts).unwrap();

        assert_eq!(fx.ledger.intent(&over).unwrap().status, IntentStatus::Rejected);
        assert_eq!(fx.ledger.intent(&a).unwrap().status, IntentStatus::Settled);
        assert_eq!(fx.ledger.intent(&b).unwrap().status, IntentStatus::Settled);
        assert_eq!(fx.ledger.balance(&user(5), &y()), FUNDING);
        assert_eq!(fx.ledger.balance(&user(5), &x()), FUNDING);
        assert_eq!(fx.ledger.escrow().total(&y()), 0);
    }

    #[test]
    fn spend_above_collateral_fails_validation() {
        let mut fx = Fixture::new();
        let a = fx.submit(1, "X", "Y", 12_000, 600);
        let mut short = fx.payload(2, "Y", "X", 7_500, 600);
        short.collateral = 500;
        fx.ledger.submit_intent(user(2), short).unwrap();
        let batch_id = fx.ledger.intent(&a).unwrap().batch_id;
        fx.ledger.finalize_batch(&admin(), batch_id, true).unwrap();

        // A committee that ignores collateral fills the short intent anyway.
        let mut intents = fx.decrypted_intents(batch_id);
        for i in &mut intents {
            i.collateral = i.amount;
        }
        let settle_by = fx.ledger.batch(batch_id).unwrap().settle_by.unwrap();
        let inflated = veil_matching::match_batch(batch_id, settle_by, intents).unwrap();
        assert!(inflated.rejected.is_empty());
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &inflated, &[]),
            Err(VeilError::Validation(_))
        ));
        assert_eq!(fx.ledger.batch(batch_id).unwrap().status(), BatchStatus::Finalized);
    }

    #[test]
    fn payout_failure_leaves_pool_untouched() {
        let mut fx = Fixture::new();
        fx.ledger.deposit(user(1), &y(), u64::MAX - FUNDING).unwrap();
        let id = fx.submit(1, "X", "Y", 500, 600);
        let batch_id = fx.ledger.intent(&id).unwrap().batch_id;
        fx.ledger.finalize_batch(&admin(), batch_id, true).unwrap();
        let settlement = fx.match_batch(batch_id);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee);

        let quote_before = fx.ledger.services.exchange.quote(1_000, &x(), &y()).unwrap();
        let balances = fx.ledger.balances().clone();
        let escrow = fx.ledger.escrow().clone();
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &settlement, &atts),
            Err(VeilError::Execution(_))
        ));
        assert_eq!(fx.ledger.services.exchange.quote(1_000, &x(), &y()).unwrap(), quote_before);
        assert_eq!(fx.ledger.balances(), &balances);
        assert_eq!(fx.ledger.escrow(), &escrow);
        assert_eq!(fx.ledger.batch(batch_id).unwrap().status(), BatchStatus::Processing);
    }

    #[test]
    fn expired_intents_are_excluded_and_not_debited() {
        let mut fx = Fixture::new();
        let live = fx.submit(1, "X", "Y", 500, 600);
        let late = fx.submit(2, "X", "Y", 900, 10);
        let batch_id = fx.ledger.intent(&live).unwrap().batch_id;
        fx.clock.advance(30);
        fx.ledger.finalize_batch(&admin(), batch_id, false).unwrap();
        let settlement = fx.match_batch(batch_id);
        assert_eq!(settlement.expired, vec![late]);
        assert_eq!(settlement.net_amount(), 500);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee);
        fx.ledger.submit_settlement(batch_id, &settlement, &atts).unwrap();
        assert_eq!(fx.ledger.balance(&user(2), &x()), FUNDING);
        assert_eq!(fx.ledger.intent(&late).unwrap().status, IntentStatus::Expired);
    }

    #[test]
    fn deadline_inside_response_window_is_expired() {
        let mut fx = Fixture::new();
        let live = fx.submit(1, "X", "Y", 500, 600);
        let tight = fx.submit(2, "X", "Y", 900, 100);
        let batch_id = fx.ledger.intent(&live).unwrap().batch_id;
        fx.clock.advance(30);
        fx.ledger.finalize_batch(&admin(), batch_id, false).unwrap();
        let batch = fx.ledger.batch(batch_id).unwrap();
        let (finalized_at, settle_by) = (batch.finalized_at.unwrap(), batch.settle_by.unwrap());
        let deadline = fx.ledger.intent(&tight).unwrap().deadline;
        assert!(finalized_at <= deadline && deadline < settle_by);

        let settlement = fx.match_batch(batch_id);
        assert_eq!(settlement.expired, vec![tight]);
        let committee = fx.ledger.batch(batch_id).unwrap().committee.clone();
        let atts = fx.attest(&settlement_digest(&settlement).unwrap(), &committee);
        fx.clock.advance(200);
        fx.ledger.submit_settlement(batch_id, &settlement, &atts).unwrap();
        assert_eq!(fx.ledger.intent(&tight).unwrap().status, IntentStatus::Expired);
        assert_eq!(fx.ledger.intent(&live).unwrap().status, IntentStatus::Settled);
        assert_eq!(fx.ledger.balance(&user(2), &x()), FUNDING);
    }

    #[test]
    fn settling_a_past_deadline_intent_fails_validation() {
        let mut fx = Fixture::new();
        let live = fx.submit(1, "X", "Y", 500, 600);
        fx.submit(2, "X", "Y", 900, 100);
        let batch_id = fx.ledger.intent(&live).unwrap().batch_id;
        fx.clock.advance(30);
        fx.ledger.finalize_batch(&admin(), batch_id, false).unwrap();
        let mut stale = fx.match_batch(batch_id);
        let revived = stale.expired.remove(0);
        stale.rejected.push(revived);
        assert!(matches!(
            fx.ledger.submit_settlement(batch_id, &stale, &[]),
            Err(VeilError::Validation(_))
        ));
    }
}
