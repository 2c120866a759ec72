//! # Swap Settlement Payload
//!
//! What a committee computes for one batch and what the ledger applies:
//! internal transfers between opposing intents, at most one net residual
//! for external execution, the residual's per-user shares, and a fill
//! record for every intent that took part.
//!
//! ## Conservation
//!
//! For every intent, `matched + residual + unfilled == amount`, where
//! `matched` equals both the sum of the transfers it sends and the sum of
//! the transfers it receives, and `residual` equals its share numerator.
//! Summed per direction this is exactly the batch conservation law:
//! transfers out plus net residual plus unfilled remainder equals the
//! original volume.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use veil_core::{Address, Amount, AssetId, BatchId, IntentId, Timestamp};

use crate::error::MatchingError;

/// A decrypted intent, as fed to the matching engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptedIntent {
    /// Ledger-assigned intent id.
    pub intent_id: IntentId,
    /// Submitting account.
    pub submitter: Address,
    /// Asset the submitter gives.
    pub asset_in: AssetId,
    /// Asset the submitter wants.
    pub asset_out: AssetId,
    /// Decrypted amount of `asset_in`.
    pub amount: Amount,
    /// Public escrow of `asset_in`; an amount above it cannot be filled.
    pub collateral: Amount,
    /// Latest acceptable settlement reference time.
    pub deadline: Timestamp,
}

impl DecryptedIntent {
    /// The directed pair `(asset_in, asset_out)`.
    pub fn direction(&self) -> (&AssetId, &AssetId) {
        (&self.asset_in, &self.asset_out)
    }
}

/// One leg of an internal match: a direct balance move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTransfer {
    /// Intent the amount is taken from.
    pub from_intent: IntentId,
    /// Intent the amount is credited to.
    pub to_intent: IntentId,
    /// Paying account.
    pub from_user: Address,
    /// Receiving account.
    pub to_user: Address,
    /// Asset moved (the paying intent's `asset_in`).
    pub asset: AssetId,
    /// Amount moved.
    pub amount: Amount,
}

/// Unmatched dominant-direction volume, executed externally in one swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetResidual {
    /// Asset sold to the pool.
    pub asset_in: AssetId,
    /// Asset bought from the pool.
    pub asset_out: AssetId,
    /// Total amount of `asset_in` sold.
    pub total_amount: Amount,
}

/// One intent's proportional claim on the external swap output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserShare {
    /// Contributing intent.
    pub intent_id: IntentId,
    /// Account receiving the output.
    pub user: Address,
    /// This intent's residual contribution.
    pub numerator: Amount,
    /// The net residual total.
    pub denominator: Amount,
}

/// How one intent's amount was accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentFill {
    /// The intent.
    pub intent_id: IntentId,
    /// Decrypted amount.
    pub amount: Amount,
    /// Volume netted internally.
    pub matched: Amount,
    /// Volume contributed to the net residual.
    pub residual: Amount,
    /// Volume in a non-dominant direction, neither netted nor executed.
    pub unfilled: Amount,
}

/// The full result of matching one swap batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapSettlement {
    /// Batch being settled.
    pub batch_id: BatchId,
    /// Internal transfer legs in match order.
    pub transfers: Vec<InternalTransfer>,
    /// Dominant-direction residual, if any volume remained.
    pub residual: Option<NetResidual>,
    /// Shares of the residual in canonical order.
    pub shares: Vec<UserShare>,
    /// One fill per non-expired intent, in canonical order.
    pub fills: Vec<IntentFill>,
    /// Intents excluded because their deadline preceded the reference time.
    pub expired: Vec<IntentId>,
    /// Live intents excluded because their amount exceeds their collateral.
    pub rejected: Vec<IntentId>,
}

/// Swap output owed to one intent's submitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Contributing intent.
    pub intent_id: IntentId,
    /// Receiving account.
    pub user: Address,
    /// Amount of the residual's `asset_out`.
    pub amount: Amount,
}

impl SwapSettlement {
    /// `residual.total_amount`, or zero.
    pub fn net_amount(&self) -> Amount {
        self.residual.as_ref().map_or(0, |r| r.total_amount)
    }

    /// The asset distributed to shareholders, if there is a residual.
    pub fn output_asset(&self) -> Option<&AssetId> {
        self.residual.as_ref().map(|r| &r.asset_out)
    }

    /// Intents that appear in the payload (fills, expired, rejected), in order.
    pub fn accounted_intents(&self) -> impl Iterator<Item = &IntentId> {
        self.fills
            .iter()
            .map(|f| &f.intent_id)
            .chain(self.expired.iter())
            .chain(self.rejected.iter())
    }

    /// Amount of its own `asset_in` each filled intent gives up: what it
    /// sends through transfers plus its residual share.
    pub fn spent_by_intent(&self) -> Result<BTreeMap<IntentId, Amount>, MatchingError> {
        let mut spent: BTreeMap<IntentId, Amount> = BTreeMap::new();
        for t in &self.transfers {
            add_to(&mut spent, t.from_intent, t.amount)?;
        }
        for s in &self.shares {
            add_to(&mut spent, s.intent_id, s.numerator)?;
        }
        Ok(spent)
    }

    /// Check the payload's internal accounting.
    ///
    /// This needs no plaintext: it verifies that transfers, shares and
    /// fills agree with each other, so a ledger holding only ciphertext
    /// handles can still refuse a payload that creates or destroys value.
    pub fn check_consistency(&self) -> Result<(), MatchingError> {
        let mut seen: BTreeSet<IntentId> = BTreeSet::new();
        for id in self.accounted_intents() {
            if !seen.insert(*id) {
                return Err(inconsistent(format!("{id} accounted more than once")));
            }
        }

        let mut sent: BTreeMap<IntentId, Amount> = BTreeMap::new();
        let mut received: BTreeMap<IntentId, Amount> = BTreeMap::new();
        for t in &self.transfers {
            if t.amount == 0 {
                return Err(inconsistent(format!("zero-amount transfer from {}", t.from_intent)));
            }
            if t.from_intent == t.to_intent {
                return Err(inconsistent(format!("{} transfers to itself", t.from_intent)));
            }
            add_to(&mut sent, t.from_intent, t.amount)?;
            add_to(&mut received, t.to_intent, t.amount)?;
        }

        let mut share_by_intent: BTreeMap<IntentId, Amount> = BTreeMap::new();
        let mut numerators: Amount = 0;
        for s in &self.shares {
            if share_by_intent.insert(s.intent_id, s.numerator).is_some() {
                return Err(inconsistent(format!("{} holds two shares", s.intent_id)));
            }
            if s.numerator == 0 {
                return Err(inconsistent(format!("{} holds an empty share", s.intent_id)));
            }
            if s.denominator != self.net_amount() {
                return Err(inconsistent(format!(
                    "share denominator {} differs from net residual {}",
                    s.denominator,
                    self.net_amount()
                )));
            }
            numerators = numerators
                .checked_add(s.numerator)
                .ok_or(MatchingError::ArithmeticOverflow { context: "summing shares" })?;
        }
        match &self.residual {
            Some(r) if r.total_amount == 0 => {
                return Err(inconsistent("net residual is zero".to_string()));
            }
            Some(r) if r.asset_in == r.asset_out => {
                return Err(inconsistent("net residual swaps an asset for itself".to_string()));
            }
            None if !self.shares.is_empty() => {
                return Err(inconsistent("shares without a net residual".to_string()));
            }
            _ => {}
        }
        if numerators != self.net_amount() {
            return Err(inconsistent(format!(
                "shares sum to {numerators}, net residual is {}",
                self.net_amount()
            )));
        }

        let fill_ids: BTreeSet<IntentId> = self.fills.iter().map(|f| f.intent_id).collect();
        for id in sent.keys().chain(received.keys()).chain(share_by_intent.keys()) {
            if !fill_ids.contains(id) {
                return Err(inconsistent(format!("{id} is referenced but has no fill")));
            }
        }

        for f in &self.fills {
            let total = f
                .matched
                .checked_add(f.residual)
                .and_then(|v| v.checked_add(f.unfilled))
                .ok_or(MatchingError::ArithmeticOverflow { context: "summing a fill" })?;
            if total != f.amount {
                return Err(inconsistent(format!(
                    "{}: matched {} + residual {} + unfilled {} != amount {}",
                    f.intent_id, f.matched, f.residual, f.unfilled, f.amount
                )));
            }
            let out = sent.get(&f.intent_id).copied().unwrap_or(0);
            let inbound = received.get(&f.intent_id).copied().unwrap_or(0);
            if out != f.matched || inbound != f.matched {
                return Err(inconsistent(format!(
                    "{}: matched {} but sent {out} and received {inbound}",
                    f.intent_id, f.matched
                )));
            }
            let share = share_by_intent.get(&f.intent_id).copied().unwrap_or(0);
            if share != f.residual {
                return Err(inconsistent(format!(
                    "{}: residual {} but share {share}",
                    f.intent_id, f.residual
                )));
            }
        }
        Ok(())
    }
}

/// Split `amount_out` across `shares` by floor division.
///
/// Rounding dust goes to the first share, so the payouts always sum to
/// exactly `amount_out`.
pub fn distribute_output(shares: &[UserShare], amount_out: Amount) -> Result<Vec<Payout>, MatchingError> {
    let mut payouts = Vec::with_capacity(shares.len());
    let mut paid: Amount = 0;
    for s in shares {
        if s.denominator == 0 {
            return Err(inconsistent(format!("{} has a zero denominator", s.intent_id)));
        }
        let portion = u128::from(amount_out) * u128::from(s.numerator) / u128::from(s.denominator);
        let portion = Amount::try_from(portion)
            .map_err(|_| MatchingError::ArithmeticOverflow { context: "distributing output" })?;
        paid = paid
            .checked_add(portion)
            .ok_or(MatchingError::ArithmeticOverflow { context: "distributing output" })?;
        payouts.push(Payout {
            intent_id: s.intent_id,
            user: s.user,
            amount: portion,
        });
    }
    let dust = amount_out
        .checked_sub(paid)
        .ok_or_else(|| inconsistent("share numerators exceed their denominator".to_string()))?;
    if let Some(first) = payouts.first_mut() {
        first.amount += dust;
    }
    Ok(payouts)
}

fn add_to(map: &mut BTreeMap<IntentId, Amount>, id: IntentId, amount: Amount) -> Result<(), MatchingError> {
    let entry = map.entry(id).or_insert(0);
    *entry = entry
        .checked_add(amount)
        .ok_or(MatchingError::ArithmeticOverflow { context: "summing transfers" })?;
    Ok(())
}

fn inconsistent(reason: String) -> MatchingError {
    MatchingError::Inconsistent { reason }
}
