//! # Matching Engine
//!
//! Nets opposing intents of one batch against each other so that only the
//! leftover volume of a single direction ever reaches the external pool.
//!
//! ## Algorithm
//!
//! Intents are processed in canonical (submission) order. There is one book
//! per directed pair, so `X→Y` and `Y→X` are distinct books.
//!
//! 1. Intents whose deadline precedes the reference time are excluded and
//!    reported as expired. Intents whose decrypted amount exceeds their
//!    public collateral are excluded and reported as rejected.
//! 2. For each remaining intent, while it has volume and the opposite book
//!    has entries, take the most recently queued opposite entry, match
//!    `min(current, queued)`, emit one transfer per leg and push the
//!    opposite entry back if it still has volume.
//! 3. Whatever the current intent has left is queued on its own book.
//! 4. The dominant direction is the first direction, in order of first
//!    appearance, whose book still holds volume. Its entries become the
//!    net residual and its shares; volume in any other book is reported as
//!    unfilled on the owning intent's fill.
//!
//! ## Determinism
//!
//! Committee members run this independently and sign the result. Books
//! are `BTreeMap`s keyed by asset pair, iteration follows canonical order,
//! and no hashing, randomness or wall-clock time is involved, so identical
//! input yields byte-identical output.

use std::collections::{BTreeMap, BTreeSet};

use veil_core::{Amount, AssetId, BatchId, IntentId, Timestamp};

use crate::error::MatchingError;
use crate::settlement::{
    DecryptedIntent, IntentFill, InternalTransfer, NetResidual, SwapSettlement, UserShare,
};

type Direction = (AssetId, AssetId);

#[derive(Debug, Clone, Copy)]
struct BookEntry {
    index: usize,
    remaining: Amount,
}

/// Collects one batch's decrypted intents and nets them.
#[derive(Debug)]
pub struct MatchingEngine {
    batch_id: BatchId,
    reference_time: Timestamp,
    intents: Vec<DecryptedIntent>,
    seen: BTreeSet<IntentId>,
}

impl MatchingEngine {
    /// Engine for `batch_id`, excluding intents whose deadline precedes
    /// `reference_time`.
    pub fn new(batch_id: BatchId, reference_time: Timestamp) -> Self {
        Self {
            batch_id,
            reference_time,
            intents: Vec::new(),
            seen: BTreeSet::new(),
        }
    }

    /// Append the next intent in canonical order.
    pub fn add_intent(&mut self, intent: DecryptedIntent) -> Result<(), MatchingError> {
        if intent.asset_in == intent.asset_out {
            return Err(MatchingError::SameAsset(intent.intent_id));
        }
        if !self.seen.insert(intent.intent_id) {
            return Err(MatchingError::DuplicateIntent(intent.intent_id));
        }
        self.intents.push(intent);
        Ok(())
    }

    /// Number of intents added.
    pub fn intent_count(&self) -> usize {
        self.intents.len()
    }

    /// Net the batch.
    pub fn run(&self) -> Result<SwapSettlement, MatchingError> {
        let mut expired = Vec::new();
        let mut rejected = Vec::new();
        let mut live: Vec<usize> = Vec::with_capacity(self.intents.len());
        for (index, intent) in self.intents.iter().enumerate() {
            if intent.deadline < self.reference_time {
                expired.push(intent.intent_id);
            } else if intent.amount > intent.collateral {
                rejected.push(intent.intent_id);
            } else {
                live.push(index);
            }
        }

        let mut books: BTreeMap<Direction, Vec<BookEntry>> = BTreeMap::new();
        let mut first_seen: Vec<Direction> = Vec::new();
        let mut matched: Vec<Amount> = vec![0; self.intents.len()];
        let mut transfers = Vec::new();

        for &index in &live {
            let intent = &self.intents[index];
            let own: Direction = (intent.asset_in.clone(), intent.asset_out.clone());
            let opposite: Direction = (intent.asset_out.clone(), intent.asset_in.clone());
            if !first_seen.contains(&own) {
                first_seen.push(own.clone());
            }

            let mut remaining = intent.amount;
            while remaining > 0 {
                let Some(mut queued) = books.get_mut(&opposite).and_then(Vec::pop) else {
                    break;
                };
                let counter = &self.intents[queued.index];
                let amount = remaining.min(queued.remaining);

                transfers.push(InternalTransfer {
                    from_intent: intent.intent_id,
                    to_intent: counter.intent_id,
                    from_user: intent.submitter,
                    to_user: counter.submitter,
                    asset: intent.asset_in.clone(),
                    amount,
                });
                transfers.push(InternalTransfer {
                    from_intent: counter.intent_id,
                    to_intent: intent.intent_id,
                    from_user: counter.submitter,
                    to_user: intent.submitter,
                    asset: counter.asset_in.clone(),
                    amount,
                });

                remaining -= amount;
                queued.remaining -= amount;
                matched[index] += amount;
                matched[queued.index] += amount;
                if queued.remaining > 0 {
                    books.entry(opposite.clone()).or_default().push(queued);
                }
            }
            if remaining > 0 {
                books.entry(own).or_default().push(BookEntry { index, remaining });
            }
        }

        let dominant = first_seen
            .iter()
            .find(|dir| books.get(*dir).is_some_and(|b| !b.is_empty()))
            .cloned();

        let mut residual_of: Vec<Amount> = vec![0; self.intents.len()];
        let mut unfilled_of: Vec<Amount> = vec![0; self.intents.len()];
        for (dir, book) in &books {
            let is_dominant = dominant.as_ref() == Some(dir);
            for entry in book {
                if is_dominant {
                    residual_of[entry.index] = entry.remaining;
                } else {
                    unfilled_of[entry.index] = entry.remaining;
                }
            }
        }

        let (residual, shares) = match dominant {
            Some((asset_in, asset_out)) => {
                let total = live
                    .iter()
                    .try_fold(0, |acc: Amount, &i| acc.checked_add(residual_of[i]))
                    .ok_or(MatchingError::ArithmeticOverflow {
                        context: "summing the net residual",
                    })?;
                let shares: Vec<UserShare> = live
                    .iter()
                    .filter(|&&i| residual_of[i] > 0)
                    .map(|&i| UserShare {
                        intent_id: self.intents[i].intent_id,
                        user: self.intents[i].submitter,
                        numerator: residual_of[i],
                        denominator: total,
                    })
                    .collect();
                let residual = NetResidual {
                    asset_in,
                    asset_out,
                    total_amount: total,
                };
                (Some(residual), shares)
            }
            None => (None, Vec::new()),
        };

        let fills = live
            .iter()
            .map(|&i| IntentFill {
                intent_id: self.intents[i].intent_id,
                amount: self.intents[i].amount,
                matched: matched[i],
                residual: residual_of[i],
                unfilled: unfilled_of[i],
            })
            .collect();

        let settlement = SwapSettlement {
            batch_id: self.batch_id,
            transfers,
            residual,
            shares,
            fills,
            expired,
            rejected,
        };
        tracing::debug!(
            batch_id = %self.batch_id,
            intents = self.intents.len(),
            expired = settlement.expired.len(),
            rejected = settlement.rejected.len(),
            transfers = settlement.transfers.len(),
            net_amount = settlement.net_amount(),
            "batch matched"
        );
        Ok(settlement)
    }
}

/// Match `intents` (canonical order) for `batch_id` at `reference_time`.
pub fn match_batch(
    batch_id: BatchId,
    reference_time: Timestamp,
    intents: impl IntoIterator<Item = DecryptedIntent>,
) -> Result<SwapSettlement, MatchingError> {
    let mut engine = MatchingEngine::new(batch_id, reference_time);
    for intent in intents {
        engine.add_intent(intent)?;
    }
    engine.run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_core::{sha256_raw, Address, CanonicalBytes};

    fn asset(s: &str) -> AssetId {
        AssetId::new(s).unwrap()
    }

    fn at(secs: i64) -> Timestamp {
        Timestamp::from_epoch_secs(secs).unwrap()
    }

    fn intent(tag: &str, from: &str, to: &str, amount: Amount) -> DecryptedIntent {
        DecryptedIntent {
            intent_id: IntentId(sha256_raw(&[tag.as_bytes()])),
            submitter: Address::derive(tag.as_bytes()),
            asset_in: asset(from),
            asset_out: asset(to),
            amount,
            collateral: amount,
            deadline: at(10_000),
        }
    }

    fn worked_example() -> Vec<DecryptedIntent> {
        vec![
            intent("A", "X", "Y", 12_000),
            intent("B", "Y", "X", 7_500),
            intent("C", "X", "Y", 4_000),
            intent("D", "Y", "X", 1_200),
        ]
    }

    #[test]
    fn worked_example_nets_to_expected_residual() {
        let intents = worked_example();
        let s = match_batch(BatchId(1), at(1_000), intents.clone()).unwrap();

        let pairs: Vec<(IntentId, IntentId, Amount)> = s
            .transfers
            .iter()
            .map(|t| (t.from_intent, t.to_intent, t.amount))
            .collect();
        let (a, b, c, d) = (
            intents[0].intent_id,
            intents[1].intent_id,
            intents[2].intent_id,
            intents[3].intent_id,
        );
        assert_eq!(
            pairs,
            vec![(b, a, 7_500), (a, b, 7_500), (d, c, 1_200), (c, d, 1_200)]
        );
        assert_eq!(s.transfers[0].asset, asset("Y"));
        assert_eq!(s.transfers[1].asset, asset("X"));

        let residual = s.residual.clone().unwrap();
        assert_eq!(residual.asset_in, asset("X"));
        assert_eq!(residual.asset_out, asset("Y"));
        assert_eq!(residual.total_amount, 7_300);

        let shares: Vec<(IntentId, Amount, Amount)> = s
            .shares
            .iter()
            .map(|sh| (sh.intent_id, sh.numerator, sh.denominator))
            .collect();
        assert_eq!(shares, vec![(a, 4_500, 7_300), (c, 2_800, 7_300)]);
        assert!(s.expired.is_empty());
        assert_eq!(s.check_consistency(), Ok(()));
    }

    #[test]
    fn expired_intents_never_match() {
        let mut intents = worked_example();
        intents[1].deadline = at(999);
        let s = match_batch(BatchId(1), at(1_000), intents.clone()).unwrap();
        let b = intents[1].intent_id;
        assert_eq!(s.expired, vec![b]);
        assert!(s.transfers.iter().all(|t| t.from_intent != b && t.to_intent != b));
        assert!(s.shares.iter().all(|sh| sh.intent_id != b));
        assert!(s.fills.iter().all(|f| f.intent_id != b));
        // A and C minus D's 1,200 against C.
        assert_eq!(s.net_amount(), 12_000 + 4_000 - 1_200);
    }

    #[test]
    fn amount_above_collateral_is_rejected_and_rest_still_nets() {
        let mut intents = worked_example();
        intents[3].collateral = 1_000;
        let s = match_batch(BatchId(1), at(1_000), intents.clone()).unwrap();
        let d = intents[3].intent_id;
        assert_eq!(s.rejected, vec![d]);
        assert!(s.expired.is_empty());
        assert!(s.accounted_intents().filter(|id| **id == d).count() == 1);
        assert!(s.transfers.iter().all(|t| t.from_intent != d && t.to_intent != d));
        assert_eq!(s.net_amount(), 12_000 + 4_000 - 7_500);
        assert_eq!(s.check_consistency(), Ok(()));
    }

    #[test]
    fn deadline_equal_to_reference_is_live() {
        let mut intents = worked_example();
        intents[0].deadline = at(1_000);
        let s = match_batch(BatchId(1), at(1_000), intents).unwrap();
        assert!(s.expired.is_empty());
    }

    #[test]
    fn perfectly_balanced_book_has_no_residual() {
        let intents = vec![intent("A", "X", "Y", 500), intent("B", "Y", "X", 500)];
        let s = match_batch(BatchId(2), at(0), intents).unwrap();
        assert!(s.residual.is_none());
        assert!(s.shares.is_empty());
        assert_eq!(s.transfers.len(), 2);
        assert_eq!(s.check_consistency(), Ok(()));
    }

    #[test]
    fn one_intent_consumes_several_opposites() {
        let intents = vec![
            intent("A", "X", "Y", 100),
            intent("B", "X", "Y", 200),
            intent("C", "Y", "X", 250),
        ];
        let s = match_batch(BatchId(3), at(0), intents.clone()).unwrap();
        // C takes B (most recent) first, then 50 from A.
        assert_eq!(s.transfers[0].to_intent, intents[1].intent_id);
        assert_eq!(s.transfers[0].amount, 200);
        assert_eq!(s.transfers[2].to_intent, intents[0].intent_id);
        assert_eq!(s.transfers[2].amount, 50);
        assert_eq!(s.net_amount(), 50);
        assert_eq!(s.shares[0].intent_id, intents[0].intent_id);
    }

    #[test]
    fn non_dominant_volume_is_unfilled() {
        let intents = vec![
            intent("A", "X", "Y", 100),
            intent("B", "Z", "W", 40),
            intent("C", "Y", "X", 30),
        ];
        let s = match_batch(BatchId(4), at(0), intents.clone()).unwrap();
        let residual = s.residual.clone().unwrap();
        assert_eq!((residual.asset_in.as_str(), residual.total_amount), ("X", 70));
        let b_fill = s.fills.iter().find(|f| f.intent_id == intents[1].intent_id).unwrap();
        assert_eq!((b_fill.matched, b_fill.residual, b_fill.unfilled), (0, 0, 40));
        assert_eq!(s.check_consistency(), Ok(()));
    }

    #[test]
    fn dominant_follows_first_appearance_not_volume() {
        let intents = vec![intent("A", "Z", "W", 1), intent("B", "X", "Y", 1_000)];
        let s = match_batch(BatchId(5), at(0), intents).unwrap();
        assert_eq!(s.residual.unwrap().asset_in, asset("Z"));
    }

    #[test]
    fn duplicate_and_self_swap_rejected() {
        let mut engine = MatchingEngine::new(BatchId(1), at(0));
        engine.add_intent(intent("A", "X", "Y", 1)).unwrap();
        assert!(matches!(
            engine.add_intent(intent("A", "X", "Y", 1)),
            Err(MatchingError::DuplicateIntent(_))
        ));
        assert!(matches!(
            engine.add_intent(intent("B", "X", "X", 1)),
            Err(MatchingError::SameAsset(_))
        ));
        assert_eq!(engine.intent_count(), 1);
    }

    #[test]
    fn repeated_runs_are_byte_identical() {
        let a = match_batch(BatchId(9), at(0), worked_example()).unwrap();
        let b = match_batch(BatchId(9), at(0), worked_example()).unwrap();
        assert_eq!(
            CanonicalBytes::new(&a).unwrap(),
            CanonicalBytes::new(&b).unwrap()
        );
    }
}
