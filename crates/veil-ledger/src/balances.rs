//! # Custodial Balances
//!
//! Per-user, per-asset balances held by the ledger. Settlement applies
//! transfers, residual debits and payouts to a scratch copy and commits it
//! only when every leg succeeded.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use veil_core::{Address, Amount, AssetId};

/// A balance move that cannot be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    /// Debit larger than the balance.
    #[error("{user} holds {balance} {asset}, needs {required}")]
    Insufficient {
        /// Account debited.
        user: Address,
        /// Asset debited.
        asset: AssetId,
        /// Current balance.
        balance: Amount,
        /// Requested debit.
        required: Amount,
    },

    /// Credit would overflow.
    #[error("{user} balance of {asset} would overflow")]
    Overflow {
        /// Account credited.
        user: Address,
        /// Asset credited.
        asset: AssetId,
    },
}

/// Balance table keyed by `(user, asset)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceBook {
    balances: BTreeMap<Address, BTreeMap<AssetId, Amount>>,
}

impl BalanceBook {
    /// An empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance, zero if never credited.
    pub fn balance(&self, user: &Address, asset: &AssetId) -> Amount {
        self.balances
            .get(user)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }

    /// Add `amount` to `user`'s balance of `asset`.
    pub fn credit(&mut self, user: Address, asset: &AssetId, amount: Amount) -> Result<(), BalanceError> {
        let slot = self
            .balances
            .entry(user)
            .or_default()
            .entry(asset.clone())
            .or_insert(0);
        *slot = slot.checked_add(amount).ok_or_else(|| BalanceError::Overflow {
            user,
            asset: asset.clone(),
        })?;
        Ok(())
    }

    /// Remove `amount` from `user`'s balance of `asset`.
    pub fn debit(&mut self, user: Address, asset: &AssetId, amount: Amount) -> Result<(), BalanceError> {
        let balance = self.balance(&user, asset);
        if balance < amount {
            return Err(BalanceError::Insufficient {
                user,
                asset: asset.clone(),
                balance,
                required: amount,
            });
        }
        if let Some(slot) = self.balances.get_mut(&user).and_then(|a| a.get_mut(asset)) {
            *slot -= amount;
        }
        Ok(())
    }

    /// Move `amount` of `asset` from `from` to `to`.
    pub fn transfer(
        &mut self,
        from: Address,
        to: Address,
        asset: &AssetId,
        amount: Amount,
    ) -> Result<(), BalanceError> {
        self.debit(from, asset, amount)?;
        self.credit(to, asset, amount)
    }

    /// Sum of every balance of `asset`.
    pub fn total(&self, asset: &AssetId) -> u128 {
        self.balances
            .values()
            .filter_map(|assets| assets.get(asset))
            .map(|v| u128::from(*v))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> AssetId {
        AssetId::new("USD").unwrap()
    }

    #[test]
    fn transfer_moves_value() {
        let mut book = BalanceBook::new();
        let (a, b) = (Address([1; 20]), Address([2; 20]));
        book.credit(a, &usd(), 100).unwrap();
        book.transfer(a, b, &usd(), 40).unwrap();
        assert_eq!(book.balance(&a, &usd()), 60);
        assert_eq!(book.balance(&b, &usd()), 40);
        assert_eq!(book.total(&usd()), 100);
    }

    #[test]
    fn overdraft_rejected_without_change() {
        let mut book = BalanceBook::new();
        let a = Address([1; 20]);
        book.credit(a, &usd(), 10).unwrap();
        let before = book.clone();
        assert!(matches!(
            book.transfer(a, Address([2; 20]), &usd(), 11),
            Err(BalanceError::Insufficient { balance: 10, required: 11, .. })
        ));
        assert_eq!(book, before);
    }

    #[test]
    fn credit_overflow_rejected() {
        let mut book = BalanceBook::new();
        let a = Address([1; 20]);
        book.credit(a, &usd(), u64::MAX).unwrap();
        assert!(matches!(book.credit(a, &usd(), 1), Err(BalanceError::Overflow { .. })));
    }
}
