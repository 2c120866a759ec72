//! # Exchange Pool
//!
//! The single external swap a settled batch performs for its net residual.
//! [`ConstantProductPool`] is an `x · y = k` reference pool over any number
//! of asset pairs.

use std::collections::BTreeMap;

use thiserror::Error;
use veil_core::{Amount, AssetId, PoolKey, VeilError};

/// Errors from an exchange pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    /// No liquidity for the pair.
    #[error("no pool for {asset_in} -> {asset_out}")]
    UnknownPair {
        /// Asset sold.
        asset_in: AssetId,
        /// Asset bought.
        asset_out: AssetId,
    },

    /// Swapping zero is not a trade.
    #[error("swap amount must be positive")]
    ZeroAmount,

    /// The trade would return nothing or drain the pool.
    #[error("insufficient liquidity for {amount_in} {asset_in}")]
    InsufficientLiquidity {
        /// Asset sold.
        asset_in: AssetId,
        /// Amount sold.
        amount_in: Amount,
    },

    /// Reserves would overflow.
    #[error("reserve overflow on {0}")]
    Overflow(PoolKey),
}

impl From<ExchangeError> for VeilError {
    fn from(e: ExchangeError) -> Self {
        VeilError::Execution(e.to_string())
    }
}

/// External exchange seam.
pub trait ExchangePool: Send + Sync {
    /// Output for selling `amount_in` of `asset_in`, without trading.
    fn quote(&self, amount_in: Amount, asset_in: &AssetId, asset_out: &AssetId)
        -> Result<Amount, ExchangeError>;

    /// Sell `amount_in` of `asset_in` for `asset_out`. Returns the output,
    /// which equals what [`quote`](Self::quote) returned for the same
    /// arguments on the same reserves. On error the pool is unchanged.
    fn swap(
        &mut self,
        amount_in: Amount,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<Amount, ExchangeError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reserves {
    low: Amount,
    high: Amount,
}

/// Constant-product reference pool.
#[derive(Debug, Clone, Default)]
pub struct ConstantProductPool {
    pairs: BTreeMap<PoolKey, Reserves>,
    fee_bps: u32,
}

impl ConstantProductPool {
    /// An empty pool set with no fee.
    pub fn new() -> Self {
        Self::default()
    }

    /// Charge `fee_bps` basis points on the input (capped at 100%).
    pub fn with_fee_bps(mut self, fee_bps: u32) -> Self {
        self.fee_bps = fee_bps.min(10_000);
        self
    }

    /// Add liquidity for the pair `(a, b)`.
    pub fn add_liquidity(
        &mut self,
        a: &AssetId,
        reserve_a: Amount,
        b: &AssetId,
        reserve_b: Amount,
    ) -> Result<(), ExchangeError> {
        let key = PoolKey::new(a, b);
        let (add_low, add_high) = if *a == key.low {
            (reserve_a, reserve_b)
        } else {
            (reserve_b, reserve_a)
        };
        let entry = self.pairs.entry(key.clone()).or_insert(Reserves { low: 0, high: 0 });
        entry.low = entry
            .low
            .checked_add(add_low)
            .ok_or_else(|| ExchangeError::Overflow(key.clone()))?;
        entry.high = entry
            .high
            .checked_add(add_high)
            .ok_or(ExchangeError::Overflow(key))?;
        Ok(())
    }

    /// Current reserves of `(a, b)`, in that order.
    pub fn reserves(&self, a: &AssetId, b: &AssetId) -> Option<(Amount, Amount)> {
        let key = PoolKey::new(a, b);
        let r = self.pairs.get(&key)?;
        Some(if *a == key.low { (r.low, r.high) } else { (r.high, r.low) })
    }

    fn compute(
        &self,
        amount_in: Amount,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<(PoolKey, Reserves, Amount), ExchangeError> {
        if amount_in == 0 {
            return Err(ExchangeError::ZeroAmount);
        }
        let unknown = || ExchangeError::UnknownPair {
            asset_in: asset_in.clone(),
            asset_out: asset_out.clone(),
        };
        if asset_in == asset_out {
            return Err(unknown());
        }
        let key = PoolKey::new(asset_in, asset_out);
        let reserves = *self.pairs.get(&key).ok_or_else(unknown)?;
        let selling_low = *asset_in == key.low;
        let (reserve_in, reserve_out) = if selling_low {
            (reserves.low, reserves.high)
        } else {
            (reserves.high, reserves.low)
        };

        let effective_in = u128::from(amount_in) * u128::from(10_000 - self.fee_bps) / 10_000;
        let out = u128::from(reserve_out) * effective_in / (u128::from(reserve_in) + effective_in).max(1);
        let out = Amount::try_from(out).map_err(|_| ExchangeError::Overflow(key.clone()))?;
        if out == 0 || out >= reserve_out {
            return Err(ExchangeError::InsufficientLiquidity {
                asset_in: asset_in.clone(),
                amount_in,
            });
        }
        let new_in = reserve_in
            .checked_add(amount_in)
            .ok_or_else(|| ExchangeError::Overflow(key.clone()))?;
        let new_out = reserve_out - out;
        let updated = if selling_low {
            Reserves { low: new_in, high: new_out }
        } else {
            Reserves { low: new_out, high: new_in }
        };
        Ok((key, updated, out))
    }
}

impl ExchangePool for ConstantProductPool {
    fn quote(
        &self,
        amount_in: Amount,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<Amount, ExchangeError> {
        self.compute(amount_in, asset_in, asset_out).map(|(_, _, out)| out)
    }

    fn swap(
        &mut self,
        amount_in: Amount,
        asset_in: &AssetId,
        asset_out: &AssetId,
    ) -> Result<Amount, ExchangeError> {
        let (key, updated, out) = self.compute(amount_in, asset_in, asset_out)?;
        self.pairs.insert(key, updated);
        tracing::debug!(%asset_in, %asset_out, amount_in, amount_out = out, "pool swap");
        Ok(out)
    }
}
