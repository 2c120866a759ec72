//! # Settlement Digest
//!
//! The value committee members sign. It commits to
//! `(batch_id, net_amount, asset_in, asset_out, output_asset)` directly and
//! to the transfer, share, fill, expired and rejected lists through their own
//! canonical digests, so two members agree on the digest only if they
//! agree on every leg of the settlement.

use serde::Serialize;
use veil_core::{sha256_digest, Amount, AssetId, BatchId, CanonicalBytes, ContentDigest};

use crate::error::MatchingError;
use crate::settlement::SwapSettlement;

const SETTLEMENT_DOMAIN: &str = "veil/swap-settlement/v1";

#[derive(Serialize)]
struct SettlementCommitment<'a> {
    domain: &'static str,
    batch_id: BatchId,
    net_amount: Amount,
    asset_in: Option<&'a AssetId>,
    asset_out: Option<&'a AssetId>,
    output_asset: Option<&'a AssetId>,
    transfers: ContentDigest,
    shares: ContentDigest,
    fills: ContentDigest,
    expired: ContentDigest,
    rejected: ContentDigest,
}

fn list_digest<T: Serialize>(items: &T) -> Result<ContentDigest, MatchingError> {
    Ok(sha256_digest(&CanonicalBytes::new(items)?))
}

/// Canonical digest of a swap settlement.
pub fn settlement_digest(settlement: &SwapSettlement) -> Result<ContentDigest, MatchingError> {
    let residual = settlement.residual.as_ref();
    let commitment = SettlementCommitment {
        domain: SETTLEMENT_DOMAIN,
        batch_id: settlement.batch_id,
        net_amount: settlement.net_amount(),
        asset_in: residual.map(|r| &r.asset_in),
        asset_out: residual.map(|r| &r.asset_out),
        output_asset: settlement.output_asset(),
        transfers: list_digest(&settlement.transfers)?,
        shares: list_digest(&settlement.shares)?,
        fills: list_digest(&settlement.fills)?,
        expired: list_digest(&settlement.expired)?,
        rejected: list_digest(&settlement.rejected)?,
    };
    list_digest(&commitment)
}
