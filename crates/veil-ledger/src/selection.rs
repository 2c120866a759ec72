//! # Operator Selection
//!
//! Draws the committee that may decrypt and settle a batch.
//!
//! ## Algorithm
//!
//! Given a 32-byte seed and a pool of `n` registered operators (in
//! registration order), draw `k = committee_size` distinct members. Draw
//! `i` hashes `sha256(seed ‖ i)` with `i` as 8 bytes big-endian, reduces the
//! first 8 bytes of the hash (big-endian) modulo `n`, and probes forward
//! past indices already chosen. If `n ≤ k` the whole pool is the committee.
//!
//! ## Security Invariant
//!
//! The committee is a pure function of `(seed, pool, k)`. The seed is a
//! pure function of `(batch key, entropy)` under the configured
//! [`SeedSource`], and both are published in the finalization event, so
//! any process holding the operator list can re-run selection with
//! [`verify_committee`].

use serde::{Deserialize, Serialize};
use veil_core::{sha256_raw, Address, ContentDigest, VeilError};
use veil_crypto::{Ed25519PublicKey, SeedSource};

use crate::events::SelectionEvidence;

/// A registered operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorInfo {
    /// Ledger identity.
    pub address: Address,
    /// Key its attestations and decrypt authorizations verify under.
    pub public_key: Ed25519PublicKey,
}

/// Operators in registration order. Registration is append-only.
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    operators: Vec<OperatorInfo>,
}

impl OperatorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `public_key`. Rejects a key registered twice.
    pub fn register(&mut self, public_key: Ed25519PublicKey) -> Result<Address, VeilError> {
        let address = public_key.address();
        if self.contains(&address) {
            return Err(VeilError::Validation(format!(
                "operator {address} is already registered"
            )));
        }
        self.operators.push(OperatorInfo {
            address,
            public_key,
        });
        Ok(address)
    }

    /// Whether `address` is a registered operator.
    pub fn contains(&self, address: &Address) -> bool {
        self.operators.iter().any(|o| o.address == *address)
    }

    /// Number of registered operators.
    pub fn len(&self) -> usize {
        self.operators.len()
    }

    /// Whether no operator is registered.
    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Registered operators, in registration order.
    pub fn operators(&self) -> &[OperatorInfo] {
        &self.operators
    }

    /// Addresses of the first `n` registered operators.
    pub fn pool(&self, n: usize) -> Vec<Address> {
        self.operators.iter().take(n).map(|o| o.address).collect()
    }
}

/// Draw `size` distinct members of `pool` from `seed`.
pub fn select_committee(pool: &[Address], seed: &ContentDigest, size: usize) -> Vec<Address> {
    let n = pool.len();
    if n <= size {
        return pool.to_vec();
    }
    let mut chosen = vec![false; n];
    let mut committee = Vec::with_capacity(size);
    for i in 0..size as u64 {
        let h = sha256_raw(&[&seed.as_bytes()[..], &i.to_be_bytes()[..]]);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&h.as_bytes()[..8]);
        let mut index = (u64::from_be_bytes(prefix) % n as u64) as usize;
        while chosen[index] {
            index = (index + 1) % n;
        }
        chosen[index] = true;
        committee.push(pool[index]);
    }
    committee
}

/// Re-derive a published committee and compare.
///
/// `registry` must hold at least `evidence.operator_pool_size` operators;
/// the committee was drawn from that prefix.
pub fn verify_committee(
    seed_source: &dyn SeedSource,
    registry: &OperatorRegistry,
    evidence: &SelectionEvidence,
    committee_size: usize,
    committee: &[Address],
) -> Result<(), VeilError> {
    seed_source.verify(&evidence.batch_key, &evidence.entropy, &evidence.seed)?;
    if registry.len() < evidence.operator_pool_size {
        return Err(VeilError::Validation(format!(
            "registry holds {} operators, selection used {}",
            registry.len(),
            evidence.operator_pool_size
        )));
    }
    let pool = registry.pool(evidence.operator_pool_size);
    let expected = select_committee(&pool, &evidence.seed.seed, committee_size);
    if expected != committee {
        return Err(VeilError::Validation(format!(
            "committee for {} does not match its selection evidence",
            evidence.batch_key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_crypto::{Ed25519KeyPair, HashSeedSource, SelectionSeed};

    fn registry(n: u8) -> OperatorRegistry {
        let mut reg = OperatorRegistry::new();
        for i in 0..n {
            reg.register(Ed25519KeyPair::from_seed(&[i + 1; 32]).public_key()).unwrap();
        }
        reg
    }

    fn seed(byte: u8) -> ContentDigest {
        ContentDigest([byte; 32])
    }

    #[test]
    fn committee_is_distinct_and_sized() {
        let reg = registry(10);
        let committee = select_committee(&reg.pool(10), &seed(7), 4);
        assert_eq!(committee.len(), 4);
        let mut dedup = committee.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 4);
        assert!(committee.iter().all(|a| reg.contains(a)));
    }

    #[test]
    fn same_seed_same_committee() {
        let reg = registry(10);
        let a = select_committee(&reg.pool(10), &seed(7), 3);
        let b = select_committee(&reg.pool(10), &seed(7), 3);
        assert_eq!(a, b);
        let other = (0u8..16)
            .map(|s| select_committee(&reg.pool(10), &seed(s), 3))
            .any(|c| c != a);
        assert!(other);
    }

    #[test]
    fn small_pool_selected_entirely() {
        let reg = registry(2);
        assert_eq!(select_committee(&reg.pool(2), &seed(1), 3), reg.pool(2));
    }

    #[test]
    fn full_draw_probes_past_collisions() {
        let reg = registry(5);
        let mut committee = select_committee(&reg.pool(5), &seed(3), 4);
        committee.sort();
        committee.dedup();
        assert_eq!(committee.len(), 4);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut reg = registry(1);
        let key = Ed25519KeyPair::from_seed(&[1; 32]).public_key();
        assert!(matches!(reg.register(key), Err(VeilError::Validation(_))));
    }

    #[test]
    fn verification_reruns_selection() {
        let reg = registry(6);
        let source = HashSeedSource;
        let entropy = seed(9);
        let derived: SelectionSeed = source.derive("swap:1", &entropy).unwrap();
        let evidence = SelectionEvidence {
            batch_key: "swap:1".to_string(),
            entropy,
            seed: derived,
            operator_pool_size: 6,
        };
        let committee = select_committee(&reg.pool(6), &derived.seed, 3);
        verify_committee(&source, &reg, &evidence, 3, &committee).unwrap();

        let mut tampered = committee.clone();
        tampered.reverse();
        assert!(verify_committee(&source, &reg, &evidence, 3, &tampered).is_err());

        let forged = SelectionEvidence {
            seed: SelectionSeed { seed: seed(1), proof: None },
            ..evidence
        };
        assert!(verify_committee(&source, &reg, &forged, 3, &committee).is_err());
    }
}
