//! # Committee Selection Seeds
//!
//! Committee selection is a pure function of a seed. A [`SeedSource`]
//! turns `(batch key, entropy)` into that seed and can later check that a
//! recorded seed really came from those inputs, so an operator process can
//! confirm its own selection without trusting whoever finalized the batch.
//!
//! - [`HashSeedSource`]: domain-separated SHA-256. Anyone can recompute it.
//! - [`SignedSeedSource`]: Ed25519 signature as a VRF. The beacon signs
//!   canonical `(batch key, entropy)`; the seed is the SHA-256 of the
//!   signature. Ed25519 signatures are deterministic, so the beacon cannot
//!   grind for a favourable committee, and the signature is the proof.

use serde::{Deserialize, Serialize};
use veil_core::{sha256_raw, CanonicalBytes, ContentDigest};

use crate::ed25519::{verify, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;

const SEED_DOMAIN: &str = "veil/committee-seed/v1";

/// A selection seed plus whatever proof its source can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSeed {
    /// The 32-byte seed fed to sampling.
    pub seed: ContentDigest,
    /// VRF proof, for sources that produce one.
    pub proof: Option<Ed25519Signature>,
}

/// Injectable, verifiable seed derivation.
pub trait SeedSource: Send + Sync {
    /// Derive the seed for a batch.
    fn derive(&self, batch_key: &str, entropy: &ContentDigest) -> Result<SelectionSeed, CryptoError>;

    /// Check that `seed` is the one this source derives for the inputs.
    fn verify(
        &self,
        batch_key: &str,
        entropy: &ContentDigest,
        seed: &SelectionSeed,
    ) -> Result<(), CryptoError>;
}

#[derive(Serialize)]
struct SeedInput<'a> {
    domain: &'a str,
    batch_key: &'a str,
    entropy: &'a ContentDigest,
}

fn seed_input(batch_key: &str, entropy: &ContentDigest) -> Result<CanonicalBytes, CryptoError> {
    Ok(CanonicalBytes::new(&SeedInput {
        domain: SEED_DOMAIN,
        batch_key,
        entropy,
    })?)
}

// ── Hash source ─────────────────────────────────────────────────────

/// Seed = SHA-256 of canonical `(domain, batch key, entropy)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashSeedSource;

impl SeedSource for HashSeedSource {
    fn derive(&self, batch_key: &str, entropy: &ContentDigest) -> Result<SelectionSeed, CryptoError> {
        let input = seed_input(batch_key, entropy)?;
        Ok(SelectionSeed {
            seed: veil_core::sha256_digest(&input),
            proof: None,
        })
    }

    fn verify(
        &self,
        batch_key: &str,
        entropy: &ContentDigest,
        seed: &SelectionSeed,
    ) -> Result<(), CryptoError> {
        let expected = self.derive(batch_key, entropy)?;
        if expected.seed != seed.seed {
            return Err(CryptoError::VerificationFailed(format!(
                "seed mismatch for {batch_key}"
            )));
        }
        Ok(())
    }
}

// ── Signature VRF source ────────────────────────────────────────────

/// Seed = SHA-256 of the beacon's Ed25519 signature over the seed input.
#[derive(Debug)]
pub struct SignedSeedSource {
    beacon: Ed25519PublicKey,
    keypair: Option<Ed25519KeyPair>,
}

impl SignedSeedSource {
    /// A source that can derive and verify.
    pub fn new(keypair: Ed25519KeyPair) -> Self {
        Self {
            beacon: keypair.public_key(),
            keypair: Some(keypair),
        }
    }

    /// A source that only verifies seeds published by `beacon`.
    pub fn verifier(beacon: Ed25519PublicKey) -> Self {
        Self {
            beacon,
            keypair: None,
        }
    }

    /// The beacon's public key.
    pub fn beacon(&self) -> Ed25519PublicKey {
        self.beacon
    }
}

impl SeedSource for SignedSeedSource {
    fn derive(&self, batch_key: &str, entropy: &ContentDigest) -> Result<SelectionSeed, CryptoError> {
        let keypair = self.keypair.as_ref().ok_or_else(|| {
            CryptoError::SeedUnavailable("verifier-only source has no beacon key".to_string())
        })?;
        let signature = keypair.sign(&seed_input(batch_key, entropy)?);
        Ok(SelectionSeed {
            seed: sha256_raw(&[&signature.as_bytes()[..]]),
            proof: Some(signature),
        })
    }

    fn verify(
        &self,
        batch_key: &str,
        entropy: &ContentDigest,
        seed: &SelectionSeed,
    ) -> Result<(), CryptoError> {
        let proof = seed.proof.ok_or_else(|| {
            CryptoError::VerificationFailed("signed seed carries no proof".to_string())
        })?;
        verify(&seed_input(batch_key, entropy)?, &proof, &self.beacon)?;
        if sha256_raw(&[&proof.as_bytes()[..]]) != seed.seed {
            return Err(CryptoError::VerificationFailed(
                "seed is not the hash of its proof".to_string(),
            ));
        }
        Ok(())
    }
}
