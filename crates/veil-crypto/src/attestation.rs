//! # Settlement Attestations
//!
//! Committee members attest to a settlement by signing its digest. The
//! ledger never inspects signatures itself; it hands them to an
//! [`AttestationVerifier`] and counts the signer addresses that come back.
//!
//! ## Security Invariant
//!
//! A verifier returns each signer at most once no matter how many times
//! its attestation is repeated, so padding a submission with duplicates
//! cannot inflate the count toward the consensus threshold.

use serde::{Deserialize, Serialize};
use veil_core::{Address, CanonicalBytes, ContentDigest};

use crate::ed25519::{verify, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use crate::error::CryptoError;

const ATTESTATION_DOMAIN: &str = "veil/settlement-attestation/v1";

#[derive(Serialize)]
struct AttestationPayload<'a> {
    domain: &'a str,
    digest: &'a ContentDigest,
}

/// The canonical bytes an attester signs for `digest`.
pub fn attestation_payload(digest: &ContentDigest) -> Result<CanonicalBytes, CryptoError> {
    Ok(CanonicalBytes::new(&AttestationPayload {
        domain: ATTESTATION_DOMAIN,
        digest,
    })?)
}

/// One committee member's signature over a settlement digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attestation {
    /// Signing key of the attester.
    pub signer: Ed25519PublicKey,
    /// Signature over [`attestation_payload`].
    pub signature: Ed25519Signature,
}

impl Attestation {
    /// Sign `digest` with `keypair`.
    pub fn sign(keypair: &Ed25519KeyPair, digest: &ContentDigest) -> Result<Self, CryptoError> {
        let payload = attestation_payload(digest)?;
        Ok(Self {
            signer: keypair.public_key(),
            signature: keypair.sign(&payload),
        })
    }

    /// Address of the attester.
    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }
}

/// Threshold-signature verification seam.
pub trait AttestationVerifier: Send + Sync {
    /// Return the distinct addresses whose attestations over `digest` are
    /// valid, in first-seen order. Invalid attestations are dropped.
    fn verified_signers(&self, digest: &ContentDigest, attestations: &[Attestation])
        -> Vec<Address>;
}

/// Verifies each attestation as an individual Ed25519 signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519AttestationVerifier;

impl AttestationVerifier for Ed25519AttestationVerifier {
    fn verified_signers(
        &self,
        digest: &ContentDigest,
        attestations: &[Attestation],
    ) -> Vec<Address> {
        let payload = match attestation_payload(digest) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "attestation payload could not be canonicalized");
                return Vec::new();
            }
        };
        let mut signers: Vec<Address> = Vec::with_capacity(attestations.len());
        for att in attestations {
            let address = att.signer_address();
            if signers.contains(&address) {
                continue;
            }
            match verify(&payload, &att.signature, &att.signer) {
                Ok(()) => signers.push(address),
                Err(e) => {
                    tracing::debug!(signer = %address, error = %e, "dropping invalid attestation");
                }
            }
        }
        signers
    }
}
