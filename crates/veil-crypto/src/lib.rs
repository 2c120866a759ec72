//! # veil-crypto: Cryptographic Primitives
//!
//! - **Ed25519** operator keys. Signing input is always `&CanonicalBytes`.
//! - **Attestations**: a committee member's signature over a settlement
//!   digest, checked through the pluggable [`AttestationVerifier`] so the
//!   signature scheme can be swapped (e.g. for aggregate signatures)
//!   without touching the ledger.
//! - **Seed sources** for committee selection: a plain hash source and an
//!   Ed25519-signature VRF whose output anyone can verify against the
//!   beacon's public key.
//!
//! ## Crate Policy
//!
//! - Depends only on `veil-core` internally.
//! - No mocked cryptography in tests: real Ed25519, real SHA-256.

pub mod attestation;
pub mod ed25519;
pub mod error;
pub mod seed;

pub use attestation::{
    attestation_payload, Attestation, AttestationVerifier, Ed25519AttestationVerifier,
};
pub use ed25519::{verify, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use error::CryptoError;
pub use seed::{HashSeedSource, SeedSource, SelectionSeed, SignedSeedSource};
