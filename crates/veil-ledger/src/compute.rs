//! # Confidential Compute Service
//!
//! The ledger never holds plaintext amounts or call arguments. Submitters
//! encrypt through the compute service and hand the ledger a
//! [`CiphertextHandle`] plus an [`InputProof`]; the service keeps the value
//! and an access list per handle.
//!
//! ## Security Invariant
//!
//! A handle decrypts only for principals on its access list. The owner is
//! listed at encryption time; committee members are added by the ledger at
//! batch finalization. Every decrypt request carries a
//! [`DecryptAuthorization`]: an Ed25519 signature by the principal over the
//! exact handle list, so a request cannot be replayed for other handles.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use veil_core::{
    sha256_raw, Address, CanonicalBytes, CiphertextHandle, EncryptedInput, InputProof, Plaintext,
    PlaintextKind, VeilError,
};
use veil_crypto::{verify, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};

const AUTHORIZATION_DOMAIN: &str = "veil/decrypt-authorization/v1";
const HANDLE_DOMAIN: &[u8] = b"veil/ciphertext-handle/v1";
const PROOF_DOMAIN: &[u8] = b"veil/input-proof/v1";

/// Default per-call decrypt limit of [`InMemoryCompute`].
pub const DEFAULT_MAX_HANDLES_PER_CALL: usize = 16;

/// Errors from the compute service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ComputeError {
    /// The handle names no stored ciphertext.
    #[error("unknown ciphertext handle {0}")]
    UnknownHandle(CiphertextHandle),

    /// The input proof does not bind the handle to the claimed owner.
    #[error("input proof for {handle} does not match owner {owner}")]
    InvalidProof {
        /// Handle submitted.
        handle: CiphertextHandle,
        /// Claimed owner.
        owner: Address,
    },

    /// The principal is not on the handle's access list.
    #[error("{principal} may not decrypt {handle}")]
    Unauthorized {
        /// Handle requested.
        handle: CiphertextHandle,
        /// Requesting principal.
        principal: Address,
    },

    /// The decrypt authorization signature is invalid.
    #[error("invalid decrypt authorization: {0}")]
    InvalidAuthorization(String),

    /// The ciphertext holds a different kind of value than required.
    #[error("{handle} holds a {found}, expected a {expected}")]
    KindMismatch {
        /// Handle submitted.
        handle: CiphertextHandle,
        /// Required kind.
        expected: PlaintextKind,
        /// Kind of the stored value.
        found: PlaintextKind,
    },

    /// Too many handles in one call.
    #[error("rate limited: {requested} handles requested, at most {limit} per call")]
    RateLimited {
        /// Handles in the request.
        requested: usize,
        /// Per-call limit.
        limit: usize,
    },

    /// Canonicalization failed.
    #[error("canonicalization error: {0}")]
    Canonicalization(#[from] veil_core::CanonicalizationError),
}

impl From<ComputeError> for VeilError {
    fn from(e: ComputeError) -> Self {
        match e {
            ComputeError::Canonicalization(c) => VeilError::Canonicalization(c),
            other => VeilError::Validation(other.to_string()),
        }
    }
}

// ── Authorization ───────────────────────────────────────────────────

#[derive(Serialize)]
struct AuthorizationPayload<'a> {
    domain: &'static str,
    handles: &'a [CiphertextHandle],
}

fn authorization_payload(handles: &[CiphertextHandle]) -> Result<CanonicalBytes, ComputeError> {
    Ok(CanonicalBytes::new(&AuthorizationPayload {
        domain: AUTHORIZATION_DOMAIN,
        handles,
    })?)
}

/// A principal's signed request to decrypt a specific handle list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecryptAuthorization {
    /// The requesting principal's key.
    pub principal: Ed25519PublicKey,
    /// Signature over the canonical handle list.
    pub signature: Ed25519Signature,
}

impl DecryptAuthorization {
    /// Sign a request for `handles`.
    pub fn sign(keypair: &Ed25519KeyPair, handles: &[CiphertextHandle]) -> Result<Self, ComputeError> {
        let payload = authorization_payload(handles)?;
        Ok(Self {
            principal: keypair.public_key(),
            signature: keypair.sign(&payload),
        })
    }

    /// Address of the requesting principal.
    pub fn principal_address(&self) -> Address {
        self.principal.address()
    }

    fn check(&self, handles: &[CiphertextHandle]) -> Result<(), ComputeError> {
        let payload = authorization_payload(handles)?;
        verify(&payload, &self.signature, &self.principal)
            .map_err(|e| ComputeError::InvalidAuthorization(e.to_string()))
    }
}

// ── Service trait ───────────────────────────────────────────────────

/// Threshold-decryption service seam.
pub trait ConfidentialCompute: Send + Sync {
    /// Encrypt `value` for `owner`.
    fn encrypt(&self, value: Plaintext, owner: Address) -> Result<EncryptedInput, ComputeError>;

    /// Check that `input` was produced for `owner` and return its public kind.
    fn verify_input(&self, input: &EncryptedInput, owner: Address) -> Result<PlaintextKind, ComputeError>;

    /// [`ConfidentialCompute::verify_input`], additionally requiring `expected`.
    fn verify_input_kind(
        &self,
        input: &EncryptedInput,
        owner: Address,
        expected: PlaintextKind,
    ) -> Result<(), ComputeError> {
        let found = self.verify_input(input, owner)?;
        if found != expected {
            return Err(ComputeError::KindMismatch {
                handle: input.handle,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Decrypt `handles`, in order, for the authorizing principal.
    fn decrypt(
        &self,
        handles: &[CiphertextHandle],
        authorization: &DecryptAuthorization,
    ) -> Result<Vec<Plaintext>, ComputeError>;

    /// Add `principal` to the access list of `handle`.
    fn grant_decrypt_permission(
        &self,
        handle: CiphertextHandle,
        principal: Address,
    ) -> Result<(), ComputeError>;

    /// Largest number of handles a single `decrypt` call accepts.
    fn max_handles_per_call(&self) -> usize;
}

// ── In-memory reference service ─────────────────────────────────────

#[derive(Debug)]
struct StoredCiphertext {
    value: Plaintext,
    owner: Address,
    acl: BTreeSet<Address>,
}

#[derive(Debug, Default)]
struct ComputeState {
    values: BTreeMap<CiphertextHandle, StoredCiphertext>,
    nonce: u64,
    decrypt_calls: u64,
}

/// Reference compute service holding plaintexts in memory.
#[derive(Debug)]
pub struct InMemoryCompute {
    state: Mutex<ComputeState>,
    max_handles_per_call: usize,
}

impl Default for InMemoryCompute {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HANDLES_PER_CALL)
    }
}

impl InMemoryCompute {
    /// A service accepting at most `max_handles_per_call` handles per decrypt.
    pub fn new(max_handles_per_call: usize) -> Self {
        Self {
            state: Mutex::new(ComputeState::default()),
            max_handles_per_call: max_handles_per_call.max(1),
        }
    }

    /// Number of successful decrypt calls served.
    pub fn decrypt_calls(&self) -> u64 {
        self.state.lock().decrypt_calls
    }

    fn proof_for(handle: &CiphertextHandle, owner: &Address) -> InputProof {
        InputProof(sha256_raw(&[PROOF_DOMAIN, &handle.0.as_bytes()[..], &owner.0[..]]))
    }
}

impl ConfidentialCompute for InMemoryCompute {
    fn encrypt(&self, value: Plaintext, owner: Address) -> Result<EncryptedInput, ComputeError> {
        let mut state = self.state.lock();
        state.nonce += 1;
        let handle = CiphertextHandle(sha256_raw(&[
            HANDLE_DOMAIN,
            &owner.0[..],
            &state.nonce.to_be_bytes()[..],
        ]));
        let proof = Self::proof_for(&handle, &owner);
        state.values.insert(
            handle,
            StoredCiphertext {
                value,
                owner,
                acl: BTreeSet::from([owner]),
            },
        );
        Ok(EncryptedInput { handle, proof })
    }

    fn verify_input(&self, input: &EncryptedInput, owner: Address) -> Result<PlaintextKind, ComputeError> {
        let state = self.state.lock();
        let stored = state
            .values
            .get(&input.handle)
            .ok_or(ComputeError::UnknownHandle(input.handle))?;
        if stored.owner != owner || Self::proof_for(&input.handle, &owner) != input.proof {
            return Err(ComputeError::InvalidProof {
                handle: input.handle,
                owner,
            });
        }
        Ok(stored.value.kind())
    }

    fn decrypt(
        &self,
        handles: &[CiphertextHandle],
        authorization: &DecryptAuthorization,
    ) -> Result<Vec<Plaintext>, ComputeError> {
        if handles.len() > self.max_handles_per_call {
            return Err(ComputeError::RateLimited {
                requested: handles.len(),
                limit: self.max_handles_per_call,
            });
        }
        authorization.check(handles)?;
        let principal = authorization.principal_address();
        let mut state = self.state.lock();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            let stored = state
                .values
                .get(handle)
                .ok_or(ComputeError::UnknownHandle(*handle))?;
            if !stored.acl.contains(&principal) {
                return Err(ComputeError::Unauthorized {
                    handle: *handle,
                    principal,
                });
            }
            out.push(stored.value);
        }
        state.decrypt_calls += 1;
        Ok(out)
    }

    fn grant_decrypt_permission(
        &self,
        handle: CiphertextHandle,
        principal: Address,
    ) -> Result<(), ComputeError> {
        let mut state = self.state.lock();
        let stored = state
            .values
            .get_mut(&handle)
            .ok_or(ComputeError::UnknownHandle(handle))?;
        stored.acl.insert(principal);
        Ok(())
    }

    fn max_handles_per_call(&self) -> usize {
        self.max_handles_per_call
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Ed25519KeyPair {
        Ed25519KeyPair::from_seed(&[1u8; 32])
    }

    #[test]
    fn owner_can_decrypt_own_input() {
        let compute = InMemoryCompute::default();
        let kp = owner();
        let input = compute.encrypt(Plaintext::Uint(42), kp.address()).unwrap();
        assert_eq!(compute.verify_input(&input, kp.address()).unwrap(), PlaintextKind::Uint);
        let auth = DecryptAuthorization::sign(&kp, &[input.handle]).unwrap();
        assert_eq!(compute.decrypt(&[input.handle], &auth).unwrap(), vec![Plaintext::Uint(42)]);
    }

    #[test]
    fn proof_is_bound_to_owner() {
        let compute = InMemoryCompute::default();
        let input = compute.encrypt(Plaintext::Uint(1), owner().address()).unwrap();
        let other = Address([9; 20]);
        assert!(matches!(
            compute.verify_input(&input, other),
            Err(ComputeError::InvalidProof { .. })
        ));
    }

    #[test]
    fn kind_is_checked_without_decrypting() {
        let compute = InMemoryCompute::default();
        let kp = owner();
        let input = compute.encrypt(Plaintext::Address(Address([7; 20])), kp.address()).unwrap();
        compute
            .verify_input_kind(&input, kp.address(), PlaintextKind::Address)
            .unwrap();
        assert!(matches!(
            compute.verify_input_kind(&input, kp.address(), PlaintextKind::Uint),
            Err(ComputeError::KindMismatch {
                expected: PlaintextKind::Uint,
                found: PlaintextKind::Address,
                ..
            })
        ));
        assert_eq!(compute.decrypt_calls(), 0);
    }

    #[test]
    fn stranger_needs_a_grant() {
        let compute = InMemoryCompute::default();
        let input = compute.encrypt(Plaintext::Uint(5), owner().address()).unwrap();
        let operator = Ed25519KeyPair::from_seed(&[2u8; 32]);
        let auth = DecryptAuthorization::sign(&operator, &[input.handle]).unwrap();
        assert!(matches!(
            compute.decrypt(&[input.handle], &auth),
            Err(ComputeError::Unauthorized { .. })
        ));
        compute.grant_decrypt_permission(input.handle, operator.address()).unwrap();
        assert_eq!(compute.decrypt(&[input.handle], &auth).unwrap(), vec![Plaintext::Uint(5)]);
    }

    #[test]
    fn authorization_covers_exact_handle_list() {
        let compute = InMemoryCompute::default();
        let kp = owner();
        let a = compute.encrypt(Plaintext::Uint(1), kp.address()).unwrap();
        let b = compute.encrypt(Plaintext::Uint(2), kp.address()).unwrap();
        let auth = DecryptAuthorization::sign(&kp, &[a.handle]).unwrap();
        assert!(matches!(
            compute.decrypt(&[a.handle, b.handle], &auth),
            Err(ComputeError::InvalidAuthorization(_))
        ));
    }

    #[test]
    fn oversized_request_is_rate_limited() {
        let compute = InMemoryCompute::new(2);
        let kp = owner();
        let handles: Vec<_> = (0..3)
            .map(|i| compute.encrypt(Plaintext::Uint(i), kp.address()).unwrap().handle)
            .collect();
        let auth = DecryptAuthorization::sign(&kp, &handles).unwrap();
        assert_eq!(
            compute.decrypt(&handles, &auth),
            Err(ComputeError::RateLimited { requested: 3, limit: 2 })
        );
    }
}
