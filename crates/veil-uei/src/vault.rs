//! # Custodial Vault and Cross-Domain Relay
//!
//! The two external seams a UEI plan executes through. The vault performs
//! local calls on behalf of the batch's submitters; the relay hands calls
//! for other domains to whatever bridge the deployment uses.
//!
//! [`InMemoryVault`] and [`InMemoryRelay`] record what they were asked to
//! do and can be told to fail specific targets. The simulator and the
//! tests run against them.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use veil_core::{sha256_raw, Address, Amount, ContentDigest, DomainId};

use crate::error::{RelayError, VaultError};

/// Executes calls held in custody.
pub trait CustodialVault: Send + Sync {
    /// Perform the call. Returns the call's return data.
    fn execute(&self, target: Address, calldata: &[u8], value: Amount) -> Result<Vec<u8>, VaultError>;

    /// Dry-run the call without side effects.
    ///
    /// Vaults that cannot simulate accept everything; the call may then
    /// still fail during execution.
    fn simulate(&self, target: Address, calldata: &[u8], value: Amount) -> Result<(), VaultError> {
        let _ = (target, calldata, value);
        Ok(())
    }
}

/// Hands calls to another execution domain.
pub trait CrossDomainRelay: Send + Sync {
    /// Dispatch the call. Returns a message id for tracking.
    fn dispatch(&self, domain: DomainId, target: Address, calldata: &[u8]) -> Result<ContentDigest, RelayError>;
}

/// A call the in-memory vault executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultCall {
    /// Call target.
    pub target: Address,
    /// Call data.
    pub calldata: Vec<u8>,
    /// Native value.
    pub value: Amount,
}

#[derive(Debug, Default)]
struct VaultState {
    executed: Vec<VaultCall>,
    simulated: usize,
    revert_on_execute: BTreeMap<Address, String>,
    revert_on_simulate: BTreeMap<Address, String>,
}

/// Recording vault with per-target failure injection.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    state: Mutex<VaultState>,
}

impl InMemoryVault {
    /// A vault that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make execution of calls to `target` revert. Simulation still passes.
    pub fn revert_on_execute(&self, target: Address, reason: impl Into<String>) {
        self.state.lock().revert_on_execute.insert(target, reason.into());
    }

    /// Make both simulation and execution of calls to `target` revert.
    pub fn revert_on_simulate(&self, target: Address, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.state.lock();
        state.revert_on_simulate.insert(target, reason.clone());
        state.revert_on_execute.insert(target, reason);
    }

    /// Calls executed so far, in order.
    pub fn executed(&self) -> Vec<VaultCall> {
        self.state.lock().executed.clone()
    }

    /// Number of simulations run.
    pub fn simulated(&self) -> usize {
        self.state.lock().simulated
    }
}

impl CustodialVault for InMemoryVault {
    fn execute(&self, target: Address, calldata: &[u8], value: Amount) -> Result<Vec<u8>, VaultError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.revert_on_execute.get(&target) {
            return Err(VaultError::Reverted {
                target,
                reason: reason.clone(),
            });
        }
        state.executed.push(VaultCall {
            target,
            calldata: calldata.to_vec(),
            value,
        });
        Ok(sha256_raw(&[calldata]).as_bytes().to_vec())
    }

    fn simulate(&self, target: Address, _calldata: &[u8], _value: Amount) -> Result<(), VaultError> {
        let mut state = self.state.lock();
        state.simulated += 1;
        match state.revert_on_simulate.get(&target) {
            Some(reason) => Err(VaultError::Reverted {
                target,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// A message the in-memory relay accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayedCall {
    /// Destination domain.
    pub domain: DomainId,
    /// Call target on that domain.
    pub target: Address,
    /// Call data.
    pub calldata: Vec<u8>,
    /// Assigned message id.
    pub message_id: ContentDigest,
}

#[derive(Debug, Default)]
struct RelayState {
    dispatched: Vec<RelayedCall>,
    unreachable: Vec<DomainId>,
}

/// Recording relay with per-domain failure injection.
#[derive(Debug, Default)]
pub struct InMemoryRelay {
    state: Mutex<RelayState>,
}

impl InMemoryRelay {
    /// A relay that reaches every domain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make dispatches to `domain` fail.
    pub fn mark_unreachable(&self, domain: DomainId) {
        self.state.lock().unreachable.push(domain);
    }

    /// Messages dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<RelayedCall> {
        self.state.lock().dispatched.clone()
    }
}

impl CrossDomainRelay for InMemoryRelay {
    fn dispatch(&self, domain: DomainId, target: Address, calldata: &[u8]) -> Result<ContentDigest, RelayError> {
        let mut state = self.state.lock();
        if state.unreachable.contains(&domain) {
            return Err(RelayError::Unreachable(domain));
        }
        let nonce = state.dispatched.len() as u64;
        let message_id = sha256_raw(&[
            &domain.0.to_be_bytes()[..],
            &target.0[..],
            calldata,
            &nonce.to_be_bytes()[..],
        ]);
        state.dispatched.push(RelayedCall {
            domain,
            target,
            calldata: calldata.to_vec(),
            message_id,
        });
        Ok(message_id)
    }
}
