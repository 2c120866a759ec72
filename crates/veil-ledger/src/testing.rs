//! Shared fixture for the ledger's unit tests.

use std::sync::Arc;

use veil_core::{
    Address, Amount, AssetId, BatchId, CiphertextHandle, ContentDigest, IntentId, ManualClock,
    Plaintext, ProtocolConfig, TaskId, UeiBatchId,
};
use veil_crypto::{Attestation, Ed25519KeyPair};
use veil_matching::{DecryptedIntent, SwapSettlement};
use veil_uei::{
    ArgKind, ArgumentSchema, CallKey, DecryptedTask, EncryptedCall, ExecutionPlan, InMemoryRelay,
    InMemoryVault,
};

use crate::compute::{ComputeError, ConfidentialCompute, DecryptAuthorization, InMemoryCompute};
use crate::exchange::ConstantProductPool;
use crate::ledger::{Ledger, LedgerServices};
use crate::records::{IntentPayload, TaskPayload};

pub(crate) const DECODER: Address = Address([0xD0; 20]);
pub(crate) const TOKEN: Address = Address([0xA1; 20]);
pub(crate) const RAW_TARGET: Address = Address([0xB2; 20]);
pub(crate) const TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

const START: i64 = 1_700_000_000;
const OPERATORS: u8 = 5;
pub(crate) const FUNDING: Amount = 1_000_000;

pub(crate) fn user(n: u8) -> Address {
    Address([n; 20])
}

pub(crate) fn admin() -> Address {
    Address([0xAD; 20])
}

fn asset(name: &str) -> AssetId {
    AssetId::new(name).unwrap()
}

pub(crate) struct Fixture {
    pub(crate) ledger: Ledger,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) compute: Arc<InMemoryCompute>,
    pub(crate) vault: Arc<InMemoryVault>,
    pub(crate) relay: Arc<InMemoryRelay>,
    operators: Vec<Ed25519KeyPair>,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self::build(OPERATORS, FUNDING)
    }

    pub(crate) fn without_operators() -> Self {
        Self::build(0, FUNDING)
    }

    fn build(operators: u8, funding: Amount) -> Self {
        let clock = Arc::new(ManualClock::at_epoch(START));
        let compute = Arc::new(InMemoryCompute::default());
        let vault = Arc::new(InMemoryVault::new());
        let relay = Arc::new(InMemoryRelay::new());
        let mut pool = ConstantProductPool::new();
        pool.add_liquidity(&asset("X"), 10_000_000, &asset("Y"), 10_000_000)
            .unwrap();
        let services = LedgerServices::new(compute.clone(), pool, clock.clone())
            .with_vault(vault.clone())
            .with_relay(relay.clone());
        let config = ProtocolConfig {
            admin: admin(),
            ..ProtocolConfig::default()
        };
        let mut ledger = Ledger::new(config, services).unwrap();

        let keys: Vec<Ed25519KeyPair> = (0..operators)
            .map(|i| Ed25519KeyPair::from_seed(&[0x40 + i; 32]))
            .collect();
        for kp in &keys {
            ledger.register_operator(&admin(), kp.public_key()).unwrap();
        }
        if funding > 0 {
            for n in 1..=6 {
                ledger.deposit(user(n), &asset("X"), funding).unwrap();
                ledger.deposit(user(n), &asset("Y"), funding).unwrap();
            }
        }
        let local_domain = ledger.config().local_domain;
        ledger
            .register_schema(
                &admin(),
                CallKey {
                    decoder: DECODER,
                    target: TOKEN,
                    selector: TRANSFER,
                },
                ArgumentSchema {
                    name: "transfer".into(),
                    args: vec![ArgKind::Address, ArgKind::Uint],
                    amount_index: 1,
                    domain: local_domain,
                },
            )
            .unwrap();

        Self {
            ledger,
            clock,
            compute,
            vault,
            relay,
            operators: keys,
        }
    }

    // ── Swap helpers ────────────────────────────────────────────────

    pub(crate) fn payload(
        &self,
        n: u8,
        asset_in: &str,
        asset_out: &str,
        amount: Amount,
        deadline_offset_secs: u64,
    ) -> IntentPayload {
        let encrypted = self.compute.encrypt(Plaintext::Uint(amount), user(n)).unwrap();
        IntentPayload {
            asset_in: asset(asset_in),
            asset_out: asset(asset_out),
            amount: encrypted,
            collateral: amount,
            deadline: self.ledger.now().plus_secs(deadline_offset_secs).unwrap(),
        }
    }

    pub(crate) fn submit(
        &mut self,
        n: u8,
        asset_in: &str,
        asset_out: &str,
        amount: Amount,
        deadline_offset_secs: u64,
    ) -> IntentId {
        let payload = self.payload(n, asset_in, asset_out, amount, deadline_offset_secs);
        self.ledger.submit_intent(user(n), payload).unwrap()
    }

    /// Decrypt a finalized batch as its first committee member.
    pub(crate) fn decrypted_intents(&self, batch_id: BatchId) -> Vec<DecryptedIntent> {
        let view = self.ledger.swap_batch_view(batch_id).unwrap();
        let key = self.operator_key(&view.batch.committee[0]);
        let handles: Vec<CiphertextHandle> = view.intents.iter().map(|i| i.amount).collect();
        let amounts = self.decrypt(key, &handles).unwrap();
        view.intents
            .iter()
            .zip(amounts)
            .map(|(record, amount)| DecryptedIntent {
                intent_id: record.intent_id,
                submitter: record.submitter,
                asset_in: record.asset_in.clone(),
                asset_out: record.asset_out.clone(),
                amount: amount.as_uint().unwrap(),
                collateral: record.collateral,
                deadline: record.deadline,
            })
            .collect()
    }

    /// Decrypt and match a finalized batch.
    pub(crate) fn match_batch(&self, batch_id: BatchId) -> SwapSettlement {
        let settle_by = self.ledger.batch(batch_id).unwrap().settle_by.unwrap();
        veil_matching::match_batch(batch_id, settle_by, self.decrypted_intents(batch_id)).unwrap()
    }

    // ── UEI helpers ─────────────────────────────────────────────────

    pub(crate) fn submit_call(
        &mut self,
        n: u8,
        target: Address,
        args: Vec<Plaintext>,
        value: Amount,
        deadline_offset_secs: u64,
    ) -> TaskId {
        let owner = user(n);
        let enc = |p: Plaintext| self.compute.encrypt(p, owner).unwrap();
        let call = EncryptedCall {
            decoder: enc(Plaintext::Address(DECODER)),
            target: enc(Plaintext::Address(target)),
            selector: enc(Plaintext::Selector(TRANSFER)),
            args: args.into_iter().map(enc).collect(),
        };
        let payload = TaskPayload {
            call,
            value,
            deadline: self.ledger.now().plus_secs(deadline_offset_secs).unwrap(),
        };
        self.ledger.submit_task(owner, payload).unwrap()
    }

    pub(crate) fn submit_transfer(
        &mut self,
        n: u8,
        recipient: u8,
        amount: Amount,
        deadline_offset_secs: u64,
    ) -> TaskId {
        let args = vec![Plaintext::Address(user(recipient)), Plaintext::Uint(amount)];
        self.submit_call(n, TOKEN, args, 0, deadline_offset_secs)
    }

    /// Decrypt a finalized UEI batch as its first committee member and plan it.
    pub(crate) fn build_plan(&self, batch_id: UeiBatchId) -> ExecutionPlan {
        let view = self.ledger.uei_batch_view(batch_id).unwrap();
        let key = self.operator_key(&view.batch.committee[0]);
        let tasks: Vec<DecryptedTask> = view
            .tasks
            .iter()
            .map(|t| {
                let plain = self.decrypt(key, &t.call.handles()).unwrap();
                DecryptedTask::from_plaintexts(t.task_id, t.submitter, t.value, t.deadline, &plain)
                    .unwrap()
            })
            .collect();
        veil_uei::build_plan(
            batch_id,
            view.batch.settle_by.unwrap(),
            &tasks,
            self.ledger.schemas(),
            self.ledger.config().local_domain,
        )
        .unwrap()
    }

    // ── Operators ───────────────────────────────────────────────────

    pub(crate) fn operator_addresses(&self) -> Vec<Address> {
        self.operators.iter().map(Ed25519KeyPair::address).collect()
    }

    pub(crate) fn operator_key(&self, address: &Address) -> &Ed25519KeyPair {
        self.operators
            .iter()
            .find(|kp| kp.address() == *address)
            .unwrap()
    }

    pub(crate) fn decrypt(
        &self,
        key: &Ed25519KeyPair,
        handles: &[CiphertextHandle],
    ) -> Result<Vec<Plaintext>, ComputeError> {
        let auth = DecryptAuthorization::sign(key, handles)?;
        self.compute.decrypt(handles, &auth)
    }

    pub(crate) fn attest(&self, digest: &ContentDigest, signers: &[Address]) -> Vec<Attestation> {
        signers
            .iter()
            .map(|a| Attestation::sign(self.operator_key(a), digest).unwrap())
            .collect()
    }
}

/// A: 12,000 X→Y, B: 7,500 Y→X, C: 4,000 X→Y, D: 1,200 Y→X, force-finalized.
pub(crate) fn worked_example(fx: &mut Fixture) -> (BatchId, Vec<IntentId>) {
    let ids = vec![
        fx.submit(1, "X", "Y", 12_000, 600),
        fx.submit(2, "Y", "X", 7_500, 600),
        fx.submit(3, "X", "Y", 4_000, 600),
        fx.submit(4, "Y", "X", 1_200, 600),
    ];
    let batch_id = fx.ledger.intent(&ids[0]).unwrap().batch_id;
    fx.ledger.finalize_batch(&admin(), batch_id, true).unwrap();
    (batch_id, ids)
}
