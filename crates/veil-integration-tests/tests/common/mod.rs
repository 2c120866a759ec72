//! Shared ledger harness for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use veil_core::{
    Address, Amount, AssetId, BatchId, CiphertextHandle, ContentDigest, IntentId, ManualClock,
    Plaintext, ProtocolConfig, TaskId, UeiBatchId, VeilError,
};
use veil_crypto::{Attestation, Ed25519KeyPair};
use veil_ledger::{
    ConfidentialCompute, ConstantProductPool, DecryptAuthorization, InMemoryCompute,
    IntentPayload, Ledger, LedgerServices, TaskPayload,
};
use veil_matching::{DecryptedIntent, SwapSettlement};
use veil_uei::{
    ArgKind, ArgumentSchema, CallKey, DecryptedTask, EncryptedCall, ExecutionPlan, InMemoryVault,
};

pub const START: i64 = 1_700_000_000;
pub const LIQUIDITY: Amount = 50_000_000;
pub const FUNDING: Amount = 5_000_000;
pub const DECODER: Address = Address([0xD0; 20]);
pub const TOKEN: Address = Address([0xA1; 20]);
pub const TRANSFER: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

pub fn admin() -> Address {
    Address([0xAD; 20])
}

pub fn user(n: u8) -> Address {
    Address([n; 20])
}

pub fn x() -> AssetId {
    AssetId::new("X").unwrap()
}

pub fn y() -> AssetId {
    AssetId::new("Y").unwrap()
}

/// Spendable plus escrowed units of `asset` across every account.
pub fn holdings(ledger: &Ledger, asset: &AssetId) -> u128 {
    ledger.balances().total(asset) + ledger.escrow().total(asset)
}

pub fn operator_key(i: u8) -> Ed25519KeyPair {
    Ed25519KeyPair::from_seed(&[0x70 + i; 32])
}

pub struct Harness {
    pub ledger: Ledger,
    pub clock: Arc<ManualClock>,
    pub compute: Arc<InMemoryCompute>,
    pub vault: Arc<InMemoryVault>,
    pub operators: Vec<Ed25519KeyPair>,
}

impl Harness {
    pub fn new(operators: u8) -> Self {
        Self::with_config(
            operators,
            ProtocolConfig {
                admin: admin(),
                ..ProtocolConfig::default()
            },
        )
    }

    pub fn with_config(operators: u8, config: ProtocolConfig) -> Self {
        let clock = Arc::new(ManualClock::at_epoch(START));
        let compute = Arc::new(InMemoryCompute::default());
        let vault = Arc::new(InMemoryVault::new());
        let mut pool = ConstantProductPool::new();
        pool.add_liquidity(&x(), LIQUIDITY, &y(), LIQUIDITY).unwrap();
        let services =
            LedgerServices::new(compute.clone(), pool, clock.clone()).with_vault(vault.clone());
        let mut ledger = Ledger::new(config, services).unwrap();
        let operators: Vec<Ed25519KeyPair> = (0..operators).map(operator_key).collect();
        for kp in &operators {
            ledger.register_operator(&admin(), kp.public_key()).unwrap();
        }
        for n in 1..=8 {
            ledger.deposit(user(n), &x(), FUNDING).unwrap();
            ledger.deposit(user(n), &y(), FUNDING).unwrap();
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
                    name: "transfer".to_string(),
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
            operators,
        }
    }

    pub fn submit(&mut self, n: u8, forward: bool, amount: Amount, ttl_secs: u64) -> IntentId {
        self.try_submit(n, forward, amount, amount, ttl_secs).unwrap()
    }

    pub fn try_submit(
        &mut self,
        n: u8,
        forward: bool,
        amount: Amount,
        collateral: Amount,
        ttl_secs: u64,
    ) -> Result<IntentId, VeilError> {
        let (asset_in, asset_out) = if forward { (x(), y()) } else { (y(), x()) };
        let payload = IntentPayload {
            asset_in,
            asset_out,
            amount: self.compute.encrypt(Plaintext::Uint(amount), user(n)).unwrap(),
            collateral,
            deadline: self.ledger.now().plus_secs(ttl_secs).unwrap(),
        };
        self.ledger.submit_intent(user(n), payload)
    }

    /// A 12,000 X→Y, B 7,500 Y→X, C 4,000 X→Y, D 1,200 Y→X.
    pub fn submit_worked_example(&mut self) -> (BatchId, Vec<IntentId>) {
        let ids = vec![
            self.submit(1, true, 12_000, 600),
            self.submit(2, false, 7_500, 600),
            self.submit(3, true, 4_000, 600),
            self.submit(4, false, 1_200, 600),
        ];
        let batch_id = self.ledger.intent(&ids[0]).unwrap().batch_id;
        (batch_id, ids)
    }

    pub fn submit_transfer(&mut self, n: u8, recipient: u8, amount: Amount, ttl_secs: u64) -> TaskId {
        let owner = user(n);
        let enc = |p: Plaintext| self.compute.encrypt(p, owner).unwrap();
        let call = EncryptedCall {
            decoder: enc(Plaintext::Address(DECODER)),
            target: enc(Plaintext::Address(TOKEN)),
            selector: enc(Plaintext::Selector(TRANSFER)),
            args: vec![enc(Plaintext::Address(user(recipient))), enc(Plaintext::Uint(amount))],
        };
        let payload = TaskPayload {
            call,
            value: 0,
            deadline: self.ledger.now().plus_secs(ttl_secs).unwrap(),
        };
        self.ledger.submit_task(owner, payload).unwrap()
    }

    pub fn key_for(&self, address: &Address) -> &Ed25519KeyPair {
        self.operators
            .iter()
            .find(|kp| kp.address() == *address)
            .unwrap()
    }

    pub fn decrypt(&self, key: &Ed25519KeyPair, handles: &[CiphertextHandle]) -> Vec<Plaintext> {
        let auth = DecryptAuthorization::sign(key, handles).unwrap();
        self.compute.decrypt(handles, &auth).unwrap()
    }

    /// Match a finalized batch the way its first committee member would.
    pub fn match_batch(&self, batch_id: BatchId) -> SwapSettlement {
        let view = self.ledger.swap_batch_view(batch_id).unwrap();
        let key = self.key_for(&view.batch.committee[0]);
        let handles: Vec<CiphertextHandle> = view.intents.iter().map(|i| i.amount).collect();
        let amounts = self.decrypt(key, &handles);
        let intents = view.intents.iter().zip(amounts).map(|(r, a)| DecryptedIntent {
            intent_id: r.intent_id,
            submitter: r.submitter,
            asset_in: r.asset_in.clone(),
            asset_out: r.asset_out.clone(),
            amount: a.as_uint().unwrap(),
            collateral: r.collateral,
            deadline: r.deadline,
        });
        veil_matching::match_batch(batch_id, view.batch.settle_by.unwrap(), intents).unwrap()
    }

    pub fn build_plan(&self, batch_id: UeiBatchId) -> ExecutionPlan {
        let view = self.ledger.uei_batch_view(batch_id).unwrap();
        let key = self.key_for(&view.batch.committee[0]);
        let tasks: Vec<DecryptedTask> = view
            .tasks
            .iter()
            .map(|t| {
                let plain = self.decrypt(key, &t.call.handles());
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

    pub fn attest(&self, digest: &ContentDigest, signers: &[Address]) -> Vec<Attestation> {
        signers
            .iter()
            .map(|a| Attestation::sign(self.key_for(a), digest).unwrap())
            .collect()
    }

    pub fn committee(&self, batch_id: BatchId) -> Vec<Address> {
        self.ledger.batch(batch_id).unwrap().committee.clone()
    }
}
