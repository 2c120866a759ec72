//! # Operator Round End-to-End
//!
//! A full round through the public crates: users submit encrypted swap
//! intents and UEI transfers, the batches finalize with a drawn committee,
//! and independent `OperatorWorker`s decrypt, match, attest over a shared
//! board and settle. Also covers a committee that cannot reach quorum.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{user, x, y, Harness};
use tokio::sync::watch;
use veil_ledger::{Ledger, LedgerEvent};
use veil_operator::{AttestationBoard, LedgerClient, LocalLedger, OperatorConfig, OperatorWorker};
use veil_state::{BatchStatus, IntentStatus, TaskStatus};

fn fast_config() -> OperatorConfig {
    OperatorConfig {
        poll_interval_ms: 5,
        decrypt_chunk_size: 3,
        ..OperatorConfig::default()
    }
}

fn settled_events(ledger: &Ledger) -> (usize, usize) {
    let records = ledger.events().records();
    let swaps = records
        .iter()
        .filter(|r| matches!(r.event, LedgerEvent::BatchSettled { .. }))
        .count();
    let uei = records
        .iter()
        .filter(|r| matches!(r.event, LedgerEvent::UeiBatchSettled { .. }))
        .count();
    (swaps, uei)
}

async fn wait_until(shared: &LocalLedger, done: impl Fn(&Ledger) -> bool) {
    let give_up = tokio::time::Instant::now() + Duration::from_secs(10);
    while !shared.with(|l| done(l)) {
        assert!(tokio::time::Instant::now() < give_up, "round did not settle in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_operators_settle_swap_and_uei_batches_once() {
    let mut h = Harness::new(5);
    let (batch_id, intents) = h.submit_worked_example();
    let tasks = vec![
        h.submit_transfer(5, 8, 300, 600),
        h.submit_transfer(6, 8, 200, 600),
        h.submit_transfer(7, 8, 100, 600),
    ];
    let uei_batch = h.ledger.current_uei_batch();
    let x_before = common::holdings(&h.ledger, &x());
    let y_before = common::holdings(&h.ledger, &y());

    let interval = h.ledger.config().batch_interval_secs;
    let idle = h.ledger.config().uei_idle_timeout_secs;
    h.clock.advance(interval.max(idle));
    h.ledger.finalize_batch(&common::admin(), batch_id, false).unwrap();
    h.ledger.finalize_uei_batch(&common::admin(), false).unwrap();

    let keys = std::mem::take(&mut h.operators);
    let vault = Arc::clone(&h.vault);
    let shared = LocalLedger::new(h.ledger);
    let client: Arc<dyn LedgerClient> = Arc::new(shared.clone());
    let board = AttestationBoard::new();
    let (tx, rx) = watch::channel(false);
    let handles: Vec<_> = keys
        .into_iter()
        .map(|kp| OperatorWorker::new(kp, Arc::clone(&client), board.clone(), &fast_config()).spawn(rx.clone()))
        .collect();

    wait_until(&shared, |l| {
        let swap = l.batch(batch_id).map(|b| b.status());
        let uei = l.uei_batch(uei_batch).map(|b| b.status());
        swap == Some(BatchStatus::Settled) && uei == Some(BatchStatus::Settled)
    })
    .await;
    tx.send(true).unwrap();
    let mut submitted = 0;
    let mut failures = 0;
    for handle in handles {
        let stats = handle.await.unwrap();
        submitted += stats.submitted;
        failures += stats.failures;
    }

    assert_eq!(submitted, 2);
    assert_eq!(failures, 0);
    shared.with(|l| {
        assert_eq!(settled_events(l), (1, 1));
        assert!(l.events().verify_chain().is_ok());
        for id in &intents {
            assert_eq!(l.intent(id).unwrap().status, IntentStatus::Settled);
        }
        for id in &tasks {
            assert_eq!(l.task(id).unwrap().status, TaskStatus::Executed);
        }
        // 7,300 X left the book for the pool; the pool's Y came back in.
        assert_eq!(l.escrow().total(&x()), 0);
        assert_eq!(l.balances().total(&x()), x_before - 7_300);
        assert!(l.balances().total(&y()) > y_before);
        assert_eq!(l.balance(&user(1), &x()), common::FUNDING - 12_000);
    });
    let executed = vault.executed();
    assert_eq!(executed.len(), 1);
}

#[tokio::test]
async fn committee_without_quorum_expires_without_moving_funds() {
    let mut h = Harness::new(5);
    let (batch_id, intents) = h.submit_worked_example();
    h.ledger.finalize_batch(&common::admin(), batch_id, true).unwrap();
    let committee = h.committee(batch_id);
    let x_before = common::holdings(&h.ledger, &x());

    // Only one member of a threshold-two committee is online.
    let online = h
        .operators
        .iter()
        .position(|kp| kp.address() == committee[0])
        .map(|i| h.operators.swap_remove(i))
        .unwrap();
    let clock = Arc::clone(&h.clock);
    let window = h.ledger.config().max_response_interval_secs;
    let shared = LocalLedger::new(h.ledger);
    let client: Arc<dyn LedgerClient> = Arc::new(shared.clone());
    let board = AttestationBoard::new();
    let mut worker = OperatorWorker::new(online, client, board.clone(), &fast_config());

    assert_eq!(worker.poll_once().await, 1);
    assert_eq!(worker.poll_once().await, 0);
    assert_eq!(worker.stats().contributed, 1);
    assert_eq!(shared.with(|l| l.batch(batch_id).unwrap().status()), BatchStatus::Processing);

    clock.advance(window + 1);
    shared.with(|l| l.expire_batch(batch_id)).unwrap();
    shared.with(|l| {
        assert_eq!(l.batch(batch_id).unwrap().status(), BatchStatus::Failed);
        for id in &intents {
            assert_eq!(l.intent(id).unwrap().status, IntentStatus::Expired);
        }
        assert_eq!(l.balances().total(&x()), x_before);
        assert_eq!(l.escrow().total(&x()), 0);
    });
}

#[tokio::test]
async fn worker_skips_batches_it_was_not_drawn_for() {
    let mut h = Harness::new(6);
    let (batch_id, _) = h.submit_worked_example();
    h.ledger.finalize_batch(&common::admin(), batch_id, true).unwrap();
    let committee = h.committee(batch_id);
    let outsider = h
        .operators
        .iter()
        .position(|kp| !committee.contains(&kp.address()))
        .map(|i| h.operators.swap_remove(i))
        .unwrap();

    let shared = LocalLedger::new(h.ledger);
    let mut worker = OperatorWorker::new(outsider, Arc::new(shared.clone()), AttestationBoard::new(), &fast_config());
    assert_eq!(worker.poll_once().await, 0);
    assert_eq!(shared.with(|l| l.batch(batch_id).unwrap().status()), BatchStatus::Finalized);
}
