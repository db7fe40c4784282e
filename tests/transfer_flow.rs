use std::sync::Arc;

use rust_decimal::Decimal;

use payflow::channel::InProcessChannel;
use payflow::saga::{ChannelGateway, LedgerWorker, SagaCoordinator};
use payflow::service::PayflowService;
use payflow::{
    AccountStore, AppConfig, CommissionMode, MemoryIdempotencyStore, MemoryLedger,
    MemoryOperationStore, OperationRequest, PublicStatus,
};

/// Full in-process stack: service -> coordinator -> channel -> ledger worker.
fn build_stack() -> (Arc<PayflowService>, Arc<MemoryLedger>, Arc<InProcessChannel>) {
    let mut config = AppConfig::default();
    config.engine.step_pause_ms = 1;
    config.engine.version_retry_backoff_ms = 1;
    config.channel.ack_timeout_ms = 500;

    let channel = Arc::new(InProcessChannel::new(config.channel.capacity));
    let ledger = Arc::new(MemoryLedger::new());
    let oplog = Arc::new(MemoryOperationStore::new());
    let idempotency = Arc::new(MemoryIdempotencyStore::new());

    LedgerWorker::new(channel.clone(), ledger.clone(), config.engine.clone()).spawn();
    let gateway = ChannelGateway::new(channel.clone(), &config.engine, &config.channel);

    let coordinator = Arc::new(SagaCoordinator::new(
        oplog,
        ledger.clone(),
        gateway,
        idempotency.clone(),
        channel.clone(),
        &config,
    ));
    let service = Arc::new(PayflowService::new(coordinator, ledger.clone(), idempotency));
    (service, ledger, channel)
}

/// The canonical lifecycle: deposit, withdraw, transfer with commission,
/// then replay the transfer.
#[tokio::test]
async fn full_lifecycle_with_commission_and_replay() {
    let (service, _ledger, _channel) = build_stack();

    let alice = service.open_account(1, "USD").await.unwrap();
    let bob = service.open_account(2, "USD").await.unwrap();

    // Deposit 200 -> 200
    let r = service.deposit(alice.id, 200, "dep-1").await.unwrap();
    assert_eq!(r.outcome.status, PublicStatus::Committed);
    assert_eq!(service.get_account(alice.id).await.unwrap().unwrap().balance, 200);

    // Withdraw 50 -> 150
    let r = service.withdraw(alice.id, 50, "wd-1").await.unwrap();
    assert_eq!(r.outcome.status, PublicStatus::Committed);
    assert_eq!(service.get_account(alice.id).await.unwrap().unwrap().balance, 150);

    // Transfer 100, 1% commission, payer covers it: alice -100, bob +99
    let transfer = OperationRequest::transfer(
        alice.id,
        bob.id,
        CommissionMode::From,
        100,
        Some(Decimal::ONE),
        Some(0),
        "tx-1",
    );
    let r = service.submit(transfer.clone()).await.unwrap();
    assert_eq!(r.outcome.status, PublicStatus::Committed);
    assert!(!r.replayed);

    assert_eq!(service.get_account(alice.id).await.unwrap().unwrap().balance, 50);
    assert_eq!(service.get_account(bob.id).await.unwrap().unwrap().balance, 99);

    let op = service
        .get_operation(r.outcome.operation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(op.amounts.debit, 100);
    assert_eq!(op.amounts.credit, 99);
    assert_eq!(op.amounts.commission, 1);

    // Duplicate submission: same result, no balance movement
    let replay = service.submit(transfer).await.unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.outcome, r.outcome);
    assert_eq!(service.get_account(alice.id).await.unwrap().unwrap().balance, 50);
    assert_eq!(service.get_account(bob.id).await.unwrap().unwrap().balance, 99);
}

/// Commission mode "to": the destination must receive the full amount
/// and the source pays amount + commission.
#[tokio::test]
async fn transfer_mode_to_grosses_up_the_debit() {
    let (service, _ledger, _channel) = build_stack();

    let alice = service.open_account(1, "USD").await.unwrap();
    let bob = service.open_account(2, "USD").await.unwrap();
    service.deposit(alice.id, 300, "dep-1").await.unwrap();

    let r = service
        .submit(OperationRequest::transfer(
            alice.id,
            bob.id,
            CommissionMode::To,
            100,
            Some(Decimal::ONE),
            Some(0),
            "tx-to",
        ))
        .await
        .unwrap();
    assert_eq!(r.outcome.status, PublicStatus::Committed);

    assert_eq!(service.get_account(alice.id).await.unwrap().unwrap().balance, 300 - 101);
    assert_eq!(service.get_account(bob.id).await.unwrap().unwrap().balance, 100);
}

/// At-least-once delivery: with every message delivered twice, effects
/// still land exactly once.
#[tokio::test]
async fn duplicate_delivery_does_not_double_apply() {
    let (service, ledger, channel) = build_stack();
    channel.set_duplicate_delivery(true);

    let alice = service.open_account(1, "USD").await.unwrap();
    let bob = service.open_account(2, "USD").await.unwrap();
    service.deposit(alice.id, 500, "dep-1").await.unwrap();

    let r = service
        .submit(OperationRequest::transfer(
            alice.id,
            bob.id,
            CommissionMode::From,
            100,
            Some(Decimal::ZERO),
            Some(0),
            "tx-dup",
        ))
        .await
        .unwrap();
    assert_eq!(r.outcome.status, PublicStatus::Committed);

    assert_eq!(ledger.get(alice.id).await.unwrap().unwrap().balance, 400);
    assert_eq!(ledger.get(bob.id).await.unwrap().unwrap().balance, 100);
}

/// Commission defaults from config (1%, fixed 0) apply when the request
/// does not override them.
#[tokio::test]
async fn transfer_uses_configured_commission_defaults() {
    let (service, _ledger, _channel) = build_stack();

    let alice = service.open_account(1, "USD").await.unwrap();
    let bob = service.open_account(2, "USD").await.unwrap();
    service.deposit(alice.id, 1_000, "dep-1").await.unwrap();

    let r = service
        .submit(OperationRequest::transfer(
            alice.id,
            bob.id,
            CommissionMode::From,
            200,
            None,
            None,
            "tx-default",
        ))
        .await
        .unwrap();
    assert_eq!(r.outcome.status, PublicStatus::Committed);

    let op = service
        .get_operation(r.outcome.operation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(op.amounts.commission, 2);
    assert_eq!(service.get_account(bob.id).await.unwrap().unwrap().balance, 198);
}
