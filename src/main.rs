//! Payflow demo binary.
//!
//! Wires the full in-process stack and walks the canonical scenario:
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌─────────┐   ┌────────┐
//! │ Service  │──▶│ Coordinator │──▶│ Channel │──▶│ Ledger │
//! │ (dedup)  │   │ (saga FSM)  │   │ (ALO)   │   │ worker │
//! └──────────┘   └─────────────┘   └─────────┘   └────────┘
//! ```
//!
//! Deposit, withdraw, transfer with commission, then replay the
//! transfer to show idempotent result caching.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use payflow::channel::InProcessChannel;
use payflow::config::AppConfig;
use payflow::logging::init_logging;
use payflow::saga::{ChannelGateway, LedgerWorker, RecoveryWorker, SagaCoordinator};
use payflow::service::PayflowService;
use payflow::{
    CommissionMode, MemoryIdempotencyStore, MemoryLedger, MemoryOperationStore, OperationRequest,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _guard = init_logging(&config);
    info!("Payflow starting, env={}", env);

    let channel = Arc::new(InProcessChannel::new(config.channel.capacity));
    let ledger = Arc::new(MemoryLedger::new());
    let oplog = Arc::new(MemoryOperationStore::new());
    let idempotency = Arc::new(MemoryIdempotencyStore::new());

    // Account-owning side: consumes commands, publishes acks
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
    RecoveryWorker::new(coordinator.clone(), config.worker.clone()).spawn();

    // Hourly cleanup of finalized idempotency records past retention
    {
        let idempotency = idempotency.clone();
        let retention = std::time::Duration::from_secs(config.idempotency.retention_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(3_600));
            loop {
                ticker.tick().await;
                let purged = idempotency.purge_expired(retention);
                if purged > 0 {
                    info!(purged = purged, "Purged expired idempotency records");
                }
            }
        });
    }

    let service = PayflowService::new(coordinator, ledger, idempotency);

    let alice = service.open_account(1, "USD").await?;
    let bob = service.open_account(2, "USD").await?;
    println!("Opened accounts: alice={} bob={}", alice.id, bob.id);

    let result = service.deposit(alice.id, 200, "demo-dep-1").await?;
    println!("Deposit 200 -> {:?}", result.outcome.status);

    let result = service.withdraw(alice.id, 50, "demo-wd-1").await?;
    println!("Withdraw 50 -> {:?}", result.outcome.status);

    let transfer = OperationRequest::transfer(
        alice.id,
        bob.id,
        CommissionMode::From,
        100,
        Some(Decimal::ONE),
        Some(0),
        "demo-tx-1",
    );
    let result = service.submit(transfer.clone()).await?;
    println!(
        "Transfer 100 (1% commission, mode=from) -> {:?} op={}",
        result.outcome.status, result.outcome.operation_id
    );

    // Same client key: replayed, not re-applied
    let replay = service.submit(transfer).await?;
    println!(
        "Replay -> {:?} (replayed={}, same op={})",
        replay.outcome.status,
        replay.replayed,
        replay.outcome.operation_id == result.outcome.operation_id
    );

    let alice_acc = service.get_account(alice.id).await?.ok_or_else(|| {
        anyhow::anyhow!("account vanished")
    })?;
    let bob_acc = service.get_account(bob.id).await?.ok_or_else(|| {
        anyhow::anyhow!("account vanished")
    })?;
    println!("Final balances: alice={} bob={}", alice_acc.balance, bob_acc.balance);

    for entry in service.account_entries(alice.id).await? {
        println!(
            "  alice entry: op={} step={} delta={} balance_after={}",
            entry.operation_id, entry.step, entry.delta, entry.balance_after
        );
    }

    info!("Payflow demo finished");
    Ok(())
}
