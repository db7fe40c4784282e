//! Recovery worker.
//!
//! Periodically scans the operation log for in-flight operations that
//! have not made progress and re-drives them through the coordinator.
//! This is what turns at-least-once delivery into eventual completion:
//! an operation orphaned by a crash or a lost ack sits in a non-terminal
//! state until a scan picks it up, and every step it re-issues is
//! idempotent on the account side.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::coordinator::SagaCoordinator;
use crate::config::WorkerSettings;
use crate::oplog::OpState;

pub struct RecoveryWorker {
    coordinator: Arc<SagaCoordinator>,
    settings: WorkerSettings,
}

impl RecoveryWorker {
    pub fn new(coordinator: Arc<SagaCoordinator>, settings: WorkerSettings) -> Self {
        Self {
            coordinator,
            settings,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                interval_secs = self.settings.scan_interval_secs,
                stale_secs = self.settings.stale_threshold_secs,
                "Recovery worker started"
            );
            let mut ticker =
                tokio::time::interval(Duration::from_secs(self.settings.scan_interval_secs));
            loop {
                ticker.tick().await;
                self.scan_once().await;
            }
        })
    }

    /// One scan pass; returns how many operations were re-driven.
    /// Public so tests and shutdown hooks can run it directly.
    pub async fn scan_once(&self) -> usize {
        let threshold = Duration::from_secs(self.settings.stale_threshold_secs);
        let stale = match self.coordinator.oplog().find_stale(threshold).await {
            Ok(ops) => ops,
            Err(e) => {
                error!(error = %e, "Stale scan failed");
                return 0;
            }
        };
        if stale.is_empty() {
            return 0;
        }

        let batch: Vec<_> = stale.into_iter().take(self.settings.batch_size).collect();
        info!(count = batch.len(), "Re-driving stale operations");

        // Safe to drive concurrently: every transition is a CAS, a step
        // raced by another driver simply makes no progress
        let results = futures::future::join_all(batch.into_iter().map(|op| {
            let coordinator = self.coordinator.clone();
            async move {
                info!(
                    operation_id = %op.id,
                    state = %op.state,
                    retry = op.retry_count,
                    "Recovering operation"
                );
                if op.state == OpState::Compensating {
                    // Visible early: these are the ones that can end in
                    // manual reconciliation
                    warn!(
                        operation_id = %op.id,
                        retry = op.retry_count,
                        "Stale operation is mid-compensation"
                    );
                }
                match coordinator.execute(op.id).await {
                    Ok(state) if state.is_terminal() => true,
                    Ok(state) => {
                        warn!(operation_id = %op.id, state = %state, "Recovery pass left operation in-flight");
                        false
                    }
                    Err(e) => {
                        error!(operation_id = %op.id, error = %e, "Recovery pass failed");
                        false
                    }
                }
            }
        }))
        .await;

        results.into_iter().filter(|done| *done).count()
    }
}
