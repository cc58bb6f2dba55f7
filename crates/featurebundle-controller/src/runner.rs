//! Bounded-concurrency driver for batches of reconciliations.

use std::collections::BTreeSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::ReconcileError;
use crate::reconciler::{ReconcileOutcome, Reconciler};

/// Result of reconciling one control resource.
#[derive(Debug)]
pub struct RunReport {
    pub name: String,
    pub result: Result<ReconcileOutcome, ReconcileError>,
}

/// Reconciles many control resources in parallel, at most
/// `concurrency` at a time and never the same name twice at once.
pub struct ReconcileRunner {
    reconciler: Arc<Reconciler>,
    permits: Arc<Semaphore>,
    concurrency: usize,
}

impl ReconcileRunner {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        let concurrency = reconciler.settings().concurrent_reconciles.max(1);
        Self::with_concurrency(reconciler, concurrency)
    }

    pub fn with_concurrency(reconciler: Arc<Reconciler>, concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            reconciler,
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Reconciles every distinct name once. Reports come back sorted by name.
    pub async fn run<I, S>(&self, names: I, cancel: &CancellationToken) -> Vec<RunReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        info!(count = names.len(), concurrency = self.concurrency, "Starting reconciliation batch");

        let mut tasks = JoinSet::new();
        for name in names {
            let reconciler = self.reconciler.clone();
            let permits = self.permits.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                // queued names give up once the batch is cancelled
                let permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => None,
                    permit = permits.acquire_owned() => permit.ok(),
                };
                let result = match permit {
                    Some(_permit) => AssertUnwindSafe(reconciler.reconcile(&name, &cancel))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(ReconcileError::Aborted("reconciliation panicked".into()))
                        }),
                    None => {
                        debug!(bundle = %name, "Batch cancelled before a permit was free");
                        Err(ReconcileError::Cancelled)
                    }
                };
                RunReport { name, result }
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    debug!(bundle = %report.name, ok = report.result.is_ok(), "Reconciliation finished");
                    reports.push(report);
                }
                Err(e) => {
                    error!(error = %e, "Reconciliation task failed");
                    reports.push(RunReport {
                        name: String::new(),
                        result: Err(ReconcileError::Aborted(e.to_string())),
                    });
                }
            }
        }
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }
}
