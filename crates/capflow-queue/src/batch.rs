//! Bounded-concurrency batch draining.
//!
//! Items are admitted in input order into a window of `concurrency` slots.
//! A slot is refilled as soon as any in-flight item resolves, so a slow item
//! never holds back later ones while other slots are free.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

/// Tally of a drained batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Run `process` once per item with at most `concurrency` calls unresolved.
///
/// Failures and panics are logged and counted; they never stop the batch.
/// A `concurrency` of zero is treated as one.
pub async fn process_batch<T, F, Fut, E>(items: Vec<T>, concurrency: usize, process: F) -> BatchReport
where
    T: Display + Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let concurrency = concurrency.max(1);
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    let mut report = BatchReport::default();

    debug!(items = items.len(), concurrency, "Draining batch");

    for item in items {
        // Reap whatever already finished so the tally stays current
        while let Some(joined) = tasks.try_join_next() {
            tally(&mut report, joined);
        }

        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("Batch semaphore closed, abandoning remaining items");
                break;
            }
        };

        let label = item.to_string();
        let fut = process(item);
        tasks.spawn(async move {
            let _permit = permit;
            match fut.await {
                Ok(()) => true,
                Err(e) => {
                    warn!(item = %label, error = %e, "Batch item failed");
                    false
                }
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        tally(&mut report, joined);
    }

    metrics::counter!("capflow_batch_items_total", "result" => "succeeded").increment(report.succeeded as u64);
    metrics::counter!("capflow_batch_items_total", "result" => "failed").increment(report.failed as u64);
    debug!(succeeded = report.succeeded, failed = report.failed, "Batch drained");
    report
}

fn tally(report: &mut BatchReport, joined: Result<bool, tokio::task::JoinError>) {
    match joined {
        Ok(true) => report.succeeded += 1,
        Ok(false) => report.failed += 1,
        Err(e) => {
            error!(error = %e, "Batch item panicked");
            report.failed += 1;
        }
    }
}
