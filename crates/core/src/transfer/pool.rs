//! Bounded-concurrency batch execution

use std::future::Future;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::{BatchReport, TransferEvent, TransferItem, TransferObserver};
use crate::error::{Error, Result};

/// Default number of simultaneous transfers
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Run `task` for every item with at most `limit` running at once.
///
/// Returns only after every item has either completed or failed. A failure
/// is recorded and reported through `observer`; it does not stop the others.
/// Once `cancel` fires, items still waiting for a slot fail with
/// [`Error::Cancelled`] without running.
pub async fn run_batch<F, Fut>(
    items: Vec<TransferItem>,
    limit: usize,
    cancel: &CancellationToken,
    observer: &dyn TransferObserver,
    task: F,
) -> BatchReport
where
    F: Fn(TransferItem) -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    let mut report = BatchReport::default();
    let Some(first) = items.first() else {
        return report;
    };

    observer.on_event(TransferEvent::BatchStarted {
        operation: first.operation,
        total: items.len(),
    });

    let semaphore = Semaphore::new(limit.max(1));
    let semaphore = &semaphore;
    let task = &task;

    let mut running: FuturesUnordered<_> = items
        .into_iter()
        .map(|item| async move {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.acquire() => permit.ok(),
            };

            let result = match permit {
                Some(_permit) if !cancel.is_cancelled() => task(item.clone()).await,
                _ => Err(Error::Cancelled(format!("{} not started", item.subject()))),
            };
            (item, result)
        })
        .collect();

    while let Some((item, result)) = running.next().await {
        report.record(item, result, observer);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::{Location, RemotePath};
    use crate::transfer::{NoopObserver, Operation};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn items(n: usize) -> Vec<TransferItem> {
        (0..n)
            .map(|i| {
                TransferItem::new(
                    Operation::Upload,
                    Location::Local(PathBuf::from(format!("f{i}"))),
                    Location::Remote(RemotePath::new("b", format!("f{i}"))),
                )
            })
            .collect()
    }

    #[derive(Default)]
    struct Gauge {
        active: AtomicUsize,
        peak: AtomicUsize,
        finished: AtomicUsize,
    }

    impl Gauge {
        async fn work(&self) -> Result<u64> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }
    }

    #[tokio::test]
    async fn test_concurrency_cap_is_respected() {
        let gauge = Gauge::default();
        let cancel = CancellationToken::new();

        let report = run_batch(items(25), 10, &cancel, &NoopObserver, |_| gauge.work()).await;

        assert_eq!(gauge.finished.load(Ordering::SeqCst), 25);
        assert_eq!(gauge.active.load(Ordering::SeqCst), 0);
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!(peak <= 10, "peak concurrency was {peak}");
        assert!(peak > 1, "items never overlapped");
        assert_eq!(report.succeeded(), 25);
        assert_eq!(report.bytes, 25);
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_batch() {
        let cancel = CancellationToken::new();
        let report = run_batch(items(6), 2, &cancel, &NoopObserver, |item| async move {
            match item.source.to_string().as_str() {
                "f1" | "f4" => Err(Error::Network("boom".to_string())),
                _ => Ok(10),
            }
        })
        .await;

        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.failed.len(), 2);
        let mut failed: Vec<_> = report.failed.iter().map(|f| f.path.as_str()).collect();
        failed.sort();
        assert_eq!(failed, vec!["f1", "f4"]);
    }

    #[tokio::test]
    async fn test_cancelled_batch_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let gauge = Gauge::default();

        let report = run_batch(items(5), 2, &cancel, &NoopObserver, |_| gauge.work()).await;

        assert_eq!(gauge.finished.load(Ordering::SeqCst), 0);
        assert_eq!(report.failed.len(), 5);
        assert!(report.failed[0].error.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let cancel = CancellationToken::new();
        let report = run_batch(vec![], 4, &cancel, &NoopObserver, |_| async { Ok(0) }).await;
        assert_eq!(report.succeeded(), 0);
        assert!(!report.has_failures());
    }
}
