//! Transfer and synchronization engine
//!
//! Expands `cp`, `mv` and `sync` requests into individual [`TransferItem`]s,
//! runs them, and collects per-item outcomes into a [`BatchReport`]. A failed
//! item never aborts its siblings; failures are reported through the
//! [`TransferObserver`] as they happen and listed in the report afterwards.

mod diff;
mod engine;
mod pool;
mod timestamp;
mod walk;

use std::fmt;

use serde::Serialize;

use crate::error::Error;
use crate::path::Location;

pub use diff::{DiffResult, ObjectRecord, SyncRecord, diff};
pub use engine::{EngineOptions, SyncOptions, SyncReport, TransferEngine};
pub use pool::{DEFAULT_CONCURRENCY, run_batch};
pub use timestamp::{parse_remote_time, remote_time_or_min};
pub use walk::{ExcludePattern, FileRecord, walk_directory};

/// Kind of work a single item performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Upload,
    Download,
    Copy,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::Copy => "copy",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// One concrete unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub operation: Operation,
    pub source: Location,
    /// Destination; for deletes this is the location being removed
    pub destination: Location,
    pub expected_size: Option<u64>,
}

impl TransferItem {
    pub fn new(operation: Operation, source: Location, destination: Location) -> Self {
        Self {
            operation,
            source,
            destination,
            expected_size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Location reported in failure messages
    pub fn subject(&self) -> &Location {
        match self.operation {
            Operation::Delete => &self.destination,
            _ => &self.source,
        }
    }
}

/// A failed item, kept for the end-of-command summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub operation: Operation,
    pub path: String,
    pub error: String,
}

/// Progress notifications emitted while a command runs
#[derive(Debug)]
pub enum TransferEvent<'a> {
    /// A batch of `total` items is about to start
    BatchStarted { operation: Operation, total: usize },
    Completed { item: &'a TransferItem, bytes: u64 },
    Failed(&'a ItemFailure),
}

/// Receives progress events; implementations must tolerate concurrent calls
pub trait TransferObserver: Send + Sync {
    fn on_event(&self, event: TransferEvent<'_>);
}

/// Observer that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {
    fn on_event(&self, _event: TransferEvent<'_>) {}
}

/// Aggregate outcome of a batch
#[derive(Debug, Default, Clone)]
pub struct BatchReport {
    /// Items that finished successfully, in completion order
    pub completed: Vec<TransferItem>,
    pub failed: Vec<ItemFailure>,
    /// Bytes moved by completed items
    pub bytes: u64,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.completed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Number of completed items of one kind
    pub fn count(&self, operation: Operation) -> usize {
        self.completed
            .iter()
            .filter(|item| item.operation == operation)
            .count()
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.completed.extend(other.completed);
        self.failed.extend(other.failed);
        self.bytes += other.bytes;
    }

    /// Record one item's outcome and notify the observer
    pub fn record(
        &mut self,
        item: TransferItem,
        result: crate::Result<u64>,
        observer: &dyn TransferObserver,
    ) {
        match result {
            Ok(bytes) => {
                tracing::debug!(operation = %item.operation, source = %item.source, bytes, "Item completed");
                observer.on_event(TransferEvent::Completed { item: &item, bytes });
                self.bytes += bytes;
                self.completed.push(item);
            }
            Err(error) => self.record_failure(&item, &error, observer),
        }
    }

    fn record_failure(
        &mut self,
        item: &TransferItem,
        error: &Error,
        observer: &dyn TransferObserver,
    ) {
        let failure = ItemFailure {
            operation: item.operation,
            path: item.subject().to_string(),
            error: error.to_string(),
        };
        tracing::debug!(operation = %failure.operation, path = %failure.path, error = %failure.error, "Item failed");
        observer.on_event(TransferEvent::Failed(&failure));
        self.failed.push(failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::RemotePath;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl TransferObserver for Recorder {
        fn on_event(&self, event: TransferEvent<'_>) {
            let line = match event {
                TransferEvent::BatchStarted { total, .. } => format!("start {total}"),
                TransferEvent::Completed { item, bytes } => format!("ok {} {bytes}", item.source),
                TransferEvent::Failed(f) => format!("{} failed: {}", f.operation, f.path),
            };
            self.0.lock().unwrap().push(line);
        }
    }

    fn upload(name: &str) -> TransferItem {
        TransferItem::new(
            Operation::Upload,
            Location::Local(PathBuf::from(name)),
            Location::Remote(RemotePath::new("b", name)),
        )
    }

    #[test]
    fn test_report_records_both_outcomes() {
        let observer = Recorder::default();
        let mut report = BatchReport::default();

        report.record(upload("a.txt"), Ok(5), &observer);
        report.record(
            upload("b.txt"),
            Err(Error::Network("connection reset".to_string())),
            &observer,
        );

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.bytes, 5);
        assert!(report.has_failures());
        assert_eq!(report.failed[0].path, "b.txt");
        assert!(report.failed[0].error.contains("connection reset"));

        let lines = observer.0.lock().unwrap();
        assert_eq!(lines.as_slice(), ["ok a.txt 5", "upload failed: b.txt"]);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_item_failure_is_not_a_warning() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let mut report = BatchReport::default();
            report.record(
                upload("a.txt"),
                Err(Error::Network("connection reset".to_string())),
                &NoopObserver,
            );
            assert!(report.has_failures());
        });

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.is_empty(), "unexpected log output: {logged}");
    }

    #[test]
    fn test_delete_subject_is_destination() {
        let item = TransferItem::new(
            Operation::Delete,
            Location::Remote(RemotePath::new("b", "x")),
            Location::Remote(RemotePath::new("b", "y")),
        );
        assert_eq!(item.subject().to_string(), "obs://b/y");
    }

    #[test]
    fn test_merge() {
        let observer = NoopObserver;
        let mut a = BatchReport::default();
        a.record(upload("a"), Ok(1), &observer);
        let mut b = BatchReport::default();
        b.record(upload("b"), Ok(2), &observer);
        a.merge(b);
        assert_eq!(a.succeeded(), 2);
        assert_eq!(a.bytes, 3);
        assert_eq!(a.count(Operation::Upload), 2);
        assert_eq!(a.count(Operation::Delete), 0);
    }
}
