//! `cp`, `mv` and `sync` orchestration
//!
//! The engine dispatches on which side of a request is remote:
//!
//! | source | destination | action |
//! |--------|-------------|--------|
//! | local  | remote      | upload (worker pool when recursive) |
//! | remote | local       | streamed download, sequential |
//! | remote | remote      | server-side copy, sequential |
//! | local  | local       | usage error |

use std::collections::HashMap;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use jiff::Timestamp;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::diff::{DiffResult, ObjectRecord, diff};
use super::pool::{DEFAULT_CONCURRENCY, run_batch};
use super::timestamp::parse_remote_time;
use super::walk::{ExcludePattern, FileRecord, walk_directory};
use super::{BatchReport, Operation, TransferEvent, TransferItem, TransferObserver};
use crate::error::{Error, Result};
use crate::path::{Location, RemotePath};
use crate::traits::{ObjectReader, ObjectStore};

static NEXT_STAGING_ID: AtomicU64 = AtomicU64::new(0);

/// Engine-wide settings
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Worker pool size for uploads
    pub concurrency: usize,
    /// Tripped to abort in-flight calls and skip pending items
    pub cancel: CancellationToken,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
        }
    }
}

/// Flags accepted by `sync`
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Remove destination paths that are absent from the source
    pub delete: bool,
    /// Base-name glob applied to both sides
    pub exclude: Option<ExcludePattern>,
    /// Compute the plan without changing anything
    pub dry_run: bool,
}

/// Outcome of one `sync` run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub plan: DiffResult,
    #[serde(skip)]
    pub batch: BatchReport,
    pub dry_run: bool,
}

/// Executes transfer commands against an object store
pub struct TransferEngine<'a> {
    store: &'a dyn ObjectStore,
    reader: &'a dyn ObjectReader,
    observer: &'a dyn TransferObserver,
    options: EngineOptions,
}

impl<'a> TransferEngine<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        reader: &'a dyn ObjectReader,
        observer: &'a dyn TransferObserver,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            reader,
            observer,
            options,
        }
    }

    /// Copy `source` to `destination`.
    ///
    /// Single-object copies return their error directly. Recursive copies
    /// collect per-item failures in the returned report.
    pub async fn copy(
        &self,
        source: &Location,
        destination: &Location,
        recursive: bool,
    ) -> Result<BatchReport> {
        match (source, destination) {
            (Location::Local(src), Location::Remote(dst)) => self.upload(src, dst, recursive).await,
            (Location::Remote(src), Location::Local(dst)) => {
                self.download(src, dst, recursive).await
            }
            (Location::Remote(src), Location::Remote(dst)) => {
                self.remote_copy(src, dst, recursive).await
            }
            (Location::Local(_), Location::Local(_)) => Err(Error::Usage(
                "At least one of source and destination must be remote (obs://...)".to_string(),
            )),
        }
    }

    /// Copy, then remove the source of every item that was copied.
    ///
    /// Sources of failed items are left in place.
    pub async fn move_to(
        &self,
        source: &Location,
        destination: &Location,
        recursive: bool,
    ) -> Result<BatchReport> {
        let mut report = self.copy(source, destination, recursive).await?;

        let deletes: Vec<TransferItem> = report
            .completed
            .iter()
            .map(|item| {
                TransferItem::new(Operation::Delete, item.source.clone(), item.source.clone())
            })
            .collect();

        if recursive {
            report.merge(self.run_sequential(deletes).await);
        } else {
            for item in deletes {
                report.merge(self.run_single(item).await?);
            }
        }

        Ok(report)
    }

    /// One-way reconciliation between a local directory and a remote prefix
    pub async fn sync(
        &self,
        source: &Location,
        destination: &Location,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        match (source, destination) {
            (Location::Local(src), Location::Remote(dst)) => self.sync_up(src, dst, options).await,
            (Location::Remote(src), Location::Local(dst)) => {
                self.sync_down(src, dst, options).await
            }
            _ => Err(Error::Usage(
                "sync requires one local directory and one remote location".to_string(),
            )),
        }
    }

    async fn upload(&self, src: &Path, dst: &RemotePath, recursive: bool) -> Result<BatchReport> {
        let metadata = tokio::fs::metadata(src)
            .await
            .map_err(|e| Error::fs(src, e))?;

        if metadata.is_dir() {
            if !recursive {
                return Err(Error::Usage(format!(
                    "{} is a directory (use --recursive)",
                    src.display()
                )));
            }

            let files = self.walk(src, None).await?;
            let items = files
                .into_iter()
                .map(|file| upload_item(file, dst))
                .collect();
            return Ok(self.run_pool(items).await);
        }

        let target = if dst.is_dir_like() {
            let name = src
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    Error::Usage(format!("Cannot derive an object name from {}", src.display()))
                })?;
            dst.join(&name)
        } else {
            dst.clone()
        };

        let item = TransferItem::new(
            Operation::Upload,
            Location::Local(src.to_path_buf()),
            Location::Remote(target),
        )
        .with_size(metadata.len());
        self.run_single(item).await
    }

    async fn download(&self, src: &RemotePath, dst: &Path, recursive: bool) -> Result<BatchReport> {
        if recursive {
            let records = self.list(src, None).await?;
            if records.is_empty() {
                return Err(Error::NotFound(format!("No objects under {src}")));
            }
            create_dir(dst).await?;

            let mut items = Vec::with_capacity(records.len());
            let mut report = BatchReport::default();
            for record in records {
                let item_source = Location::Remote(RemotePath::new(&src.container, &record.key));
                match local_target(dst, &record.relative_path) {
                    Ok(target) => items.push(
                        TransferItem::new(Operation::Download, item_source, Location::Local(target))
                            .with_size(record.size.max(0) as u64),
                    ),
                    Err(e) => {
                        let item = TransferItem::new(
                            Operation::Download,
                            item_source,
                            Location::Local(dst.to_path_buf()),
                        );
                        report.record(item, Err(e), self.observer);
                    }
                }
            }
            report.merge(self.run_sequential(items).await);
            return Ok(report);
        }

        let Some(name) = src.base_name().filter(|_| !src.key.ends_with('/')) else {
            return Err(Error::Usage(format!(
                "{src} does not name an object (use --recursive for a prefix)"
            )));
        };

        let target = if is_dir_target(dst).await {
            dst.join(name)
        } else {
            dst.to_path_buf()
        };

        let item = TransferItem::new(
            Operation::Download,
            Location::Remote(src.clone()),
            Location::Local(target),
        );
        self.run_single(item).await
    }

    async fn remote_copy(
        &self,
        src: &RemotePath,
        dst: &RemotePath,
        recursive: bool,
    ) -> Result<BatchReport> {
        if recursive {
            let records = self.list(src, None).await?;
            if records.is_empty() {
                return Err(Error::NotFound(format!("No objects under {src}")));
            }
            let items = records
                .into_iter()
                .map(|record| {
                    TransferItem::new(
                        Operation::Copy,
                        Location::Remote(RemotePath::new(&src.container, &record.key)),
                        Location::Remote(dst.join(&record.relative_path)),
                    )
                    .with_size(record.size.max(0) as u64)
                })
                .collect();
            return Ok(self.run_sequential(items).await);
        }

        let Some(name) = src.base_name().filter(|_| !src.key.ends_with('/')) else {
            return Err(Error::Usage(format!(
                "{src} does not name an object (use --recursive for a prefix)"
            )));
        };
        let target = if dst.is_dir_like() {
            dst.join(name)
        } else {
            dst.clone()
        };

        let item = TransferItem::new(
            Operation::Copy,
            Location::Remote(src.clone()),
            Location::Remote(target),
        );
        self.run_single(item).await
    }

    async fn sync_up(
        &self,
        src: &Path,
        dst: &RemotePath,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let metadata = tokio::fs::metadata(src)
            .await
            .map_err(|e| Error::fs(src, e))?;
        if !metadata.is_dir() {
            return Err(Error::Usage(format!(
                "sync source {} is not a directory",
                src.display()
            )));
        }

        let local = self.walk(src, options.exclude.clone()).await?;
        let remote = self.list(dst, options.exclude.as_ref()).await?;
        let plan = diff(&local, &remote, options.delete);
        tracing::info!(
            transfer = plan.to_transfer.len(),
            delete = plan.to_delete.len(),
            unchanged = plan.unchanged,
            "Sync plan computed"
        );

        if options.dry_run {
            return Ok(SyncReport {
                plan,
                batch: BatchReport::default(),
                dry_run: true,
            });
        }

        let mut by_path: HashMap<String, FileRecord> = local
            .into_iter()
            .map(|file| (file.relative_path.clone(), file))
            .collect();
        let uploads = plan
            .to_transfer
            .iter()
            .filter_map(|rel| by_path.remove(rel))
            .map(|file| upload_item(file, dst))
            .collect();
        let mut batch = self.run_pool(uploads).await;

        if options.delete {
            let deletes = plan
                .to_delete
                .iter()
                .map(|rel| {
                    let target = Location::Remote(dst.join(rel));
                    TransferItem::new(Operation::Delete, target.clone(), target)
                })
                .collect();
            batch.merge(self.run_sequential(deletes).await);
        }

        Ok(SyncReport {
            plan,
            batch,
            dry_run: false,
        })
    }

    async fn sync_down(
        &self,
        src: &RemotePath,
        dst: &Path,
        options: &SyncOptions,
    ) -> Result<SyncReport> {
        let remote = self.list(src, options.exclude.as_ref()).await?;
        let local = if tokio::fs::try_exists(dst).await.unwrap_or(false) {
            self.walk(dst, options.exclude.clone()).await?
        } else {
            Vec::new()
        };
        let plan = diff(&remote, &local, options.delete);
        tracing::info!(
            transfer = plan.to_transfer.len(),
            delete = plan.to_delete.len(),
            unchanged = plan.unchanged,
            "Sync plan computed"
        );

        if options.dry_run {
            return Ok(SyncReport {
                plan,
                batch: BatchReport::default(),
                dry_run: true,
            });
        }

        create_dir(dst).await?;

        let by_path: HashMap<&str, &ObjectRecord> = remote
            .iter()
            .map(|record| (record.relative_path.as_str(), record))
            .collect();

        let mut batch = BatchReport::default();
        let pending: Vec<&ObjectRecord> = plan
            .to_transfer
            .iter()
            .filter_map(|rel| by_path.get(rel.as_str()).copied())
            .collect();
        if !pending.is_empty() {
            self.observer.on_event(TransferEvent::BatchStarted {
                operation: Operation::Download,
                total: pending.len(),
            });
        }
        for record in pending {
            let source = Location::Remote(RemotePath::new(&src.container, &record.key));
            let (item, result) = match local_target(dst, &record.relative_path) {
                Ok(target) => {
                    let item = TransferItem::new(
                        Operation::Download,
                        source,
                        Location::Local(target.clone()),
                    )
                    .with_size(record.size.max(0) as u64);
                    let modified = record.last_modified.as_deref().and_then(parse_remote_time);
                    let remote = RemotePath::new(&src.container, &record.key);
                    let result = self.fetch(&remote, &target, modified).await;
                    (item, result)
                }
                Err(e) => (
                    TransferItem::new(Operation::Download, source, Location::Local(dst.into())),
                    Err(e),
                ),
            };
            batch.record(item, result, self.observer);
        }

        if options.delete {
            let deletes = plan
                .to_delete
                .iter()
                .filter_map(|rel| local_target(dst, rel).ok())
                .map(|path| {
                    let target = Location::Local(path);
                    TransferItem::new(Operation::Delete, target.clone(), target)
                })
                .collect();
            batch.merge(self.run_sequential(deletes).await);
        }

        Ok(SyncReport {
            plan,
            batch,
            dry_run: false,
        })
    }

    /// Perform one item
    async fn execute(&self, item: TransferItem) -> Result<u64> {
        match (item.operation, &item.source, &item.destination) {
            (Operation::Upload, Location::Local(src), Location::Remote(dst)) => {
                let info = self
                    .cancellable(&item, self.store.put_object(dst, src))
                    .await?;
                Ok(item
                    .expected_size
                    .unwrap_or_else(|| info.size_bytes.max(0) as u64))
            }
            (Operation::Download, Location::Remote(src), Location::Local(dst)) => {
                self.fetch(src, dst, None).await
            }
            (Operation::Copy, Location::Remote(src), Location::Remote(dst)) => {
                self.cancellable(&item, self.store.copy_object(src, dst))
                    .await?;
                Ok(item.expected_size.unwrap_or(0))
            }
            (Operation::Delete, _, Location::Remote(target)) => {
                self.cancellable(&item, self.store.delete_object(target))
                    .await?;
                Ok(0)
            }
            (Operation::Delete, _, Location::Local(target)) => {
                tokio::fs::remove_file(target)
                    .await
                    .map_err(|e| Error::fs(target, e))?;
                Ok(0)
            }
            (operation, source, destination) => Err(Error::Usage(format!(
                "Cannot {operation} from {source} to {destination}"
            ))),
        }
    }

    /// Stream one object to a local file, optionally stamping its mtime.
    ///
    /// The body is written to a staging file beside `dst` and renamed over it
    /// once complete, so a failed download leaves any existing file untouched.
    async fn fetch(&self, src: &RemotePath, dst: &Path, modified: Option<Timestamp>) -> Result<u64> {
        let cancel = &self.options.cancel;
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled(src.to_string())),
            stream = self.reader.get_object_stream(src) => stream?,
        };

        if let Some(parent) = dst.parent()
            && !parent.as_os_str().is_empty()
        {
            create_dir(parent).await?;
        }

        let (staging, file) = create_staging_file(dst).await?;
        let result: Result<u64> = async {
            let written = write_body(stream.body, file, &staging, cancel, src).await?;
            if let Some(expected) = stream.content_length
                && expected != written
            {
                return Err(Error::Network(format!(
                    "{src}: received {written} of {expected} bytes"
                )));
            }
            if let Some(modified) = modified {
                let mtime = filetime::FileTime::from_system_time(modified.into());
                filetime::set_file_mtime(&staging, mtime).map_err(|e| Error::fs(&staging, e))?;
            }
            tokio::fs::rename(&staging, dst)
                .await
                .map_err(|e| Error::fs(dst, e))?;
            Ok(written)
        }
        .await;

        match result {
            Ok(written) => {
                tracing::debug!(source = %src, target = %dst.display(), bytes = written, "Downloaded");
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                Err(e)
            }
        }
    }

    async fn cancellable<T>(
        &self,
        item: &TransferItem,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = self.options.cancel.cancelled() => Err(Error::Cancelled(item.subject().to_string())),
            result = call => result,
        }
    }

    async fn run_single(&self, item: TransferItem) -> Result<BatchReport> {
        let bytes = self.execute(item.clone()).await?;
        let mut report = BatchReport::default();
        report.record(item, Ok(bytes), self.observer);
        Ok(report)
    }

    async fn run_pool(&self, items: Vec<TransferItem>) -> BatchReport {
        run_batch(
            items,
            self.options.concurrency,
            &self.options.cancel,
            self.observer,
            |item| self.execute(item),
        )
        .await
    }

    async fn run_sequential(&self, items: Vec<TransferItem>) -> BatchReport {
        let mut report = BatchReport::default();
        if let Some(first) = items.first() {
            self.observer.on_event(TransferEvent::BatchStarted {
                operation: first.operation,
                total: items.len(),
            });
        }
        for item in items {
            let result = self.execute(item.clone()).await;
            report.record(item, result, self.observer);
        }
        report
    }

    async fn list(
        &self,
        prefix: &RemotePath,
        exclude: Option<&ExcludePattern>,
    ) -> Result<Vec<ObjectRecord>> {
        let listing = tokio::select! {
            biased;
            _ = self.options.cancel.cancelled() => return Err(Error::Cancelled(prefix.to_string())),
            listing = self.store.list_objects(&prefix.container, &prefix.key) => listing?,
        };
        let mut records = ObjectRecord::from_listing(prefix, listing);
        if let Some(pattern) = exclude {
            records.retain(|record| !pattern.matches(&record.relative_path));
        }
        tracing::debug!(prefix = %prefix, objects = records.len(), "Listed remote objects");
        Ok(records)
    }

    async fn walk(&self, root: &Path, exclude: Option<ExcludePattern>) -> Result<Vec<FileRecord>> {
        let root = root.to_path_buf();
        tokio::task::spawn_blocking(move || walk_directory(&root, exclude.as_ref()))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

fn upload_item(file: FileRecord, dst: &RemotePath) -> TransferItem {
    TransferItem::new(
        Operation::Upload,
        Location::Local(file.path),
        Location::Remote(dst.join(&file.relative_path)),
    )
    .with_size(file.size)
}

/// Create a fresh staging file next to `dst`
async fn create_staging_file(dst: &Path) -> Result<(PathBuf, tokio::fs::File)> {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Usage(format!("{} does not name a file", dst.display())))?;

    loop {
        let unique = NEXT_STAGING_ID.fetch_add(1, Ordering::Relaxed);
        let staging = dst.with_file_name(format!(
            ".{name}.obsctl-{}-{unique}",
            std::process::id()
        ));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .await
        {
            Ok(file) => return Ok((staging, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(Error::fs(&staging, e)),
        }
    }
}

async fn write_body(
    mut body: futures::stream::BoxStream<'static, std::io::Result<bytes::Bytes>>,
    mut file: tokio::fs::File,
    path: &Path,
    cancel: &CancellationToken,
    src: &RemotePath,
) -> Result<u64> {
    let mut written = 0u64;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled(src.to_string())),
            chunk = body.next() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk.map_err(|e| Error::Network(format!("reading {src}: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::fs(path, e))?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(|e| Error::fs(path, e))?;
    Ok(written)
}

/// Map a `/`-separated relative key onto `root`, refusing anything that
/// would escape it.
fn local_target(root: &Path, relative: &str) -> Result<PathBuf> {
    let mut target = root.to_path_buf();
    for segment in relative.split('/').filter(|s| !s.is_empty()) {
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => target.push(part),
            _ => {
                return Err(Error::Usage(format!(
                    "Refusing to write object key '{relative}' outside {}",
                    root.display()
                )));
            }
        }
    }
    Ok(target)
}

async fn is_dir_target(path: &Path) -> bool {
    let text = path.as_os_str().to_string_lossy();
    if text.ends_with('/') || text.ends_with(std::path::MAIN_SEPARATOR) {
        return true;
    }
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::fs(path, e))
}
