//! Shared setup and reporting for cp, mv and sync

use std::fmt;
use std::sync::Arc;

use obs_client::{AuthSession, ObsClient, RawStreamClient};
use obs_core::transfer::{
    BatchReport, DiffResult, EngineOptions, ItemFailure, Operation, TransferEngine,
    TransferObserver,
};
use obs_core::{ConfigManager, Error, Location, parse_location};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::GlobalOptions;
use crate::exit_code::ExitCode;
use crate::output::Formatter;

/// Clients and settings for one transfer command
pub struct TransferContext {
    store: ObsClient,
    reader: RawStreamClient,
    concurrency: usize,
}

impl TransferContext {
    /// Load configuration and build the service clients.
    ///
    /// No request is sent here; authentication happens on the first download.
    pub async fn connect(globals: &GlobalOptions, parallel: Option<usize>) -> obs_core::Result<Self> {
        let config = ConfigManager::new()?.load()?;
        let credentials = config.resolve(globals.profile.as_deref(), globals.region.as_deref())?;

        let http = obs_client::http_client(&config.transfer)?;
        let auth = Arc::new(AuthSession::new(http.clone(), credentials.clone()));
        let reader = RawStreamClient::new(http, auth);
        let store = ObsClient::new(&credentials, &config.transfer).await?;

        let concurrency = parallel.unwrap_or(config.transfer.concurrency).max(1);
        tracing::debug!(region = %credentials.region, concurrency, "Transfer context ready");

        Ok(Self {
            store,
            reader,
            concurrency,
        })
    }

    pub fn engine<'a>(
        &'a self,
        observer: &'a dyn TransferObserver,
        cancel: &CancellationToken,
    ) -> TransferEngine<'a> {
        TransferEngine::new(
            &self.store,
            &self.reader,
            observer,
            EngineOptions {
                concurrency: self.concurrency,
                cancel: cancel.clone(),
            },
        )
    }
}

/// Parse a source and destination argument pair
pub fn parse_pair(source: &str, destination: &str) -> obs_core::Result<(Location, Location)> {
    Ok((parse_location(source)?, parse_location(destination)?))
}

/// End-of-command summary
#[derive(Debug, Serialize)]
pub struct TransferSummary {
    pub command: &'static str,
    pub source: String,
    pub destination: String,
    pub transferred: usize,
    pub deleted: usize,
    /// Paths left alone because the destination was up to date
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<DiffResult>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ItemFailure>,
}

impl TransferSummary {
    pub fn from_report(
        command: &'static str,
        source: &Location,
        destination: &Location,
        report: &BatchReport,
    ) -> Self {
        let deleted = report.count(Operation::Delete);
        Self {
            command,
            source: source.to_string(),
            destination: destination.to_string(),
            transferred: report.succeeded() - deleted,
            deleted,
            skipped: 0,
            failed: report.failed.len(),
            bytes: report.bytes,
            dry_run: false,
            plan: None,
            failures: report.failed.clone(),
        }
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            let (transfer, delete) = self
                .plan
                .as_ref()
                .map(|p| (p.to_transfer.len(), p.to_delete.len()))
                .unwrap_or_default();
            return write!(
                f,
                "Dry run: {transfer} to transfer, {delete} to delete, {} unchanged",
                self.skipped
            );
        }

        write!(
            f,
            "{} transferred ({}), {} deleted, {} unchanged, {} failed",
            self.transferred,
            humansize::format_size(self.bytes, humansize::BINARY),
            self.deleted,
            self.skipped,
            self.failed
        )
    }
}

/// Exit code for a command that produced a report
pub fn exit_for(report: &BatchReport, cancel: &CancellationToken, formatter: &Formatter) -> ExitCode {
    if cancel.is_cancelled() {
        formatter.warning("Interrupted; remaining items were not transferred");
        ExitCode::Interrupted
    } else if report.has_failures() {
        ExitCode::PartialFailure
    } else {
        ExitCode::Success
    }
}

/// Report a fatal error and pick the exit code
pub fn fail(formatter: &Formatter, error: &Error, cancel: &CancellationToken) -> ExitCode {
    formatter.error(&error.to_string());
    if cancel.is_cancelled() {
        ExitCode::Interrupted
    } else {
        ExitCode::from_error(error)
    }
}
