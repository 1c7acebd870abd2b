//! sync command - Make a destination tree match a source tree
//!
//! Transfers files that are missing or newer at the source. With `--delete`,
//! destination files absent from the source are removed.

use clap::Args;
use comfy_table::{Table, presets};
use obs_core::transfer::{DiffResult, ExcludePattern, SyncOptions};
use tokio_util::sync::CancellationToken;

use super::GlobalOptions;
use super::transfer::{self, TransferContext, TransferSummary};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressObserver};

/// Synchronize a local directory with a remote prefix
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source (local directory or obs://container/prefix)
    pub source: String,

    /// Destination (local directory or obs://container/prefix)
    pub destination: String,

    /// Delete destination files that do not exist at the source
    #[arg(long)]
    pub delete: bool,

    /// Skip files whose name matches this glob (e.g. '*.tmp')
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Option<String>,

    /// Show what would change without transferring anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Number of parallel uploads (defaults to the configured concurrency)
    #[arg(short = 'P', long)]
    pub parallel: Option<usize>,
}

/// Execute the sync command
pub async fn execute(
    args: SyncArgs,
    globals: &GlobalOptions,
    output_config: OutputConfig,
    cancel: CancellationToken,
) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (source, destination) = match transfer::parse_pair(&args.source, &args.destination) {
        Ok(pair) => pair,
        Err(e) => return transfer::fail(&formatter, &e, &cancel),
    };

    if source.is_remote() == destination.is_remote() {
        formatter.error("sync requires one local directory and one remote location (obs://...)");
        return ExitCode::UsageError;
    }

    let exclude = match args.exclude.as_deref().map(ExcludePattern::new).transpose() {
        Ok(pattern) => pattern,
        Err(e) => return transfer::fail(&formatter, &e, &cancel),
    };

    let options = SyncOptions {
        delete: args.delete,
        exclude,
        dry_run: args.dry_run,
    };

    let context = match TransferContext::connect(globals, args.parallel).await {
        Ok(c) => c,
        Err(e) => return transfer::fail(&formatter, &e, &cancel),
    };

    let observer = ProgressObserver::new(formatter.clone());
    let result = context
        .engine(&observer, &cancel)
        .sync(&source, &destination, &options)
        .await;
    observer.finish();

    let report = match result {
        Ok(report) => report,
        Err(e) => return transfer::fail(&formatter, &e, &cancel),
    };

    if report.dry_run && formatter.shows_progress() {
        if report.plan.is_empty() {
            formatter.success("Already in sync");
        } else {
            let transfer_action = if source.is_remote() { "download" } else { "upload" };
            let table = plan_table(&report.plan, transfer_action, formatter.colors_enabled());
            formatter.println(&table.to_string());
        }
    }

    let mut summary = TransferSummary::from_report("sync", &source, &destination, &report.batch);
    summary.skipped = report.plan.unchanged;
    summary.dry_run = report.dry_run;
    if report.dry_run {
        summary.plan = Some(report.plan.clone());
    }
    formatter.output(&summary);

    transfer::exit_for(&report.batch, &cancel, &formatter)
}

/// Table of the actions a dry run would take
fn plan_table(plan: &DiffResult, transfer_action: &str, utf8: bool) -> Table {
    let mut table = Table::new();
    table.load_preset(if utf8 {
        presets::UTF8_FULL_CONDENSED
    } else {
        presets::ASCII_FULL_CONDENSED
    });
    table.set_header(vec!["Action", "Path"]);

    for path in &plan.to_transfer {
        table.add_row(vec![transfer_action, path.as_str()]);
    }
    for path in &plan.to_delete {
        table.add_row(vec!["delete", path.as_str()]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(source: &str, destination: &str) -> SyncArgs {
        SyncArgs {
            source: source.to_string(),
            destination: destination.to_string(),
            delete: false,
            exclude: None,
            dry_run: false,
            parallel: None,
        }
    }

    async fn run(args: SyncArgs) -> ExitCode {
        execute(
            args,
            &GlobalOptions::default(),
            OutputConfig {
                quiet: true,
                ..Default::default()
            },
            CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_two_local_paths_is_usage_error() {
        assert_eq!(run(args("./a", "./b")).await, ExitCode::UsageError);
    }

    #[tokio::test]
    async fn test_two_remote_paths_is_usage_error() {
        assert_eq!(
            run(args("obs://a/x/", "obs://b/y/")).await,
            ExitCode::UsageError
        );
    }

    #[tokio::test]
    async fn test_invalid_exclude_is_usage_error() {
        let mut args = args("./site", "obs://backups/site/");
        args.exclude = Some("[".to_string());
        assert_eq!(run(args).await, ExitCode::UsageError);
    }

    #[test]
    fn test_plan_table_lists_actions() {
        let plan = DiffResult {
            to_transfer: ["a.txt".to_string(), "sub/b.txt".to_string()].into(),
            to_delete: ["old.txt".to_string()].into(),
            unchanged: 4,
        };
        let rendered = plan_table(&plan, "upload", false).to_string();

        assert!(rendered.contains("Action"));
        assert!(rendered.contains("upload"));
        assert!(rendered.contains("sub/b.txt"));
        assert!(rendered.contains("delete"));
        assert!(rendered.contains("old.txt"));
        let upload_row = rendered.find("a.txt").unwrap();
        let delete_row = rendered.find("old.txt").unwrap();
        assert!(upload_row < delete_row);
    }
}
