//! cp command - Copy files and objects
//!
//! Uploads local files, downloads objects, or copies between remote
//! locations. A directory or prefix requires `--recursive`.

use clap::Args;
use tokio_util::sync::CancellationToken;

use super::GlobalOptions;
use super::transfer::{self, TransferContext, TransferSummary};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressObserver};

/// Copy files or objects
#[derive(Args, Debug)]
pub struct CpArgs {
    /// Source path (local path or obs://container/key)
    pub source: String,

    /// Destination path (local path or obs://container/key)
    pub destination: String,

    /// Copy directories and prefixes recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Number of parallel uploads (defaults to the configured concurrency)
    #[arg(short = 'P', long)]
    pub parallel: Option<usize>,
}

/// Whether the source is kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CopyMode {
    Copy,
    Move,
}

impl CopyMode {
    fn command(self) -> &'static str {
        match self {
            CopyMode::Copy => "cp",
            CopyMode::Move => "mv",
        }
    }
}

/// Execute the cp command
pub async fn execute(
    args: CpArgs,
    globals: &GlobalOptions,
    output_config: OutputConfig,
    cancel: CancellationToken,
) -> ExitCode {
    run(CopyMode::Copy, args, globals, output_config, cancel).await
}

pub(super) async fn run(
    mode: CopyMode,
    args: CpArgs,
    globals: &GlobalOptions,
    output_config: OutputConfig,
    cancel: CancellationToken,
) -> ExitCode {
    let formatter = Formatter::new(output_config);

    let (source, destination) = match transfer::parse_pair(&args.source, &args.destination) {
        Ok(pair) => pair,
        Err(e) => return transfer::fail(&formatter, &e, &cancel),
    };

    if !source.is_remote() && !destination.is_remote() {
        formatter.error("At least one of source and destination must be remote (obs://...)");
        return ExitCode::UsageError;
    }

    let context = match TransferContext::connect(globals, args.parallel).await {
        Ok(c) => c,
        Err(e) => return transfer::fail(&formatter, &e, &cancel),
    };

    let observer = ProgressObserver::new(formatter.clone());
    let engine = context.engine(&observer, &cancel);

    let result = match mode {
        CopyMode::Copy => engine.copy(&source, &destination, args.recursive).await,
        CopyMode::Move => engine.move_to(&source, &destination, args.recursive).await,
    };
    observer.finish();

    match result {
        Ok(report) => {
            let summary =
                TransferSummary::from_report(mode.command(), &source, &destination, &report);
            formatter.output(&summary);
            transfer::exit_for(&report, &cancel, &formatter)
        }
        Err(e) => transfer::fail(&formatter, &e, &cancel),
    }
}
