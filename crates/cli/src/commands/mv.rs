//! mv command - Move files and objects
//!
//! Copies like `cp`, then removes each source that was copied successfully.

use clap::Args;
use tokio_util::sync::CancellationToken;

use super::GlobalOptions;
use super::cp::{self, CopyMode, CpArgs};
use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

/// Move files or objects
#[derive(Args, Debug)]
pub struct MvArgs {
    /// Source path (local path or obs://container/key)
    pub source: String,

    /// Destination path (local path or obs://container/key)
    pub destination: String,

    /// Move directories and prefixes recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Number of parallel uploads (defaults to the configured concurrency)
    #[arg(short = 'P', long)]
    pub parallel: Option<usize>,
}

impl From<MvArgs> for CpArgs {
    fn from(args: MvArgs) -> Self {
        CpArgs {
            source: args.source,
            destination: args.destination,
            recursive: args.recursive,
            parallel: args.parallel,
        }
    }
}

/// Execute the mv command
pub async fn execute(
    args: MvArgs,
    globals: &GlobalOptions,
    output_config: OutputConfig,
    cancel: CancellationToken,
) -> ExitCode {
    cp::run(CopyMode::Move, args.into(), globals, output_config, cancel).await
}
