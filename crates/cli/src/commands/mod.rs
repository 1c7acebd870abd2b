//! Command definitions and dispatch

mod cp;
mod mv;
mod sync;
mod transfer;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tokio_util::sync::CancellationToken;

use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

/// obsctl - copy, move and sync files with OBS object storage
#[derive(Parser, Debug)]
#[command(name = "obsctl", version, about, propagate_version = true)]
pub struct Cli {
    /// Output results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Region, overriding OBS_REGION and the profile
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Credential profile from config.toml
    #[arg(long, global = true, env = "OBSCTL_PROFILE")]
    pub profile: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Copy files or objects
    Cp(cp::CpArgs),

    /// Move files or objects (copy, then remove the source)
    Mv(mv::MvArgs),

    /// Make a destination tree match a source tree
    Sync(sync::SyncArgs),

    /// Generate shell completion scripts
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Options shared by every command that talks to the service
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub profile: Option<String>,
    pub region: Option<String>,
}

/// Execute the parsed command line
pub async fn execute(cli: Cli, cancel: CancellationToken) -> ExitCode {
    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
    };
    let globals = GlobalOptions {
        profile: cli.profile,
        region: cli.region,
    };

    match cli.command {
        Commands::Cp(args) => cp::execute(args, &globals, output_config, cancel).await,
        Commands::Mv(args) => mv::execute(args, &globals, output_config, cancel).await,
        Commands::Sync(args) => sync::execute(args, &globals, output_config, cancel).await,
        Commands::Completions(args) => {
            clap_complete::generate(
                args.shell,
                &mut Cli::command(),
                "obsctl",
                &mut std::io::stdout(),
            );
            ExitCode::Success
        }
    }
}
