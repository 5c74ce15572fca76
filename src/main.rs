//! # cf-tool (cf)
//!
//! `cf upgrade` replaces the running `cf` binary with the latest release:
//! - `cf upgrade` checks, asks for confirmation, downloads and swaps
//! - `cf upgrade --check` only reports whether a newer release exists
//! - `cf home` prints the directory holding `config.toml`
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use cf_tool::{UpgradeOptions, cmd_upgrade, paths};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "cf",
    version,
    about = "cf-tool (cf) - keeps itself up to date",
    arg_required_else_help = true
)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Cmd {
    /// Upgrade cf itself to the latest release
    Upgrade {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Only check whether a newer release exists
        #[arg(long, conflicts_with = "yes")]
        check: bool,
        /// Timeout for the release metadata request, in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Print the cf home directory
    Home,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.cmd {
        Cmd::Upgrade {
            yes,
            check,
            timeout,
        } => cmd_upgrade(&UpgradeOptions {
            yes,
            check,
            timeout_secs: timeout,
        }),
        Cmd::Home => {
            println!("{}", paths()?.home.display());
            Ok(())
        }
    }
}

/// CLI entry point.
///
/// Failures are printed in red and turn into a non-zero exit status.
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "✘".red(), e);
            ExitCode::FAILURE
        }
    }
}
