mod completion;
mod dispatch;
mod render;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::completion::CliCompletionShell;
use crate::dispatch::run_cli;

#[derive(Parser, Debug)]
#[command(name = "cone")]
#[command(about = "Declarative cross-platform package installer", long_about = None)]
struct Cli {
    /// Installation prefix; defaults to $CONE_PREFIX, then the per-user location.
    #[arg(long, global = true)]
    prefix: Option<PathBuf>,
    /// Catalog document to read instead of the configured one.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install packages and their dependencies.
    Install {
        #[arg(required = true)]
        names: Vec<String>,
        /// Install even when prerequisites are not met.
        #[arg(long)]
        force: bool,
    },
    Uninstall {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Update the named packages, or everything installed.
    Update { names: Vec<String> },
    List,
    Info { name: String },
    Search { query: String },
    /// Remove dependencies nothing installed needs anymore.
    Gc,
    Paths,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

fn main() -> Result<()> {
    init_tracing();
    run_cli(Cli::parse())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CONE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[cfg(test)]
mod tests;
