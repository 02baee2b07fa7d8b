//! Command-line interface for export-to-corpus.
//!
//! Provides the default ingestion command and `rematch-media`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod rematch;
mod run;
mod utils;

pub use run::RunArgs;

/// Resolve media references in a ChatGPT conversation export into a
/// browsable, deduplicated corpus.
#[derive(Parser)]
#[command(name = "export-to-corpus")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    run_args: Option<RunArgs>,

    /// Enable verbose logging (sets log level to DEBUG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-run resolution over an existing extraction without re-unpacking
    RematchMedia(rematch::RematchArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::WARN.into())
    };
    let _ = tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).try_init();

    match cli.command {
        Some(Commands::RematchMedia(args)) => rematch::run(args),
        None => {
            let args = cli.run_args.ok_or_else(|| anyhow::anyhow!("an archive path is required"))?;
            run::run(args, cli.verbose)
        }
    }
}
