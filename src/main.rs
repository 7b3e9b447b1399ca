mod clean;
mod cli;
mod config;
mod enrich;
mod inference;
mod record;
mod run_log;
mod schema;
mod store;
mod util;
mod workflow;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::RootArgs::parse();
    init_tracing(args.verbose);

    match args.command {
        cli::Command::Run(args) => workflow::run_enrich(args),
        cli::Command::Status(args) => workflow::run_status(args),
        cli::Command::Salvage(args) => workflow::run_salvage(args),
        cli::Command::Clean(args) => workflow::run_clean(args),
    }
}

/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "bookrich=debug" } else { "bookrich=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
