mod attest;
mod cli;
mod config;
mod daemon;
mod events;
mod probe;
mod progress;
mod purge;
mod recommend;
mod risk;
mod scanner;
mod store;
mod swarm;
mod tools;
mod types;
mod utils;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use events::Emitter;
use std::sync::Arc;
use tools::SystemRunner;
use tracing_subscriber::EnvFilter;
use utils::expand_tilde;

fn init_logging(quiet: bool, verbose: bool) {
    // stdout is the event protocol; diagnostics go to stderr only.
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    let cfg = Config::from_env();
    let tools = SystemRunner;

    match cli.command {
        None | Some(Commands::Scan) => {
            let emitter = Emitter::stdout();
            scanner::run_scan(&cfg, &emitter, &tools)?;
        }
        Some(Commands::Status) => {
            let emitter = Emitter::stdout();
            scanner::emit_cached_status(&cfg, &emitter)?;
        }
        Some(Commands::Daemon) => {
            let emitter = Emitter::stdout();
            daemon::run_daemon(&cfg, &emitter, &tools)?;
        }
        Some(Commands::Swarm { path }) => {
            let emitter = Arc::new(Emitter::stdout());
            // Item paths are absolute; resolve the target before scanning.
            let target = path.map(|p| {
                let expanded = expand_tilde(&p);
                expanded.canonicalize().unwrap_or(expanded)
            });
            swarm::run_swarm_scan(&cfg, emitter, target)?;
        }
        Some(Commands::Purge) => {
            purge::run_purge(&cfg)?;
        }
    }
    Ok(())
}
