use clap::{Parser, Subcommand};

/// Diskwise - streaming storage intelligence for macOS
#[derive(Parser, Debug)]
#[command(name = "diskwise")]
#[command(version, author)]
#[command(about = "Streaming macOS storage intelligence engine - phased disk scanning, ranked cleanup recommendations, signed results", long_about = None)]
#[command(after_help = "EXAMPLES:\n  \
    diskwise                                   # Full scan, events on stdout\n  \
    diskwise scan                              # Same as above\n  \
    diskwise status                            # Re-emit the latest cached scan\n  \
    diskwise daemon                            # Rescan every hour until signalled\n  \
    diskwise swarm ~/Projects                  # Parallel swarm scan of one directory\n  \
    echo '{\"target_paths\":[\"/Users/me/.npm\"]}' | diskwise purge   # Validated deletion")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Only log errors to stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose diagnostics on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Full discovery pass (the default): stream JSON events to stdout
    Scan,

    /// Emit the most recent cached scan as a `complete` event
    Status,

    /// Long-running rescan loop; exits cleanly on SIGINT/SIGTERM
    Daemon,

    /// Parallel explorer/analyzer scan
    Swarm {
        /// Specific directory to scan instead of the default roots
        path: Option<String>,
    },

    /// Read {"target_paths": [...]} from stdin, delete validated paths
    Purge,
}
