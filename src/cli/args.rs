use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "spinlease",
    version,
    about = "Run a command while holding a lease-based lock",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (repeat for more)
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run COMMAND while holding the lock NAME
    Run {
        /// Lock name shared by all contenders
        #[arg(short, long, value_name = "NAME")]
        name: String,

        /// Acquire timeout and maximum run time (e.g., "3s", "2m")
        #[arg(short = 't', long, value_name = "DURATION", default_value = "3s")]
        timeout: String,

        /// Directory holding lease files (default: platform cache directory)
        #[arg(long, value_name = "DIR", conflicts_with = "noop")]
        lease_dir: Option<PathBuf>,

        /// Run without any locking (single-process use only)
        #[arg(long)]
        noop: bool,

        /// Command to run, after `--`
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },

    /// Delete expired lease files
    Housekeep {
        /// Lease directory to clean (default: platform cache directory)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,

        /// Only delete leases expired at least this long ago (e.g., "1h")
        #[arg(long, value_name = "DURATION")]
        older_than: Option<String>,

        /// Show what would be deleted without deleting
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}
