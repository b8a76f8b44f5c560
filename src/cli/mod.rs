mod args;
mod housekeep_command;
mod run_command;

pub use args::{Args, Command};
use spinlease::Result;

/// Dispatch a parsed command line, returning the process exit code
pub fn run(args: Args) -> Result<i32> {
    match args.command {
        cmd @ Command::Run { .. } => run_command::execute_run(cmd),
        cmd @ Command::Housekeep { .. } => housekeep_command::execute_housekeep(cmd, args.verbose),
    }
}
