use crate::cli::Command;
use spinlease::utils::parse_timeout_secs;
use spinlease::{FileLeaseStore, Mutex, MutexError, Result, SyncError};
use std::process;
use std::sync::Arc;
use tracing::{info, warn};

pub fn execute_run(cmd: Command) -> Result<i32> {
    let Command::Run {
        name,
        timeout,
        lease_dir,
        noop,
        command,
    } = cmd
    else {
        return Err(MutexError::Other(
            "Internal error: expected Run command".to_string(),
        ));
    };

    let Some((program, program_args)) = command.split_first() else {
        return Err(MutexError::Other("No command given".to_string()));
    };

    let mut mutex = if noop {
        warn!("Running without a lock: --noop gives no mutual exclusion");
        Mutex::noop()
    } else {
        let timeout_secs = parse_timeout_secs(&timeout)?;
        let store = match lease_dir {
            Some(dir) => FileLeaseStore::new(dir)?,
            None => FileLeaseStore::open_default()?,
        };
        info!("Lease directory: {}", store.dir().display());
        Mutex::spinlock(&name, timeout_secs, Arc::new(store))?
    };

    let result = mutex.synchronized(|| {
        info!("Running '{}' under lock {}", program, name);
        process::Command::new(program).args(program_args).status()
    });

    match result {
        Ok(status) => {
            info!("Command finished: {}", status);
            // Killed by a signal
            Ok(status.code().unwrap_or(1))
        }
        Err(SyncError::Lock(e)) => Err(e),
        Err(SyncError::Work { source, release }) => {
            if let Some(e) = release {
                eprintln!("Error: {}", e);
            }
            Err(MutexError::CommandFailed {
                command: program.clone(),
                source,
            })
        }
    }
}
