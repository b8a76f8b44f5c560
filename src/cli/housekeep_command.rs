use crate::cli::Command;
use spinlease::housekeep::{clean_leases, CleanLeaseConfig};
use spinlease::store::default_lease_dir;
use spinlease::utils::parse_duration;
use spinlease::{MutexError, Result};

pub fn execute_housekeep(cmd: Command, verbose: u8) -> Result<i32> {
    let Command::Housekeep {
        dir,
        older_than,
        dry_run,
    } = cmd
    else {
        return Err(MutexError::Other(
            "Internal error: expected Housekeep command".to_string(),
        ));
    };

    let target_dir = match dir {
        Some(dir) => dir,
        None => default_lease_dir()?,
    };
    let older_than = match &older_than {
        Some(s) => Some(parse_duration(s)?),
        None => None,
    };

    let config = CleanLeaseConfig {
        dir: target_dir,
        older_than,
        dry_run,
    };

    let cleaned = clean_leases(&config)?;

    for path in &cleaned {
        println!(
            "{}{}",
            if dry_run {
                "[DRY RUN] Would delete: "
            } else {
                "Deleted: "
            },
            path.display()
        );
    }

    if verbose > 0 || dry_run {
        eprintln!("Cleaned {} lease file(s)", cleaned.len());
    }

    Ok(0)
}
