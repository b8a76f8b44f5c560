mod duration;
mod symlink;

pub use duration::{parse_duration, parse_timeout_secs};
pub use symlink::{check_symlink, is_symlink};
