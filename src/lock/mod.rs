mod clock;
mod mutex;
mod retry;
mod spinlock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use mutex::{Mutex, MutexStrategy};
pub use retry::{Backoff, RetryLoop};
pub use spinlock::{LockKey, SpinlockStrategy, KEY_PREFIX};
