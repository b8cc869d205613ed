//! Millisecond sleep with a lower-bound guarantee.
//!
//! The backend sleep may come back early (a tick signal, a coarse OS timer);
//! the loop here measures elapsed time on the monotonic clock and sleeps again
//! for whatever is left.

use std::thread;
use std::time::{Duration, Instant};

use crate::backend::OsBackend;
use crate::error::OsResult;
use crate::platform::NativeBackend;

/// Suspend the calling thread for at least `ms` milliseconds.
///
/// `ms == 0` yields the processor instead of sleeping.
///
/// # Errors
///
/// Returns [`OsError::SleepInterrupted`](crate::OsError::SleepInterrupted) if
/// the platform sleep fails for a reason other than a benign interruption.
pub fn millisleep(ms: u64) -> OsResult {
    millisleep_with(&NativeBackend::new(), ms)
}

/// [`millisleep`] on an explicit backend.
///
/// # Errors
///
/// Propagates the first error returned by [`OsBackend::sleep_for`].
pub fn millisleep_with(backend: &dyn OsBackend, ms: u64) -> OsResult {
    if ms == 0 {
        thread::yield_now();
        return Ok(());
    }

    let target = Duration::from_millis(ms);
    let start = Instant::now();
    loop {
        let elapsed = start.elapsed();
        if elapsed >= target {
            return Ok(());
        }
        backend.sleep_for(target.saturating_sub(elapsed))?;
    }
}
