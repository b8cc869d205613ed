//! Fallback for targets that are neither UNIX nor Windows.

use std::time::Duration;

use crate::config::RealtimeSetup;
use crate::error::{OsError, OsResult};

/// `std::thread::sleep` already resumes after interruptions.
pub fn sleep_for(duration: Duration) -> OsResult {
    std::thread::sleep(duration);
    Ok(())
}

/// No console polling facility; never reports input.
pub fn stdin_ready() -> bool {
    false
}

/// No real-time scheduling class to move into.
pub fn elevate_priority(_setup: &RealtimeSetup) -> OsResult {
    Err(OsError::scheduling_unsupported(
        "no special scheduling support on this platform",
    ))
}
