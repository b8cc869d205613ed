//! Native platform backend.
//!
//! One module per platform family, selected at build time:
//! - **UNIX**: `SIGALRM` + `setitimer`, `nanosleep`, `poll(2)`, `SCHED_FIFO`
//! - **Windows**: timer-queue timer, `Sleep`, `GetAsyncKeyState`, priority class
//! - **Other**: ticker thread and standard library sleep
//!
//! The ticker thread is available everywhere through [`TickSourceKind::Thread`].

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{OsBackend, PeriodicTimer};
use crate::config::{RealtimeSetup, TickSourceKind};
use crate::error::OsResult;
use crate::pulse::TickPulse;

mod thread;
pub use self::thread::ThreadTicker;

#[cfg(unix)]
mod signal;
#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use self::signal::SignalTicker;
#[cfg(unix)]
pub use self::unix::fd_ready;
#[cfg(unix)]
use self::unix as imp;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use self::windows::TimerQueueTicker;
#[cfg(windows)]
use self::windows as imp;

#[cfg(not(any(unix, windows)))]
mod fallback;
#[cfg(not(any(unix, windows)))]
use self::fallback as imp;

/// Backend using the facilities of the platform the crate was built for.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl NativeBackend {
    /// Create the native backend.
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
fn arm_native(period: Duration, pulse: Arc<TickPulse>) -> OsResult<Box<dyn PeriodicTimer>> {
    Ok(Box::new(SignalTicker::arm(period, pulse)?))
}

#[cfg(windows)]
fn arm_native(period: Duration, pulse: Arc<TickPulse>) -> OsResult<Box<dyn PeriodicTimer>> {
    Ok(Box::new(TimerQueueTicker::arm(period, pulse)?))
}

#[cfg(not(any(unix, windows)))]
fn arm_native(period: Duration, pulse: Arc<TickPulse>) -> OsResult<Box<dyn PeriodicTimer>> {
    Ok(Box::new(ThreadTicker::arm(period, pulse)?))
}

impl OsBackend for NativeBackend {
    fn arm_periodic(
        &self,
        kind: TickSourceKind,
        period: Duration,
        pulse: Arc<TickPulse>,
    ) -> OsResult<Box<dyn PeriodicTimer>> {
        match kind {
            TickSourceKind::Native => arm_native(period, pulse),
            TickSourceKind::Thread => Ok(Box::new(ThreadTicker::arm(period, pulse)?)),
        }
    }

    fn sleep_for(&self, duration: Duration) -> OsResult {
        imp::sleep_for(duration)
    }

    fn poll_input_ready(&self) -> bool {
        imp::stdin_ready()
    }

    fn elevate_priority(&self, setup: &RealtimeSetup) -> OsResult {
        imp::elevate_priority(setup)
    }
}
