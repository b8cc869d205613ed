//! Platform capability seam.
//!
//! Everything OS specific sits behind [`OsBackend`]. The services above it hold
//! the policy (idempotence, retries, warn-once, lower-bound sleeps) and stay
//! identical on every platform. Tests plug in fakes here.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{RealtimeSetup, TickSourceKind};
use crate::error::OsResult;
use crate::pulse::TickPulse;

/// A recurring timer source that has been armed.
pub trait PeriodicTimer: Send {
    /// Stop the source.
    ///
    /// After `Ok(())` no further [`TickPulse::notify`] calls are made by this
    /// source. Calling it again after an error retries; calling it again after
    /// success is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::TimerTeardown`](crate::OsError::TimerTeardown) if the
    /// platform refused to stop the source.
    fn disarm(&mut self) -> OsResult;

    /// Short name of the source for logs.
    fn label(&self) -> &'static str;
}

/// The per-platform capability set used by [`OsContext`](crate::OsContext).
pub trait OsBackend: Send + Sync {
    /// Start a recurring source that calls `pulse.notify()` once per `period`.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::TimerSetup`](crate::OsError::TimerSetup) if the source
    /// cannot be armed.
    fn arm_periodic(
        &self,
        kind: TickSourceKind,
        period: Duration,
        pulse: Arc<TickPulse>,
    ) -> OsResult<Box<dyn PeriodicTimer>>;

    /// Block the calling thread for about `duration`.
    ///
    /// Implementations resume across benign interruptions; returning early is
    /// tolerated because the caller re-checks the clock.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::SleepInterrupted`](crate::OsError::SleepInterrupted)
    /// if the wait failed for any other reason.
    fn sleep_for(&self, duration: Duration) -> OsResult;

    /// True if a complete line of console input is waiting. Never blocks.
    fn poll_input_ready(&self) -> bool;

    /// Move the process into a fixed-priority real-time scheduling class.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::SchedulingUnsupported`](crate::OsError::SchedulingUnsupported)
    /// or [`OsError::InsufficientPrivilege`](crate::OsError::InsufficientPrivilege).
    fn elevate_priority(&self, setup: &RealtimeSetup) -> OsResult;
}

impl<B: OsBackend + ?Sized> OsBackend for Arc<B> {
    fn arm_periodic(
        &self,
        kind: TickSourceKind,
        period: Duration,
        pulse: Arc<TickPulse>,
    ) -> OsResult<Box<dyn PeriodicTimer>> {
        (**self).arm_periodic(kind, period, pulse)
    }

    fn sleep_for(&self, duration: Duration) -> OsResult {
        (**self).sleep_for(duration)
    }

    fn poll_input_ready(&self) -> bool {
        (**self).poll_input_ready()
    }

    fn elevate_priority(&self, setup: &RealtimeSetup) -> OsResult {
        (**self).elevate_priority(setup)
    }
}
