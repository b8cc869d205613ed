//! Error types for the OS timing layer.

use core::fmt;

/// Errors reported by the timing, sleep and scheduling services.
///
/// Input polling has no variant here: a failed poll is reported as
/// "no input pending".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OsError {
    /// The recurring OS timer source could not be armed.
    #[error("Timer setup failed: {0}")]
    TimerSetup(String),

    /// The recurring OS timer source could not be disarmed.
    #[error("Timer teardown failed: {0}")]
    TimerTeardown(String),

    /// A sleep was aborted by something other than a benign interruption.
    #[error("Sleep interrupted: {0}")]
    SleepInterrupted(String),

    /// The platform has no fixed-priority real-time scheduling class.
    #[error("Real-time scheduling unsupported: {0}")]
    SchedulingUnsupported(String),

    /// The caller lacks the privilege to enter the real-time class.
    #[error("Insufficient privilege for real-time scheduling: {0}")]
    InsufficientPrivilege(String),

    /// A configuration value is out of range.
    #[error("Invalid timing configuration: {0}")]
    InvalidConfig(String),
}

impl OsError {
    /// Create a timer setup error with context.
    #[must_use]
    pub fn timer_setup(context: impl fmt::Display) -> Self {
        OsError::TimerSetup(context.to_string())
    }

    /// Create a timer teardown error with context.
    #[must_use]
    pub fn timer_teardown(context: impl fmt::Display) -> Self {
        OsError::TimerTeardown(context.to_string())
    }

    /// Create a sleep interruption error with context.
    #[must_use]
    pub fn sleep_interrupted(context: impl fmt::Display) -> Self {
        OsError::SleepInterrupted(context.to_string())
    }

    /// Create a scheduling-unsupported error with context.
    #[must_use]
    pub fn scheduling_unsupported(context: impl fmt::Display) -> Self {
        OsError::SchedulingUnsupported(context.to_string())
    }

    /// Create an insufficient-privilege error with context.
    #[must_use]
    pub fn insufficient_privilege(context: impl fmt::Display) -> Self {
        OsError::InsufficientPrivilege(context.to_string())
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        OsError::InvalidConfig(reason.into())
    }

    /// True for scheduling failures after which the caller keeps running with
    /// best-effort timing.
    pub fn is_degraded_mode(&self) -> bool {
        matches!(
            self,
            OsError::SchedulingUnsupported(_) | OsError::InsufficientPrivilege(_)
        )
    }

    /// True if retrying the failed operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            OsError::TimerSetup(_) => true,
            OsError::TimerTeardown(_) => true,
            OsError::SleepInterrupted(_) => true,
            OsError::SchedulingUnsupported(_) => false,
            OsError::InsufficientPrivilege(_) => false,
            OsError::InvalidConfig(_) => false,
        }
    }
}

/// Result type used across the crate.
pub type OsResult<T = ()> = Result<T, OsError>;
