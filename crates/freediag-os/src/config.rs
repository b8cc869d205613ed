//! Timing configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OsError, OsResult};

/// Default tick period on UNIX-like systems (1ms).
#[cfg(not(windows))]
pub const DEFAULT_TICK_PERIOD_MS: u64 = 1;

/// Default tick period on Windows (20ms). The timer queue does not hold
/// anything finer reliably.
#[cfg(windows)]
pub const DEFAULT_TICK_PERIOD_MS: u64 = 20;

/// Upper bound accepted for the tick period.
pub const MAX_TICK_PERIOD_MS: u64 = 1_000;

/// Default wait between the two teardown attempts.
pub const DEFAULT_TEARDOWN_RETRY_DELAY_MS: u64 = 500;

/// Which OS facility drives the periodic tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickSourceKind {
    /// The platform's own interval timer: `SIGALRM` from `setitimer` on UNIX,
    /// a timer-queue timer on Windows, the ticker thread elsewhere.
    #[default]
    Native,
    /// A dedicated ticker thread sleeping to absolute deadlines.
    Thread,
}

/// Real-time scheduling parameters applied by `elevate_priority`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeSetup {
    /// Fixed priority requested for the process.
    ///
    /// On Linux: `SCHED_FIFO` priority, clamped to the range the kernel reports.
    /// On Windows: ignored, the process moves to the high priority class.
    pub priority: i32,

    /// Lock all current and future pages into memory (Linux only).
    pub lock_memory: bool,
}

impl Default for RealtimeSetup {
    fn default() -> Self {
        Self {
            priority: 1,
            lock_memory: false,
        }
    }
}

impl RealtimeSetup {
    /// Create a setup with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the real-time priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set memory locking.
    pub fn with_lock_memory(mut self, enabled: bool) -> Self {
        self.lock_memory = enabled;
        self
    }
}

/// Configuration for an [`OsContext`](crate::OsContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Period of the recurring tick in milliseconds.
    pub tick_period_ms: u64,

    /// OS facility that raises the tick.
    pub tick_source: TickSourceKind,

    /// Most ticks replayed in one go when the dispatcher falls behind.
    /// Anything beyond is skipped and counted.
    pub max_catch_up_ticks: u32,

    /// Wait before the second and final teardown attempt.
    pub teardown_retry_delay_ms: u64,

    /// Parameters for `elevate_priority`.
    pub realtime: RealtimeSetup,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: DEFAULT_TICK_PERIOD_MS,
            tick_source: TickSourceKind::Native,
            max_catch_up_ticks: 16,
            teardown_retry_delay_ms: DEFAULT_TEARDOWN_RETRY_DELAY_MS,
            realtime: RealtimeSetup::default(),
        }
    }
}

impl TimingConfig {
    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> TimingConfigBuilder {
        TimingConfigBuilder::default()
    }

    /// Tick period as a [`Duration`].
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    /// Teardown retry delay as a [`Duration`].
    pub fn teardown_retry_delay(&self) -> Duration {
        Duration::from_millis(self.teardown_retry_delay_ms)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::InvalidConfig`] if any value is out of range.
    pub fn validate(&self) -> OsResult {
        if self.tick_period_ms == 0 {
            return Err(OsError::invalid_config(
                "tick_period_ms must be greater than 0",
            ));
        }
        if self.tick_period_ms > MAX_TICK_PERIOD_MS {
            return Err(OsError::invalid_config(format!(
                "tick_period_ms must be at most {MAX_TICK_PERIOD_MS}"
            )));
        }
        if self.max_catch_up_ticks == 0 {
            return Err(OsError::invalid_config(
                "max_catch_up_ticks must be greater than 0",
            ));
        }
        if self.teardown_retry_delay_ms > 10_000 {
            return Err(OsError::invalid_config(
                "teardown_retry_delay_ms must be at most 10000",
            ));
        }
        if self.realtime.priority < 0 {
            return Err(OsError::invalid_config(
                "realtime.priority must not be negative",
            ));
        }
        Ok(())
    }
}

/// Builder for [`TimingConfig`].
#[derive(Debug, Default)]
pub struct TimingConfigBuilder {
    config: TimingConfig,
}

impl TimingConfigBuilder {
    /// Set the tick period in milliseconds.
    #[must_use]
    pub fn tick_period_ms(mut self, ms: u64) -> Self {
        self.config.tick_period_ms = ms;
        self
    }

    /// Set the tick source.
    #[must_use]
    pub fn tick_source(mut self, source: TickSourceKind) -> Self {
        self.config.tick_source = source;
        self
    }

    /// Set the catch-up limit.
    #[must_use]
    pub fn max_catch_up_ticks(mut self, ticks: u32) -> Self {
        self.config.max_catch_up_ticks = ticks;
        self
    }

    /// Set the teardown retry delay in milliseconds.
    #[must_use]
    pub fn teardown_retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.teardown_retry_delay_ms = ms;
        self
    }

    /// Set the real-time scheduling parameters.
    #[must_use]
    pub fn realtime(mut self, setup: RealtimeSetup) -> Self {
        self.config.realtime = setup;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> OsResult<TimingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = TimingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_period_ms, DEFAULT_TICK_PERIOD_MS);
        assert_eq!(config.tick_source, TickSourceKind::Native);
        assert_eq!(config.teardown_retry_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_builder_pattern() {
        let config = TimingConfig::builder()
            .tick_period_ms(10)
            .tick_source(TickSourceKind::Thread)
            .max_catch_up_ticks(4)
            .realtime(RealtimeSetup::new().with_priority(5).with_lock_memory(true))
            .build();

        let Ok(config) = config else {
            panic!("valid config rejected");
        };
        assert_eq!(config.tick_period(), Duration::from_millis(10));
        assert_eq!(config.tick_source, TickSourceKind::Thread);
        assert_eq!(config.max_catch_up_ticks, 4);
        assert_eq!(config.realtime.priority, 5);
        assert!(config.realtime.lock_memory);
    }

    #[test]
    fn test_rejects_zero_period() {
        let result = TimingConfig::builder().tick_period_ms(0).build();
        assert!(matches!(result, Err(OsError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_long_period() {
        let result = TimingConfig::builder()
            .tick_period_ms(MAX_TICK_PERIOD_MS + 1)
            .build();
        assert!(matches!(result, Err(OsError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_catch_up() {
        let result = TimingConfig::builder().max_catch_up_ticks(0).build();
        assert!(matches!(result, Err(OsError::InvalidConfig(_))));
    }

    #[test]
    fn test_partial_document_uses_defaults() -> Result<(), serde_json::Error> {
        let config: TimingConfig =
            serde_json::from_str(r#"{ "tick_period_ms": 5, "tick_source": "thread" }"#)?;
        assert_eq!(config.tick_period_ms, 5);
        assert_eq!(config.tick_source, TickSourceKind::Thread);
        assert_eq!(config.max_catch_up_ticks, 16);
        assert_eq!(config.realtime, RealtimeSetup::default());
        Ok(())
    }
}
