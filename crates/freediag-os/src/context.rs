//! Process timing context tying the services together.

use std::sync::Arc;

use serde::Serialize;

use crate::backend::OsBackend;
use crate::config::TimingConfig;
use crate::error::OsResult;
use crate::input::is_input_pending_with;
use crate::layers::ProtocolTimers;
use crate::platform::NativeBackend;
use crate::sched::SchedulingService;
use crate::sleep::millisleep_with;
use crate::timer::{TickStats, TimerService, TimerState};

/// Snapshot of the process timing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessTimingState {
    /// `init` has succeeded and `close` has not.
    pub initialized: bool,
    /// An OS timer source is armed.
    pub timer_active: bool,
    /// The unsupported-scheduling warning has been logged.
    pub scheduling_warning_issued: bool,
    /// The insufficient-privilege warning has been logged.
    pub privilege_warning_issued: bool,
}

/// Timing and scheduling substrate for one protocol stack.
///
/// Build one at startup, optionally call [`elevate_priority`](Self::elevate_priority),
/// then [`init`](Self::init). Sleep and input polling work whether or not the
/// tick is running, from any thread.
///
/// ```no_run
/// use std::sync::Arc;
/// use freediag_os::{FnTimers, OsContext, TimingConfig};
///
/// # fn main() -> Result<(), freediag_os::OsError> {
/// let layers = Arc::new(FnTimers::new(|| { /* L3 */ }, || { /* L2 */ }));
/// let ctx = OsContext::new(TimingConfig::default(), layers)?;
///
/// let _ = ctx.elevate_priority();
/// ctx.init()?;
/// while !ctx.is_input_pending() {
///     ctx.millisleep(50)?;
/// }
/// ctx.close()?;
/// # Ok(())
/// # }
/// ```
pub struct OsContext {
    backend: Arc<dyn OsBackend>,
    timer: TimerService,
    scheduling: SchedulingService,
}

impl std::fmt::Debug for OsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsContext")
            .field("timer", &self.timer)
            .field("scheduling", &self.scheduling)
            .finish_non_exhaustive()
    }
}

impl OsContext {
    /// Context on the native backend.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::InvalidConfig`](crate::OsError::InvalidConfig) if
    /// `config` does not validate.
    pub fn new(config: TimingConfig, layers: Arc<dyn ProtocolTimers>) -> OsResult<Self> {
        Self::with_backend(Arc::new(NativeBackend::new()), config, layers)
    }

    /// Context on an explicit backend.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::InvalidConfig`](crate::OsError::InvalidConfig) if
    /// `config` does not validate.
    pub fn with_backend(
        backend: Arc<dyn OsBackend>,
        config: TimingConfig,
        layers: Arc<dyn ProtocolTimers>,
    ) -> OsResult<Self> {
        config.validate()?;
        let scheduling = SchedulingService::new(Arc::clone(&backend), config.realtime.clone());
        let timer = TimerService::new(Arc::clone(&backend), config, layers);
        Ok(Self {
            backend,
            timer,
            scheduling,
        })
    }

    /// Start the recurring tick. Idempotent.
    ///
    /// # Errors
    ///
    /// See [`TimerService::init`].
    pub fn init(&self) -> OsResult {
        self.timer.init()
    }

    /// Stop the recurring tick. No-op when not running.
    ///
    /// # Errors
    ///
    /// See [`TimerService::close`].
    pub fn close(&self) -> OsResult {
        self.timer.close()
    }

    /// Sleep at least `ms` milliseconds.
    ///
    /// # Errors
    ///
    /// See [`millisleep`](crate::millisleep).
    pub fn millisleep(&self, ms: u64) -> OsResult {
        millisleep_with(self.backend.as_ref(), ms)
    }

    /// True if a line of console input is waiting.
    pub fn is_input_pending(&self) -> bool {
        is_input_pending_with(self.backend.as_ref())
    }

    /// Try to enter the real-time scheduling class.
    ///
    /// # Errors
    ///
    /// See [`SchedulingService::elevate_priority`].
    pub fn elevate_priority(&self) -> OsResult {
        self.scheduling.elevate_priority()
    }

    /// Snapshot of the timing state.
    pub fn state(&self) -> ProcessTimingState {
        let running = self.timer.state() == TimerState::Running;
        ProcessTimingState {
            initialized: running,
            timer_active: running,
            scheduling_warning_issued: self.scheduling.scheduling_warning_issued(),
            privilege_warning_issued: self.scheduling.privilege_warning_issued(),
        }
    }

    /// Tick counters and dispatch cadence.
    pub fn tick_stats(&self) -> TickStats {
        self.timer.stats()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &TimingConfig {
        self.timer.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TickSourceKind;
    use crate::error::OsError;
    use crate::layers::NoopTimers;

    #[test]
    fn test_rejects_invalid_config() {
        let config = TimingConfig {
            max_catch_up_ticks: 0,
            ..TimingConfig::default()
        };
        assert!(matches!(
            OsContext::new(config, Arc::new(NoopTimers)),
            Err(OsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_state_follows_lifecycle() -> OsResult {
        let config = TimingConfig::builder()
            .tick_period_ms(5)
            .tick_source(TickSourceKind::Thread)
            .build()?;
        let ctx = OsContext::new(config, Arc::new(NoopTimers))?;

        assert!(!ctx.state().initialized);
        ctx.init()?;
        let running = ctx.state();
        assert!(running.initialized && running.timer_active);

        ctx.close()?;
        let stopped = ctx.state();
        assert!(!stopped.initialized && !stopped.timer_active);
        Ok(())
    }

    #[test]
    fn test_sleep_and_poll_without_init() -> OsResult {
        let ctx = OsContext::new(TimingConfig::default(), Arc::new(NoopTimers))?;
        ctx.millisleep(0)?;
        ctx.millisleep(2)?;
        let _ = ctx.is_input_pending();
        Ok(())
    }
}
