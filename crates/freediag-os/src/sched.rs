//! Real-time scheduling elevation with one-shot warnings.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;

use crate::backend::OsBackend;
use crate::config::RealtimeSetup;
use crate::error::{OsError, OsResult};

/// Tries to move the process into a fixed-priority real-time class.
///
/// Failing is normal on desktops and CI machines. Each kind of failure is
/// logged at `warn` the first time only; later attempts still go to the OS
/// and still return the error, just without a new log line.
pub struct SchedulingService {
    backend: Arc<dyn OsBackend>,
    setup: RealtimeSetup,
    scheduling_warned: AtomicBool,
    privilege_warned: AtomicBool,
}

impl std::fmt::Debug for SchedulingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulingService")
            .field("setup", &self.setup)
            .field("scheduling_warned", &self.scheduling_warned)
            .field("privilege_warned", &self.privilege_warned)
            .finish_non_exhaustive()
    }
}

impl SchedulingService {
    /// Create the service for `setup`.
    pub fn new(backend: Arc<dyn OsBackend>, setup: RealtimeSetup) -> Self {
        Self {
            backend,
            setup,
            scheduling_warned: AtomicBool::new(false),
            privilege_warned: AtomicBool::new(false),
        }
    }

    /// Attempt the elevation.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::SchedulingUnsupported`] or
    /// [`OsError::InsufficientPrivilege`]. Neither prevents the tick or the
    /// sleep services from working.
    pub fn elevate_priority(&self) -> OsResult {
        let result = self.backend.elevate_priority(&self.setup);
        if let Err(e) = &result {
            self.warn_once(e);
        }
        result
    }

    fn warn_once(&self, error: &OsError) {
        match error {
            OsError::InsufficientPrivilege(_) => {
                if !self.privilege_warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        error = %error,
                        "insufficient privilege for real-time scheduling; timing may be less accurate"
                    );
                }
            }
            _ => {
                if !self.scheduling_warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        error = %error,
                        "real-time scheduling not available; timing may be less accurate"
                    );
                }
            }
        }
    }

    /// True once the unsupported-scheduling warning has been logged.
    pub fn scheduling_warning_issued(&self) -> bool {
        self.scheduling_warned.load(Ordering::Relaxed)
    }

    /// True once the insufficient-privilege warning has been logged.
    pub fn privilege_warning_issued(&self) -> bool {
        self.privilege_warned.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::PeriodicTimer;
    use crate::config::TickSourceKind;
    use crate::pulse::TickPulse;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct Refusing {
        error: OsError,
        attempts: AtomicU32,
    }

    impl OsBackend for Refusing {
        fn arm_periodic(
            &self,
            _kind: TickSourceKind,
            _period: Duration,
            _pulse: Arc<TickPulse>,
        ) -> OsResult<Box<dyn PeriodicTimer>> {
            Err(OsError::timer_setup("not used"))
        }

        fn sleep_for(&self, _duration: Duration) -> OsResult {
            Ok(())
        }

        fn poll_input_ready(&self) -> bool {
            false
        }

        fn elevate_priority(&self, _setup: &RealtimeSetup) -> OsResult {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err(self.error.clone())
        }
    }

    fn refusing(error: OsError) -> Arc<Refusing> {
        Arc::new(Refusing {
            error,
            attempts: AtomicU32::new(0),
        })
    }

    #[test]
    fn test_flags_follow_error_kind() {
        let backend = refusing(OsError::insufficient_privilege("EPERM"));
        let shared: Arc<dyn OsBackend> = Arc::clone(&backend) as Arc<dyn OsBackend>;
        let service = SchedulingService::new(shared, RealtimeSetup::default());

        assert!(matches!(
            service.elevate_priority(),
            Err(OsError::InsufficientPrivilege(_))
        ));
        assert!(service.privilege_warning_issued());
        assert!(!service.scheduling_warning_issued());
    }

    #[test]
    fn test_every_call_reaches_backend() {
        let backend = refusing(OsError::scheduling_unsupported("no SCHED_FIFO"));
        let shared: Arc<dyn OsBackend> = Arc::clone(&backend) as Arc<dyn OsBackend>;
        let service = SchedulingService::new(shared, RealtimeSetup::default());

        for _ in 0..3 {
            assert!(service.elevate_priority().is_err());
        }
        assert_eq!(backend.attempts.load(Ordering::Relaxed), 3);
        assert!(service.scheduling_warning_issued());
    }
}
