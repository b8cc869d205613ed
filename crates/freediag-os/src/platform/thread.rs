//! Portable tick source: a dedicated thread sleeping to absolute deadlines.
//!
//! Deadlines advance by exactly one period from the previous deadline, not from
//! the wake-up time, so oversleeping on one tick does not shift every later one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::backend::PeriodicTimer;
use crate::error::{OsError, OsResult};
use crate::pulse::TickPulse;

/// Once the ticker lags this many periods it stops replaying and realigns.
const MAX_LAG_PERIODS: u32 = 64;

/// Tick source backed by a ticker thread.
#[derive(Debug)]
pub struct ThreadTicker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ThreadTicker {
    /// Spawn the ticker thread.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::TimerSetup`] if the thread cannot be spawned.
    pub fn arm(period: Duration, pulse: Arc<TickPulse>) -> OsResult<Self> {
        if period.is_zero() {
            return Err(OsError::timer_setup("tick period must be non-zero"));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("diag-os-ticker".into())
                .spawn(move || run_ticker(period, &pulse, &stop))
                .map_err(OsError::timer_setup)?
        };

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }
}

fn run_ticker(period: Duration, pulse: &TickPulse, stop: &AtomicBool) {
    let max_lag = period.saturating_mul(MAX_LAG_PERIODS);
    let mut next = Instant::now() + period;

    while !stop.load(Ordering::Acquire) {
        let now = Instant::now();
        if now < next {
            thread::park_timeout(next.saturating_duration_since(now));
            continue;
        }

        pulse.notify();
        next += period;

        let lag = now.saturating_duration_since(next);
        if lag > max_lag {
            tracing::debug!(lag_ms = lag.as_millis(), "ticker realigned after stall");
            next = now + period;
        }
    }
}

impl PeriodicTimer for ThreadTicker {
    fn disarm(&mut self) -> OsResult {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::Release);
        thread.thread().unpark();
        thread
            .join()
            .map_err(|_panic| OsError::timer_teardown("ticker thread panicked"))
    }

    fn label(&self) -> &'static str {
        "thread"
    }
}

impl Drop for ThreadTicker {
    fn drop(&mut self) {
        if let Err(e) = self.disarm() {
            tracing::warn!(error = %e, "ticker thread did not stop cleanly");
        }
    }
}
