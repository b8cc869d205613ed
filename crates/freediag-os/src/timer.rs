//! Recurring tick: OS timer source plus dispatcher thread.
//!
//! The OS source only notifies a [`TickPulse`]. A dispatcher thread owned by
//! the running timer waits on the pulse and, for every elapsed period, advances
//! the L3 timers and then the L2 timers. Running all protocol work on that one
//! thread keeps dispatches serialized and out of signal context.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::{OsBackend, PeriodicTimer};
use crate::cadence::CadenceMetrics;
use crate::config::TimingConfig;
use crate::error::{OsError, OsResult};
use crate::layers::ProtocolTimers;
use crate::pulse::TickPulse;

static NEXT_SERVICE_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Id of the service whose dispatcher runs on this thread, 0 elsewhere.
    static DISPATCHING_FOR: Cell<u64> = const { Cell::new(0) };
}

/// Lifecycle state of the tick timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerState {
    /// No OS source armed and no dispatcher running.
    Uninitialized,
    /// Source armed and dispatcher running.
    Running,
}

/// Snapshot of tick counters and dispatch cadence.
///
/// Counters accumulate over every run of the same service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickStats {
    /// Periods signalled by the OS source.
    pub raised: u64,
    /// Periods for which L3 and L2 were advanced.
    pub dispatched: u64,
    /// Periods dropped because the dispatcher was too far behind.
    pub skipped: u64,
    /// Dispatcher wake-ups.
    pub wakes: u64,
    /// Wake-ups that handled more than one period.
    pub catch_up_wakes: u64,
    /// Largest wake-up jitter in microseconds.
    pub max_jitter_us: u64,
    /// Median wake-up jitter in microseconds.
    pub p50_jitter_us: u64,
    /// 99th percentile wake-up jitter in microseconds.
    pub p99_jitter_us: u64,
}

#[derive(Debug, Default)]
struct DispatchStats {
    raised_by_previous_runs: AtomicU64,
    dispatched: AtomicU64,
    skipped: AtomicU64,
    cadence: Mutex<CadenceMetrics>,
}

struct RunningTimer {
    source: Box<dyn PeriodicTimer>,
    pulse: Arc<TickPulse>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Drop for RunningTimer {
    fn drop(&mut self) {
        // A dispatcher that is not joined must still see the pulse close.
        self.pulse.close();
    }
}

/// Owner of the recurring tick.
///
/// `init` and `close` are serialized by one lock, so concurrent callers see
/// the `Uninitialized -> Running -> Uninitialized` transitions one at a time.
/// The running timer sits behind a second, short-lived lock so protocol timers
/// may query [`state`](Self::state) or [`stats`](Self::stats) while `close`
/// waits for their dispatch to finish.
pub struct TimerService {
    id: u64,
    backend: Arc<dyn OsBackend>,
    config: TimingConfig,
    layers: Arc<dyn ProtocolTimers>,
    lifecycle: Mutex<()>,
    running: Mutex<Option<RunningTimer>>,
    stats: Arc<DispatchStats>,
}

impl std::fmt::Debug for TimerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerService")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl TimerService {
    /// Create a stopped timer that will drive `layers`.
    pub fn new(
        backend: Arc<dyn OsBackend>,
        config: TimingConfig,
        layers: Arc<dyn ProtocolTimers>,
    ) -> Self {
        Self {
            id: NEXT_SERVICE_ID.fetch_add(1, Ordering::Relaxed),
            backend,
            config,
            layers,
            lifecycle: Mutex::new(()),
            running: Mutex::new(None),
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Arm the OS source and start dispatching.
    ///
    /// Calling it while already running does nothing and returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::InvalidConfig`] if the configuration is rejected and
    /// [`OsError::TimerSetup`] if the source or the dispatcher cannot start.
    /// The service is left uninitialized in both cases.
    pub fn init(&self) -> OsResult {
        if self.on_own_dispatcher() {
            return Ok(());
        }

        let _lifecycle = self.lifecycle.lock();
        if self.running.lock().is_some() {
            debug!("tick timer already running");
            return Ok(());
        }

        self.config.validate()?;
        let period = self.config.tick_period();
        let pulse = Arc::new(TickPulse::new()?);

        let dispatcher = {
            let pulse = Arc::clone(&pulse);
            let layers = Arc::clone(&self.layers);
            let stats = Arc::clone(&self.stats);
            let max_catch_up = u64::from(self.config.max_catch_up_ticks);
            let id = self.id;
            thread::Builder::new()
                .name("diag-os-dispatch".into())
                .spawn(move || {
                    DISPATCHING_FOR.with(|slot| slot.set(id));
                    run_dispatcher(&pulse, layers.as_ref(), &stats, period, max_catch_up);
                })
                .map_err(OsError::timer_setup)?
        };

        let source = match self
            .backend
            .arm_periodic(self.config.tick_source, period, Arc::clone(&pulse))
        {
            Ok(source) => source,
            Err(e) => {
                pulse.close();
                if dispatcher.join().is_err() {
                    error!("dispatcher panicked during failed init");
                }
                return Err(e);
            }
        };

        info!(
            period_ms = self.config.tick_period_ms,
            source = source.label(),
            "tick timer armed"
        );

        *self.running.lock() = Some(RunningTimer {
            source,
            pulse,
            dispatcher: Some(dispatcher),
        });
        Ok(())
    }

    /// Stop the OS source, then stop and join the dispatcher.
    ///
    /// Does nothing when not running. No L3/L2 advance happens once this
    /// returns `Ok(())`.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::TimerTeardown`] if the source still refuses to stop
    /// after one retry (the timer then stays running and `close` may be called
    /// again), or if called from inside a dispatch.
    pub fn close(&self) -> OsResult {
        if self.on_own_dispatcher() {
            return Err(OsError::timer_teardown(
                "close called from the tick dispatcher",
            ));
        }

        let _lifecycle = self.lifecycle.lock();
        let Some(mut timer) = self.running.lock().take() else {
            return Ok(());
        };

        if let Err(e) = self.disarm_with_retry(timer.source.as_mut()) {
            *self.running.lock() = Some(timer);
            return Err(e);
        }

        timer.pulse.close();
        if let Some(dispatcher) = timer.dispatcher.take() {
            if dispatcher.join().is_err() {
                error!("tick dispatcher panicked");
            }
        }

        self.stats
            .raised_by_previous_runs
            .fetch_add(timer.pulse.raised(), Ordering::Relaxed);

        info!("tick timer stopped");
        Ok(())
    }

    fn disarm_with_retry(&self, source: &mut dyn PeriodicTimer) -> OsResult {
        let first = match source.disarm() {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        warn!(
            error = %first,
            attempt = 1,
            source = source.label(),
            "problem deleting OS timer, retrying"
        );

        if let Err(e) = self.backend.sleep_for(self.config.teardown_retry_delay()) {
            debug!(error = %e, "teardown retry delay cut short");
        }

        source.disarm().map_err(|e| {
            error!(error = %e, attempt = 2, source = source.label(), "could not delete OS timer");
            match e {
                OsError::TimerTeardown(_) => e,
                other => OsError::timer_teardown(other),
            }
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TimerState {
        if self.running.lock().is_some() {
            TimerState::Running
        } else {
            TimerState::Uninitialized
        }
    }

    /// True while the tick is running.
    pub fn is_running(&self) -> bool {
        self.state() == TimerState::Running
    }

    /// Snapshot of counters and cadence.
    pub fn stats(&self) -> TickStats {
        let current_raised = self
            .running
            .lock()
            .as_ref()
            .map_or(0, |timer| timer.pulse.raised());

        let mut cadence = self.stats.cadence.lock();
        TickStats {
            raised: self.stats.raised_by_previous_runs.load(Ordering::Relaxed) + current_raised,
            dispatched: self.stats.dispatched.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            wakes: cadence.wakes,
            catch_up_wakes: cadence.catch_up_wakes,
            max_jitter_us: cadence.max_jitter_us,
            p50_jitter_us: cadence.p50_jitter_us(),
            p99_jitter_us: cadence.p99_jitter_us(),
        }
    }

    /// Configuration the service was created with.
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    fn on_own_dispatcher(&self) -> bool {
        DISPATCHING_FOR.with(Cell::get) == self.id
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        if self.running.get_mut().is_some() {
            warn!("tick timer dropped while running - stopping");
            if let Err(e) = self.close() {
                error!(error = %e, "tick timer could not be stopped on drop");
            }
        }
    }
}

fn run_dispatcher(
    pulse: &TickPulse,
    layers: &dyn ProtocolTimers,
    stats: &DispatchStats,
    period: Duration,
    max_catch_up: u64,
) {
    debug!("tick dispatcher started");
    let mut last_wake = Instant::now();

    while let Some(ticks) = pulse.wait_for_ticks() {
        let now = Instant::now();
        stats
            .cadence
            .lock()
            .record_wake(now.saturating_duration_since(last_wake), ticks, period);
        last_wake = now;

        let due = ticks.min(max_catch_up);
        let skipped = ticks - due;
        if skipped > 0 {
            stats.skipped.fetch_add(skipped, Ordering::Relaxed);
            debug!(skipped, "dispatcher fell behind, ticks skipped");
        }

        for _ in 0..due {
            if pulse.is_closed() {
                break;
            }
            layers.advance_l3();
            layers.advance_l2();
            stats.dispatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    debug!("tick dispatcher stopped");
}
