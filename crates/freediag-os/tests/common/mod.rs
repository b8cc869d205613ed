//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use freediag_os::{
    OsBackend, OsError, OsResult, PeriodicTimer, ProtocolTimers, RealtimeSetup, TickPulse,
    TickSourceKind,
};
use parking_lot::Mutex;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Timer that never fires by itself; the test calls `notify` on the pulse.
pub struct ManualTimer {
    disarms: Arc<AtomicU32>,
}

impl PeriodicTimer for ManualTimer {
    fn disarm(&mut self) -> OsResult {
        self.disarms.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn label(&self) -> &'static str {
        "manual"
    }
}

/// Backend whose tick is driven by hand and whose sleeps and elevation
/// results are scripted.
pub struct FakeBackend {
    pub arms: AtomicU32,
    pub disarms: Arc<AtomicU32>,
    pub sleeps: Mutex<Vec<Duration>>,
    pub input_ready: AtomicBool,
    pub elevate_result: Mutex<OsResult>,
    pub elevate_calls: AtomicU32,
    pulse: Mutex<Option<Arc<TickPulse>>>,
    next_timer: Mutex<Option<Box<dyn PeriodicTimer>>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            arms: AtomicU32::new(0),
            disarms: Arc::new(AtomicU32::new(0)),
            sleeps: Mutex::new(Vec::new()),
            input_ready: AtomicBool::new(false),
            elevate_result: Mutex::new(Ok(())),
            elevate_calls: AtomicU32::new(0),
            pulse: Mutex::new(None),
            next_timer: Mutex::new(None),
        }
    }
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hand out `timer` on the next `arm_periodic` instead of a manual one.
    pub fn arm_next_with(&self, timer: Box<dyn PeriodicTimer>) {
        *self.next_timer.lock() = Some(timer);
    }

    /// Pulse of the most recently armed timer.
    pub fn pulse(&self) -> Option<Arc<TickPulse>> {
        self.pulse.lock().clone()
    }

    /// Raise `n` ticks on the current pulse.
    pub fn tick(&self, n: u32) {
        if let Some(pulse) = self.pulse() {
            for _ in 0..n {
                pulse.notify();
            }
        }
    }
}

impl OsBackend for FakeBackend {
    fn arm_periodic(
        &self,
        _kind: TickSourceKind,
        period: Duration,
        pulse: Arc<TickPulse>,
    ) -> OsResult<Box<dyn PeriodicTimer>> {
        if period.is_zero() {
            return Err(OsError::timer_setup("zero period"));
        }
        self.arms.fetch_add(1, Ordering::SeqCst);
        *self.pulse.lock() = Some(pulse);

        if let Some(timer) = self.next_timer.lock().take() {
            return Ok(timer);
        }
        Ok(Box::new(ManualTimer {
            disarms: Arc::clone(&self.disarms),
        }))
    }

    fn sleep_for(&self, duration: Duration) -> OsResult {
        self.sleeps.lock().push(duration);
        std::thread::sleep(duration.min(Duration::from_millis(1)));
        Ok(())
    }

    fn poll_input_ready(&self) -> bool {
        self.input_ready.load(Ordering::SeqCst)
    }

    fn elevate_priority(&self, _setup: &RealtimeSetup) -> OsResult {
        self.elevate_calls.fetch_add(1, Ordering::SeqCst);
        self.elevate_result.lock().clone()
    }
}

/// Which layer an advance call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    L3,
    L2,
}

/// Protocol timers that record every advance call.
#[derive(Default)]
pub struct RecordingTimers {
    pub calls: Mutex<Vec<Layer>>,
}

impl RecordingTimers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of completed (L3, L2) dispatches.
    pub fn dispatches(&self) -> usize {
        self.count() / 2
    }
}

impl ProtocolTimers for RecordingTimers {
    fn advance_l3(&self) {
        self.calls.lock().push(Layer::L3);
    }

    fn advance_l2(&self) {
        self.calls.lock().push(Layer::L2);
    }
}

/// Poll `cond` every millisecond until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
