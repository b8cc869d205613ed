//! Windows timer-queue tick source, sleep, input polling and priority class.

use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use windows::Win32::Foundation::{
    ERROR_ACCESS_DENIED, ERROR_IO_PENDING, HANDLE, INVALID_HANDLE_VALUE,
};
use windows::Win32::System::Threading::{
    CreateTimerQueueTimer, DeleteTimerQueueTimer, GetCurrentProcess, HIGH_PRIORITY_CLASS,
    SetPriorityClass, Sleep, WT_EXECUTEDEFAULT,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{GetAsyncKeyState, VK_RETURN};

use crate::backend::PeriodicTimer;
use crate::config::RealtimeSetup;
use crate::error::{OsError, OsResult};
use crate::pulse::TickPulse;

/// Set after the first callback that reports something other than expiry.
static CALLBACK_PROBLEM_REPORTED: AtomicBool = AtomicBool::new(false);

unsafe extern "system" fn timer_callback(param: *mut c_void, timed_out: bool) {
    if !timed_out {
        if !CALLBACK_PROBLEM_REPORTED.swap(true, Ordering::Relaxed) {
            tracing::warn!("problem with OS timer callback: fired without expiry");
        }
        return;
    }
    // SAFETY: `param` is the `Arc<TickPulse>` pointer passed at creation; the
    // owning `TimerQueueTicker` keeps that reference alive until
    // `DeleteTimerQueueTimer` has waited for every running callback.
    let pulse = unsafe { &*param.cast_const().cast::<TickPulse>() };
    pulse.notify();
}

/// Tick source backed by a default-queue timer (`CreateTimerQueueTimer`).
///
/// Callbacks run on a thread-pool thread, so they only notify the pulse.
pub struct TimerQueueTicker {
    handle: Option<HANDLE>,
    pulse: Arc<TickPulse>,
}

// SAFETY: the timer handle is a process-wide kernel object, usable from any thread.
unsafe impl Send for TimerQueueTicker {}

impl std::fmt::Debug for TimerQueueTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueueTicker")
            .field("armed", &self.handle.is_some())
            .finish_non_exhaustive()
    }
}

impl TimerQueueTicker {
    /// Create the timer with `period` as both due time and period.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::TimerSetup`] if the timer queue rejects the timer.
    pub fn arm(period: Duration, pulse: Arc<TickPulse>) -> OsResult<Self> {
        let period_ms = u32::try_from(period.as_millis())
            .map_err(|_overflow| OsError::timer_setup("tick period too long"))?
            .max(1);

        let mut handle = HANDLE::default();
        let param = Arc::as_ptr(&pulse).cast::<c_void>();
        // SAFETY: `handle` is a valid out-pointer and `param` stays valid for the
        // lifetime of the timer (see `timer_callback`).
        unsafe {
            CreateTimerQueueTimer(
                &mut handle,
                None,
                Some(timer_callback),
                Some(param),
                period_ms,
                period_ms,
                WT_EXECUTEDEFAULT,
            )
        }
        .map_err(|e| OsError::timer_setup(format!("CreateTimerQueueTimer: {e}")))?;

        Ok(Self {
            handle: Some(handle),
            pulse,
        })
    }
}

impl PeriodicTimer for TimerQueueTicker {
    fn disarm(&mut self) -> OsResult {
        let Some(handle) = self.handle else {
            return Ok(());
        };

        // INVALID_HANDLE_VALUE makes the call wait for callbacks in flight.
        // SAFETY: `handle` came from CreateTimerQueueTimer and was not deleted yet.
        match unsafe { DeleteTimerQueueTimer(None, handle, Some(INVALID_HANDLE_VALUE)) } {
            Ok(()) => {}
            Err(e) if e.code() == ERROR_IO_PENDING.to_hresult() => {
                tracing::debug!("DeleteTimerQueueTimer reported IO pending; timer is gone");
            }
            Err(e) => {
                return Err(OsError::timer_teardown(format!("DeleteTimerQueueTimer: {e}")));
            }
        }

        self.handle = None;
        tracing::debug!(raised = self.pulse.raised(), "timer-queue ticker disarmed");
        Ok(())
    }

    fn label(&self) -> &'static str {
        "timer-queue"
    }
}

impl Drop for TimerQueueTicker {
    fn drop(&mut self) {
        if let Err(e) = self.disarm() {
            tracing::error!(error = %e, "timer-queue ticker dropped while still armed");
        }
    }
}

/// `Sleep` is not interrupted by anything this crate raises.
pub fn sleep_for(duration: Duration) -> OsResult {
    let ms = u32::try_from(duration.as_millis()).unwrap_or(u32::MAX - 1);
    // SAFETY: plain blocking call.
    unsafe { Sleep(ms) };
    Ok(())
}

/// True if Enter was pressed since the previous poll.
pub fn stdin_ready() -> bool {
    // SAFETY: plain query of the async key state.
    let state = unsafe { GetAsyncKeyState(i32::from(VK_RETURN.0)) };
    state & 1 != 0
}

/// Move the process into the high priority class.
pub fn elevate_priority(_setup: &RealtimeSetup) -> OsResult {
    // SAFETY: pseudo-handle for the current process.
    unsafe { SetPriorityClass(GetCurrentProcess(), HIGH_PRIORITY_CLASS) }.map_err(|e| {
        if e.code() == ERROR_ACCESS_DENIED.to_hresult() {
            OsError::insufficient_privilege(format!("SetPriorityClass: {e}"))
        } else {
            OsError::scheduling_unsupported(format!("SetPriorityClass: {e}"))
        }
    })?;
    tracing::info!("running in HIGH_PRIORITY_CLASS");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_queue_ticks() -> OsResult {
        let pulse = Arc::new(TickPulse::new()?);
        let mut ticker = TimerQueueTicker::arm(Duration::from_millis(10), Arc::clone(&pulse))?;
        std::thread::sleep(Duration::from_millis(100));
        ticker.disarm()?;
        assert!(pulse.raised() >= 3);
        Ok(())
    }
}
