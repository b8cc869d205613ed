//! `SIGALRM` tick source driven by `setitimer(ITIMER_REAL)`.
//!
//! The handler runs in async-signal context on whichever thread the kernel
//! picks. It only loads an atomic pointer and calls [`TickPulse::notify`]
//! (atomics plus one `write(2)`), saving and restoring `errno` around it.
//! Protocol timers are advanced later by the dispatcher thread.
//!
//! `ITIMER_REAL` and the `SIGALRM` disposition are process-wide, so at most one
//! [`SignalTicker`] can be armed at a time.
//!
//! Disarming stops the interval timer first, then unpublishes the pulse, then
//! switches `SIGALRM` to `SIG_IGN` so any delivery still pending is discarded,
//! and waits for handlers already running to leave. Only after that is the
//! previous disposition put back. Restoring `SIG_DFL` with an alarm still
//! pending would terminate the process.

use std::io;
use std::mem;
use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use libc::{
    ITIMER_REAL, SA_RESTART, SIG_IGN, SIGALRM, c_int, itimerval, sigaction, sigemptyset, timeval,
};

use crate::backend::PeriodicTimer;
use crate::error::{OsError, OsResult};
use crate::pulse::TickPulse;

/// Pulse the handler feeds; null while no ticker is armed.
static SIGNAL_PULSE: AtomicPtr<TickPulse> = AtomicPtr::new(ptr::null_mut());

/// Set while a `SignalTicker` owns `ITIMER_REAL` and `SIGALRM`.
static SIGNAL_OWNED: AtomicBool = AtomicBool::new(false);

/// Handlers currently between entry and exit, on any thread.
static IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);

/// Upper bound on waiting for running handlers during disarm.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[cfg(any(target_os = "linux", target_os = "android", target_os = "emscripten"))]
fn errno_location() -> *mut c_int {
    // SAFETY: returns the calling thread's errno slot; async-signal-safe.
    unsafe { libc::__errno_location() }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
fn errno_location() -> *mut c_int {
    // SAFETY: as above.
    unsafe { libc::__error() }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "emscripten",
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd"
)))]
fn errno_location() -> *mut c_int {
    ptr::null_mut()
}

extern "C" fn on_sigalrm(_signal: c_int) {
    let errno = errno_location();
    let saved = if errno.is_null() {
        0
    } else {
        // SAFETY: `errno` points at this thread's errno slot.
        unsafe { *errno }
    };

    // Entry is published before the pointer is read; `disarm` nulls the
    // pointer before reading the count. With both SeqCst, a handler that saw
    // the pulse is always waited for.
    IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
    let pulse = SIGNAL_PULSE.load(Ordering::SeqCst);
    if !pulse.is_null() {
        // SAFETY: the pointer comes from an `Arc<TickPulse>` held by the armed
        // `SignalTicker`. `disarm` nulls it and then waits for `IN_FLIGHT` to
        // reach zero before the ticker can release that reference.
        unsafe { (*pulse).notify() };
    }
    IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);

    if !errno.is_null() {
        // SAFETY: as above.
        unsafe { *errno = saved };
    }
}

fn interval(period: Duration) -> OsResult<itimerval> {
    let value = timeval {
        tv_sec: libc::time_t::try_from(period.as_secs())
            .map_err(|_overflow| OsError::timer_setup("tick period too long for setitimer"))?,
        tv_usec: libc::suseconds_t::try_from(period.subsec_micros())
            .map_err(|_overflow| OsError::timer_setup("tick period not representable"))?,
    };
    if value.tv_sec == 0 && value.tv_usec == 0 {
        return Err(OsError::timer_setup(
            "tick period below setitimer resolution",
        ));
    }
    Ok(itimerval {
        it_interval: value,
        it_value: value,
    })
}

fn stopped_interval() -> itimerval {
    let zero = timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    itimerval {
        it_interval: zero,
        it_value: zero,
    }
}

/// Tick source backed by `SIGALRM`.
pub struct SignalTicker {
    pulse: Arc<TickPulse>,
    previous: sigaction,
    armed: bool,
}

// SAFETY: `previous` is plain data copied out of the kernel; nothing in it is
// tied to the thread that armed the ticker.
unsafe impl Send for SignalTicker {}

impl std::fmt::Debug for SignalTicker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalTicker")
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

impl SignalTicker {
    /// Install the `SIGALRM` handler and start the interval timer.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::TimerSetup`] if another ticker already owns `SIGALRM`
    /// or if `sigaction`/`setitimer` fail.
    pub fn arm(period: Duration, pulse: Arc<TickPulse>) -> OsResult<Self> {
        let timer = interval(period)?;

        if SIGNAL_OWNED
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OsError::timer_setup(
                "SIGALRM interval timer already owned by another timing context",
            ));
        }

        SIGNAL_PULSE.store(Arc::as_ptr(&pulse).cast_mut(), Ordering::SeqCst);

        // SAFETY: all-zero is a valid `sigaction` on every supported libc.
        let mut action: sigaction = unsafe { mem::zeroed() };
        action.sa_sigaction = on_sigalrm as extern "C" fn(c_int) as *const () as libc::sighandler_t;
        // Let ordinary syscalls restart; sleeps still observe the interruption.
        action.sa_flags = SA_RESTART;
        // SAFETY: `sa_mask` is a valid, owned sigset_t.
        unsafe { sigemptyset(&mut action.sa_mask) };

        // SAFETY: as above.
        let mut previous: sigaction = unsafe { mem::zeroed() };
        // SAFETY: both pointers refer to live `sigaction` values.
        if unsafe { libc::sigaction(SIGALRM, &action, &mut previous) } != 0 {
            let err = io::Error::last_os_error();
            release_ownership();
            return Err(OsError::timer_setup(format!("sigaction(SIGALRM): {err}")));
        }

        // SAFETY: `timer` is a valid itimerval; the old value is not requested.
        if unsafe { libc::setitimer(ITIMER_REAL, &timer, ptr::null_mut()) } != 0 {
            let err = io::Error::last_os_error();
            SIGNAL_PULSE.store(ptr::null_mut(), Ordering::SeqCst);
            if let Err(e) = quiesce_handler() {
                tracing::warn!(error = %e, "SIGALRM handler did not quiesce after failed arm");
            }
            // SAFETY: restores the disposition captured above.
            unsafe { libc::sigaction(SIGALRM, &previous, ptr::null_mut()) };
            release_ownership();
            return Err(OsError::timer_setup(format!("setitimer(ITIMER_REAL): {err}")));
        }

        Ok(Self {
            pulse,
            previous,
            armed: true,
        })
    }
}

fn release_ownership() {
    SIGNAL_PULSE.store(ptr::null_mut(), Ordering::SeqCst);
    SIGNAL_OWNED.store(false, Ordering::Release);
}

/// Discard pending `SIGALRM`s and wait out handlers that are already running.
///
/// Expects the interval timer to be stopped and the pulse pointer cleared.
fn quiesce_handler() -> OsResult {
    // SAFETY: all-zero is a valid `sigaction`.
    let mut ignore: sigaction = unsafe { mem::zeroed() };
    ignore.sa_sigaction = SIG_IGN;
    // SAFETY: `sa_mask` is a valid, owned sigset_t.
    unsafe { sigemptyset(&mut ignore.sa_mask) };
    // Setting SIG_IGN drops a pending SIGALRM, blocked or not.
    // SAFETY: `ignore` is a live, initialized `sigaction`.
    if unsafe { libc::sigaction(SIGALRM, &ignore, ptr::null_mut()) } != 0 {
        return Err(OsError::timer_teardown(format!(
            "sigaction(SIGALRM, SIG_IGN): {}",
            io::Error::last_os_error()
        )));
    }

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while IN_FLIGHT.load(Ordering::SeqCst) != 0 {
        if Instant::now() >= deadline {
            return Err(OsError::timer_teardown(
                "SIGALRM handler still running after stop",
            ));
        }
        std::thread::yield_now();
    }
    Ok(())
}

impl PeriodicTimer for SignalTicker {
    fn disarm(&mut self) -> OsResult {
        if !self.armed {
            return Ok(());
        }

        let stop = stopped_interval();
        // SAFETY: `stop` is a valid itimerval.
        if unsafe { libc::setitimer(ITIMER_REAL, &stop, ptr::null_mut()) } != 0 {
            return Err(OsError::timer_teardown(format!(
                "setitimer(ITIMER_REAL, 0): {}",
                io::Error::last_os_error()
            )));
        }

        SIGNAL_PULSE.store(ptr::null_mut(), Ordering::SeqCst);
        quiesce_handler()?;

        // SAFETY: `self.previous` was filled in by the kernel at arm time.
        if unsafe { libc::sigaction(SIGALRM, &self.previous, ptr::null_mut()) } != 0 {
            return Err(OsError::timer_teardown(format!(
                "sigaction(SIGALRM) restore: {}",
                io::Error::last_os_error()
            )));
        }

        release_ownership();
        self.armed = false;
        tracing::debug!(raised = self.pulse.raised(), "SIGALRM ticker disarmed");
        Ok(())
    }

    fn label(&self) -> &'static str {
        "sigalrm"
    }
}

impl Drop for SignalTicker {
    fn drop(&mut self) {
        if let Err(e) = self.disarm() {
            tracing::error!(error = %e, "SIGALRM ticker dropped while still armed");
        }
    }
}
