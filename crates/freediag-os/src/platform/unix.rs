//! UNIX sleep, input polling and real-time scheduling.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::time::Duration;

use libc::{POLLHUP, POLLIN, nanosleep, poll, pollfd, timespec};

use crate::config::RealtimeSetup;
use crate::error::{OsError, OsResult};

/// `nanosleep` that resumes with the remaining time after `EINTR`.
///
/// A `SIGALRM` tick landing mid-sleep is the expected case here, not an error.
pub fn sleep_for(duration: Duration) -> OsResult {
    let mut request = timespec {
        tv_sec: libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX),
        tv_nsec: libc::c_long::try_from(duration.subsec_nanos()).unwrap_or(0),
    };
    let mut remaining = timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };

    loop {
        // SAFETY: both pointers refer to live, initialized `timespec` values.
        let rc = unsafe { nanosleep(&request, &mut remaining) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            request = remaining;
            continue;
        }
        return Err(OsError::sleep_interrupted(err));
    }
}

/// True if `fd` is readable right now. Never blocks; errors read as `false`.
///
/// A hung-up descriptor counts as readable: the next read returns EOF at once.
/// Linux reports a pipe with no writers as `POLLHUP` without `POLLIN`.
pub fn fd_ready(fd: BorrowedFd<'_>) -> bool {
    let mut pfd = pollfd {
        fd: fd.as_raw_fd(),
        events: POLLIN,
        revents: 0,
    };
    // SAFETY: `pfd` is a single valid pollfd and the timeout is zero.
    let rv = unsafe { poll(&mut pfd, 1, 0) };
    rv == 1 && (pfd.revents & (POLLIN | POLLHUP)) != 0
}

/// Readiness of standard input. In canonical terminal mode this only turns
/// true once the user has pressed Enter.
pub fn stdin_ready() -> bool {
    let stdin = io::stdin();
    fd_ready(stdin.as_fd())
}

/// Switch the whole process to `SCHED_FIFO`.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn elevate_priority(setup: &RealtimeSetup) -> OsResult {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    // SAFETY: pure queries on a valid policy constant.
    let min = unsafe { sched_get_priority_min(SCHED_FIFO) };
    // SAFETY: as above.
    let max = unsafe { sched_get_priority_max(SCHED_FIFO) };
    if min < 0 || max < 0 {
        return Err(OsError::scheduling_unsupported(io::Error::last_os_error()));
    }

    let param = sched_param {
        sched_priority: setup.priority.clamp(min, max),
    };

    // SAFETY: pid 0 targets the calling process; `param` outlives the call.
    if unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) } != 0 {
        let err = io::Error::last_os_error();
        return Err(match err.raw_os_error() {
            Some(libc::EPERM) => OsError::insufficient_privilege(format!(
                "sched_setscheduler(SCHED_FIFO, {}): {err}",
                param.sched_priority
            )),
            _ => OsError::scheduling_unsupported(format!("sched_setscheduler: {err}")),
        });
    }

    if setup.lock_memory {
        // SAFETY: flag-only call.
        if unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) } != 0 {
            // Page locking is a bonus on top of SCHED_FIFO, not a requirement.
            tracing::debug!(error = %io::Error::last_os_error(), "mlockall failed");
        }
    }

    tracing::info!(priority = param.sched_priority, "running with SCHED_FIFO");
    Ok(())
}

/// Other POSIX systems number and interpret fixed priorities differently;
/// nothing is changed until someone has checked what is appropriate there.
#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn elevate_priority(_setup: &RealtimeSetup) -> OsResult {
    Err(OsError::scheduling_unsupported(
        "scheduling setup should be examined for this platform",
    ))
}
