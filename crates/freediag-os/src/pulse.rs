//! Tick hand-off between the OS timer source and the dispatcher thread.
//!
//! Whatever raises the tick (a `SIGALRM` handler, a timer-queue callback or the
//! ticker thread) only calls [`TickPulse::notify`], which touches atomics and
//! rings a doorbell. On UNIX the doorbell is a non-blocking self-pipe, so
//! `notify` is async-signal-safe. Elsewhere it is a condvar, which is fine
//! because ticks arrive on ordinary threads there.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::OsResult;

/// Counter of elapsed periods not yet dispatched, plus a wake-up channel.
#[derive(Debug)]
pub struct TickPulse {
    pending: AtomicU64,
    raised: AtomicU64,
    closed: AtomicBool,
    doorbell: Doorbell,
}

impl TickPulse {
    /// Create an open pulse with nothing pending.
    ///
    /// # Errors
    ///
    /// Returns [`OsError::TimerSetup`](crate::OsError::TimerSetup) if the
    /// doorbell cannot be created.
    pub fn new() -> OsResult<Self> {
        Ok(Self {
            pending: AtomicU64::new(0),
            raised: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            doorbell: Doorbell::new()?,
        })
    }

    /// Record one elapsed period and wake the dispatcher.
    ///
    /// Async-signal-safe on UNIX: two atomic increments and one `write(2)`.
    #[inline]
    pub fn notify(&self) {
        self.raised.fetch_add(1, Ordering::Relaxed);
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.doorbell.ring();
    }

    /// Total periods raised since creation.
    pub fn raised(&self) -> u64 {
        self.raised.load(Ordering::Relaxed)
    }

    /// Periods raised but not yet taken by the dispatcher.
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Acquire)
    }

    /// True once the dispatcher has been told to stop.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Block until at least one period is pending and take all of them.
    ///
    /// Returns `None` once [`close`](Self::close) has been called.
    pub(crate) fn wait_for_ticks(&self) -> Option<u64> {
        loop {
            if self.is_closed() {
                return None;
            }
            let ticks = self.pending.swap(0, Ordering::AcqRel);
            if ticks > 0 {
                return Some(ticks);
            }
            self.doorbell.wait();
        }
    }

    /// Stop the dispatcher at its next wake-up.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.doorbell.ring();
    }
}

#[cfg(unix)]
use self::unix_doorbell::Doorbell;

#[cfg(not(unix))]
use self::condvar_doorbell::Doorbell;

#[cfg(unix)]
mod unix_doorbell {
    use std::io::{self, PipeReader, PipeWriter, Read};
    use std::os::fd::{AsRawFd, RawFd};

    use parking_lot::Mutex;

    use crate::error::{OsError, OsResult};

    /// Self-pipe: the write end is non-blocking so ringing a full pipe is a
    /// no-op rather than a stall inside a signal handler.
    #[derive(Debug)]
    pub(super) struct Doorbell {
        reader: Mutex<PipeReader>,
        writer: PipeWriter,
    }

    impl Doorbell {
        pub(super) fn new() -> OsResult<Self> {
            let (reader, writer) = io::pipe().map_err(OsError::timer_setup)?;
            let write_fd = writer.as_raw_fd();

            // SAFETY: `write_fd` is an open descriptor owned by `writer`.
            let flags = unsafe { libc::fcntl(write_fd, libc::F_GETFL) };
            if flags < 0 {
                return Err(OsError::timer_setup(io::Error::last_os_error()));
            }
            // SAFETY: as above; only the status flags are changed.
            let rc = unsafe { libc::fcntl(write_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
            if rc < 0 {
                return Err(OsError::timer_setup(io::Error::last_os_error()));
            }

            Ok(Self {
                reader: Mutex::new(reader),
                writer,
            })
        }

        pub(super) fn ring(&self) {
            let byte = 1u8;
            let fd: RawFd = self.writer.as_raw_fd();
            // SAFETY: `fd` stays open for as long as `self.writer` lives and the
            // buffer is one valid byte. EAGAIN means a wake-up is already queued.
            let _written = unsafe { libc::write(fd, (&raw const byte).cast::<libc::c_void>(), 1) };
        }

        pub(super) fn wait(&self) {
            let mut buf = [0u8; 64];
            let mut reader = self.reader.lock();
            loop {
                match reader.read(&mut buf) {
                    Ok(_) => return,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::error!(error = %e, "tick doorbell read failed");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod condvar_doorbell {
    use parking_lot::{Condvar, Mutex};

    use crate::error::OsResult;

    #[derive(Debug, Default)]
    pub(super) struct Doorbell {
        rung: Mutex<bool>,
        cond: Condvar,
    }

    impl Doorbell {
        pub(super) fn new() -> OsResult<Self> {
            Ok(Self::default())
        }

        pub(super) fn ring(&self) {
            *self.rung.lock() = true;
            self.cond.notify_one();
        }

        pub(super) fn wait(&self) {
            let mut rung = self.rung.lock();
            while !*rung {
                self.cond.wait(&mut rung);
            }
            *rung = false;
        }
    }
}
