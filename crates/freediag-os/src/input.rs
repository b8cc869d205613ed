//! Non-blocking check for pending console input.

use crate::backend::OsBackend;
use crate::platform::NativeBackend;

#[cfg(unix)]
pub use crate::platform::fd_ready;

/// True if a complete line of console input can be read without blocking.
///
/// On UNIX this polls standard input with a zero timeout. On Windows it reports
/// whether Enter was pressed since the previous call. Any polling error reads
/// as `false`.
pub fn is_input_pending() -> bool {
    is_input_pending_with(&NativeBackend::new())
}

/// [`is_input_pending`] on an explicit backend.
pub fn is_input_pending_with(backend: &dyn OsBackend) -> bool {
    backend.poll_input_ready()
}
