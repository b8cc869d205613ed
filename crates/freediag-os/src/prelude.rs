//! Prelude module for common timing types.
//!
//! `use freediag_os::prelude::*;` brings in what a protocol stack needs to
//! start the tick, sleep and poll for input.

pub use crate::config::{RealtimeSetup, TickSourceKind, TimingConfig};
pub use crate::context::{OsContext, ProcessTimingState};
pub use crate::error::{OsError, OsResult};
pub use crate::layers::{FnTimers, ProtocolTimers};
pub use crate::sleep::millisleep;
pub use crate::time_compat::{TimeDelta, Timestamp, difference, monotonic_or_wall_now};
pub use crate::timer::TickStats;
