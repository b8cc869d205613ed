//! OS timing and scheduling substrate for a vehicle-diagnostic protocol stack.
//!
//! This crate gives the protocol layers:
//!
//! - **Tick**: a fixed-period recurring timer that advances the L3 and then the
//!   L2 timeout state machines once per period ([`OsContext::init`])
//! - **Sleep**: millisecond sleep that never returns early ([`millisleep`])
//! - **Input poll**: a non-blocking "has the user typed a line" check
//!   ([`is_input_pending`])
//! - **Scheduling**: a best-effort move into a real-time scheduling class
//!   ([`OsContext::elevate_priority`])
//! - **Time helpers**: microsecond timestamps and differences ([`time_compat`])
//!
//! # Tick delivery
//!
//! The OS source (`SIGALRM` on UNIX, a timer-queue timer on Windows, or a
//! ticker thread) never runs protocol code. It bumps an atomic counter and
//! writes one byte to a self-pipe; a dispatcher thread picks the ticks up and
//! calls [`ProtocolTimers::advance_l3`] then [`ProtocolTimers::advance_l2`].
//!
//! Timing is best effort in the single-digit millisecond range.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use freediag_os::{NoopTimers, OsContext, TimingConfig};
//!
//! # fn main() -> Result<(), freediag_os::OsError> {
//! let ctx = OsContext::new(TimingConfig::default(), Arc::new(NoopTimers))?;
//! ctx.init()?;
//! ctx.millisleep(100)?;
//! ctx.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![deny(clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]

pub mod backend;
pub mod cadence;
pub mod config;
pub mod context;
pub mod error;
pub mod input;
pub mod layers;
pub mod platform;
pub mod pulse;
pub mod sched;
pub mod sleep;
pub mod time_compat;
pub mod timer;

pub mod prelude;

pub use backend::{OsBackend, PeriodicTimer};
pub use cadence::CadenceMetrics;
pub use config::{RealtimeSetup, TickSourceKind, TimingConfig, TimingConfigBuilder};
pub use context::{OsContext, ProcessTimingState};
pub use error::{OsError, OsResult};
pub use input::{is_input_pending, is_input_pending_with};
pub use layers::{FnTimers, NoopTimers, ProtocolTimers};
pub use platform::NativeBackend;
pub use pulse::TickPulse;
pub use sched::SchedulingService;
pub use sleep::{millisleep, millisleep_with};
pub use time_compat::{TimeDelta, Timestamp, difference, monotonic_or_wall_now};
pub use timer::{TickStats, TimerService, TimerState};
