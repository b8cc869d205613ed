//! Command implementations for diag-timing

pub mod sleep;
pub mod ticks;

pub use sleep::SleepArgs;
pub use ticks::TicksArgs;
