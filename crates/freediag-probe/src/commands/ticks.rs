//! `ticks`: run the recurring tick and report its cadence.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Args;
use freediag_os::{OsContext, ProcessTimingState, ProtocolTimers, TickStats, TimingConfig};
use serde::Serialize;

use crate::output;

#[derive(Args, Debug, Clone)]
pub struct TicksArgs {
    /// Stop after this many seconds instead of waiting for Enter
    #[arg(short, long)]
    pub seconds: Option<u64>,

    /// Try to enter the real-time scheduling class first
    #[arg(long)]
    pub realtime: bool,
}

/// Protocol timers that only count how often they were advanced.
#[derive(Debug, Default)]
pub struct CountingTimers {
    l3: AtomicU64,
    l2: AtomicU64,
}

impl CountingTimers {
    pub fn l3(&self) -> u64 {
        self.l3.load(Ordering::Relaxed)
    }

    pub fn l2(&self) -> u64 {
        self.l2.load(Ordering::Relaxed)
    }
}

impl ProtocolTimers for CountingTimers {
    fn advance_l3(&self) {
        self.l3.fetch_add(1, Ordering::Relaxed);
    }

    fn advance_l2(&self) {
        self.l2.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Serialize)]
pub struct TickReport {
    pub config: TimingConfig,
    pub realtime: Option<String>,
    pub elapsed_ms: u128,
    pub l3_advances: u64,
    pub l2_advances: u64,
    pub stats: TickStats,
    pub state: ProcessTimingState,
}

pub fn execute(config: TimingConfig, args: &TicksArgs, json: bool) -> Result<()> {
    let timers = Arc::new(CountingTimers::default());
    let ctx = OsContext::new(config.clone(), Arc::clone(&timers) as Arc<dyn ProtocolTimers>)?;

    let realtime = args.realtime.then(|| match ctx.elevate_priority() {
        Ok(()) => "enabled".to_string(),
        Err(e) => e.to_string(),
    });

    ctx.init().context("failed to start the tick timer")?;
    let start = Instant::now();

    let waited = match args.seconds {
        Some(seconds) => ctx.millisleep(seconds.saturating_mul(1_000)),
        None => wait_for_enter(&ctx, json),
    };
    let elapsed = start.elapsed();

    // Stop the tick even if the wait failed.
    ctx.close().context("failed to stop the tick timer")?;
    waited.context("wait interrupted")?;

    let report = TickReport {
        config,
        realtime,
        elapsed_ms: elapsed.as_millis(),
        l3_advances: timers.l3(),
        l2_advances: timers.l2(),
        stats: ctx.tick_stats(),
        state: ctx.state(),
    };
    output::print_tick_report(&report, json);
    Ok(())
}

fn wait_for_enter(ctx: &OsContext, json: bool) -> freediag_os::OsResult {
    if !json {
        eprintln!("Ticking; press Enter to stop.");
    }
    while !ctx.is_input_pending() {
        ctx.millisleep(50)?;
    }

    // Swallow the line so it does not reach the shell.
    let mut line = String::new();
    if let Err(e) = io::stdin().lock().read_line(&mut line) {
        tracing::debug!(error = %e, "could not drain stdin");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counting_timers_track_each_layer() {
        let timers = CountingTimers::default();
        timers.advance_l3();
        timers.advance_l3();
        timers.advance_l2();
        assert_eq!(timers.l3(), 2);
        assert_eq!(timers.l2(), 1);
    }
}
