//! `sleep`: measure how long `millisleep` really takes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use freediag_os::{NoopTimers, OsContext, TimingConfig};
use serde::Serialize;

use crate::output;

#[derive(Args, Debug, Clone)]
pub struct SleepArgs {
    /// Requested durations in milliseconds
    #[arg(long, value_delimiter = ',', default_value = "0,1,10,100")]
    pub durations: Vec<u64>,

    /// Samples per duration
    #[arg(short, long, default_value_t = 5)]
    pub repeat: u32,

    /// Keep the recurring tick running while sleeping
    #[arg(long)]
    pub with_ticks: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SleepSample {
    pub requested_ms: u64,
    pub samples: u32,
    pub min_us: u64,
    pub mean_us: u64,
    pub max_us: u64,
    /// Samples that returned before the requested time.
    pub early: u32,
}

impl SleepSample {
    pub fn from_measurements(requested_ms: u64, measured: &[Duration]) -> Self {
        let requested = Duration::from_millis(requested_ms);
        let micros: Vec<u64> = measured
            .iter()
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .collect();
        let total: u64 = micros.iter().fold(0u64, |acc, us| acc.saturating_add(*us));
        let count = u32::try_from(micros.len()).unwrap_or(u32::MAX);

        Self {
            requested_ms,
            samples: count,
            min_us: micros.iter().copied().min().unwrap_or(0),
            mean_us: total.checked_div(u64::from(count)).unwrap_or(0),
            max_us: micros.iter().copied().max().unwrap_or(0),
            early: u32::try_from(measured.iter().filter(|d| **d < requested).count())
                .unwrap_or(u32::MAX),
        }
    }

    /// Worst overshoot past the requested time, in microseconds.
    pub fn overshoot_us(&self) -> u64 {
        self.max_us.saturating_sub(self.requested_ms.saturating_mul(1_000))
    }
}

pub fn execute(config: TimingConfig, args: &SleepArgs, json: bool) -> Result<()> {
    let ctx = OsContext::new(config, Arc::new(NoopTimers))?;
    if args.with_ticks {
        ctx.init().context("failed to start the tick timer")?;
    }

    let measured = measure(&ctx, args);
    ctx.close().context("failed to stop the tick timer")?;
    let samples = measured?;

    output::print_sleep_report(&samples, args.with_ticks, json);
    Ok(())
}

fn measure(ctx: &OsContext, args: &SleepArgs) -> Result<Vec<SleepSample>> {
    let mut samples = Vec::with_capacity(args.durations.len());
    for &ms in &args.durations {
        let mut measured = Vec::with_capacity(usize::try_from(args.repeat).unwrap_or(0));
        for _ in 0..args.repeat {
            let start = Instant::now();
            ctx.millisleep(ms)
                .with_context(|| format!("millisleep({ms}) failed"))?;
            measured.push(start.elapsed());
        }
        samples.push(SleepSample::from_measurements(ms, &measured));
    }
    Ok(samples)
}
