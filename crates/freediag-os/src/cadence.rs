//! Dispatch cadence metrics.
//!
//! Each time the dispatcher wakes it knows how many periods it is taking and
//! how long it has been since the previous wake. The difference from the
//! nominal `ticks * period` is the jitter recorded here.

use std::time::Duration;

const DEFAULT_MAX_SAMPLES: usize = 4_096;

/// Jitter statistics for dispatcher wake-ups, in microseconds.
///
/// Samples live in a bounded ring buffer so recording never allocates once
/// it is full.
#[derive(Debug, Clone)]
pub struct CadenceMetrics {
    /// Number of wake-ups recorded.
    pub wakes: u64,

    /// Wake-ups that took more than one period at once.
    pub catch_up_wakes: u64,

    /// Largest observed jitter.
    pub max_jitter_us: u64,

    /// Most recent jitter sample.
    pub last_jitter_us: u64,

    samples: Vec<u64>,
    max_samples: usize,
    next_index: usize,
    scratch: Vec<u64>,
}

impl Default for CadenceMetrics {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SAMPLES)
    }
}

impl CadenceMetrics {
    /// Create metrics with the default sample capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create metrics keeping at most `max_samples` samples for percentiles.
    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            wakes: 0,
            catch_up_wakes: 0,
            max_jitter_us: 0,
            last_jitter_us: 0,
            samples: Vec::with_capacity(max_samples),
            max_samples,
            next_index: 0,
            scratch: Vec::with_capacity(max_samples),
        }
    }

    /// Record one wake-up that took `ticks` periods after `interval`.
    pub fn record_wake(&mut self, interval: Duration, ticks: u64, period: Duration) {
        let expected = period.saturating_mul(u32::try_from(ticks).unwrap_or(u32::MAX));
        let jitter = interval.abs_diff(expected);
        let jitter_us = u64::try_from(jitter.as_micros()).unwrap_or(u64::MAX);

        self.wakes += 1;
        if ticks > 1 {
            self.catch_up_wakes += 1;
        }
        self.max_jitter_us = self.max_jitter_us.max(jitter_us);
        self.last_jitter_us = jitter_us;

        if self.max_samples == 0 {
            return;
        }
        if self.samples.len() < self.max_samples {
            self.samples.push(jitter_us);
        } else if let Some(slot) = self.samples.get_mut(self.next_index) {
            *slot = jitter_us;
            self.next_index = (self.next_index + 1) % self.max_samples;
        }
    }

    /// Jitter at `percentile` (0.0 to 1.0) over the retained samples, or 0.
    pub fn percentile_jitter_us(&mut self, percentile: f64) -> u64 {
        if self.samples.is_empty() {
            return 0;
        }
        let percentile = percentile.clamp(0.0, 1.0);

        self.scratch.clear();
        self.scratch.extend_from_slice(&self.samples);

        let len = self.scratch.len();
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss,
            reason = "percentile is clamped to [0, 1] so the index is within len"
        )]
        let index = ((len as f64 * percentile) as usize).min(len.saturating_sub(1));
        let (_, value, _) = self.scratch.select_nth_unstable(index);
        *value
    }

    /// Median jitter.
    pub fn p50_jitter_us(&mut self) -> u64 {
        self.percentile_jitter_us(0.50)
    }

    /// 99th percentile jitter.
    pub fn p99_jitter_us(&mut self) -> u64 {
        self.percentile_jitter_us(0.99)
    }

    /// Number of samples currently retained.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Clear everything.
    pub fn reset(&mut self) {
        self.wakes = 0;
        self.catch_up_wakes = 0;
        self.max_jitter_us = 0;
        self.last_jitter_us = 0;
        self.samples.clear();
        self.next_index = 0;
        self.scratch.clear();
    }
}
