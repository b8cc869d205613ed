//! Property-based tests for time arithmetic and cadence metrics.

use std::time::Duration;

use freediag_os::time_compat::FILETIME_EPOCH_DELTA_US;
use freediag_os::{CadenceMetrics, TimeDelta, Timestamp, TimingConfig, difference};
use proptest::prelude::*;
use quickcheck_macros::quickcheck;

const MAX_SECS: i64 = 1 << 40;

fn timestamp() -> impl Strategy<Value = Timestamp> {
    (-MAX_SECS..MAX_SECS, 0u32..1_000_000).prop_map(|(secs, micros)| Timestamp::new(secs, micros))
}

proptest! {
    #[test]
    fn difference_has_normalized_micros(a in timestamp(), b in timestamp()) {
        let delta = difference(a, b);
        prop_assert!(delta.subsec_micros() < 1_000_000);
        prop_assert_eq!(delta.as_micros(), a.as_micros() - b.as_micros());
    }

    #[test]
    fn difference_is_antisymmetric(a in timestamp(), b in timestamp()) {
        let forward = difference(a, b);
        let backward = difference(b, a);
        prop_assert_eq!(forward.as_micros(), -backward.as_micros());
    }

    #[test]
    fn difference_with_self_is_zero(a in timestamp()) {
        prop_assert_eq!(difference(a, a), TimeDelta::ZERO);
    }

    #[test]
    fn adding_a_duration_is_undone_by_difference(
        a in timestamp(),
        micros in 0u64..10_000_000_000,
    ) {
        let later = a.saturating_add(Duration::from_micros(micros));
        let delta = difference(later, a);
        prop_assert_eq!(delta.as_micros(), i64::try_from(micros).unwrap_or(i64::MAX));
        prop_assert_eq!(delta.to_duration(), Some(Duration::from_micros(micros)));
    }

    #[test]
    fn file_time_round_trips_through_unix_micros(unix_micros in 0i64..(1i64 << 52)) {
        let unsigned = u64::try_from(unix_micros).unwrap_or(0);
        let hundred_ns = (unsigned + FILETIME_EPOCH_DELTA_US) * 10;
        prop_assert_eq!(Timestamp::from_file_time(hundred_ns).as_micros(), unix_micros);
    }

    #[test]
    fn config_validation_accepts_every_period_in_range(period in 1u64..=1_000) {
        let config = TimingConfig {
            tick_period_ms: period,
            ..TimingConfig::default()
        };
        prop_assert!(config.validate().is_ok());
    }
}

#[quickcheck]
fn cadence_percentiles_are_ordered(samples: Vec<u32>) -> bool {
    let period = Duration::from_millis(10);
    let mut metrics = CadenceMetrics::with_capacity(1_024);
    for sample in samples {
        metrics.record_wake(Duration::from_micros(u64::from(sample)), 1, period);
    }

    let p50 = metrics.p50_jitter_us();
    let p99 = metrics.p99_jitter_us();
    p50 <= p99 && p99 <= metrics.max_jitter_us
}

#[quickcheck]
fn cadence_counts_every_wake(wakes: Vec<(u16, u8)>) -> bool {
    let period = Duration::from_millis(1);
    let mut metrics = CadenceMetrics::with_capacity(64);
    let mut catch_ups = 0u64;
    for &(interval_us, ticks) in &wakes {
        let ticks = u64::from(ticks.max(1));
        if ticks > 1 {
            catch_ups += 1;
        }
        metrics.record_wake(Duration::from_micros(u64::from(interval_us)), ticks, period);
    }

    metrics.wakes == wakes.len() as u64
        && metrics.catch_up_wakes == catch_ups
        && metrics.sample_count() == wakes.len().min(64)
}

#[quickcheck]
fn cadence_on_time_wakes_have_no_jitter(ticks: Vec<u8>) -> bool {
    let period = Duration::from_micros(500);
    let mut metrics = CadenceMetrics::new();
    for ticks in ticks {
        let ticks = u32::from(ticks.max(1));
        metrics.record_wake(period * ticks, u64::from(ticks), period);
    }
    metrics.max_jitter_us == 0
}
