//! `gettimeofday`/`timersub` style timestamps.
//!
//! Protocol code measures inter-byte and response timeouts with
//! seconds-plus-microseconds pairs. These helpers give every platform the same
//! representation and the same borrow-correct subtraction.

use std::sync::OnceLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const MICROS_PER_SEC: i128 = 1_000_000;

/// Microseconds between 1601-01-01 (FILETIME epoch) and 1970-01-01.
pub const FILETIME_EPOCH_DELTA_US: u64 = 11_644_473_600_000_000;

/// A point in time as whole seconds plus microseconds since the UNIX epoch.
///
/// `micros` is always in `0..1_000_000`; times before the epoch carry a
/// negative `secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    secs: i64,
    micros: u32,
}

/// A signed span between two [`Timestamp`]s.
///
/// Normalized like `timersub`: `micros` is in `0..1_000_000` and the sign lives
/// in `secs`, so -1.5s is `{ secs: -2, micros: 500_000 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeDelta {
    secs: i64,
    micros: u32,
}

fn split_micros(total: i128) -> (i64, u32) {
    let secs = total.div_euclid(MICROS_PER_SEC);
    let micros = total.rem_euclid(MICROS_PER_SEC);
    let secs = i64::try_from(secs).unwrap_or(if secs < 0 { i64::MIN } else { i64::MAX });
    // rem_euclid keeps this in 0..1_000_000.
    let micros = u32::try_from(micros).unwrap_or(0);
    (secs, micros)
}

impl Timestamp {
    /// Build a timestamp, carrying excess microseconds into the seconds.
    pub fn new(secs: i64, micros: u32) -> Self {
        let (secs, micros) =
            split_micros(i128::from(secs) * MICROS_PER_SEC + i128::from(micros));
        Self { secs, micros }
    }

    /// Build a timestamp from signed microseconds since the epoch.
    pub fn from_micros(total: i64) -> Self {
        let (secs, micros) = split_micros(i128::from(total));
        Self { secs, micros }
    }

    /// Convert a Windows FILETIME value (100ns intervals since 1601-01-01).
    pub fn from_file_time(hundred_ns: u64) -> Self {
        let micros = i128::from(hundred_ns / 10) - i128::from(FILETIME_EPOCH_DELTA_US);
        let (secs, micros) = split_micros(micros);
        Self { secs, micros }
    }

    /// Whole seconds since the epoch.
    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Sub-second microseconds.
    pub fn subsec_micros(&self) -> u32 {
        self.micros
    }

    /// Total microseconds since the epoch, saturating.
    pub fn as_micros(&self) -> i64 {
        let total = i128::from(self.secs) * MICROS_PER_SEC + i128::from(self.micros);
        i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
    }

    fn total_micros(&self) -> i128 {
        i128::from(self.secs) * MICROS_PER_SEC + i128::from(self.micros)
    }

    /// Timestamp shifted forward by `duration`.
    pub fn saturating_add(&self, duration: Duration) -> Self {
        let add = i128::try_from(duration.as_micros()).unwrap_or(i128::MAX / 2);
        let (secs, micros) = split_micros(self.total_micros().saturating_add(add));
        Self { secs, micros }
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(after) => {
                let total = i128::try_from(after.as_micros()).unwrap_or(i128::MAX / 2);
                let (secs, micros) = split_micros(total);
                Self { secs, micros }
            }
            Err(before) => {
                let total = i128::try_from(before.duration().as_micros()).unwrap_or(i128::MAX / 2);
                let (secs, micros) = split_micros(-total);
                Self { secs, micros }
            }
        }
    }
}

impl TimeDelta {
    /// A zero-length span.
    pub const ZERO: TimeDelta = TimeDelta { secs: 0, micros: 0 };

    /// Build a span from signed microseconds.
    pub fn from_micros(total: i64) -> Self {
        let (secs, micros) = split_micros(i128::from(total));
        Self { secs, micros }
    }

    /// Whole seconds, rounded toward negative infinity.
    pub fn secs(&self) -> i64 {
        self.secs
    }

    /// Non-negative sub-second microseconds.
    pub fn subsec_micros(&self) -> u32 {
        self.micros
    }

    /// Total signed microseconds, saturating.
    pub fn as_micros(&self) -> i64 {
        let total = i128::from(self.secs) * MICROS_PER_SEC + i128::from(self.micros);
        i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
    }

    /// Total signed milliseconds, truncated toward zero.
    pub fn as_millis(&self) -> i64 {
        self.as_micros() / 1_000
    }

    /// True if the span is negative.
    pub fn is_negative(&self) -> bool {
        self.secs < 0
    }

    /// The span as a [`Duration`], or `None` if it is negative.
    pub fn to_duration(&self) -> Option<Duration> {
        let secs = u64::try_from(self.secs).ok()?;
        Some(Duration::from_secs(secs) + Duration::from_micros(u64::from(self.micros)))
    }
}

fn anchor() -> &'static (Instant, Timestamp) {
    static ANCHOR: OnceLock<(Instant, Timestamp)> = OnceLock::new();
    ANCHOR.get_or_init(|| (Instant::now(), Timestamp::from(SystemTime::now())))
}

/// Current time with microsecond resolution.
///
/// The wall clock is sampled once per process; later reads advance it with the
/// monotonic clock, so successive values never go backwards even if the system
/// clock is stepped.
pub fn monotonic_or_wall_now() -> Timestamp {
    let (started, wall) = anchor();
    wall.saturating_add(started.elapsed())
}

/// `a - b`, with sub-second borrow handled.
pub fn difference(a: Timestamp, b: Timestamp) -> TimeDelta {
    let (secs, micros) = split_micros(a.total_micros() - b.total_micros());
    TimeDelta { secs, micros }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_borrow_across_second() {
        let a = Timestamp::new(10, 100);
        let b = Timestamp::new(9, 999_900);
        let d = difference(a, b);
        assert_eq!(d.secs(), 0);
        assert_eq!(d.subsec_micros(), 200);
        assert_eq!(d.as_micros(), 200);
    }

    #[test]
    fn test_negative_difference_keeps_micros_positive() {
        let a = Timestamp::new(9, 0);
        let b = Timestamp::new(10, 500_000);
        let d = difference(a, b);
        assert!(d.is_negative());
        assert_eq!(d.secs(), -2);
        assert_eq!(d.subsec_micros(), 500_000);
        assert_eq!(d.as_micros(), -1_500_000);
        assert_eq!(d.to_duration(), None);
    }

    #[test]
    fn test_new_carries_micros() {
        let t = Timestamp::new(1, 2_500_000);
        assert_eq!(t.secs(), 3);
        assert_eq!(t.subsec_micros(), 500_000);
    }

    #[test]
    fn test_file_time_epoch() {
        // 1970-01-01T00:00:00Z in FILETIME units.
        let t = Timestamp::from_file_time(116_444_736_000_000_000);
        assert_eq!(t, Timestamp::new(0, 0));

        let t = Timestamp::from_file_time(116_444_736_000_000_000 + 15);
        assert_eq!(t.subsec_micros(), 1);
    }

    #[test]
    fn test_now_is_monotonic() {
        let first = monotonic_or_wall_now();
        let second = monotonic_or_wall_now();
        assert!(second >= first);
        assert!(!difference(second, first).is_negative());
    }

    #[test]
    fn test_now_tracks_wall_clock() {
        let ours = monotonic_or_wall_now();
        let wall = Timestamp::from(SystemTime::now());
        let skew = difference(wall, ours).as_micros().abs();
        assert!(skew < 5_000_000, "skew {skew}us");
    }

    #[test]
    fn test_delta_to_duration() {
        let d = TimeDelta::from_micros(1_250_000);
        assert_eq!(d.to_duration(), Some(Duration::from_micros(1_250_000)));
        assert_eq!(d.as_millis(), 1_250);
    }
}
