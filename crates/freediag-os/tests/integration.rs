//! Integration tests for the OS timing layer on the native backend.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{RecordingTimers, TestResult, wait_until};
use freediag_os::{
    NoopTimers, OsContext, OsError, ProtocolTimers, TickSourceKind, TimingConfig, difference,
    millisleep, monotonic_or_wall_now,
};

fn thread_ticked(period_ms: u64) -> Result<TimingConfig, OsError> {
    TimingConfig::builder()
        .tick_period_ms(period_ms)
        .tick_source(TickSourceKind::Thread)
        .build()
}

#[test]
fn test_thread_tick_cadence() -> TestResult {
    let layers = RecordingTimers::new();
    let ctx = OsContext::new(
        thread_ticked(5)?,
        Arc::clone(&layers) as Arc<dyn ProtocolTimers>,
    )?;

    let start = Instant::now();
    ctx.init()?;
    ctx.millisleep(200)?;
    ctx.close()?;
    let periods = u64::try_from(start.elapsed().as_millis() / 5)?;

    let stats = ctx.tick_stats();
    // 40 periods nominal; leave room for loaded CI machines.
    assert!(stats.raised >= 20, "raised only {}", stats.raised);
    assert!(stats.raised <= periods + 1, "raised {} in {periods} periods", stats.raised);
    // Ticks still pending when the dispatcher is closed are dropped.
    assert!(stats.dispatched + stats.skipped <= stats.raised);
    assert_eq!(layers.dispatches() as u64, stats.dispatched);
    assert!(stats.wakes > 0);
    Ok(())
}

#[test]
fn test_two_thread_contexts_run_side_by_side() -> TestResult {
    let first = RecordingTimers::new();
    let second = RecordingTimers::new();
    let a = OsContext::new(thread_ticked(2)?, Arc::clone(&first) as Arc<dyn ProtocolTimers>)?;
    let b = OsContext::new(thread_ticked(2)?, Arc::clone(&second) as Arc<dyn ProtocolTimers>)?;

    a.init()?;
    b.init()?;
    assert!(wait_until(Duration::from_secs(2), || {
        first.dispatches() >= 5 && second.dispatches() >= 5
    }));
    a.close()?;
    b.close()?;
    Ok(())
}

#[test]
fn test_sleep_lower_bound() -> TestResult {
    for ms in [0u64, 1, 10, 100] {
        let start = Instant::now();
        millisleep(ms)?;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(ms),
            "millisleep({ms}) returned after {elapsed:?}"
        );
    }
    Ok(())
}

#[test]
fn test_sleep_overshoot_is_bounded() -> TestResult {
    let ctx = OsContext::new(TimingConfig::default(), Arc::new(NoopTimers))?;
    let start = Instant::now();
    ctx.millisleep(20)?;
    assert!(start.elapsed() < Duration::from_millis(20 + 200));
    Ok(())
}

#[test]
fn test_input_poll_never_blocks() {
    let start = Instant::now();
    for _ in 0..1_000 {
        let _ = freediag_os::is_input_pending();
    }
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn test_clock_difference_matches_sleep() -> TestResult {
    let before = monotonic_or_wall_now();
    millisleep(15)?;
    let after = monotonic_or_wall_now();

    let delta = difference(after, before);
    assert!(!delta.is_negative());
    assert!(delta.as_millis() >= 15, "delta was {} ms", delta.as_millis());
    Ok(())
}

#[test]
fn test_elevate_priority_never_breaks_the_context() -> TestResult {
    let layers = RecordingTimers::new();
    let ctx = OsContext::new(thread_ticked(5)?, Arc::clone(&layers) as Arc<dyn ProtocolTimers>)?;

    // Unprivileged test runners get an error here; both outcomes are fine.
    if let Err(e) = ctx.elevate_priority() {
        assert!(e.is_degraded_mode(), "unexpected error kind: {e}");
    }

    ctx.init()?;
    assert!(wait_until(Duration::from_secs(2), || layers.dispatches() >= 3));
    ctx.close()?;
    Ok(())
}

#[test]
fn test_drop_stops_the_tick() -> TestResult {
    let layers = RecordingTimers::new();
    {
        let ctx = OsContext::new(thread_ticked(2)?, Arc::clone(&layers) as Arc<dyn ProtocolTimers>)?;
        ctx.init()?;
        assert!(wait_until(Duration::from_secs(2), || layers.dispatches() >= 2));
    }
    let after_drop = layers.count();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(layers.count(), after_drop);
    Ok(())
}
