//! Output formatting for diag-timing

use anyhow::Error;
use colored::*;
use serde_json::json;

use crate::commands::sleep::SleepSample;
use crate::commands::ticks::TickReport;

/// Print error in JSON format
pub fn print_error_json(error: &Error) {
    let error_json = json!({
        "success": false,
        "error": {
            "message": error.to_string(),
        }
    });
    match serde_json::to_string_pretty(&error_json) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("Failed to format error as JSON: {e}"),
    }
}

/// Print error in human-readable format
pub fn print_error_human(error: &Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);

    let mut source = error.source();
    while let Some(err) = source {
        eprintln!("  {} {}", "Caused by:".yellow(), err);
        source = err.source();
    }
}

pub fn print_tick_report(report: &TickReport, json: bool) {
    if json {
        let output = json!({
            "success": true,
            "ticks": report,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Failed to format tick report as JSON: {e}"),
        }
        return;
    }

    let stats = &report.stats;
    println!("{}", "Tick Report:".bold());
    println!(
        "  Period:       {} ms ({:?} source)",
        report.config.tick_period_ms, report.config.tick_source
    );
    if let Some(realtime) = &report.realtime {
        println!("  Real-time:    {realtime}");
    }
    println!("  Elapsed:      {} ms", report.elapsed_ms);
    println!("  Raised:       {}", stats.raised);
    println!("  Dispatched:   {}", stats.dispatched);

    let skipped = stats.skipped.to_string();
    println!(
        "  Skipped:      {}",
        if stats.skipped == 0 {
            skipped.green()
        } else {
            skipped.yellow()
        }
    );
    println!("  L3 / L2:      {} / {}", report.l3_advances, report.l2_advances);
    println!(
        "  Wake-ups:     {} ({} catch-up)",
        stats.wakes, stats.catch_up_wakes
    );
    println!(
        "  Jitter:       p50 {} us, p99 {} us, max {} us",
        stats.p50_jitter_us, stats.p99_jitter_us, stats.max_jitter_us
    );
}

pub fn print_sleep_report(samples: &[SleepSample], with_ticks: bool, json: bool) {
    if json {
        let output = json!({
            "success": true,
            "with_ticks": with_ticks,
            "sleeps": samples,
        });
        match serde_json::to_string_pretty(&output) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Failed to format sleep report as JSON: {e}"),
        }
        return;
    }

    let title = if with_ticks {
        "Sleep Accuracy (tick running):"
    } else {
        "Sleep Accuracy:"
    };
    println!("{}", title.bold());
    for sample in samples {
        let early = if sample.early == 0 {
            "ok".green()
        } else {
            format!("{} early", sample.early).red()
        };
        println!(
            "  {:>5} ms  min {:>8} us  mean {:>8} us  max {:>8} us  overshoot {:>7} us  {}",
            sample.requested_ms,
            sample.min_us,
            sample.mean_us,
            sample.max_us,
            sample.overshoot_us(),
            early
        );
    }
}
