//! diag-timing - freediag OS timing probe
//!
//! Runs the recurring protocol tick and the millisecond sleep on this machine
//! and reports how well they keep time.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod config;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{SleepArgs, TicksArgs};
use crate::config::{Overrides, SourceArg, load_config};
use crate::error::ProbeError;

#[derive(Parser)]
#[command(name = "diag-timing")]
#[command(about = "Probe the freediag OS timing layer - tick cadence and sleep accuracy")]
#[command(version)]
struct Cli {
    /// Output in JSON format for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Timing configuration file (YAML, or JSON with a .json extension)
    #[arg(long, global = true, env = "DIAG_TIMING_CONFIG")]
    config: Option<PathBuf>,

    /// Tick period in milliseconds
    #[arg(long, global = true)]
    period_ms: Option<u64>,

    /// Tick source
    #[arg(long, global = true, value_enum)]
    source: Option<SourceArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the recurring tick and report its cadence
    Ticks(TicksArgs),

    /// Measure millisleep accuracy
    Sleep(SleepArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("diag_timing={log_level},freediag_probe={log_level},freediag_os={log_level}")
                    .into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match execute_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if cli.json {
                output::print_error_json(&e);
            } else {
                output::print_error_human(&e);
            }

            let exit_code: u8 = match e.downcast_ref::<ProbeError>() {
                Some(ProbeError::InvalidConfiguration(_))
                | Some(ProbeError::UnsupportedFormat(_))
                | Some(ProbeError::JsonError(_))
                | Some(ProbeError::YamlError(_)) => 4,
                Some(ProbeError::IoError(_)) => 3,
                _ => match e.downcast_ref::<freediag_os::OsError>() {
                    Some(os) if os.is_degraded_mode() => 6,
                    Some(_) => 5,
                    None => 1,
                },
            };

            ExitCode::from(exit_code)
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    let overrides = Overrides {
        period_ms: cli.period_ms,
        source: cli.source,
    };
    let config = load_config(cli.config.as_deref(), overrides)?;

    match &cli.command {
        Commands::Ticks(args) => commands::ticks::execute(config, args, cli.json),
        Commands::Sleep(args) => commands::sleep::execute(config, args, cli.json),
    }
}
