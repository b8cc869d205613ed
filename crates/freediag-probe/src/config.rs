//! Loading the timing configuration from disk and the command line.

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use freediag_os::{TickSourceKind, TimingConfig};
use serde::Serialize;

use crate::error::ProbeError;

/// Tick source as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceArg {
    /// SIGALRM on UNIX, timer queue on Windows
    Native,
    /// Portable ticker thread
    Thread,
}

impl From<SourceArg> for TickSourceKind {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Native => TickSourceKind::Native,
            SourceArg::Thread => TickSourceKind::Thread,
        }
    }
}

/// Command-line values that override the file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub period_ms: Option<u64>,
    pub source: Option<SourceArg>,
}

/// Parse a configuration document; `.json` files are JSON, everything else YAML.
pub fn parse_config(path: &Path, text: &str) -> Result<TimingConfig, ProbeError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("json") => Ok(serde_json::from_str(text)?),
        Some("yaml" | "yml") | None => Ok(serde_yaml::from_str(text)?),
        Some(other) => Err(ProbeError::UnsupportedFormat(other.to_string())),
    }
}

/// Build the effective configuration: defaults, then the file, then overrides.
pub fn load_config(path: Option<&Path>, overrides: Overrides) -> Result<TimingConfig, ProbeError> {
    let mut config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            parse_config(path, &text)?
        }
        None => TimingConfig::default(),
    };

    if let Some(period_ms) = overrides.period_ms {
        config.tick_period_ms = period_ms;
    }
    if let Some(source) = overrides.source {
        config.tick_source = source.into();
    }

    config
        .validate()
        .map_err(|e| ProbeError::InvalidConfiguration(e.to_string()))?;
    tracing::debug!(?config, "effective timing configuration");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn yaml_document_overrides_defaults() -> TestResult {
        let config = parse_config(
            &PathBuf::from("timing.yaml"),
            "tick_period_ms: 5\ntick_source: thread\nrealtime:\n  priority: 10\n",
        )?;
        assert_eq!(config.tick_period_ms, 5);
        assert_eq!(config.tick_source, TickSourceKind::Thread);
        assert_eq!(config.realtime.priority, 10);
        assert_eq!(
            config.max_catch_up_ticks,
            TimingConfig::default().max_catch_up_ticks
        );
        Ok(())
    }

    #[test]
    fn json_document_is_detected_by_extension() -> TestResult {
        let config = parse_config(
            &PathBuf::from("timing.JSON"),
            r#"{"teardown_retry_delay_ms": 100}"#,
        )?;
        assert_eq!(config.teardown_retry_delay_ms, 100);
        Ok(())
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let result = parse_config(&PathBuf::from("timing.toml"), "");
        assert!(matches!(result, Err(ProbeError::UnsupportedFormat(ext)) if ext == "toml"));
    }

    #[test]
    fn overrides_win_over_defaults() -> TestResult {
        let config = load_config(
            None,
            Overrides {
                period_ms: Some(7),
                source: Some(SourceArg::Thread),
            },
        )?;
        assert_eq!(config.tick_period_ms, 7);
        assert_eq!(config.tick_source, TickSourceKind::Thread);
        Ok(())
    }

    #[test]
    fn invalid_override_is_reported() {
        let result = load_config(
            None,
            Overrides {
                period_ms: Some(0),
                source: None,
            },
        );
        assert!(matches!(result, Err(ProbeError::InvalidConfiguration(_))));
    }
}
