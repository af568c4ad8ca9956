//! Log setup for the host binary.
//!
//! stdout carries command output, so logs go to stderr or a file. Every
//! workspace event is emitted under a `mito::*` target, which is what the
//! level presets and `--log-filter` select on.

use std::fs::OpenOptions;
use std::path::PathBuf;

use clap::ValueEnum;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Filter preset. Verbose levels only open up `mito::*`; dependencies
    /// stay at info.
    fn directives(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "info,mito=debug",
            LogLevel::Trace => "info,mito=trace",
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub file: Option<PathBuf>,
    /// Raw `EnvFilter` directives; replaces the level preset when set.
    pub filter: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum TelemetryError {
    #[error("cannot open log file {path:?}: {source}")]
    OpenLogFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid log filter '{filter}': {source}")]
    InvalidFilter { filter: String, source: ParseError },
    #[error("a global logger is already installed")]
    AlreadyInstalled,
}

/// Flushes buffered log lines when dropped; keep it alive for the whole run.
#[must_use = "dropping the guard stops log output"]
pub struct LogGuard {
    _worker: WorkerGuard,
}

pub fn init(config: &LogConfig) -> Result<LogGuard, TelemetryError> {
    let filter = env_filter(config)?;

    let (writer, worker) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| TelemetryError::OpenLogFile {
                    path: path.clone(),
                    source,
                })?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.level >= LogLevel::Debug || config.filter.is_some())
        .with_ansi(config.file.is_none())
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| TelemetryError::AlreadyInstalled)?;

    Ok(LogGuard { _worker: worker })
}

fn env_filter(config: &LogConfig) -> Result<EnvFilter, TelemetryError> {
    match config.filter.as_deref().map(str::trim) {
        Some(filter) if !filter.is_empty() => {
            EnvFilter::try_new(filter).map_err(|source| TelemetryError::InvalidFilter {
                filter: filter.to_string(),
                source,
            })
        }
        _ => Ok(EnvFilter::new(config.level.directives())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_presets_only_open_workspace_targets() {
        assert_eq!(LogLevel::Debug.directives(), "info,mito=debug");
        assert_eq!(LogLevel::Trace.directives(), "info,mito=trace");
        assert_eq!(LogConfig::default().level.directives(), "warn");
    }

    #[test]
    fn explicit_filters_are_validated() {
        let config = LogConfig {
            filter: Some("mito::broker=notalevel".into()),
            ..LogConfig::default()
        };
        let err = env_filter(&config).expect_err("bad level rejected");
        assert!(matches!(err, TelemetryError::InvalidFilter { .. }));

        let config = LogConfig {
            filter: Some("warn,mito::broker=trace".into()),
            ..LogConfig::default()
        };
        assert!(env_filter(&config).is_ok());
    }

    #[test]
    fn blank_filters_fall_back_to_the_level() {
        let config = LogConfig {
            level: LogLevel::Debug,
            filter: Some("   ".into()),
            ..LogConfig::default()
        };
        assert!(env_filter(&config).is_ok());
    }

    #[test]
    fn unwritable_log_file_is_reported() {
        let config = LogConfig {
            file: Some(PathBuf::from("/nonexistent-dir/mito/host.log")),
            ..LogConfig::default()
        };
        let err = init(&config).err().expect("open fails");
        assert!(matches!(err, TelemetryError::OpenLogFile { .. }));
    }
}
