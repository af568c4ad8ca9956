use clap::{Args, Parser, Subcommand, ValueEnum};
use mito_broker::protocol::EventKind;
use serde_json::Value;
use std::path::PathBuf;

use crate::telemetry::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "mito-host",
    about = "Drive a Mito backend over stdio: requests go to its stdin, replies come back on its stdout",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "MITO_BACKEND",
        value_name = "COMMAND",
        help = "Backend command line, split on whitespace"
    )]
    pub backend: Option<String>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        global = true,
        env = "MITO_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        global = true,
        env = "MITO_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,

    #[arg(
        long = "log-filter",
        value_name = "DIRECTIVES",
        global = true,
        env = "MITO_LOG_FILTER",
        help = "tracing filter directives, e.g. 'warn,mito::broker=debug'; overrides --log-level"
    )]
    pub filter: Option<String>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
            filter: self.filter.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the data files the backend can import
    Datafiles,
    /// Summary statistics for one column
    Describe(DescribeArgs),
    /// Undo the most recent step
    Undo,
    /// Redo the most recently undone step
    Redo,
    /// Drop every step of the current analysis
    Clear,
    /// Send a hand-built request envelope and print the reply's data
    Call(CallArgs),
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    #[arg(long, default_value_t = 0)]
    pub sheet_index: usize,

    #[arg(long)]
    pub column_id: String,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    #[arg(long, value_enum)]
    pub event: EventArg,

    #[arg(long = "type", value_name = "TYPE")]
    pub kind: String,

    #[arg(long, value_name = "JSON", value_parser = parse_json_object)]
    pub params: Option<Value>,

    #[arg(long)]
    pub step_id: Option<String>,

    #[arg(long, help = "Poll slots to wait before giving up")]
    pub max_retries: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum EventArg {
    #[value(name = "api_call")]
    ApiCall,
    #[value(name = "edit_event")]
    EditEvent,
    #[value(name = "update_event")]
    UpdateEvent,
    #[value(name = "log_event")]
    LogEvent,
}

impl From<EventArg> for EventKind {
    fn from(value: EventArg) -> Self {
        match value {
            EventArg::ApiCall => EventKind::ApiCall,
            EventArg::EditEvent => EventKind::EditEvent,
            EventArg::UpdateEvent => EventKind::UpdateEvent,
            EventArg::LogEvent => EventKind::LogEvent,
        }
    }
}

fn parse_json_object(raw: &str) -> Result<Value, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => Ok(value),
        Ok(_) => Err("params must be a JSON object".into()),
        Err(err) => Err(format!("invalid JSON: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_raw_calls() {
        let cli = Cli::try_parse_from([
            "mito-host",
            "--backend",
            "python -m mito_backend",
            "call",
            "--event",
            "edit_event",
            "--type",
            "sort_edit",
            "--params",
            r#"{"sheet_index": 0, "column_id": "a", "sort_direction": "ascending"}"#,
            "--step-id",
            "step-1",
        ])
        .expect("valid cli");
        let Command::Call(args) = cli.command else {
            panic!("expected call");
        };
        assert_eq!(EventKind::from(args.event), EventKind::EditEvent);
        assert_eq!(args.kind, "sort_edit");
        assert_eq!(args.params.expect("params")["column_id"], "a");
        assert_eq!(args.step_id.as_deref(), Some("step-1"));
    }

    #[test]
    fn rejects_non_object_params() {
        let err = Cli::try_parse_from([
            "mito-host",
            "call",
            "--event",
            "api_call",
            "--type",
            "datafiles",
            "--params",
            "[1, 2]",
        ])
        .expect_err("array params rejected");
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn logging_flags_are_global() {
        let cli = Cli::try_parse_from(["mito-host", "undo", "--log-level", "debug"])
            .expect("valid cli");
        assert_eq!(cli.logging.level, LogLevel::Debug);
        assert!(matches!(cli.command, Command::Undo));
    }

    #[test]
    fn log_filter_reaches_the_log_config() {
        let cli = Cli::try_parse_from([
            "mito-host",
            "datafiles",
            "--log-filter",
            "warn,mito::broker=debug",
        ])
        .expect("valid cli");
        let config = cli.logging.to_config();
        assert_eq!(config.filter.as_deref(), Some("warn,mito::broker=debug"));
        assert_eq!(config.level, LogLevel::Warn);
    }
}
