//! Logging Configuration and Initialization
//!
//! Centralized `tracing` setup for every Venus component. It supports:
//!
//! - Multiple output targets (console, file, both)
//! - Multiple log formats (text, JSON)
//! - Configurable log levels
//! - Log file rotation (daily)
//! - Configuration from the gateway's structured-logging namespace
//!
//! When the gateway enables log shipping, output switches to JSON so the
//! structured fields attached by the audit shipping sink reach the shipper
//! intact.
//!
//! # Example
//!
//! ```no_run
//! use venus_common::config::ExtraConfig;
//! use venus_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let extra = ExtraConfig::new();
//!     init_logging(&LogConfig::from_extra_config(&extra))?;
//!
//!     info!("Gateway started");
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::{namespace, ExtraConfig, GOLOGGING_NAMESPACE, LOGSTASH_NAMESPACE};

/// Log level for filtering messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Very detailed trace-level logging
    Trace,
    /// Debug-level logging for development
    Debug,
    /// Informational messages
    #[default]
    Info,
    /// Warning messages
    Warn,
    /// Error messages
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            // gologging knows CRITICAL, tracing stops at ERROR
            "error" | "critical" => Ok(LogLevel::Error),
            _ => Err(anyhow::anyhow!("Invalid log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Output target for logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Output to console only
    #[default]
    Console,
    /// Output to file only
    File,
    /// Output to both console and file
    Both,
}

impl std::str::FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "console" | "stdout" => Ok(LogOutput::Console),
            "file" => Ok(LogOutput::File),
            "both" | "all" => Ok(LogOutput::Both),
            _ => Err(anyhow::anyhow!("Invalid log output: {}", s)),
        }
    }
}

impl std::fmt::Display for LogOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogOutput::Console => write!(f, "console"),
            LogOutput::File => write!(f, "file"),
            LogOutput::Both => write!(f, "both"),
        }
    }
}

/// Log format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging and log shipping
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "pretty" | "default" | "custom" => Ok(LogFormat::Text),
            "json" | "logstash" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Text => write!(f, "text"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,

    /// Output target (console, file, or both)
    pub output: LogOutput,

    /// Log format (text or JSON)
    pub format: LogFormat,

    /// Directory for log files (only used when output includes file)
    pub log_dir: PathBuf,

    /// Log file name prefix (e.g., "venus" -> "venus.2024-01-18")
    pub log_file_prefix: String,

    /// Additional filter directives (e.g., "sqlx=warn,tower_http=debug")
    pub filter_directives: Option<String>,

    /// Whether to include file and line number in logs
    pub include_location: bool,

    /// Whether to include thread IDs in logs
    pub include_thread_ids: bool,

    /// Whether to include target module names in logs
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "venus".to_string(),
            filter_directives: None,
            include_location: false,
            include_thread_ids: false,
            include_targets: true,
        }
    }
}

impl LogConfig {
    /// Derive the logging configuration from the gateway configuration blob
    ///
    /// Recognized keys in the structured-logging namespace:
    /// - `level`: DEBUG, INFO, WARNING, ERROR or CRITICAL
    /// - `prefix`: log file prefix, surrounding brackets are stripped
    /// - `stdout`: `false` sends logs to files under `log_dir` instead
    /// - `format`: `default`, `custom` or `logstash`
    /// - `log_dir`: directory for log files
    /// - `output`: `console`, `file` or `both`; overrides `stdout`
    /// - `filter`: extra `EnvFilter` directives, e.g. `"sqlx=warn"`
    /// - `include_location`, `include_thread_ids`, `include_targets`: booleans
    ///
    /// Unknown or malformed values keep their defaults. The presence of the
    /// log-shipping namespace forces JSON output.
    pub fn from_extra_config(extra: &ExtraConfig) -> Self {
        let mut config = Self::default();

        if let Some(logging) = namespace(extra, GOLOGGING_NAMESPACE) {
            if let Some(level) = logging.get("level").and_then(|v| v.as_str()) {
                config.level = level.parse().unwrap_or(config.level);
            }

            if let Some(prefix) = logging.get("prefix").and_then(|v| v.as_str()) {
                let prefix = prefix.trim_matches(|c| c == '[' || c == ']').trim();
                if !prefix.is_empty() {
                    config.log_file_prefix = prefix.to_lowercase();
                }
            }

            if let Some(false) = logging.get("stdout").and_then(|v| v.as_bool()) {
                config.output = LogOutput::File;
            }

            if let Some(format) = logging.get("format").and_then(|v| v.as_str()) {
                config.format = format.parse().unwrap_or_default();
            }

            if let Some(dir) = logging.get("log_dir").and_then(|v| v.as_str()) {
                config.log_dir = PathBuf::from(dir);
            }

            if let Some(output) = logging.get("output").and_then(|v| v.as_str()) {
                config.output = output.parse().unwrap_or(config.output);
            }

            if let Some(filter) = logging.get("filter").and_then(|v| v.as_str()) {
                if !filter.trim().is_empty() {
                    config.filter_directives = Some(filter.to_string());
                }
            }

            let flag = |key: &str| logging.get(key).and_then(|v| v.as_bool());
            if let Some(include) = flag("include_location") {
                config.include_location = include;
            }
            if let Some(include) = flag("include_thread_ids") {
                config.include_thread_ids = include;
            }
            if let Some(include) = flag("include_targets") {
                config.include_targets = include;
            }
        }

        if extra.contains_key(LOGSTASH_NAMESPACE) {
            config.format = LogFormat::Json;
        }

        config
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging with the given configuration
///
/// This sets up the global tracing subscriber. It should only be called once
/// at application startup.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let mut filter =
        EnvFilter::from_default_env().add_directive(config.level.to_tracing_level().into());

    if let Some(ref directives) = config.filter_directives {
        for directive in directives.split(',') {
            filter = filter.add_directive(
                directive
                    .parse()
                    .context("Failed to parse filter directive")?,
            );
        }
    }

    let mut layers: Vec<BoxedLayer> = vec![filter.boxed()];

    if matches!(config.output, LogOutput::Console | LogOutput::Both) {
        layers.push(fmt_layer(config, std::io::stdout, true));
    }

    if matches!(config.output, LogOutput::File | LogOutput::Both) {
        std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;

        let file_appender =
            tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The writer stops flushing once the guard drops; it has to live as
        // long as the process.
        std::mem::forget(guard);

        layers.push(fmt_layer(config, non_blocking, false));
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        level = %config.level,
        output = %config.output,
        format = %config.format,
        "Logging initialized"
    );

    Ok(())
}

fn fmt_layer<W>(config: &LogConfig, writer: W, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(config.include_targets)
        .with_thread_ids(config.include_thread_ids)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(FmtSpan::CLOSE);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extra(value: serde_json::Value) -> ExtraConfig {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("Info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("CRITICAL".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("invalid".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_output_from_str() {
        assert_eq!("console".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert_eq!("file".parse::<LogOutput>().unwrap(), LogOutput::File);
        assert_eq!("both".parse::<LogOutput>().unwrap(), LogOutput::Both);
        assert!("invalid".parse::<LogOutput>().is_err());
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("default".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("logstash".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("invalid".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_from_extra_config_reads_output_and_layer_options() {
        let config = LogConfig::from_extra_config(&extra(json!({
            GOLOGGING_NAMESPACE: {
                "stdout": false,
                "output": "both",
                "filter": "sqlx=warn,tower_http=debug",
                "include_location": true,
                "include_thread_ids": true,
                "include_targets": false
            }
        })));

        assert_eq!(config.output, LogOutput::Both);
        assert_eq!(config.filter_directives.as_deref(), Some("sqlx=warn,tower_http=debug"));
        assert!(config.include_location);
        assert!(config.include_thread_ids);
        assert!(!config.include_targets);
    }

    #[test]
    fn test_unknown_output_keeps_stdout_choice() {
        let config = LogConfig::from_extra_config(&extra(json!({
            GOLOGGING_NAMESPACE: { "stdout": false, "output": "syslog", "filter": "  " }
        })));

        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.filter_directives, None);
        assert!(config.include_targets);
    }

    #[test]
    fn test_from_extra_config_without_logging_namespace() {
        let config = LogConfig::from_extra_config(&ExtraConfig::new());

        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.output, LogOutput::Console);
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_from_extra_config_reads_gologging_namespace() {
        let config = LogConfig::from_extra_config(&extra(json!({
            GOLOGGING_NAMESPACE: {
                "level": "DEBUG",
                "prefix": "[KRAKEND]",
                "stdout": false,
                "format": "default",
                "log_dir": "/tmp/venus-logs"
            }
        })));

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.log_file_prefix, "krakend");
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/venus-logs"));
    }

    #[test]
    fn test_logstash_namespace_forces_json() {
        let config = LogConfig::from_extra_config(&extra(json!({
            GOLOGGING_NAMESPACE: { "level": "INFO", "format": "default" },
            LOGSTASH_NAMESPACE: { "enabled": true }
        })));

        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_malformed_values_keep_defaults() {
        let config = LogConfig::from_extra_config(&extra(json!({
            GOLOGGING_NAMESPACE: { "level": 3, "stdout": "yes", "prefix": "[]" }
        })));

        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.output, LogOutput::Console);
        assert_eq!(config.log_file_prefix, "venus");
    }
}
