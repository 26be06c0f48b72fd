//! Audit configuration resolved from the gateway configuration blob
//!
//! The blob is untyped: every field is checked individually and anything
//! missing or of the wrong shape falls back to its default. Only a missing
//! (or non-mapping) venus namespace makes the whole configuration absent.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use venus_common::config::{namespace, ExtraConfig, GOLOGGING_NAMESPACE, LOGSTASH_NAMESPACE};

use crate::error::{AuditError, AuditResult};

// ============================================================================
// Configuration Constants
// ============================================================================

/// Namespace key of this component inside the gateway configuration
pub const NAMESPACE: &str = "github_com/vickyphang/venus";

/// Short module name used as a log prefix
pub const MODULE_NAME: &str = "venus";

/// Default maximum number of pooled audit store connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default time allowed to acquire an audit store connection, in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Default time allowed for a single audit insert, in milliseconds.
pub const DEFAULT_PERSIST_TIMEOUT_MS: u64 = 5_000;

/// Largest request body captured into an audit record, in bytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Which logging sink receives the audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkSelector {
    /// Compact JSON string through the plain logger
    #[default]
    Plain,
    /// Structured fields through the log-shipping pipeline
    Shipping,
}

impl SinkSelector {
    /// Shipping only when both the structured-logging and log-shipping
    /// namespaces are configured.
    pub fn from_extra_config(extra: &ExtraConfig) -> Self {
        if extra.contains_key(GOLOGGING_NAMESPACE) && extra.contains_key(LOGSTASH_NAMESPACE) {
            SinkSelector::Shipping
        } else {
            SinkSelector::Plain
        }
    }
}

impl std::fmt::Display for SinkSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkSelector::Plain => write!(f, "plain"),
            SinkSelector::Shipping => write!(f, "shipping"),
        }
    }
}

/// Connection coordinates of the audit store
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

impl std::fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .finish()
    }
}

/// Connection pool settings for the audit store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub persist_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            persist_timeout: Duration::from_millis(DEFAULT_PERSIST_TIMEOUT_MS),
        }
    }
}

/// Fully-typed audit configuration
///
/// Built once when the middleware is constructed and shared read-only by
/// every request afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    pub skip_paths: Vec<String>,
    pub sink: SinkSelector,
    pub database: DatabaseTarget,
    pub pool: PoolSettings,
    /// Bodies larger than this, or of unknown length, are passed through
    /// without being captured. `0` disables body capture.
    pub max_body_bytes: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            skip_paths: Vec::new(),
            sink: SinkSelector::default(),
            database: DatabaseTarget::default(),
            pool: PoolSettings::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl AuditConfig {
    /// Resolve the configuration, or `None` when the venus namespace is
    /// absent. The caller then keeps its plain, unaudited request logging.
    pub fn from_extra_config(extra: &ExtraConfig) -> Option<Self> {
        Self::try_from_extra_config(extra).ok()
    }

    /// Like [`AuditConfig::from_extra_config`] but reports why the
    /// configuration is absent. Malformed fields never fail resolution.
    pub fn try_from_extra_config(extra: &ExtraConfig) -> AuditResult<Self> {
        let venus = namespace(extra, NAMESPACE)
            .ok_or_else(|| AuditError::ConfigurationAbsent(NAMESPACE.to_string()))?;

        let password = match venus.get("pass") {
            Some(Value::String(pass)) => pass.clone(),
            _ => string_field(venus, "password"),
        };

        let database = DatabaseTarget {
            host: string_field(venus, "host"),
            port: port_field(venus, "port"),
            user: string_field(venus, "user"),
            password,
            dbname: string_field(venus, "dbname"),
        };

        let pool = PoolSettings {
            max_connections: match u64_field(venus, "max_connections") {
                Some(0) | None => DEFAULT_MAX_CONNECTIONS,
                Some(n) => u32::try_from(n).unwrap_or(u32::MAX),
            },
            connect_timeout: timeout_field(venus, "connect_timeout_ms", DEFAULT_CONNECT_TIMEOUT_MS),
            persist_timeout: timeout_field(venus, "persist_timeout_ms", DEFAULT_PERSIST_TIMEOUT_MS),
        };

        let max_body_bytes = match u64_field(venus, "max_body_bytes") {
            Some(n) => usize::try_from(n).unwrap_or(usize::MAX),
            None => DEFAULT_MAX_BODY_BYTES,
        };

        Ok(Self {
            skip_paths: skip_paths(venus),
            sink: SinkSelector::from_extra_config(extra),
            database,
            pool,
            max_body_bytes,
        })
    }
}

fn skip_paths(venus: &Map<String, Value>) -> Vec<String> {
    match venus.get("skip_paths") {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry {
                Value::String(path) => Some(path.clone()),
                other => {
                    let reason = format!("dropping non-string entry {other}");
                    debug!(
                        error = %AuditError::malformed("skip_paths", reason),
                        "Ignoring skip path"
                    );
                    None
                },
            })
            .collect(),
        Some(other) => {
            log_default("skip_paths", other);
            Vec::new()
        },
        None => Vec::new(),
    }
}

fn string_field(venus: &Map<String, Value>, field: &str) -> String {
    match venus.get(field) {
        Some(Value::String(value)) => value.clone(),
        Some(other) => {
            log_default(field, other);
            String::new()
        },
        None => String::new(),
    }
}

/// Generic decoders hand numbers over as either integers or floats; both
/// are accepted and floats are truncated.
fn port_field(venus: &Map<String, Value>, field: &str) -> u16 {
    match u64_field(venus, field) {
        Some(port) => u16::try_from(port).unwrap_or_else(|_| {
            debug!(
                error = %AuditError::malformed(field, format!("{port} is out of range")),
                "Using default value"
            );
            0
        }),
        None => 0,
    }
}

/// A zero timeout would expire every store call, so it counts as malformed
fn timeout_field(venus: &Map<String, Value>, field: &str, default_ms: u64) -> Duration {
    match u64_field(venus, field) {
        Some(0) => {
            debug!(
                error = %AuditError::malformed(field, "timeout must be greater than zero"),
                "Using default value"
            );
            Duration::from_millis(default_ms)
        },
        Some(ms) => Duration::from_millis(ms),
        None => Duration::from_millis(default_ms),
    }
}

fn u64_field(venus: &Map<String, Value>, field: &str) -> Option<u64> {
    let value = venus.get(field)?;

    if let Some(n) = value.as_u64() {
        return Some(n);
    }

    match value.as_f64() {
        Some(f) if f.is_finite() && f >= 0.0 => Some(f.trunc() as u64),
        _ => {
            log_default(field, value);
            None
        },
    }
}

fn log_default(field: &str, value: &Value) {
    debug!(
        error = %AuditError::malformed(field, format!("unexpected value {value}")),
        "Using default value"
    );
}
