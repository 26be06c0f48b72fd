//! Audit pipeline error types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for audit operations
pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Failures on the audit path
///
/// None of these ever reach the client: the formatter logs them, counts
/// store failures, and lets the request complete.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit configuration namespace '{0}' is missing or not a mapping")]
    ConfigurationAbsent(String),

    #[error("Audit configuration field '{field}' is malformed: {reason}")]
    ConfigurationFieldMalformed { field: String, reason: String },

    #[error("Audit store connection failed: {0}")]
    StoreConnection(#[source] sqlx::Error),

    #[error("Audit store write failed: {0}")]
    StoreWrite(#[source] sqlx::Error),

    #[error("Audit store write timed out after {0:?}")]
    Timeout(Duration),

    #[error("Audit record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to load gateway configuration: {0}")]
    ConfigLoad(#[from] venus_common::VenusError),
}

impl AuditError {
    /// Create a malformed-field error
    pub fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationFieldMalformed {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this failure came from the audit store
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            Self::StoreConnection(_) | Self::StoreWrite(_) | Self::Timeout(_)
        )
    }
}

impl From<sqlx::Error> for AuditError {
    /// Splits driver errors into "could not reach the database" and
    /// "reached it but the statement failed".
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Configuration(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::StoreConnection(err),
            _ => Self::StoreWrite(err),
        }
    }
}
