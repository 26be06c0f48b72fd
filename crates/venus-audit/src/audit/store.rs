//! Durable storage of audit records

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::time::Duration;
use tracing::debug;

use super::record::AuditRecord;
use crate::config::{DatabaseTarget, PoolSettings};
use crate::error::{AuditError, AuditResult};

/// Table audit records are appended to. Never derived from configuration.
pub const AUDIT_TABLE: &str = "krakend";

/// Insert statement for one audit record, six positional parameters in
/// column order
pub const INSERT_AUDIT_RECORD: &str = "INSERT INTO krakend \
    (timestamp, client_id, method, status, path, details) \
    VALUES ($1, $2, $3, $4, $5, $6)";

/// Column order of [`INSERT_AUDIT_RECORD`]
pub const AUDIT_COLUMNS: [&str; 6] =
    ["timestamp", "client_id", "method", "status", "path", "details"];

/// Persists audit records
///
/// Implementations must be safe to call from many requests at once.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one record. Errors are reported, never panicked on.
    async fn persist(&self, record: &AuditRecord) -> AuditResult<()>;
}

/// PostgreSQL audit store backed by a shared connection pool
///
/// The pool is created lazily: the first insert opens the first connection,
/// so an unreachable database surfaces as a
/// [`AuditError::StoreConnection`] from `persist`, not at construction.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
    persist_timeout: Duration,
}

impl PgAuditStore {
    /// Build a lazily connecting store. Must be called within a Tokio runtime.
    pub fn connect_lazy(target: &DatabaseTarget, settings: &PoolSettings) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.connect_timeout)
            .connect_lazy_with(connect_options(target));

        debug!(
            host = %target.host,
            port = target.port,
            database = %target.dbname,
            max_connections = settings.max_connections,
            "Audit store pool configured"
        );

        Self::from_pool(pool, settings.persist_timeout)
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, persist_timeout: Duration) -> Self {
        Self {
            pool,
            persist_timeout,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connection options equivalent to
/// `host=.. port=.. user=.. password=.. dbname=.. sslmode=disable`
pub fn connect_options(target: &DatabaseTarget) -> PgConnectOptions {
    let mut options = PgConnectOptions::new_without_pgpass().ssl_mode(PgSslMode::Disable);

    if !target.host.is_empty() {
        options = options.host(&target.host);
    }
    if target.port != 0 {
        options = options.port(target.port);
    }
    if !target.user.is_empty() {
        options = options.username(&target.user);
    }
    if !target.password.is_empty() {
        options = options.password(&target.password);
    }
    if !target.dbname.is_empty() {
        options = options.database(&target.dbname);
    }

    options
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn persist(&self, record: &AuditRecord) -> AuditResult<()> {
        let insert = sqlx::query(INSERT_AUDIT_RECORD)
            .bind(record.timestamp)
            .bind(&record.client_token)
            .bind(&record.method)
            .bind(i32::from(record.status_code))
            .bind(&record.path)
            .bind(&record.details)
            .execute(&self.pool);

        let result = tokio::time::timeout(self.persist_timeout, insert)
            .await
            .map_err(|_| AuditError::Timeout(self.persist_timeout))??;

        debug!(
            rows = result.rows_affected(),
            method = %record.method,
            path = %record.path,
            "Audit record persisted"
        );

        Ok(())
    }
}
