//! Audit formatter: the per-request orchestration of the audit pipeline

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tracing::{debug, error};

use super::record::{AuditRecord, RequestParams};
use super::sink::SinkRouter;
use super::store::{AuditStore, PgAuditStore};
use crate::config::AuditConfig;

/// Name of the counter incremented on every failed audit write
pub const STORE_FAILURES_METRIC: &str = "venus_audit_store_failures_total";

/// Builds, persists and routes one audit record per completed request
///
/// Shared behind an `Arc` by every request; holds no per-request state.
pub struct AuditFormatter {
    config: Arc<AuditConfig>,
    store: Arc<dyn AuditStore>,
    router: SinkRouter,
    store_failures: AtomicU64,
}

impl AuditFormatter {
    pub fn new(config: AuditConfig, store: Arc<dyn AuditStore>, router: SinkRouter) -> Self {
        Self {
            config: Arc::new(config),
            store,
            router,
            store_failures: AtomicU64::new(0),
        }
    }

    /// Formatter writing to PostgreSQL and the sink chosen by the
    /// configuration. Must be called within a Tokio runtime.
    pub fn from_config(config: AuditConfig) -> Self {
        let store = PgAuditStore::connect_lazy(&config.database, &config.pool);
        let router = SinkRouter::new(config.sink);
        Self::new(config, Arc::new(store), router)
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Number of audit writes that failed since construction
    pub fn store_failures(&self) -> u64 {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// Run the pipeline for one request
    ///
    /// Always returns an empty string: the host middleware owns console
    /// output. A store failure is logged and counted, and the record still
    /// reaches the sink.
    pub async fn format(&self, params: &RequestParams) -> String {
        let record = AuditRecord::build(params);

        if let Err(e) = self.store.persist(&record).await {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(STORE_FAILURES_METRIC).increment(1);
            error!(
                error = %e,
                method = %record.method,
                path = %record.path,
                status = record.status_code,
                "Failed to persist audit record"
            );
        }

        self.router.route(&record);

        debug!(
            method = %record.method,
            path = %record.path,
            sink = %self.router.selector(),
            "Audit record processed"
        );

        String::new()
    }
}

impl std::fmt::Debug for AuditFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditFormatter")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("store_failures", &self.store_failures())
            .finish_non_exhaustive()
    }
}

/// In-memory store for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemoryStore {
    records: std::sync::Mutex<Vec<AuditRecord>>,
    fail: bool,
}

#[cfg(test)]
impl MemoryStore {
    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub(crate) fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
#[async_trait::async_trait]
impl AuditStore for MemoryStore {
    async fn persist(&self, record: &AuditRecord) -> crate::error::AuditResult<()> {
        if self.fail {
            return Err(crate::error::AuditError::from(sqlx::Error::PoolTimedOut));
        }
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
        Ok(())
    }
}
