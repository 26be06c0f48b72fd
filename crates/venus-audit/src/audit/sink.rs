//! Logging sinks for audit records
//!
//! Two sinks share one contract: the plain sink logs the record as a compact
//! JSON string, the shipping sink emits an event with an empty message and
//! the record attached as structured fields so a JSON/logstash formatter can
//! ship it without re-parsing.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use super::record::AuditRecord;
use crate::config::SinkSelector;
use crate::error::AuditError;

/// `tracing` target every audit sink event is emitted under
pub const AUDIT_LOG_TARGET: &str = "venus::audit";

/// A log-output destination for audit records
///
/// Write failures are the sink's own concern and are never reported back.
pub trait AuditSink: Send + Sync {
    fn write(&self, record: &AuditRecord);
}

/// Logs the serialized payload as the message of an info event
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainSink;

impl AuditSink for PlainSink {
    fn write(&self, record: &AuditRecord) {
        match serde_json::to_string(record.payload()).map_err(AuditError::from) {
            Ok(serialized) => info!(target: AUDIT_LOG_TARGET, "{}", serialized),
            Err(e) => warn!(
                target: AUDIT_LOG_TARGET,
                error = %e,
                path = %record.path,
                "Failed to serialize audit record"
            ),
        }
    }
}

/// Emits the payload as structured fields with an empty message
///
/// Every scalar of `details.data` becomes a field of its own; `body` and
/// `header` are nested values and are attached as JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShippingSink;

impl AuditSink for ShippingSink {
    fn write(&self, record: &AuditRecord) {
        let data = &record.payload()["data"];
        let text = |key: &str| data.get(key).and_then(JsonValue::as_str).unwrap_or_default();
        let latency = data.get("latency").and_then(JsonValue::as_u64).unwrap_or_default();
        let body = data.get("body").unwrap_or(&JsonValue::Null);
        let header = data.get("header").unwrap_or(&JsonValue::Null);

        info!(
            target: AUDIT_LOG_TARGET,
            timestamp = %record.timestamp.to_rfc3339(),
            client_id = %record.client_token,
            method = %record.method,
            path = %record.path,
            status_code = record.status_code,
            host = %text("host"),
            user_agent = %text("user_agent"),
            client_ip = %text("client_ip"),
            latency = latency,
            response_timestamp = %text("response_timestamp"),
            body = %body,
            header = %header,
            ""
        );
    }
}

/// Forwards each record to exactly one sink, chosen once at construction
#[derive(Clone)]
pub struct SinkRouter {
    selector: SinkSelector,
    plain: Arc<dyn AuditSink>,
    shipping: Arc<dyn AuditSink>,
}

impl SinkRouter {
    /// Router over the default [`PlainSink`] and [`ShippingSink`]
    pub fn new(selector: SinkSelector) -> Self {
        Self::with_sinks(selector, Arc::new(PlainSink), Arc::new(ShippingSink))
    }

    pub fn with_sinks(
        selector: SinkSelector,
        plain: Arc<dyn AuditSink>,
        shipping: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            selector,
            plain,
            shipping,
        }
    }

    pub fn selector(&self) -> SinkSelector {
        self.selector
    }

    pub fn route(&self, record: &AuditRecord) {
        match self.selector {
            SinkSelector::Shipping => self.shipping.write(record),
            SinkSelector::Plain => self.plain.write(record),
        }
    }
}

impl std::fmt::Debug for SinkRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkRouter")
            .field("selector", &self.selector)
            .finish_non_exhaustive()
    }
}

/// In-memory sink for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    records: std::sync::Mutex<Vec<AuditRecord>>,
}

#[cfg(test)]
impl RecordingSink {
    pub(crate) fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
impl AuditSink for RecordingSink {
    fn write(&self, record: &AuditRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record.clone());
        }
    }
}
