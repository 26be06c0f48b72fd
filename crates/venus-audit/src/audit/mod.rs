//! Request audit logging
//!
//! Every completed request that is not on the skip list produces one audit
//! record, which is:
//! - built from the request/response metadata ([`AuditRecord::build`])
//! - appended to the `krakend` table ([`AuditStore`])
//! - forwarded to exactly one logging sink ([`SinkRouter`])
//!
//! Audit failures are logged and counted; they never change the response.
//!
//! # Usage
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use venus_audit::audit::AuditLayer;
//! use venus_common::config::load_extra_config;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let extra = load_extra_config("gateway.json")?;
//! let mut app: Router = Router::new().route("/health", get(|| async { "ok" }));
//!
//! if let Some(audit) = AuditLayer::from_extra_config(&extra) {
//!     app = app.layer(audit);
//! }
//! # Ok(())
//! # }
//! ```

mod formatter;
mod middleware;
mod record;
mod sink;
mod store;


pub use formatter::{AuditFormatter, STORE_FAILURES_METRIC};
pub use middleware::{AuditLayer, AuditMiddleware};
pub use record::{
    client_token, normalize_timestamp, reference_offset, AuditRecord, RequestParams,
    BEARER_PREFIX, REFERENCE_UTC_OFFSET_SECS,
};
pub use sink::{AuditSink, PlainSink, ShippingSink, SinkRouter, AUDIT_LOG_TARGET};
pub use store::{
    connect_options, AuditStore, PgAuditStore, AUDIT_COLUMNS, AUDIT_TABLE, INSERT_AUDIT_RECORD,
};
