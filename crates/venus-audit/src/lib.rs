//! Venus Audit Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Request-audit logging for an HTTP gateway.
//!
//! # Overview
//!
//! For every request handled by the gateway the audit layer captures method,
//! path, status, latency, client IP, bearer token, headers and body, then:
//!
//! - **Persists** one row to the `krakend` table in PostgreSQL
//! - **Logs** the same record through either the plain logger or the
//!   log-shipping sink
//!
//! # Architecture
//!
//! - [`config`]: typed configuration resolved from the gateway's namespaced
//!   configuration blob
//! - [`audit`]: record building, storage, sink routing and the tower layer
//! - [`middleware`]: fallback request logging when auditing is disabled
//! - [`error`]: audit failure taxonomy
//!
//! ## Framework Stack
//!
//! - **Axum / Tower**: the host middleware surface
//! - **SQLx**: parameterized inserts over a pooled PostgreSQL connection
//! - **tracing**: both logging sinks
//!
//! # Example
//!
//! ```no_run
//! use venus_audit::{audit::AuditLayer, middleware};
//! use venus_common::config::load_extra_config;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let extra = load_extra_config("gateway.json")?;
//! let app: axum::Router = axum::Router::new();
//! let app = match AuditLayer::from_extra_config(&extra) {
//!     Some(audit) => app.layer(audit),
//!     None => app,
//! };
//! let app = app.layer(middleware::tracing_layer());
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod middleware;

// Re-export commonly used types
pub use config::{AuditConfig, SinkSelector};
pub use error::{AuditError, AuditResult};
