//! Venus Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, configuration loading and logging setup for the
//! Venus workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`VenusError`] and the [`Result`] alias
//! - **Configuration**: the host gateway's namespaced configuration blob
//!   ([`config::ExtraConfig`]) and a file loader for it
//! - **Logging**: `tracing` subscriber setup driven by that blob
//!
//! # Example
//!
//! ```no_run
//! use venus_common::config::load_extra_config;
//! use venus_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let extra = load_extra_config("gateway.json")?;
//!     init_logging(&LogConfig::from_extra_config(&extra))?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, VenusError};
