//! Host gateway configuration blob
//!
//! The gateway hands every plugin the same loosely-typed configuration: a
//! top-level mapping keyed by namespace strings, where each namespace owns an
//! arbitrary nested value. Components look up their own namespace and decode
//! it themselves.

use std::path::Path;

use ::config::{Config, File, FileFormat};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, VenusError};

/// Namespaced, untyped configuration supplied by the host gateway
pub type ExtraConfig = Map<String, Value>;

/// Namespace of the structured logging component
pub const GOLOGGING_NAMESPACE: &str = "github_com/devopsfaith/krakend-gologging";

/// Namespace of the log-shipping (logstash) component
pub const LOGSTASH_NAMESPACE: &str = "github_com/devopsfaith/krakend-logstash";

/// Load an [`ExtraConfig`] from a JSON, TOML or YAML file
///
/// The file format is inferred from the extension (`json`, `toml`, `yaml` or
/// `yml`).
pub fn load_extra_config(path: impl AsRef<Path>) -> Result<ExtraConfig> {
    let path = path.as_ref();
    let format = file_format(path)?;
    let contents = std::fs::read_to_string(path)?;

    let extra = Config::builder()
        .add_source(File::from_str(&contents, format))
        .build()?
        .try_deserialize::<ExtraConfig>()?;

    debug!(
        path = %path.display(),
        namespaces = extra.len(),
        "Loaded gateway configuration"
    );

    Ok(extra)
}

fn file_format(path: &Path) -> Result<FileFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "json" => Ok(FileFormat::Json),
        "toml" => Ok(FileFormat::Toml),
        "yaml" | "yml" => Ok(FileFormat::Yaml),
        other => Err(VenusError::Parse(format!(
            "unsupported configuration format '{}' for {}",
            other,
            path.display()
        ))),
    }
}

/// Look up a namespace and return it only when it is a mapping
pub fn namespace<'a>(extra: &'a ExtraConfig, key: &str) -> Option<&'a Map<String, Value>> {
    extra.get(key).and_then(Value::as_object)
}
