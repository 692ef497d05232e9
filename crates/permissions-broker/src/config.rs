//! Institution support declarations for the permission catalog.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Overrides for the compiled-in `supported` flags, keyed by permission code.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogOverrides {
    #[serde(default)]
    pub supported: HashMap<String, bool>,
}

/// Errors surfaced while loading catalog overrides.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize catalog overrides: {0}")]
    Deserialize(String),
}

pub fn load_overrides_from_reader<R: Read>(mut reader: R) -> Result<CatalogOverrides, ConfigError> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    parse_overrides_str(&buf)
}

pub fn load_overrides_from_path(path: impl AsRef<Path>) -> Result<CatalogOverrides, ConfigError> {
    let file = File::open(path.as_ref())?;
    load_overrides_from_reader(file)
}

pub fn parse_overrides_str(raw: &str) -> Result<CatalogOverrides, ConfigError> {
    match serde_json::from_str(raw) {
        Ok(overrides) => Ok(overrides),
        Err(json_err) => serde_yaml::from_str(raw).map_err(|yaml_err| {
            ConfigError::Deserialize(format!(
                "json error: {}; yaml error: {}",
                json_err, yaml_err
            ))
        }),
    }
}
