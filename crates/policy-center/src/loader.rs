//! Builds a policy snapshot by layering builtin defaults, YAML files, the
//! process environment and CLI-supplied assignments, in that order.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::defaults::default_snapshot;
use crate::errors::PolicyError;
use crate::model::{PolicySnapshot, PolicySource};
use crate::paths::assign;

/// `GATEWAY_POLICY__FETCH__TIMEOUT_MS=2500` sets `fetch.timeout_ms`.
pub const ENV_PREFIX: &str = "GATEWAY_POLICY__";
/// A JSON document shaped like the policy file, applied at environment priority.
pub const ENV_JSON: &str = "GATEWAY_POLICY_OVERRIDE_JSON";
/// Comma separated `path=value` pairs applied with CLI priority.
pub const ENV_CLI_OVERRIDES: &str = "GATEWAY_POLICY_CLI_OVERRIDES";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
    pub include_cli_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
            include_cli_env: true,
        }
    }
}

/// One leaf value headed for the snapshot.
#[derive(Debug)]
struct Assignment {
    path: String,
    value: Value,
    source: PolicySource,
}

/// Defaults, then `path` when it exists, then every environment layer.
pub fn load_snapshot(path: Option<&Path>) -> Result<PolicySnapshot, PolicyError> {
    load_snapshot_with_options(&LoadOptions {
        paths: path.map(Path::to_path_buf).into_iter().collect(),
        include_env: true,
        include_cli_env: true,
    })
}

pub fn load_snapshot_with_options(options: &LoadOptions) -> Result<PolicySnapshot, PolicyError> {
    let mut snapshot = default_snapshot();
    mark_builtin(&mut snapshot)?;

    let mut layers = Vec::new();
    for path in options.paths.iter().filter(|path| path.exists()) {
        layers.extend(file_layer(path)?);
    }
    if options.include_env || options.include_cli_env {
        let vars: Vec<(String, String)> = env::vars().collect();
        if options.include_env {
            layers.extend(env_layer(&vars)?);
        }
        if options.include_cli_env {
            if let Some((_, raw)) = vars.iter().find(|(key, _)| key == ENV_CLI_OVERRIDES) {
                layers.extend(cli_layer(raw));
            }
        }
    }

    for Assignment {
        path,
        value,
        source,
    } in layers
    {
        debug!(%path, ?source, "applying policy value");
        assign(&mut snapshot, &path, &value, source)?;
    }
    Ok(snapshot)
}

fn mark_builtin(snapshot: &mut PolicySnapshot) -> Result<(), PolicyError> {
    let mut whole = serde_json::to_value(&*snapshot)
        .map_err(|err| PolicyError::Invalid(format!("default snapshot: {err}")))?;
    if let Value::Object(sections) = &mut whole {
        sections.remove("rev");
        sections.remove("provenance");
    }
    let mut leaves = Vec::new();
    flatten_into(&whole, "", PolicySource::Builtin, &mut leaves);
    for leaf in leaves {
        snapshot.set_provenance(&leaf.path, leaf.source);
    }
    Ok(())
}

fn file_layer(path: &Path) -> Result<Vec<Assignment>, PolicyError> {
    let text = fs::read_to_string(path)
        .map_err(|err| PolicyError::Io(format!("{}: {err}", path.display())))?;
    let document: Value = serde_yaml::from_str(&text)
        .map_err(|err| PolicyError::Invalid(format!("{}: {err}", path.display())))?;
    let mut out = Vec::new();
    flatten_into(&document, "", PolicySource::File, &mut out);
    Ok(out)
}

fn env_layer(vars: &[(String, String)]) -> Result<Vec<Assignment>, PolicyError> {
    let mut out: Vec<Assignment> = vars
        .iter()
        .filter_map(|(key, raw)| {
            let path = env_key_to_path(key)?;
            Some(Assignment {
                path,
                value: scalar(raw),
                source: PolicySource::Env,
            })
        })
        .collect();

    if let Some((_, raw)) = vars.iter().find(|(key, _)| key == ENV_JSON) {
        if !raw.trim().is_empty() {
            let document: Value = serde_json::from_str(raw)
                .map_err(|err| PolicyError::Invalid(format!("{ENV_JSON}: {err}")))?;
            flatten_into(&document, "", PolicySource::Env, &mut out);
        }
    }
    Ok(out)
}

fn env_key_to_path(key: &str) -> Option<String> {
    let rest = key.strip_prefix(ENV_PREFIX)?;
    let segments: Vec<String> = rest
        .split("__")
        .filter(|segment| !segment.is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    (!segments.is_empty()).then(|| segments.join("."))
}

fn cli_layer(raw: &str) -> Vec<Assignment> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (path, value) = pair.split_once('=').unwrap_or((pair, ""));
            let path = path.trim();
            (!path.is_empty()).then(|| Assignment {
                path: path.to_string(),
                value: scalar(value.trim()),
                source: PolicySource::Cli,
            })
        })
        .collect()
}

/// Empty text clears a value; anything JSON can read keeps its type.
fn scalar(raw: &str) -> Value {
    if raw.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
    }
}

fn flatten_into(value: &Value, prefix: &str, source: PolicySource, out: &mut Vec<Assignment>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = key.trim().to_ascii_lowercase();
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(child, &path, source, out);
            }
        }
        leaf if !prefix.is_empty() => out.push(Assignment {
            path: prefix.to_string(),
            value: leaf.clone(),
            source,
        }),
        _ => {}
    }
}
