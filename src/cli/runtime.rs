use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use gateway_policy_center::{load_snapshot, PolicySnapshot};
use permissions_broker::{load_overrides_from_path, PermissionCatalog, PermissionFilter};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOCAL_ENV_PATH: &str = "config/local.env";

/// Exports `KEY=value` lines from `config/local.env` that are not already set.
pub fn load_local_env_overrides() {
    let path = Path::new(LOCAL_ENV_PATH);
    if !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => {
            for (idx, raw_line) in contents.lines().enumerate() {
                let line = raw_line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let Some((key, value)) = line.split_once('=') else {
                    warn!(line = idx + 1, "invalid local.env entry; skipping");
                    continue;
                };
                let key = key.trim();
                if key.is_empty() || env::var(key).is_ok() {
                    continue;
                }
                env::set_var(key, value.trim().trim_matches('"'));
            }
            info!(path = %path.display(), "Loaded environment overrides from local.env");
        }
        Err(err) => {
            warn!(path = %path.display(), ?err, "failed to read local.env overrides");
        }
    }
}

/// Logs go to stderr so command output on stdout stays machine readable.
pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string()));
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    Ok(())
}

/// Builtin defaults, then the optional file, then `GATEWAY_POLICY__*` variables.
pub fn load_policy(config: Option<&Path>) -> Result<PolicySnapshot> {
    if let Some(path) = config {
        if !path.exists() {
            warn!(path = %path.display(), "policy file not found; using defaults and environment");
        }
    }
    let snapshot = load_snapshot(config).context("Failed to load gateway policy")?;
    info!(rev = snapshot.rev, "policy loaded");
    Ok(snapshot)
}

/// Filter over the builtin catalog, or over a catalog adjusted by an overrides file.
pub fn load_filter(catalog: Option<&Path>) -> Result<PermissionFilter> {
    let Some(path) = catalog else {
        return Ok(PermissionFilter::default());
    };
    let overrides = load_overrides_from_path(path)
        .with_context(|| format!("Failed to read catalog overrides {}", path.display()))?;
    let catalog = PermissionCatalog::with_overrides(&overrides).context("Invalid catalog overrides")?;
    Ok(PermissionFilter::new(catalog.into()))
}
