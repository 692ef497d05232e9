//! Live gateway policy: per-class TPS ceilings, quota categories per endpoint,
//! pagination key settings, SLA thresholds and the fetch timeout.
//!
//! A snapshot starts from builtin defaults and is then layered with YAML files,
//! `GATEWAY_POLICY__*` variables and CLI assignments. Runtime overrides sit on
//! top and may expire on their own.

pub mod api;
pub mod defaults;
pub mod errors;
pub mod loader;
pub mod model;
pub mod override_store;
pub mod paths;

pub use api::{InMemoryPolicyCenter, PolicyCenter};
pub use defaults::{default_snapshot, DEFAULT_BASE_URL};
pub use errors::PolicyError;
pub use loader::{
    load_snapshot, load_snapshot_with_options, LoadOptions, ENV_CLI_OVERRIDES, ENV_JSON,
    ENV_PREFIX,
};
pub use model::{
    FailurePolicy, FetchPolicy, PaginationPolicy, PolicySnapshot, PolicySource, QuotaCategory,
    QuotaPolicy, RateLimitPolicy, RuntimeOverrideSpec, SecurityPolicy, SlaPolicy,
};
pub use paths::{KNOWN_PATHS, MAX_KEY_TTL_MINUTES};

#[cfg(test)]
mod tests;
