//! Dotted policy paths (`section.key`) and how a JSON value lands on each.

use serde_json::Value;

use crate::errors::PolicyError;
use crate::model::{FailurePolicy, PolicySnapshot, PolicySource, QuotaCategory};

/// Every path accepted by files, environment, CLI and runtime overrides.
pub const KNOWN_PATHS: &[&str] = &[
    "rate_limits.tps_high",
    "rate_limits.tps_medium",
    "rate_limits.failure_policy",
    "quotas.list_accounts",
    "quotas.account_detail",
    "quotas.balances",
    "quotas.overdraft_limits",
    "quotas.transactions",
    "quotas.failure_policy",
    "pagination.key_ttl_minutes",
    "pagination.signing_secret",
    "pagination.base_url",
    "pagination.small_page_threshold",
    "sla.high_ms",
    "sla.medium_ms",
    "security.denied_ips",
    "fetch.timeout_ms",
];

/// Longest accepted pagination key lifetime, one week.
pub const MAX_KEY_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Writes `value` at `path` and records provenance when the snapshot changed.
///
/// Numeric ceilings from files and the environment can only go down; CLI and
/// runtime overrides set them outright.
pub(crate) fn assign(
    snapshot: &mut PolicySnapshot,
    path: &str,
    value: &Value,
    source: PolicySource,
) -> Result<(), PolicyError> {
    let tighten = !matches!(source, PolicySource::Cli | PolicySource::RuntimeOverride);
    let rate = &mut snapshot.rate_limits;
    let quotas = &mut snapshot.quotas;
    let paging = &mut snapshot.pagination;
    let sla = &mut snapshot.sla;

    let changed = match path {
        "rate_limits.tps_high" => ceiling(&mut rate.tps_high, narrow(integer(value)?)?, tighten),
        "rate_limits.tps_medium" => {
            ceiling(&mut rate.tps_medium, narrow(integer(value)?)?, tighten)
        }
        "rate_limits.failure_policy" => put(&mut rate.failure_policy, failure_mode(value)?),
        "quotas.list_accounts" => put(&mut quotas.list_accounts, category(value)?),
        "quotas.account_detail" => put(&mut quotas.account_detail, category(value)?),
        "quotas.balances" => put(&mut quotas.balances, category(value)?),
        "quotas.overdraft_limits" => put(&mut quotas.overdraft_limits, category(value)?),
        "quotas.transactions" => put(&mut quotas.transactions, category(value)?),
        "quotas.failure_policy" => put(&mut quotas.failure_policy, failure_mode(value)?),
        "pagination.key_ttl_minutes" => {
            ceiling(&mut paging.key_ttl_minutes, key_ttl(value)?, tighten)
        }
        "pagination.signing_secret" => put(&mut paging.signing_secret, optional_text(value)?),
        "pagination.base_url" => put(&mut paging.base_url, text(value)?),
        "pagination.small_page_threshold" => {
            put(&mut paging.small_page_threshold, narrow(integer(value)?)?)
        }
        "sla.high_ms" => ceiling(&mut sla.high_ms, integer(value)?, tighten),
        "sla.medium_ms" => ceiling(&mut sla.medium_ms, integer(value)?, tighten),
        "security.denied_ips" => put(&mut snapshot.security.denied_ips, text_list(value)?),
        "fetch.timeout_ms" => ceiling(&mut snapshot.fetch.timeout_ms, positive(value)?, tighten),
        unknown => return Err(PolicyError::UnsupportedPath(unknown.to_string())),
    };

    if changed {
        snapshot.set_provenance(path, source);
    }
    Ok(())
}

fn ceiling<T: Ord + Copy>(slot: &mut T, candidate: T, tighten: bool) -> bool {
    let next = if tighten { (*slot).min(candidate) } else { candidate };
    put(slot, next)
}

fn put<T: PartialEq>(slot: &mut T, candidate: T) -> bool {
    let changed = *slot != candidate;
    *slot = candidate;
    changed
}

fn invalid(expected: &str, value: &Value) -> PolicyError {
    PolicyError::InvalidValue(format!("expected {expected}, got {value}"))
}

fn integer(value: &Value) -> Result<u64, PolicyError> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
    .ok_or_else(|| invalid("a non-negative integer", value))
}

fn positive(value: &Value) -> Result<u64, PolicyError> {
    match integer(value)? {
        0 => Err(invalid("a positive integer", value)),
        n => Ok(n),
    }
}

fn key_ttl(value: &Value) -> Result<u64, PolicyError> {
    match positive(value)? {
        minutes if minutes > MAX_KEY_TTL_MINUTES => Err(PolicyError::InvalidValue(format!(
            "key ttl of {minutes} minutes exceeds {MAX_KEY_TTL_MINUTES}"
        ))),
        minutes => Ok(minutes),
    }
}

fn narrow(n: u64) -> Result<u32, PolicyError> {
    u32::try_from(n).map_err(|_| PolicyError::InvalidValue(format!("{n} does not fit in 32 bits")))
}

fn text(value: &Value) -> Result<String, PolicyError> {
    match value.as_str().map(str::trim) {
        Some(raw) if !raw.is_empty() => Ok(raw.to_string()),
        _ => Err(invalid("a non-empty string", value)),
    }
}

fn optional_text(value: &Value) -> Result<Option<String>, PolicyError> {
    if value.is_null() {
        Ok(None)
    } else {
        text(value).map(Some)
    }
}

/// Accepts a sequence or a comma separated string.
fn text_list(value: &Value) -> Result<Vec<String>, PolicyError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items.iter().map(text).collect(),
        Value::String(raw) => Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(String::from)
            .collect()),
        other => Err(invalid("a list", other)),
    }
}

fn category(value: &Value) -> Result<QuotaCategory, PolicyError> {
    value
        .as_str()
        .and_then(QuotaCategory::parse)
        .ok_or_else(|| invalid("a quota category", value))
}

fn failure_mode(value: &Value) -> Result<FailurePolicy, PolicyError> {
    let raw = value.as_str().map(|raw| raw.trim().to_ascii_lowercase());
    match raw.as_deref() {
        Some("open") => Ok(FailurePolicy::Open),
        Some("closed") => Ok(FailurePolicy::Closed),
        _ => Err(invalid("open or closed", value)),
    }
}
