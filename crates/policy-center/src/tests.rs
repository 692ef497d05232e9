use std::env;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use gateway_core_types::Endpoint;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::api::{InMemoryPolicyCenter, PolicyCenter};
use crate::defaults::default_snapshot;
use crate::loader::{load_snapshot, LoadOptions, ENV_CLI_OVERRIDES};
use crate::model::{
    FailurePolicy, PolicySnapshot, PolicySource, QuotaCategory, RuntimeOverrideSpec,
};

/// Serialises tests that read or write `GATEWAY_POLICY*` variables.
fn lock_env() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn policy_file(yaml: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("policy.yaml");
    std::fs::write(&path, yaml).unwrap();
    (dir, path)
}

fn operator_override(path: &str, value: Value, ttl_seconds: u64) -> RuntimeOverrideSpec {
    RuntimeOverrideSpec {
        path: path.into(),
        value,
        owner: "ops".into(),
        reason: "incident".into(),
        ttl_seconds,
    }
}

fn source_of(snapshot: &PolicySnapshot, path: &str) -> Option<PolicySource> {
    snapshot.provenance.get(path).map(|entry| entry.source)
}

#[test]
fn builtin_defaults_follow_the_regulatory_tables() {
    let snapshot = default_snapshot();
    assert_eq!(snapshot.rev, 1);
    assert_eq!(snapshot.pagination.key_ttl_minutes, 60);
    assert_eq!(snapshot.sla.threshold_ms(Endpoint::ListAccounts), 1_500);
    assert_eq!(snapshot.sla.threshold_ms(Endpoint::Transactions), 2_000);

    let balances = snapshot.quotas.category_for(Endpoint::Balances);
    assert_eq!(balances, QuotaCategory::SpecialAccounts);
    assert_eq!(
        snapshot
            .quotas
            .category_for(Endpoint::OverdraftLimits)
            .monthly_limit(),
        420
    );
    assert!(
        snapshot.rate_limits.tps_for(Endpoint::Balances)
            < snapshot.rate_limits.tps_for(Endpoint::ListAccounts)
    );
    assert_eq!(snapshot.quotas.failure_policy, FailurePolicy::Open);
}

#[test]
fn loaded_snapshot_marks_untouched_leaves_as_builtin() {
    let _env = lock_env();
    let snapshot = load_snapshot(None).unwrap();
    assert_eq!(
        source_of(&snapshot, "pagination.key_ttl_minutes"),
        Some(PolicySource::Builtin)
    );
    assert_eq!(
        source_of(&snapshot, "security.denied_ips"),
        Some(PolicySource::Builtin)
    );
}

#[test]
fn policy_file_tightens_but_never_loosens_ceilings() {
    let _env = lock_env();
    let (_dir, path) = policy_file(
        "rate_limits:\n  tps_high: 10\n  tps_medium: 5000\n\
         quotas:\n  transactions: high\n\
         pagination:\n  key_ttl_minutes: 15\n  base_url: https://bank.test/accounts/v2\n\
         security:\n  denied_ips: [10.0.0.9]\n",
    );

    let snapshot = load_snapshot(Some(&path)).unwrap();
    assert_eq!(snapshot.rate_limits.tps_high, 10);
    assert_eq!(snapshot.rate_limits.tps_medium, 150);
    assert_eq!(snapshot.quotas.transactions, QuotaCategory::High);
    assert_eq!(snapshot.pagination.key_ttl_minutes, 15);
    assert_eq!(snapshot.pagination.base_url, "https://bank.test/accounts/v2");
    assert_eq!(snapshot.security.denied_ips, ["10.0.0.9"]);

    assert_eq!(source_of(&snapshot, "rate_limits.tps_high"), Some(PolicySource::File));
    assert_eq!(
        source_of(&snapshot, "rate_limits.tps_medium"),
        Some(PolicySource::Builtin)
    );
}

#[test]
fn missing_policy_file_falls_back_to_defaults() {
    let _env = lock_env();
    let snapshot = load_snapshot(Some(std::path::Path::new("/nonexistent/policy.yaml"))).unwrap();
    assert_eq!(snapshot.rate_limits.tps_high, 300);
}

#[test]
fn policy_file_with_unknown_setting_fails_to_load() {
    let _env = lock_env();
    let (_dir, path) = policy_file("scheduler:\n  global_slots: 4\n");
    let err = load_snapshot(Some(&path)).unwrap_err();
    assert!(err.to_string().contains("scheduler.global_slots"));
}

#[test]
fn env_variable_applies_when_stricter() {
    let _env = lock_env();
    let key = "GATEWAY_POLICY__FETCH__TIMEOUT_MS";
    env::set_var(key, "2500");
    let loaded = load_snapshot(None);
    env::remove_var(key);

    let snapshot = loaded.unwrap();
    assert_eq!(snapshot.fetch.timeout_ms, 2_500);
    assert_eq!(source_of(&snapshot, "fetch.timeout_ms"), Some(PolicySource::Env));
}

#[test]
fn cli_assignments_replace_values_outright() {
    let _env = lock_env();
    env::set_var(
        ENV_CLI_OVERRIDES,
        "rate_limits.tps_medium=400,pagination.signing_secret=s3cr3t",
    );
    let loaded = load_snapshot(None);
    env::remove_var(ENV_CLI_OVERRIDES);

    let snapshot = loaded.unwrap();
    assert_eq!(snapshot.rate_limits.tps_medium, 400);
    assert_eq!(snapshot.pagination.signing_secret.as_deref(), Some("s3cr3t"));
    assert_eq!(
        source_of(&snapshot, "rate_limits.tps_medium"),
        Some(PolicySource::Cli)
    );
}

#[tokio::test]
async fn runtime_override_is_visible_with_provenance() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    center
        .apply_override(operator_override("rate_limits.tps_high", json!(900), 0))
        .await
        .unwrap();

    let snapshot = center.snapshot().await;
    assert_eq!(snapshot.rate_limits.tps_high, 900);
    assert_eq!(snapshot.rev, 2);
    assert_eq!(
        source_of(&snapshot, "rate_limits.tps_high"),
        Some(PolicySource::RuntimeOverride)
    );
}

#[tokio::test]
async fn rejected_override_leaves_snapshot_untouched() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    let outcome = center
        .apply_override(operator_override("quotas.balances", json!("unlimited"), 0))
        .await;
    assert!(outcome.is_err());
    assert_eq!(center.snapshot().await.rev, 1);
}

#[tokio::test]
async fn subscribers_see_each_new_revision() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    let mut updates = center.subscribe();
    let before = updates.borrow().rev;

    center
        .apply_override(operator_override("quotas.failure_policy", json!("closed"), 0))
        .await
        .unwrap();
    updates.changed().await.unwrap();

    let latest = updates.borrow_and_update().clone();
    assert!(latest.rev > before);
    assert_eq!(latest.quotas.failure_policy, FailurePolicy::Closed);
}

#[tokio::test(start_paused = true)]
async fn expiring_override_reverts_to_loaded_value() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    let mut updates = center.subscribe();
    center
        .apply_override(operator_override("sla.medium_ms", json!(9_000), 30))
        .await
        .unwrap();
    updates.changed().await.unwrap();
    assert_eq!(updates.borrow_and_update().sla.medium_ms, 9_000);

    updates.changed().await.unwrap();
    assert_eq!(updates.borrow().sla.medium_ms, 2_000);
}

#[tokio::test(start_paused = true)]
async fn replaced_override_outlives_the_first_expiry() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    center
        .apply_override(operator_override("fetch.timeout_ms", json!(800), 30))
        .await
        .unwrap();
    center
        .apply_override(operator_override("fetch.timeout_ms", json!(700), 120))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let snapshot = center.snapshot().await;
    assert_eq!(snapshot.fetch.timeout_ms, 700);
    assert_eq!(
        source_of(&snapshot, "fetch.timeout_ms"),
        Some(PolicySource::RuntimeOverride)
    );

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(center.snapshot().await.fetch.timeout_ms, 5_000);
}

#[tokio::test]
async fn reload_picks_up_edited_files() {
    let (_dir, path) = policy_file("sla:\n  high_ms: 1200\n");
    let center = InMemoryPolicyCenter::from_options(LoadOptions {
        paths: vec![path.clone()],
        include_env: false,
        include_cli_env: false,
    })
    .unwrap();
    assert_eq!(center.snapshot().await.sla.high_ms, 1_200);

    std::fs::write(&path, "sla:\n  high_ms: 900\n").unwrap();
    center.reload().await.unwrap();
    assert_eq!(center.snapshot().await.sla.high_ms, 900);
}

#[tokio::test]
async fn reload_requires_load_options() {
    let center = InMemoryPolicyCenter::new(default_snapshot());
    assert!(center.reload().await.is_err());
}
