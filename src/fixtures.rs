//! Fixture-backed gateway wiring used by `simulate` and the end-to-end tests.
//!
//! A fixture file (YAML or JSON) declares consents, the accounts each customer
//! holds, organisation consent volumes, data source faults and a list of calls.
//! The calls run in order against one in-memory stack, so later calls see the
//! counters, quota usage and pagination keys produced by earlier ones.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use access_orchestrator::{
    AccessError, AccessOrchestrator, AccessRequest, AccessResult, AccountFixture, ErrorBody,
    InMemoryAccountSource, OrchestratorDeps,
};
use anyhow::{anyhow, bail, Context, Result};
use audit_trail::{
    spawn_security_monitor, AccessAuditRecord, AuditSink, BroadcastAuditSink, FanoutAuditSink,
    InMemoryAuditSink, TracingAuditSink,
};
use chrono::{DateTime, Utc};
use consent_center::{Consent, ConsentValidator, InMemoryConsentStore};
use gateway_core_types::{system_clock, CustomerId, Endpoint, ManualClock, SharedClock};
use gateway_policy_center::{
    InMemoryPolicyCenter, PolicyCenter, PolicySnapshot, RuntimeOverrideSpec,
};
use pagination_keys::PaginationKeyManager;
use permissions_broker::PermissionFilter;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use traffic_guard::{
    InMemoryConsentVolume, InMemoryCountingBackend, OperationalQuotaTracker, RateLimiter,
};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationFixture {
    /// Pins the clock; the system clock is used when absent.
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    #[serde(default)]
    pub consents: Vec<Consent>,
    #[serde(default)]
    pub customers: Vec<CustomerAccounts>,
    /// Active consent count per organisation, for the TPM tier.
    #[serde(default)]
    pub consent_volumes: BTreeMap<String, u64>,
    #[serde(default)]
    pub source: SourceBehaviour,
    #[serde(default)]
    pub policy_overrides: Vec<PolicyOverride>,
    pub calls: Vec<SimulatedCall>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerAccounts {
    pub customer_id: CustomerId,
    pub accounts: Vec<AccountFixture>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBehaviour {
    /// Human readable delay, e.g. `250ms`.
    #[serde(default)]
    pub latency: Option<String>,
    #[serde(default)]
    pub failure: Option<String>,
    #[serde(default = "default_true")]
    pub report_totals: bool,
}

impl Default for SourceBehaviour {
    fn default() -> Self {
        Self {
            latency: None,
            failure: None,
            report_totals: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Deserialize)]
pub struct PolicyOverride {
    pub path: String,
    pub value: serde_json::Value,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedCall {
    pub endpoint: Endpoint,
    pub request: AccessRequest,
    /// Moves the pinned clock forward before the call, e.g. `61m`.
    #[serde(default)]
    pub advance: Option<String>,
    /// Reuse the pagination key from the previous result's `next` link.
    #[serde(default)]
    pub follow_next: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationStep {
    pub endpoint: Endpoint,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AccessResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub audit: Option<AccessAuditRecord>,
}

impl SimulationStep {
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub policy_rev: u64,
    pub steps: Vec<SimulationStep>,
}

impl SimulationReport {
    pub fn successes(&self) -> usize {
        self.steps.iter().filter(|step| step.is_success()).count()
    }
}

pub fn load_fixture(path: &Path) -> Result<SimulationFixture> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture {}", path.display()))?;
    parse_fixture(&raw).with_context(|| format!("Invalid fixture {}", path.display()))
}

/// YAML is a superset of JSON, so one parser covers both formats.
pub fn parse_fixture(raw: &str) -> Result<SimulationFixture> {
    let fixture: SimulationFixture = serde_yaml::from_str(raw)?;
    if fixture.calls.is_empty() {
        bail!("fixture declares no calls");
    }
    Ok(fixture)
}

/// In-memory collaborators wired into one orchestrator.
pub struct GatewayStack {
    pub orchestrator: Arc<AccessOrchestrator>,
    pub policy_center: Arc<InMemoryPolicyCenter>,
    pub source: Arc<InMemoryAccountSource>,
    pub audit: Arc<InMemoryAuditSink>,
    manual_clock: Option<Arc<ManualClock>>,
    counter_pruner: JoinHandle<()>,
    security_monitor: JoinHandle<u64>,
}

const COUNTER_PRUNE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const AUDIT_FEED_CAPACITY: usize = 256;

impl Drop for GatewayStack {
    fn drop(&mut self) {
        self.counter_pruner.abort();
        self.security_monitor.abort();
    }
}

impl GatewayStack {
    pub async fn build(
        fixture: &SimulationFixture,
        base_policy: PolicySnapshot,
        filter: PermissionFilter,
    ) -> Result<Self> {
        let manual_clock = fixture.now.map(ManualClock::new);
        let clock: SharedClock = match &manual_clock {
            Some(manual) => Arc::clone(manual) as SharedClock,
            None => system_clock(),
        };

        let policy_center = Arc::new(InMemoryPolicyCenter::new(base_policy));
        for entry in &fixture.policy_overrides {
            policy_center
                .apply_override(RuntimeOverrideSpec {
                    path: entry.path.clone(),
                    value: entry.value.clone(),
                    owner: "fixture".into(),
                    reason: "simulation".into(),
                    ttl_seconds: 0,
                })
                .await
                .with_context(|| format!("Invalid policy override {}", entry.path))?;
        }
        let policy = policy_center.snapshot().await;

        let consents = Arc::new(fixture.consents.iter().cloned().collect::<InMemoryConsentStore>());

        let source = InMemoryAccountSource::new();
        let source = if fixture.source.report_totals {
            source
        } else {
            source.without_totals()
        };
        for customer in &fixture.customers {
            for account in &customer.accounts {
                source.insert(customer.customer_id.clone(), account.clone());
            }
        }
        if let Some(latency) = &fixture.source.latency {
            let latency = humantime::parse_duration(latency)
                .with_context(|| format!("Invalid source latency {latency}"))?;
            source.set_latency(Some(latency));
        }
        source.set_failure(fixture.source.failure.clone());
        let source = Arc::new(source);

        let volumes = InMemoryConsentVolume::new();
        for (org, count) in &fixture.consent_volumes {
            volumes.set(org.as_str(), *count);
        }

        let backend = Arc::new(InMemoryCountingBackend::new(clock.clone()));
        let pruner = backend.spawn_pruner(COUNTER_PRUNE_INTERVAL);
        let audit = InMemoryAuditSink::new();
        let feed = BroadcastAuditSink::new(AUDIT_FEED_CAPACITY);
        let monitor = spawn_security_monitor(feed.subscribe());
        let fanout: Vec<Arc<dyn AuditSink>> = vec![
            audit.clone() as Arc<dyn AuditSink>,
            Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
            feed as Arc<dyn AuditSink>,
        ];

        let deps = OrchestratorDeps {
            rate_limiter: Arc::new(RateLimiter::new(
                backend.clone(),
                Arc::new(volumes),
                policy.rate_limits.clone(),
            )),
            consent_validator: Arc::new(ConsentValidator::new(consents, filter, clock.clone())),
            pagination: Arc::new(PaginationKeyManager::new(&policy.pagination, clock.clone())),
            quota: Arc::new(OperationalQuotaTracker::new(
                backend,
                clock.clone(),
                policy.quotas.clone(),
            )),
            data_source: source.clone(),
            audit: Arc::new(FanoutAuditSink::new(fanout)),
            clock,
            policy,
        };

        Ok(Self {
            orchestrator: Arc::new(AccessOrchestrator::new(deps)),
            policy_center,
            source,
            audit,
            manual_clock,
            counter_pruner: pruner,
            security_monitor: monitor,
        })
    }

    fn advance(&self, by: &str) -> Result<()> {
        let Some(clock) = &self.manual_clock else {
            bail!("`advance` needs a pinned `now` in the fixture");
        };
        let by = humantime::parse_duration(by).with_context(|| format!("Invalid advance {by}"))?;
        clock.advance(chrono::Duration::from_std(by).context("advance out of range")?);
        Ok(())
    }

    /// Runs one call and pairs its outcome with the audit record it produced.
    pub async fn call(&self, endpoint: Endpoint, request: AccessRequest) -> SimulationStep {
        let before = self.audit.len();
        let outcome: Result<AccessResult, AccessError> =
            self.orchestrator.execute(endpoint, request).await;
        let audit = (self.audit.len() > before)
            .then(|| self.audit.last())
            .flatten();
        match outcome {
            Ok(result) => SimulationStep {
                endpoint,
                result: Some(result),
                error: None,
                audit,
            },
            Err(err) => SimulationStep {
                endpoint,
                result: None,
                error: Some(err.body()),
                audit,
            },
        }
    }
}

/// Pagination key carried by a `next` link, if any.
pub fn next_key(result: &AccessResult) -> Option<String> {
    let next = result.links.next.as_deref()?;
    let url = url::Url::parse(next).ok()?;
    url.query_pairs()
        .find(|(name, _)| name == "pagination-key")
        .map(|(_, value)| value.into_owned())
}

pub async fn run_simulation(
    fixture: &SimulationFixture,
    base_policy: PolicySnapshot,
    filter: PermissionFilter,
) -> Result<SimulationReport> {
    let stack = GatewayStack::build(fixture, base_policy, filter).await?;
    let policy_rev = stack.orchestrator.policy().rev;
    let mut steps: Vec<SimulationStep> = Vec::with_capacity(fixture.calls.len());

    for (index, call) in fixture.calls.iter().enumerate() {
        if let Some(by) = &call.advance {
            stack.advance(by)?;
        }
        let mut request = call.request.clone();
        if call.follow_next {
            let key = steps
                .last()
                .and_then(|step| step.result.as_ref())
                .and_then(next_key)
                .ok_or_else(|| anyhow!("call {index} follows a result without a next link"))?;
            request.pagination_key = Some(key);
        }
        debug!(target: "simulate", index, endpoint = %call.endpoint, "running call");
        steps.push(stack.call(call.endpoint, request).await);
    }

    let report = SimulationReport { policy_rev, steps };
    info!(
        target: "simulate",
        calls = report.steps.len(),
        successes = report.successes(),
        "simulation finished"
    );
    Ok(report)
}
