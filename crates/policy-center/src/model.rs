use std::collections::HashMap;

use gateway_core_types::{Endpoint, FrequencyClass};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PolicySnapshot {
    pub rev: u64,
    pub rate_limits: RateLimitPolicy,
    pub quotas: QuotaPolicy,
    pub pagination: PaginationPolicy,
    pub sla: SlaPolicy,
    pub security: SecurityPolicy,
    pub fetch: FetchPolicy,
    pub provenance: HashMap<String, PolicyProvenance>,
}

/// What a guard does when its counting backend cannot answer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    Open,
    Closed,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct RateLimitPolicy {
    pub tps_high: u32,
    pub tps_medium: u32,
    pub failure_policy: FailurePolicy,
}

impl RateLimitPolicy {
    pub fn tps_for(&self, endpoint: Endpoint) -> u32 {
        match endpoint.frequency() {
            FrequencyClass::High => self.tps_high,
            FrequencyClass::Medium => self.tps_medium,
        }
    }
}

/// Monthly call allotment categories.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum QuotaCategory {
    Low,
    #[default]
    Medium,
    MediumHigh,
    High,
    SpecialAccounts,
}

impl QuotaCategory {
    pub fn monthly_limit(&self) -> u64 {
        match self {
            QuotaCategory::Low => 8,
            QuotaCategory::Medium => 30,
            QuotaCategory::MediumHigh => 120,
            QuotaCategory::High => 240,
            QuotaCategory::SpecialAccounts => 420,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "low" => Some(QuotaCategory::Low),
            "medium" => Some(QuotaCategory::Medium),
            "medium_high" => Some(QuotaCategory::MediumHigh),
            "high" => Some(QuotaCategory::High),
            "special_accounts" => Some(QuotaCategory::SpecialAccounts),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct QuotaPolicy {
    pub list_accounts: QuotaCategory,
    pub account_detail: QuotaCategory,
    pub balances: QuotaCategory,
    pub overdraft_limits: QuotaCategory,
    pub transactions: QuotaCategory,
    pub failure_policy: FailurePolicy,
}

impl QuotaPolicy {
    pub fn category_for(&self, endpoint: Endpoint) -> QuotaCategory {
        match endpoint {
            Endpoint::ListAccounts => self.list_accounts,
            Endpoint::AccountDetail => self.account_detail,
            Endpoint::Balances => self.balances,
            Endpoint::OverdraftLimits => self.overdraft_limits,
            Endpoint::Transactions => self.transactions,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct PaginationPolicy {
    pub key_ttl_minutes: u64,
    /// Shared HMAC secret. A random per-process secret is used when absent.
    pub signing_secret: Option<String>,
    pub base_url: String,
    /// `page > 1` with a page size below this is flagged as suspicious.
    pub small_page_threshold: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SlaPolicy {
    pub high_ms: u64,
    pub medium_ms: u64,
}

impl SlaPolicy {
    pub fn threshold_ms(&self, endpoint: Endpoint) -> u64 {
        match endpoint.frequency() {
            FrequencyClass::High => self.high_ms,
            FrequencyClass::Medium => self.medium_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct SecurityPolicy {
    pub denied_ips: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct FetchPolicy {
    pub timeout_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PolicyProvenance {
    pub path: String,
    pub source: PolicySource,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicySource {
    Builtin,
    File,
    Env,
    Cli,
    RuntimeOverride,
}

impl PolicySnapshot {
    pub fn set_provenance(&mut self, path: &str, source: PolicySource) {
        self.provenance.insert(
            path.to_string(),
            PolicyProvenance {
                path: path.to_string(),
                source,
            },
        );
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuntimeOverrideSpec {
    pub path: String,
    pub value: serde_json::Value,
    pub owner: String,
    pub reason: String,
    pub ttl_seconds: u64,
}
