use crate::model::{
    FailurePolicy, FetchPolicy, PaginationPolicy, PolicySnapshot, QuotaCategory, QuotaPolicy,
    RateLimitPolicy, SecurityPolicy, SlaPolicy,
};

pub const DEFAULT_BASE_URL: &str = "https://api.example-bank.com.br/open-banking/accounts/v2";

pub fn default_snapshot() -> PolicySnapshot {
    PolicySnapshot {
        rev: 1,
        rate_limits: RateLimitPolicy {
            tps_high: 300,
            tps_medium: 150,
            failure_policy: FailurePolicy::Open,
        },
        quotas: QuotaPolicy {
            list_accounts: QuotaCategory::High,
            account_detail: QuotaCategory::High,
            balances: QuotaCategory::SpecialAccounts,
            overdraft_limits: QuotaCategory::SpecialAccounts,
            transactions: QuotaCategory::MediumHigh,
            failure_policy: FailurePolicy::Open,
        },
        pagination: PaginationPolicy {
            key_ttl_minutes: 60,
            signing_secret: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            small_page_threshold: 25,
        },
        sla: SlaPolicy {
            high_ms: 1_500,
            medium_ms: 2_000,
        },
        security: SecurityPolicy {
            denied_ips: Vec::new(),
        },
        fetch: FetchPolicy { timeout_ms: 5_000 },
        provenance: Default::default(),
    }
}
