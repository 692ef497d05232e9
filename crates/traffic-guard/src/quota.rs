use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use gateway_core_types::{ConsentId, CustomerId, Endpoint, OrganizationId, SharedClock};
use gateway_policy_center::{FailurePolicy, QuotaCategory, QuotaPolicy};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::counting::{CountingBackend, CountingError};

/// Counter keys are month-scoped, so the window only needs to span a month.
const MONTH_WINDOW_DAYS: i64 = 31;

/// Identity a monthly allotment is counted against.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct QuotaKey {
    pub consent_id: ConsentId,
    pub customer_id: CustomerId,
    pub organization_id: OrganizationId,
    pub endpoint: Endpoint,
}

impl QuotaKey {
    pub fn new(
        consent_id: ConsentId,
        customer_id: CustomerId,
        organization_id: OrganizationId,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            consent_id,
            customer_id,
            organization_id,
            endpoint,
        }
    }

    pub fn counter_key(&self, month: &str) -> String {
        format!(
            "quota:{}:{}:{}:{}:{}",
            self.consent_id, self.customer_id, self.organization_id, self.endpoint, month
        )
    }
}

/// Calendar month (UTC) a call is counted in.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QuotaDecision {
    WithinQuota {
        used: u64,
        limit: u64,
        degraded: bool,
    },
    Exceeded {
        used: u64,
        limit: u64,
        category: QuotaCategory,
    },
    /// Backend failure under a closed failure policy.
    Unavailable { reason: String },
}

impl QuotaDecision {
    pub fn is_within(&self) -> bool {
        matches!(self, QuotaDecision::WithinQuota { .. })
    }
}

/// Monthly per-consent operational limits.
pub struct OperationalQuotaTracker {
    backend: Arc<dyn CountingBackend>,
    clock: SharedClock,
    policy: RwLock<Arc<QuotaPolicy>>,
}

impl OperationalQuotaTracker {
    pub fn new(backend: Arc<dyn CountingBackend>, clock: SharedClock, policy: QuotaPolicy) -> Self {
        Self {
            backend,
            clock,
            policy: RwLock::new(Arc::new(policy)),
        }
    }

    pub fn policy(&self) -> Arc<QuotaPolicy> {
        self.policy.read().clone()
    }

    pub fn update_policy(&self, policy: QuotaPolicy) {
        *self.policy.write() = Arc::new(policy);
    }

    fn window() -> Duration {
        Duration::days(MONTH_WINDOW_DAYS)
    }

    pub async fn check_monthly_quota(&self, key: &QuotaKey) -> QuotaDecision {
        let policy = self.policy();
        let category = policy.category_for(key.endpoint);
        let limit = category.monthly_limit();
        let counter = key.counter_key(&month_key(self.clock.now()));
        match self.backend.count(&counter, Self::window()).await {
            Ok(used) if used >= limit => {
                debug!(
                    target: "traffic-guard",
                    consent_id = %key.consent_id,
                    endpoint = %key.endpoint,
                    used,
                    limit,
                    "monthly quota exhausted"
                );
                QuotaDecision::Exceeded {
                    used,
                    limit,
                    category,
                }
            }
            Ok(used) => QuotaDecision::WithinQuota {
                used,
                limit,
                degraded: false,
            },
            Err(err) => match policy.failure_policy {
                FailurePolicy::Open => {
                    warn!(
                        target: "traffic-guard",
                        consent_id = %key.consent_id,
                        error = %err,
                        "quota backend unavailable, admitting"
                    );
                    QuotaDecision::WithinQuota {
                        used: 0,
                        limit,
                        degraded: true,
                    }
                }
                FailurePolicy::Closed => {
                    warn!(
                        target: "traffic-guard",
                        consent_id = %key.consent_id,
                        error = %err,
                        "quota backend unavailable, rejecting"
                    );
                    QuotaDecision::Unavailable {
                        reason: err.to_string(),
                    }
                }
            },
        }
    }

    /// Counts the call unless it continues a validated pagination sequence.
    /// Returns whether a hit was recorded.
    pub async fn record_if_countable(
        &self,
        key: &QuotaKey,
        is_pagination_continuation: bool,
    ) -> Result<bool, CountingError> {
        if is_pagination_continuation {
            debug!(
                target: "traffic-guard",
                consent_id = %key.consent_id,
                endpoint = %key.endpoint,
                "pagination continuation exempt from quota"
            );
            return Ok(false);
        }
        let counter = key.counter_key(&month_key(self.clock.now()));
        self.backend.increment(&counter, Self::window()).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_key_is_utc_calendar_month() {
        let at = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 59).unwrap();
        assert_eq!(month_key(at), "2024-01");
        assert_eq!(month_key(at + Duration::seconds(1)), "2024-02");
    }

    #[test]
    fn counter_key_embeds_every_identity_part() {
        let key = QuotaKey::new(
            "C1".into(),
            "cust".into(),
            "org".into(),
            Endpoint::Balances,
        );
        assert_eq!(key.counter_key("2024-05"), "quota:C1:cust:org:balances:2024-05");
    }
}
