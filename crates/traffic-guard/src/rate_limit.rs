use std::fmt;
use std::sync::Arc;

use chrono::Duration;
use gateway_core_types::{Endpoint, OrganizationId};
use gateway_policy_center::{FailurePolicy, RateLimitPolicy};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::counting::{CountingBackend, CountingError};
use crate::tiers::{tpm_ceiling, ConsentVolume};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    PerSecond,
    PerMinute,
}

impl RateWindow {
    pub fn duration(&self) -> Duration {
        match self {
            RateWindow::PerSecond => Duration::seconds(1),
            RateWindow::PerMinute => Duration::minutes(1),
        }
    }

    fn tag(&self) -> &'static str {
        match self {
            RateWindow::PerSecond => "tps",
            RateWindow::PerMinute => "tpm",
        }
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RateDecision {
    /// `degraded` is set when the backend could not answer and the limiter failed open.
    Admitted { degraded: bool },
    Rejected {
        window: RateWindow,
        current: u64,
        limit: u64,
    },
    /// Backend failure under a closed failure policy.
    Unavailable { reason: String },
}

impl RateDecision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, RateDecision::Admitted { .. })
    }
}

/// Per-organisation, per-endpoint TPS and TPM admission.
pub struct RateLimiter {
    backend: Arc<dyn CountingBackend>,
    volume: Arc<dyn ConsentVolume>,
    policy: RwLock<Arc<RateLimitPolicy>>,
}

impl RateLimiter {
    pub fn new(
        backend: Arc<dyn CountingBackend>,
        volume: Arc<dyn ConsentVolume>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            backend,
            volume,
            policy: RwLock::new(Arc::new(policy)),
        }
    }

    pub fn policy(&self) -> Arc<RateLimitPolicy> {
        self.policy.read().clone()
    }

    pub fn update_policy(&self, policy: RateLimitPolicy) {
        *self.policy.write() = Arc::new(policy);
    }

    pub async fn tpm_limit(&self, org: &OrganizationId) -> u64 {
        let consents = self.volume.active_consents(org).await.unwrap_or(0);
        tpm_ceiling(consents)
    }

    /// Reads both windows without recording a hit.
    pub async fn check_and_admit(&self, org: &OrganizationId, endpoint: Endpoint) -> RateDecision {
        let policy = self.policy();
        match self.evaluate(&policy, org, endpoint).await {
            Ok(decision) => {
                if let RateDecision::Rejected {
                    window,
                    current,
                    limit,
                } = &decision
                {
                    debug!(
                        target: "traffic-guard",
                        org = %org,
                        endpoint = %endpoint,
                        window = %window,
                        current,
                        limit,
                        "rate limit reached"
                    );
                }
                decision
            }
            Err(err) => match policy.failure_policy {
                FailurePolicy::Open => {
                    warn!(
                        target: "traffic-guard",
                        org = %org,
                        endpoint = %endpoint,
                        error = %err,
                        "rate backend unavailable, admitting"
                    );
                    RateDecision::Admitted { degraded: true }
                }
                FailurePolicy::Closed => {
                    warn!(
                        target: "traffic-guard",
                        org = %org,
                        endpoint = %endpoint,
                        error = %err,
                        "rate backend unavailable, rejecting"
                    );
                    RateDecision::Unavailable {
                        reason: err.to_string(),
                    }
                }
            },
        }
    }

    async fn evaluate(
        &self,
        policy: &RateLimitPolicy,
        org: &OrganizationId,
        endpoint: Endpoint,
    ) -> Result<RateDecision, CountingError> {
        let limits = [
            (RateWindow::PerSecond, u64::from(policy.tps_for(endpoint))),
            (RateWindow::PerMinute, self.tpm_limit(org).await),
        ];
        for (window, limit) in limits {
            let current = self
                .backend
                .count(&counter_key(window, org, endpoint), window.duration())
                .await?;
            if current >= limit {
                return Ok(RateDecision::Rejected {
                    window,
                    current,
                    limit,
                });
            }
        }
        Ok(RateDecision::Admitted { degraded: false })
    }

    /// Records one served call in both windows.
    pub async fn record(&self, org: &OrganizationId, endpoint: Endpoint) -> Result<(), CountingError> {
        for window in [RateWindow::PerSecond, RateWindow::PerMinute] {
            self.backend
                .increment(&counter_key(window, org, endpoint), window.duration())
                .await?;
        }
        Ok(())
    }
}

pub fn counter_key(window: RateWindow, org: &OrganizationId, endpoint: Endpoint) -> String {
    format!("rate:{}:{}:{}", window.tag(), org, endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_keys_separate_windows() {
        let org = OrganizationId::from("org-1");
        assert_eq!(
            counter_key(RateWindow::PerSecond, &org, Endpoint::ListAccounts),
            "rate:tps:org-1:list-accounts"
        );
        assert_ne!(
            counter_key(RateWindow::PerSecond, &org, Endpoint::Balances),
            counter_key(RateWindow::PerMinute, &org, Endpoint::Balances)
        );
    }
}
