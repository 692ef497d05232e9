use std::net::IpAddr;

use chrono::{DateTime, Utc};
use gateway_core_types::{ConsentId, CorrelationId, CustomerId, Endpoint, OrganizationId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// Audit-only security observations. Never change a call's outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFlags {
    pub suspicious_activity: bool,
    pub disallowed_ip: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl SecurityFlags {
    pub fn any(&self) -> bool {
        self.suspicious_activity || self.disallowed_ip
    }
}

/// Inputs the security assessment looks at.
#[derive(Clone, Debug, Default)]
pub struct SecuritySignals<'a> {
    pub page: u32,
    pub page_size: u32,
    pub small_page_threshold: u32,
    pub pagination_key_rejected: bool,
    pub rate_limited: bool,
    pub customer_ip: Option<&'a str>,
    pub denied_ips: &'a [String],
}

impl SecuritySignals<'_> {
    pub fn assess(&self) -> SecurityFlags {
        let mut flags = SecurityFlags::default();
        if self.page > 1 && self.page_size < self.small_page_threshold {
            flags.suspicious_activity = true;
            flags.reasons.push(format!(
                "deep pagination with small page size {}",
                self.page_size
            ));
        }
        if self.pagination_key_rejected {
            flags.suspicious_activity = true;
            flags.reasons.push("rejected pagination key".into());
        }
        if self.rate_limited {
            flags.suspicious_activity = true;
            flags.reasons.push("rate limit rejection".into());
        }
        if let Some(raw) = self.customer_ip {
            match raw.trim().parse::<IpAddr>() {
                Ok(ip) => {
                    let denied = self
                        .denied_ips
                        .iter()
                        .filter_map(|entry| entry.trim().parse::<IpAddr>().ok())
                        .any(|entry| entry == ip);
                    if denied {
                        flags.disallowed_ip = true;
                        flags.reasons.push(format!("customer ip {ip} is denied"));
                    }
                }
                Err(_) => {
                    flags.disallowed_ip = true;
                    flags.reasons.push("customer ip is not an address".into());
                }
            }
        }
        flags
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionAudit {
    pub requested: Vec<String>,
    pub filtered: Vec<String>,
    pub removed: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaReport {
    pub elapsed_ms: u64,
    pub threshold_ms: u64,
    pub compliant: bool,
}

impl SlaReport {
    pub fn new(elapsed_ms: u64, threshold_ms: u64) -> Self {
        Self {
            elapsed_ms,
            threshold_ms,
            compliant: elapsed_ms <= threshold_ms,
        }
    }
}

/// One record per orchestration run, success or failure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessAuditRecord {
    pub audit_id: String,
    pub correlation_id: CorrelationId,
    pub consent_id: ConsentId,
    pub organization_id: OrganizationId,
    pub customer_id: Option<CustomerId>,
    pub endpoint: Endpoint,
    pub account_id: Option<String>,
    pub outcome: AuditOutcome,
    pub error_code: Option<String>,
    pub http_status: u16,
    pub permissions: Option<PermissionAudit>,
    pub page: u32,
    pub page_size: u32,
    pub records_returned: usize,
    pub pagination_key_presented: bool,
    pub pagination_key_valid: Option<bool>,
    pub quota_counted: bool,
    pub degraded: bool,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    #[serde(default)]
    pub auth_date: Option<DateTime<Utc>>,
    pub security: SecurityFlags,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sla: SlaReport,
}

impl AccessAuditRecord {
    pub fn new_audit_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AuditOutcome::Success
    }
}
