use std::sync::Arc;

use dashmap::DashMap;
use gateway_core_types::Endpoint;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::record::{AccessAuditRecord, AuditOutcome};

/// Logs every record that carries a security flag.
///
/// Resolves to the number of flagged records once the feed closes.
pub fn spawn_security_monitor(mut rx: broadcast::Receiver<AccessAuditRecord>) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut flagged = 0u64;
        loop {
            match rx.recv().await {
                Ok(record) if record.security.any() => {
                    flagged += 1;
                    warn!(
                        target: "security",
                        correlation_id = %record.correlation_id,
                        consent_id = %record.consent_id,
                        organization_id = %record.organization_id,
                        endpoint = %record.endpoint,
                        suspicious = record.security.suspicious_activity,
                        disallowed_ip = record.security.disallowed_ip,
                        reasons = ?record.security.reasons,
                        "flagged access"
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "security", skipped, "security monitor lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break flagged,
            }
        }
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TallyRow {
    pub success: u64,
    pub failure: u64,
    pub sla_breaches: u64,
    pub flagged: u64,
}

/// Running per-endpoint outcome counts.
#[derive(Default)]
pub struct OutcomeTally {
    rows: DashMap<Endpoint, TallyRow>,
    error_codes: DashMap<String, u64>,
}

impl OutcomeTally {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn observe(&self, record: &AccessAuditRecord) {
        let mut row = self.rows.entry(record.endpoint).or_default();
        match record.outcome {
            AuditOutcome::Success => row.success += 1,
            AuditOutcome::Failure => row.failure += 1,
        }
        if !record.sla.compliant {
            row.sla_breaches += 1;
        }
        if record.security.any() {
            row.flagged += 1;
        }
        drop(row);
        if let Some(code) = &record.error_code {
            *self.error_codes.entry(code.clone()).or_insert(0) += 1;
        }
    }

    pub fn row(&self, endpoint: Endpoint) -> TallyRow {
        self.rows
            .get(&endpoint)
            .map(|row| row.clone())
            .unwrap_or_default()
    }

    pub fn error_count(&self, code: &str) -> u64 {
        self.error_codes.get(code).map(|count| *count).unwrap_or(0)
    }
}

pub fn spawn_tally(
    mut rx: broadcast::Receiver<AccessAuditRecord>,
    tally: Arc<OutcomeTally>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => tally.observe(&record),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "audit", skipped, "outcome tally lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
