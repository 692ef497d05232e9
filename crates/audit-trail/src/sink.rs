use std::sync::Arc;

use async_trait::async_trait;
use gateway_core_types::GatewayError;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::record::AccessAuditRecord;

#[derive(Debug, Error, Clone)]
pub enum AuditError {
    #[error("audit sink rejected record: {0}")]
    Rejected(String),
}

impl From<AuditError> for GatewayError {
    fn from(value: AuditError) -> Self {
        GatewayError::new(value.to_string())
    }
}

/// Destination for access audit records. Callers never fail a request on
/// a sink error.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn persist(&self, record: AccessAuditRecord) -> Result<(), AuditError>;
}

/// Keeps every record in memory. Used by tests and the simulator.
#[derive(Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AccessAuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<AccessAuditRecord> {
        self.records.lock().clone()
    }

    pub fn last(&self) -> Option<AccessAuditRecord> {
        self.records.lock().last().cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn persist(&self, record: AccessAuditRecord) -> Result<(), AuditError> {
        self.records.lock().push(record);
        Ok(())
    }
}

/// Emits each record as a structured `tracing` event.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn persist(&self, record: AccessAuditRecord) -> Result<(), AuditError> {
        let payload =
            serde_json::to_string(&record).map_err(|err| AuditError::Rejected(err.to_string()))?;
        info!(
            target: "audit",
            correlation_id = %record.correlation_id,
            consent_id = %record.consent_id,
            endpoint = %record.endpoint,
            outcome = ?record.outcome,
            http_status = record.http_status,
            elapsed_ms = record.sla.elapsed_ms,
            sla_compliant = record.sla.compliant,
            record = %payload,
            "access audited"
        );
        Ok(())
    }
}

/// Publishes records on a broadcast channel for downstream consumers.
pub struct BroadcastAuditSink {
    sender: broadcast::Sender<AccessAuditRecord>,
}

impl BroadcastAuditSink {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccessAuditRecord> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl AuditSink for BroadcastAuditSink {
    async fn persist(&self, record: AccessAuditRecord) -> Result<(), AuditError> {
        // No subscribers is not an error for a fire-and-forget feed.
        let _ = self.sender.send(record);
        Ok(())
    }
}

/// Materialises an mpsc receiver from the broadcast feed so callers can await
/// records without handling lag.
pub fn to_mpsc(sink: &BroadcastAuditSink, capacity: usize) -> mpsc::Receiver<AccessAuditRecord> {
    let mut rx = sink.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(record) => {
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(target: "audit", skipped, "audit feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}

/// Delivers each record to every inner sink; one failing sink does not stop the others.
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl AuditSink for FanoutAuditSink {
    async fn persist(&self, record: AccessAuditRecord) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(err) = sink.persist(record.clone()).await {
                warn!(target: "audit", error = %err, "audit sink failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
