//! Access audit trail: one record per orchestration run, delivered to
//! pluggable sinks and observed by background consumers.

pub mod monitor;
pub mod record;
pub mod sink;

pub use monitor::{spawn_security_monitor, spawn_tally, OutcomeTally, TallyRow};
pub use record::{
    AccessAuditRecord, AuditOutcome, PermissionAudit, SecurityFlags, SecuritySignals, SlaReport,
};
pub use sink::{
    to_mpsc, AuditError, AuditSink, BroadcastAuditSink, FanoutAuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
