// Audit sink
// Fire-and-forget notifications for sync lifecycle events. Failures to
// record are logged and swallowed; auditing never fails a sync.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditEvent {
    SyncStarted,
    SyncCompleted,
    SyncFailed,
    ConnectionTested,
    IntegrationCreated,
    IntegrationUpdated,
    IntegrationDeleted,
}

impl AuditEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEvent::SyncStarted => "sync_started",
            AuditEvent::SyncCompleted => "sync_completed",
            AuditEvent::SyncFailed => "sync_failed",
            AuditEvent::ConnectionTested => "connection_tested",
            AuditEvent::IntegrationCreated => "integration_created",
            AuditEvent::IntegrationUpdated => "integration_updated",
            AuditEvent::IntegrationDeleted => "integration_deleted",
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent, integration_id: Uuid, detail: Value);
}

/// Default sink: structured log lines via tracing.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent, integration_id: Uuid, detail: Value) {
        tracing::info!(
            event = event.as_str(),
            integration_id = %integration_id,
            detail = %detail,
            "audit"
        );
    }
}
