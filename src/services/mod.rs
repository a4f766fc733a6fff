pub mod audit_service;
pub mod encryption_service;
pub mod erp;
pub mod retry_queue_service;
pub mod scheduler_service;
pub mod sync_orchestrator;

pub use audit_service::{AuditEvent, AuditSink, TracingAuditSink};
pub use encryption_service::EncryptionService;
pub use retry_queue_service::{ConnectorQueueExecutor, QueueExecutor, RetryQueueService};
pub use scheduler_service::{SchedulerConfig, SchedulerService};
pub use sync_orchestrator::{OrchestratorError, SyncOrchestrator};
