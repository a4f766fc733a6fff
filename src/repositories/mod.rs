pub mod integration_repo;
pub mod memory;
pub mod record_repo;
pub mod sync_log_repo;
pub mod sync_queue_repo;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt stored document: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

pub use integration_repo::{IntegrationStore, PgIntegrationStore};
pub use record_repo::{PgRecordStore, RecordStore};
pub use sync_log_repo::{LogFilter, PgSyncLogStore, SyncLogStore};
pub use sync_queue_repo::{PgSyncQueueStore, QueueFilter, SyncQueueStore};
