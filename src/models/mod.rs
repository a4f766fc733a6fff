pub mod integration;
pub mod record;
pub mod sync_log;
pub mod sync_queue;
