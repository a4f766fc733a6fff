// Retry queue drain behavior: ordering, retry budget, terminal failure,
// and claim-based mutual exclusion, against the in-memory queue store.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use mainstay_erp::models::integration::EntityType;
use mainstay_erp::models::sync_queue::{QueueStatus, SyncOperation, SyncQueueItem};
use mainstay_erp::repositories::memory::MemorySyncQueueStore;
use mainstay_erp::repositories::SyncQueueStore;
use mainstay_erp::services::retry_queue_service::{QueueExecutor, RetryQueueService};

// ============================================================================
// Scripted executors
// ============================================================================

/// Fails the first `failures` attempts, then succeeds.
struct FlakyExecutor {
    failures: AtomicUsize,
}

impl FlakyExecutor {
    fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
        })
    }
}

#[async_trait]
impl QueueExecutor for FlakyExecutor {
    async fn execute(&self, _item: &SyncQueueItem) -> Result<(), String> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err("ERP rejected the record".to_string());
        }
        Ok(())
    }
}

/// Succeeds and records the order items were executed in.
#[derive(Default)]
struct RecordingExecutor {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl QueueExecutor for RecordingExecutor {
    async fn execute(&self, item: &SyncQueueItem) -> Result<(), String> {
        self.seen
            .lock()
            .expect("seen lock poisoned")
            .push(item.entity_id.clone());
        Ok(())
    }
}

fn work_order_item(entity_id: &str) -> SyncQueueItem {
    SyncQueueItem::new(
        Uuid::new_v4(),
        SyncOperation::Create,
        EntityType::WorkOrders,
        entity_id,
        serde_json::json!({"title": entity_id}),
    )
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn successful_item_completes() {
    let store = Arc::new(MemorySyncQueueStore::new());
    let service = RetryQueueService::new(store.clone(), FlakyExecutor::failing(0));

    let item = work_order_item("wo-1");
    store.enqueue(&item).await.unwrap();

    let stats = service.drain().await.unwrap();
    assert_eq!(stats.processed, 1);
    assert_eq!(stats.completed, 1);

    let stored = store.get(item.id).unwrap();
    assert_eq!(stored.status, QueueStatus::Completed);
    assert!(stored.completed_at.is_some());
    assert!(stored.error_message.is_none());
}

#[tokio::test]
async fn failures_consume_budget_then_park_the_item() {
    let store = Arc::new(MemorySyncQueueStore::new());
    let service = RetryQueueService::new(store.clone(), FlakyExecutor::failing(usize::MAX));

    let item = work_order_item("wo-1").with_max_retries(3);
    store.enqueue(&item).await.unwrap();

    // First two failures return the item to pending.
    for expected_retries in 1..=2 {
        let stats = service.drain().await.unwrap();
        assert_eq!(stats.requeued, 1);
        let stored = store.get(item.id).unwrap();
        assert_eq!(stored.status, QueueStatus::Pending);
        assert_eq!(stored.retry_count, expected_retries);
        assert_eq!(
            stored.error_message.as_deref(),
            Some("ERP rejected the record")
        );
    }

    // The third failure exhausts the budget.
    let stats = service.drain().await.unwrap();
    assert_eq!(stats.failed, 1);
    let stored = store.get(item.id).unwrap();
    assert_eq!(stored.status, QueueStatus::Failed);
    assert_eq!(stored.retry_count, 3);

    // Terminal items are never fetched again.
    let stats = service.drain().await.unwrap();
    assert_eq!(stats.processed, 0);
}

#[tokio::test]
async fn drains_in_priority_then_fifo_order() {
    let store = Arc::new(MemorySyncQueueStore::new());
    let executor = Arc::new(RecordingExecutor::default());
    let service = RetryQueueService::new(store.clone(), executor.clone());

    let mut first_old = work_order_item("wo-old").with_priority(5);
    first_old.created_at = chrono::Utc::now() - chrono::Duration::minutes(5);
    let second_new = work_order_item("wo-new").with_priority(5);
    let urgent = work_order_item("wo-urgent").with_priority(1);

    store.enqueue(&second_new).await.unwrap();
    store.enqueue(&first_old).await.unwrap();
    store.enqueue(&urgent).await.unwrap();

    let stats = service.drain().await.unwrap();
    assert_eq!(stats.completed, 3);

    let seen = executor.seen.lock().unwrap().clone();
    assert_eq!(seen, vec!["wo-urgent", "wo-old", "wo-new"]);
}

#[tokio::test]
async fn already_claimed_item_is_skipped() {
    let store = Arc::new(MemorySyncQueueStore::new());
    let service = RetryQueueService::new(store.clone(), FlakyExecutor::failing(0));

    let item = work_order_item("wo-1");
    store.enqueue(&item).await.unwrap();

    // Another worker claims it between fetch and claim.
    assert!(store.claim(item.id).await.unwrap());

    let stats = service.drain().await.unwrap();
    assert_eq!(stats.processed, 0);
    assert_eq!(store.get(item.id).unwrap().status, QueueStatus::Processing);
}

#[tokio::test]
async fn drain_respects_batch_size() {
    let store = Arc::new(MemorySyncQueueStore::new());
    let service =
        RetryQueueService::new(store.clone(), FlakyExecutor::failing(0)).with_batch_size(2);

    for i in 0..5 {
        store
            .enqueue(&work_order_item(&format!("wo-{}", i)))
            .await
            .unwrap();
    }

    let stats = service.drain().await.unwrap();
    assert_eq!(stats.processed, 2);

    let stats = service.drain().await.unwrap();
    assert_eq!(stats.processed, 2);

    let stats = service.drain().await.unwrap();
    assert_eq!(stats.processed, 1);
}
