// Background scheduler
// Two independent interval loops: a sweep that starts due auto-syncs, and a
// drain that works the retry queue. Each tick is isolated per integration;
// one failure never stops the loop.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::models::integration::IntegrationConfig;
use crate::repositories::IntegrationStore;
use crate::services::retry_queue_service::RetryQueueService;
use crate::services::sync_orchestrator::{OrchestratorError, SyncOrchestrator};

pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub sweep_interval_secs: u64,
    pub drain_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            drain_interval_secs: DEFAULT_DRAIN_INTERVAL_SECS,
        }
    }
}

/// Whether an auto-sync configuration is due at `now`: never synced, or the
/// last completed sync is older than its interval.
pub fn is_due(config: &IntegrationConfig, now: DateTime<Utc>) -> bool {
    match config.last_sync_at {
        None => true,
        Some(last) => {
            let interval = ChronoDuration::minutes(config.settings.sync_interval_minutes as i64);
            now - last >= interval
        }
    }
}

pub struct SchedulerService {
    integrations: Arc<dyn IntegrationStore>,
    orchestrator: Arc<SyncOrchestrator>,
    retry_queue: Arc<RetryQueueService>,
    config: SchedulerConfig,
}

impl SchedulerService {
    pub fn new(
        integrations: Arc<dyn IntegrationStore>,
        orchestrator: Arc<SyncOrchestrator>,
        retry_queue: Arc<RetryQueueService>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            integrations,
            orchestrator,
            retry_queue,
            config,
        }
    }

    /// Spawn the sweep and drain loops. Both run for the life of the process.
    pub fn start(self: Arc<Self>) {
        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(sweeper.config.sweep_interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                sweeper.run_sync_sweep().await;
            }
        });

        let drainer = self.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(drainer.config.drain_interval_secs));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match drainer.retry_queue.drain().await {
                    Ok(stats) if stats.processed > 0 => {
                        tracing::info!(
                            completed = stats.completed,
                            requeued = stats.requeued,
                            failed = stats.failed,
                            "retry queue drained"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => tracing::error!("retry queue drain failed: {}", e),
                }
            }
        });

        tracing::info!(
            sweep_secs = self.config.sweep_interval_secs,
            drain_secs = self.config.drain_interval_secs,
            "background scheduler started"
        );
    }

    /// One pass over auto-sync candidates, starting each due integration.
    pub async fn run_sync_sweep(&self) {
        let candidates = match self.integrations.list_auto_sync_candidates().await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::error!("auto-sync sweep could not list candidates: {}", e);
                return;
            }
        };

        let now = Utc::now();
        for config in candidates {
            if !is_due(&config, now) {
                continue;
            }

            match self.orchestrator.run_sync(config.id).await {
                Ok(stats) => {
                    tracing::info!(
                        integration_id = %config.id,
                        errors = stats.total_errors(),
                        "scheduled sync finished"
                    );
                }
                // A manual sync won the slot; the next sweep will catch up.
                Err(OrchestratorError::AlreadyRunning) => {
                    tracing::debug!(
                        integration_id = %config.id,
                        "scheduled sync skipped, already running"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        integration_id = %config.id,
                        "scheduled sync failed: {}",
                        e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::integration::{ErpType, MappingTable, SyncSettings, SyncStatus};
    use uuid::Uuid;

    fn config_with(last_sync_at: Option<DateTime<Utc>>, interval_minutes: i32) -> IntegrationConfig {
        IntegrationConfig {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            erp_type: ErpType::Sap,
            name: "t".to_string(),
            description: None,
            credentials: String::new(),
            mappings: MappingTable::new(),
            settings: SyncSettings {
                sync_interval_minutes: interval_minutes,
                auto_sync_enabled: true,
                ..Default::default()
            },
            active: true,
            sync_status: SyncStatus::Idle,
            last_sync_at,
            last_sync_stats: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn never_synced_is_due() {
        assert!(is_due(&config_with(None, 60), Utc::now()));
    }

    #[test]
    fn due_only_after_interval_elapses() {
        let now = Utc::now();
        let fresh = config_with(Some(now - ChronoDuration::minutes(30)), 60);
        let stale = config_with(Some(now - ChronoDuration::minutes(61)), 60);

        assert!(!is_due(&fresh, now));
        assert!(is_due(&stale, now));
    }
}
