use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use mainstay_erp::config::AppConfig;
use mainstay_erp::repositories::{
    PgIntegrationStore, PgRecordStore, PgSyncLogStore, PgSyncQueueStore,
};
use mainstay_erp::services::audit_service::TracingAuditSink;
use mainstay_erp::services::encryption_service::EncryptionService;
use mainstay_erp::services::erp::connector_factory::ConnectorFactory;
use mainstay_erp::services::retry_queue_service::{ConnectorQueueExecutor, RetryQueueService};
use mainstay_erp::services::scheduler_service::SchedulerService;
use mainstay_erp::services::sync_orchestrator::SyncOrchestrator;
use mainstay_erp::{create_app, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().await?;

    sqlx::migrate!("./migrations")
        .run(&config.database_pool)
        .await?;

    let integrations = Arc::new(PgIntegrationStore::new(config.database_pool.clone()));
    let records = Arc::new(PgRecordStore::new(config.database_pool.clone()));
    let logs = Arc::new(PgSyncLogStore::new(config.database_pool.clone()));
    let queue = Arc::new(PgSyncQueueStore::new(config.database_pool.clone()));

    let encryption = EncryptionService::new(&config.encryption_key)?;
    let factory = Arc::new(ConnectorFactory::new(encryption.clone()));
    let audit = Arc::new(TracingAuditSink);

    let orchestrator = Arc::new(SyncOrchestrator::new(
        integrations.clone(),
        records.clone(),
        logs.clone(),
        queue.clone(),
        factory.clone(),
        audit.clone(),
    ));

    let executor = Arc::new(ConnectorQueueExecutor::new(
        integrations.clone(),
        factory.clone(),
    ));
    let retry_queue = Arc::new(RetryQueueService::new(queue.clone(), executor));

    let scheduler = Arc::new(SchedulerService::new(
        integrations.clone(),
        orchestrator.clone(),
        retry_queue,
        config.scheduler,
    ));
    scheduler.start();

    let state = AppState {
        integrations,
        records,
        logs,
        queue,
        factory,
        orchestrator,
        encryption,
        audit,
    };

    let app = create_app(state);
    let addr = config.server_address();

    tracing::info!("Starting Mainstay ERP integration server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
