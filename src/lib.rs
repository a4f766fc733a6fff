pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    middleware::Next,
    routing::{delete, get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

use crate::repositories::{IntegrationStore, RecordStore, SyncLogStore, SyncQueueStore};
use crate::services::audit_service::AuditSink;
use crate::services::encryption_service::EncryptionService;
use crate::services::erp::connector_factory::ConnectorProvider;
use crate::services::sync_orchestrator::SyncOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub integrations: Arc<dyn IntegrationStore>,
    pub records: Arc<dyn RecordStore>,
    pub logs: Arc<dyn SyncLogStore>,
    pub queue: Arc<dyn SyncQueueStore>,
    pub factory: Arc<dyn ConnectorProvider>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub encryption: EncryptionService,
    pub audit: Arc<dyn AuditSink>,
}

pub fn create_app(state: AppState) -> Router {
    use crate::handlers::integrations::{
        create_integration, delete_integration, get_default_mappings, get_erp_types,
        get_integration, list_integrations, list_logs, list_queue, test_connection,
        trigger_sync, update_integration, update_mappings,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest(
            "/api/integrations",
            Router::new()
                .route("/", post(create_integration))
                .route("/", get(list_integrations))
                .route("/erp-types", get(get_erp_types))
                .route("/erp-types/:erp_type/default-mappings", get(get_default_mappings))
                .route("/queue", get(list_queue))
                .route("/:id", get(get_integration))
                .route("/:id", put(update_integration))
                .route("/:id", delete(delete_integration))
                .route("/:id/mappings", put(update_mappings))
                .route("/:id/test", post(test_connection))
                .route("/:id/sync", post(trigger_sync))
                .route("/:id/logs", get(list_logs)),
        )
        .layer(ServiceBuilder::new().layer(cors))
        .with_state(state)
        .layer(axum::middleware::from_fn(
            |req: Request<Body>, next: Next| async move {
                tracing::info!("{} {}", req.method(), req.uri());
                let response = next.run(req).await;
                tracing::info!("Response status: {}", response.status());
                response
            },
        ))
}
