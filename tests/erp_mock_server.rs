// Mock ERP Server for Testing
// Simulates SAP S/4HANA OData responses and an OAuth token endpoint, and
// drives the real SAP connector against them.
// Run with: cargo test --test erp_mock_server

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use mainstay_erp::models::integration::MappingTable;
use mainstay_erp::services::erp::connector::{
    ConnectionParams, ConnectorError, ErpConnector, EXTERNAL_ID_FIELD,
};
use mainstay_erp::services::erp::mapping::ErpRecord;
use mainstay_erp::services::erp::sap_connector::SapConnector;

const MOCK_TOKEN: &str = "mock_sap_token_12345";

// ============================================================================
// Mock State
// ============================================================================

#[derive(Debug, Default)]
struct MockSapState {
    last_filter: Option<String>,
    created_orders: Vec<serde_json::Value>,
    patched_orders: Vec<String>,
}

type SharedState = Arc<RwLock<MockSapState>>;

fn authorized(headers: &HeaderMap) -> bool {
    let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let basic = format!("Basic {}", BASE64.encode("svc:pw"));
    let bearer = format!("Bearer {}", MOCK_TOKEN);
    value == basic || value == bearer
}

// ============================================================================
// SAP Mock Endpoints
// ============================================================================

async fn sap_metadata(headers: HeaderMap) -> Result<&'static str, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok("<edmx:Edmx/>")
}

async fn sap_token() -> Json<serde_json::Value> {
    Json(json!({
        "access_token": MOCK_TOKEN,
        "token_type": "Bearer",
        "expires_in": 3600
    }))
}

async fn sap_list_equipment(
    State(state): State<SharedState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    state.write().await.last_filter = query.get("$filter").cloned();

    Ok(Json(json!({
        "d": {
            "results": [
                {
                    "Equipment": "10001",
                    "EquipmentName": "Hydraulic pump",
                    "ManufacturerName": "Bosch",
                    "ManufacturerSerialNumber": "SN-443",
                    "MaintenancePlant": "1000",
                    "EquipmentCategory": "M",
                    "SystemStatus": "REPA"
                },
                {
                    "Equipment": "10002",
                    "EquipmentName": "Conveyor belt",
                    "ManufacturerName": "Siemens",
                    "ManufacturerSerialNumber": "SN-901",
                    "MaintenancePlant": "1000",
                    "EquipmentCategory": "M",
                    "SystemStatus": "AVLB"
                }
            ]
        }
    })))
}

async fn sap_create_order(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(payload): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let mut state = state.write().await;
    state.created_orders.push(payload.clone());
    let assigned = format!("400000{}", state.created_orders.len());

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "d": {
                "MaintenanceOrder": assigned,
                "MaintenanceOrderDesc": payload.get("MaintenanceOrderDesc"),
            }
        })),
    ))
}

async fn sap_patch_order(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }

    state.write().await.patched_orders.push(key);
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Server Setup
// ============================================================================

fn create_sap_mock_server(state: SharedState) -> Router {
    Router::new()
        .route("/oauth/token", post(sap_token))
        .route("/sap/opu/odata/sap/API_EQUIPMENT/$metadata", get(sap_metadata))
        .route(
            "/sap/opu/odata/sap/API_EQUIPMENT/Equipment",
            get(sap_list_equipment),
        )
        .route(
            "/sap/opu/odata/sap/API_MAINTENANCEORDER/MaintenanceOrder",
            post(sap_create_order),
        )
        .route(
            "/sap/opu/odata/sap/API_MAINTENANCEORDER/:key",
            patch(sap_patch_order),
        )
        .with_state(state)
}

async fn start_mock_server() -> (String, SharedState) {
    let state = Arc::new(RwLock::new(MockSapState::default()));
    let app = create_sap_mock_server(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state)
}

fn basic_params(base_url: &str) -> ConnectionParams {
    ConnectionParams {
        base_url: base_url.to_string(),
        username: Some("svc".to_string()),
        password: Some("pw".to_string()),
        client_id: None,
        client_secret: None,
        token_url: None,
        company_code: None,
        plant: None,
        timeout_secs: 5,
    }
}

fn oauth_params(base_url: &str) -> ConnectionParams {
    ConnectionParams {
        base_url: base_url.to_string(),
        username: None,
        password: None,
        client_id: Some("client".to_string()),
        client_secret: Some("secret".to_string()),
        token_url: Some(format!("{}/oauth/token", base_url)),
        company_code: None,
        plant: None,
        timeout_secs: 5,
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

#[tokio::test]
async fn connect_and_test_connection_with_basic_auth() {
    let (base_url, _state) = start_mock_server().await;
    let connector = SapConnector::new(basic_params(&base_url), &MappingTable::new()).unwrap();

    connector.connect().await.unwrap();

    let result = connector.test_connection().await;
    assert!(result.success, "unexpected failure: {}", result.message);
    assert!(result.response_time_ms >= 0);
}

#[tokio::test]
async fn connect_with_bad_credentials_is_an_auth_error() {
    let (base_url, _state) = start_mock_server().await;
    let mut params = basic_params(&base_url);
    params.password = Some("wrong".to_string());
    let connector = SapConnector::new(params, &MappingTable::new()).unwrap();

    match connector.connect().await {
        Err(ConnectorError::Auth(_)) => {}
        other => panic!("expected auth error, got {:?}", other),
    }
}

#[tokio::test]
async fn sync_assets_maps_fields_and_translates_status() {
    let (base_url, _state) = start_mock_server().await;
    let connector = SapConnector::new(basic_params(&base_url), &MappingTable::new()).unwrap();
    connector.connect().await.unwrap();

    let result = connector.sync_assets(None).await;
    assert!(result.success);
    assert_eq!(result.data.len(), 2);

    let pump = &result.data[0];
    assert_eq!(pump["asset_number"], "10001");
    assert_eq!(pump["name"], "Hydraulic pump");
    assert_eq!(pump["manufacturer"], "Bosch");
    assert_eq!(pump["status"], "under_maintenance");
    assert_eq!(pump[EXTERNAL_ID_FIELD], "10001");

    assert_eq!(result.data[1]["status"], "active");
}

#[tokio::test]
async fn incremental_pull_sends_change_filter() {
    let (base_url, state) = start_mock_server().await;
    let connector = SapConnector::new(basic_params(&base_url), &MappingTable::new()).unwrap();
    connector.connect().await.unwrap();

    let since = chrono::Utc::now() - chrono::Duration::hours(2);
    let result = connector.sync_assets(Some(since)).await;
    assert!(result.success);

    let filter = state.read().await.last_filter.clone().unwrap();
    assert!(filter.starts_with("LastChangeDateTime gt datetimeoffset'"));

    // A full pull sends no filter.
    connector.sync_assets(None).await;
    assert!(state.read().await.last_filter.is_none());
}

#[tokio::test]
async fn work_order_push_creates_then_updates() {
    let (base_url, state) = start_mock_server().await;
    let connector = SapConnector::new(basic_params(&base_url), &MappingTable::new()).unwrap();
    connector.connect().await.unwrap();

    let new_order: ErpRecord = json!({
        "id": "2a4a7a2e-7c1c-4a83-9d3e-0f0f5adbe111",
        "title": "Replace bearing",
        "priority": "critical"
    })
    .as_object()
    .unwrap()
    .clone();

    let result = connector.sync_work_orders(vec![new_order]).await;
    assert!(result.success);
    assert_eq!(result.created, 1);
    assert_eq!(result.updated, 0);
    assert_eq!(result.data[0][EXTERNAL_ID_FIELD], "4000001");

    {
        let state = state.read().await;
        assert_eq!(state.created_orders.len(), 1);
        assert_eq!(state.created_orders[0]["MaintenanceOrderDesc"], "Replace bearing");
        // Internal priority vocabulary translated to the SAP code.
        assert_eq!(state.created_orders[0]["MaintPriority"], "1");
    }

    let existing_order: ErpRecord = json!({
        "id": "2a4a7a2e-7c1c-4a83-9d3e-0f0f5adbe111",
        "title": "Replace bearing",
        "priority": "critical",
        "external_id": "4000001"
    })
    .as_object()
    .unwrap()
    .clone();

    let result = connector.sync_work_orders(vec![existing_order]).await;
    assert!(result.success);
    assert_eq!(result.created, 0);
    assert_eq!(result.updated, 1);
    assert_eq!(
        state.read().await.patched_orders,
        vec!["MaintenanceOrder('4000001')".to_string()]
    );
}

#[tokio::test]
async fn oauth_flow_fetches_token_and_syncs() {
    let (base_url, _state) = start_mock_server().await;
    let connector = SapConnector::new(oauth_params(&base_url), &MappingTable::new()).unwrap();

    connector.connect().await.unwrap();

    let result = connector.sync_assets(None).await;
    assert!(result.success);
    assert_eq!(result.data.len(), 2);
}
