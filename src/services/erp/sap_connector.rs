// SAP S/4HANA connector
// OData-style API with OAuth 2.0 client-credentials or basic auth.
// Owns the SAP PM default field map and status/priority vocabularies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::models::integration::{EntityType, ErpType, FieldMap, MappingTable};
use crate::services::erp::connector::{
    item_label, push_echo, AuthMode, ConnectionParams, ConnectionTestResult, ConnectorError,
    ConnectorState, ErpConnector, PushOutcome, Result, SyncResult, EXTERNAL_ID_FIELD,
};
use crate::services::erp::mapping::{apply_mapping, apply_reverse_mapping, merge_tables, ErpRecord};
use crate::services::erp::oauth::OAuthTokenManager;

const EQUIPMENT_PATH: &str = "/sap/opu/odata/sap/API_EQUIPMENT/Equipment";
const MATERIAL_STOCK_PATH: &str = "/sap/opu/odata/sap/API_MATERIAL_STOCK_SRV/MaterialStock";
const MAINTENANCE_ORDER_PATH: &str = "/sap/opu/odata/sap/API_MAINTENANCEORDER/MaintenanceOrder";
const PURCHASE_ORDER_PATH: &str =
    "/sap/opu/odata/sap/API_PURCHASEORDER_PROCESS_SRV/A_PurchaseOrder";
const METADATA_PATH: &str = "/sap/opu/odata/sap/API_EQUIPMENT/$metadata";

fn field_map(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(external, internal)| (external.to_string(), internal.to_string()))
        .collect()
}

static SAP_DEFAULT_MAPPINGS: Lazy<MappingTable> = Lazy::new(|| {
    HashMap::from([
        (
            "assets".to_string(),
            field_map(&[
                ("Equipment", "asset_number"),
                ("EquipmentName", "name"),
                ("ManufacturerName", "manufacturer"),
                ("ManufacturerSerialNumber", "serial_number"),
                ("MaintenancePlant", "plant"),
                ("EquipmentCategory", "category"),
                ("SystemStatus", "status"),
            ]),
        ),
        (
            "inventory".to_string(),
            field_map(&[
                ("Material", "part_number"),
                ("MaterialDescription", "name"),
                ("MatlWrhsStkQtyInMatlBaseUnit", "quantity_on_hand"),
                ("MaterialBaseUnit", "unit"),
                ("StorageLocation", "location"),
                ("Plant", "plant"),
            ]),
        ),
        (
            "work_orders".to_string(),
            field_map(&[
                ("MaintenanceOrder", "work_order_number"),
                ("MaintenanceOrderDesc", "title"),
                ("MaintenanceOrderType", "work_type"),
                ("MaintPriority", "priority"),
                ("Equipment", "asset_number"),
                ("BasicStartDate", "scheduled_start"),
                ("BasicEndDate", "scheduled_end"),
            ]),
        ),
        (
            "purchase_orders".to_string(),
            field_map(&[
                ("PurchaseOrder", "po_number"),
                ("Supplier", "vendor"),
                ("DocumentCurrency", "currency"),
                ("TotalNetAmount", "total_amount"),
                ("PurchaseOrderDate", "order_date"),
                ("CompanyCode", "company_code"),
            ]),
        ),
    ])
});

/// Default SAP field-mapping table, exposed so the management surface can
/// serve it without constructing a connector.
pub fn default_mappings() -> &'static MappingTable {
    &SAP_DEFAULT_MAPPINGS
}

/// SAP equipment system status -> internal asset status vocabulary.
/// Unrecognized codes default to active.
pub fn asset_status_from_sap(code: &str) -> &'static str {
    match code {
        "AVLB" | "INST" => "active",
        "INAC" => "inactive",
        "REPA" => "under_maintenance",
        "DLFL" => "decommissioned",
        _ => "active",
    }
}

/// Internal work-order priority -> SAP MaintPriority code.
pub fn priority_to_sap(priority: &str) -> &'static str {
    match priority {
        "critical" => "1",
        "high" => "2",
        "medium" => "3",
        "low" => "4",
        _ => "3",
    }
}

// OData response envelopes
#[derive(Debug, Deserialize)]
struct ODataResponse<T> {
    d: ODataData<T>,
}

#[derive(Debug, Deserialize)]
struct ODataData<T> {
    results: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ODataSingle<T> {
    d: T,
}

pub struct SapConnector {
    params: ConnectionParams,
    mappings: MappingTable,
    http: Client,
    oauth: Option<OAuthTokenManager>,
    state: ConnectorState,
}

impl SapConnector {
    pub fn new(params: ConnectionParams, mapping_overrides: &MappingTable) -> Result<Self> {
        params.validate()?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(params.timeout_secs))
            .build()?;

        let oauth = match params.auth_mode() {
            AuthMode::OAuth => Some(OAuthTokenManager::new(
                params.client_id.clone().unwrap_or_default(),
                params.client_secret.clone().unwrap_or_default(),
                params.token_url.clone().unwrap_or_default(),
                http.clone(),
            )),
            AuthMode::Basic => None,
        };

        Ok(Self {
            mappings: merge_tables(&SAP_DEFAULT_MAPPINGS, mapping_overrides),
            params,
            http,
            oauth,
            state: ConnectorState::default(),
        })
    }

    async fn authed(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder> {
        match &self.oauth {
            Some(oauth) => Ok(request.bearer_auth(oauth.access_token().await?)),
            None => Ok(request.basic_auth(
                self.params.username.clone().unwrap_or_default(),
                self.params.password.clone(),
            )),
        }
    }

    async fn error_for(&self, response: Response) -> ConnectorError {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ConnectorError::Auth(body),
            StatusCode::NOT_FOUND => ConnectorError::Response(format!("not found: {}", body)),
            _ => ConnectorError::Response(format!("SAP returned {}: {}", status, body)),
        }
    }

    /// OData `$filter` for a pull: the change watermark plus a plant scope
    /// when the connection is pinned to one.
    fn pull_filter(
        &self,
        changed_field: &str,
        plant_field: &str,
        since: Option<DateTime<Utc>>,
    ) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(ts) = since {
            clauses.push(format!(
                "{} gt datetimeoffset'{}'",
                changed_field,
                ts.to_rfc3339()
            ));
        }
        if let Some(plant) = &self.params.plant {
            clauses.push(format!("{} eq '{}'", plant_field, plant));
        }

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" and "))
        }
    }

    async fn pull(
        &self,
        entity_type: EntityType,
        path: &str,
        changed_field: &str,
        plant_field: &str,
        native_key: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult {
        if !self.state.is_connected() {
            return SyncResult::failed(format!(
                "{} pull skipped: not connected to SAP",
                entity_type.as_str()
            ));
        }

        let url = format!("{}{}", self.params.base_url, path);
        let mut request = self.http.get(&url).header("Accept", "application/json");

        if let Some(filter) = self.pull_filter(changed_field, plant_field, since) {
            request = request.query(&[("$filter", filter)]);
        }

        let request = match self.authed(request).await {
            Ok(r) => r,
            Err(e) => return SyncResult::failed(e.to_string()),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return SyncResult::failed(format!("SAP request failed: {}", e)),
        };

        if !response.status().is_success() {
            return SyncResult::failed(self.error_for(response).await.to_string());
        }

        let parsed: ODataResponse<Value> = match response.json().await {
            Ok(p) => p,
            Err(e) => return SyncResult::failed(format!("malformed SAP response: {}", e)),
        };

        let mut result = SyncResult::default();
        for item in parsed.d.results {
            let Some(raw) = item.as_object() else {
                result.errors += 1;
                result
                    .error_messages
                    .push("skipped non-object record".to_string());
                continue;
            };

            let external_id = match raw.get(native_key) {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => {
                    result.errors += 1;
                    result
                        .error_messages
                        .push(format!("record missing {}", native_key));
                    continue;
                }
            };

            let mut mapped = apply_mapping(raw, entity_type.as_str(), &self.mappings);
            mapped.insert(
                EXTERNAL_ID_FIELD.to_string(),
                Value::String(external_id),
            );
            result.data.push(mapped);
        }

        self.state.mark_synced();
        result
    }

    async fn push(
        &self,
        entity_type: EntityType,
        collection: &str,
        native_key: &str,
        items: Vec<ErpRecord>,
    ) -> SyncResult {
        if !self.state.is_connected() {
            return SyncResult::failed_batch("not connected to SAP", items.len());
        }

        let mut result = SyncResult::default();
        for item in &items {
            match self.push_one(entity_type, collection, native_key, item).await {
                Ok(PushOutcome::Created(external_id)) => {
                    result.created += 1;
                    result.data.push(push_echo(item, external_id));
                }
                Ok(PushOutcome::Updated(external_id)) => {
                    result.updated += 1;
                    result.data.push(push_echo(item, external_id));
                }
                Err(e) => {
                    result.errors += 1;
                    result
                        .error_messages
                        .push(format!("{}: {}", item_label(item), e));
                }
            }
        }

        if !items.is_empty() && result.errors as usize == items.len() {
            result.success = false;
        }

        self.state.mark_synced();
        result
    }

    /// Reverse-mapped payload plus SAP-specific defaults: the translated
    /// MaintPriority code, and the connection's company code on purchase
    /// orders that carry none.
    fn push_payload(&self, entity_type: EntityType, item: &ErpRecord) -> ErpRecord {
        let mut payload = apply_reverse_mapping(item, entity_type.as_str(), &self.mappings);

        if entity_type == EntityType::WorkOrders {
            if let Some(Value::String(priority)) = item.get("priority") {
                payload.insert(
                    "MaintPriority".to_string(),
                    Value::String(priority_to_sap(priority).to_string()),
                );
            }
        }

        if entity_type == EntityType::PurchaseOrders && !payload.contains_key("CompanyCode") {
            if let Some(code) = &self.params.company_code {
                payload.insert("CompanyCode".to_string(), Value::String(code.clone()));
            }
        }

        payload
    }

    async fn push_one(
        &self,
        entity_type: EntityType,
        collection: &str,
        native_key: &str,
        item: &ErpRecord,
    ) -> Result<PushOutcome> {
        let payload = self.push_payload(entity_type, item);

        let external_id = item
            .get(EXTERNAL_ID_FIELD)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty());

        match external_id {
            Some(id) => {
                let url = format!("{}{}('{}')", self.params.base_url, collection, id);
                let request = self
                    .authed(self.http.patch(&url).json(&payload))
                    .await?
                    .header("Accept", "application/json");
                let response = request.send().await?;

                if !response.status().is_success() {
                    return Err(self.error_for(response).await);
                }
                Ok(PushOutcome::Updated(id.to_string()))
            }
            None => {
                let url = format!("{}{}", self.params.base_url, collection);
                let request = self
                    .authed(self.http.post(&url).json(&payload))
                    .await?
                    .header("Accept", "application/json");
                let response = request.send().await?;

                if !response.status().is_success() {
                    return Err(self.error_for(response).await);
                }

                let body: ODataSingle<Value> = response.json().await.map_err(|e| {
                    ConnectorError::Response(format!("malformed create response: {}", e))
                })?;

                let assigned = match body.d.get(native_key) {
                    Some(Value::String(s)) if !s.is_empty() => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => {
                        return Err(ConnectorError::Response(format!(
                            "create response missing {}",
                            native_key
                        )))
                    }
                };
                Ok(PushOutcome::Created(assigned))
            }
        }
    }
}

#[async_trait]
impl ErpConnector for SapConnector {
    fn erp_type(&self) -> ErpType {
        ErpType::Sap
    }

    fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    async fn connect(&self) -> Result<()> {
        match &self.oauth {
            Some(oauth) => {
                if let Err(e) = oauth.access_token().await {
                    tracing::error!("SAP connect failed: {}", e);
                    return Err(ConnectorError::Connection(e.to_string()));
                }
            }
            None => {
                let url = format!("{}{}", self.params.base_url, METADATA_PATH);
                let response = self
                    .http
                    .get(&url)
                    .basic_auth(
                        self.params.username.clone().unwrap_or_default(),
                        self.params.password.clone(),
                    )
                    .send()
                    .await
                    .map_err(|e| {
                        tracing::error!("SAP connect failed: {}", e);
                        ConnectorError::Connection(e.to_string())
                    })?;

                if response.status() == StatusCode::UNAUTHORIZED
                    || response.status() == StatusCode::FORBIDDEN
                {
                    tracing::error!("SAP connect rejected: {}", response.status());
                    return Err(ConnectorError::Auth(format!(
                        "SAP rejected credentials: {}",
                        response.status()
                    )));
                }
                if !response.status().is_success() {
                    return Err(ConnectorError::Connection(format!(
                        "SAP returned {}",
                        response.status()
                    )));
                }
            }
        }

        self.state.set_connected(true);
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.set_connected(false);
        if let Some(oauth) = &self.oauth {
            oauth.invalidate();
        }
    }

    async fn test_connection(&self) -> ConnectionTestResult {
        if !self.state.is_connected() {
            return ConnectionTestResult {
                success: false,
                message: "Not connected to SAP; establish a connection first".to_string(),
                details: None,
                response_time_ms: 0,
            };
        }

        let url = format!("{}{}", self.params.base_url, METADATA_PATH);
        let started = std::time::Instant::now();

        let request = match self.authed(self.http.get(&url)).await {
            Ok(r) => r,
            Err(e) => {
                return ConnectionTestResult {
                    success: false,
                    message: format!("Connection test failed: {}", e),
                    details: None,
                    response_time_ms: started.elapsed().as_millis() as i64,
                }
            }
        };

        match request.send().await {
            Ok(response) if response.status().is_success() => ConnectionTestResult {
                success: true,
                message: "Successfully connected to SAP S/4HANA".to_string(),
                details: Some(serde_json::json!({
                    "base_url": self.params.base_url,
                    "auth_mode": match self.params.auth_mode() {
                        AuthMode::OAuth => "oauth",
                        AuthMode::Basic => "basic",
                    },
                    "last_synced_at": self.state.last_sync_at(),
                })),
                response_time_ms: started.elapsed().as_millis() as i64,
            },
            Ok(response) => ConnectionTestResult {
                success: false,
                message: format!("SAP returned {}", response.status()),
                details: None,
                response_time_ms: started.elapsed().as_millis() as i64,
            },
            Err(e) => ConnectionTestResult {
                success: false,
                message: format!("Connection test failed: {}", e),
                details: None,
                response_time_ms: started.elapsed().as_millis() as i64,
            },
        }
    }

    async fn sync_assets(&self, since: Option<DateTime<Utc>>) -> SyncResult {
        let mut result = self
            .pull(
                EntityType::Assets,
                EQUIPMENT_PATH,
                "LastChangeDateTime",
                "MaintenancePlant",
                "Equipment",
                since,
            )
            .await;

        // Translate the SAP system status into the internal vocabulary.
        for record in &mut result.data {
            if let Some(Value::String(code)) = record.get("status").cloned() {
                record.insert(
                    "status".to_string(),
                    Value::String(asset_status_from_sap(&code).to_string()),
                );
            }
        }

        result
    }

    async fn sync_inventory(&self, since: Option<DateTime<Utc>>) -> SyncResult {
        self.pull(
            EntityType::Inventory,
            MATERIAL_STOCK_PATH,
            "LastChangeDateTime",
            "Plant",
            "Material",
            since,
        )
        .await
    }

    async fn sync_work_orders(&self, items: Vec<ErpRecord>) -> SyncResult {
        self.push(
            EntityType::WorkOrders,
            MAINTENANCE_ORDER_PATH,
            "MaintenanceOrder",
            items,
        )
        .await
    }

    async fn sync_purchase_orders(&self, items: Vec<ErpRecord>) -> SyncResult {
        self.push(
            EntityType::PurchaseOrders,
            PURCHASE_ORDER_PATH,
            "PurchaseOrder",
            items,
        )
        .await
    }
}
