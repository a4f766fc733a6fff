// Oracle Fusion Cloud connector
// REST API ("items" collection envelopes) with basic auth or OAuth 2.0.
// Owns the Oracle eAM default field map and status/priority vocabularies.

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

const ASSETS_PATH: &str = "/fscmRestApi/resources/latest/installedBaseAssets";
const INVENTORY_PATH: &str = "/fscmRestApi/resources/latest/inventoryItemQuantities";
const WORK_ORDERS_PATH: &str = "/fscmRestApi/resources/latest/maintenanceWorkOrders";
const PURCHASE_ORDERS_PATH: &str = "/fscmRestApi/resources/latest/purchaseOrders";
const DESCRIBE_PATH: &str = "/fscmRestApi/resources/latest/installedBaseAssets/describe";

fn field_map(pairs: &[(&str, &str)]) -> FieldMap {
    pairs
        .iter()
        .map(|(external, internal)| (external.to_string(), internal.to_string()))
        .collect()
}

static ORACLE_DEFAULT_MAPPINGS: Lazy<MappingTable> = Lazy::new(|| {
    HashMap::from([
        (
            "assets".to_string(),
            field_map(&[
                ("AssetNumber", "asset_number"),
                ("Description", "name"),
                ("SerialNumber", "serial_number"),
                ("Manufacturer", "manufacturer"),
                ("AssetStatusCode", "status"),
                ("LocationCode", "location"),
            ]),
        ),
        (
            "inventory".to_string(),
            field_map(&[
                ("ItemNumber", "part_number"),
                ("ItemDescription", "name"),
                ("QuantityOnHand", "quantity_on_hand"),
                ("PrimaryUOMCode", "unit"),
                ("SubinventoryCode", "location"),
                ("OrganizationCode", "plant"),
            ]),
        ),
        (
            "work_orders".to_string(),
            field_map(&[
                ("WorkOrderNumber", "work_order_number"),
                ("WorkOrderDescription", "title"),
                ("WorkOrderType", "work_type"),
                ("PriorityCode", "priority"),
                ("AssetNumber", "asset_number"),
                ("PlannedStartDate", "scheduled_start"),
                ("PlannedCompletionDate", "scheduled_end"),
            ]),
        ),
        (
            "purchase_orders".to_string(),
            field_map(&[
                ("OrderNumber", "po_number"),
                ("Supplier", "vendor"),
                ("CurrencyCode", "currency"),
                ("TotalAmount", "total_amount"),
                ("CreationDate", "order_date"),
                ("ProcurementBU", "company_code"),
            ]),
        ),
    ])
});

/// Default Oracle field-mapping table for the management surface.
pub fn default_mappings() -> &'static MappingTable {
    &ORACLE_DEFAULT_MAPPINGS
}

/// Oracle asset status code -> internal vocabulary; unknown codes are active.
pub fn asset_status_from_oracle(code: &str) -> &'static str {
    match code {
        "ACTIVE" | "IN_SERVICE" => "active",
        "INACTIVE" | "OUT_OF_SERVICE" => "inactive",
        "IN_REPAIR" => "under_maintenance",
        "RETIRED" | "EXPIRED" => "decommissioned",
        _ => "active",
    }
}

/// Internal work-order priority -> Oracle priority code.
pub fn priority_to_oracle(priority: &str) -> &'static str {
    match priority {
        "critical" => "CRITICAL",
        "high" => "HIGH",
        "medium" => "MEDIUM",
        "low" => "LOW",
        _ => "MEDIUM",
    }
}

#[derive(Debug, Deserialize)]
struct OracleCollection {
    items: Vec<Value>,
}

pub struct OracleConnector {
    params: ConnectionParams,
    mappings: MappingTable,
    http: Client,
    oauth: Option<OAuthTokenManager>,
    state: ConnectorState,
}

impl OracleConnector {
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
            mappings: merge_tables(&ORACLE_DEFAULT_MAPPINGS, mapping_overrides),
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
            _ => ConnectorError::Response(format!("Oracle returned {}: {}", status, body)),
        }
    }

    /// REST `q` predicate for a pull: the change watermark plus an
    /// organization scope where the resource supports one.
    fn pull_query(
        &self,
        scope_field: Option<&str>,
        since: Option<DateTime<Utc>>,
    ) -> Option<String> {
        let mut clauses = Vec::new();
        if let Some(ts) = since {
            clauses.push(format!("LastUpdateDate > \"{}\"", ts.to_rfc3339()));
        }
        if let (Some(field), Some(plant)) = (scope_field, &self.params.plant) {
            clauses.push(format!("{} = '{}'", field, plant));
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
        scope_field: Option<&str>,
        native_key: &str,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult {
        if !self.state.is_connected() {
            return SyncResult::failed(format!(
                "{} pull skipped: not connected to Oracle",
                entity_type.as_str()
            ));
        }

        let url = format!("{}{}", self.params.base_url, path);
        let mut request = self.http.get(&url).header("Accept", "application/json");

        if let Some(query) = self.pull_query(scope_field, since) {
            request = request.query(&[("q", query)]);
        }

        let request = match self.authed(request).await {
            Ok(r) => r,
            Err(e) => return SyncResult::failed(e.to_string()),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => return SyncResult::failed(format!("Oracle request failed: {}", e)),
        };

        if !response.status().is_success() {
            return SyncResult::failed(self.error_for(response).await.to_string());
        }

        let parsed: OracleCollection = match response.json().await {
            Ok(p) => p,
            Err(e) => return SyncResult::failed(format!("malformed Oracle response: {}", e)),
        };

        let mut result = SyncResult::default();
        for item in parsed.items {
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
            mapped.insert(EXTERNAL_ID_FIELD.to_string(), Value::String(external_id));
            result.data.push(mapped);
        }

        self.state.mark_synced();
        result
    }

    async fn push(
        &self,
        entity_type: EntityType,
        path: &str,
        native_key: &str,
        items: Vec<ErpRecord>,
    ) -> SyncResult {
        if !self.state.is_connected() {
            return SyncResult::failed_batch("not connected to Oracle", items.len());
        }

        let mut result = SyncResult::default();
        for item in &items {
            match self.push_one(entity_type, path, native_key, item).await {
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

    /// Reverse-mapped payload plus Oracle-specific defaults: the translated
    /// priority code, and the connection's business unit on purchase orders
    /// that carry none.
    fn push_payload(&self, entity_type: EntityType, item: &ErpRecord) -> ErpRecord {
        let mut payload = apply_reverse_mapping(item, entity_type.as_str(), &self.mappings);

        if entity_type == EntityType::WorkOrders {
            if let Some(Value::String(priority)) = item.get("priority") {
                payload.insert(
                    "PriorityCode".to_string(),
                    Value::String(priority_to_oracle(priority).to_string()),
                );
            }
        }

        if entity_type == EntityType::PurchaseOrders && !payload.contains_key("ProcurementBU") {
            if let Some(code) = &self.params.company_code {
                payload.insert("ProcurementBU".to_string(), Value::String(code.clone()));
            }
        }

        payload
    }

    async fn push_one(
        &self,
        entity_type: EntityType,
        path: &str,
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
                let url = format!("{}{}/{}", self.params.base_url, path, id);
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
                let url = format!("{}{}", self.params.base_url, path);
                let request = self
                    .authed(self.http.post(&url).json(&payload))
                    .await?
                    .header("Accept", "application/json");
                let response = request.send().await?;

                if !response.status().is_success() {
                    return Err(self.error_for(response).await);
                }

                let body: Value = response.json().await.map_err(|e| {
                    ConnectorError::Response(format!("malformed create response: {}", e))
                })?;

                let assigned = match body.get(native_key) {
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
impl ErpConnector for OracleConnector {
    fn erp_type(&self) -> ErpType {
        ErpType::Oracle
    }

    fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    async fn connect(&self) -> Result<()> {
        match &self.oauth {
            Some(oauth) => {
                if let Err(e) = oauth.access_token().await {
                    tracing::error!("Oracle connect failed: {}", e);
                    return Err(ConnectorError::Connection(e.to_string()));
                }
            }
            None => {
                let url = format!("{}{}", self.params.base_url, DESCRIBE_PATH);
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
                        tracing::error!("Oracle connect failed: {}", e);
                        ConnectorError::Connection(e.to_string())
                    })?;

                if response.status() == StatusCode::UNAUTHORIZED
                    || response.status() == StatusCode::FORBIDDEN
                {
                    tracing::error!("Oracle connect rejected: {}", response.status());
                    return Err(ConnectorError::Auth(format!(
                        "Oracle rejected credentials: {}",
                        response.status()
                    )));
                }
                if !response.status().is_success() {
                    return Err(ConnectorError::Connection(format!(
                        "Oracle returned {}",
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
                message: "Not connected to Oracle; establish a connection first".to_string(),
                details: None,
                response_time_ms: 0,
            };
        }

        let url = format!("{}{}", self.params.base_url, DESCRIBE_PATH);
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
                message: "Successfully connected to Oracle Fusion Cloud".to_string(),
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
                message: format!("Oracle returned {}", response.status()),
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
            .pull(EntityType::Assets, ASSETS_PATH, None, "AssetId", since)
            .await;

        for record in &mut result.data {
            if let Some(Value::String(code)) = record.get("status").cloned() {
                record.insert(
                    "status".to_string(),
                    Value::String(asset_status_from_oracle(&code).to_string()),
                );
            }
        }

        result
    }

    async fn sync_inventory(&self, since: Option<DateTime<Utc>>) -> SyncResult {
        self.pull(
            EntityType::Inventory,
            INVENTORY_PATH,
            Some("OrganizationCode"),
            "InventoryItemId",
            since,
        )
        .await
    }

    async fn sync_work_orders(&self, items: Vec<ErpRecord>) -> SyncResult {
        self.push(
            EntityType::WorkOrders,
            WORK_ORDERS_PATH,
            "WorkOrderId",
            items,
        )
        .await
    }

    async fn sync_purchase_orders(&self, items: Vec<ErpRecord>) -> SyncResult {
        self.push(
            EntityType::PurchaseOrders,
            PURCHASE_ORDERS_PATH,
            "POHeaderId",
            items,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic_params() -> ConnectionParams {
        ConnectionParams {
            base_url: "https://oracle.example.com".to_string(),
            username: Some("svc".to_string()),
            password: Some("pw".to_string()),
            client_id: None,
            client_secret: None,
            token_url: None,
            company_code: None,
            plant: None,
            timeout_secs: 30,
        }
    }

    #[test]
    fn organization_scope_joins_the_change_query() {
        let mut params = basic_params();
        params.plant = Some("M1".to_string());
        let connector = OracleConnector::new(params, &MappingTable::new()).unwrap();

        let full = connector
            .pull_query(Some("OrganizationCode"), None)
            .unwrap();
        assert_eq!(full, "OrganizationCode = 'M1'");

        let incremental = connector
            .pull_query(Some("OrganizationCode"), Some(Utc::now()))
            .unwrap();
        assert!(incremental.starts_with("LastUpdateDate > \""));
        assert!(incremental.ends_with("OrganizationCode = 'M1'"));

        // Resources without an organization field stay unscoped.
        assert!(connector.pull_query(None, None).is_none());
    }

    #[test]
    fn purchase_order_payload_carries_the_business_unit() {
        let mut params = basic_params();
        params.company_code = Some("US1 BU".to_string());
        let connector = OracleConnector::new(params, &MappingTable::new()).unwrap();

        let mut item = ErpRecord::new();
        item.insert("po_number".to_string(), Value::String("PO-1".to_string()));
        let payload = connector.push_payload(EntityType::PurchaseOrders, &item);
        assert_eq!(payload["ProcurementBU"], "US1 BU");

        item.insert(
            "company_code".to_string(),
            Value::String("EU1 BU".to_string()),
        );
        let payload = connector.push_payload(EntityType::PurchaseOrders, &item);
        assert_eq!(payload["ProcurementBU"], "EU1 BU");
    }

    #[test]
    fn status_vocabulary_defaults_to_active() {
        assert_eq!(asset_status_from_oracle("IN_REPAIR"), "under_maintenance");
        assert_eq!(asset_status_from_oracle("RETIRED"), "decommissioned");
        assert_eq!(asset_status_from_oracle("SOMETHING_NEW"), "active");
    }

    #[test]
    fn priority_vocabulary() {
        assert_eq!(priority_to_oracle("critical"), "CRITICAL");
        assert_eq!(priority_to_oracle("unknown"), "MEDIUM");
    }

    #[test]
    fn default_table_covers_all_synced_entity_types() {
        for entity in EntityType::SYNC_ORDER {
            assert!(default_mappings().contains_key(entity.as_str()));
        }
    }
}
