// Integration configuration models
// One IntegrationConfig per tenant-configured ERP endpoint

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// external field name -> internal field name
pub type FieldMap = HashMap<String, String>;

/// entity type name -> field map for that entity type
pub type MappingTable = HashMap<String, FieldMap>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErpType {
    Sap,
    Oracle,
}

impl ErpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErpType::Sap => "sap",
            ErpType::Oracle => "oracle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sap" => Some(ErpType::Sap),
            "oracle" => Some(ErpType::Oracle),
            _ => None,
        }
    }

    /// Human-readable label for the management surface.
    pub fn label(&self) -> &'static str {
        match self {
            ErpType::Sap => "SAP S/4HANA",
            ErpType::Oracle => "Oracle Fusion Cloud",
        }
    }

    pub fn all() -> &'static [ErpType] {
        &[ErpType::Sap, ErpType::Oracle]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Assets,
    Inventory,
    WorkOrders,
    PurchaseOrders,
    /// Synthetic type used only for connection-test log entries.
    ConnectionTest,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Assets => "assets",
            EntityType::Inventory => "inventory",
            EntityType::WorkOrders => "work_orders",
            EntityType::PurchaseOrders => "purchase_orders",
            EntityType::ConnectionTest => "connection_test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "assets" => Some(EntityType::Assets),
            "inventory" => Some(EntityType::Inventory),
            "work_orders" => Some(EntityType::WorkOrders),
            "purchase_orders" => Some(EntityType::PurchaseOrders),
            "connection_test" => Some(EntityType::ConnectionTest),
            _ => None,
        }
    }

    /// Assets and inventory are pulled from the ERP; work orders and
    /// purchase orders are pushed outward.
    pub fn is_pull(&self) -> bool {
        matches!(self, EntityType::Assets | EntityType::Inventory)
    }

    /// Fixed processing order within one orchestration run, so that log
    /// entries and aggregated stats are reproducible.
    pub const SYNC_ORDER: [EntityType; 4] = [
        EntityType::Assets,
        EntityType::Inventory,
        EntityType::WorkOrders,
        EntityType::PurchaseOrders,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Running,
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Running => "running",
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(SyncStatus::Idle),
            "running" => Some(SyncStatus::Running),
            "success" => Some(SyncStatus::Success),
            "partial" => Some(SyncStatus::Partial),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    pub sync_assets: bool,
    pub sync_inventory: bool,
    pub sync_work_orders: bool,
    pub sync_purchase_orders: bool,
    pub sync_interval_minutes: i32,
    pub auto_sync_enabled: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_assets: true,
            sync_inventory: true,
            sync_work_orders: true,
            sync_purchase_orders: true,
            sync_interval_minutes: 60,
            auto_sync_enabled: false,
        }
    }
}

impl SyncSettings {
    pub fn is_enabled(&self, entity_type: EntityType) -> bool {
        match entity_type {
            EntityType::Assets => self.sync_assets,
            EntityType::Inventory => self.sync_inventory,
            EntityType::WorkOrders => self.sync_work_orders,
            EntityType::PurchaseOrders => self.sync_purchase_orders,
            EntityType::ConnectionTest => false,
        }
    }

    /// Enabled entity types in the fixed sync order.
    pub fn enabled_entity_types(&self) -> Vec<EntityType> {
        EntityType::SYNC_ORDER
            .iter()
            .copied()
            .filter(|t| self.is_enabled(*t))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStats {
    pub created: i32,
    pub updated: i32,
    pub errors: i32,
}

/// Per-entity-type counters for one orchestration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    #[serde(flatten)]
    pub entities: HashMap<String, EntityStats>,
}

impl SyncStats {
    pub fn record(&mut self, entity_type: EntityType, stats: EntityStats) {
        self.entities.insert(entity_type.as_str().to_string(), stats);
    }

    pub fn get(&self, entity_type: EntityType) -> Option<&EntityStats> {
        self.entities.get(entity_type.as_str())
    }

    pub fn total_errors(&self) -> i32 {
        self.entities.values().map(|s| s.errors).sum()
    }
}

#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub erp_type: ErpType,
    pub name: String,
    pub description: Option<String>,

    /// AES-256-GCM encrypted connection parameters, base64-encoded.
    pub credentials: String,

    pub mappings: MappingTable,
    pub settings: SyncSettings,
    pub active: bool,

    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_stats: Option<SyncStats>,
    pub last_error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationConfig {
    /// Overlay supplied mappings onto the existing table, per entity type.
    /// Existing pairs not mentioned in the overlay are kept.
    pub fn merge_mappings(&mut self, overlay: MappingTable) {
        for (entity_type, fields) in overlay {
            self.mappings.entry(entity_type).or_default().extend(fields);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erp_type_round_trip() {
        for t in ErpType::all() {
            assert_eq!(ErpType::parse(t.as_str()), Some(*t));
        }
        assert_eq!(ErpType::parse("dynamics"), None);
    }

    #[test]
    fn entity_type_round_trip() {
        for t in EntityType::SYNC_ORDER {
            assert_eq!(EntityType::parse(t.as_str()), Some(t));
        }
        assert_eq!(
            EntityType::parse("connection_test"),
            Some(EntityType::ConnectionTest)
        );
    }

    #[test]
    fn enabled_entity_types_follow_sync_order() {
        let settings = SyncSettings {
            sync_assets: false,
            sync_purchase_orders: true,
            sync_inventory: true,
            sync_work_orders: true,
            ..Default::default()
        };
        assert_eq!(
            settings.enabled_entity_types(),
            vec![
                EntityType::Inventory,
                EntityType::WorkOrders,
                EntityType::PurchaseOrders
            ]
        );
    }

    #[test]
    fn merge_mappings_overlays_per_entity_type() {
        let mut config = test_config();
        config.mappings.insert(
            "assets".to_string(),
            HashMap::from([
                ("EQUNR".to_string(), "asset_number".to_string()),
                ("EQKTX".to_string(), "name".to_string()),
            ]),
        );

        config.merge_mappings(HashMap::from([(
            "assets".to_string(),
            HashMap::from([
                ("EQKTX".to_string(), "description".to_string()),
                ("HERST".to_string(), "manufacturer".to_string()),
            ]),
        )]));

        let assets = &config.mappings["assets"];
        assert_eq!(assets["EQUNR"], "asset_number");
        assert_eq!(assets["EQKTX"], "description");
        assert_eq!(assets["HERST"], "manufacturer");
    }

    fn test_config() -> IntegrationConfig {
        IntegrationConfig {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            erp_type: ErpType::Sap,
            name: "test".to_string(),
            description: None,
            credentials: String::new(),
            mappings: MappingTable::new(),
            settings: SyncSettings::default(),
            active: true,
            sync_status: SyncStatus::Idle,
            last_sync_at: None,
            last_sync_stats: None,
            last_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}
