// Connector factory and cache
// One live connector per integration configuration, keyed by config id.
// Callers never construct adapters directly.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::integration::{ErpType, IntegrationConfig};
use crate::services::encryption_service::EncryptionService;
use crate::services::erp::connector::{
    ConnectionParams, ConnectorError, ErpConnector, Result,
};
use crate::services::erp::oracle_connector::OracleConnector;
use crate::services::erp::sap_connector::SapConnector;

/// Source of connectors for the orchestrator, queue executor, and handlers.
#[async_trait]
pub trait ConnectorProvider: Send + Sync {
    fn get_or_create(&self, config: &IntegrationConfig) -> Result<Arc<dyn ErpConnector>>;

    /// Drop any cached connector for a configuration, disconnecting it first.
    async fn invalidate(&self, config_id: Uuid);
}

pub struct ConnectorFactory {
    encryption: EncryptionService,
    cache: DashMap<Uuid, Arc<dyn ErpConnector>>,
}

impl ConnectorFactory {
    pub fn new(encryption: EncryptionService) -> Self {
        Self {
            encryption,
            cache: DashMap::new(),
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn build(&self, config: &IntegrationConfig) -> Result<Arc<dyn ErpConnector>> {
        let params: ConnectionParams = self
            .encryption
            .decrypt_json(&config.credentials)
            .map_err(|e| ConnectorError::Config(format!("cannot open credentials: {}", e)))?;

        let connector: Arc<dyn ErpConnector> = match config.erp_type {
            ErpType::Sap => Arc::new(SapConnector::new(params, &config.mappings)?),
            ErpType::Oracle => Arc::new(OracleConnector::new(params, &config.mappings)?),
        };

        Ok(connector)
    }
}

#[async_trait]
impl ConnectorProvider for ConnectorFactory {
    /// Return the cached connector for this configuration, building one on
    /// first use. Concurrent callers racing on the same id get the same
    /// instance; construction happens at most once per cache entry.
    fn get_or_create(&self, config: &IntegrationConfig) -> Result<Arc<dyn ErpConnector>> {
        match self.cache.entry(config.id) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let connector = self.build(config)?;
                entry.insert(connector.clone());
                Ok(connector)
            }
        }
    }

    /// Called when a configuration's credentials or mappings change and when
    /// it is deleted. No-op when nothing is cached.
    async fn invalidate(&self, config_id: Uuid) {
        if let Some((_, connector)) = self.cache.remove(&config_id) {
            connector.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::integration::{MappingTable, SyncSettings, SyncStatus};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use chrono::Utc;

    fn test_factory() -> ConnectorFactory {
        let key = BASE64.encode([3u8; 32]);
        ConnectorFactory::new(EncryptionService::new(&key).unwrap())
    }

    fn test_config(factory: &ConnectorFactory, erp_type: ErpType) -> IntegrationConfig {
        let params = serde_json::json!({
            "base_url": "https://erp.example.com",
            "username": "svc",
            "password": "pw",
        });
        IntegrationConfig {
            id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            erp_type,
            name: "plant erp".to_string(),
            description: None,
            credentials: factory.encryption.encrypt_json(&params).unwrap(),
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

    #[test]
    fn caches_one_connector_per_config() {
        let factory = test_factory();
        let config = test_config(&factory, ErpType::Sap);

        let a = factory.get_or_create(&config).unwrap();
        let b = factory.get_or_create(&config).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.cached_count(), 1);
    }

    #[test]
    fn builds_adapter_matching_erp_type() {
        let factory = test_factory();
        let sap = test_config(&factory, ErpType::Sap);
        let oracle = test_config(&factory, ErpType::Oracle);

        assert_eq!(factory.get_or_create(&sap).unwrap().erp_type(), ErpType::Sap);
        assert_eq!(
            factory.get_or_create(&oracle).unwrap().erp_type(),
            ErpType::Oracle
        );
    }

    #[tokio::test]
    async fn invalidate_forces_fresh_instance() {
        let factory = test_factory();
        let config = test_config(&factory, ErpType::Sap);

        let first = factory.get_or_create(&config).unwrap();
        factory.invalidate(config.id).await;
        assert_eq!(factory.cached_count(), 0);

        let second = factory.get_or_create(&config).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn garbage_credentials_are_a_config_error() {
        let factory = test_factory();
        let mut config = test_config(&factory, ErpType::Sap);
        config.credentials = "not-a-ciphertext".to_string();

        match factory.get_or_create(&config) {
            Err(ConnectorError::Config(_)) => {}
            other => panic!("expected Config error, got {:?}", other.map(|_| ())),
        }
    }
}
