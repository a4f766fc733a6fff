pub mod connector;
pub mod connector_factory;
pub mod mapping;
pub mod oauth;
pub mod oracle_connector;
pub mod sap_connector;

pub use connector::{
    ConnectionParams, ConnectionTestResult, ConnectorError, ErpConnector, SyncResult,
    EXTERNAL_ID_FIELD,
};
pub use connector_factory::{ConnectorFactory, ConnectorProvider};
pub use mapping::{apply_mapping, apply_reverse_mapping, merge_tables, ErpRecord};
