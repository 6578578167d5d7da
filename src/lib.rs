pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::azure::AzureConnector;
pub use adapters::memory::MemoryConnector;
pub use app::{ExtensionCatalog, TransferEngine, TransferSummary};
pub use config::{ConnectorConfig, TransferSettings};
pub use domain::model::{DataItem, DataItemStream, Record, TableEntity};
pub use domain::ports::{DataSinkExtension, DataSourceExtension, StorageConnector};
pub use utils::error::{ConnectorError, Result};
