// Application layer: JSON format, composite connectors, catalog and transfer driver.

pub mod composite;
pub mod extensions;
pub mod json_format;
pub mod transfer;

pub use composite::{JsonAzureBlobSink, JsonAzureBlobSource, JSON_AZURE_BLOB};
pub use extensions::ExtensionCatalog;
pub use transfer::{TransferEngine, TransferSummary};
