pub mod blob_sink;
pub mod blob_source;
pub mod entity;
pub mod table_sink;
pub mod table_source;

pub use blob_sink::{upload_blob, AzureBlobDataSink, UploadOptions};
pub use blob_source::{open_blob_reader, AzureBlobDataSource, BlobReader};
pub use entity::{to_table_entity, TableEntityItem};
pub use table_sink::{write_entities, AzureTableApiDataSink, EntityWriteOptions};
pub use table_source::{read_entities, AzureTableApiDataSource};
