//! Json-AzureBlob：JSON 格式搭配 Blob 連接器

use crate::app::json_format::{read_items, JsonStreamWriter};
use crate::config::ConnectorConfig;
use crate::core::blob_sink::AzureBlobDataSink;
use crate::core::blob_source::AzureBlobDataSource;
use crate::domain::model::DataItemStream;
use crate::domain::ports::{DataSinkExtension, DataSourceExtension, StorageConnector};
use crate::utils::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const JSON_AZURE_BLOB: &str = "Json-AzureBlob";

#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct JsonFormatSettings {
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub indented: bool,
}

pub struct JsonAzureBlobSink {
    blob: AzureBlobDataSink,
}

impl JsonAzureBlobSink {
    pub fn new(connector: Arc<dyn StorageConnector>) -> Self {
        Self {
            blob: AzureBlobDataSink::new(connector),
        }
    }
}

#[async_trait]
impl DataSinkExtension for JsonAzureBlobSink {
    fn display_name(&self) -> &str {
        JSON_AZURE_BLOB
    }

    fn validate_settings(&self, config: &ConnectorConfig) -> Result<()> {
        AzureBlobDataSink::settings(config)?;
        config.bind::<JsonFormatSettings>()?;
        Ok(())
    }

    async fn write(
        &self,
        items: DataItemStream,
        config: &ConnectorConfig,
        cancel: CancellationToken,
    ) -> Result<()> {
        let format: JsonFormatSettings = config.bind()?;
        let writer = JsonStreamWriter::new(items, format.indented);
        self.blob.write_to_target(writer, config, &cancel).await
    }
}

pub struct JsonAzureBlobSource {
    blob: AzureBlobDataSource,
}

impl JsonAzureBlobSource {
    pub fn new(connector: Arc<dyn StorageConnector>) -> Self {
        Self {
            blob: AzureBlobDataSource::new(connector),
        }
    }
}

#[async_trait]
impl DataSourceExtension for JsonAzureBlobSource {
    fn display_name(&self) -> &str {
        JSON_AZURE_BLOB
    }

    fn validate_settings(&self, config: &ConnectorConfig) -> Result<()> {
        AzureBlobDataSource::settings(config).map(|_| ())
    }

    async fn read(
        &self,
        config: &ConnectorConfig,
        cancel: CancellationToken,
    ) -> Result<DataItemStream> {
        let reader = self.blob.read_from_source(config, cancel)?;
        Ok(read_items(reader))
    }
}
