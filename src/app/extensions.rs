use crate::app::composite::{JsonAzureBlobSink, JsonAzureBlobSource};
use crate::core::{AzureTableApiDataSink, AzureTableApiDataSource};
use crate::domain::ports::{DataSinkExtension, DataSourceExtension, StorageConnector};
use crate::utils::error::{ConnectorError, Result};
use std::sync::Arc;

/// 啟動時明確註冊的連接器清單；以顯示名稱查詢（不分大小寫）
#[derive(Default, Clone)]
pub struct ExtensionCatalog {
    sources: Vec<Arc<dyn DataSourceExtension>>,
    sinks: Vec<Arc<dyn DataSinkExtension>>,
}

impl ExtensionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 內建的 AzureTableAPI 與 Json-AzureBlob
    pub fn with_defaults(connector: Arc<dyn StorageConnector>) -> Self {
        Self::new()
            .register_source(Arc::new(AzureTableApiDataSource::new(connector.clone())))
            .register_source(Arc::new(JsonAzureBlobSource::new(connector.clone())))
            .register_sink(Arc::new(AzureTableApiDataSink::new(connector.clone())))
            .register_sink(Arc::new(JsonAzureBlobSink::new(connector)))
    }

    /// 同名的連接器會取代先前註冊的
    pub fn register_source(mut self, source: Arc<dyn DataSourceExtension>) -> Self {
        self.sources
            .retain(|s| !s.display_name().eq_ignore_ascii_case(source.display_name()));
        self.sources.push(source);
        self
    }

    pub fn register_sink(mut self, sink: Arc<dyn DataSinkExtension>) -> Self {
        self.sinks
            .retain(|s| !s.display_name().eq_ignore_ascii_case(sink.display_name()));
        self.sinks.push(sink);
        self
    }

    pub fn source(&self, name: &str) -> Result<Arc<dyn DataSourceExtension>> {
        self.sources
            .iter()
            .find(|s| s.display_name().eq_ignore_ascii_case(name.trim()))
            .cloned()
            .ok_or_else(|| unknown(name, self.source_names()))
    }

    pub fn sink(&self, name: &str) -> Result<Arc<dyn DataSinkExtension>> {
        self.sinks
            .iter()
            .find(|s| s.display_name().eq_ignore_ascii_case(name.trim()))
            .cloned()
            .ok_or_else(|| unknown(name, self.sink_names()))
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.display_name()).collect()
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.display_name()).collect()
    }
}

fn unknown(name: &str, available: Vec<&str>) -> ConnectorError {
    ConnectorError::UnknownExtension {
        name: name.to_string(),
        available: available.join(", "),
    }
}
