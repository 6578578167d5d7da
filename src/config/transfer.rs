use crate::config::ConnectorConfig;
use crate::utils::error::{ConnectorError, Result};
use std::path::Path;

/// 傳輸設定檔：一個 source、一個 sink 以及各自的設定區段
///
/// ```json
/// {
///   "Source": "AzureTableAPI",
///   "Sink": "Json-AzureBlob",
///   "SourceSettings": { "Table": "Customers", "ConnectionString": "..." },
///   "SinkSettings": { "ContainerName": "exports", "BlobName": "customers.json", "ConnectionString": "..." }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub source: String,
    pub sink: String,
    pub source_settings: ConnectorConfig,
    pub sink_settings: ConnectorConfig,
}

impl TransferSettings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_config(&ConnectorConfig::from_file(path)?)
    }

    pub fn from_config(config: &ConnectorConfig) -> Result<Self> {
        Ok(Self {
            source: required_name(config, "Source")?,
            sink: required_name(config, "Sink")?,
            source_settings: config.section("SourceSettings"),
            sink_settings: config.section("SinkSettings"),
        })
    }

    /// 命令列參數覆蓋設定檔中的名稱
    pub fn with_overrides(mut self, source: Option<String>, sink: Option<String>) -> Self {
        if let Some(source) = source {
            self.source = source;
        }
        if let Some(sink) = sink {
            self.sink = sink;
        }
        self
    }
}

fn required_name(config: &ConnectorConfig, key: &str) -> Result<String> {
    config
        .get_str(key)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConnectorError::MissingConfigError {
            field: key.to_string(),
        })
}
