use crate::config::{AuthMode, AzureBlobSourceSettings, ConnectorConfig};
use crate::domain::ports::{BlobContainer, StorageConnector};
use crate::utils::error::{ConnectorError, Result};
use crate::utils::validation::Validate;
use bytes::Bytes;
use futures::stream::{self, TryStreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

struct ReadState {
    container: Arc<dyn BlobContainer>,
    blob_name: String,
    chunk_size: u64,
    cancel: CancellationToken,
    offset: u64,
    size: Option<u64>,
}

/// 以固定大小的範圍讀取逐段取得 blob 內容；第一次讀取時才查詢 blob 大小
pub fn open_blob_reader(
    container: Arc<dyn BlobContainer>,
    blob_name: &str,
    chunk_size: u64,
    cancel: CancellationToken,
) -> BlobReader {
    let state = ReadState {
        container,
        blob_name: blob_name.to_string(),
        chunk_size: chunk_size.max(1),
        cancel,
        offset: 0,
        size: None,
    };

    let chunks = stream::try_unfold(state, |mut state| async move {
        let size = match state.size {
            Some(size) => size,
            None => {
                let size = tokio::select! {
                    biased;
                    _ = state.cancel.cancelled() => return Err(ConnectorError::Cancelled),
                    size = state.container.blob_size(&state.blob_name) => size?,
                };
                debug!("{}: {} bytes to read", state.blob_name, size);
                state.size = Some(size);
                size
            }
        };

        if state.offset >= size {
            return Ok(None);
        }

        let length = state.chunk_size.min(size - state.offset);
        let chunk: Bytes = tokio::select! {
            biased;
            _ = state.cancel.cancelled() => return Err(ConnectorError::Cancelled),
            chunk = state.container.read_range(&state.blob_name, state.offset, length) => chunk?,
        };
        if chunk.is_empty() {
            return Ok(None);
        }

        state.offset += chunk.len() as u64;
        Ok(Some((chunk, state)))
    });

    Box::pin(StreamReader::new(chunks.map_err(ConnectorError::into_io)))
}

/// Azure Blob source：以非同步位元組串流提供 blob 內容
pub struct AzureBlobDataSource {
    connector: Arc<dyn StorageConnector>,
}

impl AzureBlobDataSource {
    pub fn new(connector: Arc<dyn StorageConnector>) -> Self {
        Self { connector }
    }

    pub fn settings(config: &ConnectorConfig) -> Result<AzureBlobSourceSettings> {
        let settings: AzureBlobSourceSettings = config.bind()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn read_from_source(
        &self,
        config: &ConnectorConfig,
        cancel: CancellationToken,
    ) -> Result<BlobReader> {
        let settings = Self::settings(config)?;

        let endpoint = settings.account_endpoint();
        let auth = if settings.use_rbac_auth {
            info!(
                "Connecting to Storage account {} using UseRbacAuth",
                settings.account_name.as_deref().unwrap_or_default()
            );
            AuthMode::Rbac {
                endpoint: endpoint.as_deref().unwrap_or_default(),
            }
        } else {
            info!("Connecting to Storage account using ConnectionString");
            AuthMode::ConnectionString(
                settings
                    .connection_string
                    .as_ref()
                    .map(|c| c.inner())
                    .unwrap_or_default(),
            )
        };

        let container = self
            .connector
            .blob_container(auth, settings.container_name())?;

        info!(
            "Reading file '{}' from Azure Blob Container '{}'",
            settings.blob_name(),
            settings.container_name()
        );

        Ok(open_blob_reader(
            container,
            settings.blob_name(),
            settings.read_buffer_bytes(),
            cancel,
        ))
    }
}
