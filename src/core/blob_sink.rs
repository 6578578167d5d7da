use crate::config::{AuthMode, AzureBlobSinkSettings, ConnectorConfig};
use crate::domain::ports::{BlobContainer, StorageConnector, StreamWriter};
use crate::utils::error::{ConnectorError, Result};
use crate::utils::progress::{TransferProgress, DEFAULT_PROGRESS_INTERVAL};
use crate::utils::validation::Validate;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub block_size: usize,
    pub progress_interval: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            block_size: 1024 * 1024,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }
}

/// 區塊 ID 需等長，以序號編碼
pub fn block_id(index: usize) -> String {
    BASE64_STANDARD.encode(format!("block-{:08}", index))
}

struct StagedBlob {
    block_ids: Vec<String>,
    progress: TransferProgress,
}

/// 把 writer 的輸出上傳為 blob
///
/// writer 寫入一條容量為一個區塊的管道，另一端的上傳工作依序暫存固定大小的區塊；
/// 管道滿時 writer 會被暫停。只有 writer 成功結束且所有區塊上傳完成後才提交區塊清單，
/// 因此失敗或取消時不會留下新的 blob 內容。回傳上傳的位元組數。
pub async fn upload_blob<W: StreamWriter>(
    container: Arc<dyn BlobContainer>,
    blob_name: &str,
    writer: W,
    options: &UploadOptions,
    cancel: &CancellationToken,
) -> Result<u64> {
    let block_size = options.block_size.max(1);
    let (mut write_half, read_half) = tokio::io::duplex(block_size);

    let uploader = tokio::spawn(stage_blocks(
        container.clone(),
        blob_name.to_string(),
        read_half,
        block_size,
        TransferProgress::new(blob_name, options.progress_interval),
        cancel.clone(),
    ));

    let write_result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
        result = async {
            writer.write_to(&mut write_half).await?;
            write_half.shutdown().await?;
            Ok::<(), ConnectorError>(())
        } => result,
    };
    drop(write_half);

    if let Err(write_error) = write_result {
        uploader.abort();
        // 上傳端先失敗時，writer 只會看到管道被關閉；回報上傳端的錯誤
        return match uploader.await {
            Ok(Err(upload_error)) => Err(upload_error),
            _ => Err(write_error),
        };
    }

    let staged = uploader.await.map_err(|e| {
        ConnectorError::IoError(std::io::Error::other(format!("block uploader failed: {}", e)))
    })??;

    if cancel.is_cancelled() {
        return Err(ConnectorError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
        result = container.commit_block_list(blob_name, &staged.block_ids) => result?,
    }
    debug!("Committed {} blocks to {}", staged.block_ids.len(), blob_name);

    staged.progress.log_summary();
    Ok(staged.progress.total_bytes())
}

async fn stage_blocks(
    container: Arc<dyn BlobContainer>,
    blob_name: String,
    mut reader: impl AsyncRead + Unpin,
    block_size: usize,
    mut progress: TransferProgress,
    cancel: CancellationToken,
) -> Result<StagedBlob> {
    let mut block_ids = Vec::new();

    loop {
        let block = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            block = read_block(&mut reader, block_size) => block?,
        };
        if block.is_empty() {
            break;
        }

        let id = block_id(block_ids.len());
        let len = block.len() as u64;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            result = container.stage_block(&blob_name, &id, block) => result?,
        }
        block_ids.push(id);
        progress.record(len);
    }

    Ok(StagedBlob {
        block_ids,
        progress,
    })
}

/// 讀滿一個區塊或直到串流結束
async fn read_block(reader: &mut (impl AsyncRead + Unpin), block_size: usize) -> Result<Bytes> {
    let mut buffer = BytesMut::with_capacity(block_size);
    while buffer.len() < block_size {
        if reader.read_buf(&mut buffer).await? == 0 {
            break;
        }
    }
    Ok(buffer.freeze())
}

/// Azure Blob sink：把外部提供的寫入函式導向 blob
pub struct AzureBlobDataSink {
    connector: Arc<dyn StorageConnector>,
    progress_interval: Duration,
}

impl AzureBlobDataSink {
    pub fn new(connector: Arc<dyn StorageConnector>) -> Self {
        Self {
            connector,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn settings(config: &ConnectorConfig) -> Result<AzureBlobSinkSettings> {
        let settings: AzureBlobSinkSettings = config.bind()?;
        settings.validate()?;
        Ok(settings)
    }

    pub async fn write_to_target<W: StreamWriter>(
        &self,
        writer: W,
        config: &ConnectorConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let settings = Self::settings(config)?;

        match settings.auth_mode() {
            AuthMode::Rbac { endpoint } => {
                info!("Connecting to Storage account {} using UseRbacAuth", endpoint)
            }
            AuthMode::ConnectionString(_) => {
                info!("Connecting to Storage account using ConnectionString")
            }
        }

        let container = self
            .connector
            .blob_container(settings.auth_mode(), settings.container_name())?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            result = container.create_if_not_exists() => { result?; }
        }

        info!(
            "Saving file '{}' to Azure Blob Container '{}'",
            settings.blob_name(),
            settings.container_name()
        );

        let options = UploadOptions {
            block_size: settings.block_size_bytes(),
            progress_interval: self.progress_interval,
        };

        match upload_blob(container, settings.blob_name(), writer, &options, cancel).await {
            Ok(bytes) => {
                debug!("{}: upload finished ({} bytes)", settings.blob_name(), bytes);
                Ok(())
            }
            Err(e) => {
                warn!("❌ {}: upload failed, blob was not committed: {}", settings.blob_name(), e);
                Err(e)
            }
        }
    }
}
