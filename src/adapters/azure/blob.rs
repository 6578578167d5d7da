use super::StorageAccount;
use crate::domain::ports::BlobContainer;
use crate::utils::error::{ConnectorError, Result};
use async_trait::async_trait;
use azure_storage_blobs::prelude::{BlobBlockType, BlockId, BlockList, ClientBuilder, ContainerClient};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::{debug, info};

/// 以 `azure_storage_blobs` 存取單一 container
#[derive(Clone)]
pub struct AzureBlobContainer {
    client: ContainerClient,
    container_name: String,
}

impl AzureBlobContainer {
    pub fn new(account: StorageAccount, container_name: &str) -> Self {
        debug!("Blob account {} at {:?}", account.account, account.location);
        let client = ClientBuilder::with_location(account.location, account.credentials)
            .container_client(container_name);
        Self {
            client,
            container_name: container_name.to_string(),
        }
    }
}

/// 區塊 ID 在連接器內以 base64 字串表示；SDK 送出前會自行編碼，這裡還原成原始位元組
fn block_id(encoded: &str) -> Result<BlockId> {
    let raw = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| ConnectorError::conversion(format!("invalid block id {}: {}", encoded, e)))?;
    Ok(BlockId::new(Bytes::from(raw)))
}

/// 區塊清單依序以 Latest 提交
pub(crate) fn block_list(block_ids: &[String]) -> Result<BlockList> {
    let blocks = block_ids
        .iter()
        .map(|id| block_id(id).map(BlobBlockType::Latest))
        .collect::<Result<Vec<_>>>()?;
    Ok(BlockList { blocks })
}

#[async_trait]
impl BlobContainer for AzureBlobContainer {
    fn container_name(&self) -> &str {
        &self.container_name
    }

    async fn create_if_not_exists(&self) -> Result<bool> {
        match self.client.create().await.map_err(ConnectorError::from) {
            Ok(_) => {
                info!("📂 Created blob container {}", self.container_name);
                Ok(true)
            }
            Err(ConnectorError::ServiceError { status: 409, .. }) => {
                debug!("Blob container {} already exists", self.container_name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn stage_block(&self, blob_name: &str, block_id_b64: &str, data: Bytes) -> Result<()> {
        self.client
            .blob_client(blob_name)
            .put_block(block_id(block_id_b64)?, data)
            .await?;
        Ok(())
    }

    async fn commit_block_list(&self, blob_name: &str, block_ids: &[String]) -> Result<()> {
        self.client
            .blob_client(blob_name)
            .put_block_list(block_list(block_ids)?)
            .await?;
        Ok(())
    }

    async fn blob_size(&self, blob_name: &str) -> Result<u64> {
        let properties = self.client.blob_client(blob_name).get_properties().await?;
        Ok(properties.blob.properties.content_length)
    }

    async fn read_range(&self, blob_name: &str, offset: u64, length: u64) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }

        // SDK 可能把一個範圍拆成多次請求，依序接起來
        let mut responses = self
            .client
            .blob_client(blob_name)
            .get()
            .range(offset..offset + length)
            .into_stream();
        let mut buffer = BytesMut::with_capacity(length as usize);
        while let Some(response) = responses.next().await {
            let chunk = response?.data.collect().await?;
            buffer.extend_from_slice(&chunk);
        }
        Ok(buffer.freeze())
    }
}
