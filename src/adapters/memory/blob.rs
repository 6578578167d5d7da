use crate::domain::ports::BlobContainer;
use crate::utils::error::{ConnectorError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct BlobState {
    created: bool,
    blobs: HashMap<String, Bytes>,
    staged: HashMap<String, HashMap<String, Bytes>>,
    stage_calls: usize,
}

/// 記憶體中的 Blob container，行為比照服務端：區塊先暫存，提交後才可讀
#[derive(Debug, Default)]
pub struct MemoryBlobContainer {
    name: String,
    fail_on_stage: Option<usize>,
    state: Mutex<BlobState>,
}

impl MemoryBlobContainer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// 預先放入已提交的 blob（container 視為已存在）
    pub fn with_blob(mut self, blob_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let state = self.state.get_mut();
        state.created = true;
        state.blobs.insert(blob_name.into(), content.into());
        self
    }

    /// 第 n 次（從 0 起算）暫存區塊時回傳服務錯誤
    pub fn fail_on_stage(mut self, call_index: usize) -> Self {
        self.fail_on_stage = Some(call_index);
        self
    }

    pub async fn exists(&self) -> bool {
        self.state.lock().await.created
    }

    pub async fn blob(&self, blob_name: &str) -> Option<Bytes> {
        self.state.lock().await.blobs.get(blob_name).cloned()
    }

    pub async fn staged_block_count(&self, blob_name: &str) -> usize {
        self.state
            .lock()
            .await
            .staged
            .get(blob_name)
            .map(|blocks| blocks.len())
            .unwrap_or(0)
    }
}

fn not_found(code: &str, message: String) -> ConnectorError {
    ConnectorError::ServiceError {
        status: 404,
        code: Some(code.to_string()),
        message,
    }
}

#[async_trait]
impl BlobContainer for MemoryBlobContainer {
    fn container_name(&self) -> &str {
        &self.name
    }

    async fn create_if_not_exists(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let created = !state.created;
        state.created = true;
        Ok(created)
    }

    async fn stage_block(&self, blob_name: &str, block_id: &str, data: Bytes) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.created {
            return Err(not_found("ContainerNotFound", format!("container {} does not exist", self.name)));
        }

        let call = state.stage_calls;
        state.stage_calls += 1;
        if self.fail_on_stage == Some(call) {
            return Err(ConnectorError::ServiceError {
                status: 500,
                code: Some("InternalError".to_string()),
                message: "simulated block upload failure".to_string(),
            });
        }

        state
            .staged
            .entry(blob_name.to_string())
            .or_default()
            .insert(block_id.to_string(), data);
        Ok(())
    }

    async fn commit_block_list(&self, blob_name: &str, block_ids: &[String]) -> Result<()> {
        let mut state = self.state.lock().await;
        let staged = state.staged.remove(blob_name).unwrap_or_default();

        let mut content = BytesMut::new();
        for id in block_ids {
            let block = staged.get(id).ok_or_else(|| ConnectorError::ServiceError {
                status: 400,
                code: Some("InvalidBlockList".to_string()),
                message: format!("block {} was not staged", id),
            })?;
            content.extend_from_slice(block);
        }

        state.blobs.insert(blob_name.to_string(), content.freeze());
        Ok(())
    }

    async fn blob_size(&self, blob_name: &str) -> Result<u64> {
        let state = self.state.lock().await;
        state
            .blobs
            .get(blob_name)
            .map(|content| content.len() as u64)
            .ok_or_else(|| not_found("BlobNotFound", format!("blob {} does not exist", blob_name)))
    }

    async fn read_range(&self, blob_name: &str, offset: u64, length: u64) -> Result<Bytes> {
        let state = self.state.lock().await;
        let content = state
            .blobs
            .get(blob_name)
            .ok_or_else(|| not_found("BlobNotFound", format!("blob {} does not exist", blob_name)))?;

        let start = (offset as usize).min(content.len());
        let end = (offset.saturating_add(length) as usize).min(content.len());
        Ok(content.slice(start..end))
    }
}
