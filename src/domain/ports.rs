use crate::config::{AuthMode, ConnectorConfig};
use crate::domain::model::{DataItemStream, TableEntity};
use crate::utils::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// 以單一 container 為範圍的 Blob 儲存介面
#[async_trait]
pub trait BlobContainer: Send + Sync {
    fn container_name(&self) -> &str;

    /// 回傳 true 表示這次呼叫建立了 container
    async fn create_if_not_exists(&self) -> Result<bool>;

    async fn stage_block(&self, blob_name: &str, block_id: &str, data: Bytes) -> Result<()>;

    /// 依序提交已暫存的區塊；提交後 blob 內容才可見
    async fn commit_block_list(&self, blob_name: &str, block_ids: &[String]) -> Result<()>;

    async fn blob_size(&self, blob_name: &str) -> Result<u64>;

    async fn read_range(&self, blob_name: &str, offset: u64, length: u64) -> Result<Bytes>;
}

/// 查詢結果的頁序列；續傳權杖由各後端自行處理
pub type EntityPageStream = BoxStream<'static, Result<Vec<TableEntity>>>;

/// Table 寫入模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    /// 新增；鍵值重複時失敗
    #[default]
    Create,
    /// 新增或整列取代
    Replace,
    /// 新增或合併屬性
    Merge,
}

#[async_trait]
pub trait TableStore: Send + Sync {
    fn table_name(&self) -> &str;

    async fn create_if_not_exists(&self) -> Result<bool>;

    async fn write_entity(&self, entity: &TableEntity, mode: WriteMode) -> Result<()>;

    /// 延遲送出查詢；第一次 poll 才發出請求
    fn query(self: Arc<Self>, filter: Option<String>) -> EntityPageStream;
}

/// 把資料寫入 sink 提供的位元組串流
#[async_trait]
pub trait StreamWriter: Send {
    async fn write_to(self, stream: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()>;
}

#[async_trait]
impl StreamWriter for Bytes {
    async fn write_to(self, stream: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        stream.write_all(&self).await?;
        Ok(())
    }
}

#[async_trait]
impl StreamWriter for Vec<u8> {
    async fn write_to(self, stream: &mut (dyn AsyncWrite + Send + Unpin)) -> Result<()> {
        stream.write_all(&self).await?;
        Ok(())
    }
}

/// 依驗證模式建立儲存後端的工廠（Azure REST 或記憶體）
pub trait StorageConnector: Send + Sync {
    fn blob_container(
        &self,
        auth: AuthMode<'_>,
        container_name: &str,
    ) -> Result<Arc<dyn BlobContainer>>;

    fn table_store(&self, auth: AuthMode<'_>, table_name: &str) -> Result<Arc<dyn TableStore>>;
}

/// 可由主程式依名稱選用的資料來源
#[async_trait]
pub trait DataSourceExtension: Send + Sync {
    fn display_name(&self) -> &str;

    /// 只做設定驗證，不做任何網路呼叫
    fn validate_settings(&self, config: &ConnectorConfig) -> Result<()>;

    async fn read(
        &self,
        config: &ConnectorConfig,
        cancel: CancellationToken,
    ) -> Result<DataItemStream>;
}

/// 可由主程式依名稱選用的資料目的地
#[async_trait]
pub trait DataSinkExtension: Send + Sync {
    fn display_name(&self) -> &str;

    fn validate_settings(&self, config: &ConnectorConfig) -> Result<()>;

    async fn write(
        &self,
        items: DataItemStream,
        config: &ConnectorConfig,
        cancel: CancellationToken,
    ) -> Result<()>;
}
