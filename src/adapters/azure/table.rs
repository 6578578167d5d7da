use super::StorageAccount;
use crate::domain::model::TableEntity;
use crate::domain::ports::{EntityPageStream, TableStore, WriteMode};
use crate::utils::error::{ConnectorError, Result};
use async_trait::async_trait;
use azure_data_tables::clients::TableServiceClientBuilder;
use azure_data_tables::prelude::*;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// 以 `azure_data_tables` 存取單一 table（Storage 或 Cosmos DB）
#[derive(Clone)]
pub struct AzureTableStore {
    client: TableClient,
    table_name: String,
}

impl AzureTableStore {
    pub fn new(account: StorageAccount, table_name: &str) -> Self {
        debug!("Table account {} at {:?}", account.account, account.location);
        let client = TableServiceClientBuilder::with_location(account.location, account.credentials)
            .build()
            .table_client(table_name);
        Self {
            client,
            table_name: table_name.to_string(),
        }
    }
}

#[async_trait]
impl TableStore for AzureTableStore {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    async fn create_if_not_exists(&self) -> Result<bool> {
        match self.client.create().await.map_err(ConnectorError::from) {
            Ok(_) => {
                info!("📂 Created table {}", self.table_name);
                Ok(true)
            }
            Err(ConnectorError::ServiceError { status: 409, .. }) => {
                debug!("Table {} already exists", self.table_name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn write_entity(&self, entity: &TableEntity, mode: WriteMode) -> Result<()> {
        // 沒有 If-Match 的 replace/merge 即為 insert-or-replace / insert-or-merge
        match mode {
            WriteMode::Create => {
                self.client.insert::<_, Value>(entity)?.await?;
            }
            WriteMode::Replace => {
                self.client
                    .partition_key_client(entity.partition_key.as_str())
                    .entity_client(entity.row_key.as_str())
                    .insert_or_replace(entity)?
                    .await?;
            }
            WriteMode::Merge => {
                self.client
                    .partition_key_client(entity.partition_key.as_str())
                    .entity_client(entity.row_key.as_str())
                    .insert_or_merge(entity)?
                    .await?;
            }
        }
        Ok(())
    }

    fn query(self: Arc<Self>, filter: Option<String>) -> EntityPageStream {
        let mut query = self.client.query();
        if let Some(filter) = filter {
            query = query.filter(Filter::new(filter));
        }

        let table_name = self.table_name.clone();
        query
            .into_stream::<TableEntity>()
            .map(move |page| {
                page.map(|page| {
                    debug!("Fetched {} entities from {}", page.entities.len(), table_name);
                    page.entities
                })
                .map_err(ConnectorError::from)
            })
            .boxed()
    }
}
