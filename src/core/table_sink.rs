use crate::config::{AuthMode, AzureTableApiSinkSettings, ConnectorConfig};
use crate::core::entity::to_table_entity;
use crate::domain::model::DataItemStream;
use crate::domain::ports::{DataSinkExtension, StorageConnector, TableStore, WriteMode};
use crate::utils::error::{ConnectorError, Result};
use crate::utils::validation::Validate;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct EntityWriteOptions {
    pub partition_key_field: Option<String>,
    pub row_key_field: Option<String>,
    pub write_mode: WriteMode,
    pub max_concurrency: usize,
}

impl EntityWriteOptions {
    pub fn from_settings(settings: &AzureTableApiSinkSettings) -> Self {
        Self {
            partition_key_field: settings.table.partition_key_field_name().map(str::to_string),
            row_key_field: settings.table.row_key_field_name().map(str::to_string),
            write_mode: settings.write_mode,
            max_concurrency: settings.max_concurrency(),
        }
    }
}

/// 寫入結果的累計：成功筆數與第一個錯誤
#[derive(Default)]
struct WriteTally {
    written: usize,
    first_error: Option<ConnectorError>,
}

impl WriteTally {
    fn fail(&mut self, error: ConnectorError) {
        if self.first_error.is_none() {
            self.first_error = Some(error);
        }
    }

    fn settle(&mut self, joined: std::result::Result<Result<()>, JoinError>) {
        match joined {
            Ok(Ok(())) => self.written += 1,
            Ok(Err(e)) => self.fail(e),
            Err(e) => self.fail(ConnectorError::IoError(std::io::Error::other(format!(
                "entity write task failed: {}",
                e
            )))),
        }
    }
}

/// 以有上限的並行度把資料項目逐筆寫入 table
///
/// 每筆資料是獨立的寫入，完成順序不保證。第一個轉換或寫入錯誤出現後不再排程新的資料，
/// 已在進行中的寫入會等待完成，之後回傳第一個錯誤。已寫入的資料不會回復。
pub async fn write_entities(
    store: Arc<dyn TableStore>,
    mut items: DataItemStream,
    options: &EntityWriteOptions,
    cancel: &CancellationToken,
) -> Result<usize> {
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut tally = WriteTally::default();

    loop {
        // 先取得名額再讀下一筆，讓輸入端感受到背壓
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tally.fail(ConnectorError::Cancelled);
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    tally.fail(ConnectorError::IoError(std::io::Error::other(e)));
                    break;
                }
            },
        };

        while let Some(joined) = tasks.try_join_next() {
            tally.settle(joined);
        }
        if tally.first_error.is_some() {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tally.fail(ConnectorError::Cancelled);
                break;
            }
            next = items.next() => next,
        };

        let item = match next {
            None => break,
            Some(Ok(item)) => item,
            Some(Err(e)) => {
                tally.fail(e);
                break;
            }
        };

        let entity = match to_table_entity(
            item.as_ref(),
            options.partition_key_field.as_deref(),
            options.row_key_field.as_deref(),
        ) {
            Ok(entity) => entity,
            Err(e) => {
                tally.fail(e);
                break;
            }
        };

        let store = store.clone();
        let cancel = cancel.clone();
        let mode = options.write_mode;
        tasks.spawn(async move {
            let _permit = permit;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ConnectorError::Cancelled),
                result = store.write_entity(&entity, mode) => result,
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        tally.settle(joined);
    }

    match tally.first_error {
        Some(e) => {
            warn!(
                "❌ Stopped writing to table {} after {} entities: {}",
                store.table_name(),
                tally.written,
                e
            );
            Err(e)
        }
        None => {
            info!("✅ Wrote {} entities to table {}", tally.written, store.table_name());
            Ok(tally.written)
        }
    }
}

/// Azure Table API sink
pub struct AzureTableApiDataSink {
    connector: Arc<dyn StorageConnector>,
}

impl AzureTableApiDataSink {
    pub const DISPLAY_NAME: &'static str = "AzureTableAPI";

    pub fn new(connector: Arc<dyn StorageConnector>) -> Self {
        Self { connector }
    }

    pub fn settings(config: &ConnectorConfig) -> Result<AzureTableApiSinkSettings> {
        let settings: AzureTableApiSinkSettings = config.bind()?;
        settings.validate()?;
        Ok(settings)
    }
}

#[async_trait]
impl DataSinkExtension for AzureTableApiDataSink {
    fn display_name(&self) -> &str {
        Self::DISPLAY_NAME
    }

    fn validate_settings(&self, config: &ConnectorConfig) -> Result<()> {
        Self::settings(config).map(|_| ())
    }

    async fn write(
        &self,
        items: DataItemStream,
        config: &ConnectorConfig,
        cancel: CancellationToken,
    ) -> Result<()> {
        let settings = Self::settings(config)?;
        log_connection(settings.table.auth_mode());

        let store = self
            .connector
            .table_store(settings.table.auth_mode(), settings.table.table())?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            result = store.create_if_not_exists() => { result?; }
        }

        let options = EntityWriteOptions::from_settings(&settings);
        debug!(
            "Writing to table {} ({:?}, up to {} concurrent writes)",
            settings.table.table(),
            options.write_mode,
            options.max_concurrency
        );

        write_entities(store, items, &options, &cancel).await?;
        Ok(())
    }
}

pub(crate) fn log_connection(auth: AuthMode<'_>) {
    match auth {
        AuthMode::Rbac { endpoint } => {
            info!("Connecting to Table endpoint {} using UseRbacAuth", endpoint)
        }
        AuthMode::ConnectionString(_) => info!("Connecting to Table API using ConnectionString"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryConnector, MemoryTableStore};
    use crate::domain::model::{BoxedDataItem, Record};
    use futures::stream;
    use serde_json::json;
    use std::time::Duration;

    fn records(count: usize) -> DataItemStream {
        let items: Vec<Result<BoxedDataItem>> = (0..count)
            .map(|i| {
                Ok(Record::new()
                    .with_field("region", if i % 2 == 0 { "even" } else { "odd" })
                    .with_field("id", i as i64)
                    .with_field("payload", json!({ "n": i }))
                    .boxed())
            })
            .collect();
        stream::iter(items).boxed()
    }

    fn options(max_concurrency: usize) -> EntityWriteOptions {
        EntityWriteOptions {
            partition_key_field: Some("region".to_string()),
            row_key_field: Some("id".to_string()),
            write_mode: WriteMode::Create,
            max_concurrency,
        }
    }

    async fn created_store() -> Arc<MemoryTableStore> {
        let store = Arc::new(MemoryTableStore::new("Customers"));
        store.create_if_not_exists().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_writes_every_record() {
        let store = created_store().await;

        let written = write_entities(store.clone(), records(25), &options(4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written, 25);
        assert_eq!(store.len().await, 25);
        let entity = store.entity("odd", "7").await.unwrap();
        assert_eq!(entity.properties.get("payload"), Some(&json!("{\"n\":7}")));
    }

    #[tokio::test]
    async fn test_empty_input_writes_nothing() {
        let store = created_store().await;

        let written = write_entities(store.clone(), records(0), &options(4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(written, 0);
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let store = Arc::new(
            MemoryTableStore::new("Customers").with_write_delay(Duration::from_millis(10)),
        );
        store.create_if_not_exists().await.unwrap();

        write_entities(store.clone(), records(20), &options(3), &CancellationToken::new())
            .await
            .unwrap();

        assert!(store.max_concurrent_writes() <= 3);
        assert!(store.max_concurrent_writes() >= 2);
    }

    #[tokio::test]
    async fn test_duplicate_key_returns_first_error() {
        let store = created_store().await;
        let duplicate = Record::new().with_field("region", "even").with_field("id", 0);
        let items: Vec<Result<BoxedDataItem>> = vec![
            Ok(Record::new().with_field("region", "even").with_field("id", 0).boxed()),
            Ok(duplicate.boxed()),
        ];

        let err = write_entities(
            store.clone(),
            stream::iter(items).boxed(),
            &options(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.service_code(), Some("EntityAlreadyExists"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_conversion_error_stops_scheduling() {
        let store = created_store().await;
        let items: Vec<Result<BoxedDataItem>> = vec![
            Ok(Record::new().with_field("region", "a").with_field("id", 1).boxed()),
            Ok(Record::new().with_field("id", 2).boxed()),
            Ok(Record::new().with_field("region", "a").with_field("id", 3).boxed()),
        ];

        let err = write_entities(
            store.clone(),
            stream::iter(items).boxed(),
            &options(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ConnectorError::ConversionError { .. }));
        assert_eq!(store.write_calls(), 1);
        assert!(store.entity("a", "3").await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_before_start_writes_nothing() {
        let store = created_store().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = write_entities(store.clone(), records(5), &options(2), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ConnectorError::Cancelled));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_sink_extension_creates_table_and_writes() {
        let connector = Arc::new(MemoryConnector::new());
        let sink = AzureTableApiDataSink::new(connector.clone());
        let config = ConnectorConfig::from_value(json!({
            "ConnectionString": "UseDevelopmentStorage=true",
            "Table": "Customers",
            "PartitionKeyFieldName": "region",
            "RowKeyFieldName": "id",
            "MaxConcurrentEntityWrites": 2
        }))
        .unwrap();

        sink.write(records(6), &config, CancellationToken::new())
            .await
            .unwrap();

        let table = connector.table("Customers");
        assert!(table.exists().await);
        assert_eq!(table.len().await, 6);
    }

    #[tokio::test]
    async fn test_sink_validation_happens_before_connecting() {
        let connector = Arc::new(MemoryConnector::new());
        let sink = AzureTableApiDataSink::new(connector.clone());
        let config = ConnectorConfig::from_value(json!({ "UseRbacAuth": true, "Table": "Customers" }))
            .unwrap();

        let err = sink
            .write(records(1), &config, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("AccountEndpoint"));
        assert!(!connector.table("Customers").exists().await);
    }
}
