use crate::config::{AzureTableApiSourceSettings, ConnectorConfig};
use crate::core::entity::TableEntityItem;
use crate::core::table_sink::log_connection;
use crate::domain::model::{BoxedDataItem, DataItemStream, TableEntity};
use crate::domain::ports::{DataSourceExtension, EntityPageStream, StorageConnector, TableStore};
use crate::utils::error::{ConnectorError, Result};
use crate::utils::validation::Validate;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct QueryState {
    table_name: String,
    pages: EntityPageStream,
    partition_key_field: Option<String>,
    row_key_field: Option<String>,
    cancel: CancellationToken,
    buffer: VecDeque<TableEntity>,
    pages_read: usize,
    yielded: usize,
    done: bool,
}

impl QueryState {
    fn item(&self, entity: TableEntity) -> BoxedDataItem {
        Box::new(TableEntityItem::new(
            entity,
            self.partition_key_field.as_deref(),
            self.row_key_field.as_deref(),
        ))
    }
}

/// 逐頁查詢 table，延遲產出每一列
///
/// 串流只能走一次；取消時進行中的請求被放棄，產出一次 `Cancelled` 後結束。
pub fn read_entities(
    store: Arc<dyn TableStore>,
    filter: Option<String>,
    partition_key_field: Option<String>,
    row_key_field: Option<String>,
    cancel: CancellationToken,
) -> DataItemStream {
    let state = QueryState {
        table_name: store.table_name().to_string(),
        pages: store.query(filter),
        partition_key_field,
        row_key_field,
        cancel,
        buffer: VecDeque::new(),
        pages_read: 0,
        yielded: 0,
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }
            if state.cancel.is_cancelled() {
                state.done = true;
                return Some((Err(ConnectorError::Cancelled), state));
            }

            if let Some(entity) = state.buffer.pop_front() {
                state.yielded += 1;
                let item = state.item(entity);
                return Some((Ok(item), state));
            }

            let page = tokio::select! {
                biased;
                _ = state.cancel.cancelled() => Some(Err(ConnectorError::Cancelled)),
                page = state.pages.next() => page,
            };

            match page {
                Some(Ok(entities)) => {
                    state.pages_read += 1;
                    state.buffer.extend(entities);
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                // 沒有續傳權杖，查詢結束
                None => {
                    debug!(
                        "{}: {} entities read in {} pages",
                        state.table_name, state.yielded, state.pages_read
                    );
                    return None;
                }
            }
        }
    })
    .boxed()
}

/// Azure Table API source
pub struct AzureTableApiDataSource {
    connector: Arc<dyn StorageConnector>,
}

impl AzureTableApiDataSource {
    pub const DISPLAY_NAME: &'static str = "AzureTableAPI";

    pub fn new(connector: Arc<dyn StorageConnector>) -> Self {
        Self { connector }
    }

    pub fn settings(config: &ConnectorConfig) -> Result<AzureTableApiSourceSettings> {
        let settings: AzureTableApiSourceSettings = config.bind()?;
        settings.validate()?;
        Ok(settings)
    }
}

#[async_trait]
impl DataSourceExtension for AzureTableApiDataSource {
    fn display_name(&self) -> &str {
        Self::DISPLAY_NAME
    }

    fn validate_settings(&self, config: &ConnectorConfig) -> Result<()> {
        Self::settings(config).map(|_| ())
    }

    async fn read(
        &self,
        config: &ConnectorConfig,
        cancel: CancellationToken,
    ) -> Result<DataItemStream> {
        let settings = Self::settings(config)?;
        log_connection(settings.table.auth_mode());

        let store = self
            .connector
            .table_store(settings.table.auth_mode(), settings.table.table())?;

        match settings.query_filter() {
            Some(filter) => info!("🔍 Querying table {} with filter: {}", settings.table.table(), filter),
            None => info!("🔍 Reading all entities from table {}", settings.table.table()),
        }

        Ok(read_entities(
            store,
            settings.query_filter().map(str::to_string),
            settings.table.partition_key_field_name().map(str::to_string),
            settings.table.row_key_field_name().map(str::to_string),
            cancel,
        ))
    }
}
