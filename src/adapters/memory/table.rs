use super::filter::FilterExpr;
use crate::domain::model::TableEntity;
use crate::domain::ports::{EntityPageStream, TableStore, WriteMode};
use crate::utils::error::{ConnectorError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// 服務端單頁上限
pub const DEFAULT_PAGE_SIZE: usize = 1000;

type EntityKey = (String, String);

#[derive(Debug, Default)]
struct TableState {
    created: bool,
    rows: BTreeMap<EntityKey, TableEntity>,
}

/// 記憶體中的 table：依 (PartitionKey, RowKey) 排序並分頁回傳
#[derive(Debug)]
pub struct MemoryTableStore {
    name: String,
    page_size: usize,
    write_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    write_calls: AtomicUsize,
    state: Mutex<TableState>,
}

impl MemoryTableStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page_size: DEFAULT_PAGE_SIZE,
            write_delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            state: Mutex::new(TableState::default()),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// 每次寫入前等待，用於觀察並行寫入數
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    pub fn with_entity(mut self, entity: TableEntity) -> Self {
        let state = self.state.get_mut();
        state.created = true;
        state
            .rows
            .insert((entity.partition_key.clone(), entity.row_key.clone()), entity);
        self
    }

    pub async fn exists(&self) -> bool {
        self.state.lock().await.created
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn entity(&self, partition_key: &str, row_key: &str) -> Option<TableEntity> {
        self.state
            .lock()
            .await
            .rows
            .get(&(partition_key.to_string(), row_key.to_string()))
            .cloned()
    }

    pub async fn entities(&self) -> Vec<TableEntity> {
        self.state.lock().await.rows.values().cloned().collect()
    }

    pub fn max_concurrent_writes(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    async fn apply_write(&self, entity: &TableEntity, mode: WriteMode) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.created {
            return Err(ConnectorError::ServiceError {
                status: 404,
                code: Some("TableNotFound".to_string()),
                message: format!("table {} does not exist", self.name),
            });
        }

        let key = (entity.partition_key.clone(), entity.row_key.clone());
        let mut stored = entity.clone();
        stored.timestamp = Some(chrono::Utc::now().to_rfc3339());

        match mode {
            WriteMode::Create => {
                if state.rows.contains_key(&key) {
                    return Err(ConnectorError::ServiceError {
                        status: 409,
                        code: Some("EntityAlreadyExists".to_string()),
                        message: "The specified entity already exists.".to_string(),
                    });
                }
                state.rows.insert(key, stored);
            }
            WriteMode::Replace => {
                state.rows.insert(key, stored);
            }
            WriteMode::Merge => match state.rows.get_mut(&key) {
                Some(existing) => {
                    existing.properties.extend(stored.properties);
                    existing.timestamp = stored.timestamp;
                }
                None => {
                    state.rows.insert(key, stored);
                }
            },
        }
        Ok(())
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    fn table_name(&self) -> &str {
        &self.name
    }

    async fn create_if_not_exists(&self) -> Result<bool> {
        let mut state = self.state.lock().await;
        let created = !state.created;
        state.created = true;
        Ok(created)
    }

    async fn write_entity(&self, entity: &TableEntity, mode: WriteMode) -> Result<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.apply_write(entity, mode).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn query(self: Arc<Self>, filter: Option<String>) -> EntityPageStream {
        // 下一頁的起點 (PartitionKey, RowKey)；None 表示已讀完
        let cursor: Option<Bound<EntityKey>> = Some(Bound::Unbounded);

        stream::try_unfold((self, filter, cursor), |(store, filter, cursor)| async move {
            let Some(start) = cursor else {
                return Ok::<_, ConnectorError>(None);
            };
            let expr = filter.as_deref().map(FilterExpr::parse).transpose()?;
            let (entities, next) = store.page_from(start, expr.as_ref()).await?;
            Ok(Some((entities, (store, filter, next))))
        })
        .boxed()
    }
}

impl MemoryTableStore {
    async fn page_from(
        &self,
        start: Bound<EntityKey>,
        filter: Option<&FilterExpr>,
    ) -> Result<(Vec<TableEntity>, Option<Bound<EntityKey>>)> {
        let state = self.state.lock().await;
        if !state.created {
            return Err(ConnectorError::ServiceError {
                status: 404,
                code: Some("TableNotFound".to_string()),
                message: format!("table {} does not exist", self.name),
            });
        }

        let mut matching = state
            .rows
            .range((start, Bound::Unbounded))
            .filter(|(_, entity)| filter.map_or(true, |f| f.matches(entity)));

        let entities: Vec<TableEntity> = matching
            .by_ref()
            .take(self.page_size)
            .map(|(_, entity)| entity.clone())
            .collect();
        let next = matching.next().map(|(key, _)| Bound::Included(key.clone()));

        Ok((entities, next))
    }
}
