//! 記憶體內的儲存後端，供測試與本機試跑使用

pub mod blob;
pub mod filter;
pub mod table;

pub use blob::MemoryBlobContainer;
pub use filter::FilterExpr;
pub use table::MemoryTableStore;

use crate::config::AuthMode;
use crate::domain::ports::{BlobContainer, StorageConnector, TableStore};
use crate::utils::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 以名稱共用同一份記憶體 container/table，讓 sink 寫入的資料可由 source 讀回
#[derive(Debug, Default)]
pub struct MemoryConnector {
    containers: Mutex<HashMap<String, Arc<MemoryBlobContainer>>>,
    tables: Mutex<HashMap<String, Arc<MemoryTableStore>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(self, container: MemoryBlobContainer) -> Self {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(container.container_name().to_string(), Arc::new(container));
        self
    }

    pub fn with_table(self, table: MemoryTableStore) -> Self {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(table.table_name().to_string(), Arc::new(table));
        self
    }

    pub fn container(&self, name: &str) -> Arc<MemoryBlobContainer> {
        self.containers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryBlobContainer::new(name)))
            .clone()
    }

    pub fn table(&self, name: &str) -> Arc<MemoryTableStore> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryTableStore::new(name)))
            .clone()
    }
}

impl StorageConnector for MemoryConnector {
    fn blob_container(
        &self,
        _auth: AuthMode<'_>,
        container_name: &str,
    ) -> Result<Arc<dyn BlobContainer>> {
        Ok(self.container(container_name))
    }

    fn table_store(&self, _auth: AuthMode<'_>, table_name: &str) -> Result<Arc<dyn TableStore>> {
        Ok(self.table(table_name))
    }
}
