//! Azure Storage SDK 轉接器
//!
//! Blob 走 `azure_storage_blobs`，Table 走 `azure_data_tables`；兩者共用
//! 由連線字串或 RBAC 端點決定的 [`StorageAccount`]。

pub mod blob;
pub mod connection_string;
pub mod credential;
pub mod table;

pub use blob::AzureBlobContainer;
pub use credential::ScopedCredential;
pub use table::AzureTableStore;

use crate::config::AuthMode;
use crate::domain::ports::{BlobContainer, StorageConnector, TableStore};
use crate::utils::error::Result;
use azure_storage::{CloudLocation, StorageCredentials};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Blob,
    Table,
}

impl ServiceKind {
    pub fn subdomain(&self) -> &'static str {
        match self {
            ServiceKind::Blob => "blob",
            ServiceKind::Table => "table",
        }
    }

    /// Azurite 的預設連接埠
    pub fn development_port(&self) -> u16 {
        match self {
            ServiceKind::Blob => 10000,
            ServiceKind::Table => 10002,
        }
    }
}

/// 建立 SDK client 所需的帳號位置與憑證
#[derive(Clone)]
pub struct StorageAccount {
    pub account: String,
    pub location: CloudLocation,
    pub credentials: StorageCredentials,
}

impl fmt::Debug for StorageAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageAccount")
            .field("account", &self.account)
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl StorageAccount {
    pub fn resolve(auth: AuthMode<'_>, service: ServiceKind) -> Result<Self> {
        match auth {
            AuthMode::ConnectionString(connection_string) => {
                connection_string::resolve(connection_string, service)
            }
            AuthMode::Rbac { endpoint } => {
                credential::resolve_rbac(endpoint, service, credential::default_credential()?)
            }
        }
    }
}

/// 連到 Azure Storage / Cosmos DB Table 端點的預設後端
#[derive(Debug, Clone, Copy, Default)]
pub struct AzureConnector;

impl StorageConnector for AzureConnector {
    fn blob_container(
        &self,
        auth: AuthMode<'_>,
        container_name: &str,
    ) -> Result<Arc<dyn BlobContainer>> {
        let account = StorageAccount::resolve(auth, ServiceKind::Blob)?;
        Ok(Arc::new(AzureBlobContainer::new(account, container_name)))
    }

    fn table_store(&self, auth: AuthMode<'_>, table_name: &str) -> Result<Arc<dyn TableStore>> {
        let account = StorageAccount::resolve(auth, ServiceKind::Table)?;
        Ok(Arc::new(AzureTableStore::new(account, table_name)))
    }
}
