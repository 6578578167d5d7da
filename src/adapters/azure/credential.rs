use super::{ServiceKind, StorageAccount};
use crate::utils::error::{ConnectorError, Result};
use async_trait::async_trait;
use azure_core::auth::{AccessToken, TokenCredential};
use azure_identity::{DefaultAzureCredential, TokenCredentialOptions};
use azure_storage::{CloudLocation, StorageCredentials};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";
pub const COSMOS_SCOPE: &str = "https://cosmos.azure.com/.default";

/// 固定使用單一權杖範圍的憑證
///
/// Storage SDK 一律要求 storage 範圍；Cosmos DB Table 端點需要 Cosmos 範圍。
pub struct ScopedCredential {
    inner: Arc<dyn TokenCredential>,
    scope: String,
}

impl ScopedCredential {
    pub fn new(inner: Arc<dyn TokenCredential>, scope: impl Into<String>) -> Self {
        Self {
            inner,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }
}

impl fmt::Debug for ScopedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCredential")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenCredential for ScopedCredential {
    async fn get_token(&self, _scopes: &[&str]) -> azure_core::Result<AccessToken> {
        debug!("Requesting access token for scope {}", self.scope);
        self.inner.get_token(&[self.scope.as_str()]).await
    }

    async fn clear_cache(&self) -> azure_core::Result<()> {
        self.inner.clear_cache().await
    }
}

/// Azure 預設憑證鏈（環境變數、Managed Identity、Azure CLI）
pub fn default_credential() -> Result<Arc<dyn TokenCredential>> {
    let credential = DefaultAzureCredential::create(TokenCredentialOptions::default()).map_err(
        |e| ConnectorError::AuthenticationError {
            message: format!("could not create default Azure credential: {}", e),
        },
    )?;
    Ok(Arc::new(credential))
}

/// Cosmos DB Table 端點使用 Cosmos 的權杖範圍
pub fn scope_for_endpoint(endpoint: &Url, service: ServiceKind) -> &'static str {
    match (service, endpoint.host_str()) {
        (ServiceKind::Table, Some(host)) if host.to_ascii_lowercase().contains(".cosmos.") => {
            COSMOS_SCOPE
        }
        _ => STORAGE_SCOPE,
    }
}

/// RBAC：以帳號端點搭配 token 憑證
pub fn resolve_rbac(
    endpoint: &str,
    service: ServiceKind,
    credential: Arc<dyn TokenCredential>,
) -> Result<StorageAccount> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let url = Url::parse(trimmed).map_err(|e| ConnectorError::InvalidConfigValueError {
        field: "AccountEndpoint".to_string(),
        value: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    let account = url
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ConnectorError::InvalidConfigValueError {
            field: "AccountEndpoint".to_string(),
            value: endpoint.to_string(),
            reason: "endpoint has no account host name".to_string(),
        })?;

    let scoped = ScopedCredential::new(credential, scope_for_endpoint(&url, service));
    Ok(StorageAccount {
        location: CloudLocation::Custom {
            account: account.clone(),
            uri: trimmed.to_string(),
        },
        account,
        credentials: StorageCredentials::token_credential(Arc::new(scoped)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct RecordingCredential(std::sync::Mutex<Vec<String>>);

    #[async_trait]
    impl TokenCredential for RecordingCredential {
        async fn get_token(&self, scopes: &[&str]) -> azure_core::Result<AccessToken> {
            self.0
                .lock()
                .unwrap()
                .extend(scopes.iter().map(|s| s.to_string()));
            Err(azure_core::Error::message(
                azure_core::error::ErrorKind::Credential,
                "no identity in tests",
            ))
        }

        async fn clear_cache(&self) -> azure_core::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_scope_for_endpoint() {
        let storage: Url = "https://acct.table.core.windows.net".parse().unwrap();
        let cosmos: Url = "https://acct.table.cosmos.azure.com:443/".parse().unwrap();

        assert_eq!(scope_for_endpoint(&storage, ServiceKind::Table), STORAGE_SCOPE);
        assert_eq!(scope_for_endpoint(&cosmos, ServiceKind::Table), COSMOS_SCOPE);
        assert_eq!(scope_for_endpoint(&cosmos, ServiceKind::Blob), STORAGE_SCOPE);
    }

    #[tokio::test]
    async fn test_scoped_credential_replaces_requested_scope() {
        let inner = Arc::new(RecordingCredential(Default::default()));
        let scoped = ScopedCredential::new(inner.clone(), COSMOS_SCOPE);

        assert!(scoped.get_token(&[STORAGE_SCOPE]).await.is_err());
        assert_eq!(*inner.0.lock().unwrap(), vec![COSMOS_SCOPE.to_string()]);
    }

    #[test]
    fn test_resolve_rbac_uses_endpoint_host_as_account() {
        let inner = Arc::new(RecordingCredential(Default::default()));
        let account =
            resolve_rbac("https://acct.table.cosmos.azure.com/", ServiceKind::Table, inner).unwrap();

        assert_eq!(account.account, "acct");
        assert!(matches!(
            account.location,
            CloudLocation::Custom { ref uri, .. } if uri == "https://acct.table.cosmos.azure.com"
        ));
    }

    #[test]
    fn test_resolve_rbac_rejects_bad_endpoint() {
        let inner = Arc::new(RecordingCredential(Default::default()));
        let err = resolve_rbac("not a url", ServiceKind::Blob, inner).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidConfigValueError { .. }));
    }
}
