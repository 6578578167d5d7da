use crate::config::{AuthMode, SensitiveString, INTERACTIVE_UNSUPPORTED};
use crate::utils::error::ValidationIssue;
use crate::utils::validation::{
    check, check_range, is_blank, require_field, validate_blob_name, validate_container_name,
    validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

pub const DEFAULT_MAX_BLOCK_SIZE_KB: u64 = 1024;
pub const DEFAULT_READ_BUFFER_SIZE_KB: u64 = 4096;
/// 單一區塊上限 100 MiB
pub const MAX_BLOCK_SIZE_KB: u64 = 102_400;

/// Blob sink 設定
///
/// 數值與布林欄位也接受字串（例如 `${ENV}` 替換後的 `"512"`）。
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AzureBlobSinkSettings {
    pub connection_string: Option<SensitiveString>,
    pub account_endpoint: Option<String>,
    pub container_name: Option<String>,
    pub blob_name: Option<String>,
    #[serde(rename = "MaxBlockSizeinKB")]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub max_block_size_in_kb: Option<u64>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub use_rbac_auth: bool,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub enable_interactive_credentials: bool,
}

impl AzureBlobSinkSettings {
    pub fn container_name(&self) -> &str {
        self.container_name.as_deref().unwrap_or_default()
    }

    pub fn blob_name(&self) -> &str {
        self.blob_name.as_deref().unwrap_or_default()
    }

    pub fn block_size_bytes(&self) -> usize {
        (self.max_block_size_in_kb.unwrap_or(DEFAULT_MAX_BLOCK_SIZE_KB) * 1024) as usize
    }

    pub fn auth_mode(&self) -> AuthMode<'_> {
        if self.use_rbac_auth {
            AuthMode::Rbac {
                endpoint: self.account_endpoint.as_deref().unwrap_or_default(),
            }
        } else {
            AuthMode::ConnectionString(
                self.connection_string
                    .as_ref()
                    .map(|c| c.inner())
                    .unwrap_or_default(),
            )
        }
    }
}

impl Validate for AzureBlobSinkSettings {
    fn validation_issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if !self.use_rbac_auth && is_blank(self.connection_string.as_ref().map(|c| c.inner())) {
            issues.push(ValidationIssue::new(
                "ConnectionString",
                "ConnectionString must be specified unless UseRbacAuth is true",
            ));
        }
        if self.use_rbac_auth && is_blank(self.account_endpoint.as_deref()) {
            issues.push(ValidationIssue::new(
                "AccountEndpoint",
                "AccountEndpoint must be specified unless UseRbacAuth is false",
            ));
        }
        if self.enable_interactive_credentials {
            issues.push(ValidationIssue::new(
                "EnableInteractiveCredentials",
                INTERACTIVE_UNSUPPORTED,
            ));
        }

        require_field(&mut issues, "ContainerName", self.container_name.as_deref());
        require_field(&mut issues, "BlobName", self.blob_name.as_deref());

        if let Some(endpoint) = self.account_endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            if self.use_rbac_auth {
                check(
                    &mut issues,
                    "AccountEndpoint",
                    validate_url("AccountEndpoint", endpoint).map(|_| ()),
                );
            }
        }
        if let Some(name) = self.container_name.as_deref().filter(|n| !n.trim().is_empty()) {
            check(&mut issues, "ContainerName", validate_container_name("ContainerName", name));
        }
        if let Some(name) = self.blob_name.as_deref().filter(|n| !n.trim().is_empty()) {
            check(&mut issues, "BlobName", validate_blob_name("BlobName", name));
        }
        check_range(
            &mut issues,
            "MaxBlockSizeinKB",
            self.max_block_size_in_kb,
            1,
            MAX_BLOCK_SIZE_KB,
        );

        issues
    }
}

/// Blob source 設定
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AzureBlobSourceSettings {
    pub connection_string: Option<SensitiveString>,
    pub account_name: Option<String>,
    pub container_name: Option<String>,
    pub blob_name: Option<String>,
    #[serde(rename = "ReadBufferSizeInKB")]
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub read_buffer_size_in_kb: Option<u64>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub use_rbac_auth: bool,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub enable_interactive_credentials: bool,
}

impl AzureBlobSourceSettings {
    pub fn container_name(&self) -> &str {
        self.container_name.as_deref().unwrap_or_default()
    }

    pub fn blob_name(&self) -> &str {
        self.blob_name.as_deref().unwrap_or_default()
    }

    pub fn read_buffer_bytes(&self) -> u64 {
        self.read_buffer_size_in_kb.unwrap_or(DEFAULT_READ_BUFFER_SIZE_KB) * 1024
    }

    /// RBAC 模式下由帳號名稱推導公用雲端點
    pub fn account_endpoint(&self) -> Option<String> {
        self.account_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| format!("https://{}.blob.core.windows.net", name.trim()))
    }
}

impl Validate for AzureBlobSourceSettings {
    fn validation_issues(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        if !self.use_rbac_auth && is_blank(self.connection_string.as_ref().map(|c| c.inner())) {
            issues.push(ValidationIssue::new(
                "ConnectionString",
                "ConnectionString must be specified unless UseRbacAuth is true",
            ));
        }
        if self.use_rbac_auth && is_blank(self.account_name.as_deref()) {
            issues.push(ValidationIssue::new(
                "AccountName",
                "AccountName must be specified unless UseRbacAuth is false",
            ));
        }
        if self.enable_interactive_credentials {
            issues.push(ValidationIssue::new(
                "EnableInteractiveCredentials",
                INTERACTIVE_UNSUPPORTED,
            ));
        }

        require_field(&mut issues, "ContainerName", self.container_name.as_deref());
        require_field(&mut issues, "BlobName", self.blob_name.as_deref());

        if let Some(name) = self.container_name.as_deref().filter(|n| !n.trim().is_empty()) {
            check(&mut issues, "ContainerName", validate_container_name("ContainerName", name));
        }
        check_range(
            &mut issues,
            "ReadBufferSizeInKB",
            self.read_buffer_size_in_kb,
            1,
            MAX_BLOCK_SIZE_KB,
        );

        issues
    }
}
