use crate::config::{AuthMode, SensitiveString, INTERACTIVE_UNSUPPORTED};
use crate::domain::ports::WriteMode;
use crate::utils::error::ValidationIssue;
use crate::utils::validation::{
    check, check_range, is_blank, require_field, validate_table_name, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

/// Table API 共用設定
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AzureTableApiSettings {
    pub connection_string: Option<SensitiveString>,
    pub account_endpoint: Option<String>,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub use_rbac_auth: bool,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub enable_interactive_credentials: bool,
    pub table: Option<String>,
    pub partition_key_field_name: Option<String>,
    pub row_key_field_name: Option<String>,
}

impl AzureTableApiSettings {
    pub fn table(&self) -> &str {
        self.table.as_deref().unwrap_or_default()
    }

    pub fn partition_key_field_name(&self) -> Option<&str> {
        self.partition_key_field_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
    }

    pub fn row_key_field_name(&self) -> Option<&str> {
        self.row_key_field_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
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

impl Validate for AzureTableApiSettings {
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

        require_field(&mut issues, "Table", self.table.as_deref());

        if self.use_rbac_auth {
            if let Some(endpoint) = self.account_endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
                check(
                    &mut issues,
                    "AccountEndpoint",
                    validate_url("AccountEndpoint", endpoint).map(|_| ()),
                );
            }
        }
        if let Some(table) = self.table.as_deref().filter(|t| !t.trim().is_empty()) {
            check(&mut issues, "Table", validate_table_name("Table", table));
        }

        issues
    }
}

/// Table API source 設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AzureTableApiSourceSettings {
    #[serde(flatten)]
    pub table: AzureTableApiSettings,
    pub query_filter: Option<String>,
}

impl AzureTableApiSourceSettings {
    /// 空白的過濾條件視為未設定
    pub fn query_filter(&self) -> Option<&str> {
        self.query_filter
            .as_deref()
            .map(str::trim)
            .filter(|filter| !filter.is_empty())
    }
}

impl Validate for AzureTableApiSourceSettings {
    fn validation_issues(&self) -> Vec<ValidationIssue> {
        self.table.validation_issues()
    }
}

/// Table API sink 設定
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AzureTableApiSinkSettings {
    #[serde(flatten)]
    pub table: AzureTableApiSettings,
    pub write_mode: WriteMode,
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub max_concurrent_entity_writes: Option<usize>,
}

impl AzureTableApiSinkSettings {
    /// 未設定時使用可用的 CPU 平行度
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrent_entity_writes.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

impl Validate for AzureTableApiSinkSettings {
    fn validation_issues(&self) -> Vec<ValidationIssue> {
        let mut issues = self.table.validation_issues();
        check_range(
            &mut issues,
            "MaxConcurrentEntityWrites",
            self.max_concurrent_entity_writes,
            1,
            1024,
        );
        issues
    }
}
