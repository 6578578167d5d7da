pub mod blob_settings;
pub mod table_settings;
pub mod transfer;

use crate::utils::error::{ConnectorError, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

pub use blob_settings::{AzureBlobSinkSettings, AzureBlobSourceSettings};
pub use table_settings::{AzureTableApiSinkSettings, AzureTableApiSourceSettings};
pub use transfer::TransferSettings;

/// 敏感字串（連線字串、金鑰）：Debug 輸出時遮蔽內容
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensitiveString(String);

impl SensitiveString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn inner(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for SensitiveString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl std::fmt::Debug for SensitiveString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("\"**REDACTED**\"")
    }
}

/// 已驗證設定的驗證模式：連線字串或 RBAC（擇一）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode<'a> {
    ConnectionString(&'a str),
    Rbac { endpoint: &'a str },
}

/// 互動式登入不在連接器內進行
pub(crate) const INTERACTIVE_UNSUPPORTED: &str =
    "EnableInteractiveCredentials is not supported; run `az login` first so UseRbacAuth picks up the Azure CLI identity";

/// 連接器的鍵值設定存取介面，可綁定到各 settings 結構
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorConfig {
    values: Map<String, Value>,
}

impl ConnectorConfig {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            Value::Null => Ok(Self::default()),
            other => Err(ConnectorError::ConfigParseError {
                message: format!("expected a settings object, found {}", other),
            }),
        }
    }

    /// 從 JSON 或 TOML 檔案載入（依副檔名判斷）
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&content),
            _ => Self::from_json_str(&content),
        }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        let value: Value =
            serde_json::from_str(&processed).map_err(|e| ConnectorError::ConfigParseError {
                message: format!("JSON parsing error: {}", e),
            })?;
        Self::from_value(value)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = substitute_env_vars(content);
        let value: Value =
            toml::from_str(&processed).map_err(|e| ConnectorError::ConfigParseError {
                message: format!("TOML parsing error: {}", e),
            })?;
        Self::from_value(value)
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// 查詢鍵值，鍵名不分大小寫
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).or_else(|| {
            self.values
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// 取得子區段；不存在時回傳空設定
    pub fn section(&self, key: &str) -> ConnectorConfig {
        match self.get(key) {
            Some(Value::Object(values)) => ConnectorConfig::new(values.clone()),
            _ => ConnectorConfig::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 綁定到設定結構；缺少的必要欄位由各結構的驗證回報
    ///
    /// 鍵名不分大小寫，先換成結構序列化時的標準鍵名；完全相符的鍵優先。
    pub fn bind<T: DeserializeOwned + Serialize + Default>(&self) -> Result<T> {
        let canonical: Vec<String> = match serde_json::to_value(T::default()) {
            Ok(Value::Object(fields)) => fields.keys().cloned().collect(),
            _ => Vec::new(),
        };

        let mut values = Map::with_capacity(self.values.len());
        for (key, value) in &self.values {
            let name = canonical
                .iter()
                .find(|name| name.eq_ignore_ascii_case(key))
                .cloned()
                .unwrap_or_else(|| key.clone());
            if name != *key && self.values.contains_key(&name) {
                continue;
            }
            values.insert(name, value.clone());
        }

        serde_json::from_value(Value::Object(values)).map_err(|e| {
            ConnectorError::ConfigParseError {
                message: format!("settings could not be bound: {}", e),
            }
        })
    }
}

/// 替換環境變數 (例如 ${STORAGE_CONNECTION_STRING})；未定義的變數保留原樣
fn substitute_env_vars(content: &str) -> String {
    static RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var regex"));

    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .to_string()
}
