//! 連線字串轉為 SDK 的 `CloudLocation` 與 `StorageCredentials`
//!
//! 解析交給 `azure_storage::ConnectionString`；這裡只把鍵名統一成標準大小寫，
//! 再依序決定端點：明確的 `BlobEndpoint`/`TableEndpoint` → 開發儲存體 →
//! `EndpointSuffix` → 公用雲。

use super::{ServiceKind, StorageAccount};
use crate::utils::error::{ConnectorError, Result};
use azure_storage::{CloudLocation, ConnectionString, StorageCredentials};
use url::Url;

pub const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
pub const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

const KNOWN_KEYS: &[&str] = &[
    "AccountName",
    "AccountKey",
    "SharedAccessSignature",
    "DefaultEndpointsProtocol",
    "EndpointSuffix",
    "BlobEndpoint",
    "TableEndpoint",
    "QueueEndpoint",
    "FileEndpoint",
    "UseDevelopmentStorage",
    "DevelopmentStorageProxyUri",
];

/// 鍵名不分大小寫；SDK 只認得標準寫法
pub fn normalize(connection_string: &str) -> Result<String> {
    let mut pairs = Vec::new();

    for segment in connection_string.split(';').map(str::trim) {
        if segment.is_empty() {
            continue;
        }
        // SAS 與金鑰的值可能包含 '='，只切第一個
        let (key, value) =
            segment
                .split_once('=')
                .ok_or_else(|| ConnectorError::ConnectionStringError {
                    message: format!("invalid key=value pair: {}", redact_segment(segment)),
                })?;
        let key = key.trim();
        let key = KNOWN_KEYS
            .iter()
            .find(|known| known.eq_ignore_ascii_case(key))
            .copied()
            .unwrap_or(key);

        let value = match key {
            "SharedAccessSignature" => value.trim().trim_start_matches('?').to_string(),
            "UseDevelopmentStorage" | "DefaultEndpointsProtocol" => value.trim().to_ascii_lowercase(),
            _ => value.trim().to_string(),
        };
        pairs.push(format!("{}={}", key, value));
    }

    if pairs.is_empty() {
        return Err(ConnectorError::ConnectionStringError {
            message: "connection string is empty".to_string(),
        });
    }
    Ok(pairs.join(";"))
}

fn redact_segment(segment: &str) -> String {
    let lower = segment.to_ascii_lowercase();
    if lower.starts_with("accountkey") || lower.starts_with("sharedaccesssignature") {
        "<redacted>".to_string()
    } else {
        segment.to_string()
    }
}

fn invalid(message: impl Into<String>) -> ConnectorError {
    ConnectorError::ConnectionStringError {
        message: message.into(),
    }
}

/// 端點主機名稱的第一段即帳號，例如 `acct.table.cosmos.azure.com`
fn account_from_endpoint(endpoint: &str) -> Option<String> {
    Url::parse(endpoint)
        .ok()?
        .host_str()?
        .split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_string)
}

pub fn resolve(connection_string: &str, service: ServiceKind) -> Result<StorageAccount> {
    let normalized = normalize(connection_string)?;
    let parsed = ConnectionString::new(&normalized).map_err(|e| invalid(e.to_string()))?;

    let development = parsed.use_development_storage.unwrap_or(false);
    let explicit = match service {
        ServiceKind::Blob => parsed.blob_endpoint,
        ServiceKind::Table => parsed.table_endpoint,
    }
    .map(|endpoint| endpoint.trim_end_matches('/'));

    let account = parsed
        .account_name
        .map(str::to_string)
        .or_else(|| explicit.and_then(account_from_endpoint))
        .or_else(|| development.then(|| DEV_ACCOUNT_NAME.to_string()))
        .ok_or_else(|| invalid("AccountName is required when no service endpoint is given"))?;

    let location = if let Some(uri) = explicit {
        CloudLocation::Custom {
            account: account.clone(),
            uri: uri.to_string(),
        }
    } else if development {
        let address = parsed
            .development_storage_proxy_uri
            .and_then(|proxy| Url::parse(proxy).ok())
            .and_then(|proxy| proxy.host_str().map(str::to_string))
            .unwrap_or_else(|| "127.0.0.1".to_string());
        CloudLocation::Emulator {
            address,
            port: service.development_port(),
        }
    } else {
        let protocol = normalized
            .split(';')
            .find_map(|pair| pair.strip_prefix("DefaultEndpointsProtocol="))
            .unwrap_or("https");
        match parsed.endpoint_suffix {
            Some(suffix) => CloudLocation::Custom {
                account: account.clone(),
                uri: format!("{}://{}.{}.{}", protocol, account, service.subdomain(), suffix),
            },
            None if protocol == "https" => CloudLocation::Public {
                account: account.clone(),
            },
            None => CloudLocation::Custom {
                account: account.clone(),
                uri: format!("{}://{}.{}.core.windows.net", protocol, account, service.subdomain()),
            },
        }
    };

    // 優先順序：帳號金鑰 → SAS → 開發儲存體的公開金鑰
    let credentials = if let Some(key) = parsed.account_key {
        StorageCredentials::access_key(account.clone(), key.to_string())
    } else if let Some(sas) = parsed.sas {
        StorageCredentials::sas_token(sas).map_err(|e| invalid(format!("invalid SharedAccessSignature: {}", e)))?
    } else if development {
        StorageCredentials::access_key(DEV_ACCOUNT_NAME, DEV_ACCOUNT_KEY.to_string())
    } else {
        return Err(invalid("AccountKey or SharedAccessSignature is required"));
    };

    Ok(StorageAccount {
        account,
        location,
        credentials,
    })
}
