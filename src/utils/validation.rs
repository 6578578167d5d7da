use crate::utils::error::{ConnectorError, Result, ValidationIssue};
use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// 設定物件的驗證介面
///
/// 實作者只需回報問題清單；`validate` 會在有任何問題時一次回報全部。
pub trait Validate {
    fn validation_issues(&self) -> Vec<ValidationIssue>;

    fn validate(&self) -> Result<()> {
        let issues = self.validation_issues();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(ConnectorError::validation(issues))
        }
    }
}

pub fn is_blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

pub fn require_field(issues: &mut Vec<ValidationIssue>, field_name: &str, value: Option<&str>) {
    if is_blank(value) {
        issues.push(ValidationIssue::new(
            field_name,
            format!("The {} field is required.", field_name),
        ));
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<Url> {
    if url_str.trim().is_empty() {
        return Err(ConnectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConnectorError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(ConnectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(ConnectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be between {} and {}", min, max),
        });
    }
    Ok(())
}

/// 收集 `validate_range` 的結果到問題清單
pub fn check_range<T: PartialOrd + std::fmt::Display + Copy>(
    issues: &mut Vec<ValidationIssue>,
    field_name: &str,
    value: Option<T>,
    min: T,
    max: T,
) {
    if let Some(value) = value {
        if let Err(e) = validate_range(field_name, value, min, max) {
            issues.push(ValidationIssue::new(field_name, e.to_string()));
        }
    }
}

fn table_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{2,62}$").expect("valid table name regex"))
}

fn container_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9][a-z0-9-]{1,61}[a-z0-9]$").expect("valid container name regex")
    })
}

/// Table 名稱：字母開頭，3-63 個英數字元
pub fn validate_table_name(field_name: &str, name: &str) -> Result<()> {
    if !table_name_regex().is_match(name) {
        return Err(ConnectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: name.to_string(),
            reason: "Table names must be 3-63 alphanumeric characters and start with a letter"
                .to_string(),
        });
    }
    Ok(())
}

/// Container 名稱：3-63 個小寫英數字或 '-'，不可出現連續的 '-'
pub fn validate_container_name(field_name: &str, name: &str) -> Result<()> {
    if name == "$root" || name == "$logs" || name == "$web" {
        return Ok(());
    }
    if !container_name_regex().is_match(name) || name.contains("--") {
        return Err(ConnectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: name.to_string(),
            reason: "Container names must be 3-63 lowercase letters, digits or single hyphens"
                .to_string(),
        });
    }
    Ok(())
}

pub fn validate_blob_name(field_name: &str, name: &str) -> Result<()> {
    if name.len() > 1024 || name.ends_with('/') || name.ends_with('.') {
        return Err(ConnectorError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: name.to_string(),
            reason: "Blob names must be at most 1024 characters and not end with '/' or '.'"
                .to_string(),
        });
    }
    Ok(())
}

/// 把單一檢查的錯誤轉為驗證問題
pub fn check(issues: &mut Vec<ValidationIssue>, field_name: &str, result: Result<()>) {
    if let Err(e) = result {
        issues.push(ValidationIssue::new(field_name, e.to_string()));
    }
}
