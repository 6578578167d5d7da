use thiserror::Error;

/// 單一欄位的驗證問題
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|issue| issue.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Configuration validation failed: {}", join_issues(.issues))]
    ValidationError { issues: Vec<ValidationIssue> },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid configuration value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration parse error: {message}")]
    ConfigParseError { message: String },

    #[error("Invalid connection string: {message}")]
    ConnectionStringError { message: String },

    #[error("Authentication failed: {message}")]
    AuthenticationError { message: String },

    #[error("Azure request failed: {0}")]
    AzureError(azure_core::Error),

    #[error("Storage service returned {status} ({}): {message}", .code.as_deref().unwrap_or("no error code"))]
    ServiceError {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("Record conversion failed: {message}")]
    ConversionError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Unknown extension '{name}'. Available: {available}")]
    UnknownExtension { name: String, available: String },

    #[error("Operation was cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Authentication,
    Record,
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConnectorError {
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        ConnectorError::ValidationError { issues }
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        ConnectorError::ConversionError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ConnectorError::ValidationError { .. }
            | ConnectorError::MissingConfigError { .. }
            | ConnectorError::InvalidConfigValueError { .. }
            | ConnectorError::ConfigParseError { .. }
            | ConnectorError::ConnectionStringError { .. }
            | ConnectorError::UnknownExtension { .. } => ErrorCategory::Configuration,
            ConnectorError::AuthenticationError { .. } => ErrorCategory::Authentication,
            ConnectorError::ConversionError { .. }
            | ConnectorError::SerializationError(_)
            | ConnectorError::ServiceError { .. } => ErrorCategory::Record,
            ConnectorError::AzureError(_) | ConnectorError::IoError(_) | ConnectorError::Cancelled => {
                ErrorCategory::Transport
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ConnectorError::Cancelled => ErrorSeverity::Low,
            ConnectorError::AzureError(_) | ConnectorError::ServiceError { .. } => {
                ErrorSeverity::Medium
            }
            ConnectorError::ConversionError { .. }
            | ConnectorError::SerializationError(_)
            | ConnectorError::IoError(_) => ErrorSeverity::High,
            _ => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the connector settings section for missing or malformed values"
            }
            ErrorCategory::Authentication => {
                "Verify the identity used by UseRbacAuth has a data role on the storage account"
            }
            ErrorCategory::Record => {
                "Inspect the failing record's key fields and the storage service error code"
            }
            ErrorCategory::Transport => "Check network connectivity and re-run the transfer",
        }
    }

    /// 服務端錯誤碼，例如 `EntityAlreadyExists`
    pub fn service_code(&self) -> Option<&str> {
        match self {
            ConnectorError::ServiceError { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            ConnectorError::ValidationError { issues } => {
                let lines: Vec<String> = issues.iter().map(|i| format!("  - {}", i)).collect();
                format!("Settings are invalid:\n{}", lines.join("\n"))
            }
            ConnectorError::ServiceError {
                status,
                code: Some(code),
                message,
            } => format!("Azure Storage rejected the request ({} {}): {}", status, code, message),
            ConnectorError::Cancelled => "Transfer was cancelled".to_string(),
            other => other.to_string(),
        }
    }

    /// 還原包在 `io::Error` 裡的連接器錯誤（位元組串流的讀寫端只能回報 io 錯誤）
    pub fn from_io(error: std::io::Error) -> Self {
        let is_wrapped = error
            .get_ref()
            .is_some_and(|inner| inner.is::<ConnectorError>());
        if !is_wrapped {
            return ConnectorError::IoError(error);
        }

        match error.into_inner().map(|inner| inner.downcast::<ConnectorError>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => ConnectorError::IoError(std::io::Error::other(other)),
            None => ConnectorError::IoError(std::io::Error::other("unknown io error")),
        }
    }

    pub fn into_io(self) -> std::io::Error {
        match self {
            ConnectorError::IoError(error) => error,
            other => std::io::Error::other(other),
        }
    }
}

/// SDK 錯誤依種類對應：有 HTTP 狀態碼的成為服務錯誤，憑證問題成為驗證錯誤
impl From<azure_core::Error> for ConnectorError {
    fn from(error: azure_core::Error) -> Self {
        use azure_core::error::ErrorKind;

        match error.kind() {
            ErrorKind::HttpResponse { status, error_code } => ConnectorError::ServiceError {
                status: u16::from(*status),
                code: error_code.clone(),
                message: error.to_string(),
            },
            ErrorKind::Credential => ConnectorError::AuthenticationError {
                message: error.to_string(),
            },
            ErrorKind::DataConversion => ConnectorError::ConversionError {
                message: error.to_string(),
            },
            _ => ConnectorError::AzureError(error),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_issue() {
        let err = ConnectorError::validation(vec![
            ValidationIssue::new("ContainerName", "The ContainerName field is required."),
            ValidationIssue::new("BlobName", "The BlobName field is required."),
        ]);

        let message = err.to_string();
        assert!(message.contains("ContainerName"));
        assert!(message.contains("BlobName"));
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_service_error_exposes_code() {
        let err = ConnectorError::ServiceError {
            status: 409,
            code: Some("EntityAlreadyExists".to_string()),
            message: "The specified entity already exists.".to_string(),
        };

        assert_eq!(err.service_code(), Some("EntityAlreadyExists"));
        assert!(err.to_string().contains("409"));
        assert_eq!(err.category(), ErrorCategory::Record);
    }

    #[test]
    fn test_io_round_trip_keeps_connector_error() {
        let wrapped = ConnectorError::Cancelled.into_io();
        assert!(matches!(ConnectorError::from_io(wrapped), ConnectorError::Cancelled));

        let plain = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        assert!(matches!(ConnectorError::from_io(plain), ConnectorError::IoError(_)));
    }

    #[test]
    fn test_user_friendly_message_lists_issues() {
        let err = ConnectorError::validation(vec![ValidationIssue::new(
            "Table",
            "The Table field is required.",
        )]);
        assert_eq!(
            err.user_friendly_message(),
            "Settings are invalid:\n  - The Table field is required."
        );
    }

    #[test]
    fn test_sdk_http_error_becomes_service_error() {
        use azure_core::error::{Error, ErrorKind};
        use azure_core::StatusCode;

        let sdk = Error::new(
            ErrorKind::HttpResponse {
                status: StatusCode::Conflict,
                error_code: Some("TableAlreadyExists".to_string()),
            },
            "table exists",
        );

        let err = ConnectorError::from(sdk);
        assert_eq!(err.service_code(), Some("TableAlreadyExists"));
        assert!(matches!(err, ConnectorError::ServiceError { status: 409, .. }));

        let credential = ConnectorError::from(Error::message(ErrorKind::Credential, "no identity"));
        assert_eq!(credential.category(), ErrorCategory::Authentication);
    }

    #[test]
    fn test_cancelled_is_low_severity() {
        assert_eq!(ConnectorError::Cancelled.severity(), ErrorSeverity::Low);
        assert_eq!(ConnectorError::Cancelled.category(), ErrorCategory::Transport);
    }
}
