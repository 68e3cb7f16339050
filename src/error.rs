//! Error handling module
//!
//! Centralized error type for the handler layer. Domain errors pass through
//! untouched; infrastructure failures are wrapped.

use serde::Serialize;

use crate::domain::DomainError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(e) => AppError::Domain(e),
            StoreError::Database(e) => AppError::Database(e),
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// Error body for the calling layer
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AppError {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Domain(e) => e.code(),
            AppError::Database(_) => "database_error",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
        }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// Render for the calling layer. Infrastructure details are logged and
    /// withheld.
    pub fn to_response(&self) -> ErrorResponse {
        let details = match self {
            AppError::Domain(e) => Some(e.to_string()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                None
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                None
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                None
            }
        };

        ErrorResponse {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_store_domain_error_passes_through() {
        let err: AppError = StoreError::Domain(DomainError::insufficient_funds(
            Decimal::new(55, 0),
            Decimal::new(10, 0),
        ))
        .into();

        assert_eq!(err.error_code(), "insufficient_funds");
        assert!(matches!(
            err.domain(),
            Some(DomainError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err: AppError = StoreError::Unavailable("audit log".to_string()).into();
        let response = err.to_response();

        assert_eq!(response.error_code, "internal_error");
        assert!(response.details.is_none());
    }
}
