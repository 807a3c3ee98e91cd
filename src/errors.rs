use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::envelope::ErrorEnvelope;

pub type AppResult<T> = Result<T, AppError>;

/// Stable machine-readable codes carried in the `code` field of error bodies.
pub mod codes {
    pub const VALIDATION: u16 = 600;
    pub const UNAUTHENTICATED: u16 = 610;
    pub const FORBIDDEN: u16 = 611;
    pub const NOT_FOUND: u16 = 624;
    pub const CSV_REPORT_NOT_FOUND: u16 = 625;
    pub const CSV_REPORT_HASH_EXPIRED: u16 = 626;
    pub const REPORT_NOT_FOUND: u16 = 627;
    pub const CONFLICT: u16 = 630;
    pub const CONFIGURATION: u16 = 650;
    pub const INTERNAL: u16 = 500;
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("csv report not found")]
    CsvReportNotFound,
    #[error("csv report link expired")]
    CsvReportHashExpired,
    #[error("report not found: {0}")]
    ReportNotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("token error: {0}")]
    Token(String),
    #[error("database error")]
    Database(sqlx::Error),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn report_not_found(message: impl Into<String>) -> Self {
        Self::ReportNotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn token(err: impl Into<String>) -> Self {
        Self::Token(err.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) | AppError::Token(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::CsvReportNotFound | AppError::ReportNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::CsvReportHashExpired => StatusCode::GONE,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Configuration(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            AppError::Validation(_) => codes::VALIDATION,
            AppError::Unauthorized(_) | AppError::Token(_) => codes::UNAUTHENTICATED,
            AppError::Forbidden(_) => codes::FORBIDDEN,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::CsvReportNotFound => codes::CSV_REPORT_NOT_FOUND,
            AppError::CsvReportHashExpired => codes::CSV_REPORT_HASH_EXPIRED,
            AppError::ReportNotFound(_) => codes::REPORT_NOT_FOUND,
            AppError::Conflict(_) => codes::CONFLICT,
            AppError::Configuration(_) => codes::CONFIGURATION,
            AppError::Database(_) | AppError::Internal(_) => codes::INTERNAL,
        }
    }

    /// Text sent to the client. Storage and internal failures are reduced to a
    /// generic message; the detail only goes to the log.
    fn public_message(&self) -> String {
        match self {
            AppError::Database(_) | AppError::Internal(_) | AppError::Configuration(_) => {
                "internal server error".to_string()
            }
            AppError::Token(_) => "invalid or expired token".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(code = self.code(), error = ?self, "request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "request rejected");
        }

        let payload = ErrorEnvelope::error(self.code(), self.public_message());

        (status, Json(payload)).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(value: sqlx::Error) -> Self {
        match value.as_database_error() {
            Some(db) if db.is_unique_violation() => Self::Conflict("duplicate entry".to_string()),
            _ => Self::Database(value),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Internal(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_failures_are_distinguishable() {
        let missing = AppError::CsvReportNotFound;
        let expired = AppError::CsvReportHashExpired;

        assert_ne!(missing.code(), expired.code());
        assert_ne!(missing.status(), expired.status());
        assert_ne!(missing.code(), AppError::not_found("credit 1").code());
    }

    #[test]
    fn storage_errors_do_not_leak_detail() {
        let err = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(err.public_message(), "internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let err = AppError::internal("disk I/O error at /var/lib/admin.db");
        assert!(!err.public_message().contains("/var/lib"));
    }

    #[test]
    fn domain_errors_keep_their_message() {
        let err = AppError::not_found("credit 42");
        assert_eq!(err.public_message(), "not found: credit 42");
        assert_eq!(err.code(), 624);
    }
}
