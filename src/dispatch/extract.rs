use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use serde::de::DeserializeOwned;

use crate::errors::AppError;

/// `:id` path segment restricted to ASCII digits.
///
/// Anything else is rejected here, before a service method is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for NumericId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::validation("missing id"))?;

        parse_numeric_id(&raw).map(NumericId)
    }
}

pub fn parse_numeric_id(raw: &str) -> Result<i64, AppError> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::validation(format!("invalid id '{raw}'")));
    }
    raw.parse::<i64>()
        .map_err(|_| AppError::validation(format!("id '{raw}' is out of range")))
}

/// JSON body extractor that reports the failing path (`[2]`, `amount`, ...)
/// and answers with the standard error envelope instead of axum's plain text.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(format!("unreadable body: {e}")))?;

        if bytes.is_empty() {
            return Err(AppError::validation("request body is empty"));
        }

        let deserializer = &mut serde_json::Deserializer::from_slice(&bytes);
        serde_path_to_error::deserialize(deserializer)
            .map(JsonBody)
            .map_err(|e| {
                let path = e.path().to_string();
                if path == "." {
                    AppError::validation(format!("invalid JSON body: {}", e.inner()))
                } else {
                    AppError::validation(format!("invalid JSON body at {path}: {}", e.inner()))
                }
            })
    }
}
