//! Uniform response wrappers shared by every admin route.
//!
//! Success bodies are `{"data": ...}` (plus `"message"` when one is given),
//! error bodies are `{"code": ..., "error": ...}`. Handlers return an
//! [`ActionResponse`], which is either a JSON envelope or a downloadable file.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status: StatusCode,
    pub message: String,
    pub data: Option<Value>,
    pub groups: Option<Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EnvelopeBody {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn success(
        status: StatusCode,
        message: impl Into<String>,
        data: Option<Value>,
        groups: Option<Vec<String>>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            data,
            groups,
        }
    }

    pub fn ok(data: Value) -> Self {
        Self::success(StatusCode::OK, "", Some(data), None)
    }

    /// 201 with a payload, used by Add (`[newId]`).
    pub fn created(data: Value) -> Self {
        Self::success(StatusCode::CREATED, "", Some(data), None)
    }

    /// 201 without a payload, used by Edit.
    pub fn accepted_empty() -> Self {
        Self::success(StatusCode::CREATED, "", None, None)
    }

    pub fn no_content() -> Self {
        Self::success(StatusCode::NO_CONTENT, "", None, None)
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn body(&self) -> EnvelopeBody {
        EnvelopeBody {
            message: self.message.clone(),
            data: self.data.clone(),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        if self.status == StatusCode::NO_CONTENT {
            return self.status.into_response();
        }

        if let Some(groups) = &self.groups {
            tracing::trace!(groups = ?groups, "serialized with groups");
        }

        let status = self.status;
        let body = EnvelopeBody {
            message: self.message,
            data: self.data,
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub error: String,
}

impl ErrorEnvelope {
    /// Only called from `AppError::into_response`; call sites raise an
    /// `AppError` instead of building one of these directly.
    pub(crate) fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            error: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileResponse {
    pub bytes: Vec<u8>,
    pub mime: &'static str,
    pub filename: String,
}

impl FileResponse {
    pub fn csv(bytes: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: "text/csv; charset=utf-8",
            filename: filename.into(),
        }
    }
}

impl IntoResponse for FileResponse {
    fn into_response(self) -> Response {
        let disposition = format!("attachment; filename=\"{}\"", self.filename.replace('"', ""));
        let mut response = (StatusCode::OK, self.bytes).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(self.mime));
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        response
    }
}

/// What a dispatched action produced: a JSON envelope or a rendered file.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResponse {
    Json(Envelope),
    File(FileResponse),
}

impl From<Envelope> for ActionResponse {
    fn from(value: Envelope) -> Self {
        ActionResponse::Json(value)
    }
}

impl From<FileResponse> for ActionResponse {
    fn from(value: FileResponse) -> Self {
        ActionResponse::File(value)
    }
}

impl IntoResponse for ActionResponse {
    fn into_response(self) -> Response {
        match self {
            ActionResponse::Json(envelope) => envelope.into_response(),
            ActionResponse::File(file) => file.into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_body_omits_missing_data() {
        let body = serde_json::to_value(Envelope::accepted_empty().body()).unwrap();
        assert_eq!(body, json!({}));
    }

    #[test]
    fn success_body_wraps_payload() {
        let envelope = Envelope::created(json!([7]));
        assert_eq!(envelope.status, StatusCode::CREATED);
        let body = serde_json::to_value(envelope.body()).unwrap();
        assert_eq!(body, json!({"data": [7]}));
    }

    #[test]
    fn message_is_emitted_only_when_set() {
        let envelope = Envelope::success(StatusCode::OK, "done", Some(json!(1)), None);
        let body = serde_json::to_value(envelope.body()).unwrap();
        assert_eq!(body, json!({"message": "done", "data": 1}));
    }

    #[test]
    fn error_envelope_shape() {
        let body = serde_json::to_value(ErrorEnvelope::error(624, "not found")).unwrap();
        assert_eq!(body, json!({"code": 624, "error": "not found"}));
    }

    #[tokio::test]
    async fn file_response_sets_download_headers() {
        let response = ActionResponse::from(FileResponse::csv(b"a,b\n".to_vec(), "credit.csv")).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
            "attachment; filename=\"credit.csv\""
        );
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
    }

    #[tokio::test]
    async fn no_content_has_empty_body() {
        let response = Envelope::no_content().into_response();
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert!(bytes.is_empty());
    }
}
