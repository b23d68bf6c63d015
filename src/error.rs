//! 请求级错误与单文件上传错误。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde_json::json;
use std::io;
use thiserror::Error;

use crate::storage::StorageError;

/// 直接中断请求的错误，响应体统一为 `{"error": ...}`。
#[derive(Debug)]
pub enum ApiError {
    MethodNotAllowed,
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, JsonResponse(json!({ "error": message }))).into_response()
    }
}

/// 单个文件的失败原因；`Display` 即返回给客户端的 `error` 文本。
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),
    #[error("File too large")]
    SizeLimit,
    #[error("Upload error: {0}")]
    FieldError(u8),
    #[error("{context}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },
}

impl UploadError {
    pub fn io(context: &'static str, source: io::Error) -> Self {
        UploadError::Io { context, source }
    }
}

impl From<StorageError> for UploadError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => UploadError::Validation("Invalid file name".into()),
            StorageError::Io(err) => UploadError::io("Failed to access upload directory", err),
        }
    }
}
