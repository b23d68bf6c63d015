//! 上传结果记录与 JSON 响应组装。

use axum::response::{IntoResponse, Json as JsonResponse, Response};
use serde::Serialize;

use crate::error::UploadError;

/// 单个文件写入成功后的结果。
#[derive(Debug, PartialEq, Eq)]
pub enum Stored {
    File { filename: String, size: u64 },
    Chunk {
        filename: String,
        bytes_received: u64,
        complete: bool,
    },
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes_received: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadResult {
    pub fn failed(error: &UploadError) -> Self {
        Self {
            success: false,
            filename: None,
            size: None,
            bytes_received: None,
            complete: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<Stored> for UploadResult {
    fn from(stored: Stored) -> Self {
        let (filename, size, bytes_received, complete) = match stored {
            Stored::File { filename, size } => (filename, Some(size), None, None),
            Stored::Chunk {
                filename,
                bytes_received,
                complete,
            } => (filename, None, Some(bytes_received), Some(complete)),
        };
        Self {
            success: true,
            filename: Some(filename),
            size,
            bytes_received,
            complete,
            error: None,
        }
    }
}

impl From<Result<Stored, UploadError>> for UploadResult {
    fn from(result: Result<Stored, UploadError>) -> Self {
        match result {
            Ok(stored) => stored.into(),
            Err(err) => UploadResult::failed(&err),
        }
    }
}

/// 单文件模式返回对象，multipart 模式返回数组。
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum UploadResponse {
    Single(UploadResult),
    Batch(Vec<UploadResult>),
}

impl UploadResponse {
    pub fn single(result: impl Into<UploadResult>) -> Self {
        UploadResponse::Single(result.into())
    }

    pub fn batch<I>(results: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<UploadResult>,
    {
        UploadResponse::Batch(results.into_iter().map(Into::into).collect())
    }
}

impl IntoResponse for UploadResponse {
    fn into_response(self) -> Response {
        JsonResponse(self).into_response()
    }
}
