//! 上传端点：识别传输模式并分发到对应处理器。

use axum::body::Body as AxumBody;
use axum::extract::{Extension, FromRequest, Multipart, Query, Request};
use axum::http::header::{CONTENT_RANGE, CONTENT_TYPE};
use axum::http::{HeaderMap, Method};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::binary::store_binary;
use crate::error::ApiError;
use crate::multipart::{stage_form, store_form};
use crate::response::UploadResponse;
use crate::resumable::store_chunk;
use crate::upload::UploadContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferMode {
    Multipart,
    Resumable,
    RawBinary,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct UploadQuery {
    filename: Option<String>,
}

/// 根据请求头判断传输模式。
pub fn classify(headers: &HeaderMap) -> TransferMode {
    let is_multipart = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("multipart/form-data")
        })
        .unwrap_or(false);
    if is_multipart {
        TransferMode::Multipart
    } else {
        classify_stream(headers)
    }
}

fn classify_stream(headers: &HeaderMap) -> TransferMode {
    if headers.contains_key(CONTENT_RANGE) {
        TransferMode::Resumable
    } else {
        TransferMode::RawBinary
    }
}

/// 唯一的上传端点，只接受 POST。
pub async fn handle_upload(
    Extension(context): Extension<Arc<UploadContext>>,
    request: Request,
) -> Result<UploadResponse, ApiError> {
    if request.method() != Method::POST {
        return Err(ApiError::MethodNotAllowed);
    }
    let headers = request.headers().clone();
    let query = Query::<UploadQuery>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();

    let mut mode = classify(&headers);
    debug!(mode = ?mode, "upload request received");
    let body = if mode == TransferMode::Multipart {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|err| {
                warn!(error = %err.body_text(), "invalid multipart request");
                ApiError::BadRequest("Invalid multipart body".into())
            })?;
        let form = stage_form(&context, multipart).await?;
        if !form.is_empty() {
            let results = store_form(&context, form).await;
            return Ok(UploadResponse::batch(results));
        }
        // 没有文件字段时按流式上传处理，此时请求体已被表单解析消费
        mode = classify_stream(&headers);
        AxumBody::empty()
    } else {
        request.into_body()
    };

    let result = match mode {
        TransferMode::Resumable => {
            store_chunk(&context, &headers, query.filename.as_deref(), body).await
        }
        _ => store_binary(&context, &headers, body).await,
    };
    Ok(UploadResponse::single(result))
}
