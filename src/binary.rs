//! 原始二进制上传：请求体即文件内容，文件名来自 `X-File-Name`。

use axum::body::Body as AxumBody;
use axum::http::HeaderMap;
use tracing::info;

use crate::config::FILE_NAME_HEADER;
use crate::copier::{self, WriteMode};
use crate::error::UploadError;
use crate::http::{content_length, header_string};
use crate::response::Stored;
use crate::sanitize::sanitize;
use crate::upload::UploadContext;

pub async fn store_binary(
    context: &UploadContext,
    headers: &HeaderMap,
    body: AxumBody,
) -> Result<Stored, UploadError> {
    let raw_name = header_string(headers, FILE_NAME_HEADER).ok_or_else(|| {
        UploadError::Validation("X-File-Name header is required for binary uploads".into())
    })?;
    if let Some(declared) = content_length(headers)
        && context.config.exceeds_limit(declared)
    {
        return Err(UploadError::SizeLimit);
    }

    let filename = sanitize(&raw_name, &context.storage).await;
    let target = context.storage.resolve_file(filename.as_str()).await?;
    let mut reader = copier::body_reader(body);
    let size = copier::copy(&mut reader, &target, WriteMode::Truncate)
        .await
        .map_err(|err| UploadError::io("Failed to write uploaded file", err))?;

    info!(filename = %filename, bytes = size, "binary upload stored");
    Ok(Stored::File {
        filename: filename.into_string(),
        size,
    })
}
