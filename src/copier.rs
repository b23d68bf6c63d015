//! 有界内存的流式拷贝：覆盖写或追加写。

use axum::body::Body as AxumBody;
use futures_util::TryStreamExt;
use http_body_util::BodyExt;
use std::io;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::io::StreamReader;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteMode {
    Truncate,
    Append,
}

/// 将 `source` 全部写入 `destination`，返回本次写入的字节数。
///
/// 失败时不回滚已写入的部分，客户端可重发同一区间。
pub async fn copy<R>(source: &mut R, destination: &Path, mode: WriteMode) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut options = OpenOptions::new();
    match mode {
        WriteMode::Truncate => options.write(true).create(true).truncate(true),
        WriteMode::Append => options.append(true).create(true),
    };
    let mut file = options.open(destination).await?;
    let written = tokio::io::copy(source, &mut file).await?;
    file.flush().await?;
    Ok(written)
}

/// 将请求体转换为 `AsyncRead`，不缓存完整内容。
pub fn body_reader(body: AxumBody) -> impl AsyncRead + Unpin + Send {
    let stream = BodyExt::into_data_stream(body).map_err(io::Error::other);
    StreamReader::new(stream)
}
