//! 断点续传：按 `Content-Range` 覆盖或追加写入，并判断是否传输完成。

use axum::body::Body as AxumBody;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_RANGE;
use std::io;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use crate::config::{DEFAULT_LOCK_WAIT_TIMEOUT_SECS, FILE_NAME_HEADER, UPLOAD_ID_HEADER};
use crate::copier::{self, WriteMode};
use crate::error::UploadError;
use crate::http::header_string;
use crate::response::Stored;
use crate::sanitize::{sanitize, sanitize_in_place};
use crate::upload::UploadContext;

/// `bytes <start>-<end>/<total>` 形式的区间描述。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContentRange {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

pub fn parse_content_range(value: &str) -> Option<ContentRange> {
    let ranges = value.trim().strip_prefix("bytes ")?.trim_start();
    let (start, rest) = ranges.split_once('-')?;
    let (end, total) = rest.split_once('/')?;
    Some(ContentRange {
        start: parse_digits(start)?,
        end: parse_digits(end)?,
        total: parse_digits(total)?,
    })
}

fn parse_digits(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

pub async fn store_chunk(
    context: &UploadContext,
    headers: &HeaderMap,
    query_filename: Option<&str>,
    body: AxumBody,
) -> Result<Stored, UploadError> {
    let range = headers
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_range)
        .ok_or_else(|| UploadError::Validation("Invalid Content-Range header".into()))?;
    if context.config.exceeds_limit(range.total) {
        return Err(UploadError::SizeLimit);
    }

    let raw_name = header_string(headers, FILE_NAME_HEADER)
        .or_else(|| query_filename.map(str::to_string))
        .unwrap_or_else(|| format!("chunk_{}", chrono::Utc::now().timestamp()));
    let session_key = header_string(headers, UPLOAD_ID_HEADER).unwrap_or_else(|| raw_name.clone());
    let filename = session_filename(context, &session_key, &raw_name, range).await;

    let _guard = context
        .locks
        .lock_with_timeout(
            &filename,
            Duration::from_secs(DEFAULT_LOCK_WAIT_TIMEOUT_SECS),
        )
        .await
        .map_err(|_| {
            UploadError::io(
                "Failed to write chunk: path locked",
                io::Error::from(io::ErrorKind::TimedOut),
            )
        })?;
    let target = context.storage.resolve_file(&filename).await?;
    let mode = if range.start == 0 {
        WriteMode::Truncate
    } else {
        WriteMode::Append
    };
    let mut reader = copier::body_reader(body);
    let written = copier::copy(&mut reader, &target, mode)
        .await
        .map_err(|err| UploadError::io("Failed to write chunk", err))?;

    let bytes_received = fs::metadata(&target)
        .await
        .map_err(|err| UploadError::io("Failed to read upload progress", err))?
        .len();
    let complete = bytes_received >= range.total;
    debug!(
        filename,
        start = range.start,
        end = range.end,
        bytes = written,
        complete,
        "chunk written"
    );
    if complete {
        context.sessions.finish(&session_key).await;
        info!(filename, bytes = bytes_received, "resumable upload complete");
    }

    Ok(Stored::Chunk {
        filename,
        bytes_received,
        complete,
    })
}

/// 返回本次分片应写入的文件名，并在会话表中固定它。
///
/// 首个分片会重新做重名规避，除非同一会话正在重传首片；
/// 后续分片沿用已固定的名称，会话丢失时退回到不做重名规避的清洗结果。
///
/// 会话丢失（进程重启或空闲回收）后，续传分片可能追加到一个同名的无关文件：
/// 例如首片写入了 `video_1.mp4`，后续分片却追加到已存在的 `video.mp4`。
async fn session_filename(
    context: &UploadContext,
    session_key: &str,
    raw_name: &str,
    range: ContentRange,
) -> String {
    if let Some(session) = context.sessions.lookup(session_key).await
        && (range.start > 0 || session.total_size == range.total)
    {
        return session.filename;
    }

    let filename = if range.start == 0 {
        sanitize(raw_name, &context.storage).await
    } else {
        sanitize_in_place(raw_name, &context.storage).await
    };
    context
        .sessions
        .pin(session_key, filename.as_str(), range.total)
        .await;
    filename.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    use crate::upload::tests::{make_context, make_context_with_limit};

    fn chunk_headers(range: &str, name: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_RANGE,
            HeaderValue::from_str(range).expect("range header"),
        );
        if let Some(name) = name {
            headers.insert(FILE_NAME_HEADER, HeaderValue::from_static(name));
        }
        headers
    }

    #[test]
    fn parses_content_range() {
        assert_eq!(
            parse_content_range("bytes 0-999/2000"),
            Some(ContentRange {
                start: 0,
                end: 999,
                total: 2000
            })
        );
        assert_eq!(parse_content_range("bytes 0-999/*"), None);
        assert_eq!(parse_content_range("bytes=0-999/2000"), None);
        assert_eq!(parse_content_range("bytes +1-2/3"), None);
        assert_eq!(parse_content_range("bytes 1-2"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[tokio::test]
    async fn two_chunks_assemble_complete_file() {
        let (_temp, context) = make_context();
        let first = vec![1u8; 1000];
        let second = vec![2u8; 1000];

        let stored = store_chunk(
            &context,
            &chunk_headers("bytes 0-999/2000", Some("video.mp4")),
            None,
            AxumBody::from(first.clone()),
        )
        .await
        .expect("first chunk");
        assert_eq!(
            stored,
            Stored::Chunk {
                filename: "video.mp4".into(),
                bytes_received: 1000,
                complete: false
            }
        );
        let target = context.storage.root_path().join("video.mp4");
        assert_eq!(fs::metadata(&target).await.expect("metadata").len(), 1000);

        let stored = store_chunk(
            &context,
            &chunk_headers("bytes 1000-1999/2000", Some("video.mp4")),
            None,
            AxumBody::from(second.clone()),
        )
        .await
        .expect("second chunk");
        assert_eq!(
            stored,
            Stored::Chunk {
                filename: "video.mp4".into(),
                bytes_received: 2000,
                complete: true
            }
        );
        let contents = fs::read(&target).await.expect("read file");
        assert_eq!(contents.len(), 2000);
        assert_eq!(&contents[..1000], &first[..]);
        assert_eq!(&contents[1000..], &second[..]);
        assert!(context.sessions.lookup("video.mp4").await.is_none());
    }

    #[tokio::test]
    async fn existing_file_pins_suffixed_name_for_all_chunks() {
        let (_temp, context) = make_context();
        fs::write(context.storage.root_path().join("video.mp4"), b"old")
            .await
            .expect("seed file");

        let first = store_chunk(
            &context,
            &chunk_headers("bytes 0-1/4", Some("video.mp4")),
            None,
            AxumBody::from("ab"),
        )
        .await
        .expect("first chunk");
        let second = store_chunk(
            &context,
            &chunk_headers("bytes 2-3/4", Some("video.mp4")),
            None,
            AxumBody::from("cd"),
        )
        .await
        .expect("second chunk");

        let Stored::Chunk { filename, .. } = first else {
            panic!("expected chunk result");
        };
        assert_eq!(filename, "video_1.mp4");
        assert_eq!(
            second,
            Stored::Chunk {
                filename: "video_1.mp4".into(),
                bytes_received: 4,
                complete: true
            }
        );
        let old = fs::read(context.storage.root_path().join("video.mp4"))
            .await
            .expect("read existing file");
        assert_eq!(old, b"old");
    }

    #[tokio::test]
    async fn retried_first_chunk_reuses_pinned_name() {
        let (_temp, context) = make_context();
        for _ in 0..2 {
            let stored = store_chunk(
                &context,
                &chunk_headers("bytes 0-2/6", Some("doc.pdf")),
                None,
                AxumBody::from("abc"),
            )
            .await
            .expect("first chunk");
            assert_eq!(
                stored,
                Stored::Chunk {
                    filename: "doc.pdf".into(),
                    bytes_received: 3,
                    complete: false
                }
            );
        }
    }

    #[tokio::test]
    async fn filename_falls_back_to_query_then_generated() {
        let (_temp, context) = make_context();
        let stored = store_chunk(
            &context,
            &chunk_headers("bytes 0-2/3", None),
            Some("from query.txt"),
            AxumBody::from("abc"),
        )
        .await
        .expect("chunk");
        let Stored::Chunk { filename, .. } = stored else {
            panic!("expected chunk result");
        };
        assert_eq!(filename, "from_query.txt");

        let stored = store_chunk(
            &context,
            &chunk_headers("bytes 0-2/3", None),
            None,
            AxumBody::from("abc"),
        )
        .await
        .expect("chunk");
        let Stored::Chunk { filename, .. } = stored else {
            panic!("expected chunk result");
        };
        assert!(filename.starts_with("chunk_"), "{filename}");
    }

    #[tokio::test]
    async fn upload_id_header_keys_the_session() {
        let (_temp, context) = make_context();
        let mut headers = chunk_headers("bytes 0-1/4", Some("a.bin"));
        headers.insert(UPLOAD_ID_HEADER, HeaderValue::from_static("session-1"));
        store_chunk(&context, &headers, None, AxumBody::from("ab"))
            .await
            .expect("first chunk");

        let session = context.sessions.lookup("session-1").await.expect("session");
        assert_eq!(session.filename, "a.bin");
        assert!(context.sessions.lookup("a.bin").await.is_none());
    }

    #[tokio::test]
    async fn lost_session_appends_to_in_place_name() {
        let (_temp, context) = make_context();
        fs::write(context.storage.root_path().join("video.mp4"), b"old")
            .await
            .expect("seed file");
        store_chunk(
            &context,
            &chunk_headers("bytes 0-1/4", Some("video.mp4")),
            None,
            AxumBody::from("ab"),
        )
        .await
        .expect("first chunk");
        context.sessions.finish("video.mp4").await;

        let stored = store_chunk(
            &context,
            &chunk_headers("bytes 2-3/4", Some("video.mp4")),
            None,
            AxumBody::from("cd"),
        )
        .await
        .expect("continuation chunk");
        assert_eq!(
            stored,
            Stored::Chunk {
                filename: "video.mp4".into(),
                bytes_received: 5,
                complete: true
            }
        );
        let existing = fs::read(context.storage.root_path().join("video.mp4"))
            .await
            .expect("read existing file");
        assert_eq!(existing, b"oldcd");
    }

    #[tokio::test]
    async fn invalid_range_is_rejected_without_writing() {
        let (_temp, context) = make_context();
        let result = store_chunk(
            &context,
            &chunk_headers("bytes */2000", Some("x.bin")),
            None,
            AxumBody::from("abc"),
        )
        .await;
        match result {
            Err(UploadError::Validation(message)) => {
                assert_eq!(message, "Invalid Content-Range header")
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!context.storage.exists("x.bin").await);
    }

    #[tokio::test]
    async fn declared_total_over_limit_is_rejected() {
        let (_temp, context) = make_context_with_limit(10);
        let result = store_chunk(
            &context,
            &chunk_headers("bytes 0-2/11", Some("x.bin")),
            None,
            AxumBody::from("abc"),
        )
        .await;
        assert!(matches!(result, Err(UploadError::SizeLimit)));
        assert!(!context.storage.exists("x.bin").await);
    }
}
