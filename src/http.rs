//! HTTP 辅助工具：路由组装、CORS、安全头与请求头读取。

use axum::body::Body as AxumBody;
use axum::extract::{DefaultBodyLimit, Extension};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use axum::routing::any;
use axum::{Router, middleware, response::Response};
use std::net::IpAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use crate::config::{FILE_NAME_HEADER, UPLOAD_ID_HEADER};
use crate::dispatch;
use crate::upload::UploadContext;

/// 组装上传端点路由；`/` 与 `/upload` 指向同一处理器。
pub fn build_router(context: Arc<UploadContext>, cors_origins: Option<&str>) -> Router {
    Router::new()
        .route(
            "/",
            any(dispatch::handle_upload).layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/upload",
            any(dispatch::handle_upload).layer(DefaultBodyLimit::disable()),
        )
        .layer(middleware::from_fn(add_security_headers))
        .layer(Extension(context))
        .layer(build_cors_layer(cors_origins))
}

/// 构建 CORS Layer；未配置来源列表时允许任意来源。
pub fn build_cors_layer(cors_origins: Option<&str>) -> CorsLayer {
    let origins = cors_origins
        .unwrap_or_default()
        .split(',')
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty() && *origin != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "invalid cors origin");
                None
            }
        })
        .collect::<Vec<_>>();

    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST])
        .allow_headers([
            CONTENT_TYPE,
            CONTENT_RANGE,
            CONTENT_DISPOSITION,
            HeaderName::from_static(FILE_NAME_HEADER),
            HeaderName::from_static(UPLOAD_ID_HEADER),
        ])
}

/// 读取请求头为字符串；非 UTF-8 字节按替换字符处理。
pub fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

/// 从 `x-forwarded-for` 解析客户端 IP。
pub fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<IpAddr>().ok())
}

/// 添加基础安全响应头。
pub async fn add_security_headers(
    request: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, StatusCode> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        axum::http::header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        axum::http::header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    Ok(response)
}
