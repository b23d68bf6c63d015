//! AxoUpload server binary.
//!
//! A single HTTP endpoint that accepts multipart form uploads, resumable
//! `Content-Range` chunk uploads, and raw binary uploads, and stores them in a
//! flat target directory under sanitized, collision-free names.

mod background;
mod binary;
mod config;
mod copier;
mod dispatch;
mod error;
mod http;
mod locking;
mod logging;
mod multipart;
mod response;
mod resumable;
mod sanitize;
mod sessions;
mod storage;
mod upload;

use axum::extract::connect_info::ConnectInfo;
use axum::http::Request;
use axum_server::Handle;
use clap::Parser;
use shadow_rs::shadow;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, info, info_span};

use crate::background::spawn_background_tasks;
use crate::config::Args;
use crate::http::{build_router, extract_forwarded_ip};
use crate::storage::Storage;
use crate::upload::{UploadConfig, UploadContext, upload_temp_root};

shadow!(build);

/// Starts the upload server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage_root = PathBuf::from(&args.storage_dir);
    let upload_config = UploadConfig {
        max_file_size: args.max_file_size,
        temp_dir: upload_temp_root(&storage_root),
        temp_ttl: Duration::from_secs(args.temp_ttl_secs),
    };
    let context = Arc::new(UploadContext::new(Storage::new(storage_root), upload_config));
    context.prepare_dirs().await?;
    info!(
        storage_dir = %context.storage.root_path().display(),
        temp_dir = %context.config.temp_dir.display(),
        max_file_size = context.config.max_file_size,
        "upload directories ready"
    );

    let app = build_router(context.clone(), args.cors_origins.as_deref()).layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let connect_ip = request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip());
                let client_ip = extract_forwarded_ip(request.headers())
                    .or(connect_ip)
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| "unknown".to_string());

                info_span!(
                    env!("CARGO_CRATE_NAME"),
                    client_ip,
                    method = ?request.method(),
                    path = ?request.uri().path(),
                )
            })
            .on_request(DefaultOnRequest::new().level(Level::DEBUG))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("🚀 Starting HTTP server at {}", addr);

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

    spawn_background_tasks(context);
    tokio::select! {
        result = server => result?,
        _ = shutdown_signal(handle) => {}
    }

    Ok(())
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received termination signal shutting down");
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
