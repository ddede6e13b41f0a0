//! Filebay server binary.
//!
//! A small HTTP file-storage service: clients upload named files, list
//! them, download them, and read operational counters. The main entry
//! point builds the Axum router around the storage accessor and starts
//! the listener with graceful shutdown.

mod atomic;
mod background;
mod config;
mod error;
mod files;
mod http;
mod locking;
mod logging;
mod meta;
mod metrics;
mod storage;
mod version;

use axum::extract::{DefaultBodyLimit, Extension, connect_info::ConnectInfo};
use axum::http::Request;
use axum::routing::get;
use axum::{Router, middleware};
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
use crate::http::build_cors_layer;
use crate::storage::Storage;

shadow!(build);

/// Starts the Filebay server and blocks until shutdown.
#[tokio::main]
async fn main() -> Result<(), std::io::Error> {
    logging::init_logging();

    let args = Args::parse();
    let storage = Arc::new(Storage::open(PathBuf::from(&args.storage_dir)).await?);
    info!(
        root = %storage.root_path().display(),
        files = storage.stored_total(),
        "storage ready"
    );

    let mut app = Router::new()
        .route("/", get(meta::service_info))
        .route("/files", get(files::list_files).post(files::upload_file))
        .route("/files/{filename}", get(files::download_file))
        .route("/health", get(meta::health_check))
        .route("/metrics", get(metrics::get_metrics))
        .route("/version", get(version::get_version_info))
        .layer(DefaultBodyLimit::max(args.upload_max_size as usize))
        .layer(middleware::from_fn(http::add_security_headers))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    let connect_ip = request
                        .extensions()
                        .get::<ConnectInfo<SocketAddr>>()
                        .map(|ConnectInfo(addr)| addr.ip());
                    let client_ip = http::resolve_client_ip(request.headers(), connect_ip)
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
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .layer(Extension(storage.clone()));

    if let Some(cors_layer) = build_cors_layer(args.cors_origins.as_deref()) {
        app = app.layer(cors_layer);
    }

    let host = args
        .host
        .parse::<IpAddr>()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string()))?;
    let addr = SocketAddr::new(host, args.port);
    let handle = Handle::new();

    info!("🚀 Starting HTTP server at {}", addr);
    spawn_background_tasks(storage, Duration::from_secs(args.temp_ttl_secs));

    let server = axum_server::bind(addr)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());

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
