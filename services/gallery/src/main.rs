mod config;
mod events;
mod gallery;
mod materializer;
mod object_store;
mod path_tree;
mod retractor;
mod thumbnail;
mod tree_index;

use anyhow::{Context, Result};
use config::Config;
use events::EventHandlers;
use gallery::{start_api_server, AppState, GalleryQuery};
use materializer::Materializer;
use object_store::S3ObjectStore;
use retractor::Retractor;
use std::sync::Arc;
use thumbnail::ThumbnailPipeline;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "Starting gallery service");

    // Initialize metrics
    init_metrics(config.service.metrics_port)?;

    // Initialize components
    let index: Arc<dyn tree_index::TreeIndex> = Arc::new(
        tree_index::DynamoTreeIndex::new(&config.index)
            .await
            .context("Failed to initialize tree index")?,
    );

    let images: Arc<dyn object_store::ObjectStore> = Arc::new(
        S3ObjectStore::new(&config.s3, config.s3.image_bucket.clone())
            .await
            .context("Failed to initialize image store")?,
    );

    let thumbs: Arc<dyn object_store::ObjectStore> = Arc::new(
        S3ObjectStore::new(&config.s3, config.s3.thumb_bucket.clone())
            .await
            .context("Failed to initialize thumbnail store")?,
    );

    let handlers = Arc::new(EventHandlers::new(
        Materializer::new(index.clone(), config.gallery.max_ancestor_depth),
        Retractor::new(index.clone(), thumbs.clone(), config.thumbnail.max_width),
        ThumbnailPipeline::new(images.clone(), thumbs.clone(), config.thumbnail.clone()),
    ));

    let query = Arc::new(GalleryQuery::new(
        index,
        images,
        thumbs,
        config.thumbnail.max_width,
        config.thumbnail_url_expiry(),
        config.download_url_expiry(),
    ));

    let api_state = AppState { query, handlers };

    // Spawn API server task
    let api_config = config.api.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = start_api_server(api_state, &api_config).await {
            error!(error = %e, "API server error");
        }
    });

    info!("Gallery service started successfully");

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutting down gallery service");

    api_handle.abort();

    info!("Gallery service stopped");

    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Initialize Prometheus metrics exporter
fn init_metrics(port: u16) -> Result<()> {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();

    builder
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus metrics exporter")?;

    info!(port = port, "Prometheus metrics exporter started");

    Ok(())
}

/// Wait for shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
