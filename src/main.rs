use actix_web::{web, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cargas::{
    carga_registry::BatchRegistry,
    carga_repository::CargaRepository,
    carga_service::CargaService,
    carga_store::{BatchStore, InMemoryBatchStore},
};
use crate::commons::{file_utils, ingestion_service::IngestionService};
use crate::config::AppConfig;
use crate::workers::BatchMetrics;

mod cargas;
mod commons;
mod config;
mod models;
mod workers;

fn startup_error(message: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, message.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing with JSON format
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}", e);
            return Err(startup_error("Failed to load configuration"));
        }
    };

    file_utils::init_upload_dir(&config.upload_dir).await?;
    info!("Local backups will be written to {}", config.upload_dir.display());

    let store: Arc<dyn BatchStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await
                .map_err(startup_error)?;

            let repository = CargaRepository::new(pool);
            repository.migrate().await.map_err(startup_error)?;
            info!("Using Postgres batch store");
            Arc::new(repository)
        }
        None => {
            warn!("DATABASE_URL not set, batches are kept in memory only");
            Arc::new(InMemoryBatchStore::new())
        }
    };

    let ingestion = IngestionService::new(&config.ingestion_api_base, config.http_timeout)
        .map_err(startup_error)?;

    let metrics = Arc::new(BatchMetrics::new());

    // Periodic metrics report
    let metrics_logger = metrics.clone();
    let interval = config.metrics_log_interval;
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            metrics_logger.log_metrics();
        }
    });

    let service = web::Data::new(CargaService::new(
        BatchRegistry::new(store),
        ingestion,
        config.upload_dir.clone(),
        metrics.clone(),
        config.keep_local_backup_default,
    ));

    let server = HttpServer::new(move || {
        App::new()
            .app_data(service.clone())
            .app_data(web::JsonConfig::default().limit(64 * 1024 * 1024))
            .service(web::scope("/v1").configure(cargas::carga_controller::configure))
    })
    .bind((config.host.as_str(), config.port))?
    .run();

    let server_handle = server.handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received, starting graceful shutdown");
                // In-flight passes run to completion; there is no mid-batch cancellation
                server_handle.stop(true).await;
                metrics.log_metrics();
                info!("Graceful shutdown completed");
            }
            Err(e) => warn!("Error waiting for interrupt signal: {}", e),
        }
    });

    info!("API server starting at {}:{}", config.host, config.port);
    server.await?;

    Ok(())
}
