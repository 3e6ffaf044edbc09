use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // HTTP server
    pub host: String,
    pub port: u16,

    // Remote ingestion API
    pub ingestion_api_base: String,
    pub http_timeout: Duration,

    // Local backups used for retries
    pub upload_dir: PathBuf,
    pub keep_local_backup_default: bool,

    // Storage; in-memory when no database is configured
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    pub metrics_log_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,

            ingestion_api_base: env::var("INGESTION_API_BASE")
                .map_err(|_| anyhow::anyhow!("INGESTION_API_BASE must be set"))?,

            http_timeout: Duration::from_secs(
                env::var("HTTP_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "120".to_string())
                    .parse()?,
            ),

            upload_dir: PathBuf::from(
                env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            ),

            keep_local_backup_default: env::var("KEEP_LOCAL_BACKUP_DEFAULT")
                .unwrap_or_else(|_| "true".to_string())
                .parse()?,

            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),

            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,

            metrics_log_interval: Duration::from_secs(
                env::var("METRICS_LOG_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
            ),
        })
    }
}
