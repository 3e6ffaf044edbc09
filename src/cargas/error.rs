use thiserror::Error;

use crate::commons::ingestion_service::IngestionError;

/// Batch-level failures. Per-document failures never end up here.
#[derive(Error, Debug)]
pub enum CargaError {
    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("Document {index} not found in batch {batch_id}")]
    DocumentNotFound { batch_id: String, index: usize },

    #[error("Batch already exists: {0}")]
    DuplicateBatch(String),

    #[error("Invalid batch id: {0:?}")]
    InvalidBatchId(String),

    #[error("Could not obtain batch id: {0}")]
    Ingestion(#[from] IngestionError),

    #[error("Database error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),
}

pub type CargaResult<T> = Result<T, CargaError>;
