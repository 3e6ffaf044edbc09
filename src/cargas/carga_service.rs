use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::{
    cargas::{
        carga_registry::BatchRegistry,
        error::CargaResult,
        model::{Batch, BatchDetail, InputFile},
    },
    commons::ingestion_service::IngestionService,
    workers::{
        metrics::{BatchMetrics, MetricsSnapshot},
        retry_worker::{RetryOutcome, RetryWorker},
        upload_worker::{FileUploadWorker, PassSummary, Progress},
    },
};

#[derive(Debug, Serialize)]
pub struct UploadResult {
    pub carga: BatchDetail,
    pub summary: PassSummary,
}

#[derive(Debug, Serialize)]
pub struct RetryResult {
    pub outcome: RetryOutcome,
    pub carga: BatchDetail,
}

/// Entry point for everything the dashboard does with batches.
#[derive(Clone)]
pub struct CargaService {
    registry: BatchRegistry,
    ingestion: IngestionService,
    uploader: FileUploadWorker,
    retrier: RetryWorker,
    metrics: Arc<BatchMetrics>,
    keep_backup_default: bool,
}

impl CargaService {
    pub fn new(
        registry: BatchRegistry,
        ingestion: IngestionService,
        upload_dir: PathBuf,
        metrics: Arc<BatchMetrics>,
        keep_backup_default: bool,
    ) -> Self {
        let uploader = FileUploadWorker::new(
            registry.clone(),
            ingestion.clone(),
            upload_dir,
            metrics.clone(),
        );
        let retrier = RetryWorker::new(uploader.clone(), metrics.clone());

        Self {
            registry,
            ingestion,
            uploader,
            retrier,
            metrics,
            keep_backup_default,
        }
    }

    pub async fn next_batch_id(&self) -> CargaResult<String> {
        Ok(self.ingestion.issue_batch_id().await?)
    }

    /// Create a batch (asking the ingestion API for an id unless one is given)
    /// and run the upload pass over `files`.
    pub async fn start_upload(
        &self,
        batch_id: Option<String>,
        files: Vec<InputFile>,
        keep_backup: Option<bool>,
    ) -> CargaResult<UploadResult> {
        let batch_id = match batch_id.filter(|id| !id.trim().is_empty()) {
            Some(id) => id,
            None => self.next_batch_id().await?,
        };
        let keep_backup = keep_backup.unwrap_or(self.keep_backup_default);

        let batch_id = batch_id.trim().to_string();

        // Locked before the batch exists, so a retry can never see it empty
        let _guard = self.registry.lock_batch(&batch_id).await;
        self.registry.create_batch_with_id(&batch_id).await?;

        info!(carga_id = %batch_id, keep_backup, "Upload requested");
        let summary = self
            .uploader
            .process_batch(&batch_id, files, keep_backup, |p: Progress| {
                debug!(processed = p.processed, total = p.total, "Upload progress {}%", p.percent());
            })
            .await?;

        let carga = self.registry.batch_detail(&batch_id).await?;
        Ok(UploadResult { carga, summary })
    }

    pub async fn retry(&self, batch_id: &str) -> CargaResult<RetryResult> {
        self.registry.require_batch(batch_id).await?;
        let _guard = self.registry.lock_batch(batch_id).await;

        info!(carga_id = %batch_id, "Retry requested");
        let outcome = self
            .retrier
            .retry_batch(batch_id, |p: Progress| {
                debug!(processed = p.processed, total = p.total, "Retry progress {}%", p.percent());
            })
            .await?;

        let carga = self.registry.batch_detail(batch_id).await?;
        Ok(RetryResult { outcome, carga })
    }

    pub async fn list_batches(&self) -> CargaResult<Vec<Batch>> {
        self.registry.list_batches().await
    }

    pub async fn batch_detail(&self, batch_id: &str) -> CargaResult<BatchDetail> {
        self.registry.batch_detail(batch_id).await
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
