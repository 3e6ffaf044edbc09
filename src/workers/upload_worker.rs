use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cargas::{
    carga_registry::BatchRegistry,
    error::CargaResult,
    model::{aggregate_status, BatchStatus, Document, InputFile, RemoteHandles},
};
use crate::commons::{file_utils, ingestion_service::IngestionService};
use crate::workers::{
    error::{DocumentError, DocumentOutcome},
    metrics::BatchMetrics,
};

/// How far a pass has got. Only meant for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

impl Progress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.processed * 100) / self.total) as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Upload,
    Retry,
}

/// Result of one upload or retry pass over a batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PassSummary {
    pub ok: usize,
    pub total: usize,
    pub status: BatchStatus,
    pub comment: String,
    /// `"<original name>: <detail>"` for every document that failed in this pass
    pub failures: Vec<String>,
}

impl PassSummary {
    /// `status` comes from every document in the batch; the `OK=x/y` figure
    /// only counts the documents attempted in this pass.
    pub fn new(kind: PassKind, ok: usize, total: usize, failures: Vec<String>, all_documents: &[Document]) -> Self {
        let status = match aggregate_status(all_documents) {
            BatchStatus::InProgress if failures.is_empty() => BatchStatus::Completed,
            BatchStatus::InProgress => BatchStatus::Error,
            status => status,
        };

        let prefix = match (kind, status) {
            (PassKind::Upload, BatchStatus::Completed) => "upload completed successfully",
            (PassKind::Upload, _) => "upload finished with errors",
            (PassKind::Retry, BatchStatus::Completed) => "retry succeeded",
            (PassKind::Retry, _) => "retry finished with errors",
        };

        Self {
            ok,
            total,
            status,
            comment: format!("{}. OK={}/{}", prefix, ok, total),
            failures,
        }
    }
}

/// FileUploadWorker runs the sequential per-file upload loop for a batch
#[derive(Clone)]
pub struct FileUploadWorker {
    registry: BatchRegistry,
    ingestion: IngestionService,
    upload_dir: PathBuf,
    metrics: Arc<BatchMetrics>,
}

impl FileUploadWorker {
    pub fn new(
        registry: BatchRegistry,
        ingestion: IngestionService,
        upload_dir: PathBuf,
        metrics: Arc<BatchMetrics>,
    ) -> Self {
        Self {
            registry,
            ingestion,
            upload_dir,
            metrics,
        }
    }

    /// Upload `files` into an existing batch, one at a time. Per-file failures
    /// end up on the documents; only batch-level problems are returned as errors.
    #[instrument(skip(self, files, on_progress), fields(carga_id = %batch_id, files = files.len()))]
    pub async fn process_batch<F>(
        &self,
        batch_id: &str,
        files: Vec<InputFile>,
        keep_backup: bool,
        mut on_progress: F,
    ) -> CargaResult<PassSummary>
    where
        F: FnMut(Progress) + Send,
    {
        // Nothing is submitted for a batch we do not know
        self.registry.require_batch(batch_id).await?;
        self.metrics.record_upload_pass();

        let total = files.len();
        let mut ok = 0;
        let mut failures = Vec::new();

        info!("Starting upload of {} files", total);

        for (i, file) in files.into_iter().enumerate() {
            let document = self.process_file(batch_id, file, keep_backup).await;

            if document.is_error() {
                failures.push(format!("{}: {}", document.original_name, document.error_detail));
            } else {
                ok += 1;
            }

            self.registry.append_document(batch_id, document).await?;
            on_progress(Progress {
                processed: i + 1,
                total,
            });
        }

        let documents = self.registry.list_documents(batch_id).await?;
        let summary = PassSummary::new(PassKind::Upload, ok, total, failures, &documents);
        self.registry
            .update_batch_status(batch_id, summary.status, &summary.comment)
            .await?;

        info!(status = summary.status.as_str(), "{}", summary.comment);
        Ok(summary)
    }

    async fn process_file(&self, batch_id: &str, file: InputFile, keep_backup: bool) -> Document {
        let mut document = Document::pending(file.name.clone());

        match self.upload_file(batch_id, file, keep_backup, &mut document).await {
            Ok((handles, size)) => {
                self.metrics.record_document_succeeded();
                document.mark_ok(handles, size);
            }
            Err(e) => {
                warn!(file = %document.original_name, kind = e.kind(), "Document failed: {}", e);
                self.metrics.record_document_failed(&e);
                document.mark_error(e.to_string());
            }
        }

        document
    }

    async fn upload_file(
        &self,
        batch_id: &str,
        file: InputFile,
        keep_backup: bool,
        document: &mut Document,
    ) -> DocumentOutcome<(RemoteHandles, u64)> {
        if file.is_empty() {
            return Err(DocumentError::EmptyInput);
        }
        if !file_utils::has_pdf_extension(&file.name) {
            return Err(DocumentError::NotPdf);
        }

        let size = file.len() as u64;
        let submitted_name = file_utils::unique_submitted_name(&file.name);
        document.submitted_name = submitted_name.clone();
        document.size_bytes = size;

        if keep_backup {
            let path = file_utils::write_backup(&self.upload_dir, &submitted_name, &file.content)
                .await
                .map_err(|e| DocumentError::LocalBackupWrite(e.to_string()))?;
            document.local_backup_path = Some(path.to_string_lossy().into_owned());
        }

        let handles = self.submit(file.content, &submitted_name, batch_id).await?;
        Ok((handles, size))
    }

    /// One call to the ingestion API, timed.
    pub async fn submit(
        &self,
        content: Vec<u8>,
        submitted_name: &str,
        batch_id: &str,
    ) -> DocumentOutcome<RemoteHandles> {
        let _timer = self.metrics.start_submission_timer();
        self.ingestion
            .submit_pdf(content, submitted_name, batch_id)
            .await
            .map_err(|e| DocumentError::RemoteSubmission(e.to_string()))
    }

    pub fn registry(&self) -> &BatchRegistry {
        &self.registry
    }
}
