use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::workers::error::DocumentError;

/// BatchMetrics counts per-document outcomes across upload and retry passes
pub struct BatchMetrics {
    pub upload_passes: AtomicU64,
    pub retry_passes: AtomicU64,

    pub documents_processed: AtomicU64,
    pub documents_succeeded: AtomicU64,
    pub documents_failed: AtomicU64,

    // Failure kinds
    pub empty_inputs: AtomicU64,
    pub not_pdf_inputs: AtomicU64,
    pub backup_write_errors: AtomicU64,
    pub remote_errors: AtomicU64,
    pub backup_missing_errors: AtomicU64,

    // Time spent talking to the ingestion API (milliseconds)
    pub total_submission_time_ms: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub upload_passes: u64,
    pub retry_passes: u64,
    pub documents_processed: u64,
    pub documents_succeeded: u64,
    pub documents_failed: u64,
    pub empty_inputs: u64,
    pub not_pdf_inputs: u64,
    pub backup_write_errors: u64,
    pub remote_errors: u64,
    pub backup_missing_errors: u64,
    pub avg_submission_time_ms: u64,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self {
            upload_passes: AtomicU64::new(0),
            retry_passes: AtomicU64::new(0),
            documents_processed: AtomicU64::new(0),
            documents_succeeded: AtomicU64::new(0),
            documents_failed: AtomicU64::new(0),
            empty_inputs: AtomicU64::new(0),
            not_pdf_inputs: AtomicU64::new(0),
            backup_write_errors: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
            backup_missing_errors: AtomicU64::new(0),
            total_submission_time_ms: AtomicU64::new(0),
        }
    }

    pub fn record_upload_pass(&self) {
        self.upload_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry_pass(&self) {
        self.retry_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_document_succeeded(&self) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.documents_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_document_failed(&self, error: &DocumentError) {
        self.documents_processed.fetch_add(1, Ordering::Relaxed);
        self.documents_failed.fetch_add(1, Ordering::Relaxed);

        let counter = match error {
            DocumentError::EmptyInput => &self.empty_inputs,
            DocumentError::NotPdf => &self.not_pdf_inputs,
            DocumentError::LocalBackupWrite(_) => &self.backup_write_errors,
            DocumentError::RemoteSubmission(_) => &self.remote_errors,
            DocumentError::LocalBackupMissing => &self.backup_missing_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submission_time(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.total_submission_time_ms.fetch_add(ms, Ordering::Relaxed);
    }

    /// Timer that records submission time when dropped
    pub fn start_submission_timer(&self) -> SubmissionTimer<'_> {
        SubmissionTimer {
            metrics: self,
            start_time: Instant::now(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let succeeded = self.documents_succeeded.load(Ordering::Relaxed);
        let remote_errors = self.remote_errors.load(Ordering::Relaxed);
        let submissions = succeeded + remote_errors;
        let total_time_ms = self.total_submission_time_ms.load(Ordering::Relaxed);

        MetricsSnapshot {
            upload_passes: self.upload_passes.load(Ordering::Relaxed),
            retry_passes: self.retry_passes.load(Ordering::Relaxed),
            documents_processed: self.documents_processed.load(Ordering::Relaxed),
            documents_succeeded: succeeded,
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            empty_inputs: self.empty_inputs.load(Ordering::Relaxed),
            not_pdf_inputs: self.not_pdf_inputs.load(Ordering::Relaxed),
            backup_write_errors: self.backup_write_errors.load(Ordering::Relaxed),
            remote_errors,
            backup_missing_errors: self.backup_missing_errors.load(Ordering::Relaxed),
            avg_submission_time_ms: if submissions > 0 {
                total_time_ms / submissions
            } else {
                0
            },
        }
    }

    pub fn log_metrics(&self) {
        let s = self.snapshot();
        if s.documents_processed == 0 {
            return;
        }

        info!(
            "Batch metrics: uploads={}, retries={}, processed={}, succeeded={}, failed={}, \
             empty_inputs={}, not_pdf={}, backup_write_errors={}, remote_errors={}, backup_missing={}, \
             avg_submission_ms={}",
            s.upload_passes,
            s.retry_passes,
            s.documents_processed,
            s.documents_succeeded,
            s.documents_failed,
            s.empty_inputs,
            s.not_pdf_inputs,
            s.backup_write_errors,
            s.remote_errors,
            s.backup_missing_errors,
            s.avg_submission_time_ms
        );

        let error_rate = (s.documents_failed as f64) / (s.documents_processed as f64);
        if error_rate > 0.1 {
            warn!("Document error rate is high: {:.2}%", error_rate * 100.0);
        }
    }
}

impl Default for BatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SubmissionTimer<'a> {
    metrics: &'a BatchMetrics,
    start_time: Instant,
}

impl<'a> Drop for SubmissionTimer<'a> {
    fn drop(&mut self) {
        self.metrics.record_submission_time(self.start_time.elapsed());
    }
}
