use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cargas::{
    error::CargaResult,
    model::{BatchStatus, Document, RemoteHandles},
};
use crate::commons::file_utils;
use crate::workers::{
    error::{DocumentError, DocumentOutcome},
    metrics::BatchMetrics,
    upload_worker::{FileUploadWorker, PassKind, PassSummary, Progress},
};

const NO_DOCUMENTS_COMMENT: &str = "no associated documents to retry";
const NO_FAILED_DOCUMENTS_COMMENT: &str = "no ERROR documents to retry";
const RETRYING_COMMENT: &str = "retrying batch";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RetryOutcome {
    /// Batch has no documents at all; batch marked ERROR.
    NoDocuments,
    /// Nothing in ERROR; batch marked COMPLETED.
    NoFailedDocuments,
    Retried(PassSummary),
}

/// RetryWorker resubmits the failed documents of a batch from their local backups
#[derive(Clone)]
pub struct RetryWorker {
    uploader: FileUploadWorker,
    metrics: Arc<BatchMetrics>,
}

impl RetryWorker {
    pub fn new(uploader: FileUploadWorker, metrics: Arc<BatchMetrics>) -> Self {
        Self { uploader, metrics }
    }

    #[instrument(skip(self, on_progress), fields(carga_id = %batch_id))]
    pub async fn retry_batch<F>(&self, batch_id: &str, mut on_progress: F) -> CargaResult<RetryOutcome>
    where
        F: FnMut(Progress) + Send,
    {
        let registry = self.uploader.registry();
        registry.require_batch(batch_id).await?;

        let documents = registry.list_documents(batch_id).await?;
        if documents.is_empty() {
            warn!("No documents to retry");
            registry
                .update_batch_status(batch_id, BatchStatus::Error, NO_DOCUMENTS_COMMENT)
                .await?;
            return Ok(RetryOutcome::NoDocuments);
        }

        let failed: Vec<(usize, Document)> = documents
            .into_iter()
            .enumerate()
            .filter(|(_, d)| d.is_error())
            .collect();

        if failed.is_empty() {
            info!("No ERROR documents to retry");
            registry
                .update_batch_status(batch_id, BatchStatus::Completed, NO_FAILED_DOCUMENTS_COMMENT)
                .await?;
            return Ok(RetryOutcome::NoFailedDocuments);
        }

        self.metrics.record_retry_pass();
        registry
            .update_batch_status(batch_id, BatchStatus::InProgress, RETRYING_COMMENT)
            .await?;

        let total = failed.len();
        let mut ok = 0;
        let mut failures = Vec::new();

        info!("Retrying {} failed documents", total);

        for (i, (index, mut document)) in failed.into_iter().enumerate() {
            match self.retry_document(batch_id, &document).await {
                Ok((handles, size)) => {
                    self.metrics.record_document_succeeded();
                    document.mark_ok(handles, size);
                    ok += 1;
                }
                Err(e) => {
                    warn!(file = %document.original_name, kind = e.kind(), "Retry failed: {}", e);
                    self.metrics.record_document_failed(&e);
                    document.mark_error(e.to_string());
                    failures.push(format!("{}: {}", document.original_name, document.error_detail));
                }
            }

            registry.replace_document(batch_id, index, document).await?;
            on_progress(Progress {
                processed: i + 1,
                total,
            });
        }

        let documents = registry.list_documents(batch_id).await?;
        let summary = PassSummary::new(PassKind::Retry, ok, total, failures, &documents);
        registry
            .update_batch_status(batch_id, summary.status, &summary.comment)
            .await?;

        info!(status = summary.status.as_str(), "{}", summary.comment);
        Ok(RetryOutcome::Retried(summary))
    }

    /// Same batch id, same submitted name, bytes from the local backup.
    async fn retry_document(
        &self,
        batch_id: &str,
        document: &Document,
    ) -> DocumentOutcome<(RemoteHandles, u64)> {
        let path = document
            .local_backup_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(DocumentError::LocalBackupMissing)?;

        let content = file_utils::read_backup(Path::new(path))
            .await
            .ok_or(DocumentError::LocalBackupMissing)?;

        let size = content.len() as u64;
        let handles = self
            .uploader
            .submit(content, &document.submitted_name, batch_id)
            .await?;
        Ok((handles, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cargas::{error::CargaError, model::{DocumentStatus, InputFile}};
    use crate::workers::upload_worker::tests::{ok_body, worker};
    use tempfile::TempDir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn retry_worker(uploader: &FileUploadWorker) -> RetryWorker {
        RetryWorker::new(uploader.clone(), Arc::new(BatchMetrics::new()))
    }

    #[tokio::test]
    async fn empty_batch_retry_marks_error_without_remote_calls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = worker(&server, &dir);
        let id = uploader.registry().create_batch().await.unwrap();

        let outcome = retry_worker(&uploader).retry_batch(&id, |_| {}).await.unwrap();
        assert_eq!(outcome, RetryOutcome::NoDocuments);

        let batch = uploader.registry().require_batch(&id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Error);
        assert_eq!(batch.status_comment, "no associated documents to retry");
    }

    #[tokio::test]
    async fn batch_without_failures_is_marked_completed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("a.pdf")))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = worker(&server, &dir);
        let id = uploader.registry().create_batch().await.unwrap();
        uploader
            .process_batch(&id, vec![InputFile::new("a.pdf", b"%PDF".to_vec())], true, |_| {})
            .await
            .unwrap();

        let outcome = retry_worker(&uploader).retry_batch(&id, |_| {}).await.unwrap();
        assert_eq!(outcome, RetryOutcome::NoFailedDocuments);

        let batch = uploader.registry().require_batch(&id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.status_comment, "no ERROR documents to retry");
    }

    #[tokio::test]
    async fn retry_resubmits_only_failed_documents_with_same_identity() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let uploader = worker(&server, &dir);
        let id = uploader.registry().create_batch_with_id("carga-9").await.unwrap();

        // first pass: a.pdf fails remotely, b.pdf succeeds
        let failing = Mock::given(method("POST"))
            .and(body_string_contains("a_"))
            .respond_with(ResponseTemplate::new(500).set_body_string("try later"))
            .mount_as_scoped(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("b_"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("b.pdf")))
            .expect(1)
            .mount(&server)
            .await;

        uploader
            .process_batch(
                &id,
                vec![
                    InputFile::new("a.pdf", b"%PDF-aaaa".to_vec()),
                    InputFile::new("b.pdf", b"%PDF-b".to_vec()),
                ],
                true,
                |_| {},
            )
            .await
            .unwrap();
        drop(failing);

        let before = uploader.registry().list_documents(&id).await.unwrap();
        assert_eq!(before[0].status, DocumentStatus::Error);
        let submitted = before[0].submitted_name.clone();

        // second pass: the API recovers for a.pdf, under the same name and batch id
        Mock::given(method("POST"))
            .and(path("/storage/pdf"))
            .and(body_string_contains(submitted.as_str()))
            .and(body_string_contains("carga-9"))
            .respond_with(ResponseTemplate::new(201).set_body_json(ok_body(&submitted)))
            .expect(1)
            .mount(&server)
            .await;

        let mut progress = Vec::new();
        let outcome = retry_worker(&uploader)
            .retry_batch(&id, |p| progress.push(p.percent()))
            .await
            .unwrap();

        let summary = match outcome {
            RetryOutcome::Retried(summary) => summary,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(progress, vec![100]);
        assert_eq!(summary.status, BatchStatus::Completed);
        assert_eq!(summary.comment, "retry succeeded. OK=1/1");

        let after = uploader.registry().list_documents(&id).await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].status, DocumentStatus::Ok);
        assert_eq!(after[0].submitted_name, submitted);
        assert!(after[0].error_detail.is_empty());
        assert_eq!(after[0].handles.blob_name, submitted);
        assert_eq!(after[0].size_bytes, before[0].size_bytes);
        assert_eq!(after[1], before[1]);

        let batch = uploader.registry().require_batch(&id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.status_comment, "retry succeeded. OK=1/1");
    }

    #[tokio::test]
    async fn retry_with_missing_backup_keeps_batch_in_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("x.pdf")))
            .expect(2)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let uploader = worker(&server, &dir);
        let id = uploader.registry().create_batch().await.unwrap();

        uploader
            .process_batch(
                &id,
                vec![
                    InputFile::new("one.pdf", b"%PDF-1".to_vec()),
                    InputFile::new("two.pdf", Vec::new()),
                    InputFile::new("three.pdf", b"%PDF-3".to_vec()),
                ],
                true,
                |_| {},
            )
            .await
            .unwrap();
        let before = uploader.registry().list_documents(&id).await.unwrap();

        // the remote mock above only allows the two first-pass calls
        let outcome = retry_worker(&uploader).retry_batch(&id, |_| {}).await.unwrap();
        let summary = match outcome {
            RetryOutcome::Retried(summary) => summary,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(summary.comment, "retry finished with errors. OK=0/1");

        let after = uploader.registry().list_documents(&id).await.unwrap();
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
        assert_eq!(after[1].status, DocumentStatus::Error);
        assert_eq!(
            after[1].error_detail,
            "no local backup available to retry (enable local backup)"
        );

        let batch = uploader.registry().require_batch(&id).await.unwrap();
        assert_eq!(batch.status, BatchStatus::Error);
    }

    #[tokio::test]
    async fn deleted_backup_fails_that_document_but_others_are_still_retried() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let uploader = worker(&server, &dir);
        let id = uploader.registry().create_batch().await.unwrap();

        let failing = Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount_as_scoped(&server)
            .await;
        uploader
            .process_batch(
                &id,
                vec![
                    InputFile::new("lost.pdf", b"%PDF-lost".to_vec()),
                    InputFile::new("kept.pdf", b"%PDF-kept".to_vec()),
                ],
                true,
                |_| {},
            )
            .await
            .unwrap();
        drop(failing);

        let docs = uploader.registry().list_documents(&id).await.unwrap();
        std::fs::remove_file(docs[0].local_backup_path.as_ref().unwrap()).unwrap();

        Mock::given(method("POST"))
            .and(body_string_contains("kept_"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_body("kept.pdf")))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = retry_worker(&uploader).retry_batch(&id, |_| {}).await.unwrap();
        let summary = match outcome {
            RetryOutcome::Retried(summary) => summary,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.status, BatchStatus::Error);

        let after = uploader.registry().list_documents(&id).await.unwrap();
        assert_eq!(after[0].status, DocumentStatus::Error);
        assert!(after[0].error_detail.starts_with("no local backup"));
        assert_eq!(after[1].status, DocumentStatus::Ok);
    }

    #[tokio::test]
    async fn retry_of_unknown_batch_is_a_hard_failure() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let uploader = worker(&server, &dir);

        let err = retry_worker(&uploader).retry_batch("ghost", |_| {}).await.unwrap_err();
        assert!(matches!(err, CargaError::BatchNotFound(_)));
    }
}
