use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cargas::{
    error::{CargaError, CargaResult},
    model::{Batch, BatchStatus, Document},
};

/// Storage backend for batches and their documents.
#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Insert a new batch. Fails with `DuplicateBatch` if the id is taken.
    async fn insert_batch(&self, batch: Batch) -> CargaResult<()>;

    async fn get_batch(&self, batch_id: &str) -> CargaResult<Option<Batch>>;

    /// Newest first.
    async fn list_batches(&self) -> CargaResult<Vec<Batch>>;

    async fn update_batch_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
        comment: &str,
    ) -> CargaResult<()>;

    async fn append_document(&self, batch_id: &str, document: Document) -> CargaResult<()>;

    /// Overwrite the document at `index` (insertion order).
    async fn replace_document(
        &self,
        batch_id: &str,
        index: usize,
        document: Document,
    ) -> CargaResult<()>;

    /// Insertion order; empty for unknown batches.
    async fn list_documents(&self, batch_id: &str) -> CargaResult<Vec<Document>>;
}

#[derive(Default)]
struct Inner {
    // insertion order, oldest first
    batches: Vec<Batch>,
    documents: HashMap<String, Vec<Document>>,
}

/// Process-local backend. Used in tests and when no database is configured.
#[derive(Default)]
pub struct InMemoryBatchStore {
    inner: RwLock<Inner>,
}

impl InMemoryBatchStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BatchStore for InMemoryBatchStore {
    async fn insert_batch(&self, batch: Batch) -> CargaResult<()> {
        let mut inner = self.inner.write().await;
        if inner.documents.contains_key(&batch.id) {
            return Err(CargaError::DuplicateBatch(batch.id));
        }
        inner.documents.insert(batch.id.clone(), Vec::new());
        inner.batches.push(batch);
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> CargaResult<Option<Batch>> {
        let inner = self.inner.read().await;
        Ok(inner.batches.iter().find(|b| b.id == batch_id).cloned())
    }

    async fn list_batches(&self) -> CargaResult<Vec<Batch>> {
        let inner = self.inner.read().await;
        Ok(inner.batches.iter().rev().cloned().collect())
    }

    async fn update_batch_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
        comment: &str,
    ) -> CargaResult<()> {
        let mut inner = self.inner.write().await;
        let batch = inner
            .batches
            .iter_mut()
            .find(|b| b.id == batch_id)
            .ok_or_else(|| CargaError::BatchNotFound(batch_id.to_string()))?;

        batch.status = status;
        batch.status_comment = comment.to_string();
        Ok(())
    }

    async fn append_document(&self, batch_id: &str, document: Document) -> CargaResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .documents
            .get_mut(batch_id)
            .ok_or_else(|| CargaError::BatchNotFound(batch_id.to_string()))?
            .push(document);
        Ok(())
    }

    async fn replace_document(
        &self,
        batch_id: &str,
        index: usize,
        document: Document,
    ) -> CargaResult<()> {
        let mut inner = self.inner.write().await;
        let documents = inner
            .documents
            .get_mut(batch_id)
            .ok_or_else(|| CargaError::BatchNotFound(batch_id.to_string()))?;

        let slot = documents.get_mut(index).ok_or_else(|| CargaError::DocumentNotFound {
            batch_id: batch_id.to_string(),
            index,
        })?;
        *slot = document;
        Ok(())
    }

    async fn list_documents(&self, batch_id: &str) -> CargaResult<Vec<Document>> {
        let inner = self.inner.read().await;
        Ok(inner.documents.get(batch_id).cloned().unwrap_or_default())
    }
}
