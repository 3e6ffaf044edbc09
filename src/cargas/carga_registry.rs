use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cargas::{
    carga_store::BatchStore,
    error::{CargaError, CargaResult},
    model::{Batch, BatchDetail, BatchStatus, Document},
};

/// Holds batch records and their documents on top of a `BatchStore`, and hands
/// out per-batch locks so two passes over one batch never interleave.
#[derive(Clone)]
pub struct BatchRegistry {
    store: Arc<dyn BatchStore>,
    locks: LockMap,
}

type LockMap = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Held for the duration of an upload or retry pass on one batch. The map
/// entry goes away with the last guard so unknown or finished ids do not pile up.
pub struct BatchGuard {
    guard: Option<OwnedMutexGuard<()>>,
    batch_id: String,
    locks: LockMap,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        // release first so our own reference is gone before counting
        self.guard.take();

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(&self.batch_id)
            .map(|lock| Arc::strong_count(lock) == 1)
            .unwrap_or(false);
        if idle {
            locks.remove(&self.batch_id);
        }
    }
}

impl BatchRegistry {
    pub fn new(store: Arc<dyn BatchStore>) -> Self {
        Self {
            store,
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a batch under a freshly generated id.
    pub async fn create_batch(&self) -> CargaResult<String> {
        let id = Uuid::new_v4().simple().to_string();
        self.create_batch_with_id(&id).await
    }

    /// Register a batch under an id issued elsewhere (usually the ingestion API).
    pub async fn create_batch_with_id(&self, id: &str) -> CargaResult<String> {
        let id = id.trim();
        if id.is_empty() {
            return Err(CargaError::InvalidBatchId(id.to_string()));
        }

        self.store.insert_batch(Batch::new(id.to_string())).await?;
        info!(carga_id = %id, "Batch created");
        Ok(id.to_string())
    }

    pub async fn update_batch_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
        comment: &str,
    ) -> CargaResult<()> {
        debug!(carga_id = %batch_id, status = status.as_str(), comment, "Batch status updated");
        self.store.update_batch_status(batch_id, status, comment).await
    }

    pub async fn append_document(&self, batch_id: &str, document: Document) -> CargaResult<()> {
        self.store.append_document(batch_id, document).await
    }

    pub async fn replace_document(
        &self,
        batch_id: &str,
        index: usize,
        document: Document,
    ) -> CargaResult<()> {
        self.store.replace_document(batch_id, index, document).await
    }

    pub async fn list_documents(&self, batch_id: &str) -> CargaResult<Vec<Document>> {
        self.store.list_documents(batch_id).await
    }

    pub async fn get_batch(&self, batch_id: &str) -> CargaResult<Option<Batch>> {
        self.store.get_batch(batch_id).await
    }

    /// Like `get_batch` but unknown ids are an error.
    pub async fn require_batch(&self, batch_id: &str) -> CargaResult<Batch> {
        self.get_batch(batch_id)
            .await?
            .ok_or_else(|| CargaError::BatchNotFound(batch_id.to_string()))
    }

    pub async fn batch_detail(&self, batch_id: &str) -> CargaResult<BatchDetail> {
        let batch = self.require_batch(batch_id).await?;
        let documents = self.list_documents(batch_id).await?;
        Ok(BatchDetail { batch, documents })
    }

    pub async fn list_batches(&self) -> CargaResult<Vec<Batch>> {
        self.store.list_batches().await
    }

    pub async fn lock_batch(&self, batch_id: &str) -> BatchGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks
                .entry(batch_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        BatchGuard {
            guard: Some(lock.lock_owned().await),
            batch_id: batch_id.to_string(),
            locks: self.locks.clone(),
        }
    }

    #[cfg(test)]
    pub(crate) fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
