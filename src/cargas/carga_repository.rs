use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::cargas::{
    carga_store::BatchStore,
    error::{CargaError, CargaResult},
    model::{Batch, BatchStatus, Document, DocumentStatus, RemoteHandles},
};

/// Postgres-backed batch store.
pub struct CargaRepository {
    pool: PgPool,
}

impl CargaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> CargaResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn batch_exists(&self, batch_id: &str) -> CargaResult<bool> {
        let row = sqlx::query(r#"SELECT 1 FROM cargas WHERE id = $1"#)
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn batch_from_row(row: &PgRow) -> CargaResult<Batch> {
    let status: String = row.try_get("status")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(Batch {
        id: row.try_get("id")?,
        created_at,
        status: BatchStatus::parse(&status)
            .ok_or_else(|| CargaError::CorruptRecord(format!("batch status {:?}", status)))?,
        status_comment: row.try_get("status_comment")?,
    })
}

fn document_from_row(row: &PgRow) -> CargaResult<Document> {
    let status: String = row.try_get("status")?;
    let size_bytes: i64 = row.try_get("size_bytes")?;

    Ok(Document {
        original_name: row.try_get("original_name")?,
        submitted_name: row.try_get("submitted_name")?,
        local_backup_path: row.try_get("local_backup_path")?,
        status: DocumentStatus::parse(&status)
            .ok_or_else(|| CargaError::CorruptRecord(format!("document status {:?}", status)))?,
        error_detail: row.try_get("error_detail")?,
        handles: RemoteHandles {
            container: row.try_get("container")?,
            blob_name: row.try_get("blob_name")?,
            blob_url: row.try_get("blob_url")?,
        },
        size_bytes: size_bytes.max(0) as u64,
    })
}

#[async_trait]
impl BatchStore for CargaRepository {
    async fn insert_batch(&self, batch: Batch) -> CargaResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO cargas (id, created_at, status, status_comment)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&batch.id)
        .bind(batch.created_at)
        .bind(batch.status.as_str())
        .bind(&batch.status_comment)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CargaError::DuplicateBatch(batch.id));
        }
        Ok(())
    }

    async fn get_batch(&self, batch_id: &str) -> CargaResult<Option<Batch>> {
        let row = sqlx::query(
            r#"
            SELECT id, created_at, status, status_comment
            FROM cargas
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(batch_from_row).transpose()
    }

    async fn list_batches(&self) -> CargaResult<Vec<Batch>> {
        let rows = sqlx::query(
            r#"
            SELECT id, created_at, status, status_comment
            FROM cargas
            ORDER BY seq DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(batch_from_row).collect()
    }

    async fn update_batch_status(
        &self,
        batch_id: &str,
        status: BatchStatus,
        comment: &str,
    ) -> CargaResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE cargas
            SET status = $2, status_comment = $3
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .bind(status.as_str())
        .bind(comment)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CargaError::BatchNotFound(batch_id.to_string()));
        }
        Ok(())
    }

    async fn append_document(&self, batch_id: &str, document: Document) -> CargaResult<()> {
        if !self.batch_exists(batch_id).await? {
            return Err(CargaError::BatchNotFound(batch_id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO documentos (
                carga_id,
                position,
                original_name,
                submitted_name,
                local_backup_path,
                status,
                error_detail,
                container,
                blob_name,
                blob_url,
                size_bytes
            )
            VALUES (
                $1,
                (SELECT COALESCE(MAX(position) + 1, 0) FROM documentos WHERE carga_id = $1),
                $2, $3, $4, $5, $6, $7, $8, $9, $10
            )
            "#,
        )
        .bind(batch_id)
        .bind(&document.original_name)
        .bind(&document.submitted_name)
        .bind(&document.local_backup_path)
        .bind(document.status.as_str())
        .bind(&document.error_detail)
        .bind(&document.handles.container)
        .bind(&document.handles.blob_name)
        .bind(&document.handles.blob_url)
        .bind(document.size_bytes as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replace_document(
        &self,
        batch_id: &str,
        index: usize,
        document: Document,
    ) -> CargaResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE documentos
            SET original_name = $3,
                submitted_name = $4,
                local_backup_path = $5,
                status = $6,
                error_detail = $7,
                container = $8,
                blob_name = $9,
                blob_url = $10,
                size_bytes = $11
            WHERE carga_id = $1 AND position = $2
            "#,
        )
        .bind(batch_id)
        .bind(index as i32)
        .bind(&document.original_name)
        .bind(&document.submitted_name)
        .bind(&document.local_backup_path)
        .bind(document.status.as_str())
        .bind(&document.error_detail)
        .bind(&document.handles.container)
        .bind(&document.handles.blob_name)
        .bind(&document.handles.blob_url)
        .bind(document.size_bytes as i64)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            if !self.batch_exists(batch_id).await? {
                return Err(CargaError::BatchNotFound(batch_id.to_string()));
            }
            return Err(CargaError::DocumentNotFound {
                batch_id: batch_id.to_string(),
                index,
            });
        }
        Ok(())
    }

    async fn list_documents(&self, batch_id: &str) -> CargaResult<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT original_name, submitted_name, local_backup_path, status, error_detail,
                   container, blob_name, blob_url, size_bytes
            FROM documentos
            WHERE carga_id = $1
            ORDER BY position ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(document_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles(name: &str) -> RemoteHandles {
        RemoteHandles {
            container: "pdfs".into(),
            blob_name: name.into(),
            blob_url: format!("https://blob/{}", name),
        }
    }

    #[sqlx::test]
    async fn batches_list_newest_first(pool: PgPool) {
        let repo = CargaRepository::new(pool);
        repo.insert_batch(Batch::new("1".into())).await.unwrap();
        repo.insert_batch(Batch::new("2".into())).await.unwrap();
        repo.insert_batch(Batch::new("3".into())).await.unwrap();

        let ids: Vec<String> = repo.list_batches().await.unwrap().into_iter().map(|b| b.id).collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }

    #[sqlx::test]
    async fn duplicate_batch_is_rejected(pool: PgPool) {
        let repo = CargaRepository::new(pool);
        repo.insert_batch(Batch::new("1".into())).await.unwrap();
        let err = repo.insert_batch(Batch::new("1".into())).await.unwrap_err();
        assert!(matches!(err, CargaError::DuplicateBatch(id) if id == "1"));
        assert_eq!(repo.list_batches().await.unwrap().len(), 1);
    }

    #[sqlx::test]
    async fn status_updates_round_trip(pool: PgPool) {
        let repo = CargaRepository::new(pool);
        repo.insert_batch(Batch::new("1".into())).await.unwrap();
        repo.update_batch_status("1", BatchStatus::Completed, "upload completed successfully. OK=2/2")
            .await
            .unwrap();

        let batch = repo.get_batch("1").await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Completed);
        assert_eq!(batch.status_comment, "upload completed successfully. OK=2/2");
        assert!(repo.get_batch("2").await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn unknown_batch_mutations_fail_but_listing_is_empty(pool: PgPool) {
        let repo = CargaRepository::new(pool);
        assert!(matches!(
            repo.update_batch_status("x", BatchStatus::Error, "c").await,
            Err(CargaError::BatchNotFound(_))
        ));
        assert!(matches!(
            repo.append_document("x", Document::pending("a.pdf")).await,
            Err(CargaError::BatchNotFound(_))
        ));
        assert!(matches!(
            repo.replace_document("x", 0, Document::pending("a.pdf")).await,
            Err(CargaError::BatchNotFound(_))
        ));
        assert!(repo.list_documents("x").await.unwrap().is_empty());
    }

    #[sqlx::test]
    async fn documents_keep_append_order_per_batch(pool: PgPool) {
        let repo = CargaRepository::new(pool);
        repo.insert_batch(Batch::new("1".into())).await.unwrap();
        repo.insert_batch(Batch::new("2".into())).await.unwrap();

        repo.append_document("1", Document::pending("a.pdf")).await.unwrap();
        repo.append_document("2", Document::pending("other.pdf")).await.unwrap();
        repo.append_document("1", Document::pending("b.pdf")).await.unwrap();
        repo.append_document("1", Document::pending("c.pdf")).await.unwrap();

        let names: Vec<String> = repo
            .list_documents("1")
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.original_name)
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
        assert_eq!(repo.list_documents("2").await.unwrap().len(), 1);
    }

    #[sqlx::test]
    async fn replace_document_overwrites_in_place(pool: PgPool) {
        let repo = CargaRepository::new(pool);
        repo.insert_batch(Batch::new("1".into())).await.unwrap();
        repo.append_document("1", Document::pending("a.pdf")).await.unwrap();

        let mut failed = Document::pending("b.pdf");
        failed.submitted_name = "b_0123.pdf".into();
        failed.local_backup_path = Some("uploads/b_0123.pdf".into());
        failed.mark_error("HTTP 500: x");
        repo.append_document("1", failed.clone()).await.unwrap();

        let mut fixed = failed;
        fixed.mark_ok(handles("b_0123.pdf"), 4);
        repo.replace_document("1", 1, fixed).await.unwrap();

        let docs = repo.list_documents("1").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].status, DocumentStatus::Pending);
        assert_eq!(docs[1].status, DocumentStatus::Ok);
        assert_eq!(docs[1].error_detail, "");
        assert_eq!(docs[1].submitted_name, "b_0123.pdf");
        assert_eq!(docs[1].local_backup_path.as_deref(), Some("uploads/b_0123.pdf"));
        assert_eq!(docs[1].handles.blob_url, "https://blob/b_0123.pdf");
        assert_eq!(docs[1].size_bytes, 4);

        assert!(matches!(
            repo.replace_document("1", 5, Document::pending("c.pdf")).await,
            Err(CargaError::DocumentNotFound { index: 5, .. })
        ));
    }

    #[sqlx::test]
    async fn unknown_status_values_are_corrupt_records(pool: PgPool) {
        let repo = CargaRepository::new(pool.clone());
        repo.insert_batch(Batch::new("1".into())).await.unwrap();
        repo.append_document("1", Document::pending("a.pdf")).await.unwrap();

        sqlx::query(r#"UPDATE documentos SET status = 'LOST' WHERE carga_id = '1'"#)
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(
            repo.list_documents("1").await,
            Err(CargaError::CorruptRecord(_))
        ));

        sqlx::query(r#"UPDATE cargas SET status = 'HALF_DONE' WHERE id = '1'"#)
            .execute(&pool)
            .await
            .unwrap();
        assert!(matches!(repo.get_batch("1").await, Err(CargaError::CorruptRecord(_))));
        assert!(matches!(repo.list_batches().await, Err(CargaError::CorruptRecord(_))));
    }
}
