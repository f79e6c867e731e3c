//! Repository over the durable document records.
//!
//! The publish protocol (see `vellum-sync`) leans on two transactional
//! writes here: `put_rendered` (head + parts as one unit) and
//! `commit_document` (sync record + optional raw bytes as one unit). Each
//! must be atomic on its own; the protocol's ordering does the rest.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::{
    Checkpoint, CheckpointRow, DocumentRecord, DocumentRow, RawDocument, RawDocumentRow, RenderedHead,
    RenderedHeadRow, RenderedPart, RenderedPartRow,
};
use exn::ResultExt;
use sqlx::SqlitePool;

/// Repository for all durable records: per-document sync state, raw
/// content, rendered output and the global checkpoint.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Document sync records
    // =========================================================================

    /// Get the sync record for a document by name.
    pub async fn get_document(&self, name: impl AsRef<str>) -> Result<Option<DocumentRecord>> {
        let row: Option<DocumentRow> = sqlx::query_as(include_str!("../queries/get_document.sql"))
            .bind(name.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(DocumentRecord::try_from).transpose()
    }

    /// List every tracked document's sync record, ordered by name.
    pub async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(include_str!("../queries/list_documents.sql"))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(DocumentRecord::try_from).collect()
    }

    /// Insert or replace a document's sync record.
    pub async fn upsert_document(&self, record: &DocumentRecord) -> Result<()> {
        let row = DocumentRow::from(record);
        Self::bind_document(sqlx::query(include_str!("../queries/upsert_document.sql")), row)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Set the reprocess flag on every tracked document (operator "force").
    ///
    /// Returns the number of records flagged.
    pub async fn mark_all_for_reprocess(&self) -> Result<u64> {
        let result = sqlx::query(include_str!("../queries/mark_all_reprocess.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }

    // =========================================================================
    // Raw content
    // =========================================================================

    /// Load the last stored raw bytes for a document.
    pub async fn get_raw(&self, name: impl AsRef<str>) -> Result<Option<RawDocument>> {
        let row: Option<RawDocumentRow> = sqlx::query_as(include_str!("../queries/get_raw_document.sql"))
            .bind(name.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(RawDocument::try_from).transpose()
    }

    // =========================================================================
    // Rendered output
    // =========================================================================

    /// Persist a rendered head and its overflow parts as one atomic write.
    ///
    /// Also deletes any leftover parts from a previous, larger rendering so
    /// `total_parts` stays truthful.
    pub async fn put_rendered(&self, head: &RenderedHead, parts: &[RenderedPart]) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        sqlx::query(include_str!("../queries/upsert_rendered_head.sql"))
            .bind(&head.name)
            .bind(head.encoding.as_str())
            .bind(&head.etag)
            .bind(i64::from(head.total_parts))
            .bind(&head.data0)
            .bind(head.expires_at_timestamp())
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        for part in parts {
            sqlx::query(include_str!("../queries/upsert_rendered_part.sql"))
                .bind(&part.name)
                .bind(i64::from(part.part))
                .bind(&part.data)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        sqlx::query(include_str!("../queries/delete_stale_parts.sql"))
            .bind(&head.name)
            .bind(i64::from(head.total_parts))
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Get the rendered head for a document, if one has been published.
    pub async fn get_rendered_head(&self, name: impl AsRef<str>) -> Result<Option<RenderedHead>> {
        let row: Option<RenderedHeadRow> = sqlx::query_as(include_str!("../queries/get_rendered_head.sql"))
            .bind(name.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(RenderedHead::try_from).transpose()
    }

    /// Get one overflow part of a rendered document.
    pub async fn get_rendered_part(&self, name: impl AsRef<str>, part: u32) -> Result<Option<RenderedPart>> {
        let row: Option<RenderedPartRow> = sqlx::query_as(include_str!("../queries/get_rendered_part.sql"))
            .bind(name.as_ref())
            .bind(i64::from(part))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(RenderedPart::try_from).transpose()
    }

    // =========================================================================
    // Commit & checkpoint
    // =========================================================================

    /// Durably commit a document's updated sync record, paired with its new
    /// raw content in the same transaction when the raw bytes changed.
    pub async fn commit_document(&self, record: &DocumentRecord, raw: Option<&RawDocument>) -> Result<()> {
        let row = DocumentRow::from(record);
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        Self::bind_document(sqlx::query(include_str!("../queries/upsert_document.sql")), row)
            .execute(&mut *tx)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if let Some(raw) = raw {
            sqlx::query(include_str!("../queries/upsert_raw_document.sql"))
                .bind(&raw.name)
                .bind(raw.encoding.as_str())
                .bind(&raw.bytes)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Load the global checkpoint; an absent row is an empty checkpoint.
    pub async fn get_checkpoint(&self) -> Result<Checkpoint> {
        let row: Option<CheckpointRow> = sqlx::query_as(include_str!("../queries/get_checkpoint.sql"))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(Checkpoint::from).unwrap_or_default())
    }

    /// Persist the global checkpoint.
    pub async fn put_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_checkpoint.sql"))
            .bind(&checkpoint.listing_etag)
            .bind(&checkpoint.version_etag)
            .bind(&checkpoint.version_label)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Reset
    // =========================================================================

    /// Full reset: delete every per-document record, all raw and rendered
    /// content, and the global checkpoint, in one transaction.
    pub async fn wipe(&self) -> Result<()> {
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        for statement in [
            "DELETE FROM rendered_parts",
            "DELETE FROM rendered_heads",
            "DELETE FROM raw_documents",
            "DELETE FROM documents",
            "DELETE FROM checkpoint",
        ] {
            sqlx::query(statement).execute(&mut *tx).await.or_raise(|| ErrorKind::Database)?;
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    fn bind_document<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        row: DocumentRow,
    ) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        let (name, etag, digest, reprocess, generation) = row.into_bindings();
        query.bind(name).bind(etag).bind(digest).bind(reprocess).bind(generation)
    }
}
