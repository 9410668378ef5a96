//! Durable document metadata store.
//!
//! One SQLite database holds a row per [`Document`] plus its chunks (text
//! and embedding), independent of which vector backend is active. Every
//! read-modify-write runs in a single transaction. The chunk rows are what
//! the local vector store is hydrated from on start.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use voxrag_core::embedding::{blob_to_vec, vec_to_blob, Embedding};
use voxrag_core::models::{Chunk, Document};

use crate::config::Config;
use crate::{db, migrate};

#[derive(Debug, Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

fn ts_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn row_to_document(row: &SqliteRow) -> Document {
    let chunk_count: i64 = row.get("chunk_count");
    let size_bytes: i64 = row.get("size_bytes");
    let access_count: i64 = row.get("access_count");
    let last_accessed_at: Option<i64> = row.get("last_accessed_at");
    Document {
        id: row.get("id"),
        original_name: row.get("original_name"),
        mime_type: row.get("mime_type"),
        file_extension: row.get("file_extension"),
        storage_path: row.get("storage_path"),
        chunk_count: chunk_count.max(0) as usize,
        size_bytes: size_bytes.max(0) as u64,
        uploaded_at: ts_to_datetime(row.get("uploaded_at")),
        last_accessed_at: last_accessed_at.map(ts_to_datetime),
        access_count: access_count.max(0) as u64,
    }
}

const DOCUMENT_COLUMNS: &str = "id, original_name, mime_type, file_extension, storage_path, \
     chunk_count, size_bytes, uploaded_at, last_accessed_at, access_count";

impl MetadataStore {
    /// Connect to the configured database and apply the schema.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a document, its extracted text and all its chunks atomically.
    pub async fn insert_document(&self, doc: &Document, content: &str, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, original_name, mime_type, file_extension, storage_path,
                                   chunk_count, size_bytes, uploaded_at, last_accessed_at,
                                   access_count, content)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.original_name)
        .bind(&doc.mime_type)
        .bind(&doc.file_extension)
        .bind(&doc.storage_path)
        .bind(doc.chunk_count as i64)
        .bind(doc.size_bytes as i64)
        .bind(doc.uploaded_at.timestamp())
        .bind(doc.last_accessed_at.map(|t| t.timestamp()))
        .bind(doc.access_count as i64)
        .bind(content)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("Failed to insert document {}", doc.id))?;

        for chunk in chunks {
            let blob = chunk
                .embedding
                .as_slice()
                .map(vec_to_blob)
                .unwrap_or_default();
            sqlx::query(
                "INSERT INTO chunks (document_id, chunk_index, text, embedding, dims, degraded) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&chunk.document_id)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(blob)
            .bind(chunk.embedding.dims() as i64)
            .bind(chunk.embedding.is_degraded())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    /// The document and its extracted text.
    pub async fn get_with_content(&self, id: &str) -> Result<Option<(Document, String)>> {
        let row = sqlx::query(&format!(
            "SELECT {}, content FROM documents WHERE id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| {
            let content: String = r.get("content");
            (row_to_document(&r), content)
        }))
    }

    /// All documents, newest first.
    pub async fn list(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM documents ORDER BY uploaded_at DESC, id ASC",
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Bump access counters for the given documents.
    pub async fn record_access(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query(
                "UPDATE documents SET access_count = access_count + 1, last_accessed_at = ? WHERE id = ?",
            )
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete a document and its chunks, returning the removed record.
    pub async fn delete(&self, id: &str) -> Result<Option<Document>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let doc = row_to_document(&row);

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(doc))
    }

    /// Remove everything. Returns the number of documents deleted.
    pub async fn clear(&self) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        let removed = sqlx::query("DELETE FROM documents")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(removed as usize)
    }

    /// Every stored chunk, for hydrating the local vector store.
    pub async fn load_all_chunks(&self) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.document_id, c.chunk_index, c.text, c.embedding, c.dims, c.degraded,
                   d.original_name, d.file_extension, d.chunk_count, d.uploaded_at
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            ORDER BY c.document_id, c.chunk_index
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let chunk_index: i64 = row.get("chunk_index");
                let total: i64 = row.get("chunk_count");
                let dims: i64 = row.get("dims");
                let degraded: bool = row.get("degraded");
                let embedding = if degraded {
                    Embedding::degraded(dims.max(0) as usize)
                } else {
                    let blob: Vec<u8> = row.get("embedding");
                    Embedding::vector(blob_to_vec(&blob))
                };
                Chunk {
                    document_id: row.get("document_id"),
                    file_name: row.get("original_name"),
                    file_type: row.get("file_extension"),
                    chunk_index: chunk_index.max(0) as usize,
                    total_chunks: total.max(0) as usize,
                    text: row.get("text"),
                    embedding,
                    uploaded_at: ts_to_datetime(row.get("uploaded_at")),
                }
            })
            .collect())
    }

    /// `(documents, chunks)` totals.
    pub async fn counts(&self) -> Result<(usize, usize)> {
        let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok((docs.max(0) as usize, chunks.max(0) as usize))
    }
}
