//! Nearest-neighbor vector index over named tables (C8).
//!
//! Generalizes the blob encode/decode and cosine similarity helpers this crate
//! already used for a single `chunk_vectors` table into named tables (`documents`,
//! `images`) with the exact columns from §6.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::errors::CoreError;

/// A candidate row returned from a vector search.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub doc_id: String,
    pub uri: String,
    pub text: String,
    pub mime_type: String,
    pub score: f64,
}

/// One row to upsert into a vector table.
#[derive(Debug, Clone)]
pub struct VectorRow {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    pub uri: String,
    pub vector: Vec<f32>,
    pub mime_type: String,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Merge-insert on `id` (Open Question 3): re-ingesting the same block ID
    /// overwrites its prior vector row rather than duplicating it.
    async fn upsert_vectors(&self, table: &str, rows: &[VectorRow]) -> Result<(), CoreError>;

    async fn search(&self, table: &str, query_vec: &[f32], limit: i64) -> Result<Vec<VectorHit>, CoreError>;
}

/// Encode a float vector as a little-endian `f32` BLOB.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched-length inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

fn table_name(table: &str) -> Result<&'static str, CoreError> {
    match table {
        "documents" => Ok("vectors_documents"),
        "images" => Ok("vectors_images"),
        other => Err(CoreError::StoreUnavailable(format!(
            "unknown vector table '{other}'"
        ))),
    }
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), CoreError> {
        for table in ["vectors_documents", "vectors_images"] {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id TEXT PRIMARY KEY,
                    doc_id TEXT NOT NULL,
                    text TEXT NOT NULL DEFAULT '',
                    uri TEXT NOT NULL DEFAULT '',
                    mime_type TEXT NOT NULL DEFAULT '',
                    vector BLOB NOT NULL
                )
                "#
            );
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert_vectors(&self, table: &str, rows: &[VectorRow]) -> Result<(), CoreError> {
        let table = table_name(table)?;
        for row in rows {
            let blob = vec_to_blob(&row.vector);
            let sql = format!(
                "INSERT INTO {table} (id, doc_id, text, uri, mime_type, vector) VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(id) DO UPDATE SET doc_id = excluded.doc_id, text = excluded.text,
                   uri = excluded.uri, mime_type = excluded.mime_type, vector = excluded.vector"
            );
            sqlx::query(&sql)
                .bind(&row.id)
                .bind(&row.doc_id)
                .bind(&row.text)
                .bind(&row.uri)
                .bind(&row.mime_type)
                .bind(blob)
                .execute(&self.pool)
                .await
                .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        }
        Ok(())
    }

    async fn search(&self, table: &str, query_vec: &[f32], limit: i64) -> Result<Vec<VectorHit>, CoreError> {
        let table = table_name(table)?;
        let sql = format!("SELECT id, doc_id, text, uri, mime_type, vector FROM {table}");
        let rows: Vec<(String, String, String, String, String, Vec<u8>)> = sqlx::query_as(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        let mut hits: Vec<VectorHit> = rows
            .into_iter()
            .map(|(id, doc_id, text, uri, mime_type, blob)| {
                let vector = blob_to_vec(&blob);
                let score = cosine_similarity(query_vec, &vector) as f64;
                VectorHit {
                    id,
                    doc_id,
                    uri,
                    text,
                    mime_type,
                    score,
                }
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit.max(0) as usize);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn cosine_identical_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn unknown_table_name_rejected() {
        assert!(table_name("nope").is_err());
    }
}
