//! Durable key-value surface (C6): dedup indices, connector cursors, the ingest
//! queue, and the retrieval result cache (§6).
//!
//! The trait is the external contract; [`SqliteKvStore`] is the reference backend,
//! reusing this crate's existing `sqlx`/SQLite connection rather than adding a
//! Redis-alike dependency.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::time::{sleep, timeout, Duration};

use crate::errors::CoreError;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError>;
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<(), CoreError>;
    async fn hget(&self, hash_key: &str, field: &str) -> Result<Option<String>, CoreError>;
    async fn hset(&self, hash_key: &str, field: &str, value: &str) -> Result<(), CoreError>;
    async fn hgetall(&self, hash_key: &str) -> Result<Vec<(String, String)>, CoreError>;
    async fn lpush(&self, list_key: &str, value: &str) -> Result<(), CoreError>;
    /// Pops the oldest element (FIFO w.r.t. `lpush` producers), blocking up to
    /// `timeout_secs`. Returns `None` on timeout, matching BRPOP semantics.
    async fn brpop(&self, list_key: &str, timeout_secs: u64) -> Result<Option<String>, CoreError>;
}

pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_hashes (
                hash_key TEXT NOT NULL,
                field TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (hash_key, field)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                list_key TEXT NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        Ok(())
    }

    async fn pop_one(&self, list_key: &str) -> Result<Option<String>, CoreError> {
        let row: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, value FROM kv_queue WHERE list_key = ? ORDER BY id ASC LIMIT 1",
        )
        .bind(list_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        let Some((id, value)) = row else {
            return Ok(None);
        };
        sqlx::query("DELETE FROM kv_queue WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(Some(value))
    }
}

#[async_trait]
impl KvStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoreError> {
        let now = chrono::Utc::now().timestamp();
        let row: Option<(String, Option<i64>)> =
            sqlx::query_as("SELECT value, expires_at FROM kv_entries WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.and_then(|(value, expires_at)| match expires_at {
            Some(exp) if exp < now => None,
            _ => Some(value),
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<i64>) -> Result<(), CoreError> {
        let expires_at = ttl_secs.map(|ttl| chrono::Utc::now().timestamp() + ttl);
        sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn hget(&self, hash_key: &str, field: &str) -> Result<Option<String>, CoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM kv_hashes WHERE hash_key = ? AND field = ?")
                .bind(hash_key)
                .bind(field)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(row.map(|(v,)| v))
    }

    async fn hset(&self, hash_key: &str, field: &str, value: &str) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO kv_hashes (hash_key, field, value) VALUES (?, ?, ?)
             ON CONFLICT(hash_key, field) DO UPDATE SET value = excluded.value",
        )
        .bind(hash_key)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn hgetall(&self, hash_key: &str) -> Result<Vec<(String, String)>, CoreError> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT field, value FROM kv_hashes WHERE hash_key = ?")
                .bind(hash_key)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(rows)
    }

    async fn lpush(&self, list_key: &str, value: &str) -> Result<(), CoreError> {
        sqlx::query("INSERT INTO kv_queue (list_key, value) VALUES (?, ?)")
            .bind(list_key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(())
    }

    async fn brpop(&self, list_key: &str, timeout_secs: u64) -> Result<Option<String>, CoreError> {
        let deadline = Duration::from_secs(timeout_secs);
        let result = timeout(deadline, async {
            loop {
                if let Some(value) = self.pop_one(list_key).await? {
                    return Ok(Some(value));
                }
                sleep(Duration::from_millis(200)).await;
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    async fn memory_store() -> SqliteKvStore {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        let store = SqliteKvStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let store = memory_store().await;
        store.set("ask:x:5", "payload", None).await.unwrap();
        assert_eq!(store.get("ask:x:5").await.unwrap(), Some("payload".into()));
    }

    #[tokio::test]
    async fn expired_ttl_is_absent() {
        let store = memory_store().await;
        store.set("k", "v", Some(-1)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn hash_roundtrip() {
        let store = memory_store().await;
        store.hset("dedupe:simhash", "abc", "123").await.unwrap();
        store.hset("dedupe:simhash", "def", "456").await.unwrap();
        let all = store.hgetall("dedupe:simhash").await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn queue_fifo_and_timeout() {
        let store = memory_store().await;
        store.lpush("ingest:documents", "job-1").await.unwrap();
        let popped = store.brpop("ingest:documents", 1).await.unwrap();
        assert_eq!(popped, Some("job-1".into()));
        let empty = store.brpop("ingest:documents", 1).await.unwrap();
        assert_eq!(empty, None);
    }
}
