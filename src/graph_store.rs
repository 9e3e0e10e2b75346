//! Transactional graph bundle persistence and lexical/entity search (C7).
//!
//! Replaces the flat `documents`/`chunks` tables this crate previously kept with the
//! full §3 data model: documents, files, pages, blocks, email/image/audio/transcript
//! facets, the core/location entities, and a generic `edges(src, dst, edge_type)`
//! table for the nine relationship kinds. Each [`SqliteGraphStore::ingest_document_bundle`]
//! call commits in a single `sqlx` transaction (§5: "a bundle is all-or-nothing").

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::errors::CoreError;
use crate::models::{
    AudioNode, Block, Document, Email, Event, FileNode, ImageNode, Organization, Page, Person,
    Place, Project, Relationship, Transcript,
};

/// Everything derived from one source payload, ready to persist atomically.
#[derive(Debug, Clone, Default)]
pub struct DocumentBundle {
    pub document: Option<Document>,
    pub files: Vec<FileNode>,
    pub pages: Vec<Page>,
    pub blocks: Vec<Block>,
    pub emails: Vec<Email>,
    pub images: Vec<ImageNode>,
    pub audio: Vec<AudioNode>,
    pub transcripts: Vec<Transcript>,
    pub people: Vec<Person>,
    pub organizations: Vec<Organization>,
    pub projects: Vec<Project>,
    pub places: Vec<Place>,
    pub events: Vec<Event>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone)]
pub struct LexicalHit {
    pub block_id: String,
    pub doc_id: String,
    pub text: String,
    pub rank: f64,
}

#[derive(Debug, Clone)]
pub struct EntityHit {
    pub entity_id: String,
    pub kind: String,
    pub name: String,
    pub rank: f64,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn ingest_document_bundle(&self, bundle: &DocumentBundle) -> Result<(), CoreError>;

    async fn lexical_search(&self, query: &str, limit: i64) -> Result<Vec<LexicalHit>, CoreError>;

    async fn entity_search(&self, query: &str, limit: i64) -> Result<Vec<EntityHit>, CoreError>;

    /// One- to two-hop BFS over `edges` starting from `element_ids`, used to expand an
    /// entity hit into the documents/blocks that reference it (§4.8).
    async fn traverse_related(
        &self,
        element_ids: &[String],
        hops: u32,
        limit: i64,
    ) -> Result<Vec<String>, CoreError>;
}

pub struct SqliteGraphStore {
    pool: SqlitePool,
}

impl SqliteGraphStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), CoreError> {
        let ddl = [
            r#"CREATE TABLE IF NOT EXISTS documents (
                doc_id TEXT PRIMARY KEY,
                title TEXT,
                source TEXT NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                valid_from TEXT NOT NULL,
                valid_to TEXT,
                system_from TEXT NOT NULL,
                system_to TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS files (
                sha256 TEXT PRIMARY KEY,
                uri TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                perceptual_hash TEXT,
                created_at TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS pages (
                page_id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                page_index INTEGER NOT NULL,
                pooled_vector BLOB
            )"#,
            r#"CREATE TABLE IF NOT EXISTS blocks (
                block_id TEXT PRIMARY KEY,
                doc_id TEXT NOT NULL,
                block_type TEXT NOT NULL,
                text_content TEXT NOT NULL,
                page_id TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS emails (
                message_id TEXT PRIMARY KEY,
                thread_id TEXT,
                subject TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                sender TEXT NOT NULL,
                snippet TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS images (
                image_id TEXT PRIMARY KEY,
                image_type TEXT NOT NULL,
                capture_time_utc TEXT,
                capture_time_local TEXT,
                gps_lat REAL,
                gps_lon REAL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS audio (
                audio_id TEXT PRIMARY KEY,
                recorded_at TEXT,
                duration_seconds REAL NOT NULL,
                file_uri TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS transcripts (
                transcript_id TEXT PRIMARY KEY,
                text_content TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS people (
                entity_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS organizations (
                entity_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS projects (
                entity_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS places (
                entity_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            )"#,
            r#"CREATE TABLE IF NOT EXISTS events (
                entity_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                occurred_at TEXT
            )"#,
            r#"CREATE TABLE IF NOT EXISTS edges (
                src TEXT NOT NULL,
                dst TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                PRIMARY KEY (src, dst, edge_type)
            )"#,
            "CREATE INDEX IF NOT EXISTS idx_edges_dst ON edges (dst)",
            "CREATE INDEX IF NOT EXISTS idx_blocks_page ON blocks (page_id)",
            "CREATE INDEX IF NOT EXISTS idx_pages_doc ON pages (doc_id)",
        ];
        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        }

        // FTS5 indices, checked for existence the way this crate's prior migrations did.
        let fts_exists: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'document_text_fulltext'",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        if fts_exists.is_none() {
            sqlx::query(
                "CREATE VIRTUAL TABLE document_text_fulltext USING fts5(block_id UNINDEXED, doc_id UNINDEXED, text_content)",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        }

        let entity_fts_exists: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'entity_name_fulltext'",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        if entity_fts_exists.is_none() {
            sqlx::query(
                "CREATE VIRTUAL TABLE entity_name_fulltext USING fts5(entity_id UNINDEXED, kind UNINDEXED, name)",
            )
            .execute(&self.pool)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        }

        Ok(())
    }

    async fn upsert_document(tx: &mut Transaction<'_, Sqlite>, doc: &Document) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO documents (doc_id, title, source, version, created_at, valid_from, valid_to, system_from, system_to)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(doc_id) DO UPDATE SET title = excluded.title, source = excluded.source,
               version = excluded.version, valid_from = excluded.valid_from, valid_to = excluded.valid_to,
               system_from = excluded.system_from, system_to = excluded.system_to",
        )
        .bind(&doc.doc_id)
        .bind(&doc.title)
        .bind(&doc.source)
        .bind(doc.version)
        .bind(doc.created_at.to_rfc3339())
        .bind(doc.valid_from.to_rfc3339())
        .bind(doc.valid_to.map(|t| t.to_rfc3339()))
        .bind(doc.system_from.to_rfc3339())
        .bind(doc.system_to.map(|t| t.to_rfc3339()))
        .execute(&mut **tx)
        .await
        .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        Ok(())
    }

    async fn upsert_file(tx: &mut Transaction<'_, Sqlite>, file: &FileNode) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO files (sha256, uri, mime_type, size_bytes, perceptual_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(sha256) DO UPDATE SET uri = excluded.uri, mime_type = excluded.mime_type,
               size_bytes = excluded.size_bytes, perceptual_hash = excluded.perceptual_hash",
        )
        .bind(&file.sha256)
        .bind(&file.uri)
        .bind(&file.mime_type)
        .bind(file.size_bytes)
        .bind(&file.perceptual_hash)
        .bind(file.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await
        .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        Ok(())
    }

    async fn upsert_page(tx: &mut Transaction<'_, Sqlite>, page: &Page) -> Result<(), CoreError> {
        let pooled = page.pooled_vector.as_ref().map(|v| crate::vector_store::vec_to_blob(v));
        sqlx::query(
            "INSERT INTO pages (page_id, doc_id, page_index, pooled_vector) VALUES (?, ?, ?, ?)
             ON CONFLICT(page_id) DO UPDATE SET doc_id = excluded.doc_id, page_index = excluded.page_index,
               pooled_vector = excluded.pooled_vector",
        )
        .bind(&page.page_id)
        .bind(&page.doc_id)
        .bind(page.page_index)
        .bind(pooled)
        .execute(&mut **tx)
        .await
        .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        Ok(())
    }

    async fn upsert_block(tx: &mut Transaction<'_, Sqlite>, block: &Block) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO blocks (block_id, doc_id, block_type, text_content, page_id) VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(block_id) DO UPDATE SET doc_id = excluded.doc_id, block_type = excluded.block_type,
               text_content = excluded.text_content, page_id = excluded.page_id",
        )
        .bind(&block.block_id)
        .bind(&block.doc_id)
        .bind(format!("{:?}", block.block_type))
        .bind(&block.text_content)
        .bind(&block.page_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| CoreError::BundleWrite(e.to_string()))?;

        sqlx::query("DELETE FROM document_text_fulltext WHERE block_id = ?")
            .bind(&block.block_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        sqlx::query(
            "INSERT INTO document_text_fulltext (block_id, doc_id, text_content) VALUES (?, ?, ?)",
        )
        .bind(&block.block_id)
        .bind(&block.doc_id)
        .bind(&block.text_content)
        .execute(&mut **tx)
        .await
        .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        Ok(())
    }

    async fn upsert_named_entity(
        tx: &mut Transaction<'_, Sqlite>,
        table: &str,
        entity_id: &str,
        name: &str,
        kind: &str,
    ) -> Result<(), CoreError> {
        let sql = format!(
            "INSERT INTO {table} (entity_id, name) VALUES (?, ?)
             ON CONFLICT(entity_id) DO UPDATE SET name = excluded.name"
        );
        sqlx::query(&sql)
            .bind(entity_id)
            .bind(name)
            .execute(&mut **tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;

        sqlx::query("DELETE FROM entity_name_fulltext WHERE entity_id = ?")
            .bind(entity_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        sqlx::query("INSERT INTO entity_name_fulltext (entity_id, kind, name) VALUES (?, ?, ?)")
            .bind(entity_id)
            .bind(kind)
            .bind(name)
            .execute(&mut **tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        Ok(())
    }

    async fn upsert_edge(tx: &mut Transaction<'_, Sqlite>, rel: &Relationship) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO edges (src, dst, edge_type) VALUES (?, ?, ?)
             ON CONFLICT(src, dst, edge_type) DO NOTHING",
        )
        .bind(&rel.source_id)
        .bind(&rel.target_id)
        .bind(&rel.edge_type)
        .execute(&mut **tx)
        .await
        .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn ingest_document_bundle(&self, bundle: &DocumentBundle) -> Result<(), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;

        if let Some(doc) = &bundle.document {
            Self::upsert_document(&mut tx, doc).await?;
        }
        for file in &bundle.files {
            Self::upsert_file(&mut tx, file).await?;
        }
        for page in &bundle.pages {
            Self::upsert_page(&mut tx, page).await?;
        }
        for block in &bundle.blocks {
            Self::upsert_block(&mut tx, block).await?;
        }
        for email in &bundle.emails {
            sqlx::query(
                "INSERT INTO emails (message_id, thread_id, subject, sent_at, sender, snippet) VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(message_id) DO UPDATE SET thread_id = excluded.thread_id, subject = excluded.subject,
                   sent_at = excluded.sent_at, sender = excluded.sender, snippet = excluded.snippet",
            )
            .bind(&email.message_id)
            .bind(&email.thread_id)
            .bind(&email.subject)
            .bind(email.sent_at.to_rfc3339())
            .bind(&email.sender)
            .bind(&email.snippet)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        }
        for image in &bundle.images {
            let (lat, lon) = image.gps_coords.map(|(a, b)| (Some(a), Some(b))).unwrap_or((None, None));
            sqlx::query(
                "INSERT INTO images (image_id, image_type, capture_time_utc, capture_time_local, gps_lat, gps_lon)
                 VALUES (?, ?, ?, ?, ?, ?)
                 ON CONFLICT(image_id) DO UPDATE SET image_type = excluded.image_type,
                   capture_time_utc = excluded.capture_time_utc, capture_time_local = excluded.capture_time_local,
                   gps_lat = excluded.gps_lat, gps_lon = excluded.gps_lon",
            )
            .bind(&image.image_id)
            .bind(&image.image_type)
            .bind(image.capture_time_utc.map(|t| t.to_rfc3339()))
            .bind(&image.capture_time_local)
            .bind(lat)
            .bind(lon)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        }
        for audio in &bundle.audio {
            sqlx::query(
                "INSERT INTO audio (audio_id, recorded_at, duration_seconds, file_uri) VALUES (?, ?, ?, ?)
                 ON CONFLICT(audio_id) DO UPDATE SET recorded_at = excluded.recorded_at,
                   duration_seconds = excluded.duration_seconds, file_uri = excluded.file_uri",
            )
            .bind(&audio.audio_id)
            .bind(audio.recorded_at.map(|t| t.to_rfc3339()))
            .bind(audio.duration_seconds)
            .bind(&audio.file_uri)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        }
        for transcript in &bundle.transcripts {
            sqlx::query(
                "INSERT INTO transcripts (transcript_id, text_content) VALUES (?, ?)
                 ON CONFLICT(transcript_id) DO UPDATE SET text_content = excluded.text_content",
            )
            .bind(&transcript.transcript_id)
            .bind(&transcript.text_content)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        }
        for person in &bundle.people {
            Self::upsert_named_entity(&mut tx, "people", &person.person_id, &person.full_name, "person").await?;
        }
        for org in &bundle.organizations {
            Self::upsert_named_entity(&mut tx, "organizations", &org.org_id, &org.org_name, "organization").await?;
        }
        for project in &bundle.projects {
            Self::upsert_named_entity(&mut tx, "projects", &project.project_id, &project.project_name, "project").await?;
        }
        for place in &bundle.places {
            Self::upsert_named_entity(&mut tx, "places", &place.place_id, &place.place_name, "place").await?;
        }
        for event in &bundle.events {
            sqlx::query(
                "INSERT INTO events (entity_id, name, occurred_at) VALUES (?, ?, ?)
                 ON CONFLICT(entity_id) DO UPDATE SET name = excluded.name, occurred_at = excluded.occurred_at",
            )
            .bind(&event.event_id)
            .bind(&event.title)
            .bind(event.starts_at.map(|t| t.to_rfc3339()))
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
            sqlx::query("DELETE FROM entity_name_fulltext WHERE entity_id = ?")
                .bind(&event.event_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
            sqlx::query("INSERT INTO entity_name_fulltext (entity_id, kind, name) VALUES (?, ?, ?)")
                .bind(&event.event_id)
                .bind("event")
                .bind(&event.title)
                .execute(&mut *tx)
                .await
                .map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        }
        for rel in &bundle.relationships {
            Self::upsert_edge(&mut tx, rel).await?;
        }

        tx.commit().await.map_err(|e| CoreError::BundleWrite(e.to_string()))?;
        Ok(())
    }

    async fn lexical_search(&self, query: &str, limit: i64) -> Result<Vec<LexicalHit>, CoreError> {
        let rows: Vec<(String, String, String, f64)> = sqlx::query_as(
            "SELECT block_id, doc_id, text_content, bm25(document_text_fulltext) AS rank
             FROM document_text_fulltext WHERE document_text_fulltext MATCH ?
             ORDER BY rank LIMIT ?",
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(block_id, doc_id, text, rank)| LexicalHit {
                block_id,
                doc_id,
                text,
                // bm25() returns lower-is-better; invert so higher score means better, matching
                // the dense/entity channels this is merged with.
                rank: -rank,
            })
            .collect())
    }

    async fn entity_search(&self, query: &str, limit: i64) -> Result<Vec<EntityHit>, CoreError> {
        let rows: Vec<(String, String, String, f64)> = sqlx::query_as(
            "SELECT entity_id, kind, name, bm25(entity_name_fulltext) AS rank
             FROM entity_name_fulltext WHERE entity_name_fulltext MATCH ?
             ORDER BY rank LIMIT ?",
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(entity_id, kind, name, rank)| EntityHit {
                entity_id,
                kind,
                name,
                rank: -rank,
            })
            .collect())
    }

    async fn traverse_related(
        &self,
        element_ids: &[String],
        hops: u32,
        limit: i64,
    ) -> Result<Vec<String>, CoreError> {
        let mut frontier: Vec<String> = element_ids.to_vec();
        let mut visited: std::collections::HashSet<String> = element_ids.iter().cloned().collect();
        let mut collected: Vec<String> = Vec::new();

        for _ in 0..hops.max(1) {
            let mut next = Vec::new();
            for id in &frontier {
                let neighbors: Vec<(String,)> =
                    sqlx::query_as("SELECT dst FROM edges WHERE src = ? UNION SELECT src FROM edges WHERE dst = ?")
                        .bind(id)
                        .bind(id)
                        .fetch_all(&self.pool)
                        .await
                        .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
                for (neighbor,) in neighbors {
                    if visited.insert(neighbor.clone()) {
                        collected.push(neighbor.clone());
                        next.push(neighbor);
                        if collected.len() as i64 >= limit {
                            return Ok(collected);
                        }
                    }
                }
            }
            frontier = next;
            if frontier.is_empty() {
                break;
            }
        }
        Ok(collected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BlockType, EdgeType};
    use chrono::Utc;
    use sqlx::sqlite::SqliteConnectOptions;
    use std::str::FromStr;

    async fn memory_store() -> SqliteGraphStore {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePool::connect_with(opts).await.unwrap();
        let store = SqliteGraphStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn sample_bundle() -> DocumentBundle {
        let now = Utc::now();
        DocumentBundle {
            document: Some(Document {
                doc_id: "doc-1".into(),
                title: Some("Quarterly plan".into()),
                source: "filesystem".into(),
                version: 1,
                created_at: now,
                valid_from: now,
                valid_to: None,
                system_from: now,
                system_to: None,
            }),
            pages: vec![Page {
                page_id: Page::derive_id("doc-1", 0),
                doc_id: "doc-1".into(),
                page_index: 0,
                pooled_vector: None,
            }],
            blocks: vec![Block {
                block_id: "doc-1::block::0".into(),
                doc_id: "doc-1".into(),
                block_type: BlockType::Text,
                text_content: "Project Atlas kickoff meeting notes".into(),
                text_vector: None,
                page_id: Some(Page::derive_id("doc-1", 0)),
            }],
            people: vec![crate::models::Person {
                person_id: crate::models::entity_id("person", "Ada Lovelace"),
                full_name: "Ada Lovelace".into(),
                email_addresses: vec![],
            }],
            relationships: vec![Relationship {
                source_id: "doc-1".into(),
                target_id: crate::models::entity_id("person", "Ada Lovelace"),
                edge_type: EdgeType::HasFile.as_str().into(),
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn ingest_bundle_then_lexical_search_finds_block() {
        let store = memory_store().await;
        store.ingest_document_bundle(&sample_bundle()).await.unwrap();
        let hits = store.lexical_search("Atlas", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "doc-1");
    }

    #[tokio::test]
    async fn ingest_bundle_then_entity_search_finds_person() {
        let store = memory_store().await;
        store.ingest_document_bundle(&sample_bundle()).await.unwrap();
        let hits = store.entity_search("Lovelace", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, "person");
    }

    #[tokio::test]
    async fn reingesting_same_bundle_is_idempotent() {
        let store = memory_store().await;
        let bundle = sample_bundle();
        store.ingest_document_bundle(&bundle).await.unwrap();
        store.ingest_document_bundle(&bundle).await.unwrap();
        let hits = store.lexical_search("Atlas", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn traverse_related_follows_edges() {
        let store = memory_store().await;
        store.ingest_document_bundle(&sample_bundle()).await.unwrap();
        let related = store.traverse_related(&["doc-1".to_string()], 1, 10).await.unwrap();
        assert_eq!(related.len(), 1);
    }
}
