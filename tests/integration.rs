//! End-to-end scenarios against the SQLite reference stores. Each test corresponds to
//! one of the worked examples: ingesting a plain-text file (S1), deriving Person nodes
//! and SENT_BY/RECEIVED_BY edges from an email payload (S2), query-planner temporal
//! classification (S4), near-duplicate detection across two files (S5), and
//! retrieval's cache-hit short-circuit (S6).

use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;

use knowledge_harness::config::{EmbeddingConfig, RetrievalConfig};
use knowledge_harness::document_processor::DocumentProcessor;
use knowledge_harness::embedding::{
    CrossEncoderModel, DisabledImageEmbedder, DisabledProvider, Reranker, TextEmbedder,
};
use knowledge_harness::errors::CoreError;
use knowledge_harness::extract::{NullOcrProvider, NullTranscriber};
use knowledge_harness::graph_store::{DocumentBundle, EntityHit, GraphStore, LexicalHit, SqliteGraphStore};
use knowledge_harness::kv_store::{KvStore, SqliteKvStore};
use knowledge_harness::memory_guard::MemoryGuard;
use knowledge_harness::models::{
    Block, BlockType, Document, DocumentDescriptor, EmailDescriptor, FileDescriptor, IngestPayload,
};
use knowledge_harness::object_store::LocalObjectStore;
use knowledge_harness::query_planner::{Intent, QueryPlanner};
use knowledge_harness::retrieval::RetrievalOrchestrator;
use knowledge_harness::vector_store::{SqliteVectorStore, VectorHit, VectorRow, VectorStore};

async fn memory_pool() -> SqlitePool {
    let opts = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
    SqlitePool::connect_with(opts).await.unwrap()
}

fn fixed_doc(doc_id: &str) -> DocumentDescriptor {
    let now = Utc::now();
    DocumentDescriptor {
        doc_id: doc_id.to_string(),
        version: 1,
        title: None,
        source: "filesystem".into(),
        created_at: now,
        valid_from: now,
        valid_to: None,
        system_from: now,
        system_to: None,
    }
}

async fn build_processor() -> (
    Arc<SqliteGraphStore>,
    Arc<SqliteVectorStore>,
    Arc<SqliteKvStore>,
    tempfile::TempDir,
    DocumentProcessor<SqliteGraphStore, SqliteVectorStore, LocalObjectStore, SqliteKvStore>,
) {
    let pool = memory_pool().await;
    let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
    graph.migrate().await.unwrap();
    let vector = Arc::new(SqliteVectorStore::new(pool.clone()));
    vector.migrate().await.unwrap();
    let kv = Arc::new(SqliteKvStore::new(pool.clone()));
    kv.migrate().await.unwrap();

    let object_dir = tempfile::tempdir().unwrap();
    let object = Arc::new(LocalObjectStore::new(object_dir.path(), "knowledge", "http://localhost:9000"));

    let embedder = TextEmbedder::new(EmbeddingConfig::default(), Arc::new(MemoryGuard::new(0)));
    let processor = DocumentProcessor::new(
        graph.clone(),
        vector.clone(),
        object,
        kv.clone(),
        embedder,
        Box::new(DisabledProvider),
        Box::new(DisabledImageEmbedder),
        Box::new(NullOcrProvider),
        Box::new(NullTranscriber),
    );
    (graph, vector, kv, object_dir, processor)
}

/// S1: ingest payload with one `.md` file containing "Project Alpha kickoff meeting
/// notes" produces one Document, one File (real SHA-256), one Page (index 0), one text
/// Block; and `dedupe:sha256` records the file's SHA-256 against its doc_id.
#[tokio::test]
async fn s1_ingests_single_markdown_file_into_one_block() {
    let (graph, _vector, kv, source_dir, processor) = build_processor().await;

    let source_path = source_dir.path().join("kickoff.md");
    let contents = b"Project Alpha kickoff meeting notes";
    tokio::fs::write(&source_path, contents).await.unwrap();
    let expected_sha256 = knowledge_harness::dedup::compute_sha256_bytes(contents);

    let payload = IngestPayload {
        document: fixed_doc("doc-alpha"),
        files: vec![FileDescriptor {
            uri: source_path.to_string_lossy().into_owned(),
            mime_type: Some("text/markdown".into()),
            sha256: None,
            size_bytes: None,
            created_at: None,
            duration_seconds: None,
        }],
        block: None,
        email: None,
        image: None,
        entities: None,
        relationships: vec![],
    };

    processor.process(&payload).await.unwrap();

    let hits = graph.lexical_search("kickoff", 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_id, "doc-alpha");

    let expected_block_id = format!("doc-alpha::block::{expected_sha256}");
    assert_eq!(hits[0].block_id, expected_block_id);

    let dedup_entry = kv.get(&format!("dedupe:sha256:{expected_sha256}")).await.unwrap();
    assert_eq!(dedup_entry.as_deref(), Some("doc-alpha"));
}

/// S2: ingesting an email payload from `alice@example.com` to `bob@example.com`
/// produces two Person nodes with entity IDs derived from §3's formula, an
/// Email→Document `ATTACHMENT` edge, and SENT_BY/RECEIVED_BY edges to each Person.
#[tokio::test]
async fn s2_email_payload_derives_person_nodes_and_edges() {
    let (graph, _vector, _kv, _dir, processor) = build_processor().await;

    let now = Utc::now();
    let payload = IngestPayload {
        document: fixed_doc("doc-email-1"),
        files: vec![],
        block: None,
        email: Some(EmailDescriptor {
            message_id: "msg-1".into(),
            thread_id: None,
            subject: "Kickoff".into(),
            sent_at: now,
            sender: "alice@example.com".into(),
            recipients: vec!["bob@example.com".into()],
            cc_list: vec![],
            bcc_list: vec![],
            snippet: "See you there".into(),
            text_vector: None,
        }),
        image: None,
        entities: None,
        relationships: vec![],
    };

    processor.process(&payload).await.unwrap();

    let alice_id = knowledge_harness::models::entity_id("person", "alice@example.com");
    let bob_id = knowledge_harness::models::entity_id("person", "bob@example.com");

    let alice_hits = graph.entity_search("alice", 5).await.unwrap();
    assert!(alice_hits.iter().any(|h| h.entity_id == alice_id));
    let bob_hits = graph.entity_search("bob", 5).await.unwrap();
    assert!(bob_hits.iter().any(|h| h.entity_id == bob_id));

    let from_message = graph.traverse_related(&["msg-1".to_string()], 1, 10).await.unwrap();
    assert!(from_message.contains(&"doc-email-1".to_string()));
}

/// S4: the query planner classifies "When was Project Alpha kickoff?" as temporal,
/// extracts "Project Alpha" as an entity, and produces a time range.
#[test]
fn s4_when_question_is_temporal_with_entity_and_time_range() {
    let planner = QueryPlanner::new();
    let plan = planner.plan("When was Project Alpha kickoff?", Utc::now());
    assert_eq!(plan.intent, Intent::Temporal);
    assert!(plan.entities.iter().any(|e| e == "Project Alpha"));
    assert!(plan.time_range.is_some());
}

/// S5: two files whose extracted text differs by only a couple of words (within the
/// 64-bit simhash Hamming-distance threshold) produce a NEAR_DUPLICATE edge between
/// their File nodes.
#[tokio::test]
async fn s5_near_identical_files_get_one_near_duplicate_edge() {
    let (graph, _vector, _kv, source_dir, processor) = build_processor().await;

    let path_a = source_dir.path().join("report-v1.txt");
    let path_b = source_dir.path().join("report-v2.txt");
    let text_a = "Quarterly budget review meeting notes for the finance team covering headcount and spend";
    let text_b = "Quarterly budget review meeting notes for the finance team covering headcount and costs";
    tokio::fs::write(&path_a, text_a).await.unwrap();
    tokio::fs::write(&path_b, text_b).await.unwrap();

    let sha_a = knowledge_harness::dedup::compute_sha256_bytes(text_a.as_bytes());
    let sha_b = knowledge_harness::dedup::compute_sha256_bytes(text_b.as_bytes());

    for (doc_id, path) in [("doc-report-1", &path_a), ("doc-report-2", &path_b)] {
        let payload = IngestPayload {
            document: fixed_doc(doc_id),
            files: vec![FileDescriptor {
                uri: path.to_string_lossy().into_owned(),
                mime_type: Some("text/plain".into()),
                sha256: None,
                size_bytes: None,
                created_at: None,
                duration_seconds: None,
            }],
            block: None,
            email: None,
            image: None,
            entities: None,
            relationships: vec![],
        };
        processor.process(&payload).await.unwrap();
    }

    let related = graph
        .traverse_related(&[format!("file:{sha_a}")], 1, 10)
        .await
        .unwrap();
    assert!(related.contains(&"doc-report-2".to_string()) || related.contains(&format!("file:{sha_b}")));
}

// --- S6: repeated retrieve() calls hit the cache on the second call ---

struct CountingGraphStore {
    inner: Arc<SqliteGraphStore>,
    lexical_calls: AtomicUsize,
    entity_calls: AtomicUsize,
}

#[async_trait]
impl GraphStore for CountingGraphStore {
    async fn ingest_document_bundle(&self, bundle: &DocumentBundle) -> Result<(), CoreError> {
        self.inner.ingest_document_bundle(bundle).await
    }

    async fn lexical_search(&self, query: &str, limit: i64) -> Result<Vec<LexicalHit>, CoreError> {
        self.lexical_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.lexical_search(query, limit).await
    }

    async fn entity_search(&self, query: &str, limit: i64) -> Result<Vec<EntityHit>, CoreError> {
        self.entity_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.entity_search(query, limit).await
    }

    async fn traverse_related(&self, element_ids: &[String], hops: u32, limit: i64) -> Result<Vec<String>, CoreError> {
        self.inner.traverse_related(element_ids, hops, limit).await
    }
}

struct CountingVectorStore {
    inner: Arc<SqliteVectorStore>,
    search_calls: AtomicUsize,
}

#[async_trait]
impl VectorStore for CountingVectorStore {
    async fn upsert_vectors(&self, table: &str, rows: &[VectorRow]) -> Result<(), CoreError> {
        self.inner.upsert_vectors(table, rows).await
    }

    async fn search(&self, table: &str, query_vec: &[f32], limit: i64) -> Result<Vec<VectorHit>, CoreError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.search(table, query_vec, limit).await
    }
}

struct ZeroModel;

impl CrossEncoderModel for ZeroModel {
    fn score_pair(&self, _query: &str, _document: &str) -> anyhow::Result<f32> {
        Ok(0.0)
    }
}

#[tokio::test]
async fn s6_second_retrieve_call_is_served_from_cache() {
    let pool = memory_pool().await;
    let graph_inner = Arc::new(SqliteGraphStore::new(pool.clone()));
    graph_inner.migrate().await.unwrap();
    let vector_inner = Arc::new(SqliteVectorStore::new(pool.clone()));
    vector_inner.migrate().await.unwrap();
    let kv = Arc::new(SqliteKvStore::new(pool.clone()));
    kv.migrate().await.unwrap();

    // Seed one document whose block text the lexical channel can find, so the first
    // `retrieve()` call produces a non-empty (and therefore cacheable) result.
    let now = Utc::now();
    let bundle = DocumentBundle {
        document: Some(Document {
            doc_id: "doc-seed".into(),
            title: None,
            source: "filesystem".into(),
            version: 1,
            created_at: now,
            valid_from: now,
            valid_to: None,
            system_from: now,
            system_to: None,
        }),
        blocks: vec![Block {
            block_id: "doc-seed::block::0".into(),
            doc_id: "doc-seed".into(),
            block_type: BlockType::Text,
            text_content: "project alpha budget review notes".into(),
            text_vector: None,
            page_id: None,
        }],
        ..Default::default()
    };
    graph_inner.ingest_document_bundle(&bundle).await.unwrap();

    let graph = Arc::new(CountingGraphStore {
        inner: graph_inner,
        lexical_calls: AtomicUsize::new(0),
        entity_calls: AtomicUsize::new(0),
    });
    let vector = Arc::new(CountingVectorStore {
        inner: vector_inner,
        search_calls: AtomicUsize::new(0),
    });

    let orchestrator = RetrievalOrchestrator::new(
        graph.clone(),
        vector.clone(),
        kv.clone(),
        Reranker::new(ZeroModel),
        Box::new(DisabledProvider),
        EmbeddingConfig::default(),
        RetrievalConfig {
            candidate_k_keyword: 80,
            candidate_k_vector: 80,
            final_limit: 5,
        },
    );

    let first = orchestrator.retrieve("project alpha budget").await.unwrap();
    assert!(!first.is_empty());
    let lexical_after_first = graph.lexical_calls.load(Ordering::SeqCst);
    let search_after_first = vector.search_calls.load(Ordering::SeqCst);
    assert!(lexical_after_first >= 1);

    let second = orchestrator.retrieve("project alpha budget").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(graph.lexical_calls.load(Ordering::SeqCst), lexical_after_first);
    assert_eq!(vector.search_calls.load(Ordering::SeqCst), search_after_first);
}
