//! # Knowledge Harness
//!
//! **A personal knowledge platform: queue-driven multimodal ingestion plus
//! hybrid retrieval, built on pluggable graph/vector/KV/object stores.**
//!
//! Two subsystems share this crate:
//!
//! - **Ingestion.** Source connectors (out of scope for this crate — black boxes)
//!   drop [`models::IngestPayload`]s onto the ingest queue. The [`queue_worker`]
//!   drains it and hands each payload to the [`document_processor`], which turns a
//!   raw file/email/block into a normalized [`graph_store::DocumentBundle`]: pages,
//!   blocks, side-facets (emails, images, audio, transcripts), extracted entities,
//!   and relationship edges, deduplicated ([`dedup`]) and embedded ([`embedding`])
//!   along the way, then committed transactionally across the graph, vector, object,
//!   and KV stores.
//! - **Retrieval.** The [`retrieval`] orchestrator fans a query out across dense
//!   vector search, full-text lexical search, and entity-expansion graph traversal,
//!   merges candidates by document, reranks with a cross-encoder, diversifies with
//!   MMR, and caches the result under a request fingerprint. [`query_planner`]
//!   extracts entities, intent, and time ranges ahead of the fan-out.
//!
//! ```text
//! ┌────────────┐    ┌──────────────┐    ┌──────────────────┐
//! │   ingest   │───▶│ ingest queue │───▶│ document         │
//! │   queue    │    │   (C10)      │    │ processor (C9)    │
//! │  producer  │    └──────────────┘    └─────────┬─────────┘
//! └────────────┘                                   │
//!                         ┌─────────────┬──────────┼───────────┐
//!                         ▼             ▼          ▼           ▼
//!                   ┌──────────┐  ┌──────────┐ ┌────────┐ ┌─────────┐
//!                   │  graph   │  │  vector   │ │ object │ │   kv    │
//!                   │  store   │  │  store    │ │ store  │ │  store  │
//!                   │  (C7)    │  │  (C8)     │ │        │ │  (C6)   │
//!                   └────┬─────┘  └────┬──────┘ └────────┘ └────┬────┘
//!                        │             │                        │
//!                        └─────────────┴───────────┬────────────┘
//!                                                   ▼
//!                                       ┌────────────────────────┐
//!                                       │ retrieval orchestrator │
//!                                       │        (C11)           │
//!                                       └────────────┬────────────┘
//!                                                    ▼
//!                                              ask (CLI / façade)
//! ```
//!
//! A per-connector [`scheduler`] (C12) drives polling cadence for the ingestion
//! side; neither the scheduler nor the document processor reach across tenants —
//! multi-tenant isolation is explicitly out of scope for this crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types: `Document`, `Block`, entities, `IngestPayload` |
//! | [`errors`] | Shared `CoreError` type for store/processing failures |
//! | [`memory_guard`] | Host/accelerator memory pressure gate (C1) |
//! | [`model_registry`] | Single-flight model load/cache (C2) |
//! | [`dedup`] | Exact-hash and near-duplicate detection (C4) |
//! | [`extract`] | Text extraction from PDF/DOCX/PPTX/XLSX |
//! | [`kv_store`] | Dedup index, connector cursors, ingest queue, result cache (C6) |
//! | [`graph_store`] | Document/entity/relationship graph with FTS5 (C7) |
//! | [`vector_store`] | Named-table nearest-neighbor vector index (C8) |
//! | [`object_store`] | Content-addressed file storage |
//! | [`document_processor`] | Per-payload ingestion pipeline (C9) |
//! | [`queue_worker`] | Ingest queue consumer loop (C10) |
//! | [`retrieval`] | Hybrid fan-out, rerank, MMR, caching (C11) |
//! | [`scheduler`] | Per-connector polling cadence and backup trigger (C12) |
//! | [`query_planner`] | Entity/intent/time-range extraction for queries (C13) |
//! | [`embedding`] | Embedding provider, cross-encoder reranker, batch backpressure |
//! | [`db`] | SQLite connection pool with WAL mode |
//!
//! ## Configuration
//!
//! Knowledge Harness is configured via a TOML file (default: `config/khctl.toml`).
//! See [`config`] for all available options and [`config::load_config`] for
//! validation rules.

pub mod config;
pub mod db;
pub mod dedup;
pub mod document_processor;
pub mod embedding;
pub mod errors;
pub mod extract;
pub mod graph_store;
pub mod kv_store;
pub mod memory_guard;
pub mod migrate;
pub mod model_registry;
pub mod models;
pub mod object_store;
pub mod query_planner;
pub mod queue_worker;
pub mod retrieval;
pub mod scheduler;
pub mod vector_store;
