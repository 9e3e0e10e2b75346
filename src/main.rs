//! # khctl
//!
//! CLI entry point for the knowledge platform's ingestion worker, scheduler, and
//! retrieval orchestrator. Source connectors are out of scope for this crate (§1) —
//! `enqueue` exists so an external connector process (or a test) can hand this binary
//! an [`models::IngestPayload`] without needing its own queue client.

mod config;
mod db;
mod dedup;
mod document_processor;
mod embedding;
mod errors;
mod extract;
mod graph_store;
mod kv_store;
mod memory_guard;
mod migrate;
mod model_registry;
mod models;
mod object_store;
mod query_planner;
mod queue_worker;
mod retrieval;
mod scheduler;
mod vector_store;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use config::Config;
use document_processor::DocumentProcessor;
use embedding::{create_provider, DisabledImageEmbedder, HeuristicCrossEncoder, Reranker, TextEmbedder};
use extract::{NullOcrProvider, NullTranscriber};
use graph_store::SqliteGraphStore;
use kv_store::{KvStore, SqliteKvStore};
use memory_guard::MemoryGuard;
use object_store::LocalObjectStore;
use queue_worker::{QueueWorker, INGEST_QUEUE_KEY};
use retrieval::RetrievalOrchestrator;
use scheduler::{ConnectorRun, Scheduler};
use vector_store::SqliteVectorStore;

#[derive(Parser)]
#[command(
    name = "khctl",
    about = "Knowledge Harness — ingestion pipeline and hybrid retrieval orchestrator",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/khctl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the graph/vector/KV schemas and the object store root.
    Init,

    /// Push a JSON-encoded ingest payload file onto the ingest queue.
    Enqueue {
        /// Path to a file containing one JSON `IngestPayload`.
        path: PathBuf,
    },

    /// Drain the ingest queue, processing each payload into the stores.
    Worker,

    /// Run the per-connector polling scheduler and the daily backup trigger.
    Schedule,

    /// Run one hybrid retrieval query and print the ranked citations.
    Ask {
        /// Free-text query.
        query: String,
    },
}

/// Placeholder connector runner: this crate treats source connectors as black boxes
/// (§1), so the scheduler has nothing concrete to invoke on its own. A deployment
/// wires a real [`ConnectorRun`] implementation that shells out to (or calls into)
/// its connector process; this one just confirms the cadence is firing.
struct NoopConnectorRunner;

#[async_trait::async_trait]
impl ConnectorRun for NoopConnectorRunner {
    async fn run_once(&self, connector_name: &str) -> anyhow::Result<()> {
        tracing::info!(connector = connector_name, "scheduled tick fired; no connector wired");
        Ok(())
    }
}

async fn build_stores(
    cfg: &Config,
) -> anyhow::Result<(Arc<SqliteGraphStore>, Arc<SqliteVectorStore>, Arc<SqliteKvStore>, Arc<LocalObjectStore>)> {
    let pool = db::connect(cfg).await?;
    let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
    let vector = Arc::new(SqliteVectorStore::new(pool.clone()));
    let kv = Arc::new(SqliteKvStore::new(pool.clone()));
    graph.migrate().await?;
    vector.migrate().await?;
    kv.migrate().await?;
    let object = Arc::new(LocalObjectStore::new(
        &cfg.stores.object_store_root,
        &cfg.stores.bucket,
        &cfg.stores.endpoint,
    ));
    Ok((graph, vector, kv, object))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Stores initialized successfully.");
        }

        Commands::Enqueue { path } => {
            let (_, _, kv, _) = build_stores(&cfg).await?;
            let raw = tokio::fs::read_to_string(&path).await?;
            // Validate before enqueueing so a malformed payload fails fast here rather
            // than being silently dropped by the worker later.
            let _: models::IngestPayload = serde_json::from_str(&raw)?;
            kv.lpush(INGEST_QUEUE_KEY, &raw).await?;
            println!("Enqueued payload from {}", path.display());
        }

        Commands::Worker => {
            let (graph, vector, kv, object) = build_stores(&cfg).await?;
            let memory_guard = Arc::new(MemoryGuard::new(cfg.memory_guard.min_free_mb * 1024 * 1024));
            let embedder = TextEmbedder::new(cfg.embedding.clone(), memory_guard);
            let provider = create_provider(&cfg.embedding)?;
            let processor = Arc::new(DocumentProcessor::new(
                graph,
                vector,
                object,
                kv.clone(),
                embedder,
                provider,
                Box::new(DisabledImageEmbedder),
                Box::new(NullOcrProvider),
                Box::new(NullTranscriber),
            ));
            let worker = QueueWorker::new(kv, processor);

            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let ctrl_c = tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                let _ = shutdown_tx.send(true);
            });
            tracing::info!("ingest worker started");
            worker.run(shutdown_rx).await;
            ctrl_c.abort();
        }

        Commands::Schedule => {
            let runner = Arc::new(NoopConnectorRunner);
            let mut scheduler = Scheduler::new(cfg.scheduler.clone(), runner);
            let connector_names: Vec<String> = cfg
                .connectors
                .filesystem
                .as_ref()
                .map(|_| "filesystem".to_string())
                .into_iter()
                .chain(cfg.connectors.git.as_ref().map(|_| "git".to_string()))
                .chain(cfg.connectors.s3.as_ref().map(|_| "s3".to_string()))
                .collect();
            let mut handles = scheduler.spawn_connectors(&connector_names);
            handles.push(scheduler.spawn_daily_backup(|| async {
                tracing::info!("daily backup trigger fired (backup itself is out of scope)");
                Ok(())
            }));
            tracing::info!(connectors = ?connector_names, "scheduler started");
            for handle in handles {
                let _ = handle.await;
            }
        }

        Commands::Ask { query } => {
            let (graph, vector, kv, _object) = build_stores(&cfg).await?;
            let provider = create_provider(&cfg.embedding)?;
            let reranker = Reranker::new(HeuristicCrossEncoder);
            let orchestrator =
                RetrievalOrchestrator::new(graph, vector, kv, reranker, provider, cfg.embedding.clone(), cfg.retrieval.clone());
            let started = std::time::Instant::now();
            let results = orchestrator.retrieve(&query).await?;
            let latency_ms = started.elapsed().as_millis();
            for (idx, doc) in results.iter().enumerate() {
                println!("{}. [{:.3}] {} — {}", idx + 1, doc.score, doc.doc_id, doc.text);
            }
            println!("({} citations in {}ms)", results.len(), latency_ms);
        }
    }

    Ok(())
}
