//! Configuration parsing and validation.
//!
//! Knowledge Harness is configured via a TOML file (default: `config/khctl.toml`).
//! The config defines the database path, chunking parameters, embedding provider
//! settings, retrieval tuning, scheduler cadence, store locations, and connector
//! cadence overrides. Connector execution itself is out of scope for this crate —
//! these structs only describe which connectors exist and how often the scheduler
//! should tick them.
//!
//! # Connectors
//!
//! Three connector kinds are recognized for scheduling purposes:
//! - **Filesystem** (`[connectors.filesystem]`)
//! - **Git** (`[connectors.git]`)
//! - **S3** (`[connectors.s3]`)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub connectors: ConnectorsConfig,
    #[serde(default)]
    pub memory_guard: MemoryGuardConfig,
    #[serde(default)]
    pub model_registry: ModelRegistryConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub stores: StoresConfig,
}

/// Minimum free host/accelerator memory before model loads and embedding batches
/// back off (C1).
#[derive(Debug, Deserialize, Clone)]
pub struct MemoryGuardConfig {
    #[serde(default = "default_min_free_mb")]
    pub min_free_mb: u64,
}

impl Default for MemoryGuardConfig {
    fn default() -> Self {
        Self {
            min_free_mb: default_min_free_mb(),
        }
    }
}

fn default_min_free_mb() -> u64 {
    1_500
}

/// Model names the registry is expected to single-flight-load (C2).
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModelRegistryConfig {
    #[serde(default)]
    pub text_embedding_model: Option<String>,
    #[serde(default)]
    pub image_embedding_model: Option<String>,
    #[serde(default)]
    pub cross_encoder_model: Option<String>,
}

/// Near-duplicate detection thresholds (C4).
#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    #[serde(default = "default_text_near_dup_threshold")]
    pub text_near_dup_threshold: u32,
    #[serde(default = "default_image_near_dup_threshold")]
    pub image_near_dup_threshold: u32,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            text_near_dup_threshold: default_text_near_dup_threshold(),
            image_near_dup_threshold: default_image_near_dup_threshold(),
        }
    }
}

fn default_text_near_dup_threshold() -> u32 {
    crate::dedup::TEXT_NEAR_DUP_THRESHOLD
}

fn default_image_near_dup_threshold() -> u32 {
    crate::dedup::IMAGE_NEAR_DUP_THRESHOLD
}

/// Per-connector ingestion cadence and the daily backup trigger hour (C12).
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_connector_interval_secs")]
    pub default_interval_secs: u64,
    #[serde(default)]
    pub connector_intervals_secs: std::collections::HashMap<String, u64>,
    #[serde(default = "default_backup_hour_utc")]
    pub backup_hour_utc: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_interval_secs: default_connector_interval_secs(),
            connector_intervals_secs: std::collections::HashMap::new(),
            backup_hour_utc: default_backup_hour_utc(),
        }
    }
}

fn default_connector_interval_secs() -> u64 {
    900
}

fn default_backup_hour_utc() -> u32 {
    3
}

/// Object store bucket/endpoint naming (the KV and graph/vector stores reuse `db.path`
/// for their SQLite connection).
#[derive(Debug, Deserialize, Clone)]
pub struct StoresConfig {
    #[serde(default = "default_object_store_root")]
    pub object_store_root: PathBuf,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            object_store_root: default_object_store_root(),
            bucket: default_bucket(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_object_store_root() -> PathBuf {
    PathBuf::from("./data/objects")
}

fn default_bucket() -> String {
    "knowledge".to_string()
}

fn default_endpoint() -> String {
    "http://localhost:9000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_candidate_k")]
    pub candidate_k_keyword: i64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_vector: i64,
    #[serde(default = "default_final_limit")]
    pub final_limit: i64,
}

fn default_candidate_k() -> i64 {
    80
}
fn default_final_limit() -> i64 {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectorsConfig {
    pub filesystem: Option<FilesystemConnectorConfig>,
    pub git: Option<GitConnectorConfig>,
    pub s3: Option<S3ConnectorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemConnectorConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GitConnectorConfig {
    /// Git repository URL (https:// or git@) or local path.
    pub url: String,
    /// Branch to clone/pull. Defaults to "main".
    #[serde(default = "default_git_branch")]
    pub branch: String,
    /// Subdirectory within the repo to scan. Defaults to root (".").
    #[serde(default = "default_git_root")]
    pub root: String,
    /// Glob patterns for files to include.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Glob patterns for files to exclude.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Use shallow clone (--depth 1) to save space.
    #[serde(default = "default_true")]
    pub shallow: bool,
    /// Directory to cache cloned repos. Defaults to `{db-dir}/.git-cache/`.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3ConnectorConfig {
    /// S3 bucket name.
    pub bucket: String,
    /// Key prefix to filter objects. Defaults to "" (entire bucket).
    #[serde(default)]
    pub prefix: String,
    /// AWS region. Defaults to "us-east-1".
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// Glob patterns for object keys to include.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Glob patterns for object keys to exclude.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Optional custom endpoint URL (for S3-compatible services like MinIO).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_git_branch() -> String {
    "main".to_string()
}

fn default_git_root() -> String {
    ".".to_string()
}

fn default_true() -> bool {
    true
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    // Validate retrieval
    if config.retrieval.final_limit < 1 {
        anyhow::bail!("retrieval.final_limit must be >= 1");
    }

    // Validate embedding
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
            other
        ),
    }

    Ok(config)
}
