//! Typed error kinds at the library boundary.
//!
//! The binary and high-level orchestration (`document_processor`, `retrieval`,
//! `queue_worker`) propagate with `anyhow::Result`, matching this crate's existing
//! style; the store/service traits return these typed variants so callers can match on
//! *kind* (transient vs. permanent) without string-matching an `anyhow::Error`.

use thiserror::Error;

/// Error kinds named by the error handling design.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Network or store RPC failure that is worth retrying with backoff.
    #[error("transient transport failure: {0}")]
    TransientTransport(String),

    /// A model inference call failed after exhausting its fallback path.
    #[error("model inference failed: {0}")]
    ModelInference(String),

    /// An extractor could not produce text for a file. Not fatal: callers treat this
    /// as "zero blocks", never as a propagated error.
    #[error("extraction failed for {mime_type}: {reason}")]
    Extractor { mime_type: String, reason: String },

    /// The graph bundle transaction failed; the whole payload is rejected.
    #[error("bundle write failed: {0}")]
    BundleWrite(String),

    /// A connector-level auth or rate-limit failure. Surfaced so the worker can skip
    /// the payload without treating it as a bundle corruption.
    #[error("connector auth/rate-limit failure: {0}")]
    ConnectorAuth(String),

    /// A KV, graph, or vector store is unreachable. Retrieval callers should degrade
    /// to an uncached/empty result rather than propagate.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl CoreError {
    /// Whether the failure kind indicates a transient condition worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::TransientTransport(_) | CoreError::StoreUnavailable(_)
        )
    }
}
