//! Core data model for the knowledge graph: Document, File, Page, Block, side-facets,
//! entities, relationships, and the ingest payload wire shape.
//!
//! Entity IDs are stable strings; most carry an open property bag rather than a
//! rigid struct-per-kind, except where §3 names concrete attributes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Relationship edge types. Naming matches the external contract exactly (including
/// `ATTACHMENT` for Email→Document, which is historical rather than literal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeType {
    HasFile,
    BelongsTo,
    ChildOf,
    NearDuplicate,
    VersionChain,
    HasTranscript,
    DerivedFrom,
    Attachment,
    SentBy,
    ReceivedBy,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::HasFile => "HAS_FILE",
            EdgeType::BelongsTo => "BELONGS_TO",
            EdgeType::ChildOf => "CHILD_OF",
            EdgeType::NearDuplicate => "NEAR_DUPLICATE",
            EdgeType::VersionChain => "VERSION_CHAIN",
            EdgeType::HasTranscript => "HAS_TRANSCRIPT",
            EdgeType::DerivedFrom => "DERIVED_FROM",
            EdgeType::Attachment => "ATTACHMENT",
            EdgeType::SentBy => "SENT_BY",
            EdgeType::ReceivedBy => "RECEIVED_BY",
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The logical unit of ingestion. Bitemporal: `valid_from`/`valid_to` track the
/// real-world validity window, `system_from`/`system_to` track when this row was the
/// current system record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    pub title: Option<String>,
    pub source: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub system_from: DateTime<Utc>,
    pub system_to: Option<DateTime<Utc>>,
}

/// An immutable byte-identical artifact stored in the object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileNode {
    pub sha256: String,
    pub uri: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub perceptual_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One logical page of a document, holding the centroid ("pooled") vector of its
/// blocks' embeddings for page-level coarse retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub page_id: String,
    pub doc_id: String,
    pub page_index: i64,
    pub pooled_vector: Option<Vec<f32>>,
}

impl Page {
    pub fn derive_id(doc_id: &str, index: i64) -> String {
        format!("{doc_id}::page::{index}")
    }
}

/// The smallest retrievable text unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    /// The owning document. Carried explicitly rather than derived from `page_id`,
    /// since blocks with no parent Page (none currently exist, but the shape allows
    /// it) must still resolve to a document for lexical search and doc-id merge.
    pub doc_id: String,
    pub block_type: BlockType,
    pub text_content: String,
    pub text_vector: Option<Vec<f32>>,
    /// Nullable: audio transcript blocks have no parent Page.
    pub page_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Text,
    PdfPage,
    Image,
    Message,
    Markdown,
    NotionPage,
    WebHistory,
    FileText,
    Json,
}

/// Email side-facet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub message_id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub sender: String,
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc_list: Vec<String>,
    #[serde(default)]
    pub bcc_list: Vec<String>,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageNode {
    pub image_id: String,
    pub capture_time_utc: Option<DateTime<Utc>>,
    pub capture_time_local: Option<String>,
    pub gps_coords: Option<(f64, f64)>,
    pub image_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioNode {
    pub audio_id: String,
    pub recorded_at: Option<DateTime<Utc>>,
    pub duration_seconds: f64,
    pub file_uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub transcript_id: String,
    pub text_content: String,
    pub text_vector: Option<Vec<f32>>,
}

/// Extracted named entities. IDs are derived deterministically so repeated ingests
/// reconcile onto the same node (§3 invariant 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
    pub person_id: String,
    pub full_name: String,
    pub email_addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Organization {
    pub org_id: String,
    pub org_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub project_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub place_name: String,
    pub geo_coordinates: Option<(f64, f64)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub title: String,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// `{kind}:{first-16-hex-chars-of-sha256(canonical-identifier)}`, per §3's Entity ID
/// definition. Case-insensitive for email-like identifiers (testable property 3).
pub fn entity_id(kind: &str, canonical_identifier: &str) -> String {
    let lowered = canonical_identifier.to_lowercase();
    let digest = Sha256::digest(lowered.as_bytes());
    let hex = hex_encode(&digest);
    format!("{kind}:{}", &hex[..16])
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

/// A declared edge between two entities by ID, as carried in an ingest payload or
/// produced internally (e.g. `NEAR_DUPLICATE`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

// ---------------------------------------------------------------------------
// Ingest payload wire shape (§6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DocumentDescriptor {
    pub doc_id: String,
    pub version: i64,
    pub title: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    #[serde(default)]
    pub valid_to: Option<DateTime<Utc>>,
    pub system_from: DateTime<Utc>,
    #[serde(default)]
    pub system_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileDescriptor {
    pub uri: String,
    pub mime_type: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockDescriptor {
    pub block_id: String,
    pub block_type: String,
    #[serde(default)]
    pub bounding_box: Option<serde_json::Value>,
    pub text_content: String,
    #[serde(default)]
    pub text_vector: Option<Vec<f32>>,
    #[serde(default)]
    pub page_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailDescriptor {
    pub message_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub subject: String,
    pub sent_at: DateTime<Utc>,
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default)]
    pub cc_list: Vec<String>,
    #[serde(default)]
    pub bcc_list: Vec<String>,
    pub snippet: String,
    #[serde(default)]
    pub text_vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageDescriptor {
    pub image_id: String,
    #[serde(default)]
    pub capture_time_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub capture_time_local: Option<String>,
    #[serde(default)]
    pub gps_coords: Option<(f64, f64)>,
    pub image_type: String,
    #[serde(default)]
    pub image_vector: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct EntityBatch {
    #[serde(default)]
    pub people: Vec<serde_json::Value>,
    #[serde(default)]
    pub organizations: Vec<serde_json::Value>,
    #[serde(default)]
    pub projects: Vec<serde_json::Value>,
    #[serde(default)]
    pub places: Vec<serde_json::Value>,
    #[serde(default)]
    pub events: Vec<serde_json::Value>,
}

/// The queue element consumed by the Ingest Queue Worker (§6, §4.6).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestPayload {
    pub document: DocumentDescriptor,
    #[serde(default)]
    pub files: Vec<FileDescriptor>,
    #[serde(default)]
    pub block: Option<BlockDescriptor>,
    #[serde(default)]
    pub email: Option<EmailDescriptor>,
    #[serde(default)]
    pub image: Option<ImageDescriptor>,
    #[serde(default)]
    pub entities: Option<EntityBatch>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

// ---------------------------------------------------------------------------
// Retrieval response shapes
// ---------------------------------------------------------------------------

/// Result of the retrieval orchestrator, per §4.8.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedDocument {
    pub doc_id: String,
    pub uri: String,
    pub text: String,
    pub score: f64,
}

/// The externally-visible shape of a successful ask response (§7). No generation
/// happens in this crate; `answer` is left for the (out-of-scope) generative answerer
/// to fill in.
#[derive(Debug, Clone, Serialize)]
pub struct AskResponse {
    pub answer: Option<String>,
    pub citations: Vec<RetrievedDocument>,
    pub latency_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_is_case_insensitive_for_email() {
        let a = entity_id("person", "Alice@Example.com");
        let b = entity_id("person", "alice@example.com");
        assert_eq!(a, b);
        assert!(a.starts_with("person:"));
        assert_eq!(a.len(), "person:".len() + 16);
    }

    #[test]
    fn entity_id_differs_by_kind() {
        let a = entity_id("person", "alice@example.com");
        let b = entity_id("org", "alice@example.com");
        assert_ne!(a, b);
    }

    #[test]
    fn page_id_derivation() {
        assert_eq!(Page::derive_id("doc-1", 3), "doc-1::page::3");
    }
}
