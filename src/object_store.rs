//! Immutable binary artifact storage: one upload per unique `sha256` (§4.6, §6).
//!
//! The reference implementation is local-filesystem-backed rather than S3, consistent
//! with this crate's existing habit of keeping the default backend dependency-free and
//! reserving heavier clients for an optional feature.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::errors::CoreError;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `bytes` under a key derived from `doc_id` and `filename`, returning the
    /// `{endpoint}/{bucket}/{object_key}`-shaped URI from §6. Uploading the same key
    /// twice overwrites in place; callers key on content hash to avoid this when two
    /// uploads really are the same artifact.
    async fn upload_file(&self, doc_id: &str, filename: &str, bytes: &[u8]) -> Result<String, CoreError>;
}

/// Strips path separators and leading dots so a doc_id can't escape the bucket root.
fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect::<String>()
        .trim_start_matches('.')
        .to_string()
}

pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
    endpoint: String,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
            endpoint: endpoint.into(),
        }
    }

    fn object_path(&self, object_key: &str) -> PathBuf {
        self.root.join(&self.bucket).join(object_key)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn upload_file(&self, doc_id: &str, filename: &str, bytes: &[u8]) -> Result<String, CoreError> {
        let doc_component = sanitize_component(doc_id);
        let file_component = sanitize_component(filename);
        let object_key = format!("{doc_component}/{file_component}");

        let path = self.object_path(&object_key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        }
        fs::write(&path, bytes)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        Ok(format!("{}/{}/{object_key}", self.endpoint, self.bucket))
    }
}

pub fn local_uri_to_path(root: &Path, bucket: &str, uri: &str) -> Option<PathBuf> {
    let marker = format!("/{bucket}/");
    let idx = uri.find(&marker)?;
    let object_key = &uri[idx + marker.len()..];
    Some(root.join(bucket).join(object_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_uri_resolves_back_to_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "knowledge", "http://localhost:9000");
        let uri = store.upload_file("doc-1", "notes.txt", b"hello").await.unwrap();
        assert_eq!(uri, "http://localhost:9000/knowledge/doc-1/notes.txt");

        let path = local_uri_to_path(dir.path(), "knowledge", &uri).unwrap();
        let contents = tokio::fs::read(path).await.unwrap();
        assert_eq!(contents, b"hello");
    }

    #[test]
    fn sanitize_strips_path_traversal() {
        assert_eq!(sanitize_component("../../etc/passwd"), "______etc_passwd");
        assert_eq!(sanitize_component(".hidden"), "hidden");
    }

    #[tokio::test]
    async fn reupload_same_key_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path(), "knowledge", "http://localhost:9000");
        store.upload_file("doc-1", "notes.txt", b"v1").await.unwrap();
        let uri = store.upload_file("doc-1", "notes.txt", b"v2").await.unwrap();
        let path = local_uri_to_path(dir.path(), "knowledge", &uri).unwrap();
        assert_eq!(tokio::fs::read(path).await.unwrap(), b"v2");
    }
}
