//! Turns one ingest payload into a persisted document bundle (C9): resolve bytes,
//! rehash, upload to the object store, extract text by MIME, embed, run
//! deduplication, and commit the graph bundle plus its vectors. Ported from the
//! original `DocumentProcessor.process()`'s per-file loop and persistence order.

use std::sync::Arc;

use crate::dedup::{compute_perceptual_hash, compute_sha256_bytes, compute_shingle_fingerprint, DedupEngine};
use crate::embedding::{EmbeddingProvider, ImageEmbedder, TextEmbedder};
use crate::errors::CoreError;
use crate::extract::{self, OcrProvider, Transcriber};
use crate::graph_store::{DocumentBundle, GraphStore};
use crate::kv_store::KvStore;
use crate::models::{
    entity_id, AudioNode, Block, BlockType, Document, Email, EntityBatch, Event, FileNode,
    ImageNode, Organization, Page, Person, Place, Project, Relationship, Transcript,
};
use crate::models::{EdgeType, IngestPayload};
use crate::object_store::ObjectStore;
use crate::vector_store::{VectorRow, VectorStore};

const MIME_TEXT_PREFIX: &str = "text/";

pub struct DocumentProcessor<G, V, O, K> {
    graph: Arc<G>,
    vector: Arc<V>,
    object: Arc<O>,
    kv: Arc<K>,
    embedder: TextEmbedder,
    provider: Box<dyn EmbeddingProvider>,
    image_embedder: Box<dyn ImageEmbedder>,
    ocr: Box<dyn OcrProvider>,
    transcriber: Box<dyn Transcriber>,
}

impl<G, V, O, K> DocumentProcessor<G, V, O, K>
where
    G: GraphStore,
    V: VectorStore,
    O: ObjectStore,
    K: KvStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: Arc<G>,
        vector: Arc<V>,
        object: Arc<O>,
        kv: Arc<K>,
        embedder: TextEmbedder,
        provider: Box<dyn EmbeddingProvider>,
        image_embedder: Box<dyn ImageEmbedder>,
        ocr: Box<dyn OcrProvider>,
        transcriber: Box<dyn Transcriber>,
    ) -> Self {
        Self {
            graph,
            vector,
            object,
            kv,
            embedder,
            provider,
            image_embedder,
            ocr,
            transcriber,
        }
    }

    /// Processes one payload end to end. Returns `Ok(())` even when a single file
    /// within the payload fails extraction (§7: extraction failures are per-item, not
    /// fatal); the whole bundle only fails to persist on a store-level error.
    pub async fn process(&self, payload: &IngestPayload) -> Result<(), CoreError> {
        let doc_id = payload.document.doc_id.clone();
        let mut bundle = DocumentBundle {
            document: Some(document_from_descriptor(&payload.document)),
            ..Default::default()
        };

        let mut file_outcomes = Vec::new();
        for (index, file_descriptor) in payload.files.iter().enumerate() {
            if let Some(outcome) = self.ingest_file(&doc_id, index as i64, file_descriptor).await? {
                file_outcomes.push(outcome);
            }
        }

        // §4.6: after all files, concatenate their page texts and embed them with one
        // batched call, then set each page's pooled vector to the centroid of its own
        // file's contributing embeddings. The standalone `payload.block` (if any and
        // not already vectorized) rides along in the same batch.
        let mut texts: Vec<String> = Vec::new();
        for outcome in &file_outcomes {
            texts.extend(outcome.page_texts.iter().cloned());
        }
        let standalone_block_text_index = match &payload.block {
            Some(descriptor)
                if descriptor.text_vector.is_none() && !descriptor.text_content.trim().is_empty() =>
            {
                texts.push(descriptor.text_content.clone());
                Some(texts.len() - 1)
            }
            _ => None,
        };

        let embeddings: Vec<Vec<f32>> = if texts.is_empty() {
            Vec::new()
        } else {
            match self.embedder.embed_all(self.provider.as_ref(), &texts).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "batched text embedding failed; continuing without vectors");
                    Vec::new()
                }
            }
        };

        let mut cursor = 0usize;
        for outcome in &mut file_outcomes {
            let n = outcome.page_texts.len();
            let file_vectors: Vec<Option<Vec<f32>>> =
                (0..n).map(|k| embeddings.get(cursor + k).cloned()).collect();
            cursor += n;

            if let Some(block) = outcome.block.as_mut() {
                block.text_vector = file_vectors.first().cloned().flatten();
            }
            if let Some(transcript) = outcome.transcript.as_mut() {
                transcript.text_vector = file_vectors.first().cloned().flatten();
            }
            outcome.page.pooled_vector = centroid(file_vectors.iter().filter_map(|v| v.as_ref()));
        }

        // Keep the first image-mime file's identity around before `file_outcomes` is
        // consumed below; `payload.image`'s DERIVED_FROM edge and fallback embedding
        // need its bytes and sha256.
        let first_image_info: Option<(String, Vec<u8>, String)> = file_outcomes
            .iter()
            .find(|o| o.image_bytes.is_some())
            .map(|o| (o.file.sha256.clone(), o.image_bytes.clone().unwrap(), o.file.uri.clone()));

        let mut image_vector_rows: Vec<VectorRow> = Vec::new();

        for outcome in file_outcomes {
            if let (Some(block), Some(bytes)) = (&outcome.block, &outcome.image_bytes) {
                match self.image_embedder.embed(bytes).await {
                    Ok(vector) => image_vector_rows.push(VectorRow {
                        id: block.block_id.clone(),
                        doc_id: doc_id.clone(),
                        text: block.text_content.clone(),
                        uri: outcome.file.uri.clone(),
                        vector,
                        mime_type: outcome.mime_type.clone(),
                    }),
                    Err(e) => {
                        tracing::warn!(error = %e, "image embedding failed; skipping vector row");
                    }
                }
            }

            bundle.files.push(outcome.file);
            bundle.pages.push(outcome.page);
            if let (Some(transcript), Some(audio)) = (&outcome.transcript, &outcome.audio) {
                bundle.relationships.push(Relationship {
                    source_id: audio.audio_id.clone(),
                    target_id: transcript.transcript_id.clone(),
                    edge_type: EdgeType::HasTranscript.as_str().to_string(),
                });
            }
            bundle.blocks.extend(outcome.block);
            bundle.transcripts.extend(outcome.transcript);
            bundle.audio.extend(outcome.audio);
            bundle.relationships.extend(outcome.near_duplicate_edges);
            bundle.relationships.push(Relationship {
                source_id: doc_id.clone(),
                target_id: outcome.file_sha256_ref,
                edge_type: EdgeType::HasFile.as_str().to_string(),
            });
        }

        if let Some(block_descriptor) = &payload.block {
            let mut block = block_from_descriptor(block_descriptor, &doc_id);
            if block.text_vector.is_none() {
                if let Some(index) = standalone_block_text_index {
                    block.text_vector = embeddings.get(index).cloned();
                }
            }
            bundle.blocks.push(block);
        }

        if let Some(email_descriptor) = &payload.email {
            let email = Email {
                message_id: email_descriptor.message_id.clone(),
                thread_id: email_descriptor.thread_id.clone(),
                subject: email_descriptor.subject.clone(),
                sent_at: email_descriptor.sent_at,
                sender: email_descriptor.sender.clone(),
                recipients: email_descriptor.recipients.clone(),
                cc_list: email_descriptor.cc_list.clone(),
                bcc_list: email_descriptor.bcc_list.clone(),
                snippet: email_descriptor.snippet.clone(),
            };
            bundle.relationships.push(Relationship {
                source_id: email.message_id.clone(),
                target_id: doc_id.clone(),
                edge_type: EdgeType::Attachment.as_str().to_string(),
            });

            let sender_id = self.canonicalize_person(&mut bundle.people, &email.sender);
            bundle.relationships.push(Relationship {
                source_id: email.message_id.clone(),
                target_id: sender_id,
                edge_type: EdgeType::SentBy.as_str().to_string(),
            });
            for recipient in &email.recipients {
                let recipient_id = self.canonicalize_person(&mut bundle.people, recipient);
                bundle.relationships.push(Relationship {
                    source_id: email.message_id.clone(),
                    target_id: recipient_id,
                    edge_type: EdgeType::ReceivedBy.as_str().to_string(),
                });
            }

            bundle.emails.push(email);
        }

        if let Some(entities) = &payload.entities {
            self.ingest_entities(&mut bundle, entities);
        }

        if let Some(image_descriptor) = &payload.image {
            let image_node = ImageNode {
                image_id: image_descriptor.image_id.clone(),
                capture_time_utc: image_descriptor.capture_time_utc,
                capture_time_local: image_descriptor.capture_time_local.clone(),
                gps_coords: image_descriptor.gps_coords,
                image_type: image_descriptor.image_type.clone(),
            };

            if let Some((sha256, bytes, uri)) = &first_image_info {
                bundle.relationships.push(Relationship {
                    source_id: image_node.image_id.clone(),
                    target_id: format!("file:{sha256}"),
                    edge_type: EdgeType::DerivedFrom.as_str().to_string(),
                });

                let vector = match &image_descriptor.image_vector {
                    Some(v) => Some(v.clone()),
                    None => self.image_embedder.embed(bytes).await.ok(),
                };
                if let Some(vector) = vector {
                    image_vector_rows.push(VectorRow {
                        id: image_node.image_id.clone(),
                        doc_id: doc_id.clone(),
                        text: String::new(),
                        uri: uri.clone(),
                        vector,
                        mime_type: image_descriptor.image_type.clone(),
                    });
                }
            } else if let Some(vector) = &image_descriptor.image_vector {
                image_vector_rows.push(VectorRow {
                    id: image_node.image_id.clone(),
                    doc_id: doc_id.clone(),
                    text: String::new(),
                    uri: String::new(),
                    vector: vector.clone(),
                    mime_type: image_descriptor.image_type.clone(),
                });
            }

            bundle.images.push(image_node);
        }

        bundle.relationships.extend(payload.relationships.iter().cloned());

        self.graph.ingest_document_bundle(&bundle).await?;

        let mut document_rows: Vec<VectorRow> = bundle
            .blocks
            .iter()
            .filter_map(|block| {
                block.text_vector.as_ref().map(|vec| VectorRow {
                    id: block.block_id.clone(),
                    doc_id: block.doc_id.clone(),
                    text: block.text_content.clone(),
                    uri: String::new(),
                    vector: vec.clone(),
                    mime_type: String::new(),
                })
            })
            .collect();
        for (transcript, audio) in bundle.transcripts.iter().zip(bundle.audio.iter()) {
            if let Some(vector) = &transcript.text_vector {
                document_rows.push(VectorRow {
                    id: transcript.transcript_id.clone(),
                    doc_id: doc_id.clone(),
                    text: transcript.text_content.clone(),
                    uri: audio.file_uri.clone(),
                    vector: vector.clone(),
                    mime_type: "audio".to_string(),
                });
            }
        }
        if !document_rows.is_empty() {
            self.vector.upsert_vectors("documents", &document_rows).await?;
        }
        if !image_vector_rows.is_empty() {
            self.vector.upsert_vectors("images", &image_vector_rows).await?;
        }

        Ok(())
    }

    async fn ingest_file(
        &self,
        doc_id: &str,
        index: i64,
        descriptor: &crate::models::FileDescriptor,
    ) -> Result<Option<FileIngestOutcome>, CoreError> {
        let bytes = match tokio::fs::read(&descriptor.uri).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(uri = %descriptor.uri, error = %e, "could not read source file; skipping");
                return Ok(None);
            }
        };

        let sha256 = compute_sha256_bytes(&bytes);
        let mime_type = descriptor
            .mime_type
            .clone()
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let filename = descriptor
            .uri
            .rsplit('/')
            .next()
            .unwrap_or(&descriptor.uri)
            .to_string();
        let uploaded_uri = self.object.upload_file(doc_id, &filename, &bytes).await?;

        let perceptual_hash = if mime_type.starts_with("image/") {
            compute_perceptual_hash(&bytes).map(|h| format!("{h:016x}"))
        } else {
            None
        };

        let file = FileNode {
            sha256: sha256.clone(),
            uri: uploaded_uri.clone(),
            mime_type: mime_type.clone(),
            size_bytes: descriptor.size_bytes.unwrap_or(bytes.len() as i64),
            perceptual_hash: perceptual_hash.clone(),
            created_at: descriptor.created_at.unwrap_or_else(chrono::Utc::now),
        };

        let page_id = Page::derive_id(doc_id, index);
        let page = Page {
            page_id: page_id.clone(),
            doc_id: doc_id.to_string(),
            page_index: index,
            pooled_vector: None,
        };

        let mut near_duplicate_edges = Vec::new();
        let mut block = None;
        let mut transcript = None;
        let mut audio = None;
        let mut page_texts = Vec::new();
        let mut image_bytes = None;

        if mime_type.starts_with(MIME_TEXT_PREFIX)
            || mime_type == "application/json"
            || mime_type == "application/xml"
        {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if !text.trim().is_empty() {
                near_duplicate_edges.extend(self.run_text_dedup(&sha256, &text).await?);
                block = Some(Block {
                    block_id: format!("{doc_id}::block::{sha256}"),
                    doc_id: doc_id.to_string(),
                    block_type: block_type_for_mime(&mime_type),
                    text_content: text.clone(),
                    text_vector: None,
                    page_id: Some(page_id.clone()),
                });
                page_texts.push(text);
            }
        } else if mime_type == extract::MIME_PDF {
            let text = match extract::extract_text(&bytes, &mime_type, self.ocr.as_ref()) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(mime_type, error = %e, "PDF extraction failed; indexing empty body");
                    String::new()
                }
            };
            near_duplicate_edges.extend(self.run_text_dedup(&sha256, &text).await?);
            block = Some(Block {
                block_id: format!("{doc_id}::block::{sha256}"),
                doc_id: doc_id.to_string(),
                block_type: BlockType::PdfPage,
                text_content: text.clone(),
                text_vector: None,
                page_id: Some(page_id.clone()),
            });
            page_texts.push(text);
        } else if mime_type.starts_with("image/") {
            let ocr_text = match extract::extract_text(&bytes, &mime_type, self.ocr.as_ref()) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(mime_type, error = %e, "image OCR failed; indexing empty body");
                    String::new()
                }
            };
            near_duplicate_edges.extend(self.run_text_dedup(&sha256, &ocr_text).await?);
            near_duplicate_edges.extend(self.run_image_dedup(&sha256, perceptual_hash.as_deref()).await?);
            block = Some(Block {
                block_id: format!("{doc_id}::block::{sha256}"),
                doc_id: doc_id.to_string(),
                block_type: BlockType::Image,
                text_content: ocr_text.clone(),
                text_vector: None,
                page_id: Some(page_id.clone()),
            });
            page_texts.push(ocr_text);
            image_bytes = Some(bytes.clone());
        } else if mime_type.starts_with("audio/") {
            let transcription = match self.transcriber.transcribe(std::path::Path::new(&descriptor.uri)) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(mime_type, error = %e, "audio transcription failed; indexing empty body");
                    String::new()
                }
            };
            near_duplicate_edges.extend(self.run_text_dedup(&sha256, &transcription).await?);
            transcript = Some(Transcript {
                transcript_id: format!("{doc_id}::transcript::{index}"),
                text_content: transcription.clone(),
                text_vector: None,
            });
            audio = Some(AudioNode {
                audio_id: format!("{doc_id}::audio::{index}"),
                recorded_at: descriptor.created_at,
                duration_seconds: descriptor.duration_seconds.unwrap_or(0.0),
                file_uri: uploaded_uri,
            });
            page_texts.push(transcription);
        }

        self.kv
            .set(&format!("dedupe:sha256:{sha256}"), doc_id, None)
            .await?;

        Ok(Some(FileIngestOutcome {
            file,
            page,
            block,
            transcript,
            audio,
            page_texts,
            image_bytes,
            mime_type,
            file_sha256_ref: format!("file:{sha256}"),
            near_duplicate_edges,
        }))
    }

    /// Derives a deterministic `person:{...}` ID for an email address (§3's Entity ID
    /// formula) and appends a `Person` node to the bundle if this is the first time
    /// the canonicalized ID has been seen within this payload.
    fn canonicalize_person(&self, people: &mut Vec<Person>, email_address: &str) -> String {
        let person_id = entity_id("person", email_address);
        if !people.iter().any(|p| p.person_id == person_id) {
            people.push(Person {
                person_id: person_id.clone(),
                full_name: email_address.to_string(),
                email_addresses: vec![email_address.to_string()],
            });
        }
        person_id
    }

    /// Canonicalizes and upserts a payload's standalone entity batch. Each item may be
    /// a bare string (treated as the canonical identifier) or an object carrying the
    /// identifier under a kind-specific field. No edges are emitted here — these
    /// entities are only linked where the payload says so explicitly (e.g. email
    /// sender/recipients), matching the original ingester's `_ingest_entities` scope.
    fn ingest_entities(&self, bundle: &mut DocumentBundle, entities: &EntityBatch) {
        for person in &entities.people {
            if let Some(identifier) = entity_field(person, "email") {
                self.canonicalize_person(&mut bundle.people, identifier);
            }
        }
        for org in &entities.organizations {
            if let Some(name) = entity_field(org, "name") {
                let org_id = entity_id("org", name);
                if !bundle.organizations.iter().any(|o| o.org_id == org_id) {
                    bundle.organizations.push(Organization {
                        org_id,
                        org_name: name.to_string(),
                    });
                }
            }
        }
        for project in &entities.projects {
            if let Some(name) = entity_field(project, "name") {
                let project_id = entity_id("project", name);
                let tags = project
                    .get("tags")
                    .and_then(|t| t.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                if !bundle.projects.iter().any(|p| p.project_id == project_id) {
                    bundle.projects.push(Project {
                        project_id,
                        project_name: name.to_string(),
                        tags,
                    });
                }
            }
        }
        for place in &entities.places {
            if let Some(name) = entity_field(place, "name") {
                let place_id = entity_id("place", name);
                let geo_coordinates = place.get("geo_coordinates").and_then(|g| g.as_array()).and_then(|arr| {
                    if let [lat, lon] = arr.as_slice() {
                        Some((lat.as_f64()?, lon.as_f64()?))
                    } else {
                        None
                    }
                });
                if !bundle.places.iter().any(|p| p.place_id == place_id) {
                    bundle.places.push(Place {
                        place_id,
                        place_name: name.to_string(),
                        geo_coordinates,
                    });
                }
            }
        }
        for event in &entities.events {
            let Some(obj) = event.as_object() else { continue };
            let title = obj.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string();
            let event_id = obj
                .get("event_id")
                .and_then(|e| e.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| entity_id("event", &title));
            let starts_at = obj.get("starts_at").and_then(|s| s.as_str()).and_then(parse_rfc3339);
            let ends_at = obj.get("ends_at").and_then(|s| s.as_str()).and_then(parse_rfc3339);
            if !bundle.events.iter().any(|e| e.event_id == event_id) {
                bundle.events.push(Event {
                    event_id,
                    title,
                    starts_at,
                    ends_at,
                });
            }
        }
    }

    async fn run_text_dedup(&self, sha256: &str, text: &str) -> Result<Vec<Relationship>, CoreError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let fingerprint = compute_shingle_fingerprint(text);
        let dedup = DedupEngine::new(self.kv.as_ref());
        let matches = dedup
            .check_and_record_text(sha256, fingerprint)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(matches
            .into_iter()
            .map(|other_sha| Relationship {
                source_id: format!("file:{sha256}"),
                target_id: format!("file:{other_sha}"),
                edge_type: EdgeType::NearDuplicate.as_str().to_string(),
            })
            .collect())
    }

    async fn run_image_dedup(
        &self,
        sha256: &str,
        perceptual_hash: Option<&str>,
    ) -> Result<Vec<Relationship>, CoreError> {
        let Some(hex_hash) = perceptual_hash else {
            return Ok(Vec::new());
        };
        let Ok(phash) = u64::from_str_radix(hex_hash, 16) else {
            return Ok(Vec::new());
        };
        let dedup = DedupEngine::new(self.kv.as_ref());
        let matches = dedup
            .check_and_record_image(sha256, phash)
            .await
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(matches
            .into_iter()
            .map(|other_sha| Relationship {
                source_id: format!("file:{sha256}"),
                target_id: format!("file:{other_sha}"),
                edge_type: EdgeType::NearDuplicate.as_str().to_string(),
            })
            .collect())
    }
}

struct FileIngestOutcome {
    file: FileNode,
    page: Page,
    block: Option<Block>,
    transcript: Option<Transcript>,
    audio: Option<AudioNode>,
    /// Text this file contributes to the post-loop batched embed call: the block's or
    /// transcript's own text, in the order it must be sliced back out afterward.
    page_texts: Vec<String>,
    /// Present only for image-mime files; retained so the image embedder can be run
    /// against the original bytes after the loop.
    image_bytes: Option<Vec<u8>>,
    mime_type: String,
    file_sha256_ref: String,
    near_duplicate_edges: Vec<Relationship>,
}

/// Averages a set of equal-dimension vectors. `None` if the set is empty.
fn centroid<'a, I: Iterator<Item = &'a Vec<f32>>>(vectors: I) -> Option<Vec<f32>> {
    let vectors: Vec<&Vec<f32>> = vectors.collect();
    let dims = vectors.first()?.len();
    let mut sum = vec![0f32; dims];
    for v in &vectors {
        for (i, val) in v.iter().enumerate().take(dims) {
            sum[i] += val;
        }
    }
    let n = vectors.len() as f32;
    Some(sum.into_iter().map(|s| s / n).collect())
}

/// Reads `field` off an entity batch item: a bare JSON string is its own identifier, an
/// object carries the identifier under `field`.
fn entity_field<'a>(value: &'a serde_json::Value, field: &str) -> Option<&'a str> {
    value.as_str().or_else(|| value.get(field).and_then(|v| v.as_str()))
}

fn parse_rfc3339(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&chrono::Utc))
}

fn document_from_descriptor(descriptor: &crate::models::DocumentDescriptor) -> Document {
    Document {
        doc_id: descriptor.doc_id.clone(),
        title: descriptor.title.clone(),
        source: descriptor.source.clone(),
        version: descriptor.version,
        created_at: descriptor.created_at,
        valid_from: descriptor.valid_from,
        valid_to: descriptor.valid_to,
        system_from: descriptor.system_from,
        system_to: descriptor.system_to,
    }
}

fn block_from_descriptor(descriptor: &crate::models::BlockDescriptor, doc_id: &str) -> Block {
    Block {
        block_id: descriptor.block_id.clone(),
        doc_id: doc_id.to_string(),
        block_type: parse_block_type(&descriptor.block_type),
        text_content: descriptor.text_content.clone(),
        text_vector: descriptor.text_vector.clone(),
        page_id: descriptor.page_id.clone(),
    }
}

fn parse_block_type(raw: &str) -> BlockType {
    match raw {
        "pdf_page" => BlockType::PdfPage,
        "image" => BlockType::Image,
        "message" => BlockType::Message,
        "markdown" => BlockType::Markdown,
        "notion_page" => BlockType::NotionPage,
        "web_history" => BlockType::WebHistory,
        "file_text" => BlockType::FileText,
        "json" => BlockType::Json,
        _ => BlockType::Text,
    }
}

fn block_type_for_mime(mime_type: &str) -> BlockType {
    match mime_type {
        extract::MIME_PDF => BlockType::PdfPage,
        "text/markdown" => BlockType::Markdown,
        "application/json" => BlockType::Json,
        m if m.starts_with("image/") => BlockType::Image,
        m if m.starts_with("text/") => BlockType::FileText,
        _ => BlockType::Text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingConfig;
    use crate::embedding::{DisabledImageEmbedder, DisabledProvider};
    use crate::extract::{NullOcrProvider, NullTranscriber};
    use crate::graph_store::SqliteGraphStore;
    use crate::kv_store::SqliteKvStore;
    use crate::memory_guard::MemoryGuard;
    use crate::models::{DocumentDescriptor, EntityBatch, FileDescriptor, ImageDescriptor};
    use crate::object_store::LocalObjectStore;
    use crate::vector_store::SqliteVectorStore;
    use chrono::Utc;
    use sqlx::sqlite::SqliteConnectOptions;
    use sqlx::SqlitePool;
    use std::str::FromStr;

    async fn memory_pool() -> SqlitePool {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        SqlitePool::connect_with(opts).await.unwrap()
    }

    fn new_processor(
        graph: Arc<SqliteGraphStore>,
        vector: Arc<SqliteVectorStore>,
        object: Arc<LocalObjectStore>,
        kv: Arc<SqliteKvStore>,
    ) -> DocumentProcessor<SqliteGraphStore, SqliteVectorStore, LocalObjectStore, SqliteKvStore> {
        let embedder = TextEmbedder::new(EmbeddingConfig::default(), Arc::new(MemoryGuard::new(0)));
        DocumentProcessor::new(
            graph,
            vector,
            object,
            kv,
            embedder,
            Box::new(DisabledProvider),
            Box::new(DisabledImageEmbedder),
            Box::new(NullOcrProvider),
            Box::new(NullTranscriber),
        )
    }

    fn empty_payload(doc_id: &str) -> IngestPayload {
        let now = Utc::now();
        IngestPayload {
            document: DocumentDescriptor {
                doc_id: doc_id.to_string(),
                version: 1,
                title: None,
                source: "filesystem".into(),
                created_at: now,
                valid_from: now,
                valid_to: None,
                system_from: now,
                system_to: None,
            },
            files: vec![],
            block: None,
            email: None,
            image: None,
            entities: None,
            relationships: vec![],
        }
    }

    #[tokio::test]
    async fn processes_a_plain_text_file_into_one_block() {
        let pool = memory_pool().await;
        let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
        graph.migrate().await.unwrap();
        let vector = Arc::new(SqliteVectorStore::new(pool.clone()));
        vector.migrate().await.unwrap();
        let kv = Arc::new(SqliteKvStore::new(pool.clone()));
        kv.migrate().await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let object = Arc::new(LocalObjectStore::new(dir.path(), "knowledge", "http://localhost:9000"));

        let source_dir = tempfile::tempdir().unwrap();
        let source_path = source_dir.path().join("notes.txt");
        tokio::fs::write(&source_path, b"Project Atlas kickoff notes").await.unwrap();

        let processor = new_processor(graph.clone(), vector.clone(), object, kv);

        let mut payload = empty_payload("doc-1");
        payload.files.push(FileDescriptor {
            uri: source_path.to_string_lossy().into_owned(),
            mime_type: Some("text/plain".into()),
            sha256: None,
            size_bytes: None,
            created_at: None,
            duration_seconds: None,
        });

        processor.process(&payload).await.unwrap();

        let hits = graph.lexical_search("Atlas", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn multiple_files_get_distinct_page_indexes() {
        let pool = memory_pool().await;
        let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
        graph.migrate().await.unwrap();
        let vector = Arc::new(SqliteVectorStore::new(pool.clone()));
        vector.migrate().await.unwrap();
        let kv = Arc::new(SqliteKvStore::new(pool.clone()));
        kv.migrate().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let object = Arc::new(LocalObjectStore::new(dir.path(), "knowledge", "http://localhost:9000"));
        let source_dir = tempfile::tempdir().unwrap();
        let path_a = source_dir.path().join("a.txt");
        let path_b = source_dir.path().join("b.txt");
        tokio::fs::write(&path_a, b"alpha document body").await.unwrap();
        tokio::fs::write(&path_b, b"beta document body").await.unwrap();

        let processor = new_processor(graph.clone(), vector.clone(), object, kv);

        let mut payload = empty_payload("doc-multi");
        payload.files.push(FileDescriptor {
            uri: path_a.to_string_lossy().into_owned(),
            mime_type: Some("text/plain".into()),
            sha256: None,
            size_bytes: None,
            created_at: None,
            duration_seconds: None,
        });
        payload.files.push(FileDescriptor {
            uri: path_b.to_string_lossy().into_owned(),
            mime_type: Some("text/plain".into()),
            sha256: None,
            size_bytes: None,
            created_at: None,
            duration_seconds: None,
        });

        processor.process(&payload).await.unwrap();

        let hits_a = graph.lexical_search("alpha", 10).await.unwrap();
        let hits_b = graph.lexical_search("beta", 10).await.unwrap();
        assert_eq!(hits_a.len(), 1);
        assert_eq!(hits_b.len(), 1);
        assert_ne!(hits_a[0].block_id, hits_b[0].block_id);
    }

    #[tokio::test]
    async fn unreadable_file_is_skipped_not_fatal() {
        let pool = memory_pool().await;
        let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
        graph.migrate().await.unwrap();
        let vector = Arc::new(SqliteVectorStore::new(pool.clone()));
        vector.migrate().await.unwrap();
        let kv = Arc::new(SqliteKvStore::new(pool.clone()));
        kv.migrate().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let object = Arc::new(LocalObjectStore::new(dir.path(), "knowledge", "http://localhost:9000"));
        let processor = new_processor(graph, vector, object, kv);

        let mut payload = empty_payload("doc-2");
        payload.files.push(FileDescriptor {
            uri: "/nonexistent/path.txt".into(),
            mime_type: Some("text/plain".into()),
            sha256: None,
            size_bytes: None,
            created_at: None,
            duration_seconds: None,
        });

        processor.process(&payload).await.unwrap();
    }

    #[tokio::test]
    async fn entity_batch_is_canonicalized_and_upserted() {
        let pool = memory_pool().await;
        let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
        graph.migrate().await.unwrap();
        let vector = Arc::new(SqliteVectorStore::new(pool.clone()));
        vector.migrate().await.unwrap();
        let kv = Arc::new(SqliteKvStore::new(pool.clone()));
        kv.migrate().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let object = Arc::new(LocalObjectStore::new(dir.path(), "knowledge", "http://localhost:9000"));
        let processor = new_processor(graph.clone(), vector, object, kv);

        let mut payload = empty_payload("doc-entities");
        payload.entities = Some(EntityBatch {
            people: vec![serde_json::json!({"email": "alice@example.com"})],
            organizations: vec![serde_json::json!({"name": "Acme Corp"})],
            projects: vec![serde_json::json!({"name": "Atlas", "tags": ["infra"]})],
            places: vec![serde_json::json!({"name": "HQ", "geo_coordinates": [1.0, 2.0]})],
            events: vec![serde_json::json!({"title": "Kickoff", "starts_at": "2026-01-01T00:00:00Z"})],
        });

        processor.process(&payload).await.unwrap();

        let hits = graph.entity_search("Acme", 10).await.unwrap();
        assert!(hits.iter().any(|h| h.kind == "organization"));

        let hits = graph.entity_search("alice", 10).await.unwrap();
        assert!(hits.iter().any(|h| h.kind == "person"));
    }

    #[tokio::test]
    async fn image_payload_is_linked_to_its_source_file() {
        let pool = memory_pool().await;
        let graph = Arc::new(SqliteGraphStore::new(pool.clone()));
        graph.migrate().await.unwrap();
        let vector = Arc::new(SqliteVectorStore::new(pool.clone()));
        vector.migrate().await.unwrap();
        let kv = Arc::new(SqliteKvStore::new(pool.clone()));
        kv.migrate().await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let object = Arc::new(LocalObjectStore::new(dir.path(), "knowledge", "http://localhost:9000"));

        let source_dir = tempfile::tempdir().unwrap();
        let source_path = source_dir.path().join("photo.png");
        let img = image::RgbImage::new(4, 4);
        img.save(&source_path).unwrap();

        let processor = new_processor(graph.clone(), vector, object, kv);

        let mut payload = empty_payload("doc-image");
        payload.files.push(FileDescriptor {
            uri: source_path.to_string_lossy().into_owned(),
            mime_type: Some("image/png".into()),
            sha256: None,
            size_bytes: None,
            created_at: None,
            duration_seconds: None,
        });
        payload.image = Some(ImageDescriptor {
            image_id: "image-1".into(),
            capture_time_utc: None,
            capture_time_local: None,
            gps_coords: None,
            image_type: "image/png".into(),
            image_vector: None,
        });

        processor.process(&payload).await.unwrap();

        let related = graph.traverse_related(&["image-1".to_string()], 1, 10).await.unwrap();
        assert!(!related.is_empty());
    }
}
