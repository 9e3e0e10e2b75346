//! Hybrid retrieval orchestration (C11): cache lookup, concurrent dense/lexical/entity
//! fan-out, doc-id merge, cross-encoder rerank, MMR diversification, and
//! request-fingerprinted result caching. Ported from the original
//! `RetrievalOrchestrator.retrieve()`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::embedding::{embed_query, CrossEncoderModel, EmbeddingProvider, RerankCandidate, Reranker};
use crate::errors::CoreError;
use crate::graph_store::GraphStore;
use crate::kv_store::KvStore;
use crate::models::RetrievedDocument;
use crate::query_planner::QueryPlanner;
use crate::vector_store::VectorStore;

const MMR_LAMBDA: f64 = 0.7;
/// 24h, per the KV contract's `ask:{query}:{top_k}` cache entries.
const CACHE_TTL_SECS: i64 = 86400;
const ENTITY_EXPANSION_HOPS: u32 = 1;

struct MergedCandidate {
    doc_id: String,
    uri: String,
    text: String,
    scores: Vec<f64>,
}

impl MergedCandidate {
    /// Plain mean of every channel's contributed score for this doc_id, per the
    /// original merge step (`avg_score = sum(scores) / len(scores)`).
    fn avg_score(&self) -> f64 {
        self.scores.iter().sum::<f64>() / self.scores.len().max(1) as f64
    }
}

pub struct RetrievalOrchestrator<G, V, K, M> {
    graph: Arc<G>,
    vector: Arc<V>,
    kv: Arc<K>,
    planner: QueryPlanner,
    reranker: Reranker<M>,
    provider: Box<dyn EmbeddingProvider>,
    embedding_config: EmbeddingConfig,
    config: RetrievalConfig,
}

impl<G, V, K, M> RetrievalOrchestrator<G, V, K, M>
where
    G: GraphStore,
    V: VectorStore,
    K: KvStore,
    M: CrossEncoderModel,
{
    pub fn new(
        graph: Arc<G>,
        vector: Arc<V>,
        kv: Arc<K>,
        reranker: Reranker<M>,
        provider: Box<dyn EmbeddingProvider>,
        embedding_config: EmbeddingConfig,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            graph,
            vector,
            kv,
            planner: QueryPlanner::new(),
            reranker,
            provider,
            embedding_config,
            config,
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>, CoreError> {
        let cache_key = cache_key_for(query, self.config.final_limit);
        if let Some(cached) = self.kv.get(&cache_key).await? {
            if let Ok(docs) = serde_json::from_str::<Vec<RetrievedDocument>>(&cached) {
                return Ok(docs);
            }
        }

        let plan = self.planner.plan(query, chrono::Utc::now());

        let dense_fut = self.dense_search(query);
        let lexical_fut = self.lexical_search(query);
        let entity_fut = self.entity_expansion_search(&plan);
        let (dense, lexical, entity) = tokio::join!(dense_fut, lexical_fut, entity_fut);
        let dense = dense?;
        let lexical = lexical?;
        let entity = entity?;

        let merged = merge_candidates(vec![dense, lexical, entity]);
        if merged.is_empty() {
            return Ok(Vec::new());
        }

        let rerank_candidates: Vec<RerankCandidate> = merged
            .iter()
            .map(|c| RerankCandidate {
                id: c.doc_id.clone(),
                text: c.text.clone(),
                first_pass_score: c.avg_score(),
            })
            .collect();
        let reranked = self.reranker.rerank(query, &rerank_candidates);
        let score_by_id: HashMap<&str, f64> = reranked.iter().map(|(id, s)| (id.as_str(), *s)).collect();

        let mut ordered: Vec<&MergedCandidate> = merged.iter().collect();
        ordered.sort_by(|a, b| {
            let sa = score_by_id.get(a.doc_id.as_str()).copied().unwrap_or(0.0);
            let sb = score_by_id.get(b.doc_id.as_str()).copied().unwrap_or(0.0);
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });

        let selected = mmr_select(&ordered, &score_by_id, self.config.final_limit as usize);

        let results: Vec<RetrievedDocument> = selected
            .into_iter()
            .map(|c| RetrievedDocument {
                doc_id: c.doc_id.clone(),
                uri: c.uri.clone(),
                text: c.text.clone(),
                score: score_by_id.get(c.doc_id.as_str()).copied().unwrap_or(0.0),
            })
            .collect();

        if let Ok(serialized) = serde_json::to_string(&results) {
            let _ = self.kv.set(&cache_key, &serialized, Some(CACHE_TTL_SECS)).await;
        }

        Ok(results)
    }

    async fn dense_search(&self, query: &str) -> Result<Vec<MergedCandidate>, CoreError> {
        let query_vec = match embed_query(self.provider.as_ref(), &self.embedding_config, query).await {
            Ok(v) => v,
            Err(_) => return Ok(Vec::new()),
        };
        let hits = self
            .vector
            .search("documents", &query_vec, self.config.candidate_k_vector)
            .await?;
        Ok(hits
            .into_iter()
            .map(|h| MergedCandidate {
                doc_id: h.doc_id,
                uri: h.uri,
                text: h.text,
                scores: vec![h.score],
            })
            .collect())
    }

    async fn lexical_search(&self, query: &str) -> Result<Vec<MergedCandidate>, CoreError> {
        let hits = self
            .graph
            .lexical_search(query, self.config.candidate_k_keyword)
            .await?;
        Ok(hits
            .into_iter()
            .map(|h| MergedCandidate {
                doc_id: h.doc_id,
                uri: String::new(),
                text: h.text,
                scores: vec![h.rank],
            })
            .collect())
    }

    async fn entity_expansion_search(
        &self,
        plan: &crate::query_planner::QueryPlan,
    ) -> Result<Vec<MergedCandidate>, CoreError> {
        if plan.entities.is_empty() {
            return Ok(Vec::new());
        }
        let mut seed_ids = Vec::new();
        for entity in &plan.entities {
            let hits = self.graph.entity_search(entity, 5).await?;
            seed_ids.extend(hits.into_iter().map(|h| h.entity_id));
        }
        if seed_ids.is_empty() {
            return Ok(Vec::new());
        }
        let related = self
            .graph
            .traverse_related(&seed_ids, ENTITY_EXPANSION_HOPS, self.config.candidate_k_keyword)
            .await?;
        Ok(related
            .into_iter()
            .map(|doc_id| MergedCandidate {
                doc_id,
                uri: String::new(),
                text: String::new(),
                // Entity-expansion candidates carry no ranking signal of their own; the
                // original assigns a flat 0.1 so they surface only when no stronger
                // dense/lexical hit exists for the same doc_id.
                scores: vec![0.1],
            })
            .collect())
    }
}

fn cache_key_for(query: &str, top_k: i64) -> String {
    format!("ask:{query}:{top_k}")
}

fn merge_candidates(channels: Vec<Vec<MergedCandidate>>) -> Vec<MergedCandidate> {
    let mut merged: Vec<MergedCandidate> = Vec::new();
    let mut index_by_id: HashMap<String, usize> = HashMap::new();
    for channel in channels {
        for candidate in channel {
            if let Some(&idx) = index_by_id.get(&candidate.doc_id) {
                let existing = &mut merged[idx];
                existing.scores.extend(candidate.scores);
                if existing.text.is_empty() {
                    existing.text = candidate.text;
                }
                if existing.uri.is_empty() {
                    existing.uri = candidate.uri;
                }
            } else {
                index_by_id.insert(candidate.doc_id.clone(), merged.len());
                merged.push(candidate);
            }
        }
    }
    merged
}

/// Set-overlap similarity over raw (lowercased) token sets:
/// `|A ∩ B| / (sqrt(|A|) * sqrt(|B|))`. Ported from `_cosine_similarity`, which despite
/// its name is not frequency-weighted cosine — it counts shared distinct tokens, not
/// shared term frequency.
fn word_set_cosine(a: &str, b: &str) -> f64 {
    use std::collections::HashSet;
    let tokens = |s: &str| -> HashSet<String> { s.split_whitespace().map(|w| w.to_lowercase()).collect() };
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count() as f64;
    let denom = (ta.len() as f64).sqrt() * (tb.len() as f64).sqrt();
    if denom < f64::EPSILON {
        0.0
    } else {
        intersection / denom
    }
}

fn mmr_select<'a>(
    ranked: &[&'a MergedCandidate],
    score_by_id: &HashMap<&str, f64>,
    limit: usize,
) -> Vec<&'a MergedCandidate> {
    let mut remaining: Vec<&MergedCandidate> = ranked.to_vec();
    let mut selected: Vec<&MergedCandidate> = Vec::new();

    while !remaining.is_empty() && selected.len() < limit {
        let mut best_idx = 0;
        let mut best_mmr = f64::NEG_INFINITY;
        for (idx, candidate) in remaining.iter().enumerate() {
            let relevance = score_by_id.get(candidate.doc_id.as_str()).copied().unwrap_or(0.0);
            let diversity = selected
                .iter()
                .map(|s| word_set_cosine(&candidate.text, &s.text))
                .fold(0.0, f64::max);
            let mmr_score = MMR_LAMBDA * relevance - (1.0 - MMR_LAMBDA) * diversity;
            if mmr_score > best_mmr {
                best_mmr = mmr_score;
                best_idx = idx;
            }
        }
        selected.push(remaining.remove(best_idx));
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::CrossEncoderModel;

    fn candidate(doc_id: &str, text: &str, scores: &[f64]) -> MergedCandidate {
        MergedCandidate {
            doc_id: doc_id.to_string(),
            uri: String::new(),
            text: text.to_string(),
            scores: scores.to_vec(),
        }
    }

    #[test]
    fn merge_combines_duplicate_doc_ids_across_channels() {
        let dense = vec![candidate("doc-1", "atlas notes", &[0.9])];
        let lexical = vec![candidate("doc-1", "", &[0.4])];
        let merged = merge_candidates(vec![dense, lexical]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].scores, vec![0.9, 0.4]);
        assert_eq!(merged[0].text, "atlas notes");
    }

    #[test]
    fn avg_score_is_plain_mean_of_channel_scores() {
        let c = candidate("doc-1", "x", &[0.9, 0.7]);
        assert!((c.avg_score() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn word_set_cosine_identical_text_is_one() {
        assert!((word_set_cosine("atlas kickoff", "atlas kickoff") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn mmr_prefers_diverse_second_pick() {
        let mut scores = HashMap::new();
        scores.insert("a", 0.9);
        scores.insert("b", 0.85);
        scores.insert("c", 0.8);
        let a = candidate("a", "atlas project kickoff notes", &[0.9]);
        let b = candidate("b", "atlas project kickoff notes", &[0.85]);
        let c = candidate("c", "budget review quarterly finance", &[0.8]);
        let ranked = vec![&a, &b, &c];
        let selected = mmr_select(&ranked, &scores, 2);
        assert_eq!(selected[0].doc_id, "a");
        // b is near-identical to a; c should win the second slot despite a lower
        // first-pass score because it is more diverse.
        assert_eq!(selected[1].doc_id, "c");
    }

    /// A stub cross-encoder whose raw logit is engineered so `sigmoid(raw) == 0.95`
    /// exactly, via the logit function `ln(p / (1 - p))`.
    struct FixedLogitModel(f32);

    impl CrossEncoderModel for FixedLogitModel {
        fn score_pair(&self, _query: &str, _document: &str) -> anyhow::Result<f32> {
            Ok(self.0)
        }
    }

    /// Reproduces the worked example: doc-1 gets a dense hit at 0.9 and a lexical hit
    /// at 0.7 (merged avg_score = 0.8), then a cross-encoder raw logit that sigmoids to
    /// 0.95, blended as `0.95*0.7 + 0.8*0.3 = 0.905`.
    #[test]
    fn rerank_blends_cross_encoder_and_merged_average_score() {
        let merged = candidate("doc-1", "atlas project kickoff", &[0.9, 0.7]);
        let rerank_candidates = vec![RerankCandidate {
            id: merged.doc_id.clone(),
            text: merged.text.clone(),
            first_pass_score: merged.avg_score(),
        }];

        let target_probability = 0.95_f32;
        let raw_logit = (target_probability / (1.0 - target_probability)).ln();
        let reranker = Reranker::new(FixedLogitModel(raw_logit));
        let reranked = reranker.rerank("atlas kickoff", &rerank_candidates);

        assert_eq!(reranked.len(), 1);
        assert_eq!(reranked[0].0, "doc-1");
        assert!((reranked[0].1 - 0.905).abs() < 1e-3);
    }
}
