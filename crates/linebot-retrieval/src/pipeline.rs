use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::instrument;

use linebot_conversations::{ConversationStore, SenderFilter, SenderType};
use linebot_knowledge::{sanitize_embedding, KnowledgeStore};
use linebot_llm::provider::{ChatMessage, Role};
use linebot_llm::{EmbeddingClient, RerankerClient};

use crate::error::Result;
use crate::types::{RetrievalMode, RetrievalSettings, RetrievedChunk};

/// Cache entries outlive their usefulness the moment a referenced
/// document is soft-deleted; since nothing downstream notifies this
/// pipeline of that, a short TTL is the advisory bound §4.5's caching
/// note allows instead of a real invalidation channel.
const CACHE_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct CachedChunks {
    chunks: Vec<RetrievedChunk>,
    at: Instant,
}

#[derive(Clone)]
struct CachedEmbedding {
    vector: Vec<f32>,
    at: Instant,
}

/// C5: intent classification lives in `intent.rs`; this is the rest of
/// the pipeline — retrieval mode dispatch, context assembly, history
/// assembly, and the advisory caches described in §4.5.
pub struct RetrievalPipeline {
    knowledge: Arc<KnowledgeStore>,
    conversations: Arc<ConversationStore>,
    embeddings: Arc<EmbeddingClient>,
    reranker: Option<Arc<RerankerClient>>,
    retrieval_cache: DashMap<String, CachedChunks>,
    embedding_cache: Mutex<HashMap<String, CachedEmbedding>>,
}

impl RetrievalPipeline {
    pub fn new(
        knowledge: Arc<KnowledgeStore>,
        conversations: Arc<ConversationStore>,
        embeddings: Arc<EmbeddingClient>,
        reranker: Option<Arc<RerankerClient>>,
    ) -> Self {
        Self {
            knowledge,
            conversations,
            embeddings,
            reranker,
            retrieval_cache: DashMap::new(),
            embedding_cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(bot_id: &str, query: &str, model: &str, settings: &RetrievalSettings) -> String {
        format!(
            "{bot_id}\u{1}{query}\u{1}{:?}\u{1}{}\u{1}{}\u{1}{model}",
            settings.mode,
            settings.threshold.to_bits(),
            settings.k
        )
    }

    async fn embed_cached(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let key = format!("{model}\u{1}{text}");
        if let Some(entry) = self.embedding_cache.lock().unwrap().get(&key) {
            if entry.at.elapsed() < CACHE_TTL {
                return Ok(entry.vector.clone());
            }
        }

        // Same dimensionality invariant C4 enforces on stored chunks (§3,
        // §4.4): a query vector of the wrong length would otherwise mis-score
        // every candidate via `cosine_similarity`'s zip-to-shorter behavior.
        let vector = sanitize_embedding(self.embeddings.embed(text).await?);
        self.embedding_cache.lock().unwrap().insert(
            key,
            CachedEmbedding {
                vector: vector.clone(),
                at: Instant::now(),
            },
        );
        Ok(vector)
    }

    /// §4.5 step 2/3: run the configured retrieval mode and return the
    /// top-k chunks. Checks the advisory cache first.
    #[instrument(skip(self, query, settings), fields(bot_id, mode = ?settings.mode))]
    pub async fn retrieve(
        &self,
        bot_id: &str,
        query: &str,
        model: &str,
        settings: &RetrievalSettings,
    ) -> Result<Vec<RetrievedChunk>> {
        let key = Self::cache_key(bot_id, query, model, settings);
        if let Some(cached) = self.retrieval_cache.get(&key) {
            if cached.at.elapsed() < CACHE_TTL {
                return Ok(cached.chunks.clone());
            }
        }

        let chunks = match settings.mode {
            RetrievalMode::VectorOnly => self.retrieve_vector_only(bot_id, query, model, settings).await?,
            RetrievalMode::HybridRrf => self.retrieve_hybrid_rrf(bot_id, query, model, settings).await?,
            RetrievalMode::Rerank => self.retrieve_rerank(bot_id, query, model, settings).await?,
        };

        self.retrieval_cache.insert(
            key,
            CachedChunks {
                chunks: chunks.clone(),
                at: Instant::now(),
            },
        );
        Ok(chunks)
    }

    async fn retrieve_vector_only(
        &self,
        bot_id: &str,
        query: &str,
        model: &str,
        settings: &RetrievalSettings,
    ) -> Result<Vec<RetrievedChunk>> {
        let embedding = self.embed_cached(query, model).await?;
        let hits = self
            .knowledge
            .search_vector(bot_id, &embedding, settings.threshold, settings.k)?;
        Ok(hits
            .into_iter()
            .map(|(chunk, score)| RetrievedChunk { chunk, score })
            .collect())
    }

    /// §4.5 step 2, mode "Hybrid RRF": vector and lexical search run with
    /// `2k` candidates each, fused by Reciprocal Rank Fusion
    /// (`score = Σ weight / (rrf_k + rank)`, rank 1-based).
    async fn retrieve_hybrid_rrf(
        &self,
        bot_id: &str,
        query: &str,
        model: &str,
        settings: &RetrievalSettings,
    ) -> Result<Vec<RetrievedChunk>> {
        let pool = settings.k * 2;
        let embedding = self.embed_cached(query, model).await?;

        let (vector_hits, lexical_hits) = tokio::try_join!(
            async {
                self.knowledge
                    .search_vector(bot_id, &embedding, 0.0, pool)
                    .map_err(crate::error::RetrievalError::from)
            },
            async {
                self.knowledge
                    .search_lexical(bot_id, query, pool)
                    .map_err(crate::error::RetrievalError::from)
            }
        )?;

        let fused = rrf_fuse(&vector_hits, &lexical_hits, settings.vector_weight, settings.lexical_weight, settings.rrf_k);
        let mut out: Vec<RetrievedChunk> = fused.into_iter().map(|(chunk, score)| RetrievedChunk { chunk, score }).collect();
        out.truncate(settings.k);
        Ok(out)
    }

    /// §4.5 step 2, mode "Rerank": retrieve `initial_k` via vector search,
    /// score `(query, content)` pairs with a cross-encoder, and optionally
    /// blend the rerank score with the original vector score.
    async fn retrieve_rerank(
        &self,
        bot_id: &str,
        query: &str,
        model: &str,
        settings: &RetrievalSettings,
    ) -> Result<Vec<RetrievedChunk>> {
        let reranker = match &self.reranker {
            Some(r) => r,
            None => return self.retrieve_vector_only(bot_id, query, model, settings).await,
        };

        let embedding = self.embed_cached(query, model).await?;
        let candidates = self
            .knowledge
            .search_vector(bot_id, &embedding, 0.0, settings.initial_k)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let documents: Vec<String> = candidates.iter().map(|(c, _)| c.content.clone()).collect();
        let scored = reranker.rerank(query, &documents, settings.k).await?;

        let mut out: Vec<RetrievedChunk> = scored
            .into_iter()
            .filter_map(|(idx, rerank_score)| {
                let (chunk, vector_score) = candidates.get(idx)?;
                let score = match settings.rerank_blend_alpha {
                    Some(alpha) => alpha * rerank_score + (1.0 - alpha) * vector_score,
                    None => rerank_score,
                };
                Some(RetrievedChunk {
                    chunk: chunk.clone(),
                    score,
                })
            })
            .collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        out.truncate(settings.k);
        Ok(out)
    }

    /// §4.5 step 4: last N messages of the conversation, oldest first,
    /// mapped to the role convention C6's `ask` expects.
    #[instrument(skip(self))]
    pub fn history_for(&self, bot_id: &str, line_user_id: &str, n: u32) -> Result<Vec<ChatMessage>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let (mut items, _total) =
            self.conversations
                .read(bot_id, line_user_id, n as i64, 0, &SenderFilter { sender_type: None })?;
        // `read` returns newest-first; a transcript reads oldest-first.
        items.reverse();

        Ok(items
            .iter()
            .filter_map(|m| {
                let text = m.text_content()?;
                let role = if m.sender_type == SenderType::Bot { Role::Assistant } else { Role::User };
                Some(ChatMessage {
                    role,
                    content: text.to_string(),
                })
            })
            .collect())
    }
}

/// §4.5 step 3: `[片段i]\n{content}`, 1-indexed, blank-line separated.
/// Empty input yields an empty string, which `LlmClient::ask` treats as
/// "no context block".
pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, c)| format!("[片段{}]\n{}", i + 1, c.chunk.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Reciprocal Rank Fusion: `score = Σ weight / (rrf_k + rank)` over the
/// two ranked lists, rank starting at 1. A chunk present in both lists
/// accumulates both terms.
fn rrf_fuse(
    vector_hits: &[(linebot_knowledge::Chunk, f32)],
    lexical_hits: &[(linebot_knowledge::Chunk, f32)],
    vector_weight: f32,
    lexical_weight: f32,
    rrf_k: f32,
) -> Vec<(linebot_knowledge::Chunk, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();
    let mut chunks: HashMap<String, linebot_knowledge::Chunk> = HashMap::new();

    for (rank, (chunk, _)) in vector_hits.iter().enumerate() {
        let contribution = vector_weight / (rrf_k + (rank + 1) as f32);
        *scores.entry(chunk.id.clone()).or_insert(0.0) += contribution;
        chunks.entry(chunk.id.clone()).or_insert_with(|| chunk.clone());
    }
    for (rank, (chunk, _)) in lexical_hits.iter().enumerate() {
        let contribution = lexical_weight / (rrf_k + (rank + 1) as f32);
        *scores.entry(chunk.id.clone()).or_insert(0.0) += contribution;
        chunks.entry(chunk.id.clone()).or_insert_with(|| chunk.clone());
    }

    let mut fused: Vec<(linebot_knowledge::Chunk, f32)> = scores
        .into_iter()
        .filter_map(|(id, score)| chunks.remove(&id).map(|chunk| (chunk, score)))
        .collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use linebot_knowledge::Chunk;
    use serde_json::json;

    fn chunk(id: &str, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            doc_id: "doc-1".to_string(),
            bot_id: None,
            content: content.to_string(),
            embedding: vec![],
            meta: json!({}),
            is_deleted: false,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn rrf_favors_items_ranked_high_in_both_lists() {
        let vector = vec![(chunk("a", "A"), 0.9), (chunk("b", "B"), 0.8)];
        let lexical = vec![(chunk("b", "B"), 5.0), (chunk("a", "A"), 1.0)];
        let fused = rrf_fuse(&vector, &lexical, 0.7, 0.3, 60.0);
        assert_eq!(fused.len(), 2);
        // Both appear at rank 1 in one list and rank 2 in the other, so
        // their fused scores are close; just assert both are present and
        // the ordering is deterministic (not that either must win).
        let ids: Vec<&str> = fused.iter().map(|(c, _)| c.id.as_str()).collect();
        assert!(ids.contains(&"a") && ids.contains(&"b"));
    }

    #[test]
    fn rrf_includes_lexical_only_hits() {
        let vector = vec![(chunk("a", "A"), 0.9)];
        let lexical = vec![(chunk("c", "C"), 2.0)];
        let fused = rrf_fuse(&vector, &lexical, 0.7, 0.3, 60.0);
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn context_assembly_matches_spec_format() {
        let chunks = vec![
            RetrievedChunk { chunk: chunk("a", "first"), score: 1.0 },
            RetrievedChunk { chunk: chunk("b", "second"), score: 0.5 },
        ];
        let text = format_context(&chunks);
        assert_eq!(text, "[片段1]\nfirst\n\n[片段2]\nsecond");
    }

    #[test]
    fn empty_chunks_produce_empty_context() {
        assert_eq!(format_context(&[]), "");
    }
}
