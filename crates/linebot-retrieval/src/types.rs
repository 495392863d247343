use linebot_knowledge::Chunk;

/// §4.5 mode 2's Open Question resolution: hybrid-RRF and rerank are
/// mutually exclusive per bot, chosen by configuration, never combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    VectorOnly,
    HybridRrf,
    Rerank,
}

impl RetrievalMode {
    /// Parses a bot's `ai_retrieval_mode` column. Unrecognized values fall
    /// back to vector-only rather than failing the webhook.
    pub fn from_str_lenient(s: &str) -> Self {
        match s {
            "hybrid_rrf" => RetrievalMode::HybridRrf,
            "rerank" => RetrievalMode::Rerank,
            _ => RetrievalMode::VectorOnly,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalSettings {
    pub mode: RetrievalMode,
    pub threshold: f32,
    pub k: usize,
    /// Candidate pool size for rerank mode before scoring (default 20).
    pub initial_k: usize,
    pub vector_weight: f32,
    pub lexical_weight: f32,
    pub rrf_k: f32,
    /// `Some(alpha)` blends rerank and vector scores ("hybrid rerank");
    /// `None` uses the reranker's score alone.
    pub rerank_blend_alpha: Option<f32>,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::VectorOnly,
            threshold: 0.7,
            k: 5,
            initial_k: 20,
            vector_weight: 0.7,
            lexical_weight: 0.3,
            rrf_k: 60.0,
            rerank_blend_alpha: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Chunk,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Chat,
    Query,
}
