use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Dimensionality every embedding in the index is expected to have.
/// Vectors of any other length are rejected at `upsert_chunks`.
pub const EMBEDDING_DIM: usize = 768;

/// A source document a bot (or the whole platform, when `bot_id` is
/// `None`) can retrieve knowledge from — an uploaded file, a scraped
/// page, an operator-authored note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    /// `None` means shared across every bot on the platform.
    pub bot_id: Option<String>,
    pub source_type: String,
    pub title: String,
    /// Short summary used by the intent classifier (C5) to judge topical
    /// relevance without reading the full document.
    pub ai_summary: Option<String>,
    pub is_deleted: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One embedded passage of a `Document`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub bot_id: Option<String>,
    pub content: String,
    pub embedding: Vec<f32>,
    pub meta: Value,
    pub is_deleted: bool,
    pub created_at: String,
}

/// A chunk ready to be embedded and stored; the content and embedding are
/// supplied together since C4 never computes embeddings itself.
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub embedding: Vec<f32>,
    pub meta: Value,
}

/// Replace NaN/Inf components with 0.0 — a malformed embedding from an
/// external provider must never poison similarity search with a NaN
/// comparison that silently excludes the row — and pad/truncate to
/// `EMBEDDING_DIM` so every stored chunk satisfies the declared
/// dimensionality (§3, §4.4, §9) instead of silently mis-scoring against
/// a wrong-length query vector.
pub fn sanitize_embedding(mut v: Vec<f32>) -> Vec<f32> {
    for x in v.iter_mut() {
        if !x.is_finite() {
            *x = 0.0;
        }
    }
    v.resize(EMBEDDING_DIM, 0.0);
    v
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_non_finite_components() {
        let v = sanitize_embedding(vec![1.0, f32::NAN, f32::INFINITY, -f32::INFINITY, 2.0]);
        assert_eq!(v.len(), EMBEDDING_DIM);
        assert_eq!(&v[..5], &[1.0, 0.0, 0.0, 0.0, 2.0]);
        assert!(v[5..].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn sanitize_pads_short_vectors_and_truncates_long_ones() {
        let padded = sanitize_embedding(vec![1.0, 2.0, 3.0]);
        assert_eq!(padded.len(), EMBEDDING_DIM);
        assert_eq!(&padded[..3], &[1.0, 2.0, 3.0]);

        let truncated = sanitize_embedding(vec![0.5; EMBEDDING_DIM + 10]);
        assert_eq!(truncated.len(), EMBEDDING_DIM);
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_zero_vector_is_zero() {
        let zero = vec![0.0, 0.0, 0.0];
        let other = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
    }
}
