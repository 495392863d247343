use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::db::{blob_to_embedding, embedding_to_blob};
use crate::error::{KnowledgeError, Result};
use crate::types::{cosine_similarity, sanitize_embedding, Chunk, Document, NewChunk};

/// Front for the `documents`/`chunks` tables — the platform's shared
/// knowledge index. A chunk with `bot_id = None` is visible to every bot;
/// one with `bot_id = Some(x)` is visible only to bot `x`.
pub struct KnowledgeStore {
    db: Arc<Mutex<Connection>>,
}

impl KnowledgeStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Create or refresh a document. An existing non-deleted document with
    /// the same (bot_id, source_type, title) is updated in place; otherwise
    /// a new one is inserted.
    #[instrument(skip(self, ai_summary))]
    pub fn upsert_document(
        &self,
        bot_id: Option<&str>,
        source_type: &str,
        title: &str,
        ai_summary: Option<&str>,
    ) -> Result<String> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();

        let existing: Option<String> = db
            .query_row(
                "SELECT id FROM documents
                 WHERE bot_id IS ?1 AND source_type = ?2 AND title = ?3 AND is_deleted = 0",
                params![bot_id, source_type, title],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            db.execute(
                "UPDATE documents SET ai_summary = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, ai_summary, now],
            )?;
            return Ok(id);
        }

        let id = Uuid::now_v7().to_string();
        db.execute(
            "INSERT INTO documents (id, bot_id, source_type, title, ai_summary, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![id, bot_id, source_type, title, ai_summary, now],
        )?;
        Ok(id)
    }

    /// Insert chunks for a document, sanitizing embeddings and syncing the
    /// lexical index. Returns the new chunk ids in order.
    #[instrument(skip(self, chunks))]
    pub fn upsert_chunks(
        &self,
        doc_id: &str,
        bot_id: Option<&str>,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<String>> {
        let now = Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let mut ids = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let embedding = sanitize_embedding(chunk.embedding);
            let id = Uuid::now_v7().to_string();
            let meta_str = serde_json::to_string(&chunk.meta).unwrap_or_else(|_| "{}".to_string());

            db.execute(
                "INSERT INTO chunks (id, doc_id, bot_id, content, embedding, meta, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    doc_id,
                    bot_id,
                    chunk.content,
                    embedding_to_blob(&embedding),
                    meta_str,
                    now,
                ],
            )?;
            let rowid = db.last_insert_rowid();
            db.execute(
                "INSERT INTO chunks_fts(rowid, content) VALUES (?1, ?2)",
                params![rowid, chunk.content],
            )?;
            ids.push(id);
        }

        Ok(ids)
    }

    /// Cosine-similarity KNN over non-tombstoned chunks visible to `bot_id`
    /// (the bot's own chunks plus any shared chunks). Implemented as a
    /// brute-force scan in process — the contract only requires standard
    /// cosine-distance KNN semantics, not a specific index structure.
    #[instrument(skip(self, query_embedding))]
    pub fn search_vector(
        &self,
        bot_id: &str,
        query_embedding: &[f32],
        threshold: f32,
        k: usize,
    ) -> Result<Vec<(Chunk, f32)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT c.id, c.doc_id, c.bot_id, c.content, c.embedding, c.meta, c.is_deleted, c.created_at
             FROM chunks c
             JOIN documents d ON d.id = c.doc_id
             WHERE (c.bot_id = ?1 OR c.bot_id IS NULL)
               AND c.is_deleted = 0 AND d.is_deleted = 0",
        )?;

        let mut scored: Vec<(Chunk, f32)> = stmt
            .query_map(params![bot_id], row_to_chunk)?
            .filter_map(|r| r.ok())
            .map(|chunk| {
                let sim = cosine_similarity(query_embedding, &chunk.embedding);
                (chunk, sim)
            })
            .filter(|(_, sim)| *sim >= threshold)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// BM25 full-text search via FTS5, joined back to enforce the same
    /// soft-delete and bot-scope rules as `search_vector`.
    #[instrument(skip(self))]
    pub fn search_lexical(&self, bot_id: &str, query: &str, k: usize) -> Result<Vec<(Chunk, f32)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT c.id, c.doc_id, c.bot_id, c.content, c.embedding, c.meta, c.is_deleted, c.created_at,
                    bm25(chunks_fts) AS score
             FROM chunks_fts
             JOIN chunks c ON c.rowid = chunks_fts.rowid
             JOIN documents d ON d.id = c.doc_id
             WHERE chunks_fts MATCH ?1
               AND (c.bot_id = ?2 OR c.bot_id IS NULL)
               AND c.is_deleted = 0 AND d.is_deleted = 0
             ORDER BY score
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![query, bot_id, k as i64], |row| {
            let chunk = row_to_chunk(row)?;
            // bm25() in SQLite returns lower-is-better; negate so callers
            // can treat this the same way as cosine similarity (higher = better).
            let raw_score: f64 = row.get(8)?;
            Ok((chunk, -raw_score as f32))
        })?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Tombstone a document and all of its chunks in one transaction.
    #[instrument(skip(self))]
    pub fn soft_delete_document(&self, doc_id: &str) -> Result<()> {
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let rows = tx.execute(
            "UPDATE documents SET is_deleted = 1 WHERE id = ?1 AND is_deleted = 0",
            params![doc_id],
        )?;
        if rows == 0 {
            return Err(KnowledgeError::DocumentNotFound(doc_id.to_string()));
        }
        tx.execute(
            "UPDATE chunks SET is_deleted = 1 WHERE doc_id = ?1",
            params![doc_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, bot_id, source_type, title, ai_summary, is_deleted, created_at, updated_at
             FROM documents WHERE id = ?1",
            params![doc_id],
            row_to_document,
        )
        .optional()
        .map_err(KnowledgeError::from)
    }

    /// Recent document summaries for a bot, used by C5's intent classifier
    /// prompt (title + ai_summary, capped by the caller at 10).
    pub fn recent_summaries(&self, bot_id: &str, limit: usize) -> Result<Vec<Document>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, bot_id, source_type, title, ai_summary, is_deleted, created_at, updated_at
             FROM documents
             WHERE (bot_id = ?1 OR bot_id IS NULL) AND is_deleted = 0
             ORDER BY updated_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![bot_id, limit as i64], row_to_document)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let embedding_blob: Vec<u8> = row.get(4)?;
    let meta_str: String = row.get(5)?;
    let meta: Value = serde_json::from_str(&meta_str).unwrap_or(Value::Null);
    Ok(Chunk {
        id: row.get(0)?,
        doc_id: row.get(1)?,
        bot_id: row.get(2)?,
        content: row.get(3)?,
        embedding: blob_to_embedding(&embedding_blob),
        meta,
        is_deleted: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        source_type: row.get(2)?,
        title: row.get(3)?,
        ai_summary: row.get(4)?,
        is_deleted: row.get::<_, i64>(5)? != 0,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KnowledgeStore {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        KnowledgeStore::new(Arc::new(Mutex::new(conn)))
    }

    fn chunk(content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            content: content.to_string(),
            embedding,
            meta: serde_json::json!({}),
        }
    }

    #[test]
    fn vector_search_respects_threshold_and_bot_scope() {
        let store = store();
        let doc = store
            .upsert_document(Some("bot-1"), "note", "Refund policy", None)
            .unwrap();
        store
            .upsert_chunks(
                &doc,
                Some("bot-1"),
                vec![chunk("refunds within 30 days", vec![1.0, 0.0, 0.0])],
            )
            .unwrap();

        let hits = store
            .search_vector("bot-1", &[1.0, 0.0, 0.0], 0.9, 5)
            .unwrap();
        assert_eq!(hits.len(), 1);

        let hits_other_bot = store
            .search_vector("bot-2", &[1.0, 0.0, 0.0], 0.9, 5)
            .unwrap();
        assert!(hits_other_bot.is_empty());
    }

    #[test]
    fn shared_documents_are_visible_to_every_bot() {
        let store = store();
        let doc = store.upsert_document(None, "note", "Shared FAQ", None).unwrap();
        store
            .upsert_chunks(&doc, None, vec![chunk("shared answer", vec![0.0, 1.0, 0.0])])
            .unwrap();

        let hits = store.search_vector("bot-1", &[0.0, 1.0, 0.0], 0.9, 5).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn soft_delete_removes_document_and_chunks_from_search() {
        let store = store();
        let doc = store
            .upsert_document(Some("bot-1"), "note", "Old policy", None)
            .unwrap();
        store
            .upsert_chunks(&doc, Some("bot-1"), vec![chunk("outdated", vec![1.0, 0.0, 0.0])])
            .unwrap();

        store.soft_delete_document(&doc).unwrap();

        let hits = store.search_vector("bot-1", &[1.0, 0.0, 0.0], 0.0, 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn lexical_search_finds_matching_terms() {
        let store = store();
        let doc = store
            .upsert_document(Some("bot-1"), "note", "Shipping", None)
            .unwrap();
        store
            .upsert_chunks(
                &doc,
                Some("bot-1"),
                vec![chunk("shipping takes five business days", vec![0.0; 3])],
            )
            .unwrap();

        let hits = store.search_lexical("bot-1", "shipping", 5).unwrap();
        assert_eq!(hits.len(), 1);
    }
}
