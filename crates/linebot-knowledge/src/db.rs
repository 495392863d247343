use rusqlite::{Connection, Result};

/// Initialise the documents/chunks tables, their indexes, and the FTS5
/// lexical index. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_documents_table(conn)?;
    create_chunks_table(conn)?;
    create_fts_index(conn)?;
    Ok(())
}

fn create_documents_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            id          TEXT PRIMARY KEY,
            bot_id      TEXT,
            source_type TEXT NOT NULL,
            title       TEXT NOT NULL,
            ai_summary  TEXT,
            is_deleted  INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_bot
            ON documents(bot_id, is_deleted);",
    )
}

fn create_chunks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chunks (
            id          TEXT PRIMARY KEY,
            doc_id      TEXT NOT NULL,
            bot_id      TEXT,
            content     TEXT NOT NULL,
            embedding   BLOB NOT NULL,
            meta        TEXT NOT NULL,
            is_deleted  INTEGER NOT NULL DEFAULT 0,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_bot ON chunks(bot_id, is_deleted);",
    )
}

/// External-content FTS5 table over `chunks.content`, synced manually on
/// every insert/tombstone since content='' keeps SQLite from maintaining it.
fn create_fts_index(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts
            USING fts5(content, content='chunks', content_rowid='rowid');",
    )
}

/// Pack an embedding into a little-endian byte blob for storage. Avoids
/// pulling in a serialization crate just for fixed-width floats.
pub fn embedding_to_blob(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

pub fn blob_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}
