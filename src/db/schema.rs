//! SQL DDL for the local cache.
//!
//! Defines the `papers`, `analyses`, `notes`, `sync_log`, and `schema_meta`
//! tables. All DDL uses `IF NOT EXISTS` for idempotent initialization. Columns
//! added after v1 arrive through [`super::migrations`].

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Papers, keyed by normalized external identifier (arxiv:XXXX.XXXXX)
CREATE TABLE IF NOT EXISTS papers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    arxiv_id TEXT NOT NULL UNIQUE,
    owner TEXT,
    title TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '[]',
    abstract TEXT NOT NULL DEFAULT '',
    url TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT 'unknown',
    status TEXT NOT NULL DEFAULT 'discovered'
        CHECK(status IN ('discovered','saved','analyzed','deep_analyzed','cited')),
    added_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_papers_owner ON papers(owner);
CREATE INDEX IF NOT EXISTS idx_papers_status ON papers(status);

-- AI-generated analyses; several per paper are allowed
CREATE TABLE IF NOT EXISTS analyses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    paper_id INTEGER NOT NULL REFERENCES papers(id) ON DELETE CASCADE,
    owner TEXT,
    provider TEXT NOT NULL,
    summary TEXT NOT NULL DEFAULT '',
    key_findings TEXT NOT NULL DEFAULT '[]',
    methodology TEXT NOT NULL DEFAULT '',
    research_gaps TEXT NOT NULL DEFAULT '[]',
    tags TEXT NOT NULL DEFAULT '[]',
    strength_score REAL NOT NULL DEFAULT 0,
    provenance TEXT NOT NULL DEFAULT '{}',
    analyzed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analyses_paper ON analyses(paper_id);
CREATE INDEX IF NOT EXISTS idx_analyses_provider ON analyses(paper_id, provider);

-- Research notes, always owned by one principal
CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner TEXT NOT NULL,
    paper_id INTEGER REFERENCES papers(id) ON DELETE SET NULL,
    content TEXT NOT NULL,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_owner ON notes(owner);

-- Audit trail of cache mutations
CREATE TABLE IF NOT EXISTS sync_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL
        CHECK(operation IN ('insert','update','promote','backfill','purge','hydrate')),
    entity_kind TEXT NOT NULL,
    entity_key TEXT NOT NULL,
    details TEXT,
    created_at TEXT NOT NULL
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
