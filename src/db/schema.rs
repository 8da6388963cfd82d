//! SQL DDL for all Mneme tables.
//!
//! Defines `entities`, `relations`, `memories`, and `schema_meta`. Embeddings
//! live in BLOB columns next to the rows they describe and are scored with
//! sqlite-vec's `vec_distance_cosine`. All DDL uses `IF NOT EXISTS` for
//! idempotent initialization.

use rusqlite::Connection;

/// All schema DDL statements for Mneme's core tables.
const SCHEMA_SQL: &str = r#"
-- Knowledge graph nodes. (owner_id, type, name) is the upsert identity.
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    type TEXT NOT NULL CHECK(type IN ('person','organization','location','concept','event','custom')),
    name TEXT NOT NULL CHECK(length(name) > 0),
    properties TEXT NOT NULL DEFAULT '{}',
    source TEXT,
    confidence REAL NOT NULL DEFAULT 1.0 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(owner_id, type, name)
);

CREATE INDEX IF NOT EXISTS idx_entities_owner_name ON entities(owner_id, name);
CREATE INDEX IF NOT EXISTS idx_entities_owner_type ON entities(owner_id, type);

-- Directed, typed edges. Removed with either endpoint.
CREATE TABLE IF NOT EXISTS relations (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    source_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    type TEXT NOT NULL CHECK(length(type) BETWEEN 1 AND 64),
    properties TEXT NOT NULL DEFAULT '{}',
    confidence REAL NOT NULL DEFAULT 1.0 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    valid_from TEXT,
    valid_to TEXT,
    created_at TEXT NOT NULL,
    CHECK(source_id <> target_id)
);

CREATE INDEX IF NOT EXISTS idx_relations_owner_source ON relations(owner_id, source_id);
CREATE INDEX IF NOT EXISTS idx_relations_owner_target ON relations(owner_id, target_id);
CREATE INDEX IF NOT EXISTS idx_relations_owner_type ON relations(owner_id, type);
CREATE INDEX IF NOT EXISTS idx_relations_owner_created ON relations(owner_id, created_at);

-- Free-text memories, independent of the graph.
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    content TEXT NOT NULL CHECK(length(content) > 0),
    agent_id TEXT,
    session_id TEXT,
    source TEXT NOT NULL DEFAULT 'conversation' CHECK(source IN ('conversation','document','extraction')),
    importance REAL NOT NULL DEFAULT 0.5 CHECK(importance >= 0.0 AND importance <= 1.0),
    tags TEXT NOT NULL DEFAULT '[]',
    embedding BLOB,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_memories_owner_created ON memories(owner_id, created_at);
CREATE INDEX IF NOT EXISTS idx_memories_owner_agent ON memories(owner_id, agent_id);
CREATE INDEX IF NOT EXISTS idx_memories_owner_session ON memories(owner_id, session_id);

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"entities".to_string()));
        assert!(tables.contains(&"relations".to_string()));
        assert!(tables.contains(&"memories".to_string()));
        assert!(tables.contains(&"schema_meta".to_string()));

        // sqlite-vec is registered for every connection
        let version: String = conn
            .query_row("SELECT vec_version()", [], |r| r.get(0))
            .unwrap();
        assert!(!version.is_empty());
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error
    }

    #[test]
    fn self_loop_is_rejected_by_the_store() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO entities (id, owner_id, type, name, created_at, updated_at) \
             VALUES ('a', 'u1', 'person', 'A', 't', 't')",
            [],
        )
        .unwrap();

        let result = conn.execute(
            "INSERT INTO relations (id, owner_id, source_id, target_id, type, created_at) \
             VALUES ('r', 'u1', 'a', 'a', 'knows', 't')",
            [],
        );
        assert!(result.is_err());
    }
}
