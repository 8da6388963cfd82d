//! Memory write and read path.
//!
//! Memories are free-text records with an embedding, independent of the
//! graph. They are created, listed, deleted, and the content may be edited
//! (which replaces the embedding). Every query is scoped by owner.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::types::{Memory, MemorySource, NewMemory, Page, PageRequest};
use super::{embedding_to_bytes, new_id, now_timestamp, parse_enum};
use crate::error::{MemoryError, Result};

pub(crate) const MEMORY_COLUMNS: &str =
    "id, owner_id, content, agent_id, session_id, source, importance, tags, created_at, updated_at";

pub(crate) fn memory_from_row(row: &Row) -> rusqlite::Result<Memory> {
    let source: String = row.get(5)?;
    let tags: String = row.get(7)?;
    Ok(Memory {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        content: row.get(2)?,
        agent_id: row.get(3)?,
        session_id: row.get(4)?,
        source: parse_enum(5, &source)?,
        importance: row.get(6)?,
        tags: serde_json::from_str(&tags).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
        })?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Optional filters shared by listing and memory search.
#[derive(Debug, Clone, Default)]
pub struct MemoryFilter {
    pub agent_id: Option<String>,
    pub session_id: Option<String>,
    pub source: Option<MemorySource>,
    /// Matches memories carrying this tag, wherever it sits in the list.
    pub tag: Option<String>,
}

/// SQL predicate over `memories` for a [`MemoryFilter`], bound at `?first..?first+3`.
pub(crate) fn filter_clause(first: usize) -> String {
    let (a, s, src, t) = (first, first + 1, first + 2, first + 3);
    format!(
        "(?{a} IS NULL OR agent_id = ?{a}) \
         AND (?{s} IS NULL OR session_id = ?{s}) \
         AND (?{src} IS NULL OR source = ?{src}) \
         AND (?{t} IS NULL OR EXISTS (SELECT 1 FROM json_each(memories.tags) WHERE value = ?{t}))"
    )
}

/// Insert a memory with its embedding.
pub fn add_memory(conn: &Connection, input: &NewMemory, embedding: &[f32]) -> Result<Memory> {
    let id = new_id();
    let now = now_timestamp();
    let tags = serde_json::to_string(&input.tags)?;

    let sql = format!(
        "INSERT INTO memories (id, owner_id, content, agent_id, session_id, source, importance, tags, embedding, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10) \
         RETURNING {MEMORY_COLUMNS}"
    );

    let memory = conn.query_row(
        &sql,
        params![
            id,
            input.owner_id,
            input.content,
            input.agent_id,
            input.session_id,
            input.source.as_str(),
            input.importance,
            tags,
            embedding_to_bytes(embedding),
            now,
        ],
        memory_from_row,
    )?;

    tracing::debug!(id = %memory.id, source = %memory.source, "memory stored");
    Ok(memory)
}

pub fn get_memory(conn: &Connection, id: &str, owner: &str) -> Result<Memory> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1 AND owner_id = ?2");
    conn.query_row(&sql, params![id, owner], memory_from_row)
        .optional()?
        .ok_or_else(|| MemoryError::not_found("memory", id))
}

/// Replace the content and its embedding in one statement.
pub fn update_memory_content(
    conn: &Connection,
    id: &str,
    owner: &str,
    content: &str,
    embedding: &[f32],
) -> Result<Memory> {
    let sql = format!(
        "UPDATE memories SET content = ?3, embedding = ?4, updated_at = ?5 \
         WHERE id = ?1 AND owner_id = ?2 \
         RETURNING {MEMORY_COLUMNS}"
    );
    conn.query_row(
        &sql,
        params![id, owner, content, embedding_to_bytes(embedding), now_timestamp()],
        memory_from_row,
    )
    .optional()?
    .ok_or_else(|| MemoryError::not_found("memory", id))
}

/// Returns whether a row existed.
pub fn delete_memory(conn: &Connection, id: &str, owner: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM memories WHERE id = ?1 AND owner_id = ?2",
        params![id, owner],
    )?;
    Ok(rows > 0)
}

/// Owner-scoped listing, newest first.
pub fn list_memories(
    conn: &Connection,
    owner: &str,
    filter: &MemoryFilter,
    page: PageRequest,
) -> Result<Page<Memory>> {
    let sql = format!(
        "SELECT {MEMORY_COLUMNS} FROM memories WHERE owner_id = ?1 AND {} \
         ORDER BY created_at DESC, id DESC LIMIT ?6 OFFSET ?7",
        filter_clause(2)
    );
    let source = filter.source.map(|s| s.as_str());
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(
            params![
                owner,
                filter.agent_id,
                filter.session_id,
                source,
                filter.tag,
                page.limit as i64,
                page.offset as i64,
            ],
            memory_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Page {
        items,
        total: count_memories(conn, owner, filter)?,
        limit: page.limit,
        offset: page.offset,
    })
}

pub fn count_memories(conn: &Connection, owner: &str, filter: &MemoryFilter) -> Result<u64> {
    let sql = format!(
        "SELECT COUNT(*) FROM memories WHERE owner_id = ?1 AND {}",
        filter_clause(2)
    );
    let count: i64 = conn.query_row(
        &sql,
        params![
            owner,
            filter.agent_id,
            filter.session_id,
            filter.source.map(|s| s.as_str()),
            filter.tag,
        ],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}
