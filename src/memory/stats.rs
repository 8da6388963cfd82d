use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::types::{EntityType, MemorySource};
use crate::error::Result;

/// Store statistics, for one owner or across all of them.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Distinct owners with at least one record. Only set for store-wide stats.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owners: Option<u64>,
    pub total_entities: u64,
    pub total_relations: u64,
    pub total_memories: u64,
    pub entities_by_type: BTreeMap<String, u64>,
    pub relations_by_type: BTreeMap<String, u64>,
    pub memories_by_source: BTreeMap<String, u64>,
    pub memories_without_embedding: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<String>,
}

/// Compute statistics. `owner = None` aggregates every owner.
///
/// `db_path` is used for file size calculation; pass None for in-memory databases.
pub fn store_stats(conn: &Connection, owner: Option<&str>, db_path: Option<&Path>) -> Result<StatsResponse> {
    let mut entities_by_type: BTreeMap<String, u64> =
        EntityType::ALL.iter().map(|t| (t.as_str().to_string(), 0)).collect();
    entities_by_type.extend(group_counts(conn, "entities", "type", owner)?);

    let mut memories_by_source: BTreeMap<String, u64> = [
        MemorySource::Conversation,
        MemorySource::Document,
        MemorySource::Extraction,
    ]
    .iter()
    .map(|s| (s.as_str().to_string(), 0))
    .collect();
    memories_by_source.extend(group_counts(conn, "memories", "source", owner)?);

    let relations_by_type = group_counts(conn, "relations", "type", owner)?;

    let (oldest_memory, newest_memory): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(created_at), MAX(created_at) FROM memories WHERE (?1 IS NULL OR owner_id = ?1)",
        params![owner],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let owners = match owner {
        Some(_) => None,
        None => Some(conn.query_row(
            "SELECT COUNT(*) FROM (SELECT owner_id FROM entities \
             UNION SELECT owner_id FROM relations UNION SELECT owner_id FROM memories)",
            [],
            |row| row.get::<_, i64>(0),
        )? as u64),
    };

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(StatsResponse {
        owner: owner.map(str::to_string),
        owners,
        total_entities: entities_by_type.values().sum(),
        total_relations: relations_by_type.values().sum(),
        total_memories: memories_by_source.values().sum(),
        entities_by_type,
        relations_by_type,
        memories_by_source,
        memories_without_embedding: count(
            conn,
            "SELECT COUNT(*) FROM memories WHERE embedding IS NULL AND (?1 IS NULL OR owner_id = ?1)",
            owner,
        )?,
        db_size_bytes,
        oldest_memory,
        newest_memory,
    })
}

fn group_counts(
    conn: &Connection,
    table: &str,
    column: &str,
    owner: Option<&str>,
) -> Result<BTreeMap<String, u64>> {
    let sql = format!(
        "SELECT {column}, COUNT(*) FROM {table} WHERE (?1 IS NULL OR owner_id = ?1) GROUP BY {column}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows.into_iter().map(|(k, n)| (k, n as u64)).collect())
}

fn count(conn: &Connection, sql: &str, owner: Option<&str>) -> Result<u64> {
    let n: i64 = conn.query_row(sql, params![owner], |row| row.get(0))?;
    Ok(n as u64)
}
