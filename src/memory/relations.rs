//! Relation storage: directed, typed edges between two entities of one owner.

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::types::{NewRelation, Page, PageRequest, Relation};
use super::{new_id, now_timestamp, parse_properties, placeholders};
use crate::error::{ErrorCode, MemoryError, Result};

pub(crate) const RELATION_COLUMNS: &str =
    "id, owner_id, source_id, target_id, type, properties, confidence, valid_from, valid_to, created_at";

pub(crate) fn relation_from_row(row: &Row) -> rusqlite::Result<Relation> {
    let properties: String = row.get(5)?;
    Ok(Relation {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        source_id: row.get(2)?,
        target_id: row.get(3)?,
        relation_type: row.get(4)?,
        properties: parse_properties(5, &properties)?,
        confidence: row.get(6)?,
        valid_from: row.get(7)?,
        valid_to: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Optional filters for [`list_relations`].
#[derive(Debug, Clone, Default)]
pub struct RelationFilter {
    pub relation_type: Option<String>,
    /// Matches relations where this entity is either endpoint.
    pub entity_id: Option<String>,
}

/// Store a relation between two entities owned by `input.owner_id`.
///
/// Self-relations are rejected before any I/O. Both endpoints must resolve
/// for the owner; the error context names which one did not.
pub fn create_relation(conn: &Connection, input: &NewRelation) -> Result<Relation> {
    if input.source_id == input.target_id {
        return Err(MemoryError::new(
            ErrorCode::InvalidRelation,
            "an entity cannot be related to itself",
        )
        .with_context("source_id", input.source_id.as_str()));
    }

    ensure_endpoint(conn, &input.owner_id, &input.source_id, "source")?;
    ensure_endpoint(conn, &input.owner_id, &input.target_id, "target")?;

    let id = new_id();
    let properties = serde_json::to_string(&input.properties)?;
    let sql = format!(
        "INSERT INTO relations (id, owner_id, source_id, target_id, type, properties, confidence, valid_from, valid_to, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
         RETURNING {RELATION_COLUMNS}"
    );

    let relation = conn.query_row(
        &sql,
        params![
            id,
            input.owner_id,
            input.source_id,
            input.target_id,
            input.relation_type,
            properties,
            input.confidence,
            input.valid_from,
            input.valid_to,
            now_timestamp(),
        ],
        relation_from_row,
    )?;

    tracing::debug!(
        id = %relation.id,
        relation_type = %relation.relation_type,
        source = %relation.source_id,
        target = %relation.target_id,
        "relation stored"
    );
    Ok(relation)
}

fn ensure_endpoint(conn: &Connection, owner: &str, entity_id: &str, role: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entities WHERE id = ?1 AND owner_id = ?2)",
        params![entity_id, owner],
        |row| row.get(0),
    )?;

    if exists {
        Ok(())
    } else {
        Err(MemoryError::entity_not_found(entity_id).with_context("role", role))
    }
}

pub fn get_relation(conn: &Connection, id: &str, owner: &str) -> Result<Relation> {
    let sql = format!("SELECT {RELATION_COLUMNS} FROM relations WHERE id = ?1 AND owner_id = ?2");
    conn.query_row(&sql, params![id, owner], relation_from_row)
        .optional()?
        .ok_or_else(|| MemoryError::relation_not_found(id))
}

/// Returns whether a row existed.
pub fn delete_relation(conn: &Connection, id: &str, owner: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM relations WHERE id = ?1 AND owner_id = ?2",
        params![id, owner],
    )?;
    Ok(rows > 0)
}

/// Owner-scoped listing, newest first.
pub fn list_relations(
    conn: &Connection,
    owner: &str,
    filter: &RelationFilter,
    page: PageRequest,
) -> Result<Page<Relation>> {
    let where_clause = "owner_id = ?1 AND (?2 IS NULL OR type = ?2) \
                        AND (?3 IS NULL OR source_id = ?3 OR target_id = ?3)";

    let sql = format!(
        "SELECT {RELATION_COLUMNS} FROM relations WHERE {where_clause} \
         ORDER BY created_at DESC, id DESC LIMIT ?4 OFFSET ?5"
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(
            params![
                owner,
                filter.relation_type,
                filter.entity_id,
                page.limit as i64,
                page.offset as i64
            ],
            relation_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM relations WHERE {where_clause}"),
        params![owner, filter.relation_type, filter.entity_id],
        |row| row.get(0),
    )?;

    Ok(Page {
        items,
        total: total as u64,
        limit: page.limit,
        offset: page.offset,
    })
}

pub fn count_relations(conn: &Connection, owner: &str, relation_type: Option<&str>) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM relations WHERE owner_id = ?1 AND (?2 IS NULL OR type = ?2)",
        params![owner, relation_type],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

/// Every owner relation whose endpoints are both in `ids`, oldest first.
pub fn relations_among(conn: &Connection, owner: &str, ids: &[String]) -> Result<Vec<Relation>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let list = placeholders(2, ids.len());
    let sql = format!(
        "SELECT {RELATION_COLUMNS} FROM relations \
         WHERE owner_id = ?1 AND source_id IN ({list}) AND target_id IN ({list}) \
         ORDER BY created_at ASC, id ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let values = std::iter::once(owner).chain(ids.iter().map(String::as_str));
    let rows = stmt
        .query_map(params_from_iter(values), relation_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
