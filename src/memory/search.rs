//! Vector retrieval over entities and memories.
//!
//! Every owner row with an embedding of the query's dimension is scored as
//! `1 - cosine_distance` by sqlite-vec, then [`rank`] applies the threshold,
//! the ordering contract, and the limit in process.

use std::cmp::Ordering;

use rusqlite::{params, Connection, Row};

use super::entities::{entity_from_row, ENTITY_COLUMNS};
use super::store::{filter_clause, memory_from_row, MemoryFilter, MEMORY_COLUMNS};
use super::types::{Entity, EntityType, Memory, Scored};
use crate::error::{ErrorCode, MemoryError, Result};

pub const DEFAULT_SEARCH_LIMIT: usize = 10;
pub const MAX_SEARCH_LIMIT: usize = 100;
pub const DEFAULT_ENTITY_THRESHOLD: f64 = 0.6;
pub const DEFAULT_MEMORY_THRESHOLD: f64 = 0.7;

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub limit: usize,
    /// Minimum score kept. Not clamped; may be negative.
    pub threshold: f64,
}

impl SearchOptions {
    pub fn entities() -> Self {
        Self {
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_ENTITY_THRESHOLD,
        }
    }

    pub fn memories() -> Self {
        Self {
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_MEMORY_THRESHOLD,
        }
    }
}

/// Tie-break keys for records that can be ranked.
pub trait Rankable {
    fn rank_id(&self) -> &str;
    fn rank_created_at(&self) -> &str;
}

impl Rankable for Entity {
    fn rank_id(&self) -> &str {
        &self.id
    }

    fn rank_created_at(&self) -> &str {
        &self.created_at
    }
}

impl Rankable for Memory {
    fn rank_id(&self) -> &str {
        &self.id
    }

    fn rank_created_at(&self) -> &str {
        &self.created_at
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Reject empty or non-finite vectors, and (when given) a wrong dimension.
pub fn validate_vector(vector: &[f32], expected_dim: Option<usize>) -> Result<()> {
    if vector.is_empty() {
        return Err(MemoryError::new(ErrorCode::InvalidVector, "vector is empty"));
    }
    if let Some(pos) = vector.iter().position(|v| !v.is_finite()) {
        return Err(
            MemoryError::new(ErrorCode::InvalidVector, "vector contains a non-finite value")
                .with_context("index", pos),
        );
    }
    if let Some(dim) = expected_dim {
        if vector.len() != dim {
            return Err(MemoryError::new(
                ErrorCode::DimensionMismatch,
                format!("expected {dim} dimensions, got {}", vector.len()),
            )
            .with_context("expected", dim)
            .with_context("actual", vector.len()));
        }
    }
    Ok(())
}

/// Keep `score >= threshold`, order by score DESC, `created_at` DESC, id DESC,
/// then truncate to `limit`. NaN scores never pass.
pub fn rank<T: Rankable>(candidates: Vec<Scored<T>>, threshold: f64, limit: usize) -> Vec<Scored<T>> {
    let mut kept: Vec<Scored<T>> = candidates
        .into_iter()
        .filter(|c| c.score >= threshold)
        .collect();

    kept.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.item.rank_created_at().cmp(a.item.rank_created_at()))
            .then_with(|| b.item.rank_id().cmp(a.item.rank_id()))
    });
    kept.truncate(limit);
    kept
}

/// Rank the owner's entities against a query vector.
pub fn search_entities(
    conn: &Connection,
    owner: &str,
    query: &[f32],
    entity_type: Option<EntityType>,
    options: SearchOptions,
) -> Result<Vec<Scored<Entity>>> {
    validate_vector(query, None)?;

    let sql = format!(
        "SELECT {ENTITY_COLUMNS}, 1.0 - vec_distance_cosine(embedding, ?2) AS score \
         FROM entities \
         WHERE owner_id = ?1 AND embedding IS NOT NULL AND length(embedding) = ?3 \
           AND (?4 IS NULL OR type = ?4)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let candidates = stmt
        .query_map(
            params![
                owner,
                super::embedding_to_bytes(query),
                byte_len(query),
                entity_type.map(|t| t.as_str()),
            ],
            |row| scored_row(row, 9, entity_from_row),
        )?
        .filter_map(|r| r.transpose())
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let scanned = candidates.len();
    let ranked = rank(candidates, options.threshold, options.limit);
    tracing::debug!(scanned, returned = ranked.len(), threshold = options.threshold, "entity search");
    Ok(ranked)
}

/// Rank the owner's memories against a query vector.
pub fn search_memories(
    conn: &Connection,
    owner: &str,
    query: &[f32],
    filter: &MemoryFilter,
    options: SearchOptions,
) -> Result<Vec<Scored<Memory>>> {
    validate_vector(query, None)?;

    let sql = format!(
        "SELECT {MEMORY_COLUMNS}, 1.0 - vec_distance_cosine(embedding, ?2) AS score \
         FROM memories \
         WHERE owner_id = ?1 AND embedding IS NOT NULL AND length(embedding) = ?3 AND {}",
        filter_clause(4)
    );
    let mut stmt = conn.prepare(&sql)?;
    let candidates = stmt
        .query_map(
            params![
                owner,
                super::embedding_to_bytes(query),
                byte_len(query),
                filter.agent_id,
                filter.session_id,
                filter.source.map(|s| s.as_str()),
                filter.tag,
            ],
            |row| scored_row(row, 10, memory_from_row),
        )?
        .filter_map(|r| r.transpose())
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let scanned = candidates.len();
    let ranked = rank(candidates, options.threshold, options.limit);
    tracing::debug!(scanned, returned = ranked.len(), threshold = options.threshold, "memory search");
    Ok(ranked)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn byte_len(vector: &[f32]) -> i64 {
    (vector.len() * std::mem::size_of::<f32>()) as i64
}

/// Zero-norm rows score as NULL (NaN in sqlite-vec) and are skipped.
fn scored_row<T>(
    row: &Row,
    score_idx: usize,
    item: impl Fn(&Row) -> rusqlite::Result<T>,
) -> rusqlite::Result<Option<Scored<T>>> {
    let score: Option<f64> = row.get(score_idx)?;
    match score {
        Some(score) if score.is_finite() => Ok(Some(Scored {
            item: item(row)?,
            score,
        })),
        _ => Ok(None),
    }
}
