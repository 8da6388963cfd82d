//! Bounded breadth-first traversal over the owner's entity graph.
//!
//! Discovered nodes live in an arena (`Vec<Discovered>`) indexed by an
//! id → slot map, which doubles as the visited set. Each depth level issues a
//! single edge query for the whole frontier, so a traversal costs at most
//! `depth` edge reads plus one entity load and one relation load at the end.
//!
//! A node is recorded at its first discovery, with the path it was reached
//! by. Edges are considered in frontier order, then by relation `created_at`
//! and id, so results are deterministic for a given store state.

use std::collections::{HashMap, HashSet};

use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use super::entities::{find_entity, get_entities};
use super::placeholders;
use super::relations::relations_among;
use super::types::{Direction, Entity, Relation};
use crate::error::{ErrorCode, MemoryError, Result};

pub const MAX_TRAVERSAL_DEPTH: usize = 5;
pub const MAX_TRAVERSAL_LIMIT: usize = 1000;
pub const DEFAULT_TRAVERSAL_DEPTH: usize = 2;
pub const DEFAULT_TRAVERSAL_LIMIT: usize = 100;
/// Node budget for [`get_neighbors`], which has no caller-facing limit.
pub const NEIGHBOR_SCAN_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub depth: usize,
    pub direction: Direction,
    /// Only follow relations of these types. `None` or empty follows all.
    pub relation_types: Option<Vec<String>>,
    /// Maximum discovered nodes, start included.
    pub limit: usize,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            depth: DEFAULT_TRAVERSAL_DEPTH,
            direction: Direction::Both,
            relation_types: None,
            limit: DEFAULT_TRAVERSAL_LIMIT,
        }
    }
}

/// An entity reached by a traversal.
#[derive(Debug, Clone, Serialize)]
pub struct TraversalNode {
    pub entity: Entity,
    /// Hops from the start node (0 for the start itself).
    pub depth: usize,
    /// Entity ids from the start node to this one, both inclusive.
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubGraph {
    pub entities: Vec<Entity>,
    pub relations: Vec<Relation>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TraversalResult {
    pub nodes: Vec<TraversalNode>,
    pub sub_graph: SubGraph,
    /// A further node was reachable but dropped because `limit` was hit.
    pub truncated: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NeighborsResult {
    pub nodes: Vec<TraversalNode>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathResult {
    /// Source first, target last.
    pub nodes: Vec<TraversalNode>,
    pub sub_graph: SubGraph,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Breadth-first traversal from `start_id`.
///
/// A start entity that does not exist for `owner` yields an empty result.
/// `sub_graph.relations` holds every owner relation between two discovered
/// nodes, not only the edges walked.
pub fn traverse(
    conn: &Connection,
    start_id: &str,
    owner: &str,
    options: &TraversalOptions,
) -> Result<TraversalResult> {
    check_bounds(options.depth, options.limit)?;

    let Some(bfs) = breadth_first(
        conn,
        owner,
        start_id,
        options.depth,
        options.direction,
        options.relation_types.as_deref(),
        options.limit,
        None,
    )?
    else {
        return Ok(TraversalResult::default());
    };

    let nodes = hydrate(conn, owner, bfs.arena)?;
    let sub_graph = sub_graph_of(conn, owner, &nodes)?;

    tracing::debug!(
        start = %start_id,
        nodes = nodes.len(),
        relations = sub_graph.relations.len(),
        truncated = bfs.truncated,
        "traversal complete"
    );
    Ok(TraversalResult {
        nodes,
        sub_graph,
        truncated: bfs.truncated,
    })
}

/// Entities exactly `depth` hops away in either direction.
pub fn get_neighbors(conn: &Connection, entity_id: &str, owner: &str, depth: usize) -> Result<NeighborsResult> {
    check_bounds(depth, NEIGHBOR_SCAN_LIMIT)?;

    let Some(bfs) = breadth_first(
        conn,
        owner,
        entity_id,
        depth,
        Direction::Both,
        None,
        NEIGHBOR_SCAN_LIMIT,
        None,
    )?
    else {
        return Ok(NeighborsResult::default());
    };

    let at_depth = bfs.arena.into_iter().filter(|d| d.depth == depth).collect();
    Ok(NeighborsResult {
        nodes: hydrate(conn, owner, at_depth)?,
        truncated: bfs.truncated,
    })
}

/// Shortest undirected path from `source_id` to `target_id` within `max_depth` hops.
///
/// `None` when either endpoint is missing for `owner` or the target is not
/// reachable in time.
pub fn find_path(
    conn: &Connection,
    source_id: &str,
    target_id: &str,
    owner: &str,
    max_depth: usize,
) -> Result<Option<PathResult>> {
    check_bounds(max_depth, MAX_TRAVERSAL_LIMIT)?;

    if find_entity(conn, target_id, owner)?.is_none() {
        return Ok(None);
    }

    let Some(bfs) = breadth_first(
        conn,
        owner,
        source_id,
        max_depth,
        Direction::Both,
        None,
        usize::MAX,
        Some(target_id),
    )?
    else {
        return Ok(None);
    };

    let Some(slot) = bfs.reached else {
        return Ok(None);
    };

    let path = bfs.arena[slot].path.clone();
    let steps = (0..path.len())
        .map(|i| Discovered {
            id: path[i].clone(),
            depth: i,
            path: path[..=i].to_vec(),
        })
        .collect();

    let nodes = hydrate(conn, owner, steps)?;
    if nodes.len() != path.len() {
        // An entity on the path vanished between the walk and the load.
        return Ok(None);
    }
    let sub_graph = sub_graph_of(conn, owner, &nodes)?;
    Ok(Some(PathResult { nodes, sub_graph }))
}

/// The named owner entities plus every relation between two of them.
/// Duplicate and unknown ids are ignored.
pub fn get_sub_graph(conn: &Connection, owner: &str, entity_ids: &[String]) -> Result<SubGraph> {
    let mut unique: Vec<String> = Vec::with_capacity(entity_ids.len());
    for id in entity_ids {
        if !unique.contains(id) {
            unique.push(id.clone());
        }
    }
    if unique.is_empty() {
        return Ok(SubGraph::default());
    }

    let mut found = get_entities(conn, owner, &unique)?;
    let entities: Vec<Entity> = unique.iter().filter_map(|id| found.remove(id)).collect();
    let ids: Vec<String> = entities.iter().map(|e| e.id.clone()).collect();

    Ok(SubGraph {
        relations: relations_among(conn, owner, &ids)?,
        entities,
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

#[derive(Debug)]
struct Discovered {
    id: String,
    depth: usize,
    path: Vec<String>,
}

#[derive(Debug)]
struct Bfs {
    arena: Vec<Discovered>,
    truncated: bool,
    /// Slot of `stop_at` when it was discovered.
    reached: Option<usize>,
}

fn check_bounds(depth: usize, limit: usize) -> Result<()> {
    if depth > MAX_TRAVERSAL_DEPTH {
        return Err(MemoryError::new(
            ErrorCode::MaxDepthExceeded,
            format!("depth {depth} exceeds the maximum of {MAX_TRAVERSAL_DEPTH}"),
        )
        .with_context("depth", depth));
    }
    if depth == 0 {
        return Err(MemoryError::new(ErrorCode::InvalidInput, "depth must be at least 1"));
    }
    if limit == 0 {
        return Err(MemoryError::new(ErrorCode::InvalidInput, "limit must be at least 1"));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn breadth_first(
    conn: &Connection,
    owner: &str,
    start_id: &str,
    max_depth: usize,
    direction: Direction,
    relation_types: Option<&[String]>,
    limit: usize,
    stop_at: Option<&str>,
) -> Result<Option<Bfs>> {
    if find_entity(conn, start_id, owner)?.is_none() {
        return Ok(None);
    }

    let mut arena = vec![Discovered {
        id: start_id.to_string(),
        depth: 0,
        path: vec![start_id.to_string()],
    }];
    let mut slots: HashMap<String, usize> = HashMap::from([(start_id.to_string(), 0)]);

    if stop_at == Some(start_id) {
        return Ok(Some(Bfs {
            arena,
            truncated: false,
            reached: Some(0),
        }));
    }

    let relation_types = relation_types.filter(|t| !t.is_empty());
    let mut frontier: Vec<usize> = vec![0];
    let mut truncated = false;

    'levels: for level in 0..max_depth {
        if frontier.is_empty() {
            break;
        }

        let frontier_ids: Vec<&str> = frontier.iter().map(|&s| arena[s].id.as_str()).collect();
        let adjacency = frontier_edges(conn, owner, &frontier_ids, direction, relation_types)?;
        tracing::debug!(level, frontier = frontier.len(), discovered = arena.len(), "bfs level");

        let mut next = Vec::new();
        for &slot in &frontier {
            let Some(neighbors) = adjacency.get(arena[slot].id.as_str()) else {
                continue;
            };
            for neighbor in neighbors {
                if slots.contains_key(neighbor) {
                    continue;
                }
                if arena.len() >= limit {
                    truncated = true;
                    break 'levels;
                }

                let mut path = arena[slot].path.clone();
                path.push(neighbor.clone());
                let new_slot = arena.len();
                arena.push(Discovered {
                    id: neighbor.clone(),
                    depth: level + 1,
                    path,
                });
                slots.insert(neighbor.clone(), new_slot);
                next.push(new_slot);

                if stop_at == Some(neighbor.as_str()) {
                    return Ok(Some(Bfs {
                        arena,
                        truncated: false,
                        reached: Some(new_slot),
                    }));
                }
            }
        }
        frontier = next;
    }

    Ok(Some(Bfs {
        arena,
        truncated,
        reached: None,
    }))
}

/// One edge read for the whole frontier: frontier id → neighbor ids, in edge order.
fn frontier_edges(
    conn: &Connection,
    owner: &str,
    frontier: &[&str],
    direction: Direction,
    relation_types: Option<&[String]>,
) -> Result<HashMap<String, Vec<String>>> {
    let ids = placeholders(2, frontier.len());
    let endpoints = match direction {
        Direction::Outgoing => format!("source_id IN ({ids})"),
        Direction::Incoming => format!("target_id IN ({ids})"),
        Direction::Both => format!("(source_id IN ({ids}) OR target_id IN ({ids}))"),
    };
    let type_filter = match relation_types {
        Some(types) => format!(
            " AND type IN ({})",
            placeholders(2 + frontier.len(), types.len())
        ),
        None => String::new(),
    };

    let sql = format!(
        "SELECT source_id, target_id FROM relations \
         WHERE owner_id = ?1 AND {endpoints}{type_filter} \
         ORDER BY created_at ASC, id ASC"
    );

    let values = std::iter::once(owner)
        .chain(frontier.iter().copied())
        .chain(relation_types.unwrap_or_default().iter().map(String::as_str));

    let mut stmt = conn.prepare(&sql)?;
    let edges = stmt
        .query_map(params_from_iter(values), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let in_frontier: HashSet<&str> = frontier.iter().copied().collect();
    let mut adjacency: HashMap<String, Vec<String>> = HashMap::new();
    for (source, target) in edges {
        if direction.follows_outgoing() && in_frontier.contains(source.as_str()) {
            adjacency.entry(source.clone()).or_default().push(target.clone());
        }
        if direction.follows_incoming() && in_frontier.contains(target.as_str()) {
            adjacency.entry(target).or_default().push(source);
        }
    }
    Ok(adjacency)
}

/// Attach entity records to discovered slots, preserving order. Slots whose
/// entity disappeared since discovery are dropped.
fn hydrate(conn: &Connection, owner: &str, discovered: Vec<Discovered>) -> Result<Vec<TraversalNode>> {
    let ids: Vec<String> = discovered.iter().map(|d| d.id.clone()).collect();
    let mut entities = get_entities(conn, owner, &ids)?;

    Ok(discovered
        .into_iter()
        .filter_map(|d| {
            entities.remove(&d.id).map(|entity| TraversalNode {
                entity,
                depth: d.depth,
                path: d.path,
            })
        })
        .collect())
}

fn sub_graph_of(conn: &Connection, owner: &str, nodes: &[TraversalNode]) -> Result<SubGraph> {
    let ids: Vec<String> = nodes.iter().map(|n| n.entity.id.clone()).collect();
    Ok(SubGraph {
        relations: relations_among(conn, owner, &ids)?,
        entities: nodes.iter().map(|n| n.entity.clone()).collect(),
    })
}
