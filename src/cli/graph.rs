//! CLI `traverse` and `path` commands.

use anyhow::{Context, Result};

use crate::config::MnemeConfig;
use crate::db;
use crate::memory::graph::{self, TraversalNode, TraversalOptions};
use crate::memory::types::Direction;

/// Print a breadth-first traversal from `start`, one line per entity.
pub fn traverse(
    config: &MnemeConfig,
    owner: &str,
    start: &str,
    depth: Option<usize>,
    direction: &str,
    limit: Option<usize>,
) -> Result<()> {
    let direction: Direction = direction.parse().map_err(anyhow::Error::msg)?;
    let conn = db::open_database(config.resolved_db_path())?;

    let options = TraversalOptions {
        depth: depth.unwrap_or(config.graph.default_depth),
        direction,
        relation_types: None,
        limit: limit.unwrap_or(config.graph.default_limit),
    };
    let result = graph::traverse(&conn, start, owner, &options).context("traversal failed")?;

    if result.nodes.is_empty() {
        println!("No entity {start} for owner '{owner}'.");
        return Ok(());
    }

    for node in &result.nodes {
        print_node(node);
    }
    println!();
    println!(
        "{} entit(ies), {} relation(s){}",
        result.nodes.len(),
        result.sub_graph.relations.len(),
        if result.truncated { ", truncated at limit" } else { "" }
    );
    Ok(())
}

/// Print the shortest path between two entities.
pub fn path(config: &MnemeConfig, owner: &str, from: &str, to: &str, max_depth: usize) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path())?;

    match graph::find_path(&conn, from, to, owner, max_depth).context("path search failed")? {
        None => println!("No path within {max_depth} hop(s)."),
        Some(found) => {
            let names: Vec<&str> = found.nodes.iter().map(|n| n.entity.name.as_str()).collect();
            println!("{}", names.join(" -> "));
            println!("{} hop(s)", found.nodes.len().saturating_sub(1));
        }
    }
    Ok(())
}

fn print_node(node: &TraversalNode) {
    println!(
        "{}{} [{}] {}",
        "  ".repeat(node.depth),
        node.entity.name,
        node.entity.entity_type,
        node.entity.id
    );
}
