use anyhow::Result;

use crate::config::MnemeConfig;
use crate::memory::search::SearchOptions;
use crate::memory::store::MemoryFilter;
use crate::server::build_engine;

/// Semantic search from the terminal, over memories or entities.
pub async fn search(
    config: MnemeConfig,
    owner: &str,
    query: &str,
    entities: bool,
    limit: Option<usize>,
    threshold: Option<f64>,
) -> Result<()> {
    let engine = build_engine(config)?;

    if entities {
        let defaults = engine.entity_search_options();
        let options = SearchOptions {
            limit: limit.unwrap_or(defaults.limit),
            threshold: threshold.unwrap_or(defaults.threshold),
        };
        let results = engine.search_entities(query, owner, None, options).await?;
        if results.is_empty() {
            println!("No entities above threshold {:.2}.", options.threshold);
            return Ok(());
        }
        println!("Found {} entit(ies)\n", results.len());
        for (i, hit) in results.iter().enumerate() {
            println!(
                "  {}. [{}] {} ({}) score: {:.4}",
                i + 1,
                hit.item.entity_type,
                hit.item.name,
                hit.item.id,
                hit.score
            );
        }
        return Ok(());
    }

    let defaults = engine.memory_search_options();
    let options = SearchOptions {
        limit: limit.unwrap_or(defaults.limit),
        threshold: threshold.unwrap_or(defaults.threshold),
    };
    let results = engine
        .search_memories(query, owner, MemoryFilter::default(), options)
        .await?;

    if results.is_empty() {
        println!("No memories above threshold {:.2}.", options.threshold);
        return Ok(());
    }

    println!("Found {} memor(ies)\n", results.len());
    for (i, hit) in results.iter().enumerate() {
        println!(
            "  {}. [{}] {} (importance: {:.2}, score: {:.4})",
            i + 1,
            hit.item.source,
            hit.item.id,
            hit.item.importance,
            hit.score,
        );
        println!("     {}", super::preview(&hit.item.content, 120));
        if !hit.item.tags.is_empty() {
            println!("     tags: {}", hit.item.tags.join(", "));
        }
        println!();
    }

    Ok(())
}
