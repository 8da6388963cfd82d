use anyhow::Result;

use crate::config::MnemeConfig;

/// Print store statistics for one owner, or for all when `owner` is `None`.
pub fn stats(config: &MnemeConfig, owner: Option<&str>) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let response = crate::memory::stats::store_stats(&conn, owner, Some(&db_path))?;

    println!("Mneme Statistics");
    println!("{}", "=".repeat(40));
    match (&response.owner, response.owners) {
        (Some(owner), _) => println!("  Owner:               {owner}"),
        (None, Some(n)) => println!("  Owners:              {n}"),
        (None, None) => {}
    }
    println!("  Entities:            {}", response.total_entities);
    println!("  Relations:           {}", response.total_relations);
    println!("  Memories:            {}", response.total_memories);
    println!();

    println!("Entities by type:");
    for (t, count) in &response.entities_by_type {
        println!("  {t:<14} {count}");
    }
    println!();

    if !response.relations_by_type.is_empty() {
        println!("Relations by type:");
        for (t, count) in &response.relations_by_type {
            println!("  {t:<14} {count}");
        }
        println!();
    }

    println!("Memories by source:");
    for (s, count) in &response.memories_by_source {
        println!("  {s:<14} {count}");
    }
    println!();

    if response.memories_without_embedding > 0 {
        println!(
            "Memories without a usable embedding: {} (run `mneme re-embed`)",
            response.memories_without_embedding
        );
    }
    println!("Database size:         {} bytes", response.db_size_bytes);
    if let Some(ref oldest) = response.oldest_memory {
        println!("Oldest memory:         {oldest}");
    }
    if let Some(ref newest) = response.newest_memory {
        println!("Newest memory:         {newest}");
    }

    Ok(())
}
