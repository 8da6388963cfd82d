//! CLI `doctor` command: database diagnostics and a health report.

use anyhow::{Context, Result};

use crate::config::MnemeConfig;
use crate::db;

pub fn doctor(config: &MnemeConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `mneme serve` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Mneme Health Report");
    println!("===================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!();
    println!("Embedding model:");
    println!(
        "  Stored:          {} ({} dims)",
        report.embedding_model.as_deref().unwrap_or("(not set)"),
        report.embedding_dim.map_or("?".to_string(), |d| d.to_string())
    );
    println!(
        "  Configured:      {} ({} dims, provider {})",
        config.embedding.model, config.embedding.dimensions, config.embedding.provider
    );
    let model_matches = report.embedding_model.as_deref() == Some(config.embedding.model.as_str())
        && report.embedding_dim.map_or(true, |d| d == config.embedding.dimensions);
    if report.embedding_model.is_some() {
        if model_matches {
            println!("  Status:          OK (match)");
        } else {
            println!("  WARNING: model mismatch! Run `mneme re-embed` to update vectors.");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Entities:        {}", report.entity_count);
    println!("  Relations:       {}", report.relation_count);
    println!("  Memories:        {}", report.memory_count);
    if report.memories_without_embedding > 0 {
        println!("  Unembedded:      {}", report.memories_without_embedding);
    }
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery: restore {} from a backup.", db_path.display());
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
