//! CLI `re-embed` command: regenerate every stored vector with the configured model.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::Arc;

use crate::config::MnemeConfig;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::memory::embedding_to_bytes;
use crate::memory::search::validate_vector;
use crate::memory::types::{entity_embedding_text, EntityType};

/// Re-embed all memories and entities, then record the model in `schema_meta`.
pub async fn re_embed(config: &MnemeConfig) -> Result<()> {
    let conn = db::open_database(config.resolved_db_path()).context("failed to open database")?;

    let provider: Arc<dyn EmbeddingProvider> = Arc::from(
        embedding::create_provider(&config.embedding).context("failed to create embedding provider")?,
    );

    let memories = memory_texts(&conn)?;
    let entities = entity_texts(&conn)?;

    if memories.is_empty() && entities.is_empty() {
        println!("Nothing to re-embed.");
    } else {
        println!(
            "Re-embedding {} memories and {} entities with '{}' ({} dims)...",
            memories.len(),
            entities.len(),
            provider.model(),
            provider.dimensions()
        );
        rewrite(&conn, &provider, "memories", &memories).await?;
        rewrite(&conn, &provider, "entities", &entities).await?;
    }

    db::migrations::set_embedding_model(&conn, provider.model())?;
    db::migrations::set_embedding_dim(&conn, provider.dimensions())?;

    println!(
        "Re-embedded {} memories and {} entities.",
        memories.len(),
        entities.len()
    );
    Ok(())
}

fn memory_texts(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT id, content FROM memories ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Entities are embedded as `"{type}: {name}"`, same as on create.
fn entity_texts(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare("SELECT id, type, name FROM entities ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            let entity_type: String = row.get(1)?;
            let name: String = row.get(2)?;
            let entity_type = entity_type.parse().unwrap_or(EntityType::Custom);
            Ok((row.get(0)?, entity_embedding_text(entity_type, &name)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Embed `rows` in provider-sized chunks and overwrite `table.embedding`.
async fn rewrite(
    conn: &Connection,
    provider: &Arc<dyn EmbeddingProvider>,
    table: &str,
    rows: &[(String, String)],
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let pb = super::progress_bar(
        Some(rows.len() as u64),
        &format!("  {table:<9} {{bar:40.cyan/blue}} {{pos}}/{{len}} ({{eta}})"),
    )?;
    let sql = format!("UPDATE {table} SET embedding = ?2 WHERE id = ?1");
    let dim = provider.dimensions();

    for chunk in rows.chunks(provider.max_batch_size().max(1)) {
        let texts: Vec<String> = chunk.iter().map(|(_, text)| text.clone()).collect();
        let worker = Arc::clone(provider);

        let vectors = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            worker.embed_batch(&refs)
        })
        .await?
        .with_context(|| format!("embedding {table} failed"))?;

        anyhow::ensure!(
            vectors.len() == chunk.len(),
            "provider returned {} vectors for {} texts",
            vectors.len(),
            chunk.len()
        );

        let tx = conn.unchecked_transaction()?;
        for ((id, _), vector) in chunk.iter().zip(&vectors) {
            validate_vector(vector, Some(dim))?;
            tx.execute(&sql, rusqlite::params![id, embedding_to_bytes(vector)])?;
        }
        tx.commit()?;

        pb.inc(chunk.len() as u64);
    }

    pb.finish_and_clear();
    tracing::info!(table, rows = rows.len(), model = %provider.model(), "re-embedded");
    Ok(())
}
