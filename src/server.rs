//! MCP server initialization for stdio and Streamable HTTP transports.
//!
//! Provides [`serve_stdio`] and [`serve_http`] entry points that wire up the
//! database, embedding provider, optional LLM, and the MCP tool handler.

use crate::config::MnemeConfig;
use crate::db;
use crate::embedding;
use crate::engine::MemoryEngine;
use crate::extraction;
use crate::tools::MnemeTools;
use anyhow::{Context, Result};
use rmcp::ServiceExt;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

/// Open the DB, create the providers, and reconcile the stored embedding model.
pub fn build_engine(config: MnemeConfig) -> Result<MemoryEngine> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let provider = embedding::create_provider(&config.embedding)
        .context("failed to create embedding provider")?;
    let embedding: Arc<dyn embedding::EmbeddingProvider> = Arc::from(provider);
    tracing::info!(model = %embedding.model(), dimensions = embedding.dimensions(), "embedding provider ready");

    check_embedding_model(&conn, embedding.as_ref())?;

    let llm = extraction::create_llm_provider(&config.llm)
        .context("failed to create LLM provider")?
        .map(Arc::<dyn extraction::LlmProvider>::from);
    match &llm {
        Some(llm) => tracing::info!(model = %llm.model(), "knowledge extraction enabled"),
        None => tracing::info!("knowledge extraction disabled"),
    }

    Ok(MemoryEngine::new(
        Arc::new(Mutex::new(conn)),
        embedding,
        llm,
        Arc::new(config),
    ))
}

/// Record the model on first start; warn when the configured one differs.
fn check_embedding_model(conn: &Connection, provider: &dyn embedding::EmbeddingProvider) -> Result<()> {
    let stored_model = db::migrations::get_embedding_model(conn)?;
    let stored_dim = db::migrations::get_embedding_dim(conn)?;

    match (stored_model, stored_dim) {
        (None, _) => {
            db::migrations::set_embedding_model(conn, provider.model())?;
            db::migrations::set_embedding_dim(conn, provider.dimensions())?;
            tracing::info!(model = %provider.model(), "embedding model recorded");
        }
        (Some(model), dim) => {
            if model != provider.model() || dim.is_some_and(|d| d != provider.dimensions()) {
                tracing::warn!(
                    stored = %model,
                    stored_dimensions = ?dim,
                    configured = %provider.model(),
                    configured_dimensions = provider.dimensions(),
                    "embedding model changed, run `mneme re-embed` to update all vectors"
                );
            }
        }
    }
    Ok(())
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: MnemeConfig) -> Result<()> {
    tracing::info!("starting Mneme MCP server on stdio");

    let engine = build_engine(config)?;

    let tools = MnemeTools::new(engine);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP, mounted at `/mcp`.
pub async fn serve_http(config: MnemeConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %bind_addr, "starting Mneme MCP server on HTTP");

    let engine = build_engine(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(MnemeTools::new(engine.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingOutput;

    struct Fixed(&'static str, usize);

    impl embedding::EmbeddingProvider for Fixed {
        fn embed_batch_detailed(&self, texts: &[&str]) -> crate::error::Result<Vec<EmbeddingOutput>> {
            Ok(texts
                .iter()
                .map(|_| EmbeddingOutput {
                    vector: vec![1.0; self.1],
                    model: self.0.into(),
                    usage: None,
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            self.1
        }

        fn max_batch_size(&self) -> usize {
            8
        }

        fn model(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn first_start_records_model() {
        let conn = db::open_memory_database().unwrap();
        check_embedding_model(&conn, &Fixed("mini", 3)).unwrap();

        assert_eq!(db::migrations::get_embedding_model(&conn).unwrap().as_deref(), Some("mini"));
        assert_eq!(db::migrations::get_embedding_dim(&conn).unwrap(), Some(3));

        // A different model only warns; the stored record is left alone.
        check_embedding_model(&conn, &Fixed("large", 8)).unwrap();
        assert_eq!(db::migrations::get_embedding_model(&conn).unwrap().as_deref(), Some("mini"));
    }
}
