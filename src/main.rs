use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mneme::{cli, config, server};

#[derive(Parser)]
#[command(name = "mneme", version, about = "Graph + vector memory server for AI agents")]
struct Cli {
    /// Owner to act on. Defaults to `storage.default_owner`.
    #[arg(long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server (stdio unless --http or server.transport = "http")
    Serve {
        /// Serve Streamable HTTP on server.host:server.port
        #[arg(long)]
        http: bool,
    },
    /// Manage the local embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Semantic search over memories (or entities with --entities)
    Search {
        query: String,
        #[arg(long)]
        entities: bool,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Breadth-first traversal from an entity
    Traverse {
        start_id: String,
        #[arg(long)]
        depth: Option<usize>,
        /// outgoing, incoming, or both
        #[arg(long, default_value = "both")]
        direction: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Shortest path between two entities
    Path {
        from: String,
        to: String,
        #[arg(long, default_value_t = 5)]
        max_depth: usize,
    },
    /// Show store statistics
    Stats {
        /// Aggregate across every owner
        #[arg(long)]
        all: bool,
    },
    /// Check database health
    Doctor,
    /// Regenerate every embedding with the configured model
    ReEmbed,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the local embedding model to embedding.cache_dir
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::MnemeConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let owner = cli
        .owner
        .clone()
        .unwrap_or_else(|| config.storage.default_owner.clone());

    match cli.command {
        Command::Serve { http } => {
            if http || config.server.transport == "http" {
                server::serve_http(config).await?;
            } else {
                server::serve_stdio(config).await?;
            }
        }
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
        Command::Search {
            query,
            entities,
            limit,
            threshold,
        } => cli::search::search(config, &owner, &query, entities, limit, threshold).await?,
        Command::Traverse {
            start_id,
            depth,
            direction,
            limit,
        } => cli::graph::traverse(&config, &owner, &start_id, depth, &direction, limit)?,
        Command::Path { from, to, max_depth } => {
            cli::graph::path(&config, &owner, &from, &to, max_depth)?
        }
        Command::Stats { all } => {
            cli::stats::stats(&config, (!all).then_some(owner.as_str()))?
        }
        Command::Doctor => cli::doctor::doctor(&config)?,
        Command::ReEmbed => cli::re_embed::re_embed(&config).await?,
    }

    Ok(())
}
