//! Graph + vector memory for AI agents.
//!
//! Mneme stores three kinds of records per owner, all in one SQLite database:
//!
//! | Record | Identity | Retrieved by |
//! |--------|----------|--------------|
//! | **Memory** | id | vector similarity, filters (agent, session, source, tag) |
//! | **Entity** | `(owner, type, name)`, merged on collision | vector similarity on `"type: name"`, graph traversal |
//! | **Relation** | id, directed `source -> target` | graph traversal, sub-graph extraction |
//!
//! # Architecture
//!
//! - **Storage**: SQLite with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   providing `vec_distance_cosine` over embedding BLOBs
//! - **Embeddings**: local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions),
//!   or any OpenAI-compatible `/embeddings` endpoint
//! - **Graph**: bounded breadth-first traversal (depth <= 5), shortest path, sub-graphs
//! - **Extraction**: optional LLM that turns free text into entities and relations
//! - **Transport**: MCP over stdio or Streamable HTTP
//!
//! # Modules
//!
//! - [`config`]: configuration from TOML and environment variables
//! - [`db`]: database initialization, schema, migrations, and health checks
//! - [`embedding`]: the [`embedding::EmbeddingProvider`] trait and its backends
//! - [`engine`]: [`engine::MemoryEngine`], the validated async API
//! - [`error`]: [`error::MemoryError`] and the closed [`error::ErrorCode`] taxonomy
//! - [`extraction`]: LLM knowledge extraction and ingest
//! - [`memory`]: repositories, vector search, and graph traversal over a connection
//! - [`tools`] / [`server`]: MCP exposure

pub mod cli;
pub mod config;
pub mod db;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod http;
pub mod memory;
pub mod server;
pub mod tools;
