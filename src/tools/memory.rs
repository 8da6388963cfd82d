//! Parameters for the `memory_*` tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryAddParams {
    #[schemars(description = "The natural language content of the memory")]
    pub content: String,

    #[schemars(description = "Owner the memory belongs to. Defaults to the configured owner.")]
    pub owner_id: Option<String>,

    #[schemars(description = "Agent that produced the memory")]
    pub agent_id: Option<String>,

    #[schemars(description = "Conversation or session the memory came from")]
    pub session_id: Option<String>,

    #[schemars(description = "Origin: 'conversation' (default), 'document', or 'extraction'")]
    pub source: Option<String>,

    #[schemars(description = "Importance 0.0-1.0. Defaults to 0.5.")]
    pub importance: Option<f64>,

    #[schemars(description = "Ordered list of non-empty tags")]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryAddBatchParams {
    #[schemars(description = "Memories to add. Invalid items are reported and skipped.")]
    pub memories: Vec<MemoryAddParams>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryUpdateContentParams {
    #[schemars(description = "ID of the memory to edit")]
    pub id: String,

    #[schemars(description = "Replacement content. The memory is re-embedded.")]
    pub content: String,

    #[schemars(description = "Owner of the memory. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemoryListParams {
    #[schemars(description = "Owner to list. Defaults to the configured owner.")]
    pub owner_id: Option<String>,

    #[schemars(description = "Only memories from this agent")]
    pub agent_id: Option<String>,

    #[schemars(description = "Only memories from this session")]
    pub session_id: Option<String>,

    #[schemars(description = "Only memories with this source")]
    pub source: Option<String>,

    #[schemars(description = "Only memories carrying this tag")]
    pub tag: Option<String>,

    #[schemars(description = "Page size 1-1000. Defaults to 50.")]
    pub limit: Option<usize>,

    #[schemars(description = "Rows to skip. Defaults to 0.")]
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MemorySearchParams {
    #[schemars(description = "Natural language query")]
    pub query: String,

    #[schemars(description = "Owner to search. Defaults to the configured owner.")]
    pub owner_id: Option<String>,

    #[schemars(description = "Only memories from this agent")]
    pub agent_id: Option<String>,

    #[schemars(description = "Only memories from this session")]
    pub session_id: Option<String>,

    #[schemars(description = "Only memories with this source")]
    pub source: Option<String>,

    #[schemars(description = "Only memories carrying this tag")]
    pub tag: Option<String>,

    #[schemars(description = "Maximum results 1-100. Defaults to 10.")]
    pub limit: Option<usize>,

    #[schemars(description = "Minimum similarity score. Defaults to 0.7.")]
    pub threshold: Option<f64>,
}
