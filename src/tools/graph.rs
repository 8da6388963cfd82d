//! Parameters for the `graph_*` tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GraphTraverseParams {
    #[schemars(description = "ID of the entity to start from")]
    pub start_id: String,

    #[schemars(description = "Maximum hops 1-5. Defaults to 2.")]
    pub depth: Option<usize>,

    #[schemars(description = "Edges to follow: 'outgoing', 'incoming', or 'both' (default)")]
    pub direction: Option<String>,

    #[schemars(description = "Only expand along relations of these types")]
    pub relation_types: Option<Vec<String>>,

    #[schemars(description = "Maximum entities returned, start included, 1-1000. Defaults to 100.")]
    pub limit: Option<usize>,

    #[schemars(description = "Owner of the graph. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GraphNeighborsParams {
    #[schemars(description = "ID of the entity whose neighbors to return")]
    pub entity_id: String,

    #[schemars(description = "Exact hop distance 1-5. Defaults to 1.")]
    pub depth: Option<usize>,

    #[schemars(description = "Owner of the graph. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GraphFindPathParams {
    #[schemars(description = "ID of the entity to start from")]
    pub source_id: String,

    #[schemars(description = "ID of the entity to reach")]
    pub target_id: String,

    #[schemars(description = "Maximum hops 1-5. Defaults to 5.")]
    pub max_depth: Option<usize>,

    #[schemars(description = "Owner of the graph. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GraphSubgraphParams {
    #[schemars(description = "IDs of the entities to include. Unknown IDs are ignored.")]
    pub entity_ids: Vec<String>,

    #[schemars(description = "Owner of the graph. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}
