use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct KnowledgeExtractParams {
    #[schemars(description = "Free text to extract entities and relations from")]
    pub text: String,

    #[schemars(description = "Provenance recorded on the extracted entities. Defaults to 'extraction'.")]
    pub source: Option<String>,

    #[schemars(description = "Owner of the graph. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

/// Parameters for the `store_stats` tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StoreStatsParams {
    #[schemars(description = "Owner to report on. Defaults to the configured owner.")]
    pub owner_id: Option<String>,

    #[schemars(description = "If true, aggregate across every owner instead")]
    pub all_owners: Option<bool>,
}
