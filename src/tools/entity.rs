//! Parameters for the `entity_*` tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EntityCreateParams {
    #[schemars(description = "Entity name. Together with type and owner it identifies the entity.")]
    pub name: String,

    #[schemars(
        description = "Entity type: 'person', 'organization', 'location', 'concept', 'event', or 'custom'"
    )]
    pub r#type: String,

    #[schemars(
        description = "JSON object of properties. On collision with an existing entity, keys are merged."
    )]
    pub properties: Option<serde_json::Value>,

    #[schemars(description = "Where this entity came from")]
    pub source: Option<String>,

    #[schemars(description = "Confidence 0.0-1.0. Defaults to 1.0. Merges keep the higher value.")]
    pub confidence: Option<f64>,

    #[schemars(description = "Owner of the entity. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EntityUpdateParams {
    #[schemars(description = "ID of the entity to update")]
    pub id: String,

    #[schemars(
        description = "Partial update with any of: name, type, properties, source, confidence. \
                       Omitted keys are unchanged; null clears a field (properties reset to {})."
    )]
    pub patch: serde_json::Value,

    #[schemars(description = "Owner of the entity. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EntityListParams {
    #[schemars(description = "Only entities of this type")]
    pub r#type: Option<String>,

    #[schemars(description = "Page size 1-1000. Defaults to 50.")]
    pub limit: Option<usize>,

    #[schemars(description = "Rows to skip. Defaults to 0.")]
    pub offset: Option<usize>,

    #[schemars(description = "Owner to list. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EntitySearchParams {
    #[schemars(description = "Natural language query, matched against \"type: name\"")]
    pub query: String,

    #[schemars(description = "Only entities of this type")]
    pub r#type: Option<String>,

    #[schemars(description = "Maximum results 1-100. Defaults to 10.")]
    pub limit: Option<usize>,

    #[schemars(description = "Minimum similarity score. Defaults to 0.6.")]
    pub threshold: Option<f64>,

    #[schemars(description = "Owner to search. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}
