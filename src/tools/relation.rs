use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RelationCreateParams {
    #[schemars(description = "ID of the source entity")]
    pub source_id: String,

    #[schemars(description = "ID of the target entity. Must differ from source_id.")]
    pub target_id: String,

    #[schemars(description = "Relation type, 1-64 characters (e.g. 'works_at', 'knows', 'part_of')")]
    pub r#type: String,

    #[schemars(description = "JSON object of properties")]
    pub properties: Option<serde_json::Value>,

    #[schemars(description = "Confidence 0.0-1.0. Defaults to 1.0.")]
    pub confidence: Option<f64>,

    #[schemars(description = "Start of validity, RFC 3339 or YYYY-MM-DD")]
    pub valid_from: Option<String>,

    #[schemars(description = "End of validity, RFC 3339 or YYYY-MM-DD. Not before valid_from.")]
    pub valid_to: Option<String>,

    #[schemars(description = "Owner of both entities. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RelationListParams {
    #[schemars(description = "Only relations of this type")]
    pub r#type: Option<String>,

    #[schemars(description = "Only relations touching this entity, as source or target")]
    pub entity_id: Option<String>,

    #[schemars(description = "Page size 1-1000. Defaults to 50.")]
    pub limit: Option<usize>,

    #[schemars(description = "Rows to skip. Defaults to 0.")]
    pub offset: Option<usize>,

    #[schemars(description = "Owner to list. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}
