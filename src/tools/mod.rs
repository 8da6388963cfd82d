pub mod entity;
pub mod extract;
pub mod graph;
pub mod memory;
pub mod relation;

use entity::{EntityCreateParams, EntityListParams, EntitySearchParams, EntityUpdateParams};
use extract::{KnowledgeExtractParams, StoreStatsParams};
use graph::{GraphFindPathParams, GraphNeighborsParams, GraphSubgraphParams, GraphTraverseParams};
use memory::{
    MemoryAddBatchParams, MemoryAddParams, MemoryListParams, MemorySearchParams,
    MemoryUpdateContentParams,
};
use relation::{RelationCreateParams, RelationListParams};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::engine::MemoryEngine;
use crate::error::{self, MemoryError};
use crate::memory::relations::RelationFilter;
use crate::memory::search::SearchOptions;
use crate::memory::store::MemoryFilter;
use crate::memory::types::{
    EntityPatch, NewEntity, NewMemory, NewRelation, PageRequest, Properties, DEFAULT_PAGE_LIMIT,
};

/// Lookup or delete by id.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IdParams {
    #[schemars(description = "ID of the record")]
    pub id: String,

    #[schemars(description = "Owner of the record. Defaults to the configured owner.")]
    pub owner_id: Option<String>,
}

/// The Mneme MCP tool handler. Every tool is a thin adapter over one
/// [`MemoryEngine`] operation.
#[derive(Clone)]
pub struct MnemeTools {
    tool_router: ToolRouter<Self>,
    engine: MemoryEngine,
}

#[tool_router]
impl MnemeTools {
    pub fn new(engine: MemoryEngine) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine,
        }
    }

    // ── Memories ──────────────────────────────────────────────────────────────

    #[tool(description = "Store a new free-text memory. It is embedded for later semantic search.")]
    async fn memory_add(&self, Parameters(params): Parameters<MemoryAddParams>) -> Result<String, String> {
        let input = new_memory(params, self.engine.default_owner()).map_err(tool_error)?;
        respond(self.engine.add_memory(input).await)
    }

    #[tool(description = "Store several memories at once. Invalid items are reported in 'failures' and the rest are stored.")]
    async fn memory_add_batch(
        &self,
        Parameters(params): Parameters<MemoryAddBatchParams>,
    ) -> Result<String, String> {
        let default_owner = self.engine.default_owner().to_string();
        let mut inputs = Vec::with_capacity(params.memories.len());
        for (index, item) in params.memories.into_iter().enumerate() {
            let input = new_memory(item, &default_owner)
                .map_err(|e| tool_error(e.with_context("index", index)))?;
            inputs.push(input);
        }
        respond(self.engine.add_memories(inputs).await)
    }

    #[tool(description = "Fetch one memory by ID.")]
    async fn memory_get(&self, Parameters(params): Parameters<IdParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        respond(self.engine.get_memory(&params.id, &owner).await)
    }

    #[tool(description = "Replace a memory's content. The memory is re-embedded.")]
    async fn memory_update_content(
        &self,
        Parameters(params): Parameters<MemoryUpdateContentParams>,
    ) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        respond(
            self.engine
                .update_memory_content(&params.id, &owner, &params.content)
                .await,
        )
    }

    #[tool(description = "Delete a memory by ID. Returns {deleted: bool}.")]
    async fn memory_delete(&self, Parameters(params): Parameters<IdParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        deleted(self.engine.delete_memory(&params.id, &owner).await)
    }

    #[tool(description = "List memories, newest first, optionally filtered by agent, session, source, or tag.")]
    async fn memory_list(&self, Parameters(params): Parameters<MemoryListParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let filter = memory_filter(params.agent_id, params.session_id, params.source, params.tag)
            .map_err(tool_error)?;
        let page = page_request(params.limit, params.offset);
        respond(self.engine.list_memories(&owner, filter, page).await)
    }

    #[tool(description = "Search memories by meaning. Returns memories scored by cosine similarity, best first.")]
    async fn memory_search(&self, Parameters(params): Parameters<MemorySearchParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let filter = memory_filter(params.agent_id, params.session_id, params.source, params.tag)
            .map_err(tool_error)?;
        let options = search_options(self.engine.memory_search_options(), params.limit, params.threshold);
        respond(
            self.engine
                .search_memories(&params.query, &owner, filter, options)
                .await,
        )
    }

    // ── Entities ──────────────────────────────────────────────────────────────

    #[tool(description = "Create an entity (person, organization, location, concept, event, custom). An existing entity with the same type and name is merged instead; the response says which via 'merged'.")]
    async fn entity_create(&self, Parameters(params): Parameters<EntityCreateParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let entity_type = parse_field("type", &params.r#type).map_err(tool_error)?;
        let mut input = NewEntity::new(owner, entity_type, params.name);
        input.properties = properties(params.properties).map_err(tool_error)?;
        input.source = params.source;
        if let Some(confidence) = params.confidence {
            input.confidence = confidence;
        }
        respond(self.engine.create_entity(input).await)
    }

    #[tool(description = "Fetch one entity by ID.")]
    async fn entity_get(&self, Parameters(params): Parameters<IdParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        respond(self.engine.get_entity(&params.id, &owner).await)
    }

    #[tool(description = "Partially update an entity. Omitted fields are unchanged; null clears a field. Renaming re-embeds the entity.")]
    async fn entity_update(&self, Parameters(params): Parameters<EntityUpdateParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let patch: EntityPatch = serde_json::from_value(params.patch)
            .map_err(|e| tool_error(MemoryError::validation("patch", e.to_string())))?;
        respond(self.engine.update_entity(&params.id, &owner, patch).await)
    }

    #[tool(description = "Delete an entity by ID, together with every relation touching it. Returns {deleted: bool}.")]
    async fn entity_delete(&self, Parameters(params): Parameters<IdParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        deleted(self.engine.delete_entity(&params.id, &owner).await)
    }

    #[tool(description = "List entities ordered by name, optionally of one type.")]
    async fn entity_list(&self, Parameters(params): Parameters<EntityListParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let entity_type = params
            .r#type
            .as_deref()
            .map(|t| parse_field("type", t))
            .transpose()
            .map_err(tool_error)?;
        let page = page_request(params.limit, params.offset);
        respond(self.engine.list_entities(&owner, entity_type, page).await)
    }

    #[tool(description = "Search entities by meaning. Returns entities scored by cosine similarity, best first.")]
    async fn entity_search(&self, Parameters(params): Parameters<EntitySearchParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let entity_type = params
            .r#type
            .as_deref()
            .map(|t| parse_field("type", t))
            .transpose()
            .map_err(tool_error)?;
        let options = search_options(self.engine.entity_search_options(), params.limit, params.threshold);
        respond(
            self.engine
                .search_entities(&params.query, &owner, entity_type, options)
                .await,
        )
    }

    // ── Relations ─────────────────────────────────────────────────────────────

    #[tool(description = "Create a directed relation between two entities of the same owner (e.g. 'works_at', 'knows', 'part_of').")]
    async fn relation_create(&self, Parameters(params): Parameters<RelationCreateParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let mut input = NewRelation::new(owner, params.source_id, params.r#type, params.target_id);
        input.properties = properties(params.properties).map_err(tool_error)?;
        input.valid_from = params.valid_from;
        input.valid_to = params.valid_to;
        if let Some(confidence) = params.confidence {
            input.confidence = confidence;
        }
        respond(self.engine.create_relation(input).await)
    }

    #[tool(description = "Fetch one relation by ID.")]
    async fn relation_get(&self, Parameters(params): Parameters<IdParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        respond(self.engine.get_relation(&params.id, &owner).await)
    }

    #[tool(description = "Delete a relation by ID. Returns {deleted: bool}.")]
    async fn relation_delete(&self, Parameters(params): Parameters<IdParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        deleted(self.engine.delete_relation(&params.id, &owner).await)
    }

    #[tool(description = "List relations, newest first, optionally by type or by an entity at either end.")]
    async fn relation_list(&self, Parameters(params): Parameters<RelationListParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let filter = RelationFilter {
            relation_type: params.r#type,
            entity_id: params.entity_id,
        };
        let page = page_request(params.limit, params.offset);
        respond(self.engine.list_relations(&owner, filter, page).await)
    }

    // ── Graph ─────────────────────────────────────────────────────────────────

    #[tool(description = "Breadth-first traversal from an entity. Returns discovered entities with depth and path, the sub-graph between them, and whether the limit cut the walk short.")]
    async fn graph_traverse(&self, Parameters(params): Parameters<GraphTraverseParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let mut options = self.engine.traversal_options();
        if let Some(depth) = params.depth {
            options.depth = depth;
        }
        if let Some(limit) = params.limit {
            options.limit = limit;
        }
        if let Some(direction) = params.direction.as_deref() {
            options.direction = parse_field("direction", direction).map_err(tool_error)?;
        }
        options.relation_types = params.relation_types;
        respond(self.engine.traverse(&params.start_id, &owner, options).await)
    }

    #[tool(description = "Entities exactly 'depth' hops away from an entity, following relations in either direction.")]
    async fn graph_neighbors(&self, Parameters(params): Parameters<GraphNeighborsParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let depth = params.depth.unwrap_or(1);
        respond(self.engine.get_neighbors(&params.entity_id, &owner, depth).await)
    }

    #[tool(description = "Shortest path between two entities, following relations in either direction. Returns null when there is none within max_depth.")]
    async fn graph_find_path(&self, Parameters(params): Parameters<GraphFindPathParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        let max_depth = params.max_depth.unwrap_or(crate::memory::graph::MAX_TRAVERSAL_DEPTH);
        respond(
            self.engine
                .find_path(&params.source_id, &params.target_id, &owner, max_depth)
                .await,
        )
    }

    #[tool(description = "The given entities plus every relation between two of them.")]
    async fn graph_subgraph(&self, Parameters(params): Parameters<GraphSubgraphParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        respond(self.engine.get_sub_graph(&owner, params.entity_ids).await)
    }

    // ── Extraction and stats ──────────────────────────────────────────────────

    #[tool(description = "Extract entities and relations from free text with the configured LLM and add them to the graph. Items that cannot be stored are listed in 'failures'.")]
    async fn knowledge_extract(&self, Parameters(params): Parameters<KnowledgeExtractParams>) -> Result<String, String> {
        let owner = self.owner(params.owner_id);
        respond(
            self.engine
                .extract_knowledge(&params.text, &owner, params.source)
                .await,
        )
    }

    #[tool(description = "Store statistics: entity, relation, and memory counts by type and source, plus database size.")]
    async fn store_stats(&self, Parameters(params): Parameters<StoreStatsParams>) -> Result<String, String> {
        let owner = if params.all_owners.unwrap_or(false) {
            None
        } else {
            Some(self.owner(params.owner_id))
        };
        respond(self.engine.stats(owner).await)
    }
}

impl MnemeTools {
    fn owner(&self, requested: Option<String>) -> String {
        requested.unwrap_or_else(|| self.engine.default_owner().to_string())
    }
}

#[tool_handler]
impl ServerHandler for MnemeTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Mneme is a graph + vector memory server. Use memory_add and memory_search for \
                 free-text memories, entity_create and relation_create to build the knowledge \
                 graph, and graph_traverse or graph_find_path to explore it."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

// ── Parameter conversion ──────────────────────────────────────────────────────

fn respond<T: Serialize>(result: error::Result<T>) -> Result<String, String> {
    let value = result.map_err(tool_error)?;
    serde_json::to_string(&value).map_err(|e| tool_error(MemoryError::from(e)))
}

fn deleted(result: error::Result<bool>) -> Result<String, String> {
    let deleted = result.map_err(tool_error)?;
    Ok(serde_json::json!({ "deleted": deleted }).to_string())
}

fn tool_error(err: MemoryError) -> String {
    tracing::debug!(code = %err.code, message = %err.message, "tool call failed");
    err.to_json_string()
}

fn parse_field<T>(field: &str, value: &str) -> error::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    value
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|e: String| MemoryError::validation(field, e))
}

fn properties(value: Option<serde_json::Value>) -> error::Result<Properties> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(Properties::new()),
        Some(serde_json::Value::Object(map)) => Ok(map),
        Some(_) => Err(MemoryError::validation("properties", "properties must be a JSON object")),
    }
}

fn page_request(limit: Option<usize>, offset: Option<usize>) -> PageRequest {
    PageRequest {
        limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        offset: offset.unwrap_or(0),
    }
}

fn search_options(defaults: SearchOptions, limit: Option<usize>, threshold: Option<f64>) -> SearchOptions {
    SearchOptions {
        limit: limit.unwrap_or(defaults.limit),
        threshold: threshold.unwrap_or(defaults.threshold),
    }
}

fn memory_filter(
    agent_id: Option<String>,
    session_id: Option<String>,
    source: Option<String>,
    tag: Option<String>,
) -> error::Result<MemoryFilter> {
    Ok(MemoryFilter {
        agent_id,
        session_id,
        source: source.as_deref().map(|s| parse_field("source", s)).transpose()?,
        tag,
    })
}

fn new_memory(params: MemoryAddParams, default_owner: &str) -> error::Result<NewMemory> {
    let mut input = NewMemory::new(
        params.owner_id.unwrap_or_else(|| default_owner.to_string()),
        params.content,
    );
    input.agent_id = params.agent_id;
    input.session_id = params.session_id;
    if let Some(source) = params.source.as_deref() {
        input.source = parse_field("source", source)?;
    }
    if let Some(importance) = params.importance {
        input.importance = importance;
    }
    input.tags = params.tags.unwrap_or_default();
    Ok(input)
}
