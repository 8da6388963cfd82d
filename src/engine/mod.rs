//! Request-scoped public API over the store, the embedding provider, and the
//! optional LLM.
//!
//! [`MemoryEngine`] is cheap to clone. Every operation validates its input
//! first, then runs SQLite and provider work on the blocking pool so async
//! callers (the MCP tools, the CLI) never stall the runtime.

pub mod validate;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;
use serde::Serialize;

use crate::config::MnemeConfig;
use crate::embedding::{embed_chunked, EmbeddingProvider};
use crate::error::{and_then_async, ErrorCode, MemoryError, Result};
use crate::extraction::ingest::{self, IngestReport};
use crate::extraction::{Extractor, LlmProvider};
use crate::memory::graph::{self, NeighborsResult, PathResult, SubGraph, TraversalOptions, TraversalResult};
use crate::memory::relations::{self, RelationFilter};
use crate::memory::search::{self, SearchOptions};
use crate::memory::stats::{self, StatsResponse};
use crate::memory::store::{self, MemoryFilter};
use crate::memory::types::{
    entity_embedding_text, Entity, EntityPatch, EntityType, ItemFailure, Memory, NewEntity,
    NewMemory, NewRelation, Page, PageRequest, Relation, Scored, UpsertedEntity,
};
use crate::memory::entities;

/// Outcome of [`MemoryEngine::add_memories`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchAddReport {
    pub memories: Vec<Memory>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Clone)]
pub struct MemoryEngine {
    db: Arc<Mutex<Connection>>,
    embedding: Arc<dyn EmbeddingProvider>,
    llm: Option<Arc<dyn LlmProvider>>,
    config: Arc<MnemeConfig>,
}

impl MemoryEngine {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        embedding: Arc<dyn EmbeddingProvider>,
        llm: Option<Arc<dyn LlmProvider>>,
        config: Arc<MnemeConfig>,
    ) -> Self {
        Self {
            db,
            embedding,
            llm,
            config,
        }
    }

    pub fn config(&self) -> &MnemeConfig {
        &self.config
    }

    pub fn default_owner(&self) -> &str {
        &self.config.storage.default_owner
    }

    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding
    }

    /// Search defaults for memories, taken from `[retrieval]`.
    pub fn memory_search_options(&self) -> SearchOptions {
        SearchOptions {
            limit: self.config.retrieval.default_limit,
            threshold: self.config.retrieval.memory_threshold,
        }
    }

    /// Search defaults for entities, taken from `[retrieval]`.
    pub fn entity_search_options(&self) -> SearchOptions {
        SearchOptions {
            limit: self.config.retrieval.default_limit,
            threshold: self.config.retrieval.entity_threshold,
        }
    }

    /// Traversal defaults, taken from `[graph]`.
    pub fn traversal_options(&self) -> TraversalOptions {
        TraversalOptions {
            depth: self.config.graph.default_depth,
            limit: self.config.graph.default_limit,
            ..TraversalOptions::default()
        }
    }

    // ── Memories ──────────────────────────────────────────────────────────────

    pub async fn add_memory(&self, input: NewMemory) -> Result<Memory> {
        check_new_memory(&input)?;
        let vector = self.embed_one(&input.content).await?;

        let memory = self
            .with_db(move |conn| store::add_memory(conn, &input, &vector))
            .await?;
        tracing::info!(id = %memory.id, owner = %memory.owner_id, "memory added");
        Ok(memory)
    }

    /// Add many memories; invalid or failing items are reported, the rest are stored.
    ///
    /// Embedding runs in provider-sized chunks and a failing chunk aborts the
    /// whole call before anything is written.
    pub async fn add_memories(&self, inputs: Vec<NewMemory>) -> Result<BatchAddReport> {
        let mut report = BatchAddReport::default();
        let mut accepted = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.into_iter().enumerate() {
            match check_new_memory(&input) {
                Ok(()) => accepted.push((index, input)),
                Err(e) => {
                    tracing::warn!(index, error = %e, "memory rejected");
                    report.failures.push(ItemFailure::new("memory", index, &e));
                }
            }
        }
        if accepted.is_empty() {
            return Ok(report);
        }

        let texts = accepted.iter().map(|(_, m)| m.content.clone()).collect();
        let vectors = self.embed_texts(texts).await?;

        let report = self
            .with_db(move |conn| {
                for ((index, input), vector) in accepted.iter().zip(&vectors) {
                    match store::add_memory(conn, input, vector) {
                        Ok(memory) => report.memories.push(memory),
                        Err(e) => {
                            tracing::warn!(index, error = %e, "memory not stored");
                            report.failures.push(ItemFailure::new("memory", *index, &e));
                        }
                    }
                }
                Ok(report)
            })
            .await?;

        tracing::info!(
            stored = report.memories.len(),
            failed = report.failures.len(),
            "memory batch added"
        );
        Ok(report)
    }

    pub async fn get_memory(&self, id: &str, owner: &str) -> Result<Memory> {
        validate::owner(owner)?;
        let (id, owner) = (id.to_string(), owner.to_string());
        self.with_db(move |conn| store::get_memory(conn, &id, &owner)).await
    }

    /// Replace a memory's content and re-embed it.
    pub async fn update_memory_content(&self, id: &str, owner: &str, content: &str) -> Result<Memory> {
        validate::owner(owner)?;
        validate::non_empty("content", content)?;
        let vector = self.embed_one(content).await?;

        let (id, owner, content) = (id.to_string(), owner.to_string(), content.to_string());
        let memory = self
            .with_db(move |conn| store::update_memory_content(conn, &id, &owner, &content, &vector))
            .await?;
        tracing::info!(id = %memory.id, "memory content updated");
        Ok(memory)
    }

    pub async fn delete_memory(&self, id: &str, owner: &str) -> Result<bool> {
        validate::owner(owner)?;
        let (id, owner) = (id.to_string(), owner.to_string());
        let deleted = self
            .with_db(move |conn| store::delete_memory(conn, &id, &owner))
            .await?;
        tracing::info!(deleted, "memory delete");
        Ok(deleted)
    }

    pub async fn list_memories(&self, owner: &str, filter: MemoryFilter, page: PageRequest) -> Result<Page<Memory>> {
        validate::owner(owner)?;
        validate::page_limit(page.limit)?;
        let owner = owner.to_string();
        self.with_db(move |conn| store::list_memories(conn, &owner, &filter, page))
            .await
    }

    pub async fn count_memories(&self, owner: &str, filter: MemoryFilter) -> Result<u64> {
        validate::owner(owner)?;
        let owner = owner.to_string();
        self.with_db(move |conn| store::count_memories(conn, &owner, &filter))
            .await
    }

    pub async fn search_memories(
        &self,
        query: &str,
        owner: &str,
        filter: MemoryFilter,
        options: SearchOptions,
    ) -> Result<Vec<Scored<Memory>>> {
        check_search(query, owner, options)?;
        let owner = owner.to_string();

        let results = and_then_async(self.embed_one(query).await, |vector| {
            self.with_db(move |conn| search::search_memories(conn, &owner, &vector, &filter, options))
        })
        .await?;

        tracing::info!(results = results.len(), threshold = options.threshold, "memory search");
        Ok(results)
    }

    // ── Entities ──────────────────────────────────────────────────────────────

    /// Create an entity, merging into an existing one with the same
    /// `(owner, type, name)`.
    pub async fn create_entity(&self, input: NewEntity) -> Result<UpsertedEntity> {
        validate::owner(&input.owner_id)?;
        validate::non_empty("name", &input.name)?;
        validate::unit_interval("confidence", input.confidence)?;
        let vector = self.embed_one(&input.embedding_text()).await?;

        let upserted = self
            .with_db(move |conn| entities::create_entity(conn, &input, Some(&vector)))
            .await?;
        tracing::info!(
            id = %upserted.entity.id,
            entity_type = %upserted.entity.entity_type,
            merged = upserted.merged,
            "entity created"
        );
        Ok(upserted)
    }

    pub async fn get_entity(&self, id: &str, owner: &str) -> Result<Entity> {
        validate::owner(owner)?;
        let (id, owner) = (id.to_string(), owner.to_string());
        self.with_db(move |conn| entities::get_entity(conn, &id, &owner)).await
    }

    /// Apply a partial update; a new name or type re-embeds the entity.
    pub async fn update_entity(&self, id: &str, owner: &str, patch: EntityPatch) -> Result<Entity> {
        validate::owner(owner)?;
        validate::entity_patch(&patch)?;

        let vector = if patch.name.as_set().is_some() || patch.entity_type.as_set().is_some() {
            let current = self.get_entity(id, owner).await?;
            let entity_type = patch.entity_type.as_set().copied().unwrap_or(current.entity_type);
            let name = patch.name.as_set().unwrap_or(&current.name);
            Some(self.embed_one(&entity_embedding_text(entity_type, name)).await?)
        } else {
            None
        };

        let (id, owner) = (id.to_string(), owner.to_string());
        let entity = self
            .with_db(move |conn| entities::update_entity(conn, &id, &owner, &patch, vector.as_deref()))
            .await?;
        tracing::info!(id = %entity.id, "entity updated");
        Ok(entity)
    }

    /// Delete an entity and, by cascade, its relations.
    pub async fn delete_entity(&self, id: &str, owner: &str) -> Result<bool> {
        validate::owner(owner)?;
        let (id, owner) = (id.to_string(), owner.to_string());
        let deleted = self
            .with_db(move |conn| entities::delete_entity(conn, &id, &owner))
            .await?;
        tracing::info!(deleted, "entity delete");
        Ok(deleted)
    }

    pub async fn list_entities(
        &self,
        owner: &str,
        entity_type: Option<EntityType>,
        page: PageRequest,
    ) -> Result<Page<Entity>> {
        validate::owner(owner)?;
        validate::page_limit(page.limit)?;
        let owner = owner.to_string();
        self.with_db(move |conn| entities::list_entities(conn, &owner, entity_type, page))
            .await
    }

    pub async fn count_entities(&self, owner: &str, entity_type: Option<EntityType>) -> Result<u64> {
        validate::owner(owner)?;
        let owner = owner.to_string();
        self.with_db(move |conn| entities::count_entities(conn, &owner, entity_type))
            .await
    }

    pub async fn search_entities(
        &self,
        query: &str,
        owner: &str,
        entity_type: Option<EntityType>,
        options: SearchOptions,
    ) -> Result<Vec<Scored<Entity>>> {
        check_search(query, owner, options)?;
        let owner = owner.to_string();

        let results = and_then_async(self.embed_one(query).await, |vector| {
            self.with_db(move |conn| search::search_entities(conn, &owner, &vector, entity_type, options))
        })
        .await?;

        tracing::info!(results = results.len(), threshold = options.threshold, "entity search");
        Ok(results)
    }

    // ── Relations ─────────────────────────────────────────────────────────────

    pub async fn create_relation(&self, input: NewRelation) -> Result<Relation> {
        validate::owner(&input.owner_id)?;
        validate::relation_type(&input.relation_type)?;
        validate::unit_interval("confidence", input.confidence)?;
        validate::validity(input.valid_from.as_deref(), input.valid_to.as_deref())?;

        let relation = self
            .with_db(move |conn| relations::create_relation(conn, &input))
            .await?;
        tracing::info!(id = %relation.id, relation_type = %relation.relation_type, "relation created");
        Ok(relation)
    }

    pub async fn get_relation(&self, id: &str, owner: &str) -> Result<Relation> {
        validate::owner(owner)?;
        let (id, owner) = (id.to_string(), owner.to_string());
        self.with_db(move |conn| relations::get_relation(conn, &id, &owner)).await
    }

    pub async fn delete_relation(&self, id: &str, owner: &str) -> Result<bool> {
        validate::owner(owner)?;
        let (id, owner) = (id.to_string(), owner.to_string());
        let deleted = self
            .with_db(move |conn| relations::delete_relation(conn, &id, &owner))
            .await?;
        tracing::info!(deleted, "relation delete");
        Ok(deleted)
    }

    pub async fn list_relations(
        &self,
        owner: &str,
        filter: RelationFilter,
        page: PageRequest,
    ) -> Result<Page<Relation>> {
        validate::owner(owner)?;
        validate::page_limit(page.limit)?;
        let owner = owner.to_string();
        self.with_db(move |conn| relations::list_relations(conn, &owner, &filter, page))
            .await
    }

    pub async fn count_relations(&self, owner: &str, relation_type: Option<String>) -> Result<u64> {
        validate::owner(owner)?;
        let owner = owner.to_string();
        self.with_db(move |conn| relations::count_relations(conn, &owner, relation_type.as_deref()))
            .await
    }

    // ── Graph ─────────────────────────────────────────────────────────────────

    pub async fn traverse(&self, start_id: &str, owner: &str, options: TraversalOptions) -> Result<TraversalResult> {
        validate::owner(owner)?;
        validate::depth("depth", options.depth)?;
        validate::traversal_limit(options.limit)?;

        let (start, owner) = (start_id.to_string(), owner.to_string());
        let result = self
            .with_db(move |conn| graph::traverse(conn, &start, &owner, &options))
            .await?;
        tracing::info!(
            start = %start_id,
            nodes = result.nodes.len(),
            truncated = result.truncated,
            "graph traversed"
        );
        Ok(result)
    }

    pub async fn get_neighbors(&self, entity_id: &str, owner: &str, depth: usize) -> Result<NeighborsResult> {
        validate::owner(owner)?;
        validate::depth("depth", depth)?;
        let (id, owner) = (entity_id.to_string(), owner.to_string());
        self.with_db(move |conn| graph::get_neighbors(conn, &id, &owner, depth))
            .await
    }

    pub async fn find_path(
        &self,
        source_id: &str,
        target_id: &str,
        owner: &str,
        max_depth: usize,
    ) -> Result<Option<PathResult>> {
        validate::owner(owner)?;
        validate::depth("max_depth", max_depth)?;
        let (source, target, owner) = (source_id.to_string(), target_id.to_string(), owner.to_string());
        let path = self
            .with_db(move |conn| graph::find_path(conn, &source, &target, &owner, max_depth))
            .await?;
        tracing::info!(
            source = %source_id,
            target = %target_id,
            hops = path.as_ref().map(|p| p.nodes.len().saturating_sub(1)),
            "path search"
        );
        Ok(path)
    }

    pub async fn get_sub_graph(&self, owner: &str, entity_ids: Vec<String>) -> Result<SubGraph> {
        validate::owner(owner)?;
        let owner = owner.to_string();
        self.with_db(move |conn| graph::get_sub_graph(conn, &owner, &entity_ids))
            .await
    }

    // ── Extraction ────────────────────────────────────────────────────────────

    /// Extract entities and relations from `text` with the LLM and write them
    /// into the owner's graph.
    ///
    /// Items that fail to store are reported, not fatal. A failing LLM or
    /// embedding call fails the whole operation before anything is written.
    pub async fn extract_knowledge(&self, text: &str, owner: &str, source: Option<String>) -> Result<IngestReport> {
        validate::owner(owner)?;
        validate::non_empty("text", text)?;
        let llm = self.llm.clone().ok_or_else(|| {
            MemoryError::new(
                ErrorCode::ExtractionFailed,
                "knowledge extraction is disabled; set [llm] provider in the config",
            )
        })?;

        let text = text.to_string();
        let extraction = tokio::task::spawn_blocking(move || Extractor::new(llm).extract(&text)).await??;

        let texts = extraction
            .entities
            .iter()
            .map(|e| entity_embedding_text(e.entity_type, &e.name))
            .collect();
        let vectors = self.embed_texts(texts).await?;

        let owner = owner.to_string();
        let report = self
            .with_db(move |conn| Ok(ingest::ingest(conn, &owner, &extraction, &vectors, source.as_deref())))
            .await?;

        tracing::info!(
            entities = report.entities.len(),
            relations = report.relations.len(),
            failed = report.failures.len(),
            "knowledge ingested"
        );
        Ok(report)
    }

    // ── Maintenance ───────────────────────────────────────────────────────────

    /// Store statistics; `owner = None` aggregates every owner.
    pub async fn stats(&self, owner: Option<String>) -> Result<StatsResponse> {
        let path = self.config.resolved_db_path();
        self.with_db(move |conn| {
            let on_disk = path.exists().then_some(path.as_path());
            stats::store_stats(conn, owner.as_deref(), on_disk)
        })
        .await
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    /// Run `f` against the shared connection on the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| {
                MemoryError::new(ErrorCode::ConnectionFailed, "database lock poisoned")
            })?;
            f(&conn)
        })
        .await?
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| MemoryError::new(ErrorCode::EmbeddingFailed, "provider returned no vector"))
    }

    /// Embed in provider-sized chunks under the configured timeout, then check
    /// every vector against the provider's dimension.
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let provider = Arc::clone(&self.embedding);
        let limit = Duration::from_secs(self.config.embedding.timeout_secs.max(1));
        let task = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embed_chunked(provider.as_ref(), &refs)
        });

        let vectors = match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined??,
            Err(_) => {
                tracing::warn!(timeout_secs = limit.as_secs(), "embedding timed out");
                return Err(MemoryError::new(
                    ErrorCode::Timeout,
                    format!("embedding did not finish within {}s", limit.as_secs()),
                ));
            }
        };

        let dim = self.embedding.dimensions();
        for vector in &vectors {
            search::validate_vector(vector, Some(dim))?;
        }
        Ok(vectors)
    }
}

fn check_new_memory(input: &NewMemory) -> Result<()> {
    validate::owner(&input.owner_id)?;
    validate::non_empty("content", &input.content)?;
    validate::unit_interval("importance", input.importance)?;
    validate::tags(&input.tags)
}

fn check_search(query: &str, owner: &str, options: SearchOptions) -> Result<()> {
    validate::owner(owner)?;
    validate::non_empty("query", query)?;
    validate::search_limit(options.limit)?;
    validate::threshold(options.threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::EmbeddingOutput;
    use crate::memory::types::FieldPatch;

    /// Maps text onto a few fixed axes by keyword, so similarity is predictable.
    struct Axes;

    impl EmbeddingProvider for Axes {
        fn embed_batch_detailed(&self, texts: &[&str]) -> Result<Vec<EmbeddingOutput>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    let axis = |word: &str| if t.contains(word) { 1.0 } else { 0.0 };
                    EmbeddingOutput {
                        vector: vec![axis("rust"), axis("coffee"), axis("berlin"), 0.1],
                        model: "axes".into(),
                        usage: None,
                    }
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn max_batch_size(&self) -> usize {
            2
        }

        fn model(&self) -> &str {
            "axes"
        }
    }

    struct Stuck;

    impl EmbeddingProvider for Stuck {
        fn embed_batch_detailed(&self, _texts: &[&str]) -> Result<Vec<EmbeddingOutput>> {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(vec![])
        }

        fn dimensions(&self) -> usize {
            4
        }

        fn max_batch_size(&self) -> usize {
            8
        }

        fn model(&self) -> &str {
            "stuck"
        }
    }

    fn engine_with(provider: Arc<dyn EmbeddingProvider>) -> MemoryEngine {
        let conn = db::open_memory_database().unwrap();
        let mut config = MnemeConfig::default();
        config.embedding.timeout_secs = 1;
        MemoryEngine::new(Arc::new(Mutex::new(conn)), provider, None, Arc::new(config))
    }

    fn engine() -> MemoryEngine {
        engine_with(Arc::new(Axes))
    }

    #[tokio::test]
    async fn memory_lifecycle() {
        let engine = engine();
        let memory = engine
            .add_memory(NewMemory::new("u1", "Rust is my favourite language"))
            .await
            .unwrap();

        let found = engine
            .search_memories("rust", "u1", MemoryFilter::default(), engine.memory_search_options())
            .await
            .unwrap();
        assert_eq!(found[0].item.id, memory.id);

        let updated = engine
            .update_memory_content(&memory.id, "u1", "Coffee every morning")
            .await
            .unwrap();
        assert_eq!(updated.content, "Coffee every morning");

        let found = engine
            .search_memories("rust", "u1", MemoryFilter::default(), engine.memory_search_options())
            .await
            .unwrap();
        assert!(found.is_empty());

        assert!(engine.delete_memory(&memory.id, "u1").await.unwrap());
        assert!(!engine.delete_memory(&memory.id, "u1").await.unwrap());
    }

    #[tokio::test]
    async fn validation_runs_before_io() {
        let engine = engine_with(Arc::new(Stuck));

        let err = engine.add_memory(NewMemory::new("u1", "   ")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.field(), Some("content"));

        let err = engine.get_memory("m1", "").await.unwrap_err();
        assert_eq!(err.field(), Some("owner_id"));

        let options = TraversalOptions {
            depth: 6,
            ..TraversalOptions::default()
        };
        let err = engine.traverse("e1", "u1", options).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.field(), Some("depth"));

        let err = engine.find_path("a", "b", "u1", 0).await.unwrap_err();
        assert_eq!(err.field(), Some("max_depth"));
    }

    #[tokio::test]
    async fn cleared_name_is_rejected_before_lookup_or_embedding() {
        let engine = engine_with(Arc::new(Stuck));
        let patch = EntityPatch {
            name: FieldPatch::Clear,
            entity_type: FieldPatch::Set(EntityType::Event),
            ..EntityPatch::default()
        };

        let started = std::time::Instant::now();
        let err = engine.update_entity("missing", "u1", patch).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.field(), Some("name"));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn slow_embedding_times_out() {
        let engine = engine_with(Arc::new(Stuck));
        let err = engine.add_memory(NewMemory::new("u1", "hello")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn batch_add_reports_invalid_items() {
        let engine = engine();
        let mut bad_tags = NewMemory::new("u1", "tagged");
        bad_tags.tags = vec!["".into()];

        let report = engine
            .add_memories(vec![
                NewMemory::new("u1", "rust"),
                NewMemory::new("u1", ""),
                bad_tags,
                NewMemory::new("u1", "coffee"),
                NewMemory::new("u1", "berlin"),
            ])
            .await
            .unwrap();

        assert_eq!(report.memories.len(), 3);
        let failed: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
        assert_eq!(failed, vec![1, 2]);
        assert_eq!(engine.count_memories("u1", MemoryFilter::default()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn entity_upsert_and_rename_reembeds() {
        let engine = engine();
        let first = engine
            .create_entity(NewEntity::new("u1", EntityType::Concept, "Rust"))
            .await
            .unwrap();
        let again = engine
            .create_entity(NewEntity::new("u1", EntityType::Concept, "Rust"))
            .await
            .unwrap();
        assert!(again.merged);
        assert_eq!(again.entity.id, first.entity.id);

        let patch = EntityPatch {
            name: FieldPatch::Set("Coffee".into()),
            ..EntityPatch::default()
        };
        engine.update_entity(&first.entity.id, "u1", patch).await.unwrap();

        let options = SearchOptions {
            limit: 5,
            threshold: 0.9,
        };
        let hits = engine
            .search_entities("coffee", "u1", None, options)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.name, "Coffee");
        assert!(engine.search_entities("rust", "u1", None, options).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn relations_and_traversal() {
        let engine = engine();
        let a = engine
            .create_entity(NewEntity::new("u1", EntityType::Person, "Alice"))
            .await
            .unwrap()
            .entity;
        let b = engine
            .create_entity(NewEntity::new("u1", EntityType::Location, "Berlin"))
            .await
            .unwrap()
            .entity;

        let mut input = NewRelation::new("u1", &a.id, "lives_in", &b.id);
        input.valid_from = Some("2024-05-01".into());
        input.valid_to = Some("2023-01-01".into());
        let err = engine.create_relation(input.clone()).await.unwrap_err();
        assert_eq!(err.field(), Some("valid_from"));

        input.valid_to = None;
        engine.create_relation(input).await.unwrap();

        let result = engine
            .traverse(&a.id, "u1", engine.traversal_options())
            .await
            .unwrap();
        assert_eq!(result.nodes.len(), 2);
        assert_eq!(result.sub_graph.relations.len(), 1);

        let path = engine.find_path(&b.id, &a.id, "u1", 5).await.unwrap().unwrap();
        assert_eq!(path.nodes.len(), 2);

        assert!(engine.delete_entity(&b.id, "u1").await.unwrap());
        assert_eq!(engine.count_relations("u1", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn extraction_requires_llm() {
        let engine = engine();
        let err = engine
            .extract_knowledge("Alice lives in Berlin", "u1", None)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ExtractionFailed);
    }

    #[tokio::test]
    async fn extraction_ingests_into_graph() {
        struct Canned;

        impl LlmProvider for Canned {
            fn complete(&self, _system: &str, _prompt: &str) -> Result<String> {
                Ok(r#"{"entities": [
                        {"name": "Alice", "type": "person"},
                        {"name": "Berlin", "type": "location"}
                    ],
                    "relations": [{"source": "Alice", "target": "Berlin", "type": "lives in"}]}"#
                    .into())
            }

            fn model(&self) -> &str {
                "canned"
            }
        }

        let conn = db::open_memory_database().unwrap();
        let engine = MemoryEngine::new(
            Arc::new(Mutex::new(conn)),
            Arc::new(Axes),
            Some(Arc::new(Canned)),
            Arc::new(MnemeConfig::default()),
        );

        let report = engine
            .extract_knowledge("Alice lives in Berlin", "u1", None)
            .await
            .unwrap();
        assert_eq!(report.entities.len(), 2);
        assert_eq!(report.relations[0].relation_type, "lives_in");

        let hits = engine
            .search_entities("berlin", "u1", Some(EntityType::Location), engine.entity_search_options())
            .await
            .unwrap();
        assert_eq!(hits[0].item.name, "Berlin");
    }
}
