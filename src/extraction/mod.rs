//! Knowledge extraction from free text using an LLM.
//!
//! The [`LlmProvider`] trait is the seam; [`create_llm_provider`] picks the
//! backend from configuration (or none, when extraction is disabled). An
//! [`Extractor`] turns text into an [`Extraction`], which [`ingest::ingest`]
//! writes into the graph item by item.

pub mod ingest;
pub mod openai;

use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{ErrorCode, MemoryError, Result};
use crate::memory::types::{EntityType, Properties};

/// Longest input passed to the model, in characters.
const MAX_INPUT_CHARS: usize = 8000;
const MAX_ENTITIES: usize = 50;
const MAX_RELATIONS: usize = 100;
const MAX_RELATION_TYPE_LEN: usize = 64;

/// A chat model that answers with a single JSON object.
///
/// Synchronous, like [`crate::embedding::EmbeddingProvider`]; async callers
/// should use `tokio::task::spawn_blocking`.
pub trait LlmProvider: Send + Sync {
    /// Run one system + user exchange and return the raw reply text.
    fn complete(&self, system: &str, prompt: &str) -> Result<String>;

    fn model(&self) -> &str;
}

/// `Ok(None)` when the provider is `"disabled"`.
pub fn create_llm_provider(config: &LlmConfig) -> Result<Option<Box<dyn LlmProvider>>> {
    match config.provider.as_str() {
        "disabled" | "" => Ok(None),
        "openai" => Ok(Some(Box::new(openai::OpenAiLlmProvider::new(config)?))),
        other => Err(MemoryError::new(
            ErrorCode::InvalidInput,
            format!("unknown LLM provider: {other}. Supported: disabled, openai"),
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub properties: Properties,
    pub confidence: f64,
}

/// Endpoints are entity names, resolved at ingest time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedRelation {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Extraction {
    pub entities: Vec<ExtractedEntity>,
    pub relations: Vec<ExtractedRelation>,
}

pub struct Extractor {
    llm: std::sync::Arc<dyn LlmProvider>,
}

impl Extractor {
    pub fn new(llm: std::sync::Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Ask the model for entities and relations in `text`.
    pub fn extract(&self, text: &str) -> Result<Extraction> {
        let prompt = build_prompt(text);
        let reply = self.llm.complete(EXTRACTION_SYSTEM_PROMPT, &prompt)?;
        let extraction = parse_extraction(&reply)?;

        tracing::info!(
            model = %self.llm.model(),
            entities = extraction.entities.len(),
            relations = extraction.relations.len(),
            "knowledge extracted"
        );
        Ok(extraction)
    }
}

/// Parse a model reply into an [`Extraction`].
///
/// Tolerates code fences and surrounding prose. Unknown entity types become
/// `custom`; nameless items are dropped; confidences are clamped into `[0, 1]`.
pub fn parse_extraction(reply: &str) -> Result<Extraction> {
    let json = extract_json(reply);
    let raw: RawExtraction = serde_json::from_str(json).map_err(|e| {
        tracing::warn!(error = %e, "extraction reply is not valid JSON");
        MemoryError::new(ErrorCode::ParseError, "model reply is not a valid extraction").with_cause(e)
    })?;

    let entities = raw
        .entities
        .into_iter()
        .filter(|e| !e.name.trim().is_empty())
        .take(MAX_ENTITIES)
        .map(|e| ExtractedEntity {
            name: e.name.trim().to_string(),
            entity_type: e.entity_type.trim().to_lowercase().parse().unwrap_or(EntityType::Custom),
            properties: e.properties,
            confidence: clamp_unit(e.confidence),
        })
        .collect();

    let relations = raw
        .relations
        .into_iter()
        .filter_map(|r| {
            let relation_type = normalize_relation_type(&r.relation_type)?;
            let (source, target) = (r.source.trim().to_string(), r.target.trim().to_string());
            if source.is_empty() || target.is_empty() || source == target {
                return None;
            }
            Some(ExtractedRelation {
                source,
                target,
                relation_type,
                confidence: clamp_unit(r.confidence),
            })
        })
        .take(MAX_RELATIONS)
        .collect();

    Ok(Extraction { entities, relations })
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    entities: Vec<RawEntity>,
    #[serde(default, alias = "relationships")]
    relations: Vec<RawRelation>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: String,
    #[serde(rename = "type", default)]
    entity_type: String,
    #[serde(default)]
    properties: Properties,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct RawRelation {
    source: String,
    target: String,
    #[serde(rename = "type")]
    relation_type: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
}

fn default_confidence() -> f64 {
    0.8
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, 1.0)
    } else {
        default_confidence()
    }
}

/// `"Works At"` → `"works_at"`. `None` when nothing usable is left.
fn normalize_relation_type(raw: &str) -> Option<String> {
    let normalized: String = raw
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .take(MAX_RELATION_TYPE_LEN)
        .collect();
    (!normalized.is_empty()).then_some(normalized)
}

fn build_prompt(text: &str) -> String {
    let text: String = text.chars().take(MAX_INPUT_CHARS).collect();
    format!(
        r#"Extract the entities and the relations between them from the text below.

Entity types: person, organization, location, concept, event. Use "custom" for anything else.
Relation types are short snake_case verbs such as works_at, lives_in, knows, part_of, prefers.

Return JSON:
{{
    "entities": [
        {{"name": "Alice", "type": "person", "properties": {{"role": "engineer"}}, "confidence": 0.9}}
    ],
    "relations": [
        {{"source": "Alice", "target": "Acme", "type": "works_at", "confidence": 0.8}}
    ]
}}

TEXT:
{text}"#
    )
}

/// The JSON object inside a reply that may wrap it in prose or code fences.
fn extract_json(reply: &str) -> &str {
    if let Some(start) = reply.find("```json") {
        let body = &reply[start + 7..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    match (reply.find('{'), reply.rfind('}')) {
        (Some(start), Some(end)) if start < end => &reply[start..=end],
        _ => reply.trim(),
    }
}

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You build a personal knowledge graph for an AI assistant.

Guidelines:
1. Extract only entities that are explicitly mentioned
2. Use the canonical, shortest unambiguous name ("Acme" not "the Acme company")
3. Relations must connect two extracted entities by name
4. Assign confidence based on how clearly the text states the fact

Return valid JSON only, with no additional text."#;
