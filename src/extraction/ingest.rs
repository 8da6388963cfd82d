//! Write an [`Extraction`] into the graph, continuing past per-item failures.

use std::collections::HashMap;

use rusqlite::Connection;
use serde::Serialize;

use super::Extraction;
use crate::error::{ErrorCode, MemoryError};
use crate::memory::entities::{create_entity, find_entity_by_name};
use crate::memory::relations::create_relation;
use crate::memory::types::{ItemFailure, NewEntity, NewRelation, Relation, UpsertedEntity};

/// Provenance recorded on extracted entities when the caller gives none.
pub const EXTRACTION_SOURCE: &str = "extraction";

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub entities: Vec<UpsertedEntity>,
    pub relations: Vec<Relation>,
    pub failures: Vec<ItemFailure>,
}

/// Upsert every extracted entity, then create every relation whose endpoints
/// resolve by name (first among this batch, then among the owner's existing
/// entities).
///
/// `vectors[i]` is the embedding of `extraction.entities[i]`.
pub fn ingest(
    conn: &Connection,
    owner: &str,
    extraction: &Extraction,
    vectors: &[Vec<f32>],
    source: Option<&str>,
) -> IngestReport {
    let mut report = IngestReport::default();
    let mut by_name: HashMap<String, String> = HashMap::new();

    for (index, extracted) in extraction.entities.iter().enumerate() {
        let input = NewEntity {
            owner_id: owner.to_string(),
            entity_type: extracted.entity_type,
            name: extracted.name.clone(),
            properties: extracted.properties.clone(),
            source: Some(source.unwrap_or(EXTRACTION_SOURCE).to_string()),
            confidence: extracted.confidence,
        };

        match create_entity(conn, &input, vectors.get(index).map(Vec::as_slice)) {
            Ok(upserted) => {
                by_name.insert(name_key(&upserted.entity.name), upserted.entity.id.clone());
                report.entities.push(upserted);
            }
            Err(e) => {
                tracing::warn!(index, name = %extracted.name, error = %e, "extracted entity skipped");
                report.failures.push(ItemFailure::new("entity", index, &e));
            }
        }
    }

    for (index, extracted) in extraction.relations.iter().enumerate() {
        let result = resolve(conn, owner, &by_name, &extracted.source).and_then(|source_id| {
            let target_id = resolve(conn, owner, &by_name, &extracted.target)?;
            let mut input = NewRelation::new(owner, source_id, &extracted.relation_type, target_id);
            input.confidence = extracted.confidence;
            create_relation(conn, &input)
        });

        match result {
            Ok(relation) => report.relations.push(relation),
            Err(e) => {
                tracing::warn!(
                    index,
                    source = %extracted.source,
                    target = %extracted.target,
                    error = %e,
                    "extracted relation skipped"
                );
                report.failures.push(ItemFailure::new("relation", index, &e));
            }
        }
    }

    report
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

fn resolve(
    conn: &Connection,
    owner: &str,
    by_name: &HashMap<String, String>,
    name: &str,
) -> crate::error::Result<String> {
    if let Some(id) = by_name.get(&name_key(name)) {
        return Ok(id.clone());
    }
    match find_entity_by_name(conn, owner, name.trim())? {
        Some(entity) => Ok(entity.id),
        None => Err(MemoryError::new(
            ErrorCode::EntityNotFound,
            format!("no entity named {name:?}"),
        )
        .with_context("name", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::extraction::{ExtractedEntity, ExtractedRelation};
    use crate::memory::entities::count_entities;
    use crate::memory::relations::count_relations;
    use crate::memory::types::{EntityType, Properties};

    fn extracted(name: &str, entity_type: EntityType) -> ExtractedEntity {
        ExtractedEntity {
            name: name.into(),
            entity_type,
            properties: Properties::new(),
            confidence: 0.9,
        }
    }

    fn link(source: &str, kind: &str, target: &str) -> ExtractedRelation {
        ExtractedRelation {
            source: source.into(),
            target: target.into(),
            relation_type: kind.into(),
            confidence: 0.7,
        }
    }

    #[test]
    fn ingests_entities_and_resolves_relations_by_name() {
        let conn = db::open_memory_database().unwrap();
        let extraction = Extraction {
            entities: vec![
                extracted("Alice", EntityType::Person),
                extracted("Acme", EntityType::Organization),
            ],
            relations: vec![link("alice", "works_at", "Acme")],
        };

        let report = ingest(&conn, "u1", &extraction, &[], None);

        assert!(report.failures.is_empty());
        assert_eq!(report.entities.len(), 2);
        assert_eq!(report.entities[0].entity.source.as_deref(), Some(EXTRACTION_SOURCE));
        assert_eq!(report.relations.len(), 1);
        assert_eq!(report.relations[0].source_id, report.entities[0].entity.id);
        assert_eq!(report.relations[0].confidence, 0.7);
    }

    #[test]
    fn resolves_against_existing_entities() {
        let conn = db::open_memory_database().unwrap();
        let first = Extraction {
            entities: vec![extracted("Berlin", EntityType::Location)],
            relations: vec![],
        };
        ingest(&conn, "u1", &first, &[], None);

        let second = Extraction {
            entities: vec![extracted("Bob", EntityType::Person)],
            relations: vec![link("Bob", "lives_in", "Berlin")],
        };
        let report = ingest(&conn, "u1", &second, &[], Some("chat-42"));

        assert_eq!(report.relations.len(), 1);
        assert_eq!(report.entities[0].entity.source.as_deref(), Some("chat-42"));
        assert_eq!(count_entities(&conn, "u1", None).unwrap(), 2);
    }

    #[test]
    fn continues_past_failures() {
        let conn = db::open_memory_database().unwrap();
        let mut bad = extracted("Broken", EntityType::Concept);
        bad.confidence = 2.0; // violates the store's CHECK constraint
        let extraction = Extraction {
            entities: vec![bad, extracted("Fine", EntityType::Concept)],
            relations: vec![link("Fine", "relates_to", "Nowhere"), link("Fine", "is", "Fine")],
        };

        let report = ingest(&conn, "u1", &extraction, &[], None);

        assert_eq!(report.entities.len(), 1);
        assert_eq!(report.failures.len(), 3);
        assert_eq!(report.failures[0].kind, "entity");
        assert_eq!(report.failures[0].code, ErrorCode::ConstraintViolation);
        assert_eq!(report.failures[1].code, ErrorCode::EntityNotFound);
        assert_eq!(report.failures[2].code, ErrorCode::InvalidRelation);
        assert_eq!(count_relations(&conn, "u1", None).unwrap(), 0);
    }
}
