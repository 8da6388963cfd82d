#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use mneme::config::MnemeConfig;
use mneme::db;
use mneme::embedding::{EmbeddingOutput, EmbeddingProvider};
use mneme::engine::MemoryEngine;
use mneme::memory::entities::create_entity;
use mneme::memory::relations::create_relation;
use mneme::memory::types::{Entity, EntityType, NewEntity, NewRelation, Relation};
use rusqlite::Connection;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::load_sqlite_vec();
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&conn).unwrap();
    conn
}

/// Generate a deterministic 384-dim embedding with a spike at position `seed`.
/// Distinct seeds give orthogonal vectors.
pub fn test_embedding(seed: u8) -> Vec<f32> {
    let mut v = vec![0.0f32; 384];
    v[seed as usize % 384] = 1.0;
    v
}

/// Create an entity without an embedding. Returns the stored row.
pub fn entity(conn: &Connection, owner: &str, entity_type: EntityType, name: &str) -> Entity {
    create_entity(conn, &NewEntity::new(owner, entity_type, name), None)
        .unwrap()
        .entity
}

pub fn relate(conn: &Connection, owner: &str, source: &Entity, kind: &str, target: &Entity) -> Relation {
    create_relation(conn, &NewRelation::new(owner, &source.id, kind, &target.id)).unwrap()
}

/// Keyword groups that share an axis, so related words land close together.
const TOPICS: [&[&str]; 5] = [
    &["prefer", "favorite", "favourite", "like", "love"],
    &["typescript", "programming", "language", "rust", "code"],
    &["weather", "rain", "sunny", "tomorrow", "forecast"],
    &["coffee", "tea", "breakfast", "morning"],
    &["berlin", "paris", "city", "travel"],
];

/// Deterministic stand-in for a sentence embedding model.
///
/// Each [`TOPICS`] group is one axis (1.0 when any of its words occurs). The
/// last axis is a small constant so no text maps to the zero vector.
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    pub const DIMENSIONS: usize = TOPICS.len() + 1;

    pub fn vector(text: &str) -> Vec<f32> {
        let text = text.to_lowercase();
        let mut v: Vec<f32> = TOPICS
            .iter()
            .map(|words| if words.iter().any(|w| text.contains(w)) { 1.0 } else { 0.0 })
            .collect();
        v.push(0.05);
        v
    }
}

impl EmbeddingProvider for KeywordEmbedder {
    fn embed_batch_detailed(&self, texts: &[&str]) -> mneme::error::Result<Vec<EmbeddingOutput>> {
        Ok(texts
            .iter()
            .map(|t| EmbeddingOutput {
                vector: Self::vector(t),
                model: "keyword".into(),
                usage: None,
            })
            .collect())
    }

    fn dimensions(&self) -> usize {
        Self::DIMENSIONS
    }

    fn max_batch_size(&self) -> usize {
        4
    }

    fn model(&self) -> &str {
        "keyword"
    }
}

/// An engine over a fresh in-memory database and the [`KeywordEmbedder`].
pub fn test_engine() -> MemoryEngine {
    MemoryEngine::new(
        Arc::new(Mutex::new(test_db())),
        Arc::new(KeywordEmbedder),
        None,
        Arc::new(MnemeConfig::default()),
    )
}
