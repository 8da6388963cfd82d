//! Entity repository: upsert-by-identity, patch update, delete, and listing.
//!
//! The identity key is `(owner_id, type, name)`. [`create_entity`] is a single
//! `INSERT … ON CONFLICT … DO UPDATE … RETURNING` statement, so concurrent
//! creations of the same identity merge instead of racing a read against a
//! write.

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::types::{Entity, EntityPatch, EntityType, FieldPatch, NewEntity, Page, PageRequest, UpsertedEntity};
use super::{new_id, now_timestamp, parse_enum, parse_properties, placeholders};
use crate::error::{MemoryError, Result};

/// Column list matching [`entity_from_row`].
pub(crate) const ENTITY_COLUMNS: &str =
    "id, owner_id, type, name, properties, source, confidence, created_at, updated_at";

pub(crate) fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    let entity_type: String = row.get(2)?;
    let properties: String = row.get(4)?;
    Ok(Entity {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        entity_type: parse_enum(2, &entity_type)?,
        name: row.get(3)?,
        properties: parse_properties(4, &properties)?,
        source: row.get(5)?,
        confidence: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Top-level merge of the stored properties with `?5`: every incoming key
/// replaces the stored value whole (nested objects included, `null` kept as a
/// value), and stored keys absent from `?5` survive.
const SHALLOW_MERGE: &str = "(SELECT json_group_object(key, CASE type \
        WHEN 'object' THEN json(value) \
        WHEN 'array' THEN json(value) \
        WHEN 'true' THEN json('true') \
        WHEN 'false' THEN json('false') \
        ELSE value END) \
    FROM (SELECT key, value, type FROM json_each(entities.properties) \
            WHERE key NOT IN (SELECT key FROM json_each(?5)) \
          UNION ALL \
          SELECT key, value, type FROM json_each(?5)))";

/// Create an entity, or merge into the existing one with the same identity.
///
/// On collision: `properties` are merged with new keys overwriting old ones,
/// `confidence` becomes `max(old, new)`, `source` and the embedding are only
/// replaced by non-null values, and `updated_at` is bumped.
pub fn create_entity(
    conn: &Connection,
    input: &NewEntity,
    embedding: Option<&[f32]>,
) -> Result<UpsertedEntity> {
    let id = new_id();
    let now = now_timestamp();
    let properties = serde_json::to_string(&input.properties)?;
    let embedding_bytes = embedding.map(super::embedding_to_bytes);

    let sql = format!(
        "INSERT INTO entities (id, owner_id, type, name, properties, source, confidence, embedding, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
         ON CONFLICT(owner_id, type, name) DO UPDATE SET \
             properties = {SHALLOW_MERGE}, \
             confidence = MAX(entities.confidence, excluded.confidence), \
             source = COALESCE(excluded.source, entities.source), \
             embedding = COALESCE(excluded.embedding, entities.embedding), \
             updated_at = excluded.updated_at \
         RETURNING {ENTITY_COLUMNS}"
    );

    let entity = conn.query_row(
        &sql,
        params![
            id,
            input.owner_id,
            input.entity_type.as_str(),
            input.name,
            properties,
            input.source,
            input.confidence,
            embedding_bytes,
            now,
        ],
        entity_from_row,
    )?;

    let merged = entity.id != id;
    tracing::debug!(id = %entity.id, merged, entity_type = %entity.entity_type, "entity upserted");
    Ok(UpsertedEntity { entity, merged })
}

/// Owner-scoped point lookup. `None` when the id does not exist for this owner.
pub fn find_entity(conn: &Connection, id: &str, owner: &str) -> Result<Option<Entity>> {
    let sql = format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE id = ?1 AND owner_id = ?2");
    Ok(conn
        .query_row(&sql, params![id, owner], entity_from_row)
        .optional()?)
}

/// Owner-scoped point lookup failing with `EntityNotFound`.
pub fn get_entity(conn: &Connection, id: &str, owner: &str) -> Result<Entity> {
    find_entity(conn, id, owner)?.ok_or_else(|| MemoryError::entity_not_found(id))
}

/// Find by exact name, any type. Most recently updated wins when several types share a name.
pub fn find_entity_by_name(conn: &Connection, owner: &str, name: &str) -> Result<Option<Entity>> {
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities WHERE owner_id = ?1 AND name = ?2 \
         ORDER BY updated_at DESC, id DESC LIMIT 1"
    );
    Ok(conn
        .query_row(&sql, params![owner, name], entity_from_row)
        .optional()?)
}

/// Batch-fetch owner entities by id. Ids that do not resolve are absent from the map.
pub fn get_entities(conn: &Connection, owner: &str, ids: &[String]) -> Result<HashMap<String, Entity>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities WHERE owner_id = ?1 AND id IN ({})",
        placeholders(2, ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let values = std::iter::once(owner).chain(ids.iter().map(String::as_str));
    let rows = stmt
        .query_map(params_from_iter(values), entity_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows.into_iter().map(|e| (e.id.clone(), e)).collect())
}

/// COALESCE-style partial update.
///
/// Unchanged fields keep their stored value. An empty patch returns the stored
/// row untouched. `new_embedding`, when given, replaces the stored vector (the
/// engine passes one whenever name or type change).
pub fn update_entity(
    conn: &Connection,
    id: &str,
    owner: &str,
    patch: &EntityPatch,
    new_embedding: Option<&[f32]>,
) -> Result<Entity> {
    if patch.is_empty() && new_embedding.is_none() {
        return get_entity(conn, id, owner);
    }

    if matches!(patch.name, FieldPatch::Clear) {
        return Err(MemoryError::validation("name", "name cannot be null"));
    }
    if matches!(patch.entity_type, FieldPatch::Clear) {
        return Err(MemoryError::validation("type", "type cannot be null"));
    }
    if matches!(patch.confidence, FieldPatch::Clear) {
        return Err(MemoryError::validation("confidence", "confidence cannot be null"));
    }

    let properties = match &patch.properties {
        FieldPatch::Unchanged => None,
        FieldPatch::Clear => Some("{}".to_string()),
        FieldPatch::Set(p) => Some(serde_json::to_string(p)?),
    };
    let (touch_source, source) = match &patch.source {
        FieldPatch::Unchanged => (false, None),
        FieldPatch::Clear => (true, None),
        FieldPatch::Set(s) => (true, Some(s.as_str())),
    };

    let sql = format!(
        "UPDATE entities SET \
             name = COALESCE(?3, name), \
             type = COALESCE(?4, type), \
             properties = COALESCE(?5, properties), \
             source = CASE WHEN ?6 THEN ?7 ELSE source END, \
             confidence = COALESCE(?8, confidence), \
             embedding = COALESCE(?9, embedding), \
             updated_at = ?10 \
         WHERE id = ?1 AND owner_id = ?2 \
         RETURNING {ENTITY_COLUMNS}"
    );

    let updated = conn
        .query_row(
            &sql,
            params![
                id,
                owner,
                patch.name.as_set(),
                patch.entity_type.as_set().map(EntityType::as_str),
                properties,
                touch_source,
                source,
                patch.confidence.as_set(),
                new_embedding.map(super::embedding_to_bytes),
                now_timestamp(),
            ],
            entity_from_row,
        )
        .optional()?;

    updated.ok_or_else(|| MemoryError::entity_not_found(id))
}

/// Delete an entity (relations cascade). Returns whether a row existed.
pub fn delete_entity(conn: &Connection, id: &str, owner: &str) -> Result<bool> {
    let rows = conn.execute(
        "DELETE FROM entities WHERE id = ?1 AND owner_id = ?2",
        params![id, owner],
    )?;
    Ok(rows > 0)
}

/// Owner-scoped listing ordered by name.
pub fn list_entities(
    conn: &Connection,
    owner: &str,
    entity_type: Option<EntityType>,
    page: PageRequest,
) -> Result<Page<Entity>> {
    let type_str = entity_type.map(|t| t.as_str());
    let sql = format!(
        "SELECT {ENTITY_COLUMNS} FROM entities \
         WHERE owner_id = ?1 AND (?2 IS NULL OR type = ?2) \
         ORDER BY name ASC, id ASC LIMIT ?3 OFFSET ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(
            params![owner, type_str, page.limit as i64, page.offset as i64],
            entity_from_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Page {
        items,
        total: count_entities(conn, owner, entity_type)?,
        limit: page.limit,
        offset: page.offset,
    })
}

pub fn count_entities(conn: &Connection, owner: &str, entity_type: Option<EntityType>) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entities WHERE owner_id = ?1 AND (?2 IS NULL OR type = ?2)",
        params![owner, entity_type.map(|t| t.as_str())],
        |row| row.get(0),
    )?;
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::error::ErrorCode;
    use crate::memory::types::Properties;
    use serde_json::json;

    fn test_db() -> Connection {
        db::open_memory_database().unwrap()
    }

    fn props(value: serde_json::Value) -> Properties {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn create_inserts_new_row() {
        let conn = test_db();
        let input = NewEntity::new("u1", EntityType::Person, "Alice");

        let result = create_entity(&conn, &input, None).unwrap();

        assert!(!result.merged);
        assert_eq!(result.entity.name, "Alice");
        assert_eq!(result.entity.entity_type, EntityType::Person);
        assert_eq!(result.entity.created_at, result.entity.updated_at);
        assert_eq!(count_entities(&conn, "u1", None).unwrap(), 1);
    }

    #[test]
    fn collision_merges_properties_and_keeps_max_confidence() {
        let conn = test_db();
        let mut first = NewEntity::new("u1", EntityType::Organization, "Acme");
        first.properties = props(json!({"industry": "tools", "size": 10}));
        first.confidence = 0.9;
        first.source = Some("doc-1".into());
        let a = create_entity(&conn, &first, None).unwrap();

        let mut second = NewEntity::new("u1", EntityType::Organization, "Acme");
        second.properties = props(json!({"size": 50, "hq": "Berlin"}));
        second.confidence = 0.4;
        let b = create_entity(&conn, &second, None).unwrap();

        assert!(b.merged);
        assert_eq!(b.entity.id, a.entity.id);
        assert_eq!(b.entity.confidence, 0.9);
        assert_eq!(b.entity.properties["industry"], "tools");
        assert_eq!(b.entity.properties["size"], 50);
        assert_eq!(b.entity.properties["hq"], "Berlin");
        // null source on the second write keeps the first
        assert_eq!(b.entity.source.as_deref(), Some("doc-1"));
        assert!(b.entity.updated_at >= a.entity.updated_at);
        assert_eq!(count_entities(&conn, "u1", None).unwrap(), 1);
    }

    #[test]
    fn collision_replaces_top_level_values_whole() {
        let conn = test_db();
        let mut first = NewEntity::new("u1", EntityType::Person, "Ann");
        first.properties = props(json!({
            "addr": {"city": "Paris", "zip": "75001"},
            "k": 1,
            "tags": ["a", "b"],
            "active": true
        }));
        let stored = create_entity(&conn, &first, None).unwrap();
        assert_eq!(stored.entity.properties["active"], true);

        let mut second = NewEntity::new("u1", EntityType::Person, "Ann");
        second.properties = props(json!({"addr": {"city": "Berlin"}, "k": null}));
        let merged = create_entity(&conn, &second, None).unwrap();

        assert!(merged.merged);
        assert_eq!(
            serde_json::Value::Object(merged.entity.properties),
            json!({
                "addr": {"city": "Berlin"},
                "k": null,
                "tags": ["a", "b"],
                "active": true
            })
        );
    }

    #[test]
    fn null_property_means_the_same_on_insert_and_merge() {
        let conn = test_db();
        let mut input = NewEntity::new("u1", EntityType::Concept, "Rust");
        input.properties = props(json!({"k": null}));

        let inserted = create_entity(&conn, &input, None).unwrap();
        let merged = create_entity(&conn, &input, None).unwrap();

        assert!(!inserted.merged);
        assert!(merged.merged);
        assert_eq!(inserted.entity.properties, merged.entity.properties);
        assert!(merged.entity.properties.contains_key("k"));
    }

    #[test]
    fn identity_is_scoped_by_owner_and_type() {
        let conn = test_db();
        create_entity(&conn, &NewEntity::new("u1", EntityType::Person, "Jordan"), None).unwrap();
        let other_type =
            create_entity(&conn, &NewEntity::new("u1", EntityType::Location, "Jordan"), None).unwrap();
        let other_owner =
            create_entity(&conn, &NewEntity::new("u2", EntityType::Person, "Jordan"), None).unwrap();

        assert!(!other_type.merged);
        assert!(!other_owner.merged);
        assert_eq!(count_entities(&conn, "u1", None).unwrap(), 2);
        assert_eq!(count_entities(&conn, "u2", None).unwrap(), 1);
    }

    #[test]
    fn get_is_owner_scoped() {
        let conn = test_db();
        let e = create_entity(&conn, &NewEntity::new("u1", EntityType::Concept, "Rust"), None)
            .unwrap()
            .entity;

        assert_eq!(get_entity(&conn, &e.id, "u1").unwrap().id, e.id);
        let err = get_entity(&conn, &e.id, "u2").unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
    }

    #[test]
    fn empty_patch_returns_row_unchanged() {
        let conn = test_db();
        let e = create_entity(&conn, &NewEntity::new("u1", EntityType::Event, "Launch"), None)
            .unwrap()
            .entity;

        let same = update_entity(&conn, &e.id, "u1", &EntityPatch::default(), None).unwrap();
        assert_eq!(same, e);
    }

    #[test]
    fn patch_updates_only_set_fields() {
        let conn = test_db();
        let mut input = NewEntity::new("u1", EntityType::Person, "Bob");
        input.source = Some("chat".into());
        input.properties = props(json!({"role": "dev"}));
        let e = create_entity(&conn, &input, None).unwrap().entity;

        let patch: EntityPatch = serde_json::from_str(r#"{"confidence": 0.3}"#).unwrap();
        let updated = update_entity(&conn, &e.id, "u1", &patch, None).unwrap();
        assert_eq!(updated.confidence, 0.3);
        assert_eq!(updated.name, "Bob");
        assert_eq!(updated.source.as_deref(), Some("chat"));
        assert_eq!(updated.properties["role"], "dev");

        let patch: EntityPatch = serde_json::from_str(r#"{"source": null}"#).unwrap();
        let cleared = update_entity(&conn, &e.id, "u1", &patch, None).unwrap();
        assert!(cleared.source.is_none());
        assert_eq!(cleared.confidence, 0.3);
    }

    #[test]
    fn patch_cannot_null_required_fields() {
        let conn = test_db();
        let e = create_entity(&conn, &NewEntity::new("u1", EntityType::Person, "Bob"), None)
            .unwrap()
            .entity;

        let patch: EntityPatch = serde_json::from_str(r#"{"name": null}"#).unwrap();
        let err = update_entity(&conn, &e.id, "u1", &patch, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.field(), Some("name"));
    }

    #[test]
    fn rename_onto_existing_identity_is_duplicate() {
        let conn = test_db();
        create_entity(&conn, &NewEntity::new("u1", EntityType::Person, "Ann"), None).unwrap();
        let bob = create_entity(&conn, &NewEntity::new("u1", EntityType::Person, "Bob"), None)
            .unwrap()
            .entity;

        let patch: EntityPatch = serde_json::from_str(r#"{"name": "Ann"}"#).unwrap();
        let err = update_entity(&conn, &bob.id, "u1", &patch, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::Duplicate);
    }

    #[test]
    fn update_missing_entity_is_not_found() {
        let conn = test_db();
        let patch: EntityPatch = serde_json::from_str(r#"{"confidence": 0.5}"#).unwrap();
        let err = update_entity(&conn, "missing", "u1", &patch, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::EntityNotFound);
    }

    #[test]
    fn delete_is_idempotent() {
        let conn = test_db();
        let e = create_entity(&conn, &NewEntity::new("u1", EntityType::Person, "Cy"), None)
            .unwrap()
            .entity;

        assert!(!delete_entity(&conn, &e.id, "u2").unwrap());
        assert!(delete_entity(&conn, &e.id, "u1").unwrap());
        assert!(!delete_entity(&conn, &e.id, "u1").unwrap());
    }

    #[test]
    fn list_orders_by_name_and_paginates() {
        let conn = test_db();
        for name in ["Charlie", "alpha", "Bravo", "Delta"] {
            create_entity(&conn, &NewEntity::new("u1", EntityType::Concept, name), None).unwrap();
        }
        create_entity(&conn, &NewEntity::new("u1", EntityType::Person, "Echo"), None).unwrap();

        let page = list_entities(&conn, "u1", Some(EntityType::Concept), PageRequest { limit: 2, offset: 0 })
            .unwrap();
        let names: Vec<&str> = page.items.iter().map(|e| e.name.as_str()).collect();
        // SQLite's default BINARY collation puts uppercase first
        assert_eq!(names, vec!["Bravo", "Charlie"]);
        assert_eq!(page.total, 4);

        let rest = list_entities(&conn, "u1", Some(EntityType::Concept), PageRequest { limit: 10, offset: 2 })
            .unwrap();
        let names: Vec<&str> = rest.items.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Delta", "alpha"]);
    }

    #[test]
    fn get_entities_skips_other_owners() {
        let conn = test_db();
        let a = create_entity(&conn, &NewEntity::new("u1", EntityType::Person, "A"), None)
            .unwrap()
            .entity;
        let b = create_entity(&conn, &NewEntity::new("u2", EntityType::Person, "B"), None)
            .unwrap()
            .entity;

        let found = get_entities(&conn, "u1", &[a.id.clone(), b.id.clone()]).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key(&a.id));
    }
}
