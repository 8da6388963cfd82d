mod helpers;

use helpers::{test_db, test_embedding, test_engine, KeywordEmbedder};
use mneme::error::ErrorCode;
use mneme::memory::search::{search_entities, search_memories, SearchOptions};
use mneme::memory::store::{add_memory, MemoryFilter};
use mneme::memory::types::{EntityType, MemorySource, NewMemory};

fn options(limit: usize, threshold: f64) -> SearchOptions {
    SearchOptions { limit, threshold }
}

#[tokio::test]
async fn preference_is_found_and_weather_is_not() {
    let engine = test_engine();
    let stored = engine
        .add_memory(NewMemory::new("u1", "I prefer TypeScript"))
        .await
        .unwrap();

    let hits = engine
        .search_memories(
            "programming language preference",
            "u1",
            MemoryFilter::default(),
            options(10, 0.3),
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.id, stored.id);
    assert!(hits[0].score >= 0.3);

    let hits = engine
        .search_memories("weather tomorrow", "u1", MemoryFilter::default(), options(10, 0.8))
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[test]
fn results_are_sorted_and_above_threshold() {
    let conn = test_db();
    let query = KeywordEmbedder::vector("rust coffee");
    for text in [
        "rust",
        "coffee in the morning",
        "rust and coffee",
        "weather",
        "travel to berlin",
        "I love rust code with coffee",
    ] {
        add_memory(&conn, &NewMemory::new("u1", text), &KeywordEmbedder::vector(text)).unwrap();
    }

    let hits = search_memories(&conn, "u1", &query, &MemoryFilter::default(), options(10, 0.5)).unwrap();

    assert!(!hits.is_empty());
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert!(hits.iter().all(|h| h.score >= 0.5));
    assert!(hits.iter().all(|h| h.item.content != "weather"));
}

#[test]
fn equal_scores_prefer_newest() {
    let conn = test_db();
    let v = test_embedding(3);
    let first = add_memory(&conn, &NewMemory::new("u1", "first"), &v).unwrap();
    let second = add_memory(&conn, &NewMemory::new("u1", "second"), &v).unwrap();

    let hits = search_memories(&conn, "u1", &v, &MemoryFilter::default(), options(10, 0.9)).unwrap();

    let ids: Vec<&str> = hits.iter().map(|h| h.item.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
}

#[test]
fn limit_truncates_after_ranking() {
    let conn = test_db();
    let v = test_embedding(1);
    for i in 0..5 {
        add_memory(&conn, &NewMemory::new("u1", format!("m{i}")), &v).unwrap();
    }
    let hits = search_memories(&conn, "u1", &v, &MemoryFilter::default(), options(2, 0.0)).unwrap();
    assert_eq!(hits.len(), 2);
}

#[test]
fn negative_scores_never_pass_positive_threshold() {
    let conn = test_db();
    let v = test_embedding(7);
    let opposite: Vec<f32> = v.iter().map(|x| -x).collect();
    add_memory(&conn, &NewMemory::new("u1", "opposite"), &opposite).unwrap();

    let hits = search_memories(&conn, "u1", &v, &MemoryFilter::default(), options(10, 0.1)).unwrap();
    assert!(hits.is_empty());

    let hits = search_memories(&conn, "u1", &v, &MemoryFilter::default(), options(10, -1.0)).unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].score < 0.0);
}

#[test]
fn filters_and_owners_scope_the_scan() {
    let conn = test_db();
    let v = test_embedding(2);

    let mut tagged = NewMemory::new("u1", "tagged document");
    tagged.source = MemorySource::Document;
    tagged.tags = vec!["work".into(), "q3".into()];
    tagged.agent_id = Some("agent-a".into());
    add_memory(&conn, &tagged, &v).unwrap();
    add_memory(&conn, &NewMemory::new("u1", "plain"), &v).unwrap();
    add_memory(&conn, &NewMemory::new("u2", "someone else's"), &v).unwrap();

    let by_tag = MemoryFilter {
        tag: Some("q3".into()),
        ..MemoryFilter::default()
    };
    let hits = search_memories(&conn, "u1", &v, &by_tag, options(10, 0.5)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.content, "tagged document");

    let by_source = MemoryFilter {
        source: Some(MemorySource::Conversation),
        ..MemoryFilter::default()
    };
    let hits = search_memories(&conn, "u1", &v, &by_source, options(10, 0.5)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.content, "plain");

    let hits = search_memories(&conn, "u2", &v, &MemoryFilter::default(), options(10, 0.5)).unwrap();
    assert_eq!(hits.len(), 1);
}

#[test]
fn vectors_of_another_dimension_are_skipped() {
    let conn = test_db();
    add_memory(&conn, &NewMemory::new("u1", "wide"), &test_embedding(0)).unwrap();
    add_memory(&conn, &NewMemory::new("u1", "narrow"), &[1.0, 0.0, 0.0]).unwrap();

    let hits = search_memories(&conn, "u1", &[1.0, 0.0, 0.0], &MemoryFilter::default(), options(10, 0.0)).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.content, "narrow");
}

#[test]
fn invalid_query_vectors_are_rejected() {
    let conn = test_db();
    let err = search_memories(&conn, "u1", &[], &MemoryFilter::default(), options(10, 0.5)).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidVector);

    let err = search_entities(&conn, "u1", &[f32::NAN, 1.0], None, options(10, 0.5)).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidVector);
}

#[tokio::test]
async fn entity_search_by_type() {
    let engine = test_engine();
    for (t, name) in [
        (EntityType::Location, "Berlin"),
        (EntityType::Organization, "Berlin Coffee Roasters"),
        (EntityType::Concept, "Rust"),
    ] {
        engine
            .create_entity(mneme::memory::types::NewEntity::new("u1", t, name))
            .await
            .unwrap();
    }

    let all = engine
        .search_entities("berlin", "u1", None, options(10, 0.3))
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let places = engine
        .search_entities("berlin", "u1", Some(EntityType::Location), options(10, 0.3))
        .await
        .unwrap();
    assert_eq!(places.len(), 1);
    assert_eq!(places[0].item.name, "Berlin");
}

#[tokio::test]
async fn search_inputs_are_validated() {
    let engine = test_engine();
    let err = engine
        .search_memories("rust", "u1", MemoryFilter::default(), options(101, 0.5))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationError);
    assert_eq!(err.field(), Some("limit"));

    let err = engine
        .search_memories("", "u1", MemoryFilter::default(), options(10, 0.5))
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("query"));

    let err = engine
        .search_entities("rust", "u1", None, options(10, 2.0))
        .await
        .unwrap_err();
    assert_eq!(err.field(), Some("threshold"));
}
