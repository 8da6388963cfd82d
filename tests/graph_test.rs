mod helpers;

use std::collections::{HashMap, HashSet, VecDeque};

use helpers::{entity, relate, test_db};
use mneme::memory::graph::{find_path, get_neighbors, traverse, TraversalOptions};
use mneme::memory::types::{Direction, Entity, EntityType};
use rusqlite::Connection;

const NODES: usize = 40;

/// A fixed pseudo-random graph: a sparse ring with chords and a few hubs.
fn edges() -> Vec<(usize, usize, &'static str)> {
    let mut out = Vec::new();
    for i in 0..NODES {
        if i % 4 != 3 {
            out.push((i, (i + 1) % NODES, "next"));
        }
        let chord = (i * 7 + 3) % NODES;
        if chord != i && i % 3 == 0 {
            out.push((i, chord, "chord"));
        }
    }
    out.push((10, 0, "hub"));
    out.push((25, 0, "hub"));
    out
}

struct Fixture {
    conn: Connection,
    nodes: Vec<Entity>,
}

fn fixture() -> Fixture {
    let conn = test_db();
    let nodes: Vec<Entity> = (0..NODES)
        .map(|i| entity(&conn, "u1", EntityType::Concept, &format!("n{i:02}")))
        .collect();
    for (s, t, kind) in edges() {
        relate(&conn, "u1", &nodes[s], kind, &nodes[t]);
    }
    Fixture { conn, nodes }
}

/// Hop distances from `start`, computed independently of the store.
fn reference_depths(start: usize, direction: Direction, max_depth: usize) -> HashMap<usize, usize> {
    let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
    for (s, t, _) in edges() {
        if direction.follows_outgoing() {
            adjacency.entry(s).or_default().push(t);
        }
        if direction.follows_incoming() {
            adjacency.entry(t).or_default().push(s);
        }
    }

    let mut depths = HashMap::from([(start, 0)]);
    let mut queue = VecDeque::from([start]);
    while let Some(node) = queue.pop_front() {
        let d = depths[&node];
        if d == max_depth {
            continue;
        }
        for &next in adjacency.get(&node).into_iter().flatten() {
            if !depths.contains_key(&next) {
                depths.insert(next, d + 1);
                queue.push_back(next);
            }
        }
    }
    depths
}

fn index_of(fx: &Fixture, id: &str) -> usize {
    fx.nodes.iter().position(|e| e.id == id).unwrap()
}

fn options(depth: usize, direction: Direction) -> TraversalOptions {
    TraversalOptions {
        depth,
        direction,
        relation_types: None,
        limit: 1000,
    }
}

#[test]
fn depths_match_shortest_hops_in_every_direction() {
    let fx = fixture();
    for direction in [Direction::Outgoing, Direction::Incoming, Direction::Both] {
        for depth in 1..=5 {
            let result = traverse(&fx.conn, &fx.nodes[0].id, "u1", &options(depth, direction)).unwrap();
            let expected = reference_depths(0, direction, depth);

            let got: HashMap<usize, usize> = result
                .nodes
                .iter()
                .map(|n| (index_of(&fx, &n.entity.id), n.depth))
                .collect();
            assert_eq!(got, expected, "direction {direction:?}, depth {depth}");
            assert!(!result.truncated);
        }
    }
}

#[test]
fn deeper_walks_only_add_nodes() {
    let fx = fixture();
    let mut previous: HashSet<String> = HashSet::new();
    for depth in 1..=5 {
        let result = traverse(&fx.conn, &fx.nodes[5].id, "u1", &options(depth, Direction::Both)).unwrap();
        let ids: HashSet<String> = result.nodes.iter().map(|n| n.entity.id.clone()).collect();
        assert!(previous.is_subset(&ids));
        previous = ids;
    }
}

#[test]
fn every_path_walks_real_edges() {
    let fx = fixture();
    let result = traverse(&fx.conn, &fx.nodes[0].id, "u1", &options(4, Direction::Both)).unwrap();

    let undirected: HashSet<(usize, usize)> = edges()
        .into_iter()
        .flat_map(|(s, t, _)| [(s, t), (t, s)])
        .collect();

    for node in &result.nodes {
        assert_eq!(node.path.len(), node.depth + 1);
        assert_eq!(node.path.first(), Some(&fx.nodes[0].id));
        assert_eq!(node.path.last(), Some(&node.entity.id));
        for hop in node.path.windows(2) {
            let pair = (index_of(&fx, &hop[0]), index_of(&fx, &hop[1]));
            assert!(undirected.contains(&pair), "no edge for hop {pair:?}");
        }
    }
}

#[test]
fn sub_graph_covers_relations_between_discovered_nodes() {
    let fx = fixture();
    let result = traverse(&fx.conn, &fx.nodes[0].id, "u1", &options(2, Direction::Outgoing)).unwrap();

    let found: HashSet<usize> = result.nodes.iter().map(|n| index_of(&fx, &n.entity.id)).collect();
    let expected = edges()
        .into_iter()
        .filter(|(s, t, _)| found.contains(s) && found.contains(t))
        .count();
    assert_eq!(result.sub_graph.relations.len(), expected);
    assert_eq!(result.sub_graph.entities.len(), found.len());
}

#[test]
fn limit_bounds_exploration() {
    let fx = fixture();
    for limit in [1, 2, 5, 9] {
        let mut opts = options(5, Direction::Both);
        opts.limit = limit;
        let result = traverse(&fx.conn, &fx.nodes[0].id, "u1", &opts).unwrap();

        assert_eq!(result.nodes.len(), limit);
        assert!(result.truncated);
        assert_eq!(result.nodes[0].entity.id, fx.nodes[0].id);
        for pair in result.nodes.windows(2) {
            assert!(pair[0].depth <= pair[1].depth);
        }
    }
}

#[test]
fn relation_type_filter_restricts_the_walk() {
    let fx = fixture();
    let mut opts = options(5, Direction::Outgoing);
    opts.relation_types = Some(vec!["next".into()]);
    let result = traverse(&fx.conn, &fx.nodes[0].id, "u1", &opts).unwrap();

    // Ring edges only: 0 -> 1 -> 2 -> 3 and 3 has no outgoing "next".
    let names: Vec<&str> = result.nodes.iter().map(|n| n.entity.name.as_str()).collect();
    assert_eq!(names, vec!["n00", "n01", "n02", "n03"]);
}

#[test]
fn shortest_paths_agree_with_reference() {
    let fx = fixture();
    let reachable = reference_depths(0, Direction::Both, 5);

    for target in 1..NODES {
        let path = find_path(&fx.conn, &fx.nodes[0].id, &fx.nodes[target].id, "u1", 5).unwrap();
        match reachable.get(&target) {
            Some(&hops) => {
                let path = path.unwrap();
                assert_eq!(path.nodes.len(), hops + 1, "target n{target:02}");
                assert_eq!(path.nodes.last().unwrap().entity.id, fx.nodes[target].id);
                assert!(path.sub_graph.relations.len() >= hops);
            }
            None => assert!(path.is_none()),
        }
    }
}

#[test]
fn neighbors_are_exactly_at_depth() {
    let fx = fixture();
    let reference = reference_depths(7, Direction::Both, 3);
    for depth in 1..=3 {
        let result = get_neighbors(&fx.conn, &fx.nodes[7].id, "u1", depth).unwrap();
        let got: HashSet<usize> = result.nodes.iter().map(|n| index_of(&fx, &n.entity.id)).collect();
        let expected: HashSet<usize> = reference
            .iter()
            .filter(|(_, d)| **d == depth)
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(got, expected, "depth {depth}");
    }
}

#[test]
fn other_owners_are_invisible() {
    let fx = fixture();
    let stranger = entity(&fx.conn, "u2", EntityType::Concept, "n00");
    let other = entity(&fx.conn, "u2", EntityType::Concept, "elsewhere");
    relate(&fx.conn, "u2", &stranger, "next", &other);

    let result = traverse(&fx.conn, &fx.nodes[0].id, "u2", &options(3, Direction::Both)).unwrap();
    assert!(result.nodes.is_empty());

    let result = traverse(&fx.conn, &stranger.id, "u2", &options(3, Direction::Both)).unwrap();
    assert_eq!(result.nodes.len(), 2);

    assert!(find_path(&fx.conn, &fx.nodes[0].id, &other.id, "u1", 5).unwrap().is_none());
}
