//! Assertions over a desired-state graph
//!
//! These panic with a readable message on mismatch, so they belong in
//! tests. Production code validates graphs through [`crate::ExecutionPlan`].

use crate::graph::DesiredStateGraph;
use crate::resource::{Identity, Resource};

/// Assert that a resource is declared, returning it
#[track_caller]
pub fn assert_resource_exists<'g>(
    graph: &'g DesiredStateGraph,
    identity: &Identity,
) -> &'g Resource {
    match graph.get(identity) {
        Some(resource) => resource,
        None => panic!(
            "expected {identity} to be declared; graph has: {}",
            declared(graph)
        ),
    }
}

/// Assert that a resource is not declared
#[track_caller]
pub fn assert_resource_absent(graph: &DesiredStateGraph, identity: &Identity) {
    assert!(
        !graph.contains(identity),
        "expected {identity} not to be declared"
    );
}

/// Assert that a resource carries at least the given attributes
///
/// Values are compared as rendered by [`Resource::attribute_map`].
#[track_caller]
pub fn assert_resource_has_attributes(
    graph: &DesiredStateGraph,
    identity: &Identity,
    expected: &[(&str, &str)],
) {
    let attributes = assert_resource_exists(graph, identity).attribute_map();
    for (key, value) in expected {
        match attributes.get(*key) {
            Some(actual) if actual == value => {}
            Some(actual) => panic!("{identity}: expected {key} = {value:?}, found {actual:?}"),
            None => panic!("{identity}: expected {key} = {value:?}, attribute not set"),
        }
    }
}

/// Assert that a direct edge `before -> after` exists
#[track_caller]
pub fn assert_edge_exists(graph: &DesiredStateGraph, before: &Identity, after: &Identity) {
    assert_resource_exists(graph, before);
    assert_resource_exists(graph, after);
    assert!(
        graph.has_edge(before, after),
        "expected an edge {before} -> {after}"
    );
}

/// Assert that `before` is ordered ahead of `after`, directly or transitively
#[track_caller]
pub fn assert_precedes(graph: &DesiredStateGraph, before: &Identity, after: &Identity) {
    assert_resource_exists(graph, before);
    assert_resource_exists(graph, after);
    assert!(
        graph.precedes(before, after),
        "expected {before} to come before {after}"
    );
}

fn declared(graph: &DesiredStateGraph) -> String {
    graph
        .resources()
        .iter()
        .map(|r| r.identity.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
