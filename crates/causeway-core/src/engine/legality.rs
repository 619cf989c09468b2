//! # Legality Checks
//!
//! Validates a finished graph against the definition of its representation
//! and returns the first violation as a single actionable counterexample.
//!
//! PAG checks, cheapest first:
//!
//! 1. no `---` edge
//! 2. no directed cycle, then no almost-directed cycle (`a <-> b` with `a` an
//!    ancestor of `b`)
//! 3. every unshielded definite collider agrees with its triple annotation
//!    and, when sepsets are supplied, with the separating set of its outer
//!    nodes
//! 4. every decided discriminating-path triple agrees with the separating set
//!    of the path's end points

use crate::engine::graph::{Endpoint, Graph, NodeId, TripleState};
use crate::engine::orient::discriminating_path;
use crate::engine::sepset::SepsetMap;

/// Outcome of a legality check.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LegalityReport {
    pub legal: bool,
    /// Empty when legal
    pub reason: String,
    /// Nodes of the counterexample
    pub nodes: Vec<NodeId>,
}

impl LegalityReport {
    pub fn legal() -> Self {
        Self {
            legal: true,
            reason: String::new(),
            nodes: Vec::new(),
        }
    }

    fn violation(reason: String, nodes: Vec<NodeId>) -> Self {
        Self {
            legal: false,
            reason,
            nodes,
        }
    }
}

/// Checks `graph` against the definition of a legal PAG.
pub fn is_legal_pag(graph: &Graph, sepsets: Option<&SepsetMap>) -> LegalityReport {
    undirected_edge(graph)
        .or_else(|| cycles(graph))
        .or_else(|| colliders(graph, sepsets))
        .or_else(|| discriminated_triples(graph, sepsets))
        .unwrap_or_else(LegalityReport::legal)
}

/// Checks that `graph` is a CPDAG-shaped result: only `-->` and `---` edges
/// and no directed cycle.
pub fn is_legal_cpdag(graph: &Graph) -> LegalityReport {
    for edge in graph.edges() {
        if !(edge.is_directed() || edge.is_undirected()) {
            return LegalityReport::violation(
                format!("non-CPDAG edge present: {}", graph.describe_edge(edge)),
                vec![edge.node1, edge.node2],
            );
        }
    }
    directed_cycle(graph).unwrap_or_else(LegalityReport::legal)
}

fn undirected_edge(graph: &Graph) -> Option<LegalityReport> {
    graph.edges().into_iter().find(|e| e.is_undirected()).map(|edge| {
        LegalityReport::violation(
            format!("undirected edge present: {}", graph.describe_edge(edge)),
            vec![edge.node1, edge.node2],
        )
    })
}

fn directed_cycle(graph: &Graph) -> Option<LegalityReport> {
    if !graph.exists_directed_cycle() {
        return None;
    }
    let witness = graph.edges().into_iter().find_map(|edge| {
        let (from, to) = match (edge.endpoint1, edge.endpoint2) {
            (Endpoint::Tail, Endpoint::Arrow) => (edge.node1, edge.node2),
            (Endpoint::Arrow, Endpoint::Tail) => (edge.node2, edge.node1),
            _ => return None,
        };
        graph.exists_directed_path(to, from).then_some((from, to))
    });
    let (from, to) = witness?;
    Some(LegalityReport::violation(
        format!(
            "directed cycle through {} --> {}",
            graph.label(from),
            graph.label(to)
        ),
        vec![from, to],
    ))
}

fn cycles(graph: &Graph) -> Option<LegalityReport> {
    if let Some(report) = directed_cycle(graph) {
        return Some(report);
    }
    graph
        .edges()
        .into_iter()
        .filter(|e| e.is_bidirected())
        .find_map(|edge| {
            let (a, b) = (edge.node1, edge.node2);
            let ancestor = if graph.exists_directed_path(a, b) {
                Some((a, b))
            } else if graph.exists_directed_path(b, a) {
                Some((b, a))
            } else {
                None
            };
            ancestor.map(|(anc, desc)| {
                LegalityReport::violation(
                    format!(
                        "almost directed cycle: {} <-> {} with {} an ancestor of {}",
                        graph.label(a),
                        graph.label(b),
                        graph.label(anc),
                        graph.label(desc)
                    ),
                    vec![anc, desc],
                )
            })
        })
}

fn colliders(graph: &Graph, sepsets: Option<&SepsetMap>) -> Option<LegalityReport> {
    for (x, y, z) in graph.unshielded_triples() {
        if !graph.is_def_collider(x, y, z) {
            continue;
        }
        let names = || format!("{} *-> {} <-* {}", graph.label(x), graph.label(y), graph.label(z));
        match graph.triple_state(x, y, z) {
            Some(TripleState::NonCollider) => {
                return Some(LegalityReport::violation(
                    format!("collider {} is marked as a non-collider", names()),
                    vec![x, y, z],
                ));
            }
            Some(TripleState::Ambiguous) => {
                return Some(LegalityReport::violation(
                    format!("collider {} is marked ambiguous", names()),
                    vec![x, y, z],
                ));
            }
            _ => {}
        }
        if sepsets.and_then(|s| s.separates(x, z, y)) == Some(true) {
            return Some(LegalityReport::violation(
                format!(
                    "collider {} but {} separates {} and {}",
                    names(),
                    graph.label(y),
                    graph.label(x),
                    graph.label(z)
                ),
                vec![x, y, z],
            ));
        }
    }
    None
}

fn discriminated_triples(graph: &Graph, sepsets: Option<&SepsetMap>) -> Option<LegalityReport> {
    let sepsets = sepsets?;
    for b in graph.node_ids() {
        for &c in graph.adjacent_nodes(b) {
            for &a in graph.adjacent_nodes(b) {
                if a == c || !graph.is_adjacent(a, c) {
                    continue;
                }
                if !(graph.is_directed_from_to(a, c) && graph.endpoint(a, b) == Some(Endpoint::Arrow)) {
                    continue;
                }
                let Some(path) = discriminating_path(graph, a, b, c, None) else {
                    continue;
                };
                let d = path[0];
                let Some(contains_b) = sepsets.separates(d, c, b) else {
                    continue;
                };
                let decided = decided_triple(graph, a, b, c);
                let contradiction = match decided {
                    Some(TripleState::Collider) => contains_b,
                    Some(TripleState::NonCollider) => !contains_b,
                    _ => false,
                };
                if contradiction {
                    return Some(LegalityReport::violation(
                        format!(
                            "discriminating path from {} makes {} - {} - {} a {}, found the opposite",
                            graph.label(d),
                            graph.label(a),
                            graph.label(b),
                            graph.label(c),
                            if contains_b { "non-collider" } else { "collider" }
                        ),
                        vec![d, a, b, c],
                    ));
                }
            }
        }
    }
    None
}

/// Collider if both marks at `b` are arrows, non-collider if either is a
/// tail, otherwise undecided.
fn decided_triple(graph: &Graph, a: NodeId, b: NodeId, c: NodeId) -> Option<TripleState> {
    let (at_a, at_c) = (graph.endpoint(b, a)?, graph.endpoint(b, c)?);
    if at_a == Endpoint::Arrow && at_c == Endpoint::Arrow {
        Some(TripleState::Collider)
    } else if at_a == Endpoint::Tail || at_c == Endpoint::Tail {
        Some(TripleState::NonCollider)
    } else {
        None
    }
}
