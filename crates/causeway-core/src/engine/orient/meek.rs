//! Meek rules for CPDAGs.
//!
//! Undecided edges are `o-o` while the closure runs. Each rule is checked at an
//! ordered anchor and proposes the two marks of one directed edge.

use crate::engine::graph::{Endpoint, Graph, NodeId, TripleState};
use crate::engine::orient::{Mark, Marks};

fn undirected(g: &Graph, a: NodeId, b: NodeId) -> bool {
    g.endpoint(a, b) == Some(Endpoint::Circle) && g.endpoint(b, a) == Some(Endpoint::Circle)
}

fn blocked(g: &Graph, x: NodeId, y: NodeId, z: NodeId) -> bool {
    matches!(
        g.triple_state(x, y, z),
        Some(TripleState::Ambiguous) | Some(TripleState::Collider)
    )
}

/// R1: `a --> b o-o c`, `a` and `c` not adjacent, orient `b --> c`.
pub(super) fn r1(g: &Graph, b: NodeId, c: NodeId) -> Option<Marks> {
    if !undirected(g, b, c) {
        return None;
    }
    g.adjacent_nodes(b)
        .iter()
        .any(|&a| a != c && g.is_directed_from_to(a, b) && !g.is_adjacent(a, c) && !blocked(g, a, b, c))
        .then(|| Mark::directed(b, c))
}

/// R2: `a --> b --> c` and `a o-o c`, orient `a --> c`.
pub(super) fn r2(g: &Graph, a: NodeId, c: NodeId) -> Option<Marks> {
    if !undirected(g, a, c) {
        return None;
    }
    g.adjacent_nodes(a)
        .iter()
        .any(|&b| b != c && g.is_directed_from_to(a, b) && g.is_directed_from_to(b, c))
        .then(|| Mark::directed(a, c))
}

/// R3: `a o-o c --> b <-- d o-o a`, `c` and `d` not adjacent, and `a o-o b`;
/// orient `a --> b`.
pub(super) fn r3(g: &Graph, a: NodeId, b: NodeId) -> Option<Marks> {
    if !undirected(g, a, b) {
        return None;
    }
    let candidates: Vec<NodeId> = g
        .adjacent_nodes(b)
        .iter()
        .copied()
        .filter(|&c| c != a && g.is_directed_from_to(c, b) && undirected(g, a, c))
        .collect();
    for (i, &c) in candidates.iter().enumerate() {
        for &d in &candidates[i + 1..] {
            if !g.is_adjacent(c, d) && g.triple_state(c, a, d) != Some(TripleState::Ambiguous) {
                return Some(Mark::directed(a, b));
            }
        }
    }
    None
}

/// R4: `a o-o b`, `a o-o c`, `c --> d --> b`, `a` adjacent to `d` and `c`
/// not adjacent to `b`; orient `a --> b`.
///
/// Only fires when background knowledge has oriented edges that the other
/// three rules cannot produce on their own.
pub(super) fn r4(g: &Graph, a: NodeId, b: NodeId) -> Option<Marks> {
    if !undirected(g, a, b) {
        return None;
    }
    for &d in g.adjacent_nodes(a) {
        if d == b || !g.is_directed_from_to(d, b) {
            continue;
        }
        let found = g
            .adjacent_nodes(d)
            .iter()
            .any(|&c| c != a && c != b && g.is_directed_from_to(c, d) && undirected(g, a, c) && !g.is_adjacent(c, b));
        if found {
            return Some(Mark::directed(a, b));
        }
    }
    None
}
