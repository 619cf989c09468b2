//! FCI orientation rules over circle marks.
//!
//! Notation follows the usual PAG conventions: `*` is any mark, `a *-> b`
//! puts an Arrow at `b`, `a *-o b` a Circle at `b`. Each rule is checked at an
//! ordered anchor `(a, b)` and returns the marks it would commit.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::collections::VecDeque;

use crate::engine::graph::{Endpoint, Graph, NodeId, TripleState};
use crate::engine::orient::{DiscriminatingPathPolicy, Finding, Mark, Marks, Requeries, RuleContext};

fn mark_at(g: &Graph, node: NodeId, toward: NodeId, mark: Endpoint) -> bool {
    g.endpoint(node, toward) == Some(mark)
}

fn arrow_at(g: &Graph, node: NodeId, toward: NodeId) -> bool {
    mark_at(g, node, toward, Endpoint::Arrow)
}

fn circle_at(g: &Graph, node: NodeId, toward: NodeId) -> bool {
    mark_at(g, node, toward, Endpoint::Circle)
}

fn common_neighbors(g: &Graph, a: NodeId, b: NodeId) -> impl Iterator<Item = NodeId> + '_ {
    g.adjacent_nodes(a)
        .iter()
        .copied()
        .filter(move |&n| n != b && g.is_adjacent(n, b))
}

/// `a o-> c`
fn partially_oriented(g: &Graph, a: NodeId, c: NodeId) -> bool {
    circle_at(g, a, c) && arrow_at(g, c, a)
}

/// The step `from` to `to` could be part of a potentially directed path.
fn potentially_directed(g: &Graph, from: NodeId, to: NodeId) -> bool {
    g.endpoint(from, to).is_some_and(|m| m != Endpoint::Arrow)
        && g.endpoint(to, from).is_some_and(|m| m != Endpoint::Tail)
}

fn tail_into(b: NodeId, c: NodeId) -> Marks {
    SmallVec::from_slice(&[Mark::tail(b, c), Mark::arrow(c, b)])
}

/// R1: `a *-> b o-* c`, `a` and `c` not adjacent, orient `b --> c`.
///
/// Only fires on a triple annotated as a non-collider. A triple the collider
/// phase left undecided (no sepset for `a`-`c`) stays open.
pub(super) fn r1(g: &Graph, b: NodeId, c: NodeId) -> Option<Marks> {
    if !circle_at(g, b, c) {
        return None;
    }
    g.adjacent_nodes(b)
        .iter()
        .any(|&a| {
            a != c
                && arrow_at(g, b, a)
                && !g.is_adjacent(a, c)
                && g.triple_state(a, b, c) == Some(TripleState::NonCollider)
        })
        .then(|| tail_into(b, c))
}

/// R2: `a --> b *-> c` or `a *-> b --> c`, with `a *-o c`; orient `a *-> c`.
pub(super) fn r2(g: &Graph, a: NodeId, c: NodeId) -> Option<Marks> {
    if !circle_at(g, c, a) {
        return None;
    }
    common_neighbors(g, a, c)
        .any(|b| {
            (g.is_directed_from_to(a, b) && arrow_at(g, c, b))
                || (arrow_at(g, b, a) && g.is_directed_from_to(b, c))
        })
        .then(|| SmallVec::from_slice(&[Mark::arrow(c, a)]))
}

/// R3: `a *-> b <-* c`, `a *-o d o-* c`, `a` and `c` not adjacent, `d *-o b`;
/// orient `d *-> b`.
pub(super) fn r3(g: &Graph, d: NodeId, b: NodeId) -> Option<Marks> {
    if !circle_at(g, b, d) {
        return None;
    }
    let sides: Vec<NodeId> = common_neighbors(g, b, d)
        .filter(|&n| arrow_at(g, b, n) && circle_at(g, d, n))
        .collect();
    for (i, &a) in sides.iter().enumerate() {
        for &c in &sides[i + 1..] {
            if !g.is_adjacent(a, c) {
                return Some(SmallVec::from_slice(&[Mark::arrow(b, d)]));
            }
        }
    }
    None
}

/// R4, the discriminating-path rule, anchored at `b o-* c`.
///
/// For a discriminating path `<d, ..., a, b, c>` the triple at `b` is decided
/// by the configured policy: a non-collider orients `b --> c`, a collider
/// orients `a <-> b <-> c`.
pub(super) fn r4(g: &Graph, ctx: &RuleContext<'_>, b: NodeId, c: NodeId) -> Option<Finding> {
    if !circle_at(g, b, c) {
        return None;
    }
    for a in common_neighbors(g, b, c) {
        if !(g.is_directed_from_to(a, c) && arrow_at(g, a, b)) {
            continue;
        }
        let Some(path) = discriminating_path(g, a, b, c, ctx.max_discriminating_path_length) else {
            continue;
        };
        let d = path[0];
        let interior = &path[1..];
        let (verdict, queries) = decide(ctx, d, b, c, interior);
        let finding = match verdict {
            Some(true) => Finding::Orient(SmallVec::from_slice(&[
                Mark::arrow(b, a),
                Mark::arrow(b, c),
                Mark::arrow(c, b),
            ])),
            Some(false) => Finding::Orient(tail_into(b, c)),
            None => Finding::Unresolved { b, c },
        };
        return Some(match queries {
            Some(queries) => Finding::Requeried {
                queries,
                then: Box::new(finding),
            },
            None => finding,
        });
    }
    None
}

/// `Some(true)` for a collider at `b`, `Some(false)` for a non-collider,
/// with the oracle calls made for `d`-`c` when the policy re-queries.
///
/// A failed call leaves the triple undecided and skips the second test.
fn decide(
    ctx: &RuleContext<'_>,
    d: NodeId,
    b: NodeId,
    c: NodeId,
    interior: &[NodeId],
) -> (Option<bool>, Option<Requeries>) {
    match (ctx.discriminating_paths, ctx.oracle) {
        (DiscriminatingPathPolicy::Requery, Some(oracle)) => {
            let mut queries = Requeries::new(d, c);
            let mut z: Vec<NodeId> = interior.to_vec();
            z.sort_unstable();
            let verdict = match queries.ask(oracle, &z) {
                Some(true) => Some(true),
                Some(false) => {
                    z.push(b);
                    z.sort_unstable();
                    queries.ask(oracle, &z).and_then(|independent| independent.then_some(false))
                }
                None => None,
            };
            (verdict, Some(queries))
        }
        _ => (ctx.sepsets.separates(d, c, b).map(|contains_b| !contains_b), None),
    }
}

/// Finds a discriminating path `<d, ..., a, b, c>` for `b`.
///
/// Every node from the one after `d` up to `a` is a collider on the path and
/// a parent of `c`, and `d` is not adjacent to `c`. The caller has checked
/// that `a --> c` and `a <-* b`. Breadth-first from `a`, so the shortest such
/// path is returned, listed from `d` to `a`. `max_length` bounds the node
/// count of the whole path including `b` and `c`.
pub(crate) fn discriminating_path(
    g: &Graph,
    a: NodeId,
    b: NodeId,
    c: NodeId,
    max_length: Option<usize>,
) -> Option<Vec<NodeId>> {
    let fits = |nodes: usize| max_length.map_or(true, |max| nodes <= max);
    // Successor of each queued node towards b, and its node count to c
    let mut next: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    let mut length: FxHashMap<NodeId, usize> = FxHashMap::default();
    let mut visited: FxHashSet<NodeId> = [a, b, c].into_iter().collect();
    let mut queue = VecDeque::from([a]);
    next.insert(a, b);
    length.insert(a, 3);

    while let Some(v) = queue.pop_front() {
        let here = length.get(&v).copied().unwrap_or(usize::MAX);
        if !fits(here.saturating_add(1)) {
            continue;
        }
        for &u in g.adjacent_nodes(v) {
            if visited.contains(&u) || !arrow_at(g, v, u) {
                continue;
            }
            if !g.is_adjacent(u, c) {
                let mut path = vec![u, v];
                let mut cursor = v;
                while cursor != a {
                    cursor = *next.get(&cursor)?;
                    path.push(cursor);
                }
                return Some(path);
            }
            if g.is_directed_from_to(u, c) && arrow_at(g, u, v) {
                visited.insert(u);
                next.insert(u, v);
                length.insert(u, here + 1);
                queue.push_back(u);
            }
        }
    }
    None
}

/// R8: `a --> b --> c` or `a -o b --> c`, with `a o-> c`; orient `a --> c`.
pub(super) fn r8(g: &Graph, a: NodeId, c: NodeId) -> Option<Marks> {
    if !partially_oriented(g, a, c) {
        return None;
    }
    common_neighbors(g, a, c)
        .any(|b| {
            let into_b = g.is_directed_from_to(a, b)
                || (mark_at(g, a, b, Endpoint::Tail) && circle_at(g, b, a));
            into_b && g.is_directed_from_to(b, c)
        })
        .then(|| SmallVec::from_slice(&[Mark::tail(a, c)]))
}

/// R9: `a o-> c` and an uncovered potentially directed path `<a, b, ..., c>`
/// with `b` not adjacent to `c`; orient `a --> c`.
pub(super) fn r9(g: &Graph, a: NodeId, c: NodeId) -> Option<Marks> {
    if !partially_oriented(g, a, c) {
        return None;
    }
    g.adjacent_nodes(a)
        .iter()
        .any(|&b| {
            b != c
                && !g.is_adjacent(b, c)
                && potentially_directed(g, a, b)
                && uncovered_pd_path(g, a, b, c, None)
        })
        .then(|| SmallVec::from_slice(&[Mark::tail(a, c)]))
}

/// R10: `a o-> c`, `b --> c <-- d`, and uncovered potentially directed paths
/// from `a` to `b` and from `a` to `d` whose second nodes are distinct and
/// not adjacent; orient `a --> c`.
pub(super) fn r10(g: &Graph, a: NodeId, c: NodeId) -> Option<Marks> {
    if !partially_oriented(g, a, c) {
        return None;
    }
    let parents: Vec<NodeId> = g.parents(c).into_iter().filter(|&p| p != a).collect();
    if parents.len() < 2 {
        return None;
    }
    let first_steps = |target: NodeId| -> Vec<NodeId> {
        g.adjacent_nodes(a)
            .iter()
            .copied()
            .filter(|&mu| {
                mu != c
                    && potentially_directed(g, a, mu)
                    && (mu == target || uncovered_pd_path(g, a, mu, target, Some(c)))
            })
            .collect()
    };
    for (i, &b) in parents.iter().enumerate() {
        let via_b = first_steps(b);
        if via_b.is_empty() {
            continue;
        }
        for &d in &parents[i + 1..] {
            let via_d = first_steps(d);
            let fires = via_b
                .iter()
                .any(|&mu| via_d.iter().any(|&omega| mu != omega && !g.is_adjacent(mu, omega)));
            if fires {
                return Some(SmallVec::from_slice(&[Mark::tail(a, c)]));
            }
        }
    }
    None
}

/// Whether an uncovered potentially directed simple path
/// `<start, first, ..., target>` exists, avoiding `avoid`.
///
/// The caller has checked the step from `start` to `first`.
fn uncovered_pd_path(g: &Graph, start: NodeId, first: NodeId, target: NodeId, avoid: Option<NodeId>) -> bool {
    if first == target {
        return true;
    }
    let mut path = vec![start, first];
    let mut on_path: FxHashSet<NodeId> = path.iter().copied().collect();
    let mut cursor: Vec<usize> = vec![0];

    while let Some(pos) = cursor.last_mut() {
        let node = path[path.len() - 1];
        let prev = path[path.len() - 2];
        let neighbors = g.adjacent_nodes(node);
        if *pos >= neighbors.len() {
            cursor.pop();
            if let Some(done) = path.pop() {
                on_path.remove(&done);
            }
            if path.len() < 2 {
                break;
            }
            continue;
        }
        let step = neighbors[*pos];
        *pos += 1;
        if on_path.contains(&step)
            || Some(step) == avoid
            || g.is_adjacent(prev, step)
            || !potentially_directed(g, node, step)
        {
            continue;
        }
        if step == target {
            return true;
        }
        path.push(step);
        on_path.insert(step);
        cursor.push(0);
    }
    false
}
