//! # Collider Discovery
//!
//! Decides every unshielded triple `<x, y, z>` of a skeleton as a collider, a
//! non-collider or ambiguous, records the decision as a triple annotation on
//! the graph and orients the colliders.
//!
//! ## Policies
//!
//! - **Sepsets**: collider iff `y` is not in the separating set recorded for
//!   `x` and `z`. Triples whose outer pair has no record are skipped.
//! - **Conservative**: every subset of `adj(x) \ {z}` and `adj(z) \ {x}` up to
//!   the depth bound is tested. `y` in every separating subset makes a
//!   non-collider, `y` in none makes a collider, anything else is ambiguous.
//! - **MaxP**: same enumeration; the separating subset with the largest
//!   p-value decides.
//!
//! All triples are decided against the unoriented skeleton before anything
//! is committed, so decisions do not depend on orientation order. Colliders
//! are then committed in triple order through the [`MarkGuard`]; a collider
//! that conflicts with an earlier one or with knowledge is logged and
//! skipped.

use rustc_hash::FxHashSet;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::engine::errors::{CausalError, OracleError};
use crate::engine::graph::{Graph, NodeId, TripleState};
use crate::engine::oracle::IndependenceOracle;
use crate::engine::orient::{Mark, MarkGuard, Marks, OrientationMode, Verdict};
use crate::engine::sepset::SepsetMap;
use crate::engine::subsets::Subsets;

/// How unshielded triples are decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ColliderDiscovery {
    #[default]
    Sepsets,
    Conservative,
    MaxP,
}

impl ColliderDiscovery {
    fn needs_oracle(self) -> bool {
        self != ColliderDiscovery::Sepsets
    }
}

/// Counts of the decisions taken by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColliderSummary {
    pub colliders: usize,
    pub non_colliders: usize,
    pub ambiguous: usize,
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct TripleOutcome {
    decision: Option<TripleState>,
    tests: usize,
    failures: Vec<(Vec<NodeId>, OracleError)>,
}

/// Phase A of the orientation: decides and orients unshielded triples.
pub struct ColliderOrienter<'a> {
    guard: MarkGuard<'a>,
    policy: ColliderDiscovery,
    oracle: Option<&'a dyn IndependenceOracle>,
    max_depth: Option<usize>,
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    parallel: bool,
}

impl<'a> ColliderOrienter<'a> {
    pub fn new(guard: MarkGuard<'a>) -> Self {
        Self {
            guard,
            policy: ColliderDiscovery::Sepsets,
            oracle: None,
            max_depth: None,
            parallel: true,
        }
    }

    /// Conservative and MaxP decisions query `oracle`.
    pub fn with_policy(mut self, policy: ColliderDiscovery, oracle: Option<&'a dyn IndependenceOracle>) -> Self {
        self.policy = policy;
        self.oracle = oracle;
        self
    }

    /// Largest conditioning set tested by the oracle-backed policies;
    /// negative means unbounded.
    pub fn with_max_depth(mut self, depth: i32) -> Self {
        self.max_depth = usize::try_from(depth).ok();
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn run(
        &self,
        graph: &mut Graph,
        sepsets: &SepsetMap,
        diagnostics: &mut Diagnostics,
    ) -> Result<ColliderSummary, CausalError> {
        if self.policy.needs_oracle() && self.oracle.is_none() {
            return Err(CausalError::Input(format!(
                "{:?} collider discovery needs an independence oracle",
                self.policy
            )));
        }

        let triples = graph.unshielded_triples();
        let outcomes = self.decide_all(graph, sepsets, &triples);
        let mut summary = ColliderSummary::default();

        for (&(x, y, z), outcome) in triples.iter().zip(outcomes) {
            diagnostics.count_tests(outcome.tests);
            for (conditioning, error) in outcome.failures {
                diagnostics.record(DiagnosticEvent::OracleFailure {
                    x,
                    y: z,
                    conditioning,
                    reason: error.reason,
                });
            }
            match outcome.decision {
                None => summary.skipped += 1,
                Some(TripleState::NonCollider) => {
                    graph.set_triple(x, y, z, TripleState::NonCollider);
                    diagnostics.record(DiagnosticEvent::NonCollider { x, y, z });
                    summary.non_colliders += 1;
                }
                Some(TripleState::Ambiguous) => {
                    graph.set_triple(x, y, z, TripleState::Ambiguous);
                    diagnostics.record(DiagnosticEvent::AmbiguousTriple { x, y, z });
                    summary.ambiguous += 1;
                }
                Some(TripleState::Collider) => match self.guard.try_commit(graph, &self.collider_marks(x, y, z))? {
                    Verdict::Apply | Verdict::NoOp => {
                        graph.set_triple(x, y, z, TripleState::Collider);
                        diagnostics.record(DiagnosticEvent::ColliderOriented { x, y, z });
                        summary.colliders += 1;
                    }
                    Verdict::Conflict { reason, .. } => {
                        diagnostics.record(DiagnosticEvent::ColliderSkipped { x, y, z, reason });
                        summary.skipped += 1;
                    }
                },
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            colliders = summary.colliders,
            non_colliders = summary.non_colliders,
            ambiguous = summary.ambiguous,
            skipped = summary.skipped,
            "collider discovery"
        );

        Ok(summary)
    }

    /// `x *-> y <-* z` in PAG mode, `x --> y <-- z` in CPDAG mode.
    fn collider_marks(&self, x: NodeId, y: NodeId, z: NodeId) -> Marks {
        let mut marks = Marks::new();
        marks.push(Mark::arrow(y, x));
        marks.push(Mark::arrow(y, z));
        if self.guard.mode() == OrientationMode::Cpdag {
            marks.push(Mark::tail(x, y));
            marks.push(Mark::tail(z, y));
        }
        marks
    }

    fn decide_all(
        &self,
        graph: &Graph,
        sepsets: &SepsetMap,
        triples: &[(NodeId, NodeId, NodeId)],
    ) -> Vec<TripleOutcome> {
        let decide = |&(x, y, z): &(NodeId, NodeId, NodeId)| self.decide(graph, sepsets, x, y, z);
        #[cfg(feature = "parallel")]
        if self.parallel && self.policy.needs_oracle() {
            return triples.par_iter().map(decide).collect();
        }
        triples.iter().map(decide).collect()
    }

    fn decide(&self, graph: &Graph, sepsets: &SepsetMap, x: NodeId, y: NodeId, z: NodeId) -> TripleOutcome {
        let recorded = || {
            sepsets.separates(x, z, y).map(|contains| {
                if contains {
                    TripleState::NonCollider
                } else {
                    TripleState::Collider
                }
            })
        };
        let oracle = match (self.policy, self.oracle) {
            (ColliderDiscovery::Sepsets, _) | (_, None) => {
                return TripleOutcome {
                    decision: recorded(),
                    ..TripleOutcome::default()
                }
            }
            (_, Some(oracle)) => oracle,
        };

        let mut outcome = TripleOutcome::default();
        let separating = self.separating_subsets(graph, oracle, x, z, &mut outcome);
        outcome.decision = match self.policy {
            ColliderDiscovery::Conservative => {
                let with_y = separating.iter().filter(|(s, _)| s.contains(&y)).count();
                if separating.is_empty() {
                    Some(TripleState::Ambiguous)
                } else if with_y == separating.len() {
                    Some(TripleState::NonCollider)
                } else if with_y == 0 {
                    Some(TripleState::Collider)
                } else {
                    Some(TripleState::Ambiguous)
                }
            }
            ColliderDiscovery::MaxP => {
                let mut best: Option<&(Vec<NodeId>, f64)> = None;
                for candidate in &separating {
                    if best.map_or(true, |b| candidate.1 > b.1) {
                        best = Some(candidate);
                    }
                }
                match best {
                    Some((set, _)) if set.contains(&y) => Some(TripleState::NonCollider),
                    Some(_) => Some(TripleState::Collider),
                    None => recorded(),
                }
            }
            ColliderDiscovery::Sepsets => recorded(),
        };
        outcome
    }

    /// Every subset of `adj(x) \ {z}` and of `adj(z) \ {x}` up to the depth
    /// bound that separates `x` and `z`, with its p-value, in test order.
    fn separating_subsets(
        &self,
        graph: &Graph,
        oracle: &dyn IndependenceOracle,
        x: NodeId,
        z: NodeId,
        outcome: &mut TripleOutcome,
    ) -> Vec<(Vec<NodeId>, f64)> {
        let side_x: Vec<NodeId> = graph.adjacent_nodes(x).iter().copied().filter(|&n| n != z).collect();
        let side_z: Vec<NodeId> = graph.adjacent_nodes(z).iter().copied().filter(|&n| n != x).collect();
        let widest = side_x.len().max(side_z.len());
        let depth = self.max_depth.map_or(widest, |d| d.min(widest));

        let mut seen: FxHashSet<Vec<NodeId>> = FxHashSet::default();
        let mut found = Vec::new();
        for k in 0..=depth {
            for side in [&side_x, &side_z] {
                for subset in Subsets::new(side, k) {
                    if !seen.insert(subset.clone()) {
                        continue;
                    }
                    outcome.tests += 1;
                    match oracle.test(x, z, &subset) {
                        Ok(result) if result.independent => found.push((subset, result.p_value)),
                        Ok(_) => {}
                        Err(error) => outcome.failures.push((subset, error)),
                    }
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::Edge;
    use crate::engine::knowledge::{Knowledge, KnowledgeIndex};
    use crate::engine::oracle::IndependenceResult;

    fn skeleton(names: &[&str], pairs: &[(&str, &str)]) -> Graph {
        let mut g = Graph::with_nodes(names.iter().copied()).unwrap();
        for (a, b) in pairs {
            let (a, b) = (g.node_by_name(a).unwrap(), g.node_by_name(b).unwrap());
            g.add_edge(Edge::nondirected(a, b)).unwrap();
        }
        g
    }

    #[test]
    fn sepsets_decide_colliders_and_non_colliders() {
        // A o-o B o-o C, B o-o D
        let mut g = skeleton(&["A", "B", "C", "D"], &[("A", "B"), ("B", "C"), ("B", "D")]);
        let (a, b, c, d) = (NodeId(0), NodeId(1), NodeId(2), NodeId(3));
        let mut sepsets = SepsetMap::new();
        sepsets.set(a, c, &[], 0.9);
        sepsets.set(a, d, &[b], 0.8);
        sepsets.set(c, d, &[b], 0.7);

        let knowledge = KnowledgeIndex::unconstrained();
        let mut diagnostics = Diagnostics::new();
        let summary = ColliderOrienter::new(MarkGuard::new(OrientationMode::Cpdag, &knowledge))
            .run(&mut g, &sepsets, &mut diagnostics)
            .unwrap();

        assert_eq!(summary.colliders, 1);
        assert_eq!(summary.non_colliders, 2);
        assert!(g.is_directed_from_to(a, b));
        assert!(g.is_directed_from_to(c, b));
        assert!(g.edge(b, d).unwrap().is_nondirected());
        assert_eq!(g.triple_state(c, b, a), Some(TripleState::Collider));
        assert_eq!(g.triple_state(a, b, d), Some(TripleState::NonCollider));
    }

    #[test]
    fn pag_colliders_only_add_arrowheads() {
        let mut g = skeleton(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
        let (a, b, c) = (NodeId(0), NodeId(1), NodeId(2));
        let mut sepsets = SepsetMap::new();
        sepsets.set(a, c, &[], 0.9);
        let knowledge = KnowledgeIndex::unconstrained();
        let mut diagnostics = Diagnostics::new();
        ColliderOrienter::new(MarkGuard::new(OrientationMode::Pag, &knowledge))
            .run(&mut g, &sepsets, &mut diagnostics)
            .unwrap();
        assert_eq!(g.describe_edge(g.edge(a, b).unwrap()), "A o-> B");
        assert_eq!(g.describe_edge(g.edge(b, c).unwrap()), "B <-o C");
    }

    #[test]
    fn knowledge_blocks_collider_and_is_logged() {
        let mut g = skeleton(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
        let (a, b, c) = (NodeId(0), NodeId(1), NodeId(2));
        let mut sepsets = SepsetMap::new();
        sepsets.set(a, c, &[], 0.9);
        let mut knowledge = Knowledge::new();
        knowledge.forbid("A", "B");
        let index = knowledge.resolve(&g).unwrap();
        let mut diagnostics = Diagnostics::new();
        let summary = ColliderOrienter::new(MarkGuard::new(OrientationMode::Cpdag, &index))
            .run(&mut g, &sepsets, &mut diagnostics)
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(g.edge(a, b).unwrap().is_nondirected());
        assert!(g.edge(b, c).unwrap().is_nondirected());
        assert_eq!(diagnostics.conflicts().count(), 1);
    }

    /// A and C are independent given {} and given {B}: unfaithful to any
    /// single decision at B.
    struct Unfaithful {
        names: Vec<String>,
    }

    impl IndependenceOracle for Unfaithful {
        fn variables(&self) -> &[String] {
            &self.names
        }

        fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<IndependenceResult, OracleError> {
            let outer = [x, y].contains(&NodeId(0)) && [x, y].contains(&NodeId(2));
            if outer {
                let p = if z.is_empty() { 0.3 } else { 0.6 };
                Ok(IndependenceResult::independent(p))
            } else {
                Ok(IndependenceResult::dependent(0.0))
            }
        }
    }

    #[test]
    fn conservative_marks_ambiguous_and_max_p_picks_largest() {
        let oracle = Unfaithful {
            names: vec!["A".into(), "B".into(), "C".into()],
        };
        let (a, b, c) = (NodeId(0), NodeId(1), NodeId(2));
        let mut sepsets = SepsetMap::new();
        sepsets.set(a, c, &[], 0.3);
        let knowledge = KnowledgeIndex::unconstrained();

        let mut g = skeleton(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
        let mut diagnostics = Diagnostics::new();
        let summary = ColliderOrienter::new(MarkGuard::new(OrientationMode::Cpdag, &knowledge))
            .with_policy(ColliderDiscovery::Conservative, Some(&oracle))
            .run(&mut g, &sepsets, &mut diagnostics)
            .unwrap();
        assert_eq!(summary.ambiguous, 1);
        assert_eq!(g.triple_state(a, b, c), Some(TripleState::Ambiguous));
        assert!(g.edge(a, b).unwrap().is_nondirected());

        let mut g = skeleton(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
        let summary = ColliderOrienter::new(MarkGuard::new(OrientationMode::Cpdag, &knowledge))
            .with_policy(ColliderDiscovery::MaxP, Some(&oracle))
            .with_parallel(false)
            .run(&mut g, &sepsets, &mut diagnostics)
            .unwrap();
        // {B} has the larger p-value
        assert_eq!(summary.non_colliders, 1);
        assert_eq!(g.triple_state(a, b, c), Some(TripleState::NonCollider));
    }

    #[test]
    fn oracle_policies_require_an_oracle() {
        let mut g = skeleton(&["A", "B", "C"], &[("A", "B"), ("B", "C")]);
        let knowledge = KnowledgeIndex::unconstrained();
        let mut diagnostics = Diagnostics::new();
        let result = ColliderOrienter::new(MarkGuard::new(OrientationMode::Pag, &knowledge))
            .with_policy(ColliderDiscovery::Conservative, None)
            .run(&mut g, &SepsetMap::new(), &mut diagnostics);
        assert!(matches!(result, Err(CausalError::Input(_))));
    }
}
