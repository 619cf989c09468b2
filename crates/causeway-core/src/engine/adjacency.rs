//! # Adjacency Search
//!
//! Removes edges from a starting graph by conditional independence tests over
//! growing conditioning sets and records the separating set of every removed
//! pair.
//!
//! ## Design
//!
//! - **Stable per depth**: every level reads a snapshot of the adjacency lists
//!   taken at the start of the level. Tests of one level only propose
//!   removals; the coordinator applies them in pair order after the whole
//!   level, so the outcome does not depend on test scheduling.
//! - **Canonical sepsets**: for the pair `x < y`, subsets of `adj(x) \ {y}` are
//!   tried before subsets of `adj(y) \ {x}`, each in lexicographic order of
//!   sorted node ids. The first independent subset is recorded.
//! - **Oracle failures** count as "dependent". A pair whose every attempted
//!   test failed is kept and flagged untested.
//! - **Parallel levels**: with the `parallel` feature the pairs of one level
//!   are tested on the rayon pool. Results are collected in pair order, so
//!   parallel and sequential runs are identical.

use rustc_hash::{FxHashMap, FxHashSet};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::cancel::{CancelToken, Completeness};
use crate::engine::diagnostics::{DiagnosticEvent, Diagnostics, RemovalStage};
use crate::engine::errors::{CausalError, OracleError};
use crate::engine::graph::{EdgeKey, Graph, NodeId};
use crate::engine::knowledge::KnowledgeIndex;
use crate::engine::oracle::IndependenceOracle;
use crate::engine::sepset::SepsetMap;
use crate::engine::subsets::Subsets;

/// What to do with a pair whose edge is forbidden in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ForbiddenPairPolicy {
    /// Remove the adjacency before testing. No sepset is recorded.
    #[default]
    Remove,
    /// Leave it to the tests.
    Keep,
}

/// Skeleton produced by [`AdjacencySearch::run`].
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub graph: Graph,
    pub sepsets: SepsetMap,
    pub completeness: Completeness,
    /// Deepest conditioning-set size that was tested
    pub depth_reached: Option<usize>,
}

#[derive(Debug, Default)]
struct PairOutcome {
    separation: Option<(Vec<NodeId>, f64)>,
    attempted: usize,
    failures: Vec<(Vec<NodeId>, OracleError)>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    attempted: usize,
    failed: usize,
}

type Snapshot = FxHashMap<NodeId, Vec<NodeId>>;

/// Configured adjacency search over one oracle.
pub struct AdjacencySearch<'a> {
    oracle: &'a dyn IndependenceOracle,
    knowledge: &'a KnowledgeIndex,
    max_depth: Option<usize>,
    forbidden_pairs: ForbiddenPairPolicy,
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    parallel: bool,
    cancel: Option<&'a CancelToken>,
}

impl<'a> AdjacencySearch<'a> {
    pub fn new(oracle: &'a dyn IndependenceOracle, knowledge: &'a KnowledgeIndex) -> Self {
        Self {
            oracle,
            knowledge,
            max_depth: None,
            forbidden_pairs: ForbiddenPairPolicy::default(),
            parallel: true,
            cancel: None,
        }
    }

    /// Largest conditioning set size; negative means unbounded.
    pub fn with_max_depth(mut self, depth: i32) -> Self {
        self.max_depth = usize::try_from(depth).ok();
        self
    }

    pub fn with_forbidden_pairs(mut self, policy: ForbiddenPairPolicy) -> Self {
        self.forbidden_pairs = policy;
        self
    }

    /// Runs levels on the rayon pool when the `parallel` feature is enabled.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|t| t.is_cancelled())
    }

    /// Prunes `graph` (usually the complete `o-o` graph over the oracle's
    /// variables) and returns the skeleton with its sepsets.
    pub fn run(&self, mut graph: Graph, diagnostics: &mut Diagnostics) -> Result<Skeleton, CausalError> {
        let variables = self.oracle.variables().len();
        if let Some(bad) = graph.node_ids().find(|id| id.index() >= variables) {
            return Err(CausalError::Input(format!(
                "node '{}' has no oracle variable",
                graph.label(bad)
            )));
        }

        if self.forbidden_pairs == ForbiddenPairPolicy::Remove {
            let pairs: Vec<(NodeId, NodeId)> = graph.edges().iter().map(|e| (e.node1, e.node2)).collect();
            for (x, y) in pairs {
                if self.knowledge.is_forbidden_pair(x, y) && !self.knowledge.is_required_pair(x, y) {
                    graph.remove_edge(x, y)?;
                    diagnostics.record(DiagnosticEvent::RemovedByKnowledge { x, y });
                }
            }
        }

        let mut sepsets = SepsetMap::new();
        let mut tallies: FxHashMap<EdgeKey, Tally> = FxHashMap::default();
        let mut completeness = Completeness::Complete;
        let mut depth_reached = None;
        let mut depth = 0usize;

        loop {
            if self.max_depth.is_some_and(|max| depth > max) {
                break;
            }
            if self.cancelled() {
                completeness = Completeness::Partial;
                diagnostics.record(DiagnosticEvent::Cancelled {
                    stage: "adjacency search",
                });
                break;
            }

            let snapshot: Snapshot = graph
                .node_ids()
                .map(|n| (n, graph.adjacent_nodes(n).to_vec()))
                .collect();
            let pairs: Vec<(NodeId, NodeId)> = graph
                .edges()
                .iter()
                .map(|e| EdgeKey::new(e.node1, e.node2).nodes())
                .filter(|&(x, y)| !self.knowledge.is_required_pair(x, y))
                .filter(|&(x, y)| {
                    snapshot[&x].len().saturating_sub(1) >= depth
                        || snapshot[&y].len().saturating_sub(1) >= depth
                })
                .collect();
            if pairs.is_empty() {
                break;
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(depth, pairs = pairs.len(), "adjacency level");

            let outcomes = self.test_level(&pairs, &snapshot, depth);
            depth_reached = Some(depth);

            for (&(x, y), outcome) in pairs.iter().zip(outcomes) {
                diagnostics.count_tests(outcome.attempted);
                let tally = tallies.entry(EdgeKey::new(x, y)).or_default();
                tally.attempted += outcome.attempted;
                tally.failed += outcome.failures.len();
                for (conditioning, error) in outcome.failures {
                    diagnostics.record(DiagnosticEvent::OracleFailure {
                        x,
                        y,
                        conditioning,
                        reason: error.reason,
                    });
                }
                if let Some((sepset, p_value)) = outcome.separation {
                    graph.remove_edge(x, y)?;
                    sepsets.set(x, y, &sepset, p_value);
                    diagnostics.record(DiagnosticEvent::EdgeRemoved {
                        x,
                        y,
                        sepset,
                        p_value,
                        stage: RemovalStage::Adjacency,
                    });
                }
            }
            depth += 1;
        }

        let mut untested: Vec<(NodeId, NodeId)> = tallies
            .iter()
            .filter(|(_, t)| t.attempted > 0 && t.failed == t.attempted)
            .map(|(key, _)| key.nodes())
            .filter(|&(x, y)| graph.is_adjacent(x, y))
            .collect();
        untested.sort_unstable();
        for (x, y) in untested {
            diagnostics.record(DiagnosticEvent::UntestedPair { x, y });
        }

        Ok(Skeleton {
            graph,
            sepsets,
            completeness,
            depth_reached,
        })
    }

    fn test_level(&self, pairs: &[(NodeId, NodeId)], snapshot: &Snapshot, depth: usize) -> Vec<PairOutcome> {
        #[cfg(feature = "parallel")]
        if self.parallel {
            return pairs
                .par_iter()
                .map(|&(x, y)| self.test_pair(x, y, snapshot, depth))
                .collect();
        }
        pairs
            .iter()
            .map(|&(x, y)| self.test_pair(x, y, snapshot, depth))
            .collect()
    }

    fn test_pair(&self, x: NodeId, y: NodeId, snapshot: &Snapshot, depth: usize) -> PairOutcome {
        let mut outcome = PairOutcome::default();
        let side_x: Vec<NodeId> = snapshot[&x].iter().copied().filter(|&n| n != y).collect();
        let side_y: Vec<NodeId> = snapshot[&y].iter().copied().filter(|&n| n != x).collect();
        let tested_x: FxHashSet<NodeId> = side_x.iter().copied().collect();
        let x_side_tried = side_x.len() >= depth;

        for (side, first) in [(&side_x, true), (&side_y, false)] {
            if side.len() < depth {
                continue;
            }
            for subset in Subsets::new(side, depth) {
                // Subsets drawn entirely from adj(x) were already tried
                if !first && x_side_tried && subset.iter().all(|n| tested_x.contains(n)) {
                    continue;
                }
                outcome.attempted += 1;
                match self.oracle.test(x, y, &subset) {
                    Ok(result) if result.independent => {
                        outcome.separation = Some((subset, result.p_value));
                        return outcome;
                    }
                    Ok(_) => {}
                    Err(error) => outcome.failures.push((subset, error)),
                }
            }
        }
        outcome
    }
}
