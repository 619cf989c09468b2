//! FCI.
//!
//! 1. Adjacency search from the complete `o-o` graph.
//! 2. Collider discovery on the skeleton.
//! 3. Possible-D-SEP: every remaining pair is tested again given subsets of
//!    the possible-D-SEP sets of either end; separated pairs are removed.
//!    Like an adjacency level, the whole stage reads one graph state and
//!    applies its removals afterwards.
//! 4. Every mark is reset to Circle and colliders are rediscovered on the
//!    pruned skeleton.
//! 5. Knowledge orientation and the FCI rule closure.
//! 6. PAG legality check against the recorded separating sets.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::adjacency::AdjacencySearch;
use crate::engine::cancel::{CancelToken, Completeness};
use crate::engine::colliders::ColliderOrienter;
use crate::engine::diagnostics::{DiagnosticEvent, Diagnostics, RemovalStage};
use crate::engine::errors::{CausalError, OracleError};
use crate::engine::graph::{Endpoint, Graph, NodeId};
use crate::engine::knowledge::{Knowledge, KnowledgeIndex};
use crate::engine::legality::is_legal_pag;
use crate::engine::oracle::IndependenceOracle;
use crate::engine::orient::{orient_with_knowledge, MarkGuard, OrientationEngine, OrientationMode, Rule, RuleContext};
use crate::engine::paths::PathFinder;
use crate::engine::sepset::SepsetMap;
use crate::engine::subsets::Subsets;
use crate::search::config::{bound, FciConfig};
use crate::search::{initial_graph, partial_result, SearchResult};

#[derive(Debug, Default)]
struct DsepOutcome {
    separation: Option<(Vec<NodeId>, f64)>,
    tests: usize,
    failures: Vec<(Vec<NodeId>, OracleError)>,
}

/// An FCI search over one oracle.
pub struct Fci<'a> {
    oracle: &'a dyn IndependenceOracle,
    knowledge: &'a Knowledge,
    config: FciConfig,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Fci<'a> {
    pub fn new(oracle: &'a dyn IndependenceOracle, knowledge: &'a Knowledge) -> Self {
        Self {
            oracle,
            knowledge,
            config: FciConfig::default(),
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: FciConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &FciConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|t| t.is_cancelled())
    }

    pub fn search(&self) -> Result<SearchResult, CausalError> {
        let graph = initial_graph(self.oracle)?;
        let knowledge = self.knowledge.resolve(&graph)?;
        let mut diagnostics = Diagnostics::new();

        #[cfg(feature = "tracing")]
        tracing::info!(
            variables = graph.num_nodes(),
            possible_dsep = self.config.possible_dsep,
            complete_rule_set = self.config.complete_rule_set,
            "fci search"
        );

        let mut adjacency = AdjacencySearch::new(self.oracle, &knowledge)
            .with_max_depth(self.config.max_depth)
            .with_forbidden_pairs(self.config.forbidden_pairs)
            .with_parallel(self.config.parallel);
        if let Some(token) = self.cancel {
            adjacency = adjacency.with_cancel(token);
        }
        let skeleton = adjacency.run(graph, &mut diagnostics)?;
        let mut graph = skeleton.graph;
        let mut sepsets = skeleton.sepsets;
        if skeleton.completeness.is_partial() {
            return Ok(partial_result(graph, sepsets, diagnostics));
        }

        let guard = MarkGuard::new(OrientationMode::Pag, &knowledge);
        self.orient_colliders(&mut graph, &sepsets, guard, &mut diagnostics)?;

        if self.config.possible_dsep {
            if self.cancelled() {
                diagnostics.record(DiagnosticEvent::Cancelled {
                    stage: "possible-dsep",
                });
                return Ok(partial_result(graph, sepsets, diagnostics));
            }
            let removed = self.possible_dsep_stage(&mut graph, &mut sepsets, &knowledge, &mut diagnostics)?;
            if removed > 0 {
                #[cfg(feature = "tracing")]
                tracing::debug!(removed, "possible-dsep removals, rediscovering colliders");
                graph.reorient_all(Endpoint::Circle);
                graph.clear_triples();
                self.orient_colliders(&mut graph, &sepsets, guard, &mut diagnostics)?;
            }
        }

        orient_with_knowledge(&mut graph, &guard, &mut diagnostics)?;

        let context = RuleContext {
            sepsets: &sepsets,
            oracle: Some(self.oracle),
            discriminating_paths: self.config.discriminating_paths,
            max_discriminating_path_length: bound(self.config.max_discriminating_path_length),
        };
        let mut engine = OrientationEngine::new(guard, Rule::fci(self.config.complete_rule_set), context)
            .with_parallel(self.config.parallel);
        if let Some(token) = self.cancel {
            engine = engine.with_cancel(token);
        }
        let stats = engine.run(&mut graph, &mut diagnostics)?;
        if stats.completeness.is_partial() {
            return Ok(partial_result(graph, sepsets, diagnostics));
        }

        let report = is_legal_pag(&graph, Some(&sepsets));
        let mut result = SearchResult {
            graph,
            sepsets,
            diagnostics,
            completeness: Completeness::Complete,
            legality: None,
        };
        result.record_legality(report);

        #[cfg(feature = "tracing")]
        tracing::info!(
            edges = result.graph.num_edges(),
            tests = result.diagnostics.tests_run(),
            passes = stats.passes,
            legal = result.is_legal(),
            "fci search finished"
        );

        Ok(result)
    }

    fn orient_colliders(
        &self,
        graph: &mut Graph,
        sepsets: &SepsetMap,
        guard: MarkGuard<'_>,
        diagnostics: &mut Diagnostics,
    ) -> Result<(), CausalError> {
        ColliderOrienter::new(guard)
            .with_policy(self.config.colliders, Some(self.oracle))
            .with_max_depth(self.config.max_depth)
            .with_parallel(self.config.parallel)
            .run(graph, sepsets, diagnostics)?;
        Ok(())
    }

    /// Removes the pairs separated by a subset of a possible-D-SEP set and
    /// returns how many were removed.
    fn possible_dsep_stage(
        &self,
        graph: &mut Graph,
        sepsets: &mut SepsetMap,
        knowledge: &KnowledgeIndex,
        diagnostics: &mut Diagnostics,
    ) -> Result<usize, CausalError> {
        let pairs: Vec<(NodeId, NodeId)> = graph
            .edges()
            .iter()
            .map(|e| (e.node1.min(e.node2), e.node1.max(e.node2)))
            .filter(|&(x, y)| !knowledge.is_required_pair(x, y))
            .collect();

        let outcomes = self.test_pairs(graph, &pairs);

        let mut removed = 0;
        for (&(x, y), outcome) in pairs.iter().zip(outcomes) {
            diagnostics.count_tests(outcome.tests);
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
                    stage: RemovalStage::PossibleDsep,
                });
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn test_pairs(&self, graph: &Graph, pairs: &[(NodeId, NodeId)]) -> Vec<DsepOutcome> {
        #[cfg(feature = "parallel")]
        if self.config.parallel {
            return pairs
                .par_iter()
                .map(|&(x, y)| self.test_possible_dsep(graph, x, y))
                .collect();
        }
        pairs
            .iter()
            .map(|&(x, y)| self.test_possible_dsep(graph, x, y))
            .collect()
    }

    /// Subsets of `pdsep(x, y)` then of `pdsep(y, x)`, by increasing size from
    /// one, each in lexicographic order. The empty set was already tested by
    /// the adjacency search.
    fn test_possible_dsep(&self, graph: &Graph, x: NodeId, y: NodeId) -> DsepOutcome {
        let finder = PathFinder::new(graph);
        let max_path = bound(self.config.max_path_length);
        let sides = [
            finder.possible_dsep(x, y, max_path),
            finder.possible_dsep(y, x, max_path),
        ];
        let widest = sides.iter().map(Vec::len).max().unwrap_or(0);
        let depth = bound(self.config.max_depth).map_or(widest, |d| d.min(widest));

        let mut outcome = DsepOutcome::default();
        for k in 1..=depth {
            for side in &sides {
                for subset in Subsets::new(side, k) {
                    outcome.tests += 1;
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
        }
        outcome
    }
}
