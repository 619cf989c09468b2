//! PC, CPC and PC-Max.
//!
//! Adjacency search, collider discovery by the configured policy, knowledge
//! orientation and Meek closure. Undecided edges are left `---`.

use crate::engine::adjacency::AdjacencySearch;
use crate::engine::cancel::{CancelToken, Completeness};
use crate::engine::colliders::ColliderOrienter;
use crate::engine::diagnostics::Diagnostics;
use crate::engine::errors::CausalError;
use crate::engine::knowledge::Knowledge;
use crate::engine::legality::is_legal_cpdag;
use crate::engine::oracle::IndependenceOracle;
use crate::engine::orient::{
    finalize_cpdag, orient_with_knowledge, DiscriminatingPathPolicy, MarkGuard, OrientationEngine,
    OrientationMode, Rule, RuleContext,
};
use crate::search::config::PcConfig;
use crate::search::{initial_graph, partial_result, SearchResult};

/// A PC-family search over one oracle.
pub struct Pc<'a> {
    oracle: &'a dyn IndependenceOracle,
    knowledge: &'a Knowledge,
    config: PcConfig,
    cancel: Option<&'a CancelToken>,
}

impl<'a> Pc<'a> {
    pub fn new(oracle: &'a dyn IndependenceOracle, knowledge: &'a Knowledge) -> Self {
        Self {
            oracle,
            knowledge,
            config: PcConfig::default(),
            cancel: None,
        }
    }

    pub fn with_config(mut self, config: PcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &PcConfig {
        &self.config
    }

    pub fn search(&self) -> Result<SearchResult, CausalError> {
        let graph = initial_graph(self.oracle)?;
        let knowledge = self.knowledge.resolve(&graph)?;
        let mut diagnostics = Diagnostics::new();

        #[cfg(feature = "tracing")]
        tracing::info!(
            variables = graph.num_nodes(),
            colliders = ?self.config.colliders,
            max_depth = self.config.max_depth,
            "pc search"
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
        let sepsets = skeleton.sepsets;
        if skeleton.completeness.is_partial() {
            finalize_cpdag(&mut graph)?;
            return Ok(partial_result(graph, sepsets, diagnostics));
        }

        let guard = MarkGuard::new(OrientationMode::Cpdag, &knowledge);
        ColliderOrienter::new(guard)
            .with_policy(self.config.colliders, Some(self.oracle))
            .with_max_depth(self.config.max_depth)
            .with_parallel(self.config.parallel)
            .run(&mut graph, &sepsets, &mut diagnostics)?;
        orient_with_knowledge(&mut graph, &guard, &mut diagnostics)?;

        let context = RuleContext {
            sepsets: &sepsets,
            oracle: None,
            discriminating_paths: DiscriminatingPathPolicy::Sepsets,
            max_discriminating_path_length: None,
        };
        let rules = Rule::meek(self.config.meek_r4 || !knowledge.is_empty());
        let mut engine = OrientationEngine::new(guard, rules, context).with_parallel(self.config.parallel);
        if let Some(token) = self.cancel {
            engine = engine.with_cancel(token);
        }
        let stats = engine.run(&mut graph, &mut diagnostics)?;
        finalize_cpdag(&mut graph)?;

        if stats.completeness.is_partial() {
            return Ok(partial_result(graph, sepsets, diagnostics));
        }

        let mut result = SearchResult {
            graph,
            sepsets,
            diagnostics,
            completeness: Completeness::Complete,
            legality: None,
        };
        let report = is_legal_cpdag(&result.graph);
        result.record_legality(report);

        #[cfg(feature = "tracing")]
        tracing::info!(
            edges = result.graph.num_edges(),
            tests = result.diagnostics.tests_run(),
            passes = stats.passes,
            "pc search finished"
        );

        Ok(result)
    }
}
