//! # Searches
//!
//! End-to-end pipelines over an [`IndependenceOracle`]:
//!
//! - **pc**: PC, CPC and PC-Max, producing a CPDAG
//! - **fci**: FCI, producing a PAG
//!
//! Every search validates its inputs first, then runs adjacency search,
//! collider discovery, knowledge orientation and the rule closure, and ends
//! with a legality check. The caller always receives the graph together with
//! the diagnostics and the legality report.

pub mod config;
pub mod fci;
pub mod pc;

pub use config::{FciConfig, PcConfig};
pub use fci::Fci;
pub use pc::Pc;

use rustc_hash::FxHashSet;

use crate::engine::cancel::Completeness;
use crate::engine::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::engine::errors::CausalError;
use crate::engine::graph::Graph;
use crate::engine::legality::LegalityReport;
use crate::engine::oracle::IndependenceOracle;
use crate::engine::sepset::SepsetMap;

/// Output of a search.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub graph: Graph,
    pub sepsets: SepsetMap,
    pub diagnostics: Diagnostics,
    pub completeness: Completeness,
    /// Legality of the final graph. Cancelled runs are not checked.
    pub legality: Option<LegalityReport>,
}

impl SearchResult {
    pub fn is_partial(&self) -> bool {
        self.completeness.is_partial()
    }

    /// Legal, or not checked.
    pub fn is_legal(&self) -> bool {
        self.legality.as_ref().map_or(true, |r| r.legal)
    }

    pub(crate) fn record_legality(&mut self, report: LegalityReport) {
        if !report.legal {
            self.diagnostics.record(DiagnosticEvent::IllegalResult {
                reason: report.reason.clone(),
            });
        }
        self.legality = Some(report);
    }
}

/// The complete `o-o` graph over the oracle's variables.
///
/// Empty, duplicate or missing variable names are input errors.
pub(crate) fn initial_graph(oracle: &dyn IndependenceOracle) -> Result<Graph, CausalError> {
    let names = oracle.variables();
    if names.is_empty() {
        return Err(CausalError::Input("oracle has no variables".into()));
    }
    let mut seen: FxHashSet<&str> = FxHashSet::default();
    for name in names {
        if name.is_empty() {
            return Err(CausalError::Input("variable with an empty name".into()));
        }
        if !seen.insert(name.as_str()) {
            return Err(CausalError::Input(format!("duplicate variable '{}'", name)));
        }
    }
    Graph::complete(names)
}

pub(crate) fn partial_result(graph: Graph, sepsets: SepsetMap, diagnostics: Diagnostics) -> SearchResult {
    SearchResult {
        graph,
        sepsets,
        diagnostics,
        completeness: Completeness::Partial,
        legality: None,
    }
}
