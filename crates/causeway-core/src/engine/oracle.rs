//! Oracle interfaces consumed by the searches.
//!
//! ## Key Components
//!
//! - **IndependenceOracle**: answers `x _||_ y | Z` over a fixed variable list
//! - **ScoreOracle**: local score of a node given a parent set, higher is better
//! - **DSeparationOracle**: an exact oracle that reads independence off a
//!   ground-truth DAG, optionally with latent variables hidden from the search
//!
//! Oracles are shared across worker threads during the adjacency search, so
//! both traits require `Send + Sync`. An oracle must answer identical queries
//! identically within one run.

use crate::engine::errors::{CausalError, OracleError};
use crate::engine::graph::{Graph, NodeId, NodeKind};
use crate::engine::paths::PathFinder;

/// Outcome of one conditional independence test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndependenceResult {
    pub independent: bool,
    pub p_value: f64,
}

impl IndependenceResult {
    pub fn independent(p_value: f64) -> Self {
        Self {
            independent: true,
            p_value,
        }
    }

    pub fn dependent(p_value: f64) -> Self {
        Self {
            independent: false,
            p_value,
        }
    }
}

/// A conditional independence test over `variables()`.
///
/// `NodeId(i)` passed to [`IndependenceOracle::test`] names `variables()[i]`.
pub trait IndependenceOracle: Send + Sync {
    fn variables(&self) -> &[String];

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<IndependenceResult, OracleError>;
}

/// A decomposable score over `variables()`.
pub trait ScoreOracle: Send + Sync {
    fn variables(&self) -> &[String];

    fn local_score(&self, node: NodeId, parents: &[NodeId]) -> Result<f64, OracleError>;
}

/// Exact independence oracle backed by d-separation in a DAG.
///
/// Only the measured nodes of the DAG are exposed as variables, in id order;
/// latent nodes take part in d-separation but can never be tested or
/// conditioned on. Independent answers carry p-value 1.0, dependent answers
/// 0.0.
#[derive(Debug, Clone)]
pub struct DSeparationOracle {
    truth: Graph,
    /// Oracle index to DAG node
    observed: Vec<NodeId>,
    names: Vec<String>,
}

impl DSeparationOracle {
    pub fn new(truth: Graph) -> Result<Self, CausalError> {
        let observed: Vec<NodeId> = truth
            .nodes()
            .iter()
            .filter(|n| n.kind == NodeKind::Measured)
            .map(|n| n.id)
            .collect();
        Self::with_observed(truth, observed)
    }

    /// Exposes exactly `observed`, in the given order.
    pub fn with_observed(truth: Graph, observed: Vec<NodeId>) -> Result<Self, CausalError> {
        if let Some(edge) = truth.edges().into_iter().find(|e| !e.is_directed()) {
            return Err(CausalError::Input(format!(
                "ground truth must be a DAG, found {}",
                truth.describe_edge(edge)
            )));
        }
        if truth.exists_directed_cycle() {
            return Err(CausalError::Input("ground truth has a directed cycle".into()));
        }
        let mut names = Vec::with_capacity(observed.len());
        for &id in &observed {
            let name = truth
                .name(id)
                .ok_or_else(|| CausalError::Input(format!("unknown node {:?}", id)))?;
            names.push(name.to_string());
        }
        Ok(Self {
            truth,
            observed,
            names,
        })
    }

    pub fn truth(&self) -> &Graph {
        &self.truth
    }

    fn resolve(&self, id: NodeId) -> Result<NodeId, OracleError> {
        self.observed
            .get(id.index())
            .copied()
            .ok_or_else(|| OracleError::new(format!("variable index {} out of range", id.0)))
    }
}

impl IndependenceOracle for DSeparationOracle {
    fn variables(&self) -> &[String] {
        &self.names
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<IndependenceResult, OracleError> {
        let tx = self.resolve(x)?;
        let ty = self.resolve(y)?;
        let tz = z
            .iter()
            .map(|&n| self.resolve(n))
            .collect::<Result<Vec<_>, _>>()?;
        if PathFinder::new(&self.truth).is_m_connected(tx, ty, &tz) {
            Ok(IndependenceResult::dependent(0.0))
        } else {
            Ok(IndependenceResult::independent(1.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A -> B <- C, B -> D
    fn collider_dag() -> Graph {
        let mut g = Graph::with_nodes(["A", "B", "C", "D"]).unwrap();
        for spec in ["A --> B", "C --> B", "B --> D"] {
            g.add_edge_spec(spec).unwrap();
        }
        g
    }

    #[test]
    fn answers_d_separation_queries() {
        let oracle = DSeparationOracle::new(collider_dag()).unwrap();
        let (a, b, c, d) = (NodeId(0), NodeId(1), NodeId(2), NodeId(3));
        assert!(oracle.test(a, c, &[]).unwrap().independent);
        assert!(!oracle.test(a, c, &[b]).unwrap().independent);
        assert!(!oracle.test(a, c, &[d]).unwrap().independent);
        assert!(oracle.test(a, d, &[b]).unwrap().independent);
        assert!(!oracle.test(a, d, &[]).unwrap().independent);
    }

    #[test]
    fn hides_latent_variables() {
        let mut g = Graph::new();
        let x = g.add_node("X", NodeKind::Measured).unwrap();
        let l = g.add_node("L", NodeKind::Latent).unwrap();
        let y = g.add_node("Y", NodeKind::Measured).unwrap();
        g.add_edge(crate::engine::graph::Edge::directed(l, x)).unwrap();
        g.add_edge(crate::engine::graph::Edge::directed(l, y)).unwrap();
        let oracle = DSeparationOracle::new(g).unwrap();
        assert_eq!(oracle.variables(), ["X".to_string(), "Y".to_string()]);
        assert!(!oracle.test(NodeId(0), NodeId(1), &[]).unwrap().independent);
        assert!(oracle.test(NodeId(0), NodeId(5), &[]).is_err());
    }

    #[test]
    fn rejects_non_dags() {
        let mut g = Graph::with_nodes(["A", "B"]).unwrap();
        g.add_edge_spec("A o-> B").unwrap();
        assert!(matches!(DSeparationOracle::new(g), Err(CausalError::Input(_))));
    }
}
