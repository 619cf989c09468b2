//! Shared fixtures for the causeway integration and property tests.

use causeway_core::engine::graph::{Edge, Endpoint, Graph, NodeId, NodeKind};
use causeway_core::{CausalError, DSeparationOracle, IndependenceOracle, IndependenceResult, OracleError};

/// A graph of measured nodes with edges written as `A --> B`.
pub fn graph(names: &[&str], edges: &[&str]) -> Graph {
    let mut g = Graph::with_nodes(names.iter().copied()).expect("valid names");
    for spec in edges {
        g.add_edge_spec(spec).expect("valid edge");
    }
    g
}

/// A DAG with measured nodes first (ids `0..measured.len()`) and latent
/// nodes after them.
pub fn dag_with_latents(measured: &[&str], latent: &[&str], edges: &[&str]) -> Result<Graph, CausalError> {
    let mut g = Graph::new();
    for name in measured {
        g.add_node(name, NodeKind::Measured)?;
    }
    for name in latent {
        g.add_node(name, NodeKind::Latent)?;
    }
    for spec in edges {
        g.add_edge_spec(spec)?;
    }
    Ok(g)
}

/// d-separation oracle over a DAG of measured nodes.
pub fn oracle(names: &[&str], edges: &[&str]) -> DSeparationOracle {
    DSeparationOracle::new(graph(names, edges)).expect("valid DAG")
}

pub fn id(g: &Graph, name: &str) -> NodeId {
    g.node_by_name(name).expect("known node")
}

/// Every edge rendered with its arrowhead on the right (`C --> B` rather
/// than `B <-- C`) and symmetric edges in name order, sorted.
pub fn edge_strings(g: &Graph) -> Vec<String> {
    let mut out: Vec<String> = g
        .edges()
        .into_iter()
        .map(|e| {
            let flip = if e.endpoint1 == e.endpoint2 {
                g.name(e.node1) > g.name(e.node2)
            } else {
                e.endpoint1 == Endpoint::Arrow
            };
            g.describe_edge(&if flip { e.reversed() } else { *e })
        })
        .collect();
    out.sort();
    out
}

/// A DAG over `n` nodes `X0..` where `present[k]` adds the edge `Xi --> Xj`
/// for the k-th pair `i < j` in lexicographic order.
pub fn random_dag(n: usize, present: &[bool]) -> Graph {
    let names: Vec<String> = (0..n).map(|i| format!("X{}", i)).collect();
    let mut g = Graph::with_nodes(&names).expect("valid names");
    let mut k = 0;
    for i in 0..n {
        for j in i + 1..n {
            if present.get(k).copied().unwrap_or(false) {
                g.add_edge(Edge::directed(NodeId(i as u32), NodeId(j as u32)))
                    .expect("fresh pair");
            }
            k += 1;
        }
    }
    g
}

/// Oracle answering from a fixed list of independence facts; everything else
/// is dependent.
pub struct TableOracle {
    names: Vec<String>,
    /// (x, y, sorted conditioning set), x < y
    facts: Vec<(NodeId, NodeId, Vec<NodeId>)>,
}

impl TableOracle {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|s| s.to_string()).collect(),
            facts: Vec::new(),
        }
    }

    fn index(&self, name: &str) -> NodeId {
        let i = self.names.iter().position(|n| n == name).expect("known variable");
        NodeId(i as u32)
    }

    /// Declares `x _||_ y | z`.
    pub fn independent(mut self, x: &str, y: &str, z: &[&str]) -> Self {
        let (x, y) = (self.index(x), self.index(y));
        let mut z: Vec<NodeId> = z.iter().map(|n| self.index(n)).collect();
        z.sort_unstable();
        self.facts.push((x.min(y), x.max(y), z));
        self
    }
}

impl IndependenceOracle for TableOracle {
    fn variables(&self) -> &[String] {
        &self.names
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<IndependenceResult, OracleError> {
        let mut z = z.to_vec();
        z.sort_unstable();
        let key = (x.min(y), x.max(y), z);
        if self.facts.contains(&key) {
            Ok(IndependenceResult::independent(0.5))
        } else {
            Ok(IndependenceResult::dependent(0.0))
        }
    }
}
