//! DAG utilities: consistent extension of a CPDAG, the CPDAG of a DAG, and
//! the total score of a DAG under a [`ScoreOracle`].

use rustc_hash::FxHashSet;

use crate::engine::colliders::ColliderOrienter;
use crate::engine::diagnostics::Diagnostics;
use crate::engine::errors::CausalError;
use crate::engine::graph::{Edge, Endpoint, Graph, NodeId};
use crate::engine::knowledge::KnowledgeIndex;
use crate::engine::oracle::ScoreOracle;
use crate::engine::orient::{
    finalize_cpdag, DiscriminatingPathPolicy, MarkGuard, OrientationEngine, OrientationMode, Rule,
    RuleContext,
};
use crate::engine::sepset::SepsetMap;

/// A DAG in the equivalence class of `cpdag` (Dor and Tarsi).
///
/// Repeatedly picks a node with no outgoing directed edge whose undirected
/// neighbours are adjacent to all its other neighbours, points its
/// undirected edges into it and drops it from the working graph. Nodes are
/// tried in id order, so the extension is deterministic. `---` and `o-o`
/// edges both count as undirected.
pub fn extend_to_dag(cpdag: &Graph) -> Result<Graph, CausalError> {
    for edge in cpdag.edges() {
        if !(edge.is_directed() || edge.is_undirected() || edge.is_nondirected()) {
            return Err(CausalError::Input(format!(
                "cannot extend {} to a DAG",
                cpdag.describe_edge(edge)
            )));
        }
    }

    let mut dag = cpdag.clone();
    dag.clear_triples();
    let mut work = cpdag.clone();
    let undirected = |g: &Graph, a: NodeId, b: NodeId| {
        g.edge(a, b)
            .is_some_and(|e| e.is_undirected() || e.is_nondirected())
    };

    while work.num_nodes() > 0 {
        let sink = work.node_ids().find(|&x| {
            if !work.children(x).is_empty() {
                return false;
            }
            let neighbors = work.adjacent_nodes(x);
            neighbors.iter().filter(|&&y| undirected(&work, x, y)).all(|&y| {
                neighbors
                    .iter()
                    .all(|&other| other == y || work.is_adjacent(y, other))
            })
        });
        let Some(x) = sink else {
            return Err(CausalError::Input(
                "graph has no consistent DAG extension".into(),
            ));
        };
        let into_x: Vec<NodeId> = work
            .adjacent_nodes(x)
            .iter()
            .copied()
            .filter(|&y| undirected(&work, x, y))
            .collect();
        for y in into_x {
            dag.set_endpoint(y, x, Endpoint::Tail)?;
            dag.set_endpoint(x, y, Endpoint::Arrow)?;
        }
        work.remove_node(x)?;
    }
    Ok(dag)
}

/// The CPDAG representing the Markov equivalence class of `dag`.
///
/// Keeps the skeleton and the unshielded colliders of `dag` and closes the
/// result under Meek R1-R3.
pub fn cpdag_from_dag(dag: &Graph) -> Result<Graph, CausalError> {
    if dag.edges().iter().any(|e| !e.is_directed()) || dag.exists_directed_cycle() {
        return Err(CausalError::Input("expected a DAG".into()));
    }

    let mut cpdag = dag.clone();
    cpdag.clear_triples();
    cpdag.reorient_all(Endpoint::Circle);

    // A recorded sepset without the middle node encodes "collider".
    let mut sepsets = SepsetMap::new();
    for (x, y, z) in dag.unshielded_triples() {
        let middle = if dag.is_def_collider(x, y, z) { None } else { Some(y) };
        let mut recorded: Vec<NodeId> = sepsets
            .get(x, z)
            .map(|s| s.nodes.to_vec())
            .unwrap_or_default();
        recorded.extend(middle);
        sepsets.set(x, z, &recorded, 1.0);
    }

    let knowledge = KnowledgeIndex::unconstrained();
    let guard = MarkGuard::new(OrientationMode::Cpdag, &knowledge);
    let mut diagnostics = Diagnostics::new();
    ColliderOrienter::new(guard)
        .with_parallel(false)
        .run(&mut cpdag, &sepsets, &mut diagnostics)?;
    let context = RuleContext {
        sepsets: &sepsets,
        oracle: None,
        discriminating_paths: DiscriminatingPathPolicy::Sepsets,
        max_discriminating_path_length: None,
    };
    OrientationEngine::new(guard, Rule::meek(false), context)
        .with_parallel(false)
        .run(&mut cpdag, &mut diagnostics)?;
    finalize_cpdag(&mut cpdag)?;
    Ok(cpdag)
}

/// Total score of a DAG.
#[derive(Debug, Clone, PartialEq)]
pub struct DagScore {
    /// Sum of the local scores that could be computed
    pub total: f64,
    /// Nodes whose local score failed; they contribute nothing to `total`
    pub unscored: Vec<NodeId>,
}

/// Sums `oracle.local_score(node, parents)` over the nodes of `dag`.
///
/// A failing local score is recovered as "no score available" and listed in
/// [`DagScore::unscored`].
pub fn score_dag(dag: &Graph, oracle: &dyn ScoreOracle) -> Result<DagScore, CausalError> {
    if let Some(edge) = dag.edges().into_iter().find(|e| !e.is_directed()) {
        return Err(CausalError::Input(format!(
            "cannot score {}: not a DAG",
            dag.describe_edge(edge)
        )));
    }
    if dag.exists_directed_cycle() {
        return Err(CausalError::Input("cannot score a graph with a directed cycle".into()));
    }
    let variables = oracle.variables().len();
    if let Some(bad) = dag.node_ids().find(|id| id.index() >= variables) {
        return Err(CausalError::Input(format!(
            "node '{}' has no score variable",
            dag.label(bad)
        )));
    }

    let mut score = DagScore {
        total: 0.0,
        unscored: Vec::new(),
    };
    for node in dag.node_ids() {
        match oracle.local_score(node, &dag.parents(node)) {
            Ok(local) => score.total += local,
            Err(_error) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(node = node.0, reason = %_error.reason, "local score unavailable");
                score.unscored.push(node);
            }
        }
    }
    Ok(score)
}

/// Whether two graphs over the same node ids have the same adjacencies and
/// the same marks.
pub fn same_edges(a: &Graph, b: &Graph) -> bool {
    let normalize = |g: &Graph| -> FxHashSet<Edge> {
        g.edges()
            .into_iter()
            .map(|e| if e.node1 <= e.node2 { *e } else { e.reversed() })
            .collect()
    };
    normalize(a) == normalize(b)
}
