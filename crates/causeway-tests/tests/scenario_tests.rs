//! End-to-end searches against known ground truths.

use causeway_core::engine::dag::{cpdag_from_dag, extend_to_dag, same_edges};
use causeway_core::engine::graph::{Endpoint, TripleState};
use causeway_core::engine::oracle::DSeparationOracle;
use causeway_core::engine::orient::DiscriminatingPathPolicy;
use causeway_core::{
    DiagnosticEvent, Diagnostics, Fci, FciConfig, Graph, IndependenceOracle, IndependenceResult, Knowledge, NodeId,
    OracleError, Pc, PcConfig,
};
use causeway_tests::{dag_with_latents, edge_strings, graph, id, oracle, TableOracle};

fn pc(oracle: &dyn IndependenceOracle, knowledge: &Knowledge) -> Graph {
    Pc::new(oracle, knowledge).search().unwrap().graph
}

#[test]
fn collider_with_downstream_chain() {
    let oracle = oracle(&["A", "B", "C", "D"], &["A --> B", "C --> B", "B --> D"]);
    let result = Pc::new(&oracle, &Knowledge::new()).search().unwrap();

    assert_eq!(edge_strings(&result.graph), vec!["A --> B", "B --> D", "C --> B"]);
    assert!(result.is_legal());
    assert!(!result.is_partial());

    let g = &result.graph;
    let (a, b, c) = (id(g, "A"), id(g, "B"), id(g, "C"));
    assert_eq!(g.triple_state(a, b, c), Some(TripleState::Collider));
    assert!(result
        .diagnostics
        .events()
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::RuleApplied { rule: "meek-r1", .. })));
}

#[test]
fn latent_confounder_leaves_circle_circle() {
    let truth = dag_with_latents(&["X", "Y"], &["L"], &["L --> X", "L --> Y"]).unwrap();
    let oracle = DSeparationOracle::new(truth).unwrap();
    assert_eq!(oracle.variables().len(), 2);

    let result = Fci::new(&oracle, &Knowledge::new()).search().unwrap();
    assert_eq!(edge_strings(&result.graph), vec!["X o-o Y"]);
    assert!(result.is_legal());
}

#[test]
fn forbidden_direction_orients_the_other_way() {
    let oracle = oracle(&["A", "B"], &["A --> B"]);
    let mut knowledge = Knowledge::new();
    knowledge.forbid("B", "A");

    let g = pc(&oracle, &knowledge);
    assert_eq!(edge_strings(&g), vec!["A --> B"]);

    // Without knowledge the pair is undecided
    let g = pc(&oracle, &Knowledge::new());
    assert_eq!(edge_strings(&g), vec!["A --- B"]);
}

#[test]
fn fci_textbook_pag_for_hidden_common_cause() {
    let truth = dag_with_latents(
        &["A", "B", "C", "D"],
        &["L"],
        &["A --> B", "L --> B", "L --> C", "D --> C"],
    )
    .unwrap();
    let oracle = DSeparationOracle::new(truth).unwrap();
    let result = Fci::new(&oracle, &Knowledge::new()).search().unwrap();

    assert_eq!(edge_strings(&result.graph), vec!["A o-> B", "B <-> C", "D o-> C"]);
    assert!(result.is_legal());
}

#[test]
fn fci_orients_descendant_of_collider() {
    // A --> C <-- B, C --> D: FCI R1 turns C o-o D into C --> D
    let oracle = oracle(&["A", "B", "C", "D"], &["A --> C", "B --> C", "C --> D"]);
    let result = Fci::new(&oracle, &Knowledge::new()).search().unwrap();

    assert_eq!(edge_strings(&result.graph), vec!["A o-> C", "B o-> C", "C --> D"]);
    assert!(result.is_legal());
}

#[test]
fn possible_dsep_removes_pair_separated_outside_adjacencies() {
    // X and Y are separated only by W, which is never adjacent to either.
    let oracle = TableOracle::new(&["X", "Y", "V", "W"])
        .independent("X", "W", &[])
        .independent("Y", "W", &[])
        .independent("X", "Y", &["W"]);

    let config = FciConfig {
        parallel: false,
        ..FciConfig::default()
    };
    let result = Fci::new(&oracle, &Knowledge::new())
        .with_config(config.clone())
        .search()
        .unwrap();
    let g = &result.graph;
    let (x, y, w) = (NodeId(0), NodeId(1), NodeId(3));
    assert!(!g.is_adjacent(x, y));
    assert_eq!(result.sepsets.get(x, y).unwrap().nodes.as_slice(), &[w]);
    assert_eq!(edge_strings(g), vec!["W o-> V", "X o-> V", "Y o-> V"]);
    assert!(result.is_legal());

    let without = Fci::new(&oracle, &Knowledge::new())
        .with_config(FciConfig {
            possible_dsep: false,
            ..config
        })
        .search()
        .unwrap();
    assert!(without.graph.is_adjacent(x, y));
}

#[test]
fn conservative_pc_marks_unfaithful_triple_ambiguous() {
    // A and C are independent both with and without B.
    let oracle = TableOracle::new(&["A", "B", "C"])
        .independent("A", "C", &[])
        .independent("A", "C", &["B"]);
    let knowledge = Knowledge::new();

    let result = Pc::new(&oracle, &knowledge).with_config(PcConfig::cpc()).search().unwrap();
    let g = &result.graph;
    let (a, b, c) = (NodeId(0), NodeId(1), NodeId(2));
    assert_eq!(g.triple_state(a, b, c), Some(TripleState::Ambiguous));
    assert_eq!(edge_strings(g), vec!["A --- B", "B --- C"]);
    assert!(result
        .diagnostics
        .events()
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::AmbiguousTriple { .. })));

    // Plain PC trusts the first separating set, which lacks B
    let g = pc(&oracle, &knowledge);
    assert_eq!(edge_strings(&g), vec!["A --> B", "C --> B"]);
}

#[test]
fn pc_max_prefers_the_strongest_separation() {
    struct Weighted {
        names: Vec<String>,
    }
    impl IndependenceOracle for Weighted {
        fn variables(&self) -> &[String] {
            &self.names
        }
        fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<IndependenceResult, OracleError> {
            // A _||_ C weakly marginally, strongly given B
            let pair = (x.min(y), x.max(y));
            Ok(match (pair, z) {
                ((NodeId(0), NodeId(2)), []) => IndependenceResult::independent(0.2),
                ((NodeId(0), NodeId(2)), [NodeId(1)]) => IndependenceResult::independent(0.9),
                _ => IndependenceResult::dependent(0.0),
            })
        }
    }
    let oracle = Weighted {
        names: vec!["A".into(), "B".into(), "C".into()],
    };
    let result = Pc::new(&oracle, &Knowledge::new())
        .with_config(PcConfig::pc_max())
        .search()
        .unwrap();
    assert_eq!(
        result.graph.triple_state(NodeId(0), NodeId(1), NodeId(2)),
        Some(TripleState::NonCollider)
    );
    assert_eq!(edge_strings(&result.graph), vec!["A --- B", "B --- C"]);
}

struct FailsOn {
    inner: DSeparationOracle,
    pair: (NodeId, NodeId),
}

impl IndependenceOracle for FailsOn {
    fn variables(&self) -> &[String] {
        self.inner.variables()
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<IndependenceResult, OracleError> {
        if (x.min(y), x.max(y)) == self.pair {
            return Err(OracleError::new("singular covariance"));
        }
        self.inner.test(x, y, z)
    }
}

#[test]
fn failing_tests_keep_the_edge_and_are_reported() {
    let oracle = FailsOn {
        inner: oracle(&["A", "B", "C"], &["A --> B", "B --> C"]),
        pair: (NodeId(0), NodeId(2)),
    };
    let result = Pc::new(&oracle, &Knowledge::new()).search().unwrap();

    assert!(result.graph.is_adjacent(NodeId(0), NodeId(2)));
    assert!(result.diagnostics.oracle_failures() > 0);
    let untested = result.diagnostics.untested_pairs();
    assert!(untested.contains(&(NodeId(0), NodeId(2))) || untested.contains(&(NodeId(2), NodeId(0))));
}

/// Fails the tests of `pair` given exactly `conditioning`.
struct FailsGiven {
    inner: DSeparationOracle,
    pair: (NodeId, NodeId),
    conditioning: Vec<NodeId>,
}

impl IndependenceOracle for FailsGiven {
    fn variables(&self) -> &[String] {
        self.inner.variables()
    }

    fn test(&self, x: NodeId, y: NodeId, z: &[NodeId]) -> Result<IndependenceResult, OracleError> {
        if (x.min(y), x.max(y)) == self.pair && z == self.conditioning.as_slice() {
            return Err(OracleError::new("singular covariance"));
        }
        self.inner.test(x, y, z)
    }
}

#[test]
fn discriminating_path_requery_is_accounted() {
    // D --> A <-- L --> B --> C, A --> C, L latent: <D, A, B, C> discriminates B
    let truth = dag_with_latents(
        &["D", "A", "B", "C"],
        &["L"],
        &["D --> A", "L --> A", "L --> B", "B --> C", "A --> C"],
    )
    .unwrap();
    let (d, a, c) = (id(&truth, "D"), id(&truth, "A"), id(&truth, "C"));
    let clean = DSeparationOracle::new(truth.clone()).unwrap();
    let failing = FailsGiven {
        inner: DSeparationOracle::new(truth).unwrap(),
        pair: (d.min(c), d.max(c)),
        conditioning: vec![a],
    };
    let run = |oracle: &dyn IndependenceOracle, discriminating_paths| {
        Fci::new(oracle, &Knowledge::new())
            .with_config(FciConfig {
                discriminating_paths,
                parallel: false,
                ..FciConfig::default()
            })
            .search()
            .unwrap()
    };
    let failures_on_dc = |diagnostics: &Diagnostics| {
        diagnostics
            .events()
            .iter()
            .filter(|e| {
                matches!(e, DiagnosticEvent::OracleFailure { x, y, .. }
                    if (*x, *y) == (d, c) || (*x, *y) == (c, d))
            })
            .count()
    };

    let requery = run(&clean, DiscriminatingPathPolicy::Requery);
    let sepsets = run(&clean, DiscriminatingPathPolicy::Sepsets);
    assert!(edge_strings(&requery.graph).contains(&"B --> C".to_string()));
    assert!(edge_strings(&sepsets.graph).contains(&"B --> C".to_string()));
    assert_eq!(requery.diagnostics.oracle_failures(), 0);
    // Both tests of the requery are counted
    assert!(requery.diagnostics.tests_run() >= sepsets.diagnostics.tests_run() + 2);

    let requery = run(&failing, DiscriminatingPathPolicy::Requery);
    let sepsets = run(&failing, DiscriminatingPathPolicy::Sepsets);
    // The adjacency search fails the same test, so only the requery differs
    assert!(edge_strings(&sepsets.graph).contains(&"B --> C".to_string()));
    assert!(edge_strings(&requery.graph).contains(&"B o-> C".to_string()));
    assert!(requery.diagnostics.oracle_failures() > sepsets.diagnostics.oracle_failures());
    assert!(failures_on_dc(&requery.diagnostics) > failures_on_dc(&sepsets.diagnostics));
    assert!(requery.diagnostics.tests_run() > sepsets.diagnostics.tests_run());
    assert!(requery
        .diagnostics
        .events()
        .iter()
        .any(|e| matches!(e, DiagnosticEvent::DiscriminatingPathUnresolved { .. })));
}

#[test]
fn required_edge_survives_and_is_directed() {
    // A and C are independent, but A --> C is required.
    let oracle = oracle(&["A", "B", "C"], &["A --> B", "C --> B"]);
    let mut knowledge = Knowledge::new();
    knowledge.require("A", "C");

    let g = pc(&oracle, &knowledge);
    assert!(g.is_directed_from_to(NodeId(0), NodeId(2)));
}

#[test]
fn tiers_orient_across_levels() {
    let oracle = oracle(&["A", "B", "C"], &["A --> B", "B --> C"]);
    let mut knowledge = Knowledge::new();
    knowledge.add_to_tier(0, "A").add_to_tier(1, "B").add_to_tier(2, "C");

    let g = pc(&oracle, &knowledge);
    assert_eq!(edge_strings(&g), vec!["A --> B", "B --> C"]);
}

#[test]
fn unknown_knowledge_names_are_rejected() {
    let oracle = oracle(&["A", "B"], &["A --> B"]);
    let mut knowledge = Knowledge::new();
    knowledge.forbid("A", "Z");
    assert!(Pc::new(&oracle, &knowledge).search().is_err());
    assert!(Fci::new(&oracle, &knowledge).search().is_err());
}

fn asia() -> DSeparationOracle {
    oracle(
        &["Asia", "Smoke", "Tub", "Lung", "Bronc", "Either", "Xray", "Dysp"],
        &[
            "Asia --> Tub",
            "Smoke --> Lung",
            "Smoke --> Bronc",
            "Tub --> Either",
            "Lung --> Either",
            "Either --> Xray",
            "Either --> Dysp",
            "Bronc --> Dysp",
        ],
    )
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let oracle = asia();
    let knowledge = Knowledge::new();
    let run = |parallel: bool| {
        Pc::new(&oracle, &knowledge)
            .with_config(PcConfig {
                parallel,
                ..PcConfig::default()
            })
            .search()
            .unwrap()
    };
    let (par, seq) = (run(true), run(false));
    assert!(same_edges(&par.graph, &seq.graph));
    assert_eq!(par.sepsets.iter(), seq.sepsets.iter());
    assert_eq!(par.diagnostics.tests_run(), seq.diagnostics.tests_run());

    let run = |parallel: bool| {
        Fci::new(&oracle, &knowledge)
            .with_config(FciConfig {
                parallel,
                ..FciConfig::default()
            })
            .search()
            .unwrap()
    };
    let (par, seq) = (run(true), run(false));
    assert!(same_edges(&par.graph, &seq.graph));
    assert_eq!(par.sepsets.iter(), seq.sepsets.iter());
}

#[test]
fn pc_recovers_the_equivalence_class() {
    let oracle = asia();
    let result = Pc::new(&oracle, &Knowledge::new()).search().unwrap();
    let expected = cpdag_from_dag(oracle.truth()).unwrap();
    assert!(same_edges(&result.graph, &expected));
    assert!(result.is_legal());

    let g = &result.graph;
    let (tub, lung, either) = (id(g, "Tub"), id(g, "Lung"), id(g, "Either"));
    assert!(g.is_directed_from_to(tub, either));
    assert!(g.is_directed_from_to(lung, either));
    assert_eq!(g.endpoint(id(g, "Smoke"), lung), Some(Endpoint::Tail));
    assert_eq!(g.endpoint(lung, id(g, "Smoke")), Some(Endpoint::Tail));
}

#[test]
fn dag_extension_of_search_result() {
    let oracle = asia();
    let cpdag = pc(&oracle, &Knowledge::new());
    let dag = extend_to_dag(&cpdag).unwrap();

    assert!(!dag.exists_directed_cycle());
    assert!(dag.edges().iter().all(|e| e.is_directed()));
    assert_eq!(dag.num_edges(), cpdag.num_edges());
    for e in cpdag.edges() {
        assert!(dag.is_adjacent(e.node1, e.node2));
        if e.is_directed() {
            assert_eq!(dag.edge(e.node1, e.node2).map(|d| d.is_directed()), Some(true));
            assert_eq!(dag.endpoint(e.node1, e.node2), Some(e.endpoint1));
        }
    }
    // Same equivalence class
    assert!(same_edges(&cpdag_from_dag(&dag).unwrap(), &cpdag));
}

#[test]
fn extension_preserves_unshielded_colliders() {
    let cpdag = graph(&["A", "B", "C", "D"], &["A --> C", "B --> C", "C --- D"]);
    let dag = extend_to_dag(&cpdag).unwrap();
    let colliders = |g: &Graph| {
        g.unshielded_triples()
            .into_iter()
            .filter(|&(x, y, z)| g.is_def_collider(x, y, z))
            .count()
    };
    assert_eq!(colliders(&dag), 1);
    assert!(dag.is_directed_from_to(id(&dag, "C"), id(&dag, "D")));
}
