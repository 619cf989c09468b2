//! # Orientation Engine
//!
//! Fixed-point closure of edge marks under a closed set of orientation rules.
//!
//! ## Key Components
//!
//! - **MarkGuard**: the single gate every mark passes through. It enforces
//!   monotone marks and checks knowledge (and acyclicity in CPDAG mode)
//!   before a proposal is committed.
//! - **Rule**: the closed rule set. Meek rules for CPDAGs, FCI rules with the
//!   discriminating-path rule and the tail rules R8-R10 for PAGs.
//! - **OrientationEngine**: runs passes until one commits nothing.
//!
//! ## Design
//!
//! - During a search every undecided end is a Circle, in both modes. A mark can
//!   only move from Circle to Tail or Arrow, so every committed pass strictly
//!   reduces the number of Circles and the loop terminates. CPDAG results
//!   turn the remaining `o-o` edges into `---` with [`finalize_cpdag`].
//! - A pass runs the rules in order. For each rule every anchor (an ordered
//!   adjacent pair) is checked read-only, on the rayon pool with the
//!   `parallel` feature, and the proposals are then applied serially. A
//!   proposal found against an older graph version is re-derived from its
//!   anchor before it is committed.
//! - Exceeding the pass bound is reported as [`CausalError::NonTermination`].

mod fci;
mod meek;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::engine::cancel::{CancelToken, Completeness};
use crate::engine::diagnostics::{ConflictReason, DiagnosticEvent, Diagnostics};
use crate::engine::errors::CausalError;
use crate::engine::graph::{Endpoint, Graph, NodeId};
use crate::engine::knowledge::KnowledgeIndex;
use crate::engine::oracle::IndependenceOracle;
use crate::engine::sepset::SepsetMap;

pub(crate) use fci::discriminating_path;

/// Minimum number of passes allowed before the loop is declared divergent.
const MIN_PASS_BOUND: usize = 16;

/// Representation being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OrientationMode {
    Cpdag,
    Pag,
}

/// One mark to commit: `endpoint` at `node`'s end of `node`-`toward`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mark {
    pub node: NodeId,
    pub toward: NodeId,
    pub endpoint: Endpoint,
}

pub type Marks = SmallVec<[Mark; 4]>;

impl Mark {
    pub fn new(node: NodeId, toward: NodeId, endpoint: Endpoint) -> Self {
        Self {
            node,
            toward,
            endpoint,
        }
    }

    pub fn arrow(node: NodeId, toward: NodeId) -> Self {
        Self::new(node, toward, Endpoint::Arrow)
    }

    pub fn tail(node: NodeId, toward: NodeId) -> Self {
        Self::new(node, toward, Endpoint::Tail)
    }

    /// The two marks of `from --> to`.
    pub fn directed(from: NodeId, to: NodeId) -> Marks {
        SmallVec::from_slice(&[Self::tail(from, to), Self::arrow(to, from)])
    }
}

/// Result of checking a proposal against the current graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    Apply,
    /// Every mark is already in place.
    NoOp,
    Conflict {
        mark: Mark,
        found: Endpoint,
        reason: ConflictReason,
    },
}

/// Gate for committing marks.
#[derive(Debug, Clone, Copy)]
pub struct MarkGuard<'a> {
    mode: OrientationMode,
    knowledge: &'a KnowledgeIndex,
}

impl<'a> MarkGuard<'a> {
    pub fn new(mode: OrientationMode, knowledge: &'a KnowledgeIndex) -> Self {
        Self { mode, knowledge }
    }

    pub fn mode(&self) -> OrientationMode {
        self.mode
    }

    pub fn knowledge(&self) -> &'a KnowledgeIndex {
        self.knowledge
    }

    pub(crate) fn check(&self, graph: &Graph, marks: &[Mark]) -> Result<Verdict, CausalError> {
        let mut changes: SmallVec<[Mark; 4]> = SmallVec::new();
        for mark in marks {
            let current = graph.endpoint(mark.node, mark.toward).ok_or_else(|| {
                CausalError::Internal(format!(
                    "mark proposed on missing edge {} - {}",
                    graph.label(mark.node),
                    graph.label(mark.toward)
                ))
            })?;
            if current == mark.endpoint {
                continue;
            }
            if current != Endpoint::Circle {
                return Ok(Verdict::Conflict {
                    mark: *mark,
                    found: current,
                    reason: ConflictReason::CommittedMark,
                });
            }
            changes.push(*mark);
        }
        if changes.is_empty() {
            return Ok(Verdict::NoOp);
        }

        let after = |node: NodeId, toward: NodeId| {
            marks
                .iter()
                .find(|m| m.node == node && m.toward == toward)
                .map(|m| m.endpoint)
                .or_else(|| graph.endpoint(node, toward))
        };
        for mark in &changes {
            let conflict = |reason| Verdict::Conflict {
                mark: *mark,
                found: Endpoint::Circle,
                reason,
            };
            let (node, toward) = (mark.node, mark.toward);
            if mark.endpoint == Endpoint::Arrow && self.knowledge.is_required(node, toward) {
                return Ok(conflict(ConflictReason::Knowledge));
            }
            let here = after(node, toward);
            let there = after(toward, node);
            let directed = match (here, there) {
                (Some(Endpoint::Tail), Some(Endpoint::Arrow)) => Some((node, toward)),
                (Some(Endpoint::Arrow), Some(Endpoint::Tail)) => Some((toward, node)),
                _ => None,
            };
            if let Some((from, to)) = directed {
                if self.knowledge.is_violated_by(from, to) {
                    return Ok(conflict(ConflictReason::Knowledge));
                }
                if self.mode == OrientationMode::Cpdag && graph.exists_directed_path(to, from) {
                    return Ok(conflict(ConflictReason::Cycle));
                }
            }
        }
        Ok(Verdict::Apply)
    }

    fn apply(&self, graph: &mut Graph, marks: &[Mark]) -> Result<(), CausalError> {
        for mark in marks {
            graph.set_endpoint(mark.node, mark.toward, mark.endpoint)?;
        }
        Ok(())
    }

    /// Checks `marks` and commits them when accepted, without recording
    /// anything. Callers report the verdict in their own terms.
    pub(crate) fn try_commit(&self, graph: &mut Graph, marks: &[Mark]) -> Result<Verdict, CausalError> {
        let verdict = self.check(graph, marks)?;
        if verdict == Verdict::Apply {
            self.apply(graph, marks)?;
        }
        Ok(verdict)
    }

    /// Commits `marks` atomically if the guard accepts them.
    ///
    /// Returns whether the graph changed. A rejected proposal is recorded as
    /// an orientation conflict and leaves the graph untouched.
    pub fn commit(
        &self,
        graph: &mut Graph,
        rule: &'static str,
        marks: &[Mark],
        diagnostics: &mut Diagnostics,
    ) -> Result<bool, CausalError> {
        match self.check(graph, marks)? {
            Verdict::Apply => {
                self.apply(graph, marks)?;
                diagnostics.record(applied(rule, marks));
                Ok(true)
            }
            Verdict::NoOp => Ok(false),
            Verdict::Conflict {
                mark,
                found,
                reason,
            } => {
                diagnostics.record(conflict_event(rule, mark, found, reason));
                Ok(false)
            }
        }
    }
}

fn applied(rule: &'static str, marks: &[Mark]) -> DiagnosticEvent {
    DiagnosticEvent::RuleApplied {
        rule,
        marks: marks.iter().map(|m| (m.node, m.toward, m.endpoint)).collect(),
    }
}

fn conflict_event(rule: &'static str, mark: Mark, found: Endpoint, reason: ConflictReason) -> DiagnosticEvent {
    DiagnosticEvent::OrientationConflict {
        rule,
        node: mark.node,
        toward: mark.toward,
        wanted: mark.endpoint,
        found,
        reason,
    }
}

/// How the discriminating-path rule decides the triple at `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DiscriminatingPathPolicy {
    /// Ask the oracle: first without `b`, then with `b`.
    #[default]
    Requery,
    /// Use the separating set recorded for the path's end points.
    Sepsets,
}

/// The closed orientation rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    MeekR1,
    MeekR2,
    MeekR3,
    MeekR4,
    FciR1,
    FciR2,
    FciR3,
    /// Discriminating path
    FciR4,
    FciR8,
    FciR9,
    FciR10,
}

/// What a rule found at an anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Orient(Marks),
    /// A discriminating path for `b` on `b`-`c` whose triple could not be
    /// decided.
    Unresolved { b: NodeId, c: NodeId },
    /// `then` was decided by asking the oracle again.
    Requeried { queries: Requeries, then: Box<Finding> },
}

/// Oracle calls a rule made for the pair `(x, y)` while probing an anchor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requeries {
    pub x: NodeId,
    pub y: NodeId,
    pub tests: usize,
    /// Conditioning set and reason of each failed call
    pub failures: Vec<(Vec<NodeId>, String)>,
}

impl Requeries {
    pub(crate) fn new(x: NodeId, y: NodeId) -> Self {
        Self {
            x,
            y,
            tests: 0,
            failures: Vec::new(),
        }
    }

    /// Tests `x _||_ y | z`; `None` when the oracle fails.
    pub(crate) fn ask(&mut self, oracle: &dyn IndependenceOracle, z: &[NodeId]) -> Option<bool> {
        self.tests += 1;
        match oracle.test(self.x, self.y, z) {
            Ok(result) => Some(result.independent),
            Err(error) => {
                self.failures.push((z.to_vec(), error.reason));
                None
            }
        }
    }

    fn record(self, diagnostics: &mut Diagnostics) {
        diagnostics.count_tests(self.tests);
        for (conditioning, reason) in self.failures {
            diagnostics.record(DiagnosticEvent::OracleFailure {
                x: self.x,
                y: self.y,
                conditioning,
                reason,
            });
        }
    }
}

/// Accounts the oracle calls carried by `finding` and unwraps it.
fn settle(finding: Option<Finding>, diagnostics: &mut Diagnostics) -> Option<Finding> {
    match finding {
        Some(Finding::Requeried { queries, then }) => {
            queries.record(diagnostics);
            Some(*then)
        }
        other => other,
    }
}

/// Read-only inputs the rules consult besides the graph.
#[derive(Clone, Copy)]
pub struct RuleContext<'a> {
    pub sepsets: &'a SepsetMap,
    pub oracle: Option<&'a dyn IndependenceOracle>,
    pub discriminating_paths: DiscriminatingPathPolicy,
    /// Bound on the number of nodes of a discriminating path
    pub max_discriminating_path_length: Option<usize>,
}

impl Rule {
    /// Meek R1-R3, plus R4 when `with_r4`.
    pub fn meek(with_r4: bool) -> Vec<Rule> {
        let mut rules = vec![Rule::MeekR1, Rule::MeekR2, Rule::MeekR3];
        if with_r4 {
            rules.push(Rule::MeekR4);
        }
        rules
    }

    /// FCI R1-R4, plus the tail rules R8-R10 when `complete`.
    pub fn fci(complete: bool) -> Vec<Rule> {
        let mut rules = vec![Rule::FciR1, Rule::FciR2, Rule::FciR3, Rule::FciR4];
        if complete {
            rules.extend([Rule::FciR8, Rule::FciR9, Rule::FciR10]);
        }
        rules
    }

    pub fn name(self) -> &'static str {
        match self {
            Rule::MeekR1 => "meek-r1",
            Rule::MeekR2 => "meek-r2",
            Rule::MeekR3 => "meek-r3",
            Rule::MeekR4 => "meek-r4",
            Rule::FciR1 => "fci-r1",
            Rule::FciR2 => "fci-r2",
            Rule::FciR3 => "fci-r3",
            Rule::FciR4 => "fci-r4",
            Rule::FciR8 => "fci-r8",
            Rule::FciR9 => "fci-r9",
            Rule::FciR10 => "fci-r10",
        }
    }

    /// Checks the anchor `(a, b)`. Never mutates the graph.
    pub fn check(self, graph: &Graph, ctx: &RuleContext<'_>, a: NodeId, b: NodeId) -> Option<Finding> {
        let orient = |marks: Option<Marks>| marks.map(Finding::Orient);
        match self {
            Rule::MeekR1 => orient(meek::r1(graph, a, b)),
            Rule::MeekR2 => orient(meek::r2(graph, a, b)),
            Rule::MeekR3 => orient(meek::r3(graph, a, b)),
            Rule::MeekR4 => orient(meek::r4(graph, a, b)),
            Rule::FciR1 => orient(fci::r1(graph, a, b)),
            Rule::FciR2 => orient(fci::r2(graph, a, b)),
            Rule::FciR3 => orient(fci::r3(graph, a, b)),
            Rule::FciR4 => fci::r4(graph, ctx, a, b),
            Rule::FciR8 => orient(fci::r8(graph, a, b)),
            Rule::FciR9 => orient(fci::r9(graph, a, b)),
            Rule::FciR10 => orient(fci::r10(graph, a, b)),
        }
    }
}

/// Statistics of one closure run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClosureStats {
    pub passes: usize,
    pub commits: usize,
    pub completeness: Completeness,
}

/// Fixed-point driver for a rule list.
pub struct OrientationEngine<'a> {
    guard: MarkGuard<'a>,
    rules: Vec<Rule>,
    context: RuleContext<'a>,
    #[cfg_attr(not(feature = "parallel"), allow(dead_code))]
    parallel: bool,
    cancel: Option<&'a CancelToken>,
}

impl<'a> OrientationEngine<'a> {
    pub fn new(guard: MarkGuard<'a>, rules: Vec<Rule>, context: RuleContext<'a>) -> Self {
        Self {
            guard,
            rules,
            context,
            parallel: true,
            cancel: None,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancel(mut self, token: &'a CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Pass bound for a graph with `edges` adjacencies.
    pub fn pass_bound(edges: usize) -> usize {
        MIN_PASS_BOUND.max(4 * edges + 4)
    }

    /// Applies the rules until a pass commits nothing.
    pub fn run(&self, graph: &mut Graph, diagnostics: &mut Diagnostics) -> Result<ClosureStats, CausalError> {
        let bound = Self::pass_bound(graph.num_edges());
        let mut stats = ClosureStats::default();
        let mut reported: FxHashSet<(Rule, Marks)> = FxHashSet::default();
        let mut unresolved: FxHashSet<(NodeId, NodeId)> = FxHashSet::default();

        loop {
            if self.cancel.is_some_and(|t| t.is_cancelled()) {
                stats.completeness = Completeness::Partial;
                diagnostics.record(DiagnosticEvent::Cancelled {
                    stage: "orientation closure",
                });
                break;
            }
            if stats.passes >= bound {
                return Err(CausalError::NonTermination {
                    passes: stats.passes,
                });
            }
            stats.passes += 1;

            let mut changed = false;
            for &rule in &self.rules {
                let anchors = anchors(graph);
                let scanned = graph.version();
                let findings = self.scan(rule, graph, &anchors);

                for (a, b, finding) in findings {
                    let finding = if graph.version() == scanned {
                        settle(Some(finding), diagnostics)
                    } else {
                        // Oracle calls made against the older version still count
                        settle(Some(finding), diagnostics);
                        if graph.is_adjacent(a, b) {
                            settle(rule.check(graph, &self.context, a, b), diagnostics)
                        } else {
                            None
                        }
                    };
                    match finding {
                        None | Some(Finding::Requeried { .. }) => {}
                        Some(Finding::Unresolved { b, c }) => {
                            if unresolved.insert((b, c)) {
                                diagnostics.record(DiagnosticEvent::DiscriminatingPathUnresolved { b, c });
                            }
                        }
                        Some(Finding::Orient(marks)) => match self.guard.check(graph, &marks)? {
                            Verdict::Apply => {
                                self.guard.apply(graph, &marks)?;
                                diagnostics.record(applied(rule.name(), &marks));
                                stats.commits += 1;
                                changed = true;
                            }
                            Verdict::NoOp => {}
                            Verdict::Conflict {
                                mark,
                                found,
                                reason,
                            } => {
                                if reported.insert((rule, marks.clone())) {
                                    diagnostics.record(conflict_event(rule.name(), mark, found, reason));
                                }
                            }
                        },
                    }
                }
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(pass = stats.passes, changed, "orientation pass");

            if !changed {
                break;
            }
        }
        Ok(stats)
    }

    fn scan(&self, rule: Rule, graph: &Graph, anchors: &[(NodeId, NodeId)]) -> Vec<(NodeId, NodeId, Finding)> {
        let context = &self.context;
        let check = |&(a, b): &(NodeId, NodeId)| rule.check(graph, context, a, b).map(|f| (a, b, f));
        #[cfg(feature = "parallel")]
        if self.parallel {
            return anchors.par_iter().filter_map(check).collect();
        }
        anchors.iter().filter_map(check).collect()
    }
}

/// Every ordered adjacent pair, sorted.
fn anchors(graph: &Graph) -> Vec<(NodeId, NodeId)> {
    let mut out = Vec::with_capacity(graph.num_edges() * 2);
    for edge in graph.edges() {
        out.push((edge.node1, edge.node2));
        out.push((edge.node2, edge.node1));
    }
    out.sort_unstable();
    out
}

/// Commits the orientations background knowledge implies.
///
/// Required `a --> b` sets Tail at `a` and Arrow at `b`. A forbidden
/// `a --> b` puts an Arrow at `a` in PAG mode and orients `b --> a` in CPDAG
/// mode.
pub fn orient_with_knowledge(
    graph: &mut Graph,
    guard: &MarkGuard<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<(), CausalError> {
    let knowledge = guard.knowledge();
    if knowledge.is_empty() {
        return Ok(());
    }
    for &(from, to) in knowledge.required_edges() {
        if graph.is_adjacent(from, to) {
            guard.commit(graph, "knowledge", &Mark::directed(from, to), diagnostics)?;
        }
    }
    let pairs: Vec<(NodeId, NodeId)> = graph.edges().iter().map(|e| (e.node1, e.node2)).collect();
    for (x, y) in pairs {
        for (from, to) in [(x, y), (y, x)] {
            if !knowledge.is_forbidden(from, to) || knowledge.is_required(from, to) {
                continue;
            }
            match guard.mode() {
                OrientationMode::Pag => {
                    guard.commit(graph, "knowledge", &[Mark::arrow(from, to)], diagnostics)?;
                }
                OrientationMode::Cpdag => {
                    if knowledge.is_forbidden(to, from) {
                        continue;
                    }
                    guard.commit(graph, "knowledge", &Mark::directed(to, from), diagnostics)?;
                }
            }
        }
    }
    Ok(())
}

/// Turns every remaining Circle into a Tail, producing `---` for undecided
/// CPDAG edges.
pub fn finalize_cpdag(graph: &mut Graph) -> Result<(), CausalError> {
    let edges: Vec<_> = graph.edges().into_iter().copied().collect();
    for edge in edges {
        if edge.endpoint1 == Endpoint::Circle {
            graph.set_endpoint(edge.node1, edge.node2, Endpoint::Tail)?;
        }
        if edge.endpoint2 == Endpoint::Circle {
            graph.set_endpoint(edge.node2, edge.node1, Endpoint::Tail)?;
        }
    }
    Ok(())
}

/// Inverse of [`finalize_cpdag`]: every `---` edge becomes `o-o` again so the
/// closure can be rerun on a finished CPDAG.
pub fn reopen_undirected(graph: &mut Graph) -> Result<(), CausalError> {
    let edges: Vec<_> = graph
        .edges()
        .into_iter()
        .filter(|e| e.is_undirected())
        .copied()
        .collect();
    for edge in edges {
        graph.set_endpoint(edge.node1, edge.node2, Endpoint::Circle)?;
        graph.set_endpoint(edge.node2, edge.node1, Endpoint::Circle)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graph::{Graph, TripleState};
    use crate::engine::knowledge::Knowledge;

    fn graph(names: &[&str], edges: &[&str]) -> Graph {
        let mut g = Graph::with_nodes(names.iter().copied()).unwrap();
        for spec in edges {
            g.add_edge_spec(spec).unwrap();
        }
        g
    }

    fn id(g: &Graph, name: &str) -> NodeId {
        g.node_by_name(name).unwrap()
    }

    fn close(g: &mut Graph, mode: OrientationMode, rules: Vec<Rule>) -> Diagnostics {
        let knowledge = KnowledgeIndex::unconstrained();
        let sepsets = SepsetMap::new();
        let context = RuleContext {
            sepsets: &sepsets,
            oracle: None,
            discriminating_paths: DiscriminatingPathPolicy::Sepsets,
            max_discriminating_path_length: None,
        };
        let mut diagnostics = Diagnostics::new();
        OrientationEngine::new(MarkGuard::new(mode, &knowledge), rules, context)
            .run(g, &mut diagnostics)
            .unwrap();
        diagnostics
    }

    #[test]
    fn guard_rejects_committed_marks() {
        let g = graph(&["A", "B"], &["A --> B"]);
        let knowledge = KnowledgeIndex::unconstrained();
        let guard = MarkGuard::new(OrientationMode::Cpdag, &knowledge);
        let (a, b) = (id(&g, "A"), id(&g, "B"));
        assert_eq!(guard.check(&g, &Mark::directed(a, b)).unwrap(), Verdict::NoOp);
        assert!(matches!(
            guard.check(&g, &Mark::directed(b, a)).unwrap(),
            Verdict::Conflict {
                reason: ConflictReason::CommittedMark,
                ..
            }
        ));
    }

    #[test]
    fn guard_rejects_cycles_in_cpdag_mode() {
        let g = graph(&["A", "B", "C"], &["A --> B", "B --> C", "A o-o C"]);
        let knowledge = KnowledgeIndex::unconstrained();
        let (a, c) = (id(&g, "A"), id(&g, "C"));
        let cpdag = MarkGuard::new(OrientationMode::Cpdag, &knowledge);
        assert!(matches!(
            cpdag.check(&g, &Mark::directed(c, a)).unwrap(),
            Verdict::Conflict {
                reason: ConflictReason::Cycle,
                ..
            }
        ));
        assert_eq!(cpdag.check(&g, &Mark::directed(a, c)).unwrap(), Verdict::Apply);
    }

    #[test]
    fn guard_rejects_knowledge_violations() {
        let mut g = graph(&["A", "B"], &["A o-o B"]);
        let mut knowledge = Knowledge::new();
        knowledge.forbid("B", "A");
        let index = knowledge.resolve(&g).unwrap();
        let guard = MarkGuard::new(OrientationMode::Cpdag, &index);
        let (a, b) = (id(&g, "A"), id(&g, "B"));
        let mut diagnostics = Diagnostics::new();
        assert!(!guard.commit(&mut g, "test", &Mark::directed(b, a), &mut diagnostics).unwrap());
        assert_eq!(diagnostics.conflicts().count(), 1);
        assert!(g.edge(a, b).unwrap().is_nondirected());
    }

    #[test]
    fn knowledge_orients_forbidden_reverse() {
        let mut g = graph(&["A", "B"], &["A o-o B"]);
        let mut knowledge = Knowledge::new();
        knowledge.forbid("B", "A");
        let index = knowledge.resolve(&g).unwrap();
        let guard = MarkGuard::new(OrientationMode::Cpdag, &index);
        let mut diagnostics = Diagnostics::new();
        orient_with_knowledge(&mut g, &guard, &mut diagnostics).unwrap();
        assert!(g.is_directed_from_to(id(&g, "A"), id(&g, "B")));
    }

    #[test]
    fn meek_r1_chains_away_from_collider() {
        let mut g = graph(&["A", "B", "C", "D"], &["A --> B", "C --> B", "B o-o D"]);
        close(&mut g, OrientationMode::Cpdag, Rule::meek(false));
        assert!(g.is_directed_from_to(id(&g, "B"), id(&g, "D")));
    }

    #[test]
    fn meek_r1_respects_ambiguous_triples() {
        let mut g = graph(&["A", "B", "D"], &["A --> B", "B o-o D"]);
        let (a, b, d) = (id(&g, "A"), id(&g, "B"), id(&g, "D"));
        g.set_triple(a, b, d, TripleState::Ambiguous);
        close(&mut g, OrientationMode::Cpdag, Rule::meek(false));
        assert!(g.edge(b, d).unwrap().is_nondirected());
    }

    #[test]
    fn meek_r2_avoids_cycles() {
        let mut g = graph(&["A", "B", "C"], &["A --> B", "B --> C", "A o-o C"]);
        close(&mut g, OrientationMode::Cpdag, Rule::meek(false));
        assert!(g.is_directed_from_to(id(&g, "A"), id(&g, "C")));
    }

    #[test]
    fn meek_r3_orients_into_double_collider() {
        let mut g = graph(
            &["A", "B", "C", "D"],
            &["A o-o B", "A o-o C", "A o-o D", "C --> B", "D --> B"],
        );
        close(&mut g, OrientationMode::Cpdag, Rule::meek(false));
        assert!(g.is_directed_from_to(id(&g, "A"), id(&g, "B")));
        assert!(g.edge(id(&g, "A"), id(&g, "C")).unwrap().is_nondirected());
    }

    #[test]
    fn meek_r4_completes_knowledge_chains() {
        let mut g = graph(
            &["A", "B", "C", "D"],
            &["A o-o B", "A o-o C", "A o-o D", "C --> D", "D --> B"],
        );
        close(&mut g, OrientationMode::Cpdag, Rule::meek(true));
        assert!(g.is_directed_from_to(id(&g, "A"), id(&g, "B")));
    }

    #[test]
    fn fci_r1_orients_away_from_arrowhead() {
        // A *-> B o-o C, A and C not adjacent
        let mut g = graph(&["A", "B", "C"], &["A o-> B", "B o-o C"]);
        let (a, b, c) = (id(&g, "A"), id(&g, "B"), id(&g, "C"));
        g.set_triple(a, b, c, TripleState::NonCollider);
        close(&mut g, OrientationMode::Pag, Rule::fci(false));
        assert!(g.is_directed_from_to(b, c));
    }

    #[test]
    fn fci_r1_leaves_undecided_triples_open() {
        // No sepset for A-C, so the collider phase never annotated A-B-C
        let mut g = graph(&["A", "B", "C"], &["A o-> B", "B o-o C"]);
        let diagnostics = close(&mut g, OrientationMode::Pag, Rule::fci(false));
        assert!(g.edge(id(&g, "B"), id(&g, "C")).unwrap().is_nondirected());
        assert!(diagnostics.events().is_empty());
    }

    #[test]
    fn failed_requery_is_counted_and_reported() {
        use crate::engine::errors::OracleError;
        use crate::engine::oracle::IndependenceResult;

        struct Failing(Vec<String>);
        impl IndependenceOracle for Failing {
            fn variables(&self) -> &[String] {
                &self.0
            }
            fn test(&self, _: NodeId, _: NodeId, _: &[NodeId]) -> Result<IndependenceResult, OracleError> {
                Err(OracleError::new("singular covariance"))
            }
        }

        // D o-> A <-> B o-o C with A --> C: a discriminating path for B
        let mut g = graph(&["D", "A", "B", "C"], &["D o-> A", "A <-> B", "A --> C", "B o-o C"]);
        let (d, b, c) = (id(&g, "D"), id(&g, "B"), id(&g, "C"));
        let oracle = Failing(["D", "A", "B", "C"].map(String::from).to_vec());
        let knowledge = KnowledgeIndex::unconstrained();
        let sepsets = SepsetMap::new();
        let context = RuleContext {
            sepsets: &sepsets,
            oracle: Some(&oracle),
            discriminating_paths: DiscriminatingPathPolicy::Requery,
            max_discriminating_path_length: None,
        };
        let mut diagnostics = Diagnostics::new();
        OrientationEngine::new(MarkGuard::new(OrientationMode::Pag, &knowledge), vec![Rule::FciR4], context)
            .with_parallel(false)
            .run(&mut g, &mut diagnostics)
            .unwrap();

        assert!(g.edge(b, c).unwrap().is_nondirected());
        assert_eq!(diagnostics.oracle_failures(), 1);
        assert_eq!(diagnostics.tests_run(), 1);
        assert!(diagnostics.events().iter().any(|e| matches!(
            e,
            DiagnosticEvent::OracleFailure { x, y, .. } if (*x, *y) == (d, c)
        )));
        assert!(diagnostics
            .events()
            .iter()
            .any(|e| *e == DiagnosticEvent::DiscriminatingPathUnresolved { b, c }));
    }

    #[test]
    fn closure_is_idempotent() {
        let mut g = graph(&["A", "B", "C", "D"], &["A --> B", "C --> B", "B o-o D"]);
        close(&mut g, OrientationMode::Cpdag, Rule::meek(false));
        let before = g.clone();
        let diagnostics = close(&mut g, OrientationMode::Cpdag, Rule::meek(false));
        assert!(diagnostics.events().is_empty());
        assert_eq!(
            before.edges().into_iter().copied().collect::<Vec<_>>(),
            g.edges().into_iter().copied().collect::<Vec<_>>()
        );
    }

    #[test]
    fn finalize_and_reopen_are_inverse_on_undecided_edges() {
        let mut g = graph(&["A", "B", "C"], &["A o-o B", "B --> C"]);
        finalize_cpdag(&mut g).unwrap();
        assert!(g.edge(id(&g, "A"), id(&g, "B")).unwrap().is_undirected());
        reopen_undirected(&mut g).unwrap();
        assert!(g.edge(id(&g, "A"), id(&g, "B")).unwrap().is_nondirected());
        assert!(g.is_directed_from_to(id(&g, "B"), id(&g, "C")));
    }

    #[test]
    fn cancelled_closure_is_partial() {
        let mut g = graph(&["A", "B", "D"], &["A --> B", "B o-o D"]);
        let knowledge = KnowledgeIndex::unconstrained();
        let sepsets = SepsetMap::new();
        let context = RuleContext {
            sepsets: &sepsets,
            oracle: None,
            discriminating_paths: DiscriminatingPathPolicy::Sepsets,
            max_discriminating_path_length: None,
        };
        let token = CancelToken::new();
        token.cancel();
        let mut diagnostics = Diagnostics::new();
        let stats = OrientationEngine::new(
            MarkGuard::new(OrientationMode::Cpdag, &knowledge),
            Rule::meek(false),
            context,
        )
        .with_cancel(&token)
        .run(&mut g, &mut diagnostics)
        .unwrap();
        assert!(stats.completeness.is_partial());
        assert_eq!(stats.passes, 0);
    }
}
