//! Structured record of why edges were removed and why orientations were
//! taken or skipped.
//!
//! Every [`DiagnosticEvent`] is kept in the [`Diagnostics`] returned with a
//! search result. With the `tracing` feature each event is also emitted as a
//! tracing event: decisions at debug level, conflicts and warnings at warn
//! level.

use crate::engine::graph::{Endpoint, Graph, NodeId};

/// Which stage removed an adjacency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStage {
    Adjacency,
    PossibleDsep,
}

/// Why a proposed mark was not committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The end already carries a different committed mark.
    CommittedMark,
    /// The resulting directed edge contradicts background knowledge.
    Knowledge,
    /// The resulting directed edge would close a directed cycle.
    Cycle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    EdgeRemoved {
        x: NodeId,
        y: NodeId,
        sepset: Vec<NodeId>,
        p_value: f64,
        stage: RemovalStage,
    },
    /// Removed before testing because both directions are forbidden.
    RemovedByKnowledge { x: NodeId, y: NodeId },
    OracleFailure {
        x: NodeId,
        y: NodeId,
        conditioning: Vec<NodeId>,
        reason: String,
    },
    /// Every test attempted for the pair failed; the edge was kept.
    UntestedPair { x: NodeId, y: NodeId },
    ColliderOriented { x: NodeId, y: NodeId, z: NodeId },
    NonCollider { x: NodeId, y: NodeId, z: NodeId },
    AmbiguousTriple { x: NodeId, y: NodeId, z: NodeId },
    ColliderSkipped {
        x: NodeId,
        y: NodeId,
        z: NodeId,
        reason: ConflictReason,
    },
    RuleApplied {
        rule: &'static str,
        marks: Vec<(NodeId, NodeId, Endpoint)>,
    },
    OrientationConflict {
        rule: &'static str,
        node: NodeId,
        toward: NodeId,
        wanted: Endpoint,
        found: Endpoint,
        reason: ConflictReason,
    },
    DiscriminatingPathUnresolved { b: NodeId, c: NodeId },
    IllegalResult { reason: String },
    Cancelled { stage: &'static str },
}

impl DiagnosticEvent {
    fn is_warning(&self) -> bool {
        matches!(
            self,
            DiagnosticEvent::OracleFailure { .. }
                | DiagnosticEvent::UntestedPair { .. }
                | DiagnosticEvent::ColliderSkipped { .. }
                | DiagnosticEvent::OrientationConflict { .. }
                | DiagnosticEvent::DiscriminatingPathUnresolved { .. }
                | DiagnosticEvent::IllegalResult { .. }
                | DiagnosticEvent::Cancelled { .. }
        )
    }

    /// Human-readable line using the graph's node names.
    pub fn describe(&self, graph: &Graph) -> String {
        let n = |id: &NodeId| graph.label(*id);
        let set = |ids: &[NodeId]| ids.iter().map(|id| graph.label(*id)).collect::<Vec<_>>().join(", ");
        match self {
            DiagnosticEvent::EdgeRemoved {
                x,
                y,
                sepset,
                p_value,
                stage,
            } => format!(
                "removed {} - {} given {{{}}} (p = {:.4}, {:?})",
                n(x),
                n(y),
                set(sepset),
                p_value,
                stage
            ),
            DiagnosticEvent::RemovedByKnowledge { x, y } => {
                format!("removed {} - {}: forbidden in both directions", n(x), n(y))
            }
            DiagnosticEvent::OracleFailure {
                x,
                y,
                conditioning,
                reason,
            } => format!(
                "test {} _||_ {} | {{{}}} failed: {}",
                n(x),
                n(y),
                set(conditioning),
                reason
            ),
            DiagnosticEvent::UntestedPair { x, y } => {
                format!("{} - {} kept untested: every test failed", n(x), n(y))
            }
            DiagnosticEvent::ColliderOriented { x, y, z } => {
                format!("collider {} *-> {} <-* {}", n(x), n(y), n(z))
            }
            DiagnosticEvent::NonCollider { x, y, z } => {
                format!("non-collider {} - {} - {}", n(x), n(y), n(z))
            }
            DiagnosticEvent::AmbiguousTriple { x, y, z } => {
                format!("ambiguous triple {} - {} - {}", n(x), n(y), n(z))
            }
            DiagnosticEvent::ColliderSkipped { x, y, z, reason } => format!(
                "collider {} *-> {} <-* {} skipped ({:?})",
                n(x),
                n(y),
                n(z),
                reason
            ),
            DiagnosticEvent::RuleApplied { rule, marks } => {
                let marks: Vec<String> = marks
                    .iter()
                    .map(|(node, toward, mark)| format!("{:?} at {} on {}", mark, n(node), n(toward)))
                    .collect();
                format!("{}: {}", rule, marks.join("; "))
            }
            DiagnosticEvent::OrientationConflict {
                rule,
                node,
                toward,
                wanted,
                found,
                reason,
            } => format!(
                "{} wanted {:?} at {} on {} - {}, found {:?} ({:?})",
                rule,
                wanted,
                n(node),
                n(node),
                n(toward),
                found,
                reason
            ),
            DiagnosticEvent::DiscriminatingPathUnresolved { b, c } => {
                format!("discriminating path for {} on {} unresolved", n(b), n(c))
            }
            DiagnosticEvent::IllegalResult { reason } => format!("illegal result: {}", reason),
            DiagnosticEvent::Cancelled { stage } => format!("cancelled during {}", stage),
        }
    }
}

/// Collected diagnostics of one search run.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    events: Vec<DiagnosticEvent>,
    tests_run: usize,
    oracle_failures: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: DiagnosticEvent) {
        #[cfg(feature = "tracing")]
        {
            if event.is_warning() {
                tracing::warn!(event = ?event, "causal search");
            } else {
                tracing::debug!(event = ?event, "causal search");
            }
        }
        if matches!(event, DiagnosticEvent::OracleFailure { .. }) {
            self.oracle_failures += 1;
        }
        self.events.push(event);
    }

    pub(crate) fn count_tests(&mut self, n: usize) {
        self.tests_run += n;
    }

    pub fn events(&self) -> &[DiagnosticEvent] {
        &self.events
    }

    /// Number of independence tests issued.
    pub fn tests_run(&self) -> usize {
        self.tests_run
    }

    pub fn oracle_failures(&self) -> usize {
        self.oracle_failures
    }

    pub fn warnings(&self) -> impl Iterator<Item = &DiagnosticEvent> {
        self.events.iter().filter(|e| e.is_warning())
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &DiagnosticEvent> {
        self.events.iter().filter(|e| {
            matches!(
                e,
                DiagnosticEvent::OrientationConflict { .. } | DiagnosticEvent::ColliderSkipped { .. }
            )
        })
    }

    pub fn untested_pairs(&self) -> Vec<(NodeId, NodeId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DiagnosticEvent::UntestedPair { x, y } => Some((*x, *y)),
                _ => None,
            })
            .collect()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.tests_run += other.tests_run;
        self.oracle_failures += other.oracle_failures;
        self.events.extend(other.events);
    }

    pub fn render(&self, graph: &Graph) -> Vec<String> {
        self.events.iter().map(|e| e.describe(graph)).collect()
    }
}
