//! Background knowledge: forbidden edges, required edges and temporal tiers.
//!
//! [`Knowledge`] is stated over node names and supplied fully formed by the
//! caller. A search resolves it once against its graph into a
//! [`KnowledgeIndex`] keyed by [`NodeId`]; both answer the same queries and
//! neither is mutated by the engine.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::engine::errors::CausalError;
use crate::engine::graph::{Graph, NodeId};

/// One tier of the temporal ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tier {
    pub nodes: BTreeSet<String>,
    /// Forbid edges between two members of this tier.
    #[cfg_attr(feature = "serde", serde(default))]
    pub forbid_within: bool,
}

/// Edge constraints over node names.
///
/// Tiers forbid every edge from a later tier into an earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Knowledge {
    #[cfg_attr(feature = "serde", serde(default))]
    forbidden: BTreeSet<(String, String)>,
    #[cfg_attr(feature = "serde", serde(default))]
    required: BTreeSet<(String, String)>,
    #[cfg_attr(feature = "serde", serde(default))]
    tiers: Vec<Tier>,
}

impl Knowledge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.forbidden.is_empty() && self.required.is_empty() && self.tiers.is_empty()
    }

    /// Forbids the directed edge `from --> to`.
    pub fn forbid(&mut self, from: &str, to: &str) -> &mut Self {
        self.forbidden.insert((from.to_string(), to.to_string()));
        self
    }

    /// Requires the directed edge `from --> to`.
    pub fn require(&mut self, from: &str, to: &str) -> &mut Self {
        self.required.insert((from.to_string(), to.to_string()));
        self
    }

    /// Places `name` in tier `tier`, creating empty tiers as needed.
    pub fn add_to_tier(&mut self, tier: usize, name: &str) -> &mut Self {
        if self.tiers.len() <= tier {
            self.tiers.resize_with(tier + 1, Tier::default);
        }
        self.tiers[tier].nodes.insert(name.to_string());
        self
    }

    pub fn set_tier_forbidden_within(&mut self, tier: usize, forbid: bool) -> &mut Self {
        if self.tiers.len() <= tier {
            self.tiers.resize_with(tier + 1, Tier::default);
        }
        self.tiers[tier].forbid_within = forbid;
        self
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    /// The first tier containing `name`.
    pub fn tier_of(&self, name: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t.nodes.contains(name))
    }

    /// Explicitly forbidden, or forbidden by the tier ordering.
    pub fn is_forbidden(&self, from: &str, to: &str) -> bool {
        if self.forbidden.contains(&(from.to_string(), to.to_string())) {
            return true;
        }
        match (self.tier_of(from), self.tier_of(to)) {
            (Some(tf), Some(tt)) if tf > tt => true,
            (Some(tf), Some(tt)) if tf == tt => self.tiers[tf].forbid_within,
            _ => false,
        }
    }

    pub fn is_required(&self, from: &str, to: &str) -> bool {
        self.required.contains(&(from.to_string(), to.to_string()))
    }

    /// Whether committing the directed edge `from --> to` contradicts the
    /// knowledge.
    pub fn is_violated_by(&self, from: &str, to: &str) -> bool {
        self.is_forbidden(from, to) || self.is_required(to, from)
    }

    pub fn required_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.required.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    pub fn forbidden_edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.forbidden.iter().map(|(a, b)| (a.as_str(), b.as_str()))
    }

    /// Checks the knowledge for internal consistency and against a node set.
    ///
    /// Rejects: a node placed in two tiers, names not in `names`, a required
    /// edge that is also forbidden, required edges in both directions, and a
    /// directed cycle of required edges.
    pub fn validate<S: AsRef<str>>(&self, names: &[S]) -> Result<(), CausalError> {
        let known: FxHashSet<&str> = names.iter().map(|n| n.as_ref()).collect();
        let check_known = |name: &str| -> Result<(), CausalError> {
            if known.contains(name) {
                Ok(())
            } else {
                Err(CausalError::Input(format!(
                    "knowledge refers to unknown node '{}'",
                    name
                )))
            }
        };

        let mut seen_in_tier: FxHashMap<&str, usize> = FxHashMap::default();
        for (index, tier) in self.tiers.iter().enumerate() {
            for name in &tier.nodes {
                check_known(name)?;
                if let Some(other) = seen_in_tier.insert(name.as_str(), index) {
                    return Err(CausalError::Input(format!(
                        "node '{}' is placed in tiers {} and {}",
                        name, other, index
                    )));
                }
            }
        }

        for (from, to) in self.forbidden_edges() {
            check_known(from)?;
            check_known(to)?;
        }

        for (from, to) in self.required_edges() {
            check_known(from)?;
            check_known(to)?;
            if from == to {
                return Err(CausalError::Input(format!(
                    "required edge {} --> {} is a self loop",
                    from, to
                )));
            }
            if self.is_forbidden(from, to) {
                return Err(CausalError::Input(format!(
                    "edge {} --> {} is both required and forbidden",
                    from, to
                )));
            }
            if self.is_required(to, from) {
                return Err(CausalError::Input(format!(
                    "edges {} --> {} and {} --> {} are both required",
                    from, to, to, from
                )));
            }
        }

        if let Some(node) = self.required_cycle() {
            return Err(CausalError::Input(format!(
                "required edges form a directed cycle through '{}'",
                node
            )));
        }
        Ok(())
    }

    /// A node on a directed cycle of required edges, if any.
    fn required_cycle(&self) -> Option<&str> {
        let mut children: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for (from, to) in self.required_edges() {
            children.entry(from).or_default().push(to);
        }
        let mut done: FxHashSet<&str> = FxHashSet::default();
        for (start, _) in self.required_edges() {
            if done.contains(start) {
                continue;
            }
            let mut on_stack: FxHashSet<&str> = FxHashSet::default();
            let mut stack: Vec<(&str, usize)> = vec![(start, 0)];
            on_stack.insert(start);
            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let kids = children.get(node).map_or(&[][..], |v| v.as_slice());
                if frame.1 < kids.len() {
                    let child = kids[frame.1];
                    frame.1 += 1;
                    if on_stack.contains(child) {
                        return Some(child);
                    }
                    if !done.contains(child) {
                        on_stack.insert(child);
                        stack.push((child, 0));
                    }
                } else {
                    on_stack.remove(node);
                    done.insert(node);
                    stack.pop();
                }
            }
        }
        None
    }

    /// Validates against the graph's node names and indexes by [`NodeId`].
    pub fn resolve(&self, graph: &Graph) -> Result<KnowledgeIndex, CausalError> {
        let names: Vec<&str> = graph.nodes().iter().map(|n| n.name.as_ref()).collect();
        self.validate(&names)?;

        let id = |name: &str| -> Result<NodeId, CausalError> {
            graph
                .node_by_name(name)
                .ok_or_else(|| CausalError::Input(format!("unknown node '{}'", name)))
        };

        let mut index = KnowledgeIndex {
            empty: self.is_empty(),
            ..KnowledgeIndex::default()
        };
        for (from, to) in self.forbidden_edges() {
            index.forbidden.insert((id(from)?, id(to)?));
        }
        for (from, to) in self.required_edges() {
            index.required.push((id(from)?, id(to)?));
        }
        index.required.sort_unstable();
        for (t, tier) in self.tiers.iter().enumerate() {
            for name in &tier.nodes {
                index.tier.insert(id(name)?, t);
            }
            index.forbid_within.push(tier.forbid_within);
        }
        Ok(index)
    }
}

/// [`Knowledge`] resolved against one graph's node ids.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeIndex {
    forbidden: FxHashSet<(NodeId, NodeId)>,
    /// Sorted for deterministic orientation order
    required: Vec<(NodeId, NodeId)>,
    tier: FxHashMap<NodeId, usize>,
    forbid_within: Vec<bool>,
    empty: bool,
}

impl KnowledgeIndex {
    /// An index that constrains nothing.
    pub fn unconstrained() -> Self {
        Self {
            empty: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn tier_of(&self, node: NodeId) -> Option<usize> {
        self.tier.get(&node).copied()
    }

    pub fn is_forbidden(&self, from: NodeId, to: NodeId) -> bool {
        if self.forbidden.contains(&(from, to)) {
            return true;
        }
        match (self.tier_of(from), self.tier_of(to)) {
            (Some(tf), Some(tt)) if tf > tt => true,
            (Some(tf), Some(tt)) if tf == tt => self.forbid_within[tf],
            _ => false,
        }
    }

    pub fn is_required(&self, from: NodeId, to: NodeId) -> bool {
        self.required.binary_search(&(from, to)).is_ok()
    }

    pub fn is_violated_by(&self, from: NodeId, to: NodeId) -> bool {
        self.is_forbidden(from, to) || self.is_required(to, from)
    }

    /// Whether `a`-`b` must stay adjacent.
    pub fn is_required_pair(&self, a: NodeId, b: NodeId) -> bool {
        self.is_required(a, b) || self.is_required(b, a)
    }

    /// Forbidden in both directions.
    pub fn is_forbidden_pair(&self, a: NodeId, b: NodeId) -> bool {
        self.is_forbidden(a, b) && self.is_forbidden(b, a)
    }

    pub fn required_edges(&self) -> &[(NodeId, NodeId)] {
        &self.required
    }
}
