//! # Marked Causal Graph
//!
//! The graph model shared by every stage of the search.
//!
//! ## Key Components
//!
//! - **Node**: a named variable with a [`NodeKind`] tag
//! - **Edge**: an unordered node pair carrying one [`Endpoint`] mark per end
//! - **Graph**: nodes, edges, an incrementally maintained adjacency index and
//!   the triple annotations (collider / non-collider / ambiguous) that the
//!   orientation rules consult
//!
//! ## Design
//!
//! - Edges are keyed by their unordered node pair, so a pair holds at most one
//!   edge. An edge keeps the node order it was declared with; `endpoint1` is
//!   always the mark at `node1`. [`Edge::reversed`] swaps nodes and marks
//!   together.
//! - Adjacency lists are kept sorted by [`NodeId`] so every traversal is
//!   deterministic.
//! - Every mutation bumps a version counter. The orientation engine uses it to
//!   detect that proposals computed against an older state must be re-derived.
//!
//! ## Example
//!
//! ```rust
//! use causeway_core::engine::graph::{Edge, Endpoint, Graph, NodeKind};
//!
//! let mut g = Graph::new();
//! let a = g.add_node("A", NodeKind::Measured).unwrap();
//! let b = g.add_node("B", NodeKind::Measured).unwrap();
//! g.add_edge(Edge::nondirected(a, b)).unwrap();
//! g.set_endpoint(b, a, Endpoint::Arrow).unwrap();
//! assert_eq!(g.describe_edge(g.edge(a, b).unwrap()), "A o-> B");
//! ```

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::engine::errors::CausalError;

/// Inline capacity of a node's adjacency list.
const INLINE_NEIGHBORS: usize = 8;

/// Adjacency list of a single node, sorted by id.
pub type Neighbors = SmallVec<[NodeId; INLINE_NEIGHBORS]>;

/// A unique identifier for a node.
///
/// For graphs built by a search, `NodeId(i)` is the i-th variable of the
/// independence oracle.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl NodeId {
    /// Position of the node in its oracle's variable list.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Variant tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    #[default]
    Measured,
    Latent,
    Error,
    Selection,
}

/// A node of the graph. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// Using Arc<str> for cheap cloning into subgraphs and diagnostics
    pub name: Arc<str>,
    pub kind: NodeKind,
}

/// The mark at one end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endpoint {
    Tail,
    Arrow,
    Circle,
}

impl Endpoint {
    fn left_symbol(self) -> char {
        match self {
            Endpoint::Tail => '-',
            Endpoint::Arrow => '<',
            Endpoint::Circle => 'o',
        }
    }

    fn right_symbol(self) -> char {
        match self {
            Endpoint::Tail => '-',
            Endpoint::Arrow => '>',
            Endpoint::Circle => 'o',
        }
    }

    fn from_left_symbol(c: char) -> Option<Self> {
        match c {
            '-' => Some(Endpoint::Tail),
            '<' => Some(Endpoint::Arrow),
            'o' => Some(Endpoint::Circle),
            _ => None,
        }
    }

    fn from_right_symbol(c: char) -> Option<Self> {
        match c {
            '-' => Some(Endpoint::Tail),
            '>' => Some(Endpoint::Arrow),
            'o' => Some(Endpoint::Circle),
            _ => None,
        }
    }
}

/// An edge between two distinct nodes with an independent mark at each end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub node1: NodeId,
    pub node2: NodeId,
    /// Mark at `node1`
    pub endpoint1: Endpoint,
    /// Mark at `node2`
    pub endpoint2: Endpoint,
}

impl Edge {
    pub fn new(node1: NodeId, node2: NodeId, endpoint1: Endpoint, endpoint2: Endpoint) -> Self {
        Self {
            node1,
            node2,
            endpoint1,
            endpoint2,
        }
    }

    /// `from --> to`
    pub fn directed(from: NodeId, to: NodeId) -> Self {
        Self::new(from, to, Endpoint::Tail, Endpoint::Arrow)
    }

    /// `a --- b` (CPDAG undirected edge)
    pub fn undirected(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Tail, Endpoint::Tail)
    }

    /// `a o-o b`
    pub fn nondirected(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Circle, Endpoint::Circle)
    }

    /// `a o-> b`
    pub fn partially_oriented(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Circle, Endpoint::Arrow)
    }

    /// `a <-> b`
    pub fn bidirected(a: NodeId, b: NodeId) -> Self {
        Self::new(a, b, Endpoint::Arrow, Endpoint::Arrow)
    }

    /// The same edge declared from the other side: nodes and marks swap together.
    pub fn reversed(&self) -> Self {
        Self::new(self.node2, self.node1, self.endpoint2, self.endpoint1)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.node1 == node || self.node2 == node
    }

    /// The node at the other end of the edge.
    pub fn other(&self, node: NodeId) -> Option<NodeId> {
        if node == self.node1 {
            Some(self.node2)
        } else if node == self.node2 {
            Some(self.node1)
        } else {
            None
        }
    }

    /// The mark at `node`'s end.
    pub fn endpoint_at(&self, node: NodeId) -> Option<Endpoint> {
        if node == self.node1 {
            Some(self.endpoint1)
        } else if node == self.node2 {
            Some(self.endpoint2)
        } else {
            None
        }
    }

    fn endpoint_at_mut(&mut self, node: NodeId) -> Option<&mut Endpoint> {
        if node == self.node1 {
            Some(&mut self.endpoint1)
        } else if node == self.node2 {
            Some(&mut self.endpoint2)
        } else {
            None
        }
    }

    /// Exactly one Tail and one Arrow.
    pub fn is_directed(&self) -> bool {
        matches!(
            (self.endpoint1, self.endpoint2),
            (Endpoint::Tail, Endpoint::Arrow) | (Endpoint::Arrow, Endpoint::Tail)
        )
    }

    pub fn is_undirected(&self) -> bool {
        self.endpoint1 == Endpoint::Tail && self.endpoint2 == Endpoint::Tail
    }

    pub fn is_nondirected(&self) -> bool {
        self.endpoint1 == Endpoint::Circle && self.endpoint2 == Endpoint::Circle
    }

    pub fn is_bidirected(&self) -> bool {
        self.endpoint1 == Endpoint::Arrow && self.endpoint2 == Endpoint::Arrow
    }

    fn key(&self) -> EdgeKey {
        EdgeKey::new(self.node1, self.node2)
    }
}

/// Unordered node pair used to key edges and separating sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct EdgeKey(NodeId, NodeId);

impl EdgeKey {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn nodes(self) -> (NodeId, NodeId) {
        (self.0, self.1)
    }
}

/// A triple `<x, y, z>` with `y` in the middle.
///
/// Stored canonically with `x <= z`, so `<x, y, z>` and `<z, y, x>` are the
/// same triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub struct Triple {
    pub x: NodeId,
    pub y: NodeId,
    pub z: NodeId,
}

impl Triple {
    pub fn new(x: NodeId, y: NodeId, z: NodeId) -> Self {
        if x <= z {
            Self { x, y, z }
        } else {
            Self { x: z, y, z: x }
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.x == node || self.y == node || self.z == node
    }

    /// Whether `a`-`b` is one of the two consecutive pairs of the triple.
    fn uses_pair(&self, a: NodeId, b: NodeId) -> bool {
        let key = EdgeKey::new(a, b);
        key == EdgeKey::new(self.x, self.y) || key == EdgeKey::new(self.y, self.z)
    }
}

/// Recorded status of a triple.
///
/// `NonCollider` is the "underline" marking and `Ambiguous` the "dotted
/// underline" marking of the conservative collider rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TripleState {
    Collider,
    NonCollider,
    Ambiguous,
}

/// A mutable graph of named nodes and marked edges.
///
/// Not thread-safe for mutation; searches hand the graph between stages by
/// exclusive reference.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Nodes in ascending id order
    nodes: Vec<Node>,
    /// Index mapping NodeId to position in `nodes`
    node_index: FxHashMap<NodeId, usize>,
    name_index: FxHashMap<Arc<str>, NodeId>,
    edges: FxHashMap<EdgeKey, Edge>,
    adjacency: FxHashMap<NodeId, Neighbors>,
    triples: FxHashMap<Triple, TripleState>,
    next_id: u32,
    version: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph of measured nodes, one per name, with ids `0..n`.
    pub fn with_nodes<I, S>(names: I) -> Result<Self, CausalError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut graph = Self::new();
        for name in names {
            graph.add_node(name.as_ref(), NodeKind::Measured)?;
        }
        Ok(graph)
    }

    /// Creates the complete `o-o` graph over the given names.
    pub fn complete<I, S>(names: I) -> Result<Self, CausalError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut graph = Self::with_nodes(names)?;
        let ids: Vec<NodeId> = graph.node_ids().collect();
        for (i, &a) in ids.iter().enumerate() {
            for &b in &ids[i + 1..] {
                graph.add_edge(Edge::nondirected(a, b))?;
            }
        }
        Ok(graph)
    }

    /// Mutation counter; changes whenever nodes, edges, marks or triple
    /// annotations change.
    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn add_node(&mut self, name: &str, kind: NodeKind) -> Result<NodeId, CausalError> {
        if name.is_empty() {
            return Err(CausalError::InvalidOperation("node name is empty".into()));
        }
        if self.name_index.contains_key(name) {
            return Err(CausalError::InvalidOperation(format!(
                "node '{}' already exists",
                name
            )));
        }
        let id = NodeId(self.next_id);
        self.next_id += 1;
        let name: Arc<str> = Arc::from(name);
        self.node_index.insert(id, self.nodes.len());
        self.name_index.insert(name.clone(), id);
        self.nodes.push(Node { id, name, kind });
        self.adjacency.insert(id, Neighbors::new());
        self.touch();
        Ok(id)
    }

    /// Removes a node together with its incident edges and triple annotations.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, CausalError> {
        let pos = self.position(id)?;
        let neighbors = self.adjacency.remove(&id).unwrap_or_default();
        for other in neighbors {
            self.edges.remove(&EdgeKey::new(id, other));
            if let Some(list) = self.adjacency.get_mut(&other) {
                list.retain(|n| *n != id);
            }
        }
        self.triples.retain(|t, _| !t.contains(id));
        let node = self.nodes.remove(pos);
        self.name_index.remove(&node.name);
        self.node_index = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id, i))
            .collect();
        self.touch();
        Ok(node)
    }

    fn position(&self, id: NodeId) -> Result<usize, CausalError> {
        self.node_index
            .get(&id)
            .copied()
            .ok_or_else(|| CausalError::InvalidOperation(format!("unknown node {:?}", id)))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.node_index.get(&id).map(|&i| &self.nodes[i])
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.name_index.get(name).copied()
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_ref())
    }

    /// Node name for messages; falls back to the raw id.
    pub(crate) fn label(&self, id: NodeId) -> String {
        match self.name(id) {
            Some(name) => name.to_string(),
            None => format!("#{}", id.0),
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|n| n.id)
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<(), CausalError> {
        self.position(edge.node1)?;
        self.position(edge.node2)?;
        if edge.node1 == edge.node2 {
            return Err(CausalError::InvalidOperation(format!(
                "self loop on '{}'",
                self.label(edge.node1)
            )));
        }
        let key = edge.key();
        if self.edges.contains_key(&key) {
            return Err(CausalError::InvalidOperation(format!(
                "edge {} - {} already exists",
                self.label(edge.node1),
                self.label(edge.node2)
            )));
        }
        self.edges.insert(key, edge);
        insert_sorted(self.adjacency.entry(edge.node1).or_default(), edge.node2);
        insert_sorted(self.adjacency.entry(edge.node2).or_default(), edge.node1);
        self.touch();
        Ok(())
    }

    /// Removes the edge between `a` and `b` and the triple annotations built on it.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) -> Result<Edge, CausalError> {
        let edge = self.edges.remove(&EdgeKey::new(a, b)).ok_or_else(|| {
            CausalError::InvalidOperation(format!(
                "no edge between '{}' and '{}'",
                self.label(a),
                self.label(b)
            ))
        })?;
        if let Some(list) = self.adjacency.get_mut(&a) {
            list.retain(|n| *n != b);
        }
        if let Some(list) = self.adjacency.get_mut(&b) {
            list.retain(|n| *n != a);
        }
        self.triples.retain(|t, _| !t.uses_pair(a, b));
        self.touch();
        Ok(edge)
    }

    pub fn edge(&self, a: NodeId, b: NodeId) -> Option<&Edge> {
        self.edges.get(&EdgeKey::new(a, b))
    }

    /// All edges ordered by their node pair.
    pub fn edges(&self) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.edges.values().collect();
        edges.sort_unstable_by_key(|e| e.key());
        edges
    }

    /// Neighbors of `node` in ascending id order. Empty for unknown nodes.
    pub fn adjacent_nodes(&self, node: NodeId) -> &[NodeId] {
        self.adjacency.get(&node).map_or(&[], |list| list.as_slice())
    }

    pub fn is_adjacent(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.edges.contains_key(&EdgeKey::new(a, b))
    }

    /// The mark at `node`'s end of the edge `node`-`toward`.
    pub fn endpoint(&self, node: NodeId, toward: NodeId) -> Option<Endpoint> {
        self.edge(node, toward).and_then(|e| e.endpoint_at(node))
    }

    /// Sets the mark at `node`'s end of the edge `node`-`toward`, leaving the
    /// other end untouched.
    pub fn set_endpoint(
        &mut self,
        node: NodeId,
        toward: NodeId,
        mark: Endpoint,
    ) -> Result<(), CausalError> {
        self.position(node)?;
        self.position(toward)?;
        if !self.is_adjacent(node, toward) {
            return Err(CausalError::InvalidOperation(format!(
                "no edge between '{}' and '{}'",
                self.label(node),
                self.label(toward)
            )));
        }
        let edge = self
            .edges
            .get_mut(&EdgeKey::new(node, toward))
            .ok_or_else(|| CausalError::Internal("adjacency index out of sync".into()))?;
        let slot = edge
            .endpoint_at_mut(node)
            .ok_or_else(|| CausalError::Internal("edge keyed under wrong pair".into()))?;
        if *slot != mark {
            *slot = mark;
            self.touch();
        }
        Ok(())
    }

    /// Sets both marks of every edge to `mark`.
    pub fn reorient_all(&mut self, mark: Endpoint) {
        for edge in self.edges.values_mut() {
            edge.endpoint1 = mark;
            edge.endpoint2 = mark;
        }
        self.touch();
    }

    /// `a --> b`
    pub fn is_directed_from_to(&self, a: NodeId, b: NodeId) -> bool {
        self.endpoint(a, b) == Some(Endpoint::Tail) && self.endpoint(b, a) == Some(Endpoint::Arrow)
    }

    pub fn parents(&self, node: NodeId) -> Vec<NodeId> {
        self.adjacent_nodes(node)
            .iter()
            .copied()
            .filter(|&p| self.is_directed_from_to(p, node))
            .collect()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.adjacent_nodes(node)
            .iter()
            .copied()
            .filter(|&c| self.is_directed_from_to(node, c))
            .collect()
    }

    /// `a *-> b <-* c`
    pub fn is_def_collider(&self, a: NodeId, b: NodeId, c: NodeId) -> bool {
        self.endpoint(b, a) == Some(Endpoint::Arrow) && self.endpoint(b, c) == Some(Endpoint::Arrow)
    }

    /// `a` and `c` are both adjacent to `b` but not to each other.
    pub fn is_unshielded(&self, a: NodeId, b: NodeId, c: NodeId) -> bool {
        a != c && self.is_adjacent(a, b) && self.is_adjacent(b, c) && !self.is_adjacent(a, c)
    }

    /// All unshielded triples `(x, y, z)` with `x < z`, ordered by `(y, x, z)`.
    pub fn unshielded_triples(&self) -> Vec<(NodeId, NodeId, NodeId)> {
        let mut out = Vec::new();
        for y in self.node_ids() {
            let adj = self.adjacent_nodes(y);
            for (i, &x) in adj.iter().enumerate() {
                for &z in &adj[i + 1..] {
                    if !self.is_adjacent(x, z) {
                        out.push((x, y, z));
                    }
                }
            }
        }
        out
    }

    /// Whether a directed path `from --> ... --> to` exists.
    pub fn exists_directed_path(&self, from: NodeId, to: NodeId) -> bool {
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if !visited.insert(node) {
                continue;
            }
            stack.extend(self.children(node).into_iter().filter(|c| !visited.contains(c)));
        }
        false
    }

    /// Depth-first search over directed edges with an explicit stack and
    /// on-stack membership test.
    pub fn exists_directed_cycle(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }

        let mut state: FxHashMap<NodeId, Mark> =
            self.node_ids().map(|n| (n, Mark::Unvisited)).collect();

        for root in self.node_ids() {
            if state[&root] != Mark::Unvisited {
                continue;
            }
            // (node, children, next child index)
            let mut stack: Vec<(NodeId, Vec<NodeId>, usize)> = vec![(root, self.children(root), 0)];
            state.insert(root, Mark::OnStack);
            while let Some(frame) = stack.last_mut() {
                if frame.2 < frame.1.len() {
                    let child = frame.1[frame.2];
                    frame.2 += 1;
                    match state[&child] {
                        Mark::OnStack => return true,
                        Mark::Done => {}
                        Mark::Unvisited => {
                            state.insert(child, Mark::OnStack);
                            let grandchildren = self.children(child);
                            stack.push((child, grandchildren, 0));
                        }
                    }
                } else {
                    state.insert(frame.0, Mark::Done);
                    stack.pop();
                }
            }
        }
        false
    }

    /// `seeds` plus every node with a directed path into a seed.
    pub fn ancestors_of(&self, seeds: &[NodeId]) -> FxHashSet<NodeId> {
        let mut closed: FxHashSet<NodeId> = FxHashSet::default();
        let mut worklist: Vec<NodeId> = seeds.to_vec();
        while let Some(node) = worklist.pop() {
            if !closed.insert(node) {
                continue;
            }
            for parent in self.parents(node) {
                if !closed.contains(&parent) {
                    worklist.push(parent);
                }
            }
        }
        closed
    }

    /// Induced subgraph over `keep`, preserving ids, edge marks and the triple
    /// annotations whose nodes all survive.
    pub fn subgraph(&self, keep: &[NodeId]) -> Result<Graph, CausalError> {
        let keep_set: FxHashSet<NodeId> = keep.iter().copied().collect();
        for &id in &keep_set {
            self.position(id)?;
        }
        let mut sub = Graph {
            next_id: self.next_id,
            ..Graph::default()
        };
        for node in self.nodes.iter().filter(|n| keep_set.contains(&n.id)) {
            sub.node_index.insert(node.id, sub.nodes.len());
            sub.name_index.insert(node.name.clone(), node.id);
            sub.adjacency.insert(node.id, Neighbors::new());
            sub.nodes.push(node.clone());
        }
        for edge in self.edges() {
            if keep_set.contains(&edge.node1) && keep_set.contains(&edge.node2) {
                sub.add_edge(*edge)?;
            }
        }
        for (triple, state) in &self.triples {
            if keep_set.contains(&triple.x)
                && keep_set.contains(&triple.y)
                && keep_set.contains(&triple.z)
            {
                sub.triples.insert(*triple, *state);
            }
        }
        Ok(sub)
    }

    pub fn set_triple(&mut self, x: NodeId, y: NodeId, z: NodeId, state: TripleState) {
        let previous = self.triples.insert(Triple::new(x, y, z), state);
        if previous != Some(state) {
            self.touch();
        }
    }

    pub fn triple_state(&self, x: NodeId, y: NodeId, z: NodeId) -> Option<TripleState> {
        self.triples.get(&Triple::new(x, y, z)).copied()
    }

    /// All annotated triples in canonical order.
    pub fn triples(&self) -> Vec<(Triple, TripleState)> {
        let mut out: Vec<(Triple, TripleState)> =
            self.triples.iter().map(|(t, s)| (*t, *s)).collect();
        out.sort_unstable_by_key(|(t, _)| *t);
        out
    }

    pub fn clear_triples(&mut self) {
        if !self.triples.is_empty() {
            self.triples.clear();
            self.touch();
        }
    }

    /// Renders an edge as `A o-> B` using node names.
    pub fn describe_edge(&self, edge: &Edge) -> String {
        format!(
            "{} {}-{} {}",
            self.label(edge.node1),
            edge.endpoint1.left_symbol(),
            edge.endpoint2.right_symbol(),
            self.label(edge.node2)
        )
    }

    /// Adds an edge written as `A --> B`, `A o-o B`, `A <-> B`, etc.
    ///
    /// Both nodes must already exist.
    pub fn add_edge_spec(&mut self, spec: &str) -> Result<(), CausalError> {
        let (left, endpoint1, endpoint2, right) = parse_edge(spec)?;
        let missing =
            |name: &str| CausalError::InvalidOperation(format!("unknown node '{}'", name));
        let node1 = self.node_by_name(&left).ok_or_else(|| missing(&left))?;
        let node2 = self.node_by_name(&right).ok_or_else(|| missing(&right))?;
        self.add_edge(Edge::new(node1, node2, endpoint1, endpoint2))
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.nodes.iter().map(|n| n.name.as_ref()).collect();
        writeln!(f, "Nodes: {}", names.join(", "))?;
        writeln!(f, "Edges:")?;
        for (i, edge) in self.edges().into_iter().enumerate() {
            writeln!(f, "  {}. {}", i + 1, self.describe_edge(edge))?;
        }
        Ok(())
    }
}

/// Splits an edge written as `A o-> B` into its names and marks.
pub fn parse_edge(spec: &str) -> Result<(String, Endpoint, Endpoint, String), CausalError> {
    let malformed = || CausalError::Input(format!("malformed edge '{}'", spec));
    let parts: Vec<&str> = spec.split_whitespace().collect();
    let [left, connector, right] = parts.as_slice() else {
        return Err(malformed());
    };
    let symbols: Vec<char> = connector.chars().collect();
    let [l, '-', r] = symbols.as_slice() else {
        return Err(malformed());
    };
    let endpoint1 = Endpoint::from_left_symbol(*l).ok_or_else(malformed)?;
    let endpoint2 = Endpoint::from_right_symbol(*r).ok_or_else(malformed)?;
    Ok((left.to_string(), endpoint1, endpoint2, right.to_string()))
}

fn insert_sorted(list: &mut Neighbors, node: NodeId) {
    if let Err(pos) = list.binary_search(&node) {
        list.insert(pos, node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> (Graph, NodeId, NodeId, NodeId) {
        let mut g = Graph::new();
        let a = g.add_node("A", NodeKind::Measured).unwrap();
        let b = g.add_node("B", NodeKind::Measured).unwrap();
        let c = g.add_node("C", NodeKind::Latent).unwrap();
        (g, a, b, c)
    }

    #[test]
    fn add_edge_rejects_self_loop_parallel_and_unknown() {
        let (mut g, a, b, _) = abc();
        assert!(g.add_edge(Edge::directed(a, a)).is_err());
        g.add_edge(Edge::directed(a, b)).unwrap();
        assert!(matches!(
            g.add_edge(Edge::directed(b, a)),
            Err(CausalError::InvalidOperation(_))
        ));
        assert!(g.add_edge(Edge::directed(a, NodeId(99))).is_err());
    }

    #[test]
    fn duplicate_node_names_rejected() {
        let (mut g, ..) = abc();
        assert!(g.add_node("A", NodeKind::Measured).is_err());
    }

    #[test]
    fn set_endpoint_changes_only_the_named_end() {
        let (mut g, a, b, _) = abc();
        g.add_edge(Edge::nondirected(a, b)).unwrap();
        g.set_endpoint(b, a, Endpoint::Arrow).unwrap();
        assert_eq!(g.endpoint(b, a), Some(Endpoint::Arrow));
        assert_eq!(g.endpoint(a, b), Some(Endpoint::Circle));
        // Declared order is preserved even though the query came from b's side
        let edge = g.edge(b, a).unwrap();
        assert_eq!(edge.node1, a);
        assert_eq!(edge.endpoint2, Endpoint::Arrow);
    }

    #[test]
    fn reversed_swaps_marks_with_nodes() {
        let e = Edge::partially_oriented(NodeId(0), NodeId(1));
        let r = e.reversed();
        assert_eq!(r.node1, NodeId(1));
        assert_eq!(r.endpoint1, Endpoint::Arrow);
        assert_eq!(r.endpoint_at(NodeId(0)), Some(Endpoint::Circle));
    }

    #[test]
    fn remove_node_cascades_to_edges_and_triples() {
        let (mut g, a, b, c) = abc();
        g.add_edge(Edge::nondirected(a, b)).unwrap();
        g.add_edge(Edge::nondirected(b, c)).unwrap();
        g.set_triple(a, b, c, TripleState::NonCollider);
        g.remove_node(c).unwrap();
        assert_eq!(g.num_edges(), 1);
        assert!(g.adjacent_nodes(b) == [a]);
        assert!(g.triples().is_empty());
        assert!(g.node_by_name("C").is_none());
        assert_eq!(g.node(b).unwrap().name.as_ref(), "B");
    }

    #[test]
    fn remove_edge_drops_dependent_triples() {
        let (mut g, a, b, c) = abc();
        g.add_edge(Edge::nondirected(a, b)).unwrap();
        g.add_edge(Edge::nondirected(b, c)).unwrap();
        g.set_triple(c, b, a, TripleState::Ambiguous);
        assert_eq!(g.triple_state(a, b, c), Some(TripleState::Ambiguous));
        g.remove_edge(b, a).unwrap();
        assert_eq!(g.triple_state(a, b, c), None);
        assert!(g.remove_edge(a, b).is_err());
    }

    #[test]
    fn directed_cycle_detection() {
        let (mut g, a, b, c) = abc();
        g.add_edge(Edge::directed(a, b)).unwrap();
        g.add_edge(Edge::directed(b, c)).unwrap();
        g.add_edge(Edge::nondirected(c, a)).unwrap();
        assert!(!g.exists_directed_cycle());
        g.set_endpoint(c, a, Endpoint::Tail).unwrap();
        g.set_endpoint(a, c, Endpoint::Arrow).unwrap();
        assert!(g.exists_directed_cycle());
    }

    #[test]
    fn ancestors_follow_directed_edges_only() {
        let (mut g, a, b, c) = abc();
        g.add_edge(Edge::directed(a, b)).unwrap();
        g.add_edge(Edge::partially_oriented(c, b)).unwrap();
        let anc = g.ancestors_of(&[b]);
        assert!(anc.contains(&a) && anc.contains(&b));
        assert!(!anc.contains(&c));
    }

    #[test]
    fn subgraph_preserves_marks_and_ids() {
        let (mut g, a, b, c) = abc();
        g.add_edge(Edge::partially_oriented(a, b)).unwrap();
        g.add_edge(Edge::directed(b, c)).unwrap();
        let sub = g.subgraph(&[a, b]).unwrap();
        assert_eq!(sub.num_nodes(), 2);
        assert_eq!(sub.num_edges(), 1);
        assert_eq!(sub.endpoint(a, b), Some(Endpoint::Circle));
        assert_eq!(sub.endpoint(b, a), Some(Endpoint::Arrow));
        assert!(g.subgraph(&[NodeId(42)]).is_err());
    }

    #[test]
    fn unshielded_triples_are_canonical() {
        let (mut g, a, b, c) = abc();
        g.add_edge(Edge::nondirected(c, b)).unwrap();
        g.add_edge(Edge::nondirected(b, a)).unwrap();
        assert_eq!(g.unshielded_triples(), vec![(a, b, c)]);
        g.add_edge(Edge::nondirected(a, c)).unwrap();
        assert!(g.unshielded_triples().is_empty());
    }

    #[test]
    fn edge_notation_round_trips_through_describe() {
        let (mut g, ..) = abc();
        g.add_edge_spec("A o-> B").unwrap();
        g.add_edge_spec("C <-- B").unwrap();
        let rendered: Vec<String> = g.edges().iter().map(|e| g.describe_edge(e)).collect();
        assert_eq!(rendered, vec!["A o-> B", "C <-- B"]);
        assert!(g.add_edge_spec("A => C").is_err());
        assert!(g.add_edge_spec("A --> Z").is_err());
    }

    #[test]
    fn version_changes_on_mark_updates_only_when_different() {
        let (mut g, a, b, _) = abc();
        g.add_edge(Edge::nondirected(a, b)).unwrap();
        let v = g.version();
        g.set_endpoint(a, b, Endpoint::Circle).unwrap();
        assert_eq!(g.version(), v);
        g.set_endpoint(a, b, Endpoint::Tail).unwrap();
        assert_ne!(g.version(), v);
    }
}
