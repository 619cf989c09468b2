//! Separating sets recorded when an adjacency is removed.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::graph::{EdgeKey, NodeId};

/// Conditioning set that rendered a pair independent, with the test's p-value.
#[derive(Debug, Clone, PartialEq)]
pub struct Sepset {
    /// Sorted ascending
    pub nodes: SmallVec<[NodeId; 4]>,
    pub p_value: f64,
}

impl Sepset {
    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.binary_search(&node).is_ok()
    }
}

/// Unordered pair to separating set.
#[derive(Debug, Clone, Default)]
pub struct SepsetMap {
    map: FxHashMap<EdgeKey, Sepset>,
}

impl SepsetMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `nodes` as the separating set of `x` and `y`, replacing any
    /// earlier record.
    pub fn set(&mut self, x: NodeId, y: NodeId, nodes: &[NodeId], p_value: f64) {
        let mut sorted: SmallVec<[NodeId; 4]> = nodes.iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();
        self.map.insert(
            EdgeKey::new(x, y),
            Sepset {
                nodes: sorted,
                p_value,
            },
        );
    }

    pub fn get(&self, x: NodeId, y: NodeId) -> Option<&Sepset> {
        self.map.get(&EdgeKey::new(x, y))
    }

    /// Whether `node` separates `x` and `y`; `None` when the pair has no record.
    pub fn separates(&self, x: NodeId, y: NodeId, node: NodeId) -> Option<bool> {
        self.get(x, y).map(|s| s.contains(node))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Records ordered by pair.
    pub fn iter(&self) -> Vec<((NodeId, NodeId), &Sepset)> {
        let mut out: Vec<((NodeId, NodeId), &Sepset)> =
            self.map.iter().map(|(k, s)| (k.nodes(), s)).collect();
        out.sort_unstable_by_key(|(pair, _)| *pair);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_symmetric_and_sorted() {
        let mut map = SepsetMap::new();
        map.set(NodeId(3), NodeId(1), &[NodeId(7), NodeId(2)], 0.4);
        let s = map.get(NodeId(1), NodeId(3)).unwrap();
        assert_eq!(s.nodes.as_slice(), &[NodeId(2), NodeId(7)]);
        assert_eq!(map.separates(NodeId(3), NodeId(1), NodeId(7)), Some(true));
        assert_eq!(map.separates(NodeId(3), NodeId(1), NodeId(5)), Some(false));
        assert_eq!(map.separates(NodeId(0), NodeId(1), NodeId(5)), None);
    }
}
