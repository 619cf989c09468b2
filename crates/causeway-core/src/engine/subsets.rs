//! Lexicographic enumeration of fixed-size subsets.

use crate::engine::graph::NodeId;

/// Yields every `k`-subset of `items` in lexicographic order of positions.
///
/// With `items` sorted ascending this is the canonical order used to pick
/// separating sets.
#[derive(Debug, Clone)]
pub struct Subsets<'a> {
    items: &'a [NodeId],
    indices: Vec<usize>,
    done: bool,
}

impl<'a> Subsets<'a> {
    pub fn new(items: &'a [NodeId], k: usize) -> Self {
        Self {
            items,
            indices: (0..k).collect(),
            done: k > items.len(),
        }
    }
}

impl Iterator for Subsets<'_> {
    type Item = Vec<NodeId>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current: Vec<NodeId> = self.indices.iter().map(|&i| self.items[i]).collect();

        // Advance to the next combination.
        let n = self.items.len();
        let k = self.indices.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.indices[i] < n - k + i {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }
        Some(current)
    }
}
