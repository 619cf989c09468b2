//! Search configuration.
//!
//! Plain structs with defaults. With the `serde` feature they deserialize
//! from JSON with every field optional.

use crate::engine::adjacency::ForbiddenPairPolicy;
use crate::engine::colliders::ColliderDiscovery;
use crate::engine::orient::DiscriminatingPathPolicy;

/// Configuration of the PC family (PC, CPC, PC-Max).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PcConfig {
    /// Largest conditioning set; -1 for unbounded
    pub max_depth: i32,
    pub colliders: ColliderDiscovery,
    /// Run Meek R4 even without background knowledge
    pub meek_r4: bool,
    pub forbidden_pairs: ForbiddenPairPolicy,
    /// Use the rayon pool for test levels and rule scans
    pub parallel: bool,
}

impl Default for PcConfig {
    fn default() -> Self {
        Self {
            max_depth: -1,
            colliders: ColliderDiscovery::Sepsets,
            meek_r4: false,
            forbidden_pairs: ForbiddenPairPolicy::Remove,
            parallel: true,
        }
    }
}

impl PcConfig {
    /// Conservative PC.
    pub fn cpc() -> Self {
        Self {
            colliders: ColliderDiscovery::Conservative,
            ..Self::default()
        }
    }

    /// PC-Max.
    pub fn pc_max() -> Self {
        Self {
            colliders: ColliderDiscovery::MaxP,
            ..Self::default()
        }
    }
}

/// Configuration of FCI.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FciConfig {
    /// Largest conditioning set, for both the adjacency and the
    /// possible-D-SEP stage; -1 for unbounded
    pub max_depth: i32,
    /// Run the possible-D-SEP stage
    pub possible_dsep: bool,
    /// Longest path followed when building possible-D-SEP; -1 for unbounded
    pub max_path_length: i32,
    /// Add the tail rules R8-R10
    pub complete_rule_set: bool,
    pub discriminating_paths: DiscriminatingPathPolicy,
    /// Most nodes on a discriminating path; -1 for unbounded
    pub max_discriminating_path_length: i32,
    pub colliders: ColliderDiscovery,
    pub forbidden_pairs: ForbiddenPairPolicy,
    pub parallel: bool,
}

impl Default for FciConfig {
    fn default() -> Self {
        Self {
            max_depth: -1,
            possible_dsep: true,
            max_path_length: -1,
            complete_rule_set: true,
            discriminating_paths: DiscriminatingPathPolicy::Requery,
            max_discriminating_path_length: -1,
            colliders: ColliderDiscovery::Sepsets,
            forbidden_pairs: ForbiddenPairPolicy::Remove,
            parallel: true,
        }
    }
}

/// `None` for negative bounds.
pub(crate) fn bound(value: i32) -> Option<usize> {
    usize::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_unbounded() {
        let pc = PcConfig::default();
        assert_eq!(bound(pc.max_depth), None);
        assert_eq!(PcConfig::cpc().colliders, ColliderDiscovery::Conservative);
        let fci = FciConfig::default();
        assert!(fci.possible_dsep && fci.complete_rule_set);
        assert_eq!(bound(fci.max_path_length), None);
        assert_eq!(bound(3), Some(3));
    }
}
