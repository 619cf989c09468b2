//! The search and orientation engine.
//!
//! This module provides:
//! - **errors**: Error taxonomy for graph operations and searches
//! - **graph**: Marked causal graph with triple annotations
//! - **knowledge**: Forbidden/required edges and temporal tiers
//! - **oracle**: Independence and score oracle interfaces, d-separation oracle
//! - **adjacency**: Skeleton search by conditional independence
//! - **colliders**: Collider discovery on unshielded triples
//! - **orient**: Fixed-point closure under Meek and FCI rules
//! - **paths**: Possible-m-connecting paths and possible-D-SEP
//! - **legality**: PAG and CPDAG legality checks
//! - **dag**: DAG extension, CPDAG of a DAG, DAG scoring

pub mod adjacency;
pub mod cancel;
pub mod colliders;
pub mod dag;
pub mod diagnostics;
pub mod errors;
pub mod graph;
pub mod knowledge;
pub mod legality;
pub mod oracle;
pub mod orient;
pub mod paths;
pub mod sepset;
pub mod subsets;
