//! # Causeway Core
//!
//! Causal structure search over an independence oracle: adjacency search,
//! collider discovery, Meek and FCI orientation closure, possible-D-SEP and
//! PAG legality checking.
//!
//! ## Example
//!
//! ```rust
//! use causeway_core::engine::graph::Graph;
//! use causeway_core::engine::oracle::DSeparationOracle;
//! use causeway_core::{Knowledge, Pc};
//!
//! let mut truth = Graph::with_nodes(["A", "B", "C"]).unwrap();
//! truth.add_edge_spec("A --> B").unwrap();
//! truth.add_edge_spec("C --> B").unwrap();
//! let oracle = DSeparationOracle::new(truth).unwrap();
//!
//! let result = Pc::new(&oracle, &Knowledge::new()).search().unwrap();
//! assert_eq!(result.graph.num_edges(), 2);
//! assert!(result.is_legal());
//! ```

pub mod engine;
pub mod search;

// Re-export commonly used types
pub use engine::cancel::{CancelToken, Completeness};
pub use engine::diagnostics::{DiagnosticEvent, Diagnostics};
pub use engine::errors::{CausalError, OracleError};
pub use engine::graph::{Edge, Endpoint, Graph, NodeId, NodeKind, TripleState};
pub use engine::knowledge::Knowledge;
pub use engine::legality::{is_legal_pag, LegalityReport};
pub use engine::oracle::{DSeparationOracle, IndependenceOracle, IndependenceResult, ScoreOracle};
pub use search::{Fci, FciConfig, Pc, PcConfig, SearchResult};
