//! Crate root: module orchestration and public re-exports.
//!
//! Modules, leaves first:
//! - `bitset`: compact taxon sets.
//! - `source`: immutable view of the input trees.
//! - `costs`: weighting schemes and fixed-point clade weights.
//! - `hypergraph`: characters (clades) over taxa, merged by identical clade.
//! - `graph`: the character graph of one recursion step.
//! - `flow`: max-flow / min-cut solvers (push-relabel, augmenting path).
//! - `pool`: explicit worker pool for batched cuts.
//! - `cutter`: network construction and translation of cuts to characters.
//! - `karger`: randomized Karger-Stein contraction.
//! - `vazirani`: enumeration of the k cheapest cuts.
//! - `partition`: recursion arena.
//! - `supertree`: the output tree.
//! - `flipcut`: single-cut and multi-cut drivers.
//! - `io`: reading Newick/NEXUS input and writing supertrees.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bitset;
pub mod costs;
pub mod cutter;
pub mod error;
pub mod flipcut;
pub mod flow;
pub mod graph;
pub mod hypergraph;
pub mod io;
pub mod karger;
pub mod partition;
pub mod pool;
pub mod source;
pub mod supertree;
pub mod vazirani;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bitset::Bitset;
pub use costs::Weighting;
pub use cutter::CutMethod;
pub use error::{FlipCutError, Result};
pub use flipcut::{FlipCut, FlipCutConfig};
pub use io::{read_trees, write_supertrees};
pub use source::SourceTree;
pub use supertree::Supertree;
