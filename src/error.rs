//! Error taxonomy shared by every stage of a supertree run.
//!
//! Configuration and input problems are recoverable at the boundary (the CLI
//! or Python layer reports them). `EmptyNetwork` and `InvalidTerminals` are
//! precondition failures raised before a flow solver runs. `Invariant` marks
//! an internal-consistency failure that aborts the run.

use phylotree::tree::{NewickParseError, TreeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlipCutError {
    #[error("no input trees were given")]
    NoInputTrees,

    #[error("input trees contain no taxa")]
    NoTaxa,

    #[error("tree {0} contains a leaf without a label")]
    UnnamedLeaf(usize),

    #[error("tree {tree} contains the leaf label '{label}' more than once")]
    DuplicateLeaf { tree: usize, label: String },

    #[error("unsupported weighting scheme '{0}'")]
    UnsupportedWeighting(String),

    #[error("unsupported cut method '{0}'")]
    UnsupportedCutMethod(String),

    #[error("flow network needs at least two vertices, got {0}")]
    EmptyNetwork(usize),

    #[error("invalid terminals ({0}, {1}) for a network of {2} nodes")]
    InvalidTerminals(usize, usize, usize),

    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("failed to parse newick: {0}")]
    Newick(#[from] NewickParseError),

    #[error("failed to parse tree {tree}: {source}")]
    TreeNewick {
        tree: usize,
        #[source]
        source: NewickParseError,
    },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FlipCutError>;
