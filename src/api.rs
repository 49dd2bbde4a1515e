//! Python binding layer for supertree computation.
//!
//! Provides Python functions that build FlipCut supertrees from Newick
//! strings or tree files and return them as Newick.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::costs::Weighting;
use crate::cutter::CutMethod;
use crate::error::FlipCutError;
use crate::flipcut::{FlipCut, FlipCutConfig};
use crate::io::read_trees;
use crate::source::SourceTree;

fn to_py_err(e: FlipCutError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Compute a single FlipCut supertree.
///
/// Args:
///     trees: List of rooted Newick strings
///     guide: Optional guide tree (Newick) whose clades are never split
///     weighting: Clade weighting scheme (default: "unit"); unknown names fall back to unit
///     bootstrap_threshold: Ignore clades with lower support labels (default: 0)
///     cut_method: "push-relabel", "augmenting-path" or "karger-stein"
///     threads: Worker threads, 0 uses all available cores (default: 0)
///     seed: Seed for Karger-Stein contraction (default: 0)
///
/// Returns:
///     A tuple of (newick, score)
///
/// Raises:
///     ValueError: If no trees are given, a tree cannot be parsed or the computation fails
#[pyfunction]
#[pyo3(signature = (trees, guide=None, weighting="unit", bootstrap_threshold=0, cut_method="push-relabel", threads=0, seed=0))]
fn supertree(
    trees: Vec<String>,
    guide: Option<String>,
    weighting: &str,
    bootstrap_threshold: u32,
    cut_method: &str,
    threads: usize,
    seed: u64,
) -> PyResult<(String, i64)> {
    let config = config(weighting, bootstrap_threshold, cut_method, threads, 1, seed)?;
    let (trees, guide) = parse_input(&trees, guide.as_deref())?;
    let result = FlipCut::new(config)
        .and_then(|flipcut| flipcut.supertree(&trees, guide.as_ref()))
        .map_err(to_py_err)?;
    Ok((result.to_newick(), result.score()))
}

/// Compute up to `number_of_cuts` alternative supertrees with the multi-cut beam search.
///
/// Args:
///     trees: List of rooted Newick strings
///     number_of_cuts: Beam width and number of supertrees returned at most (default: 5)
///     guide, weighting, bootstrap_threshold, cut_method, threads, seed: as for `supertree`
///
/// Returns:
///     A list of (newick, score) tuples in ascending score
///
/// Raises:
///     ValueError: If no trees are given, a tree cannot be parsed or the computation fails
#[pyfunction]
#[pyo3(signature = (trees, number_of_cuts=5, guide=None, weighting="unit", bootstrap_threshold=0, cut_method="push-relabel", threads=0, seed=0))]
#[allow(clippy::too_many_arguments)]
fn supertrees(
    trees: Vec<String>,
    number_of_cuts: usize,
    guide: Option<String>,
    weighting: &str,
    bootstrap_threshold: u32,
    cut_method: &str,
    threads: usize,
    seed: u64,
) -> PyResult<Vec<(String, i64)>> {
    let config = config(weighting, bootstrap_threshold, cut_method, threads, number_of_cuts, seed)?;
    let (trees, guide) = parse_input(&trees, guide.as_deref())?;
    let result = FlipCut::new(config)
        .and_then(|flipcut| flipcut.supertrees(&trees, guide.as_ref()))
        .map_err(to_py_err)?;
    Ok(result.iter().map(|t| (t.to_newick(), t.score())).collect())
}

/// Compute a single supertree from a tree file (Newick or NEXUS, .gz accepted).
///
/// Returns:
///     A tuple of (newick, score)
#[pyfunction]
#[pyo3(signature = (path, guide_path=None, weighting="unit", cut_method="push-relabel", threads=0))]
fn supertree_from_file(
    path: String,
    guide_path: Option<String>,
    weighting: &str,
    cut_method: &str,
    threads: usize,
) -> PyResult<(String, i64)> {
    let config = config(weighting, 0, cut_method, threads, 1, 0)?;
    let trees = read_trees(&path).map_err(to_py_err)?;
    if trees.is_empty() {
        return Err(PyValueError::new_err(format!("No trees found in file '{path}'")));
    }
    let guide = match guide_path {
        Some(p) => read_trees(&p).map_err(to_py_err)?.into_iter().next(),
        None => None,
    };
    let result = FlipCut::new(config)
        .and_then(|flipcut| flipcut.supertree(&trees, guide.as_ref()))
        .map_err(to_py_err)?;
    Ok((result.to_newick(), result.score()))
}

fn config(
    weighting: &str,
    bootstrap_threshold: u32,
    cut_method: &str,
    threads: usize,
    number_of_cuts: usize,
    seed: u64,
) -> PyResult<FlipCutConfig> {
    let defaults = FlipCutConfig::default();
    Ok(FlipCutConfig {
        weighting: Weighting::parse_or_unit(Some(weighting)),
        bootstrap_threshold,
        threads: if threads == 0 { defaults.threads } else { threads },
        cut_method: cut_method.parse::<CutMethod>().map_err(to_py_err)?,
        number_of_cuts: number_of_cuts.max(1),
        karger_rounds: defaults.karger_rounds,
        seed,
    })
}

fn parse_input(trees: &[String], guide: Option<&str>) -> PyResult<(Vec<SourceTree>, Option<SourceTree>)> {
    if trees.is_empty() {
        return Err(PyValueError::new_err("No input trees were given"));
    }
    let trees = trees
        .iter()
        .map(|t| SourceTree::from_newick(t))
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py_err)?;
    let guide = guide.map(SourceTree::from_newick).transpose().map_err(to_py_err)?;
    Ok((trees, guide))
}

/// Python module definition
#[pymodule]
fn rust_python_flipcut(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(supertree, m)?)?;
    m.add_function(wrap_pyfunction!(supertrees, m)?)?;
    m.add_function(wrap_pyfunction!(supertree_from_file, m)?)?;
    Ok(())
}
