//! Fixed-point character weights.
//!
//! # Overview
//! Max-flow runs on integer capacities, so every inner node of every input
//! tree is mapped to `max(1, round(ACCURACY * f(node)))` where `f` depends on
//! the selected [`Weighting`] and on statistics gathered once over all trees.
//!
//! | Weighting            | f(node)                                   |
//! |----------------------|-------------------------------------------|
//! | `Unit`               | 1                                         |
//! | `BranchLength`       | length / longest branch                   |
//! | `Bootstrap`          | support / maximum support                 |
//! | `Level`              | depth / maximum depth                     |
//! | `BranchAndLevel`     | branch factor × level factor              |
//! | `BootstrapAndLevel`  | bootstrap factor × level factor           |
//!
//! Missing branch lengths count as 0. Missing or unparseable support counts
//! as fully supported.

use crate::error::FlipCutError;
use crate::source::SourceTree;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Scale factor between floating-point weights and flow capacities.
pub const ACCURACY: i64 = 1_000_000_000;

/// Maximum support assumed when no tree carries a parseable support label.
pub const DEFAULT_MAX_SUPPORT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Weighting {
    #[default]
    Unit,
    BranchLength,
    Bootstrap,
    Level,
    BranchAndLevel,
    BootstrapAndLevel,
}

impl Weighting {
    /// Parse a scheme name, falling back to [`Weighting::Unit`].
    ///
    /// An absent or unknown name is a configuration problem that is recovered
    /// here; the fallback is reported as a warning.
    pub fn parse_or_unit(name: Option<&str>) -> Weighting {
        match name.map(str::parse::<Weighting>) {
            Some(Ok(w)) => w,
            Some(Err(e)) => {
                warn!("{e}, falling back to unit cost");
                Weighting::Unit
            }
            None => {
                warn!("no weighting scheme selected, falling back to unit cost");
                Weighting::Unit
            }
        }
    }
}

impl FromStr for Weighting {
    type Err = FlipCutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "unit" | "unit-cost" | "unit-weight" => Ok(Weighting::Unit),
            "branch-length" | "edge-weights" | "branch" => Ok(Weighting::BranchLength),
            "bootstrap" | "bootstrap-values" => Ok(Weighting::Bootstrap),
            "level" | "node-level" => Ok(Weighting::Level),
            "branch-and-level" | "edge-and-level" => Ok(Weighting::BranchAndLevel),
            "bootstrap-and-level" => Ok(Weighting::BootstrapAndLevel),
            _ => Err(FlipCutError::UnsupportedWeighting(s.to_string())),
        }
    }
}

impl fmt::Display for Weighting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Weighting::Unit => "unit",
            Weighting::BranchLength => "branch-length",
            Weighting::Bootstrap => "bootstrap",
            Weighting::Level => "level",
            Weighting::BranchAndLevel => "branch-and-level",
            Weighting::BootstrapAndLevel => "bootstrap-and-level",
        };
        f.write_str(name)
    }
}

/// Normalisation statistics over the inner, non-root nodes of all input trees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostStats {
    pub longest_branch: f64,
    pub max_depth: usize,
    pub max_support: f64,
}

#[derive(Debug, Clone)]
pub struct CostModel {
    weighting: Weighting,
    stats: CostStats,
}

impl CostModel {
    /// Gather statistics in one pass over `trees`.
    ///
    /// A scaffold tree is not passed here: its characters are mandatory and
    /// never carry a finite weight.
    pub fn new(trees: &[SourceTree], weighting: Weighting) -> Self {
        let mut longest_branch = 0.0f64;
        let mut max_depth = 0usize;
        let mut max_support = f64::NAN;

        for tree in trees {
            for id in tree.inner_nodes() {
                let node = tree.node(id);
                if let Some(len) = node.branch_length.filter(|l| l.is_finite()) {
                    longest_branch = longest_branch.max(len);
                }
                max_depth = max_depth.max(node.depth);
                if let Some(s) = tree.support(id).filter(|s| !s.is_nan()) {
                    // f64::max ignores the NaN start value
                    max_support = max_support.max(s);
                }
            }
        }
        if max_support.is_nan() || max_support <= 0.0 {
            max_support = DEFAULT_MAX_SUPPORT;
        }

        let stats = CostStats { longest_branch, max_depth, max_support };
        debug!(?stats, %weighting, "cost model ready");
        CostModel { weighting, stats }
    }

    pub fn weighting(&self) -> Weighting {
        self.weighting
    }

    pub fn stats(&self) -> CostStats {
        self.stats
    }

    /// Fixed-point weight of node `id` of `tree`. Always at least 1.
    pub fn weight(&self, tree: &SourceTree, id: usize) -> i64 {
        let f = match self.weighting {
            Weighting::Unit => return ACCURACY,
            Weighting::BranchLength => self.branch_factor(tree, id),
            Weighting::Bootstrap => self.support_factor(tree, id),
            Weighting::Level => self.level_factor(tree, id),
            Weighting::BranchAndLevel => self.branch_factor(tree, id) * self.level_factor(tree, id),
            Weighting::BootstrapAndLevel => {
                self.support_factor(tree, id) * self.level_factor(tree, id)
            }
        };
        ((ACCURACY as f64 * f).round() as i64).max(1)
    }

    fn branch_factor(&self, tree: &SourceTree, id: usize) -> f64 {
        if self.stats.longest_branch <= 0.0 {
            return 1.0;
        }
        let len = tree.node(id).branch_length.filter(|l| l.is_finite()).unwrap_or(0.0);
        (len / self.stats.longest_branch).clamp(0.0, 1.0)
    }

    fn support_factor(&self, tree: &SourceTree, id: usize) -> f64 {
        match tree.support(id) {
            Some(s) if !s.is_nan() => (s / self.stats.max_support).clamp(0.0, 1.0),
            _ => 1.0,
        }
    }

    fn level_factor(&self, tree: &SourceTree, id: usize) -> f64 {
        if self.stats.max_depth == 0 {
            return 1.0;
        }
        tree.node(id).depth as f64 / self.stats.max_depth as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trees(newicks: &[&str]) -> Vec<SourceTree> {
        newicks.iter().map(|n| SourceTree::from_newick(n).unwrap()).collect()
    }

    #[test]
    fn unit_cost_is_constant() {
        let t = trees(&["((a,b):4,(c,d):1);"]);
        let costs = CostModel::new(&t, Weighting::Unit);
        for id in t[0].inner_nodes() {
            assert_eq!(costs.weight(&t[0], id), ACCURACY);
        }
    }

    #[test]
    fn branch_length_is_normalised_by_longest() {
        let t = trees(&["((a,b):4,(c,d):1);", "(((a,b):2,c):0,d);"]);
        let costs = CostModel::new(&t, Weighting::BranchLength);
        assert_eq!(costs.stats().longest_branch, 4.0);

        let weights: Vec<i64> = t[0].inner_nodes().map(|id| costs.weight(&t[0], id)).collect();
        assert_eq!(weights, vec![ACCURACY, ACCURACY / 4]);

        // zero length still yields a positive capacity
        let zero = t[1].inner_nodes().next().unwrap();
        assert_eq!(t[1].node(zero).branch_length, Some(0.0));
        assert_eq!(costs.weight(&t[1], zero), 1);
    }

    #[test]
    fn bootstrap_uses_parsed_maximum_and_ignores_nan() {
        let t = trees(&["((a,b)50,(c,d)foo);", "((a,c)25,(b,d));"]);
        let costs = CostModel::new(&t, Weighting::Bootstrap);
        assert_eq!(costs.stats().max_support, 50.0);

        let w: Vec<i64> = t[1].inner_nodes().map(|id| costs.weight(&t[1], id)).collect();
        assert_eq!(w, vec![ACCURACY / 2, ACCURACY]);
    }

    #[test]
    fn bootstrap_defaults_to_hundred() {
        let t = trees(&["((a,b),(c,d));"]);
        let costs = CostModel::new(&t, Weighting::Bootstrap);
        assert_eq!(costs.stats().max_support, DEFAULT_MAX_SUPPORT);
    }

    #[test]
    fn level_weights_deeper_clades_higher() {
        let t = trees(&["(((a,b),c),d);"]);
        let costs = CostModel::new(&t, Weighting::Level);
        assert_eq!(costs.stats().max_depth, 2);
        let w: Vec<i64> = t[0].inner_nodes().map(|id| costs.weight(&t[0], id)).collect();
        assert_eq!(w, vec![ACCURACY / 2, ACCURACY]);
    }

    #[test]
    fn combined_schemes_multiply() {
        let t = trees(&["(((a,b)50,c)100,d);"]);
        let costs = CostModel::new(&t, Weighting::BootstrapAndLevel);
        let w: Vec<i64> = t[0].inner_nodes().map(|id| costs.weight(&t[0], id)).collect();
        // depth 1 / 2 * 100/100, then depth 2 / 2 * 50/100
        assert_eq!(w, vec![ACCURACY / 2, ACCURACY / 2]);
    }

    #[test]
    fn parsing_and_fallback() {
        assert_eq!("BOOTSTRAP_VALUES".parse::<Weighting>().unwrap(), Weighting::Bootstrap);
        assert_eq!("edge-and-level".parse::<Weighting>().unwrap(), Weighting::BranchAndLevel);
        assert!(matches!(
            "nonsense".parse::<Weighting>(),
            Err(FlipCutError::UnsupportedWeighting(_))
        ));
        assert_eq!(Weighting::parse_or_unit(Some("nonsense")), Weighting::Unit);
        assert_eq!(Weighting::parse_or_unit(None), Weighting::Unit);
        assert_eq!(Weighting::parse_or_unit(Some("level")), Weighting::Level);
    }
}
