//! FlipCut / Bad Clade Deletion driver.
//!
//! # Overview
//! The input trees are turned into a weighted [`Hypergraph`] once. The
//! recursion then repeatedly takes a pending part of the taxa, removes
//! characters that no longer say anything about it, and either resolves it
//! for free (single taxon, disconnected graph) or cuts it in two.
//!
//! Two modes are offered:
//! - [`FlipCut::supertree`]: one minimum cut per step, depth-first
//! - [`FlipCut::supertrees`]: a beam over the k best cuts per step, returning
//!   up to `number_of_cuts` supertrees ordered by score

use crate::costs::{CostModel, Weighting};
use crate::cutter::{CutMethod, GraphCutter};
use crate::error::{FlipCutError, Result};
use crate::graph::CharacterGraph;
use crate::hypergraph::{Hypergraph, HypergraphBuilder};
use crate::karger::KargerStein;
use crate::partition::{PartitionTree, Prepared};
use crate::pool::WorkerPool;
use crate::source::SourceTree;
use crate::supertree::Supertree;
use itertools::Itertools;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct FlipCutConfig {
    pub weighting: Weighting,
    /// Clades with a support label below this value are ignored
    pub bootstrap_threshold: u32,
    /// Worker threads, 1 or less runs on the calling thread
    pub threads: usize,
    pub cut_method: CutMethod,
    /// Beam width and number of cuts tried per step in multi-cut mode
    pub number_of_cuts: usize,
    pub karger_rounds: usize,
    pub seed: u64,
}

impl Default for FlipCutConfig {
    fn default() -> Self {
        FlipCutConfig {
            weighting: Weighting::Unit,
            bootstrap_threshold: 0,
            threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            cut_method: CutMethod::default(),
            number_of_cuts: 1,
            karger_rounds: KargerStein::default().rounds,
            seed: 0,
        }
    }
}

pub struct FlipCut {
    config: FlipCutConfig,
    pool: WorkerPool,
}

impl FlipCut {
    /// # Errors
    /// `ThreadPool` if the worker pool cannot be created.
    pub fn new(config: FlipCutConfig) -> Result<Self> {
        let pool = WorkerPool::new(config.threads)?;
        Ok(FlipCut { config, pool })
    }

    pub fn config(&self) -> &FlipCutConfig {
        &self.config
    }

    /// Weighted hypergraph of the input, as used by both modes.
    pub fn hypergraph(&self, trees: &[SourceTree], scaffold: Option<&SourceTree>) -> Result<Hypergraph> {
        if trees.is_empty() {
            return Err(FlipCutError::NoInputTrees);
        }
        let costs = CostModel::new(trees, self.config.weighting);
        HypergraphBuilder::new(trees, &costs)
            .scaffold(scaffold)
            .bootstrap_threshold(self.config.bootstrap_threshold)
            .build()
    }

    /// Single-cut supertree.
    ///
    /// # Algorithm
    /// Pending partitions are processed depth-first. Each one is prepared
    /// (semi-universal removal, leaf and component detection) and, if still
    /// connected, cut once and split.
    pub fn supertree(&self, trees: &[SourceTree], scaffold: Option<&SourceTree>) -> Result<Supertree> {
        let start = Instant::now();
        let hypergraph = Arc::new(self.hypergraph(trees, scaffold)?);
        let cutter = self.cutter();

        let mut tree = PartitionTree::new(CharacterGraph::root(Arc::clone(&hypergraph)));
        let mut stack = vec![tree.root()];
        let mut cuts = 0usize;
        while let Some(id) = stack.pop() {
            match tree.prepare(id)? {
                Prepared::Leaf => {}
                Prepared::Components(children) => stack.extend(children.into_iter().rev()),
                Prepared::Connected => {
                    tree.cut(id, &cutter)?;
                    let [first, second] = tree.split(id)?;
                    stack.push(second);
                    stack.push(first);
                    cuts += 1;
                }
            }
        }

        let supertree = tree.to_supertree(hypergraph.taxa())?;
        info!(
            taxa = hypergraph.taxon_count(),
            cuts,
            score = supertree.score(),
            method = %self.config.cut_method,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "supertree done"
        );
        Ok(supertree)
    }

    /// Up to `number_of_cuts` supertrees in ascending score.
    ///
    /// # Algorithm
    /// Each beam candidate is a partially resolved [`PartitionTree`] with a
    /// FIFO of pending partitions. A round advances every candidate to its
    /// next connected partition and branches on the k best cuts of it. The
    /// k-th best child score seen so far bounds the cuts requested for later
    /// candidates. Children are then ranked by score, duplicates with the same
    /// fingerprint dropped, and the best k kept. Candidates without a pending
    /// connected partition are finished.
    pub fn supertrees(&self, trees: &[SourceTree], scaffold: Option<&SourceTree>) -> Result<Vec<Supertree>> {
        let start = Instant::now();
        let k = self.config.number_of_cuts.max(1);
        let hypergraph = Arc::new(self.hypergraph(trees, scaffold)?);
        let cutter = self.cutter();

        let root = PartitionTree::new(CharacterGraph::root(Arc::clone(&hypergraph)));
        let mut order = 0usize;
        let mut beam = vec![Candidate::new(root, order)];
        let mut finished: Vec<Candidate> = Vec::new();
        let mut rounds = 0usize;

        while !beam.is_empty() {
            rounds += 1;
            let mut children: Vec<Candidate> = Vec::new();
            for mut candidate in beam {
                let Some(id) = candidate.advance()? else {
                    finished.push(candidate);
                    continue;
                };

                let bound = kth_best(&children, k);
                if bound.is_some_and(|b| candidate.score() > b) {
                    continue;
                }
                let remaining = bound.map(|b| b - candidate.score());
                let cuts = cutter.k_best_cuts(candidate.tree.graph(id)?, k, remaining)?;

                for cut in cuts {
                    let mut child = candidate.clone();
                    child.tree.apply_cut(id, cut)?;
                    let [first, second] = child.tree.split(id)?;
                    child.pending.push_back(first);
                    child.pending.push_back(second);
                    order += 1;
                    child.order = order;
                    children.push(child);
                }
            }

            beam = select(children, k);
            debug!(round = rounds, beam = beam.len(), finished = finished.len(), "beam round");
        }

        let mut supertrees = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for candidate in select(finished, usize::MAX) {
            let supertree = candidate.tree.to_supertree(hypergraph.taxa())?;
            if seen.insert(supertree.to_newick()) {
                supertrees.push(supertree);
            }
            if supertrees.len() == k {
                break;
            }
        }

        info!(
            taxa = hypergraph.taxon_count(),
            rounds,
            supertrees = supertrees.len(),
            best = supertrees.first().map(Supertree::score),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "supertrees done"
        );
        Ok(supertrees)
    }

    fn cutter(&self) -> GraphCutter<'_> {
        let karger = KargerStein { rounds: self.config.karger_rounds.max(1), seed: self.config.seed };
        GraphCutter::new(self.config.cut_method, &self.pool, karger)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    tree: PartitionTree,
    pending: VecDeque<usize>,
    order: usize,
}

impl Candidate {
    fn new(tree: PartitionTree, order: usize) -> Self {
        let pending = VecDeque::from([tree.root()]);
        Candidate { tree, pending, order }
    }

    fn score(&self) -> i64 {
        self.tree.score()
    }

    /// Resolve free steps until a connected partition is at the front.
    /// Returns its id, still queued, or `None` when nothing is left to cut.
    fn advance(&mut self) -> Result<Option<usize>> {
        while let Some(&id) = self.pending.front() {
            match self.tree.prepare(id)? {
                Prepared::Leaf => {
                    self.pending.pop_front();
                }
                Prepared::Components(children) => {
                    self.pending.pop_front();
                    self.pending.extend(children);
                }
                Prepared::Connected => {
                    self.pending.pop_front();
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }
}

/// Score of the k-th best candidate, once there are k of them.
fn kth_best(candidates: &[Candidate], k: usize) -> Option<i64> {
    if candidates.len() < k {
        return None;
    }
    candidates.iter().map(Candidate::score).k_smallest(k).last()
}

/// Rank by (score, order), drop repeated fingerprints, keep the best `k`.
fn select(candidates: Vec<Candidate>, k: usize) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .sorted_by_key(|c| (c.score(), c.order))
        .filter(|c| seen.insert(c.tree.fingerprint()))
        .take(k)
        .collect()
}
