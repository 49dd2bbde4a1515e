//! Enumeration of the k cheapest cuts of a character graph.
//!
//! # Algorithm
//! Vertices are ordered by their lowest taxon and vertex 0 always stays on
//! the source side. Every cut then fixes some prefix of the vertices and
//! leaves the rest free, which partitions the space of cuts:
//!
//! - initial cut `j` puts vertices `0..=j` on the source side and vertex
//!   `j + 1` on the sink side; the lightest of them is the minimum cut
//! - popping a state with prefix `k` spawns, for every `p >= k`, the lightest
//!   cut that agrees with the popped one on vertices `< p` and disagrees on
//!   vertex `p`
//!
//! States are explored best-first, so cuts come out in non-decreasing value.

use crate::bitset::Bitset;
use crate::cutter::{CharacterNetwork, Cut};
use crate::error::{FlipCutError, Result};
use crate::flow::MaxFlowAlgorithm;
use crate::graph::{CharacterGraph, NO_VERTEX, VertexGroups};
use crate::pool::WorkerPool;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use tracing::debug;

/// A solved cut waiting in the heap.
#[derive(Debug, Clone)]
struct State {
    cut: Cut,
    /// per vertex: on the source side
    source_side: Vec<bool>,
    /// vertices `< prefix` are fixed for this state's children
    prefix: usize,
    order: usize,
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for State {}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for State {
    // reversed: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        (other.cut.value, other.order).cmp(&(self.cut.value, self.order))
    }
}

/// Up to `k` distinct cuts of `graph` in non-decreasing value.
///
/// Cuts whose deleted characters match an earlier result are skipped. The
/// search stops early once the next cut would be heavier than `upper_bound`.
///
/// # Errors
/// `Invariant` if the graph has fewer than two vertices, plus any error from
/// building or solving a network.
pub fn k_best_cuts(
    graph: &CharacterGraph,
    algorithm: MaxFlowAlgorithm,
    pool: &WorkerPool,
    k: usize,
    upper_bound: Option<i64>,
) -> Result<Vec<Cut>> {
    let groups = graph.vertex_groups();
    let n = groups.len();
    if n < 2 {
        return Err(FlipCutError::Invariant(format!("cannot cut a graph with {n} vertices")));
    }
    if k == 0 {
        return Ok(Vec::new());
    }

    let initial_constraints: Vec<Vec<Option<bool>>> = (0..n - 1)
        .map(|j| (0..n).map(|v| if v <= j { Some(true) } else if v == j + 1 { Some(false) } else { None }).collect())
        .collect();
    let initial = pool.map(initial_constraints, |fixed| solve(graph, &groups, &fixed, algorithm))?;

    let best_initial = |from: usize| -> Option<usize> {
        (from..initial.len()).min_by_key(|&i| (initial[i].0.value, i))
    };

    let mut heap = BinaryHeap::new();
    let mut order = 0usize;
    if let Some(i) = best_initial(0) {
        let (cut, source_side) = initial[i].clone();
        heap.push(State { cut, source_side, prefix: 1, order });
        order += 1;
    }

    let mut results: Vec<Cut> = Vec::new();
    let mut emitted: HashSet<Vec<usize>> = HashSet::new();

    while let Some(state) = heap.pop() {
        if upper_bound.is_some_and(|bound| state.cut.value > bound) {
            break;
        }
        if emitted.insert(state.cut.deleted.clone()) {
            results.push(state.cut.clone());
            if results.len() >= k {
                break;
            }
        }

        let children: Vec<(usize, Vec<Option<bool>>)> = (state.prefix..n)
            .map(|p| {
                let fixed = (0..n)
                    .map(|v| match v.cmp(&p) {
                        Ordering::Less => Some(state.source_side[v]),
                        Ordering::Equal => Some(!state.source_side[v]),
                        Ordering::Greater => None,
                    })
                    .collect();
                (p, fixed)
            })
            .collect();

        let solved = pool.map(children, |(p, fixed)| {
            if fixed.iter().any(|&side| side == Some(false)) {
                return solve(graph, &groups, &fixed, algorithm).map(|cut| Some((p, cut)));
            }
            // only the free suffix can reach the sink, which initial cuts cover
            Ok(best_initial(p).map(|i| (p, initial[i].clone())))
        })?;

        for (p, (cut, source_side)) in solved.into_iter().flatten() {
            heap.push(State { cut, source_side, prefix: p + 1, order });
            order += 1;
        }
    }

    debug!(
        taxa = graph.taxon_count(),
        vertices = n,
        found = results.len(),
        "k-best cuts"
    );
    Ok(results)
}

/// Lightest cut with the fixed vertices on their side; returns the cut and
/// which vertices ended up on the source side.
fn solve(
    graph: &CharacterGraph,
    groups: &VertexGroups,
    fixed: &[Option<bool>],
    algorithm: MaxFlowAlgorithm,
) -> Result<(Cut, Vec<bool>)> {
    let merged = merge_fixed(groups, fixed);
    let net = CharacterNetwork::build(graph, &merged)?;
    let st = algorithm.min_st_cut(net.network(), 0, 1)?;
    let cut = net.undo_mapping(&st, &merged, graph)?;
    let source_side = groups.members.iter().map(|m| m.is_subset(&cut.source_taxa)).collect();
    Ok((cut, source_side))
}

/// Collapse fixed source vertices into vertex 0 and fixed sink vertices into
/// vertex 1. Free vertices keep their own vertex.
fn merge_fixed(groups: &VertexGroups, fixed: &[Option<bool>]) -> VertexGroups {
    let words = groups.members.first().map_or(0, |m| m.0.len());
    let mut members = vec![Bitset::zeros(words), Bitset::zeros(words)];
    let mut target = Vec::with_capacity(groups.len());
    for (v, side) in fixed.iter().enumerate() {
        match side {
            Some(true) => target.push(0),
            Some(false) => target.push(1),
            None => {
                target.push(members.len());
                members.push(Bitset::zeros(words));
            }
        }
        members[target[v]].or_assign(&groups.members[v]);
    }

    let vertex_of = groups
        .vertex_of
        .iter()
        .map(|&v| if v == NO_VERTEX { NO_VERTEX } else { target[v] })
        .collect();
    VertexGroups { vertex_of, members }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::ACCURACY;
    use crate::cutter::{CutMethod, GraphCutter};
    use crate::graph::tests::graph;
    use crate::karger::KargerStein;

    #[test]
    fn enumerates_every_bipartition_of_three_taxa() {
        let g = graph(&["((a,b),c);", "((a,b),c);", "((a,c),b);"], None);
        let pool = WorkerPool::sequential();
        let cuts = k_best_cuts(&g, MaxFlowAlgorithm::PushRelabel, &pool, 10, None).unwrap();

        let values: Vec<i64> = cuts.iter().map(|c| c.value).collect();
        assert_eq!(values, vec![ACCURACY, 2 * ACCURACY, 3 * ACCURACY]);
        assert_eq!(cuts[0].deleted, vec![1]);
        assert_eq!(cuts[1].deleted, vec![0]);
        assert_eq!(cuts[2].deleted, vec![0, 1]);
    }

    #[test]
    fn first_cut_is_the_minimum_and_order_is_non_decreasing() {
        let g = graph(
            &["(((a,b),c),(d,e));", "((a,(b,c)),(d,e));", "(((a,d),b),(c,e));"],
            None,
        );
        let pool = WorkerPool::new(2).unwrap();
        for algorithm in [MaxFlowAlgorithm::PushRelabel, MaxFlowAlgorithm::AugmentingPath] {
            let cuts = k_best_cuts(&g, algorithm, &pool, 6, None).unwrap();
            assert!(!cuts.is_empty());
            assert!(cuts.windows(2).all(|w| w[0].value <= w[1].value));

            let deleted: HashSet<&Vec<usize>> = cuts.iter().map(|c| &c.deleted).collect();
            assert_eq!(deleted.len(), cuts.len());

            let best = GraphCutter::new(CutMethod::PushRelabel, &pool, KargerStein::default())
                .min_cut(&g)
                .unwrap();
            assert_eq!(cuts[0].value, best.value);
            for cut in &cuts {
                assert!(g.split(cut).is_ok());
            }
        }
    }

    #[test]
    fn upper_bound_stops_the_search() {
        let g = graph(&["((a,b),c);", "((a,b),c);", "((a,c),b);"], None);
        let pool = WorkerPool::sequential();
        let cuts =
            k_best_cuts(&g, MaxFlowAlgorithm::AugmentingPath, &pool, 10, Some(2 * ACCURACY)).unwrap();
        assert_eq!(cuts.len(), 2);
        assert!(k_best_cuts(&g, MaxFlowAlgorithm::AugmentingPath, &pool, 0, None).unwrap().is_empty());
    }

    #[test]
    fn result_does_not_depend_on_threads() {
        let g = graph(
            &["(((a,b),c),(d,e));", "((a,(b,c)),(d,e));", "(((a,d),b),(c,e));"],
            None,
        );
        let single = k_best_cuts(&g, MaxFlowAlgorithm::PushRelabel, &WorkerPool::sequential(), 4, None)
            .unwrap();
        let parallel =
            k_best_cuts(&g, MaxFlowAlgorithm::PushRelabel, &WorkerPool::new(4).unwrap(), 4, None)
                .unwrap();
        assert_eq!(single, parallel);
    }

    #[test]
    fn guide_vertices_are_never_split() {
        let g = graph(&["((a,b),(c,d));", "((a,c),(b,d));"], Some("(((a,b),c),d);"));
        let cuts =
            k_best_cuts(&g, MaxFlowAlgorithm::PushRelabel, &WorkerPool::sequential(), 5, None).unwrap();
        // {a,b,c} is one vertex, so the only bipartition is {abc | d}
        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].sink_taxa.count_ones(), 1);
    }
}
