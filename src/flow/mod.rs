//! Max-flow / min-cut on character networks.
//!
//! Networks are stored as adjacency lists over paired residual edges: edge
//! `e` and its reverse `e ^ 1` always sit next to each other, so the reverse
//! of any residual arc is found without a lookup table.
//!
//! Two interchangeable solvers are provided:
//! - [`MaxFlowAlgorithm::PushRelabel`]: FIFO Goldberg-Tarjan with exact initial
//!   labels and the gap heuristic, stopped after the first (min-cut) phase
//! - [`MaxFlowAlgorithm::AugmentingPath`]: Ahuja-Orlin shortest augmenting
//!   paths over distance labels
//!
//! Both produce the same cut value. The source sides may differ when several
//! minimum cuts exist.

mod augmenting_path;
mod push_relabel;

use crate::error::{FlipCutError, Result};
use std::collections::VecDeque;

/// Residual network with paired edges.
#[derive(Debug, Clone, Default)]
pub struct FlowNetwork {
    heads: Vec<usize>,
    capacities: Vec<i64>,
    adjacency: Vec<Vec<usize>>,
}

impl FlowNetwork {
    pub fn new(nodes: usize) -> Self {
        FlowNetwork { heads: Vec::new(), capacities: Vec::new(), adjacency: vec![Vec::new(); nodes] }
    }

    pub fn add_node(&mut self) -> usize {
        self.adjacency.push(Vec::new());
        self.adjacency.len() - 1
    }

    /// Add a directed edge and its zero-capacity reverse. Returns the forward edge id.
    pub fn add_edge(&mut self, from: usize, to: usize, capacity: i64) -> usize {
        let e = self.heads.len();
        self.heads.push(to);
        self.capacities.push(capacity);
        self.adjacency[from].push(e);
        self.heads.push(from);
        self.capacities.push(0);
        self.adjacency[to].push(e + 1);
        e
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of forward edges.
    pub fn edge_count(&self) -> usize {
        self.heads.len() / 2
    }

    /// Sum of the capacities of edges leaving `source_side` for the rest.
    pub fn cut_capacity(&self, source_side: &[bool]) -> i64 {
        (0..self.heads.len())
            .step_by(2)
            .filter(|&e| source_side[self.heads[e + 1]] && !source_side[self.heads[e]])
            .map(|e| self.capacities[e])
            .sum()
    }

    fn check_terminals(&self, s: usize, t: usize) -> Result<()> {
        let n = self.node_count();
        if n < 2 {
            return Err(FlipCutError::EmptyNetwork(n));
        }
        if s >= n || t >= n || s == t {
            return Err(FlipCutError::InvalidTerminals(s, t, n));
        }
        Ok(())
    }

    /// Vertices that can reach `t` through arcs with residual capacity.
    fn reaching(&self, residual: &[i64], t: usize) -> Vec<bool> {
        let mut seen = vec![false; self.node_count()];
        seen[t] = true;
        let mut queue = VecDeque::from([t]);
        while let Some(v) = queue.pop_front() {
            for &e in &self.adjacency[v] {
                // arc heads[e] -> v is the reverse of e
                let u = self.heads[e];
                if !seen[u] && residual[e ^ 1] > 0 {
                    seen[u] = true;
                    queue.push_back(u);
                }
            }
        }
        seen
    }

    /// Vertices reachable from `s` through arcs with residual capacity.
    fn reachable(&self, residual: &[i64], s: usize) -> Vec<bool> {
        let mut seen = vec![false; self.node_count()];
        seen[s] = true;
        let mut queue = VecDeque::from([s]);
        while let Some(u) = queue.pop_front() {
            for &e in &self.adjacency[u] {
                let v = self.heads[e];
                if !seen[v] && residual[e] > 0 {
                    seen[v] = true;
                    queue.push_back(v);
                }
            }
        }
        seen
    }

    /// Exact distance labels to `t` in the residual graph, `n` when unreachable.
    fn distance_labels(&self, residual: &[i64], t: usize) -> Vec<usize> {
        let n = self.node_count();
        let mut dist = vec![n; n];
        dist[t] = 0;
        let mut queue = VecDeque::from([t]);
        while let Some(v) = queue.pop_front() {
            for &e in &self.adjacency[v] {
                let u = self.heads[e];
                if dist[u] == n && residual[e ^ 1] > 0 {
                    dist[u] = dist[v] + 1;
                    queue.push_back(u);
                }
            }
        }
        dist
    }
}

/// A minimum s-t cut of a [`FlowNetwork`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StCut {
    pub value: i64,
    pub source_side: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MaxFlowAlgorithm {
    #[default]
    PushRelabel,
    AugmentingPath,
}

impl MaxFlowAlgorithm {
    /// Minimum cut separating `s` from `t`.
    ///
    /// # Errors
    /// `EmptyNetwork` for networks with fewer than two nodes and
    /// `InvalidTerminals` for out-of-range or identical terminals. Both are
    /// checked before any flow is pushed.
    pub fn min_st_cut(self, network: &FlowNetwork, s: usize, t: usize) -> Result<StCut> {
        network.check_terminals(s, t)?;
        Ok(match self {
            MaxFlowAlgorithm::PushRelabel => push_relabel::min_cut(network, s, t),
            MaxFlowAlgorithm::AugmentingPath => augmenting_path::min_cut(network, s, t),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALGORITHMS: [MaxFlowAlgorithm; 2] =
        [MaxFlowAlgorithm::PushRelabel, MaxFlowAlgorithm::AugmentingPath];

    /// Classic CLRS network, max flow 23.
    fn clrs() -> FlowNetwork {
        let mut net = FlowNetwork::new(6);
        for (u, v, c) in [
            (0, 1, 16), (0, 2, 13), (1, 3, 12), (2, 1, 4), (2, 4, 14),
            (3, 2, 9), (3, 5, 20), (4, 3, 7), (4, 5, 4),
        ] {
            net.add_edge(u, v, c);
        }
        net
    }

    #[test]
    fn both_solvers_find_clrs_flow() {
        let net = clrs();
        for algorithm in ALGORITHMS {
            let cut = algorithm.min_st_cut(&net, 0, 5).unwrap();
            assert_eq!(cut.value, 23, "{algorithm:?}");
            assert!(cut.source_side[0]);
            assert!(!cut.source_side[5]);
            assert_eq!(net.cut_capacity(&cut.source_side), 23, "{algorithm:?}");
        }
    }

    #[test]
    fn disconnected_terminals_have_zero_cut() {
        let mut net = FlowNetwork::new(4);
        net.add_edge(0, 1, 5);
        net.add_edge(2, 3, 5);
        for algorithm in ALGORITHMS {
            let cut = algorithm.min_st_cut(&net, 0, 3).unwrap();
            assert_eq!(cut.value, 0);
        }
    }

    #[test]
    fn preconditions_are_checked() {
        let net = FlowNetwork::new(1);
        assert!(matches!(
            MaxFlowAlgorithm::PushRelabel.min_st_cut(&net, 0, 0),
            Err(FlipCutError::EmptyNetwork(1))
        ));
        let net = clrs();
        assert!(matches!(
            MaxFlowAlgorithm::AugmentingPath.min_st_cut(&net, 2, 2),
            Err(FlipCutError::InvalidTerminals(2, 2, 6))
        ));
        assert!(MaxFlowAlgorithm::AugmentingPath.min_st_cut(&net, 0, 9).is_err());
    }

    #[test]
    fn add_node_extends_network() {
        let mut net = FlowNetwork::new(2);
        let v = net.add_node();
        assert_eq!(v, 2);
        net.add_edge(0, v, 3);
        net.add_edge(v, 1, 2);
        assert_eq!(net.edge_count(), 2);
        let cut = MaxFlowAlgorithm::PushRelabel.min_st_cut(&net, 0, 1).unwrap();
        assert_eq!(cut.value, 2);
    }

    fn arb_network() -> impl Strategy<Value = (usize, Vec<(usize, usize, i64)>)> {
        (2usize..9).prop_flat_map(|n| {
            let edge = (0..n, 0..n, 0i64..50);
            (Just(n), proptest::collection::vec(edge, 0..30))
        })
    }

    proptest! {
        #[test]
        fn solvers_agree_on_random_networks((n, edges) in arb_network()) {
            let mut net = FlowNetwork::new(n);
            for (u, v, c) in edges {
                if u != v {
                    net.add_edge(u, v, c);
                }
            }
            let a = MaxFlowAlgorithm::PushRelabel.min_st_cut(&net, 0, n - 1).unwrap();
            let b = MaxFlowAlgorithm::AugmentingPath.min_st_cut(&net, 0, n - 1).unwrap();
            prop_assert_eq!(a.value, b.value);
            prop_assert_eq!(net.cut_capacity(&a.source_side), a.value);
            prop_assert_eq!(net.cut_capacity(&b.source_side), b.value);
        }
    }
}
