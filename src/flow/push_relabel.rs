//! FIFO push-relabel, first phase only.
//!
//! After the first phase the preflow is maximum: the sink's excess is the
//! max-flow value and the vertices that can no longer reach the sink form the
//! source side of a minimum cut. Returning flow excess to the source (the
//! second phase) is not needed for a cut and is skipped.

use super::{FlowNetwork, StCut};
use std::collections::VecDeque;

pub(super) fn min_cut(network: &FlowNetwork, s: usize, t: usize) -> StCut {
    let n = network.node_count();
    let mut residual = network.capacities.clone();
    // excess of a vertex can exceed any single capacity
    let mut excess = vec![0i128; n];

    let mut height = network.distance_labels(&residual, t);
    height[s] = n;
    let mut count = vec![0usize; n + 1];
    for (v, &h) in height.iter().enumerate() {
        if v != s && h < n {
            count[h] += 1;
        }
    }

    let mut current = vec![0usize; n];
    let mut queued = vec![false; n];
    let mut queue = VecDeque::new();

    for &e in &network.adjacency[s] {
        let c = residual[e];
        if c <= 0 {
            continue;
        }
        let v = network.heads[e];
        residual[e] = 0;
        residual[e ^ 1] += c;
        excess[v] += c as i128;
        if v != t && !queued[v] && height[v] < n {
            queued[v] = true;
            queue.push_back(v);
        }
    }

    while let Some(u) = queue.pop_front() {
        queued[u] = false;
        while excess[u] > 0 && height[u] < n {
            if current[u] == network.adjacency[u].len() {
                relabel(network, &residual, &mut height, &mut count, u);
                current[u] = 0;
                continue;
            }
            let e = network.adjacency[u][current[u]];
            let v = network.heads[e];
            if residual[e] > 0 && height[u] == height[v] + 1 {
                let delta = excess[u].min(residual[e] as i128) as i64;
                residual[e] -= delta;
                residual[e ^ 1] += delta;
                excess[u] -= delta as i128;
                excess[v] += delta as i128;
                if v != s && v != t && !queued[v] && height[v] < n {
                    queued[v] = true;
                    queue.push_back(v);
                }
            } else {
                current[u] += 1;
            }
        }
    }

    let reaches_sink = network.reaching(&residual, t);
    StCut {
        value: excess[t] as i64,
        source_side: reaches_sink.into_iter().map(|r| !r).collect(),
    }
}

/// Relabel `u`, applying the gap heuristic when its old level empties.
fn relabel(
    network: &FlowNetwork,
    residual: &[i64],
    height: &mut [usize],
    count: &mut [usize],
    u: usize,
) {
    let n = network.node_count();
    let old = height[u];
    let new = network.adjacency[u]
        .iter()
        .filter(|&&e| residual[e] > 0)
        .map(|&e| height[network.heads[e]] + 1)
        .min()
        .unwrap_or(n)
        .min(n);

    count[old] -= 1;
    if count[old] == 0 {
        // nothing left at `old`, so nothing above it can reach the sink
        for h in height.iter_mut() {
            if *h > old && *h < n {
                count[*h] -= 1;
                *h = n;
            }
        }
        height[u] = n;
        return;
    }

    height[u] = new;
    if new < n {
        count[new] += 1;
    }
}
