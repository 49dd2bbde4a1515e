//! Shortest augmenting paths (Ahuja-Orlin).
//!
//! Distance labels are exact to start with and kept valid by retreat steps.
//! The search stops as soon as the source label reaches `n` or a label level
//! empties, since either means no augmenting path is left.

use super::{FlowNetwork, StCut};

pub(super) fn min_cut(network: &FlowNetwork, s: usize, t: usize) -> StCut {
    let n = network.node_count();
    let mut residual = network.capacities.clone();
    let mut dist = network.distance_labels(&residual, t);
    let mut count = vec![0usize; n + 1];
    for &d in &dist {
        count[d] += 1;
    }

    let mut current = vec![0usize; n];
    let mut pred = vec![usize::MAX; n];
    let mut total = 0i64;
    let mut u = s;

    while dist[s] < n {
        let admissible = network.adjacency[u][current[u]..]
            .iter()
            .position(|&e| residual[e] > 0 && dist[u] == dist[network.heads[e]] + 1);

        match admissible {
            Some(offset) => {
                current[u] += offset;
                let e = network.adjacency[u][current[u]];
                let v = network.heads[e];
                pred[v] = e;
                u = v;
                if u == t {
                    total += augment(network, &mut residual, &pred, s, t);
                    u = s;
                }
            }
            None => {
                let old = dist[u];
                let new = network.adjacency[u]
                    .iter()
                    .filter(|&&e| residual[e] > 0)
                    .map(|&e| dist[network.heads[e]] + 1)
                    .min()
                    .unwrap_or(n)
                    .min(n);
                count[old] -= 1;
                if count[old] == 0 {
                    break;
                }
                dist[u] = new;
                count[new] += 1;
                current[u] = 0;
                if u != s {
                    u = network.heads[pred[u] ^ 1];
                }
            }
        }
    }

    StCut { value: total, source_side: network.reachable(&residual, s) }
}

/// Push the bottleneck along the predecessor path from `s` to `t`.
fn augment(network: &FlowNetwork, residual: &mut [i64], pred: &[usize], s: usize, t: usize) -> i64 {
    let mut bottleneck = i64::MAX;
    let mut v = t;
    while v != s {
        let e = pred[v];
        bottleneck = bottleneck.min(residual[e]);
        v = network.heads[e ^ 1];
    }
    let mut v = t;
    while v != s {
        let e = pred[v];
        residual[e] -= bottleneck;
        residual[e ^ 1] += bottleneck;
        v = network.heads[e ^ 1];
    }
    bottleneck
}
