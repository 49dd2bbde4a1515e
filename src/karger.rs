//! Randomized hyperedge contraction (Karger-Stein).
//!
//! A [`CompressedHypergraph`] is the contraction view of a
//! [`CharacterGraph`]: every surviving vertex is named by a representative
//! taxon and owns the taxa merged into it, every hyperedge is the set of
//! representatives its character touches.
//!
//! # Algorithm
//! One contraction step draws a hyperedge with probability proportional to
//! its weight, picks two distinct members of it uniformly and merges them.
//! Hyperedges that collapse to a single vertex disappear, identical ones are
//! summed. Once two vertices remain, the surviving hyperedges are exactly the
//! characters crossing the bipartition and their weight is the cut value.
//!
//! Karger-Stein repeats this recursively: contract two independent copies
//! down to `⌈1 + n/√2⌉` vertices and recurse on each, keeping the lighter
//! cut. Small graphs (six vertices or fewer) are contracted directly.

use crate::bitset::Bitset;
use crate::error::{FlipCutError, Result};
use crate::graph::{CharacterGraph, NO_VERTEX};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::SQRT_2;

/// Below this many vertices the recursion contracts straight to a cut.
const PLAIN_CONTRACTION_LIMIT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedHypergraph {
    edges: Vec<Bitset>,
    weights: Vec<i64>,
    /// `cumulative[i]` is the weight of edges `0..=i`
    cumulative: Vec<i64>,
    /// representative → taxa merged into it
    merged: BTreeMap<usize, Bitset>,
}

impl CompressedHypergraph {
    /// Contraction view of `graph`.
    ///
    /// Active partitions start out merged into their lowest taxon, so guide
    /// clades can never be separated.
    pub fn from_graph(graph: &CharacterGraph) -> Self {
        let groups = graph.vertex_groups();
        let words = graph.taxa().0.len();

        let mut merged = BTreeMap::new();
        let mut representative = vec![NO_VERTEX; groups.vertex_of.len()];
        for members in &groups.members {
            if let Some(rep) = members.first_one() {
                for t in members.iter_ones() {
                    representative[t] = rep;
                }
                merged.insert(rep, members.clone());
            }
        }

        let edges = graph.characters().iter().map(|c| {
            let mut edge = Bitset::zeros(words);
            for t in graph.character_taxa(c).iter_ones() {
                if representative[t] != NO_VERTEX {
                    edge.set(representative[t]);
                }
            }
            (edge, c.weight)
        });

        let mut compressed = CompressedHypergraph {
            edges: Vec::new(),
            weights: Vec::new(),
            cumulative: Vec::new(),
            merged,
        };
        compressed.collect_edges(edges);
        compressed
    }

    pub fn vertex_count(&self) -> usize {
        self.merged.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Exactly two vertices remain.
    pub fn is_cut(&self) -> bool {
        self.vertex_count() == 2
    }

    /// Weight of the surviving hyperedges.
    pub fn cut_value(&self) -> i64 {
        self.weights.iter().sum()
    }

    /// Taxa of the two remaining vertices, the side holding the lowest taxon first.
    pub fn sides(&self) -> Option<(&Bitset, &Bitset)> {
        if !self.is_cut() {
            return None;
        }
        let mut groups = self.merged.values();
        let (a, b) = (groups.next()?, groups.next()?);
        if a.first_one() <= b.first_one() { Some((a, b)) } else { Some((b, a)) }
    }

    /// Merge two vertices of a weighted random hyperedge.
    ///
    /// # Errors
    /// `Invariant` when there is nothing left to contract: two or fewer
    /// vertices, or no hyperedges between more than two.
    pub fn contract<R: Rng>(&mut self, rng: &mut R) -> Result<()> {
        if self.vertex_count() <= 2 {
            return Err(FlipCutError::Invariant(format!(
                "cannot contract a hypergraph with {} vertices",
                self.vertex_count()
            )));
        }
        let total = self.cumulative.last().copied().unwrap_or(0);
        if total <= 0 {
            return Err(FlipCutError::Invariant(format!(
                "no hyperedges left between {} vertices",
                self.vertex_count()
            )));
        }

        let draw = rng.gen_range(0..total);
        let edge = self.cumulative.partition_point(|&c| c <= draw);
        let members: Vec<usize> = self.edges[edge].iter_ones().collect();
        let (keep, gone) = if members.len() == 2 {
            (members[0], members[1])
        } else {
            let i = rng.gen_range(0..members.len());
            let mut j = rng.gen_range(0..members.len() - 1);
            if j >= i {
                j += 1;
            }
            (members[i], members[j])
        };

        self.merge(keep, gone)
    }

    /// Contract `self` and return the state it had before.
    pub fn contract_and_keep<R: Rng>(&mut self, rng: &mut R) -> Result<Self> {
        let kept = self.clone();
        self.contract(rng)?;
        Ok(kept)
    }

    /// Contract until `target` vertices (at least two) remain.
    pub fn contract_to<R: Rng>(&mut self, target: usize, rng: &mut R) -> Result<()> {
        let target = target.max(2);
        while self.vertex_count() > target {
            self.contract(rng)?;
        }
        Ok(())
    }

    fn merge(&mut self, keep: usize, gone: usize) -> Result<()> {
        let taxa = self
            .merged
            .remove(&gone)
            .ok_or_else(|| FlipCutError::Invariant(format!("vertex {gone} was already merged")))?;
        self.merged
            .get_mut(&keep)
            .ok_or_else(|| FlipCutError::Invariant(format!("vertex {keep} was already merged")))?
            .or_assign(&taxa);

        let edges = std::mem::take(&mut self.edges);
        let weights = std::mem::take(&mut self.weights);
        let relabelled = edges.into_iter().zip(weights).map(|(mut edge, weight)| {
            if edge.contains(gone) {
                edge.unset(gone);
                edge.set(keep);
            }
            (edge, weight)
        });
        self.collect_edges(relabelled);
        Ok(())
    }

    /// Replace the edge list, dropping loops and summing duplicates in
    /// first-appearance order.
    fn collect_edges<I: IntoIterator<Item = (Bitset, i64)>>(&mut self, edges: I) {
        let mut index: HashMap<Bitset, usize> = HashMap::new();
        self.edges.clear();
        self.weights.clear();
        for (edge, weight) in edges {
            if edge.count_ones() < 2 {
                continue;
            }
            match index.get(&edge) {
                Some(&i) => self.weights[i] += weight,
                None => {
                    index.insert(edge.clone(), self.edges.len());
                    self.edges.push(edge);
                    self.weights.push(weight);
                }
            }
        }
        self.cumulative = self
            .weights
            .iter()
            .scan(0i64, |acc, &w| {
                *acc += w;
                Some(*acc)
            })
            .collect();
    }

    fn to_cut(&self) -> Result<KargerCut> {
        let (source, sink) = self.sides().ok_or_else(|| {
            FlipCutError::Invariant(format!("{} vertices left after contraction", self.vertex_count()))
        })?;
        Ok(KargerCut { value: self.cut_value(), source: source.clone(), sink: sink.clone() })
    }
}

/// A bipartition found by contraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KargerCut {
    pub value: i64,
    /// Side holding the lowest taxon
    pub source: Bitset,
    pub sink: Bitset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KargerStein {
    /// Independent recursions per minimum cut
    pub rounds: usize,
    pub seed: u64,
}

impl Default for KargerStein {
    fn default() -> Self {
        KargerStein { rounds: 32, seed: 0 }
    }
}

impl KargerStein {
    /// Generator for one graph, derived from the seed and the graph's taxa.
    pub fn rng_for(&self, taxa: &Bitset) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.stream_seed(taxa))
    }

    /// The seed folded with every word of `taxa`. Stable across platforms
    /// and toolchains, so a seed always reproduces the same cuts.
    pub fn stream_seed(&self, taxa: &Bitset) -> u64 {
        taxa.0.iter().fold(splitmix64(self.seed), |acc, &word| splitmix64(acc ^ word))
    }

    /// Lightest cut over `rounds` Karger-Stein recursions. Ties keep the first found.
    pub fn min_cut<R: Rng>(&self, graph: &CompressedHypergraph, rng: &mut R) -> Result<KargerCut> {
        if graph.vertex_count() < 2 {
            return Err(FlipCutError::Invariant(format!(
                "cannot cut a hypergraph with {} vertices",
                graph.vertex_count()
            )));
        }
        let mut best = self.recurse(graph, rng)?;
        for _ in 1..self.rounds {
            let cut = self.recurse(graph, rng)?;
            if cut.value < best.value {
                best = cut;
            }
        }
        Ok(best)
    }

    fn recurse<R: Rng>(&self, graph: &CompressedHypergraph, rng: &mut R) -> Result<KargerCut> {
        let n = graph.vertex_count();
        if n <= PLAIN_CONTRACTION_LIMIT {
            return self.sample_cut(graph, rng);
        }
        let target = (1.0 + n as f64 / SQRT_2).ceil() as usize;

        let mut first = graph.clone();
        first.contract_to(target, rng)?;
        let a = self.recurse(&first, rng)?;

        let mut second = graph.clone();
        second.contract_to(target, rng)?;
        let b = self.recurse(&second, rng)?;

        Ok(if b.value < a.value { b } else { a })
    }

    /// One plain contraction run down to two vertices.
    pub fn sample_cut<R: Rng>(&self, graph: &CompressedHypergraph, rng: &mut R) -> Result<KargerCut> {
        let mut contracted = graph.clone();
        contracted.contract_to(2, rng)?;
        contracted.to_cut()
    }

    /// Distinct cuts from `count` contraction runs, lightest first.
    pub fn sample_cuts<R: Rng>(
        &self,
        graph: &CompressedHypergraph,
        count: usize,
        rng: &mut R,
    ) -> Result<Vec<KargerCut>> {
        let mut seen: BTreeMap<Bitset, KargerCut> = BTreeMap::new();
        for _ in 0..count {
            let cut = self.sample_cut(graph, rng)?;
            seen.entry(cut.source.clone()).or_insert(cut);
        }
        let mut cuts: Vec<KargerCut> = seen.into_values().collect();
        cuts.sort_by(|a, b| (a.value, &a.source).cmp(&(b.value, &b.source)));
        Ok(cuts)
    }
}

/// SplitMix64 finaliser.
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::ACCURACY;
    use crate::graph::tests::graph;

    fn five_taxa() -> CharacterGraph {
        graph(
            &["(((a,b),c),(d,e));", "((a,(b,c)),(d,e));", "(((a,d),b),(c,e));"],
            None,
        )
    }

    #[test]
    fn guide_clades_start_merged() {
        let g = graph(&["((a,b),(c,d));", "((a,c),(b,d));"], Some("(((a,b),c),d);"));
        let h = CompressedHypergraph::from_graph(&g);
        assert_eq!(h.vertex_count(), 2);
        // {c,d} and {b,d} both become {abc, d}
        assert_eq!(h.edge_count(), 1);
        assert!(h.is_cut());
        assert_eq!(h.cut_value(), 2 * ACCURACY);
    }

    #[test]
    fn contraction_ends_at_a_cut_of_spanning_weight() {
        let g = five_taxa();
        let karger = KargerStein::default();
        let mut rng = karger.rng_for(g.taxa());
        for _ in 0..10 {
            let mut h = CompressedHypergraph::from_graph(&g);
            h.contract_to(2, &mut rng).unwrap();
            assert!(h.is_cut());
            let (source, sink) = h.sides().unwrap();
            assert!(!source.intersects(sink));
            assert_eq!(g.cut_for_sides(source).unwrap().value, h.cut_value());
        }
    }

    #[test]
    fn each_contraction_removes_one_vertex() {
        let g = five_taxa();
        let mut h = CompressedHypergraph::from_graph(&g);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let before = h.clone();
        let kept = h.contract_and_keep(&mut rng).unwrap();
        assert_eq!(kept, before);
        assert_eq!(h.vertex_count(), before.vertex_count() - 1);
        assert_ne!(h, before);
    }

    #[test]
    fn same_seed_same_merges() {
        let g = five_taxa();
        let karger = KargerStein { rounds: 4, seed: 42 };
        let h = CompressedHypergraph::from_graph(&g);

        let mut a = h.clone();
        let mut b = h.clone();
        a.contract_to(3, &mut karger.rng_for(g.taxa())).unwrap();
        b.contract_to(3, &mut karger.rng_for(g.taxa())).unwrap();
        assert_eq!(a, b);

        let x = karger.min_cut(&h, &mut karger.rng_for(g.taxa())).unwrap();
        let y = karger.min_cut(&h, &mut karger.rng_for(g.taxa())).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn seeded_draws_are_pinned() {
        assert_eq!(splitmix64(0), 0xE220_A839_7B1D_CDAF);

        let g = graph(&["((a,b),c);", "((a,b),c);", "((a,c),b);"], None);
        let karger = KargerStein { rounds: 1, seed: 42 };
        assert_eq!(karger.stream_seed(g.taxa()), 0x1606_2D6C_1339_E500);

        let mut rng = karger.rng_for(g.taxa());
        let draws: Vec<i64> = (0..4).map(|_| rng.gen_range(0..3 * ACCURACY)).collect();
        assert_eq!(draws, vec![2_390_142_514, 2_799_798_347, 808_399_202, 1_988_755_478]);

        // {a,b} weighs 2 and {a,c} weighs 1: a draw below 2 merges a with b
        let h = CompressedHypergraph::from_graph(&g);
        let mut rng = karger.rng_for(g.taxa());
        let values: Vec<i64> =
            (0..8).map(|_| karger.sample_cut(&h, &mut rng).unwrap().value / ACCURACY).collect();
        assert_eq!(values, vec![2, 2, 1, 1, 1, 2, 1, 1]);
    }

    #[test]
    fn finds_the_lightest_cut() {
        let g = graph(&["((a,b),c);", "((a,b),c);", "((a,c),b);"], None);
        let karger = KargerStein::default();
        let cut = karger
            .min_cut(&CompressedHypergraph::from_graph(&g), &mut karger.rng_for(g.taxa()))
            .unwrap();
        assert_eq!(cut.value, ACCURACY);
        assert_eq!(cut.source.count_ones(), 2);
        assert_eq!(cut.sink.count_ones(), 1);
    }

    #[test]
    fn sampled_cuts_are_distinct_and_ascending() {
        let g = graph(&["((a,b),c);", "((a,b),c);", "((a,c),b);"], None);
        let karger = KargerStein::default();
        let h = CompressedHypergraph::from_graph(&g);
        let cuts = karger.sample_cuts(&h, 20, &mut karger.rng_for(g.taxa())).unwrap();
        // a is always merged with b or c
        assert!(!cuts.is_empty() && cuts.len() <= 2);
        assert!(cuts.windows(2).all(|w| w[0].value <= w[1].value && w[0].source != w[1].source));
    }

    #[test]
    fn disconnected_hypergraph_cannot_be_contracted() {
        let g = graph(&["(a,b);", "(c,d);", "(e,f);"], None);
        let mut h = CompressedHypergraph::from_graph(&g);
        assert_eq!(h.vertex_count(), 6);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(matches!(h.contract_to(2, &mut rng), Err(FlipCutError::Invariant(_))));
    }
}
