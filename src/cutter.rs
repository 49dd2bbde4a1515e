//! Flow-network construction and cut translation.
//!
//! # Network layout
//! For a graph whose taxa are grouped into vertices (see
//! [`CharacterGraph::vertex_groups`]) the network holds, in this order:
//! - one node per vertex
//! - for each dummy (characters with identical vertex sets), a character node
//!   immediately followed by its clone node
//!
//! ```text
//!   vertex ──∞──► clone ──weight──► character ──∞──► vertex
//! ```
//!
//! Only the clone → character edge is finite, so a minimum cut only ever
//! severs characters. A character is deleted exactly when its clone is on the
//! source side and the character node is not.

use crate::bitset::Bitset;
use crate::error::{FlipCutError, Result};
use crate::flow::{FlowNetwork, MaxFlowAlgorithm, StCut};
use crate::graph::{CharacterGraph, NO_VERTEX, VertexGroups};
use crate::karger::{CompressedHypergraph, KargerStein};
use crate::pool::WorkerPool;
use crate::vazirani;
use itertools::Itertools;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// A bipartition of a graph's taxa together with the characters it deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cut {
    /// Total weight of the deleted characters
    pub value: i64,
    /// Deleted character ids, ascending
    pub deleted: Vec<usize>,
    pub source_taxa: Bitset,
    pub sink_taxa: Bitset,
}

/// Characters merged because they touch exactly the same vertices.
///
/// Both directions are updated together by [`DummyMapping::insert`].
#[derive(Debug, Clone, Default)]
pub struct DummyMapping {
    dummy_to_characters: Vec<Vec<usize>>,
    character_to_dummy: HashMap<usize, usize>,
}

impl DummyMapping {
    /// Assign `character` to `dummy`. A dummy id equal to `len()` opens a new dummy.
    pub fn insert(&mut self, character: usize, dummy: usize) {
        if dummy == self.dummy_to_characters.len() {
            self.dummy_to_characters.push(Vec::new());
        }
        if let Some(previous) = self.character_to_dummy.insert(character, dummy) {
            self.dummy_to_characters[previous].retain(|&c| c != character);
        }
        self.dummy_to_characters[dummy].push(character);
    }

    pub fn characters_of(&self, dummy: usize) -> &[usize] {
        &self.dummy_to_characters[dummy]
    }

    pub fn dummy_of(&self, character: usize) -> Option<usize> {
        self.character_to_dummy.get(&character).copied()
    }

    pub fn len(&self) -> usize {
        self.dummy_to_characters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dummy_to_characters.is_empty()
    }
}

/// Flow network for one graph and one vertex grouping.
#[derive(Debug, Clone)]
pub struct CharacterNetwork {
    network: FlowNetwork,
    vertices: usize,
    dummies: DummyMapping,
    weights: Vec<i64>,
    /// character node ↔ clone node, identity on vertex nodes
    clone_of: Vec<usize>,
    infinity: i64,
}

impl CharacterNetwork {
    /// Build the network of `graph` over the vertices in `groups`.
    ///
    /// Characters touching fewer than two vertices are left out: they sit
    /// inside one vertex and can never be cut.
    ///
    /// # Errors
    /// `Invariant` if a guide character touches more than one vertex.
    pub fn build(graph: &CharacterGraph, groups: &VertexGroups) -> Result<Self> {
        let vertices = groups.len();
        let mut dummies = DummyMapping::default();
        let mut by_vertices: HashMap<Vec<usize>, usize> = HashMap::new();
        let mut vertex_sets: Vec<Vec<usize>> = Vec::new();
        let mut weights: Vec<i64> = Vec::new();

        for c in graph.characters() {
            let touched: Vec<usize> = graph
                .character_taxa(c)
                .iter_ones()
                .map(|t| groups.vertex_of[t])
                .filter(|&v| v != NO_VERTEX)
                .sorted_unstable()
                .dedup()
                .collect();
            if touched.len() < 2 {
                continue;
            }
            if c.guide {
                return Err(FlipCutError::Invariant(format!(
                    "guide character {} spans {} vertices",
                    c.id,
                    touched.len()
                )));
            }
            let next = weights.len();
            let dummy = *by_vertices.entry(touched.clone()).or_insert_with(|| {
                vertex_sets.push(touched);
                weights.push(0);
                next
            });
            weights[dummy] += c.weight;
            dummies.insert(c.id, dummy);
        }

        let infinity = weights.iter().sum::<i64>().saturating_add(1);
        let nodes = vertices + 2 * weights.len();
        let mut network = FlowNetwork::new(nodes);
        let mut clone_of: Vec<usize> = (0..nodes).collect();

        for (dummy, touched) in vertex_sets.iter().enumerate() {
            let character = vertices + 2 * dummy;
            let clone = character + 1;
            clone_of[character] = clone;
            clone_of[clone] = character;

            network.add_edge(clone, character, weights[dummy]);
            for &v in touched {
                network.add_edge(character, v, infinity);
                network.add_edge(v, clone, infinity);
            }
        }

        Ok(CharacterNetwork { network, vertices, dummies, weights, clone_of, infinity })
    }

    pub fn network(&self) -> &FlowNetwork {
        &self.network
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices
    }

    pub fn dummies(&self) -> &DummyMapping {
        &self.dummies
    }

    #[inline]
    pub fn character_node(&self, dummy: usize) -> usize {
        self.vertices + 2 * dummy
    }

    #[inline]
    pub fn clone_node(&self, dummy: usize) -> usize {
        self.clone_of[self.character_node(dummy)]
    }

    /// Translate a network cut back to characters and taxa of `graph`.
    ///
    /// # Errors
    /// `Invariant` when the cut is not finite, a side is empty, or the cut
    /// value disagrees with the weight of the severed characters.
    pub fn undo_mapping(&self, st: &StCut, groups: &VertexGroups, graph: &CharacterGraph) -> Result<Cut> {
        if st.value >= self.infinity {
            return Err(FlipCutError::Invariant("no finite cut between the terminals".to_string()));
        }

        let mut value = 0i64;
        let mut deleted = Vec::new();
        for dummy in 0..self.dummies.len() {
            if st.source_side[self.clone_node(dummy)] && !st.source_side[self.character_node(dummy)] {
                value += self.weights[dummy];
                deleted.extend_from_slice(self.dummies.characters_of(dummy));
            }
        }
        deleted.sort_unstable();

        let mut source_taxa = Bitset::zeros(graph.taxa().0.len());
        for v in (0..self.vertices).filter(|&v| st.source_side[v]) {
            source_taxa.or_assign(&groups.members[v]);
        }
        let sink_taxa = graph.taxa().difference(&source_taxa);

        if value != st.value {
            return Err(FlipCutError::Invariant(format!(
                "cut value {} does not match severed weight {value}",
                st.value
            )));
        }
        if source_taxa.is_empty() || sink_taxa.is_empty() {
            return Err(FlipCutError::Invariant("cut leaves one side empty".to_string()));
        }
        Ok(Cut { value, deleted, source_taxa, sink_taxa })
    }
}

/// How a single connected graph is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CutMethod {
    #[default]
    PushRelabel,
    AugmentingPath,
    KargerStein,
}

impl CutMethod {
    /// Flow solver backing this method. Karger-Stein still uses flow for
    /// k-best enumeration.
    pub fn flow_algorithm(self) -> MaxFlowAlgorithm {
        match self {
            CutMethod::AugmentingPath => MaxFlowAlgorithm::AugmentingPath,
            CutMethod::PushRelabel | CutMethod::KargerStein => MaxFlowAlgorithm::PushRelabel,
        }
    }
}

impl FromStr for CutMethod {
    type Err = FlipCutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "push-relabel" | "goldberg-tarjan" | "gt" => Ok(CutMethod::PushRelabel),
            "augmenting-path" | "ahuja-orlin" | "ao" => Ok(CutMethod::AugmentingPath),
            "karger-stein" | "karger" | "ks" => Ok(CutMethod::KargerStein),
            _ => Err(FlipCutError::UnsupportedCutMethod(s.to_string())),
        }
    }
}

impl fmt::Display for CutMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CutMethod::PushRelabel => "push-relabel",
            CutMethod::AugmentingPath => "augmenting-path",
            CutMethod::KargerStein => "karger-stein",
        };
        f.write_str(name)
    }
}

pub struct GraphCutter<'p> {
    method: CutMethod,
    pool: &'p WorkerPool,
    karger: KargerStein,
}

impl<'p> GraphCutter<'p> {
    pub fn new(method: CutMethod, pool: &'p WorkerPool, karger: KargerStein) -> Self {
        GraphCutter { method, pool, karger }
    }

    pub fn method(&self) -> CutMethod {
        self.method
    }

    /// Minimum cut of a connected graph with at least two vertices.
    ///
    /// # Errors
    /// `Invariant` if the graph has a single vertex or turns out to be
    /// disconnected (a zero-valued cut).
    pub fn min_cut(&self, graph: &CharacterGraph) -> Result<Cut> {
        let cut = match self.method {
            CutMethod::KargerStein => self.karger_cut(graph)?,
            method => self.flow_cut(graph, method.flow_algorithm())?,
        };
        if cut.value == 0 {
            return Err(FlipCutError::Invariant(
                "graph treated as connected has a zero-valued cut".to_string(),
            ));
        }
        debug!(
            taxa = graph.taxon_count(),
            value = cut.value,
            deleted = cut.deleted.len(),
            "min cut"
        );
        Ok(cut)
    }

    /// Up to `k` cheapest distinct cuts, see [`vazirani::k_best_cuts`].
    pub fn k_best_cuts(&self, graph: &CharacterGraph, k: usize, upper_bound: Option<i64>) -> Result<Vec<Cut>> {
        vazirani::k_best_cuts(graph, self.method.flow_algorithm(), self.pool, k, upper_bound)
    }

    fn flow_cut(&self, graph: &CharacterGraph, algorithm: MaxFlowAlgorithm) -> Result<Cut> {
        let groups = graph.vertex_groups();
        if groups.len() < 2 {
            return Err(FlipCutError::Invariant(format!(
                "cannot cut a graph with {} vertices",
                groups.len()
            )));
        }
        let net = CharacterNetwork::build(graph, &groups)?;
        // fixed source, every other vertex as sink
        let pairs: Vec<(usize, usize)> = (1..groups.len()).map(|t| (0, t)).collect();
        let (_, st) = self.pool.min_st_cut(net.network(), algorithm, &pairs)?;
        net.undo_mapping(&st, &groups, graph)
    }

    fn karger_cut(&self, graph: &CharacterGraph) -> Result<Cut> {
        let compressed = CompressedHypergraph::from_graph(graph);
        if compressed.vertex_count() < 2 {
            return Err(FlipCutError::Invariant(format!(
                "cannot cut a graph with {} vertices",
                compressed.vertex_count()
            )));
        }
        let mut rng = self.karger.rng_for(graph.taxa());
        let sampled = self.karger.min_cut(&compressed, &mut rng)?;
        graph.cut_for_sides(&sampled.source)
    }
}
