//! The character graph of one recursion step.
//!
//! A `CharacterGraph` is a view into the shared [`Hypergraph`]: the taxa
//! still present in this part of the recursion and, for every character still
//! alive, which of its parts are still informative.
//!
//! # Semi-universal characters
//! A part stays informative while some of its zeros (taxa of its source tree
//! outside the clade) are still in the graph. Once all of them have been
//! separated away the clade says nothing about the remaining taxa. A character
//! whose parts are all exhausted is semi-universal and gets removed before
//! the next cut.
//!
//! # Active partitions
//! Guide characters are merged into a single vertex for cutting. Only the
//! outermost present guide characters are active; nested ones become active
//! once the enclosing guide clade has been resolved.

use crate::bitset::Bitset;
use crate::cutter::Cut;
use crate::error::{FlipCutError, Result};
use crate::hypergraph::Hypergraph;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Marker for taxa that are not part of a graph.
pub const NO_VERTEX: usize = usize::MAX;

/// A character as seen by one graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphCharacter {
    /// Index into [`Hypergraph::characters`]
    pub id: usize,
    /// Indices of the parts that are still informative
    pub parts: Vec<usize>,
    /// Deletion weight of the informative non-guide parts
    pub weight: i64,
    /// Still holds its scaffold part
    pub guide: bool,
}

/// Taxa grouped into the vertices used for cutting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexGroups {
    /// Taxon index → vertex, [`NO_VERTEX`] for taxa outside the graph
    pub vertex_of: Vec<usize>,
    /// Vertex → taxa, ordered by lowest taxon
    pub members: Vec<Bitset>,
}

impl VertexGroups {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CharacterGraph {
    hypergraph: Arc<Hypergraph>,
    taxa: Bitset,
    characters: Vec<GraphCharacter>,
}

impl CharacterGraph {
    /// The graph over every taxon and character of `hypergraph`.
    pub fn root(hypergraph: Arc<Hypergraph>) -> Self {
        let characters = hypergraph
            .characters()
            .iter()
            .enumerate()
            .map(|(id, c)| GraphCharacter {
                id,
                parts: (0..c.parts.len()).collect(),
                weight: c.weight(),
                guide: c.is_guide(),
            })
            .collect();
        let taxa = hypergraph.all_taxa();
        CharacterGraph { hypergraph, taxa, characters }
    }

    pub fn hypergraph(&self) -> &Arc<Hypergraph> {
        &self.hypergraph
    }

    pub fn taxa(&self) -> &Bitset {
        &self.taxa
    }

    pub fn taxon_count(&self) -> usize {
        self.taxa.count_ones()
    }

    pub fn characters(&self) -> &[GraphCharacter] {
        &self.characters
    }

    /// Taxa of a character of this graph.
    #[inline]
    pub fn character_taxa(&self, character: &GraphCharacter) -> &Bitset {
        &self.hypergraph.character(character.id).taxa
    }

    /// Ids of the characters present, ascending.
    pub fn character_ids(&self) -> Vec<usize> {
        self.characters.iter().map(|c| c.id).collect()
    }

    /// Drop exhausted parts and remove semi-universal characters.
    ///
    /// Returns how many characters were removed. A guide character whose
    /// scaffold part is exhausted stops being a guide, which activates the
    /// guide characters nested in it.
    pub fn delete_semi_universals(&mut self) -> usize {
        let hypergraph = Arc::clone(&self.hypergraph);
        let before = self.characters.len();

        for c in self.characters.iter_mut() {
            let source = hypergraph.character(c.id);
            c.parts.retain(|&p| source.parts[p].zeros.intersects(&self.taxa));
            c.weight = c
                .parts
                .iter()
                .map(|&p| &source.parts[p])
                .filter(|p| !p.guide)
                .map(|p| p.weight)
                .sum();
            c.guide = c.parts.iter().any(|&p| source.parts[p].guide);
        }
        self.characters.retain(|c| !c.parts.is_empty());

        let removed = before - self.characters.len();
        if removed > 0 {
            debug!(removed, taxa = self.taxon_count(), "removed semi-universal characters");
        }
        removed
    }

    /// Present guide characters without a present guide ancestor.
    pub fn active_partitions(&self) -> Vec<usize> {
        let guides: HashSet<usize> =
            self.characters.iter().filter(|c| c.guide).map(|c| c.id).collect();
        if guides.is_empty() {
            return Vec::new();
        }
        let scaffold = self.hypergraph.scaffold();
        let mut active: Vec<usize> = guides
            .iter()
            .copied()
            .filter(|&c| !scaffold.ancestors(c).any(|a| guides.contains(&a)))
            .collect();
        active.sort_unstable();
        active
    }

    /// Group taxa into cutting vertices.
    ///
    /// Each active partition becomes one vertex, every other taxon its own.
    pub fn vertex_groups(&self) -> VertexGroups {
        let mut vertex_of = vec![NO_VERTEX; self.hypergraph.taxon_count()];
        let mut members: Vec<Bitset> = Vec::new();

        let mut partition_of: HashMap<usize, Bitset> = HashMap::new();
        for c in self.active_partitions() {
            let taxa = self.hypergraph.character(c).taxa.intersection(&self.taxa);
            for t in taxa.iter_ones() {
                partition_of.insert(t, taxa.clone());
            }
        }

        for taxon in self.taxa.iter_ones() {
            if vertex_of[taxon] != NO_VERTEX {
                continue;
            }
            let group = partition_of
                .remove(&taxon)
                .unwrap_or_else(|| Bitset::from_indices(self.taxa.0.len(), [taxon]));
            for t in group.iter_ones() {
                vertex_of[t] = members.len();
            }
            members.push(group);
        }

        VertexGroups { vertex_of, members }
    }

    /// Connected components over taxa, ordered by lowest taxon.
    ///
    /// A connected graph yields a single component equal to itself.
    pub fn components(&self) -> Vec<CharacterGraph> {
        let mut sets = DisjointSets::new(self.hypergraph.taxon_count());
        for c in &self.characters {
            let present = self.character_taxa(c).intersection(&self.taxa);
            let mut taxa = present.iter_ones();
            if let Some(first) = taxa.next() {
                for t in taxa {
                    sets.union(first, t);
                }
            }
        }

        let mut roots: Vec<usize> = Vec::new();
        let mut component_taxa: HashMap<usize, Bitset> = HashMap::new();
        for t in self.taxa.iter_ones() {
            let root = sets.find(t);
            component_taxa
                .entry(root)
                .or_insert_with(|| {
                    roots.push(root);
                    Bitset::zeros(self.taxa.0.len())
                })
                .set(t);
        }
        if roots.len() == 1 {
            return vec![self.clone()];
        }

        roots
            .into_iter()
            .map(|root| {
                let taxa = component_taxa
                    .remove(&root)
                    .unwrap_or_else(|| Bitset::zeros(self.taxa.0.len()));
                let characters = self
                    .characters
                    .iter()
                    .filter(|c| self.character_taxa(c).intersection(&taxa).count_ones() >= 2)
                    .cloned()
                    .collect();
                self.subgraph(taxa, characters)
            })
            .collect()
    }

    /// Remove the cut characters and split into the source and sink side.
    ///
    /// # Errors
    /// `Invariant` if the cut does not partition this graph's taxa, or if a
    /// character that was not deleted still spans both sides.
    pub fn split(&self, cut: &Cut) -> Result<(CharacterGraph, CharacterGraph)> {
        self.check_sides(&cut.source_taxa, &cut.sink_taxa)?;

        let deleted: HashSet<usize> = cut.deleted.iter().copied().collect();
        let mut source_chars = Vec::new();
        let mut sink_chars = Vec::new();
        for c in self.characters.iter().filter(|c| !deleted.contains(&c.id)) {
            let taxa = self.character_taxa(c);
            let in_source = taxa.intersection(&cut.source_taxa).count_ones();
            let in_sink = taxa.intersection(&cut.sink_taxa).count_ones();
            match (in_source, in_sink) {
                (0, 0) => {}
                (_, 0) => {
                    if in_source >= 2 {
                        source_chars.push(c.clone());
                    }
                }
                (0, _) => {
                    if in_sink >= 2 {
                        sink_chars.push(c.clone());
                    }
                }
                _ => {
                    return Err(FlipCutError::Invariant(format!(
                        "character {} spans both sides of a cut",
                        c.id
                    )));
                }
            }
        }

        Ok((
            self.subgraph(cut.source_taxa.clone(), source_chars),
            self.subgraph(cut.sink_taxa.clone(), sink_chars),
        ))
    }

    /// The cut induced by putting `source_taxa` on one side and the rest on the other.
    ///
    /// # Errors
    /// `Invariant` if a side is empty or a guide character would be deleted.
    pub fn cut_for_sides(&self, source_taxa: &Bitset) -> Result<Cut> {
        let source_taxa = source_taxa.intersection(&self.taxa);
        let sink_taxa = self.taxa.difference(&source_taxa);
        self.check_sides(&source_taxa, &sink_taxa)?;

        let mut value = 0i64;
        let mut deleted = Vec::new();
        for c in &self.characters {
            let taxa = self.character_taxa(c);
            if taxa.intersects(&source_taxa) && taxa.intersects(&sink_taxa) {
                if c.guide {
                    return Err(FlipCutError::Invariant(format!(
                        "guide character {} crosses a cut",
                        c.id
                    )));
                }
                value += c.weight;
                deleted.push(c.id);
            }
        }
        Ok(Cut { value, deleted, source_taxa, sink_taxa })
    }

    fn check_sides(&self, source: &Bitset, sink: &Bitset) -> Result<()> {
        let mut union = source.clone();
        union.or_assign(sink);
        if source.is_empty() || sink.is_empty() || source.intersects(sink) || union != self.taxa {
            return Err(FlipCutError::Invariant(
                "cut sides must be non-empty, disjoint and cover the graph".to_string(),
            ));
        }
        Ok(())
    }

    fn subgraph(&self, taxa: Bitset, characters: Vec<GraphCharacter>) -> CharacterGraph {
        CharacterGraph { hypergraph: Arc::clone(&self.hypergraph), taxa, characters }
    }
}

/// Union-find over taxon indices with path halving.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        DisjointSets { parent: (0..n).collect() }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // lower index wins, which keeps roots deterministic
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::costs::{ACCURACY, CostModel, Weighting};
    use crate::hypergraph::HypergraphBuilder;
    use crate::source::SourceTree;

    pub(crate) fn graph(newicks: &[&str], scaffold: Option<&str>) -> CharacterGraph {
        let trees: Vec<SourceTree> =
            newicks.iter().map(|n| SourceTree::from_newick(n).unwrap()).collect();
        let costs = CostModel::new(&trees, Weighting::Unit);
        let s = scaffold.map(|s| SourceTree::from_newick(s).unwrap());
        let h = HypergraphBuilder::new(&trees, &costs).scaffold(s.as_ref()).build().unwrap();
        CharacterGraph::root(Arc::new(h))
    }

    fn taxa(g: &CharacterGraph, labels: &[&str]) -> Bitset {
        let h = g.hypergraph();
        Bitset::from_indices(h.words(), labels.iter().map(|l| h.index_of(l).unwrap()))
    }

    #[test]
    fn split_then_semi_universal_removal() {
        let g = graph(&["((a,b),c);", "((a,b),c);", "((a,c),b);"], None);
        assert_eq!(g.components().len(), 1);

        let cut = g.cut_for_sides(&taxa(&g, &["a", "b"])).unwrap();
        assert_eq!(cut.value, ACCURACY);
        assert_eq!(cut.deleted, vec![1]);

        let (mut ab, c) = g.split(&cut).unwrap();
        assert_eq!(ab.taxon_count(), 2);
        assert_eq!(ab.character_ids(), vec![0]);
        assert_eq!(c.taxon_count(), 1);
        assert!(c.characters().is_empty());

        // zeros {c} are gone, so {a,b} no longer separates anything
        assert_eq!(ab.delete_semi_universals(), 1);
        assert_eq!(ab.components().len(), 2);
    }

    #[test]
    fn disjoint_trees_form_components() {
        let g = graph(&["(a,b);", "(c,d);"], None);
        let comps = g.components();
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].taxa(), &taxa(&g, &["a", "b"]));
        assert_eq!(comps[1].taxa(), &taxa(&g, &["c", "d"]));
        assert_eq!(comps[0].characters().len(), 1);
        assert_eq!(comps[1].characters().len(), 1);
    }

    #[test]
    fn split_rejects_crossing_characters() {
        let g = graph(&["((a,b),c);"], None);
        let cut = Cut {
            value: 0,
            deleted: vec![],
            source_taxa: taxa(&g, &["a"]),
            sink_taxa: taxa(&g, &["b", "c"]),
        };
        assert!(matches!(g.split(&cut), Err(FlipCutError::Invariant(_))));
    }

    #[test]
    fn sides_must_cover_graph() {
        let g = graph(&["((a,b),c);"], None);
        assert!(g.cut_for_sides(&taxa(&g, &["a", "b", "c"])).is_err());
        assert!(g.cut_for_sides(&Bitset::zeros(1)).is_err());
    }

    #[test]
    fn active_partitions_follow_the_scaffold() {
        let g = graph(&["((a,b),(c,d));", "((a,c),(b,d));"], Some("(((a,b),c),d);"));
        assert_eq!(g.active_partitions(), vec![0]);

        let groups = g.vertex_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.members[0], taxa(&g, &["a", "b", "c"]));
        assert_eq!(groups.vertex_of[3], 1);

        // guide clades can never be deleted
        assert!(g.cut_for_sides(&taxa(&g, &["a"])).is_err());

        let cut = g.cut_for_sides(&taxa(&g, &["a", "b", "c"])).unwrap();
        let (mut abc, _) = g.split(&cut).unwrap();
        abc.delete_semi_universals();
        assert_eq!(abc.active_partitions(), vec![1]);
        let groups = abc.vertex_groups();
        assert_eq!(groups.members, vec![taxa(&g, &["a", "b"]), taxa(&g, &["c"])]);
        assert_eq!(groups.vertex_of[3], NO_VERTEX);
    }

    #[test]
    fn disjoint_sets_prefer_low_roots() {
        let mut s = DisjointSets::new(5);
        s.union(4, 3);
        s.union(3, 1);
        assert_eq!(s.find(4), 1);
        assert_eq!(s.find(0), 0);
    }
}
