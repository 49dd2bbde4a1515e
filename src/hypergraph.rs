//! Character/taxon hypergraph built from the input trees.
//!
//! # Overview
//! Every leaf label becomes a taxon with a stable index (rank in sorted label
//! order). Every informative inner node becomes a *part* of a character:
//! the clade bitset (the "ones"), the taxa of its tree outside the clade (the
//! "zeros") and a weight from the [`CostModel`]. Parts with bit-identical ones
//! are merged into one [`Character`] whose deletion weight is their sum.
//!
//! ```text
//!   ((a,b),c)   ((a,b),c)   ((a,c),b)
//!
//!   character {a,b}: parts [zeros {c}, zeros {c}]  weight 2
//!   character {a,c}: parts [zeros {b}]             weight 1
//! ```
//!
//! A scaffold (guide) tree is processed first. Its clades become guide parts
//! that must never be cut, and the [`ScaffoldMapping`] remembers which
//! scaffold node each guide character came from and how guide characters nest.

use crate::bitset::Bitset;
use crate::costs::CostModel;
use crate::error::{FlipCutError, Result};
use crate::source::SourceTree;
use itertools::Itertools;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// One constituent clade of a character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Taxa of the originating tree that are not in the clade. The root
    /// clade of an isolated tree uses every other input taxon instead.
    pub zeros: Bitset,
    pub weight: i64,
    /// Mandatory clade from the scaffold tree
    pub guide: bool,
}

/// A (merged) hyperedge: a clade and the parts that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub taxa: Bitset,
    pub parts: Vec<Part>,
}

impl Character {
    /// Summed weight of the non-guide parts.
    pub fn weight(&self) -> i64 {
        self.parts.iter().filter(|p| !p.guide).map(|p| p.weight).sum()
    }

    pub fn is_guide(&self) -> bool {
        self.parts.iter().any(|p| p.guide)
    }
}

/// Association between guide characters and scaffold tree nodes.
///
/// Two one-directional maps kept consistent by [`ScaffoldMapping::insert`],
/// plus the nearest enclosing guide character of each guide character.
#[derive(Debug, Clone, Default)]
pub struct ScaffoldMapping {
    character_to_node: HashMap<usize, usize>,
    node_to_character: HashMap<usize, usize>,
    parent: HashMap<usize, usize>,
}

impl ScaffoldMapping {
    /// Record `character` as originating from scaffold `node`.
    ///
    /// Returns false, leaving the mapping untouched, if either side is already mapped.
    pub fn insert(&mut self, character: usize, node: usize, parent: Option<usize>) -> bool {
        if self.character_to_node.contains_key(&character)
            || self.node_to_character.contains_key(&node)
        {
            return false;
        }
        self.character_to_node.insert(character, node);
        self.node_to_character.insert(node, character);
        if let Some(p) = parent {
            self.parent.insert(character, p);
        }
        true
    }

    pub fn node_of(&self, character: usize) -> Option<usize> {
        self.character_to_node.get(&character).copied()
    }

    pub fn character_of(&self, node: usize) -> Option<usize> {
        self.node_to_character.get(&node).copied()
    }

    pub fn parent_of(&self, character: usize) -> Option<usize> {
        self.parent.get(&character).copied()
    }

    /// Enclosing guide characters, innermost first.
    pub fn ancestors(&self, character: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.parent_of(character), move |&c| self.parent_of(c))
    }

    pub fn len(&self) -> usize {
        self.character_to_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.character_to_node.is_empty()
    }
}

/// Immutable hypergraph shared by every step of a run.
#[derive(Debug, Clone)]
pub struct Hypergraph {
    taxa: Vec<String>,
    words: usize,
    characters: Vec<Character>,
    scaffold: ScaffoldMapping,
    raw_characters: usize,
}

impl Hypergraph {
    pub fn taxa(&self) -> &[String] {
        &self.taxa
    }

    pub fn taxon_count(&self) -> usize {
        self.taxa.len()
    }

    /// Number of u64 words in every bitset of this hypergraph.
    pub fn words(&self) -> usize {
        self.words
    }

    pub fn characters(&self) -> &[Character] {
        &self.characters
    }

    #[inline]
    pub fn character(&self, id: usize) -> &Character {
        &self.characters[id]
    }

    pub fn scaffold(&self) -> &ScaffoldMapping {
        &self.scaffold
    }

    /// Number of informative clades before identical ones were merged.
    pub fn raw_characters(&self) -> usize {
        self.raw_characters
    }

    pub fn all_taxa(&self) -> Bitset {
        Bitset::from_indices(self.words, 0..self.taxa.len())
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.taxa.binary_search_by(|t| t.as_str().cmp(label)).ok()
    }
}

pub struct HypergraphBuilder<'a> {
    trees: &'a [SourceTree],
    costs: &'a CostModel,
    scaffold: Option<&'a SourceTree>,
    bootstrap_threshold: u32,
}

impl<'a> HypergraphBuilder<'a> {
    pub fn new(trees: &'a [SourceTree], costs: &'a CostModel) -> Self {
        HypergraphBuilder { trees, costs, scaffold: None, bootstrap_threshold: 0 }
    }

    pub fn scaffold(mut self, scaffold: Option<&'a SourceTree>) -> Self {
        self.scaffold = scaffold;
        self
    }

    /// Inner nodes whose support label parses to a value below `threshold` are skipped.
    pub fn bootstrap_threshold(mut self, threshold: u32) -> Self {
        self.bootstrap_threshold = threshold;
        self
    }

    /// Build the hypergraph.
    ///
    /// # Algorithm
    /// 1. Collect and sort all leaf labels of the input trees; rank = taxon index
    /// 2. Scaffold inner nodes (parents first) become guide characters
    /// 3. Input inner nodes become weighted parts, merged by identical clade
    /// 4. An input tree that shares no taxon with any other input tree
    ///    contributes its root clade as well
    ///
    /// # Errors
    /// `NoInputTrees` for an empty tree list, `NoTaxa` if no tree has a leaf.
    pub fn build(self) -> Result<Hypergraph> {
        if self.trees.is_empty() {
            return Err(FlipCutError::NoInputTrees);
        }

        let taxa: Vec<String> = self
            .trees
            .iter()
            .flat_map(|t| t.leaf_labels())
            .map(str::to_string)
            .sorted()
            .dedup()
            .collect();
        if taxa.is_empty() {
            return Err(FlipCutError::NoTaxa);
        }

        let index: HashMap<&str, usize> =
            taxa.iter().enumerate().map(|(i, t)| (t.as_str(), i)).collect();
        let words = Bitset::words_for(taxa.len());
        let universe = Bitset::from_indices(words, 0..taxa.len());

        let mut merger = Merger::default();
        let mut scaffold_mapping = ScaffoldMapping::default();

        if let Some(scaffold) = self.scaffold {
            let clades = clade_bitsets(scaffold, &index, words);
            let scaffold_taxa = &clades[scaffold.root()];

            // nearest guide character above each scaffold node
            let mut guide_above: Vec<Option<usize>> = vec![None; scaffold.len()];
            for id in scaffold.inner_nodes() {
                let inherited = scaffold.node(id).parent.and_then(|p| guide_above[p]);
                let ones = &clades[id];
                if ones.count_ones() < 2 {
                    guide_above[id] = inherited;
                    continue;
                }
                if let Some(existing) = merger.find(ones) {
                    warn!(node = id, character = existing, "duplicate guide tree clade, keeping first mapping");
                    guide_above[id] = Some(existing);
                    continue;
                }
                let part = Part { zeros: scaffold_taxa.difference(ones), weight: 0, guide: true };
                let character = merger.add(ones, part);
                scaffold_mapping.insert(character, id, inherited);
                guide_above[id] = Some(character);
            }
        }

        let tree_clades: Vec<Vec<Bitset>> =
            self.trees.iter().map(|t| clade_bitsets(t, &index, words)).collect();
        let mut coverage = vec![0usize; taxa.len()];
        for (tree, clades) in self.trees.iter().zip(&tree_clades) {
            for taxon in clades[tree.root()].iter_ones() {
                coverage[taxon] += 1;
            }
        }

        let mut raw = 0usize;
        let mut skipped = 0usize;
        for (tree, clades) in self.trees.iter().zip(&tree_clades) {
            let tree_taxa = &clades[tree.root()];

            // a tree sharing no taxon with the rest still groups its own taxa
            let isolated = tree_taxa.iter_ones().all(|taxon| coverage[taxon] == 1);
            if isolated && tree_taxa != &universe && tree_taxa.count_ones() >= 2 {
                let part = Part {
                    zeros: universe.difference(tree_taxa),
                    weight: self.costs.weight(tree, tree.root()),
                    guide: false,
                };
                merger.add(tree_taxa, part);
                raw += 1;
            }

            for id in tree.inner_nodes() {
                if let Some(support) = tree.support(id) {
                    if !support.is_nan() && support < self.bootstrap_threshold as f64 {
                        skipped += 1;
                        continue;
                    }
                }
                let ones = &clades[id];
                if ones.count_ones() < 2 || ones == tree_taxa {
                    continue;
                }
                let part = Part {
                    zeros: tree_taxa.difference(ones),
                    weight: self.costs.weight(tree, id),
                    guide: false,
                };
                merger.add(ones, part);
                raw += 1;
            }
        }

        if skipped > 0 {
            debug!(skipped, threshold = self.bootstrap_threshold, "clades below bootstrap threshold");
        }
        info!(
            taxa = taxa.len(),
            raw_characters = raw,
            characters = merger.characters.len(),
            guide_characters = scaffold_mapping.len(),
            "hypergraph built"
        );

        Ok(Hypergraph {
            taxa,
            words,
            characters: merger.characters,
            scaffold: scaffold_mapping,
            raw_characters: raw,
        })
    }
}

/// Characters keyed by their exact taxon bitset.
#[derive(Default)]
struct Merger {
    characters: Vec<Character>,
    by_taxa: HashMap<Bitset, usize>,
}

impl Merger {
    fn find(&self, taxa: &Bitset) -> Option<usize> {
        self.by_taxa.get(taxa).copied()
    }

    fn add(&mut self, taxa: &Bitset, part: Part) -> usize {
        if let Some(&id) = self.by_taxa.get(taxa) {
            self.characters[id].parts.push(part);
            return id;
        }
        let id = self.characters.len();
        self.characters.push(Character { taxa: taxa.clone(), parts: vec![part] });
        self.by_taxa.insert(taxa.clone(), id);
        id
    }
}

/// Clade bitset of every node, restricted to taxa known to `index`.
fn clade_bitsets(tree: &SourceTree, index: &HashMap<&str, usize>, words: usize) -> Vec<Bitset> {
    let mut clades = vec![Bitset::zeros(words); tree.len()];
    // preorder indices, so walking backwards visits children first
    for id in (0..tree.len()).rev() {
        let node = tree.node(id);
        if node.children.is_empty() {
            if let Some(&taxon) = node.label.as_deref().and_then(|l| index.get(l)) {
                clades[id].set(taxon);
            }
        } else {
            let mut bs = Bitset::zeros(words);
            for &child in &node.children {
                bs.or_assign(&clades[child]);
            }
            clades[id] = bs;
        }
    }
    clades
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::costs::{ACCURACY, Weighting};

    fn trees(newicks: &[&str]) -> Vec<SourceTree> {
        newicks.iter().map(|n| SourceTree::from_newick(n).unwrap()).collect()
    }

    fn build(newicks: &[&str], scaffold: Option<&str>, threshold: u32) -> Hypergraph {
        let t = trees(newicks);
        let costs = CostModel::new(&t, Weighting::Unit);
        let s = scaffold.map(|s| SourceTree::from_newick(s).unwrap());
        HypergraphBuilder::new(&t, &costs)
            .scaffold(s.as_ref())
            .bootstrap_threshold(threshold)
            .build()
            .unwrap()
    }

    fn labels(h: &Hypergraph, bs: &Bitset) -> Vec<String> {
        bs.iter_ones().map(|i| h.taxa()[i].clone()).collect()
    }

    #[test]
    fn identical_clades_are_merged() {
        let h = build(&["((a,b),c);", "((a,b),c);", "((a,c),b);"], None, 0);
        assert_eq!(h.taxa(), &["a", "b", "c"]);
        assert_eq!(h.raw_characters(), 3);
        assert_eq!(h.characters().len(), 2);

        let ab = &h.characters()[0];
        assert_eq!(labels(&h, &ab.taxa), vec!["a", "b"]);
        assert_eq!(ab.weight(), 2 * ACCURACY);
        assert_eq!(ab.parts.len(), 2);
        assert_eq!(labels(&h, &ab.parts[0].zeros), vec!["c"]);

        let ac = &h.characters()[1];
        assert_eq!(labels(&h, &ac.taxa), vec!["a", "c"]);
        assert_eq!(ac.weight(), ACCURACY);
    }

    #[test]
    fn partial_trees_contribute_root_clades() {
        let h = build(&["(a,b);", "(c,d);"], None, 0);
        assert_eq!(h.characters().len(), 2);
        let first = &h.characters()[0];
        assert_eq!(labels(&h, &first.taxa), vec!["a", "b"]);
        assert_eq!(labels(&h, &first.parts[0].zeros), vec!["c", "d"]);
    }

    #[test]
    fn overlapping_partial_trees_add_no_root_clade() {
        let h = build(&["(a,b,c);", "((a,d),b,c);"], None, 0);
        assert_eq!(h.characters().len(), 1);
        assert_eq!(labels(&h, &h.characters()[0].taxa), vec!["a", "d"]);
        assert_eq!(labels(&h, &h.characters()[0].parts[0].zeros), vec!["b", "c"]);

        // only the tree sharing no taxon keeps its root clade
        let h = build(&["((a,b),c);", "(a,d);", "(e,f);"], None, 0);
        let clades: Vec<Vec<String>> = h.characters().iter().map(|c| labels(&h, &c.taxa)).collect();
        assert_eq!(clades, vec![vec!["a", "b"], vec!["e", "f"]]);
    }

    #[test]
    fn low_support_clades_are_skipped() {
        let h = build(&["(((a,b)30,c)90,d);"], None, 50);
        assert_eq!(h.characters().len(), 1);
        assert_eq!(labels(&h, &h.characters()[0].taxa), vec!["a", "b", "c"]);

        let all = build(&["(((a,b)30,c)90,d);"], None, 0);
        assert_eq!(all.characters().len(), 2);
    }

    #[test]
    fn scaffold_characters_come_first_and_nest() {
        let h = build(&["((a,b),(c,d));", "((a,c),(b,d));"], Some("(((a,b),c),d);"), 0);
        let abc = 0;
        let ab = 1;
        assert!(h.character(abc).is_guide());
        assert!(h.character(ab).is_guide());
        assert_eq!(labels(&h, &h.character(abc).taxa), vec!["a", "b", "c"]);

        // input clade {a,b} merged into the guide character
        assert_eq!(h.character(ab).parts.len(), 2);
        assert_eq!(h.character(ab).weight(), ACCURACY);

        let mapping = h.scaffold();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.parent_of(ab), Some(abc));
        assert_eq!(mapping.parent_of(abc), None);
        assert_eq!(mapping.ancestors(ab).collect::<Vec<_>>(), vec![abc]);
        let node = mapping.node_of(ab).unwrap();
        assert_eq!(mapping.character_of(node), Some(ab));
    }

    #[test]
    fn duplicate_guide_clades_keep_first_mapping() {
        let h = build(&["((a,b),c);"], Some("(((a,b)),c);"), 0);
        assert_eq!(h.scaffold().len(), 1);
        assert_eq!(h.characters().len(), 1);
    }

    #[test]
    fn scaffold_only_taxa_are_ignored() {
        let h = build(&["((a,b),c);"], Some("((a,b),(c,x));"), 0);
        assert_eq!(h.taxa(), &["a", "b", "c"]);
        // (c,x) restricted to known taxa is a single taxon and gets dropped
        assert_eq!(h.scaffold().len(), 1);
        assert_eq!(h.index_of("c"), Some(2));
        assert_eq!(h.index_of("x"), None);
    }

    #[test]
    fn mapping_rejects_double_insert() {
        let mut m = ScaffoldMapping::default();
        assert!(m.insert(0, 5, None));
        assert!(!m.insert(0, 6, None));
        assert!(!m.insert(1, 5, None));
        assert_eq!(m.character_of(5), Some(0));
        assert_eq!(m.node_of(0), Some(5));
    }

    #[test]
    fn empty_input_is_rejected() {
        let costs = CostModel::new(&[], Weighting::Unit);
        let err = HypergraphBuilder::new(&[], &costs).build().unwrap_err();
        assert!(matches!(err, FlipCutError::NoInputTrees));
    }
}
