//! Immutable view of an input tree.
//!
//! # Overview
//! The supertree core never mutates input trees. A `SourceTree` is a compact,
//! preorder-indexed copy of a `phylotree` tree carrying exactly what the cost
//! model and the hypergraph builder need: labels, branch lengths, inner-node
//! support labels and topological depth.
//!
//! # Why taxon NAMES and not node IDs
//! Node IDs are assigned during parsing and differ across trees. Leaf labels
//! are the only identity shared by all input trees, so every leaf must be
//! labelled and labels must be unique within a tree.

use crate::error::{FlipCutError, Result};
use phylotree::tree::Tree as PhyloTree;
use std::collections::HashSet;

/// One node of a [`SourceTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceNode {
    /// Leaf label, or the inner-node label (usually a support value)
    pub label: Option<String>,
    /// Length of the branch above this node
    pub branch_length: Option<f64>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Topological level, the root has depth 0
    pub depth: usize,
}

/// A rooted, labelled input tree stored in preorder.
///
/// Index 0 is the root, and every parent has a smaller index than its
/// children. Walking the indices backwards is therefore a valid postorder.
#[derive(Debug, Clone)]
pub struct SourceTree {
    nodes: Vec<SourceNode>,
}

impl SourceTree {
    /// Copy a `phylotree` tree.
    ///
    /// # Errors
    /// - `UnnamedLeaf` if a leaf has no label
    /// - `DuplicateLeaf` if a label occurs twice
    /// - `Tree` if the tree has no root
    pub fn from_phylo(tree: &PhyloTree) -> Result<Self> {
        Self::build(tree, 0)
    }

    /// Copy several trees, reporting errors with the position of the offending tree.
    pub fn from_phylo_trees(trees: &[PhyloTree]) -> Result<Vec<Self>> {
        trees
            .iter()
            .enumerate()
            .map(|(idx, tree)| Self::build(tree, idx))
            .collect()
    }

    /// Parse a single Newick string. A missing trailing `;` is tolerated.
    pub fn from_newick(newick: &str) -> Result<Self> {
        let trimmed = newick.trim();
        let owned;
        let text = if trimmed.ends_with(';') {
            trimmed
        } else {
            owned = format!("{trimmed};");
            owned.as_str()
        };
        let tree = PhyloTree::from_newick(text)?;
        Self::from_phylo(&tree)
    }

    fn build(tree: &PhyloTree, index: usize) -> Result<Self> {
        let root_id = tree.get_root()?;
        let mut nodes: Vec<SourceNode> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        // (phylotree id, local parent, depth)
        let mut stack = vec![(root_id, None::<usize>, 0usize)];
        while let Some((node_id, parent, depth)) = stack.pop() {
            let node = tree.get(&node_id)?;
            let local = nodes.len();

            if node.children.is_empty() {
                let label = node
                    .name
                    .as_ref()
                    .filter(|n| !n.is_empty())
                    .ok_or(FlipCutError::UnnamedLeaf(index))?;
                if !seen.insert(label.clone()) {
                    return Err(FlipCutError::DuplicateLeaf { tree: index, label: label.clone() });
                }
            }

            nodes.push(SourceNode {
                label: node.name.clone().filter(|n| !n.is_empty()),
                branch_length: node.parent_edge,
                parent,
                children: Vec::with_capacity(node.children.len()),
                depth,
            });
            if let Some(p) = parent {
                nodes[p].children.push(local);
            }

            // reversed so children keep their input order in the preorder
            for &child in node.children.iter().rev() {
                stack.push((child, Some(local), depth + 1));
            }
        }

        Ok(SourceTree { nodes })
    }

    #[inline]
    pub fn root(&self) -> usize {
        0
    }

    #[inline]
    pub fn node(&self, id: usize) -> &SourceNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[SourceNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn is_leaf(&self, id: usize) -> bool {
        self.nodes[id].children.is_empty()
    }

    /// Labels of all leaves, in preorder.
    pub fn leaf_labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes
            .iter()
            .filter(|n| n.children.is_empty())
            .filter_map(|n| n.label.as_deref())
    }

    /// Inner nodes other than the root. These are the nodes that become characters.
    pub fn inner_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (1..self.nodes.len()).filter(|&id| !self.nodes[id].children.is_empty())
    }

    /// Support value of an inner node.
    ///
    /// `None` when the node carries no label, `Some(NaN)` when the label does
    /// not parse as a number.
    pub fn support(&self, id: usize) -> Option<f64> {
        let node = &self.nodes[id];
        if node.children.is_empty() {
            return None;
        }
        node.label
            .as_deref()
            .map(|label| label.trim().parse::<f64>().unwrap_or(f64::NAN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylotree::tree::NewickParseError;

    #[test]
    fn preorder_layout() {
        let tree = SourceTree::from_newick("((a:1,b:2)90:0.5,c:3);").unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.root(), 0);

        for id in 1..tree.len() {
            let parent = tree.node(id).parent.unwrap();
            assert!(parent < id);
            assert!(tree.node(parent).children.contains(&id));
            assert_eq!(tree.node(id).depth, tree.node(parent).depth + 1);
        }

        let labels: Vec<&str> = tree.leaf_labels().collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[test]
    fn inner_nodes_skip_root_and_leaves() {
        let tree = SourceTree::from_newick("((a,b)80,(c,d)x);").unwrap();
        let inner: Vec<usize> = tree.inner_nodes().collect();
        assert_eq!(inner.len(), 2);

        let supports: Vec<Option<f64>> = inner.iter().map(|&id| tree.support(id)).collect();
        assert_eq!(supports[0], Some(80.0));
        assert!(supports[1].unwrap().is_nan());
    }

    #[test]
    fn branch_lengths_are_kept() {
        let tree = SourceTree::from_newick("((a:1,b:2):0.5,c:3)").unwrap();
        let clade = tree.inner_nodes().next().unwrap();
        assert_eq!(tree.node(clade).branch_length, Some(0.5));
        assert_eq!(tree.support(clade), None);
    }

    #[test]
    fn bad_branch_length_is_a_newick_error() {
        let err = SourceTree::from_newick("(a:x,b)").unwrap_err();
        assert!(matches!(err, FlipCutError::Newick(NewickParseError::FloatError(_))));
    }

    #[test]
    fn duplicate_leaf_is_rejected() {
        let err = SourceTree::from_newick("((a,b),a);").unwrap_err();
        assert!(matches!(err, FlipCutError::DuplicateLeaf { .. }));
    }

    #[test]
    fn tree_position_is_reported() {
        let trees = vec![
            PhyloTree::from_newick("((a,b),c);").unwrap(),
            PhyloTree::from_newick("((a,b),(c,c));").unwrap(),
        ];
        match SourceTree::from_phylo_trees(&trees) {
            Err(FlipCutError::DuplicateLeaf { tree, label }) => {
                assert_eq!(tree, 1);
                assert_eq!(label, "c");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
