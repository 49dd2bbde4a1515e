//! The rooted output tree of a supertree run.

use crate::error::Result;
use itertools::Itertools;
use phylotree::tree::Tree as PhyloTree;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupertreeNode {
    /// Taxon label, `None` for inner nodes
    pub label: Option<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

/// Arena tree with node 0 as root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supertree {
    nodes: Vec<SupertreeNode>,
    score: i64,
}

impl Default for Supertree {
    fn default() -> Self {
        Self::new()
    }
}

impl Supertree {
    /// A tree holding only an unlabelled root.
    pub fn new() -> Self {
        Supertree {
            nodes: vec![SupertreeNode { label: None, parent: None, children: Vec::new() }],
            score: 0,
        }
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn add_child(&mut self, parent: usize, label: Option<String>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(SupertreeNode { label, parent: Some(parent), children: Vec::new() });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn node(&self, id: usize) -> &SupertreeNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[SupertreeNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Summed value of the cuts that built this tree.
    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn set_score(&mut self, score: i64) {
        self.score = score;
    }

    pub fn root_children(&self) -> &[usize] {
        &self.nodes[self.root()].children
    }

    /// Leaf labels in tree order.
    pub fn leaf_labels(&self) -> Vec<&str> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.nodes[id].children.is_empty())
            .filter_map(|id| self.nodes[id].label.as_deref())
            .collect()
    }

    /// Leaf sets of the non-root inner nodes, each sorted, in sorted order.
    pub fn clusters(&self) -> Vec<Vec<String>> {
        let mut below: Vec<Vec<String>> = vec![Vec::new(); self.nodes.len()];
        for id in self.preorder().into_iter().rev() {
            let node = &self.nodes[id];
            if node.children.is_empty() {
                below[id].extend(node.label.clone());
            } else {
                let leaves = node.children.iter().flat_map(|&c| below[c].iter().cloned()).collect();
                below[id] = leaves;
            }
        }

        (0..self.nodes.len())
            .filter(|&id| id != self.root() && !self.nodes[id].children.is_empty())
            .map(|id| below[id].iter().cloned().sorted().collect())
            .sorted()
            .collect()
    }

    /// Newick text, terminated by `;`.
    ///
    /// Labels containing Newick punctuation or whitespace are single-quoted.
    pub fn to_newick(&self) -> String {
        enum Step {
            Enter(usize),
            Comma,
            Close,
        }

        let mut out = String::new();
        let mut stack = vec![Step::Enter(self.root())];
        while let Some(step) = stack.pop() {
            let id = match step {
                Step::Enter(id) => id,
                Step::Comma => {
                    out.push(',');
                    continue;
                }
                Step::Close => {
                    out.push(')');
                    continue;
                }
            };
            let node = &self.nodes[id];
            if node.children.is_empty() {
                if let Some(label) = &node.label {
                    out.push_str(&quote_label(label));
                }
                continue;
            }
            out.push('(');
            stack.push(Step::Close);
            for (i, &child) in node.children.iter().enumerate().rev() {
                stack.push(Step::Enter(child));
                if i > 0 {
                    stack.push(Step::Comma);
                }
            }
        }
        out.push(';');
        out
    }

    /// Convert into a `phylotree` tree.
    ///
    /// # Errors
    /// `Newick` if `phylotree` rejects the generated Newick.
    pub fn to_phylotree(&self) -> Result<PhyloTree> {
        Ok(PhyloTree::from_newick(&self.to_newick())?)
    }

    fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }
}

fn quote_label(label: &str) -> String {
    let needs_quotes = label
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '\'' | ':' | ';' | ','));
    if needs_quotes {
        format!("'{}'", label.replace('\'', "''"))
    } else {
        label.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// ((a,b),c,'d e')
    fn sample() -> Supertree {
        let mut t = Supertree::new();
        let ab = t.add_child(0, None);
        t.add_child(ab, Some("a".into()));
        t.add_child(ab, Some("b".into()));
        t.add_child(0, Some("c".into()));
        t.add_child(0, Some("d e".into()));
        t
    }

    #[test]
    fn newick_is_nested_and_quoted() {
        assert_eq!(sample().to_newick(), "((a,b),c,'d e');");
    }

    #[test]
    fn clusters_and_labels() {
        let t = sample();
        assert_eq!(t.clusters(), vec![vec!["a".to_string(), "b".to_string()]]);
        assert_eq!(t.leaf_labels(), vec!["a", "b", "c", "d e"]);
        assert_eq!(t.root_children().len(), 3);
    }

    #[test]
    fn single_leaf_tree() {
        let mut t = Supertree::new();
        t.add_child(0, Some("x".into()));
        assert_eq!(t.to_newick(), "(x);");
        assert!(t.clusters().is_empty());
    }

    #[test]
    fn converts_to_phylotree() {
        let mut t = Supertree::new();
        let ab = t.add_child(0, None);
        t.add_child(ab, Some("a".into()));
        t.add_child(ab, Some("b".into()));
        t.add_child(0, Some("c".into()));
        let tree = t.to_phylotree().unwrap();
        assert_eq!(tree.get_leaves().len(), 3);
    }
}
