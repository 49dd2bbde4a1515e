//! Recursion arena of a supertree run.
//!
//! Each [`Partition`] owns a set of taxa and moves through
//! `Unsplit → Cut → Split` (or straight to `Leaf` / `Split` when no solver is
//! needed). Once every node is `Split` or `Leaf`, the arena has the shape of
//! the output supertree.

use crate::bitset::Bitset;
use crate::cutter::{Cut, GraphCutter};
use crate::error::{FlipCutError, Result};
use crate::graph::CharacterGraph;
use crate::supertree::Supertree;

#[derive(Debug, Clone)]
pub enum PartitionState {
    Unsplit(CharacterGraph),
    Cut(CharacterGraph, Cut),
    /// Children in lowest-taxon order. `cut` is `None` for a component split.
    Split { children: Vec<usize>, cut: Option<Cut> },
    Leaf(usize),
}

impl PartitionState {
    fn name(&self) -> &'static str {
        match self {
            PartitionState::Unsplit(_) => "unsplit",
            PartitionState::Cut(..) => "cut",
            PartitionState::Split { .. } => "split",
            PartitionState::Leaf(_) => "leaf",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Partition {
    pub taxa: Bitset,
    pub parent: Option<usize>,
    pub state: PartitionState,
}

/// What [`PartitionTree::prepare`] did with a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prepared {
    Leaf,
    /// Disconnected, split into these component nodes
    Components(Vec<usize>),
    /// Connected with at least two taxa, needs a cut
    Connected,
}

#[derive(Debug, Clone)]
pub struct PartitionTree {
    nodes: Vec<Partition>,
    score: i64,
}

impl PartitionTree {
    pub fn new(graph: CharacterGraph) -> Self {
        let root = Partition { taxa: graph.taxa().clone(), parent: None, state: PartitionState::Unsplit(graph) };
        PartitionTree { nodes: vec![root], score: 0 }
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn node(&self, id: usize) -> &Partition {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Sum of the cut values applied so far.
    pub fn score(&self) -> i64 {
        self.score
    }

    /// Graph of an `Unsplit` node.
    pub fn graph(&self, id: usize) -> Result<&CharacterGraph> {
        match &self.nodes[id].state {
            PartitionState::Unsplit(graph) => Ok(graph),
            other => Err(wrong_state(id, "unsplit", other)),
        }
    }

    /// Resolve everything that needs no cut.
    ///
    /// Semi-universal characters are removed first. A single taxon becomes a
    /// leaf and a disconnected graph is split along its components.
    pub fn prepare(&mut self, id: usize) -> Result<Prepared> {
        let graph = match &mut self.nodes[id].state {
            PartitionState::Unsplit(graph) => graph,
            other => return Err(wrong_state(id, "unsplit", other)),
        };
        graph.delete_semi_universals();

        match graph.taxon_count() {
            0 => Err(FlipCutError::Invariant(format!("partition {id} has no taxa"))),
            1 => {
                let taxon = graph.taxa().first_one().unwrap_or_default();
                self.nodes[id].state = PartitionState::Leaf(taxon);
                Ok(Prepared::Leaf)
            }
            _ => {
                let components = graph.components();
                if components.len() == 1 {
                    return Ok(Prepared::Connected);
                }
                let children = components.into_iter().map(|g| self.push(id, g)).collect::<Vec<_>>();
                self.nodes[id].state = PartitionState::Split { children: children.clone(), cut: None };
                Ok(Prepared::Components(children))
            }
        }
    }

    /// Cut an `Unsplit` node with `cutter`.
    pub fn cut(&mut self, id: usize, cutter: &GraphCutter<'_>) -> Result<()> {
        let cut = cutter.min_cut(self.graph(id)?)?;
        self.apply_cut(id, cut)
    }

    /// Attach a cut computed elsewhere to an `Unsplit` node.
    pub fn apply_cut(&mut self, id: usize, cut: Cut) -> Result<()> {
        let state = std::mem::replace(&mut self.nodes[id].state, PartitionState::Leaf(usize::MAX));
        match state {
            PartitionState::Unsplit(graph) => {
                self.nodes[id].state = PartitionState::Cut(graph, cut);
                Ok(())
            }
            other => {
                let err = wrong_state(id, "unsplit", &other);
                self.nodes[id].state = other;
                Err(err)
            }
        }
    }

    /// Split a `Cut` node into two `Unsplit` children, lowest taxon first.
    pub fn split(&mut self, id: usize) -> Result<[usize; 2]> {
        let state = std::mem::replace(&mut self.nodes[id].state, PartitionState::Leaf(usize::MAX));
        let (graph, cut) = match state {
            PartitionState::Cut(graph, cut) => (graph, cut),
            other => {
                let err = wrong_state(id, "cut", &other);
                self.nodes[id].state = other;
                return Err(err);
            }
        };

        let (source, sink) = match graph.split(&cut) {
            Ok(sides) => sides,
            Err(e) => {
                self.nodes[id].state = PartitionState::Cut(graph, cut);
                return Err(e);
            }
        };
        let (first, second) =
            if source.taxa().first_one() <= sink.taxa().first_one() { (source, sink) } else { (sink, source) };

        let children = [self.push(id, first), self.push(id, second)];
        self.score += cut.value;
        self.nodes[id].state = PartitionState::Split { children: children.to_vec(), cut: Some(cut) };
        Ok(children)
    }

    /// Whether every node is `Split` or `Leaf`.
    pub fn is_resolved(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| matches!(n.state, PartitionState::Split { .. } | PartitionState::Leaf(_)))
    }

    /// Ids of the `Unsplit` nodes.
    pub fn unsplit(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&id| matches!(self.nodes[id].state, PartitionState::Unsplit(_)))
            .collect()
    }

    /// Structural identity of the recursion state: every node's taxa plus
    /// the characters left in unresolved graphs, sorted.
    pub fn fingerprint(&self) -> Vec<(Bitset, Vec<usize>)> {
        let mut print: Vec<(Bitset, Vec<usize>)> = self
            .nodes
            .iter()
            .map(|n| {
                let characters = match &n.state {
                    PartitionState::Unsplit(g) | PartitionState::Cut(g, _) => g.character_ids(),
                    _ => Vec::new(),
                };
                (n.taxa.clone(), characters)
            })
            .collect();
        print.sort();
        print
    }

    /// Build the supertree with taxon names from `labels`.
    ///
    /// # Errors
    /// `Invariant` if a node is still unresolved.
    pub fn to_supertree(&self, labels: &[String]) -> Result<Supertree> {
        let mut tree = Supertree::new();
        tree.set_score(self.score);

        // a root leaf hangs below the supertree root
        let mut stack = vec![(self.root(), tree.root(), true)];
        while let Some((id, parent, is_root)) = stack.pop() {
            match &self.nodes[id].state {
                PartitionState::Leaf(taxon) => {
                    let label = labels.get(*taxon).cloned().ok_or_else(|| {
                        FlipCutError::Invariant(format!("taxon {taxon} has no label"))
                    })?;
                    tree.add_child(parent, Some(label));
                }
                PartitionState::Split { children, .. } => {
                    let node = if is_root { parent } else { tree.add_child(parent, None) };
                    for &child in children.iter().rev() {
                        stack.push((child, node, false));
                    }
                }
                other => return Err(wrong_state(id, "resolved", other)),
            }
        }
        Ok(tree)
    }

    fn push(&mut self, parent: usize, graph: CharacterGraph) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Partition {
            taxa: graph.taxa().clone(),
            parent: Some(parent),
            state: PartitionState::Unsplit(graph),
        });
        id
    }
}

fn wrong_state(id: usize, expected: &str, found: &PartitionState) -> FlipCutError {
    FlipCutError::Invariant(format!("partition {id} is {} but must be {expected}", found.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cutter::CutMethod;
    use crate::graph::tests::graph;
    use crate::karger::KargerStein;
    use crate::pool::WorkerPool;

    fn resolve(tree: &mut PartitionTree, cutter: &GraphCutter<'_>) {
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            match tree.prepare(id).unwrap() {
                Prepared::Leaf => {}
                Prepared::Components(children) => stack.extend(children.into_iter().rev()),
                Prepared::Connected => {
                    tree.cut(id, cutter).unwrap();
                    let [a, b] = tree.split(id).unwrap();
                    stack.push(b);
                    stack.push(a);
                }
            }
        }
    }

    #[test]
    fn state_machine_reaches_the_supertree() {
        let g = graph(&["((a,b),c);", "((a,b),c);", "((a,c),b);"], None);
        let labels = g.hypergraph().taxa().to_vec();
        let pool = WorkerPool::sequential();
        let cutter = GraphCutter::new(CutMethod::PushRelabel, &pool, KargerStein::default());

        let mut tree = PartitionTree::new(g);
        assert_eq!(tree.prepare(0).unwrap(), Prepared::Connected);
        tree.cut(0, &cutter).unwrap();
        // cutting twice is a state error
        assert!(tree.cut(0, &cutter).is_err());
        let [ab, c] = tree.split(0).unwrap();
        assert_eq!(tree.prepare(c).unwrap(), Prepared::Leaf);
        assert!(matches!(tree.prepare(ab).unwrap(), Prepared::Components(ref v) if v.len() == 2));
        assert!(!tree.is_resolved());
        assert!(tree.to_supertree(&labels).is_err());

        for id in tree.unsplit() {
            assert_eq!(tree.prepare(id).unwrap(), Prepared::Leaf);
        }
        assert!(tree.is_resolved());
        let st = tree.to_supertree(&labels).unwrap();
        assert_eq!(st.to_newick(), "((a,b),c);");
        assert_eq!(st.score(), tree.score());
    }

    #[test]
    fn leaves_cover_all_taxa() {
        let g = graph(
            &["(((a,b),c),(d,e));", "((a,(b,c)),(d,e));", "(((a,d),b),(c,e));", "(f,(a,g));"],
            None,
        );
        let labels = g.hypergraph().taxa().to_vec();
        let pool = WorkerPool::new(2).unwrap();
        let cutter = GraphCutter::new(CutMethod::AugmentingPath, &pool, KargerStein::default());
        let mut tree = PartitionTree::new(g);
        resolve(&mut tree, &cutter);

        let st = tree.to_supertree(&labels).unwrap();
        let mut leaves: Vec<&str> = st.leaf_labels();
        leaves.sort_unstable();
        assert_eq!(leaves, vec!["a", "b", "c", "d", "e", "f", "g"]);
    }

    #[test]
    fn apply_cut_requires_unsplit() {
        let g = graph(&["((a,b),c);"], None);
        let cut = g.cut_for_sides(&g.taxa().intersection(&Bitset::from_indices(1, [0, 1]))).unwrap();
        let mut tree = PartitionTree::new(g);
        tree.apply_cut(0, cut.clone()).unwrap();
        assert!(tree.apply_cut(0, cut).is_err());
        assert!(tree.split(0).is_ok());
        assert_eq!(tree.score(), 0);
        assert!(tree.split(0).is_err());
    }
}
