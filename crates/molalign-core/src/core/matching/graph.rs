use crate::core::error::ShapeMismatch;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatchingError {
    #[error("Node {node} is out of range for a side with {size} nodes")]
    NodeOutOfRange { node: usize, size: usize },

    #[error("Seed matching uses edge ({left}, {right}) which is not in the graph")]
    SeedEdgeMissing { left: usize, right: usize },

    #[error("Seed is not a matching: node {node} is covered more than once")]
    SeedNotMatching { node: usize },

    #[error("Cost matrix entry ({row}, {col}) is not finite")]
    NonFiniteCost { row: usize, col: usize },

    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
}

/// A bipartite graph with `n_left` left nodes and `n_right` right nodes,
/// stored as a dense row-major adjacency table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BipartiteGraph {
    n_left: usize,
    n_right: usize,
    adjacency: Vec<bool>,
}

impl BipartiteGraph {
    pub fn empty(n_left: usize, n_right: usize) -> Self {
        Self {
            n_left,
            n_right,
            adjacency: vec![false; n_left * n_right],
        }
    }

    /// Every left node connected to every right node.
    pub fn complete(n_left: usize, n_right: usize) -> Self {
        Self {
            n_left,
            n_right,
            adjacency: vec![true; n_left * n_right],
        }
    }

    pub fn from_edges(
        n_left: usize,
        n_right: usize,
        edges: impl IntoIterator<Item = (usize, usize)>,
    ) -> Result<Self, MatchingError> {
        let mut graph = Self::empty(n_left, n_right);
        for (left, right) in edges {
            graph.add_edge(left, right)?;
        }
        Ok(graph)
    }

    pub fn add_edge(&mut self, left: usize, right: usize) -> Result<(), MatchingError> {
        self.check_nodes(left, right)?;
        let idx = self.index(left, right);
        self.adjacency[idx] = true;
        Ok(())
    }

    pub fn n_left(&self) -> usize {
        self.n_left
    }

    pub fn n_right(&self) -> usize {
        self.n_right
    }

    pub fn has_edge(&self, left: usize, right: usize) -> bool {
        left < self.n_left && right < self.n_right && self.adjacency[self.index(left, right)]
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().filter(|&&e| e).count()
    }

    pub(crate) fn remove_edge(&mut self, left: usize, right: usize) {
        let idx = self.index(left, right);
        self.adjacency[idx] = false;
    }

    /// Drops every edge incident to `left` or `right`.
    pub(crate) fn isolate(&mut self, left: usize, right: usize) {
        for r in 0..self.n_right {
            self.remove_edge(left, r);
        }
        for l in 0..self.n_left {
            self.remove_edge(l, right);
        }
    }

    pub(crate) fn left_degree(&self, left: usize) -> usize {
        (0..self.n_right).filter(|&r| self.has_edge(left, r)).count()
    }

    pub(crate) fn right_degree(&self, right: usize) -> usize {
        (0..self.n_left).filter(|&l| self.has_edge(l, right)).count()
    }

    fn check_nodes(&self, left: usize, right: usize) -> Result<(), MatchingError> {
        if left >= self.n_left {
            return Err(MatchingError::NodeOutOfRange {
                node: left,
                size: self.n_left,
            });
        }
        if right >= self.n_right {
            return Err(MatchingError::NodeOutOfRange {
                node: right,
                size: self.n_right,
            });
        }
        Ok(())
    }

    #[inline]
    fn index(&self, left: usize, right: usize) -> usize {
        left * self.n_right + right
    }
}

/// A set of vertex-disjoint edges, kept sorted by left node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Matching {
    pairs: Vec<(usize, usize)>,
}

impl Matching {
    pub fn from_pairs(mut pairs: Vec<(usize, usize)>) -> Self {
        pairs.sort_unstable();
        Self { pairs }
    }

    /// The matching `i -> permutation[i]`.
    pub fn from_permutation(permutation: &[usize]) -> Self {
        Self {
            pairs: permutation.iter().copied().enumerate().collect(),
        }
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The matching as a left-to-right map, if it covers every left node `0..n`.
    pub fn to_permutation(&self, n: usize) -> Option<Vec<usize>> {
        if self.pairs.len() != n {
            return None;
        }
        self.pairs
            .iter()
            .enumerate()
            .map(|(i, &(l, r))| (i == l).then_some(r))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_graph_has_every_edge() {
        let g = BipartiteGraph::complete(2, 3);
        assert_eq!(g.edge_count(), 6);
        assert!(g.has_edge(1, 2));
        assert!(!g.has_edge(2, 0));
    }

    #[test]
    fn from_edges_rejects_out_of_range_nodes() {
        let err = BipartiteGraph::from_edges(2, 2, [(0, 1), (0, 2)]).unwrap_err();
        assert_eq!(err, MatchingError::NodeOutOfRange { node: 2, size: 2 });
    }

    #[test]
    fn isolate_drops_incident_edges_only() {
        let mut g = BipartiteGraph::complete(3, 3);
        g.isolate(0, 1);
        assert_eq!(g.edge_count(), 4);
        assert_eq!(g.left_degree(0), 0);
        assert_eq!(g.right_degree(1), 0);
        assert!(g.has_edge(2, 2));
    }

    #[test]
    fn matching_is_sorted_and_converts_to_permutation() {
        let m = Matching::from_pairs(vec![(2, 0), (0, 1), (1, 2)]);
        assert_eq!(m.pairs(), &[(0, 1), (1, 2), (2, 0)]);
        assert_eq!(m.to_permutation(3), Some(vec![1, 2, 0]));
        assert_eq!(Matching::from_pairs(vec![(0, 1), (2, 0)]).to_permutation(2), None);
        assert_eq!(Matching::from_permutation(&[1, 2, 0]), m);
    }
}
