use super::graph::{BipartiteGraph, Matching, MatchingError};

/// One pending branch of the enumeration: the graph still in play, a maximum
/// matching of it, and the edges already fixed by enclosing branches.
#[derive(Debug, Clone)]
struct Subproblem {
    graph: BipartiteGraph,
    mate: Vec<Option<usize>>,
    forced: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// A change that turns the current matching into a different one of equal
/// size.
enum Swap {
    /// Alternating cycle; `pivot` is a matched edge on it, absent afterwards.
    Cycle {
        mate: Vec<Option<usize>>,
        pivot: (usize, usize),
    },
    /// Length-2 alternating path from an uncovered node; `pivot` is the
    /// newly matched edge.
    Path {
        mate: Vec<Option<usize>>,
        pivot: (usize, usize),
    },
}

impl Subproblem {
    fn n_left(&self) -> usize {
        self.graph.n_left()
    }

    fn matching(&self, mate: &[Option<usize>]) -> Matching {
        let pairs = mate
            .iter()
            .enumerate()
            .filter_map(|(l, r)| r.map(|r| (l, r)))
            .chain(self.forced.iter().copied())
            .collect();
        Matching::from_pairs(pairs)
    }

    /// Successor of `node` in the directed graph where matched edges point
    /// left to right and unmatched edges point right to left. Nodes
    /// `0..n_left` are left nodes, the rest are right nodes offset by `n_left`.
    fn next_successor(&self, node: usize, cursor: &mut usize) -> Option<usize> {
        let n_left = self.n_left();
        if node < n_left {
            if *cursor == 0 {
                *cursor = 1;
                return self.mate[node].map(|r| n_left + r);
            }
            return None;
        }
        let right = node - n_left;
        while *cursor < n_left {
            let left = *cursor;
            *cursor += 1;
            if self.graph.has_edge(left, right) && self.mate[left] != Some(right) {
                return Some(left);
            }
        }
        None
    }

    fn find_cycle(&self) -> Option<Vec<usize>> {
        let total = self.n_left() + self.graph.n_right();
        let mut marks = vec![Mark::Unvisited; total];
        let mut parent = vec![usize::MAX; total];

        for start in 0..total {
            if marks[start] != Mark::Unvisited {
                continue;
            }
            marks[start] = Mark::OnPath;
            let mut stack = vec![(start, 0usize)];
            while let Some(top) = stack.last_mut() {
                let node = top.0;
                match self.next_successor(node, &mut top.1) {
                    Some(next) => match marks[next] {
                        Mark::Unvisited => {
                            marks[next] = Mark::OnPath;
                            parent[next] = node;
                            stack.push((next, 0));
                        }
                        Mark::OnPath => {
                            let mut cycle = vec![node];
                            let mut cur = node;
                            while cur != next {
                                cur = parent[cur];
                                cycle.push(cur);
                            }
                            cycle.reverse();
                            return Some(cycle);
                        }
                        Mark::Done => {}
                    },
                    None => {
                        marks[node] = Mark::Done;
                        stack.pop();
                    }
                }
            }
        }
        None
    }

    fn flip_cycle(&self, cycle: &[usize]) -> Option<Swap> {
        let n_left = self.n_left();
        let mut mate = self.mate.clone();
        let mut pivot = None;
        for (k, &from) in cycle.iter().enumerate() {
            let to = cycle[(k + 1) % cycle.len()];
            if from < n_left {
                pivot.get_or_insert((from, to - n_left));
            } else {
                mate[to] = Some(from - n_left);
            }
        }
        // Cycles alternate sides, so there is always a matched edge.
        Some(Swap::Cycle { mate, pivot: pivot? })
    }

    fn find_path(&self) -> Option<Swap> {
        let n_left = self.n_left();
        let n_right = self.graph.n_right();
        let mut right_mate = vec![None; n_right];
        for (l, r) in self.mate.iter().enumerate() {
            if let Some(r) = *r {
                right_mate[r] = Some(l);
            }
        }

        // Uncovered right node r: r -> l (unmatched) -> mate(l).
        for r in (0..n_right).filter(|&r| right_mate[r].is_none()) {
            if let Some(l) = (0..n_left).find(|&l| self.graph.has_edge(l, r) && self.mate[l].is_some()) {
                let mut mate = self.mate.clone();
                mate[l] = Some(r);
                return Some(Swap::Path { mate, pivot: (l, r) });
            }
        }
        // Uncovered left node l: mate(r) -> r -> l, read backwards.
        for l in (0..n_left).filter(|&l| self.mate[l].is_none()) {
            if let Some(r) = (0..n_right).find(|&r| self.graph.has_edge(l, r) && right_mate[r].is_some()) {
                let mut mate = self.mate.clone();
                if let Some(old) = right_mate[r] {
                    mate[old] = None;
                }
                mate[l] = Some(r);
                return Some(Swap::Path { mate, pivot: (l, r) });
            }
        }
        None
    }
}

/// Lazily enumerates every maximum matching of a bipartite graph, starting
/// from one known maximum matching.
///
/// This is Uno's binary partition scheme. From a matching `M` of graph `G`,
/// an alternating cycle (or, for non-perfect matchings, a length-2
/// alternating path from an uncovered node) yields a second matching `M'`.
/// Picking an edge `e` that lies in exactly one of the two splits the
/// remaining matchings into those containing `e` and those avoiding it; both
/// halves are pushed onto an explicit work stack as independent subproblems
/// on strictly smaller graphs.
///
/// The seed is yielded first. Every matching is yielded exactly once and
/// the iterator ends once the stack drains, so consumers may stop pulling at
/// any point.
#[derive(Debug)]
pub struct UnoEnumerator {
    seed: Option<Matching>,
    stack: Vec<Subproblem>,
}

impl UnoEnumerator {
    /// # Errors
    ///
    /// * [`MatchingError::NodeOutOfRange`] if a seed pair names a missing node.
    /// * [`MatchingError::SeedEdgeMissing`] if a seed pair is not a graph edge.
    /// * [`MatchingError::SeedNotMatching`] if two seed pairs share a node.
    pub fn new(graph: BipartiteGraph, seed: &Matching) -> Result<Self, MatchingError> {
        let mut mate = vec![None; graph.n_left()];
        let mut right_used = vec![false; graph.n_right()];
        for &(left, right) in seed.pairs() {
            if left >= graph.n_left() {
                return Err(MatchingError::NodeOutOfRange {
                    node: left,
                    size: graph.n_left(),
                });
            }
            if right >= graph.n_right() {
                return Err(MatchingError::NodeOutOfRange {
                    node: right,
                    size: graph.n_right(),
                });
            }
            if !graph.has_edge(left, right) {
                return Err(MatchingError::SeedEdgeMissing { left, right });
            }
            if mate[left].is_some() {
                return Err(MatchingError::SeedNotMatching { node: left });
            }
            if right_used[right] {
                return Err(MatchingError::SeedNotMatching { node: right });
            }
            mate[left] = Some(right);
            right_used[right] = true;
        }

        Ok(Self {
            seed: Some(seed.clone()),
            stack: vec![Subproblem {
                graph,
                mate,
                forced: Vec::new(),
            }],
        })
    }

    /// Enumerates the perfect matchings of the complete bipartite graph
    /// `K(n, n)` starting from the identity.
    pub fn complete(n: usize) -> Self {
        let identity: Vec<usize> = (0..n).collect();
        Self {
            seed: Some(Matching::from_permutation(&identity)),
            stack: vec![Subproblem {
                graph: BipartiteGraph::complete(n, n),
                mate: identity.into_iter().map(Some).collect(),
                forced: Vec::new(),
            }],
        }
    }

    /// Expands one subproblem, pushing its children. Returns the newly
    /// discovered matching, if any.
    fn expand(&mut self, problem: Subproblem) -> Option<Matching> {
        let swap = match problem.find_cycle() {
            Some(cycle) => problem.flip_cycle(&cycle)?,
            None => problem.find_path()?,
        };

        match swap {
            Swap::Cycle { mate, pivot } => {
                let found = problem.matching(&mate);
                let (l, r) = pivot;

                let mut with_pivot = problem.clone();
                with_pivot.graph.isolate(l, r);
                with_pivot.mate[l] = None;
                with_pivot.forced.push(pivot);

                let mut without_pivot = problem;
                without_pivot.graph.remove_edge(l, r);
                without_pivot.mate = mate;

                self.stack.push(with_pivot);
                self.stack.push(without_pivot);
                Some(found)
            }
            Swap::Path { mate, pivot } => {
                let found = problem.matching(&mate);
                let (l, r) = pivot;

                let mut with_pivot = problem.clone();
                with_pivot.graph.isolate(l, r);
                with_pivot.mate = mate;
                with_pivot.mate[l] = None;
                with_pivot.forced.push(pivot);

                let mut without_pivot = problem;
                without_pivot.graph.remove_edge(l, r);

                self.stack.push(with_pivot);
                self.stack.push(without_pivot);
                Some(found)
            }
        }
    }
}

impl Iterator for UnoEnumerator {
    type Item = Matching;

    fn next(&mut self) -> Option<Matching> {
        if let Some(seed) = self.seed.take() {
            return Some(seed);
        }
        while let Some(problem) = self.stack.pop() {
            if let Some(found) = self.expand(problem) {
                return Some(found);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;
    use std::collections::HashSet;

    fn collect_unique(enumerator: UnoEnumerator) -> (usize, HashSet<Matching>) {
        let all: Vec<Matching> = enumerator.collect();
        let count = all.len();
        (count, all.into_iter().collect())
    }

    #[test]
    fn complete_graph_yields_every_permutation_once() {
        for n in 1..=5 {
            let (count, unique) = collect_unique(UnoEnumerator::complete(n));
            let expected: usize = (1..=n).product();
            assert_eq!(count, expected, "n = {n}");
            assert_eq!(unique.len(), expected, "n = {n}");
        }
    }

    #[test]
    fn every_yielded_matching_is_a_perfect_matching_of_the_graph() {
        let edges = [(0, 0), (0, 1), (1, 0), (1, 1), (1, 2), (2, 1), (2, 2), (3, 3), (3, 2), (2, 3)];
        let graph = BipartiteGraph::from_edges(4, 4, edges).unwrap();
        let seed = Matching::from_permutation(&[0, 1, 2, 3]);
        let found: Vec<Matching> = UnoEnumerator::new(graph.clone(), &seed).unwrap().collect();

        let brute: HashSet<Vec<usize>> = (0..4)
            .permutations(4)
            .filter(|p| p.iter().enumerate().all(|(l, &r)| graph.has_edge(l, r)))
            .collect();

        let perms: HashSet<Vec<usize>> = found.iter().filter_map(|m| m.to_permutation(4)).collect();
        assert_eq!(found.len(), brute.len());
        assert_eq!(perms, brute);
    }

    #[test]
    fn seed_comes_first() {
        let graph = BipartiteGraph::complete(3, 3);
        let seed = Matching::from_permutation(&[2, 0, 1]);
        let mut it = UnoEnumerator::new(graph, &seed).unwrap();
        assert_eq!(it.next(), Some(seed));
        assert_eq!(it.count(), 5);
    }

    #[test]
    fn graph_with_a_single_perfect_matching_yields_only_the_seed() {
        let graph = BipartiteGraph::from_edges(3, 3, [(0, 0), (1, 1), (2, 2), (0, 1)]).unwrap();
        let seed = Matching::from_permutation(&[0, 1, 2]);
        let all: Vec<Matching> = UnoEnumerator::new(graph, &seed).unwrap().collect();
        assert_eq!(all, vec![seed]);
    }

    #[test]
    fn block_diagonal_graph_multiplies_block_counts() {
        // Two independent K(2,2) blocks and one K(3,3) block.
        let mut edges = Vec::new();
        for (lo, size) in [(0usize, 2usize), (2, 2), (4, 3)] {
            for l in lo..lo + size {
                for r in lo..lo + size {
                    edges.push((l, r));
                }
            }
        }
        let graph = BipartiteGraph::from_edges(7, 7, edges).unwrap();
        let seed = Matching::from_permutation(&[0, 1, 2, 3, 4, 5, 6]);
        let (count, unique) = collect_unique(UnoEnumerator::new(graph, &seed).unwrap());
        assert_eq!(count, 2 * 2 * 6);
        assert_eq!(unique.len(), count);
    }

    #[test]
    fn maximum_matchings_of_an_unbalanced_graph() {
        // Left node 0 can pair with any of three right nodes.
        let graph = BipartiteGraph::complete(1, 3);
        let seed = Matching::from_pairs(vec![(0, 1)]);
        let (count, unique) = collect_unique(UnoEnumerator::new(graph, &seed).unwrap());
        assert_eq!(count, 3);
        assert_eq!(unique.len(), 3);
        assert!(unique.contains(&Matching::from_pairs(vec![(0, 2)])));
    }

    #[test]
    fn rejects_invalid_seeds() {
        let graph = BipartiteGraph::from_edges(2, 2, [(0, 0), (1, 1), (1, 0)]).unwrap();
        assert_eq!(
            UnoEnumerator::new(graph.clone(), &Matching::from_pairs(vec![(0, 1)])).unwrap_err(),
            MatchingError::SeedEdgeMissing { left: 0, right: 1 }
        );
        assert_eq!(
            UnoEnumerator::new(graph.clone(), &Matching::from_pairs(vec![(0, 0), (1, 0)])).unwrap_err(),
            MatchingError::SeedNotMatching { node: 0 }
        );
        assert!(matches!(
            UnoEnumerator::new(graph, &Matching::from_pairs(vec![(4, 0)])),
            Err(MatchingError::NodeOutOfRange { node: 4, .. })
        ));
    }

    #[test]
    fn consumers_can_stop_early() {
        let mut it = UnoEnumerator::complete(8);
        let first: Vec<Matching> = it.by_ref().take(10).collect();
        assert_eq!(first.len(), 10);
        assert!(it.next().is_some());
    }
}
