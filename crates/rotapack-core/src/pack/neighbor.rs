use itertools::Itertools;
use nalgebra::Point3;

/// Which pairs of packable positions are close enough to interact.
///
/// Edges are stored once with the lower node index first; adjacency lists
/// are kept sorted so traversal order is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborGraph {
    n: usize,
    edges: Vec<(usize, usize)>,
    adjacency: Vec<Vec<usize>>,
}

impl NeighborGraph {
    pub fn from_edges(n: usize, raw_edges: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut edges: Vec<(usize, usize)> = raw_edges
            .into_iter()
            .filter(|&(a, b)| a != b && a < n && b < n)
            .map(|(a, b)| (a.min(b), a.max(b)))
            .collect();
        edges.sort_unstable();
        edges.dedup();

        let mut adjacency = vec![Vec::new(); n];
        for &(a, b) in &edges {
            adjacency[a].push(b);
            adjacency[b].push(a);
        }
        for list in &mut adjacency {
            list.sort_unstable();
        }
        Self { n, edges, adjacency }
    }

    /// Connects every pair of centers within `cutoff` of each other.
    pub fn from_centers(centers: &[Point3<f64>], cutoff: f64) -> Self {
        let edges = centers
            .iter()
            .enumerate()
            .tuple_combinations()
            .filter(|((_, a), (_, b))| (*a - *b).norm() <= cutoff)
            .map(|((i, _), (j, _))| (i, j));
        Self::from_edges(centers.len(), edges)
    }

    pub fn n_nodes(&self) -> usize {
        self.n
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    pub fn contains_edge(&self, a: usize, b: usize) -> bool {
        let key = (a.min(b), a.max(b));
        self.edges.binary_search(&key).is_ok()
    }
}
