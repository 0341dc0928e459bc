pub mod dfs;

pub use dfs::DfsIter;

/// Result of a topological sort
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopoOrder {
    /// Vertices in an order consistent with edge direction
    pub sorted: Vec<usize>,

    /// Vertices on a cycle or reachable only through one
    pub unsorted: Vec<usize>,
}

impl TopoOrder {
    pub fn is_acyclic(&self) -> bool {
        self.unsorted.is_empty()
    }
}

/// Directed graph over vertices `0..vertex_count()` stored as adjacency lists
#[derive(Debug, Clone, Default)]
pub struct Dag {
    edges: Vec<Vec<usize>>,
    indegrees: Vec<usize>,
}

impl Dag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph with `count` vertices and no edges
    pub fn with_vertices(count: usize) -> Self {
        Self {
            edges: vec![Vec::new(); count],
            indegrees: vec![0; count],
        }
    }

    /// Add a vertex and return its index
    pub fn add_vertex(&mut self) -> usize {
        self.edges.push(Vec::new());
        self.indegrees.push(0);
        self.edges.len() - 1
    }

    /// Add a directed edge. Returns false if either end is not a vertex.
    pub fn add_edge(&mut self, from: usize, to: usize) -> bool {
        if from >= self.edges.len() || to >= self.edges.len() {
            return false;
        }
        self.edges[from].push(to);
        self.indegrees[to] += 1;
        true
    }

    pub fn vertex_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Successors of `vertex` in insertion order
    pub fn successors(&self, vertex: usize) -> &[usize] {
        self.edges.get(vertex).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn indegree(&self, vertex: usize) -> Option<usize> {
        self.indegrees.get(vertex).copied()
    }

    pub fn outdegree(&self, vertex: usize) -> Option<usize> {
        self.edges.get(vertex).map(Vec::len)
    }

    /// Vertices with no incoming edge
    pub fn heads(&self) -> Vec<usize> {
        (0..self.vertex_count())
            .filter(|&v| self.indegrees[v] == 0)
            .collect()
    }

    /// Vertices with no outgoing edge
    pub fn tails(&self) -> Vec<usize> {
        (0..self.vertex_count())
            .filter(|&v| self.edges[v].is_empty())
            .collect()
    }

    /// Kahn-style elimination in waves over the vertex array.
    ///
    /// Each pass removes every vertex whose remaining in-degree is zero,
    /// including vertices freed earlier in the same pass. Passes repeat until
    /// nothing is removed; whatever is left goes to `unsorted`.
    pub fn topo_sort(&self) -> TopoOrder {
        // None marks a removed vertex
        let mut indegrees: Vec<Option<usize>> = self.indegrees.iter().copied().map(Some).collect();
        let mut sorted = Vec::with_capacity(indegrees.len());

        let mut removed_any = true;
        while removed_any {
            removed_any = false;
            for vertex in 0..indegrees.len() {
                if indegrees[vertex] != Some(0) {
                    continue;
                }
                sorted.push(vertex);
                for &next in &self.edges[vertex] {
                    if let Some(degree) = indegrees[next].as_mut() {
                        *degree = degree.saturating_sub(1);
                    }
                }
                indegrees[vertex] = None;
                removed_any = true;
            }
        }

        let unsorted = indegrees
            .iter()
            .enumerate()
            .filter(|(_, degree)| degree.is_some())
            .map(|(vertex, _)| vertex)
            .collect();

        TopoOrder { sorted, unsorted }
    }

    /// Depth-first, pre-order traversal starting from every head.
    /// Heads are stacked in index order, so the last head is walked first.
    pub fn dfs(&self) -> DfsIter<'_> {
        DfsIter::from_heads(self)
    }

    /// Depth-first, pre-order traversal starting from `vertex`.
    /// Yields nothing if `vertex` is not in the graph.
    pub fn dfs_from(&self, vertex: usize) -> DfsIter<'_> {
        DfsIter::from_vertex(self, vertex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> Dag {
        let mut dag = Dag::with_vertices(5);
        for (from, to) in [(0, 1), (0, 2), (1, 3), (2, 3), (3, 4)] {
            assert!(dag.add_edge(from, to));
        }
        dag
    }

    #[test]
    fn test_add_edge_out_of_range() {
        let mut dag = Dag::with_vertices(2);
        assert!(!dag.add_edge(0, 2));
        assert!(!dag.add_edge(5, 0));
        assert_eq!(dag.indegree(0), Some(0));
        assert_eq!(dag.indegree(7), None);
    }

    #[test]
    fn test_degrees() {
        let dag = diamond();
        assert_eq!(dag.indegree(3), Some(2));
        assert_eq!(dag.outdegree(0), Some(2));
        assert_eq!(dag.successors(0), &[1, 2]);
        assert!(dag.successors(42).is_empty());
    }

    #[test]
    fn test_wave_order() {
        // 1 is freed after the first pass has already scanned it
        let mut dag = Dag::with_vertices(4);
        dag.add_edge(2, 1);
        dag.add_edge(0, 3);

        let order = dag.topo_sort();
        assert_eq!(order.sorted, vec![0, 2, 3, 1]);
        assert!(order.is_acyclic());
    }

    #[test]
    fn test_empty_graph() {
        let dag = Dag::new();
        assert!(dag.heads().is_empty());
        assert!(dag.tails().is_empty());
        assert_eq!(dag.topo_sort(), TopoOrder::default());
        assert_eq!(dag.dfs().count(), 0);
    }
}
