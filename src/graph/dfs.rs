use super::Dag;
use std::iter::FusedIterator;

/// Lazy depth-first traversal over a [`Dag`].
///
/// The iterator owns its stack and visited set, so it runs once. Start a new
/// one with [`Dag::dfs`] or [`Dag::dfs_from`] to walk again from any vertex.
#[derive(Debug, Clone)]
pub struct DfsIter<'a> {
    dag: &'a Dag,
    stack: Vec<usize>,
    visited: Vec<bool>,
}

impl<'a> DfsIter<'a> {
    pub(crate) fn from_heads(dag: &'a Dag) -> Self {
        // stacked in order, so the last head is walked first
        let stack = dag.heads();
        Self {
            dag,
            stack,
            visited: vec![false; dag.vertex_count()],
        }
    }

    pub(crate) fn from_vertex(dag: &'a Dag, vertex: usize) -> Self {
        let stack = if vertex < dag.vertex_count() {
            vec![vertex]
        } else {
            Vec::new()
        };
        Self {
            dag,
            stack,
            visited: vec![false; dag.vertex_count()],
        }
    }

    /// True once every reachable vertex has been yielded
    pub fn is_finished(&self) -> bool {
        self.stack.is_empty()
    }
}

impl Iterator for DfsIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            let top = *self.stack.last()?;
            if !self.visited[top] {
                self.visited[top] = true;
                return Some(top);
            }

            let unvisited = self
                .dag
                .successors(top)
                .iter()
                .copied()
                .find(|&next| !self.visited[next]);

            match unvisited {
                Some(next) => self.stack.push(next),
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

impl FusedIterator for DfsIter<'_> {}

/// Same graph and same stack top. Only meant for detecting the end of a walk.
impl PartialEq for DfsIter<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.dag, other.dag)
            && self.stack.len() == other.stack.len()
            && self.stack.last() == other.stack.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preorder_follows_adjacency() {
        let mut dag = Dag::with_vertices(5);
        dag.add_edge(0, 1);
        dag.add_edge(0, 2);
        dag.add_edge(1, 3);
        dag.add_edge(2, 3);
        dag.add_edge(3, 4);

        let order: Vec<usize> = dag.dfs().collect();
        assert_eq!(order, vec![0, 1, 3, 4, 2]);
    }

    #[test]
    fn test_multiple_heads_last_first() {
        let mut dag = Dag::with_vertices(4);
        dag.add_edge(0, 2);
        dag.add_edge(1, 2);
        dag.add_edge(2, 3);

        let order: Vec<usize> = dag.dfs().collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_exhausted_iterators_compare_equal() {
        let mut dag = Dag::with_vertices(2);
        dag.add_edge(0, 1);

        let mut walk = dag.dfs_from(0);
        let end = dag.dfs_from(9);
        assert!(walk != end);

        while walk.next().is_some() {}
        assert!(walk.is_finished());
        assert!(walk == end);
    }
}
