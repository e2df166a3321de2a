//! Dependency graph over resolved components, used by the Resolver to
//! order installation and detect cycles.

use petgraph::{
    algo::toposort,
    prelude::DiGraph,
    visit::{Dfs, Walker},
};

mod subgraph;
pub use subgraph::subgraph;

/// NodeIndex as employed throughout this crate's usage.
pub type NodeIndex = petgraph::prelude::NodeIndex<u32>;

/// Simplistic encapsulation of petgraph APIs suited to ordering
/// components and detecting dependency cycles.
#[derive(Debug, Clone)]
pub struct Dag<N>(DiGraph<N, (), u32>);

impl<N> Default for Dag<N> {
    fn default() -> Self {
        Self(DiGraph::default())
    }
}

impl<N> Dag<N>
where
    N: Clone + PartialEq,
{
    /// Construct a new, empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds node `N` to the graph and returns its index.
    /// If `N` already exists, returns the index of that node.
    pub fn add_node_or_get_index(&mut self, node: N) -> NodeIndex {
        if let Some(index) = self.get_index(&node) {
            index
        } else {
            self.0.add_node(node)
        }
    }

    /// Returns true if the node exists in the graph.
    pub fn node_exists(&self, node: &N) -> bool {
        self.get_index(node).is_some()
    }

    /// Add an edge from `a` to `b` unconditionally. Unlike moss's variant,
    /// this never silently refuses a cycle-forming edge: callers that need
    /// a DAG invariant should call [`Dag::toposort`] and surface the
    /// resulting cycle rather than rejecting edges one at a time, since the
    /// cycle itself (not just the rejected edge) is what the Resolver must
    /// report.
    pub fn add_edge(&mut self, a: NodeIndex, b: NodeIndex) {
        if self.0.find_edge(a, b).is_none() {
            self.0.add_edge(a, b, ());
        }
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &'_ N> {
        self.0.node_indices().map(|i| &self.0[i])
    }

    /// Perform a depth-first search from the given start index.
    pub fn dfs(&self, start: NodeIndex) -> impl Iterator<Item = &'_ N> {
        let dfs = Dfs::new(&self.0, start);
        dfs.iter(&self.0).map(|i| &self.0[i])
    }

    /// Perform a topological sort. Returns the first detected cycle (as a
    /// list of nodes, starting at the node where the cycle was found) if
    /// the graph is not a DAG.
    pub fn toposort(&self) -> Result<Vec<&'_ N>, Cycle<N>> {
        match toposort(&self.0, None) {
            Ok(order) => Ok(order.into_iter().map(|i| &self.0[i]).collect()),
            Err(cycle) => {
                let start = cycle.node_id();
                let path = self.dfs(start).cloned().collect::<Vec<_>>();
                Err(Cycle {
                    start: self.0[start].clone(),
                    path,
                })
            }
        }
    }

    /// Transpose the graph, returning the clone.
    pub fn transpose(&self) -> Self {
        let mut transposed = self.0.clone();
        transposed.reverse();
        Self(transposed)
    }

    /// Split the graph at the given start node(s), returning a new graph.
    pub fn subgraph(&self, starting_nodes: &[N]) -> Self {
        Self(subgraph(&self.0, starting_nodes))
    }

    /// Return the index for a node of type `N`.
    pub fn get_index(&self, node: &N) -> Option<NodeIndex> {
        self.0.node_indices().find(|i| self.0[*i] == *node)
    }
}

/// A detected cycle, reported with the node where the cycle was discovered
/// and the depth-first path reachable from it (which contains the cycle).
#[derive(Debug, Clone)]
pub struct Cycle<N> {
    pub start: N,
    pub path: Vec<N>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn toposort_orders_dependencies_first() {
        let mut dag = Dag::new();
        let a = dag.add_node_or_get_index("a");
        let b = dag.add_node_or_get_index("b");
        let c = dag.add_node_or_get_index("c");
        // c depends on b, b depends on a
        dag.add_edge(a, b);
        dag.add_edge(b, c);

        let order = dag.toposort().unwrap();
        assert_eq!(order, vec![&"a", &"b", &"c"]);
    }

    #[test]
    fn toposort_detects_cycle() {
        let mut dag = Dag::new();
        let a = dag.add_node_or_get_index("a");
        let b = dag.add_node_or_get_index("b");
        dag.add_edge(a, b);
        dag.add_edge(b, a);

        assert!(dag.toposort().is_err());
    }

    #[test]
    fn add_node_or_get_index_is_idempotent() {
        let mut dag: Dag<&str> = Dag::new();
        let a1 = dag.add_node_or_get_index("a");
        let a2 = dag.add_node_or_get_index("a");
        assert_eq!(a1, a2);
        assert_eq!(dag.iter_nodes().count(), 1);
    }
}
