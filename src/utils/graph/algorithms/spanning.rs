//! Depth-first spanning trees.
//!
//! A [`DfsSpanningTree`] records the order in which a depth-first search from
//! the root first visits each node (`dfnum`) together with the tree edge used to
//! reach it (`parent`). The visitation sequence is cached separately, so callers
//! can walk nodes in DFS order without sorting.
//!
//! The search is iterative but visits nodes in exactly the order a recursive
//! preorder walk would: successors are explored in edge insertion order, and a
//! node is marked visited before any of its successors are considered, which
//! breaks cycles.

use crate::{
    utils::graph::{NodeId, RootedGraph, Successors},
    Error, Result,
};

/// The DFS spanning tree of a rooted graph.
#[derive(Debug, Clone)]
pub struct DfsSpanningTree {
    root: NodeId,
    /// Nodes in visitation order, `order[dfnum] == node`
    order: Vec<NodeId>,
    /// Visitation number per node slot, `None` for unvisited nodes
    dfnum: Vec<Option<usize>>,
    /// Tree parent per node slot
    parent: Vec<Option<NodeId>>,
}

impl DfsSpanningTree {
    /// Builds the spanning tree from the graph's designated root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the graph has no root.
    pub fn new<G: RootedGraph>(graph: &G) -> Result<Self> {
        let root = graph
            .root()
            .ok_or_else(|| Error::GraphError("graph has no root".to_string()))?;
        Ok(Self::from_root(graph, root))
    }

    /// Builds the spanning tree by exploring from `root`.
    pub fn from_root<G: Successors>(graph: &G, root: NodeId) -> Self {
        let bound = graph.node_bound();
        let mut tree = DfsSpanningTree {
            root,
            order: Vec::with_capacity(graph.node_count()),
            dfnum: vec![None; bound],
            parent: vec![None; bound],
        };
        if root.index() >= bound {
            return tree;
        }

        tree.visit(root, None);
        let mut stack = vec![(root, graph.successors(root).collect::<Vec<_>>().into_iter())];

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.next() {
                Some(succ) if tree.dfnum[succ.index()].is_none() => {
                    tree.visit(succ, Some(node));
                    stack.push((succ, graph.successors(succ).collect::<Vec<_>>().into_iter()));
                }
                Some(_) => {}
                None => {
                    stack.pop();
                }
            }
        }

        tree
    }

    fn visit(&mut self, node: NodeId, parent: Option<NodeId>) {
        self.dfnum[node.index()] = Some(self.order.len());
        self.parent[node.index()] = parent;
        self.order.push(node);
    }

    /// Returns the root the search started from.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Returns the visitation number of `node`, or `None` if the search never reached it.
    #[must_use]
    pub fn dfnum(&self, node: NodeId) -> Option<usize> {
        self.dfnum.get(node.index()).copied().flatten()
    }

    /// Returns the tree parent of `node`. The root and unvisited nodes have none.
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.parent.get(node.index()).copied().flatten()
    }

    /// Returns `true` if the search reached `node`.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        self.dfnum(node).is_some()
    }

    /// Returns the node with visitation number `dfnum`.
    #[must_use]
    pub fn node_at(&self, dfnum: usize) -> Option<NodeId> {
        self.order.get(dfnum).copied()
    }

    /// Iterates over the visited nodes in DFS order, starting with the root.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = NodeId> + '_ {
        self.order.iter().copied()
    }

    /// Number of visited nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if no node was visited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::graph::DirectedGraph;

    fn graph_from(edges: &[(u32, u32)], nodes: &[u32]) -> DirectedGraph<u32> {
        let mut graph = DirectedGraph::new();
        for &n in nodes {
            graph.add_node(n).unwrap();
        }
        for (a, b) in edges {
            graph.add_edge(a, b).unwrap();
        }
        graph.set_root(&nodes[0]).unwrap();
        graph
    }

    fn keys(graph: &DirectedGraph<u32>, tree: &DfsSpanningTree) -> Vec<u32> {
        tree.iter().map(|n| *graph.key(n).unwrap()).collect()
    }

    #[test]
    fn test_preorder_follows_edge_order() {
        // 1 -> 2 -> 4, 1 -> 3 -> 4
        let graph = graph_from(&[(1, 2), (1, 3), (2, 4), (3, 4)], &[1, 2, 3, 4]);
        let tree = DfsSpanningTree::new(&graph).unwrap();

        assert_eq!(keys(&graph, &tree), vec![1, 2, 4, 3]);
        let n3 = graph.get_node(&3).unwrap();
        let n4 = graph.get_node(&4).unwrap();
        assert_eq!(tree.parent(n4), graph.get_node(&2));
        assert_eq!(tree.parent(n3), graph.get_node(&1));
        assert_eq!(tree.dfnum(n3), Some(3));
    }

    #[test]
    fn test_cycles_visit_once() {
        let graph = graph_from(&[(1, 2), (2, 3), (3, 1), (3, 3)], &[1, 2, 3]);
        let tree = DfsSpanningTree::new(&graph).unwrap();

        assert_eq!(keys(&graph, &tree), vec![1, 2, 3]);
        assert_eq!(tree.parent(tree.root()), None);
    }

    #[test]
    fn test_unreachable_nodes_are_unnumbered() {
        let graph = graph_from(&[(1, 2), (3, 2)], &[1, 2, 3]);
        let tree = DfsSpanningTree::new(&graph).unwrap();

        let n3 = graph.get_node(&3).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(!tree.contains(n3));
        assert_eq!(tree.dfnum(n3), None);
        assert_eq!(tree.node_at(1), graph.get_node(&2));
    }

    #[test]
    fn test_rootless_graph_is_rejected() {
        let mut graph: DirectedGraph<u32> = DirectedGraph::new();
        graph.add_node(1).unwrap();
        assert!(matches!(
            DfsSpanningTree::new(&graph),
            Err(Error::GraphError(_))
        ));
    }

    #[test]
    fn test_deep_chain_does_not_recurse() {
        let nodes: Vec<u32> = (0..50_000).collect();
        let edges: Vec<(u32, u32)> = nodes.windows(2).map(|w| (w[0], w[1])).collect();
        let graph = graph_from(&edges, &nodes);
        let tree = DfsSpanningTree::new(&graph).unwrap();

        assert_eq!(tree.len(), 50_000);
        assert_eq!(tree.dfnum(graph.get_node(&49_999).unwrap()), Some(49_999));
    }
}
