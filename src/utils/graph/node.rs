//! Node identifiers and per-node adjacency storage.
//!
//! This module provides the [`NodeId`] type, a strongly-typed index into a
//! [`DirectedGraph`](crate::utils::graph::DirectedGraph), and [`Node`], which
//! holds a node's key together with its ordered inbound and outbound neighbor
//! lists.

use std::fmt;

/// A strongly-typed identifier for nodes within a directed graph.
///
/// `NodeId` wraps a `usize` slot index. Identifiers are assigned sequentially
/// as keys are added and stay stable for the lifetime of the graph, even after
/// other nodes are deleted (deleted slots are never reused).
///
/// # Examples
///
/// ```rust,ignore
/// use decompcore::utils::graph::DirectedGraph;
///
/// let mut graph: DirectedGraph<u64> = DirectedGraph::new();
/// let a = graph.add_node(0x1000)?;
/// let b = graph.add_node(0x1010)?;
/// assert_ne!(a, b);
/// assert_eq!(graph.get_node(&0x1010), Some(b));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new `NodeId` from a raw slot index.
    ///
    /// Normal usage obtains identifiers from
    /// [`DirectedGraph::add_node`](crate::utils::graph::DirectedGraph::add_node).
    #[must_use]
    #[inline]
    pub const fn new(index: usize) -> Self {
        NodeId(index)
    }

    /// Returns the raw slot index, suitable for indexing dense per-node vectors.
    #[must_use]
    #[inline]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl From<usize> for NodeId {
    fn from(index: usize) -> Self {
        NodeId(index)
    }
}

impl From<NodeId> for usize {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// A graph node: its key plus ordered neighbor lists.
///
/// Edges are kept on both endpoints: an edge `a -> b` appears in `a`'s
/// successor list and in `b`'s predecessor list. Parallel edges appear once
/// per insertion.
#[derive(Debug, Clone)]
pub struct Node<K> {
    pub(crate) key: K,
    pub(crate) predecessors: Vec<NodeId>,
    pub(crate) successors: Vec<NodeId>,
    pub(crate) removed: bool,
}

impl<K> Node<K> {
    pub(crate) fn new(key: K) -> Self {
        Node {
            key,
            predecessors: Vec::new(),
            successors: Vec::new(),
            removed: false,
        }
    }

    /// Returns the key identifying this node.
    #[must_use]
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Returns the inbound neighbors in insertion order.
    #[must_use]
    pub fn predecessors(&self) -> &[NodeId] {
        &self.predecessors
    }

    /// Returns the outbound neighbors in insertion order.
    #[must_use]
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    /// Number of inbound edges.
    #[must_use]
    pub fn in_degree(&self) -> usize {
        self.predecessors.len()
    }

    /// Number of outbound edges.
    #[must_use]
    pub fn out_degree(&self) -> usize {
        self.successors.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_node_id_roundtrip_usize() {
        let id = NodeId::from(7usize);
        assert_eq!(id.index(), 7);
        assert_eq!(usize::from(id), 7);
    }

    #[test]
    fn test_node_id_formatting() {
        let id = NodeId::new(3);
        assert_eq!(format!("{:?}", id), "NodeId(3)");
        assert_eq!(format!("{}", id), "n3");
    }

    #[test]
    fn test_node_id_ordering_and_hash() {
        let a = NodeId::new(1);
        let b = NodeId::new(2);
        assert!(a < b);

        let set: HashSet<NodeId> = [a, b, NodeId::new(1)].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_node_degrees() {
        let mut node = Node::new(0x10u64);
        node.successors.push(NodeId::new(1));
        node.successors.push(NodeId::new(1));
        node.predecessors.push(NodeId::new(2));

        assert_eq!(*node.key(), 0x10);
        assert_eq!(node.out_degree(), 2);
        assert_eq!(node.in_degree(), 1);
        assert_eq!(node.predecessors(), &[NodeId::new(2)]);
    }
}
