//! Trait definitions for graph abstractions.
//!
//! The spanning-tree and dominator algorithms are written against these traits
//! rather than against [`DirectedGraph`](crate::utils::graph::DirectedGraph)
//! directly, so they only see what they need:
//!
//! - [`GraphBase`] - Node counting and iteration
//! - [`Successors`] - Forward edge traversal
//! - [`Predecessors`] - Backward edge traversal
//! - [`RootedGraph`] - Graphs with a designated root node

use crate::utils::graph::NodeId;

/// Core properties shared by every graph.
pub trait GraphBase {
    /// Returns the number of live nodes in the graph.
    fn node_count(&self) -> usize;

    /// Returns an exclusive upper bound for [`NodeId::index`] values.
    ///
    /// Algorithms size their dense per-node vectors with this value. It is
    /// larger than [`node_count`](GraphBase::node_count) once nodes have been
    /// deleted, because deleted slots are not reused.
    fn node_bound(&self) -> usize;

    /// Returns an iterator over the identifiers of all live nodes, in
    /// insertion order.
    fn node_ids(&self) -> impl Iterator<Item = NodeId>;
}

/// Forward traversal.
pub trait Successors: GraphBase {
    /// Returns the outbound neighbors of `node`, in edge insertion order.
    ///
    /// Parallel edges yield the same neighbor more than once.
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// Backward traversal.
pub trait Predecessors: GraphBase {
    /// Returns the inbound neighbors of `node`, in edge insertion order.
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId>;
}

/// A graph with a designated root, the start of every spanning tree and
/// dominator computation.
pub trait RootedGraph: Successors + Predecessors {
    /// Returns the root node, or `None` if no root has been set.
    fn root(&self) -> Option<NodeId>;
}
