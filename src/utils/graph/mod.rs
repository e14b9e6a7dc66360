//! Generic graph infrastructure for control flow analysis.
//!
//! # Architecture
//!
//! - [`DirectedGraph`] - Keyed directed graph with ordered adjacency lists
//! - [`NodeId`] - Dense node identifier used by the algorithms
//! - [`Node`] - A node's key and its neighbor lists
//! - Traits ([`GraphBase`], [`Successors`], [`Predecessors`], [`RootedGraph`])
//!   that decouple algorithms from the graph representation
//! - [`algorithms`] - DFS spanning trees, dominators and dominance frontiers

mod directed;
mod node;
mod traits;

pub mod algorithms;

pub use directed::DirectedGraph;
pub use node::{Node, NodeId};
pub use traits::{GraphBase, Predecessors, RootedGraph, Successors};
