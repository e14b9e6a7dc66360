//! Graph algorithms for program analysis.
//!
//! # Available Algorithms
//!
//! ## Traversal
//!
//! - [`DfsSpanningTree`] - Depth-first visitation order and tree parents
//!
//! ## Dominator Analysis
//!
//! - [`compute_dominators`] - Compute the dominator tree using Lengauer-Tarjan
//! - [`DominatorTree`] - Result of dominator computation, including lazily
//!   memoized dominance frontiers
//!
//! # Algorithm Selection
//!
//! | Algorithm | Time Complexity | Use Case |
//! |-----------|-----------------|----------|
//! | DFS spanning tree | O(V + E) | Reachability, DFS numbering |
//! | Dominators | O(E log V) | Loop verification, phi placement |
//! | Dominance frontier | O(V + E) per node, memoized | Phi placement |
//!
//! # Examples
//!
//! ```rust,ignore
//! use decompcore::utils::graph::{DirectedGraph, algorithms::compute_dominators};
//!
//! let mut cfg: DirectedGraph<u64> = DirectedGraph::new();
//! cfg.add_node(0x10)?;
//! cfg.add_node(0x20)?;
//! cfg.add_edge(&0x10, &0x20)?;
//! cfg.set_root(&0x10)?;
//!
//! let tree = compute_dominators(&cfg)?;
//! let exit = cfg.get_node(&0x20).unwrap();
//! assert!(tree.dominates(tree.root(), exit));
//! ```

mod dominators;
mod spanning;

pub use dominators::{compute_dominators, DominatorIterator, DominatorTree};
pub use spanning::DfsSpanningTree;
