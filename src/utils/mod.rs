//! Shared utilities: the graph ADT and its algorithms, and DOT output helpers.

mod dot;
pub mod graph;

pub use dot::escape_dot;
