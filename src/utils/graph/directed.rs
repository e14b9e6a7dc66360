//! Keyed directed graph implementation.
//!
//! This module provides [`DirectedGraph`], the graph type used for control flow
//! and dominator trees. Nodes are identified by caller-chosen keys (block
//! addresses in practice) and resolved to dense [`NodeId`] slots, so the
//! spanning-tree and dominator algorithms can index plain vectors.
//!
//! Parallel edges are permitted and each insertion is tracked separately.
//! Deleting a node leaves its slot empty; slots are never reused, so existing
//! identifiers stay valid for the surviving nodes.

use std::{collections::HashMap, fmt::Write, hash::Hash};

use crate::{
    utils::{
        escape_dot,
        graph::{
            node::{Node, NodeId},
            traits::{GraphBase, Predecessors, RootedGraph, Successors},
        },
    },
    Error, Result,
};

/// A directed graph whose nodes are identified by unique keys.
///
/// Every edge is recorded on both endpoints: the source lists the target as a
/// successor and the target lists the source as a predecessor. Neighbor lists
/// preserve insertion order, which makes traversal order (and therefore DFS
/// numbering) deterministic.
///
/// # Examples
///
/// ```rust,ignore
/// use decompcore::utils::graph::DirectedGraph;
///
/// let mut cfg: DirectedGraph<u64> = DirectedGraph::new();
/// cfg.add_node(0x1000)?;
/// cfg.add_node(0x1010)?;
/// cfg.add_edge(&0x1000, &0x1010)?;
/// cfg.set_root(&0x1000)?;
///
/// assert_eq!(cfg.edge_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DirectedGraph<K> {
    /// Node slots, `removed` marks deleted entries
    nodes: Vec<Node<K>>,
    /// Key to slot lookup for live nodes
    index: HashMap<K, NodeId>,
    /// Designated root, if any
    root: Option<NodeId>,
    /// Number of live edges, counting parallel edges separately
    edge_count: usize,
}

impl<K: Clone + Eq + Hash> Default for DirectedGraph<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + Eq + Hash> DirectedGraph<K> {
    /// Creates a new empty graph without a root.
    #[must_use]
    pub fn new() -> Self {
        DirectedGraph {
            nodes: Vec::new(),
            index: HashMap::new(),
            root: None,
            edge_count: 0,
        }
    }

    /// Creates a new empty graph with room for `capacity` nodes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        DirectedGraph {
            nodes: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            root: None,
            edge_count: 0,
        }
    }

    /// Adds a node with the given key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if a node with the same key already exists.
    pub fn add_node(&mut self, key: K) -> Result<NodeId> {
        if self.index.contains_key(&key) {
            return Err(Error::GraphError(format!(
                "duplicate node key in graph with {} nodes",
                self.index.len()
            )));
        }

        let id = NodeId::new(self.nodes.len());
        self.index.insert(key.clone(), id);
        self.nodes.push(Node::new(key));
        Ok(id)
    }

    /// Looks up the identifier of the node with the given key.
    #[must_use]
    pub fn get_node(&self, key: &K) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    /// Returns `true` if a node with the given key exists.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the node stored at `id`, or `None` if it was deleted or never existed.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node<K>> {
        self.nodes.get(id.index()).filter(|node| !node.removed)
    }

    /// Returns the key of the node stored at `id`.
    #[must_use]
    pub fn key(&self, id: NodeId) -> Option<&K> {
        self.node(id).map(Node::key)
    }

    /// Designates the node with the given key as the root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if no node has that key.
    pub fn set_root(&mut self, key: &K) -> Result<NodeId> {
        let id = self.require(key, "root")?;
        self.root = Some(id);
        Ok(id)
    }

    /// Returns the key of the root node, if a root has been set.
    #[must_use]
    pub fn root_key(&self) -> Option<&K> {
        self.root.and_then(|id| self.key(id))
    }

    /// Adds an edge from `source` to `target`.
    ///
    /// Adding the same edge twice creates two parallel edges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either key is not part of the graph.
    pub fn add_edge(&mut self, source: &K, target: &K) -> Result<()> {
        let src = self.require(source, "source")?;
        let dst = self.require(target, "target")?;

        self.nodes[src.index()].successors.push(dst);
        self.nodes[dst.index()].predecessors.push(src);
        self.edge_count += 1;
        Ok(())
    }

    /// Removes one edge from `source` to `target`.
    ///
    /// Only the first matching parallel edge is removed. Returns `false` if no
    /// such edge exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either key is not part of the graph.
    pub fn del_edge(&mut self, source: &K, target: &K) -> Result<bool> {
        let src = self.require(source, "source")?;
        let dst = self.require(target, "target")?;
        Ok(self.unlink(src, dst))
    }

    /// Inserts a new node `key` in the middle of the edge `source -> target`.
    ///
    /// The edge is replaced by `source -> key -> target`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if either endpoint is missing, if the edge
    /// does not exist, or if `key` is already present.
    pub fn split_edge(&mut self, source: &K, target: &K, key: K) -> Result<NodeId> {
        if self.contains(&key) {
            return Err(Error::GraphError(
                "split key already exists in graph".to_string(),
            ));
        }
        if !self.del_edge(source, target)? {
            return Err(Error::GraphError("cannot split a missing edge".to_string()));
        }

        let middle = self.add_node(key.clone())?;
        self.add_edge(source, &key)?;
        self.add_edge(&key, target)?;
        Ok(middle)
    }

    /// Deletes a node and every edge touching it.
    ///
    /// Returns `false` if no node has the given key. Deleting the root clears
    /// the root.
    pub fn del_node(&mut self, key: &K) -> bool {
        let Some(id) = self.index.remove(key) else {
            return false;
        };

        let successors = std::mem::take(&mut self.nodes[id.index()].successors);
        for succ in successors {
            let preds = &mut self.nodes[succ.index()].predecessors;
            if let Some(pos) = preds.iter().position(|&p| p == id) {
                preds.remove(pos);
            }
            self.edge_count -= 1;
        }

        let predecessors = std::mem::take(&mut self.nodes[id.index()].predecessors);
        for pred in predecessors {
            // Self-loops were already dropped with the successor list.
            if pred == id {
                continue;
            }
            let succs = &mut self.nodes[pred.index()].successors;
            if let Some(pos) = succs.iter().position(|&s| s == id) {
                succs.remove(pos);
            }
            self.edge_count -= 1;
        }

        self.nodes[id.index()].removed = true;
        if self.root == Some(id) {
            self.root = None;
        }
        true
    }

    /// Returns the number of live edges, counting parallel edges separately.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns `true` if the graph has no live nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterates over the keys of all live nodes in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.nodes
            .iter()
            .filter(|node| !node.removed)
            .map(Node::key)
    }

    /// Returns the keys of the successors of `key`, in edge insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the key is not part of the graph.
    pub fn successor_keys(&self, key: &K) -> Result<Vec<K>> {
        let id = self.require(key, "query")?;
        Ok(self.nodes[id.index()]
            .successors
            .iter()
            .map(|s| self.nodes[s.index()].key.clone())
            .collect())
    }

    /// Returns the keys of the predecessors of `key`, in edge insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if the key is not part of the graph.
    pub fn predecessor_keys(&self, key: &K) -> Result<Vec<K>> {
        let id = self.require(key, "query")?;
        Ok(self.nodes[id.index()]
            .predecessors
            .iter()
            .map(|p| self.nodes[p.index()].key.clone())
            .collect())
    }

    /// Returns the number of outbound edges of `id`, or 0 for missing nodes.
    #[must_use]
    pub fn out_degree(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, Node::out_degree)
    }

    /// Returns the number of inbound edges of `id`, or 0 for missing nodes.
    #[must_use]
    pub fn in_degree(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, Node::in_degree)
    }

    /// Builds a copy of this graph with every edge reversed, rooted at `new_root`.
    ///
    /// Node insertion order (and therefore every [`NodeId`]) is preserved.
    /// Reversing the control flow graph rooted at its exit yields the graph used
    /// for post-dominance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if `new_root` is not part of the graph.
    pub fn reversed(&self, new_root: &K) -> Result<Self> {
        let root = self.require(new_root, "root")?;
        let nodes = self
            .nodes
            .iter()
            .map(|node| Node {
                key: node.key.clone(),
                predecessors: node.successors.clone(),
                successors: node.predecessors.clone(),
                removed: node.removed,
            })
            .collect();

        Ok(DirectedGraph {
            nodes,
            index: self.index.clone(),
            root: Some(root),
            edge_count: self.edge_count,
        })
    }

    /// Renders the graph in DOT format, labelling nodes with `label`.
    ///
    /// The root is drawn with a bold outline.
    pub fn to_dot(&self, title: Option<&str>, label: impl Fn(&K) -> String) -> String {
        let mut dot = String::new();

        dot.push_str("digraph G {\n");
        if let Some(name) = title {
            let _ = writeln!(dot, "    label=\"{}\";", escape_dot(name));
        }
        dot.push_str("    node [shape=box, fontname=\"Courier\", fontsize=10];\n");

        for id in self.node_ids() {
            let style = if Some(id) == self.root {
                ", style=bold"
            } else {
                ""
            };
            let _ = writeln!(
                dot,
                "    {} [label=\"{}\"{}];",
                id,
                escape_dot(&label(&self.nodes[id.index()].key)),
                style
            );
        }

        for id in self.node_ids() {
            for succ in &self.nodes[id.index()].successors {
                let _ = writeln!(dot, "    {} -> {};", id, succ);
            }
        }

        dot.push_str("}\n");
        dot
    }

    fn require(&self, key: &K, role: &str) -> Result<NodeId> {
        self.get_node(key).ok_or_else(|| {
            Error::GraphError(format!(
                "{} node does not exist in graph with {} nodes",
                role,
                self.index.len()
            ))
        })
    }

    fn unlink(&mut self, src: NodeId, dst: NodeId) -> bool {
        let succs = &mut self.nodes[src.index()].successors;
        let Some(pos) = succs.iter().position(|&s| s == dst) else {
            return false;
        };
        succs.remove(pos);

        let preds = &mut self.nodes[dst.index()].predecessors;
        if let Some(pos) = preds.iter().position(|&p| p == src) {
            preds.remove(pos);
        }
        self.edge_count -= 1;
        true
    }
}

impl<K: Clone + Eq + Hash> GraphBase for DirectedGraph<K> {
    fn node_count(&self) -> usize {
        self.index.len()
    }

    fn node_bound(&self) -> usize {
        self.nodes.len()
    }

    fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.removed)
            .map(|(i, _)| NodeId::new(i))
    }
}

impl<K: Clone + Eq + Hash> Successors for DirectedGraph<K> {
    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.node(node)
            .map(|n| n.successors.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
    }
}

impl<K: Clone + Eq + Hash> Predecessors for DirectedGraph<K> {
    fn predecessors(&self, node: NodeId) -> impl Iterator<Item = NodeId> {
        self.node(node)
            .map(|n| n.predecessors.as_slice())
            .unwrap_or_default()
            .iter()
            .copied()
    }
}

impl<K: Clone + Eq + Hash> RootedGraph for DirectedGraph<K> {
    fn root(&self) -> Option<NodeId> {
        self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Creates a diamond: A -> B, A -> C, B -> D, C -> D
    fn create_diamond_graph() -> DirectedGraph<&'static str> {
        let mut graph = DirectedGraph::new();
        for key in ["A", "B", "C", "D"] {
            graph.add_node(key).unwrap();
        }
        graph.add_edge(&"A", &"B").unwrap();
        graph.add_edge(&"A", &"C").unwrap();
        graph.add_edge(&"B", &"D").unwrap();
        graph.add_edge(&"C", &"D").unwrap();
        graph.set_root(&"A").unwrap();
        graph
    }

    #[test]
    fn test_empty_graph() {
        let graph: DirectedGraph<u64> = DirectedGraph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.root().is_none());
    }

    #[test]
    fn test_add_node_rejects_duplicates() {
        let mut graph = DirectedGraph::new();
        graph.add_node(0x10u64).unwrap();
        assert!(matches!(graph.add_node(0x10), Err(Error::GraphError(_))));
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn test_add_edge_requires_both_endpoints() {
        let mut graph = DirectedGraph::new();
        graph.add_node(1u64).unwrap();
        assert!(graph.add_edge(&1, &2).is_err());
        assert!(graph.add_edge(&2, &1).is_err());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_set_root_requires_key() {
        let mut graph = create_diamond_graph();
        assert!(graph.set_root(&"Z").is_err());
        assert_eq!(graph.root_key(), Some(&"A"));
    }

    #[test]
    fn test_successors_in_insertion_order() {
        let graph = create_diamond_graph();
        assert_eq!(graph.successor_keys(&"A").unwrap(), vec!["B", "C"]);
        assert_eq!(graph.predecessor_keys(&"D").unwrap(), vec!["B", "C"]);
    }

    #[test]
    fn test_parallel_edges_counted_separately() {
        let mut graph = create_diamond_graph();
        graph.add_edge(&"A", &"B").unwrap();
        let a = graph.get_node(&"A").unwrap();
        let b = graph.get_node(&"B").unwrap();

        assert_eq!(graph.out_degree(a), 3);
        assert_eq!(graph.in_degree(b), 2);

        assert!(graph.del_edge(&"A", &"B").unwrap());
        assert_eq!(graph.out_degree(a), 2);
        assert_eq!(graph.in_degree(b), 1);
    }

    #[test]
    fn test_del_missing_edge_is_noop() {
        let mut graph = create_diamond_graph();
        assert!(!graph.del_edge(&"D", &"A").unwrap());
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn test_del_node_removes_edges() {
        let mut graph = create_diamond_graph();
        assert!(graph.del_node(&"B"));
        assert!(!graph.contains(&"B"));
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.successor_keys(&"A").unwrap(), vec!["C"]);
        assert_eq!(graph.predecessor_keys(&"D").unwrap(), vec!["C"]);

        // Surviving ids are stable.
        assert_eq!(graph.get_node(&"D"), Some(NodeId::new(3)));
        assert_eq!(graph.node_bound(), 4);
        assert_eq!(graph.node_ids().count(), 3);
    }

    #[test]
    fn test_del_node_with_self_loop() {
        let mut graph = DirectedGraph::new();
        graph.add_node(1u32).unwrap();
        graph.add_node(2u32).unwrap();
        graph.add_edge(&1, &1).unwrap();
        graph.add_edge(&1, &2).unwrap();

        assert!(graph.del_node(&1));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.predecessor_keys(&2).unwrap().is_empty());
    }

    #[test]
    fn test_split_edge() {
        let mut graph = create_diamond_graph();
        graph.split_edge(&"A", &"B", "AB").unwrap();

        assert_eq!(graph.successor_keys(&"A").unwrap(), vec!["C", "AB"]);
        assert_eq!(graph.successor_keys(&"AB").unwrap(), vec!["B"]);
        assert_eq!(graph.edge_count(), 5);
        assert!(graph.split_edge(&"D", &"A", "X").is_err());
    }

    #[test]
    fn test_reversed_graph() {
        let graph = create_diamond_graph();
        let rev = graph.reversed(&"D").unwrap();

        assert_eq!(rev.root_key(), Some(&"D"));
        assert_eq!(rev.successor_keys(&"D").unwrap(), vec!["B", "C"]);
        assert_eq!(rev.predecessor_keys(&"A").unwrap(), vec!["B", "C"]);
        assert_eq!(rev.edge_count(), graph.edge_count());
        assert_eq!(rev.get_node(&"C"), graph.get_node(&"C"));
    }

    #[test]
    fn test_to_dot() {
        let graph = create_diamond_graph();
        let dot = graph.to_dot(Some("diamond"), |k| k.to_string());

        assert!(dot.starts_with("digraph G {"));
        assert!(dot.contains("label=\"diamond\""));
        assert!(dot.contains("n0 [label=\"A\", style=bold];"));
        assert!(dot.contains("n2 -> n3;"));
    }
}
