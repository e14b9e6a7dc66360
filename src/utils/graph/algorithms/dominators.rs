//! Dominator tree computation using the Lengauer-Tarjan algorithm.
//!
//! A node `d` **dominates** a node `n` if every path from the root to `n` passes
//! through `d`. The **immediate dominator** of `n` is the unique strict
//! dominator of `n` that does not strictly dominate any other dominator of `n`.
//! Making each node's immediate dominator its parent yields the dominator tree.
//!
//! # Algorithm
//!
//! The tree is built over a [`DfsSpanningTree`] of the graph. Nodes are
//! processed in reverse DFS order; each node's semidominator is the lowest-
//! numbered candidate among its predecessors (the predecessor itself when it was
//! visited earlier, otherwise the semidominator of its ancestor with the lowest
//! semidominator). Nodes whose immediate dominator cannot be decided yet are
//! deferred through `samedom` and resolved by a final forward pass.
//!
//! # Unreachable Nodes
//!
//! Nodes the DFS never reached are outside the tree. [`DominatorTree::dominates`]
//! answers `false` for them, while [`DominatorTree::dominance_frontier`] reports
//! [`Error::Unreachable`].

use std::{cell::OnceCell, collections::BTreeSet, hash::Hash};

use crate::{
    utils::graph::{
        algorithms::DfsSpanningTree, DirectedGraph, NodeId, Predecessors, RootedGraph, Successors,
    },
    Error, Result,
};

/// Result of dominator tree computation.
///
/// Besides the immediate dominators, the tree keeps a snapshot of the graph's
/// successor lists so dominance frontiers can be computed lazily. Frontiers are
/// memoized per node and never invalidated, so the tree must be rebuilt if the
/// underlying graph changes.
///
/// # Examples
///
/// ```rust,ignore
/// use decompcore::utils::graph::{DirectedGraph, algorithms::compute_dominators};
///
/// // Diamond: root -> a, root -> b, a -> c, b -> c
/// let mut cfg: DirectedGraph<&str> = DirectedGraph::new();
/// for key in ["root", "a", "b", "c"] {
///     cfg.add_node(key)?;
/// }
/// cfg.add_edge(&"root", &"a")?;
/// cfg.add_edge(&"root", &"b")?;
/// cfg.add_edge(&"a", &"c")?;
/// cfg.add_edge(&"b", &"c")?;
/// cfg.set_root(&"root")?;
///
/// let tree = compute_dominators(&cfg)?;
/// let c = cfg.get_node(&"c").unwrap();
/// assert_eq!(tree.immediate_dominator(c), cfg.get_node(&"root"));
/// ```
#[derive(Debug, Clone)]
pub struct DominatorTree {
    spanning: DfsSpanningTree,
    /// Immediate dominator per node slot, `None` for the root and unreached nodes
    idom: Vec<Option<NodeId>>,
    /// Dominator tree children per node slot, in DFS order
    children: Vec<Vec<NodeId>>,
    /// Successor lists of the analysed graph
    successors: Vec<Vec<NodeId>>,
    frontiers: Vec<OnceCell<BTreeSet<NodeId>>>,
}

impl DominatorTree {
    /// Returns the root of the dominator tree.
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.spanning.root()
    }

    /// Returns the spanning tree the dominator tree was built over.
    #[must_use]
    pub fn spanning_tree(&self) -> &DfsSpanningTree {
        &self.spanning
    }

    /// Returns `true` if `node` was reached from the root.
    #[inline]
    #[must_use]
    pub fn is_reachable(&self, node: NodeId) -> bool {
        self.spanning.contains(node)
    }

    /// Returns the immediate dominator of a node, or `None` for the root and
    /// for unreachable nodes.
    #[inline]
    #[must_use]
    pub fn immediate_dominator(&self, node: NodeId) -> Option<NodeId> {
        self.idom.get(node.index()).copied().flatten()
    }

    /// Checks if node `v` dominates node `u`.
    ///
    /// Dominance is reflexive. The root is dominated only by itself, and a node
    /// outside the tree is dominated by nothing but itself.
    ///
    /// # Complexity
    ///
    /// O(depth) where depth is the depth of `u` in the dominator tree.
    #[must_use]
    pub fn dominates(&self, v: NodeId, u: NodeId) -> bool {
        let mut current = u;
        loop {
            if current == v {
                return true;
            }
            if current == self.root() {
                return false;
            }
            match self.immediate_dominator(current) {
                Some(idom) => current = idom,
                None => return false,
            }
        }
    }

    /// Checks if `v` dominates `u` and `v != u`.
    #[inline]
    #[must_use]
    pub fn strictly_dominates(&self, v: NodeId, u: NodeId) -> bool {
        v != u && self.dominates(v, u)
    }

    /// Returns an iterator over all dominators of a node, from the node itself
    /// up to (and including) the root.
    pub fn dominators(&self, node: NodeId) -> DominatorIterator<'_> {
        DominatorIterator {
            tree: self,
            current: self.is_reachable(node).then_some(node),
        }
    }

    /// Returns the depth of a node in the dominator tree (the root has depth 0),
    /// or `None` if the node is unreachable.
    #[must_use]
    pub fn depth(&self, node: NodeId) -> Option<usize> {
        self.is_reachable(node)
            .then(|| self.dominators(node).count() - 1)
    }

    /// Returns the nodes immediately dominated by `node`, in DFS order.
    #[must_use]
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.children
            .get(node.index())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns every node dominated by `node`, including `node` itself, in
    /// dominator tree preorder.
    #[must_use]
    pub fn all_dominated(&self, node: NodeId) -> Vec<NodeId> {
        if !self.is_reachable(node) {
            return Vec::new();
        }

        let mut result = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.children(current).iter().rev());
        }
        result
    }

    /// Returns the dominance frontier of `node`.
    ///
    /// The frontier is the union of the successors of `node` that it does not
    /// immediately dominate, and the members of each dominator tree child's
    /// frontier that `node` does not dominate (or that equal `node`). Results
    /// are memoized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unreachable`] if `node` is outside the tree.
    pub fn dominance_frontier(&self, node: NodeId) -> Result<&BTreeSet<NodeId>> {
        if !self.is_reachable(node) {
            return Err(Error::Unreachable(node.to_string()));
        }
        if let Some(frontier) = self.frontiers[node.index()].get() {
            return Ok(frontier);
        }

        // Children before parents: the reverse of a preorder over the
        // subtree, skipping subtrees whose frontiers are already known.
        let mut preorder = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            preorder.push(current);
            stack.extend(
                self.children(current)
                    .iter()
                    .filter(|c| self.frontiers[c.index()].get().is_none()),
            );
        }
        for &current in preorder.iter().rev() {
            self.frontiers[current.index()].get_or_init(|| self.local_frontier(current));
        }

        Ok(self.frontiers[node.index()].get_or_init(|| self.local_frontier(node)))
    }

    /// Frontier of `node` from its successors and its children's memoized
    /// frontiers.
    fn local_frontier(&self, node: NodeId) -> BTreeSet<NodeId> {
        let mut frontier = BTreeSet::new();
        for &succ in &self.successors[node.index()] {
            if self.is_reachable(succ) && self.immediate_dominator(succ) != Some(node) {
                frontier.insert(succ);
            }
        }
        for &child in self.children(node) {
            let Some(below) = self.frontiers[child.index()].get() else {
                continue;
            };
            for &w in below {
                if !self.strictly_dominates(node, w) {
                    frontier.insert(w);
                }
            }
        }
        frontier
    }

    /// Materializes the dominator tree as a graph with edges `idom -> node`,
    /// rooted at the tree's root. Keys are taken from `cfg`, which must be the
    /// graph the tree was computed from.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphError`] if a node of the tree has no key in `cfg`.
    pub fn as_graph<K: Clone + Eq + Hash>(&self, cfg: &DirectedGraph<K>) -> Result<DirectedGraph<K>> {
        let key_of = |node: NodeId| {
            cfg.key(node)
                .cloned()
                .ok_or_else(|| Error::GraphError(format!("{} is not part of the graph", node)))
        };

        let mut graph = DirectedGraph::with_capacity(self.spanning.len());
        for node in self.spanning.iter() {
            graph.add_node(key_of(node)?)?;
        }
        for node in self.spanning.iter() {
            if let Some(idom) = self.immediate_dominator(node) {
                graph.add_edge(&key_of(idom)?, &key_of(node)?)?;
            }
        }
        graph.set_root(&key_of(self.root())?)?;
        Ok(graph)
    }
}

/// Iterator over dominators of a node, from the node up to the root.
pub struct DominatorIterator<'a> {
    tree: &'a DominatorTree,
    current: Option<NodeId>,
}

impl Iterator for DominatorIterator<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.tree.immediate_dominator(current);
        Some(current)
    }
}

/// Computes the dominator tree of a rooted graph.
///
/// # Errors
///
/// Returns [`Error::GraphError`] if the graph has no root.
///
/// # Complexity
///
/// - Time: O(E log V) with the path compression used here
/// - Space: O(V)
pub fn compute_dominators<G: RootedGraph>(graph: &G) -> Result<DominatorTree> {
    let spanning = DfsSpanningTree::new(graph)?;
    let bound = graph.node_bound();

    let mut lt = LengauerTarjan::new(&spanning, bound);
    lt.compute(graph);
    let idom = lt.idom;

    let mut children = vec![Vec::new(); bound];
    for node in spanning.iter() {
        if let Some(parent) = idom[node.index()] {
            children[parent.index()].push(node);
        }
    }

    let mut successors = vec![Vec::new(); bound];
    for node in graph.node_ids() {
        successors[node.index()] = graph.successors(node).collect();
    }

    Ok(DominatorTree {
        spanning,
        idom,
        children,
        successors,
        frontiers: (0..bound).map(|_| OnceCell::new()).collect(),
    })
}

/// Transient construction state.
struct LengauerTarjan<'t> {
    tree: &'t DfsSpanningTree,
    /// Semidominator per node
    semi: Vec<Option<NodeId>>,
    /// Forest link used by the ancestor-with-lowest-semi search
    ancestor: Vec<Option<NodeId>>,
    /// Node with the lowest semidominator on the compressed path
    best: Vec<NodeId>,
    /// Deferred immediate dominator: same as this node's
    samedom: Vec<Option<NodeId>>,
    idom: Vec<Option<NodeId>>,
    /// Nodes whose semidominator is this node
    bucket: Vec<Vec<NodeId>>,
}

impl<'t> LengauerTarjan<'t> {
    fn new(tree: &'t DfsSpanningTree, bound: usize) -> Self {
        LengauerTarjan {
            tree,
            semi: vec![None; bound],
            ancestor: vec![None; bound],
            best: (0..bound).map(NodeId::new).collect(),
            samedom: vec![None; bound],
            idom: vec![None; bound],
            bucket: vec![Vec::new(); bound],
        }
    }

    fn dfnum(&self, node: NodeId) -> usize {
        self.tree.dfnum(node).unwrap_or(usize::MAX)
    }

    fn semi_dfnum(&self, node: NodeId) -> usize {
        self.semi[node.index()].map_or(usize::MAX, |s| self.dfnum(s))
    }

    fn compute<G: Predecessors>(&mut self, graph: &G) {
        let order: Vec<NodeId> = self.tree.iter().collect();

        for &n in order.iter().skip(1).rev() {
            let Some(parent) = self.tree.parent(n) else {
                continue;
            };

            let mut s = parent;
            for pred in graph.predecessors(n) {
                if !self.tree.contains(pred) {
                    continue;
                }
                let candidate = if self.dfnum(pred) <= self.dfnum(n) {
                    pred
                } else {
                    let lowest = self.ancestor_with_lowest_semi(pred);
                    self.semi[lowest.index()].unwrap_or(lowest)
                };
                if self.dfnum(candidate) < self.dfnum(s) {
                    s = candidate;
                }
            }

            self.semi[n.index()] = Some(s);
            self.bucket[s.index()].push(n);
            self.link(parent, n);

            for v in std::mem::take(&mut self.bucket[parent.index()]) {
                let y = self.ancestor_with_lowest_semi(v);
                if self.semi[y.index()] == self.semi[v.index()] {
                    self.idom[v.index()] = Some(parent);
                } else {
                    self.samedom[v.index()] = Some(y);
                }
            }
        }

        for &n in order.iter().skip(1) {
            if let Some(same) = self.samedom[n.index()] {
                self.idom[n.index()] = self.idom[same.index()];
            }
        }
    }

    fn link(&mut self, parent: NodeId, node: NodeId) {
        self.ancestor[node.index()] = Some(parent);
        self.best[node.index()] = node;
    }

    fn ancestor_with_lowest_semi(&mut self, v: NodeId) -> NodeId {
        if self.ancestor[v.index()].is_none() {
            return v;
        }

        // Walk up to the last node below the forest root, then compress
        // from the top down.
        let mut path = Vec::new();
        let mut current = v;
        while let Some(a) = self.ancestor[current.index()] {
            if self.ancestor[a.index()].is_none() {
                break;
            }
            path.push(current);
            current = a;
        }

        for &w in path.iter().rev() {
            let Some(a) = self.ancestor[w.index()] else {
                continue;
            };
            self.ancestor[w.index()] = self.ancestor[a.index()];
            let b = self.best[a.index()];
            if self.semi_dfnum(b) < self.semi_dfnum(self.best[w.index()]) {
                self.best[w.index()] = b;
            }
        }
        self.best[v.index()]
    }
}
