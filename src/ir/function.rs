//! The per-function IR arena.
//!
//! A [`Function`] owns every expression, statement and container of one
//! function in three slot vectors. Nodes refer to each other by id, so parent
//! links and def/use links are plain indices. Discarding a node empties its slot
//! and the slot is never reused: a stale id can be detected with the `get_*`
//! accessors, while indexing with one panics.
//!
//! Basic blocks are kept in address order. Each block owns one container
//! populated by the instruction decoder and records the addresses of its taken
//! (`jump`) and fall-through (`fail`) successors.

use std::{
    collections::{BTreeMap, BTreeSet},
    ops::{Index, IndexMut},
};

use crate::{
    ir::{
        CntrId, Container, Expr, ExprId, ExprKind, ExprParent, Statement, StmtId, StmtKind,
        UnaryOp, BinaryOp,
    },
    utils::graph::DirectedGraph,
    Error, Result,
};

/// A basic block of the function's control flow graph.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) address: u64,
    pub(crate) container: CntrId,
    pub(crate) jump: Option<u64>,
    pub(crate) fail: Option<u64>,
    pub(crate) next: Option<u64>,
    pub(crate) is_entry: bool,
    pub(crate) unresolved: bool,
}

impl BasicBlock {
    /// Start address, which is also the block's key.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The container holding the block's statements.
    #[must_use]
    pub fn container(&self) -> CntrId {
        self.container
    }

    /// Address of the taken successor.
    #[must_use]
    pub fn jump(&self) -> Option<u64> {
        self.jump
    }

    /// Address of the fall-through successor.
    #[must_use]
    pub fn fail(&self) -> Option<u64> {
        self.fail
    }

    /// Continuation chosen by the structurer.
    #[must_use]
    pub fn next(&self) -> Option<u64> {
        self.next
    }

    /// Is this the function's entry block?
    #[must_use]
    pub fn is_entry(&self) -> bool {
        self.is_entry
    }

    /// A block without successors leaves the function.
    #[must_use]
    pub fn is_exit(&self) -> bool {
        self.jump.is_none() && self.fail.is_none()
    }

    /// Was the block's terminating jump left unresolved by the structurer?
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.unresolved
    }
}

/// The IR of one function.
///
/// # Examples
///
/// ```rust,ignore
/// use decompcore::ir::{BinaryOp, Function};
///
/// let mut func = Function::new(0x401000);
/// let entry = func.add_block(0x401000, None, None)?;
///
/// // eax_1 = 3 + 4
/// let lhs = func.reg_ssa("eax", 32, 1);
/// let three = func.val(3, 32);
/// let four = func.val(4, 32);
/// let sum = func.binary(BinaryOp::Add, three, four);
/// let assign = func.assign(lhs, sum);
/// let stmt = func.expr_stmt(0x401000, assign);
/// func.push_stmt(entry, stmt)?;
/// ```
#[derive(Debug, Clone)]
pub struct Function {
    address: u64,
    name: Option<String>,
    pub(crate) exprs: Vec<Option<Expr>>,
    pub(crate) stmts: Vec<Option<Statement>>,
    pub(crate) cntrs: Vec<Option<Container>>,
    pub(crate) blocks: BTreeMap<u64, BasicBlock>,
    entry: Option<u64>,
    /// Registered definitions
    pub(crate) defs: BTreeSet<ExprId>,
    /// Holds the implicit definitions of values read before being written
    pub(crate) uninit: CntrId,
    /// Structured body, set by the pipeline after structuring
    pub(crate) body: Option<CntrId>,
}

impl Function {
    /// Creates an empty function starting at `address`.
    #[must_use]
    pub fn new(address: u64) -> Self {
        Function {
            address,
            name: None,
            exprs: Vec::new(),
            stmts: Vec::new(),
            cntrs: vec![Some(Container::new(address))],
            blocks: BTreeMap::new(),
            entry: None,
            defs: BTreeSet::new(),
            uninit: CntrId(0),
            body: None,
        }
    }

    /// Function start address.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Symbolic name, if one was assigned.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Assigns a symbolic name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// The container holding implicit definitions for undefined uses.
    #[must_use]
    pub fn uninit_container(&self) -> CntrId {
        self.uninit
    }

    /// The structured body produced by the pipeline.
    #[must_use]
    pub fn body(&self) -> Option<CntrId> {
        self.body
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    /// Adds a basic block and returns its (empty) container.
    ///
    /// The first block added becomes the entry unless [`set_entry`](Self::set_entry)
    /// is called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] if a block already starts at `address`.
    pub fn add_block(&mut self, address: u64, jump: Option<u64>, fail: Option<u64>) -> Result<CntrId> {
        if self.blocks.contains_key(&address) {
            return Err(malformed_error!(
                "duplicate block at {:#x} in function {:#x}",
                address,
                self.address
            ));
        }

        let container = self.new_container(address);
        let is_entry = self.entry.is_none();
        if is_entry {
            self.entry = Some(address);
        }
        self.blocks.insert(
            address,
            BasicBlock {
                address,
                container,
                jump,
                fail,
                next: None,
                is_entry,
                unresolved: false,
            },
        );
        Ok(container)
    }

    /// Marks the block at `address` as the entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingBlock`] if no block starts at `address`.
    pub fn set_entry(&mut self, address: u64) -> Result<()> {
        if !self.blocks.contains_key(&address) {
            return Err(Error::MissingBlock {
                function: self.address,
                target: address,
            });
        }
        for block in self.blocks.values_mut() {
            block.is_entry = block.address == address;
        }
        self.entry = Some(address);
        Ok(())
    }

    /// Entry block address.
    #[must_use]
    pub fn entry(&self) -> Option<u64> {
        self.entry
    }

    /// Returns the block starting at `address`.
    #[must_use]
    pub fn block(&self, address: u64) -> Option<&BasicBlock> {
        self.blocks.get(&address)
    }

    pub(crate) fn block_mut(&mut self, address: u64) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(&address)
    }

    /// Iterates over the blocks in ascending address order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> + '_ {
        self.blocks.values()
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Builds the control flow graph, keyed by block address and rooted at the entry.
    ///
    /// Successor addresses that do not start a block of this function are left
    /// out; the structurer reports them separately.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`] for a function without blocks.
    pub fn cfg(&self) -> Result<DirectedGraph<u64>> {
        let Some(entry) = self.entry else {
            return Err(malformed_error!("function {:#x} has no blocks", self.address));
        };

        let mut graph = DirectedGraph::with_capacity(self.blocks.len());
        for &address in self.blocks.keys() {
            graph.add_node(address)?;
        }
        for block in self.blocks.values() {
            for target in [block.jump, block.fail].into_iter().flatten() {
                if graph.contains(&target) {
                    graph.add_edge(&block.address, &target)?;
                } else {
                    log::debug!(
                        "function {:#x}: edge {:#x} -> {:#x} leaves the function",
                        self.address,
                        block.address,
                        target
                    );
                }
            }
        }
        graph.set_root(&entry)?;
        Ok(graph)
    }

    // ---------------------------------------------------------------------
    // Arena access
    // ---------------------------------------------------------------------

    /// Returns the expression behind `id`, or `None` if it was discarded.
    #[must_use]
    pub fn get_expr(&self, id: ExprId) -> Option<&Expr> {
        self.exprs.get(id.0).and_then(Option::as_ref)
    }

    /// Returns the statement behind `id`, or `None` if it was discarded.
    #[must_use]
    pub fn get_stmt(&self, id: StmtId) -> Option<&Statement> {
        self.stmts.get(id.0).and_then(Option::as_ref)
    }

    /// Returns the container behind `id`, or `None` if it was discarded.
    #[must_use]
    pub fn get_cntr(&self, id: CntrId) -> Option<&Container> {
        self.cntrs.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live expressions.
    #[must_use]
    pub fn expr_count(&self) -> usize {
        self.exprs.iter().flatten().count()
    }

    // ---------------------------------------------------------------------
    // Expression constructors
    // ---------------------------------------------------------------------

    pub(crate) fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId(self.exprs.len());
        for &op in &expr.operands {
            debug_assert!(self[op].parent.is_none(), "operand {:?} is already owned", op);
            self[op].parent = Some(ExprParent::Expr(id));
        }
        self.exprs.push(Some(expr));
        id
    }

    /// A register without SSA subscript.
    pub fn reg(&mut self, name: impl Into<String>, size: u32) -> ExprId {
        self.alloc_expr(Expr::new(
            ExprKind::Reg {
                name: name.into(),
                size,
            },
            Vec::new(),
        ))
    }

    /// A register with SSA subscript `idx`.
    pub fn reg_ssa(&mut self, name: impl Into<String>, size: u32, idx: u32) -> ExprId {
        let id = self.reg(name, size);
        self[id].idx = Some(idx);
        id
    }

    /// A literal, masked to `size` bits.
    pub fn val(&mut self, value: u64, size: u32) -> ExprId {
        self.alloc_expr(Expr::new(
            ExprKind::Val {
                value: value & width_mask(size),
                size,
            },
            Vec::new(),
        ))
    }

    /// A unary operation.
    pub fn unary(&mut self, op: UnaryOp, operand: ExprId) -> ExprId {
        self.alloc_expr(Expr::new(ExprKind::Unary(op), vec![operand]))
    }

    /// A memory dereference.
    pub fn deref(&mut self, address: ExprId) -> ExprId {
        self.unary(UnaryOp::Deref, address)
    }

    /// A binary operation.
    pub fn binary(&mut self, op: BinaryOp, left: ExprId, right: ExprId) -> ExprId {
        self.alloc_expr(Expr::new(ExprKind::Binary(op), vec![left, right]))
    }

    /// A ternary conditional.
    pub fn tcond(&mut self, cond: ExprId, if_true: ExprId, if_false: ExprId) -> ExprId {
        self.alloc_expr(Expr::new(ExprKind::TCond, vec![cond, if_true, if_false]))
    }

    /// An assignment; the left-hand side becomes a definition position.
    pub fn assign(&mut self, lhs: ExprId, rhs: ExprId) -> ExprId {
        self[lhs].is_def = true;
        self.alloc_expr(Expr::new(ExprKind::Assign, vec![lhs, rhs]))
    }

    /// A phi node over the given incoming definitions.
    pub fn phi(&mut self, incoming: &[ExprId]) -> ExprId {
        self.alloc_expr(Expr::new(ExprKind::Phi, incoming.to_vec()))
    }

    /// A call of `target` with `args`.
    pub fn call(&mut self, target: ExprId, args: &[ExprId]) -> ExprId {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(target);
        operands.extend_from_slice(args);
        self.alloc_expr(Expr::new(ExprKind::Call, operands))
    }

    /// An opaque inline assembly line.
    pub fn asm(&mut self, text: impl Into<String>) -> ExprId {
        self.alloc_expr(Expr::new(ExprKind::Asm(text.into()), Vec::new()))
    }

    /// Sets or clears the SSA subscript of an expression.
    pub fn set_index(&mut self, id: ExprId, idx: Option<u32>) {
        self[id].idx = idx;
    }

    /// Marks a memory location as known not to alias.
    pub fn mark_safe(&mut self, id: ExprId) {
        self[id].safe = true;
    }

    // ---------------------------------------------------------------------
    // Statement and container constructors
    // ---------------------------------------------------------------------

    pub(crate) fn alloc_stmt(
        &mut self,
        kind: StmtKind,
        address: u64,
        expressions: Vec<ExprId>,
        containers: Vec<Option<CntrId>>,
    ) -> StmtId {
        let id = StmtId(self.stmts.len());
        for &expr in &expressions {
            debug_assert!(self[expr].parent.is_none(), "expression {:?} is already owned", expr);
            self[expr].parent = Some(ExprParent::Stmt(id));
        }
        for &cntr in containers.iter().flatten() {
            self[cntr].parent = Some(id);
        }

        let mut stmt = Statement::new(kind, address);
        stmt.expressions = expressions;
        stmt.containers = containers;
        self.stmts.push(Some(stmt));
        id
    }

    /// Creates an empty detached container.
    pub fn new_container(&mut self, address: u64) -> CntrId {
        let id = CntrId(self.cntrs.len());
        self.cntrs.push(Some(Container::new(address)));
        id
    }

    /// A bare expression statement.
    pub fn expr_stmt(&mut self, address: u64, expr: ExprId) -> StmtId {
        self.alloc_stmt(StmtKind::Expr, address, vec![expr], Vec::new())
    }

    /// An unconditional jump to `dest`.
    pub fn goto(&mut self, address: u64, dest: ExprId) -> StmtId {
        self.alloc_stmt(StmtKind::Goto, address, vec![dest], Vec::new())
    }

    /// A conditional jump.
    pub fn branch(&mut self, address: u64, cond: ExprId, taken: ExprId, not_taken: ExprId) -> StmtId {
        self.alloc_stmt(StmtKind::Branch, address, vec![cond, taken, not_taken], Vec::new())
    }

    /// A structured conditional.
    pub fn if_stmt(&mut self, address: u64, cond: ExprId, then: CntrId, otherwise: Option<CntrId>) -> StmtId {
        let mut containers = vec![Some(then)];
        if otherwise.is_some() {
            containers.push(otherwise);
        }
        self.alloc_stmt(StmtKind::If, address, vec![cond], containers)
    }

    /// A pre-tested loop.
    pub fn while_stmt(&mut self, address: u64, cond: ExprId, body: CntrId) -> StmtId {
        self.alloc_stmt(StmtKind::While, address, vec![cond], vec![Some(body)])
    }

    /// A post-tested loop.
    pub fn do_while(&mut self, address: u64, cond: ExprId, body: CntrId) -> StmtId {
        self.alloc_stmt(StmtKind::DoWhile, address, vec![cond], vec![Some(body)])
    }

    /// A loop exit.
    pub fn break_stmt(&mut self, address: u64) -> StmtId {
        self.alloc_stmt(StmtKind::Break, address, Vec::new(), Vec::new())
    }

    /// A loop continuation.
    pub fn continue_stmt(&mut self, address: u64) -> StmtId {
        self.alloc_stmt(StmtKind::Continue, address, Vec::new(), Vec::new())
    }

    /// A function return.
    pub fn return_stmt(&mut self, address: u64, value: Option<ExprId>) -> StmtId {
        self.alloc_stmt(StmtKind::Return, address, value.into_iter().collect(), Vec::new())
    }
}

/// Mask selecting the low `size` bits; unknown (`0`) and 64-bit widths keep everything.
#[must_use]
pub fn width_mask(size: u32) -> u64 {
    if size == 0 || size >= 64 {
        u64::MAX
    } else {
        (1u64 << size) - 1
    }
}

impl Index<ExprId> for Function {
    type Output = Expr;

    fn index(&self, id: ExprId) -> &Expr {
        match self.exprs.get(id.0) {
            Some(Some(expr)) => expr,
            _ => panic!("expression {:?} was discarded", id),
        }
    }
}

impl IndexMut<ExprId> for Function {
    fn index_mut(&mut self, id: ExprId) -> &mut Expr {
        match self.exprs.get_mut(id.0) {
            Some(Some(expr)) => expr,
            _ => panic!("expression {:?} was discarded", id),
        }
    }
}

impl Index<StmtId> for Function {
    type Output = Statement;

    fn index(&self, id: StmtId) -> &Statement {
        match self.stmts.get(id.0) {
            Some(Some(stmt)) => stmt,
            _ => panic!("statement {:?} was discarded", id),
        }
    }
}

impl IndexMut<StmtId> for Function {
    fn index_mut(&mut self, id: StmtId) -> &mut Statement {
        match self.stmts.get_mut(id.0) {
            Some(Some(stmt)) => stmt,
            _ => panic!("statement {:?} was discarded", id),
        }
    }
}

impl Index<CntrId> for Function {
    type Output = Container;

    fn index(&self, id: CntrId) -> &Container {
        match self.cntrs.get(id.0) {
            Some(Some(cntr)) => cntr,
            _ => panic!("container {:?} was discarded", id),
        }
    }
}

impl IndexMut<CntrId> for Function {
    fn index_mut(&mut self, id: CntrId) -> &mut Container {
        match self.cntrs.get_mut(id.0) {
            Some(Some(cntr)) => cntr,
            _ => panic!("container {:?} was discarded", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_mask() {
        assert_eq!(width_mask(8), 0xff);
        assert_eq!(width_mask(32), 0xffff_ffff);
        assert_eq!(width_mask(64), u64::MAX);
        assert_eq!(width_mask(0), u64::MAX);
    }

    #[test]
    fn test_constructors_link_parents() {
        let mut f = Function::new(0x1000);
        let a = f.reg("eax", 32);
        let b = f.val(0x1_0000_0001, 32);
        let sum = f.binary(BinaryOp::Add, a, b);
        let stmt = f.expr_stmt(0x1000, sum);

        assert_eq!(f[b].value(), Some((1, 32)));
        assert_eq!(f[a].parent(), Some(ExprParent::Expr(sum)));
        assert_eq!(f[sum].parent(), Some(ExprParent::Stmt(stmt)));
        assert_eq!(f[stmt].expressions(), &[sum]);
    }

    #[test]
    fn test_assign_marks_def() {
        let mut f = Function::new(0);
        let lhs = f.reg_ssa("ecx", 32, 2);
        let rhs = f.val(1, 32);
        let assign = f.assign(lhs, rhs);

        assert!(f[lhs].is_def());
        assert!(!f[rhs].is_def());
        assert_eq!(f[lhs].index(), Some(2));
        assert_eq!(f[assign].operands(), &[lhs, rhs]);
    }

    #[test]
    fn test_blocks_and_entry() {
        let mut f = Function::new(0x400);
        f.add_block(0x400, Some(0x420), Some(0x410)).unwrap();
        f.add_block(0x410, None, None).unwrap();
        f.add_block(0x420, Some(0x400), None).unwrap();

        assert_eq!(f.entry(), Some(0x400));
        assert!(f.block(0x400).unwrap().is_entry());
        assert!(f.block(0x410).unwrap().is_exit());
        assert!(f.add_block(0x410, None, None).is_err());
        assert!(matches!(
            f.set_entry(0x999),
            Err(Error::MissingBlock { target: 0x999, .. })
        ));

        let order: Vec<u64> = f.blocks().map(BasicBlock::address).collect();
        assert_eq!(order, vec![0x400, 0x410, 0x420]);
    }

    #[test]
    fn test_cfg_skips_foreign_targets() {
        let mut f = Function::new(0x400);
        f.add_block(0x400, Some(0x9000), Some(0x410)).unwrap();
        f.add_block(0x410, Some(0x400), None).unwrap();

        let cfg = f.cfg().unwrap();
        assert_eq!(cfg.root_key(), Some(&0x400));
        assert_eq!(cfg.edge_count(), 2);
        assert_eq!(cfg.successor_keys(&0x400).unwrap(), vec![0x410]);
    }

    #[test]
    fn test_cfg_requires_blocks() {
        let f = Function::new(0x400);
        assert!(matches!(f.cfg(), Err(Error::Malformed { .. })));
    }

    #[test]
    #[should_panic(expected = "was discarded")]
    fn test_index_discarded_panics() {
        let f = Function::new(0);
        let _ = &f[ExprId(3)];
    }
}
