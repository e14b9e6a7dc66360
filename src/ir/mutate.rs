//! Structural mutation of the IR tree.
//!
//! Every operation here keeps parent links consistent: a node listed by a
//! parent points back at it, and a detached node has no parent. Def/use links
//! are only touched when nodes are discarded (uses are unlinked from their
//! definition) or cloned with [`CloneTags::DEF`].
//!
//! Moving a subtree is `pluck` followed by reattachment; deleting it is
//! `discard`, which frees every slot of the subtree.

use crate::{
    ir::{CloneTags, CntrId, Expr, ExprId, ExprParent, Function, StmtId, StmtKind},
    Result,
};

impl Function {
    // ---------------------------------------------------------------------
    // Navigation
    // ---------------------------------------------------------------------

    /// Returns the position of `id` in its parent's operand or expression list.
    #[must_use]
    pub fn slot_of(&self, id: ExprId) -> Option<usize> {
        match self[id].parent? {
            ExprParent::Expr(parent) => self[parent].operands.iter().position(|&o| o == id),
            ExprParent::Stmt(stmt) => self[stmt].expressions.iter().position(|&e| e == id),
        }
    }

    /// Returns the statement that (transitively) owns `id`.
    #[must_use]
    pub fn stmt_of(&self, id: ExprId) -> Option<StmtId> {
        let mut current = id;
        loop {
            match self[current].parent? {
                ExprParent::Expr(parent) => current = parent,
                ExprParent::Stmt(stmt) => return Some(stmt),
            }
        }
    }

    /// Returns the topmost expression of the tree containing `id`.
    #[must_use]
    pub fn top_of(&self, id: ExprId) -> ExprId {
        let mut current = id;
        while let Some(ExprParent::Expr(parent)) = self[current].parent {
            current = parent;
        }
        current
    }

    /// Returns the parent expression of `id`, if its parent is an expression.
    #[must_use]
    pub fn parent_expr(&self, id: ExprId) -> Option<ExprId> {
        match self[id].parent? {
            ExprParent::Expr(parent) => Some(parent),
            ExprParent::Stmt(_) => None,
        }
    }

    /// Returns the operands below `id` (excluding `id` itself).
    ///
    /// With `depth_first` the operands come in post-order, children before
    /// their parent; otherwise in breadth-first order.
    #[must_use]
    pub fn iter_operands(&self, id: ExprId, depth_first: bool) -> Vec<ExprId> {
        let mut out = Vec::new();
        if depth_first {
            for &op in &self[id].operands {
                self.post_order_into(op, &mut out);
            }
        } else {
            let mut queue: std::collections::VecDeque<ExprId> =
                self[id].operands.iter().copied().collect();
            while let Some(current) = queue.pop_front() {
                out.push(current);
                queue.extend(self[current].operands.iter().copied());
            }
        }
        out
    }

    /// Post-order of the tree rooted at `id`, including `id` last.
    #[must_use]
    pub fn post_order(&self, id: ExprId) -> Vec<ExprId> {
        let mut out = Vec::new();
        self.post_order_into(id, &mut out);
        out
    }

    fn post_order_into(&self, id: ExprId, out: &mut Vec<ExprId>) {
        for &op in &self[id].operands {
            self.post_order_into(op, out);
        }
        out.push(id);
    }

    /// Collects every expression reachable from `cntr` (statements and nested
    /// containers included), in statement order with each tree in pre-order.
    #[must_use]
    pub fn exprs_in(&self, cntr: CntrId) -> Vec<ExprId> {
        let mut out = Vec::new();
        self.exprs_in_into(cntr, &mut out);
        out
    }

    fn exprs_in_into(&self, cntr: CntrId, out: &mut Vec<ExprId>) {
        for &stmt in &self[cntr].statements {
            for &expr in &self[stmt].expressions {
                let mut stack = vec![expr];
                while let Some(current) = stack.pop() {
                    out.push(current);
                    stack.extend(self[current].operands.iter().rev());
                }
            }
            for child in self[stmt].containers() {
                self.exprs_in_into(child, out);
            }
        }
    }

    // ---------------------------------------------------------------------
    // Comparison
    // ---------------------------------------------------------------------

    /// Structural equality including SSA subscripts.
    #[must_use]
    pub fn equals(&self, a: ExprId, b: ExprId) -> bool {
        self.compare(a, b, true)
    }

    /// Structural equality ignoring SSA subscripts.
    #[must_use]
    pub fn like(&self, a: ExprId, b: ExprId) -> bool {
        self.compare(a, b, false)
    }

    fn compare(&self, a: ExprId, b: ExprId, with_index: bool) -> bool {
        let (ea, eb) = (&self[a], &self[b]);
        if ea.kind != eb.kind || ea.operands.len() != eb.operands.len() {
            return false;
        }
        if with_index && ea.idx != eb.idx {
            return false;
        }
        ea.operands
            .iter()
            .zip(&eb.operands)
            .all(|(&x, &y)| self.compare(x, y, with_index))
    }

    // ---------------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------------

    /// Deep-copies the tree rooted at `id`, carrying over the named tags.
    ///
    /// The copy is detached and is never a definition position. With
    /// [`CloneTags::DEF`] every copied use is registered as an additional use of
    /// its definition.
    pub fn clone_expr(&mut self, id: ExprId, tags: CloneTags) -> ExprId {
        let source = &self[id];
        let kind = source.kind.clone();
        let idx = source.idx;
        let def = source.def;
        let safe = source.safe;
        let weak = source.weak;
        let operands = source.operands.clone();

        let copied: Vec<ExprId> = operands
            .into_iter()
            .map(|op| self.clone_expr(op, tags))
            .collect();

        let mut expr = Expr::new(kind, copied);
        if tags.contains(CloneTags::INDEX) {
            expr.idx = idx;
        }
        if tags.contains(CloneTags::SAFE) {
            expr.safe = safe;
        }
        if tags.contains(CloneTags::WEAK) {
            expr.weak = weak;
        }
        let new = self.alloc_expr(expr);

        if tags.contains(CloneTags::DEF) {
            if let Some(def) = def.filter(|&d| self.get_expr(d).is_some()) {
                self[new].def = Some(def);
                self[def].uses.push(new);
            }
        }
        new
    }

    /// Puts `new` in the position `old` occupies; `old` becomes detached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if `old` is
    /// detached or `new` is owned elsewhere.
    pub fn replace_expr(&mut self, old: ExprId, new: ExprId) -> Result<()> {
        if self[new].parent.is_some() {
            return Err(malformed_error!("replacement {:?} is already owned", new));
        }
        let (parent, slot) = match (self[old].parent, self.slot_of(old)) {
            (Some(parent), Some(slot)) => (parent, slot),
            _ => return Err(malformed_error!("cannot replace detached expression {:?}", old)),
        };

        match parent {
            ExprParent::Expr(p) => self[p].operands[slot] = new,
            ExprParent::Stmt(s) => self[s].expressions[slot] = new,
        }
        self[new].parent = Some(parent);
        self[old].parent = None;
        Ok(())
    }

    /// Detaches `id` from its parent and returns it for reattachment.
    ///
    /// Siblings after it shift down by one. Def/use links are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if `id` is detached.
    pub fn pluck_expr(&mut self, id: ExprId) -> Result<ExprId> {
        let (parent, slot) = match (self[id].parent, self.slot_of(id)) {
            (Some(parent), Some(slot)) => (parent, slot),
            _ => return Err(malformed_error!("cannot pluck detached expression {:?}", id)),
        };

        match parent {
            ExprParent::Expr(p) => {
                self[p].operands.remove(slot);
            }
            ExprParent::Stmt(s) => {
                self[s].expressions.remove(slot);
            }
        }
        self[id].parent = None;
        Ok(id)
    }

    /// Frees the tree rooted at `id`, detaching it first if needed.
    ///
    /// Uses inside the tree are unlinked from their definitions. Definitions
    /// inside the tree are unregistered; any uses they still had lose their
    /// `def` link.
    pub fn discard_expr(&mut self, id: ExprId) {
        if self.get_expr(id).is_none() {
            return;
        }
        if self[id].parent.is_some() {
            // Cannot fail: the node is attached.
            let _ = self.pluck_expr(id);
        }

        for node in self.post_order(id) {
            let Some(expr) = self.exprs[node.0].take() else {
                continue;
            };
            if let Some(def) = expr.def {
                if let Some(Some(d)) = self.exprs.get_mut(def.0) {
                    d.uses.retain(|&u| u != node);
                }
            }
            if expr.is_def {
                self.defs.remove(&node);
                for used in expr.uses {
                    if let Some(Some(u)) = self.exprs.get_mut(used.0) {
                        log::debug!("use {:?} lost its definition {:?}", used, node);
                        u.def = None;
                    }
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------------

    /// Appends an expression to a statement.
    pub fn push_expr(&mut self, stmt: StmtId, expr: ExprId) -> Result<()> {
        if self[expr].parent.is_some() {
            return Err(malformed_error!("expression {:?} is already owned", expr));
        }
        self[stmt].expressions.push(expr);
        self[expr].parent = Some(ExprParent::Stmt(stmt));
        Ok(())
    }

    /// Inserts `expr` as a new statement directly after the statement owning
    /// `existing`, in the same container. Used to hoist side effects out of a
    /// statement that is about to be removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Malformed`](crate::Error::Malformed) if `existing` is
    /// not inside a statement that sits in a container.
    pub fn push_expr_after(&mut self, expr: ExprId, existing: ExprId) -> Result<StmtId> {
        let anchor = self
            .stmt_of(existing)
            .ok_or_else(|| malformed_error!("expression {:?} has no statement", existing))?;
        let cntr = self[anchor]
            .parent
            .ok_or_else(|| malformed_error!("statement {:?} has no container", anchor))?;
        let pos = self.stmt_slot(cntr, anchor)?;

        let address = self[anchor].address;
        let stmt = self.alloc_stmt(StmtKind::Expr, address, vec![expr], Vec::new());
        self[cntr].statements.insert(pos + 1, stmt);
        self[stmt].parent = Some(cntr);
        Ok(stmt)
    }

    /// Removes and frees a top-level expression of `stmt`.
    ///
    /// An expression statement left without expressions is removed from its
    /// container and freed as well; the return value reports whether that
    /// happened.
    pub fn remove_expr(&mut self, stmt: StmtId, expr: ExprId) -> Result<bool> {
        if self[expr].parent != Some(ExprParent::Stmt(stmt)) {
            return Err(malformed_error!("{:?} is not an expression of {:?}", expr, stmt));
        }
        self.discard_expr(expr);

        let emptied = self[stmt].kind == StmtKind::Expr && self[stmt].expressions.is_empty();
        if emptied {
            self.pluck_stmt(stmt, true)?;
        }
        Ok(emptied)
    }

    /// Attaches a container to a statement's next container slot.
    pub fn push_cntr(&mut self, stmt: StmtId, cntr: CntrId) -> Result<()> {
        if self[cntr].parent.is_some() {
            return Err(malformed_error!("container {:?} is already owned", cntr));
        }
        self[stmt].containers.push(Some(cntr));
        self[cntr].parent = Some(stmt);
        Ok(())
    }

    /// Swaps `old` for the detached statement `new` at the same position.
    pub fn replace_stmt(&mut self, old: StmtId, new: StmtId) -> Result<()> {
        if self[new].parent.is_some() {
            return Err(malformed_error!("replacement {:?} is already owned", new));
        }
        let cntr = self[old]
            .parent
            .ok_or_else(|| malformed_error!("cannot replace detached statement {:?}", old))?;
        let pos = self.stmt_slot(cntr, old)?;

        self[cntr].statements[pos] = new;
        self[new].parent = Some(cntr);
        self[old].parent = None;
        Ok(())
    }

    /// Removes `stmt` from its container.
    ///
    /// With `detach`, the statement and everything it owns is freed; otherwise
    /// it stays alive for reattachment. A statement that is already detached is
    /// only freed.
    pub fn pluck_stmt(&mut self, stmt: StmtId, detach: bool) -> Result<()> {
        if let Some(cntr) = self[stmt].parent {
            let pos = self.stmt_slot(cntr, stmt)?;
            self[cntr].statements.remove(pos);
            self[stmt].parent = None;
        }
        if detach {
            self.discard_stmt(stmt);
        }
        Ok(())
    }

    fn discard_stmt(&mut self, stmt: StmtId) {
        let Some(statement) = self.stmts.get_mut(stmt.0).and_then(Option::take) else {
            return;
        };
        for expr in statement.expressions {
            if let Some(e) = self.exprs.get_mut(expr.0).and_then(Option::as_mut) {
                e.parent = None;
            }
            self.discard_expr(expr);
        }
        for cntr in statement.containers.into_iter().flatten() {
            self.discard_cntr(cntr);
        }
    }

    fn stmt_slot(&self, cntr: CntrId, stmt: StmtId) -> Result<usize> {
        self[cntr]
            .statements
            .iter()
            .position(|&s| s == stmt)
            .ok_or_else(|| malformed_error!("{:?} is not listed by {:?}", stmt, cntr))
    }

    // ---------------------------------------------------------------------
    // Containers
    // ---------------------------------------------------------------------

    /// Appends a detached statement to a container.
    pub fn push_stmt(&mut self, cntr: CntrId, stmt: StmtId) -> Result<()> {
        if self[stmt].parent.is_some() {
            return Err(malformed_error!("statement {:?} is already owned", stmt));
        }
        self[cntr].statements.push(stmt);
        self[stmt].parent = Some(cntr);
        Ok(())
    }

    /// Prepends a detached statement to a container.
    pub fn unshift_stmt(&mut self, cntr: CntrId, stmt: StmtId) -> Result<()> {
        if self[stmt].parent.is_some() {
            return Err(malformed_error!("statement {:?} is already owned", stmt));
        }
        self[cntr].statements.insert(0, stmt);
        self[stmt].parent = Some(cntr);
        Ok(())
    }

    /// Sets the container control falls into after `cntr`.
    pub fn set_fallthrough(&mut self, cntr: CntrId, next: Option<CntrId>) {
        self[cntr].fallthrough = next;
    }

    /// Returns the last statement of `cntr` if it ends straight-line flow.
    #[must_use]
    pub fn terminator(&self, cntr: CntrId) -> Option<StmtId> {
        let last = *self[cntr].statements.last()?;
        self[last].kind.is_terminator().then_some(last)
    }

    /// Detaches `cntr` from its owning statement, leaving the slot empty so
    /// positional accessors keep their meaning.
    ///
    /// With `detach`, the container and its contents are freed.
    pub fn pluck_cntr(&mut self, cntr: CntrId, detach: bool) -> Result<()> {
        if let Some(stmt) = self[cntr].parent {
            let slot = self[stmt]
                .containers
                .iter_mut()
                .find(|c| **c == Some(cntr))
                .ok_or_else(|| malformed_error!("{:?} is not owned by {:?}", cntr, stmt))?;
            *slot = None;
            self[cntr].parent = None;
        }
        if detach {
            self.discard_cntr(cntr);
        }
        Ok(())
    }

    /// Moves every statement of `from` to the end of `into`.
    pub fn move_stmts(&mut self, from: CntrId, into: CntrId) {
        let moved = std::mem::take(&mut self[from].statements);
        for &stmt in &moved {
            self[stmt].parent = Some(into);
        }
        self[into].statements.extend(moved);
    }

    fn discard_cntr(&mut self, cntr: CntrId) {
        let Some(container) = self.cntrs.get_mut(cntr.0).and_then(Option::take) else {
            return;
        };
        for stmt in container.statements {
            if let Some(s) = self.stmts.get_mut(stmt.0).and_then(Option::as_mut) {
                s.parent = None;
            }
            self.discard_stmt(stmt);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{BinaryOp, Function};

    use super::*;

    fn sample() -> (Function, CntrId, StmtId, ExprId) {
        // eax_1 = ebx_0 + 4
        let mut f = Function::new(0x100);
        let block = f.add_block(0x100, None, None).unwrap();
        let lhs = f.reg_ssa("eax", 32, 1);
        let ebx = f.reg_ssa("ebx", 32, 0);
        let four = f.val(4, 32);
        let sum = f.binary(BinaryOp::Add, ebx, four);
        let assign = f.assign(lhs, sum);
        let stmt = f.expr_stmt(0x100, assign);
        f.push_stmt(block, stmt).unwrap();
        (f, block, stmt, sum)
    }

    #[test]
    fn test_replace_expr_moves_parent() {
        let (mut f, _, _, sum) = sample();
        let assign = f.parent_expr(sum).unwrap();
        let seven = f.val(7, 32);

        f.replace_expr(sum, seven).unwrap();
        assert_eq!(f[assign].operand(1), Some(seven));
        assert_eq!(f[seven].parent(), Some(ExprParent::Expr(assign)));
        assert_eq!(f[sum].parent(), None);
        assert!(f.replace_expr(sum, seven).is_err());
    }

    #[test]
    fn test_pluck_expr_shifts_siblings() {
        let mut f = Function::new(0);
        let a = f.val(1, 8);
        let b = f.val(2, 8);
        let c = f.val(3, 8);
        let phi = f.phi(&[a, b, c]);

        f.pluck_expr(a).unwrap();
        assert_eq!(f[phi].operands(), &[b, c]);
        assert_eq!(f.slot_of(c), Some(1));
        assert_eq!(f[a].parent(), None);
    }

    #[test]
    fn test_clone_expr_tags() {
        let (mut f, _, _, sum) = sample();
        let ebx = f[sum].operand(0).unwrap();
        let def = f.reg_ssa("ebx", 32, 0);
        f[def].is_def = true;
        f[ebx].def = Some(def);
        f[def].uses.push(ebx);

        let plain = f.clone_expr(sum, CloneTags::empty());
        assert!(f.like(plain, sum));
        assert!(!f.equals(plain, sum));
        assert_eq!(f[f[plain].operand(0).unwrap()].def(), None);

        let tracked = f.clone_expr(sum, CloneTags::all());
        assert!(f.equals(tracked, sum));
        assert_eq!(f[def].uses().len(), 2);
    }

    #[test]
    fn test_discard_unlinks_uses() {
        let (mut f, _, _, sum) = sample();
        let ebx = f[sum].operand(0).unwrap();
        let def = f.reg_ssa("ebx", 32, 0);
        f[def].is_def = true;
        f[ebx].def = Some(def);
        f[def].uses.push(ebx);

        f.discard_expr(sum);
        assert!(f.get_expr(sum).is_none());
        assert!(f.get_expr(ebx).is_none());
        assert!(f[def].uses().is_empty());
    }

    #[test]
    fn test_push_expr_after_inserts_statement() {
        let (mut f, block, stmt, sum) = sample();
        let target = f.val(0x500, 64);
        let call = f.call(target, &[]);

        let hoisted = f.push_expr_after(call, sum).unwrap();
        assert_eq!(f[block].statements(), &[stmt, hoisted]);
        assert_eq!(f.stmt_of(call), Some(hoisted));
        assert_eq!(f[hoisted].address(), 0x100);
    }

    #[test]
    fn test_remove_expr_plucks_empty_statement() {
        let (mut f, block, stmt, sum) = sample();
        let assign = f.top_of(sum);

        assert!(f.remove_expr(stmt, assign).unwrap());
        assert!(f[block].is_empty());
        assert!(f.get_stmt(stmt).is_none());
        assert!(f.get_expr(sum).is_none());
    }

    #[test]
    fn test_remove_expr_keeps_valueless_return() {
        let mut f = Function::new(0);
        let block = f.add_block(0, None, None).unwrap();
        let value = f.val(0, 32);
        let ret = f.return_stmt(0, Some(value));
        f.push_stmt(block, ret).unwrap();

        assert!(!f.remove_expr(ret, value).unwrap());
        assert_eq!(f[block].statements(), &[ret]);
        assert_eq!(f[ret].value(), None);
    }

    #[test]
    fn test_statement_replace_and_pluck() {
        let (mut f, block, stmt, _) = sample();
        let brk = f.break_stmt(0x104);
        let ret = f.return_stmt(0x108, None);

        f.replace_stmt(stmt, brk).unwrap();
        assert_eq!(f[block].statements(), &[brk]);
        assert_eq!(f[stmt].parent(), None);

        f.unshift_stmt(block, stmt).unwrap();
        f.push_stmt(block, ret).unwrap();
        assert_eq!(f[block].statements(), &[stmt, brk, ret]);
        assert_eq!(f.terminator(block), Some(ret));

        f.pluck_stmt(brk, false).unwrap();
        assert!(f.get_stmt(brk).is_some());
        f.pluck_stmt(stmt, true).unwrap();
        assert!(f.get_stmt(stmt).is_none());
        assert_eq!(f[block].statements(), &[ret]);
    }

    #[test]
    fn test_pluck_cntr_keeps_positions() {
        let mut f = Function::new(0);
        let cond = f.val(1, 1);
        let then = f.new_container(0x10);
        let otherwise = f.new_container(0x20);
        let stmt = f.if_stmt(0, cond, then, Some(otherwise));
        let inner = f.break_stmt(0x10);
        f.push_stmt(then, inner).unwrap();

        f.pluck_cntr(then, true).unwrap();
        assert_eq!(f[stmt].body(), None);
        assert_eq!(f[stmt].else_body(), Some(otherwise));
        assert!(f.get_stmt(inner).is_none());
    }

    #[test]
    fn test_iter_operands_orders() {
        let (f, _, _, sum) = sample();
        let assign = f.top_of(sum);
        let lhs = f[assign].operand(0).unwrap();
        let ebx = f[sum].operand(0).unwrap();
        let four = f[sum].operand(1).unwrap();

        assert_eq!(f.iter_operands(assign, true), vec![lhs, ebx, four, sum]);
        assert_eq!(f.iter_operands(assign, false), vec![lhs, sum, ebx, four]);
    }
}
