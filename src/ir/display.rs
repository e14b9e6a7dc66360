//! Debug rendering of IR trees.
//!
//! The output is a compact C-like notation meant for logs, test assertions and
//! diagnostics. SSA subscripts are appended as `_N` (`eax_1`, `*(esp_0 + 8)_2`).
//! The textual emitter for end users is a separate concern.

use std::fmt::{self, Write};

use crate::ir::{CntrId, ExprId, ExprKind, Function, StmtId, StmtKind, UnaryOp};

/// Display adapter for an expression tree.
pub struct ExprDisplay<'a> {
    func: &'a Function,
    id: ExprId,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.func.render_expr(self.id, true, &mut out);
        f.write_str(&out)
    }
}

/// Display adapter for a container, one statement per line.
pub struct CntrDisplay<'a> {
    func: &'a Function,
    id: CntrId,
}

impl fmt::Display for CntrDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.func.render_cntr(self.id, 0, &mut out);
        f.write_str(&out)
    }
}

impl Function {
    /// Renders an expression tree.
    #[must_use]
    pub fn display_expr(&self, id: ExprId) -> ExprDisplay<'_> {
        ExprDisplay { func: self, id }
    }

    /// Renders a container and everything nested in it.
    #[must_use]
    pub fn display_cntr(&self, id: CntrId) -> CntrDisplay<'_> {
        CntrDisplay { func: self, id }
    }

    /// Renders a single statement (nested bodies included).
    #[must_use]
    pub fn stmt_to_string(&self, id: StmtId) -> String {
        let mut out = String::new();
        self.render_stmt(id, 0, &mut out);
        out
    }

    /// The storage location an expression names, without its own SSA subscript.
    ///
    /// `eax_3` and `eax_5` share the key `eax`; `*(esp_0 + 8)_1` has the key
    /// `*(esp_0 + 8)`. Definitions and uses are matched on key and subscript.
    #[must_use]
    pub fn location_key(&self, id: ExprId) -> String {
        let mut out = String::new();
        self.render_expr(id, false, &mut out);
        out
    }

    pub(crate) fn render_expr(&self, id: ExprId, subscript: bool, out: &mut String) {
        let Some(expr) = self.get_expr(id) else {
            out.push_str("<discarded>");
            return;
        };
        let ops = &expr.operands;

        match &expr.kind {
            ExprKind::Reg { name, .. } => out.push_str(name),
            ExprKind::Val { value, .. } => {
                if *value > 9 {
                    let _ = write!(out, "{:#x}", value);
                } else {
                    let _ = write!(out, "{}", value);
                }
            }
            // The subscript of a memory access binds to the whole access.
            ExprKind::Unary(UnaryOp::Deref) if subscript && expr.idx.is_some() => {
                out.push_str("*(");
                self.render_expr(ops[0], true, out);
                out.push(')');
            }
            ExprKind::Unary(op) => {
                let _ = write!(out, "{}", op);
                self.render_operand(ops[0], out);
            }
            ExprKind::Binary(op) => {
                self.render_operand(ops[0], out);
                let _ = write!(out, " {} ", op);
                self.render_operand(ops[1], out);
            }
            ExprKind::TCond => {
                self.render_operand(ops[0], out);
                out.push_str(" ? ");
                self.render_operand(ops[1], out);
                out.push_str(" : ");
                self.render_operand(ops[2], out);
            }
            ExprKind::Assign => {
                self.render_expr(ops[0], true, out);
                out.push_str(" = ");
                self.render_expr(ops[1], true, out);
            }
            ExprKind::Phi => {
                out.push_str("Φ(");
                self.render_list(ops, out);
                out.push(')');
            }
            ExprKind::Call => {
                self.render_operand(ops[0], out);
                out.push('(');
                self.render_list(&ops[1..], out);
                out.push(')');
            }
            ExprKind::Asm(text) => {
                let _ = write!(out, "__asm(\"{}\")", text);
            }
        }

        if subscript {
            if let Some(idx) = expr.idx {
                let _ = write!(out, "_{}", idx);
            }
        }
    }

    fn render_operand(&self, id: ExprId, out: &mut String) {
        let compound = self.get_expr(id).is_some_and(|e| {
            matches!(e.kind, ExprKind::Binary(_) | ExprKind::TCond | ExprKind::Assign)
                || (e.kind == ExprKind::Unary(UnaryOp::Deref) && e.idx.is_some())
        });
        if compound {
            out.push('(');
            self.render_expr(id, true, out);
            out.push(')');
        } else {
            self.render_expr(id, true, out);
        }
    }

    fn render_list(&self, ids: &[ExprId], out: &mut String) {
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.render_expr(id, true, out);
        }
    }

    fn render_cntr(&self, id: CntrId, depth: usize, out: &mut String) {
        let Some(cntr) = self.get_cntr(id) else {
            return;
        };
        for &stmt in &cntr.statements {
            self.render_stmt(stmt, depth, out);
        }
    }

    fn render_stmt(&self, id: StmtId, depth: usize, out: &mut String) {
        let Some(stmt) = self.get_stmt(id) else {
            return;
        };
        let indent = "    ".repeat(depth);
        let exprs = |out: &mut String| {
            let mut text = String::new();
            for (i, &e) in stmt.expressions.iter().enumerate() {
                if i > 0 {
                    text.push_str(", ");
                }
                self.render_expr(e, true, &mut text);
            }
            out.push_str(&text);
        };

        out.push_str(&indent);
        match stmt.kind {
            StmtKind::Expr => {
                exprs(out);
                out.push_str(";\n");
            }
            StmtKind::Goto | StmtKind::Branch => {
                let _ = write!(out, "{} ", stmt.kind);
                exprs(out);
                out.push_str(if stmt.unresolved { "; // unresolved\n" } else { ";\n" });
            }
            StmtKind::Break | StmtKind::Continue => {
                let _ = writeln!(out, "{};", stmt.kind);
            }
            StmtKind::Return => {
                out.push_str("return");
                if !stmt.expressions.is_empty() {
                    out.push(' ');
                    exprs(out);
                }
                out.push_str(";\n");
            }
            StmtKind::If | StmtKind::While => {
                let _ = write!(out, "{} (", stmt.kind);
                exprs(out);
                out.push_str(") {\n");
                if let Some(body) = stmt.body() {
                    self.render_cntr(body, depth + 1, out);
                }
                let _ = writeln!(out, "{}}}", indent);
                if let Some(otherwise) = stmt.else_body() {
                    let _ = writeln!(out, "{}else {{", indent);
                    self.render_cntr(otherwise, depth + 1, out);
                    let _ = writeln!(out, "{}}}", indent);
                }
            }
            StmtKind::DoWhile => {
                out.push_str("do {\n");
                if let Some(body) = stmt.body() {
                    self.render_cntr(body, depth + 1, out);
                }
                let _ = write!(out, "{}}} while (", indent);
                exprs(out);
                out.push_str(");\n");
            }
        }
    }
}
