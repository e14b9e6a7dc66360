//! Algebraic peephole simplification.
//!
//! The simplifier rewrites one expression tree at a time. Each rule inspects a
//! single node and, if it applies, returns a [`Rewrite`] describing the
//! replacement in terms of the node's existing operands. The driver scans the
//! tree in post-order (operands before their parent), applies the first rule
//! that fires and restarts the scan, until no rule fires anywhere.
//!
//! # Rule Order
//!
//! 1. Arithmetic identities (`x + 0`, `x * 1`, `x / 1`, `x * 0`, `x - x`)
//! 2. Sign normalization (`x + -c` becomes `x - c` and vice versa)
//! 3. Reference and double-negation cancellation (`&*x`, `*&x`, `--x`, `~~x`)
//! 4. Bitwise identities and shift/mask fusion
//! 5. Equality normalization (`(x + c1) == c2`, `(x - y) == 0`)
//! 6. Boolean negation (De Morgan, comparison inversion, `!!x`)
//! 7. Condition-pair convergence (`x > y || x == y` becomes `x >= y`)
//! 8. Re-association of literal operands (`(x + c1) + c2`)
//! 9. Constant folding
//!
//! Every rule either removes a node or moves a negation or literal towards the
//! leaves, so the process terminates; an iteration cap still guards against
//! rule-interaction bugs and reports [`Error::NonConvergence`].
//!
//! Rules never drop a subexpression that contains a call or inline assembly.
//! Definition positions are never rewritten, although the address computation
//! below a memory definition is.

use crate::{
    compiler::OptimizerConfig,
    ir::{width_mask, BinaryOp, ExprId, ExprKind, Function, StmtId, UnaryOp},
    Error, Result,
};

/// A replacement for the node a rule fired on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Move an existing subtree of the node into the replacement
    Keep(ExprId),
    /// Deep copy of an existing subtree, def links included
    Copy(ExprId),
    /// A new literal
    Val(u64, u32),
    /// A new unary node
    Unary(UnaryOp, Box<Rewrite>),
    /// A new binary node
    Binary(BinaryOp, Box<Rewrite>, Box<Rewrite>),
}

impl Rewrite {
    fn unary(op: UnaryOp, operand: Rewrite) -> Self {
        Rewrite::Unary(op, Box::new(operand))
    }

    fn binary(op: BinaryOp, left: Rewrite, right: Rewrite) -> Self {
        Rewrite::Binary(op, Box::new(left), Box::new(right))
    }
}

type Rule = fn(&Simplifier, &Function, ExprId) -> Result<Option<Rewrite>>;

const RULES: [(&str, Rule); 9] = [
    ("correct_arith", correct_arith),
    ("correct_sign", correct_sign),
    ("correct_ref", correct_ref),
    ("correct_bitwise", correct_bitwise),
    ("equality", equality),
    ("negate", negate),
    ("converged_cond", converged_cond),
    ("reassociate", reassociate),
    ("constant_folding", constant_folding),
];

/// The peephole simplifier.
#[derive(Debug, Clone)]
pub struct Simplifier {
    signed: bool,
    max_iterations: usize,
}

impl Simplifier {
    /// Creates a simplifier using the arithmetic mode and cap from `config`.
    #[must_use]
    pub fn new(config: &OptimizerConfig) -> Self {
        Simplifier {
            signed: config.signed_arithmetic,
            max_iterations: config.max_simplify_iterations,
        }
    }

    /// Simplifies the tree rooted at `root` until no rule applies.
    ///
    /// Returns the root of the simplified tree, which differs from `root` when
    /// the root itself was replaced. An attached root is replaced in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperandWidth`] when folding literals of different
    /// widths, and [`Error::NonConvergence`] when the iteration cap is hit.
    pub fn reduce_expr(&self, func: &mut Function, root: ExprId) -> Result<ExprId> {
        Ok(self.reduce_counted(func, root)?.0)
    }

    /// Simplifies every expression of `stmt`; returns the number of rewrites.
    ///
    /// # Errors
    ///
    /// See [`reduce_expr`](Self::reduce_expr).
    pub fn reduce_stmt(&self, func: &mut Function, stmt: StmtId) -> Result<usize> {
        let mut total = 0;
        for expr in func[stmt].expressions().to_vec() {
            total += self.reduce_counted(func, expr)?.1;
        }
        Ok(total)
    }

    fn reduce_counted(&self, func: &mut Function, mut root: ExprId) -> Result<(ExprId, usize)> {
        for rewrites in 0..=self.max_iterations {
            match self.rewrite_once(func, root)? {
                Some(new_root) => root = new_root,
                None => return Ok((root, rewrites)),
            }
        }
        Err(Error::NonConvergence {
            stage: "simplifier",
            limit: self.max_iterations,
        })
    }

    fn rewrite_once(&self, func: &mut Function, root: ExprId) -> Result<Option<ExprId>> {
        for node in func.post_order(root) {
            if func[node].is_def() {
                continue;
            }
            for (name, rule) in RULES {
                let Some(rewrite) = rule(self, func, node)? else {
                    continue;
                };
                let replacement = materialize(func, rewrite)?;
                log::trace!(
                    "{}: {} => {}",
                    name,
                    func.display_expr(node),
                    func.display_expr(replacement)
                );
                if func[node].parent().is_some() {
                    func.replace_expr(node, replacement)?;
                }
                func.discard_expr(node);
                return Ok(Some(if node == root { replacement } else { root }));
            }
        }
        Ok(None)
    }
}

/// Builds the nodes a [`Rewrite`] describes and returns the new root, detached.
pub(crate) fn materialize(func: &mut Function, rewrite: Rewrite) -> Result<ExprId> {
    Ok(match rewrite {
        Rewrite::Keep(id) => {
            if func[id].parent().is_some() {
                func.pluck_expr(id)?;
            }
            id
        }
        Rewrite::Copy(id) => func.clone_expr(id, crate::ir::CloneTags::all()),
        Rewrite::Val(value, size) => func.val(value, size),
        Rewrite::Unary(op, operand) => {
            let operand = materialize(func, *operand)?;
            func.unary(op, operand)
        }
        Rewrite::Binary(op, left, right) => {
            let left = materialize(func, *left)?;
            let right = materialize(func, *right)?;
            func.binary(op, left, right)
        }
    })
}

// -------------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------------

fn bin(func: &Function, id: ExprId) -> Option<(BinaryOp, ExprId, ExprId)> {
    let expr = &func[id];
    Some((expr.binary_op()?, expr.operands[0], expr.operands[1]))
}

fn un(func: &Function, id: ExprId) -> Option<(UnaryOp, ExprId)> {
    let expr = &func[id];
    Some((expr.unary_op()?, expr.operands[0]))
}

fn lit(func: &Function, id: ExprId) -> Option<(u64, u32)> {
    func[id].value()
}

fn is_lit(func: &Function, id: ExprId, wanted: u64) -> bool {
    lit(func, id).is_some_and(|(v, _)| v == wanted)
}

/// All ones within a known width.
fn is_ones(func: &Function, id: ExprId) -> bool {
    lit(func, id).is_some_and(|(v, size)| size > 0 && v == width_mask(size))
}

/// Known width of an expression, `0` when it cannot be told locally.
fn size_of(func: &Function, id: ExprId) -> u32 {
    match func[id].kind() {
        ExprKind::Reg { size, .. } | ExprKind::Val { size, .. } => *size,
        ExprKind::Unary(UnaryOp::Neg | UnaryOp::Not) => size_of(func, func[id].operands()[0]),
        ExprKind::Binary(op) if op.is_arithmetic() || op.is_bitwise() => {
            let ops = func[id].operands();
            size_of(func, ops[0]).max(size_of(func, ops[1]))
        }
        _ => 0,
    }
}

/// Dropping or duplicating the subtree does not lose side effects.
fn is_pure(func: &Function, id: ExprId) -> bool {
    func.post_order(id)
        .into_iter()
        .all(|n| !matches!(func[n].kind(), ExprKind::Call | ExprKind::Asm(_)))
}

fn combine_width(left: u32, right: u32) -> Result<u32> {
    match (left, right) {
        (0, w) | (w, 0) => Ok(w),
        (l, r) if l == r => Ok(l),
        (l, r) => Err(Error::OperandWidth { left: l, right: r }),
    }
}

fn sign_extend(value: u64, size: u32) -> i64 {
    let width = if size == 0 || size >= 64 { 64 } else { size };
    let shift = 64 - width;
    ((value << shift) as i64) >> shift
}

fn sign_bit(size: u32) -> Option<u64> {
    (1..=64).contains(&size).then(|| 1u64 << (size - 1))
}

// -------------------------------------------------------------------------
// Rules
// -------------------------------------------------------------------------

fn correct_arith(_: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let Some((op, l, r)) = bin(func, id) else {
        return Ok(None);
    };

    Ok(match op {
        BinaryOp::Add | BinaryOp::Sub if is_lit(func, r, 0) => Some(Rewrite::Keep(l)),
        BinaryOp::Add if is_lit(func, l, 0) => Some(Rewrite::Keep(r)),
        BinaryOp::Mul | BinaryOp::Div if is_lit(func, r, 1) => Some(Rewrite::Keep(l)),
        BinaryOp::Mul if is_lit(func, l, 1) => Some(Rewrite::Keep(r)),
        BinaryOp::Mul if is_lit(func, r, 0) && is_pure(func, l) => {
            Some(Rewrite::Val(0, size_of(func, r)))
        }
        BinaryOp::Mul if is_lit(func, l, 0) && is_pure(func, r) => {
            Some(Rewrite::Val(0, size_of(func, l)))
        }
        BinaryOp::Sub if func.equals(l, r) && is_pure(func, l) => {
            Some(Rewrite::Val(0, size_of(func, l)))
        }
        _ => None,
    })
}

fn correct_sign(_: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let Some((op @ (BinaryOp::Add | BinaryOp::Sub), l, r)) = bin(func, id) else {
        return Ok(None);
    };
    let flipped = if op == BinaryOp::Add {
        BinaryOp::Sub
    } else {
        BinaryOp::Add
    };

    // x + (-y), x - (-y)
    if let Some((UnaryOp::Neg, y)) = un(func, r) {
        return Ok(Some(Rewrite::binary(flipped, Rewrite::Keep(l), Rewrite::Keep(y))));
    }

    // x + c with c negative in its width; the most negative value has no
    // positive counterpart and is left alone
    if let Some((value, size)) = lit(func, r) {
        if let Some(bit) = sign_bit(size) {
            if value & bit != 0 && value != bit {
                let magnitude = value.wrapping_neg() & width_mask(size);
                return Ok(Some(Rewrite::binary(
                    flipped,
                    Rewrite::Keep(l),
                    Rewrite::Val(magnitude, size),
                )));
            }
        }
    }
    Ok(None)
}

fn correct_ref(_: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let Some((outer, inner)) = un(func, id) else {
        return Ok(None);
    };
    let Some((inner_op, x)) = un(func, inner) else {
        return Ok(None);
    };

    Ok(match (outer, inner_op) {
        (UnaryOp::AddrOf, UnaryOp::Deref)
        | (UnaryOp::Deref, UnaryOp::AddrOf)
        | (UnaryOp::Neg, UnaryOp::Neg)
        | (UnaryOp::Not, UnaryOp::Not) => Some(Rewrite::Keep(x)),
        _ => None,
    })
}

fn correct_bitwise(_: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let Some((op, l, r)) = bin(func, id) else {
        return Ok(None);
    };

    Ok(match op {
        BinaryOp::Xor if is_lit(func, r, 0) => Some(Rewrite::Keep(l)),
        BinaryOp::Xor if is_lit(func, l, 0) => Some(Rewrite::Keep(r)),
        BinaryOp::Xor if func.equals(l, r) && is_pure(func, l) => {
            Some(Rewrite::Val(0, size_of(func, l)))
        }
        BinaryOp::Xor if is_ones(func, r) => Some(Rewrite::unary(UnaryOp::Not, Rewrite::Keep(l))),

        BinaryOp::Or if is_lit(func, r, 0) => Some(Rewrite::Keep(l)),
        BinaryOp::Or if is_lit(func, l, 0) => Some(Rewrite::Keep(r)),
        BinaryOp::Or if func.equals(l, r) && is_pure(func, r) => Some(Rewrite::Keep(l)),
        BinaryOp::Or if is_ones(func, r) && is_pure(func, l) => Some(Rewrite::Keep(r)),

        BinaryOp::And if is_lit(func, r, 0) && is_pure(func, l) => Some(Rewrite::Keep(r)),
        BinaryOp::And if is_lit(func, l, 0) && is_pure(func, r) => Some(Rewrite::Keep(l)),
        BinaryOp::And if func.equals(l, r) && is_pure(func, r) => Some(Rewrite::Keep(l)),
        BinaryOp::And if is_ones(func, r) => Some(Rewrite::Keep(l)),
        BinaryOp::And if is_ones(func, l) => Some(Rewrite::Keep(r)),

        BinaryOp::Shl | BinaryOp::Shr if is_lit(func, r, 0) => Some(Rewrite::Keep(l)),

        // (x >> c) << c
        BinaryOp::Shl => match (bin(func, l), lit(func, r)) {
            (Some((BinaryOp::Shr, x, c)), Some((shift, shift_size)))
                if lit(func, c).map(|(v, _)| v) == Some(shift) && shift < 64 =>
            {
                let size = match size_of(func, x) {
                    0 => shift_size,
                    s => s,
                };
                let mask = !((1u64 << shift) - 1) & width_mask(size);
                Some(Rewrite::binary(
                    BinaryOp::And,
                    Rewrite::Keep(x),
                    Rewrite::Val(mask, size),
                ))
            }
            _ => None,
        },
        _ => None,
    })
}

fn equality(_: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let Some((op @ (BinaryOp::Eq | BinaryOp::Ne), l, r)) = bin(func, id) else {
        return Ok(None);
    };
    let Some((inner @ (BinaryOp::Add | BinaryOp::Sub), x, y)) = bin(func, l) else {
        return Ok(None);
    };

    // (x + c1) == c2  =>  x == c2 - c1
    if let (Some((c1, s1)), Some((c2, s2))) = (lit(func, y), lit(func, r)) {
        let size = combine_width(s1, s2)?;
        let c3 = if inner == BinaryOp::Add {
            c2.wrapping_sub(c1)
        } else {
            c2.wrapping_add(c1)
        };
        return Ok(Some(Rewrite::binary(
            op,
            Rewrite::Keep(x),
            Rewrite::Val(c3 & width_mask(size), size),
        )));
    }

    // (x - y) == 0  =>  x == y
    if is_lit(func, r, 0) {
        let right = if inner == BinaryOp::Sub {
            Rewrite::Keep(y)
        } else {
            Rewrite::unary(UnaryOp::Neg, Rewrite::Keep(y))
        };
        return Ok(Some(Rewrite::binary(op, Rewrite::Keep(x), right)));
    }
    Ok(None)
}

fn negate(_: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let Some((UnaryOp::BoolNot, inner)) = un(func, id) else {
        return Ok(None);
    };

    if let Some((UnaryOp::BoolNot, x)) = un(func, inner) {
        return Ok(Some(Rewrite::Keep(x)));
    }

    let Some((op, a, b)) = bin(func, inner) else {
        return Ok(None);
    };
    let not = |e| Rewrite::unary(UnaryOp::BoolNot, Rewrite::Keep(e));

    Ok(match op {
        BinaryOp::BoolAnd => Some(Rewrite::binary(BinaryOp::BoolOr, not(a), not(b))),
        BinaryOp::BoolOr => Some(Rewrite::binary(BinaryOp::BoolAnd, not(a), not(b))),
        BinaryOp::Add => Some(Rewrite::binary(
            BinaryOp::Eq,
            Rewrite::Keep(a),
            Rewrite::unary(UnaryOp::Neg, Rewrite::Keep(b)),
        )),
        BinaryOp::Sub => Some(Rewrite::binary(BinaryOp::Eq, Rewrite::Keep(a), Rewrite::Keep(b))),
        cmp => cmp
            .negated()
            .map(|neg| Rewrite::binary(neg, Rewrite::Keep(a), Rewrite::Keep(b))),
    })
}

fn converged_cond(_: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let Some((BinaryOp::BoolOr, l, r)) = bin(func, id) else {
        return Ok(None);
    };
    let (Some((op0, x0, y0)), Some((op1, x1, y1))) = (bin(func, l), bin(func, r)) else {
        return Ok(None);
    };
    if !func.equals(x0, x1) || !func.equals(y0, y1) || !is_pure(func, l) {
        return Ok(None);
    }

    use BinaryOp::{Eq, Ge, Gt, Le, Lt, Ne};
    let merged = match (op0, op1) {
        (Gt, Eq) | (Eq, Gt) => Ge,
        (Lt, Eq) | (Eq, Lt) => Le,
        (Lt, Gt) | (Gt, Lt) => Ne,
        _ => return Ok(None),
    };
    Ok(Some(Rewrite::binary(merged, Rewrite::Keep(x0), Rewrite::Keep(y0))))
}

fn reassociate(_: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let Some((outer, inner, r)) = bin(func, id) else {
        return Ok(None);
    };
    let Some((c2, s2)) = lit(func, r) else {
        return Ok(None);
    };
    let Some((inner_op, x, y)) = bin(func, inner) else {
        return Ok(None);
    };
    let Some((c1, s1)) = lit(func, y) else {
        return Ok(None);
    };
    if func[x].is_val() {
        return Ok(None);
    }
    let size = combine_width(s1, s2)?;
    let mask = width_mask(size);

    let additive = |op| matches!(op, BinaryOp::Add | BinaryOp::Sub);
    let value = if additive(outer) && additive(inner_op) {
        let d1 = if inner_op == BinaryOp::Add {
            c1
        } else {
            c1.wrapping_neg()
        };
        let d = if outer == BinaryOp::Add {
            d1.wrapping_add(c2)
        } else {
            d1.wrapping_sub(c2)
        };
        return Ok(Some(Rewrite::binary(
            BinaryOp::Add,
            Rewrite::Keep(x),
            Rewrite::Val(d & mask, size),
        )));
    } else if outer == inner_op {
        match outer {
            BinaryOp::Mul => c1.wrapping_mul(c2),
            BinaryOp::And => c1 & c2,
            BinaryOp::Or => c1 | c2,
            BinaryOp::Xor => c1 ^ c2,
            _ => return Ok(None),
        }
    } else {
        return Ok(None);
    };

    Ok(Some(Rewrite::binary(
        outer,
        Rewrite::Keep(x),
        Rewrite::Val(value & mask, size),
    )))
}

fn constant_folding(simp: &Simplifier, func: &Function, id: ExprId) -> Result<Option<Rewrite>> {
    let expr = &func[id];
    match *expr.kind() {
        ExprKind::Binary(op) => {
            let (Some((a, sa)), Some((b, sb))) = (lit(func, expr.operands()[0]), lit(func, expr.operands()[1]))
            else {
                return Ok(None);
            };
            let size = combine_width(sa, sb)?;
            Ok(fold_binary(op, a, b, size, simp.signed).map(|(value, size)| Rewrite::Val(value, size)))
        }
        ExprKind::Unary(op) => {
            let Some((a, size)) = lit(func, expr.operands()[0]) else {
                return Ok(None);
            };
            Ok(match op {
                UnaryOp::Neg => Some(Rewrite::Val(a.wrapping_neg() & width_mask(size), size)),
                UnaryOp::Not => Some(Rewrite::Val(!a & width_mask(size), size)),
                UnaryOp::BoolNot => Some(Rewrite::Val(u64::from(a == 0), 0)),
                UnaryOp::Deref | UnaryOp::AddrOf => None,
            })
        }
        ExprKind::TCond => {
            let ops = expr.operands();
            Ok(lit(func, ops[0]).map(|(c, _)| Rewrite::Keep(if c != 0 { ops[1] } else { ops[2] })))
        }
        _ => Ok(None),
    }
}

/// Folds `a op b` at the given width. Comparisons and boolean operators
/// produce a width-less `0`/`1`. Division and modulo by zero are not folded.
fn fold_binary(op: BinaryOp, a: u64, b: u64, size: u32, signed: bool) -> Option<(u64, u32)> {
    let mask = width_mask(size);
    let (sa, sb) = (sign_extend(a, size), sign_extend(b, size));
    let shift = u32::try_from(b).unwrap_or(u32::MAX);
    let truth = |cond: bool| Some((u64::from(cond), 0));

    let value = match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div | BinaryOp::Mod if b == 0 => return None,
        BinaryOp::Div if signed => sa.wrapping_div(sb) as u64,
        BinaryOp::Div => a / b,
        BinaryOp::Mod if signed => sa.wrapping_rem(sb) as u64,
        BinaryOp::Mod => a % b,
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.checked_shl(shift).unwrap_or(0),
        BinaryOp::Shr if signed => sa
            .checked_shr(shift)
            .unwrap_or(if sa < 0 { -1 } else { 0 }) as u64,
        BinaryOp::Shr => a.checked_shr(shift).unwrap_or(0),
        BinaryOp::Eq => return truth(a == b),
        BinaryOp::Ne => return truth(a != b),
        BinaryOp::Lt if signed => return truth(sa < sb),
        BinaryOp::Gt if signed => return truth(sa > sb),
        BinaryOp::Le if signed => return truth(sa <= sb),
        BinaryOp::Ge if signed => return truth(sa >= sb),
        BinaryOp::Lt => return truth(a < b),
        BinaryOp::Gt => return truth(a > b),
        BinaryOp::Le => return truth(a <= b),
        BinaryOp::Ge => return truth(a >= b),
        BinaryOp::BoolAnd => return truth(a != 0 && b != 0),
        BinaryOp::BoolOr => return truth(a != 0 || b != 0),
    };
    Some((value & mask, size))
}
