//! Expression nodes of the intermediate representation.
//!
//! Expressions live in the [`Function`](crate::ir::Function) arena and are
//! addressed by [`ExprId`]. An expression owns its operands (by id) and keeps a
//! back-reference to whatever currently lists it: either a parent expression or
//! a statement. Definition-position expressions (`is_def`) additionally track
//! the ids of every expression that reads them; each use points back through
//! `def`.
//!
//! # Operand Layout
//!
//! | Kind | Operands |
//! |------|----------|
//! | [`ExprKind::Reg`], [`ExprKind::Val`], [`ExprKind::Asm`] | none |
//! | [`ExprKind::Unary`] | `[operand]` |
//! | [`ExprKind::Binary`] | `[left, right]` |
//! | [`ExprKind::TCond`] | `[cond, if_true, if_false]` |
//! | [`ExprKind::Assign`] | `[lhs, rhs]` |
//! | [`ExprKind::Phi`] | incoming definitions, one per predecessor |
//! | [`ExprKind::Call`] | `[target, args...]` |

use std::fmt;

use bitflags::bitflags;
use strum::{Display, EnumCount, EnumIter};

use crate::ir::StmtId;

/// Identifier of an expression inside a function arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExprId(pub(crate) usize);

impl ExprId {
    /// Returns the raw arena slot.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum UnaryOp {
    /// Arithmetic negation `-x`
    #[strum(serialize = "-")]
    Neg,
    /// Bitwise complement `~x`
    #[strum(serialize = "~")]
    Not,
    /// Memory dereference `*x`
    #[strum(serialize = "*")]
    Deref,
    /// Address-of `&x`
    #[strum(serialize = "&")]
    AddrOf,
    /// Boolean negation `!x`
    #[strum(serialize = "!")]
    BoolNot,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumCount)]
pub enum BinaryOp {
    /// `+`
    #[strum(serialize = "+")]
    Add,
    /// `-`
    #[strum(serialize = "-")]
    Sub,
    /// `*`
    #[strum(serialize = "*")]
    Mul,
    /// `/`
    #[strum(serialize = "/")]
    Div,
    /// `%`
    #[strum(serialize = "%")]
    Mod,
    /// `&`
    #[strum(serialize = "&")]
    And,
    /// `|`
    #[strum(serialize = "|")]
    Or,
    /// `^`
    #[strum(serialize = "^")]
    Xor,
    /// `<<`
    #[strum(serialize = "<<")]
    Shl,
    /// `>>`
    #[strum(serialize = ">>")]
    Shr,
    /// `==`
    #[strum(serialize = "==")]
    Eq,
    /// `!=`
    #[strum(serialize = "!=")]
    Ne,
    /// `<`
    #[strum(serialize = "<")]
    Lt,
    /// `>`
    #[strum(serialize = ">")]
    Gt,
    /// `<=`
    #[strum(serialize = "<=")]
    Le,
    /// `>=`
    #[strum(serialize = ">=")]
    Ge,
    /// `&&`
    #[strum(serialize = "&&")]
    BoolAnd,
    /// `||`
    #[strum(serialize = "||")]
    BoolOr,
}

impl BinaryOp {
    /// `+ - * / %`
    #[must_use]
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    /// `& | ^ << >>`
    #[must_use]
    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    /// `== != < > <= >=`
    #[must_use]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge
        )
    }

    /// `&& ||`
    #[must_use]
    pub fn is_boolean(self) -> bool {
        matches!(self, BinaryOp::BoolAnd | BinaryOp::BoolOr)
    }

    /// Returns `true` if the operands may be swapped without changing the result.
    #[must_use]
    pub fn is_commutative(self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Mul
                | BinaryOp::And
                | BinaryOp::Or
                | BinaryOp::Xor
                | BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::BoolAnd
                | BinaryOp::BoolOr
        )
    }

    /// Returns the comparison that holds exactly when this one does not.
    #[must_use]
    pub fn negated(self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Ne),
            BinaryOp::Ne => Some(BinaryOp::Eq),
            BinaryOp::Lt => Some(BinaryOp::Ge),
            BinaryOp::Ge => Some(BinaryOp::Lt),
            BinaryOp::Gt => Some(BinaryOp::Le),
            BinaryOp::Le => Some(BinaryOp::Gt),
            _ => None,
        }
    }
}

/// The closed set of expression kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    /// A machine register or named variable
    Reg {
        /// Register name
        name: String,
        /// Width in bits (0 when unknown)
        size: u32,
    },
    /// An integer literal
    Val {
        /// Raw value, masked to `size` bits
        value: u64,
        /// Width in bits (0 when unknown)
        size: u32,
    },
    /// A unary operation
    Unary(UnaryOp),
    /// A binary operation
    Binary(BinaryOp),
    /// Ternary conditional `cond ? a : b`
    TCond,
    /// Assignment `lhs = rhs`
    Assign,
    /// SSA merge of incoming definitions
    Phi,
    /// Function call, the first operand is the target
    Call,
    /// Opaque inline assembly line
    Asm(String),
}

/// What currently lists an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprParent {
    /// The expression is an operand of another expression
    Expr(ExprId),
    /// The expression is a top-level expression of a statement
    Stmt(StmtId),
}

bitflags! {
    /// Transient tags carried over by [`Function::clone_expr`](crate::ir::Function::clone_expr).
    ///
    /// Tags not named are reset on the clone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CloneTags: u8 {
        /// The SSA subscript
        const INDEX = 0b0001;
        /// The def link; the clone is registered as a new use of the definition
        const DEF   = 0b0010;
        /// The non-aliased memory marker
        const SAFE  = 0b0100;
        /// The auto-generated definition marker
        const WEAK  = 0b1000;
    }
}

/// An expression node.
#[derive(Debug, Clone)]
pub struct Expr {
    pub(crate) kind: ExprKind,
    pub(crate) operands: Vec<ExprId>,
    pub(crate) parent: Option<ExprParent>,
    pub(crate) is_def: bool,
    pub(crate) idx: Option<u32>,
    pub(crate) def: Option<ExprId>,
    pub(crate) uses: Vec<ExprId>,
    pub(crate) safe: bool,
    pub(crate) weak: bool,
}

impl Expr {
    pub(crate) fn new(kind: ExprKind, operands: Vec<ExprId>) -> Self {
        Expr {
            kind,
            operands,
            parent: None,
            is_def: false,
            idx: None,
            def: None,
            uses: Vec::new(),
            safe: false,
            weak: false,
        }
    }

    /// Returns the expression kind.
    #[must_use]
    pub fn kind(&self) -> &ExprKind {
        &self.kind
    }

    /// Returns the operand ids in order.
    #[must_use]
    pub fn operands(&self) -> &[ExprId] {
        &self.operands
    }

    /// Returns the operand at position `i`.
    #[must_use]
    pub fn operand(&self, i: usize) -> Option<ExprId> {
        self.operands.get(i).copied()
    }

    /// Returns what currently lists this expression, `None` when detached.
    #[must_use]
    pub fn parent(&self) -> Option<ExprParent> {
        self.parent
    }

    /// Returns `true` for definition positions (assignment left-hand sides).
    #[must_use]
    pub fn is_def(&self) -> bool {
        self.is_def
    }

    /// Returns the SSA subscript, if the expression has been renamed.
    #[must_use]
    pub fn index(&self) -> Option<u32> {
        self.idx
    }

    /// Returns the definition this use reads.
    #[must_use]
    pub fn def(&self) -> Option<ExprId> {
        self.def
    }

    /// Returns the uses recorded on this definition.
    #[must_use]
    pub fn uses(&self) -> &[ExprId] {
        &self.uses
    }

    /// Returns `true` if this memory location is known not to alias.
    #[must_use]
    pub fn is_safe(&self) -> bool {
        self.safe
    }

    /// Returns `true` for implicit definitions generated for undefined uses.
    #[must_use]
    pub fn is_weak(&self) -> bool {
        self.weak
    }

    /// Returns the literal value and width of a [`ExprKind::Val`].
    #[must_use]
    pub fn value(&self) -> Option<(u64, u32)> {
        match self.kind {
            ExprKind::Val { value, size } => Some((value, size)),
            _ => None,
        }
    }

    /// Returns the unary operator, if this is a unary expression.
    #[must_use]
    pub fn unary_op(&self) -> Option<UnaryOp> {
        match self.kind {
            ExprKind::Unary(op) => Some(op),
            _ => None,
        }
    }

    /// Returns the binary operator, if this is a binary expression.
    #[must_use]
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self.kind {
            ExprKind::Binary(op) => Some(op),
            _ => None,
        }
    }

    /// Register?
    #[must_use]
    pub fn is_reg(&self) -> bool {
        matches!(self.kind, ExprKind::Reg { .. })
    }

    /// Literal?
    #[must_use]
    pub fn is_val(&self) -> bool {
        matches!(self.kind, ExprKind::Val { .. })
    }

    /// Memory dereference?
    #[must_use]
    pub fn is_deref(&self) -> bool {
        self.kind == ExprKind::Unary(UnaryOp::Deref)
    }

    /// Phi node?
    #[must_use]
    pub fn is_phi(&self) -> bool {
        self.kind == ExprKind::Phi
    }

    /// Call?
    #[must_use]
    pub fn is_call(&self) -> bool {
        self.kind == ExprKind::Call
    }

    /// Assignment?
    #[must_use]
    pub fn is_assign(&self) -> bool {
        self.kind == ExprKind::Assign
    }

    /// Returns `true` for the expression kinds that can hold a value across
    /// statements: registers and dereferences.
    #[must_use]
    pub fn is_location(&self) -> bool {
        self.is_reg() || self.is_deref()
    }
}
