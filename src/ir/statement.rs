//! Statements and containers.
//!
//! A [`Container`] is an ordered list of statements; every basic block owns
//! one, and structured statements (`If`, `While`, `DoWhile`) own one per body.
//! A [`Statement`] owns its top-level expressions and its child containers.
//!
//! | Kind | Expressions | Containers |
//! |------|-------------|------------|
//! | [`StmtKind::Expr`] | `[expr]` | none |
//! | [`StmtKind::Goto`] | `[dest]` | none |
//! | [`StmtKind::Branch`] | `[cond, taken, not_taken]` | none |
//! | [`StmtKind::If`] | `[cond]` | `[then, else?]` |
//! | [`StmtKind::While`], [`StmtKind::DoWhile`] | `[cond]` | `[body]` |
//! | [`StmtKind::Break`], [`StmtKind::Continue`] | none | none |
//! | [`StmtKind::Return`] | `[value?]` | none |

use std::fmt;

use strum::{Display, EnumIter};

use crate::ir::ExprId;

/// Identifier of a statement inside a function arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StmtId(pub(crate) usize);

impl fmt::Debug for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Identifier of a container inside a function arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CntrId(pub(crate) usize);

impl fmt::Debug for CntrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Statement kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
pub enum StmtKind {
    /// A bare expression, usually an assignment or a call
    #[strum(serialize = "expr")]
    Expr,
    /// Unconditional jump
    #[strum(serialize = "goto")]
    Goto,
    /// Conditional jump
    #[strum(serialize = "branch")]
    Branch,
    /// Structured conditional
    #[strum(serialize = "if")]
    If,
    /// Pre-tested loop
    #[strum(serialize = "while")]
    While,
    /// Post-tested loop
    #[strum(serialize = "do-while")]
    DoWhile,
    /// Loop exit
    #[strum(serialize = "break")]
    Break,
    /// Loop continuation
    #[strum(serialize = "continue")]
    Continue,
    /// Function return
    #[strum(serialize = "return")]
    Return,
}

impl StmtKind {
    /// Raw jumps, which mark control leaving the container.
    #[must_use]
    pub fn is_jump(self) -> bool {
        matches!(self, StmtKind::Goto | StmtKind::Branch)
    }

    /// Statements that may end a container's straight-line flow.
    #[must_use]
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            StmtKind::Goto
                | StmtKind::Branch
                | StmtKind::If
                | StmtKind::Break
                | StmtKind::Continue
                | StmtKind::Return
        )
    }

    /// Statements whose first expression is a condition.
    #[must_use]
    pub fn is_conditional(self) -> bool {
        matches!(
            self,
            StmtKind::Branch | StmtKind::If | StmtKind::While | StmtKind::DoWhile
        )
    }
}

/// A statement node.
#[derive(Debug, Clone)]
pub struct Statement {
    pub(crate) kind: StmtKind,
    pub(crate) address: u64,
    pub(crate) parent: Option<CntrId>,
    pub(crate) expressions: Vec<ExprId>,
    /// Child container slots; a plucked container leaves `None` behind so
    /// positional accessors (then/else) keep their meaning
    pub(crate) containers: Vec<Option<CntrId>>,
    pub(crate) unresolved: bool,
}

impl Statement {
    pub(crate) fn new(kind: StmtKind, address: u64) -> Self {
        Statement {
            kind,
            address,
            parent: None,
            expressions: Vec::new(),
            containers: Vec::new(),
            unresolved: false,
        }
    }

    /// Returns the statement kind.
    #[must_use]
    pub fn kind(&self) -> StmtKind {
        self.kind
    }

    /// Returns the address of the instruction the statement came from.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the container listing this statement.
    #[must_use]
    pub fn parent(&self) -> Option<CntrId> {
        self.parent
    }

    /// Returns the top-level expressions.
    #[must_use]
    pub fn expressions(&self) -> &[ExprId] {
        &self.expressions
    }

    /// Returns the child containers that are still attached.
    pub fn containers(&self) -> impl Iterator<Item = CntrId> + '_ {
        self.containers.iter().flatten().copied()
    }

    /// Returns `true` if the structurer could not resolve this jump.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.unresolved
    }

    /// Condition of a `Branch`, `If`, `While` or `DoWhile`.
    #[must_use]
    pub fn cond(&self) -> Option<ExprId> {
        if self.kind.is_conditional() {
            self.expressions.first().copied()
        } else {
            None
        }
    }

    /// Destination of a `Goto`.
    #[must_use]
    pub fn dest(&self) -> Option<ExprId> {
        match self.kind {
            StmtKind::Goto => self.expressions.first().copied(),
            _ => None,
        }
    }

    /// Taken target of a `Branch`.
    #[must_use]
    pub fn taken(&self) -> Option<ExprId> {
        match self.kind {
            StmtKind::Branch => self.expressions.get(1).copied(),
            _ => None,
        }
    }

    /// Fall-through target of a `Branch`.
    #[must_use]
    pub fn not_taken(&self) -> Option<ExprId> {
        match self.kind {
            StmtKind::Branch => self.expressions.get(2).copied(),
            _ => None,
        }
    }

    /// Body of a loop, or the `then` arm of an `If`.
    #[must_use]
    pub fn body(&self) -> Option<CntrId> {
        self.containers.first().copied().flatten()
    }

    /// The `else` arm of an `If`.
    #[must_use]
    pub fn else_body(&self) -> Option<CntrId> {
        match self.kind {
            StmtKind::If => self.containers.get(1).copied().flatten(),
            _ => None,
        }
    }

    /// Value of a `Return`.
    #[must_use]
    pub fn value(&self) -> Option<ExprId> {
        match self.kind {
            StmtKind::Return => self.expressions.first().copied(),
            _ => None,
        }
    }
}

/// An ordered, mutable sequence of statements.
#[derive(Debug, Clone)]
pub struct Container {
    pub(crate) address: u64,
    pub(crate) parent: Option<StmtId>,
    pub(crate) fallthrough: Option<CntrId>,
    pub(crate) locals: Vec<ExprId>,
    pub(crate) statements: Vec<StmtId>,
}

impl Container {
    pub(crate) fn new(address: u64) -> Self {
        Container {
            address,
            parent: None,
            fallthrough: None,
            locals: Vec::new(),
            statements: Vec::new(),
        }
    }

    /// Returns the starting address.
    #[must_use]
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Returns the owning statement, `None` for block and root containers.
    #[must_use]
    pub fn parent(&self) -> Option<StmtId> {
        self.parent
    }

    /// Returns the container control falls into after this one.
    #[must_use]
    pub fn fallthrough(&self) -> Option<CntrId> {
        self.fallthrough
    }

    /// Returns the locally declared variables.
    #[must_use]
    pub fn locals(&self) -> &[ExprId] {
        &self.locals
    }

    /// Returns the statements in order.
    #[must_use]
    pub fn statements(&self) -> &[StmtId] {
        &self.statements
    }

    /// Number of statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Returns `true` if the container holds no statements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}
