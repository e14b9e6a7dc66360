//! Intermediate representation: expressions, statements and containers.
//!
//! All nodes of a function live in its [`Function`] arena and refer to each
//! other by id ([`ExprId`], [`StmtId`], [`CntrId`]). The tree structure (which
//! node owns which) is carried by parent links kept in sync by the mutation
//! operations; a secondary, non-owning def/use adjacency links definition
//! positions to the expressions that read them.
//!
//! # Key Components
//!
//! - [`Function`] - The arena, basic blocks and node constructors
//! - [`Expr`] / [`ExprKind`] - Expression nodes over a closed set of kinds
//! - [`Statement`] / [`StmtKind`] - Statements, including structured ones
//! - [`Container`] - Ordered statement lists
//! - Def/use registry operations (`add_def`, `add_use`, `link_defs`, `validate`)
//!
//! # Examples
//!
//! ```rust,ignore
//! use decompcore::ir::{BinaryOp, Function};
//!
//! let mut f = Function::new(0x1000);
//! let block = f.add_block(0x1000, None, None)?;
//! let lhs = f.reg_ssa("eax", 32, 1);
//! let rhs = f.val(1, 32);
//! let assign = f.assign(lhs, rhs);
//! let stmt = f.expr_stmt(0x1000, assign);
//! f.push_stmt(block, stmt)?;
//!
//! f.link_defs()?;
//! assert_eq!(f.defs().count(), 1);
//! ```

mod defuse;
mod display;
mod expression;
mod function;
mod mutate;
mod statement;

pub use defuse::DefUseTable;
pub use display::{CntrDisplay, ExprDisplay};
pub use expression::{BinaryOp, CloneTags, Expr, ExprId, ExprKind, ExprParent, UnaryOp};
pub use function::{width_mask, BasicBlock, Function};
pub use statement::{CntrId, Container, Statement, StmtId, StmtKind};
