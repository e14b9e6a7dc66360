//! Local analyses over a single function's IR.
//!
//! - [`Simplifier`] - algebraic rewriting of expression trees
//!
//! Control-flow and dominance analyses live with the graph ADT in
//! [`crate::utils::graph`]; the def/use registry lives with the IR in
//! [`crate::ir`].
//!
//! # Usage
//!
//! ```rust
//! use decompcore::{analysis::Simplifier, ir::{BinaryOp, Function}, OptimizerConfig};
//!
//! let mut func = Function::new(0x1000);
//! let three = func.val(3, 32);
//! let four = func.val(4, 32);
//! let sum = func.binary(BinaryOp::Add, three, four);
//!
//! let simplifier = Simplifier::new(&OptimizerConfig::default());
//! let folded = simplifier.reduce_expr(&mut func, sum)?;
//! assert_eq!(func[folded].value(), Some((7, 32)));
//! # Ok::<(), decompcore::Error>(())
//! ```

mod simplify;

pub(crate) use simplify::materialize;
pub use simplify::{Rewrite, Simplifier};
