// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]

//! # decompcore
//!
//! The analytical core of a decompiler: it takes the basic blocks of a function,
//! already lifted into a small expression IR, and turns them into a structured,
//! simplified statement tree ready for textual emission.
//!
//! ## Features
//!
//! - **Graph analysis** - Keyed directed graphs, DFS spanning trees, Lengauer-Tarjan
//!   dominator trees and dominance frontiers
//! - **Arena IR** - Expressions, statements and containers addressed by id, with
//!   def/use chains over SSA subscripts
//! - **Simplifier** - An ordered set of algebraic rewrite rules with constant folding
//! - **Optimizer** - Propagation and pruning passes driven to a fixpoint
//! - **Structurer** - Loop and continuation recovery from block terminators
//!
//! ## Quick Start
//!
//! ```rust
//! use decompcore::prelude::*;
//!
//! // eax_1 = 6 * 7; return eax_1
//! let mut func = Function::new(0x401000);
//! let block = func.add_block(0x401000, None, None)?;
//! let eax = func.reg_ssa("eax", 32, 1);
//! let six = func.val(6, 32);
//! let seven = func.val(7, 32);
//! let product = func.binary(BinaryOp::Mul, six, seven);
//! let assign = func.assign(eax, product);
//! let stmt = func.expr_stmt(0x401000, assign);
//! func.push_stmt(block, stmt)?;
//! let value = func.reg_ssa("eax", 32, 1);
//! let ret = func.return_stmt(0x401004, Some(value));
//! func.push_stmt(block, ret)?;
//!
//! let decompiler = Decompiler::new(EngineConfig::default(), NullResolver);
//! let output = decompiler.decompile(&mut func)?;
//! println!("{}", func.display_cntr(output.root));
//! # Ok::<(), decompcore::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`utils::graph`] - Graph ADT and dominator analysis
//! - [`ir`] - The per-function arena and its mutation and def/use operations
//! - [`analysis`] - The expression simplifier
//! - [`compiler`] - Passes, the fixpoint scheduler, configuration and events
//! - [`structure`] - Control-flow structuring
//! - [`pipeline`] - The [`Decompiler`] tying everything together
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result`]. Errors raised while decompiling a
//! function are wrapped in [`Error::Function`] with its address; unresolvable
//! jumps are reported as warnings, never as errors.

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use decompcore::prelude::*;
///
/// let decompiler = Decompiler::new(EngineConfig::default(), NullResolver);
/// let mut func = Function::new(0x1000);
/// assert!(decompiler.decompile(&mut func).is_err());
/// ```
pub mod prelude;

/// Graph infrastructure and general helpers.
pub mod utils;

/// Intermediate representation.
pub mod ir;

/// Local analyses.
pub mod analysis;

/// Optimizer passes, scheduling, configuration and events.
pub mod compiler;

/// Control-flow structuring.
pub mod structure;

/// The decompilation pipeline.
pub mod pipeline;

/// `decompcore` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `decompcore` Error type
///
/// The main error type for all operations in this crate.
///
/// # Example
///
/// ```rust
/// use decompcore::{Decompiler, Error};
/// use decompcore::ir::Function;
///
/// let decompiler: Decompiler = Decompiler::default();
/// match decompiler.decompile(&mut Function::new(0x1000)) {
///     Ok(output) => println!("{}", output.summary()),
///     Err(Error::Function { address, source }) => println!("{:#x}: {}", address, source),
///     Err(e) => println!("Error: {}", e),
/// }
/// ```
pub use error::Error;

pub use analysis::Simplifier;
pub use compiler::{EngineConfig, EventKind, EventLog, OptimizerConfig, PassKind, StructurerConfig};
pub use pipeline::{DecompiledFunction, Decompiler, NullResolver, Resolver, SymbolTable};
pub use structure::Structurer;
