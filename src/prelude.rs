//! # decompcore Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the decompcore library. Import this module to get quick access to the essential
//! types for building, optimizing and structuring a function.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all decompcore operations
pub use crate::Error;

/// The result type used throughout decompcore
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The pipeline and its output
pub use crate::pipeline::{DecompiledFunction, Decompiler};

/// Symbol lookups
pub use crate::pipeline::{NullResolver, Resolver, SymbolTable};

/// Configuration
pub use crate::compiler::{EngineConfig, OptimizerConfig, PassKind, StructurerConfig};

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Arena, ids and node kinds
pub use crate::ir::{
    BinaryOp, CntrId, ExprId, ExprKind, Function, StmtId, StmtKind, UnaryOp,
};

// ================================================================================================
// Analysis and Passes
// ================================================================================================

/// Graph and dominator analysis
pub use crate::utils::graph::{algorithms::compute_dominators, DirectedGraph, NodeId};

/// Expression simplifier
pub use crate::analysis::Simplifier;

/// Pass interface and scheduling
pub use crate::compiler::{OptPass, PassContext, PassScheduler};

/// Diagnostics
pub use crate::compiler::{Event, EventKind, EventLog};

/// Structuring
pub use crate::structure::{Shape, StructureReport, Structurer};
