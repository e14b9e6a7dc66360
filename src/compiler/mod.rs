//! Optimizer infrastructure: passes, the fixpoint scheduler, configuration
//! and the event log.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Optimizer Pipeline                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  EngineConfig                 Optimizer and structurer settings  │
//! │    └─ OptimizerConfig         noalias, caps, pass lists          │
//! │                                                                  │
//! │  PassScheduler               Fixpoint execution                  │
//! │    └─ run → repeat until a full sweep changes nothing            │
//! │                                                                  │
//! │  OptPass trait               Interface for all passes            │
//! │    ├─ PropagationPass<P>      selector + generator               │
//! │    └─ PruningPass<P>          selector + preparation             │
//! │                                                                  │
//! │  Passes (8 built-in)         Optimization transformations        │
//! │    ├─ Propagation: constants, single use, dereferenced           │
//! │    └─ Pruning: dead regs/derefs/results, single/circular phi     │
//! │                                                                  │
//! │  EventLog                    Change tracking and diagnostics     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod events;
mod pass;
mod passes;
mod scheduler;

pub use config::{EngineConfig, OptimizerConfig, PassKind, StructurerConfig};
pub use events::{Event, EventBuilder, EventKind, EventLog, EventLogIter};
pub use pass::{OptPass, PassContext, Propagation, PropagationPass, Pruning, PruningPass};
pub use passes::{
    create_pass, CircularPhi, ConstantPropagation, DeadDereferences, DeadRegisters, DeadResults,
    DereferencePropagation, SinglePhi, SingleUsePropagation,
};
pub use scheduler::PassScheduler;
