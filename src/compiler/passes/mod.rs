//! Built-in optimization passes.
//!
//! | Pass | Shape | Effect |
//! |------|-------|--------|
//! | [`ConstantPropagation`] | propagation | `x_1 = 4; y = x_1 + 1` → `y = 5` |
//! | [`SingleUsePropagation`] | propagation | substitutes a single-use value and removes its definition |
//! | [`DereferencePropagation`] | propagation | folds register values into memory write addresses |
//! | [`DeadRegisters`] | pruning | removes unused register definitions |
//! | [`DeadDereferences`] | pruning | removes unused memory writes that cannot alias |
//! | [`DeadResults`] | pruning | keeps the call, drops the unused result |
//! | [`SinglePhi`] | pruning | `x_2 = Φ(x_1, x_2)` with no other use |
//! | [`CircularPhi`] | pruning | `x_2 = Φ(x_1, x_3); x_3 = x_2` |

mod propagate;
mod prune;

pub use propagate::{ConstantPropagation, DereferencePropagation, SingleUsePropagation};
pub use prune::{CircularPhi, DeadDereferences, DeadRegisters, DeadResults, SinglePhi};

use crate::{
    compiler::{OptPass, PassKind, PropagationPass, PruningPass},
    ir::{ExprId, ExprKind, Function},
};

/// Instantiates the pass named by `kind`.
#[must_use]
pub fn create_pass(kind: PassKind) -> Box<dyn OptPass> {
    match kind {
        PassKind::PropagateConstants => Box::new(PropagationPass(ConstantPropagation)),
        PassKind::PropagateSingleUse => Box::new(PropagationPass(SingleUsePropagation)),
        PassKind::PropagateDereferenced => Box::new(PropagationPass(DereferencePropagation)),
        PassKind::PruneDeadRegs => Box::new(PruningPass(DeadRegisters)),
        PassKind::PruneDeadDerefs => Box::new(PruningPass(DeadDereferences)),
        PassKind::PruneDeadResults => Box::new(PruningPass(DeadResults)),
        PassKind::PruneSinglePhi => Box::new(PruningPass(SinglePhi)),
        PassKind::PruneCircularPhi => Box::new(PruningPass(CircularPhi)),
    }
}

/// Does the tree at `id` (including `id`) contain a node matching `pred`?
fn encloses(func: &Function, id: ExprId, pred: impl Fn(&Function, ExprId) -> bool) -> bool {
    func.post_order(id).into_iter().any(|n| pred(func, n))
}

fn encloses_call(func: &Function, id: ExprId) -> bool {
    encloses(func, id, |f, n| matches!(f[n].kind(), ExprKind::Call | ExprKind::Asm(_)))
}

fn encloses_deref(func: &Function, id: ExprId) -> bool {
    encloses(func, id, |f, n| f[n].is_deref())
}

/// Calls or touches memory at all.
fn non_const(func: &Function, id: ExprId) -> bool {
    encloses(func, id, |f, n| {
        matches!(f[n].kind(), ExprKind::Call | ExprKind::Asm(_)) || f[n].is_deref()
    })
}

/// Calls or writes memory.
fn impure(func: &Function, id: ExprId) -> bool {
    encloses(func, id, |f, n| {
        matches!(f[n].kind(), ExprKind::Call | ExprKind::Asm(_))
            || (f[n].is_deref() && f[n].is_def())
    })
}

/// Entry values (subscript 0) and implicit uninitialized definitions carry no
/// known value.
fn is_entry_value(func: &Function, def: ExprId) -> bool {
    func[def].is_weak() || func[def].index() == Some(0)
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::{
        analysis::Simplifier,
        compiler::{EventLog, OptPass, OptimizerConfig, PassContext},
        ir::{CntrId, ExprId, Function},
        Result,
    };

    /// A single-block function under construction.
    pub(crate) struct Harness {
        pub func: Function,
        pub block: CntrId,
        pub config: OptimizerConfig,
        pub events: EventLog,
    }

    impl Harness {
        pub fn new() -> Self {
            let mut func = Function::new(0x1000);
            let block = func.add_block(0x1000, None, None).unwrap();
            Harness {
                func,
                block,
                config: OptimizerConfig::default(),
                events: EventLog::new(),
            }
        }

        /// Appends `lhs = rhs` as a statement at `address`.
        pub fn assign(&mut self, address: u64, lhs: ExprId, rhs: ExprId) -> ExprId {
            let assign = self.func.assign(lhs, rhs);
            self.push(address, assign);
            assign
        }

        /// Appends an expression statement at `address`.
        pub fn push(&mut self, address: u64, expr: ExprId) {
            let stmt = self.func.expr_stmt(address, expr);
            self.func.push_stmt(self.block, stmt).unwrap();
        }

        pub fn link(&mut self) {
            self.func.link_defs().unwrap();
        }

        pub fn run(&mut self, pass: &dyn OptPass) -> Result<bool> {
            let simplifier = Simplifier::new(&self.config);
            let ctx = PassContext {
                config: &self.config,
                simplifier: &simplifier,
                events: &self.events,
            };
            pass.run_on_function(&mut self.func, &ctx)
        }

        pub fn text(&self) -> String {
            self.func.display_cntr(self.block).to_string()
        }
    }
}
