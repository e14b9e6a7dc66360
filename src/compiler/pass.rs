//! Pass traits and the two generic pass drivers.
//!
//! Every optimization implements [`OptPass`]. Almost all of them come in one
//! of two shapes, each of which only has to supply its policy:
//!
//! - [`Propagation`]: a *selector* (is this definition eligible?) and a
//!   *generator* (what should replace a given use?), driven by
//!   [`PropagationPass`].
//! - [`Pruning`]: a selector plus an optional preparation step, driven by
//!   [`PruningPass`].
//!
//! Both drivers visit a snapshot of the definition registry and re-check each
//! candidate before touching it, since earlier rewrites in the same sweep may
//! already have removed it.

use crate::{
    analysis::{materialize, Rewrite, Simplifier},
    compiler::{EventKind, EventLog, OptimizerConfig},
    ir::{ExprId, ExprParent, Function},
    Result,
};

/// Shared, read-only state handed to every pass.
pub struct PassContext<'a> {
    /// Optimizer settings.
    pub config: &'a OptimizerConfig,
    /// Simplifier run on every statement a propagation touches.
    pub simplifier: &'a Simplifier,
    /// Sink for transformation events.
    pub events: &'a EventLog,
}

/// An optimization pass over one function.
pub trait OptPass {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Run the pass once over all tracked definitions of `func`.
    ///
    /// Returns `true` if anything changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the IR turns out to be inconsistent or the
    /// simplifier does not converge.
    fn run_on_function(&self, func: &mut Function, ctx: &PassContext<'_>) -> Result<bool>;

    /// Get a description of what this pass does.
    fn description(&self) -> &'static str {
        "No description available"
    }
}

/// Policy of a propagation pass.
pub trait Propagation {
    /// Pass name.
    const NAME: &'static str;
    /// Event recorded per replaced use.
    const EVENT: EventKind;

    /// Is the definition `def`, assigned `val`, eligible for propagation?
    fn select(&self, func: &Function, def: ExprId, val: ExprId, config: &OptimizerConfig) -> bool;

    /// What should replace `use_`? `None` leaves the use in place for good.
    fn generate(&self, func: &Function, use_: ExprId, val: ExprId) -> Option<Rewrite>;

    /// Remove the defining assignment once it has no uses left.
    fn consumes_definition(&self) -> bool {
        false
    }
}

/// Policy of a pruning pass.
pub trait Pruning {
    /// Pass name.
    const NAME: &'static str;
    /// Event recorded per pruned definition.
    const EVENT: EventKind;

    /// Should the assignment of `def` (assigned `val`) be removed?
    fn select(&self, func: &Function, def: ExprId, val: ExprId, config: &OptimizerConfig) -> bool;

    /// Runs right before the assignment is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the IR cannot be edited as required.
    fn prepare(&self, _func: &mut Function, _def: ExprId, _val: ExprId) -> Result<()> {
        Ok(())
    }
}

/// Drives a [`Propagation`] policy.
pub struct PropagationPass<P>(pub P);

impl<P: Propagation> OptPass for PropagationPass<P> {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn run_on_function(&self, func: &mut Function, ctx: &PassContext<'_>) -> Result<bool> {
        let mut propagated = 0;

        for def in func.defs_snapshot() {
            if !func.is_tracked(def) {
                continue;
            }
            let Some((assign, val)) = func.assignment_of(def) else {
                continue;
            };
            if !self.0.select(func, def, val, ctx.config) {
                continue;
            }

            let mut skipped = 0;
            while func.get_expr(def).is_some_and(|d| d.uses().len() > skipped) {
                let use_ = func[def].uses()[skipped];
                let Some((_, val)) = func.assignment_of(def) else {
                    break;
                };
                let rewrite = match (func[use_].parent(), self.0.generate(func, use_, val)) {
                    (Some(_), Some(rewrite)) => rewrite,
                    _ => {
                        skipped += 1;
                        continue;
                    }
                };

                let stmt = func.stmt_of(use_);
                let replacement = materialize(func, rewrite)?;
                func.replace_expr(use_, replacement)?;
                func.discard_expr(use_);

                if let Some(stmt) = stmt {
                    ctx.events
                        .record(P::EVENT)
                        .at(func.address(), func[stmt].address())
                        .message(func.stmt_to_string(stmt).trim_end().to_string())
                        .pass(P::NAME);
                    if ctx.simplifier.reduce_stmt(func, stmt)? > 0 {
                        ctx.events
                            .record(EventKind::ExpressionSimplified)
                            .at(func.address(), func[stmt].address())
                            .pass(P::NAME);
                    }
                }
                propagated += 1;
            }

            if self.0.consumes_definition()
                && func.get_expr(def).is_some_and(|d| d.uses().is_empty())
            {
                remove_assignment(func, assign)?;
            }
        }

        Ok(propagated > 0)
    }
}

/// Drives a [`Pruning`] policy.
pub struct PruningPass<P>(pub P);

impl<P: Pruning> OptPass for PruningPass<P> {
    fn name(&self) -> &'static str {
        P::NAME
    }

    fn run_on_function(&self, func: &mut Function, ctx: &PassContext<'_>) -> Result<bool> {
        let mut pruned = 0;

        for def in func.defs_snapshot() {
            if !func.is_tracked(def) {
                continue;
            }
            let Some((assign, val)) = func.assignment_of(def) else {
                continue;
            };
            if !matches!(func[assign].parent(), Some(ExprParent::Stmt(_)))
                || !self.0.select(func, def, val, ctx.config)
            {
                continue;
            }

            let location = func
                .stmt_of(assign)
                .map_or(func.address(), |s| func[s].address());
            let text = func.display_expr(assign).to_string();

            self.0.prepare(func, def, val)?;
            remove_assignment(func, assign)?;

            ctx.events
                .record(P::EVENT)
                .at(func.address(), location)
                .message(text)
                .pass(P::NAME);
            pruned += 1;
        }

        Ok(pruned > 0)
    }
}

/// Removes a top-level assignment, and its statement once empty. The
/// definition it holds leaves the registry.
fn remove_assignment(func: &mut Function, assign: ExprId) -> Result<()> {
    match func[assign].parent() {
        Some(ExprParent::Stmt(stmt)) => {
            func.remove_expr(stmt, assign)?;
        }
        _ => func.discard_expr(assign),
    }
    Ok(())
}
