//! Fixpoint driver for optimization passes.
//!
//! The [`PassScheduler`] runs an ordered pass list over one function
//! repeatedly; whenever a sweep changes anything the whole list runs again
//! from the start, and the scheduler stops after the first sweep that changes
//! nothing.

use crate::{
    compiler::{passes::create_pass, EventKind, OptPass, PassContext, PassKind},
    ir::Function,
    Error, Result,
};

/// Runs an ordered list of passes to a fixpoint.
///
/// Every successful propagation removes a use and every successful prune
/// removes a definition, so a well-behaved pass list always converges. The
/// sweep cap exists to turn a rule-interaction bug into an
/// [`Error::NonConvergence`] instead of a hang.
pub struct PassScheduler {
    /// Maximum number of sweeps before giving up.
    max_iterations: usize,
    /// The passes, in execution order.
    passes: Vec<Box<dyn OptPass>>,
}

impl Default for PassScheduler {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl PassScheduler {
    /// Creates an empty scheduler with the given sweep cap.
    #[must_use]
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            passes: Vec::new(),
        }
    }

    /// Creates a scheduler running the named passes in order.
    #[must_use]
    pub fn from_kinds(kinds: &[PassKind], max_iterations: usize) -> Self {
        let mut scheduler = Self::new(max_iterations);
        for &kind in kinds {
            scheduler.add_pass(create_pass(kind));
        }
        scheduler
    }

    /// Appends a pass to the end of the list.
    pub fn add_pass(&mut self, pass: Box<dyn OptPass>) {
        self.passes.push(pass);
    }

    /// Number of passes in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    /// Returns `true` if no pass is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Names of the scheduled passes, in order.
    pub fn pass_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.passes.iter().map(|p| p.name())
    }

    /// Runs every pass once. Returns `true` if any of them changed `func`.
    fn run_passes_once(&self, func: &mut Function, ctx: &PassContext<'_>) -> Result<bool> {
        let mut any_changed = false;

        for pass in &self.passes {
            if pass.run_on_function(func, ctx)? {
                log::trace!("{} changed function {:#x}", pass.name(), func.address());
                any_changed = true;
            }
        }

        Ok(any_changed)
    }

    /// Runs the pass list until a complete sweep changes nothing.
    ///
    /// # Returns
    ///
    /// The number of sweeps, including the final one that made no change.
    /// An empty scheduler performs no sweep and returns `0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonConvergence`] if the sweep cap is reached, and
    /// propagates any error a pass reports.
    pub fn run_to_fixpoint(&self, func: &mut Function, ctx: &PassContext<'_>) -> Result<usize> {
        if self.passes.is_empty() {
            return Ok(0);
        }

        ctx.events
            .record(EventKind::PassStarted)
            .function(func.address())
            .message(self.pass_names().collect::<Vec<_>>().join(", "));

        for sweep in 0..self.max_iterations {
            if !self.run_passes_once(func, ctx)? {
                let sweeps = sweep + 1;
                log::debug!("function {:#x} converged after {} sweeps", func.address(), sweeps);
                ctx.events
                    .record(EventKind::PassCompleted)
                    .function(func.address())
                    .message(format!("converged after {sweeps} sweeps"));
                return Ok(sweeps);
            }
        }

        Err(Error::NonConvergence {
            stage: "optimizer",
            limit: self.max_iterations,
        })
    }
}
