//! End-to-end decompilation of single functions.
//!
//! The [`Decompiler`] is the entry point of the crate. For each function it
//! runs, in order:
//!
//! 1. **Validation**: the entry block exists and the control flow graph and
//!    dominator tree can be built
//! 2. **Simplification** of every statement as decoded
//! 3. **Def/use linking**: chains are rebuilt from the SSA subscripts
//! 4. **Propagate-only** optimization to a fixpoint
//! 5. **Full cleanup** optimization to a fixpoint
//! 6. **Def/use validation** of the optimized IR
//! 7. **Structuring** of the block terminators
//! 8. **Flattening** of the block containers, in address order, into one root
//!    container
//!
//! A failure in any step aborts that function only: the error comes back
//! wrapped in [`Error::Function`] with the function's address, and
//! [`Decompiler::decompile_all`] carries on with the next function.
//!
//! # Example
//!
//! ```rust
//! use decompcore::prelude::*;
//!
//! let mut func = Function::new(0x1000);
//! let block = func.add_block(0x1000, None, None)?;
//! let eax = func.reg_ssa("eax", 32, 1);
//! let three = func.val(3, 32);
//! let four = func.val(4, 32);
//! let sum = func.binary(BinaryOp::Add, three, four);
//! let assign = func.assign(eax, sum);
//! let stmt = func.expr_stmt(0x1000, assign);
//! func.push_stmt(block, stmt)?;
//! let value = func.reg_ssa("eax", 32, 1);
//! let ret = func.return_stmt(0x1004, Some(value));
//! func.push_stmt(block, ret)?;
//!
//! let decompiler = Decompiler::new(EngineConfig::default(), NullResolver);
//! let output = decompiler.decompile(&mut func)?;
//! assert_eq!(func.display_cntr(output.root).to_string(), "return 7;\n");
//! # Ok::<(), decompcore::Error>(())
//! ```

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use crate::{
    analysis::Simplifier,
    compiler::{EngineConfig, EventKind, EventLog, PassContext, PassScheduler},
    ir::{CntrId, Function},
    structure::{StructureReport, Structurer},
    utils::graph::algorithms::compute_dominators,
    Error, Result,
};

/// Read-only symbol lookups supplied by the host.
///
/// The core passes never consult the resolver; it names functions and data
/// for the output.
pub trait Resolver {
    /// Name of the function starting at `address`.
    fn resolve_fname(&self, address: u64) -> Option<String>;

    /// Name of the data item at `address`.
    fn resolve_data(&self, address: u64) -> Option<String>;
}

/// A resolver that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullResolver;

impl Resolver for NullResolver {
    fn resolve_fname(&self, _address: u64) -> Option<String> {
        None
    }

    fn resolve_data(&self, _address: u64) -> Option<String> {
        None
    }
}

/// A map-backed [`Resolver`].
///
/// # Example
///
/// ```rust
/// use decompcore::pipeline::{Resolver, SymbolTable};
///
/// let mut symbols = SymbolTable::new();
/// symbols.add_function(0x401000, "main");
/// symbols.add_data(0x404000, "g_counter");
///
/// assert_eq!(symbols.resolve_fname(0x401000).as_deref(), Some("main"));
/// assert_eq!(symbols.resolve_data(0x404004), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    functions: BTreeMap<u64, String>,
    data: BTreeMap<u64, String>,
}

impl SymbolTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the function starting at `address`.
    pub fn add_function(&mut self, address: u64, name: impl Into<String>) {
        self.functions.insert(address, name.into());
    }

    /// Names the data item at `address`.
    pub fn add_data(&mut self, address: u64, name: impl Into<String>) {
        self.data.insert(address, name.into());
    }

    /// Total number of names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.functions.len() + self.data.len()
    }

    /// Returns `true` if the table holds no names.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.data.is_empty()
    }
}

impl Resolver for SymbolTable {
    fn resolve_fname(&self, address: u64) -> Option<String> {
        self.functions.get(&address).cloned()
    }

    fn resolve_data(&self, address: u64) -> Option<String> {
        self.data.get(&address).cloned()
    }
}

/// Output of a successful decompilation.
#[derive(Debug, Clone)]
pub struct DecompiledFunction {
    /// Function start address.
    pub address: u64,
    /// Function name, as resolved or previously assigned.
    pub name: Option<String>,
    /// The structured body, also available through [`Function::body`].
    pub root: CntrId,
    /// Unresolved edges and other non-fatal findings.
    pub warnings: Vec<String>,
    /// Everything the passes and the structurer did.
    pub events: EventLog,
    /// Block classifications.
    pub structure: StructureReport,
    /// Sweeps of the propagate-only run.
    pub propagate_sweeps: usize,
    /// Sweeps of the full cleanup run.
    pub cleanup_sweeps: usize,
    /// Wall-clock time spent.
    pub elapsed: Duration,
}

impl DecompiledFunction {
    /// One-line summary, e.g. `0x1000: 3 transformations, 1 warnings (2+3 sweeps)`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{:#x}: {} transformations, {} warnings ({}+{} sweeps)",
            self.address,
            self.events.transformation_count(),
            self.warnings.len(),
            self.propagate_sweeps,
            self.cleanup_sweeps
        )
    }
}

/// Runs the full analysis pipeline over functions.
pub struct Decompiler<R = NullResolver> {
    config: EngineConfig,
    resolver: R,
    simplifier: Simplifier,
    propagate: PassScheduler,
    cleanup: PassScheduler,
    structurer: Structurer,
}

impl Default for Decompiler<NullResolver> {
    fn default() -> Self {
        Self::new(EngineConfig::default(), NullResolver)
    }
}

impl<R: Resolver> Decompiler<R> {
    /// Creates a decompiler; the pass lists are built once here.
    #[must_use]
    pub fn new(config: EngineConfig, resolver: R) -> Self {
        let optimizer = &config.optimizer;
        let simplifier = Simplifier::new(optimizer);
        let propagate = PassScheduler::from_kinds(&optimizer.propagate_only, optimizer.max_iterations);
        let cleanup = PassScheduler::from_kinds(&optimizer.full_cleanup, optimizer.max_iterations);
        let structurer = Structurer::new(config.structurer.clone());

        Self {
            config,
            resolver,
            simplifier,
            propagate,
            cleanup,
            structurer,
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The symbol resolver.
    #[must_use]
    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    /// Decompiles one function in place.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Function`] wrapping the first failure: malformed
    /// input, an inconsistent def/use graph or an optimizer that did not
    /// converge.
    pub fn decompile(&self, func: &mut Function) -> Result<DecompiledFunction> {
        let address = func.address();
        self.run(func).map_err(|e| e.in_function(address))
    }

    /// Decompiles every function, continuing past failures.
    ///
    /// Failures are logged and returned in place of the output.
    pub fn decompile_all<'a, I>(&self, functions: I) -> Vec<Result<DecompiledFunction>>
    where
        I: IntoIterator<Item = &'a mut Function>,
    {
        functions
            .into_iter()
            .map(|func| {
                let result = self.decompile(func);
                if let Err(e) = &result {
                    log::error!("{}", e);
                }
                result
            })
            .collect()
    }

    fn run(&self, func: &mut Function) -> Result<DecompiledFunction> {
        let start = Instant::now();
        let events = EventLog::new();
        let address = func.address();

        if func.name().is_none() {
            if let Some(name) = self.resolver.resolve_fname(address) {
                func.set_name(name);
            }
        }

        // Validation
        let entry = func
            .entry()
            .ok_or_else(|| malformed_error!("function {:#x} has no blocks", address))?;
        if func.block(entry).is_none() {
            return Err(Error::MissingBlock {
                function: address,
                target: entry,
            });
        }
        let cfg = func.cfg()?;
        let dom = compute_dominators(&cfg)?;
        for block in func.blocks() {
            let reachable = cfg
                .get_node(&block.address())
                .is_some_and(|n| dom.is_reachable(n));
            if !reachable {
                events
                    .record(EventKind::Info)
                    .at(address, block.address())
                    .message(format!("block {:#x} is unreachable", block.address()));
            }
        }

        // Optimization
        let statements: Vec<_> = func
            .blocks()
            .flat_map(|b| func[b.container()].statements().to_vec())
            .collect();
        for stmt in statements {
            self.simplifier.reduce_stmt(func, stmt)?;
        }
        let links = func.link_defs()?;
        log::debug!("function {:#x}: {} def/use links", address, links);

        let ctx = PassContext {
            config: &self.config.optimizer,
            simplifier: &self.simplifier,
            events: &events,
        };
        let propagate_sweeps = self.propagate.run_to_fixpoint(func, &ctx)?;
        let cleanup_sweeps = self.cleanup.run_to_fixpoint(func, &ctx)?;
        func.validate()?;

        // Structuring
        let structure = self.structurer.run(func, &events)?;

        let root = func.new_container(address);
        let containers: Vec<_> = func.blocks().map(|b| b.container()).collect();
        for cntr in containers {
            func.move_stmts(cntr, root);
        }
        func.body = Some(root);

        let output = DecompiledFunction {
            address,
            name: func.name().map(str::to_string),
            root,
            warnings: structure.warnings.clone(),
            events,
            structure,
            propagate_sweeps,
            cleanup_sweeps,
            elapsed: start.elapsed(),
        };
        log::debug!("{}", output.summary());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{OptimizerConfig, StructurerConfig},
        ir::BinaryOp,
    };

    /// `eax_1 = 3 + 4; return eax_1` in a single block at `address`.
    fn constant_return(address: u64) -> Function {
        let mut func = Function::new(address);
        let block = func.add_block(address, None, None).unwrap();
        let eax = func.reg_ssa("eax", 32, 1);
        let three = func.val(3, 32);
        let four = func.val(4, 32);
        let sum = func.binary(BinaryOp::Add, three, four);
        let assign = func.assign(eax, sum);
        let stmt = func.expr_stmt(address, assign);
        func.push_stmt(block, stmt).unwrap();
        let value = func.reg_ssa("eax", 32, 1);
        let ret = func.return_stmt(address + 4, Some(value));
        func.push_stmt(block, ret).unwrap();
        func
    }

    #[test]
    fn test_symbol_table() {
        let mut symbols = SymbolTable::new();
        assert!(symbols.is_empty());
        symbols.add_function(0x10, "f");
        symbols.add_data(0x20, "d");
        assert_eq!(symbols.len(), 2);
        assert_eq!(symbols.resolve_fname(0x10).as_deref(), Some("f"));
        assert_eq!(symbols.resolve_fname(0x20), None);
        assert_eq!(symbols.resolve_data(0x20).as_deref(), Some("d"));
        assert_eq!(NullResolver.resolve_fname(0x10), None);
    }

    #[test]
    fn test_decompile_folds_and_names() {
        let mut symbols = SymbolTable::new();
        symbols.add_function(0x1000, "answer");
        let decompiler = Decompiler::new(EngineConfig::default(), symbols);

        let mut func = constant_return(0x1000);
        let output = decompiler.decompile(&mut func).unwrap();

        assert_eq!(output.name.as_deref(), Some("answer"));
        assert_eq!(func.body(), Some(output.root));
        assert_eq!(func.display_cntr(output.root).to_string(), "return 7;\n");
        assert!(output.warnings.is_empty());
        assert!(output.events.transformation_count() > 0);
        assert!(output.summary().starts_with("0x1000: "));
        func.validate().unwrap();
    }

    #[test]
    fn test_empty_function_is_malformed() {
        let decompiler: Decompiler = Decompiler::default();
        let mut func = Function::new(0x2000);

        let err = decompiler.decompile(&mut func).unwrap_err();
        match err {
            Error::Function { address, source } => {
                assert_eq!(address, 0x2000);
                assert!(matches!(*source, Error::Malformed { .. }));
            }
            other => panic!("expected Function, got {other:?}"),
        }
    }

    #[test]
    fn test_failures_stay_per_function() {
        let config = EngineConfig::new().with_optimizer(OptimizerConfig {
            max_iterations: 1,
            ..OptimizerConfig::default()
        });
        let decompiler = Decompiler::new(config, NullResolver);

        let mut broken = constant_return(0x1000);
        let mut empty = Function::new(0x2000);
        let mut fine = Function::new(0x3000);
        let block = fine.add_block(0x3000, None, None).unwrap();
        let ret = fine.return_stmt(0x3000, None);
        fine.push_stmt(block, ret).unwrap();

        let results = decompiler.decompile_all([&mut broken, &mut empty, &mut fine]);

        assert_eq!(results.len(), 3);
        assert!(results[0].as_ref().is_err_and(Error::is_non_convergence));
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_structuring_runs_after_cleanup() {
        let config = EngineConfig::new().with_structurer(StructurerConfig {
            verify_back_edges: true,
        });
        let decompiler = Decompiler::new(config, NullResolver);

        let mut func = Function::new(0x10);
        let block = func.add_block(0x10, Some(0x10), None).unwrap();
        let head = func.val(0x10, 32);
        let latch = func.goto(0x10, head);
        func.push_stmt(block, latch).unwrap();

        let output = decompiler.decompile(&mut func).unwrap();
        assert_eq!(output.structure.loops(), 1);
        assert!(output.warnings.is_empty());
        assert_eq!(
            func.display_cntr(output.root).to_string(),
            "do {\n} while (1);\n"
        );
    }
}
