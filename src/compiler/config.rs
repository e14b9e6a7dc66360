//! Configuration for the optimizer, the structurer and the engine that drives
//! them.
//!
//! Pass selection is by name: each fixpoint run takes an ordered list of
//! [`PassKind`] values, which can also be parsed from their string names
//! (`"prune_dead_regs"`, `"propagate_constants"`, ...).

use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

/// The optimization passes known to the engine.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    EnumCount,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum PassKind {
    /// Replace uses of literal-valued definitions by the literal.
    PropagateConstants,
    /// Substitute single-use definitions into their only consumer.
    PropagateSingleUse,
    /// Propagate register values into the address of memory writes.
    PropagateDereferenced,
    /// Remove unused register definitions.
    PruneDeadRegs,
    /// Remove unused memory writes that cannot alias.
    PruneDeadDerefs,
    /// Hoist calls out of assignments whose result is never used.
    PruneDeadResults,
    /// Remove definitions only used by their own phi.
    PruneSinglePhi,
    /// Remove definitions only feeding a phi that merges back into them.
    PruneCircularPhi,
}

/// Configuration for the optimizer fixpoint runs.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Treat memory writes as never aliased (default: false).
    ///
    /// Disables the aliasing checks of dead-store elimination and of
    /// propagation into dereferenced definitions.
    pub noalias: bool,

    /// Fold and compare literals as two's-complement signed values
    /// (default: false).
    pub signed_arithmetic: bool,

    /// Maximum number of sweeps per fixpoint run (default: 1000).
    pub max_iterations: usize,

    /// Maximum number of rewrites per simplified expression (default: 256).
    pub max_simplify_iterations: usize,

    /// Passes of the early run, in order.
    pub propagate_only: Vec<PassKind>,

    /// Passes of the cleanup run, in order.
    pub full_cleanup: Vec<PassKind>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            noalias: false,
            signed_arithmetic: false,
            max_iterations: 1000,
            max_simplify_iterations: 256,
            propagate_only: vec![PassKind::PropagateConstants, PassKind::PropagateDereferenced],
            full_cleanup: vec![
                PassKind::PruneDeadRegs,
                PassKind::PruneDeadDerefs,
                PassKind::PruneDeadResults,
                PassKind::PropagateSingleUse,
                PassKind::PropagateConstants,
                PassKind::PruneSinglePhi,
                PassKind::PruneCircularPhi,
            ],
        }
    }
}

impl OptimizerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration that assumes no memory aliasing.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            noalias: true,
            ..Self::default()
        }
    }

    /// Creates a configuration whose cleanup run is empty, so only the
    /// propagation passes touch the IR.
    #[must_use]
    pub fn propagate_only() -> Self {
        Self {
            full_cleanup: Vec::new(),
            ..Self::default()
        }
    }

    /// Returns true if no pass is selected in either run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.propagate_only.is_empty() && self.full_cleanup.is_empty()
    }
}

/// Configuration for control-flow structuring.
#[derive(Debug, Clone, Default)]
pub struct StructurerConfig {
    /// Check each address-classified loop against the dominator tree and
    /// warn on disagreement (default: false).
    pub verify_back_edges: bool,
}

/// Configuration for the decompilation engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Optimizer settings.
    pub optimizer: OptimizerConfig,

    /// Structurer settings.
    pub structurer: StructurerConfig,
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the optimizer configuration.
    #[must_use]
    pub fn with_optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Sets the structurer configuration.
    #[must_use]
    pub fn with_structurer(mut self, structurer: StructurerConfig) -> Self {
        self.structurer = structurer;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::{EnumCount, IntoEnumIterator};

    use super::*;

    #[test]
    fn test_default_config() {
        let config = OptimizerConfig::default();
        assert!(!config.noalias);
        assert_eq!(config.max_iterations, 1000);
        assert_eq!(config.max_simplify_iterations, 256);
        assert_eq!(config.propagate_only.len(), 2);
        assert_eq!(config.full_cleanup.len(), 7);
        assert_eq!(config.full_cleanup[0], PassKind::PruneDeadRegs);
    }

    #[test]
    fn test_named_constructors() {
        assert!(OptimizerConfig::aggressive().noalias);
        let config = OptimizerConfig::propagate_only();
        assert!(config.full_cleanup.is_empty());
        assert!(!config.is_empty());
    }

    #[test]
    fn test_pass_names() {
        assert_eq!(PassKind::PruneDeadRegs.to_string(), "prune_dead_regs");
        assert_eq!(
            PassKind::from_str("propagate_single_use").unwrap(),
            PassKind::PropagateSingleUse
        );
        assert!(PassKind::from_str("unknown_pass").is_err());

        let names: Vec<&'static str> = PassKind::iter().map(Into::into).collect();
        assert_eq!(names.len(), PassKind::COUNT);
    }

    #[test]
    fn test_engine_builder() {
        let config = EngineConfig::new()
            .with_optimizer(OptimizerConfig::aggressive())
            .with_structurer(StructurerConfig {
                verify_back_edges: true,
            });
        assert!(config.optimizer.noalias);
        assert!(config.structurer.verify_back_edges);
    }
}
