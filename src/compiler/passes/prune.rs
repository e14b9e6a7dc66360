//! Pruning policies.

use crate::{
    compiler::{passes::encloses_call, EventKind, OptimizerConfig, Pruning},
    ir::{ExprId, Function},
    Result,
};

/// Removes register definitions nobody reads.
///
/// Assignments whose value calls a function stay, since the call may have
/// side effects; [`DeadResults`] handles the direct-call case.
pub struct DeadRegisters;

impl Pruning for DeadRegisters {
    const NAME: &'static str = "prune_dead_regs";
    const EVENT: EventKind = EventKind::DefinitionPruned;

    fn select(&self, func: &Function, def: ExprId, val: ExprId, _: &OptimizerConfig) -> bool {
        func[def].uses().is_empty() && func[def].is_reg() && !encloses_call(func, val)
    }
}

/// Removes memory writes nobody reads.
///
/// A write is only dropped when it cannot alias a later read: the target is
/// tagged safe, aliasing is disabled, or the value is a phi. Writes through an
/// address computed from a variable that is read elsewhere are presumed
/// aliased unless safe.
pub struct DeadDereferences;

impl Pruning for DeadDereferences {
    const NAME: &'static str = "prune_dead_derefs";
    const EVENT: EventKind = EventKind::DefinitionPruned;

    fn select(&self, func: &Function, def: ExprId, val: ExprId, config: &OptimizerConfig) -> bool {
        let d = &func[def];
        if !d.uses().is_empty() || !d.is_deref() || encloses_call(func, val) {
            return false;
        }
        if !(func[val].is_phi() || config.noalias || d.is_safe()) {
            return false;
        }

        let Some(address) = d.operand(0) else {
            return false;
        };
        let nodes = func.post_order(address);
        let aliased = nodes
            .iter()
            .filter_map(|&n| func[n].def())
            .any(|used| func[used].uses().iter().any(|u| !nodes.contains(u)));
        !aliased || d.is_safe()
    }
}

/// Turns `x = f()` with `x` unused into a standalone `f()`.
pub struct DeadResults;

impl Pruning for DeadResults {
    const NAME: &'static str = "prune_dead_results";
    const EVENT: EventKind = EventKind::CallResultExtracted;

    fn select(&self, func: &Function, def: ExprId, val: ExprId, _: &OptimizerConfig) -> bool {
        func[def].uses().is_empty() && func[def].is_reg() && func[val].is_call()
    }

    fn prepare(&self, func: &mut Function, def: ExprId, val: ExprId) -> Result<()> {
        let call = func.pluck_expr(val)?;
        let assign = func.top_of(def);
        func.push_expr_after(call, assign)?;
        Ok(())
    }
}

/// Removes `x_2 = Φ(.., x_2, ..)` when the phi is the only reader of `x_2`.
pub struct SinglePhi;

impl Pruning for SinglePhi {
    const NAME: &'static str = "prune_single_phi";
    const EVENT: EventKind = EventKind::PhiPruned;

    fn select(&self, func: &Function, def: ExprId, val: ExprId, _: &OptimizerConfig) -> bool {
        let &[use_] = func[def].uses() else {
            return false;
        };
        func[val].is_phi() && func.parent_expr(use_) == Some(val)
    }
}

/// Removes `x_3 = x_2` when its only reader is a phi assigned back to `x_2`:
///
/// ```text
/// x_2 = Φ(x_1, x_3)
/// ...
/// x_3 = x_2
/// ```
///
/// The phi argument is dropped along with the definition.
pub struct CircularPhi;

impl Pruning for CircularPhi {
    const NAME: &'static str = "prune_circular_phi";
    const EVENT: EventKind = EventKind::PhiPruned;

    fn select(&self, func: &Function, def: ExprId, val: ExprId, _: &OptimizerConfig) -> bool {
        let &[use_] = func[def].uses() else {
            return false;
        };
        let Some(phi) = func.parent_expr(use_).filter(|&p| func[p].is_phi()) else {
            return false;
        };
        let Some(assign) = func.parent_expr(phi).filter(|&a| func[a].is_assign()) else {
            return false;
        };
        func[assign]
            .operand(0)
            .is_some_and(|target| func.equals(target, val))
    }

    fn prepare(&self, func: &mut Function, def: ExprId, _: ExprId) -> Result<()> {
        for use_ in func[def].uses().to_vec() {
            func.discard_expr(use_);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{passes::tests::Harness, PruningPass},
        ir::BinaryOp,
    };

    #[test]
    fn test_dead_registers() {
        let mut h = Harness::new();
        let x = h.func.reg_ssa("x", 32, 1);
        let one = h.func.val(1, 32);
        h.assign(0x1000, x, one);

        let target = h.func.val(0x2000, 64);
        let call = h.func.call(target, &[]);
        let y = h.func.reg_ssa("y", 32, 1);
        let two = h.func.val(2, 32);
        let sum = h.func.binary(BinaryOp::Add, call, two);
        h.assign(0x1004, y, sum);
        h.link();

        assert!(h.run(&PruningPass(DeadRegisters)).unwrap());
        assert_eq!(h.text(), "y_1 = 0x2000() + 2;\n");
        assert!(!h.func.is_tracked(x));
        assert_eq!(h.events.count_kind(EventKind::DefinitionPruned), 1);
        h.func.validate().unwrap();
    }

    #[test]
    fn test_pruning_unlinks_uses() {
        let mut h = Harness::new();
        let a = h.func.reg_ssa("a", 32, 1);
        let one = h.func.val(1, 32);
        h.assign(0x1000, a, one);
        let a_use = h.func.reg_ssa("a", 32, 1);
        let b = h.func.reg_ssa("b", 32, 1);
        h.assign(0x1004, b, a_use);
        h.link();

        // b_1 goes in the first sweep; a_1 loses its only use and follows in
        // the next.
        assert!(h.run(&PruningPass(DeadRegisters)).unwrap());
        assert!(h.func[a].uses().is_empty());
        h.func.validate().unwrap();
        assert!(h.run(&PruningPass(DeadRegisters)).unwrap());
        assert_eq!(h.text(), "");
    }

    #[test]
    fn test_dead_dereferences_need_safety() {
        let mut h = Harness::new();
        let p = h.func.reg_ssa("p", 64, 1);
        let store = h.func.deref(p);
        h.func.set_index(store, Some(1));
        let zero = h.func.val(0, 32);
        h.assign(0x1000, store, zero);
        h.link();

        assert!(!h.run(&PruningPass(DeadDereferences)).unwrap());

        h.func.mark_safe(store);
        assert!(h.run(&PruningPass(DeadDereferences)).unwrap());
        assert_eq!(h.text(), "");
        h.func.validate().unwrap();
    }

    #[test]
    fn test_dead_dereferences_with_noalias() {
        let mut h = Harness::new();
        h.config = OptimizerConfig::aggressive();

        // The address uses p_1, which is also read elsewhere: presumed aliased.
        let p = h.func.reg_ssa("p", 64, 1);
        let store = h.func.deref(p);
        h.func.set_index(store, Some(1));
        let zero = h.func.val(0, 32);
        h.assign(0x1000, store, zero);
        let read = h.func.reg_ssa("p", 64, 1);
        let q = h.func.reg_ssa("q", 64, 1);
        h.assign(0x1004, q, read);

        // A write through an address nobody else reads is dropped.
        let r = h.func.reg_ssa("r", 64, 1);
        let other = h.func.deref(r);
        h.func.set_index(other, Some(1));
        let one = h.func.val(1, 32);
        h.assign(0x1008, other, one);
        h.link();

        assert!(h.run(&PruningPass(DeadDereferences)).unwrap());
        assert_eq!(h.text(), "*(p_1)_1 = 0;\nq_1 = p_1;\n");
    }

    #[test]
    fn test_dead_results_keep_call() {
        let mut h = Harness::new();
        let target = h.func.val(0x2000, 64);
        let arg = h.func.reg_ssa("a", 32, 1);
        let call = h.func.call(target, &[arg]);
        let eax = h.func.reg_ssa("eax", 32, 1);
        h.assign(0x1000, eax, call);
        h.link();

        assert!(h.run(&PruningPass(DeadResults)).unwrap());
        assert_eq!(h.text(), "0x2000(a_1);\n");
        assert!(h.events.has(EventKind::CallResultExtracted));
        h.func.validate().unwrap();

        // The call argument is still a tracked use.
        let weak_a = h.func.defs().find(|&d| h.func.location_key(d) == "a").unwrap();
        assert_eq!(h.func[weak_a].uses(), &[arg]);
    }

    #[test]
    fn test_single_phi() {
        let mut h = Harness::new();
        let x1 = h.func.reg_ssa("x", 32, 1);
        let zero = h.func.val(0, 32);
        h.assign(0x1000, x1, zero);

        let arg1 = h.func.reg_ssa("x", 32, 1);
        let arg2 = h.func.reg_ssa("x", 32, 2);
        let phi = h.func.phi(&[arg1, arg2]);
        let x2 = h.func.reg_ssa("x", 32, 2);
        h.assign(0x1004, x2, phi);
        h.link();

        assert!(h.run(&PruningPass(SinglePhi)).unwrap());
        assert_eq!(h.text(), "x_1 = 0;\n");
        assert!(h.func[x1].uses().is_empty());
        h.func.validate().unwrap();
    }

    #[test]
    fn test_circular_phi() {
        let mut h = Harness::new();
        let x1 = h.func.reg_ssa("x", 32, 1);
        let zero = h.func.val(0, 32);
        h.assign(0x1000, x1, zero);

        let arg1 = h.func.reg_ssa("x", 32, 1);
        let arg3 = h.func.reg_ssa("x", 32, 3);
        let phi = h.func.phi(&[arg1, arg3]);
        let x2 = h.func.reg_ssa("x", 32, 2);
        h.assign(0x1004, x2, phi);

        let x2_use = h.func.reg_ssa("x", 32, 2);
        let x3 = h.func.reg_ssa("x", 32, 3);
        h.assign(0x1008, x3, x2_use);
        h.link();

        assert!(h.run(&PruningPass(CircularPhi)).unwrap());
        assert_eq!(h.text(), "x_1 = 0;\nx_2 = Φ(x_1);\n");
        assert!(h.func[x2].uses().is_empty());
        h.func.validate().unwrap();
    }
}
