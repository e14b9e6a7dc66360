//! Propagation policies.
//!
//! Replacement values are deep copies of the assigned expression that keep
//! their SSA subscripts and def links, so the registry stays exact.

use crate::{
    analysis::Rewrite,
    compiler::{
        passes::{encloses_call, encloses_deref, impure, is_entry_value, non_const},
        EventKind, OptimizerConfig, Propagation,
    },
    ir::{BinaryOp, ExprId, ExprKind, Function, UnaryOp},
};

/// Propagates literal-valued definitions.
///
/// Uses that are phi arguments are skipped to keep phi elimination simple,
/// and so are operands of address-of, since the address of a literal means
/// nothing.
pub struct ConstantPropagation;

impl Propagation for ConstantPropagation {
    const NAME: &'static str = "propagate_constants";
    const EVENT: EventKind = EventKind::ConstantPropagated;

    fn select(&self, func: &Function, def: ExprId, val: ExprId, config: &OptimizerConfig) -> bool {
        let d = &func[def];
        !is_entry_value(func, def)
            && (!d.is_deref() || d.is_safe() || config.noalias)
            && func[val].is_val()
    }

    fn generate(&self, func: &Function, use_: ExprId, val: ExprId) -> Option<Rewrite> {
        match func.parent_expr(use_).map(|p| func[p].kind()) {
            Some(ExprKind::Phi | ExprKind::Unary(UnaryOp::AddrOf)) => None,
            _ => Some(Rewrite::Copy(val)),
        }
    }
}

/// Substitutes definitions with exactly one use, then removes them.
///
/// The use must sit in the definition's container (or be a phi argument), or
/// the value must be a literal. Values with side effects are only moved when
/// nothing between the definition and the use could observe the move:
///
/// - a value enclosing a call: no call or memory access in between
/// - a memory write: no call or memory access in between
/// - a value reading memory: no call or memory write in between
pub struct SingleUsePropagation;

impl SingleUsePropagation {
    fn interferes(
        func: &Function,
        def: ExprId,
        use_: ExprId,
        pred: fn(&Function, ExprId) -> bool,
    ) -> bool {
        let (Some(def_stmt), Some(use_stmt)) = (func.stmt_of(def), func.stmt_of(use_)) else {
            return true;
        };
        let Some(cntr) = func[def_stmt].parent() else {
            return true;
        };
        let statements = func[cntr].statements();
        let (Some(from), Some(to)) = (
            statements.iter().position(|&s| s == def_stmt),
            statements.iter().position(|&s| s == use_stmt),
        ) else {
            return false;
        };

        statements
            .iter()
            .take(to)
            .skip(from + 1)
            .any(|&s| func[s].expressions().iter().any(|&e| pred(func, e)))
    }
}

impl Propagation for SingleUsePropagation {
    const NAME: &'static str = "propagate_single_use";
    const EVENT: EventKind = EventKind::CopyPropagated;

    fn select(&self, func: &Function, def: ExprId, val: ExprId, _: &OptimizerConfig) -> bool {
        if is_entry_value(func, def) || func[val].is_phi() {
            return false;
        }
        let &[use_] = func[def].uses() else {
            return false;
        };

        let def_cntr = func.stmt_of(def).and_then(|s| func[s].parent());
        let use_cntr = func.stmt_of(use_).and_then(|s| func[s].parent());
        let phi_arg = func.parent_expr(use_).is_some_and(|p| func[p].is_phi());
        if !(def_cntr == use_cntr || phi_arg || func[val].is_val()) {
            return false;
        }

        if encloses_call(func, val) || encloses_deref(func, def) {
            !Self::interferes(func, def, use_, non_const)
        } else if encloses_deref(func, val) {
            !Self::interferes(func, def, use_, impure)
        } else {
            true
        }
    }

    fn generate(&self, func: &Function, use_: ExprId, val: ExprId) -> Option<Rewrite> {
        let into_phi = func.parent_expr(use_).is_some_and(|p| func[p].is_phi());
        if into_phi && !(func[use_].is_reg() && func[val].is_reg()) {
            return None;
        }
        Some(Rewrite::Copy(val))
    }

    fn consumes_definition(&self) -> bool {
        true
    }
}

/// Propagates register values into the address computation of memory
/// writes, looking through `+`, `-` and `&` chains.
///
/// Values that call a function are never moved; values that read memory are
/// only moved when aliasing is disabled.
pub struct DereferencePropagation;

impl Propagation for DereferencePropagation {
    const NAME: &'static str = "propagate_dereferenced";
    const EVENT: EventKind = EventKind::DereferencePropagated;

    fn select(&self, func: &Function, def: ExprId, val: ExprId, config: &OptimizerConfig) -> bool {
        !is_entry_value(func, def)
            && func[def].is_reg()
            && !func[val].is_phi()
            && !encloses_call(func, val)
            && (config.noalias || !encloses_deref(func, val))
    }

    fn generate(&self, func: &Function, use_: ExprId, val: ExprId) -> Option<Rewrite> {
        let mut parent = func.parent_expr(use_)?;
        while matches!(
            func[parent].binary_op(),
            Some(BinaryOp::Add | BinaryOp::Sub | BinaryOp::And)
        ) {
            parent = func.parent_expr(parent)?;
        }
        let p = &func[parent];
        (p.is_deref() && p.is_def()).then_some(Rewrite::Copy(val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{passes::tests::Harness, PropagationPass};

    #[test]
    fn test_constant_propagation() {
        let mut h = Harness::new();
        let x = h.func.reg_ssa("x", 32, 1);
        let four = h.func.val(4, 32);
        h.assign(0x1000, x, four);

        let x_use = h.func.reg_ssa("x", 32, 1);
        let one = h.func.val(1, 32);
        let sum = h.func.binary(BinaryOp::Add, x_use, one);
        let y = h.func.reg_ssa("y", 32, 1);
        h.assign(0x1004, y, sum);
        h.link();

        assert!(h.run(&PropagationPass(ConstantPropagation)).unwrap());
        assert_eq!(h.text(), "x_1 = 4;\ny_1 = 5;\n");
        assert!(h.func[x].uses().is_empty());
        assert!(h.events.has(EventKind::ConstantPropagated));
        assert!(h.events.has(EventKind::ExpressionSimplified));
        h.func.validate().unwrap();

        // Nothing left to do.
        assert!(!h.run(&PropagationPass(ConstantPropagation)).unwrap());
    }

    #[test]
    fn test_constant_skips_phi_and_address_of() {
        let mut h = Harness::new();
        let x = h.func.reg_ssa("x", 32, 1);
        let zero = h.func.val(0, 32);
        h.assign(0x1000, x, zero);

        let arg = h.func.reg_ssa("x", 32, 1);
        let other = h.func.reg_ssa("x", 32, 2);
        let phi = h.func.phi(&[arg, other]);
        let x3 = h.func.reg_ssa("x", 32, 3);
        h.assign(0x1004, x3, phi);

        let taken = h.func.reg_ssa("x", 32, 1);
        let addr = h.func.unary(UnaryOp::AddrOf, taken);
        let p = h.func.reg_ssa("p", 64, 1);
        h.assign(0x1008, p, addr);
        h.link();

        assert!(!h.run(&PropagationPass(ConstantPropagation)).unwrap());
        assert_eq!(h.func[x].uses().len(), 2);
    }

    #[test]
    fn test_constant_never_from_entry_values() {
        let mut h = Harness::new();
        let x = h.func.reg_ssa("x", 32, 0);
        let seven = h.func.val(7, 32);
        h.assign(0x1000, x, seven);
        let use_ = h.func.reg_ssa("x", 32, 0);
        let y = h.func.reg_ssa("y", 32, 1);
        h.assign(0x1004, y, use_);

        // A read of a never-written register gets a weak `z_1 = 0`.
        let z = h.func.reg_ssa("z", 32, 1);
        let w = h.func.reg_ssa("w", 32, 1);
        h.assign(0x1008, w, z);
        h.link();

        assert!(!h.run(&PropagationPass(ConstantPropagation)).unwrap());
        assert_eq!(h.text(), "x_0 = 7;\ny_1 = x_0;\nw_1 = z_1;\n");
    }

    #[test]
    fn test_single_use_moves_value() {
        let mut h = Harness::new();
        let a = h.func.reg_ssa("a", 32, 1);
        let b = h.func.reg_ssa("b", 32, 1);
        let sum = h.func.binary(BinaryOp::Add, a, b);
        let t = h.func.reg_ssa("t", 32, 1);
        h.assign(0x1000, t, sum);

        let t_use = h.func.reg_ssa("t", 32, 1);
        let two = h.func.val(2, 32);
        let prod = h.func.binary(BinaryOp::Mul, t_use, two);
        let r = h.func.reg_ssa("r", 32, 1);
        h.assign(0x1004, r, prod);
        h.link();

        assert!(h.run(&PropagationPass(SingleUsePropagation)).unwrap());
        assert_eq!(h.text(), "r_1 = (a_1 + b_1) * 2;\n");
        assert!(h.func.get_expr(t).is_none());
        h.func.validate().unwrap();

        // a_1 keeps exactly one use: the moved copy.
        let weak_a = h.func.defs().find(|&d| h.func.location_key(d) == "a").unwrap();
        assert_eq!(h.func[weak_a].uses().len(), 1);
    }

    #[test]
    fn test_single_use_respects_interference() {
        let mut h = Harness::new();
        let p = h.func.reg_ssa("p", 64, 1);
        let load = h.func.deref(p);
        h.func.set_index(load, Some(1));
        let t = h.func.reg_ssa("t", 32, 1);
        h.assign(0x1000, t, load);

        // A store between the load and its use blocks the move.
        let q = h.func.reg_ssa("q", 64, 1);
        let store = h.func.deref(q);
        h.func.set_index(store, Some(2));
        let zero = h.func.val(0, 32);
        h.assign(0x1004, store, zero);

        let t_use = h.func.reg_ssa("t", 32, 1);
        let r = h.func.reg_ssa("r", 32, 1);
        h.assign(0x1008, r, t_use);
        h.link();

        assert!(!h.run(&PropagationPass(SingleUsePropagation)).unwrap());
        assert!(h.func.get_expr(t).is_some());
    }

    #[test]
    fn test_single_use_call_without_interference() {
        let mut h = Harness::new();
        let target = h.func.val(0x2000, 64);
        let call = h.func.call(target, &[]);
        let t = h.func.reg_ssa("t", 32, 1);
        h.assign(0x1000, t, call);

        let t_use = h.func.reg_ssa("t", 32, 1);
        let r = h.func.reg_ssa("r", 32, 1);
        h.assign(0x1004, r, t_use);
        h.link();

        assert!(h.run(&PropagationPass(SingleUsePropagation)).unwrap());
        assert_eq!(h.text(), "r_1 = 0x2000();\n");
    }

    #[test]
    fn test_dereference_propagation() {
        let mut h = Harness::new();
        let esp0 = h.func.reg_ssa("esp", 32, 0);
        let four = h.func.val(4, 32);
        let sub = h.func.binary(BinaryOp::Sub, esp0, four);
        let esp1 = h.func.reg_ssa("esp", 32, 1);
        h.assign(0x1000, esp1, sub);

        let esp_use = h.func.reg_ssa("esp", 32, 1);
        let eight = h.func.val(8, 32);
        let addr = h.func.binary(BinaryOp::Add, esp_use, eight);
        let store = h.func.deref(addr);
        h.func.set_index(store, Some(1));
        let val = h.func.val(1, 32);
        h.assign(0x1004, store, val);

        // A plain read is left alone.
        let read = h.func.reg_ssa("esp", 32, 1);
        let eax = h.func.reg_ssa("eax", 32, 1);
        h.assign(0x1008, eax, read);
        h.link();

        assert!(h.run(&PropagationPass(DereferencePropagation)).unwrap());
        assert_eq!(
            h.text(),
            "esp_1 = esp_0 - 4;\n*(esp_0 + 4)_1 = 1;\neax_1 = esp_1;\n"
        );
        assert_eq!(h.func[esp1].uses().len(), 1);
        h.func.validate().unwrap();
    }
}
