//! Definition/use bookkeeping.
//!
//! The function keeps a registry of definition positions. Each registered
//! definition lists its uses, and each use points back at its definition. The
//! chains are derived from SSA subscripts by [`Function::link_defs`]: a use of
//! `eax_3` is linked to the definition of `eax_3`.
//!
//! A value read before it is ever written gets an implicit weak definition
//! `x_N = 0` in the function's uninit container, so every subscripted use has a
//! definition to point at.
//!
//! Passes must not iterate the registry while mutating the tree; they take a
//! [`defs_snapshot`](Function::defs_snapshot) first.

use std::{collections::HashMap, fmt};

use crate::{
    ir::{CloneTags, ExprId, ExprKind, ExprParent, Function},
    Error, Result,
};

impl Function {
    /// Registers `def` as a tracked definition.
    ///
    /// Registering a second definition of the same location and subscript is
    /// allowed but logged, since it breaks the single-assignment property.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DefUse`] if `def` is not a definition position.
    pub fn add_def(&mut self, def: ExprId) -> Result<()> {
        self.check_def_position(def)?;

        let idx = self[def].idx;
        let key = self.location_key(def);
        let clash = self
            .defs
            .iter()
            .filter(|&&other| other != def && self[other].idx == idx)
            .any(|&other| self.location_key(other) == key);
        if clash {
            self.warn_redefined(def);
        }

        self.defs.insert(def);
        Ok(())
    }

    fn check_def_position(&self, def: ExprId) -> Result<()> {
        if self[def].is_def {
            Ok(())
        } else {
            Err(Error::DefUse(format!(
                "{} is not a definition position",
                self.display_expr(def)
            )))
        }
    }

    fn warn_redefined(&self, def: ExprId) {
        log::warn!(
            "function {:#x}: {} is defined more than once",
            self.address(),
            self.display_expr(def)
        );
    }

    /// Links `use_` to the registered definition `def`.
    ///
    /// Any previous link of `use_` is dropped first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DefUse`] if `def` is not registered.
    pub fn add_use(&mut self, use_: ExprId, def: ExprId) -> Result<()> {
        if !self.defs.contains(&def) {
            return Err(Error::DefUse(format!(
                "{} is not a registered definition",
                self.display_expr(def)
            )));
        }
        self.unlink_use(use_);
        self[use_].def = Some(def);
        self[def].uses.push(use_);
        Ok(())
    }

    /// Removes the def link of `use_`, if it has one.
    pub fn unlink_use(&mut self, use_: ExprId) {
        if let Some(def) = self[use_].def.take() {
            if let Some(d) = self.exprs.get_mut(def.0).and_then(Option::as_mut) {
                d.uses.retain(|&u| u != use_);
            }
        }
    }

    /// Removes `def` from the registry without touching the tree.
    pub fn remove_def(&mut self, def: ExprId) {
        self.defs.remove(&def);
    }

    /// Returns `true` if `def` is a registered definition.
    #[must_use]
    pub fn is_tracked(&self, def: ExprId) -> bool {
        self.defs.contains(&def)
    }

    /// Iterates over the registered definitions in id order.
    pub fn defs(&self) -> impl Iterator<Item = ExprId> + '_ {
        self.defs.iter().copied()
    }

    /// Copies the registered definitions, for passes that mutate the tree
    /// while visiting them.
    #[must_use]
    pub fn defs_snapshot(&self) -> Vec<ExprId> {
        self.defs.iter().copied().collect()
    }

    /// Returns the assignment whose left-hand side is `def`, and its value.
    #[must_use]
    pub fn assignment_of(&self, def: ExprId) -> Option<(ExprId, ExprId)> {
        let ExprParent::Expr(assign) = self.get_expr(def)?.parent? else {
            return None;
        };
        let expr = &self[assign];
        (expr.kind == ExprKind::Assign && expr.operands.first() == Some(&def))
            .then(|| (assign, expr.operands[1]))
    }

    /// Rebuilds all def/use chains from SSA subscripts.
    ///
    /// Definitions are the subscripted registers and dereferences in assignment
    /// position; uses are the subscripted registers and dereferences elsewhere.
    /// Uses without a matching definition get an implicit weak definition.
    /// Returns the number of links made.
    ///
    /// # Errors
    ///
    /// Propagates registry errors; none are expected for a well-formed tree.
    pub fn link_defs(&mut self) -> Result<usize> {
        for slot in self.exprs.iter_mut().flatten() {
            slot.def = None;
            slot.uses.clear();
        }
        self.defs.clear();
        let stale: Vec<_> = self[self.uninit].statements.clone();
        for stmt in stale {
            self.pluck_stmt(stmt, true)?;
        }

        let mut roots: Vec<_> = self.blocks.values().map(|b| b.container).collect();
        roots.extend(self.body);
        let mut nodes = Vec::new();
        for root in roots {
            nodes.extend(self.exprs_in(root));
        }

        let mut by_key: HashMap<(String, u32), ExprId> = HashMap::new();
        for &node in &nodes {
            let expr = &self[node];
            if let (true, true, Some(idx)) = (expr.is_def, expr.is_location(), expr.idx) {
                // Clashes are found through the key map; the last definition wins.
                if by_key.insert((self.location_key(node), idx), node).is_some() {
                    self.warn_redefined(node);
                }
                self.check_def_position(node)?;
                self.defs.insert(node);
            }
        }

        let mut links = 0;
        for &node in &nodes {
            let expr = &self[node];
            let (false, true, Some(idx)) = (expr.is_def, expr.is_location(), expr.idx) else {
                continue;
            };
            let key = (self.location_key(node), idx);
            let def = match by_key.get(&key) {
                Some(&def) => def,
                None => {
                    let def = self.define_uninit(node)?;
                    by_key.insert(key, def);
                    def
                }
            };
            self.add_use(node, def)?;
            links += 1;
        }

        Ok(links)
    }

    /// Creates `x_N = 0` in the uninit container for a use of `x_N`.
    fn define_uninit(&mut self, use_: ExprId) -> Result<ExprId> {
        let def = self.clone_expr(use_, CloneTags::INDEX | CloneTags::SAFE);
        self[def].weak = true;
        let size = match self[use_].kind {
            ExprKind::Reg { size, .. } => size,
            _ => 0,
        };
        let zero = self.val(0, size);
        let assign = self.assign(def, zero);
        let stmt = self.expr_stmt(self.address(), assign);
        let uninit = self.uninit;
        self.push_stmt(uninit, stmt)?;
        self.check_def_position(def)?;
        self.defs.insert(def);
        Ok(def)
    }

    /// Checks def/use consistency.
    ///
    /// Every registered definition must be alive, attached and a definition
    /// position; every recorded use must point back at it; and every def link
    /// found on a use must name a registered, live definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DefUse`] describing the first inconsistency found.
    pub fn validate(&self) -> Result<()> {
        for &def in &self.defs {
            let Some(expr) = self.get_expr(def) else {
                return Err(Error::DefUse(format!("registered definition {:?} was discarded", def)));
            };
            if !expr.is_def {
                return Err(Error::DefUse(format!(
                    "registered {} is not a definition position",
                    self.display_expr(def)
                )));
            }
            if expr.parent.is_none() {
                return Err(Error::DefUse(format!(
                    "registered {} is detached",
                    self.display_expr(def)
                )));
            }
            for &use_ in &expr.uses {
                match self.get_expr(use_) {
                    Some(u) if u.def == Some(def) => {}
                    Some(_) => {
                        return Err(Error::DefUse(format!(
                            "use {} does not point back at {}",
                            self.display_expr(use_),
                            self.display_expr(def)
                        )))
                    }
                    None => {
                        return Err(Error::DefUse(format!(
                            "{} records discarded use {:?}",
                            self.display_expr(def),
                            use_
                        )))
                    }
                }
            }
        }

        for (i, slot) in self.exprs.iter().enumerate() {
            let Some(expr) = slot else { continue };
            if let Some(def) = expr.def {
                if !self.defs.contains(&def) || self.get_expr(def).is_none() {
                    return Err(Error::DefUse(format!(
                        "{} points at an untracked definition {:?}",
                        self.display_expr(ExprId(i)),
                        def
                    )));
                }
            }
        }
        Ok(())
    }

    /// Returns a printable table of definitions and their uses.
    #[must_use]
    pub fn def_use_table(&self) -> DefUseTable<'_> {
        DefUseTable { func: self }
    }
}

/// Display adapter listing every registered definition with its uses.
pub struct DefUseTable<'a> {
    func: &'a Function,
}

impl fmt::Display for DefUseTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for def in self.func.defs() {
            let expr = &self.func[def];
            let mut line = self.func.display_expr(def).to_string();
            if expr.weak {
                line.push_str(" (weak)");
            }
            writeln!(f, "{:<24} {} use(s)", line, expr.uses.len())?;
            for &use_ in &expr.uses {
                let site = self.func.stmt_of(use_).map_or_else(
                    || "<detached>".to_string(),
                    |s| format!("{:#x}", self.func[s].address()),
                );
                writeln!(f, "    {} @ {}", self.func.display_expr(self.func.top_of(use_)), site)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::{BinaryOp, CntrId, Function};

    use super::*;

    /// eax_1 = 5; ebx_1 = eax_1 + ecx_0
    fn sample() -> (Function, CntrId) {
        let mut f = Function::new(0x100);
        let block = f.add_block(0x100, None, None).unwrap();

        let eax = f.reg_ssa("eax", 32, 1);
        let five = f.val(5, 32);
        let a1 = f.assign(eax, five);
        let s1 = f.expr_stmt(0x100, a1);
        f.push_stmt(block, s1).unwrap();

        let ebx = f.reg_ssa("ebx", 32, 1);
        let eax_use = f.reg_ssa("eax", 32, 1);
        let ecx_use = f.reg_ssa("ecx", 32, 0);
        let sum = f.binary(BinaryOp::Add, eax_use, ecx_use);
        let a2 = f.assign(ebx, sum);
        let s2 = f.expr_stmt(0x104, a2);
        f.push_stmt(block, s2).unwrap();

        (f, block)
    }

    fn def_named(f: &Function, key: &str) -> ExprId {
        f.defs().find(|&d| f.location_key(d) == key).unwrap()
    }

    #[test]
    fn test_link_defs_builds_chains() {
        let (mut f, _) = sample();
        let links = f.link_defs().unwrap();

        assert_eq!(links, 2);
        assert_eq!(f.defs().count(), 3);
        let eax = def_named(&f, "eax");
        assert_eq!(f[eax].uses().len(), 1);
        assert_eq!(f[def_named(&f, "ebx")].uses().len(), 0);
        f.validate().unwrap();
    }

    #[test]
    fn test_undefined_use_gets_weak_def() {
        let (mut f, _) = sample();
        f.link_defs().unwrap();

        let ecx = def_named(&f, "ecx");
        assert!(f[ecx].is_weak());
        assert_eq!(f.stmt_of(ecx).map(|s| f[s].parent()), Some(Some(f.uninit_container())));
        assert_eq!(
            f.display_expr(f.top_of(ecx)).to_string(),
            "ecx_0 = 0"
        );
    }

    #[test]
    fn test_relink_is_stable() {
        let (mut f, _) = sample();
        f.link_defs().unwrap();
        f.link_defs().unwrap();

        assert_eq!(f.defs().count(), 3);
        assert_eq!(f[f.uninit_container()].len(), 1);
        f.validate().unwrap();
    }

    #[test]
    fn test_redefinition_links_to_last() {
        let (mut f, block) = sample();
        let again = f.reg_ssa("eax", 32, 1);
        let six = f.val(6, 32);
        let assign = f.assign(again, six);
        let stmt = f.expr_stmt(0x108, assign);
        f.push_stmt(block, stmt).unwrap();
        let read = f.reg_ssa("eax", 32, 1);
        let edx = f.reg_ssa("edx", 32, 1);
        let assign = f.assign(edx, read);
        let stmt = f.expr_stmt(0x10c, assign);
        f.push_stmt(block, stmt).unwrap();
        f.link_defs().unwrap();

        // Both stay registered; every read of eax_1 goes to the later one.
        assert_eq!(f.defs().filter(|&d| f.location_key(d) == "eax").count(), 2);
        assert_eq!(f[again].uses().len(), 2);
        assert_eq!(f[read].def(), Some(again));
        f.validate().unwrap();
    }

    #[test]
    fn test_link_defs_many_definitions() {
        let mut f = Function::new(0);
        let block = f.add_block(0, None, None).unwrap();
        for i in 0..5_000u64 {
            let reg = f.reg_ssa(format!("r{i}"), 32, 1);
            let val = f.val(i, 32);
            let assign = f.assign(reg, val);
            let stmt = f.expr_stmt(i * 4, assign);
            f.push_stmt(block, stmt).unwrap();
        }

        assert_eq!(f.link_defs().unwrap(), 0);
        assert_eq!(f.defs().count(), 5_000);
        f.validate().unwrap();
    }

    #[test]
    fn test_assignment_of() {
        let (mut f, _) = sample();
        f.link_defs().unwrap();
        let eax = def_named(&f, "eax");
        let (assign, value) = f.assignment_of(eax).unwrap();

        assert_eq!(f[value].value(), Some((5, 32)));
        assert_eq!(f[assign].operand(0), Some(eax));
        assert_eq!(f.assignment_of(value), None);
    }

    #[test]
    fn test_validate_detects_dangling_link() {
        let (mut f, _) = sample();
        f.link_defs().unwrap();
        let eax = def_named(&f, "eax");
        f.remove_def(eax);

        assert!(matches!(f.validate(), Err(Error::DefUse(_))));
    }

    #[test]
    fn test_add_use_requires_registered_def() {
        let (mut f, _) = sample();
        let stray = f.reg_ssa("edx", 32, 1);
        let other = f.reg_ssa("edx", 32, 1);
        f[stray].is_def = true;

        assert!(f.add_use(other, stray).is_err());
        f.add_def(stray).unwrap();
        f.add_use(other, stray).unwrap();
        assert_eq!(f[other].def(), Some(stray));
        assert!(f.add_def(other).is_err());
    }

    #[test]
    fn test_def_use_table() {
        let (mut f, _) = sample();
        f.link_defs().unwrap();
        let table = f.def_use_table().to_string();

        assert!(table.contains("eax_1"));
        assert!(table.contains("ecx_0 (weak)"));
        assert!(table.contains("eax_1 + ecx_0 @ 0x104"));
    }
}
