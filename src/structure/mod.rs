//! Control-flow structuring.
//!
//! The [`Structurer`] turns the raw jumps ending each basic block into
//! continuation links and loop statements. Classification compares the jump
//! target with the address of the jumping block:
//!
//! | Terminator | Target | Result |
//! |------------|--------|--------|
//! | `branch` | block of this function | `next` set to the taken target |
//! | `branch` | anything else | orphan edge, left unresolved |
//! | `goto` | above the block | `next` set to the target; a loop test at the target is folded into a `while` |
//! | `goto` | at or below the block | replaced by a `do-while` over the blocks from the target to the latch |
//! | `goto` | unknown or outside | left unresolved |
//!
//! Address comparison misreads layouts where the compiler placed blocks out of
//! order. With [`StructurerConfig::verify_back_edges`] every loop is checked
//! against the dominator tree afterwards; a disagreement only produces a
//! warning.
//!
//! Unresolved jumps are not errors. The statement keeps its raw form, gets the
//! unresolved marker and the function is structured as far as possible.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    compiler::{EventKind, EventLog, StructurerConfig},
    ir::{Function, StmtId, StmtKind},
    utils::graph::algorithms::compute_dominators,
    Result,
};

/// Classification of one basic block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// No jump at the end; control continues at the fall-through block.
    Fallthrough {
        /// The fall-through block, if any.
        next: Option<u64>,
    },
    /// Conditional jump to a block of this function.
    Branch {
        /// Taken target.
        taken: u64,
    },
    /// Jump to a higher address.
    Forward {
        /// Jump target.
        target: u64,
        /// Head of the pre-tested loop whose test sits at `target`, if any.
        loop_head: Option<u64>,
    },
    /// Jump to the same or a lower address: the latch of a post-tested loop.
    Backward {
        /// First block of the loop.
        head: u64,
    },
    /// Loop test claimed by a forward jump into it.
    LoopTest {
        /// First block of the loop body.
        head: u64,
    },
    /// The jump target is unknown or lies outside the function.
    Unresolved {
        /// The literal target, when there is one.
        target: Option<u64>,
    },
}

impl Shape {
    /// Does this block close a loop?
    #[must_use]
    pub fn is_loop(&self) -> bool {
        matches!(self, Shape::Backward { .. } | Shape::LoopTest { .. })
    }
}

/// Result of structuring one function.
#[derive(Debug, Clone, Default)]
pub struct StructureReport {
    /// Classification of every block, by address.
    pub shapes: BTreeMap<u64, Shape>,
    /// Unresolved edges and failed loop verifications.
    pub warnings: Vec<String>,
}

impl StructureReport {
    /// Number of loops built.
    #[must_use]
    pub fn loops(&self) -> usize {
        self.shapes.values().filter(|s| s.is_loop()).count()
    }

    /// Addresses of the blocks left unresolved.
    pub fn unresolved(&self) -> impl Iterator<Item = u64> + '_ {
        self.shapes
            .iter()
            .filter(|(_, s)| matches!(s, Shape::Unresolved { .. }))
            .map(|(&a, _)| a)
    }
}

/// A block's classification together with the jump it was derived from.
struct Plan {
    shape: Shape,
    jump: Option<StmtId>,
}

/// A loop to build, spanning the blocks `head..=latch`.
struct LoopRegion {
    head: u64,
    latch: u64,
    jump: StmtId,
    pre_tested: bool,
}

/// Address-driven control-flow structurer.
///
/// # Examples
///
/// ```rust
/// use decompcore::{compiler::{EventLog, StructurerConfig}, ir::Function, structure::Structurer};
///
/// let mut func = Function::new(0x10);
/// let block = func.add_block(0x10, Some(0x10), None)?;
/// let head = func.val(0x10, 32);
/// let latch = func.goto(0x18, head);
/// func.push_stmt(block, latch)?;
///
/// let report = Structurer::new(StructurerConfig::default()).run(&mut func, &EventLog::new())?;
/// assert_eq!(report.loops(), 1);
/// # Ok::<(), decompcore::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Structurer {
    config: StructurerConfig,
}

impl Structurer {
    /// Creates a structurer with the given settings.
    #[must_use]
    pub fn new(config: StructurerConfig) -> Self {
        Self { config }
    }

    /// Structures `func` in place.
    ///
    /// # Errors
    ///
    /// Returns an error if the IR turns out to be inconsistent while
    /// statements are moved, or if the control flow graph cannot be built for
    /// back-edge verification.
    pub fn run(&self, func: &mut Function, events: &EventLog) -> Result<StructureReport> {
        let mut report = StructureReport::default();
        if func.block_count() == 0 {
            return Ok(report);
        }

        link_fallthroughs(func);
        let plans = classify(func);

        let mut regions = Vec::new();
        for (&address, plan) in &plans {
            report.shapes.insert(address, plan.shape);
            apply(func, address, plan, events, &mut report);

            match (plan.shape, plan.jump) {
                (Shape::Backward { head }, Some(jump)) => regions.push(LoopRegion {
                    head,
                    latch: address,
                    jump,
                    pre_tested: false,
                }),
                (Shape::LoopTest { head }, Some(jump)) => regions.push(LoopRegion {
                    head,
                    latch: address,
                    jump,
                    pre_tested: true,
                }),
                _ => {}
            }
        }

        // Inner loops first, so their statements move along with the outer body.
        regions.sort_by_key(|r| (r.latch - r.head, r.head));
        for region in &regions {
            build_loop(func, region)?;
            events
                .record(EventKind::LoopStructured)
                .at(func.address(), region.latch)
                .message(format!(
                    "{} {:#x}..={:#x}",
                    if region.pre_tested { "while" } else { "do-while" },
                    region.head,
                    region.latch
                ));
        }

        if self.config.verify_back_edges && !regions.is_empty() {
            verify_back_edges(func, &regions, events, &mut report)?;
        }

        Ok(report)
    }
}

/// Records the continuation of one block and marks unresolved jumps.
fn apply(
    func: &mut Function,
    address: u64,
    plan: &Plan,
    events: &EventLog,
    report: &mut StructureReport,
) {
    let fail = func
        .block(address)
        .and_then(|b| b.fail())
        .filter(|&a| func.block(a).is_some());

    let next = match plan.shape {
        Shape::Fallthrough { next } => next,
        Shape::Branch { taken } => {
            events
                .record(EventKind::BranchLinked)
                .at(func.address(), address)
                .message(format!("{:#x} -> {:#x}", address, taken));
            Some(taken)
        }
        Shape::Forward { target, .. } => Some(target),
        Shape::Backward { .. } | Shape::LoopTest { .. } => fail,
        Shape::Unresolved { target } => {
            let warning = match target {
                Some(target) => format!(
                    "function {:#x}: unresolved edge {:#x} -> {:#x}",
                    func.address(),
                    address,
                    target
                ),
                None => format!(
                    "function {:#x}: indirect jump at block {:#x}",
                    func.address(),
                    address
                ),
            };
            log::warn!("{}", warning);
            events
                .record(EventKind::EdgeUnresolved)
                .at(func.address(), address)
                .message(warning.clone());
            report.warnings.push(warning);

            if let Some(jump) = plan.jump {
                func[jump].unresolved = true;
            }
            None
        }
    };

    if let Some(block) = func.block_mut(address) {
        block.next = next;
        block.unresolved = matches!(plan.shape, Shape::Unresolved { .. });
    }
}

/// Points every block container at the container of its fall-through block,
/// or of its jump target when it has none.
fn link_fallthroughs(func: &mut Function) {
    let links: Vec<_> = func
        .blocks()
        .map(|b| {
            let next = b
                .fail()
                .and_then(|a| func.block(a))
                .or_else(|| b.jump().and_then(|a| func.block(a)))
                .map(|n| n.container());
            (b.container(), next)
        })
        .collect();

    for (cntr, next) in links {
        func.set_fallthrough(cntr, next);
    }
}

/// Literal target of a `goto` or the taken target of a `branch`.
fn jump_target(func: &Function, stmt: StmtId) -> Option<u64> {
    let s = &func[stmt];
    let dest = match s.kind() {
        StmtKind::Goto => s.dest()?,
        StmtKind::Branch => s.taken()?,
        _ => return None,
    };
    func[dest].value().map(|(v, _)| v)
}

/// Classifies every block in ascending address order.
fn classify(func: &Function) -> BTreeMap<u64, Plan> {
    let mut plans = BTreeMap::new();
    let mut claimed = BTreeSet::new();

    for block in func.blocks() {
        let address = block.address();
        if claimed.contains(&address) {
            continue;
        }

        let Some(jump) = func
            .terminator(block.container())
            .filter(|&s| func[s].kind().is_jump())
        else {
            let next = block.fail().filter(|&a| func.block(a).is_some());
            plans.insert(
                address,
                Plan {
                    shape: Shape::Fallthrough { next },
                    jump: None,
                },
            );
            continue;
        };

        let target = jump_target(func, jump);
        let known = target.filter(|&t| func.block(t).is_some());
        let shape = match (func[jump].kind(), known) {
            (_, None) => Shape::Unresolved { target },
            (StmtKind::Branch, Some(taken)) => Shape::Branch { taken },
            (_, Some(target)) if target <= address => Shape::Backward { head: target },
            (_, Some(target)) => {
                let test = loop_test(func, address, target).filter(|_| !claimed.contains(&target));
                if let Some((head, test_jump)) = test {
                    claimed.insert(target);
                    plans.insert(
                        target,
                        Plan {
                            shape: Shape::LoopTest { head },
                            jump: Some(test_jump),
                        },
                    );
                }
                Shape::Forward {
                    target,
                    loop_head: test.map(|(head, _)| head),
                }
            }
        };

        plans.insert(
            address,
            Plan {
                shape,
                jump: Some(jump),
            },
        );
    }

    plans
}

/// Does the block at `target` end in a jump back to a block between `from`
/// (exclusive) and itself? Returns that block and the jump.
fn loop_test(func: &Function, from: u64, target: u64) -> Option<(u64, StmtId)> {
    let block = func.block(target)?;
    let jump = func
        .terminator(block.container())
        .filter(|&s| func[s].kind().is_jump())?;
    let head = jump_target(func, jump)?;
    (from < head && head <= target && func.block(head).is_some()).then_some((head, jump))
}

/// Moves the statements of the blocks `head..=latch` into a new loop body
/// and puts the loop statement where the closing jump was.
fn build_loop(func: &mut Function, region: &LoopRegion) -> Result<()> {
    let body = func.new_container(region.head);

    let containers: Vec<_> = func
        .blocks()
        .filter(|b| (region.head..=region.latch).contains(&b.address()))
        .map(|b| b.container())
        .collect();
    for cntr in containers {
        let statements = func[cntr].statements().to_vec();
        for stmt in statements.into_iter().filter(|&s| s != region.jump) {
            func.pluck_stmt(stmt, false)?;
            func.push_stmt(body, stmt)?;
        }
    }

    let address = func[region.jump].address();
    let cond = match (region.pre_tested, func[region.jump].kind()) {
        (true, StmtKind::Branch) => match func[region.jump].cond() {
            Some(cond) => func.pluck_expr(cond)?,
            None => func.val(1, 0),
        },
        _ => func.val(1, 0),
    };
    let stmt = if region.pre_tested {
        func.while_stmt(address, cond, body)
    } else {
        func.do_while(address, cond, body)
    };

    func.replace_stmt(region.jump, stmt)?;
    func.pluck_stmt(region.jump, true)?;
    Ok(())
}

/// Checks that every loop head dominates its latch.
fn verify_back_edges(
    func: &Function,
    regions: &[LoopRegion],
    events: &EventLog,
    report: &mut StructureReport,
) -> Result<()> {
    let cfg = func.cfg()?;
    let dom = compute_dominators(&cfg)?;

    for region in regions {
        let confirmed = match (cfg.get_node(&region.head), cfg.get_node(&region.latch)) {
            (Some(head), Some(latch)) => dom.is_reachable(latch) && dom.dominates(head, latch),
            _ => false,
        };
        if !confirmed {
            let warning = format!(
                "function {:#x}: loop {:#x}..={:#x} has no dominating head",
                func.address(),
                region.head,
                region.latch
            );
            log::warn!("{}", warning);
            events
                .record(EventKind::Warning)
                .at(func.address(), region.latch)
                .message(warning.clone());
            report.warnings.push(warning);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::CntrId;

    fn stmt(func: &mut Function, cntr: CntrId, address: u64, name: &str) {
        let lhs = func.reg_ssa(name, 32, 1);
        let one = func.val(1, 32);
        let assign = func.assign(lhs, one);
        let s = func.expr_stmt(address, assign);
        func.push_stmt(cntr, s).unwrap();
    }

    fn goto(func: &mut Function, cntr: CntrId, address: u64, target: u64) {
        let dest = func.val(target, 32);
        let s = func.goto(address, dest);
        func.push_stmt(cntr, s).unwrap();
    }

    fn branch(func: &mut Function, cntr: CntrId, address: u64, taken: u64, not_taken: u64) {
        let cond = func.reg_ssa("c", 1, 1);
        let t = func.val(taken, 32);
        let n = func.val(not_taken, 32);
        let s = func.branch(address, cond, t, n);
        func.push_stmt(cntr, s).unwrap();
    }

    fn structure(func: &mut Function, config: StructurerConfig) -> (StructureReport, EventLog) {
        let events = EventLog::new();
        let report = Structurer::new(config).run(func, &events).unwrap();
        (report, events)
    }

    #[test]
    fn test_backward_goto_builds_do_while() {
        let mut func = Function::new(0x10);
        let head = func.add_block(0x10, None, Some(0x20)).unwrap();
        stmt(&mut func, head, 0x10, "a");
        let latch = func.add_block(0x20, Some(0x10), None).unwrap();
        stmt(&mut func, latch, 0x20, "b");
        goto(&mut func, latch, 0x24, 0x10);

        let (report, events) = structure(&mut func, StructurerConfig::default());

        assert_eq!(report.shapes[&0x20], Shape::Backward { head: 0x10 });
        assert_eq!(report.loops(), 1);
        assert!(func[head].is_empty());
        assert_eq!(
            func.display_cntr(latch).to_string(),
            "do {\n    a_1 = 1;\n    b_1 = 1;\n} while (1);\n"
        );
        assert!(events.has(EventKind::LoopStructured));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_self_loop() {
        let mut func = Function::new(0x10);
        let block = func.add_block(0x10, Some(0x10), None).unwrap();
        stmt(&mut func, block, 0x10, "a");
        goto(&mut func, block, 0x14, 0x10);

        let (report, _) = structure(&mut func, StructurerConfig::default());

        assert_eq!(report.shapes[&0x10], Shape::Backward { head: 0x10 });
        assert_eq!(
            func.display_cntr(block).to_string(),
            "do {\n    a_1 = 1;\n} while (1);\n"
        );
    }

    #[test]
    fn test_branch_links_next() {
        let mut func = Function::new(0x10);
        let entry = func.add_block(0x10, Some(0x30), Some(0x20)).unwrap();
        branch(&mut func, entry, 0x10, 0x30, 0x20);
        func.add_block(0x20, None, Some(0x30)).unwrap();
        func.add_block(0x30, None, None).unwrap();

        let (report, events) = structure(&mut func, StructurerConfig::default());

        assert_eq!(func.block(0x10).unwrap().next(), Some(0x30));
        assert_eq!(func.block(0x20).unwrap().next(), Some(0x30));
        assert_eq!(func.block(0x30).unwrap().next(), None);
        assert_eq!(report.shapes[&0x10], Shape::Branch { taken: 0x30 });
        assert!(events.has(EventKind::BranchLinked));
        assert!(report.warnings.is_empty());

        // Fall-through containers follow the else edge.
        let fallthrough = func.block(0x20).unwrap().container();
        assert_eq!(func[entry].fallthrough(), Some(fallthrough));
    }

    #[test]
    fn test_missing_target_is_unresolved() {
        let mut func = Function::new(0x10);
        let block = func.add_block(0x10, Some(0x999), None).unwrap();
        goto(&mut func, block, 0x10, 0x999);

        let (report, events) = structure(&mut func, StructurerConfig::default());

        assert_eq!(
            report.shapes[&0x10],
            Shape::Unresolved {
                target: Some(0x999)
            }
        );
        assert!(func.block(0x10).unwrap().is_unresolved());
        assert_eq!(func.block(0x10).unwrap().next(), None);
        assert_eq!(func.display_cntr(block).to_string(), "goto 0x999; // unresolved\n");
        assert_eq!(report.unresolved().collect::<Vec<_>>(), [0x10]);
        assert_eq!(events.count_kind(EventKind::EdgeUnresolved), 1);
    }

    #[test]
    fn test_orphan_branch_and_indirect_jump() {
        let mut func = Function::new(0x10);
        let entry = func.add_block(0x10, Some(0x5000), Some(0x20)).unwrap();
        branch(&mut func, entry, 0x10, 0x5000, 0x20);
        let indirect = func.add_block(0x20, None, None).unwrap();
        let eax = func.reg_ssa("eax", 32, 1);
        let s = func.goto(0x20, eax);
        func.push_stmt(indirect, s).unwrap();

        let (report, _) = structure(&mut func, StructurerConfig::default());

        assert_eq!(
            report.shapes[&0x10],
            Shape::Unresolved {
                target: Some(0x5000)
            }
        );
        assert_eq!(report.shapes[&0x20], Shape::Unresolved { target: None });
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_forward_goto_into_loop_test() {
        // 0x10: goto 0x30
        // 0x20: a_1 = 1
        // 0x30: branch c_1, 0x20, 0x40
        // 0x40: return
        let mut func = Function::new(0x10);
        let entry = func.add_block(0x10, Some(0x30), None).unwrap();
        goto(&mut func, entry, 0x10, 0x30);
        let body = func.add_block(0x20, None, Some(0x30)).unwrap();
        stmt(&mut func, body, 0x20, "a");
        let test = func.add_block(0x30, Some(0x20), Some(0x40)).unwrap();
        branch(&mut func, test, 0x30, 0x20, 0x40);
        let exit = func.add_block(0x40, None, None).unwrap();
        let ret = func.return_stmt(0x40, None);
        func.push_stmt(exit, ret).unwrap();

        let (report, _) = structure(&mut func, StructurerConfig::default());

        assert_eq!(
            report.shapes[&0x10],
            Shape::Forward {
                target: 0x30,
                loop_head: Some(0x20)
            }
        );
        assert_eq!(report.shapes[&0x30], Shape::LoopTest { head: 0x20 });
        assert_eq!(func.block(0x10).unwrap().next(), Some(0x30));
        assert_eq!(func.block(0x30).unwrap().next(), Some(0x40));
        assert!(func[body].is_empty());
        assert_eq!(
            func.display_cntr(test).to_string(),
            "while (c_1) {\n    a_1 = 1;\n}\n"
        );
    }

    #[test]
    fn test_nested_loops() {
        // 0x10: a; 0x20: b; goto 0x20; 0x30: c; goto 0x10
        let mut func = Function::new(0x10);
        let outer = func.add_block(0x10, None, Some(0x20)).unwrap();
        stmt(&mut func, outer, 0x10, "a");
        let inner = func.add_block(0x20, Some(0x20), Some(0x30)).unwrap();
        stmt(&mut func, inner, 0x20, "b");
        goto(&mut func, inner, 0x24, 0x20);
        let latch = func.add_block(0x30, Some(0x10), None).unwrap();
        stmt(&mut func, latch, 0x30, "c");
        goto(&mut func, latch, 0x34, 0x10);

        let (report, _) = structure(&mut func, StructurerConfig::default());

        assert_eq!(report.loops(), 2);
        assert_eq!(
            func.display_cntr(latch).to_string(),
            "do {\n    a_1 = 1;\n    do {\n        b_1 = 1;\n    } while (1);\n    c_1 = 1;\n} while (1);\n"
        );
    }

    #[test]
    fn test_verify_back_edges_warns_on_reordered_layout() {
        // The entry sits above its successor, so the jump looks backward.
        let mut func = Function::new(0x30);
        func.add_block(0x10, None, None).unwrap();
        let entry = func.add_block(0x30, Some(0x10), None).unwrap();
        func.set_entry(0x30).unwrap();
        goto(&mut func, entry, 0x30, 0x10);

        let config = StructurerConfig {
            verify_back_edges: true,
        };
        let (report, events) = structure(&mut func, config);

        assert_eq!(report.loops(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(events.has(EventKind::Warning));
    }

    #[test]
    fn test_verify_back_edges_accepts_real_loops() {
        let mut func = Function::new(0x10);
        let head = func.add_block(0x10, None, Some(0x20)).unwrap();
        stmt(&mut func, head, 0x10, "a");
        let latch = func.add_block(0x20, Some(0x10), None).unwrap();
        goto(&mut func, latch, 0x20, 0x10);

        let config = StructurerConfig {
            verify_back_edges: true,
        };
        let (report, _) = structure(&mut func, config);
        assert!(report.warnings.is_empty());
    }
}
