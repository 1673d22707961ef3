//! Structural verification of a compilation unit.
//!
//! Catches generator bugs (unterminated blocks, dangling value or block
//! references, malformed phis) before a unit is accepted by the backend.
//! Returns the first problem found as a message naming the function.

use std::collections::HashSet;

use super::instr::{BlockId, Function, Instr, Module, Terminator, ValueId};

/// Verify every function of `module`, returning the first error found.
pub fn verify_module(module: &Module) -> Result<(), String> {
    let mut seen = HashSet::new();
    for function in &module.functions {
        if !seen.insert(function.name.as_str()) {
            return Err(format!("duplicate symbol '{}' in unit", function.name));
        }
        if !function.is_declaration() {
            verify_function(function)?;
        }
    }
    Ok(())
}

fn verify_function(func: &Function) -> Result<(), String> {
    let block_count = func.blocks.len() as u32;
    let fail = |message: String| Err(format!("function '{}': {message}", func.name));

    // Slots are the alloca-defined values; loads and stores must only
    // address these.
    let slots: HashSet<ValueId> = func
        .blocks
        .iter()
        .flat_map(|b| &b.instrs)
        .filter(|(_, instr)| matches!(instr, Instr::Alloca { .. }))
        .map(|(id, _)| *id)
        .collect();

    let check_value = |id: ValueId, context: &str| -> Result<(), String> {
        if id.0 >= func.value_count {
            return fail(format!("{context} references undefined value {id}"));
        }
        Ok(())
    };
    let check_block = |id: BlockId, context: &str| -> Result<(), String> {
        if id.0 >= block_count {
            return fail(format!("{context} references missing block"));
        }
        Ok(())
    };

    let mut predecessors: Vec<HashSet<u32>> = vec![HashSet::new(); func.blocks.len()];
    for (index, block) in func.blocks.iter().enumerate() {
        let terminator = match &block.terminator {
            Some(terminator) => terminator,
            None => return fail(format!("block '{}' has no terminator", block.label)),
        };
        match terminator {
            Terminator::Br { target } => check_block(*target, "br")?,
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => {
                check_value(*cond, "conditional br")?;
                check_block(*then_block, "conditional br")?;
                check_block(*else_block, "conditional br")?;
            }
            Terminator::Ret { value } => check_value(*value, "ret")?,
        }
        for successor in terminator.successors() {
            predecessors[successor.0 as usize].insert(index as u32);
        }
    }

    for (index, block) in func.blocks.iter().enumerate() {
        let mut past_phis = false;
        for (_, instr) in &block.instrs {
            match instr {
                Instr::Phi { incoming } => {
                    if past_phis {
                        return fail(format!(
                            "phi after non-phi instruction in block '{}'",
                            block.label
                        ));
                    }
                    let incoming_blocks: HashSet<u32> =
                        incoming.iter().map(|(_, block)| block.0).collect();
                    if incoming_blocks != predecessors[index] {
                        return fail(format!(
                            "phi in block '{}' does not cover its predecessors",
                            block.label
                        ));
                    }
                    for (value, block) in incoming {
                        check_value(*value, "phi")?;
                        check_block(*block, "phi")?;
                    }
                }
                _ => past_phis = true,
            }
            match instr {
                Instr::Const(_) | Instr::Alloca { .. } | Instr::Phi { .. } => {}
                Instr::Load { slot } => {
                    check_value(*slot, "load")?;
                    if !slots.contains(slot) {
                        return fail(format!("load from non-slot value {slot}"));
                    }
                }
                Instr::Store { slot, value } => {
                    check_value(*slot, "store")?;
                    check_value(*value, "store")?;
                    if !slots.contains(slot) {
                        return fail(format!("store to non-slot value {slot}"));
                    }
                }
                Instr::Add { lhs, rhs }
                | Instr::Sub { lhs, rhs }
                | Instr::Mul { lhs, rhs }
                | Instr::Cmp { lhs, rhs, .. } => {
                    check_value(*lhs, "arithmetic")?;
                    check_value(*rhs, "arithmetic")?;
                }
                Instr::BoolToNum { value } => check_value(*value, "uitofp")?,
                Instr::Call { args, .. } => {
                    for arg in args {
                        check_value(*arg, "call")?;
                    }
                }
            }
        }
    }

    Ok(())
}
