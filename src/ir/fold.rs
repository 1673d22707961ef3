//! Constant folding, the backend's fixed optimization pipeline.
//!
//! Arithmetic whose operands are both constants is rewritten to a constant
//! in place. Values defined by a `Const` are constant on every path, so no
//! dominance analysis is needed; comparisons, loads, and phis are left
//! alone.

use std::collections::HashMap;

use super::instr::{Function, Instr, Module, ValueId};

/// Run the optimization pipeline over every defined function in the unit.
pub fn optimize_module(module: &mut Module) {
    for function in &mut module.functions {
        if !function.is_declaration() {
            fold_constants(function);
        }
    }
}

/// Fold constant arithmetic inside one function.
pub fn fold_constants(func: &mut Function) {
    let mut constants: HashMap<ValueId, f64> = HashMap::new();

    for block in &mut func.blocks {
        for (id, instr) in &mut block.instrs {
            let folded = match instr {
                Instr::Const(value) => {
                    constants.insert(*id, *value);
                    continue;
                }
                Instr::Add { lhs, rhs } => fold_binary(&constants, *lhs, *rhs, |a, b| a + b),
                Instr::Sub { lhs, rhs } => fold_binary(&constants, *lhs, *rhs, |a, b| a - b),
                Instr::Mul { lhs, rhs } => fold_binary(&constants, *lhs, *rhs, |a, b| a * b),
                _ => None,
            };
            if let Some(value) = folded {
                constants.insert(*id, value);
                *instr = Instr::Const(value);
            }
        }
    }
}

fn fold_binary(
    constants: &HashMap<ValueId, f64>,
    lhs: ValueId,
    rhs: ValueId,
    op: impl Fn(f64, f64) -> f64,
) -> Option<f64> {
    let lhs = constants.get(&lhs)?;
    let rhs = constants.get(&rhs)?;
    Some(op(*lhs, *rhs))
}
