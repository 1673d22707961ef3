use std::collections::HashMap;

use crate::ir::fold::optimize_module;
use crate::ir::verify::verify_module;
use crate::ir::{BlockId, CmpPredicate, Function, Instr, Module, Terminator};

use super::{Backend, BackendError, EntryPoint, UnitHandle};

/// Default maximum call depth.
const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Native function signature: arity plus implementation.
type NativeFn = fn(&[f64]) -> f64;

/// Execution engine over SSA units.
///
/// Units are kept in insertion order; symbol resolution scans newest
/// first, so redefining a function makes subsequent calls use the latest
/// body while older units stay intact. Symbols no unit defines fall back
/// to a small table of native functions, which is what makes
/// `extern sin(a);` callable.
pub struct JitEngine {
    units: Vec<(UnitHandle, Module)>,
    next_handle: u64,
    max_call_depth: usize,
    natives: HashMap<String, (usize, NativeFn)>,
}

impl JitEngine {
    /// Create an engine with the default native table.
    pub fn new() -> Self {
        let mut natives: HashMap<String, (usize, NativeFn)> = HashMap::new();
        natives.insert("sin".to_string(), (1, native_sin));
        natives.insert("cos".to_string(), (1, native_cos));
        natives.insert("sqrt".to_string(), (1, native_sqrt));
        natives.insert("putchard".to_string(), (1, native_putchard));
        natives.insert("printd".to_string(), (1, native_printd));

        Self {
            units: Vec::new(),
            next_handle: 0,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            natives,
        }
    }

    /// Create an engine with a custom call depth limit.
    pub fn with_call_depth_limit(limit: usize) -> Self {
        Self {
            max_call_depth: limit,
            ..Self::new()
        }
    }

    /// Discard every unit.
    pub fn clear(&mut self) {
        self.units.clear();
    }

    /// Find the newest defining occurrence of `name`.
    fn find_function(&self, name: &str) -> Option<&Function> {
        self.units.iter().rev().find_map(|(_, unit)| {
            unit.get_function(name).filter(|f| !f.is_declaration())
        })
    }

    fn execute(&self, name: &str, args: &[f64], depth: usize) -> Result<f64, BackendError> {
        if let Some(func) = self.find_function(name) {
            return self.run_function(func, args, depth);
        }
        if let Some((arity, native)) = self.natives.get(name) {
            if args.len() != *arity {
                return Err(BackendError::Execution(format!(
                    "native '{name}' expects {arity} argument(s), got {}",
                    args.len()
                )));
            }
            return Ok(native(args));
        }
        Err(BackendError::UnresolvedSymbol(name.to_string()))
    }

    fn run_function(&self, func: &Function, args: &[f64], depth: usize) -> Result<f64, BackendError> {
        if depth >= self.max_call_depth {
            return Err(BackendError::CallDepthExceeded);
        }
        if args.len() != func.params.len() {
            return Err(BackendError::Execution(format!(
                "function '{}' expects {} argument(s), got {}",
                func.name,
                func.params.len(),
                args.len()
            )));
        }

        let mut frame = Frame::new(func);
        for (index, arg) in args.iter().enumerate() {
            frame.regs[index] = Value::Num(*arg);
        }

        let mut block = BlockId(0);
        let mut prev_block: Option<BlockId> = None;
        loop {
            let current = func.block(block);

            // Phis first, all against the same predecessor edge, before
            // any of their results become visible.
            let mut phi_writes = Vec::new();
            let mut rest = 0;
            for (id, instr) in &current.instrs {
                match instr {
                    Instr::Phi { incoming } => {
                        let pred = prev_block.ok_or_else(|| {
                            BackendError::Execution("phi reached with no predecessor".to_string())
                        })?;
                        let (value, _) =
                            incoming.iter().find(|(_, from)| *from == pred).ok_or_else(|| {
                                BackendError::Execution(
                                    "phi has no incoming edge for predecessor".to_string(),
                                )
                            })?;
                        phi_writes.push((*id, frame.regs[value.0 as usize]));
                        rest += 1;
                    }
                    _ => break,
                }
            }
            for (id, value) in phi_writes {
                frame.regs[id.0 as usize] = value;
            }

            for (id, instr) in &current.instrs[rest..] {
                let result = match instr {
                    Instr::Const(value) => Value::Num(*value),
                    Instr::Alloca { .. } => {
                        frame.slots.push(0.0);
                        Value::Slot(frame.slots.len() - 1)
                    }
                    Instr::Load { slot } => Value::Num(frame.slots[frame.slot(*slot)?]),
                    Instr::Store { slot, value } => {
                        let index = frame.slot(*slot)?;
                        frame.slots[index] = frame.num(*value)?;
                        Value::Undef
                    }
                    Instr::Add { lhs, rhs } => Value::Num(frame.num(*lhs)? + frame.num(*rhs)?),
                    Instr::Sub { lhs, rhs } => Value::Num(frame.num(*lhs)? - frame.num(*rhs)?),
                    Instr::Mul { lhs, rhs } => Value::Num(frame.num(*lhs)? * frame.num(*rhs)?),
                    Instr::Cmp { pred, lhs, rhs } => {
                        let lhs = frame.num(*lhs)?;
                        let rhs = frame.num(*rhs)?;
                        Value::Bool(match pred {
                            CmpPredicate::Lt => lhs < rhs,
                            CmpPredicate::Ne => lhs != rhs,
                        })
                    }
                    Instr::BoolToNum { value } => {
                        Value::Num(if frame.bool(*value)? { 1.0 } else { 0.0 })
                    }
                    Instr::Phi { .. } => {
                        return Err(BackendError::Execution(
                            "phi after non-phi instruction".to_string(),
                        ));
                    }
                    Instr::Call { callee, args } => {
                        let mut arg_vals = Vec::with_capacity(args.len());
                        for arg in args {
                            arg_vals.push(frame.num(*arg)?);
                        }
                        Value::Num(self.execute(callee, &arg_vals, depth + 1)?)
                    }
                };
                frame.regs[id.0 as usize] = result;
            }

            match current.terminator.as_ref().ok_or_else(|| {
                BackendError::Execution("fell off unterminated block".to_string())
            })? {
                Terminator::Br { target } => {
                    prev_block = Some(block);
                    block = *target;
                }
                Terminator::CondBr {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let taken = if frame.bool(*cond)? {
                        *then_block
                    } else {
                        *else_block
                    };
                    prev_block = Some(block);
                    block = taken;
                }
                Terminator::Ret { value } => return frame.num(*value),
            }
        }
    }
}

impl Default for JitEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for JitEngine {
    fn add_unit(&mut self, mut unit: Module) -> Result<UnitHandle, BackendError> {
        verify_module(&unit).map_err(BackendError::Verification)?;
        optimize_module(&mut unit);

        let handle = UnitHandle(self.next_handle);
        self.next_handle += 1;
        self.units.push((handle, unit));
        Ok(handle)
    }

    fn address_of(&self, name: &str) -> Option<EntryPoint<'_>> {
        if self.find_function(name).is_none() && !self.natives.contains_key(name) {
            return None;
        }
        let symbol = name.to_string();
        Some(EntryPoint::new(move |args| self.execute(&symbol, args, 0)))
    }

    fn remove_unit(&mut self, handle: UnitHandle) {
        self.units.retain(|(h, _)| *h != handle);
    }
}

/// One activation record: SSA registers plus the stack slots its allocas
/// created.
struct Frame {
    regs: Vec<Value>,
    slots: Vec<f64>,
}

impl Frame {
    fn new(func: &Function) -> Self {
        Self {
            regs: vec![Value::Undef; func.value_count as usize],
            slots: Vec::new(),
        }
    }

    fn num(&self, id: crate::ir::ValueId) -> Result<f64, BackendError> {
        match self.regs[id.0 as usize] {
            Value::Num(value) => Ok(value),
            other => Err(BackendError::Execution(format!(
                "expected number in {id}, found {other:?}"
            ))),
        }
    }

    fn bool(&self, id: crate::ir::ValueId) -> Result<bool, BackendError> {
        match self.regs[id.0 as usize] {
            Value::Bool(value) => Ok(value),
            other => Err(BackendError::Execution(format!(
                "expected boolean in {id}, found {other:?}"
            ))),
        }
    }

    fn slot(&self, id: crate::ir::ValueId) -> Result<usize, BackendError> {
        match self.regs[id.0 as usize] {
            Value::Slot(index) => Ok(index),
            other => Err(BackendError::Execution(format!(
                "expected slot in {id}, found {other:?}"
            ))),
        }
    }
}

/// Runtime value held in an SSA register.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Value {
    Num(f64),
    Bool(bool),
    /// Address of an alloca'd stack slot.
    Slot(usize),
    /// Not yet written on this path.
    Undef,
}

fn native_sin(args: &[f64]) -> f64 {
    args[0].sin()
}

fn native_cos(args: &[f64]) -> f64 {
    args[0].cos()
}

fn native_sqrt(args: &[f64]) -> f64 {
    args[0].sqrt()
}

fn native_putchard(args: &[f64]) -> f64 {
    print!("{}", args[0] as u8 as char);
    0.0
}

fn native_printd(args: &[f64]) -> f64 {
    println!("{}", args[0]);
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    fn unit_with(func: Function) -> Module {
        let mut module = Module::new("test");
        module.add_function(func);
        module
    }

    fn call(engine: &JitEngine, name: &str, args: &[f64]) -> Result<f64, BackendError> {
        engine
            .address_of(name)
            .ok_or_else(|| BackendError::UnresolvedSymbol(name.to_string()))?
            .call(args)
    }

    fn build_add_function() -> Function {
        let mut builder = FunctionBuilder::new("add", vec!["a".to_string(), "b".to_string()]);
        let a = builder.param(0);
        let b = builder.param(1);
        let sum = builder.build_add(a, b);
        builder.build_ret(sum);
        builder.finish()
    }

    #[test]
    fn test_add_unit_and_call() {
        let mut engine = JitEngine::new();
        engine
            .add_unit(unit_with(build_add_function()))
            .expect("add_unit failed");
        assert_eq!(call(&engine, "add", &[2.0, 3.0]), Ok(5.0));
    }

    #[test]
    fn test_malformed_unit_is_rejected() {
        let mut builder = FunctionBuilder::new("broken", vec![]);
        builder.build_const(1.0);
        // No terminator.
        let mut engine = JitEngine::new();
        let err = engine.add_unit(unit_with(builder.finish())).unwrap_err();
        assert!(matches!(err, BackendError::Verification(_)));
        assert!(engine.address_of("broken").is_none());
    }

    #[test]
    fn test_remove_unit_unresolves_symbol() {
        let mut engine = JitEngine::new();
        let handle = engine
            .add_unit(unit_with(build_add_function()))
            .expect("add_unit failed");
        assert!(engine.address_of("add").is_some());
        engine.remove_unit(handle);
        assert!(engine.address_of("add").is_none());
    }

    #[test]
    fn test_newest_definition_wins() {
        let mut engine = JitEngine::new();

        let mut builder = FunctionBuilder::new("f", vec![]);
        let one = builder.build_const(1.0);
        builder.build_ret(one);
        engine.add_unit(unit_with(builder.finish())).expect("add_unit failed");

        let mut builder = FunctionBuilder::new("f", vec![]);
        let two = builder.build_const(2.0);
        builder.build_ret(two);
        engine.add_unit(unit_with(builder.finish())).expect("add_unit failed");

        assert_eq!(call(&engine, "f", &[]), Ok(2.0));
    }

    #[test]
    fn test_declarations_resolve_to_other_units() {
        let mut engine = JitEngine::new();
        engine
            .add_unit(unit_with(build_add_function()))
            .expect("add_unit failed");

        // A caller unit that re-declares `add` and calls it.
        let mut builder = FunctionBuilder::new("caller", vec![]);
        let one = builder.build_const(1.0);
        let two = builder.build_const(2.0);
        let result = builder.build_call("add", vec![one, two]);
        builder.build_ret(result);
        let mut module = unit_with(builder.finish());
        module.add_function(Function::declaration(
            "add",
            vec!["a".to_string(), "b".to_string()],
        ));

        engine.add_unit(module).expect("add_unit failed");
        assert_eq!(call(&engine, "caller", &[]), Ok(3.0));
    }

    #[test]
    fn test_native_symbols_are_callable() {
        let engine = JitEngine::new();
        assert_eq!(call(&engine, "sqrt", &[9.0]), Ok(3.0));
        assert_eq!(call(&engine, "sin", &[0.0]), Ok(0.0));
    }

    #[test]
    fn test_unresolved_symbol() {
        let engine = JitEngine::new();
        assert!(engine.address_of("ghost").is_none());
    }

    #[test]
    fn test_call_depth_limit() {
        let mut engine = JitEngine::with_call_depth_limit(16);

        // f() calls itself forever.
        let mut builder = FunctionBuilder::new("f", vec![]);
        let inner = builder.build_call("f", vec![]);
        builder.build_ret(inner);
        engine.add_unit(unit_with(builder.finish())).expect("add_unit failed");

        assert_eq!(call(&engine, "f", &[]), Err(BackendError::CallDepthExceeded));
    }

    #[test]
    fn test_phi_selects_by_predecessor() {
        // if-shaped function: entry branches on the parameter, merge phi
        // picks 10 or 20.
        let mut builder = FunctionBuilder::new("pick", vec!["x".to_string()]);
        let then_block = builder.append_block("then");
        let else_block = builder.append_block("else");
        let merge = builder.append_block("merge");

        let zero = builder.build_const(0.0);
        let flag = builder.build_cmp(CmpPredicate::Ne, builder.param(0), zero);
        builder.build_cond_br(flag, then_block, else_block);

        builder.position_at_end(then_block);
        let ten = builder.build_const(10.0);
        builder.build_br(merge);

        builder.position_at_end(else_block);
        let twenty = builder.build_const(20.0);
        builder.build_br(merge);

        builder.position_at_end(merge);
        let phi = builder.build_phi(vec![(ten, then_block), (twenty, else_block)]);
        builder.build_ret(phi);

        let mut engine = JitEngine::new();
        engine.add_unit(unit_with(builder.finish())).expect("add_unit failed");
        assert_eq!(call(&engine, "pick", &[1.0]), Ok(10.0));
        assert_eq!(call(&engine, "pick", &[0.0]), Ok(20.0));
    }

    #[test]
    fn test_clear_discards_all_units() {
        let mut engine = JitEngine::new();
        engine
            .add_unit(unit_with(build_add_function()))
            .expect("add_unit failed");
        engine.clear();
        assert!(engine.address_of("add").is_none());
    }
}
