use crate::error::CodegenError;
use crate::ir::{BlockId, CmpPredicate, Function, FunctionBuilder, Module, ValueId};
use crate::parser::ast::{Expr, FunctionAst, Prototype};

use super::env::{PrototypeRegistry, SymbolEnvironment};

/// Translates parsed statements into SSA compilation units.
///
/// One unit is generated per statement; the registry it borrows is
/// session-scoped and survives across units, so calls can resolve to
/// functions whose defining unit has already been handed off.
pub struct IrGenerator<'a> {
    registry: &'a mut PrototypeRegistry,
}

impl<'a> IrGenerator<'a> {
    pub fn new(registry: &'a mut PrototypeRegistry) -> Self {
        Self { registry }
    }

    /// Process an `extern` declaration: the prototype is recorded for
    /// call-site resolution, nothing is emitted.
    pub fn declare_extern(&mut self, proto: &Prototype) -> Result<(), CodegenError> {
        self.registry.declare(proto.clone()).map(|_| ())
    }

    /// Generate the unit for a function definition (or a wrapped top-level
    /// expression).
    ///
    /// The prototype is registered before the body is generated so the
    /// function can call itself. If body generation fails, the unit is
    /// discarded whole and the registry entry is restored to whatever was
    /// there before the attempt.
    pub fn generate_function(
        &mut self,
        func: &FunctionAst,
        unit_name: &str,
    ) -> Result<Module, CodegenError> {
        let prior = self.registry.declare(func.proto.clone())?;
        match generate_unit(self.registry, func, unit_name) {
            Ok(module) => Ok(module),
            Err(err) => {
                self.registry.restore(&func.proto.name, prior);
                Err(err)
            }
        }
    }
}

fn generate_unit(
    registry: &PrototypeRegistry,
    func: &FunctionAst,
    unit_name: &str,
) -> Result<Module, CodegenError> {
    let mut cg = FunctionCodegen {
        registry,
        proto: &func.proto,
        builder: FunctionBuilder::new(func.proto.name.clone(), func.proto.params.clone()),
        env: SymbolEnvironment::new(),
        declarations: Vec::new(),
    };

    // Parameters live in stack slots like every other binding, so `=` can
    // assign to them.
    for (index, param) in func.proto.params.iter().enumerate() {
        let value = cg.builder.param(index);
        let slot = cg.builder.build_alloca(param);
        cg.builder.build_store(slot, value);
        cg.env.bind(param, slot);
    }

    let ret = cg.gen_expr(&func.body)?;
    cg.builder.build_ret(ret);

    let mut module = Module::new(unit_name);
    module.add_function(cg.builder.finish());
    for declaration in cg.declarations {
        module.add_function(declaration);
    }
    Ok(module)
}

/// State for translating one function body.
struct FunctionCodegen<'r> {
    registry: &'r PrototypeRegistry,
    proto: &'r Prototype,
    builder: FunctionBuilder,
    env: SymbolEnvironment,
    /// Callees from earlier units, re-declared into this unit on first use.
    declarations: Vec<Function>,
}

impl FunctionCodegen<'_> {
    fn gen_expr(&mut self, expr: &Expr) -> Result<ValueId, CodegenError> {
        match expr {
            Expr::Number(value) => Ok(self.builder.build_const(*value)),

            Expr::Variable(name) => {
                let slot = self
                    .env
                    .lookup(name)
                    .ok_or_else(|| CodegenError::UndefinedVariable(name.clone()))?;
                Ok(self.builder.build_load(slot))
            }

            Expr::Unary { op, operand } => {
                let operand_val = self.gen_expr(operand)?;
                let callee = format!("unary{op}");
                self.resolve_callee(&callee)
                    .ok_or(CodegenError::UnresolvedUnaryOperator(*op))?;
                Ok(self.builder.build_call(&callee, vec![operand_val]))
            }

            Expr::Binary { op: '=', lhs, rhs } => self.gen_assignment(lhs, rhs),

            Expr::Binary { op, lhs, rhs } => {
                let lhs_val = self.gen_expr(lhs)?;
                let rhs_val = self.gen_expr(rhs)?;
                match op {
                    '+' => Ok(self.builder.build_add(lhs_val, rhs_val)),
                    '-' => Ok(self.builder.build_sub(lhs_val, rhs_val)),
                    '*' => Ok(self.builder.build_mul(lhs_val, rhs_val)),
                    '<' => {
                        // No boolean type in the language: widen the
                        // comparison back to a number immediately.
                        let flag = self.builder.build_cmp(CmpPredicate::Lt, lhs_val, rhs_val);
                        Ok(self.builder.build_bool_to_num(flag))
                    }
                    _ => {
                        let callee = format!("binary{op}");
                        self.resolve_callee(&callee)
                            .ok_or(CodegenError::UnresolvedBinaryOperator(*op))?;
                        Ok(self.builder.build_call(&callee, vec![lhs_val, rhs_val]))
                    }
                }
            }

            Expr::Call { callee, args } => {
                let expected = self
                    .resolve_callee(callee)
                    .ok_or_else(|| CodegenError::UndefinedCallee(callee.clone()))?;
                if expected != args.len() {
                    return Err(CodegenError::ArityMismatch {
                        name: callee.clone(),
                        expected,
                        got: args.len(),
                    });
                }
                let mut arg_vals = Vec::with_capacity(args.len());
                for arg in args {
                    arg_vals.push(self.gen_expr(arg)?);
                }
                Ok(self.builder.build_call(callee, arg_vals))
            }

            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => self.gen_if(cond, then_branch, else_branch),

            Expr::For {
                var,
                start,
                end,
                step,
                body,
            } => {
                let start_val = self.gen_expr(start)?;
                let slot = self.builder.build_alloca(var);
                self.builder.build_store(slot, start_val);

                let loop_block = self.builder.append_block("loop");
                let after_block = self.builder.append_block("afterloop");

                // The loop variable shadows any outer binding only while
                // the condition, step, and body are generated.
                let prior = self.env.bind(var, slot);
                let result =
                    self.gen_for_loop(end, step.as_deref(), body, slot, loop_block, after_block);
                self.env.restore(var, prior);
                result
            }

            Expr::Var { bindings, body } => {
                let mut saved = Vec::new();
                let result = self.gen_var_scope(bindings, body, &mut saved);
                // Unwind every binding, error paths included, newest first
                // so duplicate names land back on the outermost value.
                for (name, prior) in saved.into_iter().rev() {
                    self.env.restore(&name, prior);
                }
                result
            }
        }
    }

    /// `lhs = rhs` where `lhs` must be a bare variable. Assignment is an
    /// expression; its value is the stored value.
    fn gen_assignment(&mut self, lhs: &Expr, rhs: &Expr) -> Result<ValueId, CodegenError> {
        let name = match lhs {
            Expr::Variable(name) => name,
            _ => return Err(CodegenError::InvalidAssignmentTarget),
        };
        let value = self.gen_expr(rhs)?;
        let slot = self
            .env
            .lookup(name)
            .ok_or_else(|| CodegenError::UndefinedVariable(name.clone()))?;
        self.builder.build_store(slot, value);
        Ok(value)
    }

    fn gen_if(
        &mut self,
        cond: &Expr,
        then_branch: &Expr,
        else_branch: &Expr,
    ) -> Result<ValueId, CodegenError> {
        let cond_flag = self.gen_truthiness(cond)?;

        let then_block = self.builder.append_block("then");
        let else_block = self.builder.append_block("else");
        let merge_block = self.builder.append_block("merge");
        self.builder.build_cond_br(cond_flag, then_block, else_block);

        self.builder.position_at_end(then_block);
        let then_val = self.gen_expr(then_branch)?;
        // Nested control flow moves the insertion point; the edge into the
        // merge block leaves wherever the branch ended up.
        let then_end = self.builder.current_block();
        self.builder.build_br(merge_block);

        self.builder.position_at_end(else_block);
        let else_val = self.gen_expr(else_branch)?;
        let else_end = self.builder.current_block();
        self.builder.build_br(merge_block);

        self.builder.position_at_end(merge_block);
        Ok(self
            .builder
            .build_phi(vec![(then_val, then_end), (else_val, else_end)]))
    }

    fn gen_for_loop(
        &mut self,
        end: &Expr,
        step: Option<&Expr>,
        body: &Expr,
        slot: ValueId,
        loop_block: BlockId,
        after_block: BlockId,
    ) -> Result<ValueId, CodegenError> {
        // Guard before the first iteration: a loop whose condition starts
        // false must never run its body.
        let entry_cond = self.gen_truthiness(end)?;
        self.builder.build_cond_br(entry_cond, loop_block, after_block);

        self.builder.position_at_end(loop_block);
        // The body is evaluated for effect; its value is discarded.
        self.gen_expr(body)?;

        let step_val = match step {
            Some(expr) => self.gen_expr(expr)?,
            None => self.builder.build_const(1.0),
        };
        let current = self.builder.build_load(slot);
        let next = self.builder.build_add(current, step_val);
        self.builder.build_store(slot, next);

        let continue_cond = self.gen_truthiness(end)?;
        self.builder
            .build_cond_br(continue_cond, loop_block, after_block);

        self.builder.position_at_end(after_block);
        // A for expression always yields 0, whatever the trip count.
        Ok(self.builder.build_const(0.0))
    }

    fn gen_var_scope(
        &mut self,
        bindings: &[(String, Option<Expr>)],
        body: &Expr,
        saved: &mut Vec<(String, Option<ValueId>)>,
    ) -> Result<ValueId, CodegenError> {
        for (name, init) in bindings {
            // The initializer runs before the name is bound, so it sees
            // the outer binding; earlier names in the same list are
            // already visible.
            let init_val = match init {
                Some(expr) => self.gen_expr(expr)?,
                None => self.builder.build_const(0.0),
            };
            let slot = self.builder.build_alloca(name);
            self.builder.build_store(slot, init_val);
            saved.push((name.clone(), self.env.bind(name, slot)));
        }
        self.gen_expr(body)
    }

    /// Truthiness test: compare against zero for not-equal.
    fn gen_truthiness(&mut self, expr: &Expr) -> Result<ValueId, CodegenError> {
        let value = self.gen_expr(expr)?;
        let zero = self.builder.build_const(0.0);
        Ok(self.builder.build_cmp(CmpPredicate::Ne, value, zero))
    }

    /// Resolve a callee name to its parameter count, re-declaring it into
    /// the current unit when it lives in an earlier one.
    fn resolve_callee(&mut self, name: &str) -> Option<usize> {
        if name == self.proto.name {
            return Some(self.proto.params.len());
        }
        if let Some(declaration) = self.declarations.iter().find(|d| d.name == name) {
            return Some(declaration.params.len());
        }
        let proto = self.registry.lookup(name)?;
        let arity = proto.params.len();
        self.declarations
            .push(Function::declaration(proto.name.clone(), proto.params.clone()));
        Some(arity)
    }
}
