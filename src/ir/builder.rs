use super::instr::{Block, BlockId, CmpPredicate, Function, Instr, Terminator, ValueId};

/// Incremental construction of one IR function.
///
/// Mirrors the usual IR-builder discipline: blocks are appended up front
/// or as needed, the builder is positioned at the end of one block at a
/// time, and instructions are emitted at that position. Allocas are always
/// placed in the entry block regardless of the current position, so a
/// variable introduced inside a loop is allocated once per call, not once
/// per iteration.
pub struct FunctionBuilder {
    func: Function,
    current: BlockId,
}

impl FunctionBuilder {
    /// Start a definition for `name`. An entry block is created and made
    /// current; parameters occupy the first value ids.
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        let mut func = Function::declaration(name, params);
        func.blocks.push(Block::new("entry"));
        Self {
            func,
            current: BlockId(0),
        }
    }

    /// The SSA value of parameter `index`.
    pub fn param(&self, index: usize) -> ValueId {
        self.func.param_value(index)
    }

    /// Append a new block. The label is made unique within the function.
    pub fn append_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.func.blocks.len() as u32);
        let unique = if self.func.blocks.iter().any(|b| b.label == label) {
            format!("{label}{}", id.0)
        } else {
            label.to_string()
        };
        self.func.blocks.push(Block::new(unique));
        id
    }

    /// Move the insertion point to the end of `block`.
    pub fn position_at_end(&mut self, block: BlockId) {
        self.current = block;
    }

    /// The block instructions are currently inserted into. Callers that
    /// emit nested control flow re-read this after generating a subtree,
    /// since generation may have moved the insertion point.
    pub fn current_block(&self) -> BlockId {
        self.current
    }

    fn push(&mut self, instr: Instr) -> ValueId {
        let id = ValueId(self.func.value_count);
        self.func.value_count += 1;
        self.func.blocks[self.current.0 as usize]
            .instrs
            .push((id, instr));
        id
    }

    pub fn build_const(&mut self, value: f64) -> ValueId {
        self.push(Instr::Const(value))
    }

    /// Allocate a named stack slot in the entry block.
    pub fn build_alloca(&mut self, name: &str) -> ValueId {
        let id = ValueId(self.func.value_count);
        self.func.value_count += 1;
        self.func.blocks[0].instrs.insert(
            0,
            (
                id,
                Instr::Alloca {
                    name: name.to_string(),
                },
            ),
        );
        id
    }

    pub fn build_load(&mut self, slot: ValueId) -> ValueId {
        self.push(Instr::Load { slot })
    }

    pub fn build_store(&mut self, slot: ValueId, value: ValueId) {
        self.push(Instr::Store { slot, value });
    }

    pub fn build_add(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Instr::Add { lhs, rhs })
    }

    pub fn build_sub(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Instr::Sub { lhs, rhs })
    }

    pub fn build_mul(&mut self, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Instr::Mul { lhs, rhs })
    }

    pub fn build_cmp(&mut self, pred: CmpPredicate, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(Instr::Cmp { pred, lhs, rhs })
    }

    pub fn build_bool_to_num(&mut self, value: ValueId) -> ValueId {
        self.push(Instr::BoolToNum { value })
    }

    pub fn build_phi(&mut self, incoming: Vec<(ValueId, BlockId)>) -> ValueId {
        self.push(Instr::Phi { incoming })
    }

    pub fn build_call(&mut self, callee: &str, args: Vec<ValueId>) -> ValueId {
        self.push(Instr::Call {
            callee: callee.to_string(),
            args,
        })
    }

    pub fn build_br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br { target });
    }

    pub fn build_cond_br(&mut self, cond: ValueId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn build_ret(&mut self, value: ValueId) {
        self.terminate(Terminator::Ret { value });
    }

    fn terminate(&mut self, terminator: Terminator) {
        let block = &mut self.func.blocks[self.current.0 as usize];
        debug_assert!(block.terminator.is_none(), "block terminated twice");
        block.terminator = Some(terminator);
    }

    /// Finish construction and hand back the function.
    pub fn finish(self) -> Function {
        self.func
    }
}
