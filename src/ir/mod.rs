//! SSA intermediate representation.
//!
//! A [`instr::Module`] is one compilation unit: the IR for a single
//! top-level statement, handed to the backend and then discarded by the
//! front end. Functions are lists of labeled basic blocks; every block ends
//! in exactly one terminator, and control-flow merges select values through
//! phi instructions.

pub mod builder;
pub mod fold;
pub mod instr;
pub mod verify;

pub use builder::FunctionBuilder;
pub use instr::{Block, BlockId, CmpPredicate, Function, Instr, Module, Terminator, ValueId};
