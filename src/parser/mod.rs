//! Syntactic analysis: token stream to AST.
//!
//! Parsing is stateful beyond the token stream: user operator declarations
//! update the [`operators::OperatorTable`] while the prototype is parsed,
//! so precedence lookups later in the same session see the new entry.

pub mod ast;
pub mod operators;
#[allow(clippy::module_inception)]
pub mod parser;

pub use ast::{FunctionAst, Item, Prototype, PrototypeKind};
pub use operators::{DisplacedOperator, OperatorArity, OperatorEntry, OperatorTable};
pub use parser::{ParsedStatement, Parser};
