use std::fmt;

use tracing::{debug, trace};

use crate::backend::{Backend, BackendError, JitEngine, UnitHandle};
use crate::codegen::{IrGenerator, PrototypeRegistry};
use crate::error::CompilerResult;
use crate::parser::ast::{Item, ANON_FUNCTION};
use crate::parser::{OperatorTable, ParsedStatement, Parser};

/// Result of one successfully processed statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A `def` was compiled and its unit added to the backend.
    Defined { name: String },
    /// An `extern` was recorded in the prototype registry.
    Declared { name: String },
    /// A top-level expression was compiled, executed, and discarded.
    Value(f64),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Defined { name } => write!(f, "defined {name}"),
            Reply::Declared { name } => write!(f, "declared {name}"),
            Reply::Value(value) => write!(f, "{value}"),
        }
    }
}

/// One interactive or batch compilation session.
///
/// Owns the session-lived state: the operator table, the prototype
/// registry, and the backend. Statements are processed strictly one at a
/// time; each gets a fresh compilation unit, and a failed statement leaves
/// every piece of session state as it was before the attempt.
pub struct Session<B: Backend = JitEngine> {
    ops: OperatorTable,
    registry: PrototypeRegistry,
    backend: B,
    /// Handles of units kept alive for the rest of the session.
    retained: Vec<UnitHandle>,
    statement_index: u64,
}

impl Session<JitEngine> {
    /// Create a session backed by the in-crate execution engine.
    pub fn new() -> Self {
        Self::with_backend(JitEngine::new())
    }
}

impl Default for Session<JitEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Session<B> {
    /// Create a session over an arbitrary backend.
    pub fn with_backend(backend: B) -> Self {
        Self {
            ops: OperatorTable::new(),
            registry: PrototypeRegistry::new(),
            backend,
            retained: Vec::new(),
            statement_index: 0,
        }
    }

    /// The backend, for symbol lookups outside statement processing.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Restart the session: built-in operators only, empty registry, no
    /// units.
    pub fn reset(&mut self) {
        self.ops.reset();
        self.registry.reset();
        for handle in self.retained.drain(..) {
            self.backend.remove_unit(handle);
        }
        self.statement_index = 0;
    }

    /// Process every statement in `source`, one result per statement.
    ///
    /// A failed statement is reported and skipped; processing continues at
    /// the next `;`.
    pub fn eval(&mut self, source: &str) -> Vec<CompilerResult<Reply>> {
        let Self {
            ops,
            registry,
            backend,
            retained,
            statement_index,
        } = self;

        let mut parser = Parser::new(source, ops);
        let mut replies = Vec::new();
        loop {
            match parser.parse_statement() {
                Ok(None) => break,
                Ok(Some(parsed)) => {
                    let unit_name = format!("stmt{statement_index}");
                    *statement_index += 1;
                    replies.push(Self::handle_statement(
                        registry,
                        backend,
                        retained,
                        parser.operator_table_mut(),
                        &unit_name,
                        parsed,
                    ));
                }
                Err(err) => {
                    replies.push(Err(err));
                    parser.synchronize();
                }
            }
        }
        replies
    }

    fn handle_statement(
        registry: &mut PrototypeRegistry,
        backend: &mut B,
        retained: &mut Vec<UnitHandle>,
        ops: &mut OperatorTable,
        unit_name: &str,
        parsed: ParsedStatement,
    ) -> CompilerResult<Reply> {
        let ParsedStatement { item, displaced_op } = parsed;
        match item {
            Item::Definition(func) => {
                let unit = match IrGenerator::new(registry).generate_function(&func, unit_name) {
                    Ok(unit) => unit,
                    Err(err) => {
                        // The prototype's operator registration must not
                        // survive a failed body.
                        if let Some(displaced) = displaced_op {
                            ops.restore(displaced);
                        }
                        return Err(err.into());
                    }
                };
                debug!(unit = %unit, "generated definition");
                let handle = backend.add_unit(unit)?;
                retained.push(handle);
                trace!(name = %func.proto.name, "definition added to backend");
                Ok(Reply::Defined {
                    name: func.proto.name,
                })
            }

            Item::Extern(proto) => {
                if let Err(err) = IrGenerator::new(registry).declare_extern(&proto) {
                    if let Some(displaced) = displaced_op {
                        ops.restore(displaced);
                    }
                    return Err(err.into());
                }
                trace!(name = %proto.name, "extern declared");
                Ok(Reply::Declared { name: proto.name })
            }

            Item::TopLevel(func) => {
                let unit = IrGenerator::new(registry).generate_function(&func, unit_name)?;
                debug!(unit = %unit, "generated top-level expression");

                let handle = backend.add_unit(unit)?;
                let result = match backend.address_of(ANON_FUNCTION) {
                    Some(entry) => entry.call(&[]),
                    None => Err(BackendError::UnresolvedSymbol(ANON_FUNCTION.to_string())),
                };
                // The anonymous unit never outlives its evaluation.
                backend.remove_unit(handle);
                Ok(Reply::Value(result?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_display() {
        assert_eq!(
            Reply::Defined {
                name: "f".to_string()
            }
            .to_string(),
            "defined f"
        );
        assert_eq!(Reply::Value(3.5).to_string(), "3.5");
    }

    #[test]
    fn test_empty_source_yields_no_replies() {
        let mut session = Session::new();
        assert!(session.eval("").is_empty());
        assert!(session.eval(" ;; ").is_empty());
    }

    #[test]
    fn test_statement_replies() {
        let mut session = Session::new();
        let replies = session.eval("def f(x) x; extern sin(a); f(4);");
        assert_eq!(replies.len(), 3);
        assert!(matches!(&replies[0], Ok(Reply::Defined { name }) if name == "f"));
        assert!(matches!(&replies[1], Ok(Reply::Declared { name }) if name == "sin"));
        assert!(matches!(replies[2], Ok(Reply::Value(v)) if v == 4.0));
    }
}
