use std::collections::HashMap;

use crate::error::CodegenError;
use crate::ir::ValueId;
use crate::parser::ast::Prototype;

/// Per-function mapping from variable name to its stack slot.
///
/// One environment exists per function body being translated. Scoped
/// constructs (`var`, `for`, parameters) bind through [`bind`] and undo
/// through [`restore`] with the displaced slot, so shadowing is lexical and
/// never leaks past the construct that introduced it.
///
/// [`bind`]: SymbolEnvironment::bind
/// [`restore`]: SymbolEnvironment::restore
#[derive(Debug, Default)]
pub struct SymbolEnvironment {
    bindings: HashMap<String, ValueId>,
}

impl SymbolEnvironment {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot bound to `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<ValueId> {
        self.bindings.get(name).copied()
    }

    /// Bind `name` to `slot`, returning the binding it shadowed.
    pub fn bind(&mut self, name: &str, slot: ValueId) -> Option<ValueId> {
        self.bindings.insert(name.to_string(), slot)
    }

    /// Restore the binding displaced by a matching [`bind`], removing the
    /// name entirely when there was none.
    ///
    /// [`bind`]: SymbolEnvironment::bind
    pub fn restore(&mut self, name: &str, prior: Option<ValueId>) {
        match prior {
            Some(slot) => self.bindings.insert(name.to_string(), slot),
            None => self.bindings.remove(name),
        };
    }
}

/// Session-wide mapping from function name to its last-seen prototype.
///
/// Outlives any single compilation unit: this is what lets a statement call
/// a function whose defining unit has already been handed to the backend
/// and discarded.
#[derive(Debug, Default)]
pub struct PrototypeRegistry {
    protos: HashMap<String, Prototype>,
}

impl PrototypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The prototype registered under `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&Prototype> {
        self.protos.get(name)
    }

    /// Register `proto`, returning the entry it replaced.
    ///
    /// Redeclaring a name with a different parameter count is a
    /// redefinition error; an identical signature is a no-op overwrite.
    pub fn declare(&mut self, proto: Prototype) -> Result<Option<Prototype>, CodegenError> {
        if let Some(existing) = self.protos.get(&proto.name) {
            if existing.params.len() != proto.params.len() {
                return Err(CodegenError::Redefinition {
                    name: proto.name.clone(),
                    expected: existing.params.len(),
                    got: proto.params.len(),
                });
            }
        }
        Ok(self.protos.insert(proto.name.clone(), proto))
    }

    /// Undo a `declare`, restoring the replaced entry (or removing the
    /// name when there was none).
    pub fn restore(&mut self, name: &str, prior: Option<Prototype>) {
        match prior {
            Some(proto) => self.protos.insert(name.to_string(), proto),
            None => self.protos.remove(name),
        };
    }

    /// Drop every registration.
    pub fn reset(&mut self) {
        self.protos.clear();
    }
}
