//! Execution backends.
//!
//! The front end hands each finished compilation unit to a [`Backend`],
//! which verifies it, runs its optimization pipeline, and makes the unit's
//! symbols callable. The in-crate [`JitEngine`] executes the SSA IR
//! directly; nothing in the front end depends on how a backend runs code.

pub mod engine;

pub use engine::JitEngine;

use thiserror::Error;

use crate::ir::Module;

/// Opaque handle to an added unit, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitHandle(pub u64);

/// Failures reported by a backend. These never corrupt front-end state:
/// the operator table and prototype registry were committed before
/// hand-off.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("unit verification failed: {0}")]
    Verification(String),

    #[error("unresolved symbol '{0}'")]
    UnresolvedSymbol(String),

    #[error("call depth limit exceeded")]
    CallDepthExceeded,

    #[error("execution fault: {0}")]
    Execution(String),
}

/// A resolved symbol, callable while the backend that produced it is
/// borrowed.
pub struct EntryPoint<'b> {
    invoke: Box<dyn Fn(&[f64]) -> Result<f64, BackendError> + 'b>,
}

impl<'b> EntryPoint<'b> {
    pub fn new(invoke: impl Fn(&[f64]) -> Result<f64, BackendError> + 'b) -> Self {
        Self {
            invoke: Box::new(invoke),
        }
    }

    /// Invoke the symbol with the given arguments.
    pub fn call(&self, args: &[f64]) -> Result<f64, BackendError> {
        (self.invoke)(args)
    }
}

/// Contract consumed by the session driver.
pub trait Backend {
    /// Verify a finished unit, run the fixed optimization pipeline, and
    /// make its symbols callable.
    fn add_unit(&mut self, unit: Module) -> Result<UnitHandle, BackendError>;

    /// Look up a callable entry point by symbol name.
    fn address_of(&self, name: &str) -> Option<EntryPoint<'_>>;

    /// Discard a previously added unit and its symbols.
    fn remove_unit(&mut self, handle: UnitHandle);
}
