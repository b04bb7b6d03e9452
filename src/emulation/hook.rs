//! Dispatch-hook handlers for the verification interpreter.

use crate::{
    emulation::{EmValue, StructValue},
    metadata::signatures::MethodReference,
    Error, Result,
};

/// Receives the calls a rewritten body makes into the runtime assembly.
pub trait HookHandler {
    /// Called for every dispatch-hook invocation.
    ///
    /// `args` is the in pack, `results` the out pack as currently stored by the caller.
    /// Returning true reports the call as handled; `results` is then written back.
    fn dispatch(&mut self, token: i64, args: &StructValue, results: &mut StructValue) -> bool;

    /// Called for any other method the interpreter cannot execute itself.
    ///
    /// # Errors
    /// The default rejects the call with [`Error::Emulation`].
    fn call(&mut self, method: &MethodReference, _args: &[EmValue]) -> Result<EmValue> {
        Err(Error::Emulation(format!("Unsupported call to {}", method.name)))
    }
}

/// Declines every hook call and records the tokens it saw.
#[derive(Debug, Default, Clone)]
pub struct DecliningHandler {
    /// Tokens in call order, with their in packs
    pub calls: Vec<(i64, StructValue)>,
}

impl DecliningHandler {
    /// Creates a handler with an empty call log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokens seen so far.
    #[must_use]
    pub fn tokens(&self) -> Vec<i64> {
        self.calls.iter().map(|(token, _)| *token).collect()
    }
}

impl HookHandler for DecliningHandler {
    fn dispatch(&mut self, token: i64, args: &StructValue, _results: &mut StructValue) -> bool {
        self.calls.push((token, args.clone()));
        false
    }
}

impl<F> HookHandler for F
where
    F: FnMut(i64, &StructValue, &mut StructValue) -> bool,
{
    fn dispatch(&mut self, token: i64, args: &StructValue, results: &mut StructValue) -> bool {
        self(token, args, results)
    }
}
