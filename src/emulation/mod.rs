//! Verification interpreter for rewritten method bodies.
//!
//! Executes a method body of a [`crate::metadata::module::Module`] over a small value model
//! so a rewrite can be checked against the original code: with a hook that declines every
//! call, a rewritten method must return the same value and leave the same by-reference
//! arguments behind as before.
//!
//! # Key Components
//!
//! - [`Interpreter`] - the instruction loop, with a step limit
//! - [`EmValue`] - integers, floats, null, strings, value-type structs, heap objects and
//!   managed pointers to arguments, locals and fields
//! - [`HookHandler`] - decides dispatch-hook calls; [`DecliningHandler`] never handles
//!
//! Argument-pack constructors and the dispatch hook are recognized by the names in
//! [`crate::hotfix::HotfixConfig`], so rewritten bodies run without the runtime assembly.
//! Calls to anything else are forwarded to [`HookHandler::call`].
//!
//! # Examples
//!
//! ```rust,ignore
//! use dotpatch::emulation::{DecliningHandler, EmValue, Interpreter};
//! use dotpatch::hotfix::HotfixConfig;
//!
//! let config = HotfixConfig::default();
//! let mut interpreter = Interpreter::new(&module, &config, DecliningHandler::new());
//! let result = interpreter.execute(method, vec![EmValue::I32(21)])?;
//! assert_eq!(result.return_value, Some(EmValue::I32(42)));
//! ```
//!
//! Exception handling is not modelled: `throw` ends the run with [`crate::Error::Emulation`].

mod hook;
mod interpreter;
mod value;

pub use hook::{DecliningHandler, HookHandler};
pub use interpreter::{EmulationLimits, ExecutionResult, Interpreter};
pub use value::{EmValue, HeapRef, Pointer, StructValue};
