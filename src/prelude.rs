//! # dotpatch Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and functions
//! from the dotpatch library. Import this module to get quick access to the session,
//! selection and rewriting entry points.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotpatch operations
pub use crate::Error;

/// The result type used throughout dotpatch
pub use crate::Result;

/// Low-level file parsing utilities
pub use crate::{File, Parser};

// ================================================================================================
// Session Lifecycle
// ================================================================================================

/// Module registry with load / close lifecycle
pub use crate::project::{CloseReport, Session, SessionConfig};

// ================================================================================================
// Module Model
// ================================================================================================

/// Modules, types and their handles
pub use crate::metadata::module::{Module, TypeAttributes, TypeDef, TypeId};

/// Methods and bodies
pub use crate::metadata::method::{MethodAttributes, MethodBody, MethodDef};

/// Signatures and member references
pub use crate::metadata::signatures::{MethodReference, TypeSignature};

/// Custom attributes
pub use crate::metadata::customattributes::CustomAttribute;

/// Handle of a method inside a module
pub use crate::metadata::module::MethodId;

// ================================================================================================
// Instructions
// ================================================================================================

/// Instruction model and emitter
pub use crate::assembly::{Emitter, Instruction, OpCode, Operand};

// ================================================================================================
// Hot-fix Interception
// ================================================================================================

/// Configuration, selection, rewriting and the run driver
pub use crate::hotfix::{
    run, select, Directive, HotfixConfig, HotfixReport, Injection, Rewriter, TokenHasher,
    WorkSet,
};

// ================================================================================================
// Verification
// ================================================================================================

/// Interpreter for comparing rewritten and original bodies
pub use crate::emulation::{DecliningHandler, EmValue, HookHandler, Interpreter, StructValue};
