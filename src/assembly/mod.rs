//! CIL instruction model.
//!
//! # Key Components
//!
//! - [`OpCode`] - the full opcode table with encoding, flow and stack behaviour
//! - [`Instruction`] / [`Operand`] - a single instruction; branch operands hold
//!   [`InstructionId`] handles instead of displacements
//! - [`Emitter`] - writes instructions into a [`crate::metadata::method::MethodBody`] at a
//!   cursor, choosing compact encodings
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::assembly::{Emitter, OpCode};
//! use dotpatch::metadata::method::MethodBody;
//!
//! let mut body = MethodBody::new();
//! let mut emit = Emitter::append(&mut body);
//! emit.ldarg(1)?;
//! emit.op(OpCode::Ret)?;
//! assert_eq!(body.compute_offsets(), 2);
//! # Ok::<(), dotpatch::Error>(())
//! ```

mod emitter;
mod instruction;
mod opcodes;

pub use emitter::{Cursor, Emitter};
pub use instruction::{Instruction, InstructionId, Operand};
pub use opcodes::{FlowType, OpCode, OperandKind, StackCount};
