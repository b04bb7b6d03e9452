//! Instruction emission into a method body.
//!
//! [`Emitter`] writes instructions at a cursor: either the end of the body or right before
//! a fixed instruction. Every emit returns the new instruction's id so it can be used as a
//! branch target. Helpers pick the most compact encoding for the value:
//!
//! ```text
//! ldarg.0 .. ldarg.3      (1 byte)
//! ldarg.s <uint8>         (2 bytes)
//! ldarg <uint16>          (4 bytes)
//! ```
//!
//! Forward branches use a label: an instruction created detached with
//! [`MethodBody::create`] and placed later with [`Emitter::place`].

use crate::{
    assembly::{Instruction, InstructionId, OpCode, Operand},
    metadata::{
        method::MethodBody,
        signatures::{FieldReference, MethodReference, TypeSignature},
    },
    Result,
};

/// Where emitted instructions go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// After the current last instruction
    Append,
    /// Right before this instruction, in emission order
    Before(InstructionId),
}

/// Writes instructions into a body at a cursor.
pub struct Emitter<'a> {
    body: &'a mut MethodBody,
    cursor: Cursor,
}

impl<'a> Emitter<'a> {
    /// Emits at the end of `body`.
    pub fn append(body: &'a mut MethodBody) -> Self {
        Emitter {
            body,
            cursor: Cursor::Append,
        }
    }

    /// Emits right before `anchor`.
    pub fn before(body: &'a mut MethodBody, anchor: InstructionId) -> Self {
        Emitter {
            body,
            cursor: Cursor::Before(anchor),
        }
    }

    /// The body being written.
    pub fn body(&mut self) -> &mut MethodBody {
        self.body
    }

    /// Creates a detached instruction to be placed later.
    pub fn label(&mut self, instruction: Instruction) -> InstructionId {
        self.body.create(instruction)
    }

    /// Places a detached instruction at the cursor.
    ///
    /// # Errors
    /// Returns [`crate::Error::InstructionNotInBody`] if `id` is already placed or the cursor
    /// anchor left the body.
    pub fn place(&mut self, id: InstructionId) -> Result<InstructionId> {
        match self.cursor {
            Cursor::Append => self.body.append(id)?,
            Cursor::Before(anchor) => self.body.insert_before(anchor, id)?,
        }
        Ok(id)
    }

    /// Emits an instruction at the cursor.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn emit(&mut self, instruction: Instruction) -> Result<InstructionId> {
        let id = self.body.create(instruction);
        self.place(id)
    }

    /// Emits an instruction without operand.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn op(&mut self, opcode: OpCode) -> Result<InstructionId> {
        self.emit(Instruction::new(opcode))
    }

    /// Emits an instruction with an operand.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn op_with(&mut self, opcode: OpCode, operand: Operand) -> Result<InstructionId> {
        self.emit(Instruction::with(opcode, operand))
    }

    /// Emits a branch to `target`.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn branch(&mut self, opcode: OpCode, target: InstructionId) -> Result<InstructionId> {
        self.op_with(opcode, Operand::Target(target))
    }

    /// Emits `ldarg` with the most compact encoding.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn ldarg(&mut self, index: u16) -> Result<InstructionId> {
        match index {
            0 => self.op(OpCode::Ldarg0),
            1 => self.op(OpCode::Ldarg1),
            2 => self.op(OpCode::Ldarg2),
            3 => self.op(OpCode::Ldarg3),
            x if x <= 255 => self.op_with(OpCode::LdargS, Operand::Variable(x)),
            x => self.op_with(OpCode::Ldarg, Operand::Variable(x)),
        }
    }

    /// Emits `ldloc` with the most compact encoding.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn ldloc(&mut self, index: u16) -> Result<InstructionId> {
        self.emit(Instruction::load_local(index))
    }

    /// Emits `stloc` with the most compact encoding.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn stloc(&mut self, index: u16) -> Result<InstructionId> {
        match index {
            0 => self.op(OpCode::Stloc0),
            1 => self.op(OpCode::Stloc1),
            2 => self.op(OpCode::Stloc2),
            3 => self.op(OpCode::Stloc3),
            x if x <= 255 => self.op_with(OpCode::StlocS, Operand::Variable(x)),
            x => self.op_with(OpCode::Stloc, Operand::Variable(x)),
        }
    }

    /// Emits `ldloca`.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn ldloca(&mut self, index: u16) -> Result<InstructionId> {
        if index <= 255 {
            self.op_with(OpCode::LdlocaS, Operand::Variable(index))
        } else {
            self.op_with(OpCode::Ldloca, Operand::Variable(index))
        }
    }

    /// Emits `ldc.i4` with the most compact encoding.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn ldc_i4(&mut self, value: i32) -> Result<InstructionId> {
        match value {
            -1 => self.op(OpCode::LdcI4M1),
            0 => self.op(OpCode::LdcI40),
            1 => self.op(OpCode::LdcI41),
            2 => self.op(OpCode::LdcI42),
            3 => self.op(OpCode::LdcI43),
            4 => self.op(OpCode::LdcI44),
            5 => self.op(OpCode::LdcI45),
            6 => self.op(OpCode::LdcI46),
            7 => self.op(OpCode::LdcI47),
            8 => self.op(OpCode::LdcI48),
            x if (-128..=127).contains(&x) => self.op_with(OpCode::LdcI4S, Operand::Int32(x)),
            x => self.op_with(OpCode::LdcI4, Operand::Int32(x)),
        }
    }

    /// Emits `ldc.i8`.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn ldc_i8(&mut self, value: i64) -> Result<InstructionId> {
        self.op_with(OpCode::LdcI8, Operand::Int64(value))
    }

    /// Emits `call`.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn call(&mut self, method: MethodReference) -> Result<InstructionId> {
        self.op_with(OpCode::Call, Operand::Method(method))
    }

    /// Emits `ldfld`.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn ldfld(&mut self, field: FieldReference) -> Result<InstructionId> {
        self.op_with(OpCode::Ldfld, Operand::Field(field))
    }

    /// Emits `stfld`.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn stfld(&mut self, field: FieldReference) -> Result<InstructionId> {
        self.op_with(OpCode::Stfld, Operand::Field(field))
    }

    /// Emits `ldobj`.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn ldobj(&mut self, ty: TypeSignature) -> Result<InstructionId> {
        self.op_with(OpCode::Ldobj, Operand::Type(ty))
    }

    /// Emits `stobj`.
    ///
    /// # Errors
    /// See [`Emitter::place`].
    pub fn stobj(&mut self, ty: TypeSignature) -> Result<InstructionId> {
        self.op_with(OpCode::Stobj, Operand::Type(ty))
    }
}
