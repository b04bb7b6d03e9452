//! Instructions and operands of a method body.
//!
//! An [`Instruction`] is an [`OpCode`] plus a typed [`Operand`]. Operands that point at other
//! instructions (branch targets, switch tables) hold [`InstructionId`] handles into the owning
//! [`crate::metadata::method::MethodBody`] arena rather than byte displacements, so inserting
//! or removing code never invalidates them. Byte offsets are derived on demand by
//! [`crate::metadata::method::MethodBody::compute_offsets`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    assembly::opcodes::{OpCode, OperandKind},
    metadata::signatures::{FieldReference, MethodReference, MethodSignature, TypeSignature},
};

/// Stable handle of an instruction inside a method body arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstructionId(pub(crate) u32);

impl InstructionId {
    /// Arena index of this handle.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The inline operand of an instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    /// No operand
    None,
    /// `ldc.i4`, `ldc.i4.s`, `unaligned.`, `no.`
    Int32(i32),
    /// `ldc.i8`
    Int64(i64),
    /// `ldc.r4`
    Float32(f32),
    /// `ldc.r8`
    Float64(f64),
    /// Argument or local index, depending on the opcode
    Variable(u16),
    /// Branch target
    Target(InstructionId),
    /// Jump table of a `switch`
    Switch(Vec<InstructionId>),
    /// `ldstr` literal
    String(String),
    /// Type token
    Type(TypeSignature),
    /// Field token
    Field(FieldReference),
    /// Method token
    Method(MethodReference),
    /// Stand-alone signature (`calli`)
    Signature(MethodSignature),
}

impl Operand {
    /// Instructions referenced by this operand.
    #[must_use]
    pub fn targets(&self) -> Vec<InstructionId> {
        match self {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// Replaces every reference to `from` with `to`. Returns true if anything changed.
    pub fn retarget(&mut self, from: InstructionId, to: InstructionId) -> bool {
        match self {
            Operand::Target(target) if *target == from => {
                *target = to;
                true
            }
            Operand::Switch(targets) => {
                let mut changed = false;
                for target in targets.iter_mut().filter(|target| **target == from) {
                    *target = to;
                    changed = true;
                }
                changed
            }
            _ => false,
        }
    }
}

/// A single CIL instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The opcode
    pub opcode: OpCode,
    /// The inline operand
    pub operand: Operand,
    /// Byte offset within the body, valid after the last offset computation
    pub offset: u32,
}

impl Instruction {
    /// Creates an instruction without operand.
    #[must_use]
    pub fn new(opcode: OpCode) -> Self {
        Instruction {
            opcode,
            operand: Operand::None,
            offset: 0,
        }
    }

    /// Creates an instruction with the given operand.
    #[must_use]
    pub fn with(opcode: OpCode, operand: Operand) -> Self {
        Instruction {
            opcode,
            operand,
            offset: 0,
        }
    }

    /// `ldloc` in its most compact encoding.
    #[must_use]
    pub fn load_local(index: u16) -> Self {
        match index {
            0 => Instruction::new(OpCode::Ldloc0),
            1 => Instruction::new(OpCode::Ldloc1),
            2 => Instruction::new(OpCode::Ldloc2),
            3 => Instruction::new(OpCode::Ldloc3),
            x if x <= 255 => Instruction::with(OpCode::LdlocS, Operand::Variable(x)),
            x => Instruction::with(OpCode::Ldloc, Operand::Variable(x)),
        }
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        let operand = match self.opcode.operand_kind().size() {
            Some(size) => size,
            None => match &self.operand {
                #[allow(clippy::cast_possible_truncation)]
                Operand::Switch(targets) => 4 + 4 * targets.len() as u32,
                _ => 4,
            },
        };
        self.opcode.encoded_size() + operand
    }

    /// Argument index accessed by `ldarg*`, `ldarga*` and `starg*`.
    #[must_use]
    pub fn argument_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Ldarg0 => Some(0),
            OpCode::Ldarg1 => Some(1),
            OpCode::Ldarg2 => Some(2),
            OpCode::Ldarg3 => Some(3),
            OpCode::LdargS
            | OpCode::Ldarg
            | OpCode::LdargaS
            | OpCode::Ldarga
            | OpCode::StargS
            | OpCode::Starg => match self.operand {
                Operand::Variable(index) => Some(index),
                _ => None,
            },
            _ => None,
        }
    }

    /// Local index accessed by `ldloc*`, `ldloca*` and `stloc*`.
    #[must_use]
    pub fn local_index(&self) -> Option<u16> {
        match self.opcode {
            OpCode::Ldloc0 | OpCode::Stloc0 => Some(0),
            OpCode::Ldloc1 | OpCode::Stloc1 => Some(1),
            OpCode::Ldloc2 | OpCode::Stloc2 => Some(2),
            OpCode::Ldloc3 | OpCode::Stloc3 => Some(3),
            OpCode::LdlocS
            | OpCode::Ldloc
            | OpCode::LdlocaS
            | OpCode::Ldloca
            | OpCode::StlocS
            | OpCode::Stloc => match self.operand {
                Operand::Variable(index) => Some(index),
                _ => None,
            },
            _ => None,
        }
    }

    /// Branch targets of this instruction.
    #[must_use]
    pub fn targets(&self) -> Vec<InstructionId> {
        if self.opcode.is_branch() {
            self.operand.targets()
        } else {
            Vec::new()
        }
    }

    /// Returns true if this is a short branch whose operand kind matches.
    #[must_use]
    pub fn is_short_branch(&self) -> bool {
        self.opcode.operand_kind() == OperandKind::ShortInlineBrTarget
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IL_{:04X}: {}", self.offset, self.opcode)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Int32(value) => write!(f, " {value}"),
            Operand::Int64(value) => write!(f, " {value}"),
            Operand::Float32(value) => write!(f, " {value}"),
            Operand::Float64(value) => write!(f, " {value}"),
            Operand::Variable(index) => write!(f, " {index}"),
            Operand::Target(target) => write!(f, " {target}"),
            Operand::Switch(targets) => write!(f, " ({} targets)", targets.len()),
            Operand::String(value) => write!(f, " {value:?}"),
            Operand::Type(ty) => write!(f, " {ty:?}"),
            Operand::Field(field) => write!(f, " {}", field.name),
            Operand::Method(method) => write!(f, " {}", method.name),
            Operand::Signature(_) => write!(f, " <sig>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(Instruction::new(OpCode::Ret).size(), 1);
        assert_eq!(Instruction::with(OpCode::LdcI8, Operand::Int64(7)).size(), 9);
        assert_eq!(
            Instruction::with(OpCode::BrS, Operand::Target(InstructionId(0))).size(),
            2
        );
        assert_eq!(Instruction::with(OpCode::Ldloca, Operand::Variable(1)).size(), 4);
        let switch = Instruction::with(
            OpCode::Switch,
            Operand::Switch(vec![InstructionId(1), InstructionId(2), InstructionId(1)]),
        );
        assert_eq!(switch.size(), 1 + 4 + 12);
    }

    #[test]
    fn variable_indices() {
        assert_eq!(Instruction::new(OpCode::Ldarg2).argument_index(), Some(2));
        assert_eq!(
            Instruction::with(OpCode::StargS, Operand::Variable(9)).argument_index(),
            Some(9)
        );
        assert_eq!(Instruction::new(OpCode::Stloc3).local_index(), Some(3));
        assert_eq!(Instruction::new(OpCode::Ldarg0).local_index(), None);
    }

    #[test]
    fn retarget_switch_entries() {
        let mut operand =
            Operand::Switch(vec![InstructionId(4), InstructionId(5), InstructionId(4)]);
        assert!(operand.retarget(InstructionId(4), InstructionId(6)));
        assert_eq!(operand.targets(), vec![InstructionId(6), InstructionId(5), InstructionId(6)]);
        assert!(!operand.retarget(InstructionId(4), InstructionId(7)));
    }
}
