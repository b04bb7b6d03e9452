//! Per-method debug information and its binding to instructions.
//!
//! Debug records (sequence points, local scope boundaries) are stored as IL offsets. Before a
//! body is edited, [`MethodDebugInfo::bind`] resolves every offset to the instruction that
//! currently sits there and anchors the record to that instruction in the body's referrer
//! index. Anchors follow their instruction through insertions and removals. After the edit,
//! [`MethodDebugInfo::apply`] writes the new offsets back.
//!
//! Records whose offset does not match an instruction boundary, and scope ends that already
//! mean "end of method", are left untouched.

use serde::{Deserialize, Serialize};

use crate::metadata::{method::MethodBody, sequencepoints::SequencePoint};

/// An IL offset that may also denote the end of the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionOffset {
    /// Offset of an instruction
    Offset(u32),
    /// One past the last instruction
    EndOfMethod,
}

/// A named local inside a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVariableName {
    /// Local slot index
    pub index: u16,
    /// Source name
    pub name: String,
}

/// A lexical scope of local variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalScope {
    /// First instruction of the scope
    pub start: InstructionOffset,
    /// First instruction after the scope
    pub end: InstructionOffset,
    /// Index of the enclosing scope in the same list
    pub parent: Option<usize>,
    /// Locals visible in the scope
    pub variables: Vec<LocalVariableName>,
}

/// Debug information of one method.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MethodDebugInfo {
    /// Sequence points in IL order
    pub sequence_points: Vec<SequencePoint>,
    /// Scopes, parents before children
    pub scopes: Vec<LocalScope>,
}

/// A debug record whose offset is tracked during an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSlot {
    /// Sequence point by index
    SequencePoint(usize),
    /// Start of a scope by index
    ScopeStart(usize),
    /// End of a scope by index
    ScopeEnd(usize),
}

/// Records anchored to a body by [`MethodDebugInfo::bind`].
#[derive(Debug, Default)]
pub struct DebugBinding {
    anchors: Vec<(DebugSlot, usize)>,
}

impl DebugBinding {
    /// Number of anchored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    /// Returns true if no record could be anchored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl MethodDebugInfo {
    fn offset_of(&self, slot: DebugSlot) -> Option<InstructionOffset> {
        match slot {
            DebugSlot::SequencePoint(index) => self
                .sequence_points
                .get(index)
                .map(|point| InstructionOffset::Offset(point.il_offset)),
            DebugSlot::ScopeStart(index) => self.scopes.get(index).map(|scope| scope.start),
            DebugSlot::ScopeEnd(index) => self.scopes.get(index).map(|scope| scope.end),
        }
    }

    fn slots(&self) -> Vec<DebugSlot> {
        let mut slots = Vec::with_capacity(self.scopes.len() * 2 + self.sequence_points.len());
        for index in 0..self.scopes.len() {
            slots.push(DebugSlot::ScopeStart(index));
            slots.push(DebugSlot::ScopeEnd(index));
        }
        slots.extend((0..self.sequence_points.len()).map(DebugSlot::SequencePoint));
        slots
    }

    /// Anchors every record to the instruction at its current offset.
    pub fn bind(&self, body: &mut MethodBody) -> DebugBinding {
        body.compute_offsets();
        let index = body.offset_index();

        let mut binding = DebugBinding::default();
        for slot in self.slots() {
            let Some(InstructionOffset::Offset(offset)) = self.offset_of(slot) else {
                continue;
            };
            if let Some(id) = index.get(&offset) {
                binding.anchors.push((slot, body.bind_anchor(*id)));
            }
        }
        binding
    }

    /// Writes the current offsets of the anchored instructions back into the records and
    /// releases the anchors.
    pub fn apply(&mut self, body: &mut MethodBody, binding: DebugBinding) {
        let code_size = body.compute_offsets();

        for (slot, anchor) in binding.anchors {
            let offset = match body.anchor(anchor).and_then(|id| body.get(id)) {
                Some(instruction) => InstructionOffset::Offset(instruction.offset),
                None => InstructionOffset::EndOfMethod,
            };
            match slot {
                DebugSlot::SequencePoint(index) => {
                    if let Some(point) = self.sequence_points.get_mut(index) {
                        point.il_offset = match offset {
                            InstructionOffset::Offset(offset) => offset,
                            InstructionOffset::EndOfMethod => code_size,
                        };
                    }
                }
                DebugSlot::ScopeStart(index) => {
                    if let Some(scope) = self.scopes.get_mut(index) {
                        scope.start = offset;
                    }
                }
                DebugSlot::ScopeEnd(index) => {
                    if let Some(scope) = self.scopes.get_mut(index) {
                        scope.end = offset;
                    }
                }
            }
        }
        body.clear_anchors();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::{Instruction, OpCode, Operand};

    #[test]
    fn records_follow_instructions() {
        let mut body = MethodBody::new();
        let first = body.push(Instruction::new(OpCode::Ldarg0));
        let second = body.push(Instruction::new(OpCode::Pop));
        body.push(Instruction::new(OpCode::Ret));

        let mut info = MethodDebugInfo {
            sequence_points: vec![
                SequencePoint::new(0, 10, 1, 10, 5),
                SequencePoint::new(1, 11, 1, 11, 5),
                SequencePoint::new(7, 12, 1, 12, 5),
            ],
            scopes: vec![LocalScope {
                start: InstructionOffset::Offset(1),
                end: InstructionOffset::EndOfMethod,
                parent: None,
                variables: vec![],
            }],
        };

        let binding = info.bind(&mut body);
        assert_eq!(binding.len(), 3);

        let prologue = body.create(Instruction::with(OpCode::LdcI8, Operand::Int64(5)));
        body.insert_before(first, prologue).unwrap();
        let pop = body.create(Instruction::new(OpCode::Pop));
        body.insert_after(prologue, pop).unwrap();

        info.apply(&mut body, binding);

        assert_eq!(info.sequence_points[0].il_offset, 10);
        assert_eq!(info.sequence_points[1].il_offset, 11);
        assert_eq!(info.sequence_points[2].il_offset, 7);
        assert_eq!(info.scopes[0].start, InstructionOffset::Offset(11));
        assert_eq!(info.scopes[0].end, InstructionOffset::EndOfMethod);
        assert!(body.referrers(second).is_empty());
    }
}
