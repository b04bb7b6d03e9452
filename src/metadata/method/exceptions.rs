//! Exception handler regions of a method body.
//!
//! Region boundaries reference instructions by [`InstructionId`], not by offset, so they stay
//! attached to the same code while a body is edited. An end boundary of `None` means the
//! region extends to the end of the method.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{assembly::InstructionId, metadata::signatures::TypeSignature};

bitflags! {
    /// Exception handler kind flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ExceptionHandlerFlags: u16 {
        /// Typed catch clause
        const EXCEPTION = 0x0000;
        /// Filter clause
        const FILTER = 0x0001;
        /// Finally clause
        const FINALLY = 0x0002;
        /// Fault clause
        const FAULT = 0x0004;
    }
}

/// One boundary of an exception handler region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerEdge {
    /// First instruction of the protected block
    TryStart,
    /// First instruction after the protected block
    TryEnd,
    /// First instruction of the filter block
    FilterStart,
    /// First instruction of the handler block
    HandlerStart,
    /// First instruction after the handler block
    HandlerEnd,
}

impl HandlerEdge {
    /// Every edge kind.
    pub const ALL: [HandlerEdge; 5] = [
        HandlerEdge::TryStart,
        HandlerEdge::TryEnd,
        HandlerEdge::FilterStart,
        HandlerEdge::HandlerStart,
        HandlerEdge::HandlerEnd,
    ];

    /// End edges may point past the last instruction.
    #[must_use]
    pub fn may_be_end_of_method(&self) -> bool {
        matches!(self, HandlerEdge::TryEnd | HandlerEdge::HandlerEnd)
    }
}

/// An exception handling clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionHandler {
    /// Kind of the clause
    pub flags: ExceptionHandlerFlags,
    /// First protected instruction
    pub try_start: InstructionId,
    /// First instruction after the protected block, `None` for end of method
    pub try_end: Option<InstructionId>,
    /// First filter instruction, for [`ExceptionHandlerFlags::FILTER`] clauses
    pub filter_start: Option<InstructionId>,
    /// First handler instruction
    pub handler_start: InstructionId,
    /// First instruction after the handler, `None` for end of method
    pub handler_end: Option<InstructionId>,
    /// Caught exception type of typed catch clauses
    pub catch_type: Option<TypeSignature>,
}

impl ExceptionHandler {
    /// Returns the instruction an edge points at.
    #[must_use]
    pub fn edge(&self, edge: HandlerEdge) -> Option<InstructionId> {
        match edge {
            HandlerEdge::TryStart => Some(self.try_start),
            HandlerEdge::TryEnd => self.try_end,
            HandlerEdge::FilterStart => self.filter_start,
            HandlerEdge::HandlerStart => Some(self.handler_start),
            HandlerEdge::HandlerEnd => self.handler_end,
        }
    }

    /// Points an edge at `target`. Start edges ignore `None`.
    pub fn set_edge(&mut self, edge: HandlerEdge, target: Option<InstructionId>) {
        match (edge, target) {
            (HandlerEdge::TryStart, Some(target)) => self.try_start = target,
            (HandlerEdge::HandlerStart, Some(target)) => self.handler_start = target,
            (HandlerEdge::FilterStart, target) => self.filter_start = target,
            (HandlerEdge::TryEnd, target) => self.try_end = target,
            (HandlerEdge::HandlerEnd, target) => self.handler_end = target,
            (HandlerEdge::TryStart | HandlerEdge::HandlerStart, None) => {}
        }
    }

    /// Edges of this clause that reference an instruction.
    pub fn edges(&self) -> impl Iterator<Item = (HandlerEdge, InstructionId)> + '_ {
        HandlerEdge::ALL
            .iter()
            .filter_map(|edge| self.edge(*edge).map(|target| (*edge, target)))
    }

    /// Returns true for catch and filter clauses, which receive the exception object.
    #[must_use]
    pub fn receives_exception(&self) -> bool {
        !self
            .flags
            .intersects(ExceptionHandlerFlags::FINALLY | ExceptionHandlerFlags::FAULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finally_clause() -> ExceptionHandler {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: InstructionId(0),
            try_end: Some(InstructionId(3)),
            filter_start: None,
            handler_start: InstructionId(3),
            handler_end: None,
            catch_type: None,
        }
    }

    #[test]
    fn edges_skip_missing_boundaries() {
        let clause = finally_clause();
        let edges: Vec<_> = clause.edges().collect();
        assert_eq!(
            edges,
            vec![
                (HandlerEdge::TryStart, InstructionId(0)),
                (HandlerEdge::TryEnd, InstructionId(3)),
                (HandlerEdge::HandlerStart, InstructionId(3)),
            ]
        );
        assert!(!clause.receives_exception());
    }

    #[test]
    fn set_edge_keeps_required_starts() {
        let mut clause = finally_clause();
        clause.set_edge(HandlerEdge::TryStart, None);
        assert_eq!(clause.try_start, InstructionId(0));
        clause.set_edge(HandlerEdge::TryEnd, None);
        assert_eq!(clause.try_end, None);
        assert!(HandlerEdge::HandlerEnd.may_be_end_of_method());
        assert!(!HandlerEdge::FilterStart.may_be_end_of_method());
    }
}
