//! Editable method bodies.
//!
//! A [`MethodBody`] stores its instructions in an arena of nodes linked into a doubly linked
//! sequence. Nodes are addressed by [`InstructionId`] and never move or get reused, which makes
//! the id a stable identity for everything that points into the code:
//!
//! - branch and switch operands of other instructions,
//! - exception handler boundaries,
//! - debug anchors (sequence points and scope boundaries bound for the duration of an edit).
//!
//! All three are tracked in a single referrer index keyed by the referenced instruction. The
//! index is updated on every insertion, replacement and removal, so removing an instruction
//! can repoint everything that referenced it to its successor without scanning the body.
//!
//! # Examples
//!
//! ```rust
//! use dotpatch::assembly::{Instruction, OpCode, Operand};
//! use dotpatch::metadata::method::MethodBody;
//!
//! let mut body = MethodBody::new();
//! let ret = body.create(Instruction::new(OpCode::Ret));
//! let jump = body.push(Instruction::with(OpCode::Br, Operand::Target(ret)));
//! let nop = body.push(Instruction::new(OpCode::Nop));
//! body.append(ret)?;
//!
//! // The branch now targets the `nop` that followed it
//! body.remove(nop)?;
//! assert_eq!(body.get(jump).map(|i| i.operand.targets()), Some(vec![ret]));
//! assert_eq!(body.compute_offsets(), 6);
//! # Ok::<(), dotpatch::Error>(())
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::{
    assembly::{Instruction, InstructionId, OpCode, Operand},
    metadata::{
        method::exceptions::{ExceptionHandler, HandlerEdge},
        signatures::TypeSignature,
    },
    Error, Result,
};

/// Something that points at an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Referrer {
    /// Branch or switch operand of another instruction
    Instruction(InstructionId),
    /// Boundary of an exception handler, by handler index
    Handler(usize, HandlerEdge),
    /// Debug anchor slot, see [`MethodBody::bind_anchor`]
    Anchor(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Node {
    instruction: Instruction,
    prev: Option<InstructionId>,
    next: Option<InstructionId>,
    attached: bool,
}

/// The code, locals and exception regions of a method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodBody {
    nodes: Vec<Node>,
    head: Option<InstructionId>,
    tail: Option<InstructionId>,
    len: usize,
    /// Local variable slots
    pub locals: Vec<TypeSignature>,
    /// Zero-initialise locals on entry
    pub init_locals: bool,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    handlers: Vec<ExceptionHandler>,
    #[serde(skip)]
    anchors: Vec<Option<InstructionId>>,
    #[serde(skip)]
    referrers: HashMap<InstructionId, Vec<Referrer>>,
}

impl Default for MethodBody {
    fn default() -> Self {
        MethodBody::new()
    }
}

impl MethodBody {
    /// Creates an empty body.
    #[must_use]
    pub fn new() -> Self {
        MethodBody {
            nodes: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            locals: Vec::new(),
            init_locals: true,
            max_stack: 8,
            handlers: Vec::new(),
            anchors: Vec::new(),
            referrers: HashMap::new(),
        }
    }

    /// Number of instructions in the sequence.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the sequence has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// First instruction of the sequence.
    #[must_use]
    pub fn first(&self) -> Option<InstructionId> {
        self.head
    }

    /// Last instruction of the sequence.
    #[must_use]
    pub fn last(&self) -> Option<InstructionId> {
        self.tail
    }

    /// Returns true if `id` is part of the sequence.
    #[must_use]
    pub fn contains(&self, id: InstructionId) -> bool {
        self.nodes.get(id.index()).is_some_and(|node| node.attached)
    }

    /// Returns the instruction for `id`, attached or not.
    #[must_use]
    pub fn get(&self, id: InstructionId) -> Option<&Instruction> {
        self.nodes.get(id.index()).map(|node| &node.instruction)
    }

    /// Successor of an attached instruction.
    #[must_use]
    pub fn next(&self, id: InstructionId) -> Option<InstructionId> {
        self.nodes
            .get(id.index())
            .filter(|node| node.attached)
            .and_then(|node| node.next)
    }

    /// Predecessor of an attached instruction.
    #[must_use]
    pub fn prev(&self, id: InstructionId) -> Option<InstructionId> {
        self.nodes
            .get(id.index())
            .filter(|node| node.attached)
            .and_then(|node| node.prev)
    }

    /// Iterates the sequence in order.
    pub fn iter(&self) -> impl Iterator<Item = (InstructionId, &Instruction)> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let id = cursor?;
            let node = self.nodes.get(id.index())?;
            cursor = node.next;
            Some((id, &node.instruction))
        })
    }

    /// Ids of the sequence in order.
    #[must_use]
    pub fn ids(&self) -> Vec<InstructionId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Adds a detached instruction to the arena.
    ///
    /// The instruction can be referenced by branches right away and placed into the sequence
    /// later with [`MethodBody::append`], [`MethodBody::insert_before`] or
    /// [`MethodBody::insert_after`].
    pub fn create(&mut self, instruction: Instruction) -> InstructionId {
        #[allow(clippy::cast_possible_truncation)]
        let id = InstructionId(self.nodes.len() as u32);
        for target in instruction.targets() {
            self.add_referrer(target, Referrer::Instruction(id));
        }
        self.nodes.push(Node {
            instruction,
            prev: None,
            next: None,
            attached: false,
        });
        id
    }

    /// Creates an instruction and appends it to the sequence.
    pub fn push(&mut self, instruction: Instruction) -> InstructionId {
        let id = self.create(instruction);
        self.link(id, self.tail, None);
        id
    }

    /// Appends a detached instruction.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotInBody`] if `id` is unknown or already placed.
    pub fn append(&mut self, id: InstructionId) -> Result<()> {
        self.check_detached(id)?;
        self.link(id, self.tail, None);
        Ok(())
    }

    /// Places a detached instruction right before `anchor`.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotInBody`] if `anchor` is not in the sequence or `id` is
    /// unknown or already placed.
    pub fn insert_before(&mut self, anchor: InstructionId, id: InstructionId) -> Result<()> {
        self.check_attached(anchor)?;
        self.check_detached(id)?;
        let prev = self.nodes[anchor.index()].prev;
        self.link(id, prev, Some(anchor));
        Ok(())
    }

    /// Places a detached instruction right after `anchor`.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotInBody`] if `anchor` is not in the sequence or `id` is
    /// unknown or already placed.
    pub fn insert_after(&mut self, anchor: InstructionId, id: InstructionId) -> Result<()> {
        self.check_attached(anchor)?;
        self.check_detached(id)?;
        let next = self.nodes[anchor.index()].next;
        self.link(id, Some(anchor), next);
        Ok(())
    }

    /// Replaces opcode and operand of an instruction in place, keeping its identity.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotInBody`] if `id` is unknown.
    pub fn replace(&mut self, id: InstructionId, opcode: OpCode, operand: Operand) -> Result<()> {
        let Some(node) = self.nodes.get(id.index()) else {
            return Err(Error::InstructionNotInBody(id.0));
        };
        for target in node.instruction.targets() {
            self.remove_referrer(target, Referrer::Instruction(id));
        }

        let node = &mut self.nodes[id.index()];
        node.instruction.opcode = opcode;
        node.instruction.operand = operand;
        for target in node.instruction.targets() {
            self.add_referrer(target, Referrer::Instruction(id));
        }
        Ok(())
    }

    /// Changes only the opcode, e.g. to widen a short branch.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotInBody`] if `id` is unknown.
    pub fn set_opcode(&mut self, id: InstructionId, opcode: OpCode) -> Result<()> {
        let operand = match self.nodes.get(id.index()) {
            Some(node) => node.instruction.operand.clone(),
            None => return Err(Error::InstructionNotInBody(id.0)),
        };
        self.replace(id, opcode, operand)
    }

    /// Removes an instruction from the sequence.
    ///
    /// Every branch operand, handler boundary and debug anchor that referenced it is repointed
    /// to its immediate successor. End-of-region boundaries and anchors of the last
    /// instruction become "end of method".
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotInBody`] if `id` is not in the sequence, and
    /// [`Error::Malformed`] if the last instruction is removed while a branch or a region start
    /// still targets it. The body is left unchanged on error.
    pub fn remove(&mut self, id: InstructionId) -> Result<()> {
        self.check_attached(id)?;
        let successor = self.nodes[id.index()].next;
        let referrers = self.referrers.get(&id).cloned().unwrap_or_default();

        if successor.is_none() {
            let dangling = referrers.iter().any(|referrer| match referrer {
                Referrer::Instruction(_) => true,
                Referrer::Handler(_, edge) => !edge.may_be_end_of_method(),
                Referrer::Anchor(_) => false,
            });
            if dangling {
                return Err(malformed_error!(
                    "Cannot remove final instruction {} while it is still referenced",
                    id
                ));
            }
        }

        self.unlink(id);
        for target in self.nodes[id.index()].instruction.targets() {
            self.remove_referrer(target, Referrer::Instruction(id));
        }
        self.referrers.remove(&id);

        for referrer in referrers {
            match referrer {
                Referrer::Instruction(source) => {
                    if let Some(successor) = successor {
                        self.nodes[source.index()]
                            .instruction
                            .operand
                            .retarget(id, successor);
                    }
                }
                Referrer::Handler(index, edge) => {
                    if let Some(handler) = self.handlers.get_mut(index) {
                        handler.set_edge(edge, successor);
                    }
                }
                Referrer::Anchor(slot) => {
                    if let Some(anchor) = self.anchors.get_mut(slot) {
                        *anchor = successor;
                    }
                }
            }
            if let Some(successor) = successor {
                self.add_referrer(successor, referrer);
            }
        }
        Ok(())
    }

    /// Everything that currently points at `id`.
    #[must_use]
    pub fn referrers(&self, id: InstructionId) -> &[Referrer] {
        self.referrers.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Exception handler clauses.
    #[must_use]
    pub fn handlers(&self) -> &[ExceptionHandler] {
        &self.handlers
    }

    /// Adds an exception handler clause and indexes its boundaries.
    pub fn add_handler(&mut self, handler: ExceptionHandler) -> usize {
        let index = self.handlers.len();
        for (edge, target) in handler.edges() {
            self.add_referrer(target, Referrer::Handler(index, edge));
        }
        self.handlers.push(handler);
        index
    }

    /// Points every end-of-method region boundary at `end`.
    ///
    /// Used before code is appended after the last instruction, so the appended code stays
    /// outside every protected block and handler. Returns the number of edges changed.
    ///
    /// # Errors
    /// Returns [`Error::InstructionNotInBody`] if `end` is not in the sequence.
    pub fn close_open_regions(&mut self, end: InstructionId) -> Result<usize> {
        self.check_attached(end)?;
        let mut closed = 0;
        for index in 0..self.handlers.len() {
            for edge in [HandlerEdge::TryEnd, HandlerEdge::HandlerEnd] {
                if self.handlers[index].edge(edge).is_none() {
                    self.handlers[index].set_edge(edge, Some(end));
                    self.add_referrer(end, Referrer::Handler(index, edge));
                    closed += 1;
                }
            }
        }
        Ok(closed)
    }

    /// Appends a local slot, returning its index.
    #[allow(clippy::cast_possible_truncation)]
    pub fn add_local(&mut self, ty: TypeSignature) -> u16 {
        self.locals.push(ty);
        (self.locals.len() - 1) as u16
    }

    /// Binds a debug anchor to `id` and returns its slot.
    ///
    /// Anchors follow their instruction through removals and are read back with
    /// [`MethodBody::anchor`] once editing is done.
    pub fn bind_anchor(&mut self, id: InstructionId) -> usize {
        let slot = self.anchors.len();
        self.anchors.push(Some(id));
        self.add_referrer(id, Referrer::Anchor(slot));
        slot
    }

    /// The instruction an anchor currently points at; `None` means end of method.
    #[must_use]
    pub fn anchor(&self, slot: usize) -> Option<InstructionId> {
        self.anchors.get(slot).copied().flatten()
    }

    /// Drops every debug anchor.
    pub fn clear_anchors(&mut self) {
        for (slot, anchor) in std::mem::take(&mut self.anchors).into_iter().enumerate() {
            if let Some(id) = anchor {
                self.remove_referrer(id, Referrer::Anchor(slot));
            }
        }
    }

    /// Assigns byte offsets in sequence order and returns the code size.
    pub fn compute_offsets(&mut self) -> u32 {
        let mut offset = 0u32;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let node = &mut self.nodes[id.index()];
            node.instruction.offset = offset;
            offset += node.instruction.size();
            cursor = node.next;
        }
        offset
    }

    /// Maps current offsets to instructions. Call [`MethodBody::compute_offsets`] first.
    #[must_use]
    pub fn offset_index(&self) -> HashMap<u32, InstructionId> {
        self.iter()
            .map(|(id, instruction)| (instruction.offset, id))
            .collect()
    }

    /// Rebuilds the referrer index from operands and handlers.
    ///
    /// Needed after deserialization, which does not persist the index.
    pub fn reindex(&mut self) {
        self.referrers.clear();
        self.anchors.clear();
        for index in 0..self.nodes.len() {
            #[allow(clippy::cast_possible_truncation)]
            let id = InstructionId(index as u32);
            for target in self.nodes[index].instruction.targets() {
                self.add_referrer(target, Referrer::Instruction(id));
            }
        }
        for index in 0..self.handlers.len() {
            let edges: Vec<_> = self.handlers[index].edges().collect();
            for (edge, target) in edges {
                self.add_referrer(target, Referrer::Handler(index, edge));
            }
        }
    }

    /// Checks that every reference points into the sequence.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] naming the first dangling reference.
    pub fn validate(&self) -> Result<()> {
        for (id, instruction) in self.iter() {
            for target in instruction.targets() {
                if !self.contains(target) {
                    return Err(malformed_error!(
                        "Instruction {} branches to {} outside the body",
                        id,
                        target
                    ));
                }
            }
        }
        for (index, handler) in self.handlers.iter().enumerate() {
            for (edge, target) in handler.edges() {
                if !self.contains(target) {
                    return Err(malformed_error!(
                        "Handler {} edge {:?} points outside the body",
                        index,
                        edge
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_attached(&self, id: InstructionId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(Error::InstructionNotInBody(id.0))
        }
    }

    fn check_detached(&self, id: InstructionId) -> Result<()> {
        match self.nodes.get(id.index()) {
            Some(node) if !node.attached => Ok(()),
            _ => Err(Error::InstructionNotInBody(id.0)),
        }
    }

    fn link(
        &mut self,
        id: InstructionId,
        prev: Option<InstructionId>,
        next: Option<InstructionId>,
    ) {
        {
            let node = &mut self.nodes[id.index()];
            node.prev = prev;
            node.next = next;
            node.attached = true;
        }
        match prev {
            Some(prev) => self.nodes[prev.index()].next = Some(id),
            None => self.head = Some(id),
        }
        match next {
            Some(next) => self.nodes[next.index()].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.len += 1;
    }

    fn unlink(&mut self, id: InstructionId) {
        let (prev, next) = {
            let node = &mut self.nodes[id.index()];
            node.attached = false;
            (node.prev.take(), node.next.take())
        };
        match prev {
            Some(prev) => self.nodes[prev.index()].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next.index()].prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    fn add_referrer(&mut self, target: InstructionId, referrer: Referrer) {
        let list = self.referrers.entry(target).or_default();
        if !list.contains(&referrer) {
            list.push(referrer);
        }
    }

    fn remove_referrer(&mut self, target: InstructionId, referrer: Referrer) {
        if let Some(list) = self.referrers.get_mut(&target) {
            list.retain(|existing| *existing != referrer);
            if list.is_empty() {
                self.referrers.remove(&target);
            }
        }
    }
}
