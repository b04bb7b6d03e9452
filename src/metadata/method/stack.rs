//! Evaluation stack depth analysis.
//!
//! Walks the instruction graph from the entry point and every handler entry, tracking the
//! stack depth at each instruction, and reports the maximum. Calls and `ret` take their stack
//! transition from the operand signature.

use std::collections::HashMap;

use crate::{
    assembly::{FlowType, InstructionId, OpCode, Operand, StackCount},
    metadata::method::MethodBody,
    Result,
};

fn transition(opcode: OpCode, operand: &Operand, returns_value: bool) -> Result<(u32, u32)> {
    let fixed = |count: StackCount| match count {
        StackCount::Fixed(n) => Some(u32::from(n)),
        StackCount::Variable => None,
    };
    if let (Some(pops), Some(pushes)) = (fixed(opcode.pops()), fixed(opcode.pushes())) {
        return Ok((pops, pushes));
    }

    #[allow(clippy::cast_possible_truncation)]
    match (opcode, operand) {
        (OpCode::Ret, _) => Ok((u32::from(returns_value), 0)),
        (OpCode::Call | OpCode::Callvirt, Operand::Method(method)) => Ok((
            method.signature.arg_count() as u32,
            u32::from(!method.signature.return_type.is_void()),
        )),
        (OpCode::Newobj, Operand::Method(method)) => {
            Ok((method.signature.params.len() as u32, 1))
        }
        (OpCode::Calli, Operand::Signature(signature)) => Ok((
            signature.arg_count() as u32 + 1,
            u32::from(!signature.return_type.is_void()),
        )),
        _ => Err(malformed_error!(
            "Opcode {} carries an operand without a call signature",
            opcode
        )),
    }
}

/// Computes the maximum evaluation stack depth of `body`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an instruction would pop from an empty stack or a
/// call instruction carries no signature.
pub fn compute_max_stack(body: &MethodBody, returns_value: bool) -> Result<u16> {
    let mut depths: HashMap<InstructionId, u32> = HashMap::new();
    let mut pending: Vec<(InstructionId, u32)> = Vec::new();

    if let Some(entry) = body.first() {
        pending.push((entry, 0));
    }
    for handler in body.handlers() {
        let entry_depth = u32::from(handler.receives_exception());
        pending.push((handler.handler_start, entry_depth));
        if let Some(filter) = handler.filter_start {
            pending.push((filter, 1));
        }
    }

    let mut max = 0u32;
    while let Some((id, depth)) = pending.pop() {
        if depths.contains_key(&id) {
            continue;
        }
        let Some(instruction) = body.get(id) else {
            continue;
        };
        depths.insert(id, depth);

        let (pops, pushes) = transition(instruction.opcode, &instruction.operand, returns_value)?;
        let Some(remaining) = depth.checked_sub(pops) else {
            return Err(malformed_error!(
                "Stack underflow at {} ({})",
                id,
                instruction.opcode
            ));
        };
        let after = remaining + pushes;
        max = max.max(depth).max(after);

        match instruction.opcode.flow() {
            FlowType::Sequential | FlowType::Call => {
                if let Some(next) = body.next(id) {
                    pending.push((next, after));
                }
            }
            FlowType::ConditionalBranch | FlowType::Switch => {
                for target in instruction.targets() {
                    pending.push((target, after));
                }
                if let Some(next) = body.next(id) {
                    pending.push((next, after));
                }
            }
            FlowType::UnconditionalBranch => {
                for target in instruction.targets() {
                    pending.push((target, after));
                }
            }
            FlowType::Leave => {
                for target in instruction.targets() {
                    pending.push((target, 0));
                }
            }
            FlowType::Return | FlowType::Throw | FlowType::EndFinally => {}
        }
    }

    Ok(u16::try_from(max).unwrap_or(u16::MAX))
}
