//! Structural verification of a [`Function`] before it is loaded.
//!
//! The assembler verifies everything it produces; the loader verifies again
//! so hand-built or deserialized byte-code is held to the same rules.

use std::collections::BTreeMap;

use crate::error::{BytecodeError, BytecodeResult};
use crate::function::Function;
use crate::instruction::{decode, Instruction, Operand};
use crate::opcode::{OpCode, MAX_LOCALS};

/// Check that `function` is well formed:
///
/// - every instruction decodes;
/// - every branch lands on an instruction boundary or the end of the code;
/// - every local index is within the frame table;
/// - local offsets start at 0, never decrease and stay within the frame,
///   and a function without locals has an empty frame;
/// - every recorded static load offset is a `LoadStaticAddress`.
///
/// Per-local sizes are not part of a [`Function`], so the size of the last
/// local, and with it the exact frame size, cannot be checked here.
pub fn verify(function: &Function) -> BytecodeResult<()> {
    verify_frame(function)?;

    let code = function.code();
    let instructions = decode(code).collect::<BytecodeResult<BTreeMap<usize, Instruction>>>()?;
    let local_count = function.local_offsets().len();

    for (&offset, instruction) in &instructions {
        match instruction.operand {
            Operand::CodeAddress(target) => {
                let lands = usize::try_from(target)
                    .map(|t| t == code.len() || instructions.contains_key(&t))
                    .unwrap_or(false);
                if !lands {
                    return Err(BytecodeError::InvalidBranchTarget { offset, target });
                }
            }
            Operand::Local(index) if index as usize >= local_count => {
                return Err(BytecodeError::LocalOutOfRange {
                    offset,
                    index,
                    local_count,
                });
            }
            _ => {}
        }
    }

    for (block, info) in function.static_data().iter().enumerate() {
        for &offset in info.load_offsets() {
            let is_load = instructions
                .get(&offset)
                .is_some_and(|ins| ins.opcode == OpCode::LoadStaticAddress);
            if !is_load {
                return Err(BytecodeError::DanglingStaticLoad { block, offset });
            }
        }
    }

    Ok(())
}

fn verify_frame(function: &Function) -> BytecodeResult<()> {
    let offsets = function.local_offsets();
    if offsets.len() > MAX_LOCALS {
        return Err(BytecodeError::InconsistentFrame(format!(
            "{} locals exceed the limit of {MAX_LOCALS}",
            offsets.len()
        )));
    }
    if let Some(&first) = offsets.first() {
        if first != 0 {
            return Err(BytecodeError::InconsistentFrame(format!(
                "first local starts at {first}, expected 0"
            )));
        }
    }
    for pair in offsets.windows(2) {
        if pair[1] < pair[0] {
            return Err(BytecodeError::InconsistentFrame(format!(
                "local offsets decrease from {} to {}",
                pair[0], pair[1]
            )));
        }
    }
    match offsets.last() {
        Some(&last) if last > function.local_size() => {
            Err(BytecodeError::InconsistentFrame(format!(
                "local at offset {last} lies outside the {}-byte frame",
                function.local_size()
            )))
        }
        None if function.local_size() != 0 => Err(BytecodeError::InconsistentFrame(format!(
            "no locals but a {}-byte frame",
            function.local_size()
        ))),
        _ => Ok(()),
    }
}
