//! Integration tests for the shared byte-code types.
//!
//! Tests validate:
//! - Verifier acceptance of well-formed functions
//! - Verifier rejection of bad branches, locals, frames and static loads
//! - JSON persistence of functions and static identifiers
//! - Deterministic fingerprints

use rebar_types::{
    verify, BytecodeError, Function, Instruction, OpCode, Operand, StaticDataIdentifier,
    StaticDataInformation,
};

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Encode a list of instructions into a code buffer.
fn assemble(instructions: &[Instruction]) -> Vec<u8> {
    let mut code = Vec::new();
    for ins in instructions {
        ins.encode_into(&mut code);
    }
    code
}

fn op(opcode: OpCode) -> Instruction {
    Instruction::standalone(opcode)
}

fn with(opcode: OpCode, operand: Operand) -> Instruction {
    Instruction { opcode, operand }
}

/// A function with two 4-byte locals, a loop back-edge and one static load.
fn sample_function() -> Function {
    let code = assemble(&[
        with(OpCode::LoadLocalAddress, Operand::Local(1)), // 0
        with(OpCode::LoadIntegerImmediate, Operand::Immediate(1)), // 2
        with(OpCode::BranchIfFalse, Operand::CodeAddress(19)), // 7
        with(OpCode::LoadStaticAddress, Operand::DataAddress(0)), // 12
        op(OpCode::Output), // 17
        op(OpCode::Ret), // 18
        op(OpCode::Ret), // 19
    ]);
    Function::new(
        "sample",
        vec![0, 4],
        8,
        code,
        vec![StaticDataInformation::new(b"hi".to_vec(), vec![12], None)],
    )
}

// ══════════════════════════════════════════════════════════════════════════════
// Verifier
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn verify_accepts_well_formed_function() {
    assert_eq!(verify(&sample_function()), Ok(()));
}

#[test]
fn verify_accepts_branch_to_end_of_code() {
    let code = assemble(&[with(OpCode::Branch, Operand::CodeAddress(5))]);
    let f = Function::new("tail", vec![], 0, code, vec![]);
    assert_eq!(verify(&f), Ok(()));
}

#[test]
fn verify_rejects_branch_into_middle_of_instruction() {
    let code = assemble(&[
        with(OpCode::LoadIntegerImmediate, Operand::Immediate(0)),
        with(OpCode::Branch, Operand::CodeAddress(2)),
    ]);
    let f = Function::new("bad", vec![], 0, code, vec![]);
    assert_eq!(
        verify(&f),
        Err(BytecodeError::InvalidBranchTarget {
            offset: 5,
            target: 2
        })
    );
}

#[test]
fn verify_rejects_negative_branch() {
    let code = assemble(&[with(OpCode::Branch, Operand::CodeAddress(-1))]);
    let f = Function::new("bad", vec![], 0, code, vec![]);
    assert!(matches!(
        verify(&f),
        Err(BytecodeError::InvalidBranchTarget { target: -1, .. })
    ));
}

#[test]
fn verify_rejects_unknown_local() {
    let code = assemble(&[with(OpCode::LoadLocalAddress, Operand::Local(2)), op(OpCode::Ret)]);
    let f = Function::new("bad", vec![0, 4], 8, code, vec![]);
    assert_eq!(
        verify(&f),
        Err(BytecodeError::LocalOutOfRange {
            offset: 0,
            index: 2,
            local_count: 2
        })
    );
}

#[test]
fn verify_rejects_inconsistent_frame() {
    let f = Function::new("bad", vec![4, 0], 8, vec![0x00], vec![]);
    assert!(matches!(verify(&f), Err(BytecodeError::InconsistentFrame(_))));

    let f = Function::new("bad", vec![0, 16], 8, vec![0x00], vec![]);
    assert!(matches!(verify(&f), Err(BytecodeError::InconsistentFrame(_))));
}

#[test]
fn verify_rejects_frame_without_locals() {
    let f = Function::new("bad", vec![], 8, vec![0x00], vec![]);
    assert!(matches!(verify(&f), Err(BytecodeError::InconsistentFrame(_))));
}

#[test]
fn verify_bounds_frame_by_offsets_only() {
    // The last local's size is not recorded, so any frame reaching the
    // last offset is accepted.
    let f = Function::new("f", vec![0, 4], 100, vec![0x00], vec![]);
    assert_eq!(verify(&f), Ok(()));
    let f = Function::new("f", vec![0, 4], 4, vec![0x00], vec![]);
    assert_eq!(verify(&f), Ok(()));
}

#[test]
fn verify_rejects_static_offset_that_is_not_a_load() {
    let code = assemble(&[op(OpCode::Dup), op(OpCode::Ret)]);
    let f = Function::new(
        "bad",
        vec![],
        0,
        code,
        vec![StaticDataInformation::new(vec![1], vec![0], None)],
    );
    assert_eq!(
        verify(&f),
        Err(BytecodeError::DanglingStaticLoad { block: 0, offset: 0 })
    );
}

#[test]
fn verify_rejects_garbage_bytes() {
    let f = Function::new("bad", vec![], 0, vec![0x00, 0x33], vec![]);
    assert_eq!(
        verify(&f),
        Err(BytecodeError::InvalidOpcode {
            offset: 1,
            byte: 0x33
        })
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Persistence and fingerprints
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn function_survives_json() {
    let id = StaticDataIdentifier::labeled("inspect_1");
    let code = assemble(&[
        with(OpCode::LoadStaticAddress, Operand::DataAddress(0)),
        op(OpCode::Ret),
    ]);
    let f = Function::new(
        "persisted",
        vec![],
        0,
        code,
        vec![StaticDataInformation::new(vec![9, 8, 7], vec![0], Some(id.clone()))],
    );

    let restored = Function::from_json(&f.to_json()).expect("valid json");
    assert_eq!(restored, f);
    assert_eq!(restored.static_data()[0].identifier(), Some(&id));
    assert_eq!(restored.fingerprint(), f.fingerprint());
}

#[test]
fn fingerprint_tracks_code_changes() {
    let a = sample_function();
    let b = sample_function();
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert_eq!(a.fingerprint().len(), 64);

    let mut patched = sample_function();
    patched.patch_static_data_offsets(&[1024]).unwrap();
    assert_ne!(patched.fingerprint(), a.fingerprint());
}

#[test]
fn from_json_rejects_garbage() {
    assert!(Function::from_json(b"{not json").is_none());
}
