//! Shared byte-code types for the Rebar engine.
//!
//! This crate defines the wire format that the assembler targets and the
//! interpreter executes, plus the [`Function`] unit that moves between them.
//!
//! # Opcode table
//!
//! | Opcode | Operand | Stack effect |
//! |---|---|---|
//! | `Ret` | — | halt |
//! | `Branch` | code addr | `ip = addr` |
//! | `BranchIfFalse` | code addr | pop v; if v == 0, `ip = addr` |
//! | `LoadIntegerImmediate` | i32 | push imm |
//! | `LoadLocalAddress` | u8 | push frame base + local offset |
//! | `LoadStaticAddress` | data addr | push addr |
//! | `StoreInteger`, `StorePointer` | — | pop value, pop addr; store word |
//! | `DerefInteger`, `DerefPointer` | — | pop addr; push word |
//! | `Add` … `Xor` | — | pop rhs, pop lhs; push result |
//! | `Gt` … `Neq` | — | pop rhs, pop lhs; push 1 or 0 |
//! | `Dup` | — | pop v; push v, v |
//! | `Swap` | — | pop a, pop b; push a, b |
//! | `ExchangeBytes` | — | pop size, addr1, addr2; swap the regions |
//! | `Alloc` | — | pop size; push heap address |
//! | `OutputString` | — | pop size, addr; output UTF-8 text |
//! | `CopyBytes` | — | pop size, to, from; copy |
//! | `Output` | — | pop value; output its decimal text |
//!
//! All operands and memory words are 4-byte little-endian.

pub mod data;
mod error;
pub mod function;
pub mod instruction;
pub mod opcode;
pub mod verify;

pub use error::{BytecodeError, BytecodeResult};
pub use function::{Function, StaticDataIdentifier, StaticDataInformation};
pub use instruction::{decode, disassemble, Instruction, Operand};
pub use opcode::{OpCode, OperandKind, MAX_LOCALS, POINTER_SIZE, WORD_SIZE};
pub use verify::verify;
