//! Opcode table and operand encodings.
//!
//! Every instruction starts with a single opcode byte. The operand (if any)
//! follows immediately:
//!
//! ```text
//! [opcode]                      no operand          1 byte
//! [opcode][u8 local index]      local slot          2 bytes
//! [opcode][i32 little-endian]   immediate/address   5 bytes
//! ```
//!
//! Stack-consuming opcodes take all of their inputs from the operand stack;
//! see the table in the crate docs for the stack effect of each opcode.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Byte width of an `i32` operand or in-memory word.
pub const WORD_SIZE: usize = 4;

/// Width of a pointer on the target. Addresses are plain 32-bit words.
pub const POINTER_SIZE: usize = WORD_SIZE;

/// Maximum number of locals addressable by `LoadLocalAddress`.
pub const MAX_LOCALS: usize = u8::MAX as usize + 1;

/// How an opcode's operand is encoded after the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandKind {
    /// No operand; instruction is a single byte.
    None,
    /// One byte local-slot index.
    LocalIndex,
    /// Signed 32-bit immediate.
    Immediate,
    /// Absolute 32-bit code offset (branch target).
    CodeAddress,
    /// Absolute 32-bit memory address (patched by the loader).
    DataAddress,
}

impl OperandKind {
    /// Size in bytes of the encoded operand.
    pub fn size(self) -> usize {
        match self {
            OperandKind::None => 0,
            OperandKind::LocalIndex => 1,
            OperandKind::Immediate | OperandKind::CodeAddress | OperandKind::DataAddress => {
                WORD_SIZE
            }
        }
    }
}

/// Byte-code opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum OpCode {
    // ── Control flow ─────────────────────────────────────────────────────
    Ret = 0x00,
    Branch = 0x01,
    BranchIfFalse = 0x02,

    // ── Loads ────────────────────────────────────────────────────────────
    LoadIntegerImmediate = 0x10,
    LoadLocalAddress = 0x11,
    LoadStaticAddress = 0x12,

    // ── Memory ───────────────────────────────────────────────────────────
    StoreInteger = 0x20,
    StorePointer = 0x21,
    DerefInteger = 0x30,
    DerefPointer = 0x31,

    // ── Arithmetic / bitwise ─────────────────────────────────────────────
    Add = 0x40,
    Subtract = 0x41,
    Multiply = 0x42,
    Divide = 0x43,
    And = 0x44,
    Or = 0x45,
    Xor = 0x46,

    // ── Comparison ───────────────────────────────────────────────────────
    Gt = 0x48,
    Gte = 0x49,
    Lt = 0x4A,
    Lte = 0x4B,
    Eq = 0x4C,
    Neq = 0x4D,

    // ── Stack ────────────────────────────────────────────────────────────
    Dup = 0x50,
    Swap = 0x51,

    // ── Runtime intrinsics ───────────────────────────────────────────────
    ExchangeBytes = 0xFA,
    Alloc = 0xFB,
    OutputString = 0xFC,
    CopyBytes = 0xFD,
    Output = 0xFF,
}

impl OpCode {
    /// Every opcode, in byte order.
    pub const ALL: [OpCode; 30] = [
        OpCode::Ret,
        OpCode::Branch,
        OpCode::BranchIfFalse,
        OpCode::LoadIntegerImmediate,
        OpCode::LoadLocalAddress,
        OpCode::LoadStaticAddress,
        OpCode::StoreInteger,
        OpCode::StorePointer,
        OpCode::DerefInteger,
        OpCode::DerefPointer,
        OpCode::Add,
        OpCode::Subtract,
        OpCode::Multiply,
        OpCode::Divide,
        OpCode::And,
        OpCode::Or,
        OpCode::Xor,
        OpCode::Gt,
        OpCode::Gte,
        OpCode::Lt,
        OpCode::Lte,
        OpCode::Eq,
        OpCode::Neq,
        OpCode::Dup,
        OpCode::Swap,
        OpCode::ExchangeBytes,
        OpCode::Alloc,
        OpCode::OutputString,
        OpCode::CopyBytes,
        OpCode::Output,
    ];

    /// Decode an opcode byte. Returns `None` for bytes outside the table.
    pub fn from_byte(byte: u8) -> Option<OpCode> {
        let op = match byte {
            0x00 => OpCode::Ret,
            0x01 => OpCode::Branch,
            0x02 => OpCode::BranchIfFalse,
            0x10 => OpCode::LoadIntegerImmediate,
            0x11 => OpCode::LoadLocalAddress,
            0x12 => OpCode::LoadStaticAddress,
            0x20 => OpCode::StoreInteger,
            0x21 => OpCode::StorePointer,
            0x30 => OpCode::DerefInteger,
            0x31 => OpCode::DerefPointer,
            0x40 => OpCode::Add,
            0x41 => OpCode::Subtract,
            0x42 => OpCode::Multiply,
            0x43 => OpCode::Divide,
            0x44 => OpCode::And,
            0x45 => OpCode::Or,
            0x46 => OpCode::Xor,
            0x48 => OpCode::Gt,
            0x49 => OpCode::Gte,
            0x4A => OpCode::Lt,
            0x4B => OpCode::Lte,
            0x4C => OpCode::Eq,
            0x4D => OpCode::Neq,
            0x50 => OpCode::Dup,
            0x51 => OpCode::Swap,
            0xFA => OpCode::ExchangeBytes,
            0xFB => OpCode::Alloc,
            0xFC => OpCode::OutputString,
            0xFD => OpCode::CopyBytes,
            0xFF => OpCode::Output,
            _ => return None,
        };
        Some(op)
    }

    /// The encoded opcode byte.
    pub fn byte(self) -> u8 {
        self as u8
    }

    /// Operand encoding that follows this opcode.
    pub fn operand_kind(self) -> OperandKind {
        match self {
            OpCode::Branch | OpCode::BranchIfFalse => OperandKind::CodeAddress,
            OpCode::LoadIntegerImmediate => OperandKind::Immediate,
            OpCode::LoadLocalAddress => OperandKind::LocalIndex,
            OpCode::LoadStaticAddress => OperandKind::DataAddress,
            _ => OperandKind::None,
        }
    }

    /// Total encoded length of an instruction with this opcode.
    pub fn encoded_len(self) -> usize {
        1 + self.operand_kind().size()
    }

    /// Mnemonic used by the disassembler.
    pub fn mnemonic(self) -> &'static str {
        match self {
            OpCode::Ret => "Ret",
            OpCode::Branch => "Branch",
            OpCode::BranchIfFalse => "BranchIfFalse",
            OpCode::LoadIntegerImmediate => "LoadIntegerImmediate",
            OpCode::LoadLocalAddress => "LoadLocalAddress",
            OpCode::LoadStaticAddress => "LoadStaticAddress",
            OpCode::StoreInteger => "StoreInteger",
            OpCode::StorePointer => "StorePointer",
            OpCode::DerefInteger => "DerefInteger",
            OpCode::DerefPointer => "DerefPointer",
            OpCode::Add => "Add",
            OpCode::Subtract => "Subtract",
            OpCode::Multiply => "Multiply",
            OpCode::Divide => "Divide",
            OpCode::And => "And",
            OpCode::Or => "Or",
            OpCode::Xor => "Xor",
            OpCode::Gt => "Gt",
            OpCode::Gte => "Gte",
            OpCode::Lt => "Lt",
            OpCode::Lte => "Lte",
            OpCode::Eq => "Eq",
            OpCode::Neq => "Neq",
            OpCode::Dup => "Dup",
            OpCode::Swap => "Swap",
            OpCode::ExchangeBytes => "ExchangeBytes",
            OpCode::Alloc => "Alloc",
            OpCode::OutputString => "OutputString",
            OpCode::CopyBytes => "CopyBytes",
            OpCode::Output => "Output",
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        OpCode::from_byte(byte).ok_or(byte)
    }
}
