//! Instruction encoding, decoding and disassembly.
//!
//! This is the only place that knows how operands are laid out after the
//! opcode byte; the assembler encodes through [`Instruction::encode`] and the
//! interpreter, verifier and disassembler all decode through
//! [`Instruction::decode_at`].

use std::fmt;
use std::fmt::Write as _;

use crate::data::read_i32;
use crate::error::{BytecodeError, BytecodeResult};
use crate::opcode::{OpCode, OperandKind};

/// A decoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Local(u8),
    Immediate(i32),
    /// Absolute byte offset into the function's code.
    CodeAddress(i32),
    /// Absolute memory address, or the static block index before linking.
    DataAddress(i32),
}

/// A single decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: OpCode,
    pub operand: Operand,
}

impl Instruction {
    /// An instruction with no operand.
    pub fn standalone(opcode: OpCode) -> Self {
        Self {
            opcode,
            operand: Operand::None,
        }
    }

    /// Decode the instruction starting at `offset`.
    pub fn decode_at(code: &[u8], offset: usize) -> BytecodeResult<Instruction> {
        let byte = *code
            .get(offset)
            .ok_or(BytecodeError::TruncatedInstruction { offset })?;
        let opcode =
            OpCode::from_byte(byte).ok_or(BytecodeError::InvalidOpcode { offset, byte })?;
        let truncated = BytecodeError::TruncatedInstruction { offset };
        let operand = match opcode.operand_kind() {
            OperandKind::None => Operand::None,
            OperandKind::LocalIndex => Operand::Local(*code.get(offset + 1).ok_or(truncated)?),
            OperandKind::Immediate => Operand::Immediate(read_i32(code, offset + 1).ok_or(truncated)?),
            OperandKind::CodeAddress => {
                Operand::CodeAddress(read_i32(code, offset + 1).ok_or(truncated)?)
            }
            OperandKind::DataAddress => {
                Operand::DataAddress(read_i32(code, offset + 1).ok_or(truncated)?)
            }
        };
        Ok(Instruction { opcode, operand })
    }

    /// Encoded length in bytes.
    pub fn encoded_len(&self) -> usize {
        self.opcode.encoded_len()
    }

    /// Append the encoded instruction to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode.byte());
        match self.operand {
            Operand::None => {}
            Operand::Local(index) => out.push(index),
            Operand::Immediate(value)
            | Operand::CodeAddress(value)
            | Operand::DataAddress(value) => out.extend_from_slice(&value.to_le_bytes()),
        }
    }

    /// Encode into a fresh buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut out);
        out
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{}", self.opcode),
            Operand::Local(index) => write!(f, "{} local[{index}]", self.opcode),
            Operand::Immediate(value) => write!(f, "{} {value}", self.opcode),
            Operand::CodeAddress(target) => write!(f, "{} @{target:04}", self.opcode),
            Operand::DataAddress(address) => write!(f, "{} &{address}", self.opcode),
        }
    }
}

/// Iterator over `(offset, instruction)` pairs of a code buffer.
///
/// Stops after the first decode error, which it yields.
pub struct Instructions<'a> {
    code: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> Iterator for Instructions<'a> {
    type Item = BytecodeResult<(usize, Instruction)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.code.len() {
            return None;
        }
        let offset = self.offset;
        match Instruction::decode_at(self.code, offset) {
            Ok(instruction) => {
                self.offset += instruction.encoded_len();
                Some(Ok((offset, instruction)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Walk the instructions of `code` in order.
pub fn decode(code: &[u8]) -> Instructions<'_> {
    Instructions {
        code,
        offset: 0,
        failed: false,
    }
}

/// Render `code` as a listing, one instruction per line.
///
/// ```text
/// 0000: LoadIntegerImmediate 3
/// 0005: LoadIntegerImmediate 4
/// 0010: Add
/// ```
pub fn disassemble(code: &[u8]) -> BytecodeResult<String> {
    let mut listing = String::new();
    for item in decode(code) {
        let (offset, instruction) = item?;
        // Writing to a String cannot fail.
        let _ = writeln!(listing, "{offset:04}: {instruction}");
    }
    Ok(listing)
}
