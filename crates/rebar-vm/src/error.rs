//! VM error and trap types.

use std::fmt;

use rebar_types::{BytecodeError, StaticDataIdentifier};
use thiserror::Error;

/// Lifecycle phase of an [`crate::ExecutionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    /// Functions may be loaded; nothing may execute.
    Loading,
    /// Memory is laid out; functions may execute and static data be read.
    Finalized,
}

impl fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadPhase::Loading => write!(f, "loading"),
            LoadPhase::Finalized => write!(f, "finalized"),
        }
    }
}

/// What went wrong while executing byte-code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapKind {
    /// The frame, or `ExchangeBytes` scratch space, does not fit the stack region.
    StackOverflow,
    /// `Alloc` ran past the end of the heap region.
    HeapExhausted,
    InvalidOpcode(u8),
    DivideByZero,
    /// `i32::MIN / -1`.
    ArithmeticOverflow,
    OperandStackUnderflow,
    /// An access of `len` bytes at `address` leaves the memory image.
    MemoryOutOfBounds { address: i32, len: i32 },
    /// `ip` left the function's code, or an operand is cut off.
    CodeOutOfBounds,
    InvalidLocal(u8),
    /// `OutputString` named bytes that are not UTF-8.
    InvalidUtf8,
    InstructionLimitExceeded,
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrapKind::StackOverflow => write!(f, "stack overflow"),
            TrapKind::HeapExhausted => write!(f, "heap exhausted"),
            TrapKind::InvalidOpcode(byte) => write!(f, "invalid opcode 0x{byte:02X}"),
            TrapKind::DivideByZero => write!(f, "division by zero"),
            TrapKind::ArithmeticOverflow => write!(f, "arithmetic overflow"),
            TrapKind::OperandStackUnderflow => write!(f, "operand stack underflow"),
            TrapKind::MemoryOutOfBounds { address, len } => {
                write!(f, "memory access of {len} bytes at {address} is out of bounds")
            }
            TrapKind::CodeOutOfBounds => write!(f, "instruction pointer out of bounds"),
            TrapKind::InvalidLocal(index) => write!(f, "invalid local index {index}"),
            TrapKind::InvalidUtf8 => write!(f, "output string is not valid UTF-8"),
            TrapKind::InstructionLimitExceeded => write!(f, "instruction limit exceeded"),
        }
    }
}

/// A runtime fault and the offset of the instruction that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at ip {ip}")]
pub struct Trap {
    pub kind: TrapKind,
    pub ip: usize,
}

/// Errors surfaced by the loader, the memory image and the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    /// An operation was called in the wrong lifecycle phase.
    #[error("`{operation}` is not allowed in the {phase} phase")]
    PhaseViolation {
        operation: &'static str,
        phase: LoadPhase,
    },

    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    #[error("unknown static data {0}")]
    UnknownStaticData(StaticDataIdentifier),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Bytecode(#[from] BytecodeError),

    #[error("trap: {0}")]
    Trap(#[from] Trap),
}

impl VmError {
    /// The trap kind, if this is a runtime fault.
    pub fn trap_kind(&self) -> Option<&TrapKind> {
        match self {
            VmError::Trap(trap) => Some(&trap.kind),
            _ => None,
        }
    }
}

/// VM result type alias.
pub type VmResult<T> = Result<T, VmError>;
