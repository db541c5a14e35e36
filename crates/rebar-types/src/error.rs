//! Byte-code error types.

use thiserror::Error;

/// Errors raised while decoding, verifying or patching byte-code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BytecodeError {
    /// The byte at `offset` is not a known opcode.
    #[error("invalid opcode 0x{byte:02X} at offset {offset}")]
    InvalidOpcode { offset: usize, byte: u8 },

    /// An instruction's operand runs past the end of the code.
    #[error("truncated instruction at offset {offset}")]
    TruncatedInstruction { offset: usize },

    /// A branch does not land on an instruction boundary.
    #[error("branch at offset {offset} targets {target}, which is not an instruction boundary")]
    InvalidBranchTarget { offset: usize, target: i32 },

    /// A `LoadLocalAddress` names a local the frame does not declare.
    #[error("local index {index} at offset {offset} is out of range ({local_count} locals)")]
    LocalOutOfRange {
        offset: usize,
        index: u8,
        local_count: usize,
    },

    /// Local offsets are not the prefix sums of the frame.
    #[error("inconsistent frame layout: {0}")]
    InconsistentFrame(String),

    /// A static block records a load offset that is not a `LoadStaticAddress`.
    #[error("static block {block} records load offset {offset}, which is not a static address load")]
    DanglingStaticLoad { block: usize, offset: usize },

    /// `patch_static_data_offsets` was called on an already-linked function.
    #[error("function `{0}` has already been patched")]
    AlreadyPatched(String),

    /// The loader supplied a different number of addresses than there are blocks.
    #[error("function `{name}` has {expected} static blocks but {actual} addresses were supplied")]
    PatchCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Byte-code result type alias.
pub type BytecodeResult<T> = Result<T, BytecodeError>;
