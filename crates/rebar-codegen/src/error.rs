//! Codegen error types.

use rebar_types::BytecodeError;
use thiserror::Error;

use crate::allocator::{DataType, VariableId};

/// Errors that can occur during allocation and assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// The allocator has no size for this type.
    #[error("unsupported type for local allocation: {0}")]
    UnsupportedType(DataType),

    /// A constant reference names a variable that has not been allocated.
    #[error("variable {0} has no value source yet")]
    UnallocatedVariable(VariableId),

    /// A constant reference names a variable that has no stack slot of its own.
    #[error("variable {0} is not addressable")]
    NotAddressable(VariableId),

    /// The same variable was allocated twice.
    #[error("variable {0} is already allocated")]
    AlreadyAllocated(VariableId),

    /// `set_label` was called twice for one label.
    #[error("label {0} has already been set")]
    LabelAlreadySet(u32),

    /// A branch targets a label that was never set.
    #[error("label {0} is referenced by a branch but was never set")]
    UnsetLabel(u32),

    /// A label or static-data handle from a different builder.
    #[error("unknown {kind} handle {index}")]
    UnknownHandle { kind: &'static str, index: u32 },

    /// Too many locals, or a size that does not fit the 32-bit address space.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The assembled function failed verification.
    #[error("verification failed: {0}")]
    Verification(#[from] BytecodeError),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
