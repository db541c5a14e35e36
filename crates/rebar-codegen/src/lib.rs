//! Rebar byte-code assembler.
//!
//! # Architecture
//!
//! Code generation for a function happens in two steps:
//!
//! - The [`Allocator`] assigns every variable a [`ValueSource`]: its own
//!   frame slot (sized by [`type_size`]) or a constant alias for another
//!   slot's address. Its slot-size table becomes the function's frame.
//! - The [`FunctionBuilder`] accumulates instructions, forward branch
//!   [`Label`]s and static data blocks, then resolves them in two passes
//!   into a verified [`rebar_types::Function`].
//!
//! Static data addresses are not known until the loader combines every
//! function's blocks into one data segment, so they stay unpatched here.

pub mod allocator;
pub mod builder;
pub mod error;

pub use allocator::{
    type_size, AllocationKind, Allocator, DataType, ValueSource, Variable, VariableId,
};
pub use builder::{FunctionBuilder, Label, StaticDataBuilder, StaticDataRef};
pub use error::{CodegenError, CodegenResult};
