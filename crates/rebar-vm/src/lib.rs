//! Rebar byte-code loader, linker and interpreter.
//!
//! # Lifecycle
//!
//! ```text
//! Loader ──load_function──▶ Loader ──finalize──▶ MemoryImage ──execute──▶ output
//! ```
//!
//! A [`Loader`] collects verified [`rebar_types::Function`]s. Finalizing it
//! lays out one flat memory image (static data, then the stack, then the
//! heap), copies every static block in, and patches each function's
//! `LoadStaticAddress` operands with the final addresses. The resulting
//! [`MemoryImage`] can execute any of its functions and read tagged static
//! blocks back.
//!
//! [`ExecutionContext`] wraps both phases behind one object and reports
//! out-of-phase calls as [`VmError::PhaseViolation`].
//!
//! # Runtime faults
//!
//! Every fault (bad opcode, out-of-bounds access, exhausted heap, division
//! by zero, …) is returned as [`VmError::Trap`] carrying the faulting `ip`.
//! Faults are detected before the offending write.

pub mod config;
pub mod context;
pub mod error;
pub mod image;
pub mod interpreter;
pub mod loader;
pub mod memory;
pub mod runtime;

pub use config::VmConfig;
pub use context::ExecutionContext;
pub use error::{LoadPhase, Trap, TrapKind, VmError, VmResult};
pub use image::MemoryImage;
pub use interpreter::ExecutionSummary;
pub use loader::Loader;
pub use memory::MemoryLayout;
pub use runtime::{BufferedOutput, RuntimeServices};
