//! The flat byte buffer every function executes against.
//!
//! ```text
//! 0           stack_start        heap_start          end
//! | static data | frame + scratch | bump-allocated heap |
//! ```
//!
//! Addresses are the `i32` words found on the operand stack. Every access is
//! bounds-checked before any byte is written; a bad access becomes a
//! [`TrapKind::MemoryOutOfBounds`].

use std::ops::Range;

use rebar_types::data::{read_i32, write_i32};
use rebar_types::WORD_SIZE;

use crate::error::TrapKind;

/// Start offsets of the three regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLayout {
    pub stack_start: usize,
    pub heap_start: usize,
    pub end: usize,
}

impl MemoryLayout {
    /// Static data occupies `[0, data_size)`, then the stack, then the heap.
    pub fn new(data_size: usize, stack_size: usize, heap_size: usize) -> Self {
        let stack_start = data_size;
        let heap_start = stack_start + stack_size;
        Self {
            stack_start,
            heap_start,
            end: heap_start + heap_size,
        }
    }

    pub fn data_size(&self) -> usize {
        self.stack_start
    }

    pub fn stack_size(&self) -> usize {
        self.heap_start - self.stack_start
    }

    pub fn heap_size(&self) -> usize {
        self.end - self.heap_start
    }
}

#[derive(Debug, Clone)]
pub struct Memory {
    bytes: Vec<u8>,
    layout: MemoryLayout,
}

impl Memory {
    pub fn new(layout: MemoryLayout) -> Self {
        Self {
            bytes: vec![0; layout.end],
            layout,
        }
    }

    pub fn layout(&self) -> MemoryLayout {
        self.layout
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Byte range `[address, address + len)`, if it lies inside the image.
    fn range(&self, address: i32, len: i32) -> Result<Range<usize>, TrapKind> {
        let out_of_bounds = TrapKind::MemoryOutOfBounds { address, len };
        let start = usize::try_from(address).map_err(|_| out_of_bounds.clone())?;
        let count = usize::try_from(len).map_err(|_| out_of_bounds.clone())?;
        match start.checked_add(count) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(out_of_bounds),
        }
    }

    pub fn slice(&self, address: i32, len: i32) -> Result<&[u8], TrapKind> {
        let range = self.range(address, len)?;
        Ok(&self.bytes[range])
    }

    pub fn load_word(&self, address: i32) -> Result<i32, TrapKind> {
        let range = self.range(address, WORD_SIZE as i32)?;
        let value = read_i32(&self.bytes, range.start).ok_or(TrapKind::MemoryOutOfBounds {
            address,
            len: WORD_SIZE as i32,
        })?;
        tracing::trace!(address, value, "load word");
        Ok(value)
    }

    pub fn store_word(&mut self, address: i32, value: i32) -> Result<(), TrapKind> {
        let range = self.range(address, WORD_SIZE as i32)?;
        write_i32(&mut self.bytes, range.start, value);
        tracing::trace!(address, value, "store word");
        Ok(())
    }

    /// Copy `len` bytes from `from` to `to`; the regions may overlap.
    pub fn copy(&mut self, from: i32, to: i32, len: i32) -> Result<(), TrapKind> {
        let source = self.range(from, len)?;
        let destination = self.range(to, len)?;
        self.bytes.copy_within(source, destination.start);
        tracing::trace!(from, to, len, "copy bytes");
        Ok(())
    }

    /// Write `data` at a host-chosen offset; used by the loader.
    pub(crate) fn write_at(&mut self, offset: usize, data: &[u8]) {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
    }
}
