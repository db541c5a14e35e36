//! Little-endian word helpers shared by the assembler, loader and interpreter.

use crate::opcode::WORD_SIZE;

/// Round `value` up to the nearest multiple of `multiple`.
///
/// `multiple` must be non-zero.
pub fn round_up_to_nearest(value: usize, multiple: usize) -> usize {
    value.div_ceil(multiple) * multiple
}

/// Read a little-endian `i32` at `index`. Returns `None` if fewer than four
/// bytes remain.
pub fn read_i32(bytes: &[u8], index: usize) -> Option<i32> {
    let end = index.checked_add(WORD_SIZE)?;
    let word: [u8; WORD_SIZE] = bytes.get(index..end)?.try_into().ok()?;
    Some(i32::from_le_bytes(word))
}

/// Write `value` as a little-endian `i32` at `index`. Returns `false` (and
/// writes nothing) if fewer than four bytes remain.
pub fn write_i32(bytes: &mut [u8], index: usize, value: i32) -> bool {
    let Some(end) = index.checked_add(WORD_SIZE) else {
        return false;
    };
    match bytes.get_mut(index..end) {
        Some(slot) => {
            slot.copy_from_slice(&value.to_le_bytes());
            true
        }
        None => false,
    }
}
