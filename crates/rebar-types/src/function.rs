//! The executable unit produced by the assembler and consumed by the loader.
//!
//! A [`Function`] is immutable once built, with one exception: the loader
//! patches every `LoadStaticAddress` operand with the final address of its
//! static block, exactly once, via [`Function::patch_static_data_offsets`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::data::write_i32;
use crate::error::{BytecodeError, BytecodeResult};
use crate::opcode::OpCode;

static NEXT_IDENTIFIER: AtomicU64 = AtomicU64::new(1);

/// Opaque token naming a static block so it can be read back after execution.
///
/// Equality is by identity: a clone equals its source, two identifiers
/// created separately never compare equal. The optional label is for
/// diagnostics only and takes no part in equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticDataIdentifier {
    id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl StaticDataIdentifier {
    pub fn new() -> Self {
        Self {
            id: NEXT_IDENTIFIER.fetch_add(1, Ordering::Relaxed),
            label: None,
        }
    }

    /// A fresh identifier carrying a diagnostic label.
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::new()
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl Default for StaticDataIdentifier {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for StaticDataIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StaticDataIdentifier {}

impl Hash for StaticDataIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for StaticDataIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => write!(f, "{label}#{}", self.id),
            None => write!(f, "static#{}", self.id),
        }
    }
}

/// A static data block together with the code offsets that load its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticDataInformation {
    data: Vec<u8>,
    /// Offsets of `LoadStaticAddress` instructions (the opcode byte).
    load_offsets: Vec<usize>,
    identifier: Option<StaticDataIdentifier>,
}

impl StaticDataInformation {
    pub fn new(
        data: Vec<u8>,
        load_offsets: Vec<usize>,
        identifier: Option<StaticDataIdentifier>,
    ) -> Self {
        Self {
            data,
            load_offsets,
            identifier,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn load_offsets(&self) -> &[usize] {
        &self.load_offsets
    }

    pub fn identifier(&self) -> Option<&StaticDataIdentifier> {
        self.identifier.as_ref()
    }
}

/// A compiled function: frame layout, byte-code and static data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    name: String,
    local_offsets: Vec<u32>,
    local_size: u32,
    code: Vec<u8>,
    static_data: Vec<StaticDataInformation>,
    #[serde(default)]
    patched: bool,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        local_offsets: Vec<u32>,
        local_size: u32,
        code: Vec<u8>,
        static_data: Vec<StaticDataInformation>,
    ) -> Self {
        Self {
            name: name.into(),
            local_offsets,
            local_size,
            code,
            static_data,
            patched: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Byte offset of each local within the frame, indexed by local slot.
    pub fn local_offsets(&self) -> &[u32] {
        &self.local_offsets
    }

    /// Total frame size in bytes.
    pub fn local_size(&self) -> u32 {
        self.local_size
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn static_data(&self) -> &[StaticDataInformation] {
        &self.static_data
    }

    /// Whether the loader has already linked static addresses into the code.
    pub fn is_patched(&self) -> bool {
        self.patched
    }

    /// Bytes this function needs in the data segment, given the per-block
    /// alignment. Empty blocks still occupy one aligned slot.
    pub fn static_data_footprint(&self, alignment: usize) -> usize {
        self.static_data
            .iter()
            .map(|block| crate::data::round_up_to_nearest(block.data.len().max(1), alignment))
            .sum()
    }

    /// Overwrite every static address operand with its block's final address.
    ///
    /// `addresses[i]` is the absolute address of `static_data()[i]`. May be
    /// called at most once.
    pub fn patch_static_data_offsets(&mut self, addresses: &[i32]) -> BytecodeResult<()> {
        if self.patched {
            return Err(BytecodeError::AlreadyPatched(self.name.clone()));
        }
        if addresses.len() != self.static_data.len() {
            return Err(BytecodeError::PatchCountMismatch {
                name: self.name.clone(),
                expected: self.static_data.len(),
                actual: addresses.len(),
            });
        }
        // Check every site first so a bad offset leaves the code untouched.
        for (block_index, block) in self.static_data.iter().enumerate() {
            for &offset in &block.load_offsets {
                if offset.saturating_add(OpCode::LoadStaticAddress.encoded_len()) > self.code.len() {
                    return Err(BytecodeError::DanglingStaticLoad {
                        block: block_index,
                        offset,
                    });
                }
            }
        }
        for (block, &address) in self.static_data.iter().zip(addresses) {
            for &offset in &block.load_offsets {
                write_i32(&mut self.code, offset + 1, address);
            }
        }
        self.patched = true;
        Ok(())
    }

    /// SHA-256 over the name, frame layout, code and static blocks, as hex.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update((self.name.len() as u64).to_le_bytes());
        hasher.update(self.name.as_bytes());
        hasher.update((self.local_offsets.len() as u64).to_le_bytes());
        for offset in &self.local_offsets {
            hasher.update(offset.to_le_bytes());
        }
        hasher.update(self.local_size.to_le_bytes());
        hasher.update((self.code.len() as u64).to_le_bytes());
        hasher.update(&self.code);
        for block in &self.static_data {
            hasher.update((block.data.len() as u64).to_le_bytes());
            hasher.update(&block.data);
            for offset in &block.load_offsets {
                hasher.update((*offset as u64).to_le_bytes());
            }
        }
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Deserialize from JSON bytes.
    pub fn from_json(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}
