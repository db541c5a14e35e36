//! Memory-image and execution configuration.

use serde::{Deserialize, Serialize};

use crate::error::{VmError, VmResult};

/// Sizes and limits of the memory image.
///
/// Missing fields take their defaults when deserializing, so
/// `{"heap_size": 4096}` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// The static data segment is rounded up to a multiple of this.
    pub data_segment_alignment: usize,
    pub stack_size: usize,
    pub heap_size: usize,
    /// Every static block starts on a multiple of this.
    pub static_data_alignment: usize,
    /// Instructions a single invocation may execute; `None` is unlimited.
    pub instruction_limit: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            data_segment_alignment: 1024,
            stack_size: 1024,
            heap_size: 2048,
            static_data_alignment: 4,
            instruction_limit: None,
        }
    }
}

impl VmConfig {
    /// Largest image a 32-bit address word can reach.
    pub const MAX_IMAGE_SIZE: usize = i32::MAX as usize;

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> VmResult<Self> {
        let config: VmConfig =
            serde_json::from_str(json).map_err(|e| VmError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> VmResult<()> {
        if self.data_segment_alignment == 0 {
            return Err(VmError::InvalidConfig(
                "data_segment_alignment must be non-zero".into(),
            ));
        }
        if self.static_data_alignment == 0 {
            return Err(VmError::InvalidConfig(
                "static_data_alignment must be non-zero".into(),
            ));
        }
        self.image_size(0)?;
        Ok(())
    }

    /// Total image size for `static_data_size` bytes of static data.
    pub fn image_size(&self, static_data_size: usize) -> VmResult<usize> {
        let data = static_data_size
            .checked_next_multiple_of(self.data_segment_alignment)
            .ok_or_else(|| too_large(static_data_size))?;
        data.checked_add(self.stack_size)
            .and_then(|total| total.checked_add(self.heap_size))
            .filter(|&total| total <= Self::MAX_IMAGE_SIZE)
            .ok_or_else(|| too_large(static_data_size))
    }
}

fn too_large(static_data_size: usize) -> VmError {
    VmError::InvalidConfig(format!(
        "memory image with {static_data_size} bytes of static data exceeds {} bytes",
        VmConfig::MAX_IMAGE_SIZE
    ))
}
