//! Loading phase: collect functions, then link them into a [`MemoryImage`].

use std::collections::{BTreeMap, HashMap};

use rebar_types::data::round_up_to_nearest;
use rebar_types::{verify, BytecodeError, Function};

use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::image::MemoryImage;
use crate::memory::{Memory, MemoryLayout};

/// Accumulates functions and their static data requirements.
///
/// Functions are keyed by name; loading a second function with the same
/// name replaces the first.
#[derive(Debug, Default)]
pub struct Loader {
    config: VmConfig,
    functions: BTreeMap<String, Function>,
    static_data_size: usize,
}

impl Loader {
    pub fn new(config: VmConfig) -> VmResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            functions: BTreeMap::new(),
            static_data_size: 0,
        })
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Verify and register `function`, returning the function it displaced.
    pub fn load_function(&mut self, function: Function) -> VmResult<Option<Function>> {
        if function.is_patched() {
            return Err(BytecodeError::AlreadyPatched(function.name().to_owned()).into());
        }
        verify(&function)?;

        let footprint = function.static_data_footprint(self.config.static_data_alignment);
        tracing::debug!(
            name = function.name(),
            code_len = function.code().len(),
            static_blocks = function.static_data().len(),
            footprint,
            "function loaded"
        );

        self.static_data_size += footprint;
        let displaced = self.functions.insert(function.name().to_owned(), function);
        if let Some(previous) = &displaced {
            tracing::warn!(name = previous.name(), "function replaced by a later load");
            self.static_data_size -= previous.static_data_footprint(self.config.static_data_alignment);
        }
        Ok(displaced)
    }

    /// Names of the loaded functions, in link order.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Bytes of static data the loaded functions need, before segment rounding.
    pub fn static_data_size(&self) -> usize {
        self.static_data_size
    }

    /// Lay out memory and link every function.
    pub fn finalize(self) -> VmResult<MemoryImage> {
        self.link()
    }

    /// Build the image without consuming the loader, so a failed link
    /// leaves it intact.
    pub(crate) fn link(&self) -> VmResult<MemoryImage> {
        let total = self.config.image_size(self.static_data_size)?;
        let data_size = total - self.config.stack_size - self.config.heap_size;
        let layout = MemoryLayout::new(data_size, self.config.stack_size, self.config.heap_size);
        let mut memory = Memory::new(layout);

        let mut functions = BTreeMap::new();
        let mut static_locations = HashMap::new();
        let mut offset = 0usize;
        for (name, function) in &self.functions {
            let mut function = function.clone();
            let mut addresses = Vec::with_capacity(function.static_data().len());
            for block in function.static_data() {
                memory.write_at(offset, block.data());
                if let Some(identifier) = block.identifier() {
                    static_locations.insert(identifier.clone(), (offset, block.data().len()));
                }
                // `offset` stays below the validated image size, so it fits an i32.
                addresses.push(offset as i32);
                offset += round_up_to_nearest(block.data().len().max(1), self.config.static_data_alignment);
            }
            function.patch_static_data_offsets(&addresses)?;
            functions.insert(name.clone(), function);
        }

        tracing::debug!(
            functions = functions.len(),
            data = layout.data_size(),
            stack = layout.stack_size(),
            heap = layout.heap_size(),
            static_used = offset,
            "memory image finalized"
        );
        Ok(MemoryImage::new(
            self.config.clone(),
            memory,
            functions,
            static_locations,
        ))
    }
}
