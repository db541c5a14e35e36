//! Finalized phase: linked functions plus the memory they run against.

use std::collections::{BTreeMap, HashMap};

use rebar_types::{Function, StaticDataIdentifier};

use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::interpreter::{ExecutionSummary, Interpreter};
use crate::memory::{Memory, MemoryLayout};
use crate::runtime::RuntimeServices;

/// A linked program. Produced by [`crate::Loader::finalize`]; no further
/// functions can be added.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    config: VmConfig,
    memory: Memory,
    functions: BTreeMap<String, Function>,
    /// Identifier → (address, length) of every tagged static block.
    static_locations: HashMap<StaticDataIdentifier, (usize, usize)>,
}

impl MemoryImage {
    pub(crate) fn new(
        config: VmConfig,
        memory: Memory,
        functions: BTreeMap<String, Function>,
        static_locations: HashMap<StaticDataIdentifier, (usize, usize)>,
    ) -> Self {
        Self {
            config,
            memory,
            functions,
            static_locations,
        }
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn layout(&self) -> MemoryLayout {
        self.memory.layout()
    }

    pub fn memory(&self) -> &[u8] {
        self.memory.bytes()
    }

    /// A linked function, with its static addresses patched in.
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// Address and length of a tagged static block.
    pub fn static_data_location(&self, identifier: &StaticDataIdentifier) -> Option<(usize, usize)> {
        self.static_locations.get(identifier).copied()
    }

    /// Current contents of a tagged static block.
    pub fn read_static_data(&self, identifier: &StaticDataIdentifier) -> VmResult<Vec<u8>> {
        let (address, len) = self
            .static_data_location(identifier)
            .ok_or_else(|| VmError::UnknownStaticData(identifier.clone()))?;
        Ok(self.memory.bytes()[address..address + len].to_vec())
    }

    /// Run `name` from its first instruction until `Ret` or a trap.
    pub fn execute<R: RuntimeServices>(
        &mut self,
        name: &str,
        services: &mut R,
    ) -> VmResult<ExecutionSummary> {
        let function = self
            .functions
            .get(name)
            .ok_or_else(|| VmError::UnknownFunction(name.to_owned()))?;

        tracing::debug!(name, "execution started");
        let result = Interpreter::new(
            function,
            &mut self.memory,
            services,
            self.config.instruction_limit,
        )
        .run();
        match &result {
            Ok(summary) => tracing::debug!(
                name,
                instructions = summary.instructions_executed,
                peak_stack = summary.peak_stack_depth,
                heap = summary.heap_bytes_allocated,
                "execution finished"
            ),
            Err(error) => tracing::debug!(name, %error, "execution trapped"),
        }
        Ok(result?)
    }
}
