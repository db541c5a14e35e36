//! Runtime-checked facade over [`Loader`] and [`MemoryImage`].
//!
//! Callers that know their phase statically should use the two types
//! directly; this wrapper serves hosts that hold one object for the whole
//! lifecycle and check phase errors at run time.

use rebar_types::{Function, StaticDataIdentifier};

use crate::config::VmConfig;
use crate::error::{LoadPhase, VmError, VmResult};
use crate::image::MemoryImage;
use crate::interpreter::ExecutionSummary;
use crate::loader::Loader;
use crate::runtime::RuntimeServices;

enum Phase {
    Loading(Loader),
    Finalized(MemoryImage),
}

/// Owns the runtime services hook and one program's loader or image.
pub struct ExecutionContext<R> {
    services: R,
    phase: Phase,
}

impl<R: RuntimeServices> ExecutionContext<R> {
    /// A context with the default [`VmConfig`].
    pub fn new(services: R) -> Self {
        Self {
            services,
            phase: Phase::Loading(Loader::default()),
        }
    }

    pub fn with_config(services: R, config: VmConfig) -> VmResult<Self> {
        Ok(Self {
            services,
            phase: Phase::Loading(Loader::new(config)?),
        })
    }

    pub fn phase(&self) -> LoadPhase {
        match self.phase {
            Phase::Loading(_) => LoadPhase::Loading,
            Phase::Finalized(_) => LoadPhase::Finalized,
        }
    }

    /// Register a function. Loading phase only.
    pub fn load_function(&mut self, function: Function) -> VmResult<()> {
        self.loader_mut("load_function")?.load_function(function)?;
        Ok(())
    }

    /// Lay out memory and link every loaded function. Loading phase only;
    /// on failure the context stays in the loading phase.
    pub fn finalize_load(&mut self) -> VmResult<()> {
        let image = self.loader_mut("finalize_load")?.link()?;
        self.phase = Phase::Finalized(image);
        Ok(())
    }

    /// Copy of a tagged static block's current bytes. Finalized phase only.
    pub fn read_static_data(&self, identifier: &StaticDataIdentifier) -> VmResult<Vec<u8>> {
        self.image("read_static_data")?.read_static_data(identifier)
    }

    /// Run `name` to completion. Finalized phase only.
    pub fn execute_function_top_level(&mut self, name: &str) -> VmResult<ExecutionSummary> {
        let Phase::Finalized(image) = &mut self.phase else {
            return Err(VmError::PhaseViolation {
                operation: "execute_function_top_level",
                phase: LoadPhase::Loading,
            });
        };
        image.execute(name, &mut self.services)
    }

    /// The linked image, once finalized.
    pub fn memory_image(&self) -> Option<&MemoryImage> {
        match &self.phase {
            Phase::Finalized(image) => Some(image),
            Phase::Loading(_) => None,
        }
    }

    pub fn runtime_services(&self) -> &R {
        &self.services
    }

    pub fn runtime_services_mut(&mut self) -> &mut R {
        &mut self.services
    }

    pub fn into_runtime_services(self) -> R {
        self.services
    }

    fn loader_mut(&mut self, operation: &'static str) -> VmResult<&mut Loader> {
        match &mut self.phase {
            Phase::Loading(loader) => Ok(loader),
            Phase::Finalized(_) => Err(VmError::PhaseViolation {
                operation,
                phase: LoadPhase::Finalized,
            }),
        }
    }

    fn image(&self, operation: &'static str) -> VmResult<&MemoryImage> {
        self.memory_image().ok_or(VmError::PhaseViolation {
            operation,
            phase: LoadPhase::Loading,
        })
    }
}
