//! Guest processor facade

use std::sync::Arc;

use once_cell::sync::OnceCell;
use ox_core::error::CpuError;
use ox_debug::Debugger;
use ox_memory::Memory;

use crate::backend::Backend;
use crate::export_resolver::ExportResolver;

/// The guest CPU.
///
/// Construction wires up memory, export resolution and the optional
/// debugger; `setup` installs the translation backend once the host
/// has picked one.
pub struct Processor {
    memory: Arc<Memory>,
    export_resolver: Arc<ExportResolver>,
    debugger: Option<Arc<Debugger>>,
    backend: OnceCell<Backend>,
}

impl Processor {
    pub fn new(
        memory: Arc<Memory>,
        export_resolver: Arc<ExportResolver>,
        debugger: Option<Arc<Debugger>>,
    ) -> Self {
        Self {
            memory,
            export_resolver,
            debugger,
            backend: OnceCell::new(),
        }
    }

    /// Install the translation backend. Runs once during system bring-up.
    pub fn setup(&self, backend: Backend) -> Result<(), CpuError> {
        let cache_base = backend.code_cache().base_address();
        self.backend
            .set(backend)
            .map_err(|_| CpuError::BackendAlreadyInstalled)?;
        tracing::info!("Processor ready, code cache at 0x{:016x}", cache_base);
        Ok(())
    }

    /// The installed backend, if `setup` has run.
    pub fn backend(&self) -> Option<&Backend> {
        self.backend.get()
    }

    pub fn memory(&self) -> &Arc<Memory> {
        &self.memory
    }

    pub fn export_resolver(&self) -> &Arc<ExportResolver> {
        &self.export_resolver
    }

    pub fn debugger(&self) -> Option<&Arc<Debugger>> {
        self.debugger.as_ref()
    }
}
