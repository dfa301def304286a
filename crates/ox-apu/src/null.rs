//! Null audio system
//!
//! Swallows all output. Used for headless runs and whenever no real
//! backend is available; titles keep running, just silently.

use crate::AudioSystem;
use ox_core::error::SetupError;
use ox_kernel::KernelState;
use std::sync::Arc;

/// Audio system that discards everything
#[derive(Default)]
pub struct NullAudioSystem {
    is_setup: bool,
}

impl NullAudioSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup
    }
}

impl AudioSystem for NullAudioSystem {
    fn setup(&mut self, _kernel_state: &Arc<KernelState>) -> Result<(), SetupError> {
        tracing::info!("Null audio system ready (no output)");
        self.is_setup = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.is_setup = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ox_core::GuestClock;
    use ox_cpu::{ExportResolver, Processor};
    use ox_memory::Memory;
    use ox_vfs::VirtualFileSystem;

    fn make_kernel_state() -> Arc<KernelState> {
        let memory = Memory::new().unwrap();
        let resolver = Arc::new(ExportResolver::new());
        let processor = Arc::new(Processor::new(Arc::clone(&memory), resolver, None));
        let file_system = Arc::new(VirtualFileSystem::new());
        let clock = Arc::new(GuestClock::new(1.0));
        KernelState::new(memory, processor, file_system, clock)
    }

    #[test]
    fn test_lifecycle() {
        let kernel_state = make_kernel_state();
        let mut audio = NullAudioSystem::new();
        assert!(!audio.is_setup());

        audio.setup(&kernel_state).unwrap();
        assert!(audio.is_setup());

        audio.shutdown();
        assert!(!audio.is_setup());
    }
}
