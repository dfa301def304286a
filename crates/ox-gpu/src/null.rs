//! Null graphics system
//!
//! Accepts the full lifecycle without touching any GPU API. Keeps the
//! machine runnable on hosts with no usable graphics device.

use crate::GraphicsSystem;
use ox_core::error::SetupError;
use ox_cpu::Processor;
use ox_kernel::KernelState;
use ox_ui::Window;
use std::sync::Arc;

/// Graphics system that renders nothing
#[derive(Default)]
pub struct NullGraphicsSystem {
    is_setup: bool,
}

impl NullGraphicsSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_setup(&self) -> bool {
        self.is_setup
    }
}

impl GraphicsSystem for NullGraphicsSystem {
    fn setup(
        &mut self,
        _processor: &Arc<Processor>,
        _kernel_state: &Arc<KernelState>,
        window: &Arc<Window>,
    ) -> Result<(), SetupError> {
        tracing::info!("Null graphics system bound to window '{}'", window.title());
        self.is_setup = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.is_setup = false;
    }
}
