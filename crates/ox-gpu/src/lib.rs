//! Graphics system interface
//!
//! The GPU is emulated behind the [`GraphicsSystem`] trait. A real
//! implementation owns a command processor and presents to the window;
//! the null implementation keeps headless runs and tests alive.

pub mod null;

pub use null::NullGraphicsSystem;

use ox_core::error::SetupError;
use ox_cpu::Processor;
use ox_kernel::KernelState;
use ox_ui::Window;
use std::sync::Arc;

/// A graphics implementation
pub trait GraphicsSystem: Send {
    /// Bind to the processor, the kernel and the display surface.
    fn setup(
        &mut self,
        processor: &Arc<Processor>,
        kernel_state: &Arc<KernelState>,
        window: &Arc<Window>,
    ) -> Result<(), SetupError>;

    /// Stop presenting and release GPU resources. Called once during
    /// teardown, before ownership of the system is dropped.
    fn shutdown(&mut self);
}
