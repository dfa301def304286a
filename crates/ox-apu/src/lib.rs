//! Audio system interface
//!
//! The audio processor is emulated behind the [`AudioSystem`] trait so
//! hosts can plug in a real output backend or run silent.

pub mod null;

pub use null::NullAudioSystem;

use ox_core::error::SetupError;
use ox_kernel::KernelState;
use std::sync::Arc;

/// An audio output implementation
pub trait AudioSystem: Send {
    /// Bind to kernel state and open the output device.
    fn setup(&mut self, kernel_state: &Arc<KernelState>) -> Result<(), SetupError>;

    /// Release the output device. Called once during teardown, before
    /// ownership of the system is dropped.
    fn shutdown(&mut self);
}
