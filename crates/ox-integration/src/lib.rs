//! Core integration layer for oxidized-xenon.
//!
//! Ties the subsystems into one `Emulator`: guest memory, the CPU,
//! audio, graphics and input, the virtual filesystem and the HLE
//! kernel, plus title launching and last-chance fault routing.

pub mod emulator;
pub mod launch;

pub use emulator::{
    AudioSystemFactory, Emulator, GraphicsSystemFactory, InputDriverFactory,
    suspend_guest_threads_for_freeze,
};
pub use launch::{LaunchTarget, classify, run_module_chain};
