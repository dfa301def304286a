//! Core emulator logic for the oxidized-xenon Xbox 360 emulator
//!
//! This crate provides the foundational types, error handling,
//! configuration, guest clock and fault-dispatch infrastructure
//! shared by every other crate in the workspace.

pub mod clock;
pub mod config;
pub mod critical_region;
pub mod error;
pub mod exception;
pub mod logging;
pub mod threading;

pub use clock::GuestClock;
pub use config::Config;
pub use critical_region::{acquire as acquire_global_lock, GlobalLockGuard};
pub use error::{EmulatorError, LaunchError, Result, SetupError};
pub use exception::{Exception, ExceptionCode, HandlerRegistration};
