//! Debugging support for oxidized-xenon.
//!
//! Hosts the guest-facing debugger (breakpoints, attach state, fault
//! verdicts) and the probe telling whether a host debugger is watching
//! the process itself.

pub mod breakpoint;
pub mod debugger;
pub mod host;

pub use breakpoint::{Breakpoint, BreakpointManager};
pub use debugger::{DebugState, Debugger};
pub use host::is_host_debugger_attached;
