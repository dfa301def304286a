//! High-level guest kernel emulation
//!
//! The guest OS is not booted; its kernel services are emulated on the
//! host. `KernelState` is the per-machine root object holding the guest
//! object table and the loaded kernel modules. The two baseline modules
//! are `xboxkrnl.exe` (kernel core, module launching, timekeeping) and
//! `xam.xex` (application services, launch handoff data).

pub mod guest_thread;
pub mod kernel_state;
pub mod object_table;
pub mod xam;
pub mod xboxkrnl;

pub use guest_thread::GuestThread;
pub use kernel_state::{KernelModule, KernelState, LoadableModule};
pub use object_table::{Handle, KernelObject, ObjectTable, ObjectType};
pub use xam::{LoaderData, XamModule};
pub use xboxkrnl::XboxkrnlModule;
