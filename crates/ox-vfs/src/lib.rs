//! Virtual file system for oxidized-xenon
//!
//! Guest code sees the console's device namespace (`\Device\...` plus
//! drive-letter symbolic links such as `game:`). Devices back that
//! namespace with host directories, disc images or content packages.

pub mod device;
pub mod devices;
pub mod entry;
pub mod mount;

pub use device::Device;
pub use devices::{DiscImageDevice, HostPathDevice, StfsContainerDevice};
pub use entry::Entry;
pub use mount::VirtualFileSystem;
