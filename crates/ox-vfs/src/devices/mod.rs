//! Device implementations

pub mod disc_image;
pub mod host_path;
pub mod stfs_container;

pub use disc_image::DiscImageDevice;
pub use host_path::HostPathDevice;
pub use stfs_container::StfsContainerDevice;
