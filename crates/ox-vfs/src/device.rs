//! Device interface

use ox_core::error::VfsError;

use crate::entry::Entry;

/// A mounted backing store for part of the guest namespace.
///
/// Devices are initialized before registration; a device that fails to
/// initialize is never mounted.
pub trait Device: Send + Sync {
    /// Guest path the device is mounted at (e.g. `\Device\Cdrom0`).
    fn mount_path(&self) -> &str;

    /// Open the backing store and enumerate its contents. Returns false
    /// when the store is missing or not in the expected format.
    fn initialize(&mut self) -> bool;

    /// Look up an entry by device-relative guest path (empty string for
    /// the device root).
    fn find_entry(&self, relative_path: &str) -> Option<Entry>;

    /// Read the full contents of a file entry.
    fn read_entry(&self, relative_path: &str) -> Result<Vec<u8>, VfsError>;
}
