//! Game disc image device
//!
//! Reads the GDFX file system used on Xbox 360 game discs. The game
//! partition sits at a per-mastering base offset inside the image, with
//! the volume descriptor 32 sectors in. Each directory is a binary tree
//! of entries packed into contiguous sectors.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ox_core::error::VfsError;

use crate::device::Device;
use crate::entry::Entry;

const SECTOR_SIZE: u64 = 2048;
const VOLUME_DESCRIPTOR_SECTOR: u64 = 32;
const VOLUME_MAGIC: &[u8; 20] = b"MICROSOFT*XBOX*MEDIA";

/// Game partition base offsets for the known disc masterings: raw GDF
/// dump, XGD3, XGD2 and XGD1 full-disc dumps.
const PARTITION_OFFSETS: [u64; 4] = [0x0, 0x208_0000, 0xFD9_0000, 0x1_8300_0000];

const ATTRIBUTE_DIRECTORY: u8 = 0x10;

struct DiscEntry {
    relative_lower: String,
    name: String,
    sector: u32,
    size: u32,
    is_directory: bool,
}

/// Device backed by a GDFX disc image
pub struct DiscImageDevice {
    mount_path: String,
    image_path: PathBuf,
    base_offset: u64,
    entries: Vec<DiscEntry>,
}

impl DiscImageDevice {
    pub fn new(mount_path: &str, image_path: &Path) -> Self {
        Self {
            mount_path: mount_path.to_string(),
            image_path: image_path.to_path_buf(),
            base_offset: 0,
            entries: Vec::new(),
        }
    }

    fn read_at(file: &mut File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Probe the known partition offsets for the volume descriptor.
    fn locate_partition(file: &mut File) -> Option<(u64, u32, u32)> {
        for base in PARTITION_OFFSETS {
            let descriptor =
                match Self::read_at(file, base + VOLUME_DESCRIPTOR_SECTOR * SECTOR_SIZE, 2048) {
                    Ok(descriptor) => descriptor,
                    Err(_) => continue,
                };
            if &descriptor[..20] != VOLUME_MAGIC {
                continue;
            }

            let root_sector = u32::from_le_bytes([
                descriptor[20],
                descriptor[21],
                descriptor[22],
                descriptor[23],
            ]);
            let root_size = u32::from_le_bytes([
                descriptor[24],
                descriptor[25],
                descriptor[26],
                descriptor[27],
            ]);
            return Some((base, root_sector, root_size));
        }
        None
    }

    /// Flatten one directory's entry tree into `entries`, recursing into
    /// subdirectories.
    fn parse_directory(
        &mut self,
        file: &mut File,
        sector: u32,
        size: u32,
        prefix: &str,
        depth: u32,
    ) -> std::io::Result<()> {
        if size == 0 || depth > 16 {
            return Ok(());
        }

        let buffer = Self::read_at(
            file,
            self.base_offset + sector as u64 * SECTOR_SIZE,
            size as usize,
        )?;

        let mut pending = vec![0u16];
        let mut visited = HashSet::new();
        let mut subdirs = Vec::new();

        while let Some(word_offset) = pending.pop() {
            if word_offset == 0xFFFF || !visited.insert(word_offset) {
                continue;
            }
            let offset = word_offset as usize * 4;
            if offset + 14 > buffer.len() {
                continue;
            }

            let left = u16::from_le_bytes([buffer[offset], buffer[offset + 1]]);
            let right = u16::from_le_bytes([buffer[offset + 2], buffer[offset + 3]]);
            if left == 0xFFFF {
                // Padding at the end of a sector.
                continue;
            }

            let entry_sector = u32::from_le_bytes([
                buffer[offset + 4],
                buffer[offset + 5],
                buffer[offset + 6],
                buffer[offset + 7],
            ]);
            let entry_size = u32::from_le_bytes([
                buffer[offset + 8],
                buffer[offset + 9],
                buffer[offset + 10],
                buffer[offset + 11],
            ]);
            let attributes = buffer[offset + 12];
            let name_length = buffer[offset + 13] as usize;
            if offset + 14 + name_length > buffer.len() {
                continue;
            }

            let name =
                String::from_utf8_lossy(&buffer[offset + 14..offset + 14 + name_length])
                    .into_owned();
            let relative = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}\\{}", prefix, name)
            };
            let is_directory = attributes & ATTRIBUTE_DIRECTORY != 0;

            if left != 0 {
                pending.push(left);
            }
            if right != 0 && right != 0xFFFF {
                pending.push(right);
            }

            if is_directory {
                subdirs.push((entry_sector, entry_size, relative.clone()));
            }
            self.entries.push(DiscEntry {
                relative_lower: relative.to_ascii_lowercase(),
                name,
                sector: entry_sector,
                size: entry_size,
                is_directory,
            });
        }

        for (dir_sector, dir_size, relative) in subdirs {
            self.parse_directory(file, dir_sector, dir_size, &relative, depth + 1)?;
        }
        Ok(())
    }

    fn find(&self, relative_path: &str) -> Option<&DiscEntry> {
        let wanted = relative_path.replace('/', "\\").to_ascii_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.relative_lower == wanted)
    }
}

impl Device for DiscImageDevice {
    fn mount_path(&self) -> &str {
        &self.mount_path
    }

    fn initialize(&mut self) -> bool {
        let mut file = match File::open(&self.image_path) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!("Unable to open {}: {}", self.image_path.display(), err);
                return false;
            }
        };

        let (base, root_sector, root_size) = match Self::locate_partition(&mut file) {
            Some(found) => found,
            None => {
                tracing::warn!(
                    "No GDFX volume descriptor in {}",
                    self.image_path.display()
                );
                return false;
            }
        };
        self.base_offset = base;

        if let Err(err) = self.parse_directory(&mut file, root_sector, root_size, "", 0) {
            tracing::warn!("Corrupt disc directory: {}", err);
            return false;
        }

        tracing::info!(
            "Disc image at {} (partition offset 0x{:x}, {} entries)",
            self.mount_path,
            self.base_offset,
            self.entries.len()
        );
        true
    }

    fn find_entry(&self, relative_path: &str) -> Option<Entry> {
        self.find(relative_path).map(|entry| Entry {
            name: entry.name.clone(),
            size: entry.size as u64,
            is_directory: entry.is_directory,
        })
    }

    fn read_entry(&self, relative_path: &str) -> Result<Vec<u8>, VfsError> {
        let entry = self
            .find(relative_path)
            .ok_or_else(|| VfsError::NotFound(relative_path.to_string()))?;
        if entry.is_directory {
            return Err(VfsError::ReadFailed {
                path: relative_path.to_string(),
                message: "is a directory".to_string(),
            });
        }

        let offset = self.base_offset + entry.sector as u64 * SECTOR_SIZE;
        let size = entry.size as usize;
        File::open(&self.image_path)
            .and_then(|mut file| Self::read_at(&mut file, offset, size))
            .map_err(|err| VfsError::ReadFailed {
                path: relative_path.to_string(),
                message: err.to_string(),
            })
    }
}
