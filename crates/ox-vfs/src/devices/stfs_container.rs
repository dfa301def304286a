//! STFS content package device
//!
//! Reads the secure transacted file system used for downloaded and
//! packaged content (CON / LIVE / PIRS packages). The metadata header
//! carries a volume descriptor pointing at a flat file table; data
//! blocks are 4 KiB with hash blocks interleaved every 0xAA blocks.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use ox_core::error::VfsError;

use crate::device::Device;
use crate::entry::Entry;

const BLOCK_SIZE: u64 = 0x1000;
const BLOCKS_PER_HASH_TABLE: u32 = 0xAA;

const HEADER_SIZE_OFFSET: usize = 0x340;
const CONTENT_TYPE_OFFSET: usize = 0x344;
const VOLUME_DESCRIPTOR_OFFSET: usize = 0x379;
const ENTRY_SIZE: usize = 0x40;

const FLAG_DIRECTORY: u8 = 0x80;
const ROOT_PARENT: u16 = 0xFFFF;

fn u24_le(bytes: &[u8]) -> u32 {
    bytes[0] as u32 | (bytes[1] as u32) << 8 | (bytes[2] as u32) << 16
}

struct StfsEntry {
    relative_lower: String,
    name: String,
    start_block: u32,
    size: u32,
    is_directory: bool,
}

/// Device backed by an STFS content package
pub struct StfsContainerDevice {
    mount_path: String,
    container_path: PathBuf,
    /// File offset data begins at (header rounded up to a block)
    data_base: u64,
    /// 1 when hash tables take two blocks, 0 when one
    table_size_shift: u32,
    entries: Vec<StfsEntry>,
}

impl StfsContainerDevice {
    pub fn new(mount_path: &str, container_path: &Path) -> Self {
        Self {
            mount_path: mount_path.to_string(),
            container_path: container_path.to_path_buf(),
            data_base: 0,
            table_size_shift: 1,
            entries: Vec::new(),
        }
    }

    fn read_at(file: &mut File, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Map a data block number to its file offset, skipping over the
    /// interleaved hash tables.
    fn block_to_offset(&self, block: u32) -> u64 {
        let mut adjusted = block as u64 + (((block / BLOCKS_PER_HASH_TABLE) as u64 + 1) << self.table_size_shift);
        if block >= BLOCKS_PER_HASH_TABLE {
            adjusted += ((block / 0x70E4) as u64 + 1) << self.table_size_shift;
        }
        self.data_base + adjusted * BLOCK_SIZE
    }

    fn parse_file_table(
        &mut self,
        file: &mut File,
        table_block: u32,
        table_block_count: u16,
    ) -> std::io::Result<()> {
        struct RawEntry {
            name: String,
            start_block: u32,
            parent: u16,
            size: u32,
            is_directory: bool,
        }
        let mut raw = Vec::new();

        'blocks: for i in 0..table_block_count as u32 {
            let offset = self.block_to_offset(table_block + i);
            let block = Self::read_at(file, offset, BLOCK_SIZE as usize)?;

            for entry in block.chunks_exact(ENTRY_SIZE) {
                let flags = entry[0x28];
                let name_length = (flags & 0x3F) as usize;
                if name_length == 0 {
                    break 'blocks;
                }

                raw.push(RawEntry {
                    name: String::from_utf8_lossy(&entry[..name_length.min(0x28)]).into_owned(),
                    start_block: u24_le(&entry[0x2F..0x32]),
                    parent: u16::from_le_bytes([entry[0x32], entry[0x33]]),
                    size: u32::from_be_bytes([entry[0x34], entry[0x35], entry[0x36], entry[0x37]]),
                    is_directory: flags & FLAG_DIRECTORY != 0,
                });
            }
        }

        // Second pass: chain parent directories into full guest paths.
        for index in 0..raw.len() {
            let mut parts = vec![raw[index].name.clone()];
            let mut parent = raw[index].parent;
            let mut depth = 0;
            while parent != ROOT_PARENT && depth < 16 {
                let parent_index = parent as usize;
                if parent_index >= raw.len() {
                    break;
                }
                parts.push(raw[parent_index].name.clone());
                parent = raw[parent_index].parent;
                depth += 1;
            }
            parts.reverse();
            let relative = parts.join("\\");

            self.entries.push(StfsEntry {
                relative_lower: relative.to_ascii_lowercase(),
                name: raw[index].name.clone(),
                start_block: raw[index].start_block,
                size: raw[index].size,
                is_directory: raw[index].is_directory,
            });
        }
        Ok(())
    }

    fn find(&self, relative_path: &str) -> Option<&StfsEntry> {
        let wanted = relative_path.replace('/', "\\").to_ascii_lowercase();
        self.entries
            .iter()
            .find(|entry| entry.relative_lower == wanted)
    }
}

impl Device for StfsContainerDevice {
    fn mount_path(&self) -> &str {
        &self.mount_path
    }

    fn initialize(&mut self) -> bool {
        let mut file = match File::open(&self.container_path) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!("Unable to open {}: {}", self.container_path.display(), err);
                return false;
            }
        };

        let header = match Self::read_at(&mut file, 0, 0x1000) {
            Ok(header) => header,
            Err(err) => {
                tracing::warn!("Short container {}: {}", self.container_path.display(), err);
                return false;
            }
        };

        match &header[..4] {
            b"CON " | b"LIVE" | b"PIRS" => {}
            _ => {
                tracing::warn!(
                    "Not an STFS package: {}",
                    self.container_path.display()
                );
                return false;
            }
        }

        let header_size = u32::from_be_bytes([
            header[HEADER_SIZE_OFFSET],
            header[HEADER_SIZE_OFFSET + 1],
            header[HEADER_SIZE_OFFSET + 2],
            header[HEADER_SIZE_OFFSET + 3],
        ]);
        let content_type = u32::from_be_bytes([
            header[CONTENT_TYPE_OFFSET],
            header[CONTENT_TYPE_OFFSET + 1],
            header[CONTENT_TYPE_OFFSET + 2],
            header[CONTENT_TYPE_OFFSET + 3],
        ]);

        let descriptor = &header[VOLUME_DESCRIPTOR_OFFSET..VOLUME_DESCRIPTOR_OFFSET + 0x24];
        if descriptor[0] != 0x24 {
            tracing::warn!("Bad STFS volume descriptor in {}", self.container_path.display());
            return false;
        }
        let file_table_block_count = u16::from_le_bytes([descriptor[3], descriptor[4]]);
        let file_table_block = u24_le(&descriptor[5..8]);

        let rounded = (header_size + 0xFFF) & 0xF000;
        self.data_base = rounded as u64;
        self.table_size_shift = if rounded == 0xB000 { 0 } else { 1 };

        if let Err(err) = self.parse_file_table(&mut file, file_table_block, file_table_block_count)
        {
            tracing::warn!("Corrupt STFS file table: {}", err);
            return false;
        }

        tracing::info!(
            "STFS package at {} (content type 0x{:x}, {} entries)",
            self.mount_path,
            content_type,
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

        // Non-fragmented packages store a file's blocks consecutively.
        let mut remaining = entry.size as usize;
        let mut data = Vec::with_capacity(remaining);
        let mut block = entry.start_block;

        let mut file = File::open(&self.container_path).map_err(|err| VfsError::ReadFailed {
            path: relative_path.to_string(),
            message: err.to_string(),
        })?;

        while remaining > 0 {
            let take = remaining.min(BLOCK_SIZE as usize);
            let chunk = Self::read_at(&mut file, self.block_to_offset(block), take).map_err(
                |err| VfsError::ReadFailed {
                    path: relative_path.to_string(),
                    message: err.to_string(),
                },
            )?;
            data.extend_from_slice(&chunk);
            remaining -= take;
            block += 1;
        }

        Ok(data)
    }
}
