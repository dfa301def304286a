//! XEX2 container parsing and basefile decryption
//!
//! The container is a big-endian header, a directory of optional
//! headers keyed by ID, a security info block, and the basefile
//! itself. Retail basefiles are AES-128-CBC encrypted with a per-title
//! key that is itself encrypted with a fixed console key.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockDecryptMut, KeyInit, KeyIvInit};
use aes::Aes128;
use ox_core::error::LoaderError;
use tracing::debug;

type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Key retail consoles wrap the per-title file key with.
pub const RETAIL_KEY: [u8; 16] = [
    0x20, 0xB1, 0x85, 0xA5, 0x9D, 0x28, 0xFD, 0xC3, 0x40, 0x58, 0x3F, 0xBB, 0x08, 0x96, 0xBF,
    0x91,
];

/// Devkit images wrap the file key with zeroes.
pub const DEVKIT_KEY: [u8; 16] = [0u8; 16];

const XEX2_MAGIC: &[u8; 4] = b"XEX2";

// Optional header IDs. The low byte encodes how the value field is
// used: 0x00/0x01 mean the value itself is the datum, 0xFF means the
// value is an offset to a length-prefixed block, anything else is an
// offset to a block of (low byte * 4) bytes.
const HEADER_ENTRY_POINT: u32 = 0x0001_0100;
const HEADER_IMAGE_BASE: u32 = 0x0001_0201;
const HEADER_FILE_FORMAT_INFO: u32 = 0x0000_03FF;
const HEADER_EXECUTION_INFO: u32 = 0x0004_0006;

const SECURITY_IMAGE_SIZE: usize = 0x4;
const SECURITY_LOAD_ADDRESS: usize = 0x110;
const SECURITY_FILE_KEY: usize = 0x150;
const SECURITY_INFO_LEN: usize = 0x160;

const ENCRYPTION_NONE: u16 = 0;
const COMPRESSION_NONE: u16 = 0;

fn be16(data: &[u8], offset: usize) -> Result<u16, LoaderError> {
    let bytes = data
        .get(offset..offset + 2)
        .ok_or_else(|| LoaderError::InvalidXex(format!("truncated at 0x{:x}", offset)))?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn be32(data: &[u8], offset: usize) -> Result<u32, LoaderError> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or_else(|| LoaderError::InvalidXex(format!("truncated at 0x{:x}", offset)))?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Title identification from the execution-info optional header.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionInfo {
    pub media_id: u32,
    pub version: u32,
    pub base_version: u32,
    pub title_id: u32,
    pub platform: u8,
    pub executable_type: u8,
    pub disc_number: u8,
    pub disc_count: u8,
}

/// A parsed XEX2 image
pub struct XexImage {
    data: Vec<u8>,
    module_flags: u32,
    exe_offset: u32,
    entry_point: u32,
    image_base: u32,
    image_size: u32,
    encryption_type: u16,
    file_key: [u8; 16],
    execution_info: Option<ExecutionInfo>,
}

impl XexImage {
    /// Parse an XEX2 container. Compressed basefiles are not supported.
    pub fn parse(data: &[u8]) -> Result<Self, LoaderError> {
        if data.len() < 0x18 {
            return Err(LoaderError::InvalidXex("file shorter than header".into()));
        }
        if &data[..4] != XEX2_MAGIC {
            return Err(LoaderError::InvalidXex("bad magic".into()));
        }

        let module_flags = be32(data, 0x4)?;
        let exe_offset = be32(data, 0x8)?;
        let security_info_offset = be32(data, 0x10)? as usize;
        let header_count = be32(data, 0x14)? as usize;
        if header_count > 0x400 {
            return Err(LoaderError::InvalidXex(format!(
                "implausible header count {}",
                header_count
            )));
        }

        let mut entry_point = 0u32;
        let mut image_base = 0u32;
        let mut encryption_type = ENCRYPTION_NONE;
        let mut compression_type = COMPRESSION_NONE;
        let mut execution_info = None;

        for index in 0..header_count {
            let at = 0x18 + index * 8;
            let key = be32(data, at)?;
            let value = be32(data, at + 4)?;

            match key {
                HEADER_ENTRY_POINT => entry_point = value,
                HEADER_IMAGE_BASE => image_base = value,
                HEADER_FILE_FORMAT_INFO => {
                    let info = value as usize;
                    // Length-prefixed block: u32 size, u16 encryption,
                    // u16 compression.
                    let info_size = be32(data, info)?;
                    if info_size < 8 {
                        return Err(LoaderError::InvalidXex("short file format info".into()));
                    }
                    encryption_type = be16(data, info + 4)?;
                    compression_type = be16(data, info + 6)?;
                }
                HEADER_EXECUTION_INFO => {
                    let info = value as usize;
                    let tail = data.get(info + 16..info + 20).ok_or_else(|| {
                        LoaderError::InvalidXex("truncated execution info".into())
                    })?;
                    execution_info = Some(ExecutionInfo {
                        media_id: be32(data, info)?,
                        version: be32(data, info + 4)?,
                        base_version: be32(data, info + 8)?,
                        title_id: be32(data, info + 12)?,
                        platform: tail[0],
                        executable_type: tail[1],
                        disc_number: tail[2],
                        disc_count: tail[3],
                    });
                }
                _ => {}
            }
        }

        let security = data
            .get(security_info_offset..security_info_offset + SECURITY_INFO_LEN)
            .ok_or_else(|| LoaderError::InvalidXex("security info out of range".into()))?;
        let image_size = u32::from_be_bytes([
            security[SECURITY_IMAGE_SIZE],
            security[SECURITY_IMAGE_SIZE + 1],
            security[SECURITY_IMAGE_SIZE + 2],
            security[SECURITY_IMAGE_SIZE + 3],
        ]);
        let load_address = u32::from_be_bytes([
            security[SECURITY_LOAD_ADDRESS],
            security[SECURITY_LOAD_ADDRESS + 1],
            security[SECURITY_LOAD_ADDRESS + 2],
            security[SECURITY_LOAD_ADDRESS + 3],
        ]);
        let mut file_key = [0u8; 16];
        file_key.copy_from_slice(&security[SECURITY_FILE_KEY..SECURITY_FILE_KEY + 16]);

        if image_base == 0 {
            image_base = load_address;
        }

        if (exe_offset as usize) > data.len() {
            return Err(LoaderError::InvalidXex("basefile offset out of range".into()));
        }
        if compression_type != COMPRESSION_NONE {
            return Err(LoaderError::UnsupportedCompression);
        }

        debug!(
            "XEX2 parsed: entry 0x{:08x}, base 0x{:08x}, image 0x{:x} bytes, encrypted: {}",
            entry_point,
            image_base,
            image_size,
            encryption_type != ENCRYPTION_NONE
        );

        Ok(Self {
            data: data.to_vec(),
            module_flags,
            exe_offset,
            entry_point,
            image_base,
            image_size,
            encryption_type,
            file_key,
            execution_info,
        })
    }

    pub fn module_flags(&self) -> u32 {
        self.module_flags
    }

    pub fn entry_point(&self) -> u32 {
        self.entry_point
    }

    pub fn image_base(&self) -> u32 {
        self.image_base
    }

    pub fn image_size(&self) -> u32 {
        self.image_size
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_type != ENCRYPTION_NONE
    }

    pub fn execution_info(&self) -> Option<&ExecutionInfo> {
        self.execution_info.as_ref()
    }

    /// The raw basefile bytes as stored in the container.
    pub fn basefile(&self) -> &[u8] {
        &self.data[self.exe_offset as usize..]
    }

    /// Recover the plaintext basefile. `key` is the console key the
    /// per-title file key was wrapped with (`RETAIL_KEY` or
    /// `DEVKIT_KEY`).
    pub fn decrypt_basefile(&self, key: &[u8; 16]) -> Result<Vec<u8>, LoaderError> {
        let basefile = self.basefile();
        if !self.is_encrypted() {
            return Ok(basefile.to_vec());
        }
        if basefile.len() % 16 != 0 {
            return Err(LoaderError::DecryptionFailed(
                "basefile is not block aligned".into(),
            ));
        }

        // Unwrap the session key with the console key, then run the
        // basefile through CBC with a zero IV.
        let console_cipher = Aes128::new(GenericArray::from_slice(key));
        let mut session_key = GenericArray::clone_from_slice(&self.file_key);
        console_cipher.decrypt_block(&mut session_key);

        let zero_iv = [0u8; 16];
        let mut decryptor = Aes128CbcDec::new(&session_key, GenericArray::from_slice(&zero_iv));

        let mut plaintext = basefile.to_vec();
        for chunk in plaintext.chunks_exact_mut(16) {
            decryptor.decrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::{BlockEncrypt, BlockEncryptMut};

    type Aes128CbcEnc = cbc::Encryptor<Aes128>;

    const SECURITY_OFFSET: usize = 0x50;
    const FORMAT_INFO_OFFSET: usize = 0x40;
    const EXE_OFFSET: usize = 0x1C0;

    fn build_xex(
        encryption: u16,
        compression: u16,
        file_key: [u8; 16],
        basefile: &[u8],
    ) -> Vec<u8> {
        let mut data = vec![0u8; EXE_OFFSET + basefile.len()];
        data[..4].copy_from_slice(b"XEX2");
        data[0x8..0xC].copy_from_slice(&(EXE_OFFSET as u32).to_be_bytes());
        data[0x10..0x14].copy_from_slice(&(SECURITY_OFFSET as u32).to_be_bytes());
        data[0x14..0x18].copy_from_slice(&3u32.to_be_bytes());

        // Optional headers: entry point, image base, file format info.
        data[0x18..0x1C].copy_from_slice(&HEADER_ENTRY_POINT.to_be_bytes());
        data[0x1C..0x20].copy_from_slice(&0x8200_1000u32.to_be_bytes());
        data[0x20..0x24].copy_from_slice(&HEADER_IMAGE_BASE.to_be_bytes());
        data[0x24..0x28].copy_from_slice(&0x8200_0000u32.to_be_bytes());
        data[0x28..0x2C].copy_from_slice(&HEADER_FILE_FORMAT_INFO.to_be_bytes());
        data[0x2C..0x30].copy_from_slice(&(FORMAT_INFO_OFFSET as u32).to_be_bytes());

        data[FORMAT_INFO_OFFSET..FORMAT_INFO_OFFSET + 4].copy_from_slice(&8u32.to_be_bytes());
        data[FORMAT_INFO_OFFSET + 4..FORMAT_INFO_OFFSET + 6]
            .copy_from_slice(&encryption.to_be_bytes());
        data[FORMAT_INFO_OFFSET + 6..FORMAT_INFO_OFFSET + 8]
            .copy_from_slice(&compression.to_be_bytes());

        let security = SECURITY_OFFSET;
        data[security + SECURITY_IMAGE_SIZE..security + SECURITY_IMAGE_SIZE + 4]
            .copy_from_slice(&0x1000u32.to_be_bytes());
        data[security + SECURITY_LOAD_ADDRESS..security + SECURITY_LOAD_ADDRESS + 4]
            .copy_from_slice(&0x8400_0000u32.to_be_bytes());
        data[security + SECURITY_FILE_KEY..security + SECURITY_FILE_KEY + 16]
            .copy_from_slice(&file_key);

        data[EXE_OFFSET..].copy_from_slice(basefile);
        data
    }

    #[test]
    fn test_parse_fields() {
        let xex = XexImage::parse(&build_xex(0, 0, [0; 16], b"plain basefile00")).unwrap();
        assert_eq!(xex.entry_point(), 0x8200_1000);
        assert_eq!(xex.image_base(), 0x8200_0000);
        assert_eq!(xex.image_size(), 0x1000);
        assert!(!xex.is_encrypted());
        assert_eq!(xex.basefile(), b"plain basefile00");
    }

    #[test]
    fn test_image_base_falls_back_to_security_info() {
        // Drop the image-base optional header; the security info load
        // address takes over.
        let mut data = build_xex(0, 0, [0; 16], b"plain basefile00");
        data[0x20..0x24].copy_from_slice(&0u32.to_be_bytes());
        data[0x24..0x28].copy_from_slice(&0u32.to_be_bytes());

        let xex = XexImage::parse(&data).unwrap();
        assert_eq!(xex.image_base(), 0x8400_0000);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut data = build_xex(0, 0, [0; 16], b"plain basefile00");
        data[..4].copy_from_slice(b"XEX1");
        assert!(matches!(
            XexImage::parse(&data),
            Err(LoaderError::InvalidXex(_))
        ));
    }

    #[test]
    fn test_truncated_rejected() {
        assert!(matches!(
            XexImage::parse(b"XEX2\x00\x00"),
            Err(LoaderError::InvalidXex(_))
        ));
    }

    #[test]
    fn test_compressed_rejected() {
        assert!(matches!(
            XexImage::parse(&build_xex(0, 2, [0; 16], b"plain basefile00")),
            Err(LoaderError::UnsupportedCompression)
        ));
    }

    #[test]
    fn test_decrypt_basefile() {
        let session_key = [0x11u8; 16];
        let zero_iv = [0u8; 16];
        let plaintext = b"0123456789abcdefFEDCBA9876543210".to_vec();

        // Wrap the session key the way the packager does.
        let mut wrapped_block = GenericArray::clone_from_slice(&session_key);
        Aes128::new(GenericArray::from_slice(&RETAIL_KEY)).encrypt_block(&mut wrapped_block);
        let mut wrapped = [0u8; 16];
        wrapped.copy_from_slice(&wrapped_block);

        let mut ciphertext = plaintext.clone();
        let mut encryptor = Aes128CbcEnc::new(
            GenericArray::from_slice(&session_key),
            GenericArray::from_slice(&zero_iv),
        );
        for chunk in ciphertext.chunks_exact_mut(16) {
            encryptor.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
        }

        let xex = XexImage::parse(&build_xex(1, 0, wrapped, &ciphertext)).unwrap();
        assert!(xex.is_encrypted());
        assert_eq!(xex.decrypt_basefile(&RETAIL_KEY).unwrap(), plaintext);
    }

    #[test]
    fn test_decrypt_rejects_unaligned() {
        let xex = XexImage::parse(&build_xex(1, 0, [0; 16], b"short")).unwrap();
        assert!(matches!(
            xex.decrypt_basefile(&RETAIL_KEY),
            Err(LoaderError::DecryptionFailed(_))
        ));
    }
}
