//! Cartridge image loading
//!
//! Only flat images without a memory bank controller are supported. The first
//! 32 KiB of the image become two fixed 16 KiB banks:
//! $0000-$3FFF - Bank 0
//! $4000-$7FFF - Bank 1 (fixed, no switching)

use std::fs;
use std::path::Path;

use log::{info, warn};
use thiserror::Error;

/// Size of one ROM bank in bytes
pub const ROM_BANK_SIZE: usize = 0x4000; // 16KB

/// Largest image that can be mapped without bank switching
pub const MAX_IMAGE_SIZE: usize = 2 * ROM_BANK_SIZE;

/// Header location inside bank 0
pub const HEADER_START: usize = 0x0134;
/// First byte past the header
pub const HEADER_END: usize = 0x0150;

const TITLE_RANGE: std::ops::Range<usize> = 0x0134..0x0144;
const CARTRIDGE_TYPE_OFFSET: usize = 0x0147;
const ROM_SIZE_OFFSET: usize = 0x0148;
const HEADER_CHECKSUM_OFFSET: usize = 0x014D;

/// Cartridge hardware declared in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartridgeType {
    /// Plain 32KB ROM
    RomOnly,
    /// ROM plus external RAM
    RomRam,
    /// ROM plus battery-backed external RAM
    RomRamBattery,
}

impl CartridgeType {
    pub fn from_code(code: u8) -> Result<Self, CartridgeError> {
        match code {
            0x00 => Ok(CartridgeType::RomOnly),
            0x08 => Ok(CartridgeType::RomRam),
            0x09 => Ok(CartridgeType::RomRamBattery),
            other => Err(CartridgeError::UnsupportedType(other)),
        }
    }
}

/// Cartridge header at $0134-$014F
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartridgeHeader {
    /// Game title, upper-case ASCII
    pub title: String,
    pub cartridge_type: CartridgeType,
    /// ROM size code; 0 means 32KB
    pub rom_size_code: u8,
    /// Checksum stored in the header
    pub header_checksum: u8,
}

impl CartridgeHeader {
    /// Parse the header from a full image.
    ///
    /// Returns `Ok(None)` when the image is too short to carry one.
    pub fn parse(image: &[u8]) -> Result<Option<Self>, CartridgeError> {
        if image.len() < HEADER_END {
            return Ok(None);
        }

        let title = image[TITLE_RANGE]
            .iter()
            .take_while(|&&b| b != 0)
            .filter(|b| b.is_ascii_graphic() || **b == b' ')
            .map(|&b| b as char)
            .collect::<String>();

        Ok(Some(Self {
            title,
            cartridge_type: CartridgeType::from_code(image[CARTRIDGE_TYPE_OFFSET])?,
            rom_size_code: image[ROM_SIZE_OFFSET],
            header_checksum: image[HEADER_CHECKSUM_OFFSET],
        }))
    }

    /// Compute the checksum the boot ROM verifies over $0134-$014C
    pub fn compute_checksum(image: &[u8]) -> u8 {
        image[HEADER_START..HEADER_CHECKSUM_OFFSET]
            .iter()
            .fold(0u8, |x, &b| x.wrapping_sub(b).wrapping_sub(1))
    }
}

/// A loaded cartridge: two fixed ROM banks
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: Option<CartridgeHeader>,
    bank0: Box<[u8; ROM_BANK_SIZE]>,
    bank1: Box<[u8; ROM_BANK_SIZE]>,
}

impl Cartridge {
    /// Build a cartridge from a raw image.
    ///
    /// Short images are zero-filled; anything past 32KB is dropped.
    pub fn from_bytes(image: &[u8]) -> Result<Self, CartridgeError> {
        let header = CartridgeHeader::parse(image)?;

        if let Some(ref header) = header {
            info!("cartridge \"{}\" ({:?})", header.title, header.cartridge_type);
            let computed = CartridgeHeader::compute_checksum(image);
            if computed != header.header_checksum {
                warn!(
                    "header checksum mismatch: stored {:02x}, computed {:02x}",
                    header.header_checksum, computed
                );
            }
        }

        if image.len() > MAX_IMAGE_SIZE {
            warn!(
                "image is {} bytes, only the first {} are mapped",
                image.len(),
                MAX_IMAGE_SIZE
            );
        }

        let mut bank0 = Box::new([0u8; ROM_BANK_SIZE]);
        let mut bank1 = Box::new([0u8; ROM_BANK_SIZE]);

        let first = &image[..image.len().min(ROM_BANK_SIZE)];
        bank0[..first.len()].copy_from_slice(first);

        if image.len() > ROM_BANK_SIZE {
            let second = &image[ROM_BANK_SIZE..image.len().min(MAX_IMAGE_SIZE)];
            bank1[..second.len()].copy_from_slice(second);
        }

        Ok(Self { header, bank0, bank1 })
    }

    /// Read an image from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CartridgeError> {
        let path = path.as_ref();
        let image = fs::read(path).map_err(|source| CartridgeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&image)
    }

    /// Header, if the image was long enough to carry one
    pub fn header(&self) -> Option<&CartridgeHeader> {
        self.header.as_ref()
    }

    /// Bank mapped at $0000-$3FFF
    pub fn bank0(&self) -> &[u8; ROM_BANK_SIZE] {
        &self.bank0
    }

    /// Bank mapped at $4000-$7FFF
    pub fn bank1(&self) -> &[u8; ROM_BANK_SIZE] {
        &self.bank1
    }

    /// Read by offset into the 32KB ROM area; out-of-range offsets read 0.
    pub fn read(&self, offset: u16) -> u8 {
        let offset = offset as usize;
        if offset < ROM_BANK_SIZE {
            self.bank0[offset]
        } else {
            self.bank1.get(offset - ROM_BANK_SIZE).copied().unwrap_or(0)
        }
    }
}

impl Default for Cartridge {
    fn default() -> Self {
        Self {
            header: None,
            bank0: Box::new([0u8; ROM_BANK_SIZE]),
            bank1: Box::new([0u8; ROM_BANK_SIZE]),
        }
    }
}

/// Cartridge error types
#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("failed to read cartridge image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported cartridge type 0x{0:02x} (memory bank controllers are not supported)")]
    UnsupportedType(u8),
}
