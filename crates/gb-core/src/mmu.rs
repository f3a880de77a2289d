//! Memory management unit
//!
//! The Game Boy memory map, as far as this core models it:
//! $0000-$00FF - Boot ROM (while mapped, shadows cartridge bank 0)
//! $0000-$3FFF - Cartridge ROM bank 0
//! $4000-$7FFF - Cartridge ROM bank 1 (fixed)
//! $8000-$9FFF - Video RAM (writes traced, not stored)
//! $FF00-$FF7F - Memory-mapped I/O (writes traced, not stored)
//! $FF80-$FFFE - High RAM
//!
//! Everything else reads as $00 and ignores writes.

use std::fs;
use std::path::Path;

use log::{debug, trace};
use thiserror::Error;

use crate::cartridge::{Cartridge, CartridgeError, MAX_IMAGE_SIZE};
use crate::cpu::Bus as CpuBus;
use crate::types::Address;

/// Boot ROM size in bytes
pub const BOOT_ROM_SIZE: usize = 0x100;

/// Last address shadowed by the boot ROM
pub const BOOT_ROM_END: u16 = 0x00FF;

/// Cartridge ROM window
pub const ROM_START: u16 = 0x0000;
pub const ROM_END: u16 = 0x7FFF;

/// Video RAM window
pub const VRAM_START: u16 = 0x8000;
pub const VRAM_END: u16 = 0x9FFF;

/// Memory-mapped I/O window
pub const IO_START: u16 = 0xFF00;
pub const IO_END: u16 = 0xFF7F;

/// High RAM window
pub const HRAM_START: u16 = 0xFF80;
pub const HRAM_END: u16 = 0xFFFE;

/// High RAM size in bytes
pub const HRAM_SIZE: usize = (HRAM_END - HRAM_START + 1) as usize; // 127

/// The 256-byte program mapped over the cartridge at power-on
#[derive(Debug, Clone)]
pub struct BootRom([u8; BOOT_ROM_SIZE]);

impl BootRom {
    /// Build from raw bytes; shorter images are zero-padded.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MmuError> {
        if bytes.len() > BOOT_ROM_SIZE {
            return Err(MmuError::BootRomTooLarge(bytes.len()));
        }
        let mut data = [0u8; BOOT_ROM_SIZE];
        data[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(data))
    }

    /// Read a boot ROM image from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MmuError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| MmuError::BootRomIo {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn read(&self, offset: u8) -> u8 {
        self.0[offset as usize]
    }
}

/// Which backing store an address resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    BootRom,
    Rom,
    VideoRam,
    Io,
    HighRam,
    Unmapped,
}

/// The emulated address space
#[derive(Debug, Clone)]
pub struct Mmu {
    boot_rom: BootRom,
    /// Cleared once, never re-armed
    boot_rom_mapped: bool,
    cartridge: Cartridge,
    /// Zero-page / quick RAM
    hram: [u8; HRAM_SIZE],
}

impl Mmu {
    /// Create an MMU with the boot ROM mapped and zero-filled cartridge banks
    pub fn new(boot_rom: BootRom) -> Self {
        Self {
            boot_rom,
            boot_rom_mapped: true,
            cartridge: Cartridge::default(),
            hram: [0; HRAM_SIZE],
        }
    }

    /// Create an MMU from a boot ROM file
    pub fn from_boot_rom_file(path: impl AsRef<Path>) -> Result<Self, MmuError> {
        Ok(Self::new(BootRom::open(path)?))
    }

    /// Load a cartridge image from disk into the two fixed ROM banks
    pub fn load_rom(&mut self, path: impl AsRef<Path>) -> Result<(), MmuError> {
        let cartridge = Cartridge::open(path)?;
        self.insert_cartridge(cartridge);
        Ok(())
    }

    /// Load a cartridge image already in memory
    pub fn load_rom_bytes(&mut self, image: &[u8]) -> Result<(), MmuError> {
        let cartridge = Cartridge::from_bytes(image)?;
        self.insert_cartridge(cartridge);
        Ok(())
    }

    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = cartridge;
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    /// Whether the boot ROM currently shadows $0000-$00FF
    pub fn boot_rom_mapped(&self) -> bool {
        self.boot_rom_mapped
    }

    /// Expose cartridge bank 0 at $0000-$00FF for good
    pub fn unmap_boot_rom(&mut self) {
        if self.boot_rom_mapped {
            debug!(target: "mmu", "boot ROM unmapped");
        }
        self.boot_rom_mapped = false;
    }

    /// Resolve an address to the region that backs it
    pub fn region(&self, address: Address) -> Region {
        match address.0 {
            0x0000..=BOOT_ROM_END if self.boot_rom_mapped => Region::BootRom,
            ROM_START..=ROM_END => Region::Rom,
            VRAM_START..=VRAM_END => Region::VideoRam,
            IO_START..=IO_END => Region::Io,
            HRAM_START..=HRAM_END => Region::HighRam,
            _ => Region::Unmapped,
        }
    }

    fn hram_index(address: Address) -> Option<usize> {
        let offset = address.0.checked_sub(HRAM_START)? as usize;
        (offset < HRAM_SIZE).then_some(offset)
    }
}

impl CpuBus for Mmu {
    fn read_byte(&self, address: Address) -> u8 {
        match self.region(address) {
            Region::BootRom => self.boot_rom.read(address.0 as u8),
            Region::Rom => self.cartridge.read(address.0),
            Region::HighRam => Self::hram_index(address)
                .and_then(|i| self.hram.get(i).copied())
                .unwrap_or(0),
            Region::VideoRam | Region::Io | Region::Unmapped => 0x00,
        }
    }

    fn write_byte(&mut self, address: Address, value: u8) {
        match self.region(address) {
            Region::VideoRam => {
                debug!(target: "mmu", "write {:02x} to {} (VRAM)", value, address);
            }
            Region::Io => {
                debug!(target: "mmu", "write {:02x} to {} (I/O)", value, address);
            }
            Region::HighRam => {
                trace!(target: "mmu", "write {:02x} to {} (HRAM)", value, address);
                if let Some(slot) = Self::hram_index(address).and_then(|i| self.hram.get_mut(i)) {
                    *slot = value;
                }
            }
            Region::BootRom | Region::Rom | Region::Unmapped => {
                trace!(target: "mmu", "write {:02x} to {} discarded", value, address);
            }
        }
    }
}

/// MMU error types
#[derive(Debug, Error)]
pub enum MmuError {
    #[error("failed to read boot ROM {path}: {source}")]
    BootRomIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("boot ROM is {0} bytes, expected at most 256")]
    BootRomTooLarge(usize),
    #[error(transparent)]
    Cartridge(#[from] CartridgeError),
}

// Cartridge banks cover exactly the ROM window.
const _: () = assert!(MAX_IMAGE_SIZE == (ROM_END - ROM_START) as usize + 1);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Word;

    fn boot_rom() -> BootRom {
        let mut bytes = [0u8; BOOT_ROM_SIZE];
        bytes[0x00] = 0x31;
        bytes[0x04] = 0x21;
        bytes[0xFF] = 0x50;
        BootRom::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn test_boot_rom_access() {
        let mmu = Mmu::new(boot_rom());
        assert_eq!(mmu.read_byte(Address(0x00)), 0x31);
        assert_eq!(mmu.read_byte(Address(0x04)), 0x21);
        assert_eq!(mmu.read_byte(Address(0xFF)), 0x50);
    }

    #[test]
    fn test_boot_rom_shadows_bank0() {
        let mut mmu = Mmu::new(boot_rom());
        let mut image = vec![0u8; 0x200];
        image[0x00] = 0xC3;
        image[0x100] = 0x00;
        image[0x101] = 0xC3;
        mmu.load_rom_bytes(&image).unwrap();

        assert_eq!(mmu.read_byte(Address(0x0000)), 0x31);
        // Past the shadow the cartridge shows through
        assert_eq!(mmu.read_byte(Address(0x0101)), 0xC3);

        mmu.unmap_boot_rom();
        assert!(!mmu.boot_rom_mapped());
        assert_eq!(mmu.read_byte(Address(0x0000)), 0xC3);
    }

    #[test]
    fn test_boot_rom_too_large() {
        assert!(matches!(
            BootRom::from_bytes(&[0u8; 257]),
            Err(MmuError::BootRomTooLarge(257))
        ));
    }

    #[test]
    fn test_hram_read_write() {
        let mut mmu = Mmu::new(boot_rom());
        mmu.write_byte(Address(0xFF80), 0x12);
        mmu.write_byte(Address(0xFFFE), 0x34);
        assert_eq!(mmu.read_byte(Address(0xFF80)), 0x12);
        assert_eq!(mmu.read_byte(Address(0xFFFE)), 0x34);
        assert_eq!(mmu.read_byte(Address(0xFF81)), 0x00);
    }

    #[test]
    fn test_ie_register_unmapped() {
        let mut mmu = Mmu::new(boot_rom());
        mmu.write_byte(Address(0xFFFF), 0x1F);
        assert_eq!(mmu.read_byte(Address(0xFFFF)), 0x00);
        assert_eq!(mmu.region(Address(0xFFFF)), Region::Unmapped);
    }

    #[test]
    fn test_vram_and_io_writes_not_stored() {
        let mut mmu = Mmu::new(boot_rom());
        mmu.write_byte(Address(0x9FFF), 0xAB);
        mmu.write_byte(Address(0xFF47), 0xFC);
        assert_eq!(mmu.read_byte(Address(0x9FFF)), 0x00);
        assert_eq!(mmu.read_byte(Address(0xFF47)), 0x00);
    }

    #[test]
    fn test_rom_writes_discarded() {
        let mut mmu = Mmu::new(boot_rom());
        mmu.unmap_boot_rom();
        mmu.write_byte(Address(0x2000), 0x01);
        assert_eq!(mmu.read_byte(Address(0x2000)), 0x00);
    }

    #[test]
    fn test_regions() {
        let mut mmu = Mmu::new(boot_rom());
        assert_eq!(mmu.region(Address(0x00FF)), Region::BootRom);
        assert_eq!(mmu.region(Address(0x0100)), Region::Rom);
        assert_eq!(mmu.region(Address(0x7FFF)), Region::Rom);
        assert_eq!(mmu.region(Address(0x8000)), Region::VideoRam);
        assert_eq!(mmu.region(Address(0xA000)), Region::Unmapped);
        assert_eq!(mmu.region(Address(0xC000)), Region::Unmapped);
        assert_eq!(mmu.region(Address(0xFF7F)), Region::Io);
        assert_eq!(mmu.region(Address(0xFF80)), Region::HighRam);
        mmu.unmap_boot_rom();
        assert_eq!(mmu.region(Address(0x0000)), Region::Rom);
    }

    #[test]
    fn test_word_access_asymmetry() {
        let mut mmu = Mmu::new(boot_rom());
        // High byte at the address, low byte just below it
        mmu.write_word(Address(0xFFFD), Word(0xBEEF));
        assert_eq!(mmu.read_byte(Address(0xFFFD)), 0xBE);
        assert_eq!(mmu.read_byte(Address(0xFFFC)), 0xEF);
        // Reading ascends from the lower address
        assert_eq!(mmu.read_word(Address(0xFFFC)), Word(0xBEEF));
    }
}
