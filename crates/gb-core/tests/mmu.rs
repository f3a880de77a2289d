//! MMU tests for the Game Boy core

use std::env;
use std::fs;
use std::path::PathBuf;

use gb_core::cartridge::{CartridgeError, MAX_IMAGE_SIZE};
use gb_core::cpu::Bus;
use gb_core::mmu::{BootRom, Mmu, MmuError, BOOT_ROM_SIZE};
use gb_core::types::Address;

/// Write `bytes` to a file unique to this test and return its path
fn scratch_file(name: &str, bytes: &[u8]) -> PathBuf {
    let path = env::temp_dir().join(format!("gb-core-{}-{}", std::process::id(), name));
    fs::write(&path, bytes).unwrap();
    path
}

fn boot_image() -> Vec<u8> {
    let mut image = vec![0u8; BOOT_ROM_SIZE];
    image[0x00] = 0x31;
    image[0x04] = 0x21;
    image[0xFF] = 0x50;
    image
}

#[test]
fn test_boot_rom_from_file() {
    let path = scratch_file("boot.bin", &boot_image());
    let mmu = Mmu::from_boot_rom_file(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert!(mmu.boot_rom_mapped());
    assert_eq!(mmu.read_byte(Address(0x00)), 0x31);
    assert_eq!(mmu.read_byte(Address(0x04)), 0x21);
    assert_eq!(mmu.read_byte(Address(0xFF)), 0x50);
}

#[test]
fn test_missing_boot_rom_is_fatal() {
    let result = Mmu::from_boot_rom_file("/nonexistent/dmg_boot.bin");
    assert!(matches!(result, Err(MmuError::BootRomIo { .. })));
}

#[test]
fn test_load_rom_from_file() {
    let mut image = vec![0u8; MAX_IMAGE_SIZE];
    for (i, byte) in image.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    // ROM only
    image[0x147] = 0x00;
    let path = scratch_file("flat.gb", &image);

    let mut mmu = Mmu::new(BootRom::from_bytes(&boot_image()).unwrap());
    mmu.load_rom(&path).unwrap();
    fs::remove_file(&path).unwrap();

    // Boot ROM still shadows the first page
    assert_eq!(mmu.read_byte(Address(0x0000)), 0x31);
    assert_eq!(mmu.read_byte(Address(0x0100)), (0x0100 % 251) as u8);
    assert_eq!(mmu.read_byte(Address(0x3FFF)), (0x3FFF % 251) as u8);
    assert_eq!(mmu.read_byte(Address(0x4000)), (0x4000 % 251) as u8);
    assert_eq!(mmu.read_byte(Address(0x7FFF)), (0x7FFF % 251) as u8);

    mmu.unmap_boot_rom();
    for address in 0x0000..=0x00FFu16 {
        assert_eq!(mmu.read_byte(Address(address)), (address % 251) as u8);
    }
}

#[test]
fn test_missing_rom_is_fatal() {
    let mut mmu = Mmu::new(BootRom::from_bytes(&[]).unwrap());
    let result = mmu.load_rom("/nonexistent/game.gb");
    assert!(matches!(
        result,
        Err(MmuError::Cartridge(CartridgeError::Io { .. }))
    ));
}

#[test]
fn test_boot_rom_shadow_whole_window() {
    let boot = boot_image();
    let mut mmu = Mmu::new(BootRom::from_bytes(&boot).unwrap());
    // Too short to carry a header
    mmu.load_rom_bytes(&[0xAA; 0x140]).unwrap();

    for address in 0x0000..=0x00FFu16 {
        assert_eq!(mmu.read_byte(Address(address)), boot[address as usize]);
    }
    assert_eq!(mmu.read_byte(Address(0x0100)), 0xAA);

    mmu.unmap_boot_rom();
    for address in 0x0000..=0x00FFu16 {
        assert_eq!(mmu.read_byte(Address(address)), 0xAA);
    }
}

#[test]
fn test_unmapped_regions_read_zero() {
    let mut mmu = Mmu::new(BootRom::from_bytes(&[]).unwrap());
    for address in [0xA000u16, 0xC000, 0xDFFF, 0xE000, 0xFE00, 0xFEA0, 0xFFFF] {
        mmu.write_byte(Address(address), 0x77);
        assert_eq!(mmu.read_byte(Address(address)), 0x00, "address {address:04x}");
    }
}

#[test]
fn test_hram_full_window() {
    let mut mmu = Mmu::new(BootRom::from_bytes(&[]).unwrap());
    for address in 0xFF80..=0xFFFEu16 {
        mmu.write_byte(Address(address), address as u8);
    }
    for address in 0xFF80..=0xFFFEu16 {
        assert_eq!(mmu.read_byte(Address(address)), address as u8);
    }
}

#[test]
fn test_read_word_wraps() {
    let mmu = Mmu::new(BootRom::from_bytes(&[0x34]).unwrap());
    // $FFFF reads zero, $0000 wraps into the boot ROM
    assert_eq!(mmu.read_word(Address(0xFFFF)).0, 0x3400);
}
