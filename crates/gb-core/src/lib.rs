//! GB Core - Pure Rust Game Boy CPU and memory library
//!
//! This crate provides the processing core of the original Game Boy: the
//! LR35902 CPU and the memory management unit that maps boot ROM, cartridge
//! ROM and high RAM into one 16-bit address space. Video, audio and
//! interrupts are not emulated.

#![forbid(unsafe_code)]

/// Address and word value types
pub mod types;
/// Memory management unit
pub mod mmu;
/// Cartridge image loading
pub mod cartridge;
/// Opcode decode tables
pub mod opcodes;
/// CPU: registers, flags and the fetch/decode/execute loop
pub mod cpu;

pub use cartridge::{Cartridge, CartridgeError};
pub use cpu::{Bus, Cpu, CpuError, Flags, Registers};
pub use mmu::{BootRom, Mmu, MmuError};
pub use types::{Address, Word};
