//! CPU module - Sharp LR35902 (DMG) implementation
//!
//! Fetch, decode and execute. Decoding goes through the tables in
//! [`crate::opcodes`]; every handler only performs its effect and reports
//! whether it transferred control. PC advance and cycle accounting are done
//! once, from the table metadata.

use std::fmt;

use log::{debug, trace};
use thiserror::Error;

use crate::mmu::Mmu;
use crate::opcodes::{
    self, Condition, Indirect, Instruction, InstructionInfo, Operand8, Reg16, Reg8,
    EXTENDED_PREFIX,
};
use crate::types::{Address, Word};

/// Bus trait for memory access
///
/// Word access is asymmetric: `read_word` reads ascending from
/// `address` (low byte first) while `write_word` stores the high byte at
/// `address` and the low byte at `address - 1`. Stack push and pop rely on
/// exactly this pairing.
pub trait Bus {
    /// Read a byte from the given address
    fn read_byte(&self, address: Address) -> u8;
    /// Write a byte to the given address
    fn write_byte(&mut self, address: Address, value: u8);

    /// Read a little-endian word from `address` and `address + 1`
    fn read_word(&self, address: Address) -> Word {
        let low = self.read_byte(address);
        let high = self.read_byte(address.wrapping_add(1));
        Word::from_bytes(low, high)
    }

    /// Write the high byte at `address` and the low byte at `address - 1`
    fn write_word(&mut self, address: Address, value: Word) {
        let (high, low) = value.to_bytes();
        self.write_byte(address, high);
        self.write_byte(address.wrapping_sub(1), low);
    }
}

/// Flags register. Only the top nibble exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flags(u8);

impl Flags {
    pub const ZERO: u8 = 0b1000_0000;
    pub const SUBTRACT: u8 = 0b0100_0000;
    pub const HALF_CARRY: u8 = 0b0010_0000;
    pub const CARRY: u8 = 0b0001_0000;

    pub fn new(bits: u8) -> Self {
        Self(bits & 0xF0)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn zero(&self) -> bool {
        (self.0 & Self::ZERO) != 0
    }

    pub fn subtract(&self) -> bool {
        (self.0 & Self::SUBTRACT) != 0
    }

    pub fn half_carry(&self) -> bool {
        (self.0 & Self::HALF_CARRY) != 0
    }

    pub fn carry(&self) -> bool {
        (self.0 & Self::CARRY) != 0
    }

    fn set(&mut self, mask: u8, val: bool) {
        self.0 = if val { self.0 | mask } else { self.0 & !mask };
    }

    pub fn set_zero(&mut self, val: bool) {
        self.set(Self::ZERO, val);
    }

    pub fn set_subtract(&mut self, val: bool) {
        self.set(Self::SUBTRACT, val);
    }

    pub fn set_half_carry(&mut self, val: bool) {
        self.set(Self::HALF_CARRY, val);
    }

    pub fn set_carry(&mut self, val: bool) {
        self.set(Self::CARRY, val);
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Z:{} N:{} H:{} C:{}",
            self.zero() as u8,
            self.subtract() as u8,
            self.half_carry() as u8,
            self.carry() as u8
        )
    }
}

/// LR35902 register file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Registers {
    pub a: u8, // Accumulator
    pub f: Flags,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub pc: Address, // Program counter
    pub sp: Address, // Stack pointer
}

impl Registers {
    // Pairs are high:low (big-endian), unlike words in memory.

    pub fn bc(&self) -> Word {
        Word(u16::from_be_bytes([self.b, self.c]))
    }

    pub fn set_bc(&mut self, value: Word) {
        [self.b, self.c] = value.0.to_be_bytes();
    }

    pub fn de(&self) -> Word {
        Word(u16::from_be_bytes([self.d, self.e]))
    }

    pub fn set_de(&mut self, value: Word) {
        [self.d, self.e] = value.0.to_be_bytes();
    }

    pub fn hl(&self) -> Word {
        Word(u16::from_be_bytes([self.h, self.l]))
    }

    pub fn set_hl(&mut self, value: Word) {
        [self.h, self.l] = value.0.to_be_bytes();
    }

    pub fn reg(&self, reg: Reg8) -> u8 {
        match reg {
            Reg8::A => self.a,
            Reg8::B => self.b,
            Reg8::C => self.c,
            Reg8::D => self.d,
            Reg8::E => self.e,
            Reg8::H => self.h,
            Reg8::L => self.l,
        }
    }

    pub fn set_reg(&mut self, reg: Reg8, value: u8) {
        match reg {
            Reg8::A => self.a = value,
            Reg8::B => self.b = value,
            Reg8::C => self.c = value,
            Reg8::D => self.d = value,
            Reg8::E => self.e = value,
            Reg8::H => self.h = value,
            Reg8::L => self.l = value,
        }
    }

    pub fn pair(&self, pair: Reg16) -> Word {
        match pair {
            Reg16::BC => self.bc(),
            Reg16::DE => self.de(),
            Reg16::HL => self.hl(),
            Reg16::SP => Word::from(self.sp),
        }
    }

    pub fn set_pair(&mut self, pair: Reg16, value: Word) {
        match pair {
            Reg16::BC => self.set_bc(value),
            Reg16::DE => self.set_de(value),
            Reg16::HL => self.set_hl(value),
            Reg16::SP => self.sp = Address::from(value),
        }
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--------------------------")?;
        writeln!(f, "A: 0x{:02x}      F: 0x{:02x}", self.a, self.f.bits())?;
        writeln!(f, "B: 0x{:02x}      C: 0x{:02x}", self.b, self.c)?;
        writeln!(f, "D: 0x{:02x}      E: 0x{:02x}", self.d, self.e)?;
        writeln!(f, "H: 0x{:02x}      L: 0x{:02x}", self.h, self.l)?;
        writeln!(f)?;
        writeln!(f, "PC: 0x{:04x}", self.pc.value())?;
        write!(f, "SP: 0x{:04x}", self.sp.value())
    }
}

/// CPU error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("unknown opcode 0x{opcode:02x} at {}\n{registers}", .registers.pc)]
    UnknownOpcode { opcode: u8, registers: Registers },
    #[error("unknown extended opcode 0xcb 0x{opcode:02x} at {}\n{registers}", .registers.pc)]
    UnknownExtendedOpcode { opcode: u8, registers: Registers },
}

impl CpuError {
    /// Register state at the time of the failed decode
    pub fn registers(&self) -> &Registers {
        match self {
            CpuError::UnknownOpcode { registers, .. }
            | CpuError::UnknownExtendedOpcode { registers, .. } => registers,
        }
    }
}

/// Where execution continues after a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Fall through to the next instruction
    Next,
    /// Control transferred to the given address
    Jump(Address),
}

/// CPU emulator state
///
/// Owns the register file and borrows the bus for its whole lifetime.
pub struct Cpu<'a, B: Bus = Mmu> {
    registers: Registers,
    /// Clock ticks taken by the most recent instruction
    last_cycles: u64,
    mmu: &'a mut B,
}

impl<'a, B: Bus> Cpu<'a, B> {
    /// Bind a new CPU to a bus and reset it
    pub fn attach_mmu(mmu: &'a mut B) -> Self {
        let mut cpu = Self {
            registers: Registers::default(),
            last_cycles: 0,
            mmu,
        };
        cpu.reset();
        cpu
    }

    /// Zero every register, PC, SP and the cycle counter
    pub fn reset(&mut self) {
        self.registers = Registers::default();
        self.last_cycles = 0;
        debug!(target: "cpu", "reset");
    }

    /// Get CPU registers
    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    /// Clock ticks consumed by the last executed instruction
    pub fn last_cycles(&self) -> u64 {
        self.last_cycles
    }

    pub fn mmu(&self) -> &B {
        &*self.mmu
    }

    pub fn mmu_mut(&mut self) -> &mut B {
        &mut *self.mmu
    }

    /// Read the opcode at PC.
    ///
    /// The second byte is the one following a 0xCB prefix; it is zero for
    /// unprefixed opcodes and must be ignored then.
    pub fn fetch_next_opcode(&self) -> (u8, u8) {
        let pc = self.registers.pc;
        let first = self.mmu.read_byte(pc);
        if first == EXTENDED_PREFIX {
            (first, self.mmu.read_byte(pc.wrapping_add(1)))
        } else {
            (first, 0)
        }
    }

    /// Execute one fetched instruction.
    ///
    /// An opcode missing from the active table leaves all state untouched and
    /// returns the offending byte with a register snapshot.
    pub fn execute(&mut self, first: u8, second: u8) -> Result<(), CpuError> {
        let info = self.decode(first, second)?;
        let pc = self.registers.pc;
        let next_pc = pc.wrapping_add(info.length as u16);

        let flow = self.dispatch(info.instruction, next_pc);

        let (target, taken) = match flow {
            Flow::Next => (next_pc, false),
            Flow::Jump(target) => (target, true),
        };
        self.registers.pc = target;
        self.last_cycles = info.cycles.cost(taken) as u64;

        trace!(target: "cpu", "{} {} ({} cycles)", pc, info.instruction, self.last_cycles);
        Ok(())
    }

    /// Fetch and execute one instruction, returning its cycle cost
    pub fn step(&mut self) -> Result<u64, CpuError> {
        let (first, second) = self.fetch_next_opcode();
        self.execute(first, second)?;
        Ok(self.last_cycles)
    }

    /// Reset, then execute until an instruction fails to decode
    pub fn run(&mut self) -> Result<(), CpuError> {
        self.reset();
        loop {
            self.step()?;
        }
    }

    /// Execute up to `max_steps` instructions from the current state and
    /// return the clock ticks they took
    pub fn run_for(&mut self, max_steps: u64) -> Result<u64, CpuError> {
        let mut cycles = 0u64;
        for _ in 0..max_steps {
            cycles += self.step()?;
        }
        Ok(cycles)
    }

    fn decode(&self, first: u8, second: u8) -> Result<InstructionInfo, CpuError> {
        match opcodes::lookup(first, second) {
            Some(info) => Ok(*info),
            None if first == EXTENDED_PREFIX => Err(CpuError::UnknownExtendedOpcode {
                opcode: second,
                registers: self.registers,
            }),
            None => Err(CpuError::UnknownOpcode {
                opcode: first,
                registers: self.registers,
            }),
        }
    }

    fn dispatch(&mut self, instruction: Instruction, next_pc: Address) -> Flow {
        match instruction {
            Instruction::Nop => {}
            Instruction::LoadImm16(pair) => {
                let value = self.imm16();
                self.registers.set_pair(pair, value);
            }
            Instruction::LoadImm8(dst) => {
                let value = self.imm8();
                self.write_operand(dst, value);
            }
            Instruction::Load(dst, src) => {
                let value = self.read_operand(src);
                self.write_operand(dst, value);
            }
            Instruction::StoreA(at) => {
                let address = self.indirect_address(at);
                self.mmu.write_byte(address, self.registers.a);
            }
            Instruction::LoadA(at) => {
                let address = self.indirect_address(at);
                self.registers.a = self.mmu.read_byte(address);
            }
            Instruction::StoreAAbsolute => {
                let address = Address::from(self.imm16());
                self.mmu.write_byte(address, self.registers.a);
            }
            Instruction::LoadAAbsolute => {
                let address = Address::from(self.imm16());
                self.registers.a = self.mmu.read_byte(address);
            }
            Instruction::StoreAHigh => {
                let address = Address::IO_BASE.add_unsigned_offset(self.imm8());
                self.mmu.write_byte(address, self.registers.a);
            }
            Instruction::LoadAHigh => {
                let address = Address::IO_BASE.add_unsigned_offset(self.imm8());
                self.registers.a = self.mmu.read_byte(address);
            }
            Instruction::StoreAHighC => {
                let address = Address::IO_BASE.add_unsigned_offset(self.registers.c);
                self.mmu.write_byte(address, self.registers.a);
            }
            Instruction::Inc8(operand) => {
                let value = self.read_operand(operand);
                let result = self.inc8(value);
                self.write_operand(operand, result);
            }
            Instruction::Dec8(operand) => {
                let value = self.read_operand(operand);
                let result = self.dec8(value);
                self.write_operand(operand, result);
            }
            Instruction::Inc16(pair) => {
                let value = self.registers.pair(pair);
                self.registers.set_pair(pair, Word(value.value().wrapping_add(1)));
            }
            Instruction::Dec16(pair) => {
                let value = self.registers.pair(pair);
                self.registers.set_pair(pair, Word(value.value().wrapping_sub(1)));
            }
            Instruction::Rla => {
                self.registers.a = self.rotate_left_through_carry(self.registers.a);
            }
            Instruction::Xor(operand) => {
                let value = self.read_operand(operand);
                self.xor(value);
            }
            Instruction::XorImm => {
                let value = self.imm8();
                self.xor(value);
            }
            Instruction::CompareImm => {
                let value = self.imm8();
                self.compare(value);
            }
            Instruction::JumpRelative => {
                return Flow::Jump(next_pc.add_signed_offset(self.imm8()));
            }
            Instruction::JumpRelativeIf(condition) => {
                // Offset is relative to the following instruction
                if self.condition(condition) {
                    return Flow::Jump(next_pc.add_signed_offset(self.imm8()));
                }
            }
            Instruction::Push(pair) => {
                let value = self.registers.pair(pair);
                self.push(value);
            }
            Instruction::Pop(pair) => {
                let value = self.pop();
                self.registers.set_pair(pair, value);
            }
            Instruction::Call => {
                let target = Address::from(self.imm16());
                self.push(Word::from(next_pc));
                return Flow::Jump(target);
            }
            Instruction::Return => {
                let target = Address::from(self.pop());
                return Flow::Jump(target);
            }
            Instruction::RotateLeft(operand) => {
                let value = self.read_operand(operand);
                let result = self.rotate_left_through_carry(value);
                self.write_operand(operand, result);
            }
            Instruction::Bit(bit, operand) => {
                let value = self.read_operand(operand);
                let flags = &mut self.registers.f;
                flags.set_zero(value & (1 << bit) == 0);
                flags.set_subtract(false);
                flags.set_half_carry(true);
            }
        }
        Flow::Next
    }

    // Operand helpers

    fn imm8(&self) -> u8 {
        self.mmu.read_byte(self.registers.pc.wrapping_add(1))
    }

    fn imm16(&self) -> Word {
        self.mmu.read_word(self.registers.pc.wrapping_add(1))
    }

    fn read_operand(&self, operand: Operand8) -> u8 {
        match operand {
            Operand8::Reg(reg) => self.registers.reg(reg),
            Operand8::IndirectHl => self.mmu.read_byte(Address::from(self.registers.hl())),
        }
    }

    fn write_operand(&mut self, operand: Operand8, value: u8) {
        match operand {
            Operand8::Reg(reg) => self.registers.set_reg(reg, value),
            Operand8::IndirectHl => {
                let address = Address::from(self.registers.hl());
                self.mmu.write_byte(address, value);
            }
        }
    }

    /// Address held by a pair; HL+/HL- adjust HL after producing it
    fn indirect_address(&mut self, at: Indirect) -> Address {
        match at {
            Indirect::BC => Address::from(self.registers.bc()),
            Indirect::DE => Address::from(self.registers.de()),
            Indirect::HlIncrement => {
                let hl = self.registers.hl();
                self.registers.set_hl(Word(hl.value().wrapping_add(1)));
                Address::from(hl)
            }
            Indirect::HlDecrement => {
                let hl = self.registers.hl();
                self.registers.set_hl(Word(hl.value().wrapping_sub(1)));
                Address::from(hl)
            }
        }
    }

    fn condition(&self, condition: Condition) -> bool {
        let flags = self.registers.f;
        match condition {
            Condition::NotZero => !flags.zero(),
            Condition::Zero => flags.zero(),
            Condition::NotCarry => !flags.carry(),
            Condition::Carry => flags.carry(),
        }
    }

    // Stack

    fn push(&mut self, value: Word) {
        let sp = self.registers.sp;
        self.mmu.write_word(sp.wrapping_sub(1), value);
        self.registers.sp = sp.wrapping_sub(2);
    }

    fn pop(&mut self) -> Word {
        let sp = self.registers.sp;
        let value = self.mmu.read_word(sp);
        self.registers.sp = sp.wrapping_add(2);
        value
    }

    // ALU

    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        let flags = &mut self.registers.f;
        flags.set_zero(result == 0);
        flags.set_subtract(false);
        flags.set_half_carry((value ^ result ^ 0x01) & 0x10 != 0);
        result
    }

    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        let flags = &mut self.registers.f;
        flags.set_zero(result == 0);
        flags.set_subtract(true);
        flags.set_half_carry((value ^ result ^ 0x01) & 0x10 != 0);
        result
    }

    fn xor(&mut self, value: u8) {
        self.registers.a ^= value;
        let zero = self.registers.a == 0;
        self.registers.f = Flags::new(if zero { Flags::ZERO } else { 0 });
    }

    fn compare(&mut self, value: u8) {
        let a = self.registers.a;
        let flags = &mut self.registers.f;
        flags.set_zero(a == value);
        flags.set_subtract(true);
        flags.set_half_carry((a & 0x0F) < (value & 0x0F));
        flags.set_carry(a < value);
    }

    /// Shared by RLA and CB RL r
    fn rotate_left_through_carry(&mut self, value: u8) -> u8 {
        let result = (value << 1) | self.registers.f.carry() as u8;
        let flags = &mut self.registers.f;
        flags.set_zero(result == 0);
        flags.set_subtract(false);
        flags.set_half_carry(false);
        flags.set_carry(value & 0x80 != 0);
        result
    }
}

impl<B: Bus> fmt::Debug for Cpu<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cpu")
            .field("registers", &self.registers)
            .field("last_cycles", &self.last_cycles)
            .finish_non_exhaustive()
    }
}

impl<B: Bus> fmt::Display for Cpu<'_, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.registers, f)
    }
}
