//! Opcode decode tables
//!
//! Two 256-entry tables map an opcode byte to the instruction it encodes plus
//! its fixed metadata (encoded length and clock cost). The normal table is
//! indexed by the first byte; the extended table by the byte following the
//! 0xCB prefix. A `None` entry is an opcode this core does not implement.

use std::fmt;

/// First byte of every extended instruction
pub const EXTENDED_PREFIX: u8 = 0xCB;

/// 8-bit registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg8 {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
}

/// 16-bit register operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reg16 {
    BC,
    DE,
    HL,
    SP,
}

/// 8-bit operand: a register or the byte at (HL)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand8 {
    Reg(Reg8),
    IndirectHl,
}

impl Operand8 {
    /// Decode the 3-bit register field used throughout the opcode map
    const fn from_index(index: u8) -> Self {
        match index & 0x07 {
            0 => Operand8::Reg(Reg8::B),
            1 => Operand8::Reg(Reg8::C),
            2 => Operand8::Reg(Reg8::D),
            3 => Operand8::Reg(Reg8::E),
            4 => Operand8::Reg(Reg8::H),
            5 => Operand8::Reg(Reg8::L),
            6 => Operand8::IndirectHl,
            _ => Operand8::Reg(Reg8::A),
        }
    }

    const fn is_memory(self) -> bool {
        matches!(self, Operand8::IndirectHl)
    }
}

/// Address held in a register pair, with optional HL post-adjust
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indirect {
    BC,
    DE,
    HlIncrement,
    HlDecrement,
}

/// Branch conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
}

/// Decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    /// LD rr,d16
    LoadImm16(Reg16),
    /// LD r,d8
    LoadImm8(Operand8),
    /// LD dst,src
    Load(Operand8, Operand8),
    /// LD (rr),A
    StoreA(Indirect),
    /// LD A,(rr)
    LoadA(Indirect),
    /// LD (a16),A
    StoreAAbsolute,
    /// LD A,(a16)
    LoadAAbsolute,
    /// LDH (a8),A
    StoreAHigh,
    /// LDH A,(a8)
    LoadAHigh,
    /// LD (C),A
    StoreAHighC,
    Inc8(Operand8),
    Dec8(Operand8),
    Inc16(Reg16),
    Dec16(Reg16),
    /// Rotate A left through carry
    Rla,
    Xor(Operand8),
    XorImm,
    CompareImm,
    JumpRelative,
    JumpRelativeIf(Condition),
    Push(Reg16),
    Pop(Reg16),
    Call,
    Return,
    /// CB: rotate left through carry
    RotateLeft(Operand8),
    /// CB: test bit
    Bit(u8, Operand8),
}

/// Clock cost of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycles {
    Fixed(u8),
    /// Branches cost more when taken
    Conditional { taken: u8, not_taken: u8 },
}

impl Cycles {
    pub fn cost(self, taken: bool) -> u8 {
        match self {
            Cycles::Fixed(cycles) => cycles,
            Cycles::Conditional { taken: t, not_taken: n } => {
                if taken {
                    t
                } else {
                    n
                }
            }
        }
    }
}

/// Instruction info
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionInfo {
    pub instruction: Instruction,
    /// Encoded length in bytes, prefix included
    pub length: u8,
    pub cycles: Cycles,
}

const fn info(instruction: Instruction, length: u8, cycles: u8) -> Option<InstructionInfo> {
    Some(InstructionInfo {
        instruction,
        length,
        cycles: Cycles::Fixed(cycles),
    })
}

const fn reg16(opcode: u8) -> Reg16 {
    match (opcode >> 4) & 0x03 {
        0 => Reg16::BC,
        1 => Reg16::DE,
        2 => Reg16::HL,
        _ => Reg16::SP,
    }
}

const fn indirect(opcode: u8) -> Indirect {
    match (opcode >> 4) & 0x03 {
        0 => Indirect::BC,
        1 => Indirect::DE,
        2 => Indirect::HlIncrement,
        _ => Indirect::HlDecrement,
    }
}

const fn condition(opcode: u8) -> Condition {
    match (opcode >> 3) & 0x03 {
        0 => Condition::NotZero,
        1 => Condition::Zero,
        2 => Condition::NotCarry,
        _ => Condition::Carry,
    }
}

/// Cost of a register-only form, or the (HL) form
const fn cost(operand_is_memory: bool, register: u8, memory: u8) -> u8 {
    if operand_is_memory {
        memory
    } else {
        register
    }
}

const fn decode(opcode: u8) -> Option<InstructionInfo> {
    match opcode {
        0x00 => info(Instruction::Nop, 1, 4),
        0x01 | 0x11 | 0x21 | 0x31 => info(Instruction::LoadImm16(reg16(opcode)), 3, 12),
        0x02 | 0x12 | 0x22 | 0x32 => info(Instruction::StoreA(indirect(opcode)), 1, 8),
        0x0A | 0x1A | 0x2A | 0x3A => info(Instruction::LoadA(indirect(opcode)), 1, 8),
        0x03 | 0x13 | 0x23 | 0x33 => info(Instruction::Inc16(reg16(opcode)), 1, 8),
        0x0B | 0x1B | 0x2B | 0x3B => info(Instruction::Dec16(reg16(opcode)), 1, 8),
        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
            let operand = Operand8::from_index(opcode >> 3);
            info(Instruction::Inc8(operand), 1, cost(operand.is_memory(), 4, 12))
        }
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
            let operand = Operand8::from_index(opcode >> 3);
            info(Instruction::Dec8(operand), 1, cost(operand.is_memory(), 4, 12))
        }
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
            let operand = Operand8::from_index(opcode >> 3);
            info(Instruction::LoadImm8(operand), 2, cost(operand.is_memory(), 8, 12))
        }
        0x17 => info(Instruction::Rla, 1, 4),
        0x18 => info(Instruction::JumpRelative, 2, 12),
        0x20 | 0x28 | 0x30 | 0x38 => Some(InstructionInfo {
            instruction: Instruction::JumpRelativeIf(condition(opcode)),
            length: 2,
            cycles: Cycles::Conditional { taken: 12, not_taken: 8 },
        }),
        // HALT needs interrupts
        0x76 => None,
        0x40..=0x7F => {
            let dst = Operand8::from_index(opcode >> 3);
            let src = Operand8::from_index(opcode);
            info(
                Instruction::Load(dst, src),
                1,
                cost(dst.is_memory() || src.is_memory(), 4, 8),
            )
        }
        0xA8..=0xAF => {
            let operand = Operand8::from_index(opcode);
            info(Instruction::Xor(operand), 1, cost(operand.is_memory(), 4, 8))
        }
        0xC1 | 0xD1 | 0xE1 => info(Instruction::Pop(reg16(opcode)), 1, 12),
        0xC5 | 0xD5 | 0xE5 => info(Instruction::Push(reg16(opcode)), 1, 16),
        0xC9 => info(Instruction::Return, 1, 16),
        0xCD => info(Instruction::Call, 3, 12),
        0xE0 => info(Instruction::StoreAHigh, 2, 12),
        0xE2 => info(Instruction::StoreAHighC, 1, 8),
        0xEA => info(Instruction::StoreAAbsolute, 3, 16),
        0xEE => info(Instruction::XorImm, 2, 8),
        0xF0 => info(Instruction::LoadAHigh, 2, 12),
        0xFA => info(Instruction::LoadAAbsolute, 3, 16),
        0xFE => info(Instruction::CompareImm, 2, 8),
        _ => None,
    }
}

const fn decode_extended(opcode: u8) -> Option<InstructionInfo> {
    match opcode {
        0x10..=0x17 => {
            let operand = Operand8::from_index(opcode);
            info(Instruction::RotateLeft(operand), 2, cost(operand.is_memory(), 8, 16))
        }
        0x40..=0x7F => {
            let operand = Operand8::from_index(opcode);
            info(
                Instruction::Bit((opcode >> 3) & 0x07, operand),
                2,
                cost(operand.is_memory(), 8, 12),
            )
        }
        _ => None,
    }
}

const fn build(extended: bool) -> [Option<InstructionInfo>; 256] {
    let mut table = [None; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = if extended {
            decode_extended(i as u8)
        } else {
            decode(i as u8)
        };
        i += 1;
    }
    table
}

/// Normal opcode table
pub static NORMAL: [Option<InstructionInfo>; 256] = build(false);

/// Extended (0xCB-prefixed) opcode table
pub static EXTENDED: [Option<InstructionInfo>; 256] = build(true);

/// Look up the instruction encoded by `first` (and `second` when `first` is
/// the extension prefix).
pub fn lookup(first: u8, second: u8) -> Option<&'static InstructionInfo> {
    if first == EXTENDED_PREFIX {
        EXTENDED[second as usize].as_ref()
    } else {
        NORMAL[first as usize].as_ref()
    }
}

impl fmt::Display for Reg8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg8::A => "A",
            Reg8::B => "B",
            Reg8::C => "C",
            Reg8::D => "D",
            Reg8::E => "E",
            Reg8::H => "H",
            Reg8::L => "L",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Reg16 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reg16::BC => "BC",
            Reg16::DE => "DE",
            Reg16::HL => "HL",
            Reg16::SP => "SP",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Operand8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand8::Reg(reg) => write!(f, "{}", reg),
            Operand8::IndirectHl => f.write_str("(HL)"),
        }
    }
}

impl fmt::Display for Indirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Indirect::BC => "(BC)",
            Indirect::DE => "(DE)",
            Indirect::HlIncrement => "(HL+)",
            Indirect::HlDecrement => "(HL-)",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Condition::NotZero => "NZ",
            Condition::Zero => "Z",
            Condition::NotCarry => "NC",
            Condition::Carry => "C",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Nop => write!(f, "NOP"),
            Instruction::LoadImm16(rr) => write!(f, "LD {},d16", rr),
            Instruction::LoadImm8(dst) => write!(f, "LD {},d8", dst),
            Instruction::Load(dst, src) => write!(f, "LD {},{}", dst, src),
            Instruction::StoreA(at) => write!(f, "LD {},A", at),
            Instruction::LoadA(at) => write!(f, "LD A,{}", at),
            Instruction::StoreAAbsolute => write!(f, "LD (a16),A"),
            Instruction::LoadAAbsolute => write!(f, "LD A,(a16)"),
            Instruction::StoreAHigh => write!(f, "LDH (a8),A"),
            Instruction::LoadAHigh => write!(f, "LDH A,(a8)"),
            Instruction::StoreAHighC => write!(f, "LD (C),A"),
            Instruction::Inc8(op) => write!(f, "INC {}", op),
            Instruction::Dec8(op) => write!(f, "DEC {}", op),
            Instruction::Inc16(rr) => write!(f, "INC {}", rr),
            Instruction::Dec16(rr) => write!(f, "DEC {}", rr),
            Instruction::Rla => write!(f, "RLA"),
            Instruction::Xor(op) => write!(f, "XOR {}", op),
            Instruction::XorImm => write!(f, "XOR d8"),
            Instruction::CompareImm => write!(f, "CP d8"),
            Instruction::JumpRelative => write!(f, "JR r8"),
            Instruction::JumpRelativeIf(cc) => write!(f, "JR {},r8", cc),
            Instruction::Push(rr) => write!(f, "PUSH {}", rr),
            Instruction::Pop(rr) => write!(f, "POP {}", rr),
            Instruction::Call => write!(f, "CALL a16"),
            Instruction::Return => write!(f, "RET"),
            Instruction::RotateLeft(op) => write!(f, "RL {}", op),
            Instruction::Bit(bit, op) => write!(f, "BIT {},{}", bit, op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_sequence_opcodes_present() {
        for opcode in [0x31, 0xAF, 0x21, 0x32, 0x20, 0x0E, 0x3E, 0xE2, 0x0C, 0x77, 0xE0, 0x11, 0x1A, 0xCD, 0x4F, 0x06, 0xC5, 0x17, 0xC1, 0x05, 0x22, 0x23, 0xC9, 0x13, 0x7B, 0xFE] {
            assert!(NORMAL[opcode as usize].is_some(), "missing opcode {:02x}", opcode);
        }
        assert!(EXTENDED[0x7C].is_some());
        assert!(EXTENDED[0x11].is_some());
    }

    #[test]
    fn test_absent_opcodes() {
        assert!(NORMAL[0xFF].is_none());
        assert!(NORMAL[0x76].is_none());
        assert!(NORMAL[EXTENDED_PREFIX as usize].is_none());
        assert!(EXTENDED[0x00].is_none());
    }

    #[test]
    fn test_metadata() {
        let ld_sp = NORMAL[0x31].unwrap();
        assert_eq!(ld_sp.instruction, Instruction::LoadImm16(Reg16::SP));
        assert_eq!(ld_sp.length, 3);
        assert_eq!(ld_sp.cycles, Cycles::Fixed(12));

        let bit = EXTENDED[0x7C].unwrap();
        assert_eq!(bit.instruction, Instruction::Bit(7, Operand8::Reg(Reg8::H)));
        assert_eq!(bit.length, 2);
        assert_eq!(bit.cycles, Cycles::Fixed(8));

        let jr_nz = NORMAL[0x20].unwrap();
        assert_eq!(jr_nz.instruction, Instruction::JumpRelativeIf(Condition::NotZero));
        assert_eq!(jr_nz.cycles.cost(true), 12);
        assert_eq!(jr_nz.cycles.cost(false), 8);
    }

    #[test]
    fn test_register_fields() {
        assert_eq!(
            NORMAL[0x7B].unwrap().instruction,
            Instruction::Load(Operand8::Reg(Reg8::A), Operand8::Reg(Reg8::E))
        );
        assert_eq!(NORMAL[0x77].unwrap().cycles, Cycles::Fixed(8));
        assert_eq!(NORMAL[0x3C].unwrap().instruction, Instruction::Inc8(Operand8::Reg(Reg8::A)));
        assert_eq!(NORMAL[0x34].unwrap().cycles, Cycles::Fixed(12));
        assert_eq!(EXTENDED[0x16].unwrap().cycles, Cycles::Fixed(16));
        assert_eq!(NORMAL[0x32].unwrap().instruction, Instruction::StoreA(Indirect::HlDecrement));
    }

    #[test]
    fn test_mnemonics() {
        assert_eq!(NORMAL[0x32].unwrap().instruction.to_string(), "LD (HL-),A");
        assert_eq!(EXTENDED[0x7C].unwrap().instruction.to_string(), "BIT 7,H");
        assert_eq!(NORMAL[0x20].unwrap().instruction.to_string(), "JR NZ,r8");
    }

    #[test]
    fn test_lookup_uses_prefix() {
        assert_eq!(lookup(0xCB, 0x7C).map(|i| i.length), Some(2));
        assert_eq!(lookup(0x00, 0x7C).map(|i| i.length), Some(1));
        assert!(lookup(0xCB, 0x00).is_none());
    }
}
