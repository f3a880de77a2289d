//! Address and word types
//!
//! The Game Boy has a 16-bit address space. Addresses and data words share the
//! same width but are kept as separate types so that offset arithmetic (which
//! only makes sense on addresses) and byte packing (which only makes sense on
//! words) cannot be mixed up.
//!
//! Byte order: words are stored in memory little-endian (low byte at the lower
//! address). Register pairs use the opposite, high:low order; that conversion
//! lives on [`crate::cpu::Registers`], not in this module.

use std::fmt;

/// A 16-bit location in the emulated address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub u16);

impl Address {
    /// Base of the I/O window, used by the `LDH` / `LD (C),A` shorthands
    pub const IO_BASE: Address = Address(0xFF00);

    /// Add a two's-complement 8-bit offset, wrapping at 16 bits.
    ///
    /// The result lies in `[self - 128, self + 127]` modulo 0x10000. Used by
    /// relative jumps.
    pub fn add_signed_offset(self, offset: u8) -> Address {
        Address(self.0.wrapping_add(offset as i8 as u16))
    }

    /// Add an unsigned 8-bit offset, wrapping at 16 bits
    pub fn add_unsigned_offset(self, offset: u8) -> Address {
        Address(self.0.wrapping_add(offset as u16))
    }

    pub fn wrapping_add(self, rhs: u16) -> Address {
        Address(self.0.wrapping_add(rhs))
    }

    pub fn wrapping_sub(self, rhs: u16) -> Address {
        Address(self.0.wrapping_sub(rhs))
    }

    /// Raw value
    pub fn value(self) -> u16 {
        self.0
    }
}

impl From<u16> for Address {
    fn from(value: u16) -> Self {
        Address(value)
    }
}

impl From<Word> for Address {
    fn from(word: Word) -> Self {
        Address(word.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::UpperHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::UpperHex::fmt(&self.0, f)
    }
}

/// A 16-bit data value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Word(pub u16);

impl Word {
    /// Pack two bytes as they appear in memory: `low` at the lower address.
    pub fn from_bytes(low: u8, high: u8) -> Word {
        Word(u16::from_le_bytes([low, high]))
    }

    /// Unpack into `(high, low)`.
    ///
    /// Note the return order is the reverse of [`Word::from_bytes`]'s
    /// parameter order.
    pub fn to_bytes(self) -> (u8, u8) {
        let [low, high] = self.0.to_le_bytes();
        (high, low)
    }

    /// Raw value
    pub fn value(self) -> u16 {
        self.0
    }
}

impl From<u16> for Word {
    fn from(value: u16) -> Self {
        Word(value)
    }
}

impl From<Address> for Word {
    fn from(address: Address) -> Self {
        Word(address.0)
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_offset() {
        assert_eq!(Address(0x0100).add_signed_offset(0x05), Address(0x0105));
        assert_eq!(Address(0x0100).add_signed_offset(0xFB), Address(0x00FB));
        assert_eq!(Address(0x0100).add_signed_offset(0x80), Address(0x0080));
        assert_eq!(Address(0x0100).add_signed_offset(0x7F), Address(0x017F));
    }

    #[test]
    fn test_signed_offset_wraps() {
        assert_eq!(Address(0x0002).add_signed_offset(0xFC), Address(0xFFFE));
        assert_eq!(Address(0xFFFF).add_signed_offset(0x01), Address(0x0000));
    }

    #[test]
    fn test_unsigned_offset() {
        assert_eq!(Address::IO_BASE.add_unsigned_offset(0x47), Address(0xFF47));
        assert_eq!(Address::IO_BASE.add_unsigned_offset(0xFF), Address(0xFFFF));
        assert_eq!(Address(0xFFF0).add_unsigned_offset(0x20), Address(0x0010));
    }

    #[test]
    fn test_word_byte_order() {
        let word = Word::from_bytes(0xFE, 0xFF);
        assert_eq!(word, Word(0xFFFE));
        assert_eq!(word.to_bytes(), (0xFF, 0xFE));
    }

    #[test]
    fn test_display() {
        assert_eq!(Address(0x3C).to_string(), "0x003c");
        assert_eq!(Word(0xABCD).to_string(), "0xabcd");
        assert_eq!(format!("{:04X}", Address(0xff80)), "FF80");
    }
}
