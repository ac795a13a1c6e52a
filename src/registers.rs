// src/registers.rs

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::Word;

pub const REGISTER_COUNT: usize = 8;

/// A 3-bit register selector. Always in `0..8`, so indexing a
/// [`RegisterFile`] with one cannot go out of bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(u8);

impl Register {
    /// Selects register `idx`. Only the low three bits are kept.
    pub const fn new(idx: u8) -> Self {
        Register(idx & 0b111)
    }

    /// Takes the low three bits of `bits` as a selector.
    #[inline]
    pub const fn from_bits(bits: Word) -> Self {
        Register((bits & 0b111) as u8)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Eight general-purpose 32-bit registers, all starting at zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterFile {
    regs: [Word; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, reg: Register) -> Word {
        self.regs[reg.index()]
    }

    #[inline]
    pub fn set(&mut self, reg: Register, value: Word) {
        self.regs[reg.index()] = value;
    }

    pub fn as_slice(&self) -> &[Word] {
        &self.regs
    }
}

impl Index<Register> for RegisterFile {
    type Output = Word;

    fn index(&self, reg: Register) -> &Self::Output {
        &self.regs[reg.index()]
    }
}

impl IndexMut<Register> for RegisterFile {
    fn index_mut(&mut self, reg: Register) -> &mut Self::Output {
        &mut self.regs[reg.index()]
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.regs.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "r{}={:#010x}", i, value)?;
        }
        Ok(())
    }
}
