// src/instruction.rs

//! Instruction words and their decoding.
//!
//! Every instruction is one 32-bit word with the opcode in the top four bits.
//! Thirteen of the opcodes name three registers packed in the low nine bits
//! (A in bits 6..9, B in bits 3..6, C in bits 0..3). LOADVAL instead keeps its
//! register in bits 25..28 and a 25-bit immediate in bits 0..25.

use std::fmt;

use crate::registers::Register;
use crate::Word;

const OPCODE_SHIFT: u32 = 28;
const LOADVAL_REG_SHIFT: u32 = 25;

/// Largest immediate LOADVAL can carry.
pub const LOADVAL_MAX: Word = (1 << 25) - 1;

/// The fourteen defined opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Opcode {
    CMov = 0,
    SegLoad = 1,
    SegStore = 2,
    Add = 3,
    Mul = 4,
    Div = 5,
    Nand = 6,
    Halt = 7,
    MapSeg = 8,
    UnmapSeg = 9,
    Out = 10,
    In = 11,
    LoadProg = 12,
    LoadVal = 13,
}

impl TryFrom<Word> for Opcode {
    type Error = Word;

    /// Converts the 4-bit opcode field. Returns the raw value for 14 and 15.
    fn try_from(value: Word) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::CMov), 1 => Ok(Opcode::SegLoad), 2 => Ok(Opcode::SegStore),
            3 => Ok(Opcode::Add), 4 => Ok(Opcode::Mul), 5 => Ok(Opcode::Div),
            6 => Ok(Opcode::Nand), 7 => Ok(Opcode::Halt), 8 => Ok(Opcode::MapSeg),
            9 => Ok(Opcode::UnmapSeg), 10 => Ok(Opcode::Out), 11 => Ok(Opcode::In),
            12 => Ok(Opcode::LoadProg), 13 => Ok(Opcode::LoadVal),
            other => Err(other),
        }
    }
}

/// A decoded instruction with its operand fields.
///
/// Register fields keep the names of the bit slots they came from, so
/// `MapSeg { b, c }` maps a segment of length `r[c]` and writes its ID to `r[b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    CMov { a: Register, b: Register, c: Register },
    SegLoad { a: Register, b: Register, c: Register },
    SegStore { a: Register, b: Register, c: Register },
    Add { a: Register, b: Register, c: Register },
    Mul { a: Register, b: Register, c: Register },
    Div { a: Register, b: Register, c: Register },
    Nand { a: Register, b: Register, c: Register },
    Halt,
    MapSeg { b: Register, c: Register },
    UnmapSeg { c: Register },
    Out { c: Register },
    In { c: Register },
    LoadProg { b: Register, c: Register },
    LoadVal { a: Register, value: Word },
    /// Opcodes 14 and 15. Executing one changes nothing.
    Unknown(Word),
}

impl Instruction {
    /// Decodes one instruction word. Never fails: undefined opcodes become
    /// [`Instruction::Unknown`].
    #[inline]
    pub fn decode(word: Word) -> Instruction {
        let opcode = match Opcode::try_from(word >> OPCODE_SHIFT) {
            Ok(op) => op,
            Err(raw) => return Instruction::Unknown(raw),
        };
        let a = Register::from_bits(word >> 6);
        let b = Register::from_bits(word >> 3);
        let c = Register::from_bits(word);
        match opcode {
            Opcode::CMov => Instruction::CMov { a, b, c },
            Opcode::SegLoad => Instruction::SegLoad { a, b, c },
            Opcode::SegStore => Instruction::SegStore { a, b, c },
            Opcode::Add => Instruction::Add { a, b, c },
            Opcode::Mul => Instruction::Mul { a, b, c },
            Opcode::Div => Instruction::Div { a, b, c },
            Opcode::Nand => Instruction::Nand { a, b, c },
            Opcode::Halt => Instruction::Halt,
            Opcode::MapSeg => Instruction::MapSeg { b, c },
            Opcode::UnmapSeg => Instruction::UnmapSeg { c },
            Opcode::Out => Instruction::Out { c },
            Opcode::In => Instruction::In { c },
            Opcode::LoadProg => Instruction::LoadProg { b, c },
            Opcode::LoadVal => Instruction::LoadVal {
                a: Register::from_bits(word >> LOADVAL_REG_SHIFT),
                value: word & LOADVAL_MAX,
            },
        }
    }

    /// The opcode, or `None` for an undefined one.
    pub fn opcode(&self) -> Option<Opcode> {
        Some(match self {
            Instruction::CMov { .. } => Opcode::CMov,
            Instruction::SegLoad { .. } => Opcode::SegLoad,
            Instruction::SegStore { .. } => Opcode::SegStore,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Mul { .. } => Opcode::Mul,
            Instruction::Div { .. } => Opcode::Div,
            Instruction::Nand { .. } => Opcode::Nand,
            Instruction::Halt => Opcode::Halt,
            Instruction::MapSeg { .. } => Opcode::MapSeg,
            Instruction::UnmapSeg { .. } => Opcode::UnmapSeg,
            Instruction::Out { .. } => Opcode::Out,
            Instruction::In { .. } => Opcode::In,
            Instruction::LoadProg { .. } => Opcode::LoadProg,
            Instruction::LoadVal { .. } => Opcode::LoadVal,
            Instruction::Unknown(_) => return None,
        })
    }

    /// Encodes back into an instruction word. Unused register slots are zero
    /// and LOADVAL immediates are truncated to 25 bits.
    pub fn encode(&self) -> Word {
        let abc = |op: Opcode, a: Register, b: Register, c: Register| {
            ((op as Word) << OPCODE_SHIFT)
                | ((a.index() as Word) << 6)
                | ((b.index() as Word) << 3)
                | c.index() as Word
        };
        let zero = Register::new(0);
        match *self {
            Instruction::CMov { a, b, c } => abc(Opcode::CMov, a, b, c),
            Instruction::SegLoad { a, b, c } => abc(Opcode::SegLoad, a, b, c),
            Instruction::SegStore { a, b, c } => abc(Opcode::SegStore, a, b, c),
            Instruction::Add { a, b, c } => abc(Opcode::Add, a, b, c),
            Instruction::Mul { a, b, c } => abc(Opcode::Mul, a, b, c),
            Instruction::Div { a, b, c } => abc(Opcode::Div, a, b, c),
            Instruction::Nand { a, b, c } => abc(Opcode::Nand, a, b, c),
            Instruction::Halt => abc(Opcode::Halt, zero, zero, zero),
            Instruction::MapSeg { b, c } => abc(Opcode::MapSeg, zero, b, c),
            Instruction::UnmapSeg { c } => abc(Opcode::UnmapSeg, zero, zero, c),
            Instruction::Out { c } => abc(Opcode::Out, zero, zero, c),
            Instruction::In { c } => abc(Opcode::In, zero, zero, c),
            Instruction::LoadProg { b, c } => abc(Opcode::LoadProg, zero, b, c),
            Instruction::LoadVal { a, value } => {
                ((Opcode::LoadVal as Word) << OPCODE_SHIFT)
                    | ((a.index() as Word) << LOADVAL_REG_SHIFT)
                    | (value & LOADVAL_MAX)
            }
            Instruction::Unknown(raw) => raw << OPCODE_SHIFT,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::CMov { a, b, c } => write!(f, "cmov {}, {}, {}", a, b, c),
            Instruction::SegLoad { a, b, c } => write!(f, "segload {}, [{}:{}]", a, b, c),
            Instruction::SegStore { a, b, c } => write!(f, "segstore [{}:{}], {}", a, b, c),
            Instruction::Add { a, b, c } => write!(f, "add {}, {}, {}", a, b, c),
            Instruction::Mul { a, b, c } => write!(f, "mul {}, {}, {}", a, b, c),
            Instruction::Div { a, b, c } => write!(f, "div {}, {}, {}", a, b, c),
            Instruction::Nand { a, b, c } => write!(f, "nand {}, {}, {}", a, b, c),
            Instruction::Halt => write!(f, "halt"),
            Instruction::MapSeg { b, c } => write!(f, "mapseg {}, len {}", b, c),
            Instruction::UnmapSeg { c } => write!(f, "unmapseg {}", c),
            Instruction::Out { c } => write!(f, "out {}", c),
            Instruction::In { c } => write!(f, "in {}", c),
            Instruction::LoadProg { b, c } => write!(f, "loadprog {}, pc {}", b, c),
            Instruction::LoadVal { a, value } => write!(f, "loadval {}, {:#x}", a, value),
            Instruction::Unknown(op) => write!(f, "unknown({})", op),
        }
    }
}
