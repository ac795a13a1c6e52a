//! A universal-machine virtual CPU.
//!
//! The machine has eight 32-bit registers, a table of independently sized
//! word segments and fourteen instructions. Segment 0 always holds the code
//! being executed.

pub mod error;
pub mod instruction;
pub mod io;
pub mod loader;
pub mod memory;
pub mod registers;
pub mod vm;

pub use error::VmError;
pub use vm::{VirtualMachine, VmConfig};

/// The machine word: registers, segment contents and instructions are all 32 bits.
pub type Word = u32;
