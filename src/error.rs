// src/error.rs

use thiserror::Error;

use crate::Word;

/// Everything that can stop the machine other than a HALT instruction.
///
/// None of these are retryable: the engine stops at the first one and hands it
/// back to the caller.
#[derive(Debug, Error)]
pub enum VmError {
    /// A segment ID that is not currently mapped was used.
    #[error("segment {0} is not mapped")]
    InvalidSegment(Word),

    /// An offset at or past the segment's length was used.
    #[error("offset {offset} out of range for segment {segment} (length {length})")]
    SegmentOutOfBounds { segment: Word, offset: Word, length: usize },

    #[error("segment 0 holds the running program and cannot be unmapped")]
    UnmapProgramSegment,

    #[error("division by zero")]
    DivisionByZero,

    /// OUT only accepts values that fit in a byte.
    #[error("output value {0} does not fit in a byte")]
    OutputOutOfRange(Word),

    /// The program counter moved past the end of segment 0.
    #[error("program counter {pc} outside program of {length} words")]
    PcOutOfBounds { pc: Word, length: usize },

    /// The program image is not a whole number of 32-bit words.
    #[error("program length of {length} bytes is not a multiple of 4")]
    MalformedProgram { length: usize },

    /// Every 32-bit segment ID is in use.
    #[error("no segment IDs left")]
    SegmentIdsExhausted,

    #[error("failed to allocate {words} words")]
    AllocationFailed { words: usize },

    #[error("step limit of {0} instructions reached")]
    StepLimitReached(u64),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
