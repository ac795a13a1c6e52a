// src/loader.rs

//! Program images: a headerless sequence of big-endian 32-bit words.

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::VmError;
use crate::Word;

const WORD_BYTES: usize = 4;

/// Splits `bytes` into big-endian words.
///
/// A length that is not a multiple of four is rejected rather than dropping
/// the trailing bytes.
pub fn words_from_bytes(bytes: &[u8]) -> Result<Vec<Word>, VmError> {
    if bytes.len() % WORD_BYTES != 0 {
        return Err(VmError::MalformedProgram { length: bytes.len() });
    }
    let count = bytes.len() / WORD_BYTES;
    let mut words = Vec::new();
    words
        .try_reserve_exact(count)
        .map_err(|_| VmError::AllocationFailed { words: count })?;
    words.extend(
        bytes
            .chunks_exact(WORD_BYTES)
            .map(|chunk| Word::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])),
    );
    Ok(words)
}

/// Serializes words into the program file format.
pub fn words_to_bytes(words: &[Word]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_be_bytes()).collect()
}

/// Reads and decodes a program file.
pub fn load_program<P: AsRef<Path>>(path: P) -> Result<Vec<Word>, VmError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let words = words_from_bytes(&bytes)?;
    debug!("loaded {} words from {}", words.len(), path.display());
    Ok(words)
}
