// src/io.rs

//! Byte I/O for the IN and OUT instructions.

use std::io::{self, ErrorKind, Read, Write};

use log::debug;

use crate::error::VmError;

/// One-byte blocking input and output.
pub trait IoBridge {
    /// Reads one byte. `Ok(None)` means the input is exhausted or unreadable.
    fn read_byte(&mut self) -> Result<Option<u8>, VmError>;

    fn write_byte(&mut self, byte: u8) -> Result<(), VmError>;
}

/// The process's stdin and stdout, unbuffered.
///
/// Each call is a single `read(2)`/`write(2)` on fd 0 or 1, so interactive
/// programs see their output immediately and never consume input they have
/// not asked for.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawStdio;

impl IoBridge for RawStdio {
    fn read_byte(&mut self) -> Result<Option<u8>, VmError> {
        let mut byte = 0u8;
        loop {
            // SAFETY: `byte` is a valid, writable buffer of exactly one byte.
            let n = unsafe { libc::read(libc::STDIN_FILENO, (&mut byte as *mut u8).cast(), 1) };
            match n {
                1 => return Ok(Some(byte)),
                0 => return Ok(None),
                _ => {
                    let err = io::Error::last_os_error();
                    if err.kind() != ErrorKind::Interrupted {
                        debug!("stdin read failed, treating as end of input: {}", err);
                        return Ok(None);
                    }
                }
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), VmError> {
        loop {
            // SAFETY: `byte` lives on the stack for the duration of the call
            // and the length passed is 1.
            let n = unsafe { libc::write(libc::STDOUT_FILENO, (&byte as *const u8).cast(), 1) };
            match n {
                1 => return Ok(()),
                0 => return Err(io::Error::from(ErrorKind::WriteZero).into()),
                _ => {
                    let err = io::Error::last_os_error();
                    if err.kind() != ErrorKind::Interrupted {
                        return Err(err.into());
                    }
                }
            }
        }
    }
}

/// Adapts any reader/writer pair, e.g. in-memory buffers in tests.
#[derive(Debug)]
pub struct StreamIo<R, W> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> StreamIo<R, W> {
    pub fn new(input: R, output: W) -> Self {
        StreamIo { input, output }
    }

    pub fn output(&self) -> &W {
        &self.output
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}

impl<R: Read, W: Write> IoBridge for StreamIo<R, W> {
    fn read_byte(&mut self) -> Result<Option<u8>, VmError> {
        let mut buf = [0u8; 1];
        loop {
            match self.input.read(&mut buf) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(buf[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("input read failed, treating as end of input: {}", e);
                    return Ok(None);
                }
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<(), VmError> {
        self.output.write_all(&[byte])?;
        self.output.flush()?;
        Ok(())
    }
}
