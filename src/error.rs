//! Error types.
use std::fmt;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Kind of transaction, carried by timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Write => f.write_str("write"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// A reply (or command) was not exactly one frame long.
    #[error("incomplete frame: expected {expected} bytes, got {actual}")]
    FrameLength { expected: usize, actual: usize },
    /// Two adjacent bytes share the same sequence marker; the link slipped.
    #[error("packet sequence error at byte {index} (0x{byte:02x})")]
    Sequence { index: usize, byte: u8 },
    #[error("{operation} timed out after {waited}")]
    Timeout { operation: Operation, waited: String },
    #[error(
        "read data does not match write data at 0x{address:04x}: wrote 0x{written:08x}, read 0x{read:08x}"
    )]
    VerifyMismatch { address: u16, written: u32, read: u32 },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}
