//! Error types for adaptive entropy encoding and decoding.

use std::collections::TryReserveError;
use std::fmt;

/// Errors that can occur while configuring, encoding or decoding a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid sample width (must be 1-32 bits)
    InvalidBitsPerSample(u32),

    /// Invalid block size (must be 8, 16, 32 or 64 samples)
    InvalidBlockSize(u32),

    /// Invalid reference sample interval (must be 1-4096 blocks)
    InvalidRsi(u32),

    /// Restricted coding requested for a sample width above 4 bits
    RestrictedWidth(u32),

    /// Working buffer allocation failed
    OutOfMemory,

    /// A terminal flush was requested but the stream did not finish flushing
    IncompleteFlush,

    /// Compressed input ended in the middle of a coded data set
    UnexpectedEndOfInput,

    /// Compressed input is not a valid bitstream for this configuration
    InvalidStream(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBitsPerSample(bits) => {
                write!(f, "invalid bits per sample: {bits} (must be 1-32)")
            }
            Self::InvalidBlockSize(size) => {
                write!(f, "invalid block size: {size} (must be 8, 16, 32 or 64)")
            }
            Self::InvalidRsi(rsi) => {
                write!(f, "invalid reference sample interval: {rsi} (must be 1-4096)")
            }
            Self::RestrictedWidth(bits) => {
                write!(
                    f,
                    "restricted coding is only defined for samples of at most 4 bits, got {bits}"
                )
            }
            Self::OutOfMemory => {
                write!(f, "working buffer allocation failed")
            }
            Self::IncompleteFlush => {
                write!(f, "stream was not completely flushed")
            }
            Self::UnexpectedEndOfInput => {
                write!(f, "unexpected end of compressed input")
            }
            Self::InvalidStream(msg) => {
                write!(f, "invalid compressed stream: {msg}")
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}
