//! Error taxonomy for container encode and decode.
//!
//! Nothing here is retried: every variant aborts the current call.

use std::io;
use thiserror::Error;

use crate::codec::CodecError;
use crate::header::FormatError;

pub type Result<T> = std::result::Result<T, ContainerError>;

#[derive(Error, Debug)]
pub enum ContainerError {
    /// The underlying reader or writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The header is not a valid container header.
    #[error("header error: {0}")]
    Format(#[from] FormatError),

    /// The stream ended before a field or payload it announced.
    #[error("truncated stream: expected {expected} bytes of {what}, got {available}")]
    Truncated {
        what: &'static str,
        expected: usize,
        available: usize,
    },

    /// A single block failed to decode or is structurally impossible.
    #[error("corrupt data in block {block}: {reason}")]
    CorruptData { block: u64, reason: String },

    /// The whole-stream checksum did not match.
    #[error("checksum mismatch: stream says 0x{expected:08x}, data hashes to 0x{actual:08x}")]
    Checksum { expected: u32, actual: u32 },

    /// The codec could not compress a block.
    #[error("failed to compress block {block}: {source}")]
    Compress {
        block: u64,
        #[source]
        source: CodecError,
    },

    /// The encoder was asked for a zero block size.
    #[error("invalid encoder block size {0}")]
    InvalidBlockSize(u32),
}

/// Fieldless view of [`ContainerError`] for callers that only branch on
/// the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    Format,
    Truncated,
    CorruptData,
    Checksum,
    Compress,
    InvalidOptions,
}

impl ContainerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContainerError::Io(_) => ErrorKind::Io,
            ContainerError::Format(_) => ErrorKind::Format,
            ContainerError::Truncated { .. } => ErrorKind::Truncated,
            ContainerError::CorruptData { .. } => ErrorKind::CorruptData,
            ContainerError::Checksum { .. } => ErrorKind::Checksum,
            ContainerError::Compress { .. } => ErrorKind::Compress,
            ContainerError::InvalidBlockSize(_) => ErrorKind::InvalidOptions,
        }
    }
}
