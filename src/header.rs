//! Container header: the fixed 17-byte preamble written once per stream.
//!
//! ```text
//! magic[7] | flags:u32 | method:u8 | level:u8 | block_size:u32
//! ```
//!
//! All multi-byte fields are big-endian.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::block::read_full;
use crate::codec::Level;
use crate::error::{ContainerError, Result};

pub const MAGIC: [u8; 7] = [0x00, 0xE9, 0x4C, 0x5A, 0x4F, 0xFF, 0x1A];

/// Serialized header length in bytes.
pub const HEADER_SIZE: usize = 17;

/// Flags bit 0: a trailing checksum follows the end-of-stream marker.
pub const FLAG_CHECKSUM: u32 = 1;

/// The only defined method: LZO1X block compression.
pub const METHOD_LZO1X: u8 = 1;

/// Smallest block size a decoder accepts.
pub const MIN_BLOCK_SIZE: u32 = 1024;
/// Largest block size a decoder accepts.
pub const MAX_BLOCK_SIZE: u32 = 8 * 1024 * 1024;
/// Block size used when the caller does not choose one.
pub const DEFAULT_BLOCK_SIZE: u32 = 256 * 1024;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("invalid magic signature; not an lzpack container")]
    InvalidMagic,
    #[error("unknown compression method {0}")]
    UnknownMethod(u8),
    #[error("invalid block size {0} (accepted range {}..={})", MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)]
    InvalidBlockSize(u32),
}

/// Worst-case stored size of one block of `block_size` uncompressed bytes.
pub fn max_compressed_len(block_size: u32) -> usize {
    let n = block_size as usize;
    n + n / 16 + 64 + 3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub flags: u32,
    pub method: u8,
    /// Informational only; decoding never looks at it.
    pub level: u8,
    pub block_size: u32,
}

impl Header {
    /// Header as the encoder writes it: checksum enabled, LZO1X method.
    pub fn new(level: Level, block_size: u32) -> Self {
        Self {
            flags: FLAG_CHECKSUM,
            method: METHOD_LZO1X,
            level: level.as_byte(),
            block_size,
        }
    }

    pub fn has_checksum(&self) -> bool {
        self.flags & FLAG_CHECKSUM != 0
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(&MAGIC)?;
        writer.write_u32::<BigEndian>(self.flags)?;
        writer.write_u8(self.method)?;
        writer.write_u8(self.level)?;
        writer.write_u32::<BigEndian>(self.block_size)?;
        Ok(())
    }

    /// Read and validate a header.
    ///
    /// A short or mismatching magic is a format error; a stream that ends
    /// inside the remaining fields is truncated.
    pub fn read<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 7];
        if read_full(&mut reader, &mut magic)? != magic.len() || magic != MAGIC {
            return Err(FormatError::InvalidMagic.into());
        }
        let mut fields = [0u8; HEADER_SIZE - 7];
        let n = read_full(&mut reader, &mut fields)?;
        if n != fields.len() {
            return Err(ContainerError::Truncated {
                what: "header",
                expected: fields.len(),
                available: n,
            });
        }
        let header = Self {
            flags: BigEndian::read_u32(&fields[0..4]),
            method: fields[4],
            level: fields[5],
            block_size: BigEndian::read_u32(&fields[6..10]),
        };
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> std::result::Result<(), FormatError> {
        if self.method != METHOD_LZO1X {
            return Err(FormatError::UnknownMethod(self.method));
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(FormatError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }
}
