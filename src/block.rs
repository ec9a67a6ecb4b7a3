//! Block records.
//!
//! ```text
//! uncompressed_len:u32 | stored_len:u32 | payload[stored_len]
//! ```
//!
//! There is no flag byte. A record whose stored length equals its
//! uncompressed length carries the raw bytes; anything shorter is codec
//! output. A record with uncompressed length 0 ends the block sequence.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::codec::{BlockCodec, CodecError, Level};

/// Serialized length of the two length fields preceding every payload.
pub const RECORD_HEADER_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub uncompressed_len: u32,
    pub stored_len: u32,
}

impl RecordHeader {
    pub const END: RecordHeader = RecordHeader { uncompressed_len: 0, stored_len: 0 };

    pub fn is_end(&self) -> bool {
        self.uncompressed_len == 0
    }

    pub fn is_stored(&self) -> bool {
        self.stored_len == self.uncompressed_len
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<BigEndian>(self.uncompressed_len)?;
        writer.write_u32::<BigEndian>(self.stored_len)?;
        Ok(())
    }
}

/// One encoded block, borrowed from the caller's input when stored.
#[derive(Debug, PartialEq, Eq)]
pub enum BlockRecord<'a> {
    /// Compression did not help; payload is the original bytes.
    Stored(&'a [u8]),
    /// Codec output for `original_len` bytes of input.
    Compressed { payload: Vec<u8>, original_len: u32 },
}

impl BlockRecord<'_> {
    pub fn header(&self) -> RecordHeader {
        match self {
            BlockRecord::Stored(raw) => RecordHeader {
                uncompressed_len: raw.len() as u32,
                stored_len: raw.len() as u32,
            },
            BlockRecord::Compressed { payload, original_len } => RecordHeader {
                uncompressed_len: *original_len,
                stored_len: payload.len() as u32,
            },
        }
    }

    pub fn payload(&self) -> &[u8] {
        match self {
            BlockRecord::Stored(raw) => raw,
            BlockRecord::Compressed { payload, .. } => payload,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, BlockRecord::Stored(_))
    }

    /// Write the record header followed by its payload.
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        self.header().write(&mut writer)?;
        writer.write_all(self.payload())
    }
}

/// Compress `data`, falling back to raw storage only when the codec output is
/// strictly larger than the input. Equal sizes keep the codec output.
pub fn encode_block<'a, C: BlockCodec>(
    codec: &mut C,
    data: &'a [u8],
    level: Level,
) -> Result<BlockRecord<'a>, CodecError> {
    let compressed = codec.compress(data, level)?;
    if compressed.len() > data.len() {
        Ok(BlockRecord::Stored(data))
    } else {
        Ok(BlockRecord::Compressed {
            payload: compressed,
            original_len: data.len() as u32,
        })
    }
}

/// Read until `buf` is full or the reader reports end of input.
///
/// Returns the number of bytes read; anything short of `buf.len()` means the
/// stream ended early. `Interrupted` is retried.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Decode the two length fields of a record header from their wire bytes.
pub(crate) fn parse_record_header(bytes: &[u8; RECORD_HEADER_SIZE]) -> RecordHeader {
    RecordHeader {
        uncompressed_len: BigEndian::read_u32(&bytes[0..4]),
        stored_len: BigEndian::read_u32(&bytes[4..8]),
    }
}
