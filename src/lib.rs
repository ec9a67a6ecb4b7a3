//! Block-oriented LZO container format.
//!
//! A container is a 17-byte header, a sequence of independently compressed
//! block records, an end marker and an Adler-32 of the original bytes:
//!
//! ```
//! use lzpack::{decode, encode, Level};
//!
//! let data = b"hello hello hello hello hello hello".repeat(100);
//! let mut packed = Vec::new();
//! encode(&data[..], &mut packed, Level::Best, 4096)?;
//!
//! let mut unpacked = Vec::new();
//! decode(&packed[..], &mut unpacked)?;
//! assert_eq!(unpacked, data);
//! # Ok::<(), lzpack::ContainerError>(())
//! ```

pub mod block;
pub mod checksum;
pub mod codec;
pub mod error;
pub mod header;
pub mod io_stream;

pub use block::{encode_block, BlockRecord, RecordHeader};
pub use checksum::RunningChecksum;
pub use codec::{BlockCodec, CodecError, Level, Lzo1xCodec};
pub use error::{ContainerError, ErrorKind, Result};
pub use header::{FormatError, Header, DEFAULT_BLOCK_SIZE};
pub use io_stream::{
    decode, decode_with, encode, encode_with, inspect, verify, ContainerInfo, ContainerReader,
    ContainerWriter, EncodeOptions, StreamStats,
};
