//! Streaming container engine: writer and reader.
//!
//! # Writer
//! [`ContainerWriter`] writes the header up front, then turns every slice it
//! is given into one or more block records of at most `block_size` bytes.
//! Each block is compressed independently and stored raw when compression
//! does not help. [`ContainerWriter::finish`] writes the end marker and the
//! Adler-32 of everything written.
//!
//! # Reader
//! [`ContainerReader`] validates the header, then yields one decoded block
//! per [`ContainerReader::next_block`] call from a single reusable staging
//! buffer. [`ContainerReader::finish`] verifies the trailing checksum when
//! the header's checksum flag is set. With the flag clear the trailing field
//! is left unread, even though every writer emits it.
//!
//! Both sides are plain sequential loops. Checksum updates happen strictly in
//! block order.

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use serde::Serialize;
use std::io::{self, Read, Write};
use tracing::{debug, trace, warn};

use crate::block::{encode_block, parse_record_header, read_full, RecordHeader, RECORD_HEADER_SIZE};
use crate::checksum::RunningChecksum;
use crate::codec::{BlockCodec, Level, Lzo1xCodec};
use crate::error::{ContainerError, Result};
use crate::header::{
    max_compressed_len, Header, DEFAULT_BLOCK_SIZE, HEADER_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE,
};

// ── Options ──────────────────────────────────────────────────────────────────

/// Encoder configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    pub level: Level,
    /// Uncompressed bytes per block.
    pub block_size: u32,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            level: Level::default(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl EncodeOptions {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(ContainerError::InvalidBlockSize(self.block_size));
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            warn!(
                block_size = self.block_size,
                "block size outside {}..={}; decoders will reject this stream",
                MIN_BLOCK_SIZE,
                MAX_BLOCK_SIZE
            );
        }
        Ok(())
    }
}

// ── Stats ────────────────────────────────────────────────────────────────────

/// Per-stream counters collected by both the writer and the reader.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub blocks: u64,
    /// Records whose stored length equals their uncompressed length.
    pub stored_blocks: u64,
    pub original_bytes: u64,
    /// Sum of record payload lengths, excluding framing.
    pub stored_bytes: u64,
    /// Trailing checksum. `None` when a reader skipped it.
    pub checksum: Option<u32>,
}

impl StreamStats {
    /// Payload bytes per original byte; 1.0 for an empty stream.
    pub fn ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            1.0
        } else {
            self.stored_bytes as f64 / self.original_bytes as f64
        }
    }

    /// Total container length implied by these counters.
    pub fn container_bytes(&self) -> u64 {
        let trailer = if self.checksum.is_some() { 4 } else { 0 };
        HEADER_SIZE as u64
            + (self.blocks + 1) * RECORD_HEADER_SIZE as u64
            + self.stored_bytes
            + trailer
    }

    fn record(&mut self, header: RecordHeader) {
        self.blocks += 1;
        self.original_bytes += u64::from(header.uncompressed_len);
        self.stored_bytes += u64::from(header.stored_len);
        if header.is_stored() {
            self.stored_blocks += 1;
        }
    }
}

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ContainerWriter<W: Write, C: BlockCodec = Lzo1xCodec> {
    writer: W,
    codec: C,
    header: Header,
    level: Level,
    checksum: RunningChecksum,
    stats: StreamStats,
}

impl<W: Write> ContainerWriter<W, Lzo1xCodec> {
    pub fn new(writer: W, options: EncodeOptions) -> Result<Self> {
        Self::with_codec(writer, options, Lzo1xCodec::new())
    }
}

impl<W: Write, C: BlockCodec> ContainerWriter<W, C> {
    /// Validate `options` and write the header.
    pub fn with_codec(mut writer: W, options: EncodeOptions, codec: C) -> Result<Self> {
        options.validate()?;
        let header = Header::new(options.level, options.block_size);
        header.write(&mut writer)?;
        debug!(
            codec = codec.name(),
            level = options.level.name(),
            block_size = options.block_size,
            "container header written"
        );
        Ok(Self {
            writer,
            codec,
            header,
            level: options.level,
            checksum: RunningChecksum::new(),
            stats: StreamStats::default(),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Append `data`, split into records of at most `block_size` bytes.
    ///
    /// Empty input writes nothing; a zero-length record would read back as
    /// the end marker.
    pub fn write_block(&mut self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(self.header.block_size as usize) {
            self.write_record(chunk)?;
        }
        Ok(())
    }

    fn write_record(&mut self, chunk: &[u8]) -> Result<()> {
        let index = self.stats.blocks;
        self.checksum.update(chunk);
        let record = encode_block(&mut self.codec, chunk, self.level)
            .map_err(|source| ContainerError::Compress { block: index, source })?;
        let header = record.header();
        record.write(&mut self.writer)?;
        trace!(
            block = index,
            uncompressed = header.uncompressed_len,
            stored = header.stored_len,
            verbatim = record.is_stored(),
            "block written"
        );
        self.stats.record(header);
        Ok(())
    }

    /// Write the end marker and trailing checksum, flush, and hand back the
    /// underlying writer.
    pub fn finish(mut self) -> Result<(W, StreamStats)> {
        RecordHeader::END.write(&mut self.writer)?;
        let sum = self.checksum.finalize();
        self.writer.write_u32::<BigEndian>(sum)?;
        self.writer.flush()?;
        self.stats.checksum = Some(sum);
        debug!(
            blocks = self.stats.blocks,
            stored_blocks = self.stats.stored_blocks,
            original = self.stats.original_bytes,
            stored = self.stats.stored_bytes,
            checksum = format_args!("{sum:08x}"),
            "container finished"
        );
        Ok((self.writer, self.stats))
    }
}

// ── Reader ───────────────────────────────────────────────────────────────────

pub struct ContainerReader<R: Read, C: BlockCodec = Lzo1xCodec> {
    reader: R,
    codec: C,
    header: Header,
    /// Raw record payloads; sized for the worst case of `header.block_size`.
    staging: Vec<u8>,
    /// Most recently decompressed block.
    decoded: Vec<u8>,
    checksum: RunningChecksum,
    stats: StreamStats,
    at_end: bool,
}

impl<R: Read> ContainerReader<R, Lzo1xCodec> {
    pub fn new(reader: R) -> Result<Self> {
        Self::with_codec(reader, Lzo1xCodec::new())
    }
}

impl<R: Read, C: BlockCodec> ContainerReader<R, C> {
    /// Read and validate the header. Nothing past the header is consumed.
    pub fn with_codec(mut reader: R, codec: C) -> Result<Self> {
        let header = Header::read(&mut reader)?;
        debug!(
            flags = header.flags,
            level = header.level,
            block_size = header.block_size,
            "container header read"
        );
        Ok(Self {
            reader,
            codec,
            staging: vec![0u8; max_compressed_len(header.block_size)],
            decoded: Vec::new(),
            header,
            checksum: RunningChecksum::new(),
            stats: StreamStats::default(),
            at_end: false,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Decode the next block. `Ok(None)` once the end marker has been read.
    pub fn next_block(&mut self) -> Result<Option<&[u8]>> {
        if self.at_end {
            return Ok(None);
        }
        let record = self.read_record_header()?;
        if record.is_end() {
            self.at_end = true;
            return Ok(None);
        }

        let index = self.stats.blocks;
        if record.uncompressed_len > self.header.block_size {
            return Err(ContainerError::CorruptData {
                block: index,
                reason: format!(
                    "record claims {} bytes but the stream block size is {}",
                    record.uncompressed_len, self.header.block_size
                ),
            });
        }
        if record.stored_len > record.uncompressed_len {
            return Err(ContainerError::CorruptData {
                block: index,
                reason: format!(
                    "stored length {} exceeds uncompressed length {}",
                    record.stored_len, record.uncompressed_len
                ),
            });
        }

        let stored = record.stored_len as usize;
        let got = read_full(&mut self.reader, &mut self.staging[..stored])?;
        if got != stored {
            return Err(ContainerError::Truncated {
                what: "block payload",
                expected: stored,
                available: got,
            });
        }
        self.stats.record(record);
        trace!(
            block = index,
            uncompressed = record.uncompressed_len,
            stored = record.stored_len,
            "block read"
        );

        if record.is_stored() {
            let raw = &self.staging[..stored];
            self.checksum.update(raw);
            return Ok(Some(raw));
        }

        let expected = record.uncompressed_len as usize;
        let decoded = self
            .codec
            .decompress(&self.staging[..stored], expected)
            .map_err(|e| ContainerError::CorruptData {
                block: index,
                reason: e.to_string(),
            })?;
        if decoded.len() != expected {
            return Err(ContainerError::CorruptData {
                block: index,
                reason: format!("decoded {} bytes, record announced {}", decoded.len(), expected),
            });
        }
        self.decoded = decoded;
        self.checksum.update(&self.decoded);
        Ok(Some(&self.decoded))
    }

    fn read_record_header(&mut self) -> Result<RecordHeader> {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        let got = read_full(&mut self.reader, &mut buf)?;
        if got != buf.len() {
            return Err(ContainerError::Truncated {
                what: "block record header",
                expected: buf.len(),
                available: got,
            });
        }
        Ok(parse_record_header(&buf))
    }

    /// Drain any remaining blocks, then check the trailing checksum if the
    /// header says one is present.
    pub fn finish(mut self) -> Result<(R, StreamStats)> {
        while self.next_block()?.is_some() {}

        if self.header.has_checksum() {
            let mut buf = [0u8; 4];
            let got = read_full(&mut self.reader, &mut buf)?;
            if got != buf.len() {
                return Err(ContainerError::Truncated {
                    what: "checksum",
                    expected: buf.len(),
                    available: got,
                });
            }
            let expected = BigEndian::read_u32(&buf);
            let actual = self.checksum.finalize();
            if expected != actual {
                return Err(ContainerError::Checksum { expected, actual });
            }
            self.stats.checksum = Some(expected);
        } else {
            debug!("checksum flag clear; trailing field not verified");
        }

        debug!(
            blocks = self.stats.blocks,
            stored_blocks = self.stats.stored_blocks,
            original = self.stats.original_bytes,
            "container verified"
        );
        Ok((self.reader, self.stats))
    }
}

// ── One-shot helpers ─────────────────────────────────────────────────────────

/// Encode all of `input` into `output` with the bundled LZO1X codec.
pub fn encode<R: Read, W: Write>(input: R, output: W, level: Level, block_size: u32) -> Result<StreamStats> {
    let options = EncodeOptions { level, block_size };
    encode_with(input, output, options, Lzo1xCodec::new())
}

/// Encode all of `input` into `output` with a caller-supplied codec.
pub fn encode_with<R, W, C>(mut input: R, output: W, options: EncodeOptions, codec: C) -> Result<StreamStats>
where
    R: Read,
    W: Write,
    C: BlockCodec,
{
    let mut writer = ContainerWriter::with_codec(output, options, codec)?;
    let mut buf = vec![0u8; options.block_size as usize];
    loop {
        let n = read_full(&mut input, &mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_block(&buf[..n])?;
    }
    let (_, stats) = writer.finish()?;
    Ok(stats)
}

/// Decode a container from `input`, writing the original bytes to `output`.
pub fn decode<R: Read, W: Write>(input: R, output: W) -> Result<StreamStats> {
    decode_with(input, output, Lzo1xCodec::new())
}

/// Decode with a caller-supplied codec.
pub fn decode_with<R, W, C>(input: R, mut output: W, codec: C) -> Result<StreamStats>
where
    R: Read,
    W: Write,
    C: BlockCodec,
{
    let mut reader = ContainerReader::with_codec(input, codec)?;
    while let Some(block) = reader.next_block()? {
        output.write_all(block)?;
    }
    let (_, stats) = reader.finish()?;
    output.flush()?;
    Ok(stats)
}

// ── Inspection ───────────────────────────────────────────────────────────────

/// Header fields plus verified stream counters.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub flags: u32,
    pub method: u8,
    pub level: u8,
    /// `None` when the level byte is not one this build writes.
    pub level_name: Option<&'static str>,
    pub block_size: u32,
    pub has_checksum: bool,
    pub stats: StreamStats,
    pub container_bytes: u64,
}

/// Fully decode `input` to a sink and report what was found.
pub fn inspect<R: Read>(input: R) -> Result<ContainerInfo> {
    let reader = ContainerReader::new(input)?;
    let header = *reader.header();
    let (_, stats) = reader.finish()?;
    Ok(ContainerInfo {
        flags: header.flags,
        method: header.method,
        level: header.level,
        level_name: Level::from_byte(header.level).map(Level::name),
        block_size: header.block_size,
        has_checksum: header.has_checksum(),
        container_bytes: stats.container_bytes(),
        stats,
    })
}

/// Decode to a sink, returning only the counters.
pub fn verify<R: Read>(input: R) -> Result<StreamStats> {
    decode(input, io::sink())
}
