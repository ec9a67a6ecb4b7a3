//! Block codec seam.
//!
//! The container never looks inside a compressed block. It hands whole
//! blocks to a [`BlockCodec`] and only inspects the sizes that come back:
//! a compressed block larger than its input is discarded and the raw bytes
//! are stored instead.
//!
//! The bundled [`Lzo1xCodec`] compresses [`Level::Fastest`] with miniLZO's
//! LZO1X-1 and [`Level::Best`] with the hash-chain encoder in [`lzo1x`].
//! Both produce plain LZO1X streams, and both decode through
//! [`lzo1x::decompress`].

pub mod lzo1x;

use lzo1x::LzoError;
use minilzo_rs::LZO;
use serde::Serialize;
use thiserror::Error;

// ── Level ────────────────────────────────────────────────────────────────────

/// Speed/ratio variant requested from the codec.
///
/// The level is recorded in the header as a hint and is never consulted on
/// decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Fastest,
    #[default]
    Best,
}

impl Level {
    /// Header byte for this level.
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Level::Fastest => 1,
            Level::Best => 9,
        }
    }

    /// Map a header level byte back to a level, if it is one this build writes.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Level::Fastest),
            9 => Some(Level::Best),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Level::Fastest => "fastest",
            Level::Best => "best",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fastest" | "fast" | "1" => Some(Level::Fastest),
            "best" | "9" => Some(Level::Best),
            _ => None,
        }
    }
}

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compression(String),
    #[error("decompression failed: {0}")]
    Decompression(String),
}

// ── Codec trait ──────────────────────────────────────────────────────────────

/// A compress/decompress transform applied to one block at a time.
///
/// Implementations may keep scratch state between calls (hence `&mut self`)
/// but must not carry data from one block into the next: every block has to
/// decode on its own.
pub trait BlockCodec {
    fn name(&self) -> &'static str;

    /// Compress one block. The result may be larger than the input.
    fn compress(&mut self, block: &[u8], level: Level) -> Result<Vec<u8>, CodecError>;

    /// Reconstruct a block that was `expected_len` bytes before compression.
    ///
    /// Must fail rather than write past `expected_len` bytes. A shorter result
    /// is treated as corruption by the caller.
    fn decompress(&mut self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError>;
}

impl<C: BlockCodec + ?Sized> BlockCodec for &mut C {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn compress(&mut self, block: &[u8], level: Level) -> Result<Vec<u8>, CodecError> {
        (**self).compress(block, level)
    }
    fn decompress(&mut self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        (**self).decompress(data, expected_len)
    }
}

impl<C: BlockCodec + ?Sized> BlockCodec for Box<C> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn compress(&mut self, block: &[u8], level: Level) -> Result<Vec<u8>, CodecError> {
        (**self).compress(block, level)
    }
    fn decompress(&mut self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        (**self).decompress(data, expected_len)
    }
}

// ── LZO1X ────────────────────────────────────────────────────────────────────

impl From<LzoError> for CodecError {
    fn from(e: LzoError) -> Self {
        CodecError::Decompression(e.to_string())
    }
}

/// LZO1X block codec.
///
/// Output from either level is a standard LZO1X stream that any LZO1X
/// decoder reads. Decoding fails unless a block expands to exactly the
/// announced length.
#[derive(Default)]
pub struct Lzo1xCodec {
    // miniLZO work memory is 128 KiB; boxed so the codec stays cheap to move.
    fast: Option<Box<LZO>>,
}

impl Lzo1xCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn fast_context(&mut self) -> Result<&mut LZO, CodecError> {
        if self.fast.is_none() {
            let lzo = LZO::init()
                .map_err(|_| CodecError::Compression("LZO library initialisation failed".into()))?;
            self.fast = Some(Box::new(lzo));
        }
        match self.fast.as_mut() {
            Some(ctx) => Ok(&mut **ctx),
            None => Err(CodecError::Compression("LZO context unavailable".into())),
        }
    }
}

impl BlockCodec for Lzo1xCodec {
    fn name(&self) -> &'static str {
        "lzo1x"
    }

    fn compress(&mut self, block: &[u8], level: Level) -> Result<Vec<u8>, CodecError> {
        if block.is_empty() {
            return Ok(Vec::new());
        }
        match level {
            Level::Fastest => self
                .fast_context()?
                .compress(block)
                .map_err(|_| CodecError::Compression(format!("lzo1x-1 rejected a {}-byte block", block.len()))),
            Level::Best => Ok(lzo1x::compress_best(block)),
        }
    }

    fn decompress(&mut self, data: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        if data.is_empty() {
            return Err(CodecError::Decompression("empty compressed block".into()));
        }
        Ok(lzo1x::decompress(data, expected_len)?)
    }
}
