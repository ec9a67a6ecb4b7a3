//! LZO1X bitstream: bounds-checked decoder and a hash-chain compressor.
//!
//! The decoder accepts any conforming LZO1X stream (LZO1X-1 and LZO1X-999
//! output decode the same way) and reports the exact number of bytes it
//! produced. Every read of the input, every back-reference and every write
//! to the output is checked; malformed data returns [`LzoError`] and never
//! panics.
//!
//! [`compress_best`] is the slow, high-ratio encoder used for
//! [`Level::Best`](super::Level::Best). It walks a hash chain at every
//! candidate position, keeps the longest match, and defers a match by one
//! byte when the next position has a longer one.
//!
//! # Instruction set
//!
//! | first byte | meaning                                                    |
//! |------------|------------------------------------------------------------|
//! | `0..=15`   | literal run (state 0), 3-byte far match (state 4), or 2-byte near match (state 1..3) |
//! | `16..=31`  | M4: distance `0x4000..=0xBFFF`, or end of stream            |
//! | `32..=63`  | M3: distance up to `0x4000`                                 |
//! | `64..=255` | M2: length 3..=8, distance up to `0x800`                    |
//!
//! The low two bits of the byte two places before the end of each match
//! instruction carry the number of literals (0..=3) that follow it; the
//! decoder "state" is that count, or 4 after a literal run.

use thiserror::Error;

const M2_MAX_LEN: usize = 8;
const M2_MAX_OFFSET: usize = 0x0800;
const M3_MAX_LEN: usize = 33;
const M3_MAX_OFFSET: usize = 0x4000;
const M4_MAX_LEN: usize = 9;
const M4_MAX_OFFSET: usize = 0xBFFF;
/// Longest distance a 3-byte match right after a literal run can reach.
const MX_MAX_OFFSET: usize = M2_MAX_OFFSET + 0x0400;

const M3_MARKER: u8 = 32;
const M4_MARKER: u8 = 16;

/// End-of-stream instruction: an M4 match with distance 0.
const END_OF_STREAM: [u8; 3] = [M4_MARKER | 1, 0, 0];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzoError {
    #[error("input overrun at byte {0}")]
    InputOverrun(usize),
    #[error("output overrun: instruction needs {needed} bytes, block holds {limit}")]
    OutputOverrun { needed: usize, limit: usize },
    #[error("match distance {distance} reaches before the start of the block ({produced} bytes decoded)")]
    LookbehindOverrun { distance: usize, produced: usize },
    #[error("{0} trailing bytes after end of stream")]
    InputNotConsumed(usize),
    #[error("stream decoded to {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

// ── Decoder ──────────────────────────────────────────────────────────────────

struct Input<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    fn byte(&mut self) -> Result<u8, LzoError> {
        let b = *self.src.get(self.pos).ok_or(LzoError::InputOverrun(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn le16(&mut self) -> Result<usize, LzoError> {
        let lo = self.byte()?;
        let hi = self.byte()?;
        Ok(usize::from(u16::from_le_bytes([lo, hi])))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LzoError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.src.len())
            .ok_or(LzoError::InputOverrun(self.pos))?;
        let run = &self.src[self.pos..end];
        self.pos = end;
        Ok(run)
    }

    /// Zero-extended length: each 0 byte adds 255, the first non-zero byte
    /// terminates.
    fn extended(&mut self, base: usize) -> Result<usize, LzoError> {
        let mut n = base;
        loop {
            match self.byte()? {
                0 => n += 255,
                b => return Ok(n + usize::from(b)),
            }
        }
    }
}

fn copy_literals(input: &mut Input<'_>, out: &mut Vec<u8>, n: usize, limit: usize) -> Result<(), LzoError> {
    if out.len() + n > limit {
        return Err(LzoError::OutputOverrun { needed: out.len() + n, limit });
    }
    out.extend_from_slice(input.take(n)?);
    Ok(())
}

fn copy_match(out: &mut Vec<u8>, distance: usize, len: usize, limit: usize) -> Result<(), LzoError> {
    if distance == 0 || distance > out.len() {
        return Err(LzoError::LookbehindOverrun { distance, produced: out.len() });
    }
    if out.len() + len > limit {
        return Err(LzoError::OutputOverrun { needed: out.len() + len, limit });
    }
    let start = out.len() - distance;
    if distance >= len {
        out.extend_from_within(start..start + len);
    } else {
        // Overlapping copy repeats the last `distance` bytes.
        for i in start..start + len {
            let b = out[i];
            out.push(b);
        }
    }
    Ok(())
}

/// Decode one LZO1X stream that must expand to exactly `expected_len` bytes.
pub fn decompress(src: &[u8], expected_len: usize) -> Result<Vec<u8>, LzoError> {
    let limit = expected_len;
    let mut out = Vec::with_capacity(expected_len);
    let mut input = Input { src, pos: 0 };
    let mut state = 0usize;

    // A leading byte above 17 is a literal run of `b - 17` bytes.
    if let Some(&first) = src.first() {
        if first > 17 {
            input.pos = 1;
            let n = usize::from(first - 17);
            copy_literals(&mut input, &mut out, n, limit)?;
            state = n.min(4);
        }
    }

    loop {
        let t = usize::from(input.byte()?);
        let (distance, len, trailing) = if t < 16 {
            match state {
                0 => {
                    let run = (if t == 0 { input.extended(15)? } else { t }) + 3;
                    copy_literals(&mut input, &mut out, run, limit)?;
                    state = 4;
                    continue;
                }
                4 => {
                    let b = usize::from(input.byte()?);
                    (1 + M2_MAX_OFFSET + (t >> 2) + (b << 2), 3, t & 3)
                }
                _ => {
                    let b = usize::from(input.byte()?);
                    (1 + (t >> 2) + (b << 2), 2, t & 3)
                }
            }
        } else if t >= 64 {
            let b = usize::from(input.byte()?);
            (1 + ((t >> 2) & 7) + (b << 3), (t >> 5) + 1, t & 3)
        } else if t >= 32 {
            let len = (if t & 31 == 0 { input.extended(31)? } else { t & 31 }) + 2;
            let d = input.le16()?;
            (1 + (d >> 2), len, d & 3)
        } else {
            let len = (if t & 7 == 0 { input.extended(7)? } else { t & 7 }) + 2;
            let d = input.le16()?;
            let distance = ((t & 8) << 11) + (d >> 2);
            if distance == 0 {
                break;
            }
            (distance + 0x4000, len, d & 3)
        };

        copy_match(&mut out, distance, len, limit)?;
        copy_literals(&mut input, &mut out, trailing, limit)?;
        state = trailing;
    }

    if input.pos != src.len() {
        return Err(LzoError::InputNotConsumed(src.len() - input.pos));
    }
    if out.len() != expected_len {
        return Err(LzoError::LengthMismatch { expected: expected_len, actual: out.len() });
    }
    Ok(out)
}

// ── Encoder ──────────────────────────────────────────────────────────────────

const HASH_BITS: u32 = 15;
const CHAIN_WINDOW: usize = 1 << 16;
const CHAIN_MASK: usize = CHAIN_WINDOW - 1;
const NIL: u32 = u32::MAX;
/// Candidates examined per position.
const MAX_CHAIN: usize = 128;
/// A match this long ends the search early.
const NICE_LEN: usize = 256;
const MIN_MATCH: usize = 3;

struct MatchFinder<'a> {
    src: &'a [u8],
    head: Vec<u32>,
    prev: Vec<u32>,
    next_to_insert: usize,
}

impl<'a> MatchFinder<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self {
            src,
            head: vec![NIL; 1 << HASH_BITS],
            prev: vec![NIL; CHAIN_WINDOW],
            next_to_insert: 0,
        }
    }

    #[inline]
    fn hash(&self, pos: usize) -> usize {
        let v = u32::from(self.src[pos])
            | u32::from(self.src[pos + 1]) << 8
            | u32::from(self.src[pos + 2]) << 16;
        (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    /// Chain every position in `[next_to_insert, target)`.
    fn insert_until(&mut self, target: usize) {
        let last = self.src.len().saturating_sub(MIN_MATCH - 1);
        while self.next_to_insert < target.min(last) {
            let pos = self.next_to_insert;
            let h = self.hash(pos);
            self.prev[pos & CHAIN_MASK] = self.head[h];
            self.head[h] = pos as u32;
            self.next_to_insert += 1;
        }
    }

    /// Longest earlier match for `pos` as `(len, distance)`; `(0, 0)` if none.
    fn longest(&mut self, pos: usize) -> (usize, usize) {
        self.insert_until(pos);
        let src = self.src;
        if pos + MIN_MATCH > src.len() {
            return (0, 0);
        }
        let max_len = src.len() - pos;
        let mut best = (0, 0);
        let mut cand = self.head[self.hash(pos)];
        let mut depth = 0;

        while cand != NIL && depth < MAX_CHAIN {
            let c = cand as usize;
            if c >= pos || pos - c > M4_MAX_OFFSET {
                break;
            }
            if best.0 == 0 || src[c + best.0] == src[pos + best.0] {
                let len = src[c..]
                    .iter()
                    .zip(&src[pos..pos + max_len])
                    .take_while(|(a, b)| a == b)
                    .count();
                if len > best.0 {
                    best = (len, pos - c);
                    if len >= NICE_LEN || len == max_len {
                        break;
                    }
                }
            }
            let next = self.prev[c & CHAIN_MASK];
            if next != NIL && next as usize >= c {
                break;
            }
            cand = next;
            depth += 1;
        }
        if best.0 < MIN_MATCH {
            (0, 0)
        } else {
            best
        }
    }
}

/// Whether a match saves space once encoded, given the literals before it.
fn worth_coding(len: usize, distance: usize, literals: usize) -> bool {
    match len {
        0..=2 => false,
        3 => distance <= M2_MAX_OFFSET || (literals >= 4 && distance <= MX_MAX_OFFSET),
        _ => distance <= M4_MAX_OFFSET,
    }
}

fn push_extended(out: &mut Vec<u8>, mut n: usize) {
    while n > 255 {
        out.push(0);
        n -= 255;
    }
    out.push(n as u8);
}

fn emit_literals(out: &mut Vec<u8>, lits: &[u8]) {
    let t = lits.len();
    if t == 0 {
        return;
    }
    if out.is_empty() && t <= 238 {
        out.push((17 + t) as u8);
    } else if t <= 3 {
        // Folded into the previous match instruction.
        let at = out.len() - 2;
        out[at] |= t as u8;
    } else if t <= 18 {
        out.push((t - 3) as u8);
    } else {
        out.push(0);
        push_extended(out, t - 18);
    }
    out.extend_from_slice(lits);
}

fn emit_match(out: &mut Vec<u8>, len: usize, distance: usize, literals: usize) {
    if len <= M2_MAX_LEN && distance <= M2_MAX_OFFSET {
        let d = distance - 1;
        out.push((((len - 1) << 5) | ((d & 7) << 2)) as u8);
        out.push((d >> 3) as u8);
    } else if len == 3 && literals >= 4 && distance <= MX_MAX_OFFSET {
        let d = distance - 1 - M2_MAX_OFFSET;
        out.push(((d & 3) << 2) as u8);
        out.push((d >> 2) as u8);
    } else if distance <= M3_MAX_OFFSET {
        let d = distance - 1;
        if len <= M3_MAX_LEN {
            out.push(M3_MARKER | (len - 2) as u8);
        } else {
            out.push(M3_MARKER);
            push_extended(out, len - M3_MAX_LEN);
        }
        out.push(((d & 0x3F) << 2) as u8);
        out.push((d >> 6) as u8);
    } else {
        let d = distance - 0x4000;
        let high = ((d & 0x4000) >> 11) as u8;
        if len <= M4_MAX_LEN {
            out.push(M4_MARKER | high | (len - 2) as u8);
        } else {
            out.push(M4_MARKER | high);
            push_extended(out, len - M4_MAX_LEN);
        }
        out.push(((d & 0x3F) << 2) as u8);
        out.push(((d >> 6) & 0xFF) as u8);
    }
}

/// Compress `src` into a single LZO1X stream, trading speed for ratio.
pub fn compress_best(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len() + src.len() / 16 + 64 + 3);
    let mut finder = MatchFinder::new(src);
    let mut lit_start = 0;
    let mut pos = 0;

    while pos + MIN_MATCH <= src.len() {
        let literals = pos - lit_start;
        let (len, distance) = finder.longest(pos);
        if !worth_coding(len, distance, literals) {
            pos += 1;
            continue;
        }
        let (next_len, next_distance) = finder.longest(pos + 1);
        if next_len > len && worth_coding(next_len, next_distance, literals + 1) {
            pos += 1;
            continue;
        }
        emit_literals(&mut out, &src[lit_start..pos]);
        emit_match(&mut out, len, distance, literals);
        pos += len;
        lit_start = pos;
    }

    emit_literals(&mut out, &src[lit_start..]);
    out.extend_from_slice(&END_OF_STREAM);
    out
}
