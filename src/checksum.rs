//! Running Adler-32 over the original (uncompressed) bytes of a stream.

use adler::Adler32;

/// Incremental, order-sensitive checksum.
///
/// Feeding the same bytes in any split yields the same value, so block
/// boundaries never affect the result.
#[derive(Debug, Clone, Default)]
pub struct RunningChecksum {
    inner: Adler32,
}

impl RunningChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.inner.write_slice(bytes);
    }

    pub fn finalize(&self) -> u32 {
        self.inner.checksum()
    }
}

/// Checksum of a complete buffer.
pub fn checksum(bytes: &[u8]) -> u32 {
    let mut c = RunningChecksum::new();
    c.update(bytes);
    c.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_one() {
        assert_eq!(RunningChecksum::new().finalize(), 1);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(checksum(b"a"), 0x0062_0062);
        assert_eq!(checksum(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn split_independent() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let whole = checksum(&data);
        for split in [1, 7, 1024, 4096, 9_999] {
            let mut c = RunningChecksum::new();
            for part in data.chunks(split) {
                c.update(part);
            }
            assert_eq!(c.finalize(), whole, "split {split}");
        }
    }

    #[test]
    fn order_sensitive() {
        assert_ne!(checksum(b"ab"), checksum(b"ba"));
    }
}
