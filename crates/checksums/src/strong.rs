//! Seeded MD4 strong checksum.
//!
//! Protocol 27 keys every strong checksum with the per-connection seed: the
//! seed is hashed first as a little-endian `i32`, then the payload follows.
//! Block checksums and the whole-file verification sum both use this
//! construction.

use digest::Digest;
use md4::Md4;

/// Length of the strong digest in bytes.
pub const STRONG_SUM_LENGTH: usize = 16;

/// Streaming MD4 hasher keyed by the session checksum seed.
#[derive(Clone, Debug)]
pub struct SeededMd4 {
    inner: Md4,
}

impl SeededMd4 {
    /// Creates a hasher primed with `seed`.
    #[must_use]
    pub fn new(seed: i32) -> Self {
        let mut inner = Md4::new();
        inner.update(seed.to_le_bytes());
        Self { inner }
    }

    /// Feeds additional bytes into the digest state.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalises the digest and returns the 128-bit output.
    #[must_use]
    pub fn finalize(self) -> [u8; STRONG_SUM_LENGTH] {
        self.inner.finalize().into()
    }

    /// Computes the seeded digest of `data` in one shot.
    #[must_use]
    pub fn digest(seed: i32, data: &[u8]) -> [u8; STRONG_SUM_LENGTH] {
        let mut hasher = Self::new(seed);
        hasher.update(data);
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_is_hashed_as_little_endian_prefix() {
        let seed: i32 = 666;
        let payload = b"delta transfer";

        let mut reference = Md4::new();
        reference.update(seed.to_le_bytes());
        reference.update(payload);
        let expected: [u8; 16] = reference.finalize().into();

        assert_eq!(SeededMd4::digest(seed, payload), expected);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let seed = -12345;
        let payload = b"0123456789abcdef0123456789abcdef";

        let mut hasher = SeededMd4::new(seed);
        hasher.update(&payload[..7]);
        hasher.update(&payload[7..]);

        assert_eq!(hasher.finalize(), SeededMd4::digest(seed, payload));
    }

    #[test]
    fn different_seeds_diverge() {
        let payload = b"same payload";
        assert_ne!(
            SeededMd4::digest(1, payload),
            SeededMd4::digest(2, payload)
        );
    }
}
