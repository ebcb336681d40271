//! The four-integer preamble describing a file's block structure.

use std::io::{self, Read, Write};

use crate::wire::{WireRead, WireWrite};

/// Smallest block length used by the delta algorithm, in bytes.
pub const MIN_BLOCK_LENGTH: i64 = 700;

/// Strong checksum length for protocol 27: the full 16-byte MD4 digest.
pub const STRONG_SUM_LENGTH: i32 = 16;

/// Block-structure preamble exchanged ahead of a checksum table or token
/// stream.
///
/// Invariants: `block_count == ceil(len / block_length)` and
/// `remainder_length == len % block_length`. A zero-length or absent basis
/// file encodes as the all-zero head and transmits no checksums.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SumHead {
    /// Number of checksummed blocks.
    pub block_count: i32,
    /// Length of every block except possibly the last.
    pub block_length: i32,
    /// Strong checksum length transmitted per block.
    pub strong_length: i32,
    /// Length of the final block when it is shorter than `block_length`.
    pub remainder_length: i32,
}

impl SumHead {
    /// Computes the block structure for a file of `len` bytes.
    ///
    /// The block length is the rounded square root of the file length,
    /// clamped below at [`MIN_BLOCK_LENGTH`]. Zero-length files produce the
    /// all-zero head.
    #[must_use]
    pub fn from_file_len(len: i64) -> Self {
        if len <= 0 {
            return Self::default();
        }

        let block_length = ((len as f64).sqrt().round() as i64).max(MIN_BLOCK_LENGTH);
        Self {
            block_count: ((len + block_length - 1) / block_length) as i32,
            block_length: block_length as i32,
            strong_length: STRONG_SUM_LENGTH,
            remainder_length: (len % block_length) as i32,
        }
    }

    /// Returns `true` when the head describes an empty or absent basis.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.block_count == 0
    }

    /// Returns the length of block `index`, accounting for the remainder.
    #[must_use]
    pub fn block_len_at(&self, index: u32) -> usize {
        if index as i64 == i64::from(self.block_count) - 1 && self.remainder_length != 0 {
            self.remainder_length as usize
        } else {
            self.block_length as usize
        }
    }

    /// Decodes a sum head from the wire.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or when any field is negative.
    pub fn read_from<R: Read>(rd: &mut R) -> io::Result<Self> {
        let head = Self {
            block_count: rd.read_i32()?,
            block_length: rd.read_i32()?,
            strong_length: rd.read_i32()?,
            remainder_length: rd.read_i32()?,
        };
        if head.block_count < 0
            || head.block_length < 0
            || (head.block_count > 0 && head.block_length == 0)
            || head.strong_length < 0
            || head.strong_length > STRONG_SUM_LENGTH
            || head.remainder_length < 0
            || head.remainder_length > head.block_length
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("implausible sum head: {head:?}"),
            ));
        }
        Ok(head)
    }

    /// Encodes the sum head onto the wire.
    pub fn write_to<W: Write>(&self, wr: &mut W) -> io::Result<()> {
        wr.write_i32(self.block_count)?;
        wr.write_i32(self.block_length)?;
        wr.write_i32(self.strong_length)?;
        wr.write_i32(self.remainder_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use proptest::prelude::*;

    #[test]
    fn zero_length_file_is_all_zero() {
        assert_eq!(SumHead::from_file_len(0), SumHead::default());
    }

    #[test]
    fn small_file_uses_minimum_block_length() {
        let head = SumHead::from_file_len(5);
        assert_eq!(head.block_length, 700);
        assert_eq!(head.block_count, 1);
        assert_eq!(head.remainder_length, 5);
        assert_eq!(head.block_len_at(0), 5);
    }

    #[test]
    fn block_length_tracks_square_root() {
        let head = SumHead::from_file_len(3_149_824);
        assert_eq!(head.block_length, 1775);
        assert_eq!(head.strong_length, 16);
    }

    #[test]
    fn exact_multiple_has_no_remainder() {
        let head = SumHead::from_file_len(1400);
        assert_eq!(head.block_length, 700);
        assert_eq!(head.block_count, 2);
        assert_eq!(head.remainder_length, 0);
        assert_eq!(head.block_len_at(1), 700);
    }

    #[test]
    fn negative_fields_are_rejected() {
        let mut buf = Vec::new();
        buf.write_i32(-3).unwrap();
        buf.write_i32(700).unwrap();
        buf.write_i32(16).unwrap();
        buf.write_i32(0).unwrap();
        assert!(SumHead::read_from(&mut Cursor::new(buf)).is_err());
    }

    proptest! {
        #[test]
        fn arithmetic_invariants_hold(len in 0i64..1 << 40) {
            let head = SumHead::from_file_len(len);
            if len == 0 {
                prop_assert!(head.is_empty());
            } else {
                let block = i64::from(head.block_length);
                prop_assert_eq!(i64::from(head.block_count), (len + block - 1) / block);
                prop_assert_eq!(i64::from(head.remainder_length), len % block);
                let total: i64 = (0..head.block_count as u32)
                    .map(|i| head.block_len_at(i) as i64)
                    .sum();
                prop_assert_eq!(total, len);
            }
        }

        #[test]
        fn wire_round_trip(len in 0i64..1 << 40) {
            let head = SumHead::from_file_len(len);
            let mut buf = Vec::new();
            head.write_to(&mut buf).unwrap();
            prop_assert_eq!(buf.len(), 16);
            let decoded = SumHead::read_from(&mut Cursor::new(buf)).unwrap();
            prop_assert_eq!(decoded, head);
        }
    }
}
