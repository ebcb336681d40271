//! Per-block checksum tables describing a basis file.

use std::io::{self, Read, Write};

use rustc_hash::FxHashMap;

use rsync_checksums::{RollingSum, SeededMd4};
use rsync_protocol::{SumHead, WireRead, WireWrite};

/// Checksum pair for one basis block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BlockSum {
    /// Weak rolling checksum in packed wire form.
    pub rolling: u32,
    /// Seeded MD4 over the block, truncated to the advertised length.
    pub strong: [u8; 16],
}

/// The generator's description of a basis file: sum head plus one
/// [`BlockSum`] per block, indexed by rolling checksum for candidate
/// lookup during the sender's scan.
#[derive(Debug, Default)]
pub struct SignatureTable {
    /// Block structure of the basis file.
    pub head: SumHead,
    /// Checksums in block order.
    pub blocks: Vec<BlockSum>,
    index: FxHashMap<u32, Vec<u32>>,
}

impl SignatureTable {
    /// The empty table: an all-zero head and no checksums, used when the
    /// receiver has no usable basis.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Computes the table for an in-memory basis.
    #[must_use]
    pub fn build(basis: &[u8], seed: i32) -> Self {
        let head = SumHead::from_file_len(basis.len() as i64);
        let mut blocks = Vec::with_capacity(head.block_count as usize);
        if !head.is_empty() {
            for chunk in basis.chunks(head.block_length as usize) {
                blocks.push(BlockSum {
                    rolling: RollingSum::from_block(chunk).value(),
                    strong: SeededMd4::digest(seed, chunk),
                });
            }
        }
        Self::assemble(head, blocks)
    }

    /// Returns `true` when no blocks are available to match against.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the block indices whose rolling checksum equals `rolling`.
    #[must_use]
    pub fn candidates(&self, rolling: u32) -> &[u32] {
        self.index.get(&rolling).map_or(&[], Vec::as_slice)
    }

    /// Decodes a table from the wire given its already-read head.
    pub fn read_from<R: Read>(rd: &mut R, head: SumHead) -> io::Result<Self> {
        let strong_len = head.strong_length as usize;
        // Capacity is capped so a hostile head cannot reserve memory the
        // peer never backs with data.
        let mut blocks = Vec::with_capacity((head.block_count as usize).min(1 << 20));
        for _ in 0..head.block_count {
            let rolling = rd.read_i32()? as u32;
            let mut strong = [0u8; 16];
            rd.read_exact(&mut strong[..strong_len])?;
            blocks.push(BlockSum { rolling, strong });
        }
        Ok(Self::assemble(head, blocks))
    }

    /// Encodes the head and checksum pairs onto the wire.
    pub fn write_to<W: Write>(&self, wr: &mut W) -> io::Result<()> {
        self.head.write_to(wr)?;
        let strong_len = self.head.strong_length as usize;
        for block in &self.blocks {
            wr.write_i32(block.rolling as i32)?;
            wr.write_all(&block.strong[..strong_len])?;
        }
        Ok(())
    }

    fn assemble(head: SumHead, blocks: Vec<BlockSum>) -> Self {
        let mut index: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
        for (i, block) in blocks.iter().enumerate() {
            index.entry(block.rolling).or_default().push(i as u32);
        }
        Self {
            head,
            blocks,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    #[test]
    fn empty_basis_yields_empty_table() {
        let table = SignatureTable::build(b"", 666);
        assert!(table.is_empty());
        assert!(table.head.is_empty());
    }

    #[test]
    fn build_covers_every_block() {
        let basis = vec![0xabu8; 1800];
        let table = SignatureTable::build(&basis, 666);
        // 1800 bytes at the 700-byte minimum block length: 700 + 700 + 400.
        assert_eq!(table.head.block_count, 3);
        assert_eq!(table.head.remainder_length, 400);
        assert_eq!(table.blocks.len(), 3);
        // Identical full blocks share one rolling value with two candidates.
        assert_eq!(table.candidates(table.blocks[0].rolling).len(), 2);
    }

    #[test]
    fn wire_round_trip_preserves_blocks() {
        let basis: Vec<u8> = (0..2048u32).map(|i| (i * 31 % 251) as u8).collect();
        let table = SignatureTable::build(&basis, -7);

        let mut wire = Vec::new();
        table.write_to(&mut wire).unwrap();

        let mut cursor = Cursor::new(wire);
        let head = SumHead::read_from(&mut cursor).unwrap();
        let decoded = SignatureTable::read_from(&mut cursor, head).unwrap();

        assert_eq!(decoded.head, table.head);
        assert_eq!(decoded.blocks, table.blocks);
    }

    #[test]
    fn candidates_miss_returns_empty() {
        let table = SignatureTable::build(b"some basis data", 1);
        // A value that cannot collide with the single block's checksum.
        let absent = table.blocks[0].rolling.wrapping_add(1);
        assert!(table.candidates(absent).is_empty());
    }
}
