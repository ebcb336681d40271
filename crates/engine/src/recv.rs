//! The receiver side: replay a token stream against the basis file.

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::fs::FileExt;

use rsync_checksums::SeededMd4;
use rsync_protocol::SumHead;

use crate::token::Token;
use crate::{EngineError, CHUNK_SIZE};

/// Byte accounting for one reconstructed file.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeltaStats {
    /// Bytes received as literals.
    pub literal: u64,
    /// Bytes copied out of the local basis file.
    pub matched: u64,
}

/// Reconstructs one file from the token stream on `rd`.
///
/// Literals are copied through verbatim; back-references read
/// `block_length` bytes (or `remainder_length` for the final block) from
/// `basis` at the block's offset. Every byte also feeds a running MD4
/// keyed by `seed`, which is compared against the sender's trailing
/// whole-file checksum.
///
/// # Errors
///
/// [`EngineError::SumMismatch`] when verification fails, which is fatal
/// for the file; the caller attaches the file name. Block references without a
/// basis or outside the advertised table are protocol violations.
pub fn receive_delta<R: Read, W: Write>(
    rd: &mut R,
    out: &mut W,
    head: &SumHead,
    basis: Option<&File>,
    seed: i32,
) -> Result<DeltaStats, EngineError> {
    let mut hash = SeededMd4::new(seed);
    let mut stats = DeltaStats::default();
    // Blocks can outgrow the I/O chunk size for very large files.
    let mut buf = vec![0u8; CHUNK_SIZE.max(head.block_length as usize)];

    loop {
        match Token::read_from(rd)? {
            Token::Literal(len) => {
                let mut remaining = len as usize;
                while remaining > 0 {
                    let take = remaining.min(buf.len());
                    rd.read_exact(&mut buf[..take])?;
                    hash.update(&buf[..take]);
                    out.write_all(&buf[..take])?;
                    remaining -= take;
                }
                stats.literal += u64::from(len);
            }
            Token::Block(block) => {
                if block as i64 >= i64::from(head.block_count) {
                    return Err(EngineError::BlockOutOfRange {
                        block,
                        count: head.block_count,
                    });
                }
                let basis = basis.ok_or(EngineError::MissingBasis { block })?;

                let len = head.block_len_at(block);
                let offset = u64::from(block) * head.block_length as u64;
                basis.read_exact_at(&mut buf[..len], offset)?;
                hash.update(&buf[..len]);
                out.write_all(&buf[..len])?;
                stats.matched += len as u64;
            }
            Token::End => break,
        }
    }

    let mut remote_sum = [0u8; 16];
    rd.read_exact(&mut remote_sum)?;
    if hash.finalize() != remote_sum {
        return Err(EngineError::SumMismatch);
    }
    Ok(stats)
}
