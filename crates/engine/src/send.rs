//! The sender-side matcher: turn a source file into a token stream.

use std::io::{self, Write};

use rsync_checksums::{RollingSum, SeededMd4};

use crate::signature::SignatureTable;
use crate::token::Token;
use crate::CHUNK_SIZE;

/// Streams `source` as tokens against the receiver's signature table.
///
/// Literal runs are flushed in chunks of at most [`CHUNK_SIZE`] bytes. When
/// the table is empty (no basis on the receiver) the whole file goes out as
/// literals. The stream is closed with a zero token followed by the 16-byte
/// whole-file MD4 keyed by `seed`, which is also returned.
pub fn send_delta<W: Write>(
    wr: &mut W,
    source: &[u8],
    table: &SignatureTable,
    seed: i32,
) -> io::Result<[u8; 16]> {
    if table.is_empty() {
        flush_literal(wr, source)?;
    } else {
        match_blocks(wr, source, table, seed)?;
    }

    Token::End.write_to(wr)?;
    let sum = SeededMd4::digest(seed, source);
    wr.write_all(&sum)?;
    Ok(sum)
}

fn match_blocks<W: Write>(
    wr: &mut W,
    source: &[u8],
    table: &SignatureTable,
    seed: i32,
) -> io::Result<()> {
    let n = source.len();
    let block_len = table.head.block_length as usize;
    let remainder = table.head.remainder_length as usize;

    let mut matched_blocks = 0u64;
    let mut lit_start = 0;
    let mut offset = 0;
    // Maintained incrementally while a full-length window fits; the short
    // tail window (remainder matching) is cheap enough to recompute.
    let mut rolling = if n >= block_len {
        RollingSum::from_block(&source[..block_len])
    } else {
        RollingSum::default()
    };

    while offset < n {
        let window = block_len.min(n - offset);
        let candidate = if window == block_len {
            find_match(table, seed, rolling.value(), &source[offset..offset + window])
        } else if remainder != 0 && window == remainder {
            let sum = RollingSum::from_block(&source[offset..offset + window]).value();
            find_match(table, seed, sum, &source[offset..offset + window])
        } else {
            None
        };

        match candidate {
            Some(block) => {
                flush_literal(wr, &source[lit_start..offset])?;
                Token::Block(block).write_to(wr)?;
                matched_blocks += 1;
                offset += window;
                lit_start = offset;
                if offset + block_len <= n {
                    rolling = RollingSum::from_block(&source[offset..offset + block_len]);
                }
            }
            None => {
                if offset + block_len < n {
                    rolling.roll(source[offset], source[offset + block_len]);
                }
                offset += 1;
            }
        }
    }
    flush_literal(wr, &source[lit_start..n])?;

    tracing::trace!(
        matched_blocks,
        literal_bytes = n as u64 - matched_blocks * block_len as u64,
        "delta match finished"
    );
    Ok(())
}

/// Confirms a weak hit with the strong checksum, insisting the candidate
/// block's length equals the current window.
fn find_match(table: &SignatureTable, seed: i32, rolling: u32, window: &[u8]) -> Option<u32> {
    let candidates = table.candidates(rolling);
    if candidates.is_empty() {
        return None;
    }

    let strong = SeededMd4::digest(seed, window);
    let strong_len = table.head.strong_length as usize;
    candidates.iter().copied().find(|&block| {
        table.head.block_len_at(block) == window.len()
            && table.blocks[block as usize].strong[..strong_len] == strong[..strong_len]
    })
}

fn flush_literal<W: Write>(wr: &mut W, mut data: &[u8]) -> io::Result<()> {
    while !data.is_empty() {
        let chunk = &data[..data.len().min(CHUNK_SIZE)];
        Token::Literal(chunk.len() as u32).write_to(wr)?;
        wr.write_all(chunk)?;
        data = &data[chunk.len()..];
    }
    Ok(())
}
