//! The delta-reconstruction engine.
//!
//! The receiver's generator describes its local basis file as a table of
//! per-block checksums ([`SignatureTable`]); the sender scans its copy with
//! a rolling checksum and answers with a token stream of literals and block
//! back-references ([`send`]); the receiver replays that stream against the
//! basis file and verifies the result with a whole-file seeded MD4
//! ([`recv`]).

pub mod recv;
pub mod send;
pub mod signature;
pub mod token;

pub use recv::{receive_delta, DeltaStats};
pub use send::send_delta;
pub use signature::{BlockSum, SignatureTable};
pub use token::Token;

use thiserror::Error;

/// Size cap for a single literal token payload, matching upstream's I/O
/// chunking.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Errors produced while applying a token stream.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The reconstructed data failed whole-file checksum verification.
    #[error("whole-file checksum mismatch")]
    SumMismatch,
    /// The sender referenced a basis block but no basis file is open.
    #[error("block reference {block} without a local basis file")]
    MissingBasis {
        /// The referenced block index.
        block: u32,
    },
    /// The sender referenced a block outside the advertised table.
    #[error("block reference {block} out of range ({count} blocks)")]
    BlockOutOfRange {
        /// The referenced block index.
        block: u32,
        /// Number of blocks in the sum head.
        count: i32,
    },
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
