//! Wire-level building blocks for the rsync protocol, version 27.
//!
//! Everything on the wire is little-endian. This crate provides the primitive
//! integer codec ([`wire`]), the byte-counting stream wrappers that feed the
//! end-of-transfer statistics, the server-to-client multiplexing layer
//! ([`mux`]), the four-integer block-structure preamble ([`SumHead`]) and the
//! final statistics record ([`TransferStats`]).
//!
//! Higher layers (file lists, the delta engine, the connection state machine)
//! are built on top of these primitives and live in their own crates.

pub mod mux;
pub mod stats;
pub mod sumhead;
pub mod wire;

pub use mux::{DemuxReader, MessageTag, MuxWriter};
pub use stats::TransferStats;
pub use sumhead::SumHead;
pub use wire::{ByteCounter, CountingReader, CountingWriter, WireRead, WireWrite};

/// Protocol version spoken by this implementation.
///
/// Version 27 is the classic tridge/openrsync wire protocol: fixed-size
/// little-endian integers, full 16-byte MD4 strong checksums, and
/// multiplexing in the server-to-client direction only.
pub const PROTOCOL_VERSION: i32 = 27;

/// Seed value written before a multiplexed error when server-side argument
/// parsing fails after the module handshake already succeeded.
///
/// At that point in the conversation the client expects a checksum seed next,
/// so the daemon ships this placeholder, switches to multiplexing and sends
/// the parse error as a tagged frame before closing the connection.
pub const ERROR_SEED: i32 = 0xee;

/// End-of-phase and goodbye marker exchanged in the index request loop.
pub const PHASE_END: i32 = -1;
