//! File-list exchange for the rsync version-27 protocol.
//!
//! The file list is the transfer's table of contents: the sender walks its
//! source set, emits one delta-encoded record per filesystem object, and both
//! sides address files by their index in transmission order from then on.
//! Optional fields and repeats from the previous entry are driven by the
//! status byte (`xflags`); see [`entry`] for the bit layout.

pub mod builder;
pub mod entry;
pub mod idmap;
pub mod name;
pub mod read;
pub mod write;

pub use builder::{build_file_list, id_maps_for, WalkedList};
pub use entry::{FileEntry, FileType};
pub use idmap::{read_id_map, write_id_map, IdMap};
pub use name::validate_name;
pub use read::{read_file_list, FileList, FileListReader};
pub use write::{write_file_list, FileListWriter};

use thiserror::Error;

/// Longest accepted file name or symlink target, in bytes.
pub const MAX_NAME_LENGTH: usize = 4096;

/// Which optional per-entry fields travel on the wire.
///
/// Both ends must agree on this, so it is derived from the negotiated
/// options on each side rather than carried per entry.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FlistConfig {
    /// Transmit owner ids (`-o`).
    pub preserve_uid: bool,
    /// Transmit group ids (`-g`).
    pub preserve_gid: bool,
    /// Transmit symlink targets (`-l`).
    pub preserve_links: bool,
    /// Transmit device numbers (`-D`).
    pub preserve_devices: bool,
    /// Transmit fifo/socket entries (`-D`).
    pub preserve_specials: bool,
    /// Suppress the trailing user/group name maps (`--numeric-ids`).
    pub numeric_ids: bool,
}

/// Errors raised while encoding or decoding a file list.
#[derive(Debug, Error)]
pub enum FlistError {
    /// An entry carried an empty name.
    #[error("file list entry has an empty name")]
    EmptyName,
    /// An entry name was absolute.
    #[error("file list entry name {0:?} is absolute")]
    AbsoluteName(String),
    /// An entry name contained a `..` component.
    #[error("file list entry name {0:?} escapes the transfer root")]
    EscapingName(String),
    /// An entry name embedded a NUL byte.
    #[error("file list entry name {0:?} contains a NUL byte")]
    NulInName(String),
    /// A length field was outside the accepted range.
    #[error("implausible length {len} for {what} in file list")]
    BadLength {
        /// Which field carried the length.
        what: &'static str,
        /// The offending value.
        len: i64,
    },
    /// A shared-prefix length pointed beyond the previous name.
    #[error("inherited name length {inherited} exceeds previous name length {prev}")]
    BadInheritedLength {
        /// Transmitted shared-prefix length.
        inherited: usize,
        /// Length of the previous entry's name.
        prev: usize,
    },
    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
