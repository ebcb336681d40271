//! The transfer core: sender and receiver sides of a protocol-27 session.
//!
//! The sender walks its source set, ships the file list and answers index
//! requests with delta token streams. The receiver runs two cooperating
//! tasks over the shared connection: the generator emitting indices and
//! block signatures, and the receiver task reconstructing files into temp
//! siblings that are renamed into place. Deferred directory attributes and
//! the statistics handshake close the session.

mod attrs;
mod delete;
mod generator;
mod pending;
mod receiver;
mod sender;

pub use pending::PendingFile;
pub use receiver::run_receiver;
pub use sender::run_sender;

use std::io::{self, Read, Write};
use std::path::PathBuf;

use thiserror::Error;

use rsync_flist::{FlistConfig, FlistError};
use rsync_opts::Options;
use rsync_protocol::{WireRead, WireWrite};

/// Errors aborting a transfer.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The peer violated the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The file list could not be encoded or decoded.
    #[error(transparent)]
    FileList(#[from] FlistError),
    /// Whole-file checksum verification failed for one file.
    #[error("file corruption in {name}")]
    Integrity {
        /// Relative name of the corrupt file.
        name: String,
    },
    /// A filesystem operation on a specific path failed.
    #[error("{}: {source}", path.display())]
    File {
        /// The path the operation targeted.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },
    /// The peer requested hard-link preservation, which is not implemented.
    #[error("support for hard links not yet implemented")]
    HardLinksUnsupported,
    /// Underlying connection failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl TransferError {
    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }
}

/// Derives the file-list field configuration from the resolved options.
#[must_use]
pub fn flist_config(opts: &Options) -> FlistConfig {
    FlistConfig {
        preserve_uid: opts.preserve_uid,
        preserve_gid: opts.preserve_gid,
        preserve_links: opts.preserve_links,
        preserve_devices: opts.preserve_devices,
        preserve_specials: opts.preserve_specials,
        numeric_ids: opts.numeric_ids,
    }
}

/// Reads the peer's exclusion list, which this core requires to be empty.
pub fn recv_exclusion_list<R: Read>(rd: &mut R) -> Result<(), TransferError> {
    let terminator = rd.read_i32()?;
    if terminator != 0 {
        return Err(TransferError::Protocol(
            "non-empty exclusion list received".to_owned(),
        ));
    }
    Ok(())
}

/// Sends the empty exclusion list terminator.
pub fn send_exclusion_list<W: Write>(wr: &mut W) -> io::Result<()> {
    wr.write_i32(0)
}
