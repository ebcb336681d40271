//! The client side: resolve where source and destination live, set up a
//! transport (daemon socket, remote-shell subprocess, or a local server
//! subprocess) and drive the transfer session as the initiator.

mod driver;
mod hostspec;
mod session;
mod socket;

pub use driver::run_client;
pub use hostspec::{parse_target, Target};
pub use session::{client_session, Role};

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use rsync_transfer::TransferError;

/// Errors surfaced to the CLI from a client run.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The combination of sources and destination is not usable.
    #[error("usage error: {0}")]
    Usage(String),
    /// The remote daemon replied with an `@ERROR` line.
    #[error("{0}")]
    Remote(String),
    /// The daemon handshake went off-script.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The remote-shell or local-server subprocess could not be started.
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },
    /// Transfer-phase failure.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// Underlying connection failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
