//! The rsync daemon: named modules behind the `@RSYNCD` handshake.
//!
//! A daemon exposes named filesystem roots ([`Module`]) guarded by ordered
//! ACL rules. Connections arrive over TCP (or any pre-authenticated byte
//! duplex, e.g. an SSH channel) and walk the handshake state machine in
//! [`handler`]: greeting, module selection, access check, argument
//! exchange, seed, multiplex switch, then the sender or receiver role.

pub mod config;
pub mod handler;
pub mod module;
pub mod server;

pub use config::{Config, Listener};
pub use handler::Daemon;
pub use module::{check_acl, AclRule, Module};
pub use server::{Server, ShutdownHandle};

use thiserror::Error;

use rsync_transfer::TransferError;

/// Errors surfaced by daemon connections and configuration loading.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The requested module does not exist.
    #[error("unknown module {0:?}")]
    UnknownModule(String),
    /// An ACL rule denied the connection.
    #[error("access denied (acl {0:?})")]
    AccessDenied(String),
    /// An ACL rule could not be parsed.
    #[error("invalid acl {0:?} (syntax: allow|deny <all|ipnet>)")]
    InvalidAcl(String),
    /// A write was requested against a read-only module.
    #[error("module {0:?} is read only")]
    ReadOnlyModule(String),
    /// A module definition is incomplete.
    #[error("invalid module definition: {0}")]
    InvalidModule(String),
    /// The peer broke the handshake protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The peer's argument lines failed to parse.
    #[error("parsing server args: {0}")]
    ServerArgs(#[from] rsync_opts::OptionParseError),
    /// Configuration file problems.
    #[error("config: {0}")]
    Config(String),
    /// Transfer-phase failure.
    #[error(transparent)]
    Transfer(#[from] TransferError),
    /// Underlying connection failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
