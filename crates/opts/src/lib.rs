//! Resolved transfer options and the wire argument codec.
//!
//! The daemon receives its marching orders as `\n`-terminated argument
//! lines (`--server --sender -logDtpr . module/path`); the client produces
//! the same form when spawning a remote or local server. Both directions
//! live here: [`parse_server_args`] for the inbound lines and
//! [`Options::to_server_args`] for the outbound ones.

mod options;
mod server_args;

pub use options::Options;
pub use server_args::{base_command, options_from_matches, parse_server_args, ParsedServerArgs};

use thiserror::Error;

/// Error produced when wire argument lines fail to parse.
///
/// The daemon reports these to the peer as a multiplexed error frame after
/// writing the `0xee` placeholder seed.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct OptionParseError(pub(crate) String);
