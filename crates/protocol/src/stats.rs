//! End-of-transfer statistics exchanged from sender to receiver.

use std::io::{self, Read, Write};

use crate::wire::{WireRead, WireWrite};

/// The three-integer statistics block closing a successful transfer.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TransferStats {
    /// Total bytes the sender read from the connection.
    pub read: i64,
    /// Total bytes the sender wrote to the connection.
    pub written: i64,
    /// Total size of the files in the transfer set.
    pub size: i64,
}

impl TransferStats {
    /// Decodes the statistics block.
    pub fn read_from<R: Read>(rd: &mut R) -> io::Result<Self> {
        Ok(Self {
            read: rd.read_i64()?,
            written: rd.read_i64()?,
            size: rd.read_i64()?,
        })
    }

    /// Encodes the statistics block.
    pub fn write_to<W: Write>(&self, wr: &mut W) -> io::Result<()> {
        wr.write_i64(self.read)?;
        wr.write_i64(self.written)?;
        wr.write_i64(self.size)
    }
}
