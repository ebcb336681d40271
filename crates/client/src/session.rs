//! The client transfer session, transport-agnostic.

use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use rsync_opts::Options;
use rsync_protocol::{
    CountingReader, CountingWriter, DemuxReader, TransferStats, WireRead, WireWrite,
    PROTOCOL_VERSION,
};
use rsync_sandbox::RootDir;
use rsync_transfer::{run_receiver, run_sender, send_exclusion_list};

use crate::ClientError;

/// Which end of the transfer the client takes.
#[derive(Clone, Debug)]
pub enum Role<'a> {
    /// Push: walk `paths` below `root` and send.
    Send {
        /// Local source root.
        root: &'a Path,
        /// Paths below the root, `.` for the whole tree.
        paths: &'a [String],
    },
    /// Pull: receive into `dest`.
    Receive {
        /// Local destination root; must already exist.
        dest: &'a Path,
    },
}

/// Drives a connected session as the initiating client.
///
/// With `negotiate` (command-mode transports) the protocol versions are
/// exchanged first. The seed is then read, the server-to-client direction
/// switches to demultiplexing, the empty exclusion list goes out where the
/// protocol expects one, and the chosen role runs to completion.
pub fn client_session<R, W>(
    rd: R,
    wr: W,
    opts: &Options,
    role: Role<'_>,
    negotiate: bool,
) -> Result<TransferStats, ClientError>
where
    R: Read,
    W: Write + Send,
{
    let mut crd = CountingReader::new(rd);
    let read_bytes = crd.counter();
    let mut cwr = CountingWriter::new(wr);
    let written_bytes = cwr.counter();

    if negotiate {
        cwr.write_i32(PROTOCOL_VERSION)?;
        cwr.flush()?;
        let remote_protocol = crd.read_i32()?;
        tracing::debug!(remote_protocol, "negotiated");
    }

    let seed = crd.read_i32()?;
    tracing::debug!(seed, "checksum seed received");

    // Server-to-client is multiplexed from the seed onwards; our own
    // direction stays raw.
    let mut rd = DemuxReader::new(BufReader::new(crd));
    let mut wr = BufWriter::with_capacity(32 * 1024, cwr);

    match role {
        Role::Send { root, paths } => {
            if opts.delete_mode {
                send_exclusion_list(&mut wr)?;
                wr.flush()?;
            }
            let root = RootDir::open(root)?;
            let stats = run_sender(
                &mut rd,
                &mut wr,
                &root,
                paths,
                opts,
                seed,
                &read_bytes,
                &written_bytes,
            )?;
            Ok(stats)
        }
        Role::Receive { dest } => {
            send_exclusion_list(&mut wr)?;
            wr.flush()?;
            let root = RootDir::open(dest)?;
            let stats = run_receiver(&mut rd, &mut wr, &root, opts, seed)?;
            Ok(stats)
        }
    }
}
