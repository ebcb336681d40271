//! The sending side: emit the file list, answer index requests.

use std::io::{Read, Write};

use rsync_engine::{send_delta, SignatureTable};
use rsync_flist::{build_file_list, id_maps_for, write_file_list, FileEntry};
use rsync_opts::Options;
use rsync_protocol::{ByteCounter, SumHead, TransferStats, WireRead, WireWrite, PHASE_END};
use rsync_sandbox::RootDir;

use crate::{flist_config, TransferError};

/// Runs the sender half of a transfer.
///
/// Walks `paths` below `root`, ships the file list, then serves the index
/// request loop: each request arrives with the receiver's signature table,
/// and is answered with the index, an echo of the sum head and the token
/// stream. Phases end on `-1`, which is acknowledged; the unused redo
/// phase follows and ends the same way. The three-integer statistics block
/// and the goodbye handshake close the session.
pub fn run_sender<R: Read, W: Write>(
    rd: &mut R,
    wr: &mut W,
    root: &RootDir,
    paths: &[String],
    opts: &Options,
    seed: i32,
    read_bytes: &ByteCounter,
    written_bytes: &ByteCounter,
) -> Result<TransferStats, TransferError> {
    let cfg = flist_config(opts);
    let list = build_file_list(root.path(), paths, opts.recurse, &cfg);
    let (users, groups) = id_maps_for(&list.entries, &cfg);
    write_file_list(wr, &list.entries, &cfg, list.io_errors, &users, &groups)?;
    wr.flush()?;

    let total_size: i64 = list
        .entries
        .iter()
        .filter(|entry| entry.is_regular())
        .map(|entry| entry.size)
        .sum();

    let mut phase = 0;
    while phase < 2 {
        let index = rd.read_i32()?;
        if index == PHASE_END {
            wr.write_i32(PHASE_END)?;
            wr.flush()?;
            phase += 1;
            tracing::debug!(phase, "sender phase change");
            continue;
        }

        let entry = usize::try_from(index)
            .ok()
            .and_then(|index| list.entries.get(index))
            .ok_or_else(|| {
                TransferError::Protocol(format!("file index {index} outside the file list"))
            })?;
        let head = SumHead::read_from(rd)?;
        let table = SignatureTable::read_from(rd, head)?;
        serve_file(wr, root, index, entry, &table, seed)?;
        wr.flush()?;
    }

    wr.write_i32(PHASE_END)?;
    wr.flush()?;
    let stats = TransferStats {
        read: read_bytes.get() as i64,
        written: written_bytes.get() as i64,
        size: total_size,
    };
    stats.write_to(wr)?;
    wr.flush()?;

    let goodbye = rd.read_i32()?;
    if goodbye != PHASE_END {
        return Err(TransferError::Protocol(format!(
            "expected goodbye -1, got {goodbye}"
        )));
    }
    Ok(stats)
}

fn serve_file<W: Write>(
    wr: &mut W,
    root: &RootDir,
    index: i32,
    entry: &FileEntry,
    table: &SignatureTable,
    seed: i32,
) -> Result<(), TransferError> {
    let name = entry.name_path();
    tracing::debug!(file = %entry.name_lossy(), index, "serving file");

    let mut source = Vec::new();
    root.open_read(&name)
        .and_then(|mut file| file.read_to_end(&mut source))
        .map_err(|error| TransferError::file(&name, error))?;

    wr.write_i32(index)?;
    table.head.write_to(wr)?;
    send_delta(wr, &source, table, seed)?;
    Ok(())
}
