//! The receiving side: generator and receiver tasks over one connection.

use std::io::{BufWriter, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use rsync_engine::{receive_delta, EngineError};
use rsync_flist::{read_file_list, FileEntry, FileList};
use rsync_opts::Options;
use rsync_protocol::{SumHead, TransferStats, WireRead, WireWrite, PHASE_END};
use rsync_sandbox::RootDir;

use crate::attrs::{self, IdRemap};
use crate::delete::delete_extraneous;
use crate::generator::{run_generator, DeferredDir};
use crate::pending::PendingFile;
use crate::{flist_config, TransferError};

/// Runs the receiver half of a transfer.
///
/// Reads the file list, performs delete-before cleanup, then runs the
/// generator and the receiver task concurrently: the generator owns the
/// outbound direction while the receiver task drains indices and token
/// streams from the inbound one. Whichever fails first flags the shared
/// cancel token; the first error wins. Afterwards the sender's statistics
/// are read, the goodbye is sent and deferred directory attributes are
/// applied deepest-first.
pub fn run_receiver<R, W>(
    rd: &mut R,
    wr: &mut W,
    root: &RootDir,
    opts: &Options,
    seed: i32,
) -> Result<TransferStats, TransferError>
where
    R: Read,
    W: Write + Send,
{
    if opts.preserve_hard_links {
        return Err(TransferError::HardLinksUnsupported);
    }

    let cfg = flist_config(opts);
    let list = read_file_list(rd, &cfg)?;
    let remap = IdRemap::from_list(&list);

    if opts.delete_mode {
        if list.io_errors != 0 {
            tracing::warn!(
                io_errors = list.io_errors,
                "sender reported I/O errors, skipping deletion"
            );
        } else {
            delete_extraneous(root, &list.entries, opts)?;
        }
    }

    let cancel = AtomicBool::new(false);
    let mut generator_result: Result<Vec<DeferredDir>, TransferError> = Ok(Vec::new());
    let mut receive_result: Result<(), TransferError> = Ok(());

    std::thread::scope(|scope| {
        let generator = scope.spawn(|| {
            let result = run_generator(&mut *wr, root, &list.entries, opts, seed, &remap, &cancel);
            if result.is_err() {
                cancel.store(true, Ordering::Relaxed);
            }
            result
        });

        receive_result = receive_files(rd, root, &list, opts, seed, &remap, &cancel);
        if receive_result.is_err() {
            cancel.store(true, Ordering::Relaxed);
        }

        generator_result = generator
            .join()
            .unwrap_or_else(|_| Err(TransferError::Protocol("generator task panicked".into())));
    });

    receive_result?;
    let deferred = generator_result?;

    // End-of-sequence marker, then the sender's statistics.
    let marker = rd.read_i32()?;
    if marker != PHASE_END {
        return Err(TransferError::Protocol(format!(
            "expected end marker -1, got {marker}"
        )));
    }
    let stats = TransferStats::read_from(rd)?;
    tracing::debug!(
        read = stats.read,
        written = stats.written,
        size = stats.size,
        "sender statistics"
    );

    wr.write_i32(PHASE_END)?;
    wr.flush()?;

    apply_deferred(root, deferred, opts, &remap)?;
    Ok(stats)
}

/// The receiver task: drain indices and token streams until both phases
/// are acknowledged.
fn receive_files<R: Read>(
    rd: &mut R,
    root: &RootDir,
    list: &FileList,
    opts: &Options,
    seed: i32,
    remap: &IdRemap,
    cancel: &AtomicBool,
) -> Result<(), TransferError> {
    let mut phase = 0;
    while phase < 2 {
        if cancel.load(Ordering::Relaxed) {
            return Err(TransferError::Protocol("transfer cancelled".to_owned()));
        }

        let index = rd.read_i32()?;
        if index == PHASE_END {
            phase += 1;
            tracing::debug!(phase, "receiver phase change");
            continue;
        }

        let entry = usize::try_from(index)
            .ok()
            .and_then(|index| list.entries.get(index))
            .ok_or_else(|| {
                TransferError::Protocol(format!("file index {index} outside the file list"))
            })?;
        receive_file(rd, root, entry, opts, seed, remap)?;
    }
    Ok(())
}

fn receive_file<R: Read>(
    rd: &mut R,
    root: &RootDir,
    entry: &FileEntry,
    opts: &Options,
    seed: i32,
    remap: &IdRemap,
) -> Result<(), TransferError> {
    let name = entry.name_path();
    tracing::debug!(file = %entry.name_lossy(), "receiving");

    let head = SumHead::read_from(rd)?;
    let existing = root.lstat(&name).ok();
    let basis = match &existing {
        Some(stat) if stat.is_regular() => root.open_read(&name).ok(),
        _ => None,
    };

    let pending =
        PendingFile::create(root, &name).map_err(|error| TransferError::file(&name, error))?;
    let mut out = BufWriter::new(pending.file());
    receive_delta(rd, &mut out, &head, basis.as_ref(), seed).map_err(|error| match error {
        EngineError::SumMismatch => TransferError::Integrity {
            name: entry.name_lossy().into_owned(),
        },
        EngineError::Io(error) => TransferError::Io(error),
        other => TransferError::Protocol(other.to_string()),
    })?;
    out.flush()?;
    drop(out);

    // When not preserving permissions, an existing file keeps its bits, as
    // though the remote had sent them.
    let mode = match &existing {
        Some(stat) if !opts.preserve_perms && stat.is_regular() => stat.mode & 0o7777,
        _ => entry.permissions(),
    };
    attrs::apply_to_open_file(pending.file(), entry, mode, opts, remap)
        .map_err(|error| TransferError::file(&name, error))?;
    pending
        .commit()
        .map_err(|error| TransferError::file(&name, error))?;
    Ok(())
}

fn apply_deferred(
    root: &RootDir,
    mut deferred: Vec<DeferredDir>,
    opts: &Options,
    remap: &IdRemap,
) -> Result<(), TransferError> {
    // Deepest directories first, so parent mtimes are not disturbed again.
    deferred.sort_by_key(|dir| std::cmp::Reverse(dir.entry.name.iter().filter(|&&b| b == b'/').count()));
    for dir in deferred {
        let name = dir.entry.name_path();
        attrs::apply_to_directory(root, &name, &dir.entry, opts, remap)
            .map_err(|error| TransferError::file(&name, error))?;
    }
    Ok(())
}
