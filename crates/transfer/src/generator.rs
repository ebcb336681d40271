//! The generator task: plan the transfer and emit block signatures.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use rsync_engine::SignatureTable;
use rsync_flist::{FileEntry, FileType};
use rsync_opts::Options;
use rsync_protocol::{WireWrite, PHASE_END};
use rsync_sandbox::RootDir;

use crate::attrs::{self, IdRemap};
use crate::pending::temp_sibling;
use crate::TransferError;

/// A directory whose permissions and mtime are applied after the transfer,
/// once no more children will be written into it.
#[derive(Debug)]
pub(crate) struct DeferredDir {
    pub(crate) entry: FileEntry,
}

/// Walks the file list in order, creating directories, repairing symlinks
/// and specials, and emitting `index + signature table` for every regular
/// file that needs data. Ends each of the two phases with `-1`.
pub(crate) fn run_generator<W: Write>(
    wr: &mut W,
    root: &RootDir,
    entries: &[FileEntry],
    opts: &Options,
    seed: i32,
    remap: &IdRemap,
    cancel: &AtomicBool,
) -> Result<Vec<DeferredDir>, TransferError> {
    let mut deferred = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err(TransferError::Protocol("transfer cancelled".to_owned()));
        }

        match entry.file_type() {
            FileType::Directory => plan_directory(root, entry, opts, &mut deferred)?,
            FileType::Symlink => plan_symlink(root, entry, opts, remap)?,
            FileType::CharDevice | FileType::BlockDevice | FileType::Fifo | FileType::Socket => {
                plan_special(root, entry, opts)?;
            }
            FileType::Regular => plan_regular(wr, root, index, entry, opts, seed, remap)?,
        }
    }

    wr.write_i32(PHASE_END)?;
    wr.flush()?;
    tracing::debug!("generator finished phase 0");

    // The redo phase exists in the protocol but is never populated:
    // checksum mismatches abort instead of being retried.
    wr.write_i32(PHASE_END)?;
    wr.flush()?;
    Ok(deferred)
}

fn plan_directory(
    root: &RootDir,
    entry: &FileEntry,
    opts: &Options,
    deferred: &mut Vec<DeferredDir>,
) -> Result<(), TransferError> {
    let name = entry.name_path();
    match root.lstat(&name) {
        Ok(existing) if existing.is_dir() => {}
        Ok(_) => {
            // Something non-directory is in the way.
            if !opts.dry_run {
                root.remove_file(&name)
                    .map_err(|error| TransferError::file(&name, error))?;
                create_dir(root, &name, entry)?;
            }
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            if !opts.dry_run {
                create_dir(root, &name, entry)?;
            } else {
                tracing::info!(dir = %entry.name_lossy(), "(dry run) would create directory");
            }
        }
        Err(error) => return Err(TransferError::file(&name, error)),
    }

    if !opts.dry_run && (opts.preserve_perms || opts.preserve_mtimes) && !entry.is_dot() {
        deferred.push(DeferredDir {
            entry: entry.clone(),
        });
    }
    Ok(())
}

fn create_dir(root: &RootDir, name: &Path, entry: &FileEntry) -> Result<(), TransferError> {
    // Created writable for the duration of the transfer; the exact bits are
    // applied afterwards, deepest first.
    root.create_dir(name, entry.permissions() | 0o700)
        .map_err(|error| TransferError::file(name, error))
}

fn plan_symlink(
    root: &RootDir,
    entry: &FileEntry,
    opts: &Options,
    remap: &IdRemap,
) -> Result<(), TransferError> {
    let Some(target) = entry.link_target.as_deref() else {
        return Ok(());
    };
    let name = entry.name_path();

    if let Ok(existing) = root.read_link(&name) {
        if existing == target {
            attrs::apply_to_symlink(root, &name, entry, opts, remap)
                .map_err(|error| TransferError::file(&name, error))?;
            return Ok(());
        }
    }
    if opts.dry_run {
        tracing::info!(link = %entry.name_lossy(), "(dry run) would update symlink");
        return Ok(());
    }

    // Directories cannot be renamed over; anything else can.
    if let Ok(existing) = root.lstat(&name) {
        if existing.is_dir() {
            root.remove_dir(&name)
                .map_err(|error| TransferError::file(&name, error))?;
        }
    }

    let target_os: OsString = {
        use std::os::unix::ffi::OsStringExt;
        OsString::from_vec(target.to_vec())
    };
    let temp = temp_sibling(&name);
    root.symlink(&target_os, &temp)
        .and_then(|()| root.rename(&temp, &name))
        .map_err(|error| TransferError::file(&name, error))?;
    attrs::apply_to_symlink(root, &name, entry, opts, remap)
        .map_err(|error| TransferError::file(&name, error))?;

    tracing::debug!(link = %entry.name_lossy(), "symlink updated");
    Ok(())
}

fn plan_special(root: &RootDir, entry: &FileEntry, opts: &Options) -> Result<(), TransferError> {
    let name = entry.name_path();
    match root.lstat(&name) {
        Ok(existing)
            if existing.mode & 0o170000 == entry.mode & 0o170000
                && existing.rdev == entry.rdev as u64 =>
        {
            return Ok(());
        }
        Ok(existing) => {
            if !opts.dry_run {
                let result = if existing.is_dir() {
                    root.remove_dir(&name)
                } else {
                    root.remove_file(&name)
                };
                result.map_err(|error| TransferError::file(&name, error))?;
            }
        }
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
        Err(error) => return Err(TransferError::file(&name, error)),
    }

    if opts.dry_run {
        tracing::info!(special = %entry.name_lossy(), "(dry run) would create special file");
        return Ok(());
    }
    root.mknod(&name, entry.mode, entry.rdev as u64)
        .map_err(|error| TransferError::file(&name, error))
}

fn plan_regular<W: Write>(
    wr: &mut W,
    root: &RootDir,
    index: usize,
    entry: &FileEntry,
    opts: &Options,
    seed: i32,
    remap: &IdRemap,
) -> Result<(), TransferError> {
    let name = entry.name_path();
    let existing = match root.lstat(&name) {
        Ok(stat) => Some(stat),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => None,
        Err(error) => return Err(TransferError::file(&name, error)),
    };

    if let Some(stat) = &existing {
        let unchanged = stat.is_regular()
            && stat.size == entry.size
            && stat.mtime == i64::from(entry.mtime);
        if unchanged && !opts.checksum {
            if !opts.dry_run {
                attrs::tweak_existing(root, &name, entry, stat, opts, remap)
                    .map_err(|error| TransferError::file(&name, error))?;
            }
            tracing::debug!(file = %entry.name_lossy(), "up to date");
            return Ok(());
        }
    }

    if opts.dry_run {
        tracing::info!(file = %entry.name_lossy(), "(dry run) would transfer");
        return Ok(());
    }

    let table = signature_for_basis(root, &name, existing.as_ref(), opts, seed);
    wr.write_i32(index as i32)?;
    table.write_to(wr)?;
    wr.flush()?;
    Ok(())
}

/// Builds the signature table for the local basis, or the empty table when
/// there is no usable basis or whole-file mode is forced.
fn signature_for_basis(
    root: &RootDir,
    name: &Path,
    existing: Option<&rsync_sandbox::EntryStat>,
    opts: &Options,
    seed: i32,
) -> SignatureTable {
    if opts.whole_file {
        return SignatureTable::empty();
    }
    if !existing.is_some_and(rsync_sandbox::EntryStat::is_regular) {
        return SignatureTable::empty();
    }

    let mut basis = Vec::new();
    match root
        .open_read(name)
        .and_then(|mut file| file.read_to_end(&mut basis))
    {
        Ok(_) => SignatureTable::build(&basis, seed),
        Err(error) => {
            // An unreadable basis degrades to a whole-file transfer.
            tracing::warn!(path = %name.display(), %error, "basis unreadable, sending whole file");
            SignatureTable::empty()
        }
    }
}
