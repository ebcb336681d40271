//! Delete-before cleanup of extraneous destination files.

use std::collections::HashSet;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use rsync_flist::FileEntry;
use rsync_opts::Options;
use rsync_sandbox::RootDir;

use crate::TransferError;

/// Removes destination entries that are absent from the incoming file
/// list, scoped to the list's top-level directories.
///
/// The caller guarantees delete mode is active and the sender reported no
/// I/O errors. Children are removed before their parents. Dry-run only
/// reports what would go.
pub(crate) fn delete_extraneous(
    root: &RootDir,
    entries: &[FileEntry],
    opts: &Options,
) -> Result<(), TransferError> {
    let keep: HashSet<&[u8]> = entries.iter().map(|entry| entry.name.as_slice()).collect();

    for anchor in entries.iter().filter(|e| e.top_dir && e.is_dir()) {
        let base = anchor.name_path();
        let mut extras = Vec::new();
        match collect_extras(root, &base, &keep, &mut extras) {
            Ok(()) => {}
            // A destination that does not exist yet has nothing to delete.
            Err(error) if error.kind() == io::ErrorKind::NotFound => continue,
            Err(error) => return Err(TransferError::file(&base, error)),
        }

        for (path, is_dir) in extras {
            tracing::info!(path = %path.display(), "deleting");
            if opts.dry_run {
                continue;
            }
            let result = if is_dir {
                root.remove_dir(&path)
            } else {
                root.remove_file(&path)
            };
            result.map_err(|error| TransferError::file(&path, error))?;
        }
    }
    Ok(())
}

/// Collects extraneous paths below `dir` in post-order, children before
/// their directory.
fn collect_extras(
    root: &RootDir,
    dir: &Path,
    keep: &HashSet<&[u8]>,
    out: &mut Vec<(PathBuf, bool)>,
) -> io::Result<()> {
    for name in root.read_dir_names(dir)? {
        let path = if dir == Path::new(".") {
            PathBuf::from(&name)
        } else {
            dir.join(&name)
        };
        let stat = root.lstat(&path)?;
        let kept = keep.contains(path.as_os_str().as_bytes());

        if stat.is_dir() {
            collect_extras(root, &path, keep, out)?;
            if !kept {
                out.push((path, true));
            }
        } else if !kept {
            out.push((path, false));
        }
    }
    Ok(())
}
