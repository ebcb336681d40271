//! Temp-sibling files committed by atomic rename.

use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rsync_sandbox::RootDir;

/// Builds a hidden sibling name in the same directory as `dest`, so the
/// final rename never crosses a filesystem boundary.
pub(crate) fn temp_sibling(dest: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let serial = COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = OsString::from(".");
    if let Some(base) = dest.file_name() {
        name.push(base);
    }
    name.push(format!(".{}.{serial}.tmp", std::process::id()));

    match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

/// A file being reconstructed next to its final name.
///
/// The temp file is removed on drop unless [`commit`](Self::commit) renamed
/// it into place, so error and panic exits clean up after themselves.
#[derive(Debug)]
pub struct PendingFile<'a> {
    root: &'a RootDir,
    temp: PathBuf,
    dest: PathBuf,
    file: File,
    committed: bool,
}

impl<'a> PendingFile<'a> {
    /// Creates a fresh temp sibling for `dest` below `root`.
    pub fn create(root: &'a RootDir, dest: &Path) -> io::Result<Self> {
        // The serial in the name makes collisions a pathological case, but
        // retry a few times anyway rather than fail a whole transfer.
        let mut last_err = None;
        for _ in 0..3 {
            let temp = temp_sibling(dest);
            match root.create_new(&temp, 0o600) {
                Ok(file) => {
                    return Ok(Self {
                        root,
                        temp,
                        dest: dest.to_path_buf(),
                        file,
                        committed: false,
                    });
                }
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
                    last_err = Some(error);
                }
                Err(error) => return Err(error),
            }
        }
        Err(last_err.unwrap_or_else(|| io::Error::other("temp file creation failed")))
    }

    /// The open temp file handle.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// Atomically renames the temp file over the destination.
    pub fn commit(mut self) -> io::Result<()> {
        self.root.rename(&self.temp, &self.dest)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PendingFile<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.root.remove_file(&self.temp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::io::Write;

    #[test]
    fn commit_replaces_the_destination() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("target"), b"old").unwrap();
        let root = RootDir::open(dir.path()).unwrap();

        let mut pending = PendingFile::create(&root, Path::new("target")).unwrap();
        pending.file.write_all(b"new").unwrap();
        pending.commit().unwrap();

        assert_eq!(fs::read(dir.path().join("target")).unwrap(), b"new");
        // No temp litter left behind.
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn drop_without_commit_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let root = RootDir::open(dir.path()).unwrap();

        {
            let mut pending = PendingFile::create(&root, Path::new("target")).unwrap();
            pending.file.write_all(b"half").unwrap();
        }

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(!dir.path().join("target").exists());
    }

    #[test]
    fn temp_names_stay_in_the_same_directory() {
        let temp = temp_sibling(Path::new("sub/dir/file.txt"));
        assert!(temp.starts_with("sub/dir"));
        let name = temp.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".file.txt."));
        assert!(name.ends_with(".tmp"));
    }
}
