//! Sandboxed path resolution against a transfer root.
//!
//! Every filesystem access the sender and receiver perform for peer-named
//! paths goes through [`RootDir`], which guarantees that resolution can
//! never leave the root, even when the tree already contains hostile
//! symlinks. On Linux, reads take the `openat2(RESOLVE_BENEATH)` fast path
//! (in-root symlinks still work, anything pointing outside fails); on older
//! kernels and for all mutating operations, paths are resolved one
//! component at a time with `O_NOFOLLOW`, so a symlink can never smuggle a
//! `stat`+`open` race past the root boundary.

use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io;
use std::os::fd::{AsFd, OwnedFd};
use std::path::{Component, Path, PathBuf};

use rustix::fs::{AtFlags, Gid, Mode, OFlags, Uid};

const S_IFMT: u32 = 0o170000;

/// Metadata for an entry below the root, from `fstatat` without following.
#[derive(Clone, Copy, Debug)]
pub struct EntryStat {
    /// Combined mode and file-type bits.
    pub mode: u32,
    /// Size in bytes.
    pub size: i64,
    /// Modification time, seconds since the epoch.
    pub mtime: i64,
    /// Owner id.
    pub uid: u32,
    /// Group id.
    pub gid: u32,
    /// Device number for device nodes.
    pub rdev: u64,
}

impl EntryStat {
    /// Returns `true` for directories.
    #[must_use]
    pub const fn is_dir(&self) -> bool {
        self.mode & S_IFMT == 0o040000
    }

    /// Returns `true` for regular files.
    #[must_use]
    pub const fn is_regular(&self) -> bool {
        self.mode & S_IFMT == 0o100000
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub const fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == 0o120000
    }
}

fn stat_of(stat: rustix::fs::Stat) -> EntryStat {
    EntryStat {
        mode: stat.st_mode as u32,
        size: stat.st_size as i64,
        mtime: stat.st_mtime as i64,
        uid: stat.st_uid,
        gid: stat.st_gid,
        rdev: stat.st_rdev as u64,
    }
}

fn escape_error(name: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("path {:?} escapes the transfer root", name),
    )
}

/// A directory handle all sandboxed operations are anchored to.
#[derive(Debug)]
pub struct RootDir {
    fd: OwnedFd,
    path: PathBuf,
}

impl RootDir {
    /// Opens `path` as a transfer root.
    ///
    /// The root itself is trusted and may be (or traverse) symlinks; the
    /// confinement applies to names resolved below it afterwards.
    pub fn open(path: &Path) -> io::Result<Self> {
        let fd = rustix::fs::open(
            path,
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )?;
        Ok(Self {
            fd,
            path: path.to_path_buf(),
        })
    }

    /// Returns the path the root was opened from, for diagnostics.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolves the directory containing `name`, component by component,
    /// and returns it together with the final path component.
    ///
    /// Intermediate components are opened `O_DIRECTORY | O_NOFOLLOW`, so a
    /// symlink anywhere along the way fails the resolution instead of
    /// redirecting it.
    fn parent_of(&self, name: &Path) -> io::Result<(OwnedFd, OsString)> {
        let mut components = Vec::new();
        for component in name.components() {
            match component {
                Component::Normal(part) => components.push(part.to_os_string()),
                Component::CurDir => {}
                _ => return Err(escape_error(name)),
            }
        }
        let Some(last) = components.pop() else {
            return Err(escape_error(name));
        };

        let mut dir = self.fd.try_clone()?;
        for part in &components {
            dir = rustix::fs::openat(
                &dir,
                part.as_os_str(),
                OFlags::RDONLY | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
                Mode::empty(),
            )?;
        }
        Ok((dir, last))
    }

    #[cfg(target_os = "linux")]
    fn openat2_read(&self, name: &Path) -> Option<io::Result<OwnedFd>> {
        use std::sync::atomic::{AtomicBool, Ordering};

        use rustix::fs::ResolveFlags;

        static SUPPORTED: AtomicBool = AtomicBool::new(true);
        if !SUPPORTED.load(Ordering::Relaxed) {
            return None;
        }
        match rustix::fs::openat2(
            &self.fd,
            name,
            OFlags::RDONLY | OFlags::CLOEXEC,
            Mode::empty(),
            ResolveFlags::BENEATH | ResolveFlags::NO_MAGICLINKS,
        ) {
            Err(rustix::io::Errno::NOSYS) => {
                SUPPORTED.store(false, Ordering::Relaxed);
                None
            }
            Ok(fd) => Some(Ok(fd)),
            Err(errno) => Some(Err(errno.into())),
        }
    }

    /// Opens `name` for reading.
    ///
    /// On Linux this uses `openat2(RESOLVE_BENEATH)`, which follows
    /// symlinks only while they stay below the root. The fallback resolves
    /// per component with `O_NOFOLLOW`, which additionally refuses a
    /// symlink as the final component.
    pub fn open_read(&self, name: &Path) -> io::Result<File> {
        if name == Path::new(".") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "cannot open the root itself as a file",
            ));
        }

        #[cfg(target_os = "linux")]
        if let Some(result) = self.openat2_read(name) {
            return result.map(File::from);
        }

        let (dir, last) = self.parent_of(name)?;
        let fd = rustix::fs::openat(
            &dir,
            last.as_os_str(),
            OFlags::RDONLY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
            Mode::empty(),
        )?;
        Ok(File::from(fd))
    }

    /// Creates `name` exclusively for writing with the given permissions.
    pub fn create_new(&self, name: &Path, mode: u32) -> io::Result<File> {
        let (dir, last) = self.parent_of(name)?;
        let fd = rustix::fs::openat(
            &dir,
            last.as_os_str(),
            OFlags::WRONLY | OFlags::CREATE | OFlags::EXCL | OFlags::NOFOLLOW | OFlags::CLOEXEC,
            Mode::from_bits_truncate(mode),
        )?;
        Ok(File::from(fd))
    }

    /// Stats `name` without following a final symlink.
    pub fn lstat(&self, name: &Path) -> io::Result<EntryStat> {
        if name == Path::new(".") {
            return Ok(stat_of(rustix::fs::fstat(&self.fd)?));
        }
        let (dir, last) = self.parent_of(name)?;
        let stat = rustix::fs::statat(&dir, last.as_os_str(), AtFlags::SYMLINK_NOFOLLOW)?;
        Ok(stat_of(stat))
    }

    /// Reads the target of the symlink at `name`.
    pub fn read_link(&self, name: &Path) -> io::Result<Vec<u8>> {
        let (dir, last) = self.parent_of(name)?;
        let target = rustix::fs::readlinkat(&dir, last.as_os_str(), Vec::new())?;
        Ok(target.into_bytes())
    }

    /// Creates the directory `name`.
    pub fn create_dir(&self, name: &Path, mode: u32) -> io::Result<()> {
        if name == Path::new(".") {
            return Ok(());
        }
        let (dir, last) = self.parent_of(name)?;
        rustix::fs::mkdirat(&dir, last.as_os_str(), Mode::from_bits_truncate(mode))?;
        Ok(())
    }

    /// Creates a symlink at `name` pointing at `target`.
    pub fn symlink(&self, target: &OsStr, name: &Path) -> io::Result<()> {
        let (dir, last) = self.parent_of(name)?;
        rustix::fs::symlinkat(target, &dir, last.as_os_str())?;
        Ok(())
    }

    /// Renames `from` to `to`, both below the root.
    pub fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let (from_dir, from_last) = self.parent_of(from)?;
        let (to_dir, to_last) = self.parent_of(to)?;
        rustix::fs::renameat(&from_dir, from_last.as_os_str(), &to_dir, to_last.as_os_str())?;
        Ok(())
    }

    /// Removes the non-directory entry at `name`.
    pub fn remove_file(&self, name: &Path) -> io::Result<()> {
        let (dir, last) = self.parent_of(name)?;
        rustix::fs::unlinkat(&dir, last.as_os_str(), AtFlags::empty())?;
        Ok(())
    }

    /// Removes the directory at `name`.
    pub fn remove_dir(&self, name: &Path) -> io::Result<()> {
        let (dir, last) = self.parent_of(name)?;
        rustix::fs::unlinkat(&dir, last.as_os_str(), AtFlags::REMOVEDIR)?;
        Ok(())
    }

    /// Applies permission bits to `name`.
    ///
    /// Callers must have established that `name` is not a hostile symlink
    /// (the flows here chmod only entries they created or just verified).
    pub fn set_mode(&self, name: &Path, mode: u32) -> io::Result<()> {
        if name == Path::new(".") {
            rustix::fs::fchmod(&self.fd, Mode::from_bits_truncate(mode))?;
            return Ok(());
        }
        let (dir, last) = self.parent_of(name)?;
        rustix::fs::chmodat(
            &dir,
            last.as_os_str(),
            Mode::from_bits_truncate(mode),
            AtFlags::empty(),
        )?;
        Ok(())
    }

    /// Changes ownership of `name` without following a final symlink.
    pub fn set_owner(&self, name: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        let (dir, last) = self.parent_of(name)?;
        rustix::fs::chownat(
            &dir,
            last.as_os_str(),
            uid.map(Uid::from_raw),
            gid.map(Gid::from_raw),
            AtFlags::SYMLINK_NOFOLLOW,
        )?;
        Ok(())
    }

    /// Creates a device or special node at `name`.
    pub fn mknod(&self, name: &Path, mode: u32, rdev: u64) -> io::Result<()> {
        let (dir, last) = self.parent_of(name)?;
        rustix::fs::mknodat(
            &dir,
            last.as_os_str(),
            rustix::fs::FileType::from_raw_mode(mode),
            Mode::from_bits_truncate(mode),
            rdev,
        )?;
        Ok(())
    }

    /// Opens the directory at `name` below the root.
    pub fn open_dir(&self, name: &Path) -> io::Result<OwnedFd> {
        if name == Path::new(".") {
            return Ok(self.fd.try_clone()?);
        }
        let (dir, last) = self.parent_of(name)?;
        Ok(rustix::fs::openat(
            &dir,
            last.as_os_str(),
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::NOFOLLOW | OFlags::CLOEXEC,
            Mode::empty(),
        )?)
    }

    /// Lists the names in the directory at `name`, sorted.
    pub fn read_dir_names(&self, name: &Path) -> io::Result<Vec<OsString>> {
        use std::os::unix::ffi::OsStringExt;

        let dir = self.open_dir(name)?;
        let mut names = Vec::new();
        for entry in rustix::fs::Dir::read_from(dir.as_fd())? {
            let entry = entry?;
            let bytes = entry.file_name().to_bytes();
            if bytes != b"." && bytes != b".." {
                names.push(OsString::from_vec(bytes.to_vec()));
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::io::{Read, Write};
    use std::os::unix::fs::symlink;

    fn root_with_file() -> (tempfile::TempDir, RootDir) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello"), b"world").unwrap();
        let root = RootDir::open(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn reads_stay_inside_the_root() {
        let (_dir, root) = root_with_file();
        let mut content = String::new();
        root.open_read(Path::new("hello"))
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "world");
    }

    #[test]
    fn parent_components_are_rejected() {
        let (_dir, root) = root_with_file();
        assert!(root.open_read(Path::new("../hello")).is_err());
        assert!(root.lstat(Path::new("a/../../b")).is_err());
        assert!(root.create_new(Path::new("../evil"), 0o644).is_err());
    }

    #[test]
    fn absolute_symlink_does_not_escape() {
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret"), b"secret").unwrap();

        let dir = tempfile::tempdir().unwrap();
        symlink(outside.path().join("secret"), dir.path().join("leak")).unwrap();
        let root = RootDir::open(dir.path()).unwrap();

        assert!(root.open_read(Path::new("leak")).is_err());
    }

    #[test]
    fn symlinked_directory_does_not_redirect_writes() {
        let outside = tempfile::tempdir().unwrap();

        let dir = tempfile::tempdir().unwrap();
        symlink(outside.path(), dir.path().join("sub")).unwrap();
        let root = RootDir::open(dir.path()).unwrap();

        assert!(root.create_new(Path::new("sub/planted"), 0o644).is_err());
        assert!(!outside.path().join("planted").exists());
    }

    #[test]
    fn create_write_rename_cycle() {
        let (dir, root) = root_with_file();

        let mut file = root.create_new(Path::new(".hello.tmp"), 0o600).unwrap();
        file.write_all(b"replacement").unwrap();
        drop(file);

        root.rename(Path::new(".hello.tmp"), Path::new("hello"))
            .unwrap();
        assert_eq!(fs::read(dir.path().join("hello")).unwrap(), b"replacement");
    }

    #[test]
    fn lstat_reports_symlinks_without_following() {
        let (dir, root) = root_with_file();
        symlink("hello", dir.path().join("hey")).unwrap();

        let stat = root.lstat(Path::new("hey")).unwrap();
        assert!(stat.is_symlink());
        assert_eq!(root.read_link(Path::new("hey")).unwrap(), b"hello");
    }

    #[test]
    fn dot_names_the_root_itself() {
        let (_dir, root) = root_with_file();
        assert!(root.lstat(Path::new(".")).unwrap().is_dir());
        assert!(root.open_read(Path::new(".")).is_err());
    }

    #[test]
    fn read_dir_names_is_sorted() {
        let (dir, root) = root_with_file();
        fs::write(dir.path().join("alpha"), b"").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();

        let names = root.read_dir_names(Path::new(".")).unwrap();
        assert_eq!(names, ["alpha", "hello", "zeta"]);
    }

    #[test]
    fn mkdir_and_remove() {
        let (dir, root) = root_with_file();
        root.create_dir(Path::new("sub"), 0o755).unwrap();
        assert!(dir.path().join("sub").is_dir());
        root.remove_dir(Path::new("sub")).unwrap();
        assert!(!dir.path().join("sub").exists());
    }
}
