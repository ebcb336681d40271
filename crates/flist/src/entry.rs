//! File-list entries and the protocol-27 status byte.

use std::borrow::Cow;
use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;
use std::path::PathBuf;

/// Status-byte bit: the entry is a top-level directory, anchoring the
/// receiver's deletion scope.
pub const XFLAG_TOP_DIR: u8 = 0x01;
/// Status-byte bit: the mode repeats the previous entry's.
pub const XFLAG_SAME_MODE: u8 = 0x02;
/// Status-byte bit: the uid repeats the previous entry's.
pub const XFLAG_SAME_UID: u8 = 0x08;
/// Status-byte bit: the gid repeats the previous entry's.
pub const XFLAG_SAME_GID: u8 = 0x10;
/// Status-byte bit: the name shares a prefix with the previous entry's.
pub const XFLAG_SAME_NAME: u8 = 0x20;
/// Status-byte bit: the name length is a four-byte integer.
///
/// Always set by this implementation, like openrsync, so a live entry's
/// status byte can never be mistaken for the `0x00` list terminator.
pub const XFLAG_LONG_NAME: u8 = 0x40;
/// Status-byte bit: the mtime repeats the previous entry's.
pub const XFLAG_SAME_TIME: u8 = 0x80;

const S_IFMT: u32 = 0o170000;

/// Filesystem object kind extracted from the mode bits.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum FileType {
    /// Regular file.
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Unix domain socket.
    Socket,
}

impl FileType {
    /// Extracts the type from combined unix mode bits.
    #[must_use]
    pub const fn from_mode(mode: u32) -> Option<Self> {
        match mode & S_IFMT {
            0o100000 => Some(Self::Regular),
            0o040000 => Some(Self::Directory),
            0o120000 => Some(Self::Symlink),
            0o020000 => Some(Self::CharDevice),
            0o060000 => Some(Self::BlockDevice),
            0o010000 => Some(Self::Fifo),
            0o140000 => Some(Self::Socket),
            _ => None,
        }
    }

    /// Returns `true` for block and character devices.
    #[must_use]
    pub const fn is_device(self) -> bool {
        matches!(self, Self::CharDevice | Self::BlockDevice)
    }

    /// Returns `true` for fifos and sockets.
    #[must_use]
    pub const fn is_special(self) -> bool {
        matches!(self, Self::Fifo | Self::Socket)
    }
}

/// One record of the file list.
///
/// `name` is the slash-separated path relative to the transfer root, stored
/// as raw bytes because unix names are not guaranteed to be UTF-8. Indices
/// into the list are assigned in transmission order and are how both peers
/// address files for the rest of the session.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileEntry {
    /// Relative name, slash-separated, no trailing slash.
    pub name: Vec<u8>,
    /// File length in bytes.
    pub size: i64,
    /// Modification time, seconds since the epoch, 32-bit on the wire.
    pub mtime: i32,
    /// Combined unix mode and file-type bits.
    pub mode: u32,
    /// Owner id; meaningful only when owners are preserved.
    pub uid: u32,
    /// Group id; meaningful only when groups are preserved.
    pub gid: u32,
    /// Device number for device/special entries.
    pub rdev: i32,
    /// Symlink target, present for symlinks when links are preserved.
    pub link_target: Option<Vec<u8>>,
    /// Whether this entry anchors the deletion scope.
    pub top_dir: bool,
}

impl FileEntry {
    /// Returns the entry's file type, treating unknown bits as regular.
    #[must_use]
    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode).unwrap_or(FileType::Regular)
    }

    /// Returns `true` for directories.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == 0o040000
    }

    /// Returns `true` for regular files.
    #[must_use]
    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == 0o100000
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub fn is_symlink(&self) -> bool {
        self.mode & S_IFMT == 0o120000
    }

    /// Returns the permission bits without the type.
    #[must_use]
    pub const fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }

    /// Returns the name as a relative [`PathBuf`].
    #[must_use]
    pub fn name_path(&self) -> PathBuf {
        PathBuf::from(OsString::from_vec(self.name.clone()))
    }

    /// Returns the name for diagnostics, replacing invalid UTF-8.
    #[must_use]
    pub fn name_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Returns `true` for the `.` sentinel entry.
    #[must_use]
    pub fn is_dot(&self) -> bool {
        self.name == b"."
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_from_mode_bits() {
        assert_eq!(FileType::from_mode(0o100644), Some(FileType::Regular));
        assert_eq!(FileType::from_mode(0o040755), Some(FileType::Directory));
        assert_eq!(FileType::from_mode(0o120777), Some(FileType::Symlink));
        assert_eq!(FileType::from_mode(0o010644), Some(FileType::Fifo));
        assert_eq!(FileType::from_mode(0o000644), None);
    }

    #[test]
    fn permissions_mask_out_the_type() {
        let entry = FileEntry {
            name: b"hello".to_vec(),
            size: 5,
            mtime: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            rdev: 0,
            link_target: None,
            top_dir: false,
        };
        assert_eq!(entry.permissions(), 0o644);
        assert!(entry.is_regular());
        assert!(!entry.is_dir());
    }
}
