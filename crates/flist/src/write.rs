//! File-list encoder.

use std::io::{self, Write};

use rsync_protocol::WireWrite;

use crate::entry::{
    FileEntry, XFLAG_LONG_NAME, XFLAG_SAME_GID, XFLAG_SAME_MODE, XFLAG_SAME_NAME, XFLAG_SAME_TIME,
    XFLAG_SAME_UID, XFLAG_TOP_DIR,
};
use crate::idmap::{write_id_map, IdMap};
use crate::FlistConfig;

/// Longest name prefix that can be inherited from the previous entry.
const MAX_INHERITED: usize = 255;

#[derive(Default)]
struct PrevState {
    name: Vec<u8>,
    mode: u32,
    uid: u32,
    gid: u32,
    mtime: i32,
}

/// Streaming encoder producing one delta-compressed record per entry.
///
/// Fields equal to the previous entry's are elided via the `SAME_*` status
/// bits; names share a byte prefix with the previous name when profitable.
#[derive(Default)]
pub struct FileListWriter {
    prev: PrevState,
}

impl FileListWriter {
    /// Creates an encoder with pristine previous-entry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes a single entry.
    pub fn write_entry<W: Write>(
        &mut self,
        out: &mut W,
        entry: &FileEntry,
        cfg: &FlistConfig,
    ) -> io::Result<()> {
        let mut flags = XFLAG_LONG_NAME;
        if entry.top_dir {
            flags |= XFLAG_TOP_DIR;
        }
        if entry.mode == self.prev.mode {
            flags |= XFLAG_SAME_MODE;
        }
        if cfg.preserve_uid && entry.uid == self.prev.uid {
            flags |= XFLAG_SAME_UID;
        }
        if cfg.preserve_gid && entry.gid == self.prev.gid {
            flags |= XFLAG_SAME_GID;
        }
        if entry.mtime == self.prev.mtime {
            flags |= XFLAG_SAME_TIME;
        }

        let inherited = shared_prefix(&self.prev.name, &entry.name).min(MAX_INHERITED);
        if inherited > 0 {
            flags |= XFLAG_SAME_NAME;
        }
        let suffix = &entry.name[inherited..];

        out.write_u8(flags)?;
        if inherited > 0 {
            out.write_u8(inherited as u8)?;
        }
        out.write_i32(suffix.len() as i32)?;
        out.write_all(suffix)?;

        out.write_i64(entry.size)?;
        if flags & XFLAG_SAME_TIME == 0 {
            out.write_i32(entry.mtime)?;
        }
        if flags & XFLAG_SAME_MODE == 0 {
            out.write_i32(entry.mode as i32)?;
        }
        if cfg.preserve_uid && flags & XFLAG_SAME_UID == 0 {
            out.write_i32(entry.uid as i32)?;
        }
        if cfg.preserve_gid && flags & XFLAG_SAME_GID == 0 {
            out.write_i32(entry.gid as i32)?;
        }

        let file_type = entry.file_type();
        let send_rdev = (cfg.preserve_devices && file_type.is_device())
            || (cfg.preserve_specials && file_type.is_special());
        if send_rdev {
            out.write_i32(entry.rdev)?;
        }

        if cfg.preserve_links && entry.is_symlink() {
            let target = entry.link_target.as_deref().unwrap_or_default();
            out.write_i32(target.len() as i32)?;
            out.write_all(target)?;
        }

        self.prev.name.clear();
        self.prev.name.extend_from_slice(&entry.name);
        self.prev.mode = entry.mode;
        self.prev.uid = entry.uid;
        self.prev.gid = entry.gid;
        self.prev.mtime = entry.mtime;

        Ok(())
    }

    /// Terminates the list: zero status byte, then the i/o-error count.
    pub fn finish<W: Write>(&mut self, out: &mut W, io_errors: i32) -> io::Result<()> {
        out.write_u8(0)?;
        out.write_i32(io_errors)
    }
}

/// Encodes a complete file list including terminator and id maps.
///
/// The id maps follow the i/o-error count and are omitted entirely under
/// `--numeric-ids`.
pub fn write_file_list<W: Write>(
    out: &mut W,
    entries: &[FileEntry],
    cfg: &FlistConfig,
    io_errors: i32,
    users: &IdMap,
    groups: &IdMap,
) -> io::Result<()> {
    let mut writer = FileListWriter::new();
    for entry in entries {
        writer.write_entry(out, entry, cfg)?;
    }
    writer.finish(out, io_errors)?;
    if !cfg.numeric_ids {
        write_id_map(out, users)?;
        write_id_map(out, groups)?;
    }
    Ok(())
}

fn shared_prefix(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_prefix_counts_common_bytes() {
        assert_eq!(shared_prefix(b"dir/a", b"dir/b"), 4);
        assert_eq!(shared_prefix(b"", b"x"), 0);
        assert_eq!(shared_prefix(b"same", b"same"), 4);
    }
}
