//! File-list decoder.

use std::io::Read;

use rsync_protocol::WireRead;

use crate::entry::{
    FileEntry, FileType, XFLAG_LONG_NAME, XFLAG_SAME_GID, XFLAG_SAME_MODE, XFLAG_SAME_NAME,
    XFLAG_SAME_TIME, XFLAG_SAME_UID, XFLAG_TOP_DIR,
};
use crate::idmap::{read_id_map, IdMap};
use crate::name::validate_name;
use crate::{FlistConfig, FlistError, MAX_NAME_LENGTH};

/// A fully decoded file list with its trailing metadata.
#[derive(Debug, Default)]
pub struct FileList {
    /// Entries in transmission order; indices on the wire refer to this.
    pub entries: Vec<FileEntry>,
    /// Sender-side i/o-error count; non-zero suppresses deletion.
    pub io_errors: i32,
    /// uid → name map, empty under `--numeric-ids`.
    pub users: IdMap,
    /// gid → name map, empty under `--numeric-ids`.
    pub groups: IdMap,
}

/// Streaming decoder mirroring [`FileListWriter`](crate::FileListWriter).
#[derive(Default)]
pub struct FileListReader {
    prev_name: Vec<u8>,
    prev_mode: u32,
    prev_uid: u32,
    prev_gid: u32,
    prev_mtime: i32,
}

impl FileListReader {
    /// Creates a decoder with pristine previous-entry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes the next entry, or `None` at the list terminator.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors, malformed length fields and unsafe names.
    pub fn read_entry<R: Read>(
        &mut self,
        rd: &mut R,
        cfg: &FlistConfig,
    ) -> Result<Option<FileEntry>, FlistError> {
        let flags = rd.read_u8()?;
        if flags == 0 {
            return Ok(None);
        }

        let inherited = if flags & XFLAG_SAME_NAME != 0 {
            usize::from(rd.read_u8()?)
        } else {
            0
        };
        if inherited > self.prev_name.len() {
            return Err(FlistError::BadInheritedLength {
                inherited,
                prev: self.prev_name.len(),
            });
        }

        let suffix_len = if flags & XFLAG_LONG_NAME != 0 {
            let len = rd.read_i32()?;
            usize::try_from(len).map_err(|_| FlistError::BadLength {
                what: "name",
                len: i64::from(len),
            })?
        } else {
            usize::from(rd.read_u8()?)
        };
        if inherited + suffix_len > MAX_NAME_LENGTH {
            return Err(FlistError::BadLength {
                what: "name",
                len: (inherited + suffix_len) as i64,
            });
        }

        let mut name = Vec::with_capacity(inherited + suffix_len);
        name.extend_from_slice(&self.prev_name[..inherited]);
        name.extend_from_slice(&rd.read_bytes(suffix_len)?);
        validate_name(&name)?;

        let size = rd.read_i64()?;
        if size < 0 {
            return Err(FlistError::BadLength {
                what: "file size",
                len: size,
            });
        }
        let mtime = if flags & XFLAG_SAME_TIME != 0 {
            self.prev_mtime
        } else {
            rd.read_i32()?
        };
        let mode = if flags & XFLAG_SAME_MODE != 0 {
            self.prev_mode
        } else {
            rd.read_i32()? as u32
        };
        let uid = if !cfg.preserve_uid {
            0
        } else if flags & XFLAG_SAME_UID != 0 {
            self.prev_uid
        } else {
            rd.read_i32()? as u32
        };
        let gid = if !cfg.preserve_gid {
            0
        } else if flags & XFLAG_SAME_GID != 0 {
            self.prev_gid
        } else {
            rd.read_i32()? as u32
        };

        let file_type = FileType::from_mode(mode).unwrap_or(FileType::Regular);
        let recv_rdev = (cfg.preserve_devices && file_type.is_device())
            || (cfg.preserve_specials && file_type.is_special());
        let rdev = if recv_rdev { rd.read_i32()? } else { 0 };

        let link_target = if cfg.preserve_links && file_type == FileType::Symlink {
            let len = rd.read_i32()?;
            let len = usize::try_from(len)
                .ok()
                .filter(|len| (1..=MAX_NAME_LENGTH).contains(len))
                .ok_or(FlistError::BadLength {
                    what: "symlink target",
                    len: i64::from(len),
                })?;
            Some(rd.read_bytes(len)?)
        } else {
            None
        };

        self.prev_name.clear();
        self.prev_name.extend_from_slice(&name);
        self.prev_mode = mode;
        self.prev_uid = uid;
        self.prev_gid = gid;
        self.prev_mtime = mtime;

        Ok(Some(FileEntry {
            name,
            size,
            mtime,
            mode,
            uid,
            gid,
            rdev,
            link_target,
            top_dir: flags & XFLAG_TOP_DIR != 0,
        }))
    }
}

/// Decodes a complete file list: entries, i/o-error count and id maps.
pub fn read_file_list<R: Read>(rd: &mut R, cfg: &FlistConfig) -> Result<FileList, FlistError> {
    let mut reader = FileListReader::new();
    let mut list = FileList::default();

    while let Some(entry) = reader.read_entry(rd, cfg)? {
        list.entries.push(entry);
    }
    list.io_errors = rd.read_i32()?;
    if !cfg.numeric_ids {
        list.users = read_id_map(rd)?;
        list.groups = read_id_map(rd)?;
    }

    tracing::debug!(
        entries = list.entries.len(),
        io_errors = list.io_errors,
        "received file list"
    );
    Ok(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Cursor;

    use proptest::prelude::*;

    use crate::write::write_file_list;

    fn entry(name: &[u8], size: i64, mtime: i32, mode: u32) -> FileEntry {
        FileEntry {
            name: name.to_vec(),
            size,
            mtime,
            mode,
            uid: 1000,
            gid: 1000,
            rdev: 0,
            link_target: None,
            top_dir: name == b".",
        }
    }

    fn round_trip(entries: &[FileEntry], cfg: &FlistConfig, io_errors: i32) -> FileList {
        let mut wire = Vec::new();
        write_file_list(&mut wire, entries, cfg, io_errors, &Vec::new(), &Vec::new()).unwrap();
        read_file_list(&mut Cursor::new(wire), cfg).unwrap()
    }

    #[test]
    fn basic_list_round_trips() {
        let cfg = FlistConfig {
            preserve_uid: true,
            preserve_gid: true,
            ..FlistConfig::default()
        };
        let entries = vec![
            entry(b".", 0, 1_257_894_000, 0o040755),
            entry(b"hello", 5, 1_257_894_000, 0o100644),
            entry(b"hello2", 7, 1_257_894_001, 0o100644),
        ];

        let list = round_trip(&entries, &cfg, 0);
        assert_eq!(list.entries, entries);
        assert_eq!(list.io_errors, 0);
    }

    #[test]
    fn prefix_sharing_survives_the_wire() {
        let cfg = FlistConfig::default();
        let entries = vec![
            entry(b"dir", 0, 7, 0o040755),
            entry(b"dir/aaaaaaaaaa", 1, 7, 0o100644),
            entry(b"dir/aaaaaaaaab", 2, 7, 0o100644),
        ];

        let mut wire = Vec::new();
        write_file_list(&mut wire, &entries, &cfg, 0, &Vec::new(), &Vec::new()).unwrap();
        // The third entry repeats all but one byte of the second one's name.
        let list = read_file_list(&mut Cursor::new(wire), &cfg).unwrap();
        assert_eq!(list.entries, entries);
    }

    #[test]
    fn symlink_targets_travel_when_preserved() {
        let cfg = FlistConfig {
            preserve_links: true,
            ..FlistConfig::default()
        };
        let mut link = entry(b"hey", 0, 42, 0o120777);
        link.link_target = Some(b"hello".to_vec());

        let list = round_trip(&[link.clone()], &cfg, 0);
        assert_eq!(list.entries[0], link);
    }

    #[test]
    fn io_error_count_is_preserved() {
        let cfg = FlistConfig::default();
        let list = round_trip(&[entry(b".", 0, 0, 0o040755)], &cfg, 3);
        assert_eq!(list.io_errors, 3);
    }

    #[test]
    fn unsafe_names_are_rejected() {
        let cfg = FlistConfig::default();
        let evil = entry(b"../../etc/passwd", 1, 0, 0o100644);
        let mut wire = Vec::new();
        write_file_list(&mut wire, &[evil], &cfg, 0, &Vec::new(), &Vec::new()).unwrap();

        let err = read_file_list(&mut Cursor::new(wire), &cfg).unwrap_err();
        assert!(matches!(err, FlistError::EscapingName(_)));
    }

    #[test]
    fn truncated_list_is_an_error() {
        let cfg = FlistConfig::default();
        let mut wire = Vec::new();
        write_file_list(
            &mut wire,
            &[entry(b"hello", 5, 0, 0o100644)],
            &cfg,
            0,
            &Vec::new(),
            &Vec::new(),
        )
        .unwrap();
        wire.truncate(wire.len() - 2);

        assert!(read_file_list(&mut Cursor::new(wire), &cfg).is_err());
    }

    proptest! {
        #[test]
        fn arbitrary_lists_round_trip(
            names in prop::collection::btree_set("[a-z]{1,12}(/[a-z]{1,12}){0,2}", 1..20),
            seed in any::<u32>(),
        ) {
            let cfg = FlistConfig {
                preserve_uid: true,
                preserve_gid: true,
                ..FlistConfig::default()
            };
            let entries: Vec<FileEntry> = names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let salt = seed.wrapping_add(i as u32);
                    FileEntry {
                        name: name.clone().into_bytes(),
                        size: i64::from(salt % 100_000),
                        mtime: (salt % 2_000_000) as i32,
                        mode: 0o100600 | (salt % 0o200),
                        uid: salt % 3,
                        gid: salt % 2,
                        rdev: 0,
                        link_target: None,
                        top_dir: false,
                    }
                })
                .collect();

            let mut wire = Vec::new();
            write_file_list(&mut wire, &entries, &cfg, 0, &Vec::new(), &Vec::new()).unwrap();
            let list = read_file_list(&mut Cursor::new(wire), &cfg).unwrap();
            prop_assert_eq!(list.entries, entries);
        }
    }
}
