//! Source-tree walker producing file lists in transmission order.
//!
//! The walk is depth-first with directory entries sorted by name, so the
//! same tree always produces the same list. Entry names are relative to the
//! transfer root; the requested path itself comes first and, when it is a
//! directory, carries the top-dir flag that anchors the receiver's deletion
//! scope.

use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::entry::{FileEntry, FileType};
use crate::idmap::IdMap;
use crate::FlistConfig;

/// Outcome of a source walk.
#[derive(Debug, Default)]
pub struct WalkedList {
    /// Entries in transmission order.
    pub entries: Vec<FileEntry>,
    /// Number of filesystem errors encountered and skipped over.
    pub io_errors: i32,
}

/// Walks `paths` (relative to `root`) and builds the file list.
///
/// Unreadable entries are logged, counted in `io_errors` and skipped; the
/// count travels in the file list so the receiver can suppress deletion.
/// Symlinks, devices and specials are only listed when the corresponding
/// preserve flag is set, mirroring what the entry codec will transmit.
pub fn build_file_list(
    root: &Path,
    paths: &[String],
    recurse: bool,
    cfg: &FlistConfig,
) -> WalkedList {
    let mut list = WalkedList::default();

    for path in paths {
        let rel: &Path = Path::new(path);
        let full = if path == "." {
            root.to_path_buf()
        } else {
            root.join(rel)
        };

        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(error) => {
                tracing::warn!(path = %full.display(), %error, "skipping unreadable path");
                list.io_errors += 1;
                continue;
            }
        };

        let name = path.as_bytes().to_vec();
        let is_dir = meta.is_dir();
        if let Some(mut entry) = entry_for(&full, name, &meta, cfg, &mut list.io_errors) {
            entry.top_dir = is_dir;
            list.entries.push(entry);
        }
        if is_dir && recurse {
            walk_dir(&full, rel, cfg, &mut list);
        }
    }

    tracing::debug!(
        entries = list.entries.len(),
        io_errors = list.io_errors,
        "built file list"
    );
    list
}

fn walk_dir(dir: &Path, rel: &Path, cfg: &FlistConfig, list: &mut WalkedList) {
    let mut names = match read_dir_sorted(dir) {
        Ok(names) => names,
        Err(error) => {
            tracing::warn!(path = %dir.display(), %error, "skipping unreadable directory");
            list.io_errors += 1;
            return;
        }
    };

    for name in names.drain(..) {
        let full = dir.join(&name);
        let rel_child: PathBuf = if rel == Path::new(".") {
            PathBuf::from(&name)
        } else {
            rel.join(&name)
        };

        let meta = match fs::symlink_metadata(&full) {
            Ok(meta) => meta,
            Err(error) => {
                tracing::warn!(path = %full.display(), %error, "skipping unreadable entry");
                list.io_errors += 1;
                continue;
            }
        };

        let entry_name = rel_child.as_os_str().as_bytes().to_vec();
        let is_dir = meta.is_dir();
        if let Some(entry) = entry_for(&full, entry_name, &meta, cfg, &mut list.io_errors) {
            list.entries.push(entry);
        }
        if is_dir {
            walk_dir(&full, &rel_child, cfg, list);
        }
    }
}

fn read_dir_sorted(dir: &Path) -> io::Result<Vec<std::ffi::OsString>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        names.push(entry?.file_name());
    }
    names.sort();
    Ok(names)
}

fn entry_for(
    full: &Path,
    name: Vec<u8>,
    meta: &fs::Metadata,
    cfg: &FlistConfig,
    io_errors: &mut i32,
) -> Option<FileEntry> {
    let mode = meta.mode();
    let file_type = FileType::from_mode(mode)?;

    match file_type {
        FileType::Symlink if !cfg.preserve_links => {
            tracing::debug!(path = %full.display(), "skipping symlink without --links");
            return None;
        }
        FileType::CharDevice | FileType::BlockDevice if !cfg.preserve_devices => {
            tracing::debug!(path = %full.display(), "skipping device without --devices");
            return None;
        }
        FileType::Fifo | FileType::Socket if !cfg.preserve_specials => {
            tracing::debug!(path = %full.display(), "skipping special without --specials");
            return None;
        }
        _ => {}
    }

    let link_target = if file_type == FileType::Symlink {
        match fs::read_link(full) {
            Ok(target) => Some(target.as_os_str().as_bytes().to_vec()),
            Err(error) => {
                tracing::warn!(path = %full.display(), %error, "failed to read symlink");
                *io_errors += 1;
                return None;
            }
        }
    } else {
        None
    };

    let size = if file_type == FileType::Regular {
        meta.size() as i64
    } else {
        0
    };

    Some(FileEntry {
        name,
        size,
        mtime: meta.mtime().clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32,
        mode,
        uid: meta.uid(),
        gid: meta.gid(),
        rdev: meta.rdev() as i32,
        link_target,
        top_dir: false,
    })
}

/// Builds the user and group name maps for a walked list.
///
/// Only ids actually present in the list are looked up; unknown ids are
/// simply omitted, leaving the receiver to fall back to the numeric value.
#[must_use]
pub fn id_maps_for(entries: &[FileEntry], cfg: &FlistConfig) -> (IdMap, IdMap) {
    let mut users = IdMap::new();
    let mut groups = IdMap::new();
    if cfg.numeric_ids {
        return (users, groups);
    }

    if cfg.preserve_uid {
        let mut seen = std::collections::BTreeSet::new();
        for entry in entries {
            if entry.uid != 0 && seen.insert(entry.uid) {
                if let Some(user) = uzers::get_user_by_uid(entry.uid) {
                    users.push((entry.uid, user.name().as_bytes().to_vec()));
                }
            }
        }
    }
    if cfg.preserve_gid {
        let mut seen = std::collections::BTreeSet::new();
        for entry in entries {
            if entry.gid != 0 && seen.insert(entry.gid) {
                if let Some(group) = uzers::get_group_by_gid(entry.gid) {
                    groups.push((entry.gid, group.name().as_bytes().to_vec()));
                }
            }
        }
    }
    (users, groups)
}
