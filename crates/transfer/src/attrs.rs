//! Attribute restoration: permissions, ownership, modification times.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::Path;

use filetime::FileTime;
use rustix::fs::Mode;

use rsync_flist::{FileEntry, FileList};
use rsync_opts::Options;
use rsync_sandbox::{EntryStat, RootDir};

pub(crate) fn am_root() -> bool {
    rustix::process::geteuid().is_root()
}

/// uid/gid remapping derived from the sender's id-name tables.
///
/// Without `--numeric-ids`, a transmitted id is mapped to the local id of
/// the same-named user or group when one exists; otherwise the numeric
/// value is kept.
#[derive(Debug, Default)]
pub(crate) struct IdRemap {
    users: HashMap<u32, u32>,
    groups: HashMap<u32, u32>,
}

impl IdRemap {
    pub(crate) fn from_list(list: &FileList) -> Self {
        let mut remap = Self::default();
        for (id, name) in &list.users {
            if let Some(user) = uzers::get_user_by_name(&bytes_to_os(name)) {
                remap.users.insert(*id, user.uid());
            }
        }
        for (id, name) in &list.groups {
            if let Some(group) = uzers::get_group_by_name(&bytes_to_os(name)) {
                remap.groups.insert(*id, group.gid());
            }
        }
        remap
    }

    pub(crate) fn uid(&self, uid: u32) -> u32 {
        self.users.get(&uid).copied().unwrap_or(uid)
    }

    pub(crate) fn gid(&self, gid: u32) -> u32 {
        self.groups.get(&gid).copied().unwrap_or(gid)
    }
}

fn bytes_to_os(bytes: &[u8]) -> std::ffi::OsString {
    use std::os::unix::ffi::OsStringExt;
    std::ffi::OsString::from_vec(bytes.to_vec())
}

/// Applies attributes to a still-open file handle before it is renamed
/// into place: mode, then ownership, then mtime.
pub(crate) fn apply_to_open_file(
    file: &File,
    entry: &FileEntry,
    mode: u32,
    opts: &Options,
    remap: &IdRemap,
) -> io::Result<()> {
    rustix::fs::fchmod(file, Mode::from_bits_truncate(mode & 0o7777))?;

    if (opts.preserve_uid || opts.preserve_gid) && am_root() {
        let uid = opts
            .preserve_uid
            .then(|| rustix::fs::Uid::from_raw(remap.uid(entry.uid)));
        let gid = opts
            .preserve_gid
            .then(|| rustix::fs::Gid::from_raw(remap.gid(entry.gid)));
        rustix::fs::fchown(file, uid, gid)?;
    }

    if opts.preserve_mtimes {
        let mtime = FileTime::from_unix_time(i64::from(entry.mtime), 0);
        filetime::set_file_handle_times(file, None, Some(mtime))?;
    }
    Ok(())
}

/// Fixes up attributes of an entry that is already up to date.
pub(crate) fn tweak_existing(
    root: &RootDir,
    name: &Path,
    entry: &FileEntry,
    existing: &EntryStat,
    opts: &Options,
    remap: &IdRemap,
) -> io::Result<()> {
    if opts.preserve_perms && existing.mode & 0o7777 != entry.permissions() {
        root.set_mode(name, entry.permissions())?;
    }

    if am_root() {
        let want_uid = opts
            .preserve_uid
            .then(|| remap.uid(entry.uid))
            .filter(|&uid| uid != existing.uid);
        let want_gid = opts
            .preserve_gid
            .then(|| remap.gid(entry.gid))
            .filter(|&gid| gid != existing.gid);
        if want_uid.is_some() || want_gid.is_some() {
            root.set_owner(name, want_uid, want_gid)?;
        }
    }
    Ok(())
}

/// Applies ownership to a symlink itself (never its target).
pub(crate) fn apply_to_symlink(
    root: &RootDir,
    name: &Path,
    entry: &FileEntry,
    opts: &Options,
    remap: &IdRemap,
) -> io::Result<()> {
    // Symlink mtimes are not restored; only ownership is meaningful here.
    if (opts.preserve_uid || opts.preserve_gid) && am_root() {
        root.set_owner(
            name,
            opts.preserve_uid.then(|| remap.uid(entry.uid)),
            opts.preserve_gid.then(|| remap.gid(entry.gid)),
        )?;
    }
    Ok(())
}

/// Applies deferred directory attributes through an open directory handle.
pub(crate) fn apply_to_directory(
    root: &RootDir,
    name: &Path,
    entry: &FileEntry,
    opts: &Options,
    remap: &IdRemap,
) -> io::Result<()> {
    if opts.preserve_perms {
        root.set_mode(name, entry.permissions())?;
    }
    if (opts.preserve_uid || opts.preserve_gid) && am_root() {
        root.set_owner(
            name,
            opts.preserve_uid.then(|| remap.uid(entry.uid)),
            opts.preserve_gid.then(|| remap.gid(entry.gid)),
        )?;
    }
    if opts.preserve_mtimes {
        let dir = File::from(root.open_dir(name)?);
        let mtime = FileTime::from_unix_time(i64::from(entry.mtime), 0);
        filetime::set_file_handle_times(&dir, None, Some(mtime))?;
    }
    Ok(())
}
