// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Attribute translation between native stat structures and the portable
//! permission model.
//!
//! The nine POSIX permission bits map through a fixed octal table in both
//! directions. File classification goes through type-bit masks; the symlink
//! pattern must be tested before the regular-file pattern because the two
//! overlap. Owners and groups are numeric ids only — the adapter never
//! resolves names.

use std::collections::BTreeSet;

use crate::client::{RawStat, RawTimespec};
use crate::error::{VolError, VolResult};
use crate::path::VolPath;

/// One of the nine POSIX permission bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PosixPerm {
    OwnerRead,
    OwnerWrite,
    OwnerExecute,
    GroupRead,
    GroupWrite,
    GroupExecute,
    OthersRead,
    OthersWrite,
    OthersExecute,
}

impl PosixPerm {
    pub const ALL: [PosixPerm; 9] = [
        PosixPerm::OwnerRead,
        PosixPerm::OwnerWrite,
        PosixPerm::OwnerExecute,
        PosixPerm::GroupRead,
        PosixPerm::GroupWrite,
        PosixPerm::GroupExecute,
        PosixPerm::OthersRead,
        PosixPerm::OthersWrite,
        PosixPerm::OthersExecute,
    ];

    /// The octal mode mask for this permission bit.
    pub fn mask(self) -> u32 {
        match self {
            PosixPerm::OwnerRead => 0o400,
            PosixPerm::OwnerWrite => 0o200,
            PosixPerm::OwnerExecute => 0o100,
            PosixPerm::GroupRead => 0o040,
            PosixPerm::GroupWrite => 0o020,
            PosixPerm::GroupExecute => 0o010,
            PosixPerm::OthersRead => 0o004,
            PosixPerm::OthersWrite => 0o002,
            PosixPerm::OthersExecute => 0o001,
        }
    }
}

/// Permissions whose mask bit is set in `mode`.
pub fn mode_to_permissions(mode: u32) -> BTreeSet<PosixPerm> {
    PosixPerm::ALL
        .into_iter()
        .filter(|perm| mode & perm.mask() == perm.mask())
        .collect()
}

/// OR of each permission's mask.
pub fn permissions_to_mode<I: IntoIterator<Item = PosixPerm>>(perms: I) -> u32 {
    perms.into_iter().fold(0, |mode, perm| mode | perm.mask())
}

/// File classification derived from the mode's type bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
    Other,
}

const S_IFLNK: u32 = 0o120000;
const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;

/// Classify a mode. Symlink is tested before regular file: the symlink bit
/// pattern contains the regular-file pattern.
pub fn classify(mode: u32) -> FileKind {
    if mode & S_IFLNK == S_IFLNK {
        FileKind::Symlink
    } else if mode & S_IFREG == S_IFREG {
        FileKind::Regular
    } else if mode & S_IFDIR == S_IFDIR {
        FileKind::Directory
    } else {
        FileKind::Other
    }
}

/// Immutable attribute snapshot, derived from one native stat call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: RawTimespec,
    pub mtime: RawTimespec,
    pub ctime: RawTimespec,
    pub inode: u64,
}

impl FileAttributes {
    pub fn from_stat(stat: &RawStat) -> FileAttributes {
        FileAttributes {
            mode: stat.st_mode,
            uid: stat.st_uid,
            gid: stat.st_gid,
            size: stat.st_size.max(0) as u64,
            atime: RawTimespec {
                tv_sec: stat.st_atime,
                tv_nsec: stat.st_atime_nsec,
            },
            mtime: RawTimespec {
                tv_sec: stat.st_mtime,
                tv_nsec: stat.st_mtime_nsec,
            },
            ctime: RawTimespec {
                tv_sec: stat.st_ctime,
                tv_nsec: stat.st_ctime_nsec,
            },
            inode: stat.st_ino,
        }
    }

    pub fn permissions(&self) -> BTreeSet<PosixPerm> {
        mode_to_permissions(self.mode)
    }

    pub fn kind(&self) -> FileKind {
        classify(self.mode)
    }

    pub fn is_regular_file(&self) -> bool {
        self.kind() == FileKind::Regular
    }

    pub fn is_directory(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    pub fn is_symbolic_link(&self) -> bool {
        self.kind() == FileKind::Symlink
    }

    pub fn is_other(&self) -> bool {
        self.kind() == FileKind::Other
    }

    /// Stable identity key (the inode id).
    pub fn file_key(&self) -> u64 {
        self.inode
    }

    /// Last-modified time in epoch milliseconds, the granularity the watch
    /// engine compares at.
    pub fn mtime_millis(&self) -> i64 {
        self.mtime.tv_sec * 1000 + self.mtime.tv_nsec / 1_000_000
    }
}

/// View kind selector; capabilities are checked per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    Basic,
    Posix,
    Owner,
}

impl ViewKind {
    pub fn name(self) -> &'static str {
        match self {
            ViewKind::Basic => "basic",
            ViewKind::Posix => "posix",
            ViewKind::Owner => "owner",
        }
    }
}

/// Attribute view over one path, backed by a single snapshot taken at
/// construction. Mutators go straight to the native volume and do not
/// refresh the snapshot.
#[derive(Debug)]
pub struct FileAttributeView {
    path: VolPath,
    kind: ViewKind,
    snapshot: FileAttributes,
}

impl FileAttributeView {
    pub(crate) fn new(path: VolPath, kind: ViewKind, snapshot: FileAttributes) -> Self {
        Self {
            path,
            kind,
            snapshot,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn path(&self) -> &VolPath {
        &self.path
    }

    /// The snapshot taken when this view was constructed.
    pub fn attributes(&self) -> VolResult<&FileAttributes> {
        match self.kind {
            ViewKind::Basic | ViewKind::Posix => Ok(&self.snapshot),
            ViewKind::Owner => Err(VolError::Unsupported(
                "owner view exposes only owner and group",
            )),
        }
    }

    /// Numeric owner id.
    pub fn owner(&self) -> VolResult<u32> {
        match self.kind {
            ViewKind::Posix | ViewKind::Owner => Ok(self.snapshot.uid),
            ViewKind::Basic => Err(VolError::Unsupported("basic view has no owner")),
        }
    }

    /// Numeric group id.
    pub fn group(&self) -> VolResult<u32> {
        match self.kind {
            ViewKind::Posix | ViewKind::Owner => Ok(self.snapshot.gid),
            ViewKind::Basic => Err(VolError::Unsupported("basic view has no group")),
        }
    }

    /// chmod the path immediately. The cached snapshot is left as-is.
    pub fn set_permissions<I: IntoIterator<Item = PosixPerm>>(&self, perms: I) -> VolResult<()> {
        if self.kind != ViewKind::Posix {
            return Err(VolError::Unsupported(
                "permissions can only be set through the posix view",
            ));
        }
        let volume = self.path.volume()?;
        let native = volume.native()?;
        let mode = permissions_to_mode(perms);
        let path = self.path.native_path();
        if volume.lib().chmod(native, &path, mode) != 0 {
            return Err(volume.native_error("chmod", &path));
        }
        Ok(())
    }

    /// utimens the path immediately. The cached snapshot is left as-is.
    pub fn set_times(&self, atime: RawTimespec, mtime: RawTimespec) -> VolResult<()> {
        if self.kind != ViewKind::Posix {
            return Err(VolError::Unsupported(
                "times can only be set through the posix view",
            ));
        }
        let volume = self.path.volume()?;
        let native = volume.native()?;
        let path = self.path.native_path();
        if volume.lib().utimens(native, &path, [atime, mtime]) != 0 {
            return Err(volume.native_error("utimens", &path));
        }
        Ok(())
    }
}
