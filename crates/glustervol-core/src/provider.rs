// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! The provider: URI-to-volume wiring and the dispatch point for every
//! filesystem operation.
//!
//! URIs take the form `gluster://host:volume/path`. The authority resolves
//! through the process-wide [`VolumeRegistry`]; the path half becomes a
//! [`VolPath`] bound to the resolved volume. Every operation below turns
//! native status codes into [`VolError`] kinds at the call site.

use std::sync::Arc;

use crate::attr::{FileAttributeView, FileAttributes, ViewKind};
use crate::channel::FileChannel;
use crate::client::{RawStat, VolumeLibrary};
use crate::config::{ConnectOptions, WatchConfig};
use crate::dir::{DirFilter, DirectoryStream};
use crate::error::{VolError, VolResult};
use crate::matcher::PathMatcher;
use crate::path::VolPath;
use crate::types::{AccessMode, CopyOption, OpenOptions};
use crate::volume::{parse_authority, Volume, VolumeRegistry};
use crate::watch::WatchService;

/// URI scheme identifying this adapter.
pub const SCHEME: &str = "gluster";

/// Mode used for directories created without explicit permissions.
const DEFAULT_DIR_MODE: u32 = 0o775;

/// Mode used for the target file of a copy before attributes are applied.
const COPY_FILE_MODE: u32 = 0o664;

/// Single entry point wiring URIs to volumes and dispatching operations.
pub struct GlusterProvider {
    registry: VolumeRegistry,
    watch_config: WatchConfig,
}

impl GlusterProvider {
    pub fn new(lib: Arc<dyn VolumeLibrary>) -> GlusterProvider {
        Self::with_defaults(lib, ConnectOptions::from_env(), WatchConfig::default())
    }

    pub fn with_defaults(
        lib: Arc<dyn VolumeLibrary>,
        connect: ConnectOptions,
        watch_config: WatchConfig,
    ) -> GlusterProvider {
        GlusterProvider {
            registry: VolumeRegistry::with_defaults(lib, connect),
            watch_config,
        }
    }

    pub fn scheme(&self) -> &'static str {
        SCHEME
    }

    pub fn registry(&self) -> &VolumeRegistry {
        &self.registry
    }

    /// Split `gluster://host:volume/path` into authority and in-volume path.
    fn split_uri(uri: &str) -> VolResult<(&str, &str)> {
        let rest = uri
            .strip_prefix(SCHEME)
            .and_then(|rest| rest.strip_prefix("://"))
            .ok_or(VolError::Unsupported("URI scheme"))?;
        let (authority, path) = match rest.find('/') {
            Some(index) => (&rest[..index], &rest[index..]),
            None => (rest, "/"),
        };
        parse_authority(authority)?;
        Ok((authority, path))
    }

    /// Connect the volume a URI names, reusing a cached handle when open.
    pub fn new_filesystem(&self, uri: &str, opts: ConnectOptions) -> VolResult<Arc<Volume>> {
        let (authority, _) = Self::split_uri(uri)?;
        self.registry.connect(authority, opts)
    }

    /// The already-connected volume a URI names.
    pub fn get_filesystem(&self, uri: &str) -> VolResult<Arc<Volume>> {
        let (authority, _) = Self::split_uri(uri)?;
        self.registry.lookup(authority)
    }

    /// Resolve a URI to a path, connecting its volume when needed.
    pub fn get_path(&self, uri: &str) -> VolResult<VolPath> {
        let (authority, path) = Self::split_uri(uri)?;
        let volume = match self.registry.lookup(authority) {
            Ok(volume) => volume,
            Err(VolError::NotFound(_)) => {
                self.registry.connect(authority, ConnectOptions::default())?
            }
            Err(err) => return Err(err),
        };
        Ok(volume.path(path))
    }

    /// Finalize a volume handle and drop it from the registry.
    pub fn close_filesystem(&self, volume: &Arc<Volume>) -> VolResult<()> {
        self.registry.close(volume)
    }

    /// Open a seekable byte channel. `mode` applies when the open creates
    /// the file; `None` means rw-rw-rw-.
    pub fn new_channel(
        &self,
        path: &VolPath,
        options: OpenOptions,
        mode: Option<u32>,
    ) -> VolResult<FileChannel> {
        let volume = path.volume()?;
        FileChannel::open(volume, path.clone(), options, mode)
    }

    /// Open a directory stream, optionally filtered.
    pub fn new_directory_stream(
        &self,
        path: &VolPath,
        filter: Option<DirFilter>,
    ) -> VolResult<DirectoryStream> {
        if !self.is_directory(path) {
            return Err(VolError::NotADirectory(path.to_string()));
        }
        let volume = path.volume()?;
        DirectoryStream::open(volume, path.clone(), filter)
    }

    /// Create a directory. `None` mode means rwxrwxr-x.
    pub fn create_directory(&self, path: &VolPath, mode: Option<u32>) -> VolResult<()> {
        if self.exists(path) {
            return Err(VolError::AlreadyExists(path.to_string()));
        }
        if let Some(parent) = path.parent() {
            if !self.exists(&parent) {
                return Err(VolError::NotFound(parent.to_string()));
            }
        }
        let volume = path.volume()?;
        let native = volume.native()?;
        let path_str = path.native_path();
        if volume.lib().mkdir(native, &path_str, mode.unwrap_or(DEFAULT_DIR_MODE)) < 0 {
            return Err(volume.native_error("mkdir", &path_str));
        }
        Ok(())
    }

    /// Delete a file or an empty directory.
    pub fn delete(&self, path: &VolPath) -> VolResult<()> {
        let attrs = self.read_attributes(path, true)?;
        let volume = path.volume()?;
        let native = volume.native()?;
        let path_str = path.native_path();
        if attrs.is_directory() {
            if !self.directory_is_empty(path)? {
                return Err(VolError::DirectoryNotEmpty(path.to_string()));
            }
            if volume.lib().rmdir(native, &path_str) < 0 {
                return Err(volume.native_error("rmdir", &path_str));
            }
        } else if volume.lib().unlink(native, &path_str) < 0 {
            return Err(volume.native_error("unlink", &path_str));
        }
        Ok(())
    }

    fn directory_is_empty(&self, path: &VolPath) -> VolResult<bool> {
        let mut stream = self.new_directory_stream(path, None)?;
        let empty = stream.iter()?.next().is_none();
        stream.close()?;
        Ok(empty)
    }

    /// Copy a file or (empty) directory shell.
    pub fn copy(&self, from: &VolPath, to: &VolPath, options: &[CopyOption]) -> VolResult<()> {
        guard_absolute(from)?;
        guard_absolute(to)?;
        if !self.exists(from) {
            return Err(VolError::NotFound(from.to_string()));
        }

        let target_exists = self.exists(to);
        if target_exists && self.is_same_file(from, to)? {
            return Ok(());
        }

        let mut replace = false;
        let mut copy_attributes = false;
        for option in options {
            match option {
                CopyOption::AtomicMove => return Err(VolError::Unsupported("atomic move")),
                CopyOption::ReplaceExisting => replace = true,
                CopyOption::CopyAttributes => copy_attributes = true,
            }
        }

        if !replace && target_exists {
            return Err(VolError::AlreadyExists(to.to_string()));
        }
        if self.is_directory(to) && !self.directory_is_empty(to)? {
            return Err(VolError::DirectoryNotEmpty(to.to_string()));
        }

        if self.is_directory(from) {
            self.create_directory(to, None)?;
            return Ok(());
        }

        if replace && target_exists {
            self.delete(to)?;
        }
        self.copy_file_content(from, to)?;
        if copy_attributes {
            self.copy_file_attributes(from, to)?;
        }
        Ok(())
    }

    fn copy_file_content(&self, from: &VolPath, to: &VolPath) -> VolResult<()> {
        let mut src = self.new_channel(from, OpenOptions::reading(), None)?;
        let mut dst = self.new_channel(
            to,
            OpenOptions::read_write().create(true).truncate(true),
            Some(COPY_FILE_MODE),
        )?;
        let size = src.size()?;
        let copied = src.transfer_to(0, size, &mut dst)?;
        dst.close()?;
        src.close()?;
        if copied < size {
            return Err(VolError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short copy: {copied} of {size} bytes"),
            )));
        }
        Ok(())
    }

    fn copy_file_attributes(&self, from: &VolPath, to: &VolPath) -> VolResult<()> {
        let attrs = self.read_attributes(from, true)?;
        let volume = to.volume()?;
        let native = volume.native()?;
        let path_str = to.native_path();
        if volume.lib().chmod(native, &path_str, attrs.mode & 0o7777) < 0 {
            return Err(volume.native_error("chmod", &path_str));
        }
        Ok(())
    }

    /// Rename within one volume. Cross-volume and atomic moves are
    /// unsupported.
    pub fn move_file(&self, from: &VolPath, to: &VolPath, options: &[CopyOption]) -> VolResult<()> {
        guard_absolute(from)?;
        guard_absolute(to)?;
        if !self.exists(from) {
            return Err(VolError::NotFound(from.to_string()));
        }
        if self.exists(to) && self.is_same_file(from, to)? {
            return Ok(());
        }

        let mut replace = false;
        for option in options {
            match option {
                CopyOption::AtomicMove => return Err(VolError::Unsupported("atomic move")),
                CopyOption::ReplaceExisting => replace = true,
                CopyOption::CopyAttributes => {}
            }
        }

        if !replace && self.exists(to) {
            return Err(VolError::AlreadyExists(to.to_string()));
        }
        if self.is_directory(to) && !self.directory_is_empty(to)? {
            return Err(VolError::DirectoryNotEmpty(to.to_string()));
        }
        if from.authority() != to.authority() {
            return Err(VolError::Unsupported("cross-volume move"));
        }

        let volume = from.volume()?;
        let native = volume.native()?;
        let from_str = from.native_path();
        if volume.lib().rename(native, &from_str, &to.native_path()) < 0 {
            return Err(volume.native_error("rename", &from_str));
        }
        Ok(())
    }

    /// Equal paths on one volume are the same file without consulting the
    /// native layer; otherwise both must exist and share an inode.
    pub fn is_same_file(&self, a: &VolPath, b: &VolPath) -> VolResult<bool> {
        if a == b {
            return Ok(true);
        }
        if a.authority() != b.authority() {
            return Ok(false);
        }
        let first = self.read_attributes(a, true)?;
        let second = self.read_attributes(b, true)?;
        Ok(first.file_key() == second.file_key())
    }

    pub fn is_hidden(&self, path: &VolPath) -> bool {
        path.is_hidden()
    }

    pub fn exists(&self, path: &VolPath) -> bool {
        self.read_attributes(path, true).is_ok()
    }

    fn exists_nofollow(&self, path: &VolPath) -> bool {
        self.read_attributes(path, false).is_ok()
    }

    pub fn is_directory(&self, path: &VolPath) -> bool {
        self.read_attributes(path, true)
            .map(|attrs| attrs.is_directory())
            .unwrap_or(false)
    }

    /// Check each requested mode against the native access primitive.
    pub fn check_access(&self, path: &VolPath, modes: &[AccessMode]) -> VolResult<()> {
        let volume = path.volume()?;
        let native = volume.native()?;
        let path_str = path.native_path();

        let mut stat = RawStat::default();
        if volume.lib().lstat(native, &path_str, &mut stat) != 0 {
            return Err(VolError::NotFound(path.to_string()));
        }
        for mode in modes {
            if volume.lib().access(native, &path_str, mode.mask()) != 0 {
                return Err(VolError::AccessDenied(path.to_string()));
            }
        }
        Ok(())
    }

    /// One stat (or lstat) call, translated into an attribute snapshot.
    pub fn read_attributes(&self, path: &VolPath, follow_links: bool) -> VolResult<FileAttributes> {
        let volume = path.volume()?;
        let native = volume.native()?;
        let path_str = path.native_path();
        let mut stat = RawStat::default();
        let ret = if follow_links {
            volume.lib().stat(native, &path_str, &mut stat)
        } else {
            volume.lib().lstat(native, &path_str, &mut stat)
        };
        if ret != 0 {
            return Err(VolError::NotFound(path.to_string()));
        }
        Ok(FileAttributes::from_stat(&stat))
    }

    /// Build an attribute view; the snapshot is fetched here, once.
    pub fn attribute_view(
        &self,
        path: &VolPath,
        kind: ViewKind,
        follow_links: bool,
    ) -> VolResult<FileAttributeView> {
        let snapshot = self.read_attributes(path, follow_links)?;
        Ok(FileAttributeView::new(path.clone(), kind, snapshot))
    }

    /// Read a symlink's target as a path on the same volume.
    pub fn read_symbolic_link(&self, link: &VolPath) -> VolResult<VolPath> {
        let attrs = self.read_attributes(link, false)?;
        if !attrs.is_symbolic_link() {
            return Err(VolError::NotALink(link.to_string()));
        }
        let volume = link.volume()?;
        let native = volume.native()?;
        let path_str = link.native_path();
        let mut buf = vec![0u8; (attrs.size as usize).max(1)];
        let len = volume.lib().readlink(native, &path_str, &mut buf);
        if len < 0 {
            return Err(volume.native_error("readlink", &path_str));
        }
        buf.truncate(len as usize);
        let target = String::from_utf8_lossy(&buf).into_owned();
        Ok(volume.path(&target))
    }

    /// Create a symlink at `link` pointing to `target`.
    pub fn create_symbolic_link(&self, link: &VolPath, target: &VolPath) -> VolResult<()> {
        if self.exists_nofollow(link) {
            return Err(VolError::AlreadyExists(link.to_string()));
        }
        let volume = link.volume()?;
        let native = volume.native()?;
        let link_str = link.native_path();
        if volume.lib().symlink(native, &target.to_string(), &link_str) != 0 {
            return Err(volume.native_error("symlink", &link_str));
        }
        Ok(())
    }

    /// Compile a `glob:`/`regex:` matcher.
    pub fn path_matcher(&self, syntax_and_pattern: &str) -> VolResult<PathMatcher> {
        PathMatcher::compile(syntax_and_pattern)
    }

    /// A fresh polling watch service.
    pub fn new_watch_service(&self) -> WatchService {
        WatchService::with_config(self.watch_config)
    }
}

fn guard_absolute(path: &VolPath) -> VolResult<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(VolError::Unsupported("relative paths in copy/move"))
    }
}
