// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory streams over a native directory cursor.
//!
//! A stream hands out exactly one iterator. The iterator advances by
//! look-ahead: `.` and `..` are always skipped, a filter (when present)
//! skips entries until one is accepted, and the inode-zero entry terminates
//! iteration.

use std::sync::Arc;

use crate::client::{DirPtr, RawDirent};
use crate::error::{VolError, VolResult};
use crate::path::VolPath;
use crate::volume::Volume;

/// Entry predicate applied during look-ahead.
pub type DirFilter = Box<dyn Fn(&VolPath) -> bool + Send>;

/// Lazy sequence of the entries of one directory.
pub struct DirectoryStream {
    volume: Arc<Volume>,
    dir: VolPath,
    handle: DirPtr,
    filter: Option<DirFilter>,
    closed: bool,
    iterated: bool,
}

impl DirectoryStream {
    /// Acquire a native cursor for `dir`. The caller is responsible for
    /// having verified that `dir` is a directory.
    pub(crate) fn open(
        volume: Arc<Volume>,
        dir: VolPath,
        filter: Option<DirFilter>,
    ) -> VolResult<DirectoryStream> {
        let native = volume.native()?;
        let path = dir.native_path();
        let handle = volume.lib().opendir(native, &path);
        if handle.is_null() {
            return Err(volume.native_error("opendir", &path));
        }
        Ok(DirectoryStream {
            volume,
            dir,
            handle,
            filter,
            closed: false,
            iterated: false,
        })
    }

    pub fn dir(&self) -> &VolPath {
        &self.dir
    }

    /// The stream's one iterator. A second call, or a call after close,
    /// fails.
    pub fn iter(&mut self) -> VolResult<DirIterator<'_>> {
        if self.closed {
            return Err(VolError::Closed("directory stream"));
        }
        if self.iterated {
            return Err(VolError::IllegalState("directory stream already iterated"));
        }
        self.iterated = true;
        Ok(DirIterator {
            stream: self,
            exhausted: false,
        })
    }

    /// Release the native cursor. Closing twice is a no-op.
    pub fn close(&mut self) -> VolResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.volume.lib().closedir(self.handle) != 0 {
            return Err(self.volume.native_error("closedir", &self.dir.native_path()));
        }
        Ok(())
    }
}

impl Drop for DirectoryStream {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if self.volume.lib().closedir(self.handle) != 0 {
                tracing::warn!(dir = %self.dir, "closing leaked directory cursor failed");
            }
        }
    }
}

/// Look-ahead iterator over a [`DirectoryStream`].
pub struct DirIterator<'a> {
    stream: &'a mut DirectoryStream,
    exhausted: bool,
}

impl DirIterator<'_> {
    fn advance(&mut self) -> VolResult<Option<VolPath>> {
        loop {
            let mut entry = RawDirent::default();
            let ret = self.stream.volume.lib().readdir(self.stream.handle, &mut entry);
            if ret != 0 {
                return Err(self
                    .stream
                    .volume
                    .native_error("readdir", &self.stream.dir.native_path()));
            }
            if entry.d_ino == 0 {
                return Ok(None);
            }
            if entry.d_name == "." || entry.d_name == ".." {
                continue;
            }
            let path = self.stream.dir.resolve_str(&entry.d_name);
            if let Some(filter) = &self.stream.filter {
                if !filter(&path) {
                    continue;
                }
            }
            return Ok(Some(path));
        }
    }
}

impl Iterator for DirIterator<'_> {
    type Item = VolResult<VolPath>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        match self.advance() {
            Ok(Some(path)) => Some(Ok(path)),
            Ok(None) => {
                self.exhausted = true;
                None
            }
            Err(err) => {
                self.exhausted = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectOptions;
    use crate::testing::fake::FakeLibrary;
    use crate::volume::VolumeRegistry;

    fn volume_with_tree() -> Arc<Volume> {
        let lib = Arc::new(FakeLibrary::new());
        let registry = VolumeRegistry::with_defaults(lib, ConnectOptions::default());
        let volume = registry.connect("server:data", ConnectOptions::default()).unwrap();
        let native = volume.native().unwrap();
        volume.lib().mkdir(native, "/d", 0o755);
        for name in ["/d/a.txt", "/d/b.log", "/d/c.txt"] {
            let fd = volume.lib().creat(native, name, libc::O_CREAT, 0o644);
            volume.lib().close(fd);
        }
        volume
    }

    #[test]
    fn stream_never_yields_dot_entries() {
        let volume = volume_with_tree();
        let mut stream =
            DirectoryStream::open(volume.clone(), volume.path("/d"), None).unwrap();
        let names: Vec<String> = stream
            .iter()
            .unwrap()
            .map(|entry| entry.unwrap().file_name().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.txt", "b.log", "c.txt"]);
        stream.close().unwrap();
    }

    #[test]
    fn filter_selects_a_subset() {
        let volume = volume_with_tree();
        let filter: DirFilter =
            Box::new(|path| path.file_name().is_some_and(|name| name.ends_with(".txt")));
        let mut stream =
            DirectoryStream::open(volume.clone(), volume.path("/d"), Some(filter)).unwrap();
        let names: Vec<String> = stream
            .iter()
            .unwrap()
            .map(|entry| entry.unwrap().file_name().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a.txt", "c.txt"]);
    }

    #[test]
    fn second_iterator_is_an_illegal_state() {
        let volume = volume_with_tree();
        let mut stream =
            DirectoryStream::open(volume.clone(), volume.path("/d"), None).unwrap();
        stream.iter().unwrap().count();
        assert!(matches!(stream.iter(), Err(VolError::IllegalState(_))));
    }

    #[test]
    fn iterating_after_close_fails() {
        let volume = volume_with_tree();
        let mut stream =
            DirectoryStream::open(volume.clone(), volume.path("/d"), None).unwrap();
        stream.close().unwrap();
        stream.close().unwrap();
        assert!(matches!(stream.iter(), Err(VolError::Closed(_))));
    }
}
