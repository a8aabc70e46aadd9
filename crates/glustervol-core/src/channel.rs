// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Seekable byte channel over one open native file descriptor.
//!
//! A channel is single-owner: operations take `&mut self` and the adapter
//! never shares a descriptor across threads. All I/O honors the open-option
//! set the channel was created with; end-of-stream is reported as `None`
//! rather than a zero count. Positional reads and writes leave the logical
//! position untouched by restoring it with a second seek — the native
//! surface only exposes seek-from-start plus sequential read/write.

use std::sync::Arc;

use crate::buffers::{self, TRANSFER_SIZE};
use crate::client::{FilePtr, RawStat, SEEK_SET};
use crate::error::{VolError, VolResult};
use crate::path::VolPath;
use crate::types::OpenOptions;
use crate::volume::Volume;

/// Mode used when a channel creates a file and the caller supplied no
/// permissions: rw-rw-rw-, the historical default.
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// Byte source usable as the far end of a bulk transfer.
pub trait ReadableChannel {
    /// Read up to `buf.len()` bytes; `Ok(0)` means end-of-stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> VolResult<usize>;

    /// Reveal the underlying adapter channel, when there is one, so
    /// transfers can stay at the native layer.
    fn as_volume_channel(&mut self) -> Option<&mut FileChannel> {
        None
    }
}

/// Byte sink usable as the far end of a bulk transfer.
pub trait WritableChannel {
    fn write_chunk(&mut self, buf: &[u8]) -> VolResult<usize>;

    fn as_volume_channel(&mut self) -> Option<&mut FileChannel> {
        None
    }
}

/// Adapter for any [`std::io::Read`] source.
pub struct IoReader<R>(pub R);

impl<R: std::io::Read> ReadableChannel for IoReader<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> VolResult<usize> {
        Ok(self.0.read(buf)?)
    }
}

/// Adapter for any [`std::io::Write`] sink.
pub struct IoWriter<W>(pub W);

impl<W: std::io::Write> WritableChannel for IoWriter<W> {
    fn write_chunk(&mut self, buf: &[u8]) -> VolResult<usize> {
        Ok(self.0.write(buf)?)
    }
}

/// Open file handle bound to one path on one volume.
pub struct FileChannel {
    volume: Arc<Volume>,
    path: VolPath,
    options: OpenOptions,
    fd: FilePtr,
    position: u64,
    closed: bool,
}

impl std::fmt::Debug for FileChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileChannel")
            .field("path", &self.path.to_string())
            .field("position", &self.position)
            .field("closed", &self.closed)
            .finish()
    }
}

impl FileChannel {
    /// Open or create the file at `path`.
    ///
    /// With CREATE or CREATE_NEW the native create runs first; CREATE_NEW
    /// converts a create failure against an existing target into
    /// `AlreadyExists`. Otherwise a failed create falls back to a plain
    /// open. `mode` defaults to [`DEFAULT_FILE_MODE`].
    pub(crate) fn open(
        volume: Arc<Volume>,
        path: VolPath,
        options: OpenOptions,
        mode: Option<u32>,
    ) -> VolResult<FileChannel> {
        let flags = options.native_flags()?;
        let mode = mode.unwrap_or(DEFAULT_FILE_MODE);
        let native = volume.native()?;
        let path_str = path.native_path();
        let lib = volume.lib().clone();

        let mut fd = FilePtr::NULL;
        if options.create || options.create_new {
            fd = lib.creat(native, &path_str, flags, mode);
        }

        if options.create_new && fd.is_null() {
            let mut stat = RawStat::default();
            if lib.stat(native, &path_str, &mut stat) == 0 {
                return Err(VolError::AlreadyExists(path_str));
            }
            return Err(volume.native_error("create", &path_str));
        }

        if fd.is_null() {
            fd = lib.open(native, &path_str, flags);
        }
        if fd.is_null() {
            return Err(volume.native_error("open", &path_str));
        }

        Ok(FileChannel {
            volume,
            path,
            options,
            fd,
            position: 0,
            closed: false,
        })
    }

    pub fn path(&self) -> &VolPath {
        &self.path
    }

    pub fn options(&self) -> OpenOptions {
        self.options
    }

    pub fn is_open(&self) -> bool {
        !self.closed
    }

    fn guard_closed(&self) -> VolResult<()> {
        if self.closed {
            Err(VolError::Closed("channel"))
        } else {
            Ok(())
        }
    }

    fn guard_readable(&self) -> VolResult<()> {
        if self.options.read {
            Ok(())
        } else {
            Err(VolError::AccessDenied("channel was not opened for reading".to_string()))
        }
    }

    fn guard_writable(&self) -> VolResult<()> {
        if self.options.write {
            Ok(())
        } else {
            Err(VolError::AccessDenied("channel was not opened for writing".to_string()))
        }
    }

    fn native_error(&self, op: &'static str) -> VolError {
        self.volume.native_error(op, &self.path.native_path())
    }

    fn seek_native(&self, offset: u64) -> VolResult<()> {
        if self.volume.lib().lseek(self.fd, offset as i64, SEEK_SET) < 0 {
            return Err(self.native_error("lseek"));
        }
        Ok(())
    }

    /// Read at the current position. `None` is end-of-stream.
    pub fn read(&mut self, buf: &mut [u8]) -> VolResult<Option<usize>> {
        self.guard_closed()?;
        self.guard_readable()?;
        let n = self.volume.lib().read(self.fd, buf);
        if n < 0 {
            return Err(self.native_error("read"));
        }
        self.position += n as u64;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(n as usize))
    }

    /// Read at `offset` without disturbing the logical position.
    pub fn read_at(&mut self, buf: &mut [u8], offset: u64) -> VolResult<Option<usize>> {
        self.guard_closed()?;
        self.guard_readable()?;
        if offset >= self.size()? {
            return Ok(None);
        }
        self.seek_native(offset)?;
        let n = self.volume.lib().read(self.fd, buf);
        if n < 0 {
            return Err(self.native_error("read"));
        }
        // Restore the logical position so sequential reads continue from
        // where they left off.
        self.seek_native(self.position)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(n as usize))
    }

    /// Write at the current position, advancing it by the bytes transferred.
    pub fn write(&mut self, buf: &[u8]) -> VolResult<usize> {
        self.guard_closed()?;
        self.guard_writable()?;
        let n = self.volume.lib().write(self.fd, buf);
        if n < 0 {
            return Err(self.native_error("write"));
        }
        self.position += n as u64;
        Ok(n as usize)
    }

    /// Write at `offset` without disturbing the logical position.
    ///
    /// An offset at or beyond the current size leaves a hole that reads as
    /// zero bytes: the resulting file size is `offset` plus the payload.
    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> VolResult<usize> {
        self.guard_closed()?;
        self.guard_writable()?;
        self.seek_native(offset)?;
        let n = self.volume.lib().write(self.fd, buf);
        if n < 0 {
            return Err(self.native_error("write"));
        }
        self.seek_native(self.position)?;
        Ok(n as usize)
    }

    pub fn position(&self) -> VolResult<u64> {
        self.guard_closed()?;
        Ok(self.position)
    }

    /// Move the logical position.
    pub fn seek(&mut self, offset: u64) -> VolResult<()> {
        self.guard_closed()?;
        self.seek_native(offset)?;
        self.position = offset;
        Ok(())
    }

    /// Current file size via fstat on the descriptor.
    pub fn size(&self) -> VolResult<u64> {
        self.guard_closed()?;
        let mut stat = RawStat::default();
        if self.volume.lib().fstat(self.fd, &mut stat) != 0 {
            return Err(self.native_error("fstat"));
        }
        Ok(stat.st_size.max(0) as u64)
    }

    /// Flush the descriptor. A sync failure is always surfaced.
    pub fn force(&mut self, _metadata: bool) -> VolResult<()> {
        self.guard_closed()?;
        if self.volume.lib().fsync(self.fd) != 0 {
            return Err(self.native_error("fsync"));
        }
        Ok(())
    }

    /// Copy up to `count` bytes from `position` into `target`.
    ///
    /// Chunks go through a pooled buffer that is never visible to the
    /// caller. The copy stops early on a partial sub-transfer; a partial
    /// total after at least one successful sub-transfer is success.
    pub fn transfer_to(
        &mut self,
        position: u64,
        count: u64,
        target: &mut dyn WritableChannel,
    ) -> VolResult<u64> {
        self.guard_closed()?;
        self.guard_readable()?;
        let size = self.size()?;
        if position > size {
            return Ok(0);
        }
        let count = count.min(size - position);

        // Both ends ours: stay at the native layer, chunk to chunk.
        if let Some(dst) = target.as_volume_channel() {
            return self.transfer_between(position, count, dst);
        }

        let chunk = count.min(TRANSFER_SIZE as u64) as usize;
        let mut buf = buffers::acquire(chunk);
        let result = self.transfer_to_loop(position, count, target, &mut buf);
        buffers::release(buf);
        result
    }

    fn transfer_between(
        &mut self,
        mut pos: u64,
        count: u64,
        dst: &mut FileChannel,
    ) -> VolResult<u64> {
        dst.guard_closed()?;
        dst.guard_writable()?;
        let chunk = count.min(TRANSFER_SIZE as u64) as usize;
        let mut buf = buffers::acquire(chunk);
        let mut transferred: u64 = 0;
        let result = loop {
            if transferred >= count {
                break Ok(transferred);
            }
            let want = (count - transferred).min(chunk as u64) as usize;
            let read = match self.read_at(&mut buf[..want], pos) {
                Ok(Some(n)) => n,
                Ok(None) => break Ok(transferred),
                Err(_) if transferred > 0 => break Ok(transferred),
                Err(err) => break Err(err),
            };
            let written = match dst.write(&buf[..read]) {
                Ok(n) => n,
                Err(_) if transferred > 0 => break Ok(transferred),
                Err(err) => break Err(err),
            };
            transferred += written as u64;
            if written != read {
                break Ok(transferred);
            }
            pos += written as u64;
        };
        buffers::release(buf);
        result
    }

    fn transfer_to_loop(
        &mut self,
        mut pos: u64,
        count: u64,
        target: &mut dyn WritableChannel,
        buf: &mut [u8],
    ) -> VolResult<u64> {
        let mut transferred: u64 = 0;
        while transferred < count {
            let want = (count - transferred).min(buf.len() as u64) as usize;
            let read = match self.read_at(&mut buf[..want], pos) {
                Ok(Some(n)) => n,
                Ok(None) => break,
                Err(err) if transferred > 0 => {
                    tracing::debug!(%err, "transfer stopped after partial progress");
                    return Ok(transferred);
                }
                Err(err) => return Err(err),
            };
            let written = match target.write_chunk(&buf[..read]) {
                Ok(n) => n,
                Err(err) if transferred > 0 => {
                    tracing::debug!(%err, "transfer stopped after partial progress");
                    return Ok(transferred);
                }
                Err(err) => return Err(err),
            };
            transferred += written as u64;
            if written != read {
                break;
            }
            pos += written as u64;
        }
        Ok(transferred)
    }

    /// Copy up to `count` bytes from `source` into this channel starting at
    /// `position`. Same chunking and partial-result rules as
    /// [`transfer_to`](Self::transfer_to).
    pub fn transfer_from(
        &mut self,
        source: &mut dyn ReadableChannel,
        position: u64,
        count: u64,
    ) -> VolResult<u64> {
        self.guard_closed()?;
        self.guard_writable()?;
        if position > self.size()? {
            return Ok(0);
        }

        if let Some(src) = source.as_volume_channel() {
            return self.transfer_from_channel(src, position, count);
        }

        let chunk = count.min(TRANSFER_SIZE as u64) as usize;
        let mut buf = buffers::acquire(chunk);
        let result = self.transfer_from_loop(source, position, count, &mut buf);
        buffers::release(buf);
        result
    }

    fn transfer_from_channel(
        &mut self,
        src: &mut FileChannel,
        mut pos: u64,
        count: u64,
    ) -> VolResult<u64> {
        src.guard_closed()?;
        src.guard_readable()?;
        let chunk = count.min(TRANSFER_SIZE as u64) as usize;
        let mut buf = buffers::acquire(chunk);
        let mut transferred: u64 = 0;
        let result = loop {
            if transferred >= count {
                break Ok(transferred);
            }
            let want = (count - transferred).min(chunk as u64) as usize;
            let read = match src.read(&mut buf[..want]) {
                Ok(Some(n)) => n,
                Ok(None) => break Ok(transferred),
                Err(_) if transferred > 0 => break Ok(transferred),
                Err(err) => break Err(err),
            };
            let written = match self.write_at(&buf[..read], pos) {
                Ok(n) => n,
                Err(_) if transferred > 0 => break Ok(transferred),
                Err(err) => break Err(err),
            };
            transferred += written as u64;
            if written != read {
                break Ok(transferred);
            }
            pos += written as u64;
        };
        buffers::release(buf);
        result
    }

    fn transfer_from_loop(
        &mut self,
        source: &mut dyn ReadableChannel,
        mut pos: u64,
        count: u64,
        buf: &mut [u8],
    ) -> VolResult<u64> {
        let mut transferred: u64 = 0;
        while transferred < count {
            let want = (count - transferred).min(buf.len() as u64) as usize;
            let read = match source.read_chunk(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if transferred > 0 => {
                    tracing::debug!(%err, "transfer stopped after partial progress");
                    return Ok(transferred);
                }
                Err(err) => return Err(err),
            };
            let written = match self.write_at(&buf[..read], pos) {
                Ok(n) => n,
                Err(err) if transferred > 0 => {
                    tracing::debug!(%err, "transfer stopped after partial progress");
                    return Ok(transferred);
                }
                Err(err) => return Err(err),
            };
            transferred += written as u64;
            if written != read {
                break;
            }
            pos += written as u64;
        }
        Ok(transferred)
    }

    /// Memory-mapping is not supported by the native volume client.
    pub fn map(&self) -> VolResult<()> {
        Err(VolError::Unsupported("memory-mapping"))
    }

    /// Advisory locks are not supported by the native volume client.
    pub fn lock(&self) -> VolResult<()> {
        Err(VolError::Unsupported("file locks"))
    }

    /// Truncation is not supported by the native volume client.
    pub fn truncate(&mut self, _size: u64) -> VolResult<()> {
        Err(VolError::Unsupported("truncate"))
    }

    /// Release the descriptor. Closing twice is a no-op.
    pub fn close(&mut self) -> VolResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.volume.lib().close(self.fd) != 0 {
            return Err(self.native_error("close"));
        }
        Ok(())
    }
}

impl ReadableChannel for FileChannel {
    fn read_chunk(&mut self, buf: &mut [u8]) -> VolResult<usize> {
        Ok(self.read(buf)?.unwrap_or(0))
    }

    fn as_volume_channel(&mut self) -> Option<&mut FileChannel> {
        Some(self)
    }
}

impl WritableChannel for FileChannel {
    fn write_chunk(&mut self, buf: &[u8]) -> VolResult<usize> {
        self.write(buf)
    }

    fn as_volume_channel(&mut self) -> Option<&mut FileChannel> {
        Some(self)
    }
}

impl Drop for FileChannel {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            if self.volume.lib().close(self.fd) != 0 {
                tracing::warn!(path = %self.path, "closing leaked channel failed");
            }
        }
    }
}
