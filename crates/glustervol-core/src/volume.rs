// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Volume handles and the process-wide registry.
//!
//! A [`Volume`] wraps one native connection to a `host:volume` authority.
//! The [`VolumeRegistry`] caches at most one live handle per authority and
//! serializes every mutation (insert, evict, close) behind one mutex so two
//! callers can never race to finalize the same native client or to reconnect
//! an authority that is concurrently being evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::client::{RawStatvfs, VolHandle, VolumeLibrary, GLUSTERD_PORT, TCP};
use crate::config::ConnectOptions;
use crate::error::{VolError, VolResult};
use crate::path::VolPath;

/// One open connection to a remote volume.
pub struct Volume {
    host: String,
    volname: String,
    handle: VolHandle,
    open: AtomicBool,
    lib: Arc<dyn VolumeLibrary>,
}

impl std::fmt::Debug for Volume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Volume")
            .field("host", &self.host)
            .field("volname", &self.volname)
            .field("open", &self.is_open())
            .finish()
    }
}

impl PartialEq for Volume {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.volname == other.volname
    }
}

impl Eq for Volume {}

impl Volume {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn volname(&self) -> &str {
        &self.volname
    }

    /// The `host:volume` string this handle is registered under.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.volname)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// The native handle, or `Closed` once the volume has been finalized.
    pub(crate) fn native(&self) -> VolResult<VolHandle> {
        if self.is_open() {
            Ok(self.handle)
        } else {
            Err(VolError::Closed("volume"))
        }
    }

    pub(crate) fn lib(&self) -> &Arc<dyn VolumeLibrary> {
        &self.lib
    }

    pub(crate) fn native_error(&self, op: &'static str, path: &str) -> VolError {
        VolError::Native {
            op,
            path: path.to_string(),
            volume: self.volname.clone(),
            detail: self.lib.last_error(),
        }
    }

    /// The root path of this volume.
    pub fn root(self: &Arc<Self>) -> VolPath {
        VolPath::new(self, "/")
    }

    /// Parse an in-volume path string against this volume.
    pub fn path(self: &Arc<Self>, raw: &str) -> VolPath {
        VolPath::new(self, raw)
    }

    fn statvfs(&self) -> VolResult<RawStatvfs> {
        let handle = self.native()?;
        let mut out = RawStatvfs::default();
        if self.lib.statvfs(handle, "/", &mut out) != 0 {
            return Err(self.native_error("statvfs", "/"));
        }
        Ok(out)
    }

    pub fn total_space(&self) -> VolResult<u64> {
        let vfs = self.statvfs()?;
        Ok(vfs.f_bsize * vfs.f_blocks)
    }

    pub fn usable_space(&self) -> VolResult<u64> {
        let vfs = self.statvfs()?;
        Ok(vfs.f_bsize * vfs.f_bavail)
    }

    pub fn unallocated_space(&self) -> VolResult<u64> {
        let vfs = self.statvfs()?;
        Ok(vfs.f_bsize * vfs.f_bfree)
    }
}

/// Split `host:volume` into its parts, both non-empty.
pub(crate) fn parse_authority(authority: &str) -> VolResult<(&str, &str)> {
    let mut parts = authority.splitn(2, ':');
    let host = parts.next().unwrap_or("");
    let volume = parts.next().unwrap_or("");
    if host.is_empty() || volume.is_empty() || volume.contains(':') {
        return Err(VolError::InvalidAuthority(authority.to_string()));
    }
    Ok((host, volume))
}

/// Authority-keyed cache of open volume handles.
pub struct VolumeRegistry {
    lib: Arc<dyn VolumeLibrary>,
    defaults: ConnectOptions,
    volumes: Mutex<HashMap<String, Arc<Volume>>>,
}

impl VolumeRegistry {
    pub fn new(lib: Arc<dyn VolumeLibrary>) -> Self {
        Self::with_defaults(lib, ConnectOptions::from_env())
    }

    pub fn with_defaults(lib: Arc<dyn VolumeLibrary>, defaults: ConnectOptions) -> Self {
        Self {
            lib,
            defaults,
            volumes: Mutex::new(HashMap::new()),
        }
    }

    /// Connect to `host:volume`, reusing a cached open handle when present.
    ///
    /// The whole sequence runs under the registry lock: create the native
    /// client, bind it to the host's control plane, apply identity
    /// overrides, initialize, insert.
    pub fn connect(&self, authority: &str, opts: ConnectOptions) -> VolResult<Arc<Volume>> {
        let (host, volname) = parse_authority(authority)?;
        let mut volumes = self.volumes.lock().unwrap();

        if let Some(existing) = volumes.get(authority) {
            if existing.is_open() {
                return Ok(existing.clone());
            }
            tracing::debug!(authority, "evicting closed volume handle before reconnect");
            volumes.remove(authority);
        }

        let volume = self.establish(host, volname, opts.or(self.defaults))?;
        volumes.insert(authority.to_string(), volume.clone());
        Ok(volume)
    }

    fn establish(&self, host: &str, volname: &str, opts: ConnectOptions) -> VolResult<Arc<Volume>> {
        let handle = self.lib.new_volume(volname);
        if handle.is_null() {
            return Err(VolError::Native {
                op: "new_volume",
                path: String::new(),
                volume: volname.to_string(),
                detail: self.lib.last_error(),
            });
        }

        if self.lib.set_volfile_server(handle, TCP, host, GLUSTERD_PORT) != 0 {
            let detail = self.lib.last_error();
            self.lib.fini(handle);
            return Err(VolError::Native {
                op: "set_volfile_server",
                path: String::new(),
                volume: volname.to_string(),
                detail,
            });
        }

        // Identity overrides are best-effort: a failure is reported but must
        // not abort the connection.
        if let Some(uid) = opts.uid {
            if self.lib.set_fsuid(uid) != 0 {
                tracing::warn!(uid, volume = volname, "failed to apply fsuid override");
            }
        }
        if let Some(gid) = opts.gid {
            if self.lib.set_fsgid(gid) != 0 {
                tracing::warn!(gid, volume = volname, "failed to apply fsgid override");
            }
        }

        if self.lib.init(handle) != 0 {
            let detail = self.lib.last_error();
            self.lib.fini(handle);
            return Err(VolError::Native {
                op: "init",
                path: String::new(),
                volume: volname.to_string(),
                detail,
            });
        }

        tracing::info!(host, volume = volname, "connected to volume");
        Ok(Arc::new(Volume {
            host: host.to_string(),
            volname: volname.to_string(),
            handle,
            open: AtomicBool::new(true),
            lib: self.lib.clone(),
        }))
    }

    /// Look up a cached handle. A handle observed closed is evicted and
    /// reported as not found; callers must reconnect.
    pub fn lookup(&self, authority: &str) -> VolResult<Arc<Volume>> {
        parse_authority(authority)?;
        let mut volumes = self.volumes.lock().unwrap();
        match volumes.get(authority) {
            Some(volume) if volume.is_open() => Ok(volume.clone()),
            Some(_) => {
                tracing::debug!(authority, "evicting closed volume handle");
                volumes.remove(authority);
                Err(VolError::NotFound(authority.to_string()))
            }
            None => Err(VolError::NotFound(authority.to_string())),
        }
    }

    /// Finalize a handle exactly once and drop every registry entry that
    /// points at it (a handle may be registered under more than one
    /// equivalent authority string).
    pub fn close(&self, volume: &Arc<Volume>) -> VolResult<()> {
        let mut volumes = self.volumes.lock().unwrap();
        volumes.retain(|_, cached| !Arc::ptr_eq(cached, volume));

        if volume.open.swap(false, Ordering::SeqCst) {
            if self.lib.fini(volume.handle) != 0 {
                return Err(VolError::Native {
                    op: "fini",
                    path: String::new(),
                    volume: volume.volname.clone(),
                    detail: self.lib.last_error(),
                });
            }
        }
        Ok(())
    }
}
