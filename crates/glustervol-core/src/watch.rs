// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Polling change-notification engine.
//!
//! The native volume client has no event primitive, so watching a directory
//! means re-listing it on a fixed interval and diffing against the last
//! observation. Each registered directory gets a [`WatchKey`] holding the
//! per-child event map and a last-poll watermark; the shared [`WatchService`]
//! scans ready keys, queues those that produced new events, and hands one
//! back per poll.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::attr::FileAttributes;
use crate::client::RawStat;
use crate::config::WatchConfig;
use crate::dir::DirectoryStream;
use crate::error::{VolError, VolResult};
use crate::path::VolPath;
use crate::types::WatchKind;
use crate::volume::Volume;

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or(0)
}

/// One observed change on a watched directory's child.
///
/// The same event object is reclassified in place as the child keeps
/// changing: a deleted child that reappears flips back to `Create` with a
/// reset repeat count.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    /// The child's file name, relative to the watched directory.
    pub path: VolPath,
    pub kind: WatchKind,
    pub count: u32,
    /// Epoch milliseconds of the change that produced the current kind.
    pub last_modified: i64,
}

struct KeyState {
    valid: bool,
    ready: bool,
    kinds: Vec<WatchKind>,
    events: HashMap<VolPath, WatchEvent>,
    last_polled: i64,
}

/// Per-watched-directory state.
pub struct WatchKey {
    path: VolPath,
    state: Mutex<KeyState>,
}

impl WatchKey {
    fn new(path: VolPath, kinds: &[WatchKind]) -> Arc<WatchKey> {
        Arc::new(WatchKey {
            path,
            state: Mutex::new(KeyState {
                valid: true,
                ready: true,
                kinds: kinds.to_vec(),
                events: HashMap::new(),
                last_polled: now_millis(),
            }),
        })
    }

    /// The watched directory.
    pub fn path(&self) -> &VolPath {
        &self.path
    }

    pub fn is_valid(&self) -> bool {
        self.state.lock().unwrap().valid
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state.lock().unwrap().ready
    }

    fn set_kinds(&self, kinds: &[WatchKind]) {
        self.state.lock().unwrap().kinds = kinds.to_vec();
    }

    /// Invalidate the key. Cancelling twice is a no-op.
    pub fn cancel(&self) {
        self.state.lock().unwrap().valid = false;
    }

    /// Drain the pending batch.
    ///
    /// Returns a non-empty batch at most once per [`reset`](Self::reset):
    /// the first call flips the key to not-ready, and further calls yield an
    /// empty batch without side effects until the key is reset.
    pub fn poll_events(&self) -> Vec<WatchEvent> {
        let mut state = self.state.lock().unwrap();
        if !state.ready {
            return Vec::new();
        }
        state.ready = false;
        Self::find_pending_events(&mut state)
    }

    fn find_pending_events(state: &mut KeyState) -> Vec<WatchEvent> {
        let mut max_modified = state.last_polled;
        let mut pending = Vec::new();
        for event in state.events.values() {
            if event.last_modified > state.last_polled && state.kinds.contains(&event.kind) {
                pending.push(event.clone());
            }
            max_modified = max_modified.max(event.last_modified);
        }
        state.last_polled = max_modified;
        pending
    }

    /// Re-arm the key after a batch has been drained. Returns false on a
    /// cancelled or still-ready key.
    pub fn reset(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.valid || state.ready {
            false
        } else {
            state.ready = true;
            true
        }
    }

    /// Re-list the watched directory and fold the differences into the
    /// event map. Returns true when at least one event became pending.
    pub(crate) fn update(&self) -> bool {
        let Ok(volume) = self.path.volume() else {
            return false;
        };

        let mut listed = Vec::new();
        let mut new_events = false;
        let mut state = self.state.lock().unwrap();

        let Ok(mut stream) = DirectoryStream::open(volume.clone(), self.path.clone(), None) else {
            return false;
        };
        let Ok(entries) = stream.iter() else {
            return false;
        };
        for entry in entries {
            let Ok(child) = entry else {
                break;
            };
            let Some(attrs) = stat_child(&volume, &child) else {
                // Present in the listing; a failed stat must not read as a
                // deletion.
                listed.push(child);
                continue;
            };
            if attrs.is_directory() {
                continue;
            }
            new_events |= Self::process_existing(&mut state, &child, attrs.mtime_millis());
            listed.push(child);
        }

        for (child, event) in state.events.iter_mut() {
            if !listed.contains(child) && event.kind != WatchKind::Delete {
                event.last_modified = now_millis();
                event.kind = WatchKind::Delete;
                event.count += 1;
                new_events = true;
            }
        }

        new_events
    }

    fn process_existing(state: &mut KeyState, child: &VolPath, modified: i64) -> bool {
        let last_polled = state.last_polled;
        match state.events.get_mut(child) {
            Some(event) => {
                if modified <= event.last_modified {
                    return false;
                }
                event.last_modified = modified;
                if event.kind == WatchKind::Delete {
                    // The entry was deleted and has reappeared.
                    event.kind = WatchKind::Create;
                    event.count = 0;
                } else {
                    event.kind = WatchKind::Modify;
                    event.count += 1;
                }
                true
            }
            None => {
                let name = child.file_name_path().unwrap_or_else(|| child.clone());
                state.events.insert(
                    child.clone(),
                    WatchEvent {
                        path: name,
                        kind: WatchKind::Create,
                        count: 0,
                        last_modified: modified,
                    },
                );
                modified > last_polled
            }
        }
    }
}

fn stat_child(volume: &Arc<Volume>, child: &VolPath) -> Option<FileAttributes> {
    let native = volume.native().ok()?;
    let mut stat = RawStat::default();
    if volume.lib().stat(native, &child.native_path(), &mut stat) != 0 {
        return None;
    }
    Some(FileAttributes::from_stat(&stat))
}

struct ServiceState {
    running: bool,
    keys: Vec<Arc<WatchKey>>,
    pending: Vec<Arc<WatchKey>>,
}

/// Shared polling service over all registered watch keys.
pub struct WatchService {
    period: Duration,
    state: Mutex<ServiceState>,
}

impl Default for WatchService {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchService {
    pub fn new() -> WatchService {
        Self::with_config(WatchConfig::default())
    }

    pub fn with_config(config: WatchConfig) -> WatchService {
        WatchService {
            period: config.period(),
            state: Mutex::new(ServiceState {
                running: true,
                keys: Vec::new(),
                pending: Vec::new(),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().running
    }

    /// Register a directory. Re-registering an already-watched path updates
    /// its kind set and returns the existing key.
    pub fn register(&self, path: &VolPath, kinds: &[WatchKind]) -> VolResult<Arc<WatchKey>> {
        let mut state = self.state.lock().unwrap();
        if !state.running {
            return Err(VolError::Closed("watch service"));
        }
        if let Some(existing) = state.keys.iter().find(|key| key.path() == path) {
            existing.set_kinds(kinds);
            return Ok(existing.clone());
        }
        let key = WatchKey::new(path.clone(), kinds);
        state.keys.push(key.clone());
        Ok(key)
    }

    /// One scan: drain an already-pending key, or update every
    /// valid-and-ready key and queue those with fresh events.
    pub fn poll(&self) -> VolResult<Option<Arc<WatchKey>>> {
        let keys = {
            let mut state = self.state.lock().unwrap();
            if !state.running {
                return Err(VolError::Closed("watch service"));
            }
            if let Some(pending) = state.pending.pop() {
                return Ok(Some(pending));
            }
            state.keys.clone()
        };

        // Updates run native calls; the service lock stays released.
        let mut fresh = Vec::new();
        for key in keys {
            if key.is_valid() && key.is_ready() && key.update() {
                fresh.push(key);
            }
        }

        let mut state = self.state.lock().unwrap();
        if !state.running {
            return Err(VolError::Closed("watch service"));
        }
        for key in fresh {
            if !state.pending.iter().any(|queued| Arc::ptr_eq(queued, &key)) {
                state.pending.push(key);
            }
        }
        Ok(state.pending.pop())
    }

    /// Poll repeatedly until a key is available or `timeout` elapses.
    /// Returns `None` on timeout, within one polling interval of it.
    pub fn poll_timeout(&self, timeout: Duration) -> VolResult<Option<Arc<WatchKey>>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(key) = self.poll()? {
                return Ok(Some(key));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(self.period);
        }
    }

    /// Block until a key is available or the service is closed.
    pub fn take(&self) -> VolResult<Arc<WatchKey>> {
        loop {
            if let Some(key) = self.poll()? {
                return Ok(key);
            }
            std::thread::sleep(self.period);
        }
    }

    /// Cancel every key and shut the service. Closing twice is a no-op;
    /// polls after close fail with a closed-service error.
    pub fn close(&self) {
        let mut state = self.state.lock().unwrap();
        if state.running {
            state.running = false;
            for key in &state.keys {
                key.cancel();
            }
            tracing::debug!(keys = state.keys.len(), "watch service closed");
        }
    }
}
