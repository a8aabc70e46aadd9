// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory implementation of [`VolumeLibrary`].
//!
//! Follows the native library's conventions to the letter: null handles and
//! negative counts on failure, errno-style last errors, `.`/`..` entries in
//! directory listings, and zero-filled holes for writes past end-of-file.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::client::{
    DirPtr, FilePtr, RawDirent, RawStat, RawStatvfs, RawTimespec, VolHandle, VolumeLibrary,
};

const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

const SYMLINK_DEPTH_LIMIT: u32 = 8;

fn now() -> RawTimespec {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    RawTimespec {
        tv_sec: elapsed.as_secs() as i64,
        tv_nsec: elapsed.subsec_nanos() as i64,
    }
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => "/",
    }
}

fn name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

#[derive(Clone, Debug)]
struct FakeNode {
    ino: u64,
    mode: u32,
    uid: u32,
    gid: u32,
    data: Vec<u8>,
    symlink: Option<String>,
    atime: RawTimespec,
    mtime: RawTimespec,
    ctime: RawTimespec,
}

impl FakeNode {
    fn new(ino: u64, mode: u32) -> FakeNode {
        let ts = now();
        FakeNode {
            ino,
            mode,
            uid: 0,
            gid: 0,
            data: Vec::new(),
            symlink: None,
            atime: ts,
            mtime: ts,
            ctime: ts,
        }
    }

    fn is_dir(&self) -> bool {
        self.mode & S_IFDIR == S_IFDIR && self.mode & S_IFLNK != S_IFLNK
    }

    fn is_symlink(&self) -> bool {
        self.mode & S_IFLNK == S_IFLNK
    }

    fn fill_stat(&self, out: &mut RawStat) {
        out.st_ino = self.ino;
        out.st_mode = self.mode;
        out.st_uid = self.uid;
        out.st_gid = self.gid;
        out.st_size = self.data.len() as i64;
        out.st_atime = self.atime.tv_sec;
        out.st_atime_nsec = self.atime.tv_nsec;
        out.st_mtime = self.mtime.tv_sec;
        out.st_mtime_nsec = self.mtime.tv_nsec;
        out.st_ctime = self.ctime.tv_sec;
        out.st_ctime_nsec = self.ctime.tv_nsec;
    }
}

#[derive(Debug)]
struct FakeVolume {
    #[allow(dead_code)]
    name: String,
    host: Option<String>,
    initialized: bool,
    nodes: BTreeMap<String, FakeNode>,
}

#[derive(Debug)]
struct FakeFd {
    vol: u64,
    path: String,
    offset: u64,
    append: bool,
}

#[derive(Debug)]
struct FakeCursor {
    entries: Vec<(String, u64)>,
    pos: usize,
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    next_ino: u64,
    volumes: HashMap<u64, FakeVolume>,
    fds: HashMap<u64, FakeFd>,
    cursors: HashMap<u64, FakeCursor>,
    errno: i32,
}

impl FakeState {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn alloc_ino(&mut self) -> u64 {
        self.next_ino += 1;
        self.next_ino
    }

    fn fail(&mut self, errno: i32) -> i32 {
        self.errno = errno;
        -1
    }

    /// Follow symlinks until a non-link node (or nothing) is reached.
    fn resolve(&self, vol: u64, path: &str) -> Option<String> {
        let volume = self.volumes.get(&vol)?;
        let mut current = path.to_string();
        for _ in 0..SYMLINK_DEPTH_LIMIT {
            let node = volume.nodes.get(&current)?;
            match &node.symlink {
                Some(target) if node.is_symlink() => {
                    current = if target.starts_with('/') {
                        target.clone()
                    } else {
                        format!("{}/{}", parent_of(&current).trim_end_matches('/'), target)
                    };
                }
                _ => return Some(current),
            }
        }
        None
    }

    fn children_of(&self, vol: u64, dir: &str) -> Vec<(String, u64)> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        let Some(volume) = self.volumes.get(&vol) else {
            return Vec::new();
        };
        volume
            .nodes
            .iter()
            .filter(|(path, _)| {
                path.starts_with(&prefix)
                    && path.len() > prefix.len()
                    && !path[prefix.len()..].contains('/')
            })
            .map(|(path, node)| (name_of(path).to_string(), node.ino))
            .collect()
    }
}

/// In-memory volume library.
#[derive(Debug, Default)]
pub struct FakeLibrary {
    state: Mutex<FakeState>,
}

impl FakeLibrary {
    pub fn new() -> FakeLibrary {
        FakeLibrary::default()
    }
}

impl VolumeLibrary for FakeLibrary {
    fn new_volume(&self, volname: &str) -> VolHandle {
        let mut state = self.state.lock().unwrap();
        let id = state.alloc_id();
        let root_ino = state.alloc_ino();
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), FakeNode::new(root_ino, S_IFDIR | 0o755));
        state.volumes.insert(
            id,
            FakeVolume {
                name: volname.to_string(),
                host: None,
                initialized: false,
                nodes,
            },
        );
        VolHandle(id)
    }

    fn set_volfile_server(&self, vol: VolHandle, _transport: &str, host: &str, _port: u16) -> i32 {
        let mut state = self.state.lock().unwrap();
        match state.volumes.get_mut(&vol.0) {
            Some(volume) => {
                volume.host = Some(host.to_string());
                0
            }
            None => state.fail(libc::EINVAL),
        }
    }

    fn init(&self, vol: VolHandle) -> i32 {
        let mut state = self.state.lock().unwrap();
        match state.volumes.get_mut(&vol.0) {
            Some(volume) => {
                volume.initialized = true;
                0
            }
            None => state.fail(libc::EINVAL),
        }
    }

    fn fini(&self, vol: VolHandle) -> i32 {
        let mut state = self.state.lock().unwrap();
        if state.volumes.remove(&vol.0).is_some() {
            0
        } else {
            state.fail(libc::EINVAL)
        }
    }

    fn set_fsuid(&self, _uid: u32) -> i32 {
        0
    }

    fn set_fsgid(&self, _gid: u32) -> i32 {
        0
    }

    fn open(&self, vol: VolHandle, path: &str, flags: i32) -> FilePtr {
        let mut state = self.state.lock().unwrap();
        let Some(resolved) = state.resolve(vol.0, path) else {
            state.errno = libc::ENOENT;
            return FilePtr::NULL;
        };
        let node = state
            .volumes
            .get_mut(&vol.0)
            .and_then(|volume| volume.nodes.get_mut(&resolved));
        let Some(node) = node else {
            state.errno = libc::ENOENT;
            return FilePtr::NULL;
        };
        if node.is_dir() {
            state.errno = libc::EISDIR;
            return FilePtr::NULL;
        }
        if flags & libc::O_TRUNC != 0 {
            node.data.clear();
            node.mtime = now();
        }
        let append = flags & libc::O_APPEND != 0;
        let id = state.alloc_id();
        state.fds.insert(
            id,
            FakeFd {
                vol: vol.0,
                path: resolved,
                offset: 0,
                append,
            },
        );
        FilePtr(id)
    }

    fn creat(&self, vol: VolHandle, path: &str, flags: i32, mode: u32) -> FilePtr {
        let exists = {
            let state = self.state.lock().unwrap();
            state
                .volumes
                .get(&vol.0)
                .is_some_and(|volume| volume.nodes.contains_key(path))
        };
        if exists {
            if flags & libc::O_EXCL != 0 {
                self.state.lock().unwrap().errno = libc::EEXIST;
                return FilePtr::NULL;
            }
            return self.open(vol, path, flags);
        }

        let mut state = self.state.lock().unwrap();
        let parent_exists = state
            .volumes
            .get(&vol.0)
            .and_then(|volume| volume.nodes.get(parent_of(path)))
            .is_some_and(FakeNode::is_dir);
        if !parent_exists {
            state.errno = libc::ENOENT;
            return FilePtr::NULL;
        }
        let ino = state.alloc_ino();
        let node = FakeNode::new(ino, S_IFREG | (mode & 0o7777));
        let append = flags & libc::O_APPEND != 0;
        state
            .volumes
            .get_mut(&vol.0)
            .expect("volume checked above")
            .nodes
            .insert(path.to_string(), node);
        let id = state.alloc_id();
        state.fds.insert(
            id,
            FakeFd {
                vol: vol.0,
                path: path.to_string(),
                offset: 0,
                append,
            },
        );
        FilePtr(id)
    }

    fn close(&self, fd: FilePtr) -> i32 {
        let mut state = self.state.lock().unwrap();
        if state.fds.remove(&fd.0).is_some() {
            0
        } else {
            state.fail(libc::EBADF)
        }
    }

    fn read(&self, fd: FilePtr, buf: &mut [u8]) -> i64 {
        let mut state = self.state.lock().unwrap();
        let Some(open) = state.fds.get(&fd.0) else {
            return state.fail(libc::EBADF) as i64;
        };
        let (vol, path, offset) = (open.vol, open.path.clone(), open.offset);
        let Some(node) = state.volumes.get(&vol).and_then(|volume| volume.nodes.get(&path)) else {
            return state.fail(libc::ENOENT) as i64;
        };
        let start = offset.min(node.data.len() as u64) as usize;
        let count = buf.len().min(node.data.len() - start);
        buf[..count].copy_from_slice(&node.data[start..start + count]);
        state.fds.get_mut(&fd.0).expect("fd checked above").offset = (start + count) as u64;
        count as i64
    }

    fn write(&self, fd: FilePtr, buf: &[u8]) -> i64 {
        let mut state = self.state.lock().unwrap();
        let Some(open) = state.fds.get(&fd.0) else {
            return state.fail(libc::EBADF) as i64;
        };
        let (vol, path, append) = (open.vol, open.path.clone(), open.append);
        let mut offset = open.offset;
        let Some(node) =
            state.volumes.get_mut(&vol).and_then(|volume| volume.nodes.get_mut(&path))
        else {
            return state.fail(libc::ENOENT) as i64;
        };
        if append {
            offset = node.data.len() as u64;
        }
        let end = offset as usize + buf.len();
        if end > node.data.len() {
            node.data.resize(end, 0);
        }
        node.data[offset as usize..end].copy_from_slice(buf);
        node.mtime = now();
        node.ctime = node.mtime;
        state.fds.get_mut(&fd.0).expect("fd checked above").offset = end as u64;
        buf.len() as i64
    }

    fn lseek(&self, fd: FilePtr, offset: i64, _whence: i32) -> i64 {
        let mut state = self.state.lock().unwrap();
        if offset < 0 {
            return state.fail(libc::EINVAL) as i64;
        }
        match state.fds.get_mut(&fd.0) {
            Some(open) => {
                open.offset = offset as u64;
                offset
            }
            None => state.fail(libc::EBADF) as i64,
        }
    }

    fn fsync(&self, fd: FilePtr) -> i32 {
        let mut state = self.state.lock().unwrap();
        if state.fds.contains_key(&fd.0) {
            0
        } else {
            state.fail(libc::EBADF)
        }
    }

    fn fstat(&self, fd: FilePtr, out: &mut RawStat) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(open) = state.fds.get(&fd.0) else {
            return state.fail(libc::EBADF);
        };
        let (vol, path) = (open.vol, open.path.clone());
        match state.volumes.get(&vol).and_then(|volume| volume.nodes.get(&path)) {
            Some(node) => {
                node.fill_stat(out);
                0
            }
            None => state.fail(libc::ENOENT),
        }
    }

    fn stat(&self, vol: VolHandle, path: &str, out: &mut RawStat) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(resolved) = state.resolve(vol.0, path) else {
            return state.fail(libc::ENOENT);
        };
        match state.volumes.get(&vol.0).and_then(|volume| volume.nodes.get(&resolved)) {
            Some(node) => {
                node.fill_stat(out);
                0
            }
            None => state.fail(libc::ENOENT),
        }
    }

    fn lstat(&self, vol: VolHandle, path: &str, out: &mut RawStat) -> i32 {
        let mut state = self.state.lock().unwrap();
        match state.volumes.get(&vol.0).and_then(|volume| volume.nodes.get(path)) {
            Some(node) => {
                node.fill_stat(out);
                0
            }
            None => state.fail(libc::ENOENT),
        }
    }

    fn mkdir(&self, vol: VolHandle, path: &str, mode: u32) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(volume) = state.volumes.get(&vol.0) else {
            return state.fail(libc::EINVAL);
        };
        if volume.nodes.contains_key(path) {
            return state.fail(libc::EEXIST);
        }
        if !volume.nodes.get(parent_of(path)).is_some_and(FakeNode::is_dir) {
            return state.fail(libc::ENOENT);
        }
        let ino = state.alloc_ino();
        let node = FakeNode::new(ino, S_IFDIR | (mode & 0o7777));
        state
            .volumes
            .get_mut(&vol.0)
            .expect("volume checked above")
            .nodes
            .insert(path.to_string(), node);
        0
    }

    fn rmdir(&self, vol: VolHandle, path: &str) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(node) = state.volumes.get(&vol.0).and_then(|volume| volume.nodes.get(path))
        else {
            return state.fail(libc::ENOENT);
        };
        if !node.is_dir() {
            return state.fail(libc::ENOTDIR);
        }
        if !state.children_of(vol.0, path).is_empty() {
            return state.fail(libc::ENOTEMPTY);
        }
        if path == "/" {
            return state.fail(libc::EBUSY);
        }
        state.volumes.get_mut(&vol.0).expect("volume checked above").nodes.remove(path);
        0
    }

    fn unlink(&self, vol: VolHandle, path: &str) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(node) = state.volumes.get(&vol.0).and_then(|volume| volume.nodes.get(path))
        else {
            return state.fail(libc::ENOENT);
        };
        if node.is_dir() {
            return state.fail(libc::EISDIR);
        }
        state.volumes.get_mut(&vol.0).expect("volume checked above").nodes.remove(path);
        0
    }

    fn rename(&self, vol: VolHandle, from: &str, to: &str) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(volume) = state.volumes.get_mut(&vol.0) else {
            return state.fail(libc::EINVAL);
        };
        if !volume.nodes.contains_key(from) {
            return state.fail(libc::ENOENT);
        }
        let prefix = format!("{from}/");
        let moved: Vec<String> = volume
            .nodes
            .keys()
            .filter(|path| *path == from || path.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            let node = volume.nodes.remove(&old).expect("key listed above");
            let new = format!("{to}{}", &old[from.len()..]);
            volume.nodes.insert(new, node);
        }
        0
    }

    fn symlink(&self, vol: VolHandle, target: &str, link: &str) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(volume) = state.volumes.get(&vol.0) else {
            return state.fail(libc::EINVAL);
        };
        if volume.nodes.contains_key(link) {
            return state.fail(libc::EEXIST);
        }
        if !volume.nodes.get(parent_of(link)).is_some_and(FakeNode::is_dir) {
            return state.fail(libc::ENOENT);
        }
        let ino = state.alloc_ino();
        let mut node = FakeNode::new(ino, S_IFLNK | 0o777);
        node.symlink = Some(target.to_string());
        node.data = target.as_bytes().to_vec();
        state
            .volumes
            .get_mut(&vol.0)
            .expect("volume checked above")
            .nodes
            .insert(link.to_string(), node);
        0
    }

    fn readlink(&self, vol: VolHandle, path: &str, buf: &mut [u8]) -> i64 {
        let mut state = self.state.lock().unwrap();
        let Some(node) = state.volumes.get(&vol.0).and_then(|volume| volume.nodes.get(path))
        else {
            return state.fail(libc::ENOENT) as i64;
        };
        let Some(target) = &node.symlink else {
            return state.fail(libc::EINVAL) as i64;
        };
        let count = buf.len().min(target.len());
        buf[..count].copy_from_slice(&target.as_bytes()[..count]);
        count as i64
    }

    fn chmod(&self, vol: VolHandle, path: &str, mode: u32) -> i32 {
        let mut state = self.state.lock().unwrap();
        match state.volumes.get_mut(&vol.0).and_then(|volume| volume.nodes.get_mut(path)) {
            Some(node) => {
                node.mode = (node.mode & !0o7777) | (mode & 0o7777);
                node.ctime = now();
                0
            }
            None => state.fail(libc::ENOENT),
        }
    }

    fn utimens(&self, vol: VolHandle, path: &str, times: [RawTimespec; 2]) -> i32 {
        let mut state = self.state.lock().unwrap();
        match state.volumes.get_mut(&vol.0).and_then(|volume| volume.nodes.get_mut(path)) {
            Some(node) => {
                node.atime = times[0];
                node.mtime = times[1];
                node.ctime = now();
                0
            }
            None => state.fail(libc::ENOENT),
        }
    }

    fn access(&self, vol: VolHandle, path: &str, mode: i32) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(resolved) = state.resolve(vol.0, path) else {
            return state.fail(libc::ENOENT);
        };
        let Some(node) = state.volumes.get(&vol.0).and_then(|volume| volume.nodes.get(&resolved))
        else {
            return state.fail(libc::ENOENT);
        };
        // The caller is treated as the owner.
        let mode_bits = node.mode;
        let mut required = 0;
        if mode & 4 != 0 {
            required |= 0o400;
        }
        if mode & 2 != 0 {
            required |= 0o200;
        }
        if mode & 1 != 0 {
            required |= 0o100;
        }
        if mode_bits & required == required {
            0
        } else {
            state.fail(libc::EACCES)
        }
    }

    fn statvfs(&self, vol: VolHandle, _path: &str, out: &mut RawStatvfs) -> i32 {
        let mut state = self.state.lock().unwrap();
        if !state.volumes.contains_key(&vol.0) {
            return state.fail(libc::EINVAL);
        }
        out.f_bsize = 4096;
        out.f_blocks = 1 << 20;
        out.f_bfree = 1 << 19;
        out.f_bavail = 1 << 18;
        0
    }

    fn opendir(&self, vol: VolHandle, path: &str) -> DirPtr {
        let mut state = self.state.lock().unwrap();
        let Some(node) = state.volumes.get(&vol.0).and_then(|volume| volume.nodes.get(path))
        else {
            state.errno = libc::ENOENT;
            return DirPtr::NULL;
        };
        if !node.is_dir() {
            state.errno = libc::ENOTDIR;
            return DirPtr::NULL;
        }
        let dir_ino = node.ino;
        let mut entries = vec![(".".to_string(), dir_ino), ("..".to_string(), dir_ino)];
        entries.extend(state.children_of(vol.0, path));
        let id = state.alloc_id();
        state.cursors.insert(id, FakeCursor { entries, pos: 0 });
        DirPtr(id)
    }

    fn readdir(&self, dir: DirPtr, entry: &mut RawDirent) -> i32 {
        let mut state = self.state.lock().unwrap();
        let Some(cursor) = state.cursors.get_mut(&dir.0) else {
            return state.fail(libc::EBADF);
        };
        if cursor.pos < cursor.entries.len() {
            let (name, ino) = cursor.entries[cursor.pos].clone();
            cursor.pos += 1;
            entry.d_name = name;
            entry.d_ino = ino;
        } else {
            entry.d_name.clear();
            entry.d_ino = 0;
        }
        0
    }

    fn closedir(&self, dir: DirPtr) -> i32 {
        let mut state = self.state.lock().unwrap();
        if state.cursors.remove(&dir.0).is_some() {
            0
        } else {
            state.fail(libc::EBADF)
        }
    }

    fn last_error(&self) -> String {
        let errno = self.state.lock().unwrap().errno;
        std::io::Error::from_raw_os_error(errno).to_string()
    }
}
