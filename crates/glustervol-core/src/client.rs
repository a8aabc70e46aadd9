// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Boundary trait over the native volume client library.
//!
//! `VolumeLibrary` mirrors the C surface one-to-one and keeps its failure
//! conventions: constructors return null handles, counts go negative, and
//! everything else reports a non-zero status code. Translation into
//! [`VolError`](crate::error::VolError) happens in the components that call
//! through this trait, never here.

/// Control-plane port of the volume server.
pub const GLUSTERD_PORT: u16 = 24007;

/// Transport used when binding to the control plane.
pub const TCP: &str = "tcp";

/// Seek relative to the start of the file. The only whence the adapter uses.
pub const SEEK_SET: i32 = 0;

/// Opaque per-volume native handle. Zero is the null handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VolHandle(pub(crate) u64);

impl VolHandle {
    pub const NULL: VolHandle = VolHandle(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Opaque native file descriptor. Zero is the null descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilePtr(pub(crate) u64);

impl FilePtr {
    pub const NULL: FilePtr = FilePtr(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Opaque native directory cursor. Zero is the null cursor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DirPtr(pub(crate) u64);

impl DirPtr {
    pub const NULL: DirPtr = DirPtr(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Stat fields exchanged with the native layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawStat {
    pub st_ino: u64,
    pub st_mode: u32,
    pub st_uid: u32,
    pub st_gid: u32,
    pub st_size: i64,
    pub st_atime: i64,
    pub st_atime_nsec: i64,
    pub st_mtime: i64,
    pub st_mtime_nsec: i64,
    pub st_ctime: i64,
    pub st_ctime_nsec: i64,
}

/// statvfs fields consumed by the capacity queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawStatvfs {
    pub f_bsize: u64,
    pub f_blocks: u64,
    pub f_bfree: u64,
    pub f_bavail: u64,
}

/// One directory entry as produced by the native cursor.
///
/// An inode of zero marks the end of the directory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawDirent {
    pub d_ino: u64,
    pub d_name: String,
}

/// Timespec pair for utimens (atime, mtime).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawTimespec {
    pub tv_sec: i64,
    pub tv_nsec: i64,
}

/// The native volume client library, one method per C entry point.
///
/// Implementations: [`GfapiLibrary`] (feature `gfapi`) over the real
/// libgfapi, and `testing::fake::FakeLibrary` for tests.
#[cfg_attr(test, mockall::automock)]
pub trait VolumeLibrary: Send + Sync {
    fn new_volume(&self, volname: &str) -> VolHandle;
    fn set_volfile_server(&self, vol: VolHandle, transport: &str, host: &str, port: u16) -> i32;
    fn init(&self, vol: VolHandle) -> i32;
    fn fini(&self, vol: VolHandle) -> i32;
    fn set_fsuid(&self, uid: u32) -> i32;
    fn set_fsgid(&self, gid: u32) -> i32;

    fn open(&self, vol: VolHandle, path: &str, flags: i32) -> FilePtr;
    fn creat(&self, vol: VolHandle, path: &str, flags: i32, mode: u32) -> FilePtr;
    fn close(&self, fd: FilePtr) -> i32;

    fn read(&self, fd: FilePtr, buf: &mut [u8]) -> i64;
    fn write(&self, fd: FilePtr, buf: &[u8]) -> i64;
    fn lseek(&self, fd: FilePtr, offset: i64, whence: i32) -> i64;
    fn fsync(&self, fd: FilePtr) -> i32;
    fn fstat(&self, fd: FilePtr, out: &mut RawStat) -> i32;

    fn stat(&self, vol: VolHandle, path: &str, out: &mut RawStat) -> i32;
    fn lstat(&self, vol: VolHandle, path: &str, out: &mut RawStat) -> i32;

    fn mkdir(&self, vol: VolHandle, path: &str, mode: u32) -> i32;
    fn rmdir(&self, vol: VolHandle, path: &str) -> i32;
    fn unlink(&self, vol: VolHandle, path: &str) -> i32;
    fn rename(&self, vol: VolHandle, from: &str, to: &str) -> i32;

    fn symlink(&self, vol: VolHandle, target: &str, link: &str) -> i32;
    fn readlink(&self, vol: VolHandle, path: &str, buf: &mut [u8]) -> i64;

    fn chmod(&self, vol: VolHandle, path: &str, mode: u32) -> i32;
    fn utimens(&self, vol: VolHandle, path: &str, times: [RawTimespec; 2]) -> i32;
    fn access(&self, vol: VolHandle, path: &str, mode: i32) -> i32;
    fn statvfs(&self, vol: VolHandle, path: &str, out: &mut RawStatvfs) -> i32;

    fn opendir(&self, vol: VolHandle, path: &str) -> DirPtr;
    fn readdir(&self, dir: DirPtr, entry: &mut RawDirent) -> i32;
    fn closedir(&self, dir: DirPtr) -> i32;

    /// Human-readable description of the last native failure.
    fn last_error(&self) -> String;
}

#[cfg(feature = "gfapi")]
pub use gfapi_impl::GfapiLibrary;

#[cfg(feature = "gfapi")]
mod gfapi_impl {
    use super::*;
    use std::ffi::{CStr, CString};

    /// libgfapi-backed implementation of [`VolumeLibrary`].
    #[derive(Debug, Default)]
    pub struct GfapiLibrary;

    impl GfapiLibrary {
        pub fn new() -> Self {
            Self
        }
    }

    fn cstr(s: &str) -> CString {
        // Interior NULs cannot come from parsed paths; map them to an empty
        // string so the native call fails with a clean ENOENT instead.
        CString::new(s).unwrap_or_default()
    }

    fn vol(handle: VolHandle) -> *mut gfapi_sys::glfs_t {
        handle.0 as *mut gfapi_sys::glfs_t
    }

    fn fd(ptr: FilePtr) -> *mut gfapi_sys::glfs_fd_t {
        ptr.0 as *mut gfapi_sys::glfs_fd_t
    }

    fn dirp(ptr: DirPtr) -> *mut gfapi_sys::glfs_fd_t {
        ptr.0 as *mut gfapi_sys::glfs_fd_t
    }

    fn fill_stat(out: &mut RawStat, st: &libc::stat) {
        out.st_ino = st.st_ino as u64;
        out.st_mode = st.st_mode as u32;
        out.st_uid = st.st_uid;
        out.st_gid = st.st_gid;
        out.st_size = st.st_size as i64;
        out.st_atime = st.st_atime as i64;
        out.st_atime_nsec = st.st_atime_nsec as i64;
        out.st_mtime = st.st_mtime as i64;
        out.st_mtime_nsec = st.st_mtime_nsec as i64;
        out.st_ctime = st.st_ctime as i64;
        out.st_ctime_nsec = st.st_ctime_nsec as i64;
    }

    impl VolumeLibrary for GfapiLibrary {
        fn new_volume(&self, volname: &str) -> VolHandle {
            let volname = cstr(volname);
            VolHandle(unsafe { gfapi_sys::glfs_new(volname.as_ptr()) } as u64)
        }

        fn set_volfile_server(
            &self,
            vol_h: VolHandle,
            transport: &str,
            host: &str,
            port: u16,
        ) -> i32 {
            let transport = cstr(transport);
            let host = cstr(host);
            unsafe {
                gfapi_sys::glfs_set_volfile_server(
                    vol(vol_h),
                    transport.as_ptr(),
                    host.as_ptr(),
                    port as libc::c_int,
                )
            }
        }

        fn init(&self, vol_h: VolHandle) -> i32 {
            unsafe { gfapi_sys::glfs_init(vol(vol_h)) }
        }

        fn fini(&self, vol_h: VolHandle) -> i32 {
            unsafe { gfapi_sys::glfs_fini(vol(vol_h)) }
        }

        fn set_fsuid(&self, uid: u32) -> i32 {
            unsafe { gfapi_sys::glfs_setfsuid(uid) }
        }

        fn set_fsgid(&self, gid: u32) -> i32 {
            unsafe { gfapi_sys::glfs_setfsgid(gid) }
        }

        fn open(&self, vol_h: VolHandle, path: &str, flags: i32) -> FilePtr {
            let path = cstr(path);
            FilePtr(unsafe { gfapi_sys::glfs_open(vol(vol_h), path.as_ptr(), flags) } as u64)
        }

        fn creat(&self, vol_h: VolHandle, path: &str, flags: i32, mode: u32) -> FilePtr {
            let path = cstr(path);
            FilePtr(unsafe {
                gfapi_sys::glfs_creat(vol(vol_h), path.as_ptr(), flags, mode as libc::mode_t)
            } as u64)
        }

        fn close(&self, fd_p: FilePtr) -> i32 {
            unsafe { gfapi_sys::glfs_close(fd(fd_p)) }
        }

        fn read(&self, fd_p: FilePtr, buf: &mut [u8]) -> i64 {
            unsafe {
                gfapi_sys::glfs_read(fd(fd_p), buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
                    as i64
            }
        }

        fn write(&self, fd_p: FilePtr, buf: &[u8]) -> i64 {
            unsafe {
                gfapi_sys::glfs_write(fd(fd_p), buf.as_ptr() as *const libc::c_void, buf.len(), 0)
                    as i64
            }
        }

        fn lseek(&self, fd_p: FilePtr, offset: i64, whence: i32) -> i64 {
            unsafe { gfapi_sys::glfs_lseek(fd(fd_p), offset as libc::off_t, whence) as i64 }
        }

        fn fsync(&self, fd_p: FilePtr) -> i32 {
            unsafe { gfapi_sys::glfs_fsync(fd(fd_p)) }
        }

        fn fstat(&self, fd_p: FilePtr, out: &mut RawStat) -> i32 {
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            let ret = unsafe { gfapi_sys::glfs_fstat(fd(fd_p), &mut st) };
            if ret == 0 {
                fill_stat(out, &st);
            }
            ret
        }

        fn stat(&self, vol_h: VolHandle, path: &str, out: &mut RawStat) -> i32 {
            let path = cstr(path);
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            let ret = unsafe { gfapi_sys::glfs_stat(vol(vol_h), path.as_ptr(), &mut st) };
            if ret == 0 {
                fill_stat(out, &st);
            }
            ret
        }

        fn lstat(&self, vol_h: VolHandle, path: &str, out: &mut RawStat) -> i32 {
            let path = cstr(path);
            let mut st: libc::stat = unsafe { std::mem::zeroed() };
            let ret = unsafe { gfapi_sys::glfs_lstat(vol(vol_h), path.as_ptr(), &mut st) };
            if ret == 0 {
                fill_stat(out, &st);
            }
            ret
        }

        fn mkdir(&self, vol_h: VolHandle, path: &str, mode: u32) -> i32 {
            let path = cstr(path);
            unsafe { gfapi_sys::glfs_mkdir(vol(vol_h), path.as_ptr(), mode as libc::mode_t) }
        }

        fn rmdir(&self, vol_h: VolHandle, path: &str) -> i32 {
            let path = cstr(path);
            unsafe { gfapi_sys::glfs_rmdir(vol(vol_h), path.as_ptr()) }
        }

        fn unlink(&self, vol_h: VolHandle, path: &str) -> i32 {
            let path = cstr(path);
            unsafe { gfapi_sys::glfs_unlink(vol(vol_h), path.as_ptr()) }
        }

        fn rename(&self, vol_h: VolHandle, from: &str, to: &str) -> i32 {
            let from = cstr(from);
            let to = cstr(to);
            unsafe { gfapi_sys::glfs_rename(vol(vol_h), from.as_ptr(), to.as_ptr()) }
        }

        fn symlink(&self, vol_h: VolHandle, target: &str, link: &str) -> i32 {
            let target = cstr(target);
            let link = cstr(link);
            unsafe { gfapi_sys::glfs_symlink(vol(vol_h), target.as_ptr(), link.as_ptr()) }
        }

        fn readlink(&self, vol_h: VolHandle, path: &str, buf: &mut [u8]) -> i64 {
            let path = cstr(path);
            unsafe {
                gfapi_sys::glfs_readlink(
                    vol(vol_h),
                    path.as_ptr(),
                    buf.as_mut_ptr() as *mut libc::c_char,
                    buf.len(),
                ) as i64
            }
        }

        fn chmod(&self, vol_h: VolHandle, path: &str, mode: u32) -> i32 {
            let path = cstr(path);
            unsafe { gfapi_sys::glfs_chmod(vol(vol_h), path.as_ptr(), mode as libc::mode_t) }
        }

        fn utimens(&self, vol_h: VolHandle, path: &str, times: [RawTimespec; 2]) -> i32 {
            let path = cstr(path);
            let native: [libc::timespec; 2] = [
                libc::timespec {
                    tv_sec: times[0].tv_sec as libc::time_t,
                    tv_nsec: times[0].tv_nsec as libc::c_long,
                },
                libc::timespec {
                    tv_sec: times[1].tv_sec as libc::time_t,
                    tv_nsec: times[1].tv_nsec as libc::c_long,
                },
            ];
            unsafe { gfapi_sys::glfs_utimens(vol(vol_h), path.as_ptr(), native.as_ptr()) }
        }

        fn access(&self, vol_h: VolHandle, path: &str, mode: i32) -> i32 {
            let path = cstr(path);
            unsafe { gfapi_sys::glfs_access(vol(vol_h), path.as_ptr(), mode) }
        }

        fn statvfs(&self, vol_h: VolHandle, path: &str, out: &mut RawStatvfs) -> i32 {
            let path = cstr(path);
            let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
            let ret = unsafe { gfapi_sys::glfs_statvfs(vol(vol_h), path.as_ptr(), &mut st) };
            if ret == 0 {
                out.f_bsize = st.f_bsize as u64;
                out.f_blocks = st.f_blocks as u64;
                out.f_bfree = st.f_bfree as u64;
                out.f_bavail = st.f_bavail as u64;
            }
            ret
        }

        fn opendir(&self, vol_h: VolHandle, path: &str) -> DirPtr {
            let path = cstr(path);
            DirPtr(unsafe { gfapi_sys::glfs_opendir(vol(vol_h), path.as_ptr()) } as u64)
        }

        fn readdir(&self, dir: DirPtr, entry: &mut RawDirent) -> i32 {
            let mut ent: libc::dirent = unsafe { std::mem::zeroed() };
            let mut result: *mut libc::dirent = std::ptr::null_mut();
            let ret = unsafe { gfapi_sys::glfs_readdir_r(dirp(dir), &mut ent, &mut result) };
            if ret != 0 {
                return ret;
            }
            if result.is_null() {
                // End of directory: surface the inode-zero terminal entry.
                entry.d_ino = 0;
                entry.d_name.clear();
                return 0;
            }
            entry.d_ino = ent.d_ino as u64;
            entry.d_name = unsafe { CStr::from_ptr(ent.d_name.as_ptr()) }
                .to_string_lossy()
                .into_owned();
            0
        }

        fn closedir(&self, dir: DirPtr) -> i32 {
            unsafe { gfapi_sys::glfs_closedir(dirp(dir)) }
        }

        fn last_error(&self) -> String {
            std::io::Error::last_os_error().to_string()
        }
    }
}
