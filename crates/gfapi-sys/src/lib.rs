// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Raw C ABI declarations for the libgfapi volume client.
//!
//! Only the surface consumed by `glustervol-core` is declared here. Handles
//! are opaque pointers owned by the native library; callers must pair every
//! `glfs_new` with `glfs_fini` and every `glfs_open`/`glfs_creat`/
//! `glfs_opendir` with the matching close call.

#![allow(non_camel_case_types)]

use libc::{c_char, c_int, c_void, dirent, mode_t, off_t, size_t, ssize_t, stat, statvfs, timespec};

/// Opaque per-volume client handle (`glfs_t`).
#[repr(C)]
pub struct glfs_t {
    _private: [u8; 0],
}

/// Opaque file/directory descriptor (`glfs_fd_t`).
#[repr(C)]
pub struct glfs_fd_t {
    _private: [u8; 0],
}

#[cfg_attr(feature = "link-gfapi", link(name = "gfapi"))]
extern "C" {
    pub fn glfs_new(volname: *const c_char) -> *mut glfs_t;
    pub fn glfs_set_volfile_server(
        fs: *mut glfs_t,
        transport: *const c_char,
        host: *const c_char,
        port: c_int,
    ) -> c_int;
    pub fn glfs_init(fs: *mut glfs_t) -> c_int;
    pub fn glfs_fini(fs: *mut glfs_t) -> c_int;

    // Process-wide identity overrides, applied before glfs_init.
    pub fn glfs_setfsuid(uid: libc::uid_t) -> c_int;
    pub fn glfs_setfsgid(gid: libc::gid_t) -> c_int;

    pub fn glfs_open(fs: *mut glfs_t, path: *const c_char, flags: c_int) -> *mut glfs_fd_t;
    pub fn glfs_creat(
        fs: *mut glfs_t,
        path: *const c_char,
        flags: c_int,
        mode: mode_t,
    ) -> *mut glfs_fd_t;
    pub fn glfs_close(fd: *mut glfs_fd_t) -> c_int;

    pub fn glfs_read(fd: *mut glfs_fd_t, buf: *mut c_void, count: size_t, flags: c_int) -> ssize_t;
    pub fn glfs_write(
        fd: *mut glfs_fd_t,
        buf: *const c_void,
        count: size_t,
        flags: c_int,
    ) -> ssize_t;
    pub fn glfs_lseek(fd: *mut glfs_fd_t, offset: off_t, whence: c_int) -> off_t;
    pub fn glfs_fsync(fd: *mut glfs_fd_t) -> c_int;
    pub fn glfs_fstat(fd: *mut glfs_fd_t, buf: *mut stat) -> c_int;

    pub fn glfs_stat(fs: *mut glfs_t, path: *const c_char, buf: *mut stat) -> c_int;
    pub fn glfs_lstat(fs: *mut glfs_t, path: *const c_char, buf: *mut stat) -> c_int;

    pub fn glfs_mkdir(fs: *mut glfs_t, path: *const c_char, mode: mode_t) -> c_int;
    pub fn glfs_rmdir(fs: *mut glfs_t, path: *const c_char) -> c_int;
    pub fn glfs_unlink(fs: *mut glfs_t, path: *const c_char) -> c_int;
    pub fn glfs_rename(fs: *mut glfs_t, oldpath: *const c_char, newpath: *const c_char) -> c_int;

    pub fn glfs_symlink(fs: *mut glfs_t, target: *const c_char, link: *const c_char) -> c_int;
    pub fn glfs_readlink(
        fs: *mut glfs_t,
        path: *const c_char,
        buf: *mut c_char,
        bufsiz: size_t,
    ) -> ssize_t;

    pub fn glfs_chmod(fs: *mut glfs_t, path: *const c_char, mode: mode_t) -> c_int;
    pub fn glfs_utimens(fs: *mut glfs_t, path: *const c_char, times: *const timespec) -> c_int;
    pub fn glfs_access(fs: *mut glfs_t, path: *const c_char, mode: c_int) -> c_int;
    pub fn glfs_statvfs(fs: *mut glfs_t, path: *const c_char, buf: *mut statvfs) -> c_int;

    pub fn glfs_opendir(fs: *mut glfs_t, path: *const c_char) -> *mut glfs_fd_t;
    pub fn glfs_readdir_r(
        fd: *mut glfs_fd_t,
        entry: *mut dirent,
        result: *mut *mut dirent,
    ) -> c_int;
    pub fn glfs_closedir(fd: *mut glfs_fd_t) -> c_int;
}
