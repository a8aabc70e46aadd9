// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Filesystem adapter over a remote GlusterFS volume client.
//!
//! The native library exposes POSIX-like, handle-based primitives; this
//! crate presents them as a hierarchical filesystem: paths, seekable byte
//! channels, directory streams, attribute views, and polling-based change
//! notification. Callers start at [`GlusterProvider`], which wires
//! `gluster://host:volume/path` URIs to cached volume handles and dispatches
//! every operation.
//!
//! The native layer is consumed behind the [`VolumeLibrary`] trait; enable
//! the `gfapi` feature for the libgfapi-backed implementation.

pub mod attr;
mod buffers;
pub mod channel;
pub mod client;
pub mod config;
pub mod dir;
pub mod error;
pub mod matcher;
pub mod path;
pub mod provider;
pub mod testing;
pub mod types;
pub mod volume;
pub mod watch;

pub use attr::{
    classify, mode_to_permissions, permissions_to_mode, FileAttributeView, FileAttributes,
    FileKind, PosixPerm, ViewKind,
};
pub use channel::{FileChannel, IoReader, IoWriter, ReadableChannel, WritableChannel};
pub use client::VolumeLibrary;
#[cfg(feature = "gfapi")]
pub use client::GfapiLibrary;
pub use config::{ConnectOptions, WatchConfig};
pub use dir::{DirFilter, DirectoryStream, DirIterator};
pub use error::{VolError, VolResult};
pub use matcher::PathMatcher;
pub use path::VolPath;
pub use provider::{GlusterProvider, SCHEME};
pub use types::{AccessMode, CopyOption, OpenOptions, WatchKind};
pub use volume::{Volume, VolumeRegistry};
pub use watch::{WatchEvent, WatchKey, WatchService};
