// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the volume adapter

/// Adapter error type.
///
/// Every non-zero/negative native return code is converted into one of these
/// at the call site; raw codes never cross the adapter boundary.
#[derive(thiserror::Error, Debug)]
pub enum VolError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    #[error("not a symbolic link: {0}")]
    NotALink(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("{0} is closed")]
    Closed(&'static str),
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error("paths belong to different volumes")]
    CrossVolume,
    #[error("invalid authority {0:?}, expected host:volume")]
    InvalidAuthority(String),
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
    #[error("{op} failed for '{path}' on volume '{volume}': {detail}")]
    Native {
        op: &'static str,
        path: String,
        volume: String,
        detail: String,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VolResult<T> = Result<T, VolError>;

impl VolError {
    /// True when the error denotes a resource used after close.
    pub fn is_closed(&self) -> bool {
        matches!(self, VolError::Closed(_))
    }
}
