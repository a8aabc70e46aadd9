// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core type definitions shared across the adapter

use crate::error::{VolError, VolResult};

/// Options controlling how a channel is opened.
///
/// Mirrors the standard open-option set; each flag maps onto one native
/// `O_*` bit when the channel is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub create_new: bool,
    pub truncate: bool,
    pub dsync: bool,
}

impl OpenOptions {
    pub fn reading() -> Self {
        Self {
            read: true,
            ..Self::default()
        }
    }

    pub fn writing() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Self::default()
        }
    }

    pub fn read(mut self, yes: bool) -> Self {
        self.read = yes;
        self
    }

    pub fn write(mut self, yes: bool) -> Self {
        self.write = yes;
        self
    }

    pub fn append(mut self, yes: bool) -> Self {
        self.append = yes;
        self
    }

    pub fn create(mut self, yes: bool) -> Self {
        self.create = yes;
        self
    }

    pub fn create_new(mut self, yes: bool) -> Self {
        self.create_new = yes;
        self
    }

    pub fn truncate(mut self, yes: bool) -> Self {
        self.truncate = yes;
        self
    }

    pub fn dsync(mut self, yes: bool) -> Self {
        self.dsync = yes;
        self
    }

    /// Translate the option set into native open flags.
    ///
    /// READ maps to `O_RDONLY`, WRITE to `O_RDWR` (the native volume client
    /// has no useful write-only mode for channels that also gap-fill).
    pub fn native_flags(&self) -> VolResult<i32> {
        if !self.read && !self.write && !(self.create || self.create_new) {
            return Err(VolError::IllegalState(
                "channel must be opened for reading, writing, or creation",
            ));
        }
        let mut flags = libc::O_RDONLY;
        if self.write {
            flags = libc::O_RDWR;
        }
        if self.append {
            flags |= libc::O_APPEND;
        }
        if self.create || self.create_new {
            flags |= libc::O_CREAT;
        }
        if self.create_new {
            flags |= libc::O_EXCL;
        }
        if self.truncate {
            flags |= libc::O_TRUNC;
        }
        if self.dsync {
            flags |= libc::O_DSYNC;
        }
        Ok(flags)
    }
}

/// Access-check modes, with the POSIX bit values the native access
/// primitive expects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

impl AccessMode {
    pub fn mask(self) -> i32 {
        match self {
            AccessMode::Read => 4,
            AccessMode::Write => 2,
            AccessMode::Execute => 1,
        }
    }
}

/// Options accepted by copy and move operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyOption {
    ReplaceExisting,
    CopyAttributes,
    AtomicMove,
}

/// Kinds of change-notification events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WatchKind {
    Create,
    Modify,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_flags_map_option_bits() {
        let flags = OpenOptions::read_write()
            .create(true)
            .truncate(true)
            .native_flags()
            .unwrap();
        assert_ne!(flags & libc::O_RDWR, 0);
        assert_ne!(flags & libc::O_CREAT, 0);
        assert_ne!(flags & libc::O_TRUNC, 0);
        assert_eq!(flags & libc::O_EXCL, 0);
    }

    #[test]
    fn create_new_implies_excl() {
        let flags = OpenOptions::writing().create_new(true).native_flags().unwrap();
        assert_ne!(flags & libc::O_CREAT, 0);
        assert_ne!(flags & libc::O_EXCL, 0);
    }

    #[test]
    fn empty_option_set_is_rejected() {
        let err = OpenOptions::default().native_flags().unwrap_err();
        assert!(matches!(err, VolError::IllegalState(_)));
    }

    #[test]
    fn access_mode_masks_are_posix() {
        assert_eq!(AccessMode::Read.mask(), 4);
        assert_eq!(AccessMode::Write.mask(), 2);
        assert_eq!(AccessMode::Execute.mask(), 1);
    }
}
