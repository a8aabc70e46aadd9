// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path model: an immutable location within one mounted volume.
//!
//! A `VolPath` holds its name segments plus an absolute flag and a weak
//! reference to its volume — a path never keeps a volume open, but every
//! lookup through it fails with `Closed` once the volume is gone. Equality,
//! ordering, and hashing are segment-wise and volume-scoped so paths work as
//! map keys for directory cursors and watch-key tables.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use crate::error::{VolError, VolResult};
use crate::matcher::PathMatcher;
use crate::provider::SCHEME;
use crate::volume::Volume;

/// The in-volume separator. Segments never contain it.
pub const SEPARATOR: char = '/';

#[derive(Clone, Debug)]
pub struct VolPath {
    volume: Weak<Volume>,
    authority: String,
    parts: Vec<String>,
    absolute: bool,
}

impl VolPath {
    /// Parse a raw string against a volume. Leading `/` makes the path
    /// absolute; empty segments collapse.
    pub fn new(volume: &Arc<Volume>, raw: &str) -> VolPath {
        let absolute = raw.starts_with(SEPARATOR);
        let parts = split_segments(raw);
        VolPath {
            volume: Arc::downgrade(volume),
            authority: volume.authority(),
            parts,
            absolute,
        }
    }

    fn derived(&self, parts: Vec<String>, absolute: bool) -> VolPath {
        VolPath {
            volume: self.volume.clone(),
            authority: self.authority.clone(),
            parts,
            absolute,
        }
    }

    /// The owning volume, if it is still alive.
    pub fn volume(&self) -> VolResult<Arc<Volume>> {
        self.volume.upgrade().ok_or(VolError::Closed("volume"))
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn segments(&self) -> &[String] {
        &self.parts
    }

    /// The final name segment, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.parts.last().map(String::as_str)
    }

    /// The final segment as a relative single-segment path.
    pub fn file_name_path(&self) -> Option<VolPath> {
        self.file_name()
            .map(|name| self.derived(vec![name.to_string()], false))
    }

    /// True when the final segment starts with a dot.
    pub fn is_hidden(&self) -> bool {
        self.file_name().is_some_and(|name| name.starts_with('.'))
    }

    /// Parent path. The root and single-segment relative paths have none;
    /// a single-segment absolute path's parent is the volume root.
    pub fn parent(&self) -> Option<VolPath> {
        match self.parts.len() {
            0 => None,
            1 if !self.absolute => None,
            n => Some(self.derived(self.parts[..n - 1].to_vec(), self.absolute)),
        }
    }

    /// Resolve `other` against this path. An absolute `other` wins outright.
    pub fn resolve(&self, other: &VolPath) -> VolResult<VolPath> {
        if self.authority != other.authority {
            return Err(VolError::CrossVolume);
        }
        if other.absolute {
            return Ok(other.clone());
        }
        if other.parts.is_empty() {
            return Ok(self.clone());
        }
        let mut parts = self.parts.clone();
        parts.extend(other.parts.iter().cloned());
        Ok(self.derived(parts, self.absolute))
    }

    /// Resolve a raw string against this path.
    pub fn resolve_str(&self, raw: &str) -> VolPath {
        if raw.starts_with(SEPARATOR) {
            return self.derived(split_segments(raw), true);
        }
        let mut parts = self.parts.clone();
        parts.extend(split_segments(raw));
        self.derived(parts, self.absolute)
    }

    /// Resolve a name against this path's parent.
    pub fn resolve_sibling(&self, name: &str) -> VolPath {
        match self.parent() {
            Some(parent) => parent.resolve_str(name),
            None => self.derived(split_segments(name), false),
        }
    }

    pub fn starts_with(&self, other: &VolPath) -> bool {
        self.authority == other.authority
            && self.absolute == other.absolute
            && self.parts.len() >= other.parts.len()
            && self.parts[..other.parts.len()] == other.parts[..]
    }

    pub fn ends_with(&self, other: &VolPath) -> bool {
        if self.authority != other.authority {
            return false;
        }
        if other.absolute {
            return self.absolute && self.parts == other.parts;
        }
        self.parts.len() >= other.parts.len()
            && self.parts[self.parts.len() - other.parts.len()..] == other.parts[..]
    }

    /// Collapse `.` segments and fold `name/..` pairs. A `..` at an absolute
    /// root disappears; a leading `..` on a relative path is kept.
    pub fn normalize(&self) -> VolPath {
        let mut normalized: Vec<String> = Vec::with_capacity(self.parts.len());
        for part in &self.parts {
            match part.as_str() {
                "." => {}
                ".." => {
                    if normalized.last().is_some_and(|last| last != "..") {
                        normalized.pop();
                    } else if !self.absolute {
                        normalized.push(part.clone());
                    }
                }
                _ => normalized.push(part.clone()),
            }
        }
        self.derived(normalized, self.absolute)
    }

    /// Absolute form: an absolute path is returned as-is, a relative one is
    /// resolved against the volume root.
    pub fn to_absolute(&self) -> VolPath {
        if self.absolute {
            self.clone()
        } else {
            self.derived(self.parts.clone(), true)
        }
    }

    /// The path of `other` relative to this path.
    pub fn relativize(&self, other: &VolPath) -> VolResult<VolPath> {
        if self.authority != other.authority {
            return Err(VolError::CrossVolume);
        }
        if !other.starts_with(self) {
            return Err(VolError::IllegalState("path is not a prefix of the other"));
        }
        Ok(self.derived(other.parts[self.parts.len()..].to_vec(), false))
    }

    /// Relative slice of segments `[begin, end)`.
    pub fn subpath(&self, begin: usize, end: usize) -> VolResult<VolPath> {
        if begin >= end || end > self.parts.len() {
            return Err(VolError::IllegalState("subpath range out of bounds"));
        }
        Ok(self.derived(self.parts[begin..end].to_vec(), false))
    }

    /// Match this path's string form against a compiled matcher.
    pub fn matches(&self, matcher: &PathMatcher) -> bool {
        matcher.is_match(&self.to_string())
    }

    /// String form used for native calls: always absolute.
    pub(crate) fn native_path(&self) -> String {
        self.to_absolute().to_string()
    }

    /// URI form, `gluster://host:volume/path`.
    pub fn to_uri(&self) -> String {
        format!("{}://{}{}", SCHEME, self.authority, self.to_absolute())
    }
}

fn split_segments(raw: &str) -> Vec<String> {
    raw.split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

impl std::fmt::Display for VolPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.absolute {
            f.write_str("/")?;
        }
        f.write_str(&self.parts.join("/"))
    }
}

impl PartialEq for VolPath {
    fn eq(&self, other: &Self) -> bool {
        self.authority == other.authority
            && self.absolute == other.absolute
            && self.parts == other.parts
    }
}

impl Eq for VolPath {}

impl PartialOrd for VolPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VolPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.authority
            .cmp(&other.authority)
            .then_with(|| other.absolute.cmp(&self.absolute))
            .then_with(|| self.parts.cmp(&other.parts))
    }
}

impl Hash for VolPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.authority.hash(state);
        self.absolute.hash(state);
        self.parts.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectOptions;
    use crate::testing::fake::FakeLibrary;
    use crate::volume::VolumeRegistry;

    fn test_volume() -> Arc<Volume> {
        let registry = VolumeRegistry::with_defaults(
            Arc::new(FakeLibrary::new()),
            ConnectOptions::default(),
        );
        registry.connect("server:data", ConnectOptions::default()).unwrap()
    }

    #[test]
    fn parse_then_display_round_trips() {
        let volume = test_volume();
        for raw in ["/", "/a", "/a/b/c", "a/b", "name"] {
            let path = volume.path(raw);
            let reparsed = volume.path(&path.to_string());
            assert_eq!(path, reparsed, "round-trip failed for {raw:?}");
        }
    }

    #[test]
    fn empty_segments_collapse() {
        let volume = test_volume();
        assert_eq!(volume.path("/a//b/"), volume.path("/a/b"));
    }

    #[test]
    fn parent_and_file_name() {
        let volume = test_volume();
        let path = volume.path("/a/b/c");
        assert_eq!(path.file_name(), Some("c"));
        assert_eq!(path.parent().unwrap(), volume.path("/a/b"));
        assert_eq!(volume.path("/a").parent().unwrap(), volume.root());
        assert!(volume.root().parent().is_none());
        assert!(volume.path("lonely").parent().is_none());
    }

    #[test]
    fn resolve_relative_appends_and_absolute_wins() {
        let volume = test_volume();
        let base = volume.path("/a/b");
        assert_eq!(base.resolve(&volume.path("c/d")).unwrap(), volume.path("/a/b/c/d"));
        assert_eq!(base.resolve(&volume.path("/x")).unwrap(), volume.path("/x"));
        assert_eq!(base.resolve_str("c"), volume.path("/a/b/c"));
    }

    #[test]
    fn resolve_across_volumes_fails() {
        let registry = VolumeRegistry::with_defaults(
            Arc::new(FakeLibrary::new()),
            ConnectOptions::default(),
        );
        let one = registry.connect("server:data", ConnectOptions::default()).unwrap();
        let two = registry.connect("server:backup", ConnectOptions::default()).unwrap();
        let err = one.path("/a").resolve(&two.path("b")).unwrap_err();
        assert!(matches!(err, VolError::CrossVolume));
    }

    #[test]
    fn resolve_sibling_replaces_last_segment() {
        let volume = test_volume();
        assert_eq!(volume.path("/a/b").resolve_sibling("c"), volume.path("/a/c"));
    }

    #[test]
    fn starts_and_ends_with() {
        let volume = test_volume();
        let path = volume.path("/a/b/c");
        assert!(path.starts_with(&volume.path("/a/b")));
        assert!(!path.starts_with(&volume.path("/b")));
        assert!(path.ends_with(&volume.path("b/c")));
        assert!(path.ends_with(&volume.path("/a/b/c")));
        assert!(!path.ends_with(&volume.path("/b/c")));
    }

    #[test]
    fn normalize_folds_dot_segments() {
        let volume = test_volume();
        assert_eq!(volume.path("/a/./b/../c").normalize(), volume.path("/a/c"));
        assert_eq!(volume.path("/../a").normalize(), volume.path("/a"));
        assert_eq!(volume.path("../a").normalize(), volume.path("../a"));
    }

    #[test]
    fn hidden_means_leading_dot_on_final_segment() {
        let volume = test_volume();
        assert!(volume.path("/a/.hidden").is_hidden());
        assert!(!volume.path("/.config/visible").is_hidden());
    }

    #[test]
    fn relativize_strips_the_prefix() {
        let volume = test_volume();
        let base = volume.path("/a/b");
        let child = volume.path("/a/b/c/d");
        assert_eq!(base.relativize(&child).unwrap(), volume.path("c/d"));
        assert!(base.relativize(&volume.path("/x")).is_err());
    }

    #[test]
    fn subpath_slices_segments_relatively() {
        let volume = test_volume();
        let path = volume.path("/a/b/c");
        assert_eq!(path.subpath(1, 3).unwrap(), volume.path("b/c"));
        assert!(path.subpath(2, 2).is_err());
        assert!(path.subpath(0, 4).is_err());
    }

    #[test]
    fn to_absolute_roots_relative_paths() {
        let volume = test_volume();
        assert_eq!(volume.path("a/b").to_absolute(), volume.path("/a/b"));
        assert_eq!(volume.path("/a/b").to_absolute(), volume.path("/a/b"));
    }

    #[test]
    fn uri_round_trip_shape() {
        let volume = test_volume();
        assert_eq!(volume.path("/a/b").to_uri(), "gluster://server:data/a/b");
    }

    #[test]
    fn ordering_is_consistent_with_equality() {
        let volume = test_volume();
        let mut paths = vec![volume.path("/b"), volume.path("/a/z"), volume.path("/a")];
        paths.sort();
        assert_eq!(paths[0], volume.path("/a"));
        assert_eq!(paths[2], volume.path("/b"));
    }
}
