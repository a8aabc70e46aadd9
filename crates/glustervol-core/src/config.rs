// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Connection and watch configuration.
//!
//! Identity overrides travel out-of-band, either through an explicit
//! [`ConnectOptions`] value or through process-wide environment defaults
//! (`GLUSTERVOL_UID` / `GLUSTERVOL_GID`). They are applied once, before the
//! native client is initialized.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-connection options applied while establishing a volume handle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    /// Effective uid for native calls on this connection.
    pub uid: Option<u32>,
    /// Effective gid for native calls on this connection.
    pub gid: Option<u32>,
}

impl ConnectOptions {
    /// Process-wide defaults taken from the environment. Values that fail to
    /// parse are ignored.
    pub fn from_env() -> Self {
        fn parse(var: &str) -> Option<u32> {
            std::env::var(var).ok()?.trim().parse().ok()
        }
        Self {
            uid: parse("GLUSTERVOL_UID"),
            gid: parse("GLUSTERVOL_GID"),
        }
    }

    /// Fill unset fields from `fallback`.
    pub fn or(self, fallback: ConnectOptions) -> Self {
        Self {
            uid: self.uid.or(fallback.uid),
            gid: self.gid.or(fallback.gid),
        }
    }
}

/// Tuning for the polling change-notification engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Sleep between poll scans, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
        }
    }
}

impl WatchConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_prefers_explicit_values() {
        let explicit = ConnectOptions {
            uid: Some(1000),
            gid: None,
        };
        let fallback = ConnectOptions {
            uid: Some(0),
            gid: Some(100),
        };
        let merged = explicit.or(fallback);
        assert_eq!(merged.uid, Some(1000));
        assert_eq!(merged.gid, Some(100));
    }

    #[test]
    fn watch_config_defaults_to_100ms() {
        assert_eq!(WatchConfig::default().period(), Duration::from_millis(100));
    }
}
