// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Path matchers, `syntax:pattern` form.
//!
//! Pattern compilation is delegated outright: `glob:` to the `glob` crate,
//! `regex:` to the `regex` crate. Any other syntax name is unsupported.

use crate::error::{VolError, VolResult};

#[derive(Clone, Debug)]
pub enum PathMatcher {
    Glob(glob::Pattern),
    Regex(regex::Regex),
}

impl PathMatcher {
    /// Compile `glob:<pattern>` or `regex:<pattern>`.
    pub fn compile(syntax_and_pattern: &str) -> VolResult<PathMatcher> {
        let (syntax, pattern) = syntax_and_pattern
            .split_once(':')
            .ok_or(VolError::IllegalState("matcher requires syntax:pattern"))?;
        match syntax {
            "glob" => glob::Pattern::new(pattern)
                .map(PathMatcher::Glob)
                .map_err(|_| VolError::IllegalState("invalid glob pattern")),
            "regex" => regex::Regex::new(pattern)
                .map(PathMatcher::Regex)
                .map_err(|_| VolError::IllegalState("invalid regex pattern")),
            _ => Err(VolError::Unsupported("unknown path matcher syntax")),
        }
    }

    pub fn is_match(&self, path: &str) -> bool {
        match self {
            PathMatcher::Glob(pattern) => pattern.matches(path),
            PathMatcher::Regex(pattern) => pattern.is_match(path),
        }
    }
}
