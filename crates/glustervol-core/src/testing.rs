// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Test-only utilities and fake implementations.
//!
//! This module provides an in-memory implementation of the native volume
//! library so the adapter can be exercised without a remote volume server.

pub mod fake;
