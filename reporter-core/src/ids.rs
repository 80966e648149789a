// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stable identifiers used across the reporter core.

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt;

/// A test's identity, stable across retries.
///
/// The host framework is responsible for choosing an identifier that survives a retry (e.g. a
/// fully qualified test name); the orchestrator only requires that the same test produces the
/// same `TestId` on every attempt.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(transparent)]
pub struct TestId(SmolStr);

impl TestId {
    /// Creates a new `TestId` from any string-like value.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> From<S> for TestId
where
    S: AsRef<str>,
{
    fn from(s: S) -> Self {
        Self::new(s)
    }
}

/// A monotonically increasing sequence number assigned to a console event at the time it is
/// appended to a [`crate::console::ConsoleBuffer`].
///
/// `TestRecord` stores these rather than raw buffer positions because the buffer is a
/// drop-oldest ring: positions shift on eviction, but a sequence number, once assigned, never
/// changes meaning. Resolving a ref whose event has since been evicted simply yields nothing.
pub type ConsoleEventRef = u64;
