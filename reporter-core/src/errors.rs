// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The error taxonomy for the reporter core (see `spec.md` §7).
//!
//! Only [`ConfigError`] and [`WriteError`] are ever returned from a public API as a `Result`.
//! Everything else the core encounters during a run — malformed events, capture failures,
//! budgets it can't hit — is absorbed: logged, turned into a synthetic record, or recorded in
//! metrics. The core never fails a test run.

use thiserror::Error;

/// Raised only at [`crate::config::NormalizedReporterConfig`] construction time.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// `maxCacheEntries` or a similar capacity was set to `0`, which would make the affected
    /// subsystem permanently a no-op. The caller almost certainly meant "unset" or a positive
    /// number, not "disabled this way" (there's `enabled: false` for that).
    #[error("`{field}` must be at least 1, got 0")]
    ZeroCapacity {
        /// The configuration field that was zero.
        field: &'static str,
    },
}

/// Raised by the external writer collaborator (out of scope for this crate; see
/// [`crate::facade::WriteDocument`]) and surfaced to the caller unmodified.
#[derive(Debug, Error)]
#[error("failed to write reporter document")]
#[non_exhaustive]
pub struct WriteError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl WriteError {
    /// Wraps an arbitrary writer error.
    pub fn new(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            source: Box::new(source),
        }
    }
}

/// A malformed or inconsistent inbound event (`spec.md` §7's `FrameworkError`).
///
/// Never returned to a caller; logged via `tracing` and converted into a best-effort
/// synthetic record by the orchestrator.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum FrameworkError {
    /// A result was reported for a test ID the orchestrator has never seen.
    #[error("result reported for unknown test `{test_id}`; synthesizing a minimal record")]
    UnknownTestId {
        /// The test ID named in the event.
        test_id: String,
    },

    /// A terminal result arrived twice for the same generation.
    #[error("duplicate result for test `{test_id}` generation {generation}; discarding")]
    DuplicateResult {
        /// The test ID named in the event.
        test_id: String,
        /// The generation the duplicate arrived for.
        generation: u32,
    },
}

/// A failure inside the console interception path (`spec.md` §7's `CaptureError`).
///
/// Always swallowed: the original writer still receives the write, the event is simply not
/// attributed or deduplicated.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CaptureError {
    /// The ambient per-task context could not be read or bound.
    #[error("failed to propagate console capture context")]
    ContextUnavailable,

    /// Formatting a captured value for storage failed.
    #[error("failed to serialize a captured console argument")]
    SerializeArg(#[source] serde_json::Error),
}

/// Raised when the late truncator cannot reach the target budget under any phase
/// (`spec.md` §7's `BudgetExceededError`). Never propagated: the phase-5 minimum is emitted
/// and this is recorded into the truncation metrics ring instead.
#[derive(Clone, Copy, Debug, Error)]
#[error("could not reach token budget of {max_tokens} (best effort: {achieved_tokens})")]
pub struct BudgetExceededError {
    /// The requested budget.
    pub max_tokens: u32,
    /// The token count actually achieved after all phases.
    pub achieved_tokens: u32,
}
