// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test internal state (`spec.md` §3's `TestRecord`, `TestError`; Design Notes §9's
//! "state machine as a tagged enum").
//!
//! A test's lifecycle is modeled as a single tagged enum rather than a set of independent
//! boolean flags (`started`, `finished`, ...) so that illegal combinations — finished but not
//! started, running with a terminal status already attached — are unrepresentable rather than
//! merely forbidden by convention.

use crate::ids::{ConsoleEventRef, TestId};
use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use reporter_schema::Value;

/// A test's position in its lifecycle.
#[derive(Clone, Debug, PartialEq)]
pub enum TestState {
    /// Declared (e.g. via `onTestReady`) but not yet started.
    Pending,
    /// Currently executing.
    Running {
        started_at_ms: u64,
    },
    /// Reached a terminal outcome.
    Terminal {
        status: TerminalStatus,
        started_at_ms: u64,
        ended_at_ms: u64,
    },
}

impl TestState {
    /// True once the test has reached [`TestState::Terminal`].
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestState::Terminal { .. })
    }
}

/// The outcome attached to a [`TestState::Terminal`] state.
#[derive(Clone, Debug, PartialEq)]
pub enum TerminalStatus {
    Passed,
    Failed(TestError),
    Skipped,
}

/// The engine's internal representation of a test failure.
///
/// Distinct from [`reporter_schema::TestErrorSummary`]: this carries the richer,
/// not-yet-flattened context (full code window plus pointer line, rather than the schema's
/// already-merged `ContextSummary`) that `output_builder` later projects down into the public
/// document shape.
#[derive(Clone, Debug, PartialEq)]
pub struct TestError {
    pub message: String,
    pub error_type: String,
    pub stack_frames: Vec<RawStackFrame>,
    pub assertion: Option<RawAssertion>,
    pub code_lines: Vec<String>,
    pub pointer_line: Option<u32>,
}

/// A stack frame before in-project/node_modules classification has been applied.
#[derive(Clone, Debug, PartialEq)]
pub struct RawStackFrame {
    pub file_absolute: Utf8PathBuf,
    pub line: u32,
    pub column: u32,
}

/// An assertion failure's raw expected/actual payload, before diffing.
#[derive(Clone, Debug, PartialEq)]
pub struct RawAssertion {
    pub expected: Value,
    pub actual: Value,
    pub operator: String,
}

impl TestError {
    /// Synthesized for a test still `Pending` or `Running` when the run ends — the host
    /// framework never reported a result, so the record can't simply stay open forever.
    pub fn incomplete() -> Self {
        Self {
            message: "test did not report a result before the run ended".to_string(),
            error_type: "IncompleteTestError".to_string(),
            stack_frames: Vec::new(),
            assertion: None,
            code_lines: Vec::new(),
            pointer_line: None,
        }
    }
}

/// One retry attempt's archived outcome (`spec.md` §3's "retry archive").
#[derive(Clone, Debug, PartialEq)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub status: TerminalStatus,
    pub started_at_ms: u64,
    pub ended_at_ms: u64,
    pub timestamp: DateTime<FixedOffset>,
}

/// A single test's full record as tracked by the orchestrator.
#[derive(Clone, Debug)]
pub struct TestRecord {
    pub test_id: TestId,
    pub name: String,
    pub file_relative: Utf8PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub suite: Option<Vec<String>>,
    pub state: TestState,
    /// Refs into this test's [`crate::console::ConsoleBuffer`], in capture order. The buffer
    /// itself lives in the `ConsoleCapture` layer; the record only keeps enough to resolve
    /// them later, so a retried test can accumulate refs across generations without the record
    /// itself owning the buffer.
    pub console_refs: Vec<ConsoleEventRef>,
    /// Current retry generation. Generation 0 is the first attempt.
    pub generation: u32,
    /// Archived outcomes for every generation strictly before the current one.
    pub retry_history: Vec<RetryAttempt>,
}

impl TestRecord {
    /// Creates a freshly declared (not yet started) record.
    pub fn new_pending(
        test_id: TestId,
        name: String,
        file_relative: Utf8PathBuf,
        start_line: u32,
        end_line: u32,
        suite: Option<Vec<String>>,
    ) -> Self {
        Self {
            test_id,
            name,
            file_relative,
            start_line,
            end_line,
            suite,
            state: TestState::Pending,
            console_refs: Vec::new(),
            generation: 0,
            retry_history: Vec::new(),
        }
    }

    /// Transitions to [`TestState::Running`], regardless of current state — a retry re-enters
    /// `Running` from `Terminal` after [`Self::begin_retry`] has archived the prior attempt.
    pub fn start(&mut self, started_at_ms: u64) {
        self.state = TestState::Running { started_at_ms };
    }

    /// Archives the current terminal state as a retry attempt and advances the generation,
    /// returning to [`TestState::Pending`] so the next [`Self::start`] is well-formed.
    ///
    /// No-op (beyond bumping the generation) if the test hasn't reached a terminal state yet —
    /// the orchestrator is expected to only call this after observing a result, but this stays
    /// defensive since a malformed event stream must never panic the core.
    pub fn begin_retry(&mut self, timestamp: DateTime<FixedOffset>) {
        if let TestState::Terminal {
            status,
            started_at_ms,
            ended_at_ms,
        } = &self.state
        {
            self.retry_history.push(RetryAttempt {
                attempt_number: self.generation,
                status: status.clone(),
                started_at_ms: *started_at_ms,
                ended_at_ms: *ended_at_ms,
                timestamp,
            });
        }
        self.generation += 1;
        self.state = TestState::Pending;
    }

    /// Transitions to [`TestState::Terminal`]. `started_at_ms` is taken from the current
    /// `Running` state if present, falling back to `ended_at_ms` (a result that arrives without
    /// a matching start, e.g. a synthesized record).
    pub fn finish(&mut self, status: TerminalStatus, ended_at_ms: u64) {
        let started_at_ms = match &self.state {
            TestState::Running { started_at_ms } => *started_at_ms,
            TestState::Terminal { started_at_ms, .. } => *started_at_ms,
            TestState::Pending => ended_at_ms,
        };
        self.state = TestState::Terminal {
            status,
            started_at_ms,
            ended_at_ms,
        };
    }

    /// Duration of the current (most recent) attempt, if it has both started and finished.
    pub fn duration_ms(&self) -> Option<u64> {
        match &self.state {
            TestState::Terminal {
                started_at_ms,
                ended_at_ms,
                ..
            } => Some(ended_at_ms.saturating_sub(*started_at_ms)),
            _ => None,
        }
    }

    /// Records a console event ref captured for this test, in any generation.
    pub fn record_console_ref(&mut self, event_ref: ConsoleEventRef) {
        self.console_refs.push(event_ref);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TestRecord {
        TestRecord::new_pending(
            TestId::new("t1"),
            "does a thing".to_string(),
            Utf8PathBuf::from("src/lib.test.ts"),
            10,
            20,
            None,
        )
    }

    #[test]
    fn fresh_record_is_pending() {
        let record = record();
        assert_eq!(record.state, TestState::Pending);
        assert!(!record.state.is_terminal());
    }

    #[test]
    fn finish_without_start_uses_ended_at_as_started_at() {
        let mut record = record();
        record.finish(TerminalStatus::Passed, 100);
        assert_eq!(record.duration_ms(), Some(0));
    }

    #[test]
    fn retry_archives_prior_attempt_and_advances_generation() {
        let mut record = record();
        record.start(0);
        record.finish(TerminalStatus::Failed(TestError {
            message: "boom".to_string(),
            error_type: "Error".to_string(),
            stack_frames: Vec::new(),
            assertion: None,
            code_lines: Vec::new(),
            pointer_line: None,
        }), 50);

        let timestamp = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        record.begin_retry(timestamp);

        assert_eq!(record.generation, 1);
        assert_eq!(record.state, TestState::Pending);
        assert_eq!(record.retry_history.len(), 1);
        assert_eq!(record.retry_history[0].attempt_number, 0);

        record.start(60);
        record.finish(TerminalStatus::Passed, 90);
        assert_eq!(record.duration_ms(), Some(30));
    }
}
