// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The output document schema.
//!
//! These types are the stable, serializable contract between the reporter core and whatever
//! collaborator ends up writing the document out (to a file, to stdout, to a socket). None of
//! these types know how the document is produced; see `reporter-core` for that.

use crate::value::Value;
use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Root element of the emitted document.
///
/// `passed`, `skipped`, and `success_logs` are present only when the late truncator hasn't yet
/// dropped them (see phase 1 of truncation); `summary` is always present and is never
/// truncated.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ReporterDocument {
    /// Run-level statistics and environment metadata. Never dropped or truncated.
    pub summary: Summary,

    /// Failing tests, in the order they completed. Always emitted when non-empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<TestFailure>>,

    /// Passing tests. Dropped first when the document exceeds its token budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<Vec<TestResult>>,

    /// Skipped/pending tests. Dropped second, right after `passed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<Vec<TestResult>>,

    /// Console events from passing tests that were nonetheless judged interesting (for example,
    /// warnings). Rarely populated; dropped alongside `passed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_logs: Option<Vec<ConsoleEventSummary>>,
}

impl ReporterDocument {
    /// Creates an empty document around the given summary.
    pub fn new(summary: Summary) -> Self {
        Self {
            summary,
            failures: None,
            passed: None,
            skipped: None,
            success_logs: None,
        }
    }
}

/// Run-level counts, timing, and environment.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Summary {
    /// `passed + failed + skipped`.
    pub total: usize,
    /// Number of tests that passed.
    pub passed: usize,
    /// Number of tests that failed, including synthetic unhandled-error records.
    pub failed: usize,
    /// Number of tests that were skipped or left pending.
    pub skipped: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
    /// When the run finished.
    pub timestamp: DateTime<FixedOffset>,
    /// A one-time snapshot of the OS, runtime, and CI environment.
    pub environment: EnvironmentSummary,
}

impl Summary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        total: usize,
        passed: usize,
        failed: usize,
        skipped: usize,
        duration_ms: u64,
        timestamp: DateTime<FixedOffset>,
        environment: EnvironmentSummary,
    ) -> Self {
        Self {
            total,
            passed,
            failed,
            skipped,
            duration_ms,
            timestamp,
            environment,
        }
    }
}

/// Environment metadata, captured once at reporter construction.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct EnvironmentSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<OsSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<RuntimeSummary>,
    /// Host test framework version, kept under its historical field name for schema stability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vitest: Option<FrameworkSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ci: Option<bool>,
}

/// Operating-system identification.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct OsSummary {
    pub platform: String,
    pub release: String,
    pub arch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl OsSummary {
    pub fn new(platform: String, release: String, arch: String, version: Option<String>) -> Self {
        Self {
            platform,
            release,
            arch,
            version,
        }
    }
}

/// The language runtime the host framework executed under.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RuntimeSummary {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

impl RuntimeSummary {
    pub fn new(version: String, runtime: Option<String>) -> Self {
        Self { version, runtime }
    }
}

/// The host test framework's self-reported version.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct FrameworkSummary {
    pub version: String,
}

impl FrameworkSummary {
    pub fn new(version: String) -> Self {
        Self { version }
    }
}

/// Status of a single test attempt, and the terminal status of a [`TestResult`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Pending,
}

/// A failing test and everything diagnostically useful we captured about it.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TestFailure {
    pub test: String,
    pub file_relative: Utf8PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<Vec<String>>,
    pub error: TestErrorSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console_events: Option<Vec<ConsoleEventSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_info: Option<RetryInfoSummary>,
}

impl TestFailure {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        test: String,
        file_relative: Utf8PathBuf,
        start_line: u32,
        end_line: u32,
        suite: Option<Vec<String>>,
        error: TestErrorSummary,
        console_events: Option<Vec<ConsoleEventSummary>>,
        retry_info: Option<RetryInfoSummary>,
    ) -> Self {
        Self {
            test,
            file_relative,
            start_line,
            end_line,
            suite,
            error,
            console_events,
            retry_info,
        }
    }
}

/// A passed or skipped test; carries none of `TestFailure`'s diagnostic payload.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TestResult {
    pub test: String,
    pub file_relative: Utf8PathBuf,
    pub start_line: u32,
    pub end_line: u32,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<Vec<String>>,
}

impl TestResult {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        test: String,
        file_relative: Utf8PathBuf,
        start_line: u32,
        end_line: u32,
        status: TestStatus,
        duration_ms: Option<u64>,
        suite: Option<Vec<String>>,
    ) -> Self {
        Self {
            test,
            file_relative,
            start_line,
            end_line,
            status,
            duration_ms,
            suite,
        }
    }
}

/// A test's thrown or returned error.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TestErrorSummary {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_frames: Option<Vec<StackFrameSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assertion: Option<AssertionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff: Option<DiffSummary>,
}

impl TestErrorSummary {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        message: String,
        error_type: String,
        stack_frames: Option<Vec<StackFrameSummary>>,
        assertion: Option<AssertionSummary>,
        context: Option<ContextSummary>,
        diff: Option<DiffSummary>,
    ) -> Self {
        Self {
            message,
            error_type,
            stack_frames,
            assertion,
            context,
            diff,
        }
    }
}

/// A single stack frame, classified as in-project or dependency code.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct StackFrameSummary {
    pub file_relative: Utf8PathBuf,
    pub line: u32,
    pub column: u32,
    pub in_project: bool,
    pub in_node_modules: bool,
}

impl StackFrameSummary {
    pub fn new(file_relative: Utf8PathBuf, line: u32, column: u32, in_project: bool, in_node_modules: bool) -> Self {
        Self {
            file_relative,
            line,
            column,
            in_project,
            in_node_modules,
        }
    }
}

/// A structured expected/actual comparison.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct AssertionSummary {
    pub expected: Value,
    pub actual: Value,
    pub expected_type: String,
    pub actual_type: String,
    pub operator: String,
}

impl AssertionSummary {
    pub fn new(expected: Value, actual: Value, expected_type: String, actual_type: String, operator: String) -> Self {
        Self {
            expected,
            actual,
            expected_type,
            actual_type,
            operator,
        }
    }
}

/// A few lines of source around the point where the failure occurred.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ContextSummary {
    /// Rendered source lines, oldest first.
    pub code: Vec<String>,
    /// Which line in `code` (by file line number) is the one the error points at.
    pub line_number: u32,
}

impl ContextSummary {
    pub fn new(code: Vec<String>, line_number: u32) -> Self {
        Self { code, line_number }
    }
}

/// Structural diff insights for a failed structural-equality assertion.
#[derive(Clone, Debug, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DiffSummary {
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_paths: Option<Vec<ChangedPath>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length_mismatch: Option<LengthMismatch>,
    /// Set when traversal was cut off by the depth or path-count cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

impl DiffSummary {
    /// Builds a summary with only the human-readable description set; the rest are filled in
    /// afterward through the (public) fields, since this type is `#[non_exhaustive]` even within
    /// the workspace and a struct literal with `..Default::default()` is still a struct literal.
    pub fn new(summary: String) -> Self {
        Self {
            summary,
            ..Default::default()
        }
    }
}

/// A single changed leaf in a structural diff.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ChangedPath {
    pub path: String,
    pub expected: Value,
    pub actual: Value,
}

impl ChangedPath {
    pub fn new(path: String, expected: Value, actual: Value) -> Self {
        Self {
            path,
            expected,
            actual,
        }
    }
}

/// Array-length mismatch between expected and actual.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LengthMismatch {
    pub expected: usize,
    pub actual: usize,
}

/// Where a console write originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleOrigin {
    Stdout,
    Stderr,
    Api,
}

/// Console log severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
    Debug,
    Trace,
}

/// A single console event, as it appears in the emitted document.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ConsoleEventSummary {
    pub level: ConsoleLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<ConsoleOrigin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deduplication: Option<DeduplicationSummary>,
}

impl ConsoleEventSummary {
    pub fn new(
        level: ConsoleLevel,
        message: String,
        timestamp_ms: Option<u64>,
        origin: Option<ConsoleOrigin>,
        deduplication: Option<DeduplicationSummary>,
    ) -> Self {
        Self {
            level,
            message,
            timestamp_ms,
            origin,
            deduplication,
        }
    }
}

/// Occurrence metadata attached to a console event that matched an existing dedup entry.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct DeduplicationSummary {
    pub count: u64,
    pub first_seen_at_ms: u64,
    pub last_seen_at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

impl DeduplicationSummary {
    /// Builds a summary. A free function rather than a struct literal since this type is
    /// `#[non_exhaustive]` even within the workspace.
    pub fn new(count: u64, first_seen_at_ms: u64, last_seen_at_ms: u64, sources: Option<Vec<String>>) -> Self {
        Self {
            count,
            first_seen_at_ms,
            last_seen_at_ms,
            sources,
        }
    }
}

/// The history of retry attempts for a test that eventually reached a terminal status.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RetryInfoSummary {
    pub attempts: Vec<AttemptSummary>,
}

impl RetryInfoSummary {
    pub fn new(attempts: Vec<AttemptSummary>) -> Self {
        Self { attempts }
    }
}

/// One attempt within a [`RetryInfoSummary`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct AttemptSummary {
    pub attempt_number: u32,
    pub status: TestStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TestErrorSummary>,
    pub timestamp: DateTime<FixedOffset>,
}

impl AttemptSummary {
    pub fn new(
        attempt_number: u32,
        status: TestStatus,
        duration_ms: u64,
        error: Option<TestErrorSummary>,
        timestamp: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            attempt_number,
            status,
            duration_ms,
            error,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(TestStatus::Passed, "\"passed\""; "passed")]
    #[test_case(TestStatus::Failed, "\"failed\""; "failed")]
    #[test_case(TestStatus::Skipped, "\"skipped\""; "skipped")]
    #[test_case(TestStatus::Pending, "\"pending\""; "pending")]
    fn status_serializes_to_kebab_case(status: TestStatus, expected: &str) {
        assert_eq!(serde_json::to_string(&status).unwrap(), expected);
    }

    #[test]
    fn document_with_no_failures_omits_the_field() {
        let doc = ReporterDocument::new(Summary {
            total: 0,
            passed: 0,
            failed: 0,
            skipped: 0,
            duration_ms: 0,
            timestamp: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(),
            environment: EnvironmentSummary::default(),
        });

        let json = serde_json::to_value(&doc).unwrap();
        assert!(json.get("failures").is_none());
        assert!(json.get("summary").is_some());
    }

    #[test]
    fn value_preview_distinguishes_string_and_number() {
        assert_eq!(Value::String("1".to_string()).type_name(), "string");
        assert_eq!(Value::Int(1).type_name(), "number");
        assert_ne!(Value::String("1".to_string()).preview(), Value::Int(1).preview());
    }
}
