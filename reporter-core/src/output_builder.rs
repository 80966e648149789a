// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Assembles a [`ReporterDocument`] from run state (`spec.md` §4.4).
//!
//! Pure projection: everything here reads from an [`OrchestratorSnapshot`] and a
//! [`ConsoleCapture`], and produces the public schema types. No mutation, no I/O, no clock
//! reads — `timestamp` is supplied by the caller so this stays trivially testable.

use crate::console::{ConsoleCapture, ConsoleEvent};
use crate::orchestrator::OrchestratorSnapshot;
use crate::record::{TerminalStatus, TestError, TestRecord, TestState};
use crate::{stack_frame, value_diff};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, FixedOffset};
use reporter_schema::{
    AssertionSummary, ConsoleEventSummary, ContextSummary, EnvironmentSummary, ReporterDocument,
    RetryInfoSummary, Summary, TestErrorSummary, TestFailure, TestResult, TestStatus,
};

/// Assembles the full document from a finished run.
pub fn build_document(
    snapshot: &OrchestratorSnapshot,
    console: &ConsoleCapture,
    project_root: &Utf8Path,
    environment: EnvironmentSummary,
    timestamp: DateTime<FixedOffset>,
) -> ReporterDocument {
    let mut failures = Vec::new();
    let mut passed = Vec::new();
    let mut skipped = Vec::new();
    let mut success_logs = Vec::new();

    for record in &snapshot.records {
        classify_record(record, console, project_root, &mut failures, &mut passed, &mut skipped, &mut success_logs);
    }

    for (index, error) in snapshot.module_errors.iter().enumerate() {
        failures.push(build_unhandled_error_failure(index, error, project_root));
    }

    let total = failures.len() + passed.len() + skipped.len();
    let duration_ms = match (snapshot.run_started_at_ms, snapshot.run_ended_at_ms) {
        (Some(start), Some(end)) => end.saturating_sub(start),
        _ => 0,
    };

    let summary = Summary::new(total, passed.len(), failures.len(), skipped.len(), duration_ms, timestamp, environment);

    let mut document = ReporterDocument::new(summary);
    if !failures.is_empty() {
        document.failures = Some(failures);
    }
    if !passed.is_empty() {
        document.passed = Some(passed);
    }
    if !skipped.is_empty() {
        document.skipped = Some(skipped);
    }
    if !success_logs.is_empty() {
        document.success_logs = Some(success_logs);
    }
    document
}

#[allow(clippy::too_many_arguments)]
fn classify_record(
    record: &TestRecord,
    console: &ConsoleCapture,
    project_root: &Utf8Path,
    failures: &mut Vec<TestFailure>,
    passed: &mut Vec<TestResult>,
    skipped: &mut Vec<TestResult>,
    success_logs: &mut Vec<ConsoleEventSummary>,
) {
    let TestState::Terminal { status, .. } = &record.state else {
        // Every record is finalized by `Orchestrator::on_run_end` before a snapshot is taken;
        // a non-terminal record here indicates a snapshot taken outside that flow.
        skipped.push(TestResult::new(
            record.name.clone(),
            record.file_relative.clone(),
            record.start_line,
            record.end_line,
            TestStatus::Pending,
            None,
            record.suite.clone(),
        ));
        return;
    };

    match status {
        TerminalStatus::Passed => {
            passed.push(TestResult::new(
                record.name.clone(),
                record.file_relative.clone(),
                record.start_line,
                record.end_line,
                TestStatus::Passed,
                record.duration_ms(),
                record.suite.clone(),
            ));
            if let Some(events) = console.with_buffer(&record.test_id, |buf| {
                buf.iter()
                    .filter(|event| matches!(event.level, reporter_schema::ConsoleLevel::Warn | reporter_schema::ConsoleLevel::Error))
                    .map(convert_console_event)
                    .collect::<Vec<_>>()
            }) {
                success_logs.extend(events);
            }
        }
        TerminalStatus::Skipped => {
            skipped.push(TestResult::new(
                record.name.clone(),
                record.file_relative.clone(),
                record.start_line,
                record.end_line,
                TestStatus::Skipped,
                record.duration_ms(),
                record.suite.clone(),
            ));
        }
        TerminalStatus::Failed(error) => {
            let console_events = console
                .with_buffer(&record.test_id, |buf| buf.iter().map(convert_console_event).collect::<Vec<_>>())
                .filter(|events: &Vec<_>| !events.is_empty());

            let retry_info = (!record.retry_history.is_empty()).then(|| {
                RetryInfoSummary::new(
                    record
                        .retry_history
                        .iter()
                        .map(|attempt| {
                            reporter_schema::AttemptSummary::new(
                                attempt.attempt_number,
                                convert_terminal_status(&attempt.status),
                                attempt.ended_at_ms.saturating_sub(attempt.started_at_ms),
                                match &attempt.status {
                                    TerminalStatus::Failed(error) => Some(convert_error(error, project_root)),
                                    _ => None,
                                },
                                attempt.timestamp,
                            )
                        })
                        .collect(),
                )
            });

            failures.push(TestFailure::new(
                record.name.clone(),
                record.file_relative.clone(),
                record.start_line,
                record.end_line,
                record.suite.clone(),
                convert_error(error, project_root),
                console_events,
                retry_info,
            ));
        }
    }
}

/// Module errors arrive with no owning test, so every one of them becomes the same synthetic
/// record name regardless of how many there are (`spec.md` §4.1: "a synthetic failure record
/// `Unhandled Error`"). `error_type` is likewise forced to `"UnhandledError"` — a module error
/// has no test-level classification to preserve, so this is the engine's own label for "had no
/// owning test", not something the host is expected to supply.
fn build_unhandled_error_failure(_index: usize, error: &TestError, project_root: &Utf8Path) -> TestFailure {
    let mut summary = convert_error(error, project_root);
    summary.error_type = "UnhandledError".to_string();

    TestFailure::new(
        "Unhandled Error".to_string(),
        Utf8PathBuf::new(),
        0,
        0,
        None,
        summary,
        None,
        None,
    )
}

fn convert_terminal_status(status: &TerminalStatus) -> TestStatus {
    match status {
        TerminalStatus::Passed => TestStatus::Passed,
        TerminalStatus::Failed(_) => TestStatus::Failed,
        TerminalStatus::Skipped => TestStatus::Skipped,
    }
}

fn convert_error(error: &TestError, project_root: &Utf8Path) -> TestErrorSummary {
    let stack_frames = (!error.stack_frames.is_empty())
        .then(|| stack_frame::classify_stack(&error.stack_frames, project_root));

    let assertion = error.assertion.as_ref().map(|raw| {
        AssertionSummary::new(
            raw.expected.clone(),
            raw.actual.clone(),
            raw.expected.type_name().to_string(),
            raw.actual.type_name().to_string(),
            raw.operator.clone(),
        )
    });

    let diff = error.assertion.as_ref().and_then(|raw| {
        (raw.expected.is_structural() && raw.actual.is_structural())
            .then(|| value_diff::diff_values(&raw.expected, &raw.actual))
    });

    let context = (!error.code_lines.is_empty()).then(|| ContextSummary::new(error.code_lines.clone(), error.pointer_line.unwrap_or(0)));

    TestErrorSummary::new(error.message.clone(), error.error_type.clone(), stack_frames, assertion, context, diff)
}

fn convert_console_event(event: &ConsoleEvent) -> ConsoleEventSummary {
    ConsoleEventSummary::new(event.level, event.message.clone(), event.elapsed_ms, Some(event.origin), event.deduplication.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::TestId;
    use crate::record::TestRecord;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn project_root() -> Utf8PathBuf {
        Utf8PathBuf::from("/repo")
    }

    #[test]
    fn passed_and_failed_counts_are_derived() {
        let console = Arc::new(ConsoleCapture::new(usize::MAX, usize::MAX, false));

        let mut passing = TestRecord::new_pending(TestId::new("t1"), "ok".to_string(), Utf8PathBuf::from("a.test.ts"), 1, 2, None);
        passing.start(0);
        passing.finish(TerminalStatus::Passed, 10);

        let mut failing = TestRecord::new_pending(TestId::new("t2"), "bad".to_string(), Utf8PathBuf::from("b.test.ts"), 1, 2, None);
        failing.start(0);
        failing.finish(
            TerminalStatus::Failed(TestError {
                message: "boom".to_string(),
                error_type: "Error".to_string(),
                stack_frames: Vec::new(),
                assertion: None,
                code_lines: Vec::new(),
                pointer_line: None,
            }),
            10,
        );

        let snapshot = OrchestratorSnapshot {
            records: vec![passing, failing],
            module_errors: Vec::new(),
            run_started_at_ms: Some(0),
            run_ended_at_ms: Some(10),
        };

        let timestamp = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let document = build_document(&snapshot, &console, &project_root(), EnvironmentSummary::default(), timestamp);

        assert_eq!(document.summary.total, 2);
        assert_eq!(document.summary.passed, 1);
        assert_eq!(document.summary.failed, 1);
        assert_eq!(document.passed.unwrap().len(), 1);
        assert_eq!(document.failures.unwrap().len(), 1);
    }

    #[test]
    fn unhandled_errors_become_synthetic_failures() {
        let console = Arc::new(ConsoleCapture::new(usize::MAX, usize::MAX, false));
        let snapshot = OrchestratorSnapshot {
            records: Vec::new(),
            module_errors: vec![TestError {
                message: "uncaught".to_string(),
                error_type: "Error".to_string(),
                stack_frames: Vec::new(),
                assertion: None,
                code_lines: Vec::new(),
                pointer_line: None,
            }],
            run_started_at_ms: Some(0),
            run_ended_at_ms: Some(5),
        };

        let timestamp = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let document = build_document(&snapshot, &console, &project_root(), EnvironmentSummary::default(), timestamp);

        assert_eq!(document.summary.failed, 1);
        let failures = document.failures.unwrap();
        assert_eq!(failures[0].test, "Unhandled Error");
        assert_eq!(failures[0].error.error_type, "UnhandledError");
    }
}
