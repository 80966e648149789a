// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token-budget-aware truncation of an assembled document (`spec.md` §4.5).
//!
//! Applied once, after `output_builder` has produced a full [`ReporterDocument`]. Phases run in
//! order, re-measuring the serialized size after each, and stop as soon as the document fits
//! `max_tokens`. Every phase is non-destructive of structure — the result is always valid
//! JSON-shaped data, never a string truncated mid-escape.

use crate::config::TruncationTunables;
use crate::token_counter::TokenCounter;
use parking_lot::Mutex;
use reporter_schema::{ConsoleEventSummary, ConsoleLevel, ContextSummary, ReporterDocument, StackFrameSummary, TestErrorSummary, TestFailure, Value};
use std::collections::VecDeque;

const OBSERVABILITY_CAPACITY: usize = 100;

/// Per-invocation bookkeeping, retained for diagnosing truncation behavior across a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TruncationRecord {
    pub original_tokens: u32,
    pub truncated_tokens: u32,
    pub phases_applied: Vec<u8>,
}

/// Shrinks documents to fit a token budget, recording an observability trail as it goes.
#[derive(Default)]
pub struct LateTruncator {
    history: Mutex<VecDeque<TruncationRecord>>,
}

impl LateTruncator {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// Truncates `document` in place against `max_tokens`, using `counter` to measure. Phases 2
    /// and 3's per-category character caps come from `tunables` rather than being hardcoded, so
    /// a caller can widen or narrow them without forking the crate.
    pub fn truncate(&self, mut document: ReporterDocument, max_tokens: u32, tunables: &TruncationTunables, counter: &dyn TokenCounter) -> ReporterDocument {
        let original_tokens = measure(&document, counter);
        let mut phases_applied = Vec::new();

        if measure(&document, counter) <= max_tokens {
            self.record(original_tokens, original_tokens, phases_applied);
            return document;
        }

        phases_applied.push(1);
        phase1_drop_low_value_sections(&mut document);
        if measure(&document, counter) <= max_tokens {
            let truncated_tokens = measure(&document, counter);
            self.record(original_tokens, truncated_tokens, phases_applied);
            return document;
        }

        phases_applied.push(2);
        phase2_failure_focused_trimming(&mut document, tunables);
        if measure(&document, counter) <= max_tokens {
            let truncated_tokens = measure(&document, counter);
            self.record(original_tokens, truncated_tokens, phases_applied);
            return document;
        }

        phases_applied.push(3);
        phase3_progressive_tightening(&mut document, tunables);
        if measure(&document, counter) <= max_tokens {
            let truncated_tokens = measure(&document, counter);
            self.record(original_tokens, truncated_tokens, phases_applied);
            return document;
        }

        phases_applied.push(4);
        phase4_failure_culling(&mut document, max_tokens, counter);
        if measure(&document, counter) <= max_tokens {
            let truncated_tokens = measure(&document, counter);
            self.record(original_tokens, truncated_tokens, phases_applied);
            return document;
        }

        phases_applied.push(5);
        phase5_minimum_viable_emission(&mut document);

        let truncated_tokens = measure(&document, counter);
        self.record(original_tokens, truncated_tokens, phases_applied);
        document
    }

    fn record(&self, original_tokens: u32, truncated_tokens: u32, phases_applied: Vec<u8>) {
        let mut history = self.history.lock();
        if history.len() >= OBSERVABILITY_CAPACITY {
            history.pop_front();
        }
        history.push_back(TruncationRecord {
            original_tokens,
            truncated_tokens,
            phases_applied,
        });
    }

    /// Returns a snapshot of the observability trail, oldest first.
    pub fn history(&self) -> Vec<TruncationRecord> {
        self.history.lock().iter().cloned().collect()
    }
}

fn measure(document: &ReporterDocument, counter: &dyn TokenCounter) -> u32 {
    let serialized = serde_json::to_string(document).unwrap_or_default();
    counter.count(&serialized)
}

fn phase1_drop_low_value_sections(document: &mut ReporterDocument) {
    document.passed = None;
    document.skipped = None;
}

fn phase2_failure_focused_trimming(document: &mut ReporterDocument, tunables: &TruncationTunables) {
    let Some(failures) = document.failures.as_mut() else {
        return;
    };
    for failure in failures.iter_mut() {
        trim_failure_console_events(failure, tunables.info_warn_chars_per_failure, tunables.error_chars_per_failure);
        if let Some(frames) = failure.error.stack_frames.as_mut() {
            cap_stack_frames(frames, 10);
        }
        if let Some(context) = failure.error.context.as_mut() {
            trim_context(context);
        }
        if let Some(assertion) = failure.error.assertion.as_mut() {
            assertion.expected = truncate_assertion_value(&assertion.expected);
            assertion.actual = truncate_assertion_value(&assertion.actual);
        }
    }
}

fn phase3_progressive_tightening(document: &mut ReporterDocument, tunables: &TruncationTunables) {
    let Some(failures) = document.failures.as_mut() else {
        return;
    };
    for failure in failures.iter_mut() {
        failure.error.message = truncate_with_ellipsis(&failure.error.message, tunables.phase3_error_message_chars);
        if let Some(events) = failure.console_events.as_mut() {
            cap_total_char_budget(events, tunables.phase3_console_chars_per_failure);
        }
        if let Some(frames) = failure.error.stack_frames.as_mut() {
            cap_stack_frames(frames, tunables.phase3_retained_frames);
        }
    }
}

fn phase4_failure_culling(document: &mut ReporterDocument, max_tokens: u32, counter: &dyn TokenCounter) {
    {
        let Some(failures) = document.failures.as_mut() else {
            return;
        };
        if failures.len() <= 1 {
            return;
        }
        // Higher priority (kept longer) sorts first.
        failures.sort_by(|a, b| priority_key(b).cmp(&priority_key(a)));
    }

    loop {
        if measure(document, counter) <= max_tokens {
            return;
        }
        let Some(failures) = document.failures.as_mut() else {
            return;
        };
        if failures.len() <= 1 {
            return;
        }
        failures.pop();
    }
}

fn priority_key(failure: &TestFailure) -> (usize, usize, bool) {
    let in_project_depth = failure
        .error
        .stack_frames
        .as_ref()
        .map(|frames| frames.iter().filter(|f| f.in_project).count())
        .unwrap_or(0);
    let stack_length = failure.error.stack_frames.as_ref().map(Vec::len).unwrap_or(0);
    let has_diff = failure.error.diff.is_some();
    (in_project_depth, stack_length, has_diff)
}

fn phase5_minimum_viable_emission(document: &mut ReporterDocument) {
    let Some(failures) = document.failures.as_mut() else {
        return;
    };
    for failure in failures.iter_mut() {
        let message = truncate_with_ellipsis(&failure.error.message, 512);
        failure.file_relative = camino::Utf8PathBuf::new();
        failure.start_line = 0;
        failure.end_line = 0;
        failure.suite = None;
        failure.console_events = None;
        failure.retry_info = None;
        failure.error = TestErrorSummary::new(message, failure.error.error_type.clone(), None, None, None, None);
    }
}

/// Drops debug/trace entirely, then caps `info`/`warn` to `info_warn_budget` chars total (shared
/// across both, since the spec treats them as a single category) and `error` to `error_budget`,
/// preserving the earliest entries of each when the budget is exceeded.
fn trim_failure_console_events(failure: &mut TestFailure, info_warn_budget: usize, error_budget: usize) {
    let Some(events) = failure.console_events.as_mut() else {
        return;
    };
    events.retain(|event| !matches!(event.level, ConsoleLevel::Debug | ConsoleLevel::Trace));
    cap_category_budget(events, |level| matches!(level, ConsoleLevel::Info | ConsoleLevel::Warn), info_warn_budget);
    cap_category_budget(events, |level| matches!(level, ConsoleLevel::Error), error_budget);
}

/// Keeps events (in order) matching `matches_category` up to `budget` total message characters,
/// dropping later ones once the budget is spent. Events outside the category pass through
/// untouched.
fn cap_category_budget(events: &mut Vec<ConsoleEventSummary>, matches_category: impl Fn(ConsoleLevel) -> bool, budget: usize) {
    let mut used = 0usize;
    let mut retained = Vec::with_capacity(events.len());
    for event in events.drain(..) {
        if matches_category(event.level) {
            if used + event.message.len() <= budget {
                used += event.message.len();
                retained.push(event);
            }
        } else {
            retained.push(event);
        }
    }
    *events = retained;
}

/// Caps total message characters across all categories combined.
fn cap_total_char_budget(events: &mut Vec<ConsoleEventSummary>, budget: usize) {
    let mut used = 0usize;
    let mut retained = Vec::with_capacity(events.len());
    for event in events.drain(..) {
        if used + event.message.len() > budget {
            continue;
        }
        used += event.message.len();
        retained.push(event);
    }
    *events = retained;
}

/// Enforces `max` retained frames, dropping non-project frames first (from the end), and only
/// touching in-project frames if every non-project frame has already been removed.
fn cap_stack_frames(frames: &mut Vec<StackFrameSummary>, max: usize) {
    while frames.len() > max {
        if let Some(index) = frames.iter().rposition(|frame| !frame.in_project) {
            frames.remove(index);
        } else {
            frames.pop();
        }
    }
}

/// Shrinks a code-context window to at most 5 lines, centered as closely as possible on its
/// midpoint (the window is assumed to already be roughly centered on the pointer line, as
/// produced by the host framework).
fn trim_context(context: &mut ContextSummary) {
    const MAX_LINES: usize = 5;
    if context.code.len() <= MAX_LINES {
        return;
    }
    let mid = context.code.len() / 2;
    let start = mid.saturating_sub(MAX_LINES / 2);
    let end = (start + MAX_LINES).min(context.code.len());
    context.code = context.code[start..end].to_vec();
}

/// Truncates an assertion value's serialized form to 250 characters. Structural values
/// (object/array) fall back to a short summary string rather than a cut-off JSON fragment, to
/// preserve structural validity; scalars are never converted to strings.
fn truncate_assertion_value(value: &Value) -> Value {
    let serialized = serde_json::to_string(value).unwrap_or_default();
    if serialized.len() <= 250 {
        return value.clone();
    }
    match value {
        Value::String(s) => Value::String(truncate_with_ellipsis(s, 250)),
        Value::Object(_) | Value::Array(_) | Value::Opaque(_) => Value::String(value.preview()),
        scalar => scalar.clone(),
    }
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max_chars).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use reporter_schema::{EnvironmentSummary, Summary};

    struct FixedCounter;
    impl TokenCounter for FixedCounter {
        fn count(&self, text: &str) -> u32 {
            text.len() as u32
        }
    }

    fn summary() -> Summary {
        Summary::new(1, 0, 1, 0, 0, DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap(), EnvironmentSummary::default())
    }

    fn tunables() -> TruncationTunables {
        TruncationTunables::default()
    }

    fn failure(name: &str, message_len: usize) -> TestFailure {
        TestFailure::new(
            name.to_string(),
            camino::Utf8PathBuf::from("a.test.ts"),
            1,
            2,
            None,
            TestErrorSummary::new("x".repeat(message_len), "Error".to_string(), None, None, None, None),
            None,
            None,
        )
    }

    #[test]
    fn under_budget_document_is_returned_unchanged() {
        let mut document = ReporterDocument::new(summary());
        document.failures = Some(vec![failure("t1", 10)]);
        let truncator = LateTruncator::new();
        let result = truncator.truncate(document, u32::MAX, &tunables(), &FixedCounter);
        assert_eq!(result.failures.unwrap()[0].error.message.len(), 10);
    }

    #[test]
    fn passed_and_skipped_are_dropped_first() {
        let mut document = ReporterDocument::new(summary());
        document.failures = Some(vec![failure("t1", 10)]);
        document.passed = Some(vec![reporter_schema::TestResult::new(
            "p1".to_string(),
            camino::Utf8PathBuf::from("p.test.ts"),
            1,
            2,
            reporter_schema::TestStatus::Passed,
            Some(5),
            None,
        )]);

        let tiny_budget = serde_json::to_string(&document).unwrap().len() as u32 - 5;
        let truncator = LateTruncator::new();
        let result = truncator.truncate(document, tiny_budget, &tunables(), &FixedCounter);
        assert!(result.passed.is_none());
    }

    #[test]
    fn debug_and_trace_events_are_always_dropped_in_phase_two() {
        let mut document = ReporterDocument::new(summary());
        let mut f = failure("t1", 10);
        f.console_events = Some(vec![
            ConsoleEventSummary::new(ConsoleLevel::Debug, "noisy".to_string(), None, None, None),
            ConsoleEventSummary::new(ConsoleLevel::Error, "boom".to_string(), None, None, None),
        ]);
        document.failures = Some(vec![f]);

        let tiny_budget = 1;
        let truncator = LateTruncator::new();
        let result = truncator.truncate(document, tiny_budget, &tunables(), &FixedCounter);
        let failures = result.failures.unwrap();
        let events = failures[0].console_events.as_ref();
        if let Some(events) = events {
            assert!(events.iter().all(|e| !matches!(e.level, ConsoleLevel::Debug | ConsoleLevel::Trace)));
        }
    }

    #[test]
    fn lowest_priority_failures_are_culled_before_minimum_viable_emission() {
        let mut document = ReporterDocument::new(summary());
        let mut rich = failure("rich", 10);
        rich.error.stack_frames = Some(vec![StackFrameSummary::new(camino::Utf8PathBuf::from("a.ts"), 1, 1, true, false)]);
        let plain = failure("plain", 10);
        document.failures = Some(vec![plain, rich]);

        let serialized_len = serde_json::to_string(&document).unwrap().len();
        let truncator = LateTruncator::new();
        let result = truncator.truncate(document, (serialized_len / 2) as u32, &tunables(), &FixedCounter);

        let failures = result.failures.unwrap();
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn summary_block_survives_the_smallest_possible_budget() {
        let mut document = ReporterDocument::new(summary());
        document.failures = Some(vec![failure("t1", 10000)]);
        let truncator = LateTruncator::new();
        let result = truncator.truncate(document, 1, &tunables(), &FixedCounter);
        assert_eq!(result.summary.failed, 1);
        let failures = result.failures.unwrap();
        assert_eq!(failures[0].test, "t1");
        assert!(failures[0].error.stack_frames.is_none());
    }
}
