// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The event orchestrator (`spec.md` §4.1).
//!
//! Owns the authoritative state for every test in the run and the small amount of run-level
//! bookkeeping (unhandled errors, timing) that doesn't belong to any single test. Every public
//! method takes the single internal lock for the duration of one map operation and releases it
//! before returning — matching the runner's rule that a critical section never spans an
//! `.await` or any call back out into caller code.

use crate::console::ConsoleCapture;
use crate::ids::TestId;
use crate::record::{TerminalStatus, TestError, TestRecord};
use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use reporter_schema::{ConsoleLevel, ConsoleOrigin, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::warn;

/// Bound on the orphan console-event queue. Chosen generously relative to typical burst sizes
/// (a handful of framework-level `console.log`s before the first test starts) without letting an
/// adversarial or buggy framework integration grow it unboundedly.
const ORPHAN_QUEUE_CAPACITY: usize = 64;

/// A console event that arrived with no `testId` and no ambient context bound, parked until it
/// can be attributed (or discarded).
#[derive(Clone, Debug)]
struct OrphanConsoleEvent {
    level: ConsoleLevel,
    message: String,
    args: Option<Vec<Value>>,
    elapsed_ms: Option<u64>,
    origin: ConsoleOrigin,
}

struct OrchestratorInner {
    records: std::collections::HashMap<TestId, TestRecord>,
    active_tests: HashSet<TestId>,
    module_errors: Vec<TestError>,
    orphans: VecDeque<OrphanConsoleEvent>,
    dropped_orphans: u64,
    run_started_at_ms: Option<u64>,
    run_ended_at_ms: Option<u64>,
}

/// A point-in-time view of run state, returned once the run has ended.
pub struct OrchestratorSnapshot {
    pub records: Vec<TestRecord>,
    pub module_errors: Vec<TestError>,
    pub run_started_at_ms: Option<u64>,
    pub run_ended_at_ms: Option<u64>,
}

/// Tracks every test's lifecycle across a single run and attributes console output to the right
/// test even when it arrives with no explicit `testId`.
///
/// # Orphaned console events
///
/// A console write with no `testId` and no ambient context (`spec.md` §4.1: "buffered in a
/// short-lived orphan queue keyed by arrival order; the Console Capture tries to attribute it
/// using context") is parked in a bounded, drop-oldest FIFO. It's only ever drained when a test
/// starts while it is the *sole* active test — attributing a burst of pre-test-start output to
/// one specific test among several concurrently running ones would be a guess, not an inference,
/// so in that case the events are left queued (and eventually dropped on overflow, or discarded
/// at run end) rather than attributed to an arbitrary candidate.
///
/// # Retries and late events
///
/// A console event ingested for a `TestId` that has since begun a new retry generation is always
/// attributed to that new generation. The buffer is keyed by `TestId` alone — it is not
/// generation-scoped — so this falls out of the data model rather than needing special-cased
/// logic: there is no way for an event to land in an archived generation's buffer, because no
/// such buffer exists.
pub struct Orchestrator {
    console: Arc<ConsoleCapture>,
    inner: Mutex<OrchestratorInner>,
}

impl Orchestrator {
    /// Creates an orchestrator that attributes console output through `console`.
    pub fn new(console: Arc<ConsoleCapture>) -> Self {
        Self {
            console,
            inner: Mutex::new(OrchestratorInner {
                records: std::collections::HashMap::new(),
                active_tests: HashSet::new(),
                module_errors: Vec::new(),
                orphans: VecDeque::new(),
                dropped_orphans: 0,
                run_started_at_ms: None,
                run_ended_at_ms: None,
            }),
        }
    }

    /// Marks the run as started.
    pub fn on_run_start(&self, started_at_ms: u64) {
        self.inner.lock().run_started_at_ms = Some(started_at_ms);
    }

    /// Declares a test, ahead of it actually starting. Idempotent: declaring an already-known
    /// test is a no-op, since `spec.md` describes this as advisory ("allows the orchestrator to
    /// pre-allocate state").
    #[allow(clippy::too_many_arguments)]
    pub fn on_test_ready(
        &self,
        test_id: TestId,
        name: String,
        file_relative: camino::Utf8PathBuf,
        start_line: u32,
        end_line: u32,
        suite: Option<Vec<String>>,
    ) {
        let mut inner = self.inner.lock();
        inner.records.entry(test_id.clone()).or_insert_with(|| {
            TestRecord::new_pending(test_id, name, file_relative, start_line, end_line, suite)
        });
    }

    /// Marks a test as running, synthesizing a minimal record if `on_test_ready` was never
    /// called for it. Also attempts to drain the orphan console queue into this test, if it is
    /// the only test currently active.
    pub fn on_test_start(&self, test_id: &TestId, started_at_ms: u64) {
        let mut inner = self.inner.lock();

        inner.records.entry(test_id.clone()).or_insert_with(|| {
            warn!(%test_id, "test started with no prior onTestReady; synthesizing a minimal record");
            TestRecord::new_pending(
                test_id.clone(),
                test_id.to_string(),
                camino::Utf8PathBuf::from(""),
                0,
                0,
                None,
            )
        });

        if let Some(record) = inner.records.get_mut(test_id) {
            record.start(started_at_ms);
        }
        inner.active_tests.insert(test_id.clone());

        self.console.start_capture(test_id);

        if inner.active_tests.len() == 1 && !inner.orphans.is_empty() {
            let orphans: Vec<_> = inner.orphans.drain(..).collect();
            drop(inner);
            for orphan in orphans {
                if let Some(event_ref) = self.console.ingest(
                    test_id,
                    orphan.level,
                    orphan.message,
                    orphan.args,
                    orphan.elapsed_ms,
                    orphan.origin,
                ) {
                    if let Some(record) = self.inner.lock().records.get_mut(test_id) {
                        record.record_console_ref(event_ref);
                    }
                }
            }
        }
    }

    /// Records a terminal result, synthesizing a minimal record if necessary.
    pub fn on_test_result(&self, test_id: &TestId, status: TerminalStatus, ended_at_ms: u64) {
        let mut inner = self.inner.lock();

        let is_duplicate = inner
            .records
            .get(test_id)
            .map(|r| r.state.is_terminal())
            .unwrap_or(false);
        if is_duplicate {
            warn!(%test_id, "duplicate terminal result; discarding");
            return;
        }

        let record = inner.records.entry(test_id.clone()).or_insert_with(|| {
            warn!(%test_id, "result reported for unknown test; synthesizing a minimal record");
            TestRecord::new_pending(
                test_id.clone(),
                test_id.to_string(),
                camino::Utf8PathBuf::from(""),
                0,
                0,
                None,
            )
        });
        record.finish(status, ended_at_ms);
        inner.active_tests.remove(test_id);
    }

    /// Archives the current attempt and begins a new retry generation.
    pub fn on_test_retry(&self, test_id: &TestId, timestamp: DateTime<FixedOffset>) {
        let mut inner = self.inner.lock();
        if let Some(record) = inner.records.get_mut(test_id) {
            record.begin_retry(timestamp);
        } else {
            warn!(%test_id, "retry reported for unknown test; ignoring");
        }
    }

    /// Attributes a console write. `test_id` takes precedence if given; otherwise the ambient
    /// context (set via [`ConsoleCapture::run_with_capture`]) is consulted; failing both, the
    /// event is parked in the orphan queue. Returns the ref it was stored under, if attributed.
    pub fn on_user_console_log(
        &self,
        test_id: Option<TestId>,
        level: ConsoleLevel,
        message: String,
        args: Option<Vec<Value>>,
        elapsed_ms: Option<u64>,
        origin: ConsoleOrigin,
    ) -> Option<crate::ids::ConsoleEventRef> {
        let resolved = test_id.or_else(ConsoleCapture::current_test);

        let Some(resolved) = resolved else {
            let mut inner = self.inner.lock();
            if inner.orphans.len() >= ORPHAN_QUEUE_CAPACITY {
                inner.orphans.pop_front();
                inner.dropped_orphans += 1;
            }
            inner.orphans.push_back(OrphanConsoleEvent {
                level,
                message,
                args,
                elapsed_ms,
                origin,
            });
            return None;
        };

        let event_ref = self.console.ingest(&resolved, level, message, args, elapsed_ms, origin);
        if let Some(event_ref) = event_ref {
            if let Some(record) = self.inner.lock().records.get_mut(&resolved) {
                record.record_console_ref(event_ref);
            }
        }
        event_ref
    }

    /// Records a run-level error with no associated test.
    pub fn on_unhandled_error(&self, error: TestError) {
        self.inner.lock().module_errors.push(error);
    }

    /// Finalizes the run: any test still `Pending` or `Running` is given a synthesized
    /// [`TestError::incomplete`] terminal result, since the host framework never reported one.
    pub fn on_run_end(&self, ended_at_ms: u64) -> OrchestratorSnapshot {
        let mut inner = self.inner.lock();
        inner.run_ended_at_ms = Some(ended_at_ms);

        for record in inner.records.values_mut() {
            if !record.state.is_terminal() {
                record.finish(TerminalStatus::Failed(TestError::incomplete()), ended_at_ms);
            }
        }
        inner.active_tests.clear();

        if inner.dropped_orphans > 0 {
            warn!(
                dropped = inner.dropped_orphans,
                "discarded orphaned console events that could never be attributed to a test"
            );
        }

        OrchestratorSnapshot {
            records: inner.records.values().cloned().collect(),
            module_errors: inner.module_errors.clone(),
            run_started_at_ms: inner.run_started_at_ms,
            run_ended_at_ms: inner.run_ended_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(ConsoleCapture::new(usize::MAX, usize::MAX, false)))
    }

    #[test]
    fn unknown_test_id_on_result_synthesizes_a_record() {
        let orchestrator = orchestrator();
        let test_id = TestId::new("ghost");
        orchestrator.on_test_result(&test_id, TerminalStatus::Passed, 10);

        let snapshot = orchestrator.on_run_end(20);
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].test_id, test_id);
    }

    #[test]
    fn incomplete_tests_are_synthesized_as_failed_at_run_end() {
        let orchestrator = orchestrator();
        orchestrator.on_test_ready(
            TestId::new("t1"),
            "still running".to_string(),
            Utf8PathBuf::from("a.test.ts"),
            1,
            2,
            None,
        );
        orchestrator.on_test_start(&TestId::new("t1"), 0);

        let snapshot = orchestrator.on_run_end(100);
        let record = &snapshot.records[0];
        assert!(matches!(
            &record.state,
            crate::record::TestState::Terminal {
                status: TerminalStatus::Failed(err),
                ..
            } if err.error_type == "IncompleteTestError"
        ));
    }

    #[test]
    fn orphan_events_drain_into_the_sole_active_test() {
        let orchestrator = orchestrator();
        orchestrator.on_user_console_log(
            None,
            ConsoleLevel::Info,
            "early output".to_string(),
            None,
            None,
            ConsoleOrigin::Stdout,
        );

        let test_id = TestId::new("t1");
        orchestrator.on_test_ready(
            test_id.clone(),
            "test".to_string(),
            Utf8PathBuf::from("a.test.ts"),
            1,
            2,
            None,
        );
        orchestrator.on_test_start(&test_id, 0);

        orchestrator.console.with_buffer(&test_id, |buf| {
            assert_eq!(buf.len(), 1);
        });
    }

    #[test]
    fn orphan_events_stay_queued_when_multiple_tests_are_active() {
        let orchestrator = orchestrator();
        let t1 = TestId::new("t1");
        let t2 = TestId::new("t2");
        orchestrator.on_test_start(&t1, 0);
        orchestrator.on_test_start(&t2, 0);

        orchestrator.on_user_console_log(
            None,
            ConsoleLevel::Info,
            "ambiguous".to_string(),
            None,
            None,
            ConsoleOrigin::Stdout,
        );

        assert_eq!(orchestrator.inner.lock().orphans.len(), 1);
    }
}
