// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The reporter facade (`SPEC_FULL.md` §4.8).
//!
//! Wires every subsystem — [`Orchestrator`], [`ConsoleCapture`], [`DeduplicationCache`],
//! [`EnvironmentProbe`], [`output_builder`], and [`LateTruncator`] — behind the eight event
//! hooks a host test framework actually calls (`spec.md` §6.2), plus [`ReporterFacade::finish`]
//! to retrieve the assembled, budget-trimmed document. This is the only type most host
//! integrations need to touch; everything else in this crate is a collaborator it owns.

use crate::config::{DedupScope, NormalizedReporterConfig, ReporterConfig};
use crate::console::ConsoleCapture;
use crate::dedup::{DedupCheck, DeduplicationCache};
use crate::env_probe::{EnvironmentProbe, HostEnvironmentHints};
use crate::errors::ConfigError;
use crate::ids::{ConsoleEventRef, TestId};
use crate::late_truncator::LateTruncator;
use crate::orchestrator::{Orchestrator, OrchestratorSnapshot};
use crate::output_builder;
use crate::record::TerminalStatus;
use crate::token_counter::{ApproximateTokenCounter, TokenCounter, WriteDocument};
use camino::Utf8PathBuf;
use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use reporter_schema::{ConsoleLevel, ConsoleOrigin, EnvironmentSummary, ReporterDocument, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a [`ReporterFacade`].
pub struct ReporterFacadeBuilder {
    config: ReporterConfig,
    project_root: Utf8PathBuf,
    hints: HostEnvironmentHints,
    counter: Option<Arc<dyn TokenCounter>>,
    writer: Option<Arc<dyn WriteDocument>>,
}

impl ReporterFacadeBuilder {
    pub fn new(project_root: Utf8PathBuf) -> Self {
        Self {
            config: ReporterConfig::default(),
            project_root,
            hints: HostEnvironmentHints::default(),
            counter: None,
            writer: None,
        }
    }

    pub fn config(mut self, config: ReporterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn environment_hints(mut self, hints: HostEnvironmentHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn writer(mut self, writer: Arc<dyn WriteDocument>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn build(self) -> Result<ReporterFacade, ConfigError> {
        let normalized = NormalizedReporterConfig::new(&self.config)?;
        let console = Arc::new(ConsoleCapture::new(
            normalized.max_console_bytes,
            normalized.max_console_lines,
            normalized.include_debug_output,
        ));
        let environment = EnvironmentProbe::snapshot(&normalized.environment_metadata, &self.hints);

        Ok(ReporterFacade {
            orchestrator: Orchestrator::new(Arc::clone(&console)),
            console,
            dedup: DedupStore::new(normalized.dedup.clone()),
            truncator: LateTruncator::new(),
            counter: self.counter.unwrap_or_else(|| Arc::new(ApproximateTokenCounter)),
            writer: self.writer,
            project_root: self.project_root,
            environment,
            normalized,
        })
    }
}

/// A cache or set of caches governed by [`DedupScope`].
enum DedupStore {
    Global(Mutex<DeduplicationCache>),
    PerTest {
        template: crate::config::DeduplicateLogsConfig,
        caches: Mutex<HashMap<TestId, DeduplicationCache>>,
    },
}

impl DedupStore {
    fn new(config: crate::config::DeduplicateLogsConfig) -> Self {
        match config.scope {
            DedupScope::Global => Self::Global(Mutex::new(DeduplicationCache::new(config))),
            DedupScope::PerTest => Self::PerTest {
                template: config,
                caches: Mutex::new(HashMap::new()),
            },
        }
    }

    /// Checks whether `(level, message)` is already cached for `test_id`'s scope, updating the
    /// existing entry's counters in place if so. Does not insert a new entry — call
    /// [`Self::insert_new`] for that, and only when this returns [`DedupCheck::New`].
    fn check(&self, test_id: &TestId, level: ConsoleLevel, message: &str, now_ms: u64, source: Option<String>) -> DedupCheck {
        match self {
            Self::Global(cache) => cache.lock().check(level, message, now_ms, source),
            Self::PerTest { template, caches } => caches
                .lock()
                .entry(test_id.clone())
                .or_insert_with(|| DeduplicationCache::new(template.clone()))
                .check(level, message, now_ms, source),
        }
    }

    fn insert_new(&self, test_id: &TestId, level: ConsoleLevel, message: &str, now_ms: u64, source: Option<String>, event_ref: ConsoleEventRef) {
        match self {
            Self::Global(cache) => cache.lock().insert(level, message, now_ms, source, event_ref),
            Self::PerTest { template, caches } => caches
                .lock()
                .entry(test_id.clone())
                .or_insert_with(|| DeduplicationCache::new(template.clone()))
                .insert(level, message, now_ms, source, event_ref),
        }
    }

    /// Drops a test's cache at a test boundary. No-op for [`DedupScope::Global`], where the
    /// cache is deliberately shared across the whole run.
    fn clear_test(&self, test_id: &TestId) {
        if let Self::PerTest { caches, .. } = self {
            caches.lock().remove(test_id);
        }
    }
}

/// Wires the reporter subsystems together behind the host-facing event hooks.
pub struct ReporterFacade {
    orchestrator: Orchestrator,
    console: Arc<ConsoleCapture>,
    dedup: DedupStore,
    truncator: LateTruncator,
    counter: Arc<dyn TokenCounter>,
    writer: Option<Arc<dyn WriteDocument>>,
    project_root: Utf8PathBuf,
    environment: EnvironmentSummary,
    normalized: NormalizedReporterConfig,
}

impl ReporterFacade {
    pub fn builder(project_root: Utf8PathBuf) -> ReporterFacadeBuilder {
        ReporterFacadeBuilder::new(project_root)
    }

    pub fn on_run_start(&self, started_at_ms: u64) {
        self.orchestrator.on_run_start(started_at_ms);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn on_test_ready(&self, test_id: TestId, name: String, file_relative: Utf8PathBuf, start_line: u32, end_line: u32, suite: Option<Vec<String>>) {
        self.orchestrator.on_test_ready(test_id, name, file_relative, start_line, end_line, suite);
    }

    pub fn on_test_start(&self, test_id: &TestId, started_at_ms: u64) {
        self.orchestrator.on_test_start(test_id, started_at_ms);
    }

    pub fn on_test_result(&self, test_id: &TestId, status: TerminalStatus, ended_at_ms: u64) {
        self.orchestrator.on_test_result(test_id, status, ended_at_ms);
        self.dedup.clear_test(test_id);
    }

    pub fn on_test_retry(&self, test_id: &TestId, timestamp: DateTime<FixedOffset>) {
        self.orchestrator.on_test_retry(test_id, timestamp);
        self.dedup.clear_test(test_id);
    }

    /// Attributes and (optionally) deduplicates a console write. `now_ms` and `source` feed the
    /// dedup cache only; they have no effect when deduplication is disabled.
    ///
    /// A duplicate is never ingested into the per-test console buffer at all: the existing
    /// entry's occurrence metadata is updated in place instead (`spec.md` §4.3: "subsequent
    /// duplicates are suppressed from the per-test ConsoleBuffer"). An event with no resolvable
    /// test (no explicit `test_id` and no ambient capture context) skips deduplication entirely
    /// and falls through to the orchestrator's orphan-queue handling.
    #[allow(clippy::too_many_arguments)]
    pub fn on_user_console_log(
        &self,
        test_id: Option<TestId>,
        level: ConsoleLevel,
        message: String,
        args: Option<Vec<Value>>,
        elapsed_ms: Option<u64>,
        origin: ConsoleOrigin,
        now_ms: u64,
        source: Option<String>,
    ) {
        let resolved = test_id.clone().or_else(ConsoleCapture::current_test);

        let Some(resolved) = resolved else {
            self.orchestrator.on_user_console_log(test_id, level, message, args, elapsed_ms, origin);
            return;
        };

        if self.normalized.dedup.enabled {
            match self.dedup.check(&resolved, level, &message, now_ms, source.clone()) {
                DedupCheck::Duplicate { original_ref, summary } => {
                    self.console.attach_deduplication(&resolved, original_ref, summary);
                    return;
                }
                DedupCheck::New => {}
            }
        }

        let event_ref = self
            .orchestrator
            .on_user_console_log(Some(resolved.clone()), level, message.clone(), args, elapsed_ms, origin);

        if let Some(event_ref) = event_ref {
            if self.normalized.dedup.enabled {
                self.dedup.insert_new(&resolved, level, &message, now_ms, source, event_ref);
            }
        }
    }

    pub fn on_unhandled_error(&self, error: crate::record::TestError) {
        self.orchestrator.on_unhandled_error(error);
    }

    /// Finalizes run-level state. Must be called exactly once, before [`Self::finish`].
    pub fn on_run_end(&self, ended_at_ms: u64) -> OrchestratorSnapshot {
        self.orchestrator.on_run_end(ended_at_ms)
    }

    /// Assembles, truncates, and (if a writer was configured) persists the final document.
    ///
    /// Takes the snapshot produced by [`Self::on_run_end`] rather than calling it internally, so
    /// a host framework that needs to react to run-end timing (e.g. flushing its own I/O first)
    /// can do so between the two calls.
    pub fn finish(&self, snapshot: OrchestratorSnapshot, timestamp: DateTime<FixedOffset>) -> Result<ReporterDocument, crate::errors::WriteError> {
        let document = output_builder::build_document(&snapshot, &self.console, &self.project_root, self.environment.clone(), timestamp);

        let document = if self.normalized.truncation.enabled && self.normalized.truncation.enable_late_truncation {
            self.truncator.truncate(document, self.normalized.truncation.max_tokens, &self.normalized.truncation.tunables, self.counter.as_ref())
        } else {
            document
        };

        if let Some(writer) = &self.writer {
            writer.write(&document)?;
        }

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_to_end_run_produces_a_document_with_one_failure() {
        let facade = ReporterFacade::builder(Utf8PathBuf::from("/repo"))
            .build()
            .unwrap();

        facade.on_run_start(0);
        let test_id = TestId::new("t1");
        facade.on_test_ready(test_id.clone(), "does a thing".to_string(), Utf8PathBuf::from("a.test.ts"), 1, 2, None);
        facade.on_test_start(&test_id, 0);
        facade.on_user_console_log(
            Some(test_id.clone()),
            ConsoleLevel::Info,
            "hello".to_string(),
            None,
            Some(1),
            ConsoleOrigin::Stdout,
            0,
            None,
        );
        facade.on_test_result(
            &test_id,
            TerminalStatus::Failed(crate::record::TestError {
                message: "assertion failed".to_string(),
                error_type: "AssertionError".to_string(),
                stack_frames: Vec::new(),
                assertion: None,
                code_lines: Vec::new(),
                pointer_line: None,
            }),
            10,
        );

        let snapshot = facade.on_run_end(20);
        let timestamp = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let document = facade.finish(snapshot, timestamp).unwrap();

        assert_eq!(document.summary.failed, 1);
        let failures = document.failures.unwrap();
        assert_eq!(failures[0].test, "does a thing");
    }

    #[test]
    fn duplicate_console_messages_are_collapsed_into_one_event() {
        let facade = ReporterFacade::builder(Utf8PathBuf::from("/repo")).build().unwrap();
        let test_id = TestId::new("t1");
        facade.on_test_start(&test_id, 0);

        for i in 0..3 {
            facade.on_user_console_log(
                Some(test_id.clone()),
                ConsoleLevel::Info,
                "repeat me".to_string(),
                None,
                Some(i),
                ConsoleOrigin::Stdout,
                i,
                None,
            );
        }

        facade.console.with_buffer(&test_id, |buf| {
            assert_eq!(buf.len(), 1, "duplicates must be suppressed from the buffer, not appended");
            let event = buf.iter().next().unwrap();
            let dedup = event.deduplication.as_ref().expect("repeated message should carry dedup metadata");
            assert_eq!(dedup.count, 3);
        }).unwrap();
    }

    #[test]
    fn per_test_console_event_counts_match_expectations() {
        let facade = ReporterFacade::builder(Utf8PathBuf::from("/repo")).build().unwrap();
        facade.on_run_start(0);

        for (name, log_count) in [("alpha", 2usize), ("beta", 0usize)] {
            let test_id = TestId::new(name);
            facade.on_test_ready(test_id.clone(), name.to_string(), Utf8PathBuf::from(format!("{name}.test.ts")), 1, 2, None);
            facade.on_test_start(&test_id, 0);
            for i in 0..log_count {
                facade.on_user_console_log(
                    Some(test_id.clone()),
                    ConsoleLevel::Info,
                    format!("log {i}"),
                    None,
                    Some(i as u64),
                    ConsoleOrigin::Stdout,
                    i as u64,
                    None,
                );
            }
            facade.on_test_result(
                &test_id,
                TerminalStatus::Failed(crate::record::TestError {
                    message: "boom".to_string(),
                    error_type: "Error".to_string(),
                    stack_frames: Vec::new(),
                    assertion: None,
                    code_lines: Vec::new(),
                    pointer_line: None,
                }),
                10,
            );
        }

        let snapshot = facade.on_run_end(20);
        let timestamp = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z").unwrap();
        let document = facade.finish(snapshot, timestamp).unwrap();

        let expected: HashMap<String, usize> = maplit::hashmap! {
            "alpha".to_string() => 2,
            "beta".to_string() => 0,
        };

        let actual: HashMap<String, usize> = document
            .failures
            .unwrap()
            .iter()
            .map(|f| (f.test.clone(), f.console_events.as_ref().map_or(0, |c| c.len())))
            .collect();

        assert_eq!(actual, expected);
    }
}
