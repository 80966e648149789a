// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core engine for an LLM-oriented test-run reporter.
//!
//! A host test framework drives a [`facade::ReporterFacade`] through its event hooks as tests
//! run, and calls [`facade::ReporterFacade::finish`] once the run ends to obtain a
//! [`reporter_schema::ReporterDocument`] — shrunk to fit a token budget and ready to hand to a
//! writer collaborator. Everything in between (attribution, deduplication, truncation) is this
//! crate's job; parsing configuration, writing files, and running the actual tests are not.

mod config;
mod console;
mod dedup;
mod env_probe;
mod errors;
mod facade;
mod ids;
mod late_truncator;
mod orchestrator;
mod output_builder;
mod path_validator;
mod record;
mod stack_frame;
mod token_counter;
mod value_diff;

pub use config::{
    DedupScope, DeduplicateLogsConfig, DeduplicateLogsSetting, EnvironmentMetadataConfig,
    NormalizedReporterConfig, ReporterConfig, StdioConfig, TruncationConfig, TruncationTunables,
};
pub use console::{ConsoleBuffer, ConsoleCapture, ConsoleEvent, RawWriter, StdioInterceptor, WriteOutcome, preset_patterns};
pub use dedup::{DeduplicationCache, DeduplicationStats};
pub use env_probe::{EnvironmentProbe, HostEnvironmentHints};
pub use errors::{BudgetExceededError, CaptureError, ConfigError, FrameworkError, WriteError};
pub use facade::{ReporterFacade, ReporterFacadeBuilder};
pub use ids::{ConsoleEventRef, TestId};
pub use late_truncator::{LateTruncator, TruncationRecord};
pub use orchestrator::{Orchestrator, OrchestratorSnapshot};
pub use path_validator::{validate_path, PathViolation};
pub use record::{RawAssertion, RawStackFrame, RetryAttempt, TerminalStatus, TestError, TestRecord, TestState};
pub use stack_frame::{classify_frame, classify_stack};
pub use token_counter::{ApproximateTokenCounter, TokenCounter, WriteDocument};
pub use value_diff::diff_values;
