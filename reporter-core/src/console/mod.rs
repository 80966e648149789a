// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Console capture subsystem: per-test buffering, ambient-context attribution, and raw stdio
//! interception (`spec.md` §4.2).

pub mod buffer;
pub mod capture;
pub mod interceptor;

pub use buffer::{ConsoleBuffer, ConsoleEvent};
pub use capture::ConsoleCapture;
pub use interceptor::{preset_patterns, RawWriter, StdioInterceptor, WriteOutcome};
