// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Raw-byte stdio interception (`spec.md` §4.2 point 3–4).
//!
//! Patches the raw stdout/stderr byte streams: framework-noise lines (startup banners and the
//! like) are filtered out before they ever reach the real writer, while everything else is
//! passed through — with line buffering maintained across chunk boundaries, and backpressure
//! from the real writer propagated back to the caller.

use regex::Regex;
use std::io;

/// What the underlying writer reported after a write.
///
/// Mirrors the host runtime's `write()` returning a falsy value to signal the caller should
/// slow down — Rust's `io::Write` doesn't have an equivalent, so callers opt in by
/// implementing [`RawWriter`] instead of `io::Write` directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The writer can accept more data immediately.
    Ok,
    /// The writer is applying backpressure; callers should slow down.
    Backpressure,
}

/// The "original writer" a [`StdioInterceptor`] sits in front of.
///
/// Out of scope for this crate (per `spec.md` §1, "file-writing, terminal streaming... are
/// external collaborators"): a caller supplies one backed by a real fd, an in-memory buffer
/// for tests, or whatever else.
pub trait RawWriter: Send {
    /// Writes a complete line (including its trailing newline, if any) to the underlying
    /// stream.
    fn write_line(&mut self, line: &[u8]) -> io::Result<WriteOutcome>;
}

/// Known framework-noise presets, by name (`spec.md` §6.3's `stdio.frameworkPresets`).
///
/// These are illustrative examples, not an exhaustive registry of every test framework's
/// banner text — hosts with their own noise lines supply them via `stdio.filterPattern`
/// instead.
pub fn preset_patterns(name: &str) -> Vec<Regex> {
    let raw: &[&str] = match name {
        "vitest" => &[r"^\s*RUN\s+v\d", r"^\s*DEV\s+v\d"],
        "jest" => &[r"^\s*PASS\s", r"^\s*RUNS\s"],
        _ => &[],
    };
    raw.iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
}

/// Line-buffered, noise-filtering stdio interceptor.
pub struct StdioInterceptor<W> {
    writer: W,
    pending: Vec<u8>,
    noise_patterns: Vec<Regex>,
}

impl<W: RawWriter> StdioInterceptor<W> {
    /// Creates an interceptor wrapping `writer`, filtering lines matching any of
    /// `noise_patterns`.
    pub fn new(writer: W, noise_patterns: Vec<Regex>) -> Self {
        Self {
            writer,
            pending: Vec::new(),
            noise_patterns,
        }
    }

    /// Feeds a chunk of raw bytes through the interceptor.
    ///
    /// Complete lines are tested against the noise patterns: matches are dropped silently
    /// (never reach the writer, never reach `on_line`); survivors are handed to `on_line` for
    /// attribution and then written through. Partial lines (no trailing `\n` yet) are held
    /// across calls.
    ///
    /// Returns [`WriteOutcome::Backpressure`] if the underlying writer signaled backpressure
    /// for any line in this chunk.
    pub fn write_chunk(
        &mut self,
        chunk: &[u8],
        mut on_line: impl FnMut(&str),
    ) -> io::Result<WriteOutcome> {
        self.pending.extend_from_slice(chunk);
        let mut outcome = WriteOutcome::Ok;

        while let Some(newline_pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.pending.drain(..=newline_pos).collect();
            let text = String::from_utf8_lossy(&line_bytes);
            let trimmed = text.trim_end_matches(['\n', '\r']);

            if self.is_noise(trimmed) {
                continue;
            }

            on_line(trimmed);
            if self.writer.write_line(&line_bytes)? == WriteOutcome::Backpressure {
                outcome = WriteOutcome::Backpressure;
            }
        }

        Ok(outcome)
    }

    fn is_noise(&self, line: &str) -> bool {
        self.noise_patterns.iter().any(|pattern| pattern.is_match(line))
    }

    /// Flushes any partial line straight to the writer and detaches.
    ///
    /// Per `spec.md` §9's open question, this does *not* wait for the writer to report it has
    /// drained — detach is a best-effort flush, not a guaranteed-delivered one, since nothing
    /// downstream is necessarily still reading test-scoped output at this point. See
    /// `DESIGN.md`.
    pub fn detach(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let remaining = std::mem::take(&mut self.pending);
        let _ = self.writer.write_line(&remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingWriter {
        lines: Vec<Vec<u8>>,
        backpressure_after: Option<usize>,
    }

    impl RawWriter for RecordingWriter {
        fn write_line(&mut self, line: &[u8]) -> io::Result<WriteOutcome> {
            self.lines.push(line.to_vec());
            let outcome = match self.backpressure_after {
                Some(n) if self.lines.len() >= n => WriteOutcome::Backpressure,
                _ => WriteOutcome::Ok,
            };
            Ok(outcome)
        }
    }

    #[test]
    fn partial_lines_are_buffered_across_chunks() {
        let mut seen = Vec::new();
        let mut interceptor = StdioInterceptor::new(
            RecordingWriter {
                lines: Vec::new(),
                backpressure_after: None,
            },
            Vec::new(),
        );

        interceptor.write_chunk(b"hel", |line| seen.push(line.to_string())).unwrap();
        assert!(seen.is_empty());
        interceptor.write_chunk(b"lo\nworld\n", |line| seen.push(line.to_string())).unwrap();

        assert_eq!(seen, vec!["hello", "world"]);
    }

    #[test]
    fn noise_lines_never_reach_the_writer() {
        let mut seen = Vec::new();
        let mut interceptor = StdioInterceptor::new(
            RecordingWriter {
                lines: Vec::new(),
                backpressure_after: None,
            },
            preset_patterns("vitest"),
        );

        interceptor
            .write_chunk(b" RUN v1.2.3\nactual output\n", |line| seen.push(line.to_string()))
            .unwrap();

        assert_eq!(seen, vec!["actual output"]);
        assert_eq!(interceptor.writer.lines.len(), 1);
    }

    #[test]
    fn backpressure_is_propagated() {
        let mut interceptor = StdioInterceptor::new(
            RecordingWriter {
                lines: Vec::new(),
                backpressure_after: Some(1),
            },
            Vec::new(),
        );

        let outcome = interceptor.write_chunk(b"one\n", |_| {}).unwrap();
        assert_eq!(outcome, WriteOutcome::Backpressure);
    }

    #[test]
    fn detach_flushes_partial_line_without_trailing_newline() {
        let mut interceptor = StdioInterceptor::new(
            RecordingWriter {
                lines: Vec::new(),
                backpressure_after: None,
            },
            Vec::new(),
        );

        interceptor.write_chunk(b"no newline yet", |_| {}).unwrap();
        assert!(interceptor.writer.lines.is_empty());
        interceptor.detach();
        assert_eq!(interceptor.writer.lines, vec![b"no newline yet".to_vec()]);
    }
}
