// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test console capture (`spec.md` §3's `ConsoleBuffer`, §4.2's "Console Buffer").
//!
//! An array-backed bounded queue with drop-oldest semantics, per Design Notes §9 ("should be
//! an array-backed bounded queue... not a linked list"). `VecDeque` gives O(1) push/pop at
//! either end, which is exactly the access pattern here.

use crate::ids::ConsoleEventRef;
use reporter_schema::{ConsoleLevel, ConsoleOrigin, DeduplicationSummary, Value};
use std::collections::VecDeque;

/// A single captured console write, in the engine's internal representation.
///
/// This is deliberately a superset of [`reporter_schema::ConsoleEventSummary`]: it carries
/// `elapsed_ms` (time since test start) even though the final document may drop it, and
/// `args` separately from the already-formatted `message`.
#[derive(Clone, Debug)]
pub struct ConsoleEvent {
    pub level: ConsoleLevel,
    pub message: String,
    pub args: Option<Vec<Value>>,
    /// Milliseconds since the owning test started. `None` for pre-test or orphaned events.
    pub elapsed_ms: Option<u64>,
    pub origin: ConsoleOrigin,
    pub deduplication: Option<DeduplicationSummary>,
}

/// Bounded, per-test console capture.
///
/// Invariants (see `spec.md` §8, property 2): after any sequence of pushes, `len() <=
/// max_lines` and `byte_len() <= max_bytes`; if anything was ever dropped to maintain that,
/// [`Self::is_truncated`] is true.
#[derive(Debug)]
pub struct ConsoleBuffer {
    max_bytes: usize,
    max_lines: usize,
    include_debug_output: bool,
    entries: VecDeque<(ConsoleEventRef, ConsoleEvent)>,
    byte_len: usize,
    next_seq: ConsoleEventRef,
    truncated_count: u64,
}

impl ConsoleBuffer {
    /// Creates an empty buffer with the given caps.
    pub fn new(max_bytes: usize, max_lines: usize, include_debug_output: bool) -> Self {
        Self {
            max_bytes,
            max_lines,
            include_debug_output,
            entries: VecDeque::new(),
            byte_len: 0,
            next_seq: 0,
            truncated_count: 0,
        }
    }

    /// Appends an event, applying the level filter and size caps.
    ///
    /// Returns the [`ConsoleEventRef`] assigned to the event, or `None` if the event was
    /// discarded outright by the level filter (debug/trace without `includeDebugOutput`) —
    /// discarding at the filter is distinct from dropping on overflow: a filtered event never
    /// counts toward the truncation sentinel.
    pub fn push(
        &mut self,
        level: ConsoleLevel,
        message: String,
        args: Option<Vec<Value>>,
        elapsed_ms: Option<u64>,
        origin: ConsoleOrigin,
    ) -> Option<ConsoleEventRef> {
        if matches!(level, ConsoleLevel::Debug | ConsoleLevel::Trace) && !self.include_debug_output
        {
            return None;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.byte_len += message.len();
        self.entries.push_back((
            seq,
            ConsoleEvent {
                level,
                message,
                args,
                elapsed_ms,
                origin,
                deduplication: None,
            },
        ));
        self.enforce_bounds();
        Some(seq)
    }

    fn enforce_bounds(&mut self) {
        while self.entries.len() > self.max_lines || self.byte_len > self.max_bytes {
            match self.entries.pop_front() {
                Some((_, dropped)) => {
                    self.byte_len = self.byte_len.saturating_sub(dropped.message.len());
                    self.truncated_count += 1;
                }
                None => break,
            }
        }
    }

    /// Attaches dedup occurrence metadata to a previously pushed event, identified by its ref.
    /// No-op if the event has since been evicted.
    pub fn attach_deduplication(&mut self, event_ref: ConsoleEventRef, meta: DeduplicationSummary) {
        if let Some((_, event)) = self.entries.iter_mut().find(|(seq, _)| *seq == event_ref) {
            event.deduplication = Some(meta);
        }
    }

    /// Whether any events have ever been dropped from this buffer due to overflow.
    pub fn is_truncated(&self) -> bool {
        self.truncated_count > 0
    }

    /// The sentinel message to prepend when rendering this buffer's contents, if truncated.
    pub fn sentinel_message(&self) -> Option<String> {
        (self.truncated_count > 0).then(|| format!("[truncated: {} events]", self.truncated_count))
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no events are retained (note: this can be true even if events were pushed and
    /// later evicted).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all retained events in capture order.
    pub fn iter(&self) -> impl Iterator<Item = &ConsoleEvent> {
        self.entries.iter().map(|(_, event)| event)
    }

    /// Resolves a set of refs (assumed ascending, as produced by successive `push` calls)
    /// against the events still retained in this buffer. Refs whose event was since evicted
    /// are silently skipped. O(refs.len() + self.len()) via a two-pointer merge, since both
    /// sequences are sorted by ref.
    pub fn resolve<'a>(&'a self, refs: &[ConsoleEventRef]) -> Vec<&'a ConsoleEvent> {
        let mut out = Vec::with_capacity(refs.len().min(self.entries.len()));
        let mut iter = self.entries.iter();
        let mut current = iter.next();

        for &wanted in refs {
            while let Some((seq, _)) = current {
                if *seq < wanted {
                    current = iter.next();
                } else {
                    break;
                }
            }
            if let Some((seq, event)) = current {
                if *seq == wanted {
                    out.push(event);
                }
            } else {
                break;
            }
        }
        out
    }
}
