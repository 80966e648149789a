// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log deduplication (`spec.md` §4.3).
//!
//! Repeated identical log lines are collapsed into a single entry with an occurrence count,
//! rather than appearing once per occurrence in the final document. Keys are derived from a
//! normalized form of the message (ANSI stripped, timestamps stripped, whitespace collapsed)
//! hashed with xxh3, and the cache itself is an LRU keyed by insertion order so it never grows
//! unbounded across a long run.
//!
//! The cache only tracks occurrence metadata; it does not itself decide what happens to the
//! console buffer. The caller is expected to call [`DeduplicationCache::check`] before ingesting
//! a new console event: on [`DedupCheck::Duplicate`], the spec requires the event be suppressed
//! from the buffer entirely (`spec.md` §4.3: "subsequent duplicates are suppressed... but their
//! metadata updates the existing entry") rather than appended and later annotated.

use crate::config::DeduplicateLogsConfig;
use crate::ids::ConsoleEventRef;
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use reporter_schema::{ConsoleLevel, DeduplicationSummary};

static TIMESTAMP_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?")
        .expect("timestamp pattern is valid")
});

/// A single cached occurrence record.
#[derive(Clone, Debug)]
pub struct DeduplicationEntry {
    count: u64,
    first_seen_at_ms: u64,
    last_seen_at_ms: u64,
    sources: Vec<String>,
    /// Ref of the console event this entry's first occurrence was ingested under. Every later
    /// duplicate's metadata gets attached back onto this same ref rather than creating a new one.
    event_ref: ConsoleEventRef,
}

impl DeduplicationEntry {
    fn new(now_ms: u64, source: Option<String>, event_ref: ConsoleEventRef) -> Self {
        Self {
            count: 1,
            first_seen_at_ms: now_ms,
            last_seen_at_ms: now_ms,
            sources: source.into_iter().collect(),
            event_ref,
        }
    }

    fn record(&mut self, now_ms: u64, source: Option<String>, include_sources: bool) {
        self.count += 1;
        self.last_seen_at_ms = now_ms;
        if include_sources {
            if let Some(source) = source {
                if !self.sources.contains(&source) {
                    self.sources.push(source);
                }
            }
        }
    }

    /// Converts this entry into the schema-facing summary.
    pub fn to_summary(&self, include_sources: bool) -> DeduplicationSummary {
        DeduplicationSummary::new(
            self.count,
            self.first_seen_at_ms,
            self.last_seen_at_ms,
            include_sources.then(|| self.sources.clone()),
        )
    }
}

/// Aggregate counters exposed for observability, not part of the output document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeduplicationStats {
    pub unique_keys: usize,
    pub total_occurrences: u64,
    pub evicted_keys: u64,
}

/// A normalized dedup key and the level it was computed under.
///
/// Two messages at different levels are never considered duplicates of each other even if their
/// normalized text matches, since `spec.md` scopes deduplication to "the same level and
/// (normalized) message".
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct DedupKey {
    level: ConsoleLevel,
    hash: u64,
}

/// Outcome of [`DeduplicationCache::check`].
#[derive(Clone, Debug)]
pub enum DedupCheck {
    /// No entry for this (level, normalized message) exists yet. The caller should ingest the
    /// event normally, then call [`DeduplicationCache::insert`] with the ref it was assigned.
    New,
    /// An entry already exists. The caller must suppress this occurrence from the console
    /// buffer and instead re-attach `summary` to `original_ref`.
    Duplicate {
        original_ref: ConsoleEventRef,
        summary: DeduplicationSummary,
    },
}

/// An LRU-bounded cache of normalized message occurrences.
///
/// Backed by an [`IndexMap`] so that "touch on access" (move the entry to the most-recently-used
/// end) and "evict the least-recently-used entry" are both cheap: `shift_remove` plus
/// re-`insert` keeps insertion order equal to recency order without a separate linked list.
pub struct DeduplicationCache {
    config: DeduplicateLogsConfig,
    entries: IndexMap<DedupKey, DeduplicationEntry>,
    evicted_keys: u64,
}

impl DeduplicationCache {
    /// Creates a cache governed by `config`. If `config.enabled` is false, [`Self::check`]
    /// always reports [`DedupCheck::New`] and [`Self::insert`] is a no-op.
    pub fn new(config: DeduplicateLogsConfig) -> Self {
        Self {
            config,
            entries: IndexMap::new(),
            evicted_keys: 0,
        }
    }

    /// Normalizes `message` per the configured toggles. Exposed separately from [`Self::check`]
    /// so callers (e.g. tests) can assert on the key derivation in isolation.
    pub fn normalize(&self, message: &str) -> String {
        let mut normalized = message.to_string();

        if self.config.strip_ansi_codes {
            let stripped = strip_ansi_escapes::strip(normalized.as_bytes());
            normalized = String::from_utf8_lossy(&stripped).into_owned();
        }
        if self.config.strip_timestamps {
            normalized = TIMESTAMP_PATTERN.replace_all(&normalized, "<ts>").into_owned();
        }
        if self.config.normalize_whitespace {
            normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        normalized
    }

    fn key_for(&self, level: ConsoleLevel, message: &str) -> DedupKey {
        let normalized = self.normalize(message);
        let hash = xxhash_rust::xxh3::xxh3_64(normalized.as_bytes());
        DedupKey { level, hash }
    }

    /// Looks up `(level, message)` and, if an entry already exists, updates its counters in
    /// place and reports where the original occurrence lives. Does not insert a new entry — the
    /// caller does that itself via [`Self::insert`] only on [`DedupCheck::New`], since only then
    /// does a new console event (and therefore a ref to store) actually get created.
    pub fn check(&mut self, level: ConsoleLevel, message: &str, now_ms: u64, source: Option<String>) -> DedupCheck {
        if !self.config.enabled {
            return DedupCheck::New;
        }

        let key = self.key_for(level, message);
        let Some(mut entry) = self.entries.shift_remove(&key) else {
            return DedupCheck::New;
        };

        // Touch-on-access: move this key to the MRU end by removing then re-inserting.
        entry.record(now_ms, source, self.config.include_sources);
        let summary = entry.to_summary(self.config.include_sources);
        let original_ref = entry.event_ref;
        self.entries.insert(key, entry);

        DedupCheck::Duplicate { original_ref, summary }
    }

    /// Records a brand-new (level, message) occurrence under `event_ref`. Only ever called
    /// after [`Self::check`] returned [`DedupCheck::New`] for the same arguments.
    pub fn insert(&mut self, level: ConsoleLevel, message: &str, now_ms: u64, source: Option<String>, event_ref: ConsoleEventRef) {
        if !self.config.enabled {
            return;
        }

        let key = self.key_for(level, message);
        let entry = DeduplicationEntry::new(now_ms, source, event_ref);
        self.entries.insert(key, entry);
        self.enforce_capacity();
    }

    fn enforce_capacity(&mut self) {
        while self.entries.len() > self.config.max_cache_entries {
            // `shift_remove_index(0)` evicts the least-recently-used entry, since every access
            // (insert or touch) moves its key to the end.
            if self.entries.shift_remove_index(0).is_some() {
                self.evicted_keys += 1;
            } else {
                break;
            }
        }
    }

    /// Drops every cached entry. Used when `scope: perTest` rotates to a new test.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Current cache statistics, for diagnostics.
    pub fn stats(&self) -> DeduplicationStats {
        DeduplicationStats {
            unique_keys: self.entries.len(),
            total_occurrences: self.entries.values().map(|e| e.count).sum(),
            evicted_keys: self.evicted_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(max_cache_entries: usize) -> DeduplicateLogsConfig {
        DeduplicateLogsConfig {
            max_cache_entries,
            ..DeduplicateLogsConfig::default()
        }
    }

    #[test]
    fn identical_messages_are_counted_as_duplicates() {
        let mut cache = DeduplicationCache::new(config(10));
        assert!(matches!(cache.check(ConsoleLevel::Info, "hello world", 0, None), DedupCheck::New));
        cache.insert(ConsoleLevel::Info, "hello world", 0, None, 1);

        match cache.check(ConsoleLevel::Info, "hello world", 5, None) {
            DedupCheck::Duplicate { original_ref, summary } => {
                assert_eq!(original_ref, 1);
                assert_eq!(summary.count, 2);
                assert_eq!(summary.first_seen_at_ms, 0);
                assert_eq!(summary.last_seen_at_ms, 5);
            }
            DedupCheck::New => panic!("expected a duplicate"),
        }
    }

    #[test]
    fn different_levels_are_never_duplicates() {
        let mut cache = DeduplicationCache::new(config(10));
        cache.insert(ConsoleLevel::Info, "same text", 0, None, 1);
        assert!(matches!(cache.check(ConsoleLevel::Warn, "same text", 0, None), DedupCheck::New));
    }

    #[test]
    fn timestamps_and_whitespace_are_normalized_before_hashing() {
        let cache = DeduplicationCache::new(config(10));
        let a = cache.normalize("2024-01-01T00:00:00Z   connection   reset");
        let b = cache.normalize("2024-06-05T12:30:00.123+02:00 connection reset");
        assert_eq!(a, b);
    }

    #[test]
    fn disabled_cache_never_reports_a_duplicate() {
        let mut cache = DeduplicationCache::new(DeduplicateLogsConfig {
            enabled: false,
            ..config(10)
        });
        assert!(matches!(cache.check(ConsoleLevel::Info, "x", 0, None), DedupCheck::New));
        cache.insert(ConsoleLevel::Info, "x", 0, None, 1);
        assert!(matches!(cache.check(ConsoleLevel::Info, "x", 1, None), DedupCheck::New));
    }

    #[test]
    fn lru_eviction_drops_the_least_recently_used_key() {
        let mut cache = DeduplicationCache::new(config(2));
        cache.insert(ConsoleLevel::Info, "a", 0, None, 1);
        cache.insert(ConsoleLevel::Info, "b", 0, None, 2);
        // Touch "a" so "b" becomes least-recently-used.
        cache.check(ConsoleLevel::Info, "a", 1, None);
        cache.insert(ConsoleLevel::Info, "c", 2, None, 3);

        assert_eq!(cache.stats().unique_keys, 2);
        assert!(matches!(cache.check(ConsoleLevel::Info, "b", 3, None), DedupCheck::New), "b should have been evicted, not recognized as a duplicate");
    }

    proptest::proptest! {
        #[test]
        fn unique_keys_never_exceeds_capacity(
            capacity in 1usize..20,
            messages in proptest::collection::vec("[a-c]{1,3}", 0..50),
        ) {
            let mut cache = DeduplicationCache::new(config(capacity));
            for (i, message) in messages.iter().enumerate() {
                if matches!(cache.check(ConsoleLevel::Info, message, i as u64, None), DedupCheck::New) {
                    cache.insert(ConsoleLevel::Info, message, i as u64, None, i as u64);
                }
            }
            prop_assert!(cache.stats().unique_keys <= capacity);
        }
    }
}
