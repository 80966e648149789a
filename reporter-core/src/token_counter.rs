// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Token counting and document persistence boundaries (`spec.md` §1, §4.5).
//!
//! Both are explicitly out of scope as *implementations* — tokenization is model-specific and
//! file writing is a host concern — but the late truncator and facade need a seam to call
//! through to whatever the host provides. These traits are that seam.

use reporter_schema::ReporterDocument;

/// Counts tokens in a serialized document fragment, per the host's chosen tokenizer.
///
/// `spec.md` §4.5 takes this as a given capability (`count(text) -> integer`); no tokenizer
/// implementation belongs in this crate.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> u32;
}

/// A trivial counter for tests and hosts that don't care about exact token accounting: one
/// "token" per four characters, which is a commonly used rough approximation for English text
/// under GPT-family tokenizers.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApproximateTokenCounter;

impl TokenCounter for ApproximateTokenCounter {
    fn count(&self, text: &str) -> u32 {
        ((text.chars().count() as f64) / 4.0).ceil() as u32
    }
}

/// Persists a finished [`ReporterDocument`]. Out of scope per `spec.md` §1 ("file-writing... are
/// external collaborators"); the core only ever calls through this trait, never `std::fs`
/// directly.
pub trait WriteDocument: Send + Sync {
    fn write(&self, document: &ReporterDocument) -> Result<(), crate::errors::WriteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approximate_counter_rounds_up() {
        let counter = ApproximateTokenCounter;
        assert_eq!(counter.count("abcd"), 1);
        assert_eq!(counter.count("abcde"), 2);
        assert_eq!(counter.count(""), 0);
    }
}
