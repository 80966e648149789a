// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relative and absolute file-path validation (`spec.md` §4.6).
//!
//! A host framework supplies `fileRelative` paths embedded in every test record and stack
//! frame; since these strings end up inside the emitted document (and whatever consumes it
//! downstream), they're validated defensively before use. This module never touches the
//! filesystem — validation is lexical only, so it's safe to call on untrusted input with no
//! side effects. Actual writes are a separate, out-of-scope capability (`spec.md` §1).

use thiserror::Error;

/// POSIX path length ceiling, in bytes.
const MAX_POSIX_PATH_BYTES: usize = 4096;

/// Windows' legacy `MAX_PATH` limit, in characters.
const MAX_WINDOWS_PATH_CHARS: usize = 260;

const WINDOWS_RESERVED_BASENAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const DISALLOWED_PROTOCOLS: &[&str] = &["javascript:", "data:", "file://"];

/// Why a path was rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum PathViolation {
    #[error("path is empty")]
    Empty,

    #[error("path contains a NUL byte")]
    NulByte,

    #[error("path contains a `..` traversal segment")]
    Traversal,

    #[error("path contains disallowed protocol substring `{0}`")]
    DisallowedProtocol(String),

    #[error("path contains a Windows alternate-data-stream marker")]
    AlternateDataStream,

    #[error("path uses an extended-length prefix (`\\\\?\\` or `\\\\.\\`)")]
    ExtendedLengthPrefix,

    #[error("path component `{0}` is a reserved Windows device name")]
    ReservedName(String),

    #[error("path is {len} characters, exceeding the {limit}-character Windows limit")]
    TooLongForWindows { len: usize, limit: usize },

    #[error("path is {len} bytes, exceeding the {limit}-byte POSIX limit")]
    TooLongForPosix { len: usize, limit: usize },

    #[error("absolute path is not already in fully-resolved, normalized form")]
    NotFullyResolved,
}

/// Validates `raw` for safe embedding in the output document. Runs every check against the raw
/// string, a percent-decoded copy, and a lexically normalized copy, so an encoded or
/// dot-segment-obscured traversal is caught the same as a literal one.
pub fn validate_path(raw: &str) -> Result<(), PathViolation> {
    check(raw)?;

    let decoded = percent_decode(raw);
    if decoded != raw {
        check(&decoded)?;
    }

    let normalized = lexically_normalize(&decoded);
    if normalized != decoded {
        check(&normalized)?;
    }

    check_absolute_is_resolved(&decoded, &normalized)?;

    Ok(())
}

/// An absolute path must already be in its own normalized form: no redundant separators or
/// `.` segments left to collapse. Comparison ignores a trailing separator and, on paths that
/// look like Windows paths, case.
fn check_absolute_is_resolved(decoded: &str, normalized: &str) -> Result<(), PathViolation> {
    if !is_absolute(decoded) {
        return Ok(());
    }

    let trim_trailing = |s: &str| s.trim_end_matches(['/', '\\']);
    let (lhs, rhs) = (trim_trailing(decoded), trim_trailing(normalized));

    let matches = if looks_windows(decoded) {
        lhs.eq_ignore_ascii_case(rhs)
    } else {
        lhs == rhs
    };

    if matches {
        Ok(())
    } else {
        Err(PathViolation::NotFullyResolved)
    }
}

fn is_absolute(raw: &str) -> bool {
    raw.starts_with('/')
        || raw.starts_with('\\')
        || (raw.chars().nth(1) == Some(':') && raw.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
}

fn check(raw: &str) -> Result<(), PathViolation> {
    if raw.is_empty() {
        return Err(PathViolation::Empty);
    }
    if raw.contains('\0') {
        return Err(PathViolation::NulByte);
    }
    if raw.starts_with(r"\\?\") || raw.starts_with(r"\\.\") {
        return Err(PathViolation::ExtendedLengthPrefix);
    }

    let lower = raw.to_ascii_lowercase();
    for protocol in DISALLOWED_PROTOCOLS {
        if lower.contains(protocol) {
            return Err(PathViolation::DisallowedProtocol((*protocol).to_string()));
        }
    }

    if raw.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PathViolation::Traversal);
    }

    check_alternate_data_stream(raw)?;

    if raw.chars().count() > MAX_WINDOWS_PATH_CHARS && looks_windows(raw) {
        return Err(PathViolation::TooLongForWindows {
            len: raw.chars().count(),
            limit: MAX_WINDOWS_PATH_CHARS,
        });
    }
    if raw.len() > MAX_POSIX_PATH_BYTES {
        return Err(PathViolation::TooLongForPosix {
            len: raw.len(),
            limit: MAX_POSIX_PATH_BYTES,
        });
    }

    for segment in raw.split(['/', '\\']) {
        let basename = segment.split('.').next().unwrap_or(segment);
        if WINDOWS_RESERVED_BASENAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(basename))
        {
            return Err(PathViolation::ReservedName(segment.to_string()));
        }
    }

    Ok(())
}

/// A single colon is allowed only immediately after a drive letter at position 1 (`C:`); any
/// other colon, or more than one colon total, is an NTFS alternate-data-stream marker.
fn check_alternate_data_stream(raw: &str) -> Result<(), PathViolation> {
    let colon_count = raw.matches(':').count();
    if colon_count == 0 {
        return Ok(());
    }
    let is_drive_letter_colon = colon_count == 1
        && raw.chars().nth(1) == Some(':')
        && raw.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    if is_drive_letter_colon {
        return Ok(());
    }
    Err(PathViolation::AlternateDataStream)
}

fn looks_windows(raw: &str) -> bool {
    raw.contains('\\') || (raw.chars().nth(1) == Some(':') && raw.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
}

/// Decodes `%2e`, `%2f`, and `%5c` percent-escapes (case-insensitively), leaving everything else
/// untouched and byte-safe for non-ASCII input.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).expect("ascii hex digits are valid utf-8");
            match hex.to_ascii_lowercase().as_str() {
                "2e" => {
                    out.push(b'.');
                    i += 3;
                    continue;
                }
                "2f" => {
                    out.push(b'/');
                    i += 3;
                    continue;
                }
                "5c" => {
                    out.push(b'\\');
                    i += 3;
                    continue;
                }
                _ => {}
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Collapses `.` segments and redundant separators, without touching the filesystem. `..`
/// segments are left alone (not resolved away) — collapsing them here would hide a traversal
/// from the checks that run on the result. A leading separator is preserved so an absolute
/// path's normalized form is still absolute.
fn lexically_normalize(input: &str) -> String {
    let sep = if input.contains('\\') { '\\' } else { '/' };
    let leads_with_separator = input.starts_with(['/', '\\']);
    let joined = input
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join(&sep.to_string());
    if leads_with_separator {
        format!("{sep}{joined}")
    } else {
        joined
    }
}
