// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stack frame classification (`spec.md` §4.4's "Stack Framer" half).
//!
//! Classifies each frame in a captured stack trace as in-project or third-party code, and
//! relativizes its path against the project root — the two pieces of information the document
//! schema actually needs (absolute paths are never emitted, since they leak information about
//! the host filesystem and don't help an LLM consumer).

use crate::record::RawStackFrame;
use camino::Utf8Path;
use reporter_schema::StackFrameSummary;

/// Classifies and relativizes a single raw stack frame.
///
/// `project_root` should be an absolute, canonicalized path; frames outside it are still
/// reported (relativized with `..` components) rather than dropped, since a frame pointing
/// outside the project is itself diagnostically useful.
pub fn classify_frame(frame: &RawStackFrame, project_root: &Utf8Path) -> StackFrameSummary {
    let in_node_modules = frame
        .file_absolute
        .components()
        .any(|component| component.as_str() == "node_modules");

    let relative = frame
        .file_absolute
        .strip_prefix(project_root)
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|_| frame.file_absolute.clone());

    let in_project = !in_node_modules && frame.file_absolute.starts_with(project_root);

    StackFrameSummary::new(relative, frame.line, frame.column, in_project, in_node_modules)
}

/// Classifies a full stack trace, preserving order.
pub fn classify_stack(frames: &[RawStackFrame], project_root: &Utf8Path) -> Vec<StackFrameSummary> {
    frames.iter().map(|frame| classify_frame(frame, project_root)).collect()
}
