// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structured, serializable schema for the LLM-oriented test-run reporter document.
//!
//! This crate has no opinions about how a [`ReporterDocument`] gets built or where it ends up;
//! it just defines the shape. See the `reporter-core` crate for the engine that assembles one
//! from a live test-run event stream.

mod document;
mod value;

pub use document::*;
pub use value::Value;
