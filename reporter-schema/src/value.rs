// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dynamically typed values used for assertion `expected`/`actual` payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamically typed value captured from a test assertion.
///
/// Test frameworks hand the reporter arbitrary expected/actual values: numbers, strings,
/// nested objects, or things that can't be serialized at all (functions, symbols, circular
/// structures). `Value` is a closed sum type wide enough to carry all of them without losing
/// the distinction between, say, the string `"1"` and the integer `1`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Value {
    /// The JSON/JS `null` value.
    Null,

    /// A boolean.
    Bool(bool),

    /// A value that fits in an `i64` without loss.
    Int(i64),

    /// A floating-point value, used when the source value isn't integral.
    Float(f64),

    /// A string value.
    String(String),

    /// An ordered array of values.
    Array(Vec<Value>),

    /// A key-ordered object. Uses a `Vec` of pairs rather than a map so that the original key
    /// order (diagnostically relevant for humans and LLMs alike) is preserved.
    Object(Vec<(String, Value)>),

    /// A value that could not be captured structurally: a function, a symbol, a class
    /// instance with a custom `toString`, etc. Carries a human-readable preview such as
    /// `"[Function: anonymous]"`.
    Opaque(String),
}

impl Value {
    /// Returns the original type name, as used for `expectedType`/`actualType` fields.
    ///
    /// This is distinct from the `kind` discriminant: two `Value::Int`s may have arrived with
    /// different origin type names in exotic host languages, but in our domain the mapping is
    /// fixed.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "number",
            Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Opaque(_) => "unknown",
        }
    }

    /// True for [`Value::Object`] and [`Value::Array`] — the two variants whose traversal depth
    /// and key/index sets matter for diffing.
    pub fn is_structural(&self) -> bool {
        matches!(self, Value::Array(_) | Value::Object(_))
    }

    /// Number of direct keys (objects) or elements (arrays); `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Array(items) => Some(items.len()),
            Value::Object(fields) => Some(fields.len()),
            _ => None,
        }
    }

    /// Renders a short, single-line preview, used when a full structural dump would be too
    /// large to keep (see the late truncator's assertion-value caps).
    pub fn preview(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => format!("{s:?}"),
            Value::Array(items) => format!("[Array with {} items]", items.len()),
            Value::Object(fields) => format!("[Object with {} keys]", fields.len()),
            Value::Opaque(preview) => preview.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            other => write!(f, "{}", other.preview()),
        }
    }
}
