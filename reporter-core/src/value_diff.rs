// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structural assertion diffing (`spec.md` §4.4's "Assertion Diff" half).
//!
//! Walks a pair of expected/actual [`Value`] trees and reports what's different: changed leaf
//! values, keys present on one side only, and array length mismatches. Traversal is capped in
//! both depth and path count so a pathological (very deep, or very wide) structural mismatch
//! can't make a single assertion failure dominate the whole document.

use reporter_schema::{ChangedPath, DiffSummary, LengthMismatch, Value};

/// Maximum recursion depth. Beyond this, a mismatch is reported at the cutoff point rather than
/// described further.
const MAX_DEPTH: usize = 10;

/// Maximum number of changed/missing/extra paths recorded in total, across all three lists.
const MAX_PATHS: usize = 20;

struct Accumulator {
    changed_paths: Vec<ChangedPath>,
    missing_keys: Vec<String>,
    extra_keys: Vec<String>,
    length_mismatch: Option<LengthMismatch>,
    truncated: bool,
}

impl Accumulator {
    fn path_budget_left(&self) -> bool {
        self.changed_paths.len() + self.missing_keys.len() + self.extra_keys.len() < MAX_PATHS
    }
}

/// Computes a [`DiffSummary`] describing how `actual` differs from `expected`.
pub fn diff_values(expected: &Value, actual: &Value) -> DiffSummary {
    let mut acc = Accumulator {
        changed_paths: Vec::new(),
        missing_keys: Vec::new(),
        extra_keys: Vec::new(),
        length_mismatch: None,
        truncated: false,
    };

    walk("", expected, actual, 0, &mut acc);

    let mut summary = DiffSummary::new(describe(&acc));
    if !acc.changed_paths.is_empty() {
        summary.changed_paths = Some(acc.changed_paths);
    }
    if !acc.missing_keys.is_empty() {
        summary.missing_keys = Some(acc.missing_keys);
    }
    if !acc.extra_keys.is_empty() {
        summary.extra_keys = Some(acc.extra_keys);
    }
    summary.length_mismatch = acc.length_mismatch;
    if acc.truncated {
        summary.truncated = Some(true);
    }
    summary
}

fn describe(acc: &Accumulator) -> String {
    let mut parts = Vec::new();
    if !acc.changed_paths.is_empty() {
        parts.push(format!("{} changed value(s)", acc.changed_paths.len()));
    }
    if !acc.missing_keys.is_empty() {
        parts.push(format!("{} missing key(s)", acc.missing_keys.len()));
    }
    if !acc.extra_keys.is_empty() {
        parts.push(format!("{} extra key(s)", acc.extra_keys.len()));
    }
    if acc.length_mismatch.is_some() {
        parts.push("array length mismatch".to_string());
    }
    if parts.is_empty() {
        "no structural difference detected".to_string()
    } else {
        parts.join(", ")
    }
}

fn walk(path: &str, expected: &Value, actual: &Value, depth: usize, acc: &mut Accumulator) {
    if !acc.path_budget_left() {
        acc.truncated = true;
        return;
    }
    if depth > MAX_DEPTH {
        if expected != actual {
            acc.truncated = true;
            record_changed(path, expected, actual, acc);
        }
        return;
    }

    match (expected, actual) {
        (Value::Object(expected_fields), Value::Object(actual_fields)) => {
            for (key, expected_value) in expected_fields {
                let child_path = join_path(path, key);
                match actual_fields.iter().find(|(k, _)| k == key) {
                    Some((_, actual_value)) => walk(&child_path, expected_value, actual_value, depth + 1, acc),
                    None => {
                        if acc.path_budget_left() {
                            acc.missing_keys.push(child_path);
                        } else {
                            acc.truncated = true;
                        }
                    }
                }
            }
            for (key, _) in actual_fields {
                if !expected_fields.iter().any(|(k, _)| k == key) {
                    let child_path = join_path(path, key);
                    if acc.path_budget_left() {
                        acc.extra_keys.push(child_path);
                    } else {
                        acc.truncated = true;
                    }
                }
            }
        }
        (Value::Array(expected_items), Value::Array(actual_items)) => {
            if expected_items.len() != actual_items.len() && acc.length_mismatch.is_none() {
                acc.length_mismatch = Some(LengthMismatch {
                    expected: expected_items.len(),
                    actual: actual_items.len(),
                });
            }
            for (index, (expected_item, actual_item)) in
                expected_items.iter().zip(actual_items.iter()).enumerate()
            {
                let child_path = format!("{path}[{index}]");
                walk(&child_path, expected_item, actual_item, depth + 1, acc);
            }
        }
        _ => {
            if expected != actual {
                record_changed(path, expected, actual, acc);
            }
        }
    }
}

fn record_changed(path: &str, expected: &Value, actual: &Value, acc: &mut Accumulator) {
    acc.changed_paths.push(ChangedPath::new(
        if path.is_empty() { "$".to_string() } else { path.to_string() },
        expected.clone(),
        actual.clone(),
    ));
}

fn join_path(base: &str, key: &str) -> String {
    if base.is_empty() {
        key.to_string()
    } else {
        format!("{base}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(fields: Vec<(&str, Value)>) -> Value {
        Value::Object(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    #[test]
    fn equal_values_report_no_difference() {
        let a = obj(vec![("x", Value::Int(1))]);
        let summary = diff_values(&a, &a);
        assert!(summary.changed_paths.is_none());
        assert_eq!(summary.summary, "no structural difference detected");
    }

    #[test]
    fn missing_and_extra_keys_are_reported_separately() {
        let expected = obj(vec![("a", Value::Int(1)), ("b", Value::Int(2))]);
        let actual = obj(vec![("a", Value::Int(1)), ("c", Value::Int(3))]);

        let summary = diff_values(&expected, &actual);
        assert_eq!(summary.missing_keys.unwrap(), vec!["b".to_string()]);
        assert_eq!(summary.extra_keys.unwrap(), vec!["c".to_string()]);
    }

    #[test]
    fn nested_changed_leaf_gets_a_dotted_path() {
        let expected = obj(vec![("a", obj(vec![("b", Value::Int(1))]))]);
        let actual = obj(vec![("a", obj(vec![("b", Value::Int(2))]))]);

        let summary = diff_values(&expected, &actual);
        let changed = summary.changed_paths.unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].path, "a.b");
    }

    #[test]
    fn array_length_mismatch_is_recorded_once() {
        let expected = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        let actual = Value::Array(vec![Value::Int(1)]);

        let summary = diff_values(&expected, &actual);
        let mismatch = summary.length_mismatch.unwrap();
        assert_eq!(mismatch.expected, 3);
        assert_eq!(mismatch.actual, 1);
    }

    #[test]
    fn exceeding_the_path_budget_sets_truncated() {
        let fields: Vec<(&str, Value)> = (0..30)
            .map(|i| (Box::leak(i.to_string().into_boxed_str()) as &str, Value::Int(i)))
            .collect();
        let expected = obj(fields.clone());
        let actual = obj(fields.into_iter().map(|(k, _)| (k, Value::Int(-1))).collect());

        let summary = diff_values(&expected, &actual);
        assert_eq!(summary.truncated, Some(true));
        assert_eq!(summary.changed_paths.unwrap().len(), MAX_PATHS);
    }
}
