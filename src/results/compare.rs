//! JSON response comparison

use serde_json::Value;

use crate::executor::ComparisonEngine;
use crate::models::{CallResponse, CompareOptions, ExpectedResponse};

/// Compares status codes and JSON bodies
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonComparator;

impl ComparisonEngine for JsonComparator {
    fn compare(
        &self,
        actual: &CallResponse,
        expected: &ExpectedResponse,
        options: &CompareOptions,
    ) -> bool {
        if let Some(status) = expected.status {
            if status != actual.status {
                return false;
            }
        }

        match &expected.body {
            Some(body) => values_match(&actual.body, body, options),
            None => true,
        }
    }
}

/// Human readable reason for a failed comparison
pub fn describe_mismatch(actual: &CallResponse, expected: &ExpectedResponse) -> String {
    match expected.status {
        Some(status) if status != actual.status => {
            format!("expected status {status}, got {}", actual.status)
        }
        _ => {
            let body = actual.body.to_string();
            let preview: String = body.chars().take(200).collect();
            format!("response body did not match expectation: {preview}")
        }
    }
}

fn values_match(actual: &Value, expected: &Value, options: &CompareOptions) -> bool {
    match (actual, expected) {
        (Value::Object(actual), Value::Object(expected)) => {
            let ignored = |key: &String| options.ignore_fields.iter().any(|f| f == key);

            let expected_ok = expected.iter().filter(|(k, _)| !ignored(k)).all(|(k, v)| {
                actual
                    .get(k)
                    .map(|a| values_match(a, v, options))
                    .unwrap_or(false)
            });

            if options.partial {
                expected_ok
            } else {
                let extra = actual
                    .keys()
                    .filter(|k| !ignored(k))
                    .any(|k| !expected.contains_key(k));
                expected_ok && !extra
            }
        }
        (Value::Array(actual), Value::Array(expected)) => {
            actual.len() == expected.len()
                && actual
                    .iter()
                    .zip(expected)
                    .all(|(a, e)| values_match(a, e, options))
        }
        _ => actual == expected,
    }
}
