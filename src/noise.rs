//! Response comparison under noise masks.
//!
//! A noise mask maps a field path (`body.ts`, `header.date`, or `body` for
//! the whole plain-text body) to regex modifiers. An empty modifier list
//! ignores the field outright; with modifiers, the field is ignored only
//! when the live value matches one of them. Per-set masks override the
//! global mask per key path, and a test case's own mask is applied on top.

use crate::models::{
    BodyComparison, BodyComparisonKind, ComparisonResult, HeaderComparison, HttpResp, NoiseMask,
    TestCase, ValueComparison,
};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

/// Left-join of noise masks: every global entry, with per-set entries
/// overriding the global entry for the same key path.
#[must_use]
pub fn left_join(global: &NoiseMask, per_set: &NoiseMask) -> NoiseMask {
    let mut merged = global.clone();
    for (key, modifiers) in per_set {
        merged.insert(key.clone(), modifiers.clone());
    }
    merged
}

/// Union used by denoise `add`: entries of `addition` are inserted into
/// `base`, overwriting colliding keys.
#[must_use]
pub fn merge_masks(base: &NoiseMask, addition: &NoiseMask) -> NoiseMask {
    left_join(base, addition)
}

/// Subtraction used by denoise `remove`: keys of `removal` are dropped
/// from `base`.
#[must_use]
pub fn remove_masks(base: &NoiseMask, removal: &NoiseMask) -> NoiseMask {
    let mut out = base.clone();
    for key in removal.keys() {
        out.remove(&normalize_key(key));
        out.remove(key);
    }
    out
}

fn normalize_key(key: &str) -> String {
    key.to_ascii_lowercase()
}

/// Whether the value at `path` is exempt from comparison.
fn masked(noise: &NoiseMask, path: &str, live_value: &str) -> bool {
    let Some(modifiers) = noise.get(&normalize_key(path)) else {
        return false;
    };
    if modifiers.is_empty() {
        return true;
    }
    modifiers.iter().any(|pattern| match Regex::new(pattern) {
        Ok(re) => re.is_match(live_value),
        Err(err) => {
            tracing::warn!(path, pattern, %err, "invalid noise modifier; not applied");
            false
        }
    })
}

fn effective_noise(tc: &TestCase, noise_config: &NoiseMask) -> NoiseMask {
    let mut merged = NoiseMask::new();
    for (key, modifiers) in noise_config {
        merged.insert(normalize_key(key), modifiers.clone());
    }
    for (key, modifiers) in &tc.noise {
        merged.insert(normalize_key(key), modifiers.clone());
    }
    merged
}

fn is_json_content(resp: &HttpResp) -> bool {
    resp.header.iter().any(|(name, value)| {
        name.eq_ignore_ascii_case("content-type")
            && value.to_ascii_lowercase().contains("application/json")
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Identifier keys that make JSON object arrays order-insensitive.
const STABLE_ID_KEYS: [&str; 2] = ["id", "_id"];

fn stable_id(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    for key in STABLE_ID_KEYS {
        if let Some(id) = object.get(key) {
            return Some(render(id));
        }
    }
    None
}

struct BodyMatcher<'a> {
    noise: &'a NoiseMask,
    ignore_ordering: bool,
    failed_paths: Vec<String>,
}

impl BodyMatcher<'_> {
    fn compare(&mut self, path: &str, expected: &Value, actual: &Value) -> bool {
        if masked(self.noise, path, &render(actual)) {
            return true;
        }
        match (expected, actual) {
            (Value::Object(exp), Value::Object(act)) => {
                let keys: BTreeSet<&String> = exp.keys().chain(act.keys()).collect();
                let mut passed = true;
                for key in keys {
                    let child = format!("{path}.{}", key.to_ascii_lowercase());
                    match (exp.get(key), act.get(key)) {
                        (Some(e), Some(a)) => {
                            if !self.compare(&child, e, a) {
                                passed = false;
                            }
                        }
                        (Some(_), None) | (None, Some(_)) => {
                            let live = act.get(key).map(render).unwrap_or_default();
                            if !masked(self.noise, &child, &live) {
                                self.failed_paths.push(child);
                                passed = false;
                            }
                        }
                        (None, None) => {}
                    }
                }
                passed
            }
            (Value::Array(exp), Value::Array(act)) => self.compare_arrays(path, exp, act),
            _ => {
                if expected == actual {
                    true
                } else {
                    self.failed_paths.push(path.to_string());
                    false
                }
            }
        }
    }

    fn compare_arrays(&mut self, path: &str, expected: &[Value], actual: &[Value]) -> bool {
        if expected.len() != actual.len() {
            self.failed_paths.push(path.to_string());
            return false;
        }
        if self.ignore_ordering {
            if let Some(pairs) = pair_by_stable_id(expected, actual) {
                let mut passed = true;
                for (exp, act) in pairs {
                    // Element paths stay on the parent path so one mask
                    // entry covers every element of the array.
                    if !self.compare(path, exp, act) {
                        passed = false;
                    }
                }
                return passed;
            }
        }
        let mut passed = true;
        for (exp, act) in expected.iter().zip(actual) {
            if !self.compare(path, exp, act) {
                passed = false;
            }
        }
        passed
    }
}

/// Pair up two object arrays by their stable identifiers. Returns `None`
/// when any element lacks an identifier, ids collide, or the id sets
/// differ; callers then fall back to ordered comparison.
fn pair_by_stable_id<'a>(
    expected: &'a [Value],
    actual: &'a [Value],
) -> Option<Vec<(&'a Value, &'a Value)>> {
    let mut by_id = std::collections::BTreeMap::new();
    for value in actual {
        let id = stable_id(value)?;
        if by_id.insert(id, value).is_some() {
            return None;
        }
    }
    let mut pairs = Vec::with_capacity(expected.len());
    let mut seen = BTreeSet::new();
    for value in expected {
        let id = stable_id(value)?;
        if !seen.insert(id.clone()) {
            return None;
        }
        pairs.push((value, *by_id.get(&id)?));
    }
    Some(pairs)
}

fn compare_headers(
    tc: &TestCase,
    actual: &HttpResp,
    noise: &NoiseMask,
) -> (bool, Vec<HeaderComparison>) {
    let names: BTreeSet<String> = tc
        .http_resp
        .header
        .keys()
        .chain(actual.header.keys())
        .map(|name| name.to_ascii_lowercase())
        .collect();

    let lookup = |header: &std::collections::BTreeMap<String, String>, name: &str| {
        header
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    };

    let mut passed = true;
    let mut comparisons = Vec::with_capacity(names.len());
    for name in names {
        let expected = lookup(&tc.http_resp.header, &name);
        let live = lookup(&actual.header, &name);
        let header_passed =
            masked(noise, &format!("header.{name}"), &live) || expected == live;
        if !header_passed {
            passed = false;
        }
        comparisons.push(HeaderComparison {
            key: name,
            expected,
            actual: live,
            passed: header_passed,
        });
    }
    (passed, comparisons)
}

fn compare_body(
    tc: &TestCase,
    actual: &HttpResp,
    noise: &NoiseMask,
    ignore_ordering: bool,
) -> BodyComparison {
    let json_mode = is_json_content(&tc.http_resp) && is_json_content(actual);
    if json_mode {
        let parsed = (
            serde_json::from_str::<Value>(&tc.http_resp.body),
            serde_json::from_str::<Value>(&actual.body),
        );
        if let (Ok(expected), Ok(live)) = parsed {
            let mut matcher = BodyMatcher {
                noise,
                ignore_ordering,
                failed_paths: Vec::new(),
            };
            let passed = matcher.compare("body", &expected, &live);
            return BodyComparison {
                kind: BodyComparisonKind::Json,
                expected: tc.http_resp.body.clone(),
                actual: actual.body.clone(),
                passed,
                failed_paths: matcher.failed_paths,
            };
        }
    }

    let passed =
        masked(noise, "body", &actual.body) || tc.http_resp.body == actual.body;
    BodyComparison {
        kind: BodyComparisonKind::Plain,
        expected: tc.http_resp.body.clone(),
        actual: actual.body.clone(),
        passed,
        failed_paths: Vec::new(),
    }
}

/// Compare a live response against the recorded one.
///
/// `noise_config` is the already-merged global/per-set mask; the test
/// case's own mask is applied on top (case entries win per key).
#[must_use]
pub fn match_response(
    tc: &TestCase,
    actual: &HttpResp,
    noise_config: &NoiseMask,
    ignore_ordering: bool,
) -> (bool, ComparisonResult) {
    let noise = effective_noise(tc, noise_config);

    let status_passed = tc.http_resp.status_code == actual.status_code;
    let (headers_passed, headers) = compare_headers(tc, actual, &noise);
    let body = compare_body(tc, actual, &noise, ignore_ordering);

    let result = ComparisonResult {
        status_code: ValueComparison {
            expected: tc.http_resp.status_code,
            actual: actual.status_code,
            passed: status_passed,
        },
        headers,
        body: body.clone(),
    };
    (status_passed && headers_passed && body.passed, result)
}
