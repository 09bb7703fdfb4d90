//! Matcher evaluation.
//!
//! An `fql` matcher carries its expression compiled to a JSON IR. IR nodes are:
//! - a string: a dotted path into the payload (missing paths read as `null`)
//! - `{"value": v}`: a literal
//! - `[op, args...]`: an operator application
//!
//! Anything that cannot be evaluated yields no match.

use crate::path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Matcher type that matches every payload.
pub const MATCHER_ALL: &str = "all";
/// Matcher type evaluating an FQL IR.
pub const MATCHER_FQL: &str = "fql";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Source FQL expression, kept for diagnostics.
    #[serde(default)]
    pub expr: String,
}

/// One matcher of a routing rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Matcher {
    #[serde(rename = "type")]
    pub matcher_type: String,
    /// JSON-encoded IR.
    #[serde(default)]
    pub ir: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<MatcherConfig>,
}

impl Matcher {
    pub fn all() -> Self {
        Self {
            matcher_type: MATCHER_ALL.to_string(),
            ..Default::default()
        }
    }

    pub fn fql(ir: impl Into<String>) -> Self {
        Self {
            matcher_type: MATCHER_FQL.to_string(),
            ir: ir.into(),
            config: None,
        }
    }
}

/// Whether `payload` satisfies `matcher`.
pub fn matches(payload: &Value, matcher: &Matcher) -> bool {
    match matcher.matcher_type.as_str() {
        MATCHER_ALL => true,
        MATCHER_FQL => {
            let ir: Value = match serde_json::from_str(&matcher.ir) {
                Ok(ir) => ir,
                Err(e) => {
                    debug!(error = %e, "Invalid matcher IR");
                    return false;
                }
            };
            matches!(evaluate(payload, &ir), Some(Value::Bool(true)))
        }
        other => {
            debug!(matcher_type = %other, "Unsupported matcher type");
            false
        }
    }
}

/// Evaluate an IR node. `None` means the node is malformed.
fn evaluate(payload: &Value, ir: &Value) -> Option<Value> {
    match ir {
        Value::String(p) => Some(path::get(payload, p).cloned().unwrap_or(Value::Null)),
        Value::Object(literal) => literal.get("value").cloned(),
        Value::Array(items) => {
            let (op, args) = items.split_first()?;
            apply(payload, op.as_str()?, args)
        }
        // Bare scalars are accepted as literals.
        Value::Bool(_) | Value::Number(_) | Value::Null => Some(ir.clone()),
    }
}

fn apply(payload: &Value, op: &str, args: &[Value]) -> Option<Value> {
    match op {
        "and" => {
            for arg in args {
                if !evaluate(payload, arg)?.as_bool()? {
                    return Some(Value::Bool(false));
                }
            }
            Some(Value::Bool(true))
        }
        "or" => {
            for arg in args {
                if evaluate(payload, arg)?.as_bool()? {
                    return Some(Value::Bool(true));
                }
            }
            Some(Value::Bool(false))
        }
        "not" => {
            let [arg] = args else { return None };
            Some(Value::Bool(!evaluate(payload, arg)?.as_bool()?))
        }
        "=" | "!=" | "<" | "<=" | ">" | ">=" => {
            let [left, right] = args else { return None };
            let left = evaluate(payload, left)?;
            let right = evaluate(payload, right)?;
            Some(Value::Bool(compare(op, &left, &right)))
        }
        "contains" => {
            let [haystack, needle] = args else { return None };
            let haystack = evaluate(payload, haystack)?;
            let needle = evaluate(payload, needle)?;
            let found = match (&haystack, &needle) {
                (Value::String(h), Value::String(n)) => h.contains(n.as_str()),
                (Value::Array(items), n) => items.iter().any(|item| values_equal(item, n)),
                _ => false,
            };
            Some(Value::Bool(found))
        }
        "match" => {
            let [subject, pattern] = args else { return None };
            let subject = evaluate(payload, subject)?;
            let pattern = evaluate(payload, pattern)?;
            match (subject.as_str(), pattern.as_str()) {
                (Some(s), Some(p)) => Some(Value::Bool(glob_match(p, s))),
                _ => Some(Value::Bool(false)),
            }
        }
        "lowercase" => {
            let [arg] = args else { return None };
            match evaluate(payload, arg)? {
                Value::String(s) => Some(Value::String(s.to_lowercase())),
                other => Some(other),
            }
        }
        "length" => {
            let [arg] = args else { return None };
            let len = match evaluate(payload, arg)? {
                Value::String(s) => s.chars().count(),
                Value::Array(items) => items.len(),
                Value::Object(map) => map.len(),
                _ => 0,
            };
            Some(Value::from(len))
        }
        "typeof" => {
            let [arg] = args else { return None };
            Some(Value::String(type_name(&evaluate(payload, arg)?).to_string()))
        }
        _ => {
            debug!(op = %op, "Unsupported IR operator");
            None
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(l), Some(r)) if left.is_number() && right.is_number() => l == r,
        _ => left == right,
    }
}

fn compare(op: &str, left: &Value, right: &Value) -> bool {
    match op {
        "=" => values_equal(left, right),
        "!=" => !values_equal(left, right),
        _ => {
            let ordering = match (left, right) {
                (Value::Number(_), Value::Number(_)) => {
                    left.as_f64().zip(right.as_f64()).and_then(|(l, r)| l.partial_cmp(&r))
                }
                (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
                _ => None,
            };
            let Some(ordering) = ordering else {
                return false;
            };
            match op {
                "<" => ordering.is_lt(),
                "<=" => ordering.is_le(),
                ">" => ordering.is_gt(),
                ">=" => ordering.is_ge(),
                _ => false,
            }
        }
    }
}

/// Glob match where `*` is any run of characters and `?` is exactly one.
pub fn glob_match(pattern: &str, subject: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let subject: Vec<char> = subject.chars().collect();

    let (mut p, mut s) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_s = 0;

    while s < subject.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == subject[s]) {
            p += 1;
            s += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_s = s;
            p += 1;
        } else if let Some(star_p) = star {
            p = star_p + 1;
            star_s += 1;
            s = star_s;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
