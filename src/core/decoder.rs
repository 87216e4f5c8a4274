//! Best-effort decoding of the literals test authors write, e.g.
//! `nums = [2,7,11,15], target = 9` or `["o","l","l","e","h"]`.
//!
//! Nothing in here fails: text that no strategy understands is kept as a raw
//! string and will usually just make the comparison fail.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Number, Value};

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").expect("valid integer regex"));
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid identifier regex"));

/// A decoded call argument.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Argument {
    Value(Value),
    /// Passed to the candidate as `undefined`, keeping later positions intact.
    Undefined,
}

type ParseStrategy = fn(&str) -> Option<Argument>;

/// Tried in order, first hit wins.
const STRATEGIES: [ParseStrategy; 4] = [parse_json, unwrap_quoted, parse_integer, parse_keyword];

pub fn decode_argument_list(input: &str) -> Vec<Argument> {
    split_top_level(input)
        .into_iter()
        .map(str::trim)
        .filter(|clause| !clause.is_empty())
        .map(|clause| decode_value(clause_value(clause)))
        .collect()
}

pub fn decode_value(raw: &str) -> Argument {
    let raw = raw.trim();
    if raw.is_empty() {
        return Argument::Undefined;
    }

    STRATEGIES
        .iter()
        .find_map(|strategy| strategy(raw))
        .unwrap_or_else(|| Argument::Value(Value::String(raw.to_string())))
}

/// Canonical string an output has to match.
pub fn decode_expected(expected: &str) -> String {
    match serde_json::from_str::<Value>(expected) {
        Ok(value) => format_value(&value),
        Err(_) => expected.to_string(),
    }
}

/// Arrays and objects become canonical JSON, scalars their natural text.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => format_number(number),
        Value::String(text) => text.clone(),
        Value::Array(_) | Value::Object(_) => canonical_json(value),
    }
}

/// Sorted keys, integral numbers without a fraction.
pub fn canonical_json(value: &Value) -> String {
    normalize(value).to_string()
}

fn normalize(value: &Value) -> Value {
    match value {
        Value::Number(number) => Value::Number(normalize_number(number)),
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, field)| (key.clone(), normalize(field)))
                .collect::<Map<String, Value>>(),
        ),
        other => other.clone(),
    }
}

// 2^53, past this point f64 stops being exact for integers
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

fn normalize_number(number: &Number) -> Number {
    match number.as_f64() {
        Some(float) if number.is_f64() && float.fract() == 0.0 && float.abs() <= MAX_SAFE_INTEGER => {
            Number::from(float as i64)
        }
        _ => number.clone(),
    }
}

fn format_number(number: &Number) -> String {
    if let Some(integer) = number.as_i64() {
        return integer.to_string();
    }
    if let Some(integer) = number.as_u64() {
        return integer.to_string();
    }
    match number.as_f64() {
        Some(float) if float == 0.0 => "0".to_string(),
        Some(float) if float.fract() == 0.0 && float.abs() < 1e21 => format!("{float:.0}"),
        Some(float) => float.to_string(),
        None => number.to_string(),
    }
}

fn parse_json(raw: &str) -> Option<Argument> {
    serde_json::from_str(raw).ok().map(Argument::Value)
}

fn unwrap_quoted(raw: &str) -> Option<Argument> {
    raw.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(|inner| Argument::Value(Value::String(inner.to_string())))
}

fn parse_integer(raw: &str) -> Option<Argument> {
    if !INTEGER.is_match(raw) {
        return None;
    }
    raw.parse::<i64>()
        .ok()
        .map(|integer| Argument::Value(Value::from(integer)))
}

fn parse_keyword(raw: &str) -> Option<Argument> {
    match raw {
        "true" => Some(Argument::Value(Value::Bool(true))),
        "false" => Some(Argument::Value(Value::Bool(false))),
        "null" => Some(Argument::Value(Value::Null)),
        "undefined" => Some(Argument::Undefined),
        _ => None,
    }
}

/// `name = value` yields `value`; a clause without an identifier before
/// the first `=` is taken whole.
fn clause_value(clause: &str) -> &str {
    match clause.split_once('=') {
        Some((name, value)) if IDENTIFIER.is_match(name.trim()) => value,
        _ => clause,
    }
}

/// Splits on commas outside brackets and string literals.
fn split_top_level(input: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (idx, ch) in input.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == open {
                quote = None;
            }
            continue;
        }

        match ch {
            '"' | '\'' => quote = Some(ch),
            '[' | '{' | '(' => depth += 1,
            ']' | '}' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                clauses.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    clauses.push(&input[start..]);

    clauses
}
