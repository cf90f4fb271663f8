//! JSON value helpers for schema-less telemetry
//!
//! Messages are plain `serde_json::Value` trees. This module adds the small
//! amount of structure the engine needs on top: a parsed path accessor,
//! invariant string rendering for twin properties, and timestamp handling.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced while parsing a JSON path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("path '{0}' has an unclosed '['")]
    Unclosed(String),

    #[error("path '{path}' has an invalid bracket segment '{segment}'")]
    InvalidBracket { path: String, segment: String },
}

/// One step of a path: an object key or an array index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// A pre-parsed path such as `message.DeviceId`, `Payload.Values[0]` or
/// `['device/id']`.
///
/// Dots separate keys, brackets hold either an array index or a quoted key.
/// Every other character is part of the key, so `device/deviceId` and
/// `message-Id` are single keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsonPath {
    text: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    /// Parse a path expression
    pub fn parse(input: &str) -> Result<Self, PathError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(PathError::Empty);
        }

        let mut rest = text.strip_prefix('$').unwrap_or(text);
        let mut segments = Vec::new();

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let close = after
                    .find(']')
                    .ok_or_else(|| PathError::Unclosed(text.to_string()))?;
                segments.push(Self::bracket_segment(after[..close].trim(), text)?);
                rest = &after[close + 1..];
            } else {
                let key_text = rest.strip_prefix('.').unwrap_or(rest);
                let end = key_text
                    .find(|c: char| c == '.' || c == '[')
                    .unwrap_or(key_text.len());
                let key = &key_text[..end];
                if key.is_empty() {
                    return Err(PathError::EmptySegment(text.to_string()));
                }
                segments.push(Segment::Key(key.to_string()));
                rest = &key_text[end..];
            }
        }

        if segments.is_empty() {
            return Err(PathError::Empty);
        }

        Ok(Self {
            text: text.to_string(),
            segments,
        })
    }

    /// Build a path from plain object keys
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<Segment> = keys.into_iter().map(|k| Segment::Key(k.into())).collect();
        let text = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Key(k) => Some(k.as_str()),
                Segment::Index(_) => None,
            })
            .collect::<Vec<_>>()
            .join(".");
        Self { text, segments }
    }

    /// Parse a `;`-separated list, skipping blank entries
    pub fn parse_list(input: &str) -> Result<Vec<Self>, PathError> {
        input
            .split(';')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    fn bracket_segment(inner: &str, path: &str) -> Result<Segment, PathError> {
        let quoted = inner
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')));

        if let Some(key) = quoted {
            return Ok(Segment::Key(key.to_string()));
        }

        inner
            .parse::<usize>()
            .map(Segment::Index)
            .map_err(|_| PathError::InvalidBracket {
                path: path.to_string(),
                segment: inner.to_string(),
            })
    }

    /// Resolve the path against a value
    pub fn select<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match segment {
                Segment::Key(key) => node.as_object()?.get(key),
                Segment::Index(index) => node.as_array()?.get(*index),
            })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for JsonPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Read a scalar as a string.
///
/// Strings, numbers and booleans convert; null, objects and arrays do not.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(render_number(n)),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Render a value the way it is stored in a twin property bag.
///
/// Numbers use their canonical, locale-independent form (`-12.1`), strings
/// pass through untouched and structured values become compact JSON.
pub fn render_invariant(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => render_number(n),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Canonical text of a JSON number.
///
/// Integer literals keep every source digit, however wide. Anything with a
/// fraction or exponent is read as an `f64` and printed with the shortest
/// round-trip digits: no trailing `.0`, plain notation for decimal exponents
/// in `-5 < e < 15`, otherwise `1.5E+20` / `1E-07`.
pub fn render_number(n: &Number) -> String {
    let text = n.to_string();
    if !text.contains(['.', 'e', 'E']) {
        return if text == "-0" { "0".to_string() } else { text };
    }

    match n.as_f64() {
        Some(x) if x.is_finite() => format_double(x),
        _ => text,
    }
}

fn format_double(x: f64) -> String {
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }

    let sign = if x < 0.0 { "-" } else { "" };
    let scientific = format!("{:e}", x.abs());
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return x.to_string();
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return x.to_string();
    };

    if !(-5 < exponent && exponent < 15) {
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{sign}{mantissa}E{exp_sign}{:02}", exponent.unsigned_abs());
    }

    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    if exponent < 0 {
        let zeros = "0".repeat(exponent.unsigned_abs() as usize - 1);
        return format!("{sign}0.{zeros}{digits}");
    }

    let whole = exponent as usize + 1;
    if digits.len() <= whole {
        format!("{sign}{digits}{}", "0".repeat(whole - digits.len()))
    } else {
        format!("{sign}{}.{}", &digits[..whole], &digits[whole..])
    }
}

/// Interpret a value as a UTC timestamp.
///
/// Accepts RFC 3339 strings and offset-less ISO 8601 strings, which are
/// taken as UTC.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

    let text = value.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// ISO 8601 rendering used for `sourceTime` metadata
pub fn format_source_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}
