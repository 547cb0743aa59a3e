//! Value coercion, comparison and formatting helpers shared by column kinds.

use std::cmp::Ordering;

use serde_json::Value;

/// Replace every character that is not valid in a css class name with `_`.
pub fn fix_css(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

/// Whether a raw cell counts as missing for numeric columns.
pub fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => {
            let s = s.trim();
            s.is_empty() || s.eq_ignore_ascii_case("na") || s.parse::<f64>().is_err()
        }
        Value::Number(n) => n.as_f64().is_none_or(f64::is_nan),
        Value::Bool(_) => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Numeric interpretation of a raw cell, NaN if there is none.
pub fn to_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(f64::NAN),
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        _ => f64::NAN,
    }
}

/// Text of a raw cell; `null` becomes the empty string.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON number for `v`, or `null` when not finite.
pub fn number_value(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// Compare numbers where NaN equals NaN and sorts before everything else.
pub fn number_compare(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Locale-like string comparison: case-insensitive first, lowercase before uppercase on ties.
pub fn text_compare(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| b.cmp(a))
}

/// Compare strings with empty values sorted last.
pub fn string_compare(a: &str, b: &str) -> Ordering {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => text_compare(a, b),
    }
}

/// A small subset of d3-style number formats.
///
/// Supported: `.Nf` fixed, `.Nn`/`.Ng`/`.Nr` significant digits, `.Ne`
/// exponent, `.N%` percentage and `d` integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    Fixed(usize),
    Significant(usize),
    Exponent(usize),
    Percent(usize),
    Integer,
}

impl Default for NumberFormat {
    fn default() -> Self {
        NumberFormat::Significant(3)
    }
}

impl NumberFormat {
    /// Parse a format specifier, `None` if unsupported.
    pub fn parse(spec: &str) -> Option<Self> {
        if spec == "d" {
            return Some(NumberFormat::Integer);
        }
        let rest = spec.strip_prefix('.')?;
        let kind = rest.chars().last()?;
        let precision: usize = rest[..rest.len() - kind.len_utf8()].parse().ok()?;
        match kind {
            'f' => Some(NumberFormat::Fixed(precision)),
            'n' | 'g' | 'r' => Some(NumberFormat::Significant(precision.max(1))),
            'e' => Some(NumberFormat::Exponent(precision)),
            '%' => Some(NumberFormat::Percent(precision)),
            _ => None,
        }
    }

    /// Format `v`. NaN renders as `NaN` and infinities as `Infinity`/`-Infinity`.
    pub fn format(&self, v: f64) -> String {
        if v.is_nan() {
            return "NaN".to_string();
        }
        if v.is_infinite() {
            return if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
        }
        match *self {
            NumberFormat::Fixed(p) => format!("{v:.p$}"),
            NumberFormat::Exponent(p) => format!("{v:.p$e}"),
            NumberFormat::Percent(p) => format!("{:.p$}%", v * 100.0),
            NumberFormat::Integer => format!("{}", v.round() as i64),
            NumberFormat::Significant(digits) => format_significant(v, digits),
        }
    }
}

fn format_significant(v: f64, digits: usize) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    let magnitude = v.abs().log10().floor() as i32;
    if magnitude < -6 || magnitude >= digits as i32 + 6 {
        let p = digits.saturating_sub(1);
        return format!("{v:.p$e}");
    }
    let decimals = (digits as i32 - 1 - magnitude).max(0) as usize;
    let text = format!("{v:.decimals$}");
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        text
    }
}
