//! Cell-level normalizers for the raw Steam export.
//!
//! Every function here is total: malformed input collapses to `None` (or an
//! empty list) and is never surfaced as an error. Callers pass the
//! missing-aware cell value, so `None` always means "no value in the source".

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::warn;

/// Characters dropped from numeric cells before parsing.
const NUMERIC_NOISE: [char; 5] = [',', '$', '€', '£', '¥'];

/// Delimiters tried after the caller's separator, in this order.
const FALLBACK_DELIMITERS: [char; 3] = [']', '\'', '\n'];

/// Release date layouts, tried in order. Day-first is tried before month-first,
/// so ambiguous values such as `02/03/2020` resolve to 2 March.
const DATE_FORMATS: [&str; 4] = ["%b %d, %Y", "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

static STRONG_MARKUP: OnceLock<Regex> = OnceLock::new();

fn strong_markup() -> &'static Regex {
    STRONG_MARKUP.get_or_init(|| {
        Regex::new(r"(?i)(?:&amp;lt;|&lt;|<)/?strong(?:&amp;gt;|&gt;|>)")
            .expect("strong markup pattern is valid")
    })
}

fn strip_numeric_noise(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| !NUMERIC_NOISE.contains(c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Parse a decimal cell such as `"$1,299.99"`.
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    let cleaned = strip_numeric_noise(raw?)?;
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a count cell. Float spellings (`"12.0"`) are accepted and truncated
/// toward zero.
pub fn parse_int(raw: Option<&str>) -> Option<i64> {
    let cleaned = strip_numeric_noise(raw?)?;
    if let Ok(v) = cleaned.parse::<i64>() {
        return Some(v);
    }
    let v = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?.trunc();
    if v < i64::MIN as f64 || v > i64::MAX as f64 {
        return None;
    }
    Some(v as i64)
}

/// Truthiness of a boolean-ish cell (platform columns hold `True`/`False`).
pub fn parse_flag(raw: Option<&str>) -> bool {
    raw.map(|v| {
        matches!(
            v.trim().to_ascii_lowercase().as_str(),
            "true" | "t" | "1" | "yes" | "y"
        )
    })
    .unwrap_or(false)
}

fn is_stray(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\'' | '"' | '[' | ']')
}

fn json_item(item: &Value) -> Option<String> {
    let text = match item {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let trimmed = text.trim_matches(|c: char| c.is_whitespace() || c == '\'' || c == '"');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Recover the discrete items of a multi-valued cell.
///
/// The export mixes several encodings for the same column:
/// - JSON arrays, sometimes wrapped in (escaped) `<strong>` markup
/// - python-style pseudo lists: `['Action', 'Indie']`
/// - plain delimited strings: `Action,Indie`
/// - a single bare value
///
/// A JSON array is tried first. Otherwise `separator`, `]`, `'` and newline are
/// tried in turn and the first one producing more than one piece wins. If none
/// does, the whole value is a single item. Empty items never survive.
pub fn parse_list(raw: Option<&str>, separator: char) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    let without_markup = strong_markup().replace_all(raw.trim(), "");
    let value = without_markup.trim();
    if value.is_empty() {
        return Vec::new();
    }

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(value) {
        return items.iter().filter_map(json_item).collect();
    }

    let delimiters = std::iter::once(separator)
        .chain(FALLBACK_DELIMITERS.into_iter().filter(|d| *d != separator));
    for delimiter in delimiters {
        if !value.contains(delimiter) {
            continue;
        }
        let pieces: Vec<String> = value
            .split(delimiter)
            .map(|piece| piece.trim_matches(is_stray))
            .filter(|piece| !piece.is_empty())
            .map(str::to_string)
            .collect();
        if pieces.len() > 1 {
            return pieces;
        }
    }

    let single = value.trim_matches(is_stray);
    if single.is_empty() {
        Vec::new()
    } else {
        vec![single.to_string()]
    }
}

/// [`parse_list`] with the default `,` separator.
pub fn parse_csv_list(raw: Option<&str>) -> Vec<String> {
    parse_list(raw, ',')
}

/// Parse a release date. Unrecognized values are logged and dropped.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let value = raw?.trim();
    if value.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return Some(date);
        }
    }
    // "Mon YYYY" has no day component; pin it to the first of the month.
    if let Ok(date) = NaiveDate::parse_from_str(&format!("1 {value}"), "%d %b %Y") {
        return Some(date);
    }
    warn!(raw = value, "unrecognized release date format");
    None
}
