//! Typed metadata values and coercion from raw strings

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

/// A coerced metadata value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Float(f64),
    Int(i64),
    Timestamp(NaiveDateTime),
    Text(String),
    Null,
}

impl MetadataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view of floats and integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Integer view; floats qualify only when integral
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Float(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    /// Text view of any non-null value
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(value) => Some(value.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Timestamp(value) => Some(value.date()),
            Self::Text(value) => NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Timestamp(value) => write!(f, "{}", value),
            Self::Text(value) => f.write_str(value),
            Self::Null => Ok(()),
        }
    }
}

/// Coerce a raw metadata string
///
/// Surrounding quotes are stripped first, so `"12.5"` and `12.5` coerce
/// alike. Then tried in order: boolean (`TRUE`/`YES`, `FALSE`/`NO`), float
/// (contains `.`), integer, calendar date `YYYY-MM-DD`, Julian timestamp
/// `YYYY:DDD:HH:MM:SS.fff`, and finally the unquoted string. An empty string
/// is `Null`.
pub fn coerce_value(raw: &str) -> MetadataValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return MetadataValue::Null;
    }
    let value = trimmed.trim_matches('"');

    match value.to_ascii_uppercase().as_str() {
        "TRUE" | "YES" => return MetadataValue::Bool(true),
        "FALSE" | "NO" => return MetadataValue::Bool(false),
        _ => {}
    }

    if value.contains('.') {
        if let Ok(float) = value.parse::<f64>() {
            return MetadataValue::Float(float);
        }
    } else if let Ok(int) = value.parse::<i64>() {
        return MetadataValue::Int(int);
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return MetadataValue::Timestamp(date.and_time(NaiveTime::MIN));
    }

    if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, "%Y:%j:%H:%M:%S%.f") {
        return MetadataValue::Timestamp(timestamp);
    }

    MetadataValue::Text(value.to_string())
}
