//! Column values surfaced by a row cursor.

use std::fmt::{self, Write as _};

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Runtime value of one column in the current row.
///
/// The same type carries coerced field values on their way into an
/// assigner; in that role the variant always matches the field's declared
/// type (enumerations travel as their discriminant in `Int`).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Bool(bool),
    Timestamp(OffsetDateTime),
    Interval(time::Duration),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    /// Anything else the source produces (documents, arrays, provider
    /// specific types), carried as JSON.
    Json(serde_json::Value),
}

/// Observable kind of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Integer,
    Floating,
    Text,
    Boolean,
    Timestamp,
    Interval,
    Bytes,
    Uuid,
    Other,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Null => "null",
            Self::Integer => "integer",
            Self::Floating => "floating",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Interval => "interval",
            Self::Bytes => "bytes",
            Self::Uuid => "uuid",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Int(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Floating,
            Self::Text(_) => ValueKind::Text,
            Self::Bool(_) => ValueKind::Boolean,
            Self::Timestamp(_) => ValueKind::Timestamp,
            Self::Interval(_) => ValueKind::Interval,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Uuid(_) => ValueKind::Uuid,
            Self::Json(_) => ValueKind::Other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Culture-independent textual form of the value.
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Int(n) => n.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Timestamp(ts) => ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string()),
            Self::Interval(d) => format_interval(*d),
            Self::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Self::Uuid(id) => id.hyphenated().to_string(),
            Self::Json(serde_json::Value::String(s)) => s.clone(),
            Self::Json(json) => json.to_string(),
        }
    }
}

/// Format an interval as `[-][d.]hh:mm:ss[.fraction]`.
pub fn format_interval(interval: time::Duration) -> String {
    let negative = interval.is_negative();
    let interval = interval.abs();

    let days = interval.whole_days();
    let hours = interval.whole_hours() % 24;
    let minutes = interval.whole_minutes() % 60;
    let seconds = interval.whole_seconds() % 60;
    let nanos = interval.subsec_nanoseconds();

    let mut out = String::with_capacity(20);
    if negative {
        out.push('-');
    }
    if days > 0 {
        let _ = write!(out, "{days}.");
    }
    let _ = write!(out, "{hours:02}:{minutes:02}:{seconds:02}");
    if nanos > 0 {
        let fraction = format!("{nanos:09}");
        let _ = write!(out, ".{}", fraction.trim_end_matches('0'));
    }
    out
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<OffsetDateTime> for Value {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<time::Duration> for Value {
    fn from(value: time::Duration) -> Self {
        Self::Interval(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl<V> From<Option<V>> for Value
where
    V: Into<Value>,
{
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(Value::Null.kind(), ValueKind::Null);
        assert_eq!(Value::from(3_i32).kind(), ValueKind::Integer);
        assert_eq!(Value::from(vec![1_u8]).kind(), ValueKind::Bytes);
        assert_eq!(Value::from(serde_json::json!({"a": 1})).kind(), ValueKind::Other);
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn interval_text_form() {
        assert_eq!(format_interval(time::Duration::seconds(37_800)), "10:30:00");
        assert_eq!(
            format_interval(time::Duration::new(93_784, 500_000_000)),
            "1.02:03:04.5"
        );
        assert_eq!(format_interval(time::Duration::minutes(-90)), "-01:30:00");
    }

    #[test]
    fn text_forms_are_culture_independent() {
        assert_eq!(Value::Float(1.5).to_text(), "1.5");
        assert_eq!(Value::Bool(true).to_text(), "true");
        assert_eq!(
            Value::Timestamp(datetime!(2024-03-01 12:00:00 UTC)).to_text(),
            "2024-03-01T12:00:00Z"
        );
        assert_eq!(Value::Json(serde_json::json!("plain")).to_text(), "plain");
    }
}
