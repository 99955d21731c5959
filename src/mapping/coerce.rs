//! Ordered coercion of raw column values into declared field types.
//!
//! Rules are tried first-match:
//!
//! 1. interval into a timestamp field: the interval's `hh:mm:ss` text is
//!    read as a time of day on the current UTC date
//! 2. bytes into a text field: decoded as UTF-8, invalid sequences replaced
//! 3. uuid into a text field: canonical hyphenated form
//! 4. anything into an optional enumeration: parsed from the value's text
//! 5. anything into a non-enumeration: generic invariant conversion
//! 6. anything into a required enumeration: text by member name, integers
//!    by discriminant
//!
//! Null never reaches this module; the setter maps it to zero or `None`.

use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use uuid::Uuid;

use super::shape::{DeclaredType, EnumInfo, TypeTag};
use super::value::{Value, format_interval};

/// Convert a non-null raw value into the canonical value for `declared`.
///
/// The error carries the reason only; the caller attaches field context.
pub fn coerce(raw: &Value, declared: DeclaredType) -> Result<Value, String> {
    match (raw, declared.tag) {
        (Value::Interval(interval), TypeTag::Timestamp) => {
            parse_timestamp(&format_interval(*interval)).map(Value::Timestamp)
        }
        (Value::Bytes(bytes), TypeTag::Text) => {
            Ok(Value::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
        (Value::Uuid(id), TypeTag::Text) => Ok(Value::Text(id.hyphenated().to_string())),
        (_, TypeTag::Enum(info)) if declared.nullable => parse_member(info, &raw.to_text()),
        (_, TypeTag::Enum(info)) => match raw {
            Value::Text(text) => parse_member(info, text),
            other => integral(other).and_then(|d| member_by_value(info, d)),
        },
        (_, tag) => convert(raw, tag),
    }
}

fn convert(raw: &Value, tag: TypeTag) -> Result<Value, String> {
    match tag {
        TypeTag::Bool => to_bool(raw).map(Value::Bool),
        TypeTag::I8 => to_integer(raw, i8::MIN.into(), i8::MAX.into()),
        TypeTag::I16 => to_integer(raw, i16::MIN.into(), i16::MAX.into()),
        TypeTag::I32 => to_integer(raw, i32::MIN.into(), i32::MAX.into()),
        TypeTag::I64 => to_integer(raw, i64::MIN.into(), i64::MAX.into()),
        TypeTag::U8 => to_integer(raw, 0, u8::MAX.into()),
        TypeTag::U16 => to_integer(raw, 0, u16::MAX.into()),
        TypeTag::U32 => to_integer(raw, 0, u32::MAX.into()),
        // Coerced integers travel as i64.
        TypeTag::U64 => to_integer(raw, 0, i64::MAX.into()),
        TypeTag::F32 => to_float(raw).map(|f| Value::Float(f64::from(f as f32))),
        TypeTag::F64 => to_float(raw).map(Value::Float),
        TypeTag::Text => Ok(Value::Text(raw.to_text())),
        TypeTag::Timestamp => match raw {
            Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
            Value::Text(text) => parse_timestamp(text).map(Value::Timestamp),
            other => Err(no_conversion(other, tag)),
        },
        TypeTag::Interval => match raw {
            Value::Interval(interval) => Ok(Value::Interval(*interval)),
            Value::Text(text) => parse_interval(text).map(Value::Interval),
            other => Err(no_conversion(other, tag)),
        },
        TypeTag::Bytes => match raw {
            Value::Bytes(bytes) => Ok(Value::Bytes(bytes.clone())),
            other => Err(no_conversion(other, tag)),
        },
        TypeTag::Uuid => match raw {
            Value::Uuid(id) => Ok(Value::Uuid(*id)),
            Value::Text(text) => Uuid::parse_str(text.trim())
                .map(Value::Uuid)
                .map_err(|err| err.to_string()),
            other => Err(no_conversion(other, tag)),
        },
        TypeTag::Json => Ok(Value::Json(to_json(raw))),
        TypeTag::Enum(info) => Err(format!("`{}` is an enumeration", info.name)),
    }
}

fn no_conversion(raw: &Value, tag: TypeTag) -> String {
    format!("no conversion from {} to {tag}", raw.kind())
}

fn to_bool(raw: &Value) -> Result<bool, String> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::Int(n) => Ok(*n != 0),
        Value::Float(f) => Ok(*f != 0.0),
        Value::Text(text) => {
            let text = text.trim();
            if text.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if text.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                Err(format!("`{text}` is not a boolean"))
            }
        }
        Value::Json(serde_json::Value::Bool(b)) => Ok(*b),
        other => Err(no_conversion(other, TypeTag::Bool)),
    }
}

fn to_integer(raw: &Value, min: i128, max: i128) -> Result<Value, String> {
    let wide: i128 = match raw {
        Value::Int(n) => i128::from(*n),
        Value::Bool(b) => i128::from(*b),
        Value::Float(f) => round_float(*f)?,
        Value::Text(text) => text
            .trim()
            .parse::<i128>()
            .map_err(|err| format!("`{}` is not an integer: {err}", text.trim()))?,
        Value::Json(serde_json::Value::Number(number)) => match number.as_i64() {
            Some(n) => i128::from(n),
            None => match number.as_u64() {
                Some(n) => i128::from(n),
                None => round_float(number.as_f64().unwrap_or(f64::NAN))?,
            },
        },
        other => return Err(format!("no conversion from {} to an integer", other.kind())),
    };

    if wide < min || wide > max {
        return Err(format!("{wide} is outside the range {min}..={max}"));
    }
    i64::try_from(wide)
        .map(Value::Int)
        .map_err(|_| format!("{wide} is outside the range {min}..={max}"))
}

/// Round half to even, rejecting values without an integral meaning.
fn round_float(value: f64) -> Result<i128, String> {
    if !value.is_finite() {
        return Err(format!("{value} has no integral value"));
    }
    let rounded = value.round_ties_even();
    if rounded.abs() >= 1e38 {
        return Err(format!("{value} is too large"));
    }
    Ok(rounded as i128)
}

fn to_float(raw: &Value) -> Result<f64, String> {
    match raw {
        Value::Float(f) => Ok(*f),
        Value::Int(n) => Ok(*n as f64),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Text(text) => text
            .trim()
            .parse::<f64>()
            .map_err(|err| format!("`{}` is not a number: {err}", text.trim())),
        Value::Json(serde_json::Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| format!("{number} is not representable as f64")),
        other => Err(format!("no conversion from {} to a number", other.kind())),
    }
}

fn to_json(raw: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match raw {
        Value::Null => Json::Null,
        Value::Int(n) => Json::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::Bool(b) => Json::Bool(*b),
        Value::Text(text) => {
            serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.clone()))
        }
        Value::Bytes(bytes) => Json::from(bytes.clone()),
        Value::Json(json) => json.clone(),
        Value::Timestamp(_) | Value::Interval(_) | Value::Uuid(_) => Json::String(raw.to_text()),
    }
}

fn integral(raw: &Value) -> Result<i64, String> {
    match raw {
        Value::Int(n) => Ok(*n),
        Value::Bool(b) => Ok(i64::from(*b)),
        other => Err(format!(
            "{} values cannot select an enumeration member",
            other.kind()
        )),
    }
}

fn member_by_value(info: EnumInfo, discriminant: i64) -> Result<Value, String> {
    if info.is_defined(discriminant) {
        Ok(Value::Int(discriminant))
    } else {
        Err(format!("{discriminant} is not a member of `{}`", info.name))
    }
}

/// Resolve a member name, falling back to a numeric discriminant.
fn parse_member(info: EnumInfo, text: &str) -> Result<Value, String> {
    let text = text.trim();
    if let Some(discriminant) = info.by_name(text) {
        return Ok(Value::Int(discriminant));
    }
    match text.parse::<i64>() {
        Ok(discriminant) => member_by_value(info, discriminant),
        Err(_) => Err(format!("`{text}` is not a member of `{}`", info.name)),
    }
}

/// Parse a timestamp in one of the invariant forms.
///
/// Accepted: RFC 3339, `YYYY-MM-DD[ T]hh:mm:ss[.f]` (UTC), `YYYY-MM-DD`
/// (UTC midnight), and a bare `hh:mm[:ss[.f]]` time of day on the current
/// UTC date.
pub fn parse_timestamp(text: &str) -> Result<OffsetDateTime, String> {
    let text = text.trim();

    if let Ok(ts) = OffsetDateTime::parse(text, &Rfc3339) {
        return Ok(ts);
    }
    if let Ok(ts) = PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
    ) {
        return Ok(ts.assume_utc());
    }
    if let Ok(ts) = PrimitiveDateTime::parse(
        text,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    ) {
        return Ok(ts.assume_utc());
    }
    if let Ok(date) = Date::parse(text, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_utc());
    }
    if let Some(clock) = parse_time_of_day(text) {
        let today = OffsetDateTime::now_utc().date();
        return Ok(PrimitiveDateTime::new(today, clock).assume_offset(UtcOffset::UTC));
    }

    Err(format!("`{text}` is not a recognizable timestamp"))
}

fn parse_time_of_day(text: &str) -> Option<Time> {
    Time::parse(
        text,
        format_description!("[hour]:[minute]:[second][optional [.[subsecond]]]"),
    )
    .or_else(|_| Time::parse(text, format_description!("[hour]:[minute]")))
    .ok()
}

/// Parse `[-][d.]hh:mm[:ss[.f]]` into an interval.
pub fn parse_interval(text: &str) -> Result<time::Duration, String> {
    let invalid = || format!("`{}` is not a recognizable interval", text.trim());
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let (days, clock) = match body.split_once('.') {
        Some((days, rest)) if !days.contains(':') => {
            if !days.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            (days.parse::<i64>().map_err(|_| invalid())?, rest)
        }
        _ => (0, body),
    };

    let (clock, nanos) = match clock.split_once('.') {
        Some((clock, fraction)) => (clock, parse_fraction(fraction).ok_or_else(invalid)?),
        None => (clock, 0),
    };

    let mut parts = clock.split(':');
    let mut next = |limit: i64| -> Result<Option<i64>, String> {
        match parts.next() {
            None => Ok(None),
            Some(part) => {
                let value = part.parse::<i64>().map_err(|_| invalid())?;
                if (0..limit).contains(&value) {
                    Ok(Some(value))
                } else {
                    Err(invalid())
                }
            }
        }
    };
    let hours = next(24)?.ok_or_else(invalid)?;
    let minutes = next(60)?.ok_or_else(invalid)?;
    let seconds = next(60)?.unwrap_or(0);
    if parts.next().is_some() {
        return Err(invalid());
    }

    let seconds = days
        .checked_mul(86_400)
        .and_then(|total| total.checked_add(hours * 3_600 + minutes * 60 + seconds))
        .ok_or_else(invalid)?;
    // `nanos` is below one second, so `Duration::new` never carries into seconds.
    let nanos = nanos as i32;
    Ok(if negative {
        time::Duration::new(-seconds, -nanos)
    } else {
        time::Duration::new(seconds, nanos)
    })
}

fn parse_fraction(fraction: &str) -> Option<i64> {
    if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{fraction:0<9}");
    padded.parse().ok()
}

#[cfg(test)]
mod tests {
    use time::macros::{datetime, time};

    use super::*;

    const COLOR: EnumInfo = EnumInfo {
        name: "Color",
        members: &[("Red", 1), ("Green", 2)],
    };

    fn required(tag: TypeTag) -> DeclaredType {
        DeclaredType::required(tag)
    }

    #[test]
    fn interval_into_timestamp_uses_today() {
        let coerced = coerce(
            &Value::Interval(time::Duration::seconds(37_800)),
            required(TypeTag::Timestamp),
        )
        .expect("time of day");

        let Value::Timestamp(ts) = coerced else {
            panic!("expected timestamp, got {coerced:?}");
        };
        assert_eq!(ts.time(), time!(10:30:00));
        assert_eq!(ts.date(), OffsetDateTime::now_utc().date());
        assert_eq!(ts.offset(), UtcOffset::UTC);
    }

    #[test]
    fn interval_of_a_day_or_more_is_not_a_timestamp() {
        let err = coerce(
            &Value::Interval(time::Duration::hours(25)),
            required(TypeTag::Timestamp),
        )
        .unwrap_err();
        assert!(err.contains("1.01:00:00"));
    }

    #[test]
    fn bytes_and_uuid_into_text() {
        assert_eq!(
            coerce(&Value::Bytes(b"hello".to_vec()), required(TypeTag::Text)),
            Ok(Value::Text("hello".into()))
        );
        assert_eq!(
            coerce(&Value::Bytes(vec![0x66, 0xff]), required(TypeTag::Text)),
            Ok(Value::Text("f\u{fffd}".into()))
        );

        let id = Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef);
        assert_eq!(
            coerce(&Value::Uuid(id), DeclaredType::nullable(TypeTag::Text)),
            Ok(Value::Text("01234567-89ab-cdef-0123-456789abcdef".into()))
        );
    }

    #[test]
    fn nullable_enum_parses_names_and_numbers() {
        let declared = DeclaredType::nullable(TypeTag::Enum(COLOR));
        assert_eq!(coerce(&Value::Text("Green".into()), declared), Ok(Value::Int(2)));
        assert_eq!(coerce(&Value::Int(1), declared), Ok(Value::Int(1)));
        assert!(coerce(&Value::Text("green".into()), declared).is_err());
        assert!(coerce(&Value::Int(7), declared).is_err());
    }

    #[test]
    fn required_enum_accepts_text_and_integers_only() {
        let declared = required(TypeTag::Enum(COLOR));
        assert_eq!(coerce(&Value::Text("Red".into()), declared), Ok(Value::Int(1)));
        assert_eq!(coerce(&Value::Int(2), declared), Ok(Value::Int(2)));
        assert_eq!(coerce(&Value::Bool(true), declared), Ok(Value::Int(1)));
        assert!(coerce(&Value::Float(1.0), declared).is_err());
        assert!(coerce(&Value::Int(3), declared).is_err());
    }

    #[test]
    fn integers_are_range_checked() {
        assert_eq!(coerce(&Value::Int(300), required(TypeTag::I16)), Ok(Value::Int(300)));
        assert!(coerce(&Value::Int(300), required(TypeTag::U8)).is_err());
        assert!(coerce(&Value::Int(-1), required(TypeTag::U32)).is_err());
        assert_eq!(
            coerce(&Value::Text(" 42 ".into()), required(TypeTag::I32)),
            Ok(Value::Int(42))
        );
        assert!(coerce(&Value::Text("4x".into()), required(TypeTag::I32)).is_err());
    }

    #[test]
    fn floats_round_half_to_even() {
        assert_eq!(coerce(&Value::Float(2.5), required(TypeTag::I32)), Ok(Value::Int(2)));
        assert_eq!(coerce(&Value::Float(3.5), required(TypeTag::I32)), Ok(Value::Int(4)));
        assert!(coerce(&Value::Float(f64::NAN), required(TypeTag::I64)).is_err());
    }

    #[test]
    fn text_is_parsed_invariantly() {
        assert_eq!(
            coerce(&Value::Text("1.25".into()), required(TypeTag::F64)),
            Ok(Value::Float(1.25))
        );
        assert!(coerce(&Value::Text("1,25".into()), required(TypeTag::F64)).is_err());
        assert_eq!(
            coerce(&Value::Text("TRUE".into()), required(TypeTag::Bool)),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            coerce(&Value::Int(7), required(TypeTag::Text)),
            Ok(Value::Text("7".into()))
        );
    }

    #[test]
    fn timestamps_parse_invariant_forms() {
        assert_eq!(
            parse_timestamp("2024-03-01T12:00:00+02:00"),
            Ok(datetime!(2024-03-01 12:00:00 +02:00))
        );
        assert_eq!(
            parse_timestamp("2024-03-01 08:15:30.5"),
            Ok(datetime!(2024-03-01 08:15:30.5 UTC))
        );
        assert_eq!(parse_timestamp("2024-03-01"), Ok(datetime!(2024-03-01 00:00:00 UTC)));
        assert!(parse_timestamp("03/01/2024").is_err());
    }

    #[test]
    fn intervals_parse_clock_text() {
        assert_eq!(parse_interval("10:30"), Ok(time::Duration::minutes(630)));
        assert_eq!(
            parse_interval("-1.02:03:04.25"),
            Ok(-time::Duration::new(93_784, 250_000_000))
        );
        assert!(parse_interval("25:00:00").is_err());
        assert!(parse_interval("soon").is_err());
    }

    #[test]
    fn oversized_interval_text_is_a_failure() {
        let raw = Value::Text("999999999999999.00:00".into());

        let err = coerce(&raw, DeclaredType::required(TypeTag::Interval)).unwrap_err();
        assert!(err.contains("999999999999999.00:00"));
        assert!(parse_interval(&format!("{}.00:00", i64::MAX)).is_err());
        assert_eq!(
            parse_interval("106751991167300.00:00"),
            Ok(time::Duration::days(106_751_991_167_300))
        );
    }

    #[test]
    fn uuid_from_text_and_json_passthrough() {
        let id = Uuid::new_v4();
        assert_eq!(
            coerce(&Value::Text(id.to_string()), required(TypeTag::Uuid)),
            Ok(Value::Uuid(id))
        );
        assert_eq!(
            coerce(&Value::Text("{\"a\":1}".into()), required(TypeTag::Json)),
            Ok(Value::Json(serde_json::json!({"a": 1})))
        );
        assert!(coerce(&Value::Int(1), required(TypeTag::Bytes)).is_err());
    }
}
