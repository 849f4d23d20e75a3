//! Conversion of single field values to and from their JSON storage form.
//!
//! Scalars map onto native JSON values. Date-times are stored as RFC 3339
//! strings in UTC and paths as strings. Relationship and custom kinds have no
//! transcoder; relationships are encoded by [`crate::relation`].

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Number, Value as Json};

use crate::error::CoreError;
use crate::model::{FieldKind, Value};

/// Encode `value`, declared as `kind` on `field`, into its storage form.
pub fn encode(field: &str, value: &Value, kind: &FieldKind) -> Result<Json, CoreError> {
    check_supported(kind)?;
    if !value.fits(kind) {
        return Err(CoreError::TypeMismatch {
            field: field.to_string(),
            expected: kind.to_string(),
            found: value.type_name().to_string(),
        });
    }

    let json = match value {
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::Number((*i).into()),
        Value::Float(f) => Json::Number(Number::from_f64(*f).ok_or_else(|| {
            CoreError::InvalidValue {
                field: field.to_string(),
                reason: format!("{f} has no JSON representation"),
            }
        })?),
        Value::Str(s) => Json::String(s.clone()),
        Value::DateTime(dt) => Json::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Path(p) => {
            let s = p.to_str().ok_or_else(|| CoreError::InvalidValue {
                field: field.to_string(),
                reason: format!("path {} is not valid UTF-8", p.display()),
            })?;
            Json::String(neutral_path(s))
        }
        Value::List(items) => {
            let FieldKind::List(inner) = kind else {
                return Err(CoreError::TypeMismatch {
                    field: field.to_string(),
                    expected: kind.to_string(),
                    found: value.type_name().to_string(),
                });
            };
            Json::Array(
                items
                    .iter()
                    .map(|item| encode(field, item, inner))
                    .collect::<Result<_, _>>()?,
            )
        }
    };
    Ok(json)
}

/// Decode the stored form of `field` back into a value of `kind`.
///
/// A shape that does not fit the kind fails with `TypeMismatch`; the record
/// reader turns that into `CorruptRecord` with the record's coordinates.
pub fn decode(field: &str, json: &Json, kind: &FieldKind) -> Result<Value, CoreError> {
    check_supported(kind)?;
    let mismatch = || CoreError::TypeMismatch {
        field: field.to_string(),
        expected: kind.to_string(),
        found: json_type_name(json).to_string(),
    };

    let value = match kind {
        FieldKind::Boolean => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
        FieldKind::Integer => Value::Int(json.as_i64().ok_or_else(mismatch)?),
        FieldKind::Float => Value::Float(json.as_f64().ok_or_else(mismatch)?),
        FieldKind::String => Value::Str(json.as_str().ok_or_else(mismatch)?.to_string()),
        FieldKind::DateTime => Value::DateTime(decode_datetime(field, json).ok_or_else(mismatch)?),
        FieldKind::Path => Value::Path(PathBuf::from(json.as_str().ok_or_else(mismatch)?)),
        FieldKind::List(inner) => Value::List(
            json.as_array()
                .ok_or_else(mismatch)?
                .iter()
                .map(|item| decode(field, item, inner))
                .collect::<Result<_, _>>()?,
        ),
        FieldKind::Reference(_) | FieldKind::Many { .. } | FieldKind::Custom(_) => {
            return Err(CoreError::UnsupportedType {
                kind: kind.to_string(),
            })
        }
    };
    Ok(value)
}

fn check_supported(kind: &FieldKind) -> Result<(), CoreError> {
    match kind {
        FieldKind::Custom(_) | FieldKind::Reference(_) | FieldKind::Many { .. } => {
            Err(CoreError::UnsupportedType {
                kind: kind.to_string(),
            })
        }
        FieldKind::List(inner) => check_supported(inner),
        _ => Ok(()),
    }
}

/// RFC 3339 strings, or a numeric Unix timestamp as written by older files.
fn decode_datetime(field: &str, json: &Json) -> Option<DateTime<Utc>> {
    match json {
        Json::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok(),
        Json::Number(n) => {
            let ts = n.as_f64()?;
            let secs = ts.floor();
            let nanos = ((ts - secs) * 1e9).round() as u32;
            tracing::trace!(field, ts, "decoding legacy numeric timestamp");
            DateTime::from_timestamp(secs as i64, nanos.min(999_999_999))
        }
        _ => None,
    }
}

#[cfg(windows)]
fn neutral_path(s: &str) -> String {
    s.replace('\\', "/")
}

#[cfg(not(windows))]
fn neutral_path(s: &str) -> String {
    s.to_string()
}

pub(crate) fn json_type_name(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(n) if n.is_f64() => "float",
        Json::Number(_) => "integer",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use serde_json::json;

    fn roundtrip(value: Value, kind: FieldKind) -> Value {
        let json = encode("f", &value, &kind).unwrap();
        decode("f", &json, &kind).unwrap()
    }

    #[test]
    fn test_scalar_storage_forms() {
        assert_eq!(encode("f", &Value::from(42), &FieldKind::Integer).unwrap(), json!(42));
        assert_eq!(encode("f", &Value::from(true), &FieldKind::Boolean).unwrap(), json!(true));
        assert_eq!(encode("f", &Value::from("hi"), &FieldKind::String).unwrap(), json!("hi"));
        assert_eq!(encode("f", &Value::from(2.5), &FieldKind::Float).unwrap(), json!(2.5));
    }

    #[test]
    fn test_datetime_is_rfc3339() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let json = encode("when", &Value::from(dt), &FieldKind::DateTime).unwrap();
        assert_eq!(json, json!("2024-03-01T12:30:00Z"));
        assert_eq!(roundtrip(Value::from(dt), FieldKind::DateTime), Value::from(dt));
    }

    #[test]
    fn test_datetime_accepts_offsets_and_legacy_timestamps() {
        let decoded = decode("when", &json!("2024-03-01T14:30:00+02:00"), &FieldKind::DateTime).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(decoded, Value::from(expected));

        let legacy = decode("when", &json!(1709296200.5), &FieldKind::DateTime).unwrap();
        let dt = legacy.as_datetime().unwrap();
        assert_eq!(dt.timestamp(), 1_709_296_200);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_path_roundtrip() {
        let path = PathBuf::from("notes/2024/todo.md");
        let json = encode("file", &Value::from(path.clone()), &FieldKind::Path).unwrap();
        assert_eq!(json, json!("notes/2024/todo.md"));
        assert_eq!(roundtrip(Value::from(path.clone()), FieldKind::Path), Value::from(path));
    }

    #[test]
    fn test_list_roundtrip() {
        let kind = FieldKind::list_of(FieldKind::String);
        let value = Value::from(vec!["a", "b", "a"]);
        assert_eq!(encode("l", &value, &kind).unwrap(), json!(["a", "b", "a"]));
        assert_eq!(roundtrip(value.clone(), kind), value);
    }

    #[test]
    fn test_custom_kind_is_unsupported() {
        let kind = FieldKind::Custom("Decimal".into());
        assert!(matches!(
            encode("price", &Value::from("1.00"), &kind),
            Err(CoreError::UnsupportedType { .. })
        ));
        assert!(matches!(
            decode("price", &json!("1.00"), &kind),
            Err(CoreError::UnsupportedType { .. })
        ));
        assert!(matches!(
            decode("prices", &json!([]), &FieldKind::list_of(kind)),
            Err(CoreError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_relationship_kinds_have_no_transcoder() {
        assert!(matches!(
            decode("owner", &json!(null), &FieldKind::reference("A")),
            Err(CoreError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_mismatches() {
        assert!(matches!(
            encode("n", &Value::from("3"), &FieldKind::Integer),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            decode("n", &json!("3"), &FieldKind::Integer),
            Err(CoreError::TypeMismatch { .. })
        ));
        assert!(matches!(
            decode("n", &json!(1.5), &FieldKind::Integer),
            Err(CoreError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(matches!(
            encode("x", &Value::from(f64::NAN), &FieldKind::Float),
            Err(CoreError::InvalidValue { .. })
        ));
    }

    proptest! {
        #[test]
        fn prop_integer_roundtrip(i in any::<i64>()) {
            prop_assert_eq!(roundtrip(Value::from(i), FieldKind::Integer), Value::from(i));
        }

        #[test]
        fn prop_string_roundtrip(s in ".*") {
            prop_assert_eq!(roundtrip(Value::from(s.clone()), FieldKind::String), Value::from(s));
        }

        #[test]
        fn prop_float_roundtrip(f in any::<f64>().prop_filter("finite", |f| f.is_finite())) {
            prop_assert_eq!(roundtrip(Value::from(f), FieldKind::Float), Value::from(f));
        }

        #[test]
        fn prop_datetime_roundtrip(secs in 0i64..250_000_000_000i64, nanos in 0u32..1_000_000_000u32) {
            let dt = DateTime::from_timestamp(secs, nanos).unwrap();
            prop_assert_eq!(roundtrip(Value::from(dt), FieldKind::DateTime), Value::from(dt));
        }
    }
}
