// Value conversions
// Coerces incoming values into the native representation a storage keeps.
// Every function takes the value by value and the target code for error reporting.

use super::text;
use super::{Uri, Value};
use crate::error::{Result, StorageError};
use crate::registry::{RuntimeType, StorageType};
use crate::storage::table::ColumnMeta;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

fn fail(value: &Value, target: StorageType, reason: &str) -> StorageError {
    StorageError::conversion(value, target, reason)
}

impl Value {
    /// Integral view of booleans, chars and every integer variant.
    fn integral(&self) -> Option<i128> {
        match *self {
            Value::Boolean(v) | Value::SqlBoolean(Some(v)) => Some(i128::from(v)),
            Value::Char(v) => Some(i128::from(u32::from(v))),
            Value::SByte(v) => Some(i128::from(v)),
            Value::Byte(v) | Value::SqlByte(Some(v)) => Some(i128::from(v)),
            Value::Int16(v) | Value::SqlInt16(Some(v)) => Some(i128::from(v)),
            Value::UInt16(v) => Some(i128::from(v)),
            Value::Int32(v) | Value::SqlInt32(Some(v)) => Some(i128::from(v)),
            Value::UInt32(v) => Some(i128::from(v)),
            Value::Int64(v) | Value::SqlInt64(Some(v)) => Some(i128::from(v)),
            Value::UInt64(v) => Some(i128::from(v)),
            _ => None,
        }
    }

    fn float(&self) -> Option<f64> {
        match *self {
            Value::Single(v) | Value::SqlSingle(Some(v)) => Some(f64::from(v)),
            Value::Double(v) | Value::SqlDouble(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn decimal(&self) -> Option<Decimal> {
        match *self {
            Value::Decimal(v) | Value::SqlDecimal(Some(v)) | Value::SqlMoney(Some(v)) => Some(v),
            _ => None,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::SqlString(Some(s)) => Some(s),
            _ => None,
        }
    }
}

pub(crate) fn to_integral<T>(value: Value, target: StorageType, column: &ColumnMeta) -> Result<T>
where
    T: TryFrom<i128> + FromStr,
{
    if let Some(i) = value.integral() {
        return T::try_from(i).map_err(|_| fail(&value, target, "value out of range"));
    }
    if let Some(f) = value.float() {
        if !f.is_finite() {
            return Err(fail(&value, target, "not a finite number"));
        }
        // `as` saturates, so anything beyond i128 fails the narrowing below.
        return T::try_from(f.round_ties_even() as i128)
            .map_err(|_| fail(&value, target, "value out of range"));
    }
    if let Some(d) = value.decimal() {
        return d
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_i128()
            .and_then(|i| T::try_from(i).ok())
            .ok_or_else(|| fail(&value, target, "value out of range"));
    }
    if let Some(s) = value.text() {
        let normalized = column.culture().normalize_number(s);
        return normalized
            .parse::<T>()
            .map_err(|_| fail(&value, target, "not an integer"));
    }
    Err(fail(&value, target, "incompatible type"))
}

pub(crate) fn to_f64(value: Value, target: StorageType, column: &ColumnMeta) -> Result<f64> {
    if let Some(i) = value.integral() {
        return Ok(i as f64);
    }
    if let Some(f) = value.float() {
        return Ok(f);
    }
    if let Some(d) = value.decimal() {
        return d
            .to_f64()
            .ok_or_else(|| fail(&value, target, "value out of range"));
    }
    if let Some(s) = value.text() {
        let normalized = column.culture().normalize_number(s);
        return text::parse_f64(&normalized).ok_or_else(|| fail(&value, target, "not a number"));
    }
    Err(fail(&value, target, "incompatible type"))
}

/// Finite values too large for single precision are rejected rather than
/// saturated to infinity; specials pass through.
pub(crate) fn to_f32(value: Value, target: StorageType, column: &ColumnMeta) -> Result<f32> {
    let wide = to_f64(value, target, column)?;
    let narrow = wide as f32;
    if wide.is_finite() && !narrow.is_finite() {
        return Err(fail(&Value::Double(wide), target, "value out of range"));
    }
    Ok(narrow)
}

pub(crate) fn to_decimal(value: Value, target: StorageType, column: &ColumnMeta) -> Result<Decimal> {
    if let Some(i) = value.integral() {
        return Decimal::try_from_i128_with_scale(i, 0)
            .map_err(|_| fail(&value, target, "value out of range"));
    }
    if let Some(f) = value.float() {
        return Decimal::from_f64(f).ok_or_else(|| fail(&value, target, "value out of range"));
    }
    if let Some(d) = value.decimal() {
        return Ok(d);
    }
    if let Some(s) = value.text() {
        let normalized = column.culture().normalize_number(s);
        return Decimal::from_str(&normalized)
            .or_else(|_| Decimal::from_scientific(&normalized))
            .map_err(|_| fail(&value, target, "not a decimal number"));
    }
    Err(fail(&value, target, "incompatible type"))
}

/// Money keeps four fractional digits.
pub(crate) fn to_money(value: Value, target: StorageType, column: &ColumnMeta) -> Result<Decimal> {
    to_decimal(value, target, column).map(|d| d.round_dp(4))
}

pub(crate) fn to_bool(value: Value, target: StorageType, _column: &ColumnMeta) -> Result<bool> {
    match value {
        Value::Boolean(v) | Value::SqlBoolean(Some(v)) => return Ok(v),
        Value::String(ref s) | Value::SqlString(Some(ref s)) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                return Ok(true);
            }
            if s.eq_ignore_ascii_case("false") {
                return Ok(false);
            }
            return Err(fail(&value, target, "not a boolean"));
        }
        _ => {}
    }
    if let Some(i) = value.integral() {
        return Ok(i != 0);
    }
    if let Some(f) = value.float() {
        return Ok(f != 0.0);
    }
    if let Some(d) = value.decimal() {
        return Ok(!d.is_zero());
    }
    Err(fail(&value, target, "incompatible type"))
}

pub(crate) fn to_char(value: Value, target: StorageType, _column: &ColumnMeta) -> Result<char> {
    if let Value::Char(c) = value {
        return Ok(c);
    }
    if let Some(s) = value.text() {
        let mut chars = s.chars();
        return match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(fail(&value, target, "expected exactly one character")),
        };
    }
    if matches!(value, Value::Boolean(_) | Value::SqlBoolean(_)) {
        return Err(fail(&value, target, "incompatible type"));
    }
    if let Some(i) = value.integral() {
        return u32::try_from(i)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| fail(&value, target, "not a valid character code"));
    }
    Err(fail(&value, target, "incompatible type"))
}

pub(crate) fn to_string(value: Value, _target: StorageType, column: &ColumnMeta) -> Result<String> {
    let culture = column.culture();
    Ok(match value {
        Value::String(s) | Value::SqlString(Some(s)) => s,
        Value::CharArray(chars) | Value::SqlChars(Some(chars)) => chars.into_iter().collect(),
        Value::Single(_) | Value::Double(_) | Value::Decimal(_) => {
            culture.format_number(&value.to_string())
        }
        Value::SqlSingle(Some(_)) | Value::SqlDouble(Some(_)) | Value::SqlDecimal(Some(_)) => {
            culture.format_number(&value.to_string())
        }
        Value::SqlMoney(Some(_)) => culture.format_number(&value.to_string()),
        Value::DateTime(dt) | Value::SqlDateTime(Some(dt)) => text::format_date_time(dt, column),
        Value::DateTimeOffset(dto) => text::format_date_time_offset(dto),
        Value::TimeSpan(span) => text::format_duration(span),
        Value::ByteArray(bytes) | Value::SqlBinary(Some(bytes)) | Value::SqlBytes(Some(bytes)) => {
            text::base64_encode(&bytes)
        }
        Value::Object(ref object) => match object.get().to_xml() {
            Some(text) => text,
            None => return Err(fail(&value, StorageType::String, "opaque value has no text form")),
        },
        other => other.to_string(),
    })
}

pub(crate) fn to_date_time(
    value: Value,
    target: StorageType,
    column: &ColumnMeta,
) -> Result<PrimitiveDateTime> {
    match value {
        Value::DateTime(dt) | Value::SqlDateTime(Some(dt)) => Ok(dt),
        Value::DateTimeOffset(dto) => Ok(text::normalize_date_time(dto, column)),
        Value::String(ref s) | Value::SqlString(Some(ref s)) => text::parse_date_time(s, column)
            .ok_or_else(|| fail(&value, target, "not an ISO-8601 date-time")),
        _ => Err(fail(&value, target, "incompatible type")),
    }
}

/// Integers are taken as 100-nanosecond ticks.
pub(crate) fn to_time_span(value: Value, target: StorageType, _column: &ColumnMeta) -> Result<Duration> {
    if let Value::TimeSpan(span) = value {
        return Ok(span);
    }
    if let Some(s) = value.text() {
        return text::parse_duration(s).ok_or_else(|| fail(&value, target, "not an ISO-8601 duration"));
    }
    if !matches!(value, Value::Boolean(_) | Value::Char(_)) {
        if let Some(ticks) = value.integral() {
            return ticks
                .checked_mul(100)
                .and_then(text::duration_from_nanos)
                .ok_or_else(|| fail(&value, target, "value out of range"));
        }
    }
    Err(fail(&value, target, "incompatible type"))
}

pub(crate) fn to_guid(value: Value, target: StorageType, _column: &ColumnMeta) -> Result<Uuid> {
    match value {
        Value::Guid(g) | Value::SqlGuid(Some(g)) => Ok(g),
        Value::String(ref s) | Value::SqlString(Some(ref s)) => {
            Uuid::parse_str(s.trim()).map_err(|_| fail(&value, target, "not a GUID"))
        }
        Value::ByteArray(ref bytes) => {
            Uuid::from_slice(bytes).map_err(|_| fail(&value, target, "GUIDs are 16 bytes"))
        }
        _ => Err(fail(&value, target, "incompatible type")),
    }
}

pub(crate) fn to_bytes(value: Value, target: StorageType, _column: &ColumnMeta) -> Result<Vec<u8>> {
    match value {
        Value::ByteArray(bytes) | Value::SqlBinary(Some(bytes)) | Value::SqlBytes(Some(bytes)) => {
            Ok(bytes)
        }
        Value::Guid(g) | Value::SqlGuid(Some(g)) => Ok(g.as_bytes().to_vec()),
        _ => Err(fail(&value, target, "incompatible type")),
    }
}

pub(crate) fn to_chars(value: Value, target: StorageType, _column: &ColumnMeta) -> Result<Vec<char>> {
    match value {
        Value::CharArray(chars) | Value::SqlChars(Some(chars)) => Ok(chars),
        Value::String(s) | Value::SqlString(Some(s)) => Ok(s.chars().collect()),
        Value::Char(c) => Ok(vec![c]),
        _ => Err(fail(&value, target, "incompatible type")),
    }
}

pub(crate) fn to_type(value: Value, target: StorageType, _column: &ColumnMeta) -> Result<RuntimeType> {
    match value {
        Value::Type(ref t) if t.qualified_name().is_none() => {
            Err(fail(&value, target, "custom types have no text form"))
        }
        Value::Type(t) => Ok(t),
        Value::String(ref s) => RuntimeType::from_qualified_name(s)
            .ok_or_else(|| fail(&value, target, "unknown type name")),
        _ => Err(fail(&value, target, "incompatible type")),
    }
}

pub(crate) fn to_date_time_offset(
    value: Value,
    target: StorageType,
    column: &ColumnMeta,
) -> Result<OffsetDateTime> {
    match value {
        Value::DateTimeOffset(dto) => Ok(dto),
        Value::DateTime(dt) | Value::SqlDateTime(Some(dt)) => Ok(text::attach_offset(dt, column)),
        Value::String(ref s) | Value::SqlString(Some(ref s)) => text::parse_date_time_offset(s)
            .ok_or_else(|| fail(&value, target, "not an ISO-8601 date-time with offset")),
        _ => Err(fail(&value, target, "incompatible type")),
    }
}

pub(crate) fn to_uri(value: Value, target: StorageType, _column: &ColumnMeta) -> Result<Uri> {
    match value {
        Value::Uri(uri) => Ok(uri),
        Value::String(ref s) | Value::SqlString(Some(ref s)) => {
            Uri::parse(s).ok_or_else(|| fail(&value, target, "not an absolute URI"))
        }
        _ => Err(fail(&value, target, "incompatible type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Culture, DateTimeMode};
    use crate::registry::BuiltinType;
    use time::macros::datetime;

    fn column() -> ColumnMeta {
        ColumnMeta::detached("c", BuiltinType::Object.into())
    }

    #[test]
    fn test_integral_narrowing_is_checked() {
        let c = column();
        assert_eq!(to_integral::<i8>(Value::Int32(-128), StorageType::SByte, &c).unwrap(), -128);
        assert!(to_integral::<i8>(Value::Int32(128), StorageType::SByte, &c).is_err());
        assert!(to_integral::<u16>(Value::Int64(-1), StorageType::UInt16, &c).is_err());
        assert_eq!(to_integral::<i64>(Value::SqlInt32(Some(9)), StorageType::Int64, &c).unwrap(), 9);
    }

    #[test]
    fn test_float_to_integer_rounds_half_to_even() {
        let c = column();
        assert_eq!(to_integral::<i32>(Value::Double(2.5), StorageType::Int32, &c).unwrap(), 2);
        assert_eq!(to_integral::<i32>(Value::Double(3.5), StorageType::Int32, &c).unwrap(), 4);
        assert!(to_integral::<i32>(Value::Double(f64::NAN), StorageType::Int32, &c).is_err());
        let d = Decimal::new(-25, 1);
        assert_eq!(to_integral::<i32>(Value::Decimal(d), StorageType::Int32, &c).unwrap(), -2);
    }

    #[test]
    fn test_text_parsing_honours_culture() {
        let c = column();
        c.table().set_culture(Culture {
            decimal_separator: ',',
            group_separator: Some('.'),
        });
        assert_eq!(to_f64(Value::from("1.234,5"), StorageType::Double, &c).unwrap(), 1234.5);
        assert_eq!(
            to_decimal(Value::from("0,25"), StorageType::Decimal, &c).unwrap(),
            Decimal::new(25, 2)
        );
        assert_eq!(to_string(Value::Double(0.5), StorageType::String, &c).unwrap(), "0,5");
    }

    #[test]
    fn test_unparsable_text_is_a_conversion_error() {
        let c = column();
        let err = to_integral::<i32>(Value::from("forty-two"), StorageType::Int32, &c).unwrap_err();
        assert!(matches!(err, StorageError::Conversion { target: StorageType::Int32, .. }));
        assert!(to_bool(Value::from("yes"), StorageType::Boolean, &c).is_err());
        assert!(to_char(Value::from("ab"), StorageType::Char, &c).is_err());
    }

    #[test]
    fn test_time_span_from_ticks() {
        let c = column();
        assert_eq!(
            to_time_span(Value::Int64(10_000_000), StorageType::TimeSpan, &c).unwrap(),
            Duration::seconds(1)
        );
    }

    #[test]
    fn test_date_time_offset_into_utc_column() {
        let c = ColumnMeta::detached("when", BuiltinType::DateTime.into());
        c.set_date_time_mode(DateTimeMode::Utc);
        let dto = datetime!(2024-01-01 09:00 +03:00);
        assert_eq!(
            to_date_time(Value::DateTimeOffset(dto), StorageType::DateTime, &c).unwrap(),
            datetime!(2024-01-01 06:00)
        );
        c.set_date_time_mode(DateTimeMode::Unspecified);
        assert_eq!(
            to_date_time(Value::DateTimeOffset(dto), StorageType::DateTime, &c).unwrap(),
            datetime!(2024-01-01 09:00)
        );
    }

    #[test]
    fn test_money_rounds_to_four_places() {
        let c = column();
        let money = to_money(Value::Double(1.23456), StorageType::SqlMoney, &c).unwrap();
        assert_eq!(money, Decimal::new(12346, 4));
    }

    #[test]
    fn test_single_precision_rejects_overflow() {
        let c = column();
        assert!(matches!(
            to_f32(Value::Double(1e300), StorageType::Single, &c),
            Err(StorageError::Conversion { target: StorageType::Single, .. })
        ));
        assert!(to_f32(Value::from("-3.5e39"), StorageType::SqlSingle, &c).is_err());
        assert_eq!(to_f32(Value::Double(f64::NEG_INFINITY), StorageType::Single, &c).unwrap(), f32::NEG_INFINITY);
        assert_eq!(to_f32(Value::Double(f64::from(f32::MAX)), StorageType::Single, &c).unwrap(), f32::MAX);
    }

    #[test]
    fn test_type_values_need_a_text_form() {
        let c = column();
        let point = crate::registry::CustomType::new("Point").into_type();
        assert!(matches!(
            to_type(Value::Type(point.clone()), StorageType::Type, &c),
            Err(StorageError::Conversion { target: StorageType::Type, .. })
        ));
        assert!(to_type(Value::Type(RuntimeType::nullable(point)), StorageType::Type, &c).is_err());
        let color = RuntimeType::enumeration("Color", BuiltinType::Byte);
        assert_eq!(to_type(Value::Type(color.clone()), StorageType::Type, &c).unwrap(), color);
        assert_eq!(
            to_type(Value::from("Nullable<Int32>"), StorageType::Type, &c).unwrap(),
            RuntimeType::nullable(BuiltinType::Int32.into())
        );
    }
}
