// Native kinds
// Per-type knowledge the generic typed storage needs: which Rust type backs a
// storage code, how values convert in and out, ordering, XML text and numeric view

use crate::error::{Result, StorageError};
use crate::registry::{BuiltinType, RuntimeType, StorageType};
use crate::storage::table::ColumnMeta;
use crate::value::{convert, text, Uri, Value};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use time::macros::datetime;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

/// Numeric view of a stored value, grouped by accumulation family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Number {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Decimal(Decimal),
    Span(Duration),
}

/// A Rust type that can live in a storage's backing array.
pub(crate) trait NativeItem: Clone + fmt::Debug + 'static {
    /// Whether values of this type have a natural ordering (Min/Max support).
    const ORDERED: bool = true;
    /// Whether Sum/Mean apply.
    const NUMERIC: bool = false;

    fn natural_cmp(&self, other: &Self, column: &ColumnMeta) -> Option<Ordering>;

    fn to_xml(&self, column: &ColumnMeta) -> String;

    fn from_xml(text: &str, column: &ColumnMeta) -> Result<Self, String>;

    fn to_number(&self) -> Option<Number> {
        None
    }

    fn from_number(_number: Number) -> Option<Self> {
        None
    }

    /// Length in UTF-16 code units, for the string family only.
    fn text_len(&self) -> Option<usize> {
        None
    }
}

macro_rules! integer_items {
    ($($t:ty => $family:ident),* $(,)?) => {$(
        impl NativeItem for $t {
            const NUMERIC: bool = true;

            fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
                Some(self.cmp(other))
            }

            fn to_xml(&self, _column: &ColumnMeta) -> String {
                self.to_string()
            }

            fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
                text.trim().parse::<$t>().map_err(|e| e.to_string())
            }

            fn to_number(&self) -> Option<Number> {
                Some(Number::$family((*self).into()))
            }

            fn from_number(number: Number) -> Option<Self> {
                match number {
                    Number::$family(v) => <$t>::try_from(v).ok(),
                    _ => None,
                }
            }
        }
    )*};
}

integer_items!(
    i8 => Signed,
    i16 => Signed,
    i32 => Signed,
    i64 => Signed,
    u8 => Unsigned,
    u16 => Unsigned,
    u32 => Unsigned,
    u64 => Unsigned,
);

/// NaN sorts before every other value and equal to itself.
fn float_cmp(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b)
        .unwrap_or_else(|| b.is_nan().cmp(&a.is_nan()))
}

impl NativeItem for f64 {
    const NUMERIC: bool = true;

    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(float_cmp(*self, *other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        text::format_f64(*self)
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        text::parse_f64(text).ok_or_else(|| "not a number".to_string())
    }

    fn to_number(&self) -> Option<Number> {
        Some(Number::Float(*self))
    }

    fn from_number(number: Number) -> Option<Self> {
        match number {
            Number::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl NativeItem for f32 {
    const NUMERIC: bool = true;

    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(float_cmp(f64::from(*self), f64::from(*other)))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        text::format_f32(*self)
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        text::parse_f32(text).ok_or_else(|| "not a number".to_string())
    }

    fn to_number(&self) -> Option<Number> {
        Some(Number::Float(f64::from(*self)))
    }

    fn from_number(number: Number) -> Option<Self> {
        match number {
            Number::Float(v) => Some(v as f32),
            _ => None,
        }
    }
}

impl NativeItem for Decimal {
    const NUMERIC: bool = true;

    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        self.to_string()
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        Decimal::from_str(text.trim()).map_err(|e| e.to_string())
    }

    fn to_number(&self) -> Option<Number> {
        Some(Number::Decimal(*self))
    }

    fn from_number(number: Number) -> Option<Self> {
        match number {
            Number::Decimal(v) => Some(v),
            _ => None,
        }
    }
}

impl NativeItem for bool {
    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        self.to_string()
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        match text.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(format!("'{}' is not a boolean", other)),
        }
    }
}

impl NativeItem for char {
    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        self.to_string()
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err("expected exactly one character".to_string()),
        }
    }
}

impl NativeItem for PrimitiveDateTime {
    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, column: &ColumnMeta) -> String {
        text::format_date_time(*self, column)
    }

    fn from_xml(text: &str, column: &ColumnMeta) -> Result<Self, String> {
        text::parse_date_time(text, column).ok_or_else(|| "not an ISO-8601 date-time".to_string())
    }
}

impl NativeItem for Duration {
    const NUMERIC: bool = true;

    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        text::format_duration(*self)
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        text::parse_duration(text).ok_or_else(|| "not an ISO-8601 duration".to_string())
    }

    fn to_number(&self) -> Option<Number> {
        Some(Number::Span(*self))
    }

    fn from_number(number: Number) -> Option<Self> {
        match number {
            Number::Span(v) => Some(v),
            _ => None,
        }
    }
}

impl NativeItem for OffsetDateTime {
    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        text::format_date_time_offset(*self)
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        text::parse_date_time_offset(text)
            .ok_or_else(|| "not an ISO-8601 date-time with offset".to_string())
    }
}

impl NativeItem for String {
    /// Honours the table's case sensitivity, read on every call.
    fn natural_cmp(&self, other: &Self, column: &ColumnMeta) -> Option<Ordering> {
        if column.case_sensitive() {
            Some(self.cmp(other))
        } else {
            let left = self.chars().flat_map(char::to_lowercase);
            let right = other.chars().flat_map(char::to_lowercase);
            Some(left.cmp(right))
        }
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        self.clone()
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        Ok(text.to_string())
    }

    fn text_len(&self) -> Option<usize> {
        Some(self.encode_utf16().count())
    }
}

impl NativeItem for Uuid {
    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        self.hyphenated().to_string()
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        Uuid::parse_str(text.trim()).map_err(|e| e.to_string())
    }
}

impl NativeItem for Vec<u8> {
    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        text::base64_encode(self)
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        text::base64_decode(text).ok_or_else(|| "not valid base64".to_string())
    }
}

impl NativeItem for Vec<char> {
    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        self.iter().collect()
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        Ok(text.chars().collect())
    }
}

impl NativeItem for RuntimeType {
    const ORDERED: bool = false;

    fn natural_cmp(&self, _other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        None
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        self.qualified_name().unwrap_or_else(|| self.to_string())
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        RuntimeType::from_qualified_name(text).ok_or_else(|| format!("unknown type '{}'", text))
    }
}

impl NativeItem for Uri {
    fn natural_cmp(&self, other: &Self, _column: &ColumnMeta) -> Option<Ordering> {
        Some(self.cmp(other))
    }

    fn to_xml(&self, _column: &ColumnMeta) -> String {
        self.as_str().to_string()
    }

    fn from_xml(text: &str, _column: &ColumnMeta) -> Result<Self, String> {
        text.parse()
    }
}

/// SQL-nullable payloads: `None` is the value's own null and sorts first.
impl<T: NativeItem> NativeItem for Option<T> {
    const ORDERED: bool = T::ORDERED;
    const NUMERIC: bool = T::NUMERIC;

    fn natural_cmp(&self, other: &Self, column: &ColumnMeta) -> Option<Ordering> {
        match (self, other) {
            (Some(a), Some(b)) => a.natural_cmp(b, column),
            (None, None) => Some(Ordering::Equal),
            (None, Some(_)) => Some(Ordering::Less),
            (Some(_), None) => Some(Ordering::Greater),
        }
    }

    fn to_xml(&self, column: &ColumnMeta) -> String {
        self.as_ref().map(|v| v.to_xml(column)).unwrap_or_default()
    }

    fn from_xml(text: &str, column: &ColumnMeta) -> Result<Self, String> {
        T::from_xml(text, column).map(Some)
    }

    fn to_number(&self) -> Option<Number> {
        self.as_ref().and_then(T::to_number)
    }

    fn from_number(number: Number) -> Option<Self> {
        T::from_number(number).map(Some)
    }

    fn text_len(&self) -> Option<usize> {
        self.as_ref().and_then(T::text_len)
    }
}

/// Binds a storage type code to its backing Rust type and conversion.
pub(crate) trait NativeKind: 'static {
    type Item: NativeItem;
    const CODE: StorageType;

    fn wrap(item: Self::Item) -> Value;

    fn unwrap(value: Value, column: &ColumnMeta) -> Result<Self::Item>;

    /// Filler for unset slots; also the storage's default value.
    fn default_item() -> Self::Item;

    fn null_value() -> Value {
        Value::DbNull
    }
}

macro_rules! native_kinds {
    ($($kind:ident: $code:ident($item:ty) = $default:expr, $convert:expr;)*) => {$(
        pub(crate) struct $kind;

        impl NativeKind for $kind {
            type Item = $item;
            const CODE: StorageType = StorageType::$code;

            fn wrap(item: $item) -> Value {
                Value::$code(item)
            }

            fn unwrap(value: Value, column: &ColumnMeta) -> Result<$item> {
                ($convert)(value, Self::CODE, column)
            }

            fn default_item() -> $item {
                $default
            }
        }
    )*};
}

macro_rules! sql_kinds {
    ($($kind:ident: $code:ident($item:ty), $convert:expr;)*) => {$(
        pub(crate) struct $kind;

        impl NativeKind for $kind {
            type Item = Option<$item>;
            const CODE: StorageType = StorageType::$code;

            fn wrap(item: Option<$item>) -> Value {
                Value::$code(item)
            }

            fn unwrap(value: Value, column: &ColumnMeta) -> Result<Option<$item>> {
                ($convert)(value, Self::CODE, column).map(Some)
            }

            fn default_item() -> Option<$item> {
                None
            }

            fn null_value() -> Value {
                Value::$code(None)
            }
        }
    )*};
}

native_kinds! {
    BooleanKind: Boolean(bool) = false, convert::to_bool;
    CharKind: Char(char) = '\0', convert::to_char;
    SByteKind: SByte(i8) = 0, convert::to_integral::<i8>;
    ByteKind: Byte(u8) = 0, convert::to_integral::<u8>;
    Int16Kind: Int16(i16) = 0, convert::to_integral::<i16>;
    UInt16Kind: UInt16(u16) = 0, convert::to_integral::<u16>;
    Int32Kind: Int32(i32) = 0, convert::to_integral::<i32>;
    UInt32Kind: UInt32(u32) = 0, convert::to_integral::<u32>;
    Int64Kind: Int64(i64) = 0, convert::to_integral::<i64>;
    UInt64Kind: UInt64(u64) = 0, convert::to_integral::<u64>;
    SingleKind: Single(f32) = 0.0, convert::to_f32;
    DoubleKind: Double(f64) = 0.0, convert::to_f64;
    DecimalKind: Decimal(Decimal) = Decimal::ZERO, convert::to_decimal;
    DateTimeKind: DateTime(PrimitiveDateTime) = datetime!(0001-01-01 0:00), convert::to_date_time;
    TimeSpanKind: TimeSpan(Duration) = Duration::ZERO, convert::to_time_span;
    StringKind: String(String) = String::new(), convert::to_string;
    GuidKind: Guid(Uuid) = Uuid::nil(), convert::to_guid;
    ByteArrayKind: ByteArray(Vec<u8>) = Vec::new(), convert::to_bytes;
    CharArrayKind: CharArray(Vec<char>) = Vec::new(), convert::to_chars;
    TypeKind: Type(RuntimeType) = RuntimeType::Builtin(BuiltinType::Object), convert::to_type;
    DateTimeOffsetKind: DateTimeOffset(OffsetDateTime) = datetime!(0001-01-01 0:00 UTC), convert::to_date_time_offset;
    UriKind: Uri(Uri) = Uri::placeholder(), convert::to_uri;
}

sql_kinds! {
    SqlBinaryKind: SqlBinary(Vec<u8>), convert::to_bytes;
    SqlBooleanKind: SqlBoolean(bool), convert::to_bool;
    SqlByteKind: SqlByte(u8), convert::to_integral::<u8>;
    SqlBytesKind: SqlBytes(Vec<u8>), convert::to_bytes;
    SqlCharsKind: SqlChars(Vec<char>), convert::to_chars;
    SqlDateTimeKind: SqlDateTime(PrimitiveDateTime), convert::to_date_time;
    SqlDecimalKind: SqlDecimal(Decimal), convert::to_decimal;
    SqlDoubleKind: SqlDouble(f64), convert::to_f64;
    SqlGuidKind: SqlGuid(Uuid), convert::to_guid;
    SqlInt16Kind: SqlInt16(i16), convert::to_integral::<i16>;
    SqlInt32Kind: SqlInt32(i32), convert::to_integral::<i32>;
    SqlInt64Kind: SqlInt64(i64), convert::to_integral::<i64>;
    SqlMoneyKind: SqlMoney(Decimal), convert::to_money;
    SqlSingleKind: SqlSingle(f32), convert::to_f32;
    SqlStringKind: SqlString(String), convert::to_string;
}

/// Runs `$body` with `$k` bound to the native kind for `$code`; codes without a
/// native kind (`Empty`, `Object`, `DbNull`) evaluate `$fallback`.
macro_rules! with_native_kind {
    ($code:expr, $k:ident => $body:expr, _ => $fallback:expr) => {{
        use $crate::registry::StorageType as St;
        use $crate::storage::native::*;
        match $code {
            St::Boolean => { type $k = BooleanKind; $body }
            St::Char => { type $k = CharKind; $body }
            St::SByte => { type $k = SByteKind; $body }
            St::Byte => { type $k = ByteKind; $body }
            St::Int16 => { type $k = Int16Kind; $body }
            St::UInt16 => { type $k = UInt16Kind; $body }
            St::Int32 => { type $k = Int32Kind; $body }
            St::UInt32 => { type $k = UInt32Kind; $body }
            St::Int64 => { type $k = Int64Kind; $body }
            St::UInt64 => { type $k = UInt64Kind; $body }
            St::Single => { type $k = SingleKind; $body }
            St::Double => { type $k = DoubleKind; $body }
            St::Decimal => { type $k = DecimalKind; $body }
            St::DateTime => { type $k = DateTimeKind; $body }
            St::TimeSpan => { type $k = TimeSpanKind; $body }
            St::String => { type $k = StringKind; $body }
            St::Guid => { type $k = GuidKind; $body }
            St::ByteArray => { type $k = ByteArrayKind; $body }
            St::CharArray => { type $k = CharArrayKind; $body }
            St::Type => { type $k = TypeKind; $body }
            St::DateTimeOffset => { type $k = DateTimeOffsetKind; $body }
            St::Uri => { type $k = UriKind; $body }
            St::SqlBinary => { type $k = SqlBinaryKind; $body }
            St::SqlBoolean => { type $k = SqlBooleanKind; $body }
            St::SqlByte => { type $k = SqlByteKind; $body }
            St::SqlBytes => { type $k = SqlBytesKind; $body }
            St::SqlChars => { type $k = SqlCharsKind; $body }
            St::SqlDateTime => { type $k = SqlDateTimeKind; $body }
            St::SqlDecimal => { type $k = SqlDecimalKind; $body }
            St::SqlDouble => { type $k = SqlDoubleKind; $body }
            St::SqlGuid => { type $k = SqlGuidKind; $body }
            St::SqlInt16 => { type $k = SqlInt16Kind; $body }
            St::SqlInt32 => { type $k = SqlInt32Kind; $body }
            St::SqlInt64 => { type $k = SqlInt64Kind; $body }
            St::SqlMoney => { type $k = SqlMoneyKind; $body }
            St::SqlSingle => { type $k = SqlSingleKind; $body }
            St::SqlString => { type $k = SqlStringKind; $body }
            St::Empty | St::Object | St::DbNull => $fallback,
        }
    }};
}

pub(crate) use with_native_kind;

/// Converts `value` into the representation storage code `code` keeps.
/// Codes without a native kind accept any value unchanged.
pub(crate) fn coerce(code: StorageType, value: Value, column: &ColumnMeta) -> Result<Value> {
    with_native_kind!(code, K => K::unwrap(value, column).map(K::wrap), _ => Ok(value))
}

/// Natural ordering of two builtin values of the same storage type.
pub(crate) fn natural_cmp(a: &Value, b: &Value, column: &ColumnMeta) -> Option<Ordering> {
    let code = a.storage_type();
    if code != b.storage_type() {
        return None;
    }
    with_native_kind!(code, K => {
        let left = K::unwrap(a.clone(), column).ok()?;
        let right = K::unwrap(b.clone(), column).ok()?;
        left.natural_cmp(&right, column)
    }, _ => None)
}

/// XML text of a builtin value.
pub(crate) fn encode(value: &Value, column: &ColumnMeta) -> Result<String> {
    let code = value.storage_type();
    with_native_kind!(code, K => {
        K::unwrap(value.clone(), column).map(|item| item.to_xml(column))
    }, _ => Err(StorageError::unsupported("convert_object_to_xml", code)))
}

/// Parses XML text into a builtin value of storage type `code`.
pub(crate) fn decode(code: StorageType, text: &str, column: &ColumnMeta) -> Result<Value> {
    with_native_kind!(code, K => {
        <<K as NativeKind>::Item as NativeItem>::from_xml(text, column)
            .map(K::wrap)
            .map_err(|reason| StorageError::conversion(text, code, reason))
    }, _ => Err(StorageError::unsupported("convert_xml_to_object", code)))
}
