// Value model
// The dynamically typed values passed in and out of column storages

pub mod convert;
pub(crate) mod text;

use crate::registry::{RuntimeType, StorageType};
use rust_decimal::Decimal;
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use time::{Duration, OffsetDateTime, PrimitiveDateTime};
use uuid::Uuid;

/// A single column value.
///
/// There is one variant per storage type code, plus `DbNull` (the universal
/// "no value" marker) and `Object` for instances of opaque types. SQL-nullable
/// variants carry their own null as `None`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    DbNull,
    Object(ObjectRef),
    Boolean(bool),
    Char(char),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    DateTime(PrimitiveDateTime),
    TimeSpan(Duration),
    String(String),
    Guid(Uuid),
    ByteArray(Vec<u8>),
    CharArray(Vec<char>),
    Type(RuntimeType),
    DateTimeOffset(OffsetDateTime),
    Uri(Uri),
    SqlBinary(Option<Vec<u8>>),
    SqlBoolean(Option<bool>),
    SqlByte(Option<u8>),
    SqlBytes(Option<Vec<u8>>),
    SqlChars(Option<Vec<char>>),
    SqlDateTime(Option<PrimitiveDateTime>),
    SqlDecimal(Option<Decimal>),
    SqlDouble(Option<f64>),
    SqlGuid(Option<Uuid>),
    SqlInt16(Option<i16>),
    SqlInt32(Option<i32>),
    SqlInt64(Option<i64>),
    SqlMoney(Option<Decimal>),
    SqlSingle(Option<f32>),
    SqlString(Option<String>),
}

impl Value {
    /// The storage type code this value belongs to. Opaque instances report `Object`.
    pub fn storage_type(&self) -> StorageType {
        match self {
            Value::DbNull => StorageType::DbNull,
            Value::Object(_) => StorageType::Object,
            Value::Boolean(_) => StorageType::Boolean,
            Value::Char(_) => StorageType::Char,
            Value::SByte(_) => StorageType::SByte,
            Value::Byte(_) => StorageType::Byte,
            Value::Int16(_) => StorageType::Int16,
            Value::UInt16(_) => StorageType::UInt16,
            Value::Int32(_) => StorageType::Int32,
            Value::UInt32(_) => StorageType::UInt32,
            Value::Int64(_) => StorageType::Int64,
            Value::UInt64(_) => StorageType::UInt64,
            Value::Single(_) => StorageType::Single,
            Value::Double(_) => StorageType::Double,
            Value::Decimal(_) => StorageType::Decimal,
            Value::DateTime(_) => StorageType::DateTime,
            Value::TimeSpan(_) => StorageType::TimeSpan,
            Value::String(_) => StorageType::String,
            Value::Guid(_) => StorageType::Guid,
            Value::ByteArray(_) => StorageType::ByteArray,
            Value::CharArray(_) => StorageType::CharArray,
            Value::Type(_) => StorageType::Type,
            Value::DateTimeOffset(_) => StorageType::DateTimeOffset,
            Value::Uri(_) => StorageType::Uri,
            Value::SqlBinary(_) => StorageType::SqlBinary,
            Value::SqlBoolean(_) => StorageType::SqlBoolean,
            Value::SqlByte(_) => StorageType::SqlByte,
            Value::SqlBytes(_) => StorageType::SqlBytes,
            Value::SqlChars(_) => StorageType::SqlChars,
            Value::SqlDateTime(_) => StorageType::SqlDateTime,
            Value::SqlDecimal(_) => StorageType::SqlDecimal,
            Value::SqlDouble(_) => StorageType::SqlDouble,
            Value::SqlGuid(_) => StorageType::SqlGuid,
            Value::SqlInt16(_) => StorageType::SqlInt16,
            Value::SqlInt32(_) => StorageType::SqlInt32,
            Value::SqlInt64(_) => StorageType::SqlInt64,
            Value::SqlMoney(_) => StorageType::SqlMoney,
            Value::SqlSingle(_) => StorageType::SqlSingle,
            Value::SqlString(_) => StorageType::SqlString,
        }
    }

    /// True for every way of saying "no value": the `DbNull` marker, a
    /// SQL-nullable value holding its own null, or an opaque instance whose
    /// nullable-value capability reports null.
    pub fn is_null(&self) -> bool {
        match self {
            Value::DbNull => true,
            Value::Object(object) => object.is_null(),
            Value::SqlBinary(v) | Value::SqlBytes(v) => v.is_none(),
            Value::SqlBoolean(v) => v.is_none(),
            Value::SqlByte(v) => v.is_none(),
            Value::SqlChars(v) => v.is_none(),
            Value::SqlDateTime(v) => v.is_none(),
            Value::SqlDecimal(v) | Value::SqlMoney(v) => v.is_none(),
            Value::SqlDouble(v) => v.is_none(),
            Value::SqlGuid(v) => v.is_none(),
            Value::SqlInt16(v) => v.is_none(),
            Value::SqlInt32(v) => v.is_none(),
            Value::SqlInt64(v) => v.is_none(),
            Value::SqlSingle(v) => v.is_none(),
            Value::SqlString(v) => v.is_none(),
            _ => false,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(f: &mut fmt::Formatter<'_>, v: &Option<T>) -> fmt::Result {
            match v {
                Some(v) => write!(f, "{}", v),
                None => f.write_str("Null"),
            }
        }
        match self {
            Value::DbNull => f.write_str("NULL"),
            Value::Object(object) => write!(f, "{:?}", object),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Char(v) => write!(f, "{}", v),
            Value::SByte(v) => write!(f, "{}", v),
            Value::Byte(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Single(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
            Value::TimeSpan(v) => write!(f, "{}", v),
            Value::String(v) => f.write_str(v),
            Value::Guid(v) => write!(f, "{}", v),
            Value::ByteArray(v) => write!(f, "<{} bytes>", v.len()),
            Value::CharArray(v) => f.write_str(&v.iter().collect::<String>()),
            Value::Type(v) => write!(f, "{}", v),
            Value::DateTimeOffset(v) => write!(f, "{}", v),
            Value::Uri(v) => write!(f, "{}", v),
            Value::SqlBinary(v) | Value::SqlBytes(v) => match v {
                Some(bytes) => write!(f, "<{} bytes>", bytes.len()),
                None => f.write_str("Null"),
            },
            Value::SqlChars(v) => match v {
                Some(chars) => f.write_str(&chars.iter().collect::<String>()),
                None => f.write_str("Null"),
            },
            Value::SqlBoolean(v) => opt(f, v),
            Value::SqlByte(v) => opt(f, v),
            Value::SqlDateTime(v) => opt(f, v),
            Value::SqlDecimal(v) | Value::SqlMoney(v) => opt(f, v),
            Value::SqlDouble(v) => opt(f, v),
            Value::SqlGuid(v) => opt(f, v),
            Value::SqlInt16(v) => opt(f, v),
            Value::SqlInt32(v) => opt(f, v),
            Value::SqlInt64(v) => opt(f, v),
            Value::SqlSingle(v) => opt(f, v),
            Value::SqlString(v) => opt(f, v),
        }
    }
}

macro_rules! impl_from_for_value {
    ($($variant:ident($t:ty)),* $(,)?) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_for_value!(
    Boolean(bool),
    Char(char),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    DateTime(PrimitiveDateTime),
    TimeSpan(Duration),
    String(String),
    Guid(Uuid),
    ByteArray(Vec<u8>),
    CharArray(Vec<char>),
    Type(RuntimeType),
    DateTimeOffset(OffsetDateTime),
    Uri(Uri),
    Object(ObjectRef),
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

/// The nullable-value capability: an instance that can hold "no value".
pub trait NullableValue {
    fn is_null(&self) -> bool;
}

/// Behaviour an opaque instance exposes to the storage layer.
///
/// Only `type_name` and `as_any` are required; ordering, XML text and the
/// nullable-value capability are opt-in.
pub trait OpaqueObject: Any + fmt::Debug {
    /// Name of the instance's type; matches the declaring `CustomType`.
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn as_nullable(&self) -> Option<&dyn NullableValue> {
        None
    }

    /// Natural ordering against another instance of the same type.
    fn compare_to(&self, _other: &dyn OpaqueObject) -> Option<Ordering> {
        None
    }

    fn to_xml(&self) -> Option<String> {
        None
    }
}

/// Shared handle to an opaque instance. Two handles are equal only when they
/// point at the same instance.
#[derive(Clone)]
pub struct ObjectRef(Rc<dyn OpaqueObject>);

impl ObjectRef {
    pub fn new<T: OpaqueObject>(object: T) -> Self {
        ObjectRef(Rc::new(object))
    }

    pub fn get(&self) -> &dyn OpaqueObject {
        self.0.as_ref()
    }

    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }

    pub fn is_null(&self) -> bool {
        self.0.as_nullable().is_some_and(|n| n.is_null())
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// An absolute URI: a scheme followed by `:` and a non-empty remainder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uri(String);

impl Uri {
    pub fn parse(text: &str) -> Option<Uri> {
        let text = text.trim();
        let (scheme, rest) = text.split_once(':')?;
        let mut chars = scheme.chars();
        let starts_alpha = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
        let scheme_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !starts_alpha || !scheme_ok || rest.is_empty() || text.contains(char::is_whitespace) {
            return None;
        }
        Some(Uri(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }

    /// Filler for unused storage slots; never handed out for a non-null row.
    pub(crate) fn placeholder() -> Uri {
        Uri("about:blank".to_string())
    }
}

impl FromStr for Uri {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s).ok_or_else(|| format!("'{}' is not an absolute URI", s))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Maybe(Option<i32>);

    impl NullableValue for Maybe {
        fn is_null(&self) -> bool {
            self.0.is_none()
        }
    }

    impl OpaqueObject for Maybe {
        fn type_name(&self) -> &str {
            "Maybe"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_nullable(&self) -> Option<&dyn NullableValue> {
            Some(self)
        }
    }

    #[test]
    fn test_null_markers() {
        assert!(Value::DbNull.is_null());
        assert!(Value::SqlInt32(None).is_null());
        assert!(!Value::SqlInt32(Some(0)).is_null());
        assert!(!Value::Int32(0).is_null());
        assert!(Value::Object(ObjectRef::new(Maybe(None))).is_null());
        assert!(!Value::Object(ObjectRef::new(Maybe(Some(1)))).is_null());
    }

    #[test]
    fn test_object_ref_equality_is_identity() {
        let a = ObjectRef::new(Maybe(Some(1)));
        let b = ObjectRef::new(Maybe(Some(1)));
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(a.downcast_ref::<Maybe>().and_then(|m| m.0), Some(1));
    }

    #[test]
    fn test_uri_parsing() {
        let uri = Uri::parse("https://example.com/a?b=c").unwrap();
        assert_eq!(uri.scheme(), "https");
        assert!(Uri::parse("no scheme here").is_none());
        assert!(Uri::parse("1http://x").is_none());
        assert!(Uri::parse("mailto:").is_none());
        assert_eq!("urn:isbn:0451450523".parse::<Uri>().unwrap().scheme(), "urn");
    }

    #[test]
    fn test_value_reports_storage_type() {
        assert_eq!(Value::from(5i64).storage_type(), StorageType::Int64);
        assert_eq!(Value::from("x").storage_type(), StorageType::String);
        assert_eq!(Value::SqlMoney(None).storage_type(), StorageType::SqlMoney);
        assert_eq!(Value::DbNull.storage_type(), StorageType::DbNull);
    }
}
