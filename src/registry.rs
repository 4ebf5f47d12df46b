// Type registry
// Maps declared column types to storage type codes and back, and answers
// classification questions about them

use crate::value::ObjectRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::rc::Rc;

/// Declares the storage type codes, the builtin runtime types they stand for,
/// and the type table pairing them, all from one list so they cannot drift apart.
macro_rules! storage_types {
    ($($code:ident => $name:literal, value_type: $value_type:literal;)*) => {
        /// Storage type codes. The ordinal of each code is its position in the type table.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum StorageType {
            Empty,
            $($code,)*
        }

        /// The fixed set of runtime types with a dedicated storage type code.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum BuiltinType {
            $($code,)*
        }

        impl BuiltinType {
            pub fn storage_type(self) -> StorageType {
                match self {
                    $(BuiltinType::$code => StorageType::$code,)*
                }
            }
        }

        static TYPE_TABLE: &[TypeRegistryEntry] = &[
            TypeRegistryEntry {
                code: StorageType::Empty,
                runtime: None,
                name: "Empty",
                value_type: false,
            },
            $(TypeRegistryEntry {
                code: StorageType::$code,
                runtime: Some(BuiltinType::$code),
                name: $name,
                value_type: $value_type,
            },)*
        ];
    };
}

storage_types! {
    Object => "Object", value_type: false;
    DbNull => "DBNull", value_type: false;
    Boolean => "Boolean", value_type: true;
    Char => "Char", value_type: true;
    SByte => "SByte", value_type: true;
    Byte => "Byte", value_type: true;
    Int16 => "Int16", value_type: true;
    UInt16 => "UInt16", value_type: true;
    Int32 => "Int32", value_type: true;
    UInt32 => "UInt32", value_type: true;
    Int64 => "Int64", value_type: true;
    UInt64 => "UInt64", value_type: true;
    Single => "Single", value_type: true;
    Double => "Double", value_type: true;
    Decimal => "Decimal", value_type: true;
    DateTime => "DateTime", value_type: true;
    TimeSpan => "TimeSpan", value_type: true;
    String => "String", value_type: false;
    Guid => "Guid", value_type: true;
    ByteArray => "Byte[]", value_type: false;
    CharArray => "Char[]", value_type: false;
    Type => "Type", value_type: false;
    DateTimeOffset => "DateTimeOffset", value_type: true;
    Uri => "Uri", value_type: false;
    SqlBinary => "SqlBinary", value_type: true;
    SqlBoolean => "SqlBoolean", value_type: true;
    SqlByte => "SqlByte", value_type: true;
    SqlBytes => "SqlBytes", value_type: false;
    SqlChars => "SqlChars", value_type: false;
    SqlDateTime => "SqlDateTime", value_type: true;
    SqlDecimal => "SqlDecimal", value_type: true;
    SqlDouble => "SqlDouble", value_type: true;
    SqlGuid => "SqlGuid", value_type: true;
    SqlInt16 => "SqlInt16", value_type: true;
    SqlInt32 => "SqlInt32", value_type: true;
    SqlInt64 => "SqlInt64", value_type: true;
    SqlMoney => "SqlMoney", value_type: true;
    SqlSingle => "SqlSingle", value_type: true;
    SqlString => "SqlString", value_type: true;
}

/// One row of the type table.
#[derive(Debug)]
struct TypeRegistryEntry {
    code: StorageType,
    runtime: Option<BuiltinType>,
    name: &'static str,
    value_type: bool,
}

/// The contiguous block of codes whose values carry their own null flag.
pub const SQL_NULLABLE_RANGE: RangeInclusive<StorageType> =
    StorageType::SqlBinary..=StorageType::SqlString;

impl StorageType {
    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        TYPE_TABLE[self.ordinal()].name
    }

    /// Every code in ordinal order.
    pub fn all() -> impl Iterator<Item = StorageType> {
        TYPE_TABLE.iter().map(|entry| entry.code)
    }

    pub fn is_sql_nullable(self) -> bool {
        is_sql_nullable(self)
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl BuiltinType {
    pub fn name(self) -> &'static str {
        self.storage_type().name()
    }

    pub fn is_integral(self) -> bool {
        matches!(
            self,
            BuiltinType::SByte
                | BuiltinType::Byte
                | BuiltinType::Int16
                | BuiltinType::UInt16
                | BuiltinType::Int32
                | BuiltinType::UInt32
                | BuiltinType::Int64
                | BuiltinType::UInt64
        )
    }

    /// Looks a builtin type up by name, ignoring ASCII case.
    pub fn from_name(name: &str) -> Option<BuiltinType> {
        TYPE_TABLE
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
            .and_then(|entry| entry.runtime)
    }
}

/// Capability markers an opaque type can declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Instances can report that they hold no value.
    pub nullable_value: bool,
    pub change_tracking: bool,
    pub revertible_change_tracking: bool,
    pub xml_serializable: bool,
}

/// An opaque class-like type outside the fixed type set.
///
/// Capabilities are declared once here and cached by the storage built for a
/// column of this type.
#[derive(Debug, Clone)]
pub struct CustomType {
    name: String,
    value_type: bool,
    cloneable: bool,
    capabilities: Capabilities,
    xml_parser: Option<fn(&str) -> Option<ObjectRef>>,
    null_instance: Option<fn() -> ObjectRef>,
}

impl CustomType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: false,
            cloneable: false,
            capabilities: Capabilities::default(),
            xml_parser: None,
            null_instance: None,
        }
    }

    pub fn value_type(mut self, value_type: bool) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn cloneable(mut self, cloneable: bool) -> Self {
        self.cloneable = cloneable;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Parser used to rebuild instances from their XML text.
    pub fn with_xml_parser(mut self, parser: fn(&str) -> Option<ObjectRef>) -> Self {
        self.xml_parser = Some(parser);
        self
    }

    /// Factory for the instance representing this type's own null.
    pub fn with_null_instance(mut self, null: fn() -> ObjectRef) -> Self {
        self.null_instance = Some(null);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_value_type(&self) -> bool {
        self.value_type
    }

    pub fn is_cloneable(&self) -> bool {
        self.cloneable
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn parse_xml(&self, text: &str) -> Option<ObjectRef> {
        self.xml_parser.and_then(|parse| parse(text))
    }

    pub fn has_xml_parser(&self) -> bool {
        self.xml_parser.is_some()
    }

    pub fn null_instance(&self) -> Option<ObjectRef> {
        self.null_instance.map(|null| null())
    }

    pub fn into_type(self) -> RuntimeType {
        RuntimeType::Custom(Rc::new(self))
    }
}

impl PartialEq for CustomType {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value_type == other.value_type
    }
}

/// The declared value type of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeType {
    Builtin(BuiltinType),
    /// A named enumeration backed by an integral type.
    Enum {
        name: Rc<str>,
        underlying: BuiltinType,
    },
    /// The generic nullable wrapper around a value type.
    Nullable(Box<RuntimeType>),
    Custom(Rc<CustomType>),
}

impl RuntimeType {
    /// Resolves a builtin type name (`Int32`, `SqlString`, `Byte[]`, ...).
    pub fn from_name(name: &str) -> Option<RuntimeType> {
        BuiltinType::from_name(name).map(RuntimeType::Builtin)
    }

    /// Text form read back by [`RuntimeType::from_qualified_name`]: builtin names,
    /// `Enum:<name>:<underlying>` and `Nullable<inner>`. Custom types have none,
    /// since their definition lives outside the registry.
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            RuntimeType::Builtin(builtin) => Some(builtin.name().to_string()),
            RuntimeType::Enum { name, underlying } => {
                Some(format!("Enum:{}:{}", name, underlying.name()))
            }
            RuntimeType::Nullable(inner) => inner
                .qualified_name()
                .map(|inner| format!("Nullable<{}>", inner)),
            RuntimeType::Custom(_) => None,
        }
    }

    pub fn from_qualified_name(text: &str) -> Option<RuntimeType> {
        let text = text.trim();
        if let Some(inner) = text.strip_prefix("Nullable<").and_then(|t| t.strip_suffix('>')) {
            return RuntimeType::from_qualified_name(inner).map(RuntimeType::nullable);
        }
        if let Some(rest) = text.strip_prefix("Enum:") {
            let (name, underlying) = rest.rsplit_once(':')?;
            if name.is_empty() {
                return None;
            }
            return BuiltinType::from_name(underlying).map(|b| RuntimeType::enumeration(name, b));
        }
        RuntimeType::from_name(text)
    }

    pub fn enumeration(name: &str, underlying: BuiltinType) -> RuntimeType {
        RuntimeType::Enum {
            name: Rc::from(name),
            underlying,
        }
    }

    pub fn nullable(inner: RuntimeType) -> RuntimeType {
        RuntimeType::Nullable(Box::new(inner))
    }

    pub fn as_custom(&self) -> Option<&Rc<CustomType>> {
        match self {
            RuntimeType::Custom(custom) => Some(custom),
            _ => None,
        }
    }

    /// The type's own answer to "is this a value type", independent of the type table.
    pub fn is_value_type(&self) -> bool {
        match self {
            RuntimeType::Builtin(builtin) => !matches!(
                builtin,
                BuiltinType::Object
                    | BuiltinType::DbNull
                    | BuiltinType::String
                    | BuiltinType::ByteArray
                    | BuiltinType::CharArray
                    | BuiltinType::Type
                    | BuiltinType::Uri
                    | BuiltinType::SqlBytes
                    | BuiltinType::SqlChars
            ),
            RuntimeType::Enum { .. } | RuntimeType::Nullable(_) => true,
            RuntimeType::Custom(custom) => custom.is_value_type(),
        }
    }
}

impl From<BuiltinType> for RuntimeType {
    fn from(builtin: BuiltinType) -> Self {
        RuntimeType::Builtin(builtin)
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeType::Builtin(builtin) => f.write_str(builtin.name()),
            RuntimeType::Enum { name, .. } => f.write_str(name),
            RuntimeType::Nullable(inner) => write!(f, "Nullable<{}>", inner),
            RuntimeType::Custom(custom) => f.write_str(custom.name()),
        }
    }
}

/// Interfaces a column type exposes, as far as the storage layer cares.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterfaceSet {
    pub sql_nullable: bool,
    pub nullable_wrapper: bool,
    pub change_tracking: bool,
    pub revertible_change_tracking: bool,
    pub xml_serializable: bool,
}

/// Maps a declared type to its storage type code. Never fails: anything outside
/// the fixed set classifies as `Empty`.
pub fn classify(data_type: &RuntimeType) -> StorageType {
    match data_type {
        RuntimeType::Builtin(builtin) => TYPE_TABLE
            .iter()
            .find(|entry| entry.runtime == Some(*builtin))
            .map(|entry| entry.code)
            .unwrap_or(StorageType::Empty),
        RuntimeType::Enum { underlying, .. } if underlying.is_integral() => {
            underlying.storage_type()
        }
        _ => StorageType::Empty,
    }
}

/// The runtime type a code stands for; `Empty` has none.
pub fn type_of(code: StorageType) -> Option<RuntimeType> {
    TYPE_TABLE[code.ordinal()].runtime.map(RuntimeType::Builtin)
}

/// Codes whose values need generic handling instead of a specialized fast path.
pub fn is_opaque(code: StorageType) -> bool {
    matches!(
        code,
        StorageType::Empty | StorageType::Object | StorageType::CharArray
    )
}

pub fn is_string_type(code: StorageType) -> bool {
    matches!(code, StorageType::String | StorageType::SqlString)
}

pub fn is_sql_nullable(code: StorageType) -> bool {
    matches!(
        code,
        StorageType::SqlBinary
            | StorageType::SqlBoolean
            | StorageType::SqlByte
            | StorageType::SqlBytes
            | StorageType::SqlChars
            | StorageType::SqlDateTime
            | StorageType::SqlDecimal
            | StorageType::SqlDouble
            | StorageType::SqlGuid
            | StorageType::SqlInt16
            | StorageType::SqlInt32
            | StorageType::SqlInt64
            | StorageType::SqlMoney
            | StorageType::SqlSingle
            | StorageType::SqlString
    )
}

pub fn is_value_type(code: StorageType, data_type: &RuntimeType) -> bool {
    if code == StorageType::Empty {
        return data_type.is_value_type();
    }
    let fixed = TYPE_TABLE[code.ordinal()].value_type;
    debug_assert!(
        !matches!(data_type, RuntimeType::Builtin(_)) || fixed == data_type.is_value_type(),
        "type table disagrees with {} about being a value type",
        data_type
    );
    fixed
}

pub fn describe_interfaces(code: StorageType, data_type: &RuntimeType) -> InterfaceSet {
    if is_sql_nullable(code) {
        return InterfaceSet {
            sql_nullable: true,
            xml_serializable: true,
            ..InterfaceSet::default()
        };
    }
    if code != StorageType::Empty {
        return InterfaceSet::default();
    }
    match data_type {
        RuntimeType::Nullable(_) => InterfaceSet {
            nullable_wrapper: true,
            ..InterfaceSet::default()
        },
        RuntimeType::Custom(custom) => {
            let caps = custom.capabilities();
            InterfaceSet {
                sql_nullable: caps.nullable_value,
                nullable_wrapper: false,
                change_tracking: caps.change_tracking || caps.revertible_change_tracking,
                revertible_change_tracking: caps.revertible_change_tracking,
                xml_serializable: caps.xml_serializable,
            }
        }
        _ => InterfaceSet::default(),
    }
}

/// Checks the type table against the classification logic. A failure means the
/// table itself is wrong, so callers treat it as a programming error.
pub fn verify() -> Result<(), String> {
    for (position, entry) in TYPE_TABLE.iter().enumerate() {
        if entry.code.ordinal() != position {
            return Err(format!(
                "{} sits at position {} but has ordinal {}",
                entry.code,
                position,
                entry.code.ordinal()
            ));
        }
        let Some(runtime) = type_of(entry.code) else {
            if entry.code != StorageType::Empty {
                return Err(format!("{} has no runtime type", entry.code));
            }
            continue;
        };
        if classify(&runtime) != entry.code {
            return Err(format!("{} does not classify back to itself", entry.code));
        }
        if runtime.is_value_type() != entry.value_type {
            return Err(format!("{} value-type flag disagrees", entry.code));
        }
        if SQL_NULLABLE_RANGE.contains(&entry.code) != is_sql_nullable(entry.code) {
            return Err(format!("{} breaks the SQL-nullable range", entry.code));
        }
    }
    Ok(())
}
