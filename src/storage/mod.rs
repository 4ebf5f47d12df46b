// Storage module - typed column storage engine
// Every column owns exactly one storage: a backing array of native values plus
// a null bitmap kept alongside it

pub mod aggregate;
pub mod bitmap;
pub mod factory;
pub(crate) mod native;
pub mod object;
pub mod table;
pub mod typed;

pub use bitmap::NullBitmap;
pub use factory::create_storage;
pub use table::{Column, ColumnMeta, Table, TableMeta};

use crate::error::{Result, StorageError};
use crate::registry::{self, InterfaceSet, RuntimeType, StorageType};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

/// Aggregates a storage may compute over a set of rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateKind {
    Sum,
    Mean,
    Min,
    Max,
    First,
    Count,
    Var,
    StDev,
}

impl FromStr for AggregateKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(AggregateKind::Sum),
            "mean" | "avg" => Ok(AggregateKind::Mean),
            "min" => Ok(AggregateKind::Min),
            "max" => Ok(AggregateKind::Max),
            "first" => Ok(AggregateKind::First),
            "count" => Ok(AggregateKind::Count),
            "var" => Ok(AggregateKind::Var),
            "stdev" => Ok(AggregateKind::StDev),
            _ => Err(format!("unknown aggregate: {}", s)),
        }
    }
}

impl fmt::Display for AggregateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Facts about a storage's declared type, computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageFlags {
    pub cloneable: bool,
    /// The type needs generic handling rather than a specialized fast path.
    pub custom_type: bool,
    pub string_type: bool,
    pub value_type: bool,
    /// Interfaces of the declared type, consulted instead of re-inspecting it.
    pub interfaces: InterfaceSet,
}

/// Lifecycle of a storage: built, then sized by its table, then written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageState {
    Uninitialized,
    CapacitySet,
    Populated,
}

/// State every storage shares regardless of its backing array.
#[derive(Debug)]
pub struct StorageCore {
    column: Rc<ColumnMeta>,
    storage_type: StorageType,
    data_type: RuntimeType,
    default_value: Value,
    null_value: Value,
    flags: StorageFlags,
    nulls: NullBitmap,
    state: StorageState,
}

impl StorageCore {
    pub(crate) fn new(
        column: Rc<ColumnMeta>,
        storage_type: StorageType,
        data_type: RuntimeType,
        default_value: Value,
        null_value: Value,
    ) -> Self {
        let cloneable = match data_type.as_custom() {
            Some(custom) => custom.is_cloneable(),
            None => matches!(
                storage_type,
                StorageType::String | StorageType::ByteArray | StorageType::CharArray
            ),
        };
        let flags = StorageFlags {
            cloneable,
            custom_type: registry::is_opaque(storage_type),
            string_type: registry::is_string_type(storage_type),
            value_type: registry::is_value_type(storage_type, &data_type),
            interfaces: registry::describe_interfaces(storage_type, &data_type),
        };
        Self {
            column,
            storage_type,
            data_type,
            default_value,
            null_value,
            flags,
            nulls: NullBitmap::new(),
            state: StorageState::Uninitialized,
        }
    }

    pub fn column(&self) -> &ColumnMeta {
        &self.column
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn data_type(&self) -> &RuntimeType {
        &self.data_type
    }

    pub fn null_value(&self) -> &Value {
        &self.null_value
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }

    pub fn flags(&self) -> StorageFlags {
        self.flags
    }

    pub fn state(&self) -> StorageState {
        self.state
    }

    pub fn nulls(&self) -> &NullBitmap {
        &self.nulls
    }

    pub(crate) fn nulls_mut(&mut self) -> &mut NullBitmap {
        &mut self.nulls
    }

    /// Resizes the bitmap; rows added by a grow start out null.
    pub(crate) fn resize(&mut self, capacity: usize) {
        let old = self.nulls.len();
        self.nulls.resize(capacity);
        self.nulls.set_range(old, capacity, true);
        if self.state == StorageState::Uninitialized {
            self.state = StorageState::CapacitySet;
        }
    }

    pub(crate) fn replace_nulls(&mut self, nulls: NullBitmap) {
        self.nulls = nulls;
        self.state = StorageState::Populated;
    }

    pub(crate) fn mark_populated(&mut self) {
        self.state = StorageState::Populated;
    }

    pub(crate) fn unsupported(&self, operation: &'static str) -> StorageError {
        StorageError::unsupported(operation, self.storage_type)
    }
}

/// Detached copy of a storage's backing array and null bitmap, used to move
/// whole row sets between tables without going through `Value`.
pub struct StorageSnapshot {
    storage_type: StorageType,
    values: Box<dyn Any>,
    nulls: NullBitmap,
}

impl StorageSnapshot {
    pub(crate) fn new<T: 'static>(storage_type: StorageType, values: Vec<T>, nulls: NullBitmap) -> Self {
        debug_assert_eq!(values.len(), nulls.len());
        Self {
            storage_type,
            values: Box::new(values),
            nulls,
        }
    }

    pub fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub fn len(&self) -> usize {
        self.nulls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nulls.is_empty()
    }

    pub fn nulls(&self) -> &NullBitmap {
        &self.nulls
    }

    pub(crate) fn parts_mut<T: 'static>(
        &mut self,
        expected: StorageType,
    ) -> Result<(&mut Vec<T>, &mut NullBitmap)> {
        let found = self.storage_type;
        match self.values.downcast_mut::<Vec<T>>() {
            Some(values) if found == expected => Ok((values, &mut self.nulls)),
            _ => Err(StorageError::SnapshotMismatch { expected, found }),
        }
    }

    pub(crate) fn into_parts<T: 'static>(self, expected: StorageType) -> Result<(Vec<T>, NullBitmap)> {
        let found = self.storage_type;
        if found != expected {
            return Err(StorageError::SnapshotMismatch { expected, found });
        }
        match self.values.downcast::<Vec<T>>() {
            Ok(values) => Ok((*values, self.nulls)),
            Err(_) => Err(StorageError::SnapshotMismatch { expected, found }),
        }
    }
}

impl fmt::Debug for StorageSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSnapshot")
            .field("storage_type", &self.storage_type)
            .field("len", &self.len())
            .finish()
    }
}

/// Ordering of two rows when at least one of them is null: null sorts first.
/// `None` means both hold values and the caller must compare them.
pub(crate) fn compare_nulls(left_null: bool, right_null: bool) -> Option<Ordering> {
    match (left_null, right_null) {
        (true, true) => Some(Ordering::Equal),
        (true, false) => Some(Ordering::Less),
        (false, true) => Some(Ordering::Greater),
        (false, false) => None,
    }
}

/// The contract every column storage fulfills.
///
/// Row indices must lie in `0..capacity()`; the owning table guarantees this.
/// Comparisons never fail: values that cannot be ordered against each other
/// compare as equal.
pub trait DataStorage: fmt::Debug {
    fn core(&self) -> &StorageCore;

    /// The row's value, or the null value when the row is null.
    fn get(&self, row: usize) -> Value;

    /// Stores `value`, or marks the row null when `value` is a null marker.
    /// A failed conversion leaves the row untouched.
    fn set(&mut self, row: usize, value: Value) -> Result<()>;

    fn compare(&self, row1: usize, row2: usize) -> Ordering;

    fn compare_value_to(&self, row: usize, value: &Value) -> Ordering;

    fn copy(&mut self, src: usize, dst: usize);

    /// Normalizes a value the way `set` would store it, without storing it.
    fn convert_value(&self, value: Value) -> Result<Value>;

    /// Resizes the backing array and bitmap together, keeping existing rows.
    fn set_capacity(&mut self, capacity: usize);

    /// `Ok(None)` when this storage does not support `kind`.
    fn aggregate(&self, rows: &[usize], kind: AggregateKind) -> Result<Option<Value>>;

    fn convert_object_to_xml(&self, value: &Value) -> Result<String>;

    fn convert_xml_to_object(&self, text: &str) -> Result<Value>;

    /// A blank snapshot of `count` rows compatible with this storage.
    fn empty_storage(&self, count: usize) -> StorageSnapshot;

    fn copy_value_into(&self, row: usize, target: &mut StorageSnapshot, index: usize) -> Result<()>;

    /// Replaces the backing array and bitmap wholesale.
    fn set_storage(&mut self, snapshot: StorageSnapshot) -> Result<()>;

    fn string_length(&self, _row: usize) -> Result<usize> {
        Err(self.core().unsupported("string_length"))
    }

    fn is_null(&self, row: usize) -> bool {
        self.core().nulls().get(row)
    }

    fn has_value(&self, row: usize) -> bool {
        !self.is_null(row)
    }

    fn capacity(&self) -> usize {
        self.core().nulls().len()
    }

    fn storage_type(&self) -> StorageType {
        self.core().storage_type()
    }

    fn data_type(&self) -> &RuntimeType {
        self.core().data_type()
    }

    fn null_value(&self) -> &Value {
        self.core().null_value()
    }

    fn default_value(&self) -> &Value {
        self.core().default_value()
    }

    fn flags(&self) -> StorageFlags {
        self.core().flags()
    }

    fn state(&self) -> StorageState {
        self.core().state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_ordering() {
        assert_eq!(compare_nulls(true, true), Some(Ordering::Equal));
        assert_eq!(compare_nulls(true, false), Some(Ordering::Less));
        assert_eq!(compare_nulls(false, true), Some(Ordering::Greater));
        assert_eq!(compare_nulls(false, false), None);
    }

    #[test]
    fn test_aggregate_kind_parsing() {
        assert_eq!("AVG".parse::<AggregateKind>(), Ok(AggregateKind::Mean));
        assert_eq!("stdev".parse::<AggregateKind>(), Ok(AggregateKind::StDev));
        assert!("median".parse::<AggregateKind>().is_err());
    }

    #[test]
    fn test_snapshot_rejects_wrong_type() {
        let snapshot = StorageSnapshot::new(StorageType::Int32, vec![1i32, 2], NullBitmap::with_len(2));
        assert!(matches!(
            snapshot.into_parts::<i64>(StorageType::Int32),
            Err(StorageError::SnapshotMismatch { .. })
        ));
    }
}
