// Typed storage
// One generic strategy for every type with a native Rust representation: a dense
// Vec of native values plus the shared null bitmap

use super::native::{NativeItem, NativeKind};
use super::{aggregate, compare_nulls, AggregateKind, DataStorage, NullBitmap, StorageCore, StorageSnapshot};
use crate::error::{Result, StorageError};
use crate::registry::RuntimeType;
use crate::storage::table::ColumnMeta;
use crate::value::Value;
use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, trace};

/// Dense native-array storage for the kind `K`.
///
/// Slots of null rows hold `K::default_item()` and are never handed out; the
/// bitmap is the only authority on whether a row has a value.
pub(crate) struct TypedStorage<K: NativeKind> {
    core: StorageCore,
    values: Vec<K::Item>,
}

impl<K: NativeKind> TypedStorage<K> {
    pub(crate) fn new(column: Rc<ColumnMeta>, data_type: RuntimeType) -> Self {
        debug!(column = column.name(), storage_type = %K::CODE, "creating typed storage");
        let core = StorageCore::new(
            column,
            K::CODE,
            data_type,
            K::wrap(K::default_item()),
            K::null_value(),
        );
        Self {
            core,
            values: Vec::new(),
        }
    }

    fn column(&self) -> &ColumnMeta {
        self.core.column()
    }
}

impl<K: NativeKind> fmt::Debug for TypedStorage<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedStorage")
            .field("storage_type", &K::CODE)
            .field("column", &self.core.column().name())
            .field("capacity", &self.values.len())
            .finish()
    }
}

impl<K: NativeKind> DataStorage for TypedStorage<K> {
    fn core(&self) -> &StorageCore {
        &self.core
    }

    fn get(&self, row: usize) -> Value {
        if self.is_null(row) {
            self.core.null_value().clone()
        } else {
            K::wrap(self.values[row].clone())
        }
    }

    fn set(&mut self, row: usize, value: Value) -> Result<()> {
        if value.is_null() {
            self.values[row] = K::default_item();
            self.core.nulls_mut().set(row, true);
        } else {
            let item = K::unwrap(value, self.column())?;
            self.values[row] = item;
            self.core.nulls_mut().set(row, false);
        }
        self.core.mark_populated();
        Ok(())
    }

    fn compare(&self, row1: usize, row2: usize) -> Ordering {
        compare_nulls(self.is_null(row1), self.is_null(row2)).unwrap_or_else(|| {
            self.values[row1]
                .natural_cmp(&self.values[row2], self.column())
                .unwrap_or(Ordering::Equal)
        })
    }

    fn compare_value_to(&self, row: usize, value: &Value) -> Ordering {
        if let Some(ordering) = compare_nulls(self.is_null(row), value.is_null()) {
            return ordering;
        }
        if value.storage_type() != K::CODE {
            trace!(expected = %K::CODE, found = %value.storage_type(), "comparing mismatched types");
            return Ordering::Equal;
        }
        match K::unwrap(value.clone(), self.column()) {
            Ok(item) => self.values[row]
                .natural_cmp(&item, self.column())
                .unwrap_or(Ordering::Equal),
            Err(_) => Ordering::Equal,
        }
    }

    fn copy(&mut self, src: usize, dst: usize) {
        self.values[dst] = self.values[src].clone();
        self.core.nulls_mut().copy_bit(src, dst);
    }

    fn convert_value(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(self.core.null_value().clone());
        }
        K::unwrap(value, self.column()).map(K::wrap)
    }

    fn set_capacity(&mut self, capacity: usize) {
        trace!(storage_type = %K::CODE, from = self.values.len(), to = capacity, "set capacity");
        self.values.resize_with(capacity, K::default_item);
        self.core.resize(capacity);
    }

    fn aggregate(&self, rows: &[usize], kind: AggregateKind) -> Result<Option<Value>> {
        aggregate::native::<K>(&self.values, self.core.nulls(), rows, kind, self.column())
    }

    fn convert_object_to_xml(&self, value: &Value) -> Result<String> {
        if value.is_null() {
            return Err(StorageError::conversion(value, K::CODE, "null values have no text form"));
        }
        let item = K::unwrap(value.clone(), self.column())?;
        Ok(item.to_xml(self.column()))
    }

    fn convert_xml_to_object(&self, text: &str) -> Result<Value> {
        <K::Item as NativeItem>::from_xml(text, self.column())
            .map(K::wrap)
            .map_err(|reason| StorageError::conversion(text, K::CODE, reason))
    }

    fn empty_storage(&self, count: usize) -> StorageSnapshot {
        let values = (0..count).map(|_| K::default_item()).collect::<Vec<_>>();
        let mut nulls = NullBitmap::with_len(count);
        nulls.set_range(0, count, true);
        StorageSnapshot::new(K::CODE, values, nulls)
    }

    fn copy_value_into(&self, row: usize, target: &mut StorageSnapshot, index: usize) -> Result<()> {
        let (values, nulls) = target.parts_mut::<K::Item>(K::CODE)?;
        if index >= values.len() {
            return Err(StorageError::RowOutOfRange {
                row: index,
                row_count: values.len(),
            });
        }
        values[index] = self.values[row].clone();
        nulls.set(index, self.is_null(row));
        Ok(())
    }

    fn set_storage(&mut self, snapshot: StorageSnapshot) -> Result<()> {
        let (values, nulls) = snapshot.into_parts::<K::Item>(K::CODE)?;
        debug!(storage_type = %K::CODE, rows = values.len(), "restoring storage from snapshot");
        self.values = values;
        self.core.replace_nulls(nulls);
        Ok(())
    }

    fn string_length(&self, row: usize) -> Result<usize> {
        if !self.core.flags().string_type {
            return Err(self.core.unsupported("string_length"));
        }
        if self.is_null(row) {
            return Ok(0);
        }
        self.values[row]
            .text_len()
            .ok_or_else(|| self.core.unsupported("string_length"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BuiltinType, StorageType};
    use crate::storage::native::{DateTimeKind, Int32Kind, SqlInt32Kind, StringKind};
    use crate::storage::StorageState;
    use time::macros::datetime;

    fn storage<K: NativeKind>(builtin: BuiltinType, capacity: usize) -> TypedStorage<K> {
        let column = Rc::new(ColumnMeta::detached("c", builtin.into()));
        let mut storage = TypedStorage::<K>::new(column, builtin.into());
        storage.set_capacity(capacity);
        storage
    }

    #[test]
    fn test_rows_start_null_and_state_advances() {
        let column = Rc::new(ColumnMeta::detached("c", BuiltinType::Int32.into()));
        let mut s = TypedStorage::<Int32Kind>::new(column, BuiltinType::Int32.into());
        assert_eq!(s.state(), StorageState::Uninitialized);
        s.set_capacity(3);
        assert_eq!(s.state(), StorageState::CapacitySet);
        assert!((0..3).all(|row| s.is_null(row)));
        s.set(1, Value::Int32(9)).unwrap();
        assert_eq!(s.state(), StorageState::Populated);
        assert!(s.has_value(1));
    }

    #[test]
    fn test_set_get_and_null_round_trip() {
        let mut s = storage::<Int32Kind>(BuiltinType::Int32, 4);
        s.set(0, Value::Int32(42)).unwrap();
        s.set(1, Value::from("17")).unwrap();
        assert_eq!(s.get(0), Value::Int32(42));
        assert_eq!(s.get(1), Value::Int32(17));
        s.set(0, Value::DbNull).unwrap();
        assert_eq!(s.get(0), Value::DbNull);
        assert!(s.is_null(0));
    }

    #[test]
    fn test_failed_conversion_leaves_row_untouched() {
        let mut s = storage::<Int32Kind>(BuiltinType::Int32, 2);
        s.set(0, Value::Int32(5)).unwrap();
        let err = s.set(0, Value::from("five")).unwrap_err();
        assert!(matches!(err, StorageError::Conversion { .. }));
        assert_eq!(s.get(0), Value::Int32(5));
        assert!(s.set(1, Value::Int64(i64::MAX)).is_err());
        assert!(s.is_null(1));
    }

    #[test]
    fn test_compare_orders_nulls_first() {
        let mut s = storage::<Int32Kind>(BuiltinType::Int32, 3);
        s.set(0, Value::Int32(42)).unwrap();
        s.set(2, Value::Int32(-7)).unwrap();
        assert_eq!(s.compare(0, 2), Ordering::Greater);
        assert_eq!(s.compare(2, 0), Ordering::Less);
        assert_eq!(s.compare(1, 0), Ordering::Less);
        assert_eq!(s.compare(0, 1), Ordering::Greater);
        assert_eq!(s.compare(1, 1), Ordering::Equal);
        assert_eq!(s.compare_value_to(0, &Value::Int32(50)), Ordering::Less);
        assert_eq!(s.compare_value_to(0, &Value::from("x")), Ordering::Equal);
        assert_eq!(s.compare_value_to(0, &Value::DbNull), Ordering::Greater);
    }

    #[test]
    fn test_copy_moves_value_and_null_flag() {
        let mut s = storage::<StringKind>(BuiltinType::String, 3);
        s.set(0, Value::from("alpha")).unwrap();
        s.copy(0, 2);
        assert_eq!(s.get(2), Value::from("alpha"));
        s.copy(1, 2);
        assert!(s.is_null(2));
        assert_eq!(s.get(2), Value::DbNull);
    }

    #[test]
    fn test_grow_keeps_prefix_and_nulls_new_rows() {
        let mut s = storage::<Int32Kind>(BuiltinType::Int32, 2);
        s.set(0, Value::Int32(1)).unwrap();
        s.set_capacity(5);
        assert_eq!(s.get(0), Value::Int32(1));
        assert!(s.is_null(1));
        assert!((2..5).all(|row| s.is_null(row)));
        s.set_capacity(1);
        assert_eq!(s.capacity(), 1);
        assert_eq!(s.get(0), Value::Int32(1));
    }

    #[test]
    fn test_string_length_is_string_only() {
        let mut s = storage::<StringKind>(BuiltinType::String, 2);
        s.set(0, Value::from("naïve")).unwrap();
        assert_eq!(s.string_length(0).unwrap(), 5);
        assert_eq!(s.string_length(1).unwrap(), 0);
        let n = storage::<Int32Kind>(BuiltinType::Int32, 1);
        assert!(matches!(n.string_length(0), Err(StorageError::Unsupported { .. })));
    }

    #[test]
    fn test_sql_nullable_storage_uses_its_own_null() {
        let mut s = storage::<SqlInt32Kind>(BuiltinType::SqlInt32, 2);
        assert_eq!(s.get(0), Value::SqlInt32(None));
        s.set(0, Value::SqlInt32(Some(3))).unwrap();
        s.set(1, Value::SqlInt32(None)).unwrap();
        assert_eq!(s.get(0), Value::SqlInt32(Some(3)));
        assert!(s.is_null(1));
        assert_eq!(s.null_value(), &Value::SqlInt32(None));
    }

    #[test]
    fn test_xml_round_trip() {
        let s = storage::<DateTimeKind>(BuiltinType::DateTime, 0);
        let value = Value::DateTime(datetime!(2024-02-29 13:45:10.25));
        let text = s.convert_object_to_xml(&value).unwrap();
        assert_eq!(s.convert_xml_to_object(&text).unwrap(), value);
        assert!(s.convert_object_to_xml(&Value::DbNull).is_err());
    }

    #[test]
    fn test_snapshot_copy_and_restore() {
        let mut s = storage::<Int32Kind>(BuiltinType::Int32, 3);
        s.set(0, Value::Int32(10)).unwrap();
        s.set(2, Value::Int32(30)).unwrap();
        let mut snapshot = s.empty_storage(2);
        s.copy_value_into(2, &mut snapshot, 0).unwrap();
        s.copy_value_into(1, &mut snapshot, 1).unwrap();
        assert!(s.copy_value_into(0, &mut snapshot, 2).is_err());

        let mut other = storage::<Int32Kind>(BuiltinType::Int32, 0);
        other.set_storage(snapshot).unwrap();
        assert_eq!(other.capacity(), 2);
        assert_eq!(other.get(0), Value::Int32(30));
        assert!(other.is_null(1));

        let mut strings = storage::<StringKind>(BuiltinType::String, 0);
        let wrong = s.empty_storage(1);
        assert!(matches!(
            strings.set_storage(wrong),
            Err(StorageError::SnapshotMismatch {
                expected: StorageType::String,
                found: StorageType::Int32
            })
        ));
    }
}
