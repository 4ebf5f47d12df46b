// Opaque storages
// Columns whose type has no native array: the generic object storage for `Object`,
// custom classes and nullable wrappers, and the storage for custom types that
// carry their own null

use super::native;
use super::{aggregate, compare_nulls, AggregateKind, DataStorage, NullBitmap, StorageCore, StorageSnapshot};
use crate::error::{Result, StorageError};
use crate::registry::{self, CustomType, RuntimeType, StorageType};
use crate::storage::table::ColumnMeta;
use crate::value::{ObjectRef, Value};
use std::cmp::Ordering;
use std::rc::Rc;
use tracing::{debug, trace};

/// Checks that `value` is an instance of `custom`.
fn check_instance(custom: &CustomType, value: Value, code: StorageType) -> Result<ObjectRef> {
    match value {
        Value::Object(object) if object.type_name() == custom.name() => Ok(object),
        other => Err(StorageError::conversion(
            &other,
            code,
            format!("expected an instance of {}", custom.name()),
        )),
    }
}

/// Brings a non-null value into the shape a column of `data_type` keeps.
fn accept(data_type: &RuntimeType, value: Value, column: &ColumnMeta) -> Result<Value> {
    match data_type {
        RuntimeType::Custom(custom) => {
            check_instance(custom, value, StorageType::Empty).map(Value::Object)
        }
        RuntimeType::Nullable(inner) => match registry::classify(inner) {
            StorageType::Empty => accept(inner, value, column),
            code => native::coerce(code, value, column),
        },
        _ => Ok(value),
    }
}

/// Ordering between two opaque instances, when their type defines one.
fn compare_objects(a: &ObjectRef, b: &ObjectRef) -> Ordering {
    if a.type_name() != b.type_name() {
        return Ordering::Equal;
    }
    a.get().compare_to(b.get()).unwrap_or(Ordering::Equal)
}

fn compare_values(a: &Value, b: &Value, column: &ColumnMeta) -> Ordering {
    match (a, b) {
        (Value::Object(a), Value::Object(b)) => compare_objects(a, b),
        _ => native::natural_cmp(a, b, column).unwrap_or(Ordering::Equal),
    }
}

fn blank_nulls(count: usize) -> NullBitmap {
    let mut nulls = NullBitmap::with_len(count);
    nulls.set_range(0, count, true);
    nulls
}

/// Generic storage holding each row as a `Value`.
///
/// Used for `Object` columns (anything goes), custom classes without the
/// nullable-value capability (instances must be of the declared class), and
/// nullable wrappers (values are coerced to the wrapped type).
#[derive(Debug)]
pub(crate) struct ObjectStorage {
    core: StorageCore,
    values: Vec<Value>,
}

impl ObjectStorage {
    pub(crate) fn new(column: Rc<ColumnMeta>, data_type: RuntimeType) -> Self {
        let code = registry::classify(&data_type);
        debug!(column = column.name(), data_type = %data_type, "creating object storage");
        Self {
            core: StorageCore::new(column, code, data_type, Value::DbNull, Value::DbNull),
            values: Vec::new(),
        }
    }
}

impl DataStorage for ObjectStorage {
    fn core(&self) -> &StorageCore {
        &self.core
    }

    fn get(&self, row: usize) -> Value {
        if self.is_null(row) {
            self.core.null_value().clone()
        } else {
            self.values[row].clone()
        }
    }

    fn set(&mut self, row: usize, value: Value) -> Result<()> {
        if value.is_null() {
            self.values[row] = Value::DbNull;
            self.core.nulls_mut().set(row, true);
        } else {
            let value = accept(self.core.data_type(), value, self.core.column())?;
            self.values[row] = value;
            self.core.nulls_mut().set(row, false);
        }
        self.core.mark_populated();
        Ok(())
    }

    fn compare(&self, row1: usize, row2: usize) -> Ordering {
        compare_nulls(self.is_null(row1), self.is_null(row2)).unwrap_or_else(|| {
            compare_values(&self.values[row1], &self.values[row2], self.core.column())
        })
    }

    fn compare_value_to(&self, row: usize, value: &Value) -> Ordering {
        compare_nulls(self.is_null(row), value.is_null())
            .unwrap_or_else(|| compare_values(&self.values[row], value, self.core.column()))
    }

    fn copy(&mut self, src: usize, dst: usize) {
        self.values[dst] = self.values[src].clone();
        self.core.nulls_mut().copy_bit(src, dst);
    }

    fn convert_value(&self, value: Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::DbNull);
        }
        accept(self.core.data_type(), value, self.core.column())
    }

    fn set_capacity(&mut self, capacity: usize) {
        trace!(from = self.values.len(), to = capacity, "set object capacity");
        self.values.resize(capacity, Value::DbNull);
        self.core.resize(capacity);
    }

    fn aggregate(&self, rows: &[usize], kind: AggregateKind) -> Result<Option<Value>> {
        Ok(match kind {
            AggregateKind::Count => Some(aggregate::count(self.core.nulls(), rows)),
            AggregateKind::First => Some(rows.first().map_or(Value::DbNull, |&row| self.get(row))),
            _ => None,
        })
    }

    fn convert_object_to_xml(&self, value: &Value) -> Result<String> {
        match value {
            v if v.is_null() => Err(StorageError::conversion(
                v,
                self.storage_type(),
                "null values have no text form",
            )),
            Value::Object(object) => object
                .get()
                .to_xml()
                .ok_or_else(|| self.core.unsupported("convert_object_to_xml")),
            builtin => native::encode(builtin, self.core.column()),
        }
    }

    /// `Object` columns read text back as strings; typed columns rebuild their type.
    fn convert_xml_to_object(&self, text: &str) -> Result<Value> {
        match self.core.data_type() {
            RuntimeType::Custom(custom) => parse_custom(custom, text, self.storage_type()),
            RuntimeType::Nullable(inner) => match registry::classify(inner) {
                StorageType::Empty => match inner.as_custom() {
                    Some(custom) => parse_custom(custom, text, self.storage_type()),
                    None => Err(self.core.unsupported("convert_xml_to_object")),
                },
                code => native::decode(code, text, self.core.column()),
            },
            _ => Ok(Value::String(text.to_string())),
        }
    }

    fn empty_storage(&self, count: usize) -> StorageSnapshot {
        StorageSnapshot::new(self.storage_type(), vec![Value::DbNull; count], blank_nulls(count))
    }

    fn copy_value_into(&self, row: usize, target: &mut StorageSnapshot, index: usize) -> Result<()> {
        let (values, nulls) = target.parts_mut::<Value>(self.storage_type())?;
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
        let (values, nulls) = snapshot.into_parts::<Value>(self.storage_type())?;
        debug!(rows = values.len(), "restoring object storage from snapshot");
        self.values = values;
        self.core.replace_nulls(nulls);
        Ok(())
    }
}

fn parse_custom(custom: &CustomType, text: &str, code: StorageType) -> Result<Value> {
    if !custom.has_xml_parser() {
        return Err(StorageError::unsupported("convert_xml_to_object", code));
    }
    custom
        .parse_xml(text)
        .map(Value::Object)
        .ok_or_else(|| StorageError::conversion(text, code, format!("not a valid {}", custom.name())))
}

/// Storage for custom types with the nullable-value capability.
///
/// A row is null when the bitmap says so or when the stored instance reports
/// itself null; null rows read back as the type's own null instance when it
/// declares one.
#[derive(Debug)]
pub(crate) struct UdtStorage {
    core: StorageCore,
    custom: Rc<CustomType>,
    values: Vec<Option<ObjectRef>>,
}

impl UdtStorage {
    pub(crate) fn new(column: Rc<ColumnMeta>, custom: Rc<CustomType>) -> Self {
        debug!(column = column.name(), data_type = custom.name(), "creating udt storage");
        let null_value = custom.null_instance().map_or(Value::DbNull, Value::Object);
        let data_type = RuntimeType::Custom(Rc::clone(&custom));
        Self {
            core: StorageCore::new(column, StorageType::Empty, data_type, Value::DbNull, null_value),
            custom,
            values: Vec::new(),
        }
    }
}

impl DataStorage for UdtStorage {
    fn core(&self) -> &StorageCore {
        &self.core
    }

    fn is_null(&self, row: usize) -> bool {
        if self.core.nulls().get(row) {
            return true;
        }
        match &self.values[row] {
            Some(object) => self.core.flags().interfaces.sql_nullable && object.is_null(),
            None => true,
        }
    }

    fn get(&self, row: usize) -> Value {
        match &self.values[row] {
            Some(object) if !self.is_null(row) => Value::Object(object.clone()),
            _ => self.core.null_value().clone(),
        }
    }

    fn set(&mut self, row: usize, value: Value) -> Result<()> {
        if value.is_null() {
            self.values[row] = value.as_object().cloned();
            self.core.nulls_mut().set(row, true);
        } else {
            let object = check_instance(&self.custom, value, StorageType::Empty)?;
            self.values[row] = Some(object);
            self.core.nulls_mut().set(row, false);
        }
        self.core.mark_populated();
        Ok(())
    }

    fn compare(&self, row1: usize, row2: usize) -> Ordering {
        compare_nulls(self.is_null(row1), self.is_null(row2)).unwrap_or_else(|| {
            match (&self.values[row1], &self.values[row2]) {
                (Some(a), Some(b)) => compare_objects(a, b),
                _ => Ordering::Equal,
            }
        })
    }

    fn compare_value_to(&self, row: usize, value: &Value) -> Ordering {
        if let Some(ordering) = compare_nulls(self.is_null(row), value.is_null()) {
            return ordering;
        }
        match (&self.values[row], value) {
            (Some(a), Value::Object(b)) => compare_objects(a, b),
            _ => Ordering::Equal,
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
        check_instance(&self.custom, value, StorageType::Empty).map(Value::Object)
    }

    fn set_capacity(&mut self, capacity: usize) {
        trace!(from = self.values.len(), to = capacity, "set udt capacity");
        self.values.resize(capacity, None);
        self.core.resize(capacity);
    }

    fn aggregate(&self, rows: &[usize], kind: AggregateKind) -> Result<Option<Value>> {
        Ok(match kind {
            AggregateKind::Count => Some(Value::Int64(
                rows.iter().filter(|&&row| !self.is_null(row)).count() as i64,
            )),
            AggregateKind::First => Some(
                rows.first()
                    .map_or_else(|| self.core.null_value().clone(), |&row| self.get(row)),
            ),
            _ => None,
        })
    }

    fn convert_object_to_xml(&self, value: &Value) -> Result<String> {
        let object = check_instance(&self.custom, value.clone(), StorageType::Empty)?;
        object
            .get()
            .to_xml()
            .ok_or_else(|| self.core.unsupported("convert_object_to_xml"))
    }

    fn convert_xml_to_object(&self, text: &str) -> Result<Value> {
        parse_custom(&self.custom, text, StorageType::Empty)
    }

    fn empty_storage(&self, count: usize) -> StorageSnapshot {
        StorageSnapshot::new(StorageType::Empty, vec![None::<ObjectRef>; count], blank_nulls(count))
    }

    fn copy_value_into(&self, row: usize, target: &mut StorageSnapshot, index: usize) -> Result<()> {
        let null = self.is_null(row);
        let (values, nulls) = target.parts_mut::<Option<ObjectRef>>(StorageType::Empty)?;
        if index >= values.len() {
            return Err(StorageError::RowOutOfRange {
                row: index,
                row_count: values.len(),
            });
        }
        values[index] = self.values[row].clone();
        nulls.set(index, null);
        Ok(())
    }

    fn set_storage(&mut self, snapshot: StorageSnapshot) -> Result<()> {
        let (values, nulls) = snapshot.into_parts::<Option<ObjectRef>>(StorageType::Empty)?;
        debug!(rows = values.len(), "restoring udt storage from snapshot");
        self.values = values;
        self.core.replace_nulls(nulls);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BuiltinType, Capabilities};
    use crate::value::{NullableValue, OpaqueObject};
    use std::any::Any;

    #[derive(Debug)]
    struct Point(i32, i32);

    impl OpaqueObject for Point {
        fn type_name(&self) -> &str {
            "Point"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn compare_to(&self, other: &dyn OpaqueObject) -> Option<Ordering> {
            let other = other.as_any().downcast_ref::<Point>()?;
            Some((self.0, self.1).cmp(&(other.0, other.1)))
        }

        fn to_xml(&self) -> Option<String> {
            Some(format!("{},{}", self.0, self.1))
        }
    }

    fn parse_point(text: &str) -> Option<ObjectRef> {
        let (x, y) = text.split_once(',')?;
        Some(ObjectRef::new(Point(x.parse().ok()?, y.parse().ok()?)))
    }

    #[derive(Debug)]
    struct Money(Option<i64>);

    impl NullableValue for Money {
        fn is_null(&self) -> bool {
            self.0.is_none()
        }
    }

    impl OpaqueObject for Money {
        fn type_name(&self) -> &str {
            "Money"
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_nullable(&self) -> Option<&dyn NullableValue> {
            Some(self)
        }
    }

    fn column(data_type: RuntimeType) -> Rc<ColumnMeta> {
        Rc::new(ColumnMeta::detached("o", data_type))
    }

    fn point_storage() -> ObjectStorage {
        let data_type = CustomType::new("Point").with_xml_parser(parse_point).into_type();
        let mut s = ObjectStorage::new(column(data_type.clone()), data_type);
        s.set_capacity(3);
        s
    }

    #[test]
    fn test_custom_class_round_trips_by_reference() {
        let mut s = point_storage();
        let p = ObjectRef::new(Point(1, 2));
        s.set(0, Value::Object(p.clone())).unwrap();
        match s.get(0) {
            Value::Object(got) => assert!(got.ptr_eq(&p)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(s.set(1, Value::Int32(3)).is_err());
        assert!(s.is_null(1));
        assert_eq!(s.storage_type(), StorageType::Empty);
    }

    #[test]
    fn test_custom_class_ordering_and_xml() {
        let mut s = point_storage();
        s.set(0, Value::Object(ObjectRef::new(Point(5, 0)))).unwrap();
        s.set(1, Value::Object(ObjectRef::new(Point(1, 9)))).unwrap();
        assert_eq!(s.compare(0, 1), Ordering::Greater);
        assert_eq!(s.compare(2, 1), Ordering::Less);

        let text = s.convert_object_to_xml(&s.get(1)).unwrap();
        assert_eq!(text, "1,9");
        let back = s.convert_xml_to_object(&text).unwrap();
        assert_eq!(back.as_object().and_then(|o| o.downcast_ref::<Point>()).map(|p| (p.0, p.1)), Some((1, 9)));
        assert!(s.convert_xml_to_object("nope").is_err());
    }

    #[test]
    fn test_object_column_accepts_anything() {
        let data_type = RuntimeType::from(BuiltinType::Object);
        let mut s = ObjectStorage::new(column(data_type.clone()), data_type);
        s.set_capacity(3);
        s.set(0, Value::Int32(7)).unwrap();
        s.set(1, Value::from("seven")).unwrap();
        assert_eq!(s.get(0), Value::Int32(7));
        assert_eq!(s.compare(0, 1), Ordering::Equal);
        assert_eq!(s.aggregate(&[0, 1, 2], AggregateKind::Count).unwrap(), Some(Value::Int64(2)));
        assert_eq!(s.aggregate(&[0, 1], AggregateKind::Sum).unwrap(), None);
        assert_eq!(s.convert_xml_to_object("seven").unwrap(), Value::from("seven"));
    }

    #[test]
    fn test_nullable_wrapper_coerces_to_inner_type() {
        let data_type = RuntimeType::nullable(BuiltinType::Int32.into());
        let mut s = ObjectStorage::new(column(data_type.clone()), data_type);
        s.set_capacity(2);
        s.set(0, Value::from("12")).unwrap();
        assert_eq!(s.get(0), Value::Int32(12));
        assert!(s.set(1, Value::from("twelve")).is_err());
        assert_eq!(s.convert_xml_to_object("5").unwrap(), Value::Int32(5));
    }

    #[test]
    fn test_udt_null_comes_from_the_instance() {
        let custom = Rc::new(
            CustomType::new("Money")
                .value_type(true)
                .with_capabilities(Capabilities {
                    nullable_value: true,
                    ..Capabilities::default()
                })
                .with_null_instance(|| ObjectRef::new(Money(None))),
        );
        let mut s = UdtStorage::new(column(RuntimeType::Custom(Rc::clone(&custom))), custom);
        s.set_capacity(3);
        assert!(s.is_null(0));
        s.set(0, Value::Object(ObjectRef::new(Money(Some(5))))).unwrap();
        s.set(1, Value::Object(ObjectRef::new(Money(None)))).unwrap();
        assert!(!s.is_null(0));
        assert!(s.is_null(1));
        assert!(s.get(1).is_null());
        assert_eq!(s.aggregate(&[0, 1, 2], AggregateKind::Count).unwrap(), Some(Value::Int64(1)));
        assert!(matches!(
            s.convert_xml_to_object("5"),
            Err(StorageError::Unsupported { .. })
        ));
    }
}
