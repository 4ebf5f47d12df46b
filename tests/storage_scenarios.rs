// End-to-end storage scenarios
// Exercises the public API: factory, storages, registry and table

use colstore::registry::{self, BuiltinType};
use colstore::{
    create_storage, AggregateKind, ColumnMeta, CustomType, DataStorage, ObjectRef, OpaqueObject,
    DateTimeMode, RuntimeType, StorageConfig, StorageError, StorageType, Table, Uri, Value,
};
use rust_decimal::Decimal;
use std::any::Any;
use std::cmp::Ordering;
use std::rc::Rc;
use time::macros::{datetime, offset};
use time::Duration;
use uuid::Uuid;

fn storage_for(data_type: RuntimeType, capacity: usize) -> Box<dyn DataStorage> {
    let column = Rc::new(ColumnMeta::detached("c", data_type.clone()));
    let mut storage = create_storage(&column, Some(&data_type)).unwrap();
    storage.set_capacity(capacity);
    storage
}

/// A representative non-null value for every code a column can be declared with.
fn sample(code: StorageType) -> Option<Value> {
    use StorageType as St;
    Some(match code {
        St::Empty | St::DbNull => return None,
        St::Object => Value::from("opaque text"),
        St::Boolean => Value::Boolean(true),
        St::Char => Value::Char('λ'),
        St::SByte => Value::SByte(-5),
        St::Byte => Value::Byte(200),
        St::Int16 => Value::Int16(-1234),
        St::UInt16 => Value::UInt16(60_000),
        St::Int32 => Value::Int32(-123_456),
        St::UInt32 => Value::UInt32(4_000_000_000),
        St::Int64 => Value::Int64(i64::MIN),
        St::UInt64 => Value::UInt64(u64::MAX),
        St::Single => Value::Single(1.25),
        St::Double => Value::Double(0.1),
        St::Decimal => Value::Decimal(Decimal::new(-31_415, 4)),
        St::DateTime => Value::DateTime(datetime!(1999-12-31 23:59:59.5)),
        St::TimeSpan => Value::TimeSpan(Duration::new(93_784, 500_000_000)),
        St::String => Value::from("hello, world"),
        St::Guid => Value::Guid(Uuid::from_u128(0x0123_4567_89ab_cdef_0123_4567_89ab_cdef)),
        St::ByteArray => Value::ByteArray(vec![0, 1, 2, 250, 251]),
        St::CharArray => Value::CharArray(vec!['a', 'ß', 'c']),
        St::Type => Value::Type(BuiltinType::Decimal.into()),
        St::DateTimeOffset => Value::DateTimeOffset(datetime!(2020-06-01 08:30 +02:00)),
        St::Uri => Value::Uri(Uri::parse("https://example.com/a?b=c").unwrap()),
        St::SqlBinary => Value::SqlBinary(Some(vec![9, 8, 7])),
        St::SqlBoolean => Value::SqlBoolean(Some(false)),
        St::SqlByte => Value::SqlByte(Some(17)),
        St::SqlBytes => Value::SqlBytes(Some(vec![255])),
        St::SqlChars => Value::SqlChars(Some(vec!['x', 'y'])),
        St::SqlDateTime => Value::SqlDateTime(Some(datetime!(2001-02-03 04:05:06))),
        St::SqlDecimal => Value::SqlDecimal(Some(Decimal::new(5, 1))),
        St::SqlDouble => Value::SqlDouble(Some(-2.5e-10)),
        St::SqlGuid => Value::SqlGuid(Some(Uuid::nil())),
        St::SqlInt16 => Value::SqlInt16(Some(-7)),
        St::SqlInt32 => Value::SqlInt32(Some(70_000)),
        St::SqlInt64 => Value::SqlInt64(Some(1 << 40)),
        St::SqlMoney => Value::SqlMoney(Some(Decimal::new(123_456, 4))),
        St::SqlSingle => Value::SqlSingle(Some(3.5)),
        St::SqlString => Value::SqlString(Some("sql text".to_string())),
    })
}

/// Stores `value` in row 0 and checks that it reads back and survives its XML text.
fn assert_stores_and_encodes(s: &mut dyn DataStorage, value: &Value) {
    s.set(0, value.clone()).unwrap();
    assert_eq!(&s.get(0), value, "{} set/get", s.storage_type());
    assert!(!s.is_null(0));

    let text = s.convert_object_to_xml(value).unwrap();
    assert_eq!(&s.convert_xml_to_object(&text).unwrap(), value, "xml '{}'", text);
}

#[derive(Debug)]
struct Widget {
    id: u32,
}

impl OpaqueObject for Widget {
    fn type_name(&self) -> &str {
        "Widget"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn test_scenario_a_int32_count_and_compare() {
    let mut s = storage_for(BuiltinType::Int32.into(), 5);
    s.set(0, Value::Int32(42)).unwrap();
    s.set(2, Value::Int32(-7)).unwrap();
    let rows = [0, 1, 2, 3, 4];
    assert_eq!(
        s.aggregate(&rows, AggregateKind::Count).unwrap(),
        Some(Value::Int64(2))
    );
    assert_eq!(s.compare(0, 2), Ordering::Greater);
    assert!(s.is_null(1));
}

#[test]
fn test_scenario_b_string_null() {
    let mut s = storage_for(BuiltinType::String.into(), 1);
    s.set(0, Value::from("present")).unwrap();
    s.set(0, Value::DbNull).unwrap();
    assert_eq!(s.get(0), Value::DbNull);
    assert!(s.is_null(0));
}

#[test]
fn test_scenario_c_opaque_class_round_trips_by_reference() {
    let data_type = CustomType::new("Widget").into_type();
    let mut s = storage_for(data_type, 2);
    let widget = ObjectRef::new(Widget { id: 9 });
    s.set(1, Value::Object(widget.clone())).unwrap();
    match s.get(1) {
        Value::Object(got) => {
            assert!(got.ptr_eq(&widget));
            assert_eq!(got.downcast_ref::<Widget>().map(|w| w.id), Some(9));
        }
        other => panic!("expected the stored widget, got {:?}", other),
    }
    assert!(s.is_null(0));
}

#[test]
fn test_scenario_d_invalid_declared_types() {
    let column = Rc::new(ColumnMeta::detached("nothing", BuiltinType::DbNull.into()));
    let db_null = RuntimeType::from(BuiltinType::DbNull);
    assert!(matches!(
        create_storage(&column, Some(&db_null)),
        Err(StorageError::InvalidStorageType {
            storage_type: StorageType::DbNull,
            ..
        })
    ));
    assert!(matches!(
        create_storage(&column, None),
        Err(StorageError::InvalidStorageType {
            storage_type: StorageType::Empty,
            ..
        })
    ));
}

#[test]
fn test_registry_round_trip_and_self_check() {
    registry::verify().unwrap();
    for code in StorageType::all().filter(|c| *c != StorageType::Empty) {
        let data_type = registry::type_of(code).unwrap();
        assert_eq!(registry::classify(&data_type), code, "{}", code);
    }
    assert_eq!(registry::type_of(StorageType::Empty), None);
}

#[test]
fn test_every_type_stores_and_encodes_its_values() {
    for code in StorageType::all() {
        let Some(value) = sample(code) else {
            continue;
        };
        let data_type = registry::type_of(code).unwrap();
        let mut s = storage_for(data_type, 2);
        assert!(s.is_null(0), "{} starts null", code);

        assert_stores_and_encodes(s.as_mut(), &value);

        s.copy(0, 1);
        assert_eq!(s.get(1), s.get(0), "{} copy", code);
        s.set(0, Value::DbNull).unwrap();
        assert!(s.is_null(0));
        assert_eq!(&s.get(0), s.null_value());
    }
}

#[test]
fn test_capacity_growth_keeps_prefix() {
    let mut s = storage_for(BuiltinType::Double.into(), 3);
    s.set(0, Value::Double(1.5)).unwrap();
    s.set(2, Value::Double(2.5)).unwrap();
    s.set_capacity(10);
    assert_eq!(s.get(0), Value::Double(1.5));
    assert!(s.is_null(1));
    assert_eq!(s.get(2), Value::Double(2.5));
    assert!((3..10).all(|row| s.is_null(row)));
}

#[test]
fn test_compare_is_antisymmetric_with_nulls_first() {
    let mut s = storage_for(BuiltinType::String.into(), 4);
    s.set(0, Value::from("pear")).unwrap();
    s.set(1, Value::from("apple")).unwrap();
    s.set(3, Value::from("pear")).unwrap();
    for a in 0..4 {
        for b in 0..4 {
            assert_eq!(s.compare(a, b), s.compare(b, a).reverse(), "rows {} and {}", a, b);
        }
    }
    assert_eq!(s.compare(2, 1), Ordering::Less);
    assert_eq!(s.compare(0, 3), Ordering::Equal);
}

#[test]
fn test_count_matches_not_null_rows() {
    let mut s = storage_for(BuiltinType::SqlInt64.into(), 6);
    for row in [0, 3, 5] {
        s.set(row, Value::SqlInt64(Some(row as i64))).unwrap();
    }
    s.set(3, Value::SqlInt64(None)).unwrap();
    let rows: Vec<usize> = (0..6).collect();
    let expected = rows.iter().filter(|&&r| !s.is_null(r)).count() as i64;
    assert_eq!(expected, 2);
    assert_eq!(
        s.aggregate(&rows, AggregateKind::Count).unwrap(),
        Some(Value::Int64(expected))
    );
}

#[test]
fn test_table_from_json_config() {
    let config = StorageConfig::from_json(
        r#"{ "table_name": "people", "case_sensitive": false, "initial_capacity": 4 }"#,
    )
    .unwrap();
    let mut table = Table::new(&config).unwrap();
    table.add_column("name", BuiltinType::String.into()).unwrap();
    table.add_column("balance", BuiltinType::Decimal.into()).unwrap();
    assert_eq!(table.capacity(), 4);

    for (name, balance) in [("Ann", "10.50"), ("ANN", "2.25")] {
        let row = table.new_row();
        table.set("name", row, Value::from(name)).unwrap();
        table.set("balance", row, Value::from(balance)).unwrap();
    }
    assert_eq!(table.compare_rows("name", 0, 1).unwrap(), Ordering::Equal);
    assert_eq!(
        table.aggregate("balance", &[0, 1], AggregateKind::Sum).unwrap(),
        Some(Value::Decimal(Decimal::new(1275, 2)))
    );
    assert_eq!(table.clone_rows(&[1]).unwrap().get("name", 0).unwrap(), Value::from("ANN"));
}

#[test]
fn test_edge_values_store_and_encode() {
    let color = RuntimeType::enumeration("Color", BuiltinType::Byte);
    let cases = [
        (BuiltinType::Type, Value::Type(color.clone())),
        (BuiltinType::Type, Value::Type(RuntimeType::nullable(BuiltinType::Int32.into()))),
        (BuiltinType::Type, Value::Type(RuntimeType::nullable(color))),
        (BuiltinType::Type, Value::Type(RuntimeType::enumeration("Flags", BuiltinType::String))),
        (BuiltinType::DateTimeOffset, Value::DateTimeOffset(datetime!(2020-01-01 5:30:15 +05:30:15))),
        (BuiltinType::DateTimeOffset, Value::DateTimeOffset(datetime!(1969-07-20 20:17:40.5 -04:00:30))),
        (BuiltinType::TimeSpan, Value::TimeSpan(Duration::new(-1, -500_000_000))),
        (BuiltinType::TimeSpan, Value::TimeSpan(Duration::nanoseconds(-1))),
        (BuiltinType::TimeSpan, Value::TimeSpan(Duration::MIN)),
        (BuiltinType::TimeSpan, Value::TimeSpan(Duration::MAX)),
        (BuiltinType::Double, Value::Double(f64::INFINITY)),
        (BuiltinType::Double, Value::Double(f64::NEG_INFINITY)),
        (BuiltinType::Single, Value::Single(f32::NEG_INFINITY)),
        (BuiltinType::SqlDouble, Value::SqlDouble(Some(f64::INFINITY))),
        (BuiltinType::SqlSingle, Value::SqlSingle(Some(f32::INFINITY))),
        (BuiltinType::String, Value::from("")),
        (BuiltinType::SqlString, Value::SqlString(Some(String::new()))),
        (BuiltinType::ByteArray, Value::ByteArray(Vec::new())),
        (BuiltinType::SqlBinary, Value::SqlBinary(Some(Vec::new()))),
        (BuiltinType::CharArray, Value::CharArray(Vec::new())),
    ];
    for (builtin, value) in cases {
        let mut s = storage_for(builtin.into(), 1);
        assert_stores_and_encodes(s.as_mut(), &value);
    }
}

#[test]
fn test_nan_survives_xml() {
    let mut s = storage_for(BuiltinType::Double.into(), 1);
    s.set(0, Value::Double(f64::NAN)).unwrap();
    let text = s.convert_object_to_xml(&s.get(0)).unwrap();
    assert_eq!(text, "NaN");
    match s.convert_xml_to_object(&text).unwrap() {
        Value::Double(v) => assert!(v.is_nan()),
        other => panic!("expected a double, got {:?}", other),
    }
}

#[test]
fn test_custom_types_are_not_type_values() {
    let mut s = storage_for(BuiltinType::Type.into(), 1);
    let point = CustomType::new("Point").into_type();
    assert!(matches!(
        s.set(0, Value::Type(point)),
        Err(StorageError::Conversion { target: StorageType::Type, .. })
    ));
    assert!(s.is_null(0));
}

#[test]
fn test_date_times_survive_xml_in_every_mode() {
    let values = [
        datetime!(2024-02-29 23:59:59),
        datetime!(1900-01-01 0:00:00.000000001),
    ];
    for mode in [
        DateTimeMode::Utc,
        DateTimeMode::Local,
        DateTimeMode::Unspecified,
        DateTimeMode::UnspecifiedLocal,
    ] {
        let column = ColumnMeta::detached("when", BuiltinType::DateTime.into());
        column.table().set_local_offset(offset!(-09:30:15));
        column.set_date_time_mode(mode);
        let column = Rc::new(column);
        let data_type = RuntimeType::from(BuiltinType::DateTime);
        let mut s = create_storage(&column, Some(&data_type)).unwrap();
        s.set_capacity(1);
        for value in values {
            assert_stores_and_encodes(s.as_mut(), &Value::DateTime(value));
        }
    }
}

