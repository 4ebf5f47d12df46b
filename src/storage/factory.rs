// Storage factory
// Picks the storage strategy for a column once, from its declared type

use super::native::with_native_kind;
use super::object::{ObjectStorage, UdtStorage};
use super::typed::TypedStorage;
use super::DataStorage;
use crate::error::{Result, StorageError};
use crate::registry::{self, RuntimeType, StorageType};
use crate::storage::table::ColumnMeta;
use std::rc::Rc;
use std::sync::Once;
use tracing::{debug, error};

static VERIFY_REGISTRY: Once = Once::new();

/// Creates the storage for `column`, bound to it for the column's whole life.
///
/// Types outside the fixed set get an opaque storage: custom types that can hold
/// their own null get a [`UdtStorage`], everything else an [`ObjectStorage`].
/// A column without a type, or declared as the null marker type, is rejected
/// with [`StorageError::InvalidStorageType`].
pub fn create_storage(
    column: &Rc<ColumnMeta>,
    data_type: Option<&RuntimeType>,
) -> Result<Box<dyn DataStorage>> {
    VERIFY_REGISTRY.call_once(|| {
        if let Err(problem) = registry::verify() {
            error!(%problem, "type registry is inconsistent");
            debug_assert!(false, "type registry is inconsistent: {}", problem);
        }
    });

    let invalid = |storage_type| StorageError::InvalidStorageType {
        storage_type,
        column: column.name().to_string(),
    };
    let Some(data_type) = data_type else {
        return Err(invalid(StorageType::Empty));
    };

    let code = registry::classify(data_type);
    debug!(column = column.name(), data_type = %data_type, storage_type = %code, "selecting storage");
    let storage: Box<dyn DataStorage> = match code {
        StorageType::Empty => match data_type.as_custom() {
            Some(custom) if registry::describe_interfaces(code, data_type).sql_nullable => {
                Box::new(UdtStorage::new(Rc::clone(column), Rc::clone(custom)))
            }
            _ => Box::new(ObjectStorage::new(Rc::clone(column), data_type.clone())),
        },
        StorageType::DbNull => return Err(invalid(StorageType::DbNull)),
        StorageType::Object => Box::new(ObjectStorage::new(Rc::clone(column), data_type.clone())),
        code => with_native_kind!(code, K => {
            Box::new(TypedStorage::<K>::new(Rc::clone(column), data_type.clone())) as Box<dyn DataStorage>
        }, _ => {
            debug_assert!(false, "{} has no native kind", code);
            Box::new(ObjectStorage::new(Rc::clone(column), data_type.clone())) as Box<dyn DataStorage>
        }),
    };
    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{BuiltinType, Capabilities, CustomType};
    use crate::value::Value;

    fn column(data_type: RuntimeType) -> Rc<ColumnMeta> {
        Rc::new(ColumnMeta::detached("c", data_type))
    }

    #[test]
    fn test_every_builtin_code_gets_matching_storage() {
        for code in StorageType::all() {
            let Some(data_type) = registry::type_of(code) else {
                continue;
            };
            let result = create_storage(&column(data_type.clone()), Some(&data_type));
            if code == StorageType::DbNull {
                assert!(matches!(result, Err(StorageError::InvalidStorageType { .. })));
            } else {
                assert_eq!(result.unwrap().storage_type(), code);
            }
        }
    }

    #[test]
    fn test_missing_type_is_invalid() {
        let c = column(BuiltinType::Object.into());
        assert!(matches!(
            create_storage(&c, None),
            Err(StorageError::InvalidStorageType {
                storage_type: StorageType::Empty,
                ..
            })
        ));
    }

    #[test]
    fn test_enum_columns_use_their_underlying_storage() {
        let data_type = RuntimeType::enumeration("Color", BuiltinType::Byte);
        let storage = create_storage(&column(data_type.clone()), Some(&data_type)).unwrap();
        assert_eq!(storage.storage_type(), StorageType::Byte);
    }

    #[test]
    fn test_nullable_capability_selects_udt_storage() {
        let plain = CustomType::new("Shape").into_type();
        let mut storage = create_storage(&column(plain.clone()), Some(&plain)).unwrap();
        storage.set_capacity(1);
        assert_eq!(storage.null_value(), &Value::DbNull);
        assert!(format!("{:?}", storage).starts_with("ObjectStorage"));

        let nullable = CustomType::new("Amount")
            .with_capabilities(Capabilities {
                nullable_value: true,
                ..Capabilities::default()
            })
            .into_type();
        let storage = create_storage(&column(nullable.clone()), Some(&nullable)).unwrap();
        assert!(format!("{:?}", storage).starts_with("UdtStorage"));
    }

    #[test]
    fn test_type_facts_are_cached_at_construction() {
        let amount = CustomType::new("Amount")
            .value_type(true)
            .with_capabilities(Capabilities {
                nullable_value: true,
                revertible_change_tracking: true,
                ..Capabilities::default()
            })
            .into_type();
        let flags = create_storage(&column(amount.clone()), Some(&amount)).unwrap().flags();
        assert!(flags.value_type);
        assert!(flags.interfaces.sql_nullable);
        assert!(flags.interfaces.change_tracking);
        assert!(flags.interfaces.revertible_change_tracking);
        assert!(!flags.interfaces.xml_serializable);

        let sql = RuntimeType::from(BuiltinType::SqlInt32);
        let flags = create_storage(&column(sql.clone()), Some(&sql)).unwrap().flags();
        assert!(flags.value_type);
        assert!(flags.interfaces.sql_nullable && flags.interfaces.xml_serializable);

        let wrapper = RuntimeType::nullable(BuiltinType::Int32.into());
        let flags = create_storage(&column(wrapper.clone()), Some(&wrapper)).unwrap().flags();
        assert!(flags.interfaces.nullable_wrapper);
        assert!(!flags.interfaces.sql_nullable);

        let text = RuntimeType::from(BuiltinType::String);
        let flags = create_storage(&column(text.clone()), Some(&text)).unwrap().flags();
        assert!(!flags.value_type);
        assert_eq!(flags.interfaces, crate::registry::InterfaceSet::default());
    }
}
