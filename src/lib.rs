// colstore - typed column storage for an in-memory table engine
// This is the library root that exposes the public API

pub mod config;
pub mod error;
pub mod registry;
pub mod storage;
pub mod value;

// Re-export commonly used types for convenience
pub use config::{Culture, DateTimeMode, StorageConfig};
pub use error::{Result, StorageError};
pub use registry::{BuiltinType, Capabilities, CustomType, RuntimeType, StorageType};
pub use storage::{
    create_storage, AggregateKind, Column, ColumnMeta, DataStorage, NullBitmap, StorageSnapshot,
    StorageState, Table, TableMeta,
};
pub use value::{NullableValue, ObjectRef, OpaqueObject, Uri, Value};
