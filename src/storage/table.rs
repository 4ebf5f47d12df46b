// Table implementation
// A table owns its columns, and each column owns one storage; the table decides
// how many rows exist and tells every storage when the row array grows

use super::{create_storage, AggregateKind, DataStorage};
use crate::config::{Culture, DateTimeMode, StorageConfig};
use crate::error::{Result, StorageError};
use crate::registry::RuntimeType;
use crate::value::Value;
use std::cell::Cell;
use std::cmp::Ordering;
use std::rc::Rc;
use time::UtcOffset;
use tracing::debug;

/// Smallest number of rows added when the table grows.
const MIN_GROWTH: usize = 16;

/// Table-wide settings shared with every column.
///
/// Storages hold an `Rc` to their column, which holds an `Rc` to this, and they
/// read the settings on each call rather than caching them, so changes made
/// through the setters apply to all columns immediately.
#[derive(Debug)]
pub struct TableMeta {
    name: String,
    culture: Cell<Culture>,
    case_sensitive: Cell<bool>,
    local_offset: Cell<UtcOffset>,
}

impl TableMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            culture: Cell::new(Culture::INVARIANT),
            case_sensitive: Cell::new(true),
            local_offset: Cell::new(UtcOffset::UTC),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        config.validate()?;
        let meta = Self::new(config.table_name.clone());
        meta.set_culture(config.culture);
        meta.set_case_sensitive(config.case_sensitive);
        meta.set_local_offset(config.local_offset()?);
        Ok(meta)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn culture(&self) -> Culture {
        self.culture.get()
    }

    pub fn set_culture(&self, culture: Culture) {
        self.culture.set(culture);
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive.get()
    }

    pub fn set_case_sensitive(&self, case_sensitive: bool) {
        self.case_sensitive.set(case_sensitive);
    }

    pub fn local_offset(&self) -> UtcOffset {
        self.local_offset.get()
    }

    pub fn set_local_offset(&self, offset: UtcOffset) {
        self.local_offset.set(offset);
    }
}

/// What a storage knows about the column it serves.
#[derive(Debug)]
pub struct ColumnMeta {
    name: String,
    data_type: RuntimeType,
    date_time_mode: Cell<DateTimeMode>,
    table: Rc<TableMeta>,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, data_type: RuntimeType, table: Rc<TableMeta>) -> Self {
        Self {
            name: name.into(),
            data_type,
            date_time_mode: Cell::new(DateTimeMode::default()),
            table,
        }
    }

    /// A column belonging to a table of its own with default settings.
    pub fn detached(name: impl Into<String>, data_type: RuntimeType) -> Self {
        let name = name.into();
        let table = Rc::new(TableMeta::new(format!("{}_table", name)));
        Self::new(name, data_type, table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &RuntimeType {
        &self.data_type
    }

    pub fn table(&self) -> &TableMeta {
        &self.table
    }

    pub fn culture(&self) -> Culture {
        self.table.culture()
    }

    pub fn case_sensitive(&self) -> bool {
        self.table.case_sensitive()
    }

    pub fn local_offset(&self) -> UtcOffset {
        self.table.local_offset()
    }

    pub fn date_time_mode(&self) -> DateTimeMode {
        self.date_time_mode.get()
    }

    pub fn set_date_time_mode(&self, mode: DateTimeMode) {
        self.date_time_mode.set(mode);
    }
}

/// A column: its metadata plus the storage bound to it.
#[derive(Debug)]
pub struct Column {
    meta: Rc<ColumnMeta>,
    storage: Box<dyn DataStorage>,
}

impl Column {
    pub fn meta(&self) -> &ColumnMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    pub fn storage(&self) -> &dyn DataStorage {
        self.storage.as_ref()
    }
}

/// A table of typed columns
/// Rows are plain indices; every column's storage always has the same capacity
pub struct Table {
    meta: Rc<TableMeta>,
    default_date_time_mode: DateTimeMode,
    columns: Vec<Column>,
    /// Rows handed out by `new_row`
    row_count: usize,
    /// Rows every storage has room for
    capacity: usize,
}

impl Table {
    /// Create an empty table from the given settings
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let mut table = Self {
            meta: Rc::new(TableMeta::from_config(config)?),
            default_date_time_mode: config.date_time_mode,
            columns: Vec::new(),
            row_count: 0,
            capacity: 0,
        };
        if config.initial_capacity > 0 {
            table.grow(config.initial_capacity);
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Add a column and size its storage to the table's current capacity
    /// Returns the index of the new column
    pub fn add_column(&mut self, name: &str, data_type: RuntimeType) -> Result<usize> {
        if self.columns.iter().any(|c| c.name() == name) {
            return Err(StorageError::DuplicateColumn(name.to_string()));
        }
        let meta = Rc::new(ColumnMeta::new(name, data_type, Rc::clone(&self.meta)));
        meta.set_date_time_mode(self.default_date_time_mode);
        let mut storage = create_storage(&meta, Some(meta.data_type()))?;
        storage.set_capacity(self.capacity);
        self.columns.push(Column { meta, storage });
        Ok(self.columns.len() - 1)
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| StorageError::UnknownColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        Ok(&self.columns[self.column_index(name)?])
    }

    fn storage_mut(&mut self, name: &str) -> Result<&mut dyn DataStorage> {
        let index = self.column_index(name)?;
        Ok(self.columns[index].storage.as_mut())
    }

    /// Append a row, growing every storage when the table is full
    /// The new row is null in every column
    pub fn new_row(&mut self) -> usize {
        if self.row_count == self.capacity {
            let capacity = (self.capacity * 2).max(self.capacity + MIN_GROWTH);
            self.grow(capacity);
        }
        self.row_count += 1;
        self.row_count - 1
    }

    fn grow(&mut self, capacity: usize) {
        debug!(table = self.name(), from = self.capacity, to = capacity, "growing table");
        for column in &mut self.columns {
            column.storage.set_capacity(capacity);
        }
        self.capacity = capacity;
    }

    fn check_row(&self, row: usize) -> Result<()> {
        if row < self.row_count {
            Ok(())
        } else {
            Err(StorageError::RowOutOfRange {
                row,
                row_count: self.row_count,
            })
        }
    }

    pub fn set(&mut self, column: &str, row: usize, value: Value) -> Result<()> {
        self.check_row(row)?;
        self.storage_mut(column)?.set(row, value)
    }

    pub fn get(&self, column: &str, row: usize) -> Result<Value> {
        self.check_row(row)?;
        Ok(self.column(column)?.storage().get(row))
    }

    pub fn is_null(&self, column: &str, row: usize) -> Result<bool> {
        self.check_row(row)?;
        Ok(self.column(column)?.storage().is_null(row))
    }

    pub fn string_length(&self, column: &str, row: usize) -> Result<usize> {
        self.check_row(row)?;
        self.column(column)?.storage().string_length(row)
    }

    /// Copy every column of row `src` onto row `dst`
    pub fn copy_row(&mut self, src: usize, dst: usize) -> Result<()> {
        self.check_row(src)?;
        self.check_row(dst)?;
        for column in &mut self.columns {
            column.storage.copy(src, dst);
        }
        Ok(())
    }

    pub fn compare_rows(&self, column: &str, row1: usize, row2: usize) -> Result<Ordering> {
        self.check_row(row1)?;
        self.check_row(row2)?;
        Ok(self.column(column)?.storage().compare(row1, row2))
    }

    pub fn compare_to(&self, column: &str, row: usize, value: &Value) -> Result<Ordering> {
        self.check_row(row)?;
        Ok(self.column(column)?.storage().compare_value_to(row, value))
    }

    /// Aggregate a column over the given rows
    /// `Ok(None)` means the column's type does not support `kind`
    pub fn aggregate(&self, column: &str, rows: &[usize], kind: AggregateKind) -> Result<Option<Value>> {
        for &row in rows {
            self.check_row(row)?;
        }
        self.column(column)?.storage().aggregate(rows, kind)
    }

    /// XML text of a cell; `None` for a null cell
    pub fn to_xml(&self, column: &str, row: usize) -> Result<Option<String>> {
        self.check_row(row)?;
        let storage = self.column(column)?.storage();
        if storage.is_null(row) {
            return Ok(None);
        }
        storage.convert_object_to_xml(&storage.get(row)).map(Some)
    }

    pub fn set_from_xml(&mut self, column: &str, row: usize, text: &str) -> Result<()> {
        self.check_row(row)?;
        let storage = self.storage_mut(column)?;
        let value = storage.convert_xml_to_object(text)?;
        storage.set(row, value)
    }

    /// Build a new table holding copies of `rows`, in the given order
    /// Column data moves through storage snapshots, not row by row through `Value`
    pub fn clone_rows(&self, rows: &[usize]) -> Result<Table> {
        for &row in rows {
            self.check_row(row)?;
        }
        let meta = Rc::new(TableMeta::new(self.name()));
        meta.set_culture(self.meta.culture());
        meta.set_case_sensitive(self.meta.case_sensitive());
        meta.set_local_offset(self.meta.local_offset());

        let mut columns = Vec::with_capacity(self.columns.len());
        for source in &self.columns {
            let column_meta = Rc::new(ColumnMeta::new(
                source.name(),
                source.meta.data_type().clone(),
                Rc::clone(&meta),
            ));
            column_meta.set_date_time_mode(source.meta.date_time_mode());
            let mut storage = create_storage(&column_meta, Some(column_meta.data_type()))?;

            let mut snapshot = source.storage.empty_storage(rows.len());
            for (index, &row) in rows.iter().enumerate() {
                source.storage.copy_value_into(row, &mut snapshot, index)?;
            }
            storage.set_storage(snapshot)?;
            columns.push(Column {
                meta: column_meta,
                storage,
            });
        }
        debug!(table = self.name(), rows = rows.len(), "cloned rows");

        Ok(Table {
            meta,
            default_date_time_mode: self.default_date_time_mode,
            columns,
            row_count: rows.len(),
            capacity: rows.len(),
        })
    }

    /// Format the table as a box-drawn grid for display
    pub fn format(&self) -> String {
        if self.columns.is_empty() {
            return "No columns defined".to_string();
        }

        let header: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} ({})", c.name(), c.meta.data_type()))
            .collect();
        let cells: Vec<Vec<String>> = (0..self.row_count)
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| c.storage.get(row).to_string())
                    .collect()
            })
            .collect();

        // Calculate column widths
        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        let border = |left: &str, middle: &str, right: &str| {
            let parts: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("{}{}{}\n", left, parts.join(middle), right)
        };
        let line = |values: &[String]| {
            let mut out = String::from("│");
            for (value, width) in values.iter().zip(&widths) {
                let pad = width - value.chars().count();
                out.push_str(&format!(" {}{} │", value, " ".repeat(pad)));
            }
            out.push('\n');
            out
        };

        let mut result = border("┌", "┬", "┐");
        result.push_str(&line(&header));
        result.push_str(&border("├", "┼", "┤"));
        for row in &cells {
            result.push_str(&line(row));
        }
        result.push_str(&border("└", "┴", "┘"));
        result.push_str(&format!("\n{} row(s)", self.row_count));
        result
    }
}
