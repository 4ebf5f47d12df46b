// Table configuration
// Settings the storages read on demand: culture, case sensitivity, date-time handling

use crate::error::{Result, StorageError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use time::UtcOffset;

/// How a DateTime column interprets and normalizes the values stored in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateTimeMode {
    /// Values are wall-clock times in the table's local offset.
    Local,
    /// Values carry no zone information at all.
    Unspecified,
    /// Like `Unspecified`, but offset-bearing input is shifted to local time.
    #[default]
    UnspecifiedLocal,
    /// Values are UTC.
    Utc,
}

/// Number formatting rules used when text is converted to or from numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Culture {
    pub decimal_separator: char,
    pub group_separator: Option<char>,
}

impl Culture {
    /// The culture-neutral rules: `.` separates decimals, `,` groups digits.
    pub const INVARIANT: Culture = Culture {
        decimal_separator: '.',
        group_separator: Some(','),
    };

    /// Rewrites culture-formatted number text into the invariant form Rust parsers expect.
    pub fn normalize_number(&self, text: &str) -> String {
        text.trim()
            .chars()
            .filter(|c| Some(*c) != self.group_separator)
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect()
    }

    /// Rewrites invariant number text into this culture's form.
    pub fn format_number(&self, text: &str) -> String {
        if self.decimal_separator == '.' {
            return text.to_string();
        }
        text.chars()
            .map(|c| if c == '.' { self.decimal_separator } else { c })
            .collect()
    }
}

impl Default for Culture {
    fn default() -> Self {
        Culture::INVARIANT
    }
}

/// Table-level settings, loadable from JSON.
///
/// ```json
/// { "table_name": "orders", "case_sensitive": false, "local_offset_minutes": 60 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub table_name: String,
    pub culture: Culture,
    pub case_sensitive: bool,
    /// Date-time mode given to new DateTime columns.
    pub date_time_mode: DateTimeMode,
    pub local_offset_minutes: i16,
    /// Row capacity reserved up front when the table is created.
    pub initial_capacity: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            table_name: "table".to_string(),
            culture: Culture::INVARIANT,
            case_sensitive: true,
            date_time_mode: DateTimeMode::default(),
            local_offset_minutes: 0,
            initial_capacity: 0,
        }
    }
}

impl StorageConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let config: StorageConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if Some(self.culture.decimal_separator) == self.culture.group_separator {
            return Err(StorageError::Config(format!(
                "decimal and group separator are both '{}'",
                self.culture.decimal_separator
            )));
        }
        if self.culture.decimal_separator.is_ascii_digit() {
            return Err(StorageError::Config(
                "decimal separator cannot be a digit".to_string(),
            ));
        }
        self.local_offset()?;
        Ok(())
    }

    pub fn local_offset(&self) -> Result<UtcOffset> {
        UtcOffset::from_whole_seconds(i32::from(self.local_offset_minutes) * 60).map_err(|_| {
            StorageError::Config(format!(
                "local offset of {} minutes is out of range",
                self.local_offset_minutes
            ))
        })
    }
}
