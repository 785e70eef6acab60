//! Shared CONFIG_DB types.
//!
//! Database identifiers, connection defaults and the field-value helpers
//! used to decode table rows.

/// Database identifiers used by cfgmgr daemons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbId {
    /// Configuration database (CONFIG_DB) - source of configuration.
    ConfigDb,
}

impl DbId {
    /// Returns the database ID number.
    pub fn id(&self) -> u32 {
        match self {
            DbId::ConfigDb => 4,
        }
    }
}

/// Default connection values shared by cfgmgr daemons.
pub mod defaults {
    /// Default Redis host.
    pub const REDIS_HOST: &str = "127.0.0.1";

    /// Default Redis port.
    pub const REDIS_PORT: u16 = 6379;
}

/// Key-value tuple representing a field and its value.
pub type FieldValue = (String, String);

/// Collection of field-value pairs for a table entry.
pub type FieldValues = Vec<FieldValue>;

/// Helper trait for working with field-value collections.
pub trait FieldValuesExt {
    /// Gets the value for a field, if present.
    fn get_field(&self, field: &str) -> Option<&str>;

    /// Gets a field value, treating an empty string the same as absence.
    fn get_non_empty(&self, field: &str) -> Option<&str> {
        self.get_field(field).filter(|v| !v.is_empty())
    }
}

impl FieldValuesExt for FieldValues {
    fn get_field(&self, field: &str) -> Option<&str> {
        self.iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v.as_str())
    }
}

/// Builds a FieldValues collection from key-value pairs.
#[macro_export]
macro_rules! field_values {
    ($($field:expr => $value:expr),* $(,)?) => {
        vec![
            $(($field.to_string(), $value.to_string()),)*
        ]
    };
}
