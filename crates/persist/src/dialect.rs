//! Database dialects.

use std::fmt::{self, Write as _};

use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::persister::SqlType;
use crate::{builder_err, config_err};

/// Vendor specific SQL rendering.
pub trait DatabaseType: Send + Sync + fmt::Debug {
    /// Dialect name, used in logs.
    fn name(&self) -> &'static str;

    /// Appends a table or column name in escaped form. Dotted names are escaped per part.
    fn append_escaped_entity_name(&self, sb: &mut String, name: &str) {
        for (i, part) in name.split('.').enumerate() {
            if i > 0 {
                sb.push('.');
            }
            sb.push('`');
            sb.push_str(part);
            sb.push('`');
        }
    }

    /// Appends a literal string value in escaped form.
    fn append_escaped_word(&self, sb: &mut String, word: &str) {
        sb.push('\'');
        sb.push_str(&word.replace('\'', "''"));
        sb.push('\'');
    }

    /// Returns an escaped entity name.
    fn escape_entity_name(&self, name: &str) -> String {
        let mut sb = String::with_capacity(name.len() + 2);
        self.append_escaped_entity_name(&mut sb, name);
        sb
    }

    /// Returns an escaped literal string.
    fn escape_word(&self, word: &str) -> String {
        let mut sb = String::with_capacity(word.len() + 2);
        self.append_escaped_word(&mut sb, word);
        sb
    }

    /// Whether `LIMIT` is rendered straight after `SELECT` rather than at the end.
    fn is_limit_after_select(&self) -> bool {
        false
    }

    /// Whether the dialect renders `LIMIT` at all. When not, the limit is applied as a max
    /// row count on the compiled statement.
    fn is_limit_sql_supported(&self) -> bool {
        true
    }

    /// Appends the limit clause.
    fn append_limit_value(&self, sb: &mut String, limit: u64, _offset: Option<u64>) {
        let _ = write!(sb, "LIMIT {limit} ");
    }

    /// Whether `OFFSET` is supported.
    fn is_offset_sql_supported(&self) -> bool {
        true
    }

    /// Whether the offset is carried inside the limit clause, which then requires a limit.
    fn is_offset_limit_argument(&self) -> bool {
        false
    }

    /// Appends the offset clause.
    fn append_offset_value(&self, sb: &mut String, offset: u64) {
        let _ = write!(sb, "OFFSET {offset} ");
    }

    /// Appends the body of an insert that sets no columns.
    fn append_insert_no_columns(&self, sb: &mut String) {
        sb.push_str("DEFAULT VALUES");
    }

    /// Query reporting the rows changed by the last statement, used when a driver cannot
    /// report the count itself.
    fn rows_changed_query(&self) -> Option<&'static str> {
        None
    }

    /// Column type rendered for `field` in `CREATE TABLE`.
    ///
    /// # Errors
    ///
    /// Fails for SQL types the dialect cannot store.
    fn column_type(&self, field: &FieldDescriptor) -> Result<&'static str> {
        standard_column_type(field)
    }

    /// Appends what makes `field` a database generated id.
    ///
    /// # Errors
    ///
    /// Fails when the dialect has no generated ids.
    fn configure_generated_id(&self, _sb: &mut String, field: &FieldDescriptor) -> Result<()> {
        Err(config_err!("GeneratedId is not supported by database {} for field {field}", self.name()))
    }

    /// Appends what makes `field` an id generated from its sequence.
    ///
    /// # Errors
    ///
    /// Fails when the dialect has no sequences.
    fn configure_generated_id_sequence(&self, _sb: &mut String, field: &FieldDescriptor) -> Result<()> {
        Err(config_err!("GeneratedIdSequence is not supported by database {} for field {field}", self.name()))
    }

    /// Whether generated ids are declared in the trailing `PRIMARY KEY` clause rather than
    /// inline with their column.
    fn is_generated_id_sql_at_end(&self) -> bool {
        true
    }

    /// Whether `CREATE TABLE IF NOT EXISTS` is understood.
    fn is_create_if_not_exists_supported(&self) -> bool {
        false
    }
}

/// Column types shared by most dialects.
///
/// # Errors
///
/// Fails for fields without a storable SQL type.
pub fn standard_column_type(field: &FieldDescriptor) -> Result<&'static str> {
    let column_type = match field.sql_type() {
        SqlType::String => "VARCHAR",
        SqlType::LongString => "TEXT",
        SqlType::Date => "TIMESTAMP",
        SqlType::Boolean => "BOOLEAN",
        SqlType::Char => "CHAR",
        SqlType::Byte => "TINYINT",
        SqlType::ByteArray | SqlType::Serializable | SqlType::Blob => "BLOB",
        SqlType::Short => "SMALLINT",
        SqlType::Integer => "INTEGER",
        SqlType::Long => "BIGINT",
        SqlType::Float => "FLOAT",
        SqlType::Double => "DOUBLE PRECISION",
        SqlType::BigDecimal => "NUMERIC",
        SqlType::Uuid => "UUID",
        SqlType::Other | SqlType::Unknown => {
            return Err(builder_err!("Unknown SQL-type {:?} for field {field}", field.sql_type()));
        }
    };
    Ok(column_type)
}

/// `SQLite` dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl DatabaseType for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn rows_changed_query(&self) -> Option<&'static str> {
        Some("SELECT CHANGES()")
    }

    fn column_type(&self, field: &FieldDescriptor) -> Result<&'static str> {
        // AUTOINCREMENT is only accepted on an INTEGER column, which holds 64 bits anyway
        if field.sql_type() == SqlType::Long && field.is_generated_id() && !field.is_self_generated_id() {
            return Ok("INTEGER");
        }
        standard_column_type(field)
    }

    fn configure_generated_id(&self, sb: &mut String, field: &FieldDescriptor) -> Result<()> {
        if !matches!(field.sql_type(), SqlType::Integer | SqlType::Long) {
            return Err(config_err!(
                "Sqlite requires that auto-increment generated-id be integer or long type (field {field})"
            ));
        }
        sb.push_str(" PRIMARY KEY AUTOINCREMENT");
        Ok(())
    }

    fn is_generated_id_sql_at_end(&self) -> bool {
        false
    }

    fn is_create_if_not_exists_supported(&self) -> bool {
        true
    }
}
