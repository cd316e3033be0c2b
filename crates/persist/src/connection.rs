//! Connection abstraction.
//!
//! The engine never talks to a driver directly. A [`ConnectionSource`] hands out
//! [`DatabaseConnection`]s, which compile statements into [`CompiledStatement`]s whose queries
//! yield [`DatabaseResults`] cursors. Everything here returns [`anyhow::Result`]: driver errors
//! travel through the engine unchanged.

use std::fmt;
use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, NaiveDateTime};
use rust_decimal::Decimal;

use crate::dialect::DatabaseType;
use crate::persister::SqlType;
use crate::statement::StatementType;
use crate::value::{TIMESTAMP_FORMAT, Value};

/// An argument ready to be bound to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundArg {
    /// SQL argument value.
    pub value: Value,
    /// Kind of argument, used by drivers that bind by type.
    pub sql_type: SqlType,
}

impl BoundArg {
    /// Text argument, as used by raw statements.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: Value::Text(value.into()),
            sql_type: SqlType::String,
        }
    }
}

/// Outcome of an INSERT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    /// Rows inserted, `None` when the driver cannot tell.
    pub rows: Option<u64>,
    /// Key generated by the database, when one was requested and produced.
    pub generated_key: Option<i64>,
}

/// Source of connections for the tables of one database.
pub trait ConnectionSource: Send + Sync {
    /// Connection for queries on `table`.
    ///
    /// # Errors
    ///
    /// Returns an error when no connection can be obtained.
    fn read_only_connection(&self, table: &str) -> Result<Arc<dyn DatabaseConnection>>;

    /// Connection for statements that change `table`.
    ///
    /// # Errors
    ///
    /// Returns an error when no connection can be obtained.
    fn read_write_connection(&self, table: &str) -> Result<Arc<dyn DatabaseConnection>>;

    /// Hands a connection back.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection cannot be returned to its pool.
    fn release_connection(&self, connection: Arc<dyn DatabaseConnection>) -> Result<()>;

    /// Pins `connection` so every later request gets it back until it is cleared. Returns
    /// `false` when the source does not support pinning.
    ///
    /// # Errors
    ///
    /// Returns an error when another connection is already pinned.
    fn save_special_connection(&self, _connection: &Arc<dyn DatabaseConnection>) -> Result<bool> {
        Ok(false)
    }

    /// Releases a pinned connection.
    fn clear_special_connection(&self, _connection: &Arc<dyn DatabaseConnection>) {}

    /// Whether every table is served by one shared connection.
    fn is_single_connection(&self, table: &str) -> bool;

    /// Dialect of the database behind this source.
    fn database_type(&self) -> Arc<dyn DatabaseType>;
}

/// One live connection.
pub trait DatabaseConnection: Send + Sync {
    /// Compiles a statement for repeated argument binding and execution.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the statement does not compile.
    fn compile_statement(&self, sql: &str, statement_type: StatementType) -> Result<Box<dyn CompiledStatement>>;

    /// Runs an INSERT, optionally asking for the generated key.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn insert(&self, sql: &str, args: &[BoundArg], want_generated_key: bool) -> Result<InsertOutcome>;

    /// Runs an UPDATE, returning the rows changed when the driver can tell.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn update(&self, sql: &str, args: &[BoundArg]) -> Result<Option<u64>>;

    /// Runs a DELETE, returning the rows removed when the driver can tell.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn delete(&self, sql: &str, args: &[BoundArg]) -> Result<Option<u64>> {
        self.update(sql, args)
    }

    /// Runs a query whose first column of the first row is an integer.
    ///
    /// # Errors
    ///
    /// Returns the driver error, or an error when the query produced no row.
    fn query_for_long(&self, sql: &str, args: &[BoundArg]) -> Result<i64> {
        let mut stmt = self.compile_statement(sql, StatementType::SelectLong)?;
        for (index, arg) in args.iter().enumerate() {
            stmt.set_object(index, arg.value.clone(), arg.sql_type)?;
        }
        let mut results = stmt.run_query()?;
        let value = if results.first()? { results.get_long(0)? } else { None };
        results.close()?;
        stmt.close()?;
        value.ok_or_else(|| anyhow!("No result found in queryForLong: {sql}"))
    }

    /// Runs a statement without arguments.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn execute(&self, sql: &str) -> Result<Option<u64>>;

    /// Whether statements are committed as they run.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn is_auto_commit(&self) -> Result<bool>;

    /// Turns auto-commit on or off. Turning it back on commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;

    /// Commits the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn commit(&self) -> Result<()>;

    /// Rolls back the open transaction.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn rollback(&self) -> Result<()>;
}

/// A compiled statement with positional arguments.
pub trait CompiledStatement: Send {
    /// Binds the argument at zero-based `index`.
    ///
    /// # Errors
    ///
    /// Returns an error once the statement has run, or for an invalid index.
    fn set_object(&mut self, index: usize, value: Value, sql_type: SqlType) -> Result<()>;

    /// Caps the number of rows a query returns.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn set_max_rows(&mut self, max_rows: u64) -> Result<()>;

    /// Runs the statement as a query.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn run_query(&mut self) -> Result<Box<dyn DatabaseResults>>;

    /// Runs the statement as an update, returning the rows changed when the driver can tell.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn run_update(&mut self) -> Result<Option<u64>>;

    /// Runs the statement for its side effects.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn run_execute(&mut self) -> Result<Option<u64>>;

    /// Releases driver resources.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A cursor over query results. Columns are zero-based.
///
/// Drivers provide the raw column values; the typed getters convert them and return `None`
/// for SQL NULL.
pub trait DatabaseResults: Send {
    /// Number of result columns.
    fn column_count(&self) -> usize;

    /// Result column names.
    fn column_names(&self) -> &[String];

    /// Moves to the first row. Returns `false` when there is none.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn first(&mut self) -> Result<bool>;

    /// Moves to the next row. Returns `false` past the last row.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn next(&mut self) -> Result<bool>;

    /// Raw value of a column in the current row.
    ///
    /// # Errors
    ///
    /// Returns an error when there is no current row or the column is out of range.
    fn raw(&self, column: usize) -> Result<&Value>;

    /// Releases the cursor.
    ///
    /// # Errors
    ///
    /// Returns the driver error.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    /// Position of a column by name, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns an error when no column has the name.
    fn find_column(&self, name: &str) -> Result<usize> {
        let names = self.column_names();
        names
            .iter()
            .position(|n| n == name)
            .or_else(|| names.iter().position(|n| n.eq_ignore_ascii_case(name)))
            .ok_or_else(|| anyhow!("missing column '{name}'"))
    }

    /// Whether the column of the current row is NULL.
    ///
    /// # Errors
    ///
    /// Returns an error when there is no current row.
    fn was_null(&self, column: usize) -> Result<bool> {
        Ok(self.raw(column)?.is_null())
    }

    /// # Errors
    ///
    /// Returns an error when the column is not text compatible.
    fn get_string(&self, column: usize) -> Result<Option<String>> {
        nullable(self.raw(column)?, as_string)
    }

    /// # Errors
    ///
    /// Returns an error when the column is not an integer.
    fn get_long(&self, column: usize) -> Result<Option<i64>> {
        nullable(self.raw(column)?, as_i64)
    }

    /// # Errors
    ///
    /// Returns an error when the column is not an integer or is out of range.
    fn get_int(&self, column: usize) -> Result<Option<i32>> {
        nullable(self.raw(column)?, |v| Ok(i32::try_from(as_i64(v)?)?))
    }

    /// # Errors
    ///
    /// Returns an error when the column is not an integer or is out of range.
    fn get_short(&self, column: usize) -> Result<Option<i16>> {
        nullable(self.raw(column)?, |v| Ok(i16::try_from(as_i64(v)?)?))
    }

    /// # Errors
    ///
    /// Returns an error when the column is not an integer or is out of range.
    fn get_byte(&self, column: usize) -> Result<Option<i8>> {
        nullable(self.raw(column)?, |v| Ok(i8::try_from(as_i64(v)?)?))
    }

    /// # Errors
    ///
    /// Returns an error when the column is not boolean compatible.
    fn get_boolean(&self, column: usize) -> Result<Option<bool>> {
        nullable(self.raw(column)?, as_bool)
    }

    /// # Errors
    ///
    /// Returns an error when the column is not a single character.
    fn get_char(&self, column: usize) -> Result<Option<char>> {
        nullable(self.raw(column)?, as_char)
    }

    /// # Errors
    ///
    /// Returns an error when the column is not numeric.
    #[allow(clippy::cast_possible_truncation)]
    fn get_float(&self, column: usize) -> Result<Option<f32>> {
        nullable(self.raw(column)?, |v| as_f64(v).map(|f| f as f32))
    }

    /// # Errors
    ///
    /// Returns an error when the column is not numeric.
    fn get_double(&self, column: usize) -> Result<Option<f64>> {
        nullable(self.raw(column)?, as_f64)
    }

    /// # Errors
    ///
    /// Returns an error when the column is not binary compatible.
    fn get_bytes(&self, column: usize) -> Result<Option<Vec<u8>>> {
        nullable(self.raw(column)?, as_binary)
    }

    /// # Errors
    ///
    /// Returns an error when the column is not a timestamp.
    fn get_timestamp(&self, column: usize) -> Result<Option<NaiveDateTime>> {
        nullable(self.raw(column)?, as_timestamp)
    }

    /// # Errors
    ///
    /// Returns an error when the column is not numeric.
    fn get_decimal(&self, column: usize) -> Result<Option<Decimal>> {
        nullable(self.raw(column)?, as_decimal)
    }
}

/// Fully materialized results, used by drivers that read a whole result set up front.
#[derive(Clone, Default)]
pub struct RowResults {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
}

impl RowResults {
    /// Creates results positioned before the first row.
    #[must_use]
    pub const fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: None,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Debug for RowResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowResults")
            .field("columns", &self.columns)
            .field("rows", &self.rows.len())
            .field("position", &self.position)
            .finish()
    }
}

impl DatabaseResults for RowResults {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_names(&self) -> &[String] {
        &self.columns
    }

    fn first(&mut self) -> Result<bool> {
        self.position = Some(0);
        Ok(!self.rows.is_empty())
    }

    fn next(&mut self) -> Result<bool> {
        let next = self.position.map_or(0, |p| p.saturating_add(1).min(self.rows.len()));
        self.position = Some(next);
        Ok(next < self.rows.len())
    }

    fn raw(&self, column: usize) -> Result<&Value> {
        let Some(row) = self.position.and_then(|p| self.rows.get(p)) else {
            bail!("no current row in results");
        };
        row.get(column).ok_or_else(|| anyhow!("column {column} is out of range, only {} columns", row.len()))
    }
}

fn nullable<T>(value: &Value, convert: impl FnOnce(&Value) -> Result<T>) -> Result<Option<T>> {
    if value.is_null() { Ok(None) } else { convert(value).map(Some) }
}

fn as_string(value: &Value) -> Result<String> {
    match value {
        Value::Text(v) | Value::Enum(v) => Ok(v.clone()),
        Value::Char(c) => Ok(c.to_string()),
        Value::Bytes(bytes) => Ok(String::from_utf8(bytes.clone())?),
        Value::Bool(_)
        | Value::Byte(_)
        | Value::Short(_)
        | Value::Int(_)
        | Value::Long(_)
        | Value::Float(_)
        | Value::Double(_)
        | Value::Decimal(_)
        | Value::Uuid(_)
        | Value::DateTime(_) => Ok(value.to_string()),
        _ => bail!("expected string data type"),
    }
}

fn as_i64(value: &Value) -> Result<i64> {
    if let Some(v) = value.as_i64() {
        return Ok(v);
    }
    match value {
        Value::Bool(v) => Ok(i64::from(*v)),
        Value::Text(raw) => raw.trim().parse().map_err(|_e| anyhow!("unsupported integer: {raw}")),
        _ => bail!("expected int64 data type"),
    }
}

fn as_bool(value: &Value) -> Result<bool> {
    if let Some(v) = value.as_i64() {
        return Ok(v != 0);
    }
    match value {
        Value::Bool(v) => Ok(*v),
        Value::Text(raw) => match raw.as_str() {
            "1" | "true" | "TRUE" => Ok(true),
            "0" | "false" | "FALSE" => Ok(false),
            _ => bail!("unsupported boolean: {raw}"),
        },
        _ => bail!("expected boolean data type"),
    }
}

fn as_char(value: &Value) -> Result<char> {
    match value {
        Value::Char(c) => Ok(*c),
        Value::Text(raw) => {
            let mut chars = raw.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => bail!("expected a single character but got '{raw}'"),
            }
        }
        _ => bail!("expected char data type"),
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(value: &Value) -> Result<f64> {
    if let Some(v) = value.as_i64() {
        return Ok(v as f64);
    }
    match value {
        Value::Float(v) => Ok(f64::from(*v)),
        Value::Double(v) => Ok(*v),
        Value::Text(raw) => raw.trim().parse().map_err(|_e| anyhow!("unsupported number: {raw}")),
        _ => bail!("expected double data type"),
    }
}

fn as_binary(value: &Value) -> Result<Vec<u8>> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Text(raw) => Ok(raw.clone().into_bytes()),
        _ => bail!("expected binary data type"),
    }
}

fn as_timestamp(value: &Value) -> Result<NaiveDateTime> {
    match value {
        Value::DateTime(v) => Ok(*v),
        Value::Text(raw) => {
            if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT) {
                return Ok(parsed);
            }
            if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
                return Ok(parsed);
            }
            if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
                return Ok(parsed.naive_utc());
            }
            bail!("unsupported timestamp: {raw}; expected RFC3339 or \"%Y-%m-%d %H:%M:%S%.f\" format")
        }
        _ => bail!("expected timestamp data type"),
    }
}

fn as_decimal(value: &Value) -> Result<Decimal> {
    if let Some(v) = value.as_i64() {
        return Ok(Decimal::from(v));
    }
    match value {
        Value::Decimal(v) => Ok(*v),
        Value::Double(v) => Ok(Decimal::try_from(*v)?),
        Value::Float(v) => Ok(Decimal::try_from(*v)?),
        Value::Text(raw) => raw.trim().parse().map_err(|_e| anyhow!("unsupported decimal: {raw}")),
        _ => bail!("expected decimal data type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results() -> RowResults {
        RowResults::new(
            vec!["id".to_string(), "Name".to_string(), "created".to_string()],
            vec![
                vec![Value::Long(1), Value::Text("ann".into()), Value::Text("2024-01-15 10:30:45.000000".into())],
                vec![Value::Long(300), Value::Null, Value::Null],
            ],
        )
    }

    #[test]
    fn cursor_moves() {
        let mut rs = results();
        assert!(rs.raw(0).is_err());
        assert!(rs.next().unwrap());
        assert_eq!(rs.get_long(0).unwrap(), Some(1));
        assert!(rs.next().unwrap());
        assert!(!rs.next().unwrap());
        assert!(!rs.next().unwrap());
        assert!(rs.first().unwrap());
        assert_eq!(rs.get_string(1).unwrap().as_deref(), Some("ann"));
    }

    #[test]
    fn typed_getters() {
        let mut rs = results();
        rs.first().unwrap();
        let ts = rs.get_timestamp(2).unwrap().unwrap();
        assert_eq!(ts.format("%H:%M:%S").to_string(), "10:30:45");
        assert!(rs.get_boolean(0).unwrap().unwrap());
        assert!(rs.get_char(1).is_err());

        rs.next().unwrap();
        assert!(rs.was_null(1).unwrap());
        assert_eq!(rs.get_string(1).unwrap(), None);
        assert_eq!(rs.get_short(0).unwrap(), Some(300));
        assert!(rs.get_byte(0).is_err());
    }

    #[test]
    fn columns_by_name() {
        let rs = results();
        assert_eq!(rs.find_column("name").unwrap(), 1);
        let err = rs.find_column("missing").unwrap_err();
        assert_eq!(err.to_string(), "missing column 'missing'");
    }
}
