//! `SQLite` connection source backed by rusqlite.
//!
//! A single connection is shared behind a mutex, so the source reports itself as single
//! connection and batches on it are serialized. Query results are read completely before the
//! lock is released.

#![allow(clippy::significant_drop_tightening)]

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use fromenv::FromEnv;
use parking_lot::Mutex;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection, params_from_iter};
use tracing::instrument;

use crate::connection::{
    BoundArg, CompiledStatement, ConnectionSource, DatabaseConnection, DatabaseResults, InsertOutcome, RowResults,
};
use crate::dialect::{DatabaseType, SqliteDialect};
use crate::persister::SqlType;
use crate::statement::StatementType;
use crate::value::{TIMESTAMP_FORMAT, Value};

/// Options used to open the `SQLite` database, loaded from the environment.
#[derive(Debug, Clone, FromEnv)]
pub struct SqliteOptions {
    /// Path or URI of the database.
    #[env(from = "SQL_DATABASE", default = "file::memory:?cache=shared")]
    pub database: String,
}

impl SqliteOptions {
    /// Reads the options from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the environment holds invalid values.
    pub fn load() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// Connection source handing out one shared `SQLite` connection.
#[derive(Clone)]
pub struct SqliteConnectionSource {
    connection: Arc<SqliteConnection>,
}

impl SqliteConnectionSource {
    /// Opens the database named by the environment.
    ///
    /// # Errors
    ///
    /// Returns an error when the options cannot be loaded or the database cannot be opened.
    pub fn connect() -> Result<Self> {
        Self::connect_with(SqliteOptions::load()?)
    }

    /// Opens the database described by `options`.
    ///
    /// # Errors
    ///
    /// Returns an error when the database cannot be opened.
    #[instrument]
    pub fn connect_with(options: SqliteOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);
        let conn = Connection::open(&options.database).context("failed to open SQLite database")?;
        Ok(Self {
            connection: Arc::new(SqliteConnection {
                conn: Arc::new(Mutex::new(conn)),
            }),
        })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error when the database cannot be opened.
    pub fn in_memory() -> Result<Self> {
        Self::connect_with(SqliteOptions {
            database: ":memory:".to_string(),
        })
    }
}

impl fmt::Debug for SqliteConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteConnectionSource").finish_non_exhaustive()
    }
}

impl ConnectionSource for SqliteConnectionSource {
    #[instrument(skip(self))]
    fn read_only_connection(&self, table: &str) -> Result<Arc<dyn DatabaseConnection>> {
        Ok(Arc::clone(&self.connection) as Arc<dyn DatabaseConnection>)
    }

    #[instrument(skip(self))]
    fn read_write_connection(&self, table: &str) -> Result<Arc<dyn DatabaseConnection>> {
        Ok(Arc::clone(&self.connection) as Arc<dyn DatabaseConnection>)
    }

    fn release_connection(&self, _connection: Arc<dyn DatabaseConnection>) -> Result<()> {
        Ok(())
    }

    fn is_single_connection(&self, _table: &str) -> bool {
        true
    }

    fn database_type(&self) -> Arc<dyn DatabaseType> {
        Arc::new(SqliteDialect)
    }
}

struct SqliteConnection {
    // rusqlite::Connection isn't `Sync`
    conn: Arc<Mutex<Connection>>,
}

impl DatabaseConnection for SqliteConnection {
    fn compile_statement(&self, sql: &str, statement_type: StatementType) -> Result<Box<dyn CompiledStatement>> {
        tracing::trace!(sql, ?statement_type, "compiling statement");
        Ok(Box::new(SqliteStatement {
            conn: Arc::clone(&self.conn),
            sql: sql.to_string(),
            args: Vec::new(),
            max_rows: None,
        }))
    }

    fn insert(&self, sql: &str, args: &[BoundArg], want_generated_key: bool) -> Result<InsertOutcome> {
        let params = to_params(args)?;
        let conn = self.conn.lock();
        let rows = conn.execute(sql, params_from_iter(params.iter())).context("failed to execute insert")?;
        let generated_key = want_generated_key.then(|| conn.last_insert_rowid());
        Ok(InsertOutcome {
            rows: Some(rows as u64),
            generated_key,
        })
    }

    fn update(&self, sql: &str, args: &[BoundArg]) -> Result<Option<u64>> {
        let params = to_params(args)?;
        let conn = self.conn.lock();
        let rows = conn.execute(sql, params_from_iter(params.iter())).context("failed to execute statement")?;
        Ok(Some(rows as u64))
    }

    fn execute(&self, sql: &str) -> Result<Option<u64>> {
        let conn = self.conn.lock();
        let rows = conn.execute(sql, []).context("failed to execute statement")?;
        Ok(Some(rows as u64))
    }

    fn is_auto_commit(&self) -> Result<bool> {
        Ok(self.conn.lock().is_autocommit())
    }

    fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        let conn = self.conn.lock();
        match (auto_commit, conn.is_autocommit()) {
            (false, true) => conn.execute_batch("BEGIN").context("failed to begin transaction")?,
            (true, false) => conn.execute_batch("COMMIT").context("failed to commit transaction")?,
            _ => {}
        }
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            conn.execute_batch("COMMIT").context("failed to commit transaction")?;
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        let conn = self.conn.lock();
        if !conn.is_autocommit() {
            conn.execute_batch("ROLLBACK").context("failed to roll back transaction")?;
        }
        Ok(())
    }
}

struct SqliteStatement {
    conn: Arc<Mutex<Connection>>,
    sql: String,
    args: Vec<SqliteValue>,
    max_rows: Option<u64>,
}

impl CompiledStatement for SqliteStatement {
    fn set_object(&mut self, index: usize, value: Value, sql_type: SqlType) -> Result<()> {
        if self.args.len() <= index {
            self.args.resize(index + 1, SqliteValue::Null);
        }
        self.args[index] = to_sqlite(&value, sql_type)?;
        Ok(())
    }

    fn set_max_rows(&mut self, max_rows: u64) -> Result<()> {
        self.max_rows = Some(max_rows);
        Ok(())
    }

    fn run_query(&mut self) -> Result<Box<dyn DatabaseResults>> {
        tracing::debug!("executing query: {}", self.sql);
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&self.sql).context("failed to prepare statement")?;
        let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

        let mut rows = stmt.query(params_from_iter(self.args.iter())).context("failed to execute query")?;
        let mut result_rows = Vec::new();
        while let Some(row) = rows.next().context("failed to fetch row")? {
            if self.max_rows.is_some_and(|max| result_rows.len() as u64 >= max) {
                break;
            }
            let values = (0..columns.len())
                .map(|i| row.get_ref(i).context("failed to get column value").and_then(from_sqlite))
                .collect::<Result<Vec<_>>>()?;
            result_rows.push(values);
        }
        Ok(Box::new(RowResults::new(columns, result_rows)))
    }

    fn run_update(&mut self) -> Result<Option<u64>> {
        tracing::debug!("executing statement: {}", self.sql);
        let conn = self.conn.lock();
        let rows = conn.execute(&self.sql, params_from_iter(self.args.iter())).context("failed to execute statement")?;
        Ok(Some(rows as u64))
    }

    fn run_execute(&mut self) -> Result<Option<u64>> {
        self.run_update()
    }
}

fn to_params(args: &[BoundArg]) -> Result<Vec<SqliteValue>> {
    args.iter().map(|arg| to_sqlite(&arg.value, arg.sql_type)).collect()
}

fn to_sqlite(value: &Value, sql_type: SqlType) -> Result<SqliteValue> {
    let converted = match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Byte(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Short(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Int(v) => SqliteValue::Integer(i64::from(*v)),
        Value::Long(v) => SqliteValue::Integer(*v),
        Value::Float(v) => SqliteValue::Real(f64::from(*v)),
        Value::Double(v) => SqliteValue::Real(*v),
        Value::Bytes(v) => SqliteValue::Blob(v.clone()),
        Value::DateTime(v) => SqliteValue::Text(v.format(TIMESTAMP_FORMAT).to_string()),
        Value::Char(_) | Value::Text(_) | Value::Decimal(_) | Value::Uuid(_) | Value::Json(_) | Value::Enum(_) => {
            SqliteValue::Text(value.to_string())
        }
        Value::Object(_) => bail!("cannot bind {} as {sql_type:?} argument", value.kind()),
    };
    Ok(converted)
}

fn from_sqlite(value: ValueRef) -> Result<Value> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Long(i)),
        ValueRef::Real(f) => Ok(Value::Double(f)),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(Value::Text(s.to_string()))
        }
        ValueRef::Blob(b) => Ok(Value::Bytes(b.to_vec())),
    }
}
