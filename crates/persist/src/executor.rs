//! Statement execution.
//!
//! A [`Database`] ties a [`Schema`] to a [`ConnectionSource`] and an optional object cache.
//! Each table is worked on through a [`StatementExecutor`], obtained with
//! [`Database::executor`]:
//!
//! ```ignore
//! let db = Database::builder(schema, Arc::new(SqliteConnectionSource::new(options)?))
//!     .object_cache(Arc::new(LruObjectCache::new(1_000)))
//!     .build();
//! let accounts = db.executor("account")?;
//!
//! let mut account = Record::new("account").with("name", "foo");
//! accounts.create(&mut account)?;
//!
//! let mut qb = accounts.query_builder();
//! qb.r#where().eq("name", "foo")?;
//! let found = accounts.query(&qb.prepare()?)?;
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::{ReentrantMutex, RwLock};

use crate::arg::SelectArg;
use crate::builder_err;
use crate::cache::ObjectCache;
use crate::collection::{CloseableIterator, ForeignCollection};
use crate::connection::{BoundArg, CompiledStatement, ConnectionSource, DatabaseConnection, DatabaseResults};
use crate::ddl;
use crate::delete::DeleteBuilder;
use crate::dialect::DatabaseType;
use crate::error::Result;
use crate::foreign::{ParentInfo, ResolveContext};
use crate::mapped::{self, MappedStatements, RowMapper};
use crate::select::SelectBuilder;
use crate::statement::{PreparedStmt, StatementType};
use crate::table::{Schema, TableDescriptor};
use crate::update::UpdateBuilder;
use crate::value::{Record, Value};

/// Receives a notification after statements change a table.
pub trait ChangeObserver: Send + Sync {
    /// Called once per changing statement, or once per batch.
    fn on_change(&self, table: &str);
}

impl<F> ChangeObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_change(&self, table: &str) {
        self(table);
    }
}

struct Inner {
    schema: Arc<Schema>,
    source: Arc<dyn ConnectionSource>,
    dialect: Arc<dyn DatabaseType>,
    cache: Option<Arc<dyn ObjectCache>>,
    observers: RwLock<Vec<Arc<dyn ChangeObserver>>>,
    // open batches per thread and table
    batching: DashMap<(ThreadId, String), u32>,
    batch_lock: ReentrantMutex<()>,
    mapped: DashMap<String, Arc<MappedStatements>>,
}

/// Shared database context. Cloning is cheap.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

/// Non-owning handle to a [`Database`], held by collections so that cached records do not
/// keep their database alive.
#[derive(Clone)]
pub struct WeakDatabase {
    inner: Weak<Inner>,
}

impl WeakDatabase {
    /// The database, while it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Database> {
        self.inner.upgrade().map(|inner| Database { inner })
    }
}

/// Builder for [`Database`].
pub struct DatabaseBuilder {
    schema: Schema,
    source: Arc<dyn ConnectionSource>,
    cache: Option<Arc<dyn ObjectCache>>,
}

impl DatabaseBuilder {
    /// Stores hydrated records in `cache` and serves lookups by id from it.
    #[must_use]
    pub fn object_cache(mut self, cache: Arc<dyn ObjectCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Builds the database context.
    #[must_use]
    pub fn build(self) -> Database {
        let dialect = self.source.database_type();
        tracing::debug!(dialect = dialect.name(), cached = self.cache.is_some(), "database context created");
        Database {
            inner: Arc::new(Inner {
                schema: Arc::new(self.schema),
                source: self.source,
                dialect,
                cache: self.cache,
                observers: RwLock::new(Vec::new()),
                batching: DashMap::new(),
                batch_lock: ReentrantMutex::new(()),
                mapped: DashMap::new(),
            }),
        }
    }
}

impl Database {
    /// Starts building a database context for `schema` on connections from `source`.
    #[must_use]
    pub fn builder(schema: Schema, source: Arc<dyn ConnectionSource>) -> DatabaseBuilder {
        DatabaseBuilder {
            schema,
            source,
            cache: None,
        }
    }

    /// Table descriptors.
    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Dialect of the connection source.
    #[must_use]
    pub fn dialect(&self) -> &Arc<dyn DatabaseType> {
        &self.inner.dialect
    }

    /// Object cache, when one is configured.
    #[must_use]
    pub fn object_cache(&self) -> Option<&Arc<dyn ObjectCache>> {
        self.inner.cache.as_ref()
    }

    /// Non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakDatabase {
        WeakDatabase {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Executor for `table`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) for a table missing from the schema.
    pub fn executor(&self, table: &str) -> Result<StatementExecutor> {
        let descriptor = Arc::clone(self.schema().table(table)?);
        let mapped = match self.inner.mapped.get(table) {
            Some(mapped) => Arc::clone(&mapped),
            None => {
                let built = Arc::new(MappedStatements::build(self.dialect().as_ref(), &descriptor));
                Arc::clone(self.inner.mapped.entry(table.to_string()).or_insert(built).value())
            }
        };
        Ok(StatementExecutor {
            db: self.clone(),
            table: descriptor,
            mapped,
        })
    }

    /// Creates every table of the schema. Returns the number of statements run.
    ///
    /// # Errors
    ///
    /// Fails for columns the dialect cannot declare, and with driver errors.
    pub fn create_tables(&self, if_not_exists: bool) -> Result<u64> {
        let mut names: Vec<_> = self.schema().tables().map(|t| t.name().to_string()).collect();
        names.sort();
        let mut executed = 0;
        for name in names {
            let executor = self.executor(&name)?;
            executed += if if_not_exists { executor.create_table_if_not_exists()? } else { executor.create_table()? };
        }
        Ok(executed)
    }

    /// Registers an observer notified after statements change a table.
    pub fn register_observer(&self, observer: Arc<dyn ChangeObserver>) {
        self.inner.observers.write().push(observer);
    }

    /// Notifies observers that `table` changed, unless the current thread is inside a batch on
    /// that table.
    pub fn notify_changes(&self, table: &str) {
        if self.inner.batching.contains_key(&(thread::current().id(), table.to_string())) {
            return;
        }
        let observers = self.inner.observers.read().clone();
        for observer in observers {
            observer.on_change(table);
        }
    }

    /// Drops every cached record.
    pub fn clear_object_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache.clear_all();
        }
    }

    pub(crate) fn release_connection(&self, connection: Arc<dyn DatabaseConnection>) -> Result<()> {
        Ok(self.inner.source.release_connection(connection)?)
    }

    /// Runs `f` on a connection for `table`, releasing the connection afterwards.
    fn with_connection<T>(
        &self, table: &str, read_write: bool, f: impl FnOnce(&dyn DatabaseConnection) -> Result<T>,
    ) -> Result<T> {
        let connection = if read_write {
            self.inner.source.read_write_connection(table)?
        } else {
            self.inner.source.read_only_connection(table)?
        };
        let result = f(connection.as_ref());
        let released = self.release_connection(connection);
        let value = result?;
        released?;
        Ok(value)
    }

    /// Rows changed by the statement just run. When the driver could not report a count the
    /// dialect's rows-changed query is asked; if that fails too one row is assumed, since the
    /// statement itself succeeded.
    pub(crate) fn rows_changed(&self, connection: &dyn DatabaseConnection, reported: Option<u64>, sql: &str) -> u64 {
        if let Some(rows) = reported {
            return rows;
        }
        let Some(query) = self.inner.dialect.rows_changed_query() else {
            tracing::warn!(sql, "driver reported no row count, assuming 1 row changed");
            return 1;
        };
        match connection.query_for_long(query, &[]) {
            Ok(rows) => u64::try_from(rows).unwrap_or_default(),
            Err(e) => {
                tracing::warn!(sql, query, error = %e, "rows-changed query failed, assuming 1 row changed");
                1
            }
        }
    }

    /// Runs a mapped select and collects every row.
    pub(crate) fn query_with(
        &self, prepared: &PreparedStmt, parent: Option<&ParentInfo>, ctx: &mut ResolveContext,
    ) -> Result<Vec<Record>> {
        let mut mapper = row_mapper(prepared, parent.cloned())?;
        let table = prepared.table().name();
        self.with_connection(table, false, |connection| {
            let mut statement = compile(connection, prepared)?;
            let mut results = statement.run_query()?;
            let mut rows = Vec::new();
            let mut more = results.first()?;
            while more {
                rows.push(mapper.map_row(self, ctx, results.as_ref())?);
                more = results.next()?;
            }
            results.close()?;
            statement.close()?;
            tracing::debug!(table, sql = prepared.statement(), rows = rows.len(), "query returned rows");
            Ok(rows)
        })
    }

    /// Opens a cursor over a mapped select. The connection stays checked out until the
    /// iterator is closed.
    pub(crate) fn iterator_with(&self, prepared: &PreparedStmt, parent: Option<ParentInfo>) -> Result<CloseableIterator> {
        let mapper = row_mapper(prepared, parent)?;
        let table = prepared.table().name();
        let connection = self.inner.source.read_only_connection(table)?;
        let opened = compile(connection.as_ref(), prepared)
            .and_then(|mut statement| Ok((statement.run_query()?, statement)));
        match opened {
            Ok((results, statement)) => {
                tracing::debug!(table, sql = prepared.statement(), "opened iterator");
                CloseableIterator::open(self.clone(), connection, statement, results, mapper)
            }
            Err(e) => {
                self.release_connection(connection)?;
                Err(e)
            }
        }
    }

    /// Fetches the row of `table` whose field `field` equals `value`.
    pub(crate) fn query_for_field_eq(
        &self, table: &str, field: &str, value: &Value, ctx: &mut ResolveContext,
    ) -> Result<Option<Record>> {
        let executor = self.executor(table)?;
        let descriptor = &executor.table;
        let Some(target) = descriptor.field_by_name(field) else {
            return Err(builder_err!("Table {table} has no field {field}"));
        };
        if target.is_id() {
            return self.with_connection(table, false, |connection| {
                executor.mapped.query_for_id(self, connection, ctx, value)
            });
        }
        let sql = mapped::select_by_field(self.dialect().as_ref(), descriptor, target);
        let arg = BoundArg {
            value: target.to_sql_arg(value)?,
            sql_type: target.sql_type(),
        };
        self.with_connection(table, false, |connection| {
            mapped::query_for_one(self, connection, ctx, descriptor, &sql, arg, true, "query-for-field")
        })
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.inner.dialect.name())
            .field("tables", &self.inner.schema.tables().count())
            .field("cached", &self.inner.cache.is_some())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for WeakDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakDatabase").field("alive", &(self.inner.strong_count() > 0)).finish()
    }
}

fn compile(connection: &dyn DatabaseConnection, prepared: &PreparedStmt) -> Result<Box<dyn CompiledStatement>> {
    // argument errors surface before anything reaches the connection
    let args = prepared.bind_args()?;
    let mut statement = connection.compile_statement(prepared.statement(), prepared.statement_type())?;
    tracing::trace!(args = ?args, "binding arguments");
    for (index, arg) in args.into_iter().enumerate() {
        statement.set_object(index, arg.value, arg.sql_type)?;
    }
    if let Some(max_rows) = prepared.max_rows() {
        statement.set_max_rows(max_rows)?;
    }
    Ok(statement)
}

fn row_mapper(prepared: &PreparedStmt, parent: Option<ParentInfo>) -> Result<RowMapper> {
    if prepared.statement_type() != StatementType::Select {
        return Err(builder_err!(
            "{:?} statement cannot be mapped to records: {}",
            prepared.statement_type(),
            prepared.statement()
        ));
    }
    let fields = prepared.result_fields().map_or_else(|| prepared.table().fields().to_vec(), <[_]>::to_vec);
    Ok(RowMapper::new(Arc::clone(prepared.table()), fields, parent, prepared.is_cache_store()))
}

/// Rows of a raw query, every column read as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResults {
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
}

impl RawResults {
    fn read(results: &mut dyn DatabaseResults) -> Result<Self> {
        let columns = results.column_names().to_vec();
        let mut rows = Vec::new();
        let mut more = results.first()?;
        while more {
            let row = (0..columns.len()).map(|i| results.get_string(i)).collect::<anyhow::Result<Vec<_>>>()?;
            rows.push(row);
            more = results.next()?;
        }
        Ok(Self { columns, rows })
    }

    /// Column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows, in result order.
    #[must_use]
    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    /// First row, if any.
    #[must_use]
    pub fn first_result(&self) -> Option<&[Option<String>]> {
        self.rows.first().map(Vec::as_slice)
    }

    /// Takes the rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Vec<Option<String>>> {
        self.rows
    }
}

/// Runs statements against one table.
#[derive(Clone)]
pub struct StatementExecutor {
    db: Database,
    table: Arc<TableDescriptor>,
    mapped: Arc<MappedStatements>,
}

impl StatementExecutor {
    /// Table descriptor.
    #[must_use]
    pub const fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    /// Database context.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// New select builder on this table.
    #[must_use]
    pub fn query_builder(&self) -> SelectBuilder {
        SelectBuilder::new(Arc::clone(self.db.dialect()), Arc::clone(&self.table))
    }

    /// New update builder on this table.
    #[must_use]
    pub fn update_builder(&self) -> UpdateBuilder {
        UpdateBuilder::new(Arc::clone(self.db.dialect()), Arc::clone(&self.table))
    }

    /// New delete builder on this table.
    #[must_use]
    pub fn delete_builder(&self) -> DeleteBuilder {
        DeleteBuilder::new(Arc::clone(self.db.dialect()), Arc::clone(&self.table))
    }

    fn name(&self) -> &str {
        self.table.name()
    }

    /// Row with id `id`.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, when more than one row matches, and with driver
    /// or conversion errors.
    pub fn query_for_id(&self, id: impl Into<Value>) -> Result<Option<Record>> {
        let id = id.into();
        let mut ctx = ResolveContext::new();
        self.db.with_connection(self.name(), false, |connection| {
            self.mapped.query_for_id(&self.db, connection, &mut ctx, &id)
        })
    }

    /// First row of a select, reading no further.
    ///
    /// # Errors
    ///
    /// Fails for statements that do not select records, and with driver or conversion errors.
    pub fn query_for_first(&self, prepared: &PreparedStmt) -> Result<Option<Record>> {
        let mut mapper = row_mapper(prepared, None)?;
        let mut ctx = ResolveContext::new();
        self.db.with_connection(self.name(), false, |connection| {
            let mut statement = compile(connection, prepared)?;
            let mut results = statement.run_query()?;
            let record =
                if results.first()? { Some(mapper.map_row(&self.db, &mut ctx, results.as_ref())?) } else { None };
            results.close()?;
            statement.close()?;
            tracing::debug!(table = self.name(), sql = prepared.statement(), found = record.is_some(), "query-for-first");
            Ok(record)
        })
    }

    /// Every row of the table.
    ///
    /// # Errors
    ///
    /// Fails with driver or conversion errors.
    pub fn query_for_all(&self) -> Result<Vec<Record>> {
        self.query(&self.query_builder().prepare()?)
    }

    /// Every row of a select.
    ///
    /// # Errors
    ///
    /// Fails for statements that do not select records, and with driver or conversion errors.
    pub fn query(&self, prepared: &PreparedStmt) -> Result<Vec<Record>> {
        self.db.query_with(prepared, None, &mut ResolveContext::new())
    }

    /// Cursor over a select. The iterator holds a connection until it is closed, exhausted or
    /// dropped.
    ///
    /// # Errors
    ///
    /// Fails for statements that do not select records, and with driver errors.
    pub fn iterator(&self, prepared: &PreparedStmt) -> Result<CloseableIterator> {
        self.db.iterator_with(prepared, None)
    }

    /// `SELECT COUNT(*)` over the whole table.
    ///
    /// # Errors
    ///
    /// Fails with driver errors.
    pub fn query_for_count_star(&self) -> Result<i64> {
        let mut sql = String::from("SELECT COUNT(*) FROM ");
        self.db.dialect().append_escaped_entity_name(&mut sql, self.name());
        let count = self.db.with_connection(self.name(), false, |connection| Ok(connection.query_for_long(&sql, &[])?))?;
        tracing::debug!(table = self.name(), sql = %sql, count, "query-for-count-star");
        Ok(count)
    }

    /// First column of the first row of a select, as a number.
    ///
    /// # Errors
    ///
    /// Fails when the statement returns no row, and with driver errors.
    pub fn query_for_long(&self, prepared: &PreparedStmt) -> Result<i64> {
        let args = prepared.bind_args()?;
        let value = self.db.with_connection(self.name(), false, |connection| {
            Ok(connection.query_for_long(prepared.statement(), &args)?)
        })?;
        tracing::debug!(table = self.name(), sql = prepared.statement(), value, "query-for-long");
        Ok(value)
    }

    /// Runs a counting select, as built with [`SelectBuilder::prepare_count_of`].
    ///
    /// # Errors
    ///
    /// Fails for statements that do not count, and with driver errors.
    pub fn count_of(&self, prepared: &PreparedStmt) -> Result<i64> {
        if prepared.statement_type() != StatementType::SelectLong {
            return Err(builder_err!("Prepared statement must be a count-of statement: {}", prepared.statement()));
        }
        self.query_for_long(prepared)
    }

    /// Inserts `record`, filling in its generated id and initial version.
    ///
    /// # Errors
    ///
    /// Fails when a generated key is missing or zero, and with driver or conversion errors.
    pub fn create(&self, record: &mut Record) -> Result<u64> {
        let rows = self.db.with_connection(self.name(), true, |connection| {
            self.mapped.create(&self.db, connection, record)
        })?;
        if rows > 0 {
            self.db.notify_changes(self.name());
        }
        Ok(rows)
    }

    /// Writes `record` to its row, bumping its version.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, and with driver or conversion errors.
    pub fn update(&self, record: &mut Record) -> Result<u64> {
        let rows = self.db.with_connection(self.name(), true, |connection| {
            self.mapped.update(&self.db, connection, record)
        })?;
        if rows > 0 {
            self.db.notify_changes(self.name());
        }
        Ok(rows)
    }

    /// Changes the id of the row of `record`, and of `record` itself.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, and with driver or conversion errors.
    pub fn update_id(&self, record: &mut Record, new_id: impl Into<Value>) -> Result<u64> {
        let new_id = new_id.into();
        let rows = self.db.with_connection(self.name(), true, |connection| {
            self.mapped.update_id(&self.db, connection, record, new_id)
        })?;
        if rows > 0 {
            self.db.notify_changes(self.name());
        }
        Ok(rows)
    }

    /// Runs a prepared update or delete.
    ///
    /// # Errors
    ///
    /// Fails for statements that do not change rows, and with driver errors.
    pub fn update_prepared(&self, prepared: &PreparedStmt) -> Result<u64> {
        if !prepared.statement_type().is_ok_for_update() {
            return Err(builder_err!(
                "{:?} statement cannot be used for updates: {}",
                prepared.statement_type(),
                prepared.statement()
            ));
        }
        let rows = self.db.with_connection(self.name(), true, |connection| {
            let mut statement = compile(connection, prepared)?;
            let reported = statement.run_update()?;
            statement.close()?;
            Ok(self.db.rows_changed(connection, reported, prepared.statement()))
        })?;
        tracing::debug!(table = self.name(), sql = prepared.statement(), rows, "prepared update");
        if rows > 0 {
            self.db.notify_changes(self.name());
        }
        Ok(rows)
    }

    /// Re-reads `record` from its row. Returns 0 when the row no longer exists.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, and with driver or conversion errors.
    pub fn refresh(&self, record: &mut Record) -> Result<u64> {
        self.db.with_connection(self.name(), false, |connection| {
            self.mapped.refresh(&self.db, connection, record)
        })
    }

    /// Deletes the row of `record`.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, and with driver or conversion errors.
    pub fn delete(&self, record: &Record) -> Result<u64> {
        let rows = self.db.with_connection(self.name(), true, |connection| {
            self.mapped.delete(&self.db, connection, record)
        })?;
        if rows > 0 {
            self.db.notify_changes(self.name());
        }
        Ok(rows)
    }

    /// Deletes the row with id `id`.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, and with driver or conversion errors.
    pub fn delete_by_id(&self, id: impl Into<Value>) -> Result<u64> {
        let id = id.into();
        let rows = self.db.with_connection(self.name(), true, |connection| {
            self.mapped.delete_by_id(&self.db, connection, &id)
        })?;
        if rows > 0 {
            self.db.notify_changes(self.name());
        }
        Ok(rows)
    }

    /// Deletes the rows of `records` with one statement.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, and with driver or conversion errors.
    pub fn delete_objects(&self, records: &[Record]) -> Result<u64> {
        let ids = records.iter().map(|r| self.mapped.id_of(r)).collect::<Result<Vec<_>>>()?;
        self.delete_ids(&ids)
    }

    /// Deletes the rows with the given ids with one statement.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, and with driver or conversion errors.
    pub fn delete_ids(&self, ids: &[Value]) -> Result<u64> {
        let rows = self.db.with_connection(self.name(), true, |connection| {
            self.mapped.delete_ids(&self.db, connection, ids)
        })?;
        if rows > 0 {
            self.db.notify_changes(self.name());
        }
        Ok(rows)
    }

    /// Runs a prepared delete.
    ///
    /// # Errors
    ///
    /// Fails for statements that are not deletes, and with driver errors.
    pub fn delete_prepared(&self, prepared: &PreparedStmt) -> Result<u64> {
        if prepared.statement_type() != StatementType::Delete {
            return Err(builder_err!("Prepared statement must be a delete statement: {}", prepared.statement()));
        }
        self.update_prepared(prepared)
    }

    /// Whether a row with id `id` exists.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field, and with driver errors.
    pub fn id_exists(&self, id: impl Into<Value>) -> Result<bool> {
        let Some(id_field) = self.table.id_field() else {
            return Err(builder_err!("Cannot check id existence in {} because it doesn't have an id field", self.name()));
        };
        let mut qb = self.query_builder().set_count_of("*");
        qb.r#where().eq(id_field.column_name(), SelectArg::with_value(id.into()))?;
        Ok(self.query_for_long(&qb.prepare()?)? != 0)
    }

    /// Runs raw SQL, reading every column as text.
    ///
    /// # Errors
    ///
    /// Fails with driver errors.
    pub fn query_raw(&self, sql: &str, args: &[&str]) -> Result<RawResults> {
        let args: Vec<_> = args.iter().map(|a| BoundArg::text(*a)).collect();
        let raw = self.db.with_connection(self.name(), false, |connection| {
            let mut statement = connection.compile_statement(sql, StatementType::SelectRaw)?;
            for (index, arg) in args.into_iter().enumerate() {
                statement.set_object(index, arg.value, arg.sql_type)?;
            }
            let mut results = statement.run_query()?;
            let raw = RawResults::read(results.as_mut())?;
            results.close()?;
            statement.close()?;
            Ok(raw)
        })?;
        tracing::debug!(table = self.name(), sql, rows = raw.rows.len(), "raw query");
        Ok(raw)
    }

    /// Runs a raw INSERT, UPDATE or DELETE.
    ///
    /// # Errors
    ///
    /// Fails with driver errors.
    pub fn update_raw(&self, sql: &str, args: &[&str]) -> Result<u64> {
        let args: Vec<_> = args.iter().map(|a| BoundArg::text(*a)).collect();
        let rows = self.db.with_connection(self.name(), true, |connection| {
            let reported = connection.update(sql, &args)?;
            Ok(self.db.rows_changed(connection, reported, sql))
        })?;
        tracing::debug!(table = self.name(), sql, rows, "raw update");
        if rows > 0 {
            self.db.notify_changes(self.name());
        }
        Ok(rows)
    }

    /// Runs a raw statement such as DDL.
    ///
    /// # Errors
    ///
    /// Fails with driver errors.
    pub fn execute_raw(&self, sql: &str) -> Result<u64> {
        let rows = self.db.with_connection(self.name(), true, |connection| Ok(connection.execute(sql)?))?;
        tracing::debug!(table = self.name(), sql, "raw execute");
        Ok(rows.unwrap_or_default())
    }

    /// Creates the table from its descriptor. Returns the number of statements run.
    ///
    /// # Errors
    ///
    /// Fails for columns the dialect cannot declare, and with driver errors such as an
    /// existing table.
    pub fn create_table(&self) -> Result<u64> {
        self.run_create_table(false)
    }

    /// Like [`StatementExecutor::create_table`], leaving an existing table alone where the
    /// dialect supports it.
    ///
    /// # Errors
    ///
    /// Fails for columns the dialect cannot declare, and with driver errors.
    pub fn create_table_if_not_exists(&self) -> Result<u64> {
        self.run_create_table(true)
    }

    fn run_create_table(&self, if_not_exists: bool) -> Result<u64> {
        let statements = ddl::create_table_statements(self.db.dialect().as_ref(), &self.table, if_not_exists)?;
        let mut executed = 0;
        for sql in &statements {
            self.execute_raw(sql)?;
            executed += 1;
        }
        tracing::info!(table = self.name(), statements = executed, "created table");
        Ok(executed)
    }

    /// Drops the table and forgets its cached records. With `ignore_errors`, failing
    /// statements are logged and skipped. Returns the number of statements that succeeded.
    ///
    /// # Errors
    ///
    /// Fails with driver errors unless `ignore_errors` is set.
    pub fn drop_table(&self, ignore_errors: bool) -> Result<u64> {
        if let Some(cache) = self.db.object_cache() {
            cache.clear(self.name());
        }
        let mut executed = 0;
        for sql in ddl::drop_table_statements(self.db.dialect().as_ref(), &self.table) {
            match self.execute_raw(&sql) {
                Ok(_) => executed += 1,
                Err(e) if ignore_errors => {
                    tracing::info!(table = self.name(), sql = %sql, error = %e, "ignoring drop table error");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(executed)
    }

    /// Deletes every row and forgets the table's cached records. Returns the rows deleted.
    ///
    /// # Errors
    ///
    /// Fails with driver errors.
    pub fn clear_table(&self) -> Result<u64> {
        let sql = ddl::clear_table_statement(self.db.dialect().as_ref(), &self.table);
        let rows = self.update_raw(&sql, &[])?;
        if let Some(cache) = self.db.object_cache() {
            cache.clear(self.name());
        }
        Ok(rows)
    }

    /// Runs `tasks` with auto-commit turned off, firing a single change notification at the
    /// end instead of one per statement.
    ///
    /// Auto-commit is restored whether or not the tasks succeed, which applies what they did.
    /// Batches are serialized when the connection source shares a single connection.
    ///
    /// # Errors
    ///
    /// Returns the error of `tasks`, or the first driver error raised while bracketing.
    pub fn call_batch_tasks<T>(&self, tasks: impl FnOnce() -> Result<T>) -> Result<T> {
        let table = self.name();
        let source = &self.db.inner.source;
        let _serial = source.is_single_connection(table).then(|| self.db.inner.batch_lock.lock());

        let connection = source.read_write_connection(table)?;
        let key = (thread::current().id(), table.to_string());
        *self.db.inner.batching.entry(key.clone()).or_insert(0) += 1;

        let outcome = source
            .save_special_connection(&connection)
            .map_err(Into::into)
            .and_then(|saved| {
                let outcome = run_batch(connection.as_ref(), tasks);
                if saved {
                    source.clear_special_connection(&connection);
                }
                outcome
            });
        let released = self.db.release_connection(connection);
        self.db.inner.batching.remove_if_mut(&key, |_, open| {
            *open -= 1;
            *open == 0
        });

        let value = outcome?;
        released?;
        self.db.notify_changes(table);
        Ok(value)
    }

    /// Attaches an empty collection to `field` of a new `record`, to be filled with
    /// [`ForeignCollection::add`] once the record has an id.
    ///
    /// # Errors
    ///
    /// Fails when `field` is not a collection of this table.
    pub fn assign_empty_foreign_collection(&self, record: &mut Record, field: &str) -> Result<()> {
        let Some(descriptor) = self.table.field_by_name(field).filter(|f| f.is_foreign_collection()) else {
            return Err(builder_err!("Field {field} is not a foreign collection of {}", self.name()));
        };
        let parent = ParentInfo {
            record: record.clone(),
            id: self.table.extract_id(record),
        };
        let collection = ForeignCollection::unloaded(&self.db, descriptor, parent)?;
        record.set_collection(field, collection);
        Ok(())
    }
}

fn run_batch<T>(connection: &dyn DatabaseConnection, tasks: impl FnOnce() -> Result<T>) -> Result<T> {
    let auto_commit = connection.is_auto_commit()?;
    if auto_commit {
        connection.set_auto_commit(false)?;
        tracing::debug!("disabled auto-commit for batch tasks");
    }
    let outcome = tasks();
    if auto_commit {
        let restored = connection.set_auto_commit(true);
        tracing::debug!(ok = outcome.is_ok(), "re-enabled auto-commit after batch tasks");
        let value = outcome?;
        restored?;
        return Ok(value);
    }
    outcome
}

impl fmt::Debug for StatementExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementExecutor").field("table", &self.table.name()).finish_non_exhaustive()
    }
}
