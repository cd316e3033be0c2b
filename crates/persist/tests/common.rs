//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use qwasr_persist::connection::{BoundArg, CompiledStatement, InsertOutcome};
use qwasr_persist::persister::SqlType;
use qwasr_persist::sqlite::SqliteConnectionSource;
use qwasr_persist::{
    ConnectionSource, Database, DatabaseConnection, DatabaseResults, DatabaseType, FieldConfig, ForeignCollectionConfig,
    LruObjectCache, NativeType, ObjectCache, Schema, StatementType, TableConfig, Value,
};

/// Installs a `fmt` subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counters shared by a [`CountingSource`] and its connections.
#[derive(Debug, Default)]
pub struct Stats {
    queries: AtomicUsize,
    checked_out: AtomicI64,
    hide_row_counts: AtomicBool,
    fail_rows_changed: AtomicBool,
}

impl Stats {
    /// Queries run since the last reset.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn reset_queries(&self) {
        self.queries.store(0, Ordering::SeqCst);
    }

    /// Connections handed out and not yet released.
    pub fn checked_out(&self) -> i64 {
        self.checked_out.load(Ordering::SeqCst)
    }

    /// Makes updates and deletes report no row count.
    pub fn hide_row_counts(&self, hide: bool) {
        self.hide_row_counts.store(hide, Ordering::SeqCst);
    }

    /// Makes the rows-changed query fail.
    pub fn fail_rows_changed(&self, fail: bool) {
        self.fail_rows_changed.store(fail, Ordering::SeqCst);
    }
}

/// In-memory `SQLite` source that counts queries and checked-out connections.
pub struct CountingSource {
    inner: SqliteConnectionSource,
    stats: Arc<Stats>,
}

impl CountingSource {
    pub fn new() -> (Self, Arc<Stats>) {
        let stats = Arc::new(Stats::default());
        let source = Self {
            inner: SqliteConnectionSource::in_memory().expect("open in-memory database"),
            stats: Arc::clone(&stats),
        };
        (source, stats)
    }

    fn wrap(&self, inner: Arc<dyn DatabaseConnection>) -> Arc<dyn DatabaseConnection> {
        self.stats.checked_out.fetch_add(1, Ordering::SeqCst);
        Arc::new(CountingConnection {
            inner,
            stats: Arc::clone(&self.stats),
        })
    }
}

impl ConnectionSource for CountingSource {
    fn read_only_connection(&self, table: &str) -> Result<Arc<dyn DatabaseConnection>> {
        Ok(self.wrap(self.inner.read_only_connection(table)?))
    }

    fn read_write_connection(&self, table: &str) -> Result<Arc<dyn DatabaseConnection>> {
        Ok(self.wrap(self.inner.read_write_connection(table)?))
    }

    fn release_connection(&self, _connection: Arc<dyn DatabaseConnection>) -> Result<()> {
        self.stats.checked_out.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_single_connection(&self, table: &str) -> bool {
        self.inner.is_single_connection(table)
    }

    fn database_type(&self) -> Arc<dyn DatabaseType> {
        self.inner.database_type()
    }
}

struct CountingConnection {
    inner: Arc<dyn DatabaseConnection>,
    stats: Arc<Stats>,
}

impl DatabaseConnection for CountingConnection {
    fn compile_statement(&self, sql: &str, statement_type: StatementType) -> Result<Box<dyn CompiledStatement>> {
        if sql == "SELECT CHANGES()" && self.stats.fail_rows_changed.load(Ordering::SeqCst) {
            bail!("rows-changed query unavailable");
        }
        Ok(Box::new(CountingStatement {
            inner: self.inner.compile_statement(sql, statement_type)?,
            stats: Arc::clone(&self.stats),
        }))
    }

    fn insert(&self, sql: &str, args: &[BoundArg], want_generated_key: bool) -> Result<InsertOutcome> {
        self.inner.insert(sql, args, want_generated_key)
    }

    fn update(&self, sql: &str, args: &[BoundArg]) -> Result<Option<u64>> {
        let rows = self.inner.update(sql, args)?;
        Ok(if self.stats.hide_row_counts.load(Ordering::SeqCst) { None } else { rows })
    }

    fn execute(&self, sql: &str) -> Result<Option<u64>> {
        self.inner.execute(sql)
    }

    fn is_auto_commit(&self) -> Result<bool> {
        self.inner.is_auto_commit()
    }

    fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        self.inner.set_auto_commit(auto_commit)
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.inner.rollback()
    }
}

struct CountingStatement {
    inner: Box<dyn CompiledStatement>,
    stats: Arc<Stats>,
}

impl CompiledStatement for CountingStatement {
    fn set_object(&mut self, index: usize, value: Value, sql_type: SqlType) -> Result<()> {
        self.inner.set_object(index, value, sql_type)
    }

    fn set_max_rows(&mut self, max_rows: u64) -> Result<()> {
        self.inner.set_max_rows(max_rows)
    }

    fn run_query(&mut self) -> Result<Box<dyn DatabaseResults>> {
        self.stats.queries.fetch_add(1, Ordering::SeqCst);
        self.inner.run_query()
    }

    fn run_update(&mut self) -> Result<Option<u64>> {
        let rows = self.inner.run_update()?;
        Ok(if self.stats.hide_row_counts.load(Ordering::SeqCst) { None } else { rows })
    }

    fn run_execute(&mut self) -> Result<Option<u64>> {
        self.inner.run_execute()
    }
}

/// `account` with a version and an eager collection of `order`, `order` pointing back at
/// its account and owning an eager collection of `line`. With the default eager depth of one,
/// `lines` degrades to lazy when orders are loaded through an account.
pub fn shop_schema() -> Schema {
    Schema::builder()
        .table(
            TableConfig::new("account")
                .field(FieldConfig::of("id", NativeType::Long).generated_id())
                .field(FieldConfig::of("name", NativeType::String))
                .field(FieldConfig::of("passwd", NativeType::String))
                .field(FieldConfig::of("version", NativeType::Int).version())
                .field(FieldConfig::new("orders").foreign_collection(ForeignCollectionConfig::new("order").eager())),
        )
        .table(
            TableConfig::new("order")
                .field(FieldConfig::of("id", NativeType::Long).generated_id())
                .field(FieldConfig::of("amount", NativeType::Int))
                .field(FieldConfig::new("account").foreign("account"))
                .field(FieldConfig::new("lines").foreign_collection(ForeignCollectionConfig::new("line").eager())),
        )
        .table(
            TableConfig::new("line")
                .field(FieldConfig::of("id", NativeType::Long).generated_id())
                .field(FieldConfig::of("sku", NativeType::String))
                .field(FieldConfig::new("order").foreign("order")),
        )
        .build()
        .expect("valid schema")
}

/// Database over a fresh in-memory `SQLite` with every table of `schema` created.
pub fn database(schema: Schema) -> (Database, Arc<Stats>) {
    open(schema, None)
}

/// Like [`database`], with an object cache of `capacity` records per table.
pub fn cached_database(schema: Schema, capacity: u64) -> (Database, Arc<Stats>) {
    open(schema, Some(Arc::new(LruObjectCache::new(capacity))))
}

fn open(schema: Schema, cache: Option<Arc<dyn ObjectCache>>) -> (Database, Arc<Stats>) {
    init_tracing();
    let (source, stats) = CountingSource::new();
    let mut builder = Database::builder(schema, Arc::new(source));
    if let Some(cache) = cache {
        builder = builder.object_cache(cache);
    }
    let db = builder.build();
    db.create_tables(false).expect("create tables");
    stats.reset_queries();
    (db, stats)
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
/// Preserves quotes inside string literals.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '`' if !in_single_quote => {}
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order.
///
/// Identifier quotes are stripped and whitespace normalized before fragments are matched
/// sequentially.
#[allow(clippy::missing_panics_doc)]
pub fn assert_sql_contains(actual: &str, fragments: &[&str]) {
    let actual_canonical = canonicalize_sql(actual);
    let mut search_start = 0usize;

    for fragment in fragments {
        let fragment_canonical = canonicalize_sql(fragment);
        if fragment_canonical.is_empty() {
            continue;
        }

        if let Some(pos) = actual_canonical[search_start..].find(&fragment_canonical) {
            search_start += pos + fragment_canonical.len();
        } else {
            panic!("expected SQL fragment `{fragment_canonical}` not found in `{actual_canonical}`");
        }
    }
}
