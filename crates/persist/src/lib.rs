//! Persistence core for mapping records to SQL tables.
//!
//! Tables are described by already-resolved configuration ([`TableConfig`], [`FieldConfig`])
//! and compiled into a [`Schema`] of immutable descriptors. Statements are built with
//! [`SelectBuilder`], [`UpdateBuilder`] and [`DeleteBuilder`] and their stack-based [`Where`]
//! clause, then run by a per-table [`StatementExecutor`] obtained from a [`Database`].
//!
//! # Quick Start
//!
//! ```ignore
//! use qwasr_persist::{Database, FieldConfig, NativeType, Record, Schema, SelectArg, TableConfig};
//! use qwasr_persist::sqlite::SqliteConnectionSource;
//!
//! let schema = Schema::builder()
//!     .table(
//!         TableConfig::new("account")
//!             .field(FieldConfig::of("id", NativeType::Long).generated_id())
//!             .field(FieldConfig::of("name", NativeType::String))
//!             .field(FieldConfig::of("passwd", NativeType::String)),
//!     )
//!     .build()?;
//! let db = Database::builder(schema, Arc::new(SqliteConnectionSource::connect()?)).build();
//! let accounts = db.executor("account")?;
//! accounts.create_table_if_not_exists()?;
//!
//! let mut account = Record::new("account").with("name", "foo").with("passwd", "bar");
//! accounts.create(&mut account)?;
//!
//! // SELECT * FROM `account` WHERE (`name` = 'foo' AND `passwd` = 'bar' )
//! let mut qb = accounts.query_builder();
//! qb.r#where().eq("name", "foo")?.and()?.eq("passwd", "bar")?;
//! let found = accounts.query(&qb.prepare()?)?;
//!
//! // argument holders can be rebound between runs
//! let name = SelectArg::new();
//! qb.r#where().reset();
//! qb.r#where().eq("name", name.clone())?;
//! let prepared = qb.prepare()?;
//! name.set_value("foo");
//! let again = accounts.query(&prepared)?;
//! ```
//!
//! ## Foreign fields and collections
//!
//! A foreign field holds the id of a row of another table and is hydrated as a shell record
//! carrying only that id, or, with `foreign_auto_refresh`, as the fetched row. A foreign
//! collection field attaches a [`ForeignCollection`] of the rows pointing back at the record.
//! Recursion through both is bounded per operation, degrading to shells and lazy collections.

mod arg;
pub mod cache;
mod clause;
mod collection;
mod config;
pub mod connection;
pub mod ddl;
mod delete;
pub mod dialect;
mod entity;
mod error;
mod executor;
mod field;
mod foreign;
mod join;
mod mapped;
pub mod persister;
mod select;
#[cfg(feature = "sqlite")]
pub mod sqlite;
mod statement;
mod table;
mod update;
mod value;
mod where_clause;

pub use arg::{ColumnArg, SelectArg};
pub use cache::{LruObjectCache, ObjectCache};
pub use clause::{Clause, Combine, CompareOp, Operand};
pub use collection::{CloseableIterator, ForeignCollection};
pub use config::{
    DEFAULT_MAX_EAGER_LEVEL, DEFAULT_MAX_FOREIGN_AUTO_REFRESH_LEVEL, FieldConfig, ForeignCollectionConfig,
    TableConfig,
};
pub use connection::{ConnectionSource, DatabaseConnection, DatabaseResults};
pub use delete::DeleteBuilder;
pub use dialect::{DatabaseType, SqliteDialect, standard_column_type};
pub use entity::{Dao, Entity, FetchValue};
pub use error::{Error, Result};
pub use executor::{ChangeObserver, Database, DatabaseBuilder, RawResults, StatementExecutor, WeakDatabase};
pub use field::{FieldDescriptor, ForeignRef};
pub use foreign::{LevelCounter, ResolveContext};
pub use join::{JoinKind, JoinWhereOperation};
pub use persister::{DataType, Persister, PersisterRegistry, SqlType};
pub use select::SelectBuilder;
pub use statement::{PreparedStmt, StatementType};
pub use table::{Schema, SchemaBuilder, TableDescriptor};
pub use update::UpdateBuilder;
pub use value::{NativeType, Record, TIMESTAMP_FORMAT, Value};
pub use where_clause::Where;
