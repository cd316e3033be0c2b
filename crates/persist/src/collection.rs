//! One-to-many collections attached to hydrated records.
//!
//! An eager collection is loaded together with its parent and held in memory. A lazy
//! collection stores only how to find its elements and queries the database on every access;
//! its [`CloseableIterator`] keeps a connection checked out until it is closed, exhausted or
//! dropped.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::arg::SelectArg;
use crate::builder_err;
use crate::connection::{CompiledStatement, DatabaseConnection, DatabaseResults};
use crate::error::Result;
use crate::executor::{Database, StatementExecutor, WeakDatabase};
use crate::field::FieldDescriptor;
use crate::foreign::{ParentInfo, ResolveContext};
use crate::mapped::RowMapper;
use crate::statement::PreparedStmt;
use crate::value::Record;

enum Elements {
    Eager(RwLock<Vec<Record>>),
    Lazy,
}

struct Link {
    db: WeakDatabase,
    back_reference: Arc<FieldDescriptor>,
    parent: ParentInfo,
    order: Option<(String, bool)>,
}

struct Shared {
    table: String,
    link: Option<Link>,
    elements: Elements,
}

/// Handle onto the rows of another table that refer back to one parent row.
///
/// Clones share the same elements.
#[derive(Clone)]
pub struct ForeignCollection {
    shared: Arc<Shared>,
}

impl ForeignCollection {
    /// An eager collection of `table` that is attached to no parent and holds no elements.
    #[must_use]
    pub fn empty(table: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                table: table.into(),
                link: None,
                elements: Elements::Eager(RwLock::new(Vec::new())),
            }),
        }
    }

    /// Builds the collection for a collection field of a freshly mapped parent row.
    ///
    /// The collection is eager when the field asks for it and the eager depth of `ctx` allows
    /// another level; otherwise it degrades to lazy.
    pub(crate) fn build(
        db: &Database, ctx: &mut ResolveContext, field: &FieldDescriptor, parent: ParentInfo,
    ) -> Result<Self> {
        let (table, eager, max_eager_level, link) = Link::new(db, field, parent)?;
        let elements = if eager && ctx.collections.try_enter(true, max_eager_level) {
            let loaded = if link.parent.id.is_null() {
                Ok(Vec::new())
            } else {
                link.prepare(db).and_then(|prepared| db.query_with(&prepared, Some(&link.parent), ctx))
            };
            ctx.collections.exit();
            Elements::Eager(RwLock::new(loaded?))
        } else {
            Elements::Lazy
        };
        tracing::trace!(
            field = %field,
            eager = matches!(elements, Elements::Eager(_)),
            level = ctx.collections.level(),
            "built foreign collection"
        );
        Ok(Self::attached(table, link, elements))
    }

    /// Collection for a parent that was not loaded by a query. Eager fields start out empty.
    pub(crate) fn unloaded(db: &Database, field: &FieldDescriptor, parent: ParentInfo) -> Result<Self> {
        let (table, eager, _, link) = Link::new(db, field, parent)?;
        let elements = if eager { Elements::Eager(RwLock::new(Vec::new())) } else { Elements::Lazy };
        Ok(Self::attached(table, link, elements))
    }

    fn attached(table: String, link: Link, elements: Elements) -> Self {
        Self {
            shared: Arc::new(Shared {
                table,
                link: Some(link),
                elements,
            }),
        }
    }

    /// Table holding the elements.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.shared.table
    }

    /// Whether elements are held in memory.
    #[must_use]
    pub fn is_eager(&self) -> bool {
        matches!(self.shared.elements, Elements::Eager(_))
    }

    /// Number of elements. Lazy collections count by iterating.
    ///
    /// # Errors
    ///
    /// Returns query errors of a lazy collection.
    pub fn len(&self) -> Result<usize> {
        match &self.shared.elements {
            Elements::Eager(rows) => Ok(rows.read().len()),
            Elements::Lazy => {
                let mut count = 0;
                for row in self.closeable_iterator()? {
                    row?;
                    count += 1;
                }
                Ok(count)
            }
        }
    }

    /// Whether there are no elements.
    ///
    /// # Errors
    ///
    /// Returns query errors of a lazy collection.
    pub fn is_empty(&self) -> Result<bool> {
        match &self.shared.elements {
            Elements::Eager(rows) => Ok(rows.read().is_empty()),
            Elements::Lazy => Ok(self.closeable_iterator()?.next().transpose()?.is_none()),
        }
    }

    /// Whether an equal record is an element.
    ///
    /// # Errors
    ///
    /// Returns query errors of a lazy collection.
    pub fn contains(&self, record: &Record) -> Result<bool> {
        match &self.shared.elements {
            Elements::Eager(rows) => Ok(rows.read().contains(record)),
            Elements::Lazy => {
                for row in self.closeable_iterator()? {
                    if row? == *record {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Snapshot of every element.
    ///
    /// # Errors
    ///
    /// Returns query errors of a lazy collection.
    pub fn to_vec(&self) -> Result<Vec<Record>> {
        match &self.shared.elements {
            Elements::Eager(rows) => Ok(rows.read().clone()),
            Elements::Lazy => self.closeable_iterator()?.collect(),
        }
    }

    /// Iterates over the elements. Same as [`ForeignCollection::closeable_iterator`]: eager
    /// collections walk a snapshot, lazy ones run their query.
    ///
    /// # Errors
    ///
    /// Returns connection and query errors.
    pub fn iter(&self) -> Result<CloseableIterator> {
        self.closeable_iterator()
    }

    /// Opens a cursor over the elements. Eager collections iterate their loaded elements.
    ///
    /// # Errors
    ///
    /// Returns connection and query errors.
    pub fn closeable_iterator(&self) -> Result<CloseableIterator> {
        if let Elements::Eager(rows) = &self.shared.elements {
            let executor = match &self.shared.link {
                Some(link) => Some(link.executor()?),
                None => None,
            };
            return Ok(CloseableIterator::loaded(rows.read().clone(), executor));
        }
        let link = self.link()?;
        let db = link.database()?;
        let prepared = link.prepare(&db)?;
        db.iterator_with(&prepared, Some(link.parent.clone()))
    }

    /// Inserts a record as a new element, pointing its back reference at the parent when it
    /// does not refer to a row yet.
    ///
    /// # Errors
    ///
    /// Returns insert errors. Detached collections fail.
    pub fn add(&self, record: &mut Record) -> Result<bool> {
        let link = self.link()?;
        let name = link.back_reference.name();
        if link.back_reference.foreign_id_of(record.get(name)).is_null() {
            record.set(name, link.parent.record.clone());
        }
        link.executor()?.create(record)?;
        if let Elements::Eager(rows) = &self.shared.elements {
            rows.write().push(record.clone());
        }
        Ok(true)
    }

    /// Removes an element and deletes its row.
    ///
    /// # Errors
    ///
    /// Returns delete errors. Detached collections fail.
    pub fn remove(&self, record: &Record) -> Result<bool> {
        match &self.shared.elements {
            Elements::Eager(rows) => {
                let executor = self.link()?.executor()?;
                {
                    let mut rows = rows.write();
                    let Some(position) = rows.iter().position(|r| r == record) else {
                        return Ok(false);
                    };
                    rows.remove(position);
                }
                Ok(executor.delete(record)? == 1)
            }
            Elements::Lazy => {
                let mut iterator = self.closeable_iterator()?;
                while let Some(row) = iterator.next() {
                    if row? == *record {
                        iterator.remove()?;
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    /// Re-reads every element from the database. Returns the number refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderState`] for lazy collections, and refresh errors.
    pub fn refresh_all(&self) -> Result<u64> {
        let Elements::Eager(rows) = &self.shared.elements else {
            return Err(builder_err!("Cannot call refreshAll() on a lazy collection."));
        };
        let Ok(link) = self.link() else {
            return Ok(0);
        };
        let executor = link.executor()?;
        let mut updated = 0;
        for row in rows.write().iter_mut() {
            updated += executor.refresh(row)?;
        }
        Ok(updated)
    }

    /// Writes every element back to the database. Returns the number of rows updated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderState`] for lazy collections, and update errors.
    pub fn update_all(&self) -> Result<u64> {
        let Elements::Eager(rows) = &self.shared.elements else {
            return Err(builder_err!("Cannot call updateAll() on a lazy collection."));
        };
        let Ok(link) = self.link() else {
            return Ok(0);
        };
        let executor = link.executor()?;
        let mut updated = 0;
        for row in rows.write().iter_mut() {
            updated += executor.update(row)?;
        }
        Ok(updated)
    }

    fn link(&self) -> Result<&Link> {
        self.shared
            .link
            .as_ref()
            .ok_or_else(|| builder_err!("Collection of {} is not attached to a parent", self.shared.table))
    }
}

impl Link {
    fn new(db: &Database, field: &FieldDescriptor, parent: ParentInfo) -> Result<(String, bool, u32, Self)> {
        let Some(config) = field.foreign_collection() else {
            return Err(builder_err!("Field {field} is not a foreign collection"));
        };
        let element_table = db.schema().table(&config.table)?;
        let back_reference = field
            .back_reference()
            .and_then(|name| element_table.field_by_name(name))
            .ok_or_else(|| builder_err!("Foreign collection {field} has no back reference field"))?;
        let link = Self {
            db: db.downgrade(),
            back_reference: Arc::clone(back_reference),
            parent,
            order: config.order_column.clone().map(|column| (column, config.order_ascending)),
        };
        Ok((config.table.clone(), config.eager, config.max_eager_level, link))
    }

    fn database(&self) -> Result<Database> {
        self.db.upgrade().ok_or_else(|| builder_err!("Database of the collection has been dropped"))
    }

    fn executor(&self) -> Result<StatementExecutor> {
        self.database()?.executor(self.back_reference.table_name())
    }

    fn prepare(&self, db: &Database) -> Result<PreparedStmt> {
        let mut qb = db.executor(self.back_reference.table_name())?.query_builder();
        if let Some((column, ascending)) = &self.order {
            qb = qb.order_by(column, *ascending)?;
        }
        qb.r#where().eq(self.back_reference.column_name(), SelectArg::with_value(self.parent.id.clone()))?;
        qb.prepare()
    }
}

impl fmt::Debug for ForeignCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ForeignCollection");
        debug.field("table", &self.shared.table);
        match &self.shared.elements {
            Elements::Eager(rows) => debug.field("eager", &rows.read().len()),
            Elements::Lazy => debug.field("lazy", &true),
        };
        debug.finish_non_exhaustive()
    }
}

struct Cursor {
    db: Database,
    connection: Option<Arc<dyn DatabaseConnection>>,
    statement: Box<dyn CompiledStatement>,
    results: Box<dyn DatabaseResults>,
    mapper: RowMapper,
    started: bool,
}

enum Source {
    Cursor(Cursor),
    Loaded(std::vec::IntoIter<Record>),
}

/// Iterator over query results that holds its connection until closed.
///
/// Exhausting the iterator closes it; dropping it closes it too, logging any error.
pub struct CloseableIterator {
    source: Source,
    executor: Option<StatementExecutor>,
    current: Option<Record>,
    closed: bool,
}

impl CloseableIterator {
    pub(crate) fn open(
        db: Database, connection: Arc<dyn DatabaseConnection>, statement: Box<dyn CompiledStatement>,
        results: Box<dyn DatabaseResults>, mapper: RowMapper,
    ) -> Result<Self> {
        let executor = db.executor(mapper.table().name())?;
        Ok(Self {
            source: Source::Cursor(Cursor {
                db,
                connection: Some(connection),
                statement,
                results,
                mapper,
                started: false,
            }),
            executor: Some(executor),
            current: None,
            closed: false,
        })
    }

    fn loaded(rows: Vec<Record>, executor: Option<StatementExecutor>) -> Self {
        Self {
            source: Source::Loaded(rows.into_iter()),
            executor,
            current: None,
            closed: false,
        }
    }

    /// Deletes the row most recently returned by the iterator.
    ///
    /// # Errors
    ///
    /// Fails before the first row has been returned, and with delete errors.
    pub fn remove(&mut self) -> Result<()> {
        let Some(current) = self.current.take() else {
            return Err(builder_err!("No last row to remove. Must be called after next()"));
        };
        let Some(executor) = &self.executor else {
            return Err(builder_err!("Cannot remove from a detached collection"));
        };
        executor.delete(&current)?;
        Ok(())
    }

    /// Releases the cursor and hands the connection back. Closing twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns the first error raised while closing.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let Source::Cursor(cursor) = &mut self.source else {
            return Ok(());
        };
        let results = cursor.results.close();
        let statement = cursor.statement.close();
        let released = match cursor.connection.take() {
            Some(connection) => cursor.db.release_connection(connection),
            None => Ok(()),
        };
        tracing::trace!(table = cursor.mapper.table().name(), "closed iterator");
        results?;
        statement?;
        released
    }

    fn advance(&mut self) -> Result<Option<Record>> {
        match &mut self.source {
            Source::Loaded(rows) => Ok(rows.next()),
            Source::Cursor(cursor) => {
                let more = if cursor.started { cursor.results.next()? } else { cursor.results.first()? };
                cursor.started = true;
                if !more {
                    return Ok(None);
                }
                let mut ctx = ResolveContext::new();
                cursor.mapper.map_row(&cursor.db, &mut ctx, cursor.results.as_ref()).map(Some)
            }
        }
    }
}

impl Iterator for CloseableIterator {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        match self.advance() {
            Ok(Some(record)) => {
                self.current = Some(record.clone());
                Some(Ok(record))
            }
            Ok(None) => self.close().err().map(Err),
            Err(e) => {
                if let Err(close_err) = self.close() {
                    tracing::warn!(error = %close_err, "failed to close iterator after error");
                }
                Some(Err(e))
            }
        }
    }
}

impl Drop for CloseableIterator {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close iterator");
        }
    }
}

impl fmt::Debug for CloseableIterator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseableIterator").field("closed", &self.closed).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_collection() {
        let collection = ForeignCollection::empty("order");
        assert!(collection.is_eager());
        assert_eq!(collection.len().unwrap(), 0);
        assert!(collection.is_empty().unwrap());
        assert_eq!(collection.iter().unwrap().count(), 0);
        assert_eq!(collection.refresh_all().unwrap(), 0);

        let mut order = Record::new("order").with("amount", 3_i32);
        let err = collection.add(&mut order).unwrap_err();
        assert!(err.to_string().contains("Collection of order is not attached to a parent"));
        let err = collection.remove(&order).unwrap_err();
        assert!(matches!(err, crate::Error::BuilderState(_)));
    }

    #[test]
    fn detached_iterator_cannot_remove() {
        let collection = ForeignCollection::empty("order");
        let mut iterator = collection.closeable_iterator().unwrap();
        assert!(iterator.next().is_none());
        let err = iterator.remove().unwrap_err();
        assert!(err.to_string().contains("No last row to remove"));
        iterator.close().unwrap();
    }
}
