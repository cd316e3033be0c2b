//! Statements built once per table from its descriptor: query-by-id, insert, update,
//! update-id, delete, plus the row mapper turning result rows into records.

use std::sync::Arc;

use crate::collection::ForeignCollection;
use crate::connection::{BoundArg, DatabaseConnection, DatabaseResults};
use crate::dialect::DatabaseType;
use crate::error::Result;
use crate::executor::Database;
use crate::field::FieldDescriptor;
use crate::foreign::{self, ParentInfo, ResolveContext};
use crate::statement::StatementType;
use crate::table::TableDescriptor;
use crate::value::{Record, Value};
use crate::{builder_err, config_err};

/// Maps result rows of one statement to records.
///
/// Column positions are looked up by name on the first row and reused afterwards.
#[derive(Debug)]
pub(crate) struct RowMapper {
    table: Arc<TableDescriptor>,
    fields: Vec<Arc<FieldDescriptor>>,
    parent: Option<ParentInfo>,
    cache_store: bool,
    positions: Option<Vec<Option<usize>>>,
}

impl RowMapper {
    pub(crate) fn new(
        table: Arc<TableDescriptor>, fields: Vec<Arc<FieldDescriptor>>, parent: Option<ParentInfo>, cache_store: bool,
    ) -> Self {
        Self {
            table,
            fields,
            parent,
            cache_store,
            positions: None,
        }
    }

    pub(crate) const fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    fn positions(&mut self, results: &dyn DatabaseResults) -> Result<&[Option<usize>]> {
        if self.positions.is_none() {
            let positions = self
                .fields
                .iter()
                .map(|f| {
                    if f.is_foreign_collection() { Ok(None) } else { results.find_column(f.column_name()).map(Some) }
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            self.positions = Some(positions);
        }
        Ok(self.positions.as_deref().unwrap_or_default())
    }

    /// Maps the current row. A cached record with the same id is returned as is.
    pub(crate) fn map_row(
        &mut self, db: &Database, ctx: &mut ResolveContext, results: &dyn DatabaseResults,
    ) -> Result<Record> {
        let positions = self.positions(results)?.to_vec();
        let cache = if self.cache_store { db.object_cache() } else { None };

        if let Some(cache) = cache
            && let Some((index, id_field)) = self.fields.iter().enumerate().find(|(_, f)| f.is_id())
            && let Some(column) = positions[index]
        {
            let id = id_field.result_to_native(results, column)?;
            if let Some(cached) = cache.get(self.table.name(), &id) {
                return Ok(cached);
            }
        }

        let mut record = self.table.new_record();
        let mut id = Value::Null;
        let mut has_collections = false;
        for (field, position) in self.fields.iter().zip(&positions) {
            let Some(column) = *position else {
                has_collections = true;
                continue;
            };
            let mut value = field.result_to_native(results, column)?;
            if field.is_foreign() {
                value = match &self.parent {
                    Some(parent) if parent.matches(field, &value) => Value::from(parent.record.clone()),
                    _ => foreign::resolve(db, ctx, field, value, None)?,
                };
            }
            if field.is_id() {
                id = value.clone();
            }
            record.set(field.name(), value);
        }

        if has_collections {
            let parent = ParentInfo {
                record: record.clone(),
                id: id.clone(),
            };
            for field in self.fields.iter().filter(|f| f.is_foreign_collection()) {
                let collection = ForeignCollection::build(db, ctx, field, parent.clone())?;
                record.set_collection(field.name(), collection);
            }
        }

        if let Some(cache) = cache
            && !id.is_null()
        {
            cache.put(self.table.name(), &id, record.clone());
        }
        Ok(record)
    }
}

#[derive(Debug)]
struct InsertStatement {
    sql: String,
    fields: Vec<Arc<FieldDescriptor>>,
    version_index: Option<usize>,
}

#[derive(Debug)]
struct UpdateStatement {
    sql: String,
    fields: Vec<Arc<FieldDescriptor>>,
    version_index: Option<usize>,
    version_field: Option<Arc<FieldDescriptor>>,
}

#[derive(Debug)]
struct IdStatements {
    field: Arc<FieldDescriptor>,
    query_for_id: String,
    update: UpdateStatement,
    update_id: String,
    delete: String,
}

/// Per-table statements, built from the table descriptor.
#[derive(Debug)]
pub(crate) struct MappedStatements {
    table: Arc<TableDescriptor>,
    insert: InsertStatement,
    by_id: Option<IdStatements>,
}

impl MappedStatements {
    pub(crate) fn build(dialect: &dyn DatabaseType, table: &Arc<TableDescriptor>) -> Self {
        let by_id = table.id_field().map(|id| IdStatements {
            field: Arc::clone(id),
            query_for_id: select_by_field(dialect, table, id),
            update: build_update(dialect, table, id),
            update_id: build_update_id(dialect, table, id),
            delete: build_delete(dialect, table, id),
        });
        Self {
            table: Arc::clone(table),
            insert: build_insert(dialect, table),
            by_id,
        }
    }

    fn id_statements(&self, operation: &str) -> Result<&IdStatements> {
        self.by_id.as_ref().ok_or_else(|| {
            config_err!("Cannot {operation} {} because it doesn't have an id field", self.table.name())
        })
    }

    /// Fetches the row whose id is `id`, consulting the object cache first.
    pub(crate) fn query_for_id(
        &self, db: &Database, conn: &dyn DatabaseConnection, ctx: &mut ResolveContext, id: &Value,
    ) -> Result<Option<Record>> {
        let statements = self.id_statements("query-for-id with")?;
        if let Some(cached) = db.object_cache().and_then(|c| c.get(self.table.name(), id)) {
            return Ok(Some(cached));
        }
        let arg = bind(&statements.field, statements.field.to_sql_arg(id)?);
        query_for_one(db, conn, ctx, &self.table, &statements.query_for_id, arg, true, "query-for-id")
    }

    /// Inserts a record, filling in generated ids and the initial version.
    pub(crate) fn create(&self, db: &Database, conn: &dyn DatabaseConnection, record: &mut Record) -> Result<u64> {
        let mut want_key = false;
        if let Some(id) = self.table.id_field() {
            let assign = !(id.is_allow_generated_id_insert() && !is_default(record.get(id.name())));
            if assign && id.is_self_generated_id() {
                let generated = id
                    .generate_id()
                    .ok_or_else(|| builder_err!("Field {id} could not generate an id"))?;
                record.set(id.name(), generated);
            } else if assign && id.is_generated_id() {
                want_key = true;
            }
        }

        let mut args = Vec::with_capacity(self.insert.fields.len());
        for field in &self.insert.fields {
            let value = record.get(field.name());
            let value = if field.is_allow_generated_id_insert() && is_default(value) { &Value::Null } else { value };
            let mut arg = field.to_sql_arg(value)?;
            if arg.is_null()
                && let Some(default) = field.default_value()
            {
                arg = field.to_sql_arg(default)?;
            }
            args.push(bind(field, arg));
        }
        let mut version = None;
        if let Some(index) = self.insert.version_index
            && args[index].value.is_null()
        {
            let field = &self.insert.fields[index];
            let initial = field.next_version(&Value::Null).unwrap_or(Value::Null);
            args[index].value = field.to_sql_arg(&initial)?;
            version = Some((field.name(), initial));
        }

        let outcome = conn.insert(&self.insert.sql, &args, want_key)?;
        let rows = outcome.rows.unwrap_or(1);
        tracing::debug!(
            table = self.table.name(),
            sql = %self.insert.sql,
            arg_count = args.len(),
            rows,
            "insert data"
        );
        tracing::trace!(args = ?args, "insert arguments");
        if rows == 0 {
            return Ok(0);
        }

        if let Some((name, initial)) = version {
            record.set(name, initial);
        }
        if want_key && let Some(id) = self.table.id_field() {
            let key = outcome.generated_key.ok_or_else(|| {
                builder_err!(
                    "generated-id key was not set by the update call, maybe a schema mismatch between entity and database table?"
                )
            })?;
            if key == 0 {
                return Err(builder_err!(
                    "generated-id key must not be 0 value, maybe a schema mismatch between entity and database table?"
                ));
            }
            let value = id.convert_id_number(key)?;
            tracing::debug!(table = self.table.name(), field = id.name(), key, "assigned generated id");
            record.set(id.name(), value);
        }

        if let Some(cache) = db.object_cache()
            && self.collections_assigned(record)
        {
            let id = self.table.extract_id(record);
            if !id.is_null() {
                cache.put(self.table.name(), &id, record.clone());
            }
        }
        Ok(rows)
    }

    /// Writes every updatable field, bumping the version when the table has one.
    pub(crate) fn update(&self, db: &Database, conn: &dyn DatabaseConnection, record: &mut Record) -> Result<u64> {
        let statements = self.id_statements("update")?;
        let update = &statements.update;
        // only the id argument
        if update.fields.len() <= 1 {
            return Ok(0);
        }
        let mut args = update
            .fields
            .iter()
            .map(|field| Ok(bind(field, field.extract_sql_arg(record)?)))
            .collect::<Result<Vec<_>>>()?;
        let mut version = None;
        if let (Some(index), Some(field)) = (update.version_index, &update.version_field) {
            let next = field.next_version(record.get(field.name())).unwrap_or(Value::Null);
            args[index].value = field.to_sql_arg(&next)?;
            version = Some((field.name(), next));
        }

        let reported = conn.update(&update.sql, &args)?;
        let rows = db.rows_changed(conn, reported, &update.sql);
        tracing::debug!(table = self.table.name(), sql = %update.sql, arg_count = args.len(), rows, "update data");
        tracing::trace!(args = ?args, "update arguments");
        if rows == 0 {
            return Ok(0);
        }

        if let Some((name, next)) = version {
            record.set(name, next);
        }
        if let Some(cache) = db.object_cache() {
            let id = record.get(statements.field.name());
            if cache.get(self.table.name(), id).is_some() {
                cache.put(self.table.name(), id, record.clone());
            }
        }
        Ok(rows)
    }

    /// Changes the id of the row of `record` to `new_id`.
    pub(crate) fn update_id(
        &self, db: &Database, conn: &dyn DatabaseConnection, record: &mut Record, new_id: Value,
    ) -> Result<u64> {
        let statements = self.id_statements("update-id in")?;
        let field = &statements.field;
        let args = [bind(field, field.to_sql_arg(&new_id)?), bind(field, field.extract_sql_arg(record)?)];
        let reported = conn.update(&statements.update_id, &args)?;
        let rows = db.rows_changed(conn, reported, &statements.update_id);
        tracing::debug!(table = self.table.name(), sql = %statements.update_id, rows, "update-id data");
        if rows > 0 {
            if let Some(cache) = db.object_cache() {
                let old_id = record.get(field.name()).clone();
                if let Some(mut cached) = cache.update_id(self.table.name(), &old_id, &new_id) {
                    cached.set(field.name(), new_id.clone());
                    cache.put(self.table.name(), &new_id, cached);
                }
            }
            record.set(field.name(), new_id);
        }
        Ok(rows)
    }

    /// Re-reads the row of `record`, keeping foreign objects whose id did not change.
    pub(crate) fn refresh(
        &self, db: &Database, conn: &dyn DatabaseConnection, record: &mut Record,
    ) -> Result<u64> {
        let statements = self.id_statements("refresh")?;
        let id = record.get(statements.field.name()).clone();
        let arg = bind(&statements.field, statements.field.to_sql_arg(&id)?);
        // bypass the cache, the point is to read the database
        let mut ctx = ResolveContext::new();
        let Some(fresh) =
            query_for_one(db, conn, &mut ctx, &self.table, &statements.query_for_id, arg, false, "refresh")?
        else {
            return Ok(0);
        };
        for field in self.table.fields() {
            if field.is_id() {
                continue;
            }
            if field.is_foreign_collection() {
                if let Some(collection) = fresh.collection(field.name()) {
                    record.set_collection(field.name(), collection.clone());
                }
                continue;
            }
            let value = fresh.get(field.name());
            let keep = field.is_foreign()
                && record.get(field.name()).as_object().is_some()
                && field.foreign_id_of(record.get(field.name())) == field.foreign_id_of(value);
            if !keep {
                record.set(field.name(), value.clone());
            }
        }
        Ok(1)
    }

    /// Deletes the row of `record`.
    pub(crate) fn delete(&self, db: &Database, conn: &dyn DatabaseConnection, record: &Record) -> Result<u64> {
        let statements = self.id_statements("delete from")?;
        let id = record.get(statements.field.name()).clone();
        self.delete_by_id(db, conn, &id)
    }

    /// Deletes the row with the given id.
    pub(crate) fn delete_by_id(&self, db: &Database, conn: &dyn DatabaseConnection, id: &Value) -> Result<u64> {
        let statements = self.id_statements("delete from")?;
        let args = [bind(&statements.field, statements.field.to_sql_arg(id)?)];
        let reported = conn.delete(&statements.delete, &args)?;
        let rows = db.rows_changed(conn, reported, &statements.delete);
        tracing::debug!(table = self.table.name(), sql = %statements.delete, %id, rows, "delete data");
        if rows > 0
            && let Some(cache) = db.object_cache()
        {
            cache.remove(self.table.name(), id);
        }
        Ok(rows)
    }

    /// Deletes every row whose id is in `ids` with one statement.
    pub(crate) fn delete_ids(&self, db: &Database, conn: &dyn DatabaseConnection, ids: &[Value]) -> Result<u64> {
        let statements = self.id_statements("delete")?;
        if ids.is_empty() {
            return Ok(0);
        }
        let field = &statements.field;
        let dialect = db.dialect();
        let mut sql = String::with_capacity(128);
        sql.push_str("DELETE FROM ");
        dialect.append_escaped_entity_name(&mut sql, self.table.name());
        sql.push_str(" WHERE ");
        dialect.append_escaped_entity_name(&mut sql, field.column_name());
        sql.push_str(" IN (");
        sql.push_str(&vec!["?"; ids.len()].join(","));
        sql.push_str(") ");

        let args = ids.iter().map(|id| Ok(bind(field, field.to_sql_arg(id)?))).collect::<Result<Vec<_>>>()?;
        let reported = conn.delete(&sql, &args)?;
        let rows = db.rows_changed(conn, reported, &sql);
        tracing::debug!(table = self.table.name(), sql = %sql, arg_count = args.len(), rows, "delete-collection data");
        if rows > 0
            && let Some(cache) = db.object_cache()
        {
            for id in ids {
                cache.remove(self.table.name(), id);
            }
        }
        Ok(rows)
    }

    /// Id of a record, for bulk deletes.
    pub(crate) fn id_of(&self, record: &Record) -> Result<Value> {
        let statements = self.id_statements("delete")?;
        Ok(record.get(statements.field.name()).clone())
    }

    fn collections_assigned(&self, record: &Record) -> bool {
        self.table
            .fields()
            .iter()
            .filter(|f| f.is_foreign_collection())
            .all(|f| record.collection(f.name()).is_some())
    }
}

/// Runs a single-row select on `conn`. More than one matching row is an error.
#[allow(clippy::too_many_arguments)]
pub(crate) fn query_for_one(
    db: &Database, conn: &dyn DatabaseConnection, ctx: &mut ResolveContext, table: &Arc<TableDescriptor>, sql: &str,
    arg: BoundArg, cache: bool, label: &str,
) -> Result<Option<Record>> {
    let mut stmt = conn.compile_statement(sql, StatementType::Select)?;
    stmt.set_object(0, arg.value, arg.sql_type)?;
    let mut results = stmt.run_query()?;
    let mut mapper = RowMapper::new(Arc::clone(table), table.fields().to_vec(), None, cache);

    let mapped = if results.first()? {
        let record = mapper.map_row(db, ctx, results.as_ref())?;
        if results.next()? {
            tracing::error!(sql, "{label} got more than 1 result");
            results.close()?;
            stmt.close()?;
            return Err(builder_err!("{label} got more than 1 result: {sql}"));
        }
        Some(record)
    } else {
        None
    };
    results.close()?;
    stmt.close()?;
    tracing::debug!(table = table.name(), sql, found = mapped.is_some(), "{label} query");
    Ok(mapped)
}

/// `SELECT * FROM table WHERE column = ?`
pub(crate) fn select_by_field(dialect: &dyn DatabaseType, table: &TableDescriptor, field: &FieldDescriptor) -> String {
    let mut sb = String::with_capacity(64);
    append_table_name(dialect, &mut sb, "SELECT * FROM ", table.name());
    append_where_field_eq(dialect, &mut sb, field);
    sb
}

fn build_insert(dialect: &dyn DatabaseType, table: &TableDescriptor) -> InsertStatement {
    let fields: Vec<_> = table
        .fields()
        .iter()
        .filter(|f| {
            !f.is_foreign_collection()
                && !f.is_read_only()
                && !(f.is_generated_id() && !f.is_self_generated_id() && !f.is_allow_generated_id_insert())
        })
        .map(Arc::clone)
        .collect();
    let version_index = fields.iter().position(|f| f.is_version());

    let mut sb = String::with_capacity(128);
    append_table_name(dialect, &mut sb, "INSERT INTO ", table.name());
    if fields.is_empty() {
        dialect.append_insert_no_columns(&mut sb);
    } else {
        sb.push('(');
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                sb.push(',');
            }
            dialect.append_escaped_entity_name(&mut sb, field.column_name());
            sb.push(' ');
        }
        sb.push_str(") VALUES (");
        sb.push_str(&vec!["?"; fields.len()].join(","));
        sb.push(')');
    }
    InsertStatement {
        sql: sb,
        fields,
        version_index,
    }
}

fn build_update(dialect: &dyn DatabaseType, table: &TableDescriptor, id: &Arc<FieldDescriptor>) -> UpdateStatement {
    let mut fields: Vec<_> = table
        .fields()
        .iter()
        .filter(|f| !f.is_id() && !f.is_foreign_collection() && !f.is_read_only())
        .map(Arc::clone)
        .collect();
    let version_index = fields.iter().position(|f| f.is_version());
    let version_field = version_index.map(|i| Arc::clone(&fields[i]));

    let mut sb = String::with_capacity(128);
    append_table_name(dialect, &mut sb, "UPDATE ", table.name());
    for (i, field) in fields.iter().enumerate() {
        sb.push_str(if i == 0 { "SET " } else { ", " });
        dialect.append_escaped_entity_name(&mut sb, field.column_name());
        sb.push_str(" = ?");
    }
    sb.push(' ');
    append_where_field_eq(dialect, &mut sb, id);
    fields.push(Arc::clone(id));
    if let Some(version) = &version_field {
        sb.push_str(" AND ");
        dialect.append_escaped_entity_name(&mut sb, version.column_name());
        sb.push_str(" = ?");
        fields.push(Arc::clone(version));
    }
    UpdateStatement {
        sql: sb,
        fields,
        version_index,
        version_field,
    }
}

fn build_update_id(dialect: &dyn DatabaseType, table: &TableDescriptor, id: &FieldDescriptor) -> String {
    let mut sb = String::with_capacity(64);
    append_table_name(dialect, &mut sb, "UPDATE ", table.name());
    sb.push_str("SET ");
    dialect.append_escaped_entity_name(&mut sb, id.column_name());
    sb.push_str(" = ? ");
    append_where_field_eq(dialect, &mut sb, id);
    sb
}

fn build_delete(dialect: &dyn DatabaseType, table: &TableDescriptor, id: &FieldDescriptor) -> String {
    let mut sb = String::with_capacity(64);
    append_table_name(dialect, &mut sb, "DELETE FROM ", table.name());
    append_where_field_eq(dialect, &mut sb, id);
    sb
}

fn append_table_name(dialect: &dyn DatabaseType, sb: &mut String, prefix: &str, table: &str) {
    sb.push_str(prefix);
    dialect.append_escaped_entity_name(sb, table);
    sb.push(' ');
}

fn append_where_field_eq(dialect: &dyn DatabaseType, sb: &mut String, field: &FieldDescriptor) {
    sb.push_str("WHERE ");
    dialect.append_escaped_entity_name(sb, field.column_name());
    sb.push_str(" = ?");
}

fn bind(field: &FieldDescriptor, value: Value) -> BoundArg {
    BoundArg {
        value,
        sql_type: field.sql_type(),
    }
}

/// Unset ids are null or zero.
fn is_default(value: &Value) -> bool {
    value.is_null() || value.as_i64() == Some(0)
}
