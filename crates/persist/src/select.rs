use std::fmt::Write as _;
use std::sync::Arc;

use crate::arg::SelectArg;
use crate::dialect::DatabaseType;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::join::{self, JoinInfo, JoinKind, JoinWhereOperation};
use crate::statement::{PreparedStmt, StatementType, WhereOperation};
use crate::table::TableDescriptor;
use crate::where_clause::Where;
use crate::builder_err;

#[derive(Debug, Clone)]
enum Selection {
    Column(String),
    Raw(String),
}

#[derive(Debug, Clone)]
enum OrderBy {
    Column { column: String, ascending: bool },
    Raw { sql: String, args: Vec<SelectArg> },
}

/// Builder for constructing SELECT queries.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    dialect: Arc<dyn DatabaseType>,
    table: Arc<TableDescriptor>,
    where_clause: Option<Where>,
    distinct: bool,
    select_id_column: bool,
    select_list: Option<Vec<Selection>>,
    order_by: Vec<OrderBy>,
    group_by: Vec<Selection>,
    inner_query: bool,
    alias: Option<String>,
    count_of: Option<String>,
    having: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    joins: Vec<JoinInfo>,
}

impl SelectBuilder {
    /// Creates a builder selecting every column of `table`.
    #[must_use]
    pub fn new(dialect: Arc<dyn DatabaseType>, table: Arc<TableDescriptor>) -> Self {
        let select_id_column = table.id_field().is_some();
        Self {
            dialect,
            table,
            where_clause: None,
            distinct: false,
            select_id_column,
            select_list: None,
            order_by: Vec::new(),
            group_by: Vec::new(),
            inner_query: false,
            alias: None,
            count_of: None,
            having: None,
            limit: None,
            offset: None,
            joins: Vec::new(),
        }
    }

    /// Queried table.
    #[must_use]
    pub const fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    /// Starts a new WHERE clause, replacing any previous one.
    pub fn r#where(&mut self) -> &mut Where {
        self.where_clause.insert(Where::new(&self.table))
    }

    /// Replaces the WHERE clause.
    pub fn set_where(&mut self, where_clause: Option<Where>) {
        self.where_clause = where_clause;
    }

    /// Adds columns to the select list. The id column is added automatically unless the
    /// query is distinct or grouped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`](crate::Error::NotFound) for unknown columns.
    pub fn select_columns<I, S>(mut self, columns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for column in columns {
            let column = column.into();
            self.table.field_by_column(&column)?;
            self.select_list.get_or_insert_with(Vec::new).push(Selection::Column(column));
        }
        Ok(self)
    }

    /// Adds a raw select expression. Results of such queries are returned as raw rows.
    #[must_use]
    pub fn select_raw(mut self, expression: impl Into<String>) -> Self {
        self.select_list.get_or_insert_with(Vec::new).push(Selection::Raw(expression.into()));
        self
    }

    /// Adds a GROUP BY column.
    ///
    /// # Errors
    ///
    /// Fails for unknown columns and foreign collections.
    pub fn group_by(mut self, column: &str) -> Result<Self> {
        if self.table.field_by_column(column)?.is_foreign_collection() {
            return Err(builder_err!("Can't groupBy foreign collection field: {column}"));
        }
        self.group_by.push(Selection::Column(column.to_string()));
        self.select_id_column = false;
        Ok(self)
    }

    /// Adds a raw GROUP BY expression.
    #[must_use]
    pub fn group_by_raw(mut self, sql: impl Into<String>) -> Self {
        self.group_by.push(Selection::Raw(sql.into()));
        self.select_id_column = false;
        self
    }

    /// Adds an ORDER BY column.
    ///
    /// # Errors
    ///
    /// Fails for unknown columns and foreign collections.
    pub fn order_by(mut self, column: &str, ascending: bool) -> Result<Self> {
        if self.table.field_by_column(column)?.is_foreign_collection() {
            return Err(builder_err!("Can't orderBy foreign collection field: {column}"));
        }
        self.order_by.push(OrderBy::Column {
            column: column.to_string(),
            ascending,
        });
        Ok(self)
    }

    /// Adds a raw ORDER BY expression with its arguments.
    #[must_use]
    pub fn order_by_raw(mut self, sql: impl Into<String>, args: Vec<SelectArg>) -> Self {
        self.order_by.push(OrderBy::Raw { sql: sql.into(), args });
        self
    }

    /// Returns distinct rows only.
    #[must_use]
    pub const fn distinct(mut self) -> Self {
        self.distinct = true;
        self.select_id_column = false;
        self
    }

    /// Sets the maximum number of rows to return.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of rows to skip.
    ///
    /// # Errors
    ///
    /// Fails when the dialect has no OFFSET support.
    pub fn offset(mut self, offset: u64) -> Result<Self> {
        if !self.dialect.is_offset_sql_supported() {
            return Err(builder_err!("Offset is not supported by this database"));
        }
        self.offset = Some(offset);
        Ok(self)
    }

    /// Turns the query into `SELECT COUNT(expression)`.
    #[must_use]
    pub fn set_count_of(mut self, expression: impl Into<String>) -> Self {
        self.count_of = Some(expression.into());
        self
    }

    /// Sets the HAVING clause.
    #[must_use]
    pub fn having(mut self, having: impl Into<String>) -> Self {
        self.having = Some(having.into());
        self
    }

    /// Sets a table alias, used to qualify columns when joining.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// INNER JOIN on the foreign link between the two tables, combining WHERE clauses with AND.
    ///
    /// # Errors
    ///
    /// Fails when no foreign field links the tables.
    pub fn join(self, joined: Self) -> Result<Self> {
        self.join_with(joined, JoinKind::Inner, JoinWhereOperation::And)
    }

    /// INNER JOIN combining WHERE clauses with OR.
    ///
    /// # Errors
    ///
    /// Fails when no foreign field links the tables.
    pub fn join_or(self, joined: Self) -> Result<Self> {
        self.join_with(joined, JoinKind::Inner, JoinWhereOperation::Or)
    }

    /// LEFT JOIN combining WHERE clauses with AND.
    ///
    /// # Errors
    ///
    /// Fails when no foreign field links the tables.
    pub fn left_join(self, joined: Self) -> Result<Self> {
        self.join_with(joined, JoinKind::Left, JoinWhereOperation::And)
    }

    /// LEFT JOIN combining WHERE clauses with OR.
    ///
    /// # Errors
    ///
    /// Fails when no foreign field links the tables.
    pub fn left_join_or(self, joined: Self) -> Result<Self> {
        self.join_with(joined, JoinKind::Left, JoinWhereOperation::Or)
    }

    /// Joins on the foreign link between the two tables.
    ///
    /// # Errors
    ///
    /// Fails when no foreign field links the tables.
    pub fn join_with(mut self, joined: Self, kind: JoinKind, operation: JoinWhereOperation) -> Result<Self> {
        let (local, remote) = join::match_joined_fields(&self.table, &joined.table)?;
        self.joins.push(JoinInfo { kind, operation, query: joined, local, remote });
        Ok(self)
    }

    /// Joins on explicitly named columns.
    ///
    /// # Errors
    ///
    /// Fails when either column is unknown.
    pub fn join_on_columns(
        mut self, local_column: &str, joined_column: &str, joined: Self, kind: JoinKind,
        operation: JoinWhereOperation,
    ) -> Result<Self> {
        let (local, remote) =
            join::match_joined_fields_by_name(&self.table, local_column, &joined.table, joined_column)?;
        self.joins.push(JoinInfo { kind, operation, query: joined, local, remote });
        Ok(self)
    }

    /// Clears everything back to a plain `SELECT *`.
    pub fn reset(&mut self) {
        self.where_clause = None;
        self.distinct = false;
        self.select_id_column = self.table.id_field().is_some();
        self.select_list = None;
        self.order_by.clear();
        self.group_by.clear();
        self.inner_query = false;
        self.alias = None;
        self.count_of = None;
        self.having = None;
        self.limit = None;
        self.offset = None;
        self.joins.clear();
    }

    /// Builds the statement.
    ///
    /// # Errors
    ///
    /// Fails when the WHERE clause is incomplete or an argument cannot be rendered.
    pub fn prepare(&self) -> Result<PreparedStmt> {
        let mut sb = String::with_capacity(128);
        let mut args = Vec::new();
        let (statement_type, result_fields) = self.append_statement_string(&mut sb, &mut args)?;

        tracing::debug!(
            table = self.table.name(),
            sql = %sb,
            arg_count = args.len(),
            "SelectBuilder generated SQL"
        );

        let max_rows = if self.dialect.is_limit_sql_supported() { None } else { self.limit };
        Ok(PreparedStmt::new(Arc::clone(&self.table), sb, args, result_fields, statement_type)?
            .with_max_rows(max_rows)
            .with_cache_store(self.select_list.is_none()))
    }

    /// Builds a `COUNT(*)` version of this query, leaving the builder unchanged.
    ///
    /// # Errors
    ///
    /// Fails when the WHERE clause is incomplete.
    pub fn prepare_count_of(&self, expression: Option<&str>) -> Result<PreparedStmt> {
        let mut counting = self.clone();
        counting.count_of = Some(expression.unwrap_or("*").to_string());
        counting.prepare()
    }

    /// SQL text only.
    ///
    /// # Errors
    ///
    /// Fails when the WHERE clause is incomplete.
    pub fn prepare_statement_string(&self) -> Result<String> {
        let mut sb = String::with_capacity(128);
        self.append_statement_string(&mut sb, &mut Vec::new())?;
        Ok(sb)
    }

    pub(crate) const fn enable_inner_query(&mut self) {
        self.inner_query = true;
    }

    pub(crate) fn select_column_count(&self) -> usize {
        if self.count_of.is_some() {
            return 1;
        }
        self.select_list.as_ref().map_or(0, Vec::len)
    }

    pub(crate) fn select_columns_description(&self) -> String {
        if let Some(count_of) = &self.count_of {
            return format!("COUNT({count_of})");
        }
        let Some(list) = &self.select_list else {
            return String::new();
        };
        let items: Vec<&str> = list
            .iter()
            .map(|s| match s {
                Selection::Column(c) | Selection::Raw(c) => c.as_str(),
            })
            .collect();
        format!("[{}]", items.join(", "))
    }

    /// Appends the full statement, returning its kind and result fields.
    pub(crate) fn append_statement_string(
        &self, sb: &mut String, args: &mut Vec<SelectArg>,
    ) -> Result<(StatementType, Option<Vec<Arc<FieldDescriptor>>>)> {
        let qualify = !self.joins.is_empty();
        let start = self.append_statement_start(sb, qualify)?;
        self.append_where(sb, args, WhereOperation::First, qualify)?;
        self.append_statement_end(sb, args, qualify)?;
        Ok(start)
    }

    fn qualifier(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.table.name())
    }

    fn append_column_name(&self, sb: &mut String, column: &str, qualify: bool) {
        if qualify {
            self.dialect.append_escaped_entity_name(sb, self.qualifier());
            sb.push('.');
        }
        self.dialect.append_escaped_entity_name(sb, column);
    }

    fn append_statement_start(
        &self, sb: &mut String, qualify: bool,
    ) -> Result<(StatementType, Option<Vec<Arc<FieldDescriptor>>>)> {
        sb.push_str("SELECT ");
        if self.dialect.is_limit_after_select() {
            self.append_limit(sb);
        }
        if self.distinct {
            sb.push_str("DISTINCT ");
        }
        let start = match &self.count_of {
            Some(count_of) => {
                let _ = write!(sb, "COUNT({count_of}) ");
                (StatementType::SelectLong, None)
            }
            None => self.append_selects(sb, qualify)?,
        };
        sb.push_str("FROM ");
        self.dialect.append_escaped_entity_name(sb, self.table.name());
        if let Some(alias) = &self.alias {
            sb.push_str(" AS ");
            self.dialect.append_escaped_entity_name(sb, alias);
        }
        sb.push(' ');
        self.append_join_sql(sb);
        Ok(start)
    }

    fn append_selects(
        &self, sb: &mut String, qualify: bool,
    ) -> Result<(StatementType, Option<Vec<Arc<FieldDescriptor>>>)> {
        let Some(list) = &self.select_list else {
            if qualify {
                self.dialect.append_escaped_entity_name(sb, self.qualifier());
                sb.push('.');
            }
            sb.push_str("* ");
            return Ok((StatementType::Select, Some(self.table.fields().to_vec())));
        };

        let mut statement_type = StatementType::Select;
        let mut first = true;
        let mut has_id = self.inner_query;
        let mut fields = Vec::with_capacity(list.len() + 1);
        for selection in list {
            match selection {
                Selection::Raw(sql) => {
                    statement_type = StatementType::SelectRaw;
                    if !first {
                        sb.push_str(", ");
                    }
                    first = false;
                    sb.push_str(sql);
                }
                Selection::Column(column) => {
                    let field = self.table.field_by_column(column)?;
                    // collections have no column but are still built for each row
                    if field.is_foreign_collection() {
                        fields.push(Arc::clone(field));
                        continue;
                    }
                    if !first {
                        sb.push_str(", ");
                    }
                    first = false;
                    self.append_column_name(sb, field.column_name(), qualify);
                    fields.push(Arc::clone(field));
                    if field.is_id() {
                        has_id = true;
                    }
                }
            }
        }

        if statement_type == StatementType::SelectRaw {
            sb.push(' ');
            return Ok((statement_type, None));
        }
        if !has_id
            && self.select_id_column
            && let Some(id) = self.table.id_field()
        {
            if !first {
                sb.push(',');
            }
            self.append_column_name(sb, id.column_name(), qualify);
            fields.push(Arc::clone(id));
        }
        sb.push(' ');
        Ok((statement_type, Some(fields)))
    }

    fn append_join_sql(&self, sb: &mut String) {
        for join in &self.joins {
            let _ = write!(sb, "{} JOIN ", join.kind.as_sql());
            self.dialect.append_escaped_entity_name(sb, join.query.table.name());
            if let Some(alias) = &join.query.alias {
                sb.push_str(" AS ");
                self.dialect.append_escaped_entity_name(sb, alias);
            }
            sb.push_str(" ON ");
            self.append_column_name(sb, join.local.column_name(), true);
            sb.push_str(" = ");
            join.query.append_column_name(sb, join.remote.column_name(), true);
            sb.push(' ');
            join.query.append_join_sql(sb);
        }
    }

    /// Returns whether the next fragment is still the first one.
    fn append_where(
        &self, sb: &mut String, args: &mut Vec<SelectArg>, operation: WhereOperation, qualify: bool,
    ) -> Result<bool> {
        let mut first = operation == WhereOperation::First;
        if let Some(where_clause) = &self.where_clause {
            operation.append_before(sb);
            let table_name = qualify.then(|| self.qualifier());
            where_clause.append_sql(&*self.dialect, table_name, sb, args)?;
            operation.append_after(sb);
            first = false;
        }
        for join in &self.joins {
            let operation = if first { WhereOperation::First } else { join.operation.into() };
            first = join.query.append_where(sb, args, operation, true)?;
        }
        Ok(first)
    }

    fn append_statement_end(&self, sb: &mut String, args: &mut Vec<SelectArg>, qualify: bool) -> Result<()> {
        self.append_group_bys(sb, true, qualify);
        if let Some(having) = &self.having {
            let _ = write!(sb, "HAVING {having} ");
        }
        self.append_order_bys(sb, args, true, qualify);
        if !self.dialect.is_limit_after_select() {
            self.append_limit(sb);
        }
        self.append_offset(sb)
    }

    fn append_group_bys(&self, sb: &mut String, mut first: bool, qualify: bool) -> bool {
        if !self.group_by.is_empty() {
            if first {
                sb.push_str("GROUP BY ");
            }
            for group_by in &self.group_by {
                if !first {
                    sb.push(',');
                }
                first = false;
                match group_by {
                    Selection::Column(column) => self.append_column_name(sb, column, qualify),
                    Selection::Raw(sql) => sb.push_str(sql),
                }
            }
            sb.push(' ');
        }
        for join in &self.joins {
            first = join.query.append_group_bys(sb, first, true);
        }
        first
    }

    fn append_order_bys(&self, sb: &mut String, args: &mut Vec<SelectArg>, mut first: bool, qualify: bool) -> bool {
        if !self.order_by.is_empty() {
            if first {
                sb.push_str("ORDER BY ");
            }
            for order_by in &self.order_by {
                if !first {
                    sb.push(',');
                }
                first = false;
                match order_by {
                    OrderBy::Column { column, ascending } => {
                        self.append_column_name(sb, column, qualify);
                        if !ascending {
                            sb.push_str(" DESC");
                        }
                    }
                    OrderBy::Raw { sql, args: raw_args } => {
                        sb.push_str(sql);
                        args.extend(raw_args.iter().cloned());
                    }
                }
            }
            sb.push(' ');
        }
        for join in &self.joins {
            first = join.query.append_order_bys(sb, args, first, true);
        }
        first
    }

    fn append_limit(&self, sb: &mut String) {
        if let Some(limit) = self.limit
            && self.dialect.is_limit_sql_supported()
        {
            self.dialect.append_limit_value(sb, limit, self.offset);
        }
    }

    fn append_offset(&self, sb: &mut String) -> Result<()> {
        let Some(offset) = self.offset else {
            return Ok(());
        };
        if self.dialect.is_offset_limit_argument() {
            if self.limit.is_none() {
                return Err(builder_err!(
                    "If the offset is specified, limit must also be specified with this database"
                ));
            }
        } else {
            self.dialect.append_offset_value(sb, offset);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, ForeignCollectionConfig, TableConfig};
    use crate::dialect::SqliteDialect;
    use crate::table::Schema;
    use crate::value::NativeType;

    fn schema() -> Schema {
        Schema::builder()
            .table(
                TableConfig::new("account")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::of("name", NativeType::String))
                    .field(FieldConfig::new("orders").foreign_collection(ForeignCollectionConfig::new("order"))),
            )
            .table(
                TableConfig::new("order")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::of("amount", NativeType::Int))
                    .field(FieldConfig::new("account").foreign("account")),
            )
            .build()
            .unwrap()
    }

    fn builder(schema: &Schema, table: &str) -> SelectBuilder {
        SelectBuilder::new(Arc::new(SqliteDialect), Arc::clone(schema.table(table).unwrap()))
    }

    #[test]
    fn select_all() {
        let schema = schema();
        let prepared = builder(&schema, "account").prepare().unwrap();
        assert_eq!(prepared.statement(), "SELECT * FROM `account` ");
        assert_eq!(prepared.statement_type(), StatementType::Select);
        assert_eq!(prepared.result_fields().unwrap().len(), 3);
        assert!(prepared.is_cache_store());
    }

    #[test]
    fn selected_columns_add_id() {
        let schema = schema();
        let prepared = builder(&schema, "account").select_columns(["name"]).unwrap().prepare().unwrap();
        assert_eq!(prepared.statement(), "SELECT `name`,`id` FROM `account` ");
        assert!(!prepared.is_cache_store());

        let prepared = builder(&schema, "account")
            .distinct()
            .select_columns(["name", "orders"])
            .unwrap()
            .prepare()
            .unwrap();
        assert_eq!(prepared.statement(), "SELECT DISTINCT `name` FROM `account` ");
        assert_eq!(prepared.result_fields().unwrap().len(), 2);
    }

    #[test]
    fn raw_and_count() {
        let schema = schema();
        let prepared = builder(&schema, "order")
            .select_raw("MAX(amount)")
            .select_raw("MIN(amount)")
            .prepare()
            .unwrap();
        assert_eq!(prepared.statement(), "SELECT MAX(amount), MIN(amount) FROM `order` ");
        assert_eq!(prepared.statement_type(), StatementType::SelectRaw);
        assert!(prepared.result_fields().is_none());

        let counting = builder(&schema, "order").limit(3);
        let prepared = counting.prepare_count_of(None).unwrap();
        assert_eq!(prepared.statement(), "SELECT COUNT(*) FROM `order` LIMIT 3 ");
        assert_eq!(prepared.statement_type(), StatementType::SelectLong);
        assert_eq!(counting.prepare().unwrap().statement(), "SELECT * FROM `order` LIMIT 3 ");
    }

    #[test]
    fn where_order_limit() {
        let schema = schema();
        let mut qb = builder(&schema, "order")
            .order_by("amount", false)
            .unwrap()
            .order_by("id", true)
            .unwrap()
            .group_by("account_id")
            .unwrap()
            .having("COUNT(*) > 1")
            .limit(10)
            .offset(20)
            .unwrap();
        qb.r#where().gt("amount", 5).unwrap();
        assert_eq!(
            qb.prepare_statement_string().unwrap(),
            "SELECT * FROM `order` WHERE `amount` > 5 GROUP BY `account_id` HAVING COUNT(*) > 1 ORDER BY `amount` DESC,`id` LIMIT 10 OFFSET 20 "
        );
    }

    #[test]
    fn join_flattens_where_and_order() {
        let schema = schema();
        let mut accounts = builder(&schema, "account").order_by("name", true).unwrap();
        accounts.r#where().eq("name", "ann").unwrap();
        let mut orders = builder(&schema, "order");
        orders.r#where().gt("amount", 5).unwrap();
        let orders = orders.join(accounts).unwrap();
        assert_eq!(
            orders.prepare_statement_string().unwrap(),
            "SELECT `order`.* FROM `order` INNER JOIN `account` ON `order`.`account_id` = `account`.`id` WHERE `order`.`amount` > 5 AND (`account`.`name` = 'ann' ) ORDER BY `account`.`name` "
        );

        let mut accounts = builder(&schema, "account").alias("a");
        accounts.r#where().eq("name", "ann").unwrap();
        let orders = builder(&schema, "order").left_join_or(accounts).unwrap();
        assert_eq!(
            orders.prepare_statement_string().unwrap(),
            "SELECT `order`.* FROM `order` LEFT JOIN `account` AS `a` ON `order`.`account_id` = `a`.`id` WHERE `a`.`name` = 'ann' "
        );
    }

    #[test]
    fn subqueries() {
        let schema = schema();
        let inner = builder(&schema, "order").select_columns(["account_id"]).unwrap();
        let mut qb = builder(&schema, "account");
        qb.r#where().in_subquery("id", inner).unwrap();
        assert_eq!(
            qb.prepare_statement_string().unwrap(),
            "SELECT * FROM `account` WHERE `id` IN (SELECT `account_id` FROM `order` ) "
        );

        let mut qb = builder(&schema, "account");
        let err = qb.r#where().in_subquery("id", builder(&schema, "order")).unwrap_err();
        assert!(err.to_string().contains("Inner query must have only 1 select column specified instead of *"));

        let inner = builder(&schema, "order").select_columns(["amount"]).unwrap();
        let mut qb = builder(&schema, "account");
        qb.r#where().in_subquery("id", inner).unwrap();
        let err = qb.prepare().unwrap_err();
        assert!(err.to_string().contains("is not the same type as inner column"));

        let mut qb = builder(&schema, "account");
        qb.r#where().exists(builder(&schema, "order")).unwrap();
        assert_eq!(
            qb.prepare_statement_string().unwrap(),
            "SELECT * FROM `account` WHERE EXISTS (SELECT * FROM `order` ) "
        );
    }

    #[test]
    fn builder_errors() {
        let schema = schema();
        let err = builder(&schema, "account").order_by("orders", true).unwrap_err();
        assert!(err.to_string().contains("Can't orderBy foreign collection field: orders"));
        let err = builder(&schema, "account").group_by("orders").unwrap_err();
        assert!(err.to_string().contains("Can't groupBy foreign collection field: orders"));

        let mut qb = builder(&schema, "account");
        qb.r#where();
        let err = qb.prepare().unwrap_err();
        assert!(err.to_string().contains("No where clauses defined"));
    }

    #[test]
    fn reset_restores_defaults() {
        let schema = schema();
        let fresh = builder(&schema, "account").prepare_statement_string().unwrap();
        let mut qb = builder(&schema, "account").distinct().limit(4).alias("a");
        qb.r#where().eq("name", "x").unwrap();
        qb.reset();
        assert_eq!(qb.prepare_statement_string().unwrap(), fresh);
    }
}
