//! Stack-based WHERE builder.
//!
//! Comparisons are pushed onto a stack. `and()` and `or()` pop the previous clause and leave a
//! hole that the next clause fills, so `eq(a)?.and()?.eq(b)` reads left to right. `and_n(n)`
//! and `or_n(n)` instead combine the last `n` clauses already on the stack.

use std::fmt;
use std::sync::Arc;

use crate::arg::SelectArg;
use crate::clause::{Clause, Combine, CompareOp, Operand};
use crate::dialect::DatabaseType;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::select::SelectBuilder;
use crate::table::TableDescriptor;
use crate::value::Record;
use crate::builder_err;

/// WHERE clause under construction for one table.
#[derive(Clone)]
pub struct Where {
    table: Arc<TableDescriptor>,
    stack: Vec<Clause>,
    pending: Option<String>,
}

impl Where {
    /// Creates an empty WHERE for `table`.
    #[must_use]
    pub fn new(table: &Arc<TableDescriptor>) -> Self {
        Self {
            table: Arc::clone(table),
            stack: Vec::new(),
            pending: None,
        }
    }

    /// `column = value`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn eq(&mut self, column: &str, value: impl Into<Operand>) -> Result<&mut Self> {
        self.compare(column, CompareOp::Eq, value.into())
    }

    /// `column <> value`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn ne(&mut self, column: &str, value: impl Into<Operand>) -> Result<&mut Self> {
        self.compare(column, CompareOp::Ne, value.into())
    }

    /// `column > value`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn gt(&mut self, column: &str, value: impl Into<Operand>) -> Result<&mut Self> {
        self.compare(column, CompareOp::Gt, value.into())
    }

    /// `column >= value`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn ge(&mut self, column: &str, value: impl Into<Operand>) -> Result<&mut Self> {
        self.compare(column, CompareOp::Ge, value.into())
    }

    /// `column < value`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn lt(&mut self, column: &str, value: impl Into<Operand>) -> Result<&mut Self> {
        self.compare(column, CompareOp::Lt, value.into())
    }

    /// `column <= value`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn le(&mut self, column: &str, value: impl Into<Operand>) -> Result<&mut Self> {
        self.compare(column, CompareOp::Le, value.into())
    }

    /// `column LIKE value`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn like(&mut self, column: &str, value: impl Into<Operand>) -> Result<&mut Self> {
        self.compare(column, CompareOp::Like, value.into())
    }

    /// `column <op> value` with an operator the caller formats for the database.
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn raw_comparison(
        &mut self, column: &str, operator: &str, value: impl Into<Operand>,
    ) -> Result<&mut Self> {
        self.compare(column, CompareOp::Raw(operator.to_string()), value.into())
    }

    /// `column BETWEEN low AND high`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn between(
        &mut self, column: &str, low: impl Into<Operand>, high: impl Into<Operand>,
    ) -> Result<&mut Self> {
        let field = self.comparable(column)?;
        self.add_clause(Clause::Between {
            field,
            low: low.into(),
            high: high.into(),
        })
    }

    /// `column IN (values)`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn r#in<I>(&mut self, column: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Operand>,
    {
        self.in_values(column, values.into_iter().map(Into::into).collect(), false)
    }

    /// `column NOT IN (values)`
    ///
    /// # Errors
    ///
    /// Fails for unknown or non-comparable columns.
    pub fn not_in<I>(&mut self, column: &str, values: I) -> Result<&mut Self>
    where
        I: IntoIterator,
        I::Item: Into<Operand>,
    {
        self.in_values(column, values.into_iter().map(Into::into).collect(), true)
    }

    /// `column IN (subquery)`. The subquery must select exactly one column.
    ///
    /// # Errors
    ///
    /// Fails for unknown columns and subqueries selecting other than one column.
    pub fn in_subquery(&mut self, column: &str, query: SelectBuilder) -> Result<&mut Self> {
        self.in_query(column, query, false)
    }

    /// `column NOT IN (subquery)`.
    ///
    /// # Errors
    ///
    /// Fails for unknown columns and subqueries selecting other than one column.
    pub fn not_in_subquery(&mut self, column: &str, query: SelectBuilder) -> Result<&mut Self> {
        self.in_query(column, query, true)
    }

    /// `EXISTS (subquery)`
    ///
    /// # Errors
    ///
    /// Fails when a previous NOT cannot take the clause.
    pub fn exists(&mut self, mut query: SelectBuilder) -> Result<&mut Self> {
        query.enable_inner_query();
        self.add_clause(Clause::Exists(Box::new(query)))
    }

    /// `column IS NULL`
    ///
    /// # Errors
    ///
    /// Fails for unknown columns.
    pub fn is_null(&mut self, column: &str) -> Result<&mut Self> {
        let field = Arc::clone(self.table.field_by_column(column)?);
        self.add_clause(Clause::IsNull { field, negated: false })
    }

    /// `column IS NOT NULL`
    ///
    /// # Errors
    ///
    /// Fails for unknown columns.
    pub fn is_not_null(&mut self, column: &str) -> Result<&mut Self> {
        let field = Arc::clone(self.table.field_by_column(column)?);
        self.add_clause(Clause::IsNull { field, negated: true })
    }

    /// `id = value`
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field.
    pub fn id_eq(&mut self, id: impl Into<Operand>) -> Result<&mut Self> {
        let Some(field) = self.table.id_field().map(Arc::clone) else {
            return Err(builder_err!("Object has no id column specified"));
        };
        self.add_clause(Clause::Compare {
            field,
            op: CompareOp::Eq,
            value: id.into(),
        })
    }

    /// `id = record.id` for a record of this table.
    ///
    /// # Errors
    ///
    /// Fails when the table has no id field.
    pub fn id_eq_record(&mut self, record: &Record) -> Result<&mut Self> {
        let id = self.table.extract_id(record);
        self.id_eq(id)
    }

    /// Raw SQL fragment. Each argument needs a column of this table or an explicit SQL type.
    ///
    /// # Errors
    ///
    /// Fails for arguments with neither a column nor a type, and for unknown columns.
    pub fn raw(&mut self, statement: &str, args: Vec<SelectArg>) -> Result<&mut Self> {
        for arg in &args {
            match arg.column_name() {
                Some(column) => {
                    let field = self.table.field_by_column(&column)?;
                    arg.set_meta_info(&column, Some(field))?;
                }
                None if arg.has_explicit_type() => {}
                None => {
                    return Err(builder_err!(
                        "Either the column name or SqlType must be set on each argument"
                    ));
                }
            }
        }
        self.add_clause(Clause::Raw {
            statement: statement.to_string(),
            args,
        })
    }

    /// Combines the previous clause with the next one using AND.
    ///
    /// # Errors
    ///
    /// Fails when no clause precedes it or another operation is still waiting.
    pub fn and(&mut self) -> Result<&mut Self> {
        self.combine_next(Combine::And)
    }

    /// Combines the previous clause with the next one using OR.
    ///
    /// # Errors
    ///
    /// Fails when no clause precedes it or another operation is still waiting.
    pub fn or(&mut self) -> Result<&mut Self> {
        self.combine_next(Combine::Or)
    }

    /// Combines the last `count` clauses using AND.
    ///
    /// # Errors
    ///
    /// Fails for a zero count or too few clauses on the stack.
    pub fn and_n(&mut self, count: usize) -> Result<&mut Self> {
        self.combine_last(Combine::And, count)
    }

    /// Combines the last `count` clauses using OR.
    ///
    /// # Errors
    ///
    /// Fails for a zero count or too few clauses on the stack.
    pub fn or_n(&mut self, count: usize) -> Result<&mut Self> {
        self.combine_last(Combine::Or, count)
    }

    /// Negates the next clause.
    ///
    /// # Errors
    ///
    /// Fails when a previous NOT is still waiting.
    pub fn not(&mut self) -> Result<&mut Self> {
        self.add_clause(Clause::Not(None))?;
        self.pending = Some("NOT".to_string());
        Ok(self)
    }

    /// Negates the previous clause.
    ///
    /// # Errors
    ///
    /// Fails when no clause precedes it or that clause cannot be negated.
    pub fn not_previous(&mut self) -> Result<&mut Self> {
        let previous = self.pop("NOT")?;
        let mut not = Clause::Not(None);
        not.fill_hole(previous)?;
        self.add_clause(not)
    }

    /// Removes every clause.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.pending = None;
    }

    /// Number of top-level clauses on the stack.
    #[must_use]
    pub fn clause_count(&self) -> usize {
        self.stack.len()
    }

    /// Renders the clause on its own, without a `WHERE` keyword.
    ///
    /// # Errors
    ///
    /// Fails when the clause is incomplete.
    pub fn statement(&self, dialect: &dyn DatabaseType) -> Result<String> {
        let mut sb = String::new();
        let mut args = Vec::new();
        self.append_sql(dialect, None, &mut sb, &mut args)?;
        Ok(sb)
    }

    pub(crate) fn append_sql(
        &self, dialect: &dyn DatabaseType, table_name: Option<&str>, sb: &mut String,
        args: &mut Vec<SelectArg>,
    ) -> Result<()> {
        match self.stack.as_slice() {
            [] => Err(builder_err!("No where clauses defined.  Did you miss a where operation?")),
            [clause] => {
                if self.pending.is_some() {
                    return Err(builder_err!(
                        "The SQL statement has not been finished since there are previous operations still waiting for clauses."
                    ));
                }
                clause.append_sql(dialect, table_name, sb, args)
            }
            _ => Err(builder_err!(
                "Both the \"left-hand\" and \"right-hand\" clauses have been defined.  Did you miss an AND or OR?"
            )),
        }
    }

    fn compare(&mut self, column: &str, op: CompareOp, value: Operand) -> Result<&mut Self> {
        let field = self.comparable(column)?;
        self.add_clause(Clause::Compare { field, op, value })
    }

    fn in_values(&mut self, column: &str, values: Vec<Operand>, negated: bool) -> Result<&mut Self> {
        let field = self.comparable(column)?;
        self.add_clause(Clause::In { field, values, negated })
    }

    fn in_query(&mut self, column: &str, mut query: SelectBuilder, negated: bool) -> Result<&mut Self> {
        match query.select_column_count() {
            1 => {}
            0 => {
                return Err(builder_err!(
                    "Inner query must have only 1 select column specified instead of *"
                ));
            }
            count => {
                return Err(builder_err!(
                    "Inner query must have only 1 select column specified instead of {count}: {}",
                    query.select_columns_description()
                ));
            }
        }
        query.enable_inner_query();
        let field = self.comparable(column)?;
        self.add_clause(Clause::InSubQuery {
            field,
            query: Box::new(query),
            negated,
        })
    }

    fn comparable(&self, column: &str) -> Result<Arc<FieldDescriptor>> {
        let field = self.table.field_by_column(column)?;
        if !field.is_comparable() {
            let kind = field.persister().map_or("null", |p| p.name());
            return Err(builder_err!(
                "Field '{column}' is of data type {kind} which can not be compared"
            ));
        }
        Ok(Arc::clone(field))
    }

    fn combine_next(&mut self, op: Combine) -> Result<&mut Self> {
        let label = op_label(op);
        self.ensure_not_pending(label)?;
        let first = self.pop(label)?;
        self.stack.push(Clause::Many {
            op,
            clauses: vec![first],
            open: true,
        });
        self.pending = Some(label.to_string());
        Ok(self)
    }

    fn combine_last(&mut self, op: Combine, count: usize) -> Result<&mut Self> {
        let label = op_label(op);
        if count == 0 {
            return Err(builder_err!(
                "Must have at least one clause in {}(numClauses)",
                label.to_ascii_lowercase()
            ));
        }
        let mut clauses = Vec::with_capacity(count);
        for _ in 0..count {
            clauses.push(self.pop(label)?);
        }
        clauses.reverse();
        self.add_clause(Clause::Many {
            op,
            clauses,
            open: false,
        })
    }

    fn ensure_not_pending(&self, adding: &str) -> Result<()> {
        match &self.pending {
            Some(waiting) => Err(builder_err!(
                "{waiting} is already waiting for a future clause, can't add: {adding}"
            )),
            None => Ok(()),
        }
    }

    fn add_clause(&mut self, clause: Clause) -> Result<&mut Self> {
        if self.pending.is_none() {
            self.stack.push(clause);
            return Ok(self);
        }
        let Some(top) = self.stack.last_mut().filter(|top| top.has_hole()) else {
            return Err(builder_err!("no clause is waiting for {}", clause.describe()));
        };
        top.fill_hole(clause)?;
        self.pending = None;
        Ok(self)
    }

    fn pop(&mut self, label: &str) -> Result<Clause> {
        self.stack.pop().ok_or_else(|| {
            builder_err!("Expecting there to be a clause already defined for '{label}' operation")
        })
    }
}

const fn op_label(op: Combine) -> &'static str {
    match op {
        Combine::And => "AND",
        Combine::Or => "OR",
    }
}

impl fmt::Debug for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Where")
            .field("table", &self.table.name())
            .field("stack", &self.stack)
            .field("pending", &self.pending)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, TableConfig};
    use crate::dialect::SqliteDialect;
    use crate::persister::SqlType;
    use crate::table::Schema;
    use crate::value::NativeType;

    fn table() -> Arc<TableDescriptor> {
        let schema = Schema::builder()
            .table(
                TableConfig::new("account")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::of("name", NativeType::String))
                    .field(FieldConfig::of("age", NativeType::Int))
                    .field(FieldConfig::of("blob", NativeType::Json)),
            )
            .build()
            .unwrap();
        Arc::clone(schema.table("account").unwrap())
    }

    #[test]
    fn chained_and() {
        let mut w = Where::new(&table());
        w.eq("name", "foo").unwrap().and().unwrap().gt("age", 3).unwrap();
        assert_eq!(w.statement(&SqliteDialect).unwrap(), "(`name` = 'foo' AND `age` > 3 ) ");
    }

    #[test]
    fn counted_and_matches_chained() {
        let mut chained = Where::new(&table());
        chained.eq("name", "foo").unwrap().and().unwrap().gt("age", 3).unwrap();
        let mut counted = Where::new(&table());
        counted.eq("name", "foo").unwrap().gt("age", 3).unwrap().and_n(2).unwrap();
        assert_eq!(
            chained.statement(&SqliteDialect).unwrap(),
            counted.statement(&SqliteDialect).unwrap()
        );
    }

    #[test]
    fn not_forms() {
        let mut w = Where::new(&table());
        w.not().unwrap().eq("age", 1).unwrap();
        assert_eq!(w.statement(&SqliteDialect).unwrap(), "(NOT `age` = 1 ) ");

        let mut w = Where::new(&table());
        w.is_null("name").unwrap().not_previous().unwrap();
        assert_eq!(w.statement(&SqliteDialect).unwrap(), "(NOT `name` IS NULL ) ");

        let mut w = Where::new(&table());
        w.eq("age", 1).unwrap().and().unwrap().not().unwrap().eq("name", "x").unwrap();
        assert_eq!(w.statement(&SqliteDialect).unwrap(), "(`age` = 1 AND (NOT `name` = 'x' ) ) ");
    }

    #[test]
    fn finalize_errors() {
        let w = Where::new(&table());
        let err = w.statement(&SqliteDialect).unwrap_err();
        assert!(err.to_string().contains("No where clauses defined"));

        let mut w = Where::new(&table());
        w.eq("age", 1).unwrap().eq("age", 2).unwrap();
        let err = w.statement(&SqliteDialect).unwrap_err();
        assert!(err.to_string().contains("Did you miss an AND or OR?"));

        let mut w = Where::new(&table());
        w.eq("age", 1).unwrap().and().unwrap();
        let err = w.statement(&SqliteDialect).unwrap_err();
        assert!(err.to_string().contains("has not been finished"));
    }

    #[test]
    fn operation_errors() {
        let mut w = Where::new(&table());
        let err = w.and().unwrap_err();
        assert!(err.to_string().contains("Expecting there to be a clause already defined for 'AND' operation"));

        let mut w = Where::new(&table());
        w.eq("age", 1).unwrap().and().unwrap();
        let err = w.or().unwrap_err();
        assert!(err.to_string().contains("AND is already waiting for a future clause, can't add: OR"));

        let mut w = Where::new(&table());
        let err = w.and_n(0).unwrap_err();
        assert!(err.to_string().contains("Must have at least one clause in and(numClauses)"));

        let err = w.eq("blob", "x").unwrap_err();
        assert!(err.to_string().contains("Field 'blob' is of data type SerializablePersister which can not be compared"));

        let err = w.raw("age > ?", vec![SelectArg::with_value(1)]).unwrap_err();
        assert!(err.to_string().contains("Either the column name or SqlType must be set"));
    }

    #[test]
    fn raw_and_reset() {
        let mut w = Where::new(&table());
        w.raw("`age` > ?", vec![SelectArg::for_column("age", 1)])
            .unwrap()
            .raw("`age` < ?", vec![SelectArg::typed(SqlType::Integer, 9)])
            .unwrap()
            .or_n(2)
            .unwrap();
        assert_eq!(w.clause_count(), 1);
        assert_eq!(w.statement(&SqliteDialect).unwrap(), "(`age` > ? OR `age` < ? ) ");

        w.reset();
        assert_eq!(w.clause_count(), 0);
        w.id_eq(5_i64).unwrap();
        assert_eq!(w.statement(&SqliteDialect).unwrap(), "`id` = 5 ");
    }
}
