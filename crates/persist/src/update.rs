use std::sync::Arc;

use crate::arg::SelectArg;
use crate::clause::{Clause, Operand};
use crate::dialect::DatabaseType;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::statement::{PreparedStmt, StatementType, WhereOperation};
use crate::table::TableDescriptor;
use crate::where_clause::Where;
use crate::builder_err;

/// Builder for constructing UPDATE statements.
#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    dialect: Arc<dyn DatabaseType>,
    table: Arc<TableDescriptor>,
    where_clause: Option<Where>,
    updates: Vec<Clause>,
}

impl UpdateBuilder {
    /// Creates an UPDATE builder for `table`.
    #[must_use]
    pub fn new(dialect: Arc<dyn DatabaseType>, table: Arc<TableDescriptor>) -> Self {
        Self {
            dialect,
            table,
            where_clause: None,
            updates: Vec::new(),
        }
    }

    /// Starts a new WHERE clause, replacing any previous one.
    pub fn r#where(&mut self) -> &mut Where {
        self.where_clause.insert(Where::new(&self.table))
    }

    /// Replaces the WHERE clause.
    pub fn set_where(&mut self, where_clause: Option<Where>) {
        self.where_clause = where_clause;
    }

    /// Sets a column to a value. A NULL value is bound as an argument.
    ///
    /// # Errors
    ///
    /// Fails for unknown columns and foreign collections.
    pub fn update_column_value(mut self, column: &str, value: impl Into<Operand>) -> Result<Self> {
        let field = self.updatable(column)?;
        self.updates.push(Clause::SetValue {
            field,
            value: value.into(),
        });
        Ok(self)
    }

    /// Sets a column to a SQL expression such as `` `count` + 1 ``.
    ///
    /// # Errors
    ///
    /// Fails for unknown columns and foreign collections.
    pub fn update_column_expression(mut self, column: &str, expression: impl Into<String>) -> Result<Self> {
        let field = self.updatable(column)?;
        self.updates.push(Clause::SetExpression {
            field,
            expression: expression.into(),
        });
        Ok(self)
    }

    /// Escapes a column name for use in an update expression.
    #[must_use]
    pub fn escape_column_name(&self, column: &str) -> String {
        self.dialect.escape_entity_name(column)
    }

    /// Escapes a string literal for use in an update expression.
    #[must_use]
    pub fn escape_value(&self, value: &str) -> String {
        self.dialect.escape_word(value)
    }

    /// Clears the SET list and the WHERE clause.
    pub fn reset(&mut self) {
        self.where_clause = None;
        self.updates.clear();
    }

    /// Builds the statement.
    ///
    /// # Errors
    ///
    /// Fails without SET columns, or when the WHERE clause is incomplete.
    pub fn prepare(&self) -> Result<PreparedStmt> {
        let mut sb = String::with_capacity(128);
        let mut args = Vec::new();
        self.append_statement_string(&mut sb, &mut args)?;

        tracing::debug!(
            table = self.table.name(),
            sql = %sb,
            arg_count = args.len(),
            "UpdateBuilder generated SQL"
        );

        PreparedStmt::new(Arc::clone(&self.table), sb, args, None, StatementType::Update)
    }

    /// SQL text only.
    ///
    /// # Errors
    ///
    /// Fails without SET columns, or when the WHERE clause is incomplete.
    pub fn prepare_statement_string(&self) -> Result<String> {
        let mut sb = String::with_capacity(128);
        self.append_statement_string(&mut sb, &mut Vec::new())?;
        Ok(sb)
    }

    fn updatable(&self, column: &str) -> Result<Arc<FieldDescriptor>> {
        let field = self.table.field_by_column(column)?;
        if field.is_foreign_collection() {
            return Err(builder_err!("Can't update foreign collection field: {column}"));
        }
        Ok(Arc::clone(field))
    }

    fn append_statement_string(&self, sb: &mut String, args: &mut Vec<SelectArg>) -> Result<()> {
        if self.updates.is_empty() {
            return Err(builder_err!("UPDATE statements must have at least one SET column"));
        }
        sb.push_str("UPDATE ");
        self.dialect.append_escaped_entity_name(sb, self.table.name());
        sb.push_str(" SET ");
        for (i, update) in self.updates.iter().enumerate() {
            if i > 0 {
                sb.push(',');
            }
            update.append_sql(&*self.dialect, None, sb, args)?;
        }
        if let Some(where_clause) = &self.where_clause {
            WhereOperation::First.append_before(sb);
            where_clause.append_sql(&*self.dialect, None, sb, args)?;
            WhereOperation::First.append_after(sb);
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
    use crate::value::{NativeType, Value};

    fn builder() -> UpdateBuilder {
        let schema = Schema::builder()
            .table(
                TableConfig::new("account")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::of("name", NativeType::String))
                    .field(FieldConfig::of("visits", NativeType::Int))
                    .field(FieldConfig::new("orders").foreign_collection(ForeignCollectionConfig::new("order"))),
            )
            .table(
                TableConfig::new("order")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::new("account").foreign("account")),
            )
            .build()
            .unwrap();
        UpdateBuilder::new(Arc::new(SqliteDialect), Arc::clone(schema.table("account").unwrap()))
    }

    #[test]
    fn set_values_and_expressions() {
        let ub = builder();
        let visits = ub.escape_column_name("visits");
        let mut ub = ub
            .update_column_value("name", Value::Null)
            .unwrap()
            .update_column_expression("visits", format!("{visits} + 1"))
            .unwrap();
        ub.r#where().id_eq(3_i64).unwrap();
        let prepared = ub.prepare().unwrap();
        assert_eq!(
            prepared.statement(),
            "UPDATE `account` SET `name` = ? ,`visits` = `visits` + 1 WHERE `id` = 3 "
        );
        assert_eq!(prepared.args().len(), 1);
        assert_eq!(prepared.bind_args().unwrap()[0].value, Value::Null);
        assert_eq!(ub.escape_value("o'neil"), "'o''neil'");
    }

    #[test]
    fn rejects_empty_and_collections() {
        let err = builder().prepare().unwrap_err();
        assert!(err.to_string().contains("UPDATE statements must have at least one SET column"));

        let err = builder().update_column_value("orders", 1_i64).unwrap_err();
        assert!(err.to_string().contains("Can't update foreign collection field: orders"));
    }
}
