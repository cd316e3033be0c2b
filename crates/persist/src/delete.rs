use std::sync::Arc;

use crate::arg::SelectArg;
use crate::dialect::DatabaseType;
use crate::error::Result;
use crate::statement::{PreparedStmt, StatementType, WhereOperation};
use crate::table::TableDescriptor;
use crate::where_clause::Where;

/// Builder for constructing DELETE statements.
#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    dialect: Arc<dyn DatabaseType>,
    table: Arc<TableDescriptor>,
    where_clause: Option<Where>,
}

impl DeleteBuilder {
    /// Creates a DELETE builder for `table`. Without a WHERE clause every row is deleted.
    #[must_use]
    pub fn new(dialect: Arc<dyn DatabaseType>, table: Arc<TableDescriptor>) -> Self {
        Self {
            dialect,
            table,
            where_clause: None,
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

    /// Clears the WHERE clause.
    pub fn reset(&mut self) {
        self.where_clause = None;
    }

    /// Builds the statement.
    ///
    /// # Errors
    ///
    /// Fails when the WHERE clause is incomplete.
    pub fn prepare(&self) -> Result<PreparedStmt> {
        let mut sb = String::with_capacity(64);
        let mut args = Vec::new();
        self.append_statement_string(&mut sb, &mut args)?;

        tracing::debug!(
            table = self.table.name(),
            sql = %sb,
            arg_count = args.len(),
            "DeleteBuilder generated SQL"
        );

        PreparedStmt::new(Arc::clone(&self.table), sb, args, None, StatementType::Delete)
    }

    fn append_statement_string(&self, sb: &mut String, args: &mut Vec<SelectArg>) -> Result<()> {
        sb.push_str("DELETE FROM ");
        self.dialect.append_escaped_entity_name(sb, self.table.name());
        sb.push(' ');
        if let Some(where_clause) = &self.where_clause {
            WhereOperation::First.append_before(sb);
            where_clause.append_sql(&*self.dialect, None, sb, args)?;
            WhereOperation::First.append_after(sb);
        }
        Ok(())
    }
}
