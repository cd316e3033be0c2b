//! Statement kinds and prepared statements shared by the builders.

use std::fmt;
use std::sync::Arc;

use crate::arg::SelectArg;
use crate::connection::BoundArg;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::table::TableDescriptor;
use crate::value::Value;
use crate::builder_err;

/// Kind of SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementType {
    /// Query mapped to records.
    Select,
    /// Query returning one number.
    SelectLong,
    /// Query with raw select expressions, returned as raw rows.
    SelectRaw,
    /// UPDATE
    Update,
    /// DELETE
    Delete,
    /// Arbitrary statement.
    Execute,
}

impl StatementType {
    /// Whether a builder may produce this kind.
    #[must_use]
    pub const fn is_ok_for_statement_builder(self) -> bool {
        !matches!(self, Self::Execute)
    }

    /// Whether the statement returns rows.
    #[must_use]
    pub const fn is_ok_for_query(self) -> bool {
        matches!(self, Self::Select | Self::SelectLong | Self::SelectRaw)
    }

    /// Whether the statement changes rows.
    #[must_use]
    pub const fn is_ok_for_update(self) -> bool {
        matches!(self, Self::Update | Self::Delete)
    }

    pub(crate) fn ensure_buildable(self) -> Result<()> {
        if self.is_ok_for_statement_builder() {
            Ok(())
        } else {
            Err(builder_err!("Building a statement from a {self:?} statement is not allowed"))
        }
    }
}

/// Position of a WHERE fragment relative to the fragments before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WhereOperation {
    First,
    And,
    Or,
}

impl WhereOperation {
    pub(crate) fn append_before(self, sb: &mut String) {
        sb.push_str(match self {
            Self::First => "WHERE ",
            Self::And => "AND (",
            Self::Or => "OR (",
        });
    }

    pub(crate) fn append_after(self, sb: &mut String) {
        if self != Self::First {
            sb.push_str(") ");
        }
    }
}

/// A built statement with its argument holders, ready to be run any number of times.
///
/// Argument holders are shared with the caller, so values may be changed between runs.
pub struct PreparedStmt {
    table: Arc<TableDescriptor>,
    statement: String,
    args: Vec<SelectArg>,
    result_fields: Option<Vec<Arc<FieldDescriptor>>>,
    statement_type: StatementType,
    max_rows: Option<u64>,
    cache_store: bool,
}

impl PreparedStmt {
    pub(crate) fn new(
        table: Arc<TableDescriptor>, statement: String, args: Vec<SelectArg>,
        result_fields: Option<Vec<Arc<FieldDescriptor>>>, statement_type: StatementType,
    ) -> Result<Self> {
        statement_type.ensure_buildable()?;
        Ok(Self {
            table,
            statement,
            args,
            result_fields,
            statement_type,
            max_rows: None,
            cache_store: false,
        })
    }

    pub(crate) const fn with_max_rows(mut self, max_rows: Option<u64>) -> Self {
        self.max_rows = max_rows;
        self
    }

    pub(crate) const fn with_cache_store(mut self, cache_store: bool) -> Self {
        self.cache_store = cache_store;
        self
    }

    /// SQL text.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Kind of statement.
    #[must_use]
    pub const fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Table the statement was built for.
    #[must_use]
    pub const fn table(&self) -> &Arc<TableDescriptor> {
        &self.table
    }

    /// Argument holders in placeholder order.
    #[must_use]
    pub fn args(&self) -> &[SelectArg] {
        &self.args
    }

    /// Field of each argument, where known.
    #[must_use]
    pub fn arg_fields(&self) -> Vec<Option<Arc<FieldDescriptor>>> {
        self.args.iter().map(SelectArg::field).collect()
    }

    /// Fields of the result columns, `None` for raw and counting selects.
    #[must_use]
    pub fn result_fields(&self) -> Option<&[Arc<FieldDescriptor>]> {
        self.result_fields.as_deref()
    }

    /// Row limit applied on the compiled statement when the dialect cannot render one.
    #[must_use]
    pub const fn max_rows(&self) -> Option<u64> {
        self.max_rows
    }

    /// Whether mapped rows may be stored in the object cache.
    #[must_use]
    pub const fn is_cache_store(&self) -> bool {
        self.cache_store
    }

    /// Replaces the value of the argument at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderState`](crate::Error::BuilderState) for an index outside the
    /// argument list.
    pub fn set_argument_holder_value(&self, index: usize, value: impl Into<Value>) -> Result<()> {
        let Some(arg) = self.args.get(index) else {
            return Err(builder_err!(
                "argument holder index {index} is not valid, only {} in statement",
                self.args.len()
            ));
        };
        arg.set_value(value);
        Ok(())
    }

    /// Converts every argument into the value bound on the connection.
    ///
    /// # Errors
    ///
    /// Fails for unset arguments and values the field's persister rejects.
    pub fn bind_args(&self) -> Result<Vec<BoundArg>> {
        self.args
            .iter()
            .map(|arg| {
                Ok(BoundArg {
                    value: arg.sql_arg_value()?,
                    sql_type: arg.sql_type(),
                })
            })
            .collect()
    }
}

impl fmt::Debug for PreparedStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedStmt")
            .field("table", &self.table.name())
            .field("statement", &self.statement)
            .field("statement_type", &self.statement_type)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}
