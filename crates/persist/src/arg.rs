//! Statement arguments bound after the SQL is built.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::builder_err;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::persister::SqlType;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArgKind {
    Select,
    Null,
}

#[derive(Default)]
struct ArgState {
    column: Option<String>,
    field: Option<Arc<FieldDescriptor>>,
    sql_type: Option<SqlType>,
    value: Option<Value>,
}

/// Placeholder for a `?` argument whose value may be set or reset after the statement is
/// built.
///
/// Clones share state, so a holder kept by the caller can rebind a prepared statement.
#[derive(Clone)]
pub struct SelectArg {
    kind: ArgKind,
    state: Arc<Mutex<ArgState>>,
}

impl Default for SelectArg {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectArg {
    /// Creates an unset argument.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kind: ArgKind::Select,
            state: Arc::new(Mutex::new(ArgState::default())),
        }
    }

    /// Creates an argument holding `value`.
    #[must_use]
    pub fn with_value(value: impl Into<Value>) -> Self {
        let arg = Self::new();
        arg.set_value(value);
        arg
    }

    /// Creates an argument bound with an explicit SQL type, for raw statements.
    #[must_use]
    pub fn typed(sql_type: SqlType, value: impl Into<Value>) -> Self {
        let arg = Self::with_value(value);
        arg.state.lock().sql_type = Some(sql_type);
        arg
    }

    /// Creates an argument tied to a column of the queried table, for raw statements.
    #[must_use]
    pub fn for_column(column: impl Into<String>, value: impl Into<Value>) -> Self {
        let arg = Self::with_value(value);
        arg.state.lock().column = Some(column.into());
        arg
    }

    /// Argument standing for an explicit NULL in an update.
    pub(crate) fn null() -> Self {
        Self {
            kind: ArgKind::Null,
            state: Arc::new(Mutex::new(ArgState::default())),
        }
    }

    /// Sets or replaces the value.
    pub fn set_value(&self, value: impl Into<Value>) {
        self.state.lock().value = Some(value.into());
    }

    /// Whether a value has been set.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.kind == ArgKind::Null || self.state.lock().value.is_some()
    }

    /// Column the argument is compared against, once known.
    #[must_use]
    pub fn column_name(&self) -> Option<String> {
        self.state.lock().column.clone()
    }

    /// Field the argument is compared against, once known.
    #[must_use]
    pub fn field(&self) -> Option<Arc<FieldDescriptor>> {
        self.state.lock().field.clone()
    }

    /// SQL type used when binding.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        if self.kind == ArgKind::Null {
            return SqlType::String;
        }
        let state = self.state.lock();
        state.sql_type.or_else(|| state.field.as_ref().map(|f| f.sql_type())).unwrap_or(SqlType::Unknown)
    }

    pub(crate) fn has_explicit_type(&self) -> bool {
        self.state.lock().sql_type.is_some()
    }

    /// Records the column and field the argument belongs to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderState`](crate::Error::BuilderState) when the argument is
    /// already bound to a different column.
    pub fn set_meta_info(&self, column: &str, field: Option<&Arc<FieldDescriptor>>) -> Result<()> {
        let mut state = self.state.lock();
        match &state.column {
            Some(existing) if existing != column => {
                return Err(builder_err!(
                    "Column name cannot be set twice from {existing} to {column}. Using a SelectArg twice in query with different columns?"
                ));
            }
            Some(_) => {}
            None => state.column = Some(column.to_string()),
        }
        if let Some(field) = field {
            state.field = Some(Arc::clone(field));
        }
        Ok(())
    }

    /// Value converted for the database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuilderState`](crate::Error::BuilderState) when no value was set, or a
    /// conversion error from the field's persister.
    pub fn sql_arg_value(&self) -> Result<Value> {
        if self.kind == ArgKind::Null {
            return Ok(Value::Null);
        }
        let state = self.state.lock();
        let Some(value) = &state.value else {
            return Err(builder_err!(
                "Column value has not been set for {}",
                state.column.as_deref().unwrap_or("unknown column")
            ));
        };
        match &state.field {
            Some(field) => field.to_sql_arg(value),
            None => Ok(value.clone()),
        }
    }
}

impl fmt::Debug for SelectArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SelectArg")
            .field("kind", &self.kind)
            .field("column", &state.column)
            .field("value", &state.value)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SelectArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == ArgKind::Null {
            return f.write_str("null-arg");
        }
        match &self.state.lock().value {
            Some(value) => write!(f, "{value}"),
            None => f.write_str("[unset]"),
        }
    }
}

/// Reference to a column used in place of a value, such as `a.x = b.y`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnArg {
    /// Optional table or alias qualifier.
    pub table: Option<String>,
    /// Column name.
    pub column: String,
}

impl ColumnArg {
    /// References a column of the queried table.
    #[must_use]
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            table: None,
            column: column.into(),
        }
    }

    /// References a column of a named table or alias.
    #[must_use]
    pub fn qualified(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            column: column.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebinding_shares_state() {
        let arg = SelectArg::new();
        let held = arg.clone();
        assert!(!arg.is_set());
        held.set_value(3_i64);
        assert!(arg.is_set());
        assert_eq!(arg.sql_arg_value().unwrap(), Value::Long(3));
    }

    #[test]
    fn column_cannot_change() {
        let arg = SelectArg::with_value("x");
        arg.set_meta_info("name", None).unwrap();
        arg.set_meta_info("name", None).unwrap();
        let err = arg.set_meta_info("email", None).unwrap_err();
        assert!(err.to_string().contains("Column name cannot be set twice from name to email"));
    }

    #[test]
    fn unset_value_errors() {
        let arg = SelectArg::new();
        arg.set_meta_info("name", None).unwrap();
        let err = arg.sql_arg_value().unwrap_err();
        assert!(err.to_string().contains("Column value has not been set for name"));
    }

    #[test]
    fn null_arg() {
        let arg = SelectArg::null();
        assert!(arg.is_set());
        assert_eq!(arg.sql_arg_value().unwrap(), Value::Null);
        assert_eq!(arg.sql_type(), SqlType::String);
    }
}
