use std::sync::Arc;

use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::select::SelectBuilder;
use crate::statement::WhereOperation;
use crate::table::TableDescriptor;
use crate::builder_err;

/// Join types supported by the select builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
}

impl JoinKind {
    pub(crate) const fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
        }
    }
}

/// How the joined builder's WHERE is combined with the clauses before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinWhereOperation {
    /// `AND (...)`
    And,
    /// `OR (...)`
    Or,
}

impl From<JoinWhereOperation> for WhereOperation {
    fn from(operation: JoinWhereOperation) -> Self {
        match operation {
            JoinWhereOperation::And => Self::And,
            JoinWhereOperation::Or => Self::Or,
        }
    }
}

/// A joined builder together with the columns it is joined on.
#[derive(Debug, Clone)]
pub(crate) struct JoinInfo {
    pub(crate) kind: JoinKind,
    pub(crate) operation: JoinWhereOperation,
    pub(crate) query: SelectBuilder,
    pub(crate) local: Arc<FieldDescriptor>,
    pub(crate) remote: Arc<FieldDescriptor>,
}

/// Finds the join columns from the foreign links between two tables.
///
/// A foreign field of `local` referencing the id of `joined` wins over a foreign field of
/// `joined` referencing the id of `local`.
pub(crate) fn match_joined_fields(
    local: &TableDescriptor, joined: &TableDescriptor,
) -> Result<(Arc<FieldDescriptor>, Arc<FieldDescriptor>)> {
    if let Some(joined_id) = joined.id_field() {
        let forward = local.fields().iter().find(|f| references(f, joined_id));
        if let Some(field) = forward {
            return Ok((Arc::clone(field), Arc::clone(joined_id)));
        }
    }
    if let Some(local_id) = local.id_field() {
        let backward = joined.fields().iter().find(|f| references(f, local_id));
        if let Some(field) = backward {
            return Ok((Arc::clone(local_id), Arc::clone(field)));
        }
    }
    Err(builder_err!(
        "Could not find a foreign {} field in {} or vice versa",
        local.name(),
        joined.name()
    ))
}

/// Resolves explicitly named join columns.
pub(crate) fn match_joined_fields_by_name(
    local: &TableDescriptor, local_column: &str, joined: &TableDescriptor, joined_column: &str,
) -> Result<(Arc<FieldDescriptor>, Arc<FieldDescriptor>)> {
    let find = |table: &TableDescriptor, column: &str| {
        table.field_by_column(column).map(Arc::clone).map_err(|_| {
            builder_err!("Could not find field in {} that has column-name '{column}'", table.name())
        })
    };
    Ok((find(local, local_column)?, find(joined, joined_column)?))
}

fn references(field: &FieldDescriptor, target: &FieldDescriptor) -> bool {
    field.foreign_ref().is_some_and(|r| r.table == target.table_name() && r.field == target.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FieldConfig, TableConfig};
    use crate::table::Schema;
    use crate::value::NativeType;

    fn schema() -> Schema {
        Schema::builder()
            .table(
                TableConfig::new("account")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::of("name", NativeType::String)),
            )
            .table(
                TableConfig::new("order")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id())
                    .field(FieldConfig::new("account").foreign("account")),
            )
            .table(TableConfig::new("tag").field(FieldConfig::of("label", NativeType::String)))
            .build()
            .unwrap()
    }

    #[test]
    fn matches_in_both_directions() {
        let schema = schema();
        let account = schema.table("account").unwrap();
        let order = schema.table("order").unwrap();

        let (local, remote) = match_joined_fields(order, account).unwrap();
        assert_eq!((local.column_name(), remote.column_name()), ("account_id", "id"));

        let (local, remote) = match_joined_fields(account, order).unwrap();
        assert_eq!((local.column_name(), remote.column_name()), ("id", "account_id"));

        let err = match_joined_fields(account, schema.table("tag").unwrap()).unwrap_err();
        assert!(err.to_string().contains("Could not find a foreign account field in tag or vice versa"));
    }

    #[test]
    fn matches_by_name() {
        let schema = schema();
        let account = schema.table("account").unwrap();
        let order = schema.table("order").unwrap();
        let err = match_joined_fields_by_name(account, "name", order, "nope").unwrap_err();
        assert!(err.to_string().contains("Could not find field in order that has column-name 'nope'"));
    }
}
