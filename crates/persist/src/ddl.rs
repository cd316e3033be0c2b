//! Table creation and removal statements rendered from table descriptors.

use crate::dialect::DatabaseType;
use crate::error::Result;
use crate::field::FieldDescriptor;
use crate::table::TableDescriptor;

/// Statements creating `table`. Foreign collections have no column and are skipped.
///
/// # Errors
///
/// Returns [`Error::Config`](crate::Error::Config) or
/// [`Error::BuilderState`](crate::Error::BuilderState) when a column cannot be declared in
/// this dialect.
pub fn create_table_statements(
    dialect: &dyn DatabaseType, table: &TableDescriptor, if_not_exists: bool,
) -> Result<Vec<String>> {
    let mut columns = Vec::with_capacity(table.fields().len());
    let mut primary_keys = Vec::new();
    for field in table.fields().iter().filter(|f| !f.is_foreign_collection()) {
        columns.push(column_definition(dialect, field)?);
        let inline = field.is_generated_id() && !field.is_self_generated_id() && !dialect.is_generated_id_sql_at_end();
        if field.is_id() && !inline {
            primary_keys.push(dialect.escape_entity_name(field.column_name()));
        }
    }
    if !primary_keys.is_empty() {
        columns.push(format!("PRIMARY KEY ({})", primary_keys.join(",")));
    }

    let mut sb = String::with_capacity(64 + columns.iter().map(String::len).sum::<usize>());
    sb.push_str("CREATE TABLE ");
    if if_not_exists && dialect.is_create_if_not_exists_supported() {
        sb.push_str("IF NOT EXISTS ");
    }
    dialect.append_escaped_entity_name(&mut sb, table.name());
    sb.push_str(" (");
    sb.push_str(&columns.join(", "));
    sb.push_str(") ");
    tracing::debug!(table = table.name(), sql = %sb, "create table statement built");
    Ok(vec![sb])
}

/// Statements dropping `table`.
#[must_use]
pub fn drop_table_statements(dialect: &dyn DatabaseType, table: &TableDescriptor) -> Vec<String> {
    vec![format!("DROP TABLE {} ", dialect.escape_entity_name(table.name()))]
}

/// Statement deleting every row of `table`.
#[must_use]
pub fn clear_table_statement(dialect: &dyn DatabaseType, table: &TableDescriptor) -> String {
    format!("DELETE FROM {}", dialect.escape_entity_name(table.name()))
}

fn column_definition(dialect: &dyn DatabaseType, field: &FieldDescriptor) -> Result<String> {
    let mut sb = dialect.escape_entity_name(field.column_name());
    sb.push(' ');
    sb.push_str(dialect.column_type(field)?);

    if field.generated_id_sequence().is_some() && !field.is_self_generated_id() {
        dialect.configure_generated_id_sequence(&mut sb, field)?;
    } else if field.is_generated_id() && !field.is_self_generated_id() {
        dialect.configure_generated_id(&mut sb, field)?;
    }
    // defaults and NOT NULL clash with generated ids
    if !field.is_generated_id() {
        if let Some(default) = &field.config().default_value {
            sb.push_str(" DEFAULT ");
            if field.is_escaped_value() {
                dialect.append_escaped_word(&mut sb, default);
            } else {
                sb.push_str(default);
            }
        }
        if !field.can_be_null() {
            sb.push_str(" NOT NULL");
        }
    }
    Ok(sb)
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
                    .field(FieldConfig::of("name", NativeType::String).not_null().default_value("it's"))
                    .field(FieldConfig::of("visits", NativeType::Int).default_value("0"))
                    .field(FieldConfig::new("orders").foreign_collection(ForeignCollectionConfig::new("order"))),
            )
            .table(
                TableConfig::new("order")
                    .field(FieldConfig::of("id", NativeType::Uuid).generated_id())
                    .field(FieldConfig::of("amount", NativeType::Double))
                    .field(FieldConfig::new("account").foreign("account")),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn create_table() {
        let schema = schema();
        let account = schema.table("account").unwrap();
        assert_eq!(
            create_table_statements(&SqliteDialect, account, false).unwrap(),
            ["CREATE TABLE `account` (`id` INTEGER PRIMARY KEY AUTOINCREMENT, \
              `name` VARCHAR DEFAULT 'it''s' NOT NULL, `visits` INTEGER DEFAULT 0) "]
        );

        // self generated ids are declared as a plain primary key
        let order = schema.table("order").unwrap();
        assert_eq!(
            create_table_statements(&SqliteDialect, order, true).unwrap(),
            ["CREATE TABLE IF NOT EXISTS `order` (`id` VARCHAR, `amount` DOUBLE PRECISION, \
              `account_id` BIGINT, PRIMARY KEY (`id`)) "]
        );
    }

    #[test]
    fn drop_and_clear() {
        let schema = schema();
        let order = schema.table("order").unwrap();
        assert_eq!(drop_table_statements(&SqliteDialect, order), ["DROP TABLE `order` "]);
        assert_eq!(clear_table_statement(&SqliteDialect, order), "DELETE FROM `order`");
    }

    #[test]
    fn generated_ids_need_integers() {
        let schema = Schema::builder()
            .table(
                TableConfig::new("tag")
                    .field(FieldConfig::of("id", NativeType::String).generated_id_sequence("tag_seq"))
                    .field(FieldConfig::of("label", NativeType::String)),
            )
            .build();
        // strings are not generatable at all
        assert!(schema.is_err());

        let schema = Schema::builder()
            .table(
                TableConfig::new("tag")
                    .field(FieldConfig::of("id", NativeType::Long).generated_id_sequence("tag_seq"))
                    .field(FieldConfig::of("label", NativeType::String)),
            )
            .build()
            .unwrap();
        let err = create_table_statements(&SqliteDialect, schema.table("tag").unwrap(), false).unwrap_err();
        assert!(err.to_string().contains("GeneratedIdSequence is not supported by database sqlite"));
    }
}
