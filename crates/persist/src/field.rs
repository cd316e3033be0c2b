//! Field descriptors.

use std::fmt;
use std::sync::Arc;

use crate::config::{FieldConfig, ForeignCollectionConfig};
use crate::connection::DatabaseResults;
use crate::error::Result;
use crate::persister::{Persister, PersisterRegistry, SqlType};
use crate::value::{Record, Value};
use crate::{config_err, conversion_err};

/// Link from a foreign field to the field it references in another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignRef {
    /// Referenced table.
    pub table: String,
    /// Referenced field name.
    pub field: String,
    /// Referenced column name.
    pub column: String,
}

/// Resolved metadata for one persisted field.
pub struct FieldDescriptor {
    table_name: String,
    column_name: String,
    config: FieldConfig,
    persister: Option<Arc<dyn Persister>>,
    default_value: Option<Value>,
    foreign_ref: Option<ForeignRef>,
    back_reference: Option<String>,
}

impl FieldDescriptor {
    /// Validates a field configuration and resolves its persister.
    ///
    /// Foreign fields take their persister from the referenced field once the schema links
    /// them; collection fields never have one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for inconsistent flags or a missing
    /// persister.
    pub fn new(table_name: &str, config: FieldConfig, registry: &PersisterRegistry) -> Result<Self> {
        let name = &config.name;
        let id_flags = [config.id, config.generated_id, config.generated_id_sequence.is_some()];
        if id_flags.iter().filter(|f| **f).count() > 1 {
            return Err(config_err!(
                "Must specify one of id, generatedId, and generatedIdSequence with {name}"
            ));
        }
        let is_generated = config.generated_id || config.generated_id_sequence.is_some();
        let is_id_like = config.id || is_generated;
        if is_id_like && config.is_foreign() {
            return Err(config_err!("Id field {name} cannot also be a foreign object"));
        }
        if config.allow_generated_id_insert && !is_generated {
            return Err(config_err!(
                "Field {name} must be a generated-id if allowGeneratedIdInsert = true"
            ));
        }
        if config.foreign_auto_refresh && !config.is_foreign() {
            return Err(config_err!("Field {name} must have foreign = true if foreignAutoRefresh = true"));
        }
        if config.foreign_column_name.is_some() && !config.is_foreign() {
            return Err(config_err!("Field {name} must have foreign = true if foreignColumnName is set"));
        }
        if config.is_foreign() && config.foreign_collection.is_some() {
            return Err(config_err!("Field {name} cannot be both foreign and a foreign collection"));
        }
        if config.foreign_collection.is_some() && is_id_like {
            return Err(config_err!("Foreign collection field {name} cannot be an id"));
        }

        let column_name = config.column_name.clone().unwrap_or_else(|| {
            if config.is_foreign() {
                let target = config.foreign_column_name.as_deref().unwrap_or("id");
                format!("{name}_{target}")
            } else {
                name.clone()
            }
        });

        let mut descriptor = Self {
            table_name: table_name.to_string(),
            column_name,
            config,
            persister: None,
            default_value: None,
            foreign_ref: None,
            back_reference: None,
        };
        if descriptor.is_foreign() || descriptor.is_foreign_collection() {
            return Ok(descriptor);
        }

        let persister = descriptor.resolve_persister(registry)?;
        descriptor.check_persister(&*persister)?;
        if let Some(default) = &descriptor.config.default_value {
            descriptor.default_value = Some(persister.parse_default(&descriptor.config, default)?);
        }
        descriptor.persister = Some(persister);
        Ok(descriptor)
    }

    fn resolve_persister(&self, registry: &PersisterRegistry) -> Result<Arc<dyn Persister>> {
        if let Some(persister) = &self.config.persister {
            return Ok(Arc::clone(persister));
        }
        if let Some(data_type) = self.config.data_type {
            return Ok(data_type.persister());
        }
        let Some(native) = self.config.native_type else {
            return Err(config_err!(
                "Field '{}' in table '{}' has no native type or data type",
                self.config.name,
                self.table_name
            ));
        };
        registry.lookup(native).ok_or_else(|| {
            config_err!(
                "Field '{}' in table '{}' has no persister for type {native:?}",
                self.config.name,
                self.table_name
            )
        })
    }

    fn check_persister(&self, persister: &dyn Persister) -> Result<()> {
        let name = &self.config.name;
        let kind = persister.name();
        if self.config.version && !persister.is_valid_for_version() {
            return Err(config_err!("Field {name} is not a valid type to be a version field"));
        }
        if self.is_generated_id() && !persister.is_valid_generated_type() {
            return Err(config_err!("Generated-id field '{name}' can't be type {kind}"));
        }
        if self.config.throw_if_null && !persister.is_primitive() {
            return Err(config_err!("Field {name} must be a primitive if set with throwIfNull"));
        }
        if self.is_id() && !persister.is_appropriate_id() {
            return Err(config_err!(
                "Field '{name}' is of data type {kind} which cannot be the ID field"
            ));
        }
        if self.is_generated_id() && self.config.default_value.is_some() {
            return Err(config_err!(
                "Field '{name}' cannot be a generatedId and have a default value '{}'",
                self.config.default_value.as_deref().unwrap_or_default()
            ));
        }
        Ok(())
    }

    pub(crate) fn as_foreign_ref(&self) -> ForeignRef {
        ForeignRef {
            table: self.table_name.clone(),
            field: self.config.name.clone(),
            column: self.column_name.clone(),
        }
    }

    pub(crate) fn link_foreign(&mut self, persister: Option<Arc<dyn Persister>>, foreign_ref: ForeignRef) {
        self.persister = persister;
        self.foreign_ref = Some(foreign_ref);
    }

    pub(crate) fn link_collection(&mut self, back_reference: &str) {
        self.back_reference = Some(back_reference.to_string());
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Column name.
    #[must_use]
    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    /// Owning table.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &FieldConfig {
        &self.config
    }

    /// Persister, absent for foreign collections.
    #[must_use]
    pub fn persister(&self) -> Option<&Arc<dyn Persister>> {
        self.persister.as_ref()
    }

    fn converter(&self) -> Result<&dyn Persister> {
        self.persister.as_deref().ok_or_else(|| {
            conversion_err!("Field '{}' of table '{}' has no persister", self.name(), self.table_name)
        })
    }

    /// SQL argument kind, [`SqlType::Unknown`] for foreign collections.
    #[must_use]
    pub fn sql_type(&self) -> SqlType {
        self.persister.as_ref().map_or(SqlType::Unknown, |p| p.sql_type())
    }

    /// Parsed default value.
    #[must_use]
    pub const fn default_value(&self) -> Option<&Value> {
        self.default_value.as_ref()
    }

    /// Identity field of any kind.
    #[must_use]
    pub const fn is_id(&self) -> bool {
        self.config.id || self.is_generated_id()
    }

    /// Identity generated by the database or in-process.
    #[must_use]
    pub const fn is_generated_id(&self) -> bool {
        self.config.generated_id || self.config.generated_id_sequence.is_some()
    }

    /// Identity generated from a named sequence.
    #[must_use]
    pub fn generated_id_sequence(&self) -> Option<&str> {
        self.config.generated_id_sequence.as_deref()
    }

    /// Generated id whose values are produced in-process.
    #[must_use]
    pub fn is_self_generated_id(&self) -> bool {
        self.is_generated_id() && self.persister.as_ref().is_some_and(|p| p.is_self_generated_id())
    }

    /// Explicit values may be inserted into this generated id.
    #[must_use]
    pub const fn is_allow_generated_id_insert(&self) -> bool {
        self.config.allow_generated_id_insert
    }

    /// References a row of another table.
    #[must_use]
    pub const fn is_foreign(&self) -> bool {
        self.config.is_foreign()
    }

    /// One-to-many collection.
    #[must_use]
    pub const fn is_foreign_collection(&self) -> bool {
        self.config.foreign_collection.is_some()
    }

    /// Collection configuration.
    #[must_use]
    pub const fn foreign_collection(&self) -> Option<&ForeignCollectionConfig> {
        self.config.foreign_collection.as_ref()
    }

    /// Name of the element-table field referring back to the parent.
    #[must_use]
    pub fn back_reference(&self) -> Option<&str> {
        self.back_reference.as_deref()
    }

    /// Referenced table and field.
    #[must_use]
    pub const fn foreign_ref(&self) -> Option<&ForeignRef> {
        self.foreign_ref.as_ref()
    }

    /// Fetches the referenced row on load.
    #[must_use]
    pub const fn is_foreign_auto_refresh(&self) -> bool {
        self.config.foreign_auto_refresh
    }

    /// Auto-refresh depth bound.
    #[must_use]
    pub const fn max_foreign_auto_refresh_level(&self) -> u32 {
        self.config.max_foreign_auto_refresh_level
    }

    /// Version column.
    #[must_use]
    pub const fn is_version(&self) -> bool {
        self.config.version
    }

    /// Excluded from writes.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Whether the column accepts NULL.
    #[must_use]
    pub const fn can_be_null(&self) -> bool {
        self.config.can_be_null
    }

    /// Literal values are quoted when inlined.
    #[must_use]
    pub fn is_escaped_value(&self) -> bool {
        self.persister.as_ref().is_some_and(|p| p.is_escaped_value())
    }

    /// May appear in a comparison.
    #[must_use]
    pub fn is_comparable(&self) -> bool {
        !self.is_foreign_collection() && self.persister.as_ref().is_some_and(|p| p.is_comparable())
    }

    /// Values must be bound through an argument holder.
    #[must_use]
    pub fn is_arg_holder_required(&self) -> bool {
        self.persister.as_ref().is_some_and(|p| p.is_arg_holder_required())
    }

    /// Returns the id carried by a foreign value: the referenced field of a record, or the
    /// value itself.
    #[must_use]
    pub fn foreign_id_of(&self, value: &Value) -> Value {
        match (value, &self.foreign_ref) {
            (Value::Object(record), Some(foreign)) => record.get(&foreign.field).clone(),
            _ => value.clone(),
        }
    }

    /// Converts a native value into its SQL argument. Foreign records are replaced by their id.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the persister rejects the value.
    pub fn to_sql_arg(&self, value: &Value) -> Result<Value> {
        let value = if self.is_foreign() { self.foreign_id_of(value) } else { value.clone() };
        if value.is_null() {
            return Ok(Value::Null);
        }
        self.converter()?.to_arg(&self.config, &value)
    }

    /// Reads this field from a record and converts it into its SQL argument.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the persister rejects the value.
    pub fn extract_sql_arg(&self, record: &Record) -> Result<Value> {
        self.to_sql_arg(record.get(self.name()))
    }

    /// Reads the column at `column` of the current row and converts it to its native value.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when a NULL reaches a `throw_if_null` field or the persister
    /// rejects the value.
    pub fn result_to_native(&self, results: &dyn DatabaseResults, column: usize) -> Result<Value> {
        let converter = self.converter()?;
        let arg = converter.from_result(&self.config, results, column)?;
        if arg.is_null() {
            if self.config.throw_if_null {
                return Err(conversion_err!(
                    "Results value for primitive field '{}' was an invalid null value",
                    self.name()
                ));
            }
            return Ok(Value::Null);
        }
        converter.to_native(&self.config, arg, column)
    }

    /// Converts a generated key reported by the driver into this field's native value.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the field is not an integral type or the key is out of
    /// range.
    pub fn convert_id_number(&self, key: i64) -> Result<Value> {
        let converted = match self.sql_type() {
            SqlType::Long => Some(Value::Long(key)),
            SqlType::Integer => i32::try_from(key).ok().map(Value::Int),
            SqlType::Short => i16::try_from(key).ok().map(Value::Short),
            SqlType::Byte => i8::try_from(key).ok().map(Value::Byte),
            _ => None,
        };
        converted.ok_or_else(|| {
            conversion_err!("Invalid type {:?} for generated id {} = {key}", self.sql_type(), self.name())
        })
    }

    /// Version value following `current`.
    #[must_use]
    pub fn next_version(&self, current: &Value) -> Option<Value> {
        self.persister.as_ref().and_then(|p| p.next_version(current))
    }

    /// Generates an in-process id.
    #[must_use]
    pub fn generate_id(&self) -> Option<Value> {
        self.persister.as_ref().and_then(|p| p.generate_id())
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("table", &self.table_name)
            .field("name", &self.config.name)
            .field("column", &self.column_name)
            .field("persister", &self.persister.as_ref().map(|p| p.name()))
            .field("foreign_ref", &self.foreign_ref)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table_name, self.config.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForeignCollectionConfig;
    use crate::persister::DataType;
    use crate::value::NativeType;

    fn build(config: FieldConfig) -> Result<FieldDescriptor> {
        FieldDescriptor::new("account", config, &PersisterRegistry::new())
    }

    #[test]
    fn rejects_conflicting_flags() {
        let err = build(FieldConfig::of("id", NativeType::Long).id().generated_id()).unwrap_err();
        assert!(err.to_string().contains("Must specify one of id, generatedId"));

        let err = build(FieldConfig::new("owner").foreign("user").id()).unwrap_err();
        assert!(err.to_string().contains("cannot also be a foreign object"));

        let err = build(FieldConfig::of("name", NativeType::String).foreign_auto_refresh()).unwrap_err();
        assert!(err.to_string().contains("must have foreign = true"));

        let err = build(
            FieldConfig::new("orders")
                .foreign("order")
                .foreign_collection(ForeignCollectionConfig::new("order")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be both foreign and a foreign collection"));
    }

    #[test]
    fn rejects_bad_persister_pairings() {
        let err = build(FieldConfig::of("id", NativeType::String).generated_id()).unwrap_err();
        assert!(err.to_string().contains("Generated-id field 'id' can't be type StringPersister"));

        let err = build(FieldConfig::of("id", NativeType::Long).generated_id().default_value("3"))
            .unwrap_err();
        assert!(err.to_string().contains("cannot be a generatedId and have a default value '3'"));

        let err = build(FieldConfig::of("name", NativeType::String).throw_if_null()).unwrap_err();
        assert!(err.to_string().contains("must be a primitive"));

        let err = build(FieldConfig::of("rev", NativeType::String).version()).unwrap_err();
        assert!(err.to_string().contains("not a valid type to be a version field"));

        let err = build(FieldConfig::of("id", NativeType::Bytes).id()).unwrap_err();
        assert!(err.to_string().contains("cannot be the ID field"));

        let err = build(FieldConfig::of("shout", NativeType::Custom("shout"))).unwrap_err();
        assert!(err.to_string().contains("has no persister"));
    }

    #[test]
    fn derived_column_names() {
        let owner = build(FieldConfig::new("owner").foreign("user")).unwrap();
        assert_eq!(owner.column_name(), "owner_id");

        let owner = build(FieldConfig::new("owner").foreign("user").foreign_column_name("email")).unwrap();
        assert_eq!(owner.column_name(), "owner_email");

        let name = build(FieldConfig::of("name", NativeType::String).column_name("user_name")).unwrap();
        assert_eq!(name.column_name(), "user_name");
    }

    #[test]
    fn parses_defaults_and_converts() {
        let active = build(
            FieldConfig::new("active").data_type(DataType::BooleanInteger).default_value("true"),
        )
        .unwrap();
        assert_eq!(active.default_value(), Some(&Value::Bool(true)));
        assert_eq!(active.to_sql_arg(&Value::Bool(true)).unwrap(), Value::Int(1));
        assert_eq!(active.to_sql_arg(&Value::Null).unwrap(), Value::Null);
        assert!(!active.is_escaped_value());
    }

    #[test]
    fn generated_key_conversion() {
        let id = build(FieldConfig::of("id", NativeType::Int).generated_id()).unwrap();
        assert_eq!(id.convert_id_number(42).unwrap(), Value::Int(42));
        assert!(id.convert_id_number(i64::MAX).is_err());
    }
}
