//! Resolved field and table configuration.
//!
//! Configuration is plain data produced by whatever inspects the application's types. The
//! schema builder validates it and turns it into descriptors.

use std::fmt;
use std::sync::Arc;

use crate::persister::{DataType, Persister};
use crate::value::NativeType;

/// Default depth for foreign auto-refresh chains.
pub const DEFAULT_MAX_FOREIGN_AUTO_REFRESH_LEVEL: u32 = 2;

/// Default depth for eager foreign collections.
pub const DEFAULT_MAX_EAGER_LEVEL: u32 = 1;

/// Configuration of one persisted field.
#[derive(Clone)]
pub struct FieldConfig {
    /// Field name, the key used in [`Record`](crate::Record).
    pub name: String,
    /// Column name; derived from the field name when unset.
    pub column_name: Option<String>,
    /// Native type used to look up the persister.
    pub native_type: Option<NativeType>,
    /// Explicit built-in persister.
    pub data_type: Option<DataType>,
    /// Explicit custom persister. Takes priority over `data_type`.
    pub persister: Option<Arc<dyn Persister>>,
    /// Default value, parsed by the persister.
    pub default_value: Option<String>,
    /// Whether the column accepts NULL.
    pub can_be_null: bool,
    /// Identity column supplied by the caller.
    pub id: bool,
    /// Identity column generated by the database or in-process.
    pub generated_id: bool,
    /// Identity column generated from a named sequence.
    pub generated_id_sequence: Option<String>,
    /// Allow inserting an explicit value into a generated id.
    pub allow_generated_id_insert: bool,
    /// Table referenced by a foreign field.
    pub foreign_table: Option<String>,
    /// Field of the foreign table that is referenced, instead of its id.
    pub foreign_column_name: Option<String>,
    /// Fetch the referenced row when this field is loaded.
    pub foreign_auto_refresh: bool,
    /// Depth bound for auto-refresh chains started at this field.
    pub max_foreign_auto_refresh_level: u32,
    /// One-to-many collection configuration.
    pub foreign_collection: Option<ForeignCollectionConfig>,
    /// Error when a NULL is read into this field.
    pub throw_if_null: bool,
    /// Persister specific format string.
    pub format: Option<String>,
    /// Known variant names for enum persisters, in ordinal order.
    pub enum_variants: Vec<String>,
    /// Variant used when a stored name is unknown.
    pub unknown_enum_name: Option<String>,
    /// Optimistic-locking version column.
    pub version: bool,
    /// Never written by inserts or updates.
    pub read_only: bool,
}

impl FieldConfig {
    /// Creates a configuration with defaults for the named field.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_name: None,
            native_type: None,
            data_type: None,
            persister: None,
            default_value: None,
            can_be_null: true,
            id: false,
            generated_id: false,
            generated_id_sequence: None,
            allow_generated_id_insert: false,
            foreign_table: None,
            foreign_column_name: None,
            foreign_auto_refresh: false,
            max_foreign_auto_refresh_level: DEFAULT_MAX_FOREIGN_AUTO_REFRESH_LEVEL,
            foreign_collection: None,
            throw_if_null: false,
            format: None,
            enum_variants: Vec::new(),
            unknown_enum_name: None,
            version: false,
            read_only: false,
        }
    }

    /// Shorthand for a field of the given native type.
    #[must_use]
    pub fn of(name: impl Into<String>, native_type: NativeType) -> Self {
        Self::new(name).native(native_type)
    }

    /// Sets the native type.
    #[must_use]
    pub const fn native(mut self, native_type: NativeType) -> Self {
        self.native_type = Some(native_type);
        self
    }

    /// Sets the column name.
    #[must_use]
    pub fn column_name(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    /// Selects a built-in persister.
    #[must_use]
    pub const fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    /// Uses a custom persister.
    #[must_use]
    pub fn persister(mut self, persister: Arc<dyn Persister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    /// Marks the column NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.can_be_null = false;
        self
    }

    /// Marks the field as the caller-supplied id.
    #[must_use]
    pub const fn id(mut self) -> Self {
        self.id = true;
        self
    }

    /// Marks the field as a generated id.
    #[must_use]
    pub const fn generated_id(mut self) -> Self {
        self.generated_id = true;
        self
    }

    /// Marks the field as an id generated from a sequence.
    #[must_use]
    pub fn generated_id_sequence(mut self, sequence: impl Into<String>) -> Self {
        self.generated_id_sequence = Some(sequence.into());
        self
    }

    /// Allows explicit values to be inserted into a generated id.
    #[must_use]
    pub const fn allow_generated_id_insert(mut self) -> Self {
        self.allow_generated_id_insert = true;
        self
    }

    /// Makes this a foreign reference to another table's id.
    #[must_use]
    pub fn foreign(mut self, table: impl Into<String>) -> Self {
        self.foreign_table = Some(table.into());
        self
    }

    /// References a named field of the foreign table instead of its id.
    #[must_use]
    pub fn foreign_column_name(mut self, field: impl Into<String>) -> Self {
        self.foreign_column_name = Some(field.into());
        self
    }

    /// Fetches the referenced row when this field is loaded.
    #[must_use]
    pub const fn foreign_auto_refresh(mut self) -> Self {
        self.foreign_auto_refresh = true;
        self
    }

    /// Sets the auto-refresh depth bound.
    #[must_use]
    pub const fn max_foreign_auto_refresh_level(mut self, level: u32) -> Self {
        self.max_foreign_auto_refresh_level = level;
        self
    }

    /// Makes this a one-to-many collection.
    #[must_use]
    pub fn foreign_collection(mut self, collection: ForeignCollectionConfig) -> Self {
        self.foreign_collection = Some(collection);
        self
    }

    /// Rejects NULL values read into this field.
    #[must_use]
    pub const fn throw_if_null(mut self) -> Self {
        self.throw_if_null = true;
        self
    }

    /// Sets the persister format string.
    #[must_use]
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Sets the known enum variants, in ordinal order.
    #[must_use]
    pub fn enum_variants<I, S>(mut self, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_variants = variants.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the variant used for unknown stored names.
    #[must_use]
    pub fn unknown_enum_name(mut self, name: impl Into<String>) -> Self {
        self.unknown_enum_name = Some(name.into());
        self
    }

    /// Marks the field as the version column.
    #[must_use]
    pub const fn version(mut self) -> Self {
        self.version = true;
        self
    }

    /// Excludes the field from inserts and updates.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Whether the field refers to a row of another table.
    #[must_use]
    pub const fn is_foreign(&self) -> bool {
        self.foreign_table.is_some()
    }
}

impl fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("name", &self.name)
            .field("column_name", &self.column_name)
            .field("native_type", &self.native_type)
            .field("data_type", &self.data_type)
            .field("persister", &self.persister.as_ref().map(|p| p.name()))
            .field("id", &self.id)
            .field("generated_id", &self.generated_id)
            .field("foreign_table", &self.foreign_table)
            .field("foreign_collection", &self.foreign_collection)
            .finish_non_exhaustive()
    }
}

/// One-to-many collection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignCollectionConfig {
    /// Element table.
    pub table: String,
    /// Load the elements with the parent.
    pub eager: bool,
    /// Depth bound for nested eager collections.
    pub max_eager_level: u32,
    /// Foreign field of the element table that refers back to the parent.
    pub foreign_field_name: Option<String>,
    /// Column the elements are ordered by.
    pub order_column: Option<String>,
    /// Order ascending.
    pub order_ascending: bool,
}

impl ForeignCollectionConfig {
    /// Creates a lazy collection of rows from `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            eager: false,
            max_eager_level: DEFAULT_MAX_EAGER_LEVEL,
            foreign_field_name: None,
            order_column: None,
            order_ascending: true,
        }
    }

    /// Loads the elements with the parent.
    #[must_use]
    pub const fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Sets the eager depth bound.
    #[must_use]
    pub const fn max_eager_level(mut self, level: u32) -> Self {
        self.max_eager_level = level;
        self
    }

    /// Names the back-reference field in the element table.
    #[must_use]
    pub fn foreign_field_name(mut self, field: impl Into<String>) -> Self {
        self.foreign_field_name = Some(field.into());
        self
    }

    /// Orders elements by a column.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order_column = Some(column.into());
        self.order_ascending = ascending;
        self
    }
}

/// Configuration of one table.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Table name.
    pub name: String,
    /// Fields in column order.
    pub fields: Vec<FieldConfig>,
}

impl TableConfig {
    /// Creates an empty table configuration.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field.
    #[must_use]
    pub fn field(mut self, field: FieldConfig) -> Self {
        self.fields.push(field);
        self
    }
}
