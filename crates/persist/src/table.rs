//! Table descriptors and the schema that links them.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::config::TableConfig;
use crate::error::{Error, Result};
use crate::field::FieldDescriptor;
use crate::persister::PersisterRegistry;
use crate::value::Record;
use crate::config_err;

/// Ordered field descriptors of one table plus its id field.
pub struct TableDescriptor {
    name: String,
    fields: Vec<Arc<FieldDescriptor>>,
    id_index: Option<usize>,
    column_index: OnceLock<HashMap<String, usize>>,
}

impl TableDescriptor {
    fn new(name: String, fields: Vec<FieldDescriptor>) -> Result<Self> {
        if fields.is_empty() {
            return Err(config_err!("No fields have a column configured for table '{name}'"));
        }
        let mut id_index = None;
        for (index, field) in fields.iter().enumerate() {
            if !field.is_id() {
                continue;
            }
            if let Some(existing) = id_index {
                let existing: &FieldDescriptor = &fields[existing];
                return Err(config_err!(
                    "More than 1 idField configured for table '{name}' ({} and {})",
                    existing.name(),
                    field.name()
                ));
            }
            id_index = Some(index);
        }
        Ok(Self {
            name,
            fields: fields.into_iter().map(Arc::new).collect(),
            id_index,
            column_index: OnceLock::new(),
        })
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in configuration order.
    #[must_use]
    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    /// Identity field, when the table has one.
    #[must_use]
    pub fn id_field(&self) -> Option<&Arc<FieldDescriptor>> {
        self.id_index.map(|index| &self.fields[index])
    }

    /// Looks up a field by column name, falling back to a case-insensitive match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no field has the column.
    pub fn field_by_column(&self, column: &str) -> Result<&Arc<FieldDescriptor>> {
        let index = self.column_index.get_or_init(|| {
            self.fields.iter().enumerate().map(|(i, f)| (f.column_name().to_string(), i)).collect()
        });
        if let Some(i) = index.get(column) {
            return Ok(&self.fields[*i]);
        }
        self.fields.iter().find(|f| f.column_name().eq_ignore_ascii_case(column)).ok_or_else(|| {
            Error::NotFound(format!("Unknown column name '{column}' in table {}", self.name))
        })
    }

    /// Looks up a field by field name.
    #[must_use]
    pub fn field_by_name(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Whether any field is a foreign collection.
    #[must_use]
    pub fn has_foreign_collections(&self) -> bool {
        self.fields.iter().any(|f| f.is_foreign_collection())
    }

    /// Creates an empty record for this table.
    #[must_use]
    pub fn new_record(&self) -> Record {
        Record::new(&self.name)
    }

    /// Returns the id value held by a record, `Null` when unset or when the table has no id.
    #[must_use]
    pub fn extract_id(&self, record: &Record) -> crate::Value {
        self.id_field().map_or(crate::Value::Null, |id| record.get(id.name()).clone())
    }
}

impl fmt::Debug for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDescriptor")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("id", &self.id_field().map(|f| f.name()))
            .finish_non_exhaustive()
    }
}

/// Immutable set of linked table descriptors.
#[derive(Debug)]
pub struct Schema {
    tables: HashMap<String, Arc<TableDescriptor>>,
    registry: Arc<PersisterRegistry>,
}

impl Schema {
    /// Starts a schema with the built-in persisters.
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Looks up a table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown table.
    pub fn table(&self, name: &str) -> Result<&Arc<TableDescriptor>> {
        self.tables.get(name).ok_or_else(|| Error::NotFound(format!("table '{name}' is not configured")))
    }

    /// Iterates over the configured tables.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDescriptor>> {
        self.tables.values()
    }

    /// Persister registry the schema was built with.
    #[must_use]
    pub const fn registry(&self) -> &Arc<PersisterRegistry> {
        &self.registry
    }
}

/// Builds a [`Schema`] in two passes: descriptors per table, then foreign links across tables.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    tables: Vec<TableConfig>,
    registry: Option<Arc<PersisterRegistry>>,
}

impl SchemaBuilder {
    /// Uses the given persister registry instead of a fresh one.
    #[must_use]
    pub fn registry(mut self, registry: Arc<PersisterRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Adds a table.
    #[must_use]
    pub fn table(mut self, table: TableConfig) -> Self {
        self.tables.push(table);
        self
    }

    /// Validates and links every table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for invalid fields, duplicate ids or tables, and foreign
    /// references that cannot be resolved.
    pub fn build(self) -> Result<Schema> {
        let registry = self.registry.unwrap_or_default();

        let mut drafts: Vec<(String, Vec<FieldDescriptor>)> = Vec::with_capacity(self.tables.len());
        for table in self.tables {
            if drafts.iter().any(|(name, _)| *name == table.name) {
                return Err(config_err!("Table {} is configured more than once", table.name));
            }
            let fields = table
                .fields
                .into_iter()
                .map(|config| FieldDescriptor::new(&table.name, config, &registry))
                .collect::<Result<Vec<_>>>()?;
            drafts.push((table.name, fields));
        }

        let mut foreign_links = Vec::new();
        let mut collection_links = Vec::new();
        for (t, (table_name, fields)) in drafts.iter().enumerate() {
            for (f, field) in fields.iter().enumerate() {
                if let Some(target) = &field.config().foreign_table {
                    let referenced = find_referenced(&drafts, field, target)?;
                    foreign_links.push((t, f, referenced));
                } else if let Some(collection) = field.foreign_collection() {
                    let back_ref = find_back_reference(&drafts, table_name, fields, field, &collection.table)?;
                    collection_links.push((t, f, back_ref));
                }
            }
        }

        // Targets are never foreign themselves, so reading them before linking is safe.
        let resolved: Vec<_> = foreign_links
            .into_iter()
            .map(|(t, f, (rt, rf))| {
                let target = &drafts[rt].1[rf];
                (t, f, target.persister().cloned(), target.as_foreign_ref())
            })
            .collect();
        for (t, f, persister, foreign_ref) in resolved {
            drafts[t].1[f].link_foreign(persister, foreign_ref);
        }
        for (t, f, back_ref) in collection_links {
            drafts[t].1[f].link_collection(&back_ref);
        }

        let mut tables = HashMap::with_capacity(drafts.len());
        for (name, fields) in drafts {
            tracing::debug!(table = %name, field_count = fields.len(), "table descriptor built");
            let descriptor = TableDescriptor::new(name.clone(), fields)?;
            tables.insert(name, Arc::new(descriptor));
        }
        Ok(Schema { tables, registry })
    }
}

fn find_table<'a>(
    drafts: &'a [(String, Vec<FieldDescriptor>)], name: &str,
) -> Option<(usize, &'a [FieldDescriptor])> {
    drafts.iter().enumerate().find(|(_, (n, _))| n == name).map(|(i, (_, f))| (i, f.as_slice()))
}

fn find_referenced(
    drafts: &[(String, Vec<FieldDescriptor>)], field: &FieldDescriptor, target: &str,
) -> Result<(usize, usize)> {
    let Some((t, fields)) = find_table(drafts, target) else {
        return Err(config_err!(
            "Foreign table '{target}' for field '{}' is not configured",
            field.name()
        ));
    };
    let position = match &field.config().foreign_column_name {
        Some(column) => fields.iter().position(|f| f.name() == column).ok_or_else(|| {
            config_err!(
                "Foreign field {} does not have field '{column}' in table {target}",
                field.name()
            )
        })?,
        None => fields.iter().position(FieldDescriptor::is_id).ok_or_else(|| {
            config_err!("Foreign field {} has no id field in table {target}", field.name())
        })?,
    };
    let referenced = &fields[position];
    if referenced.is_foreign() || referenced.is_foreign_collection() {
        return Err(config_err!(
            "Foreign field {} cannot reference '{}' which is itself foreign",
            field.name(),
            referenced.name()
        ));
    }
    Ok((t, position))
}

fn find_back_reference(
    drafts: &[(String, Vec<FieldDescriptor>)], parent_table: &str, parent_fields: &[FieldDescriptor],
    field: &FieldDescriptor, element_table: &str,
) -> Result<String> {
    if !parent_fields.iter().any(FieldDescriptor::is_id) {
        return Err(config_err!(
            "Foreign collection field '{}' requires an id field in table {parent_table}",
            field.name()
        ));
    }
    let Some((_, elements)) = find_table(drafts, element_table) else {
        return Err(config_err!(
            "Foreign collection table '{element_table}' for field '{}' is not configured",
            field.name()
        ));
    };
    let wanted = field.foreign_collection().and_then(|c| c.foreign_field_name.as_deref());
    if let Some(wanted) = wanted {
        let back = elements.iter().find(|f| f.name() == wanted).ok_or_else(|| {
            config_err!(
                "Foreign collection field '{}' references unknown field '{wanted}' in table {element_table}",
                field.name()
            )
        })?;
        if back.config().foreign_table.as_deref() != Some(parent_table) {
            return Err(config_err!(
                "Foreign collection field '{}' references field '{wanted}' that is not foreign to {parent_table}",
                field.name()
            ));
        }
        return Ok(wanted.to_string());
    }
    elements
        .iter()
        .find(|f| f.config().foreign_table.as_deref() == Some(parent_table))
        .map(|f| f.name().to_string())
        .ok_or_else(|| {
            config_err!(
                "Foreign collection table {element_table} for field '{}' does not contain a foreign field to {parent_table}",
                field.name()
            )
        })
}
