use std::marker::PhantomData;

use anyhow::{Result, anyhow, bail};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::executor::{Database, StatementExecutor};
use crate::value::{Record, Value};

/// Trait for types that can be extracted from a hydrated record.
///
/// Implemented for the standard types a [`Value`] can hold (`i32`, `String`, `NaiveDateTime`,
/// etc.) and for [`Record`] itself, which reads a foreign object.
pub trait FetchValue: Sized {
    /// Fetch a value from a record by field name.
    ///
    /// # Errors
    ///
    /// Returns an error if the field is missing or the value cannot be converted to the target type.
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self>;
}

/// Declares a typed entity with automatic `Entity` trait implementation.
///
/// Every field type must implement [`FetchValue`], `Clone` and `Into<Value>`.
///
/// # Examples
///
/// ```ignore
/// entity! {
///     table = "account",
///     #[derive(Debug, Clone)]
///     pub struct Account {
///         pub id: Option<i64>,
///         pub name: String,
///     }
/// }
/// ```
#[macro_export]
macro_rules! entity {
    (
        table = $table:literal,
        $(#[$meta:meta])*
        pub struct $struct_name:ident {
            $(
                $(#[$field_meta:meta])*
                pub $field_name:ident : $field_type:ty
            ),* $(,)?
        }
    ) => {
        #[allow(missing_docs)]
        $(#[$meta])*
        pub struct $struct_name {
            $(
                $(#[$field_meta])*
                pub $field_name : $field_type
            ),*
        }

        impl $crate::Entity for $struct_name {
            const TABLE: &'static str = $table;

            fn from_record(record: &$crate::Record) -> anyhow::Result<Self> {
                Ok(Self {
                    $(
                        $field_name: <$field_type as $crate::FetchValue>::fetch(record, stringify!($field_name))?,
                    )*
                })
            }

            fn to_record(&self) -> $crate::Record {
                $crate::Record::new($table)
                    $(.with(stringify!($field_name), self.$field_name.clone()))*
            }
        }
    };
}

/// Typed view of the rows of one table.
///
/// Typically implemented via the `entity!` macro rather than manually.
pub trait Entity: Sized {
    /// The database table name for this entity.
    const TABLE: &'static str;

    /// Construct an entity instance from a hydrated record.
    ///
    /// # Errors
    ///
    /// Returns an error if any required field is missing or cannot be converted to the expected type.
    fn from_record(record: &Record) -> Result<Self>;

    /// Record holding the entity's fields.
    fn to_record(&self) -> Record;
}

/// Typed access to the table of an [`Entity`].
pub struct Dao<E: Entity> {
    executor: StatementExecutor,
    entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Dao<E> {
    /// Typed access to `E::TABLE`.
    ///
    /// # Errors
    ///
    /// Returns an error when the schema has no table `E::TABLE`.
    pub fn new(db: &Database) -> crate::Result<Self> {
        Ok(Self {
            executor: db.executor(E::TABLE)?,
            entity: PhantomData,
        })
    }

    /// Untyped executor of the table.
    #[must_use]
    pub const fn executor(&self) -> &StatementExecutor {
        &self.executor
    }

    /// Entity with id `id`.
    ///
    /// # Errors
    ///
    /// Fails as [`StatementExecutor::query_for_id`] does, or when the row cannot be converted.
    pub fn query_for_id(&self, id: impl Into<Value>) -> crate::Result<Option<E>> {
        self.executor.query_for_id(id)?.as_ref().map(E::from_record).transpose().map_err(Into::into)
    }

    /// Every entity of the table.
    ///
    /// # Errors
    ///
    /// Fails as [`StatementExecutor::query_for_all`] does, or when a row cannot be converted.
    pub fn query_for_all(&self) -> crate::Result<Vec<E>> {
        let records = self.executor.query_for_all()?;
        Ok(records.iter().map(E::from_record).collect::<Result<Vec<_>>>()?)
    }

    /// Inserts `entity`, returning it as stored, with generated id and version.
    ///
    /// # Errors
    ///
    /// Fails as [`StatementExecutor::create`] does.
    pub fn create(&self, entity: &E) -> crate::Result<E> {
        let mut record = entity.to_record();
        self.executor.create(&mut record)?;
        Ok(E::from_record(&record)?)
    }

    /// Writes `entity` to its row, returning it with its new version.
    ///
    /// # Errors
    ///
    /// Fails as [`StatementExecutor::update`] does.
    pub fn update(&self, entity: &E) -> crate::Result<E> {
        let mut record = entity.to_record();
        self.executor.update(&mut record)?;
        Ok(E::from_record(&record)?)
    }

    /// Deletes the row of `entity`.
    ///
    /// # Errors
    ///
    /// Fails as [`StatementExecutor::delete`] does.
    pub fn delete(&self, entity: &E) -> crate::Result<u64> {
        self.executor.delete(&entity.to_record())
    }
}

impl Record {
    /// Typed value of `field`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to `T`.
    pub fn fetch<T: FetchValue>(&self, field: &str) -> Result<T> {
        T::fetch(self, field)
    }
}

// Inbound conversion
impl FetchValue for bool {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        as_bool(record_field(record, field)?)
    }
}

impl FetchValue for char {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Char(v) => Ok(*v),
            _ => bail!("expected char data type"),
        }
    }
}

impl FetchValue for i8 {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        Ok(Self::try_from(as_i64(record_field(record, field)?)?)?)
    }
}

impl FetchValue for i16 {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        Ok(Self::try_from(as_i64(record_field(record, field)?)?)?)
    }
}

impl FetchValue for i32 {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        Ok(Self::try_from(as_i64(record_field(record, field)?)?)?)
    }
}

impl FetchValue for i64 {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        as_i64(record_field(record, field)?)
    }
}

impl FetchValue for f32 {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Float(v) => Ok(*v),
            _ => bail!("expected float data type"),
        }
    }
}

impl FetchValue for f64 {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Float(v) => Ok(Self::from(*v)),
            Value::Double(v) => Ok(*v),
            _ => bail!("expected double data type"),
        }
    }
}

impl FetchValue for String {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Text(v) | Value::Enum(v) => Ok(v.clone()),
            _ => bail!("expected string data type"),
        }
    }
}

impl FetchValue for Vec<u8> {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Bytes(v) => Ok(v.clone()),
            _ => bail!("expected binary data type"),
        }
    }
}

impl FetchValue for Decimal {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Decimal(v) => Ok(*v),
            _ => bail!("expected decimal data type"),
        }
    }
}

impl FetchValue for Uuid {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Uuid(v) => Ok(*v),
            _ => bail!("expected uuid data type"),
        }
    }
}

impl FetchValue for NaiveDateTime {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::DateTime(v) => Ok(*v),
            _ => bail!("expected timestamp data type"),
        }
    }
}

impl FetchValue for serde_json::Value {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Json(v) => Ok(v.clone()),
            _ => bail!("expected json data type"),
        }
    }
}

impl FetchValue for Record {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field)? {
            Value::Object(v) => Ok((**v).clone()),
            _ => bail!("expected foreign object"),
        }
    }
}

impl<T: FetchValue> FetchValue for Option<T> {
    fn fetch(record: &Record, field: &str) -> anyhow::Result<Self> {
        match record_field(record, field) {
            Ok(value) if !value.is_null() => Ok(Some(T::fetch(record, field)?)),
            _ => Ok(None),
        }
    }
}

fn record_field<'a>(record: &'a Record, name: &str) -> Result<&'a Value> {
    if !record.contains(name) {
        return Err(anyhow!("no value for field '{name}' in {} record", record.table()));
    }
    Ok(record.get(name))
}

fn as_bool(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(v) => Ok(*v),
        _ => bail!("expected boolean data type"),
    }
}

fn as_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) => {
            value.as_i64().ok_or_else(|| anyhow!("expected integer data type"))
        }
        _ => bail!("expected integer data type"),
    }
}
