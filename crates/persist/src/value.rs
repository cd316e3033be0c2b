//! Dynamic values and records.
//!
//! A [`Record`] is the hydrated form of one row: field values keyed by field name plus any
//! foreign collections attached to it. [`Value`] covers both native values held by records and
//! SQL arguments produced by persisters.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::collection::ForeignCollection;

/// Format used when a timestamp is rendered as text.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// A native or SQL-argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL / absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Single character.
    Char(char),
    /// 8-bit integer.
    Byte(i8),
    /// 16-bit integer.
    Short(i16),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Arbitrary precision decimal.
    Decimal(Decimal),
    /// UUID.
    Uuid(Uuid),
    /// Timestamp without zone.
    DateTime(NaiveDateTime),
    /// Structured value stored in serialized form.
    Json(serde_json::Value),
    /// Name of an enum variant.
    Enum(String),
    /// A related record held by a foreign field.
    Object(Box<Record>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the related record when this is a foreign object.
    #[must_use]
    pub fn as_object(&self) -> Option<&Record> {
        match self {
            Self::Object(record) => Some(record),
            _ => None,
        }
    }

    /// Widens any integral value to `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Short name of the variant, used in conversion error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Char(_) => "char",
            Self::Byte(_) => "byte",
            Self::Short(_) => "short",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Decimal(_) => "decimal",
            Self::Uuid(_) => "uuid",
            Self::DateTime(_) => "timestamp",
            Self::Json(_) => "json",
            Self::Enum(_) => "enum",
            Self::Object(_) => "object",
        }
    }
}

/// Literal form used when a value is inlined into SQL text.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Char(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Text(v) | Self::Enum(v) => f.write_str(v),
            Self::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Uuid(v) => write!(f, "{v}"),
            Self::DateTime(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
            Self::Json(v) => write!(f, "{v}"),
            Self::Object(record) => write!(f, "<{} record>", record.table()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    char => Char,
    i8 => Byte,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    Decimal => Decimal,
    Uuid => Uuid,
    NaiveDateTime => DateTime,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Self::Object(Box::new(value))
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Native type tag used to look up a persister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeType {
    /// `bool`
    Bool,
    /// `char`
    Char,
    /// `i8`
    Byte,
    /// `i16`
    Short,
    /// `i32`
    Int,
    /// `i64`
    Long,
    /// `f32`
    Float,
    /// `f64`
    Double,
    /// `String`
    String,
    /// `Vec<u8>`
    Bytes,
    /// [`Decimal`]
    Decimal,
    /// [`Uuid`]
    Uuid,
    /// [`NaiveDateTime`]
    DateTime,
    /// Any serializable structure held as [`serde_json::Value`].
    Json,
    /// Enumerated type stored by variant name.
    Enum,
    /// Application-defined type, served only by registered persisters.
    Custom(&'static str),
}

/// The hydrated form of one row.
#[derive(Clone, Default)]
pub struct Record {
    table: String,
    values: BTreeMap<String, Value>,
    collections: BTreeMap<String, ForeignCollection>,
}

impl Record {
    /// Creates an empty record for the named table.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            values: BTreeMap::new(),
            collections: BTreeMap::new(),
        }
    }

    /// Sets a field value, consuming and returning the record.
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Name of the table this record belongs to.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the value of a field, or [`Value::Null`] when it was never set.
    #[must_use]
    pub fn get(&self, field: &str) -> &Value {
        self.values.get(field).unwrap_or(&Value::Null)
    }

    /// Returns `true` when the field holds a value.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.values.get(field).is_some_and(|value| !value.is_null())
    }

    /// Sets a field value.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        self.values.insert(field.to_string(), value.into());
    }

    /// Removes a field value, returning it.
    pub fn take(&mut self, field: &str) -> Value {
        self.values.remove(field).unwrap_or(Value::Null)
    }

    /// Returns the related record held by a foreign field.
    #[must_use]
    pub fn object(&self, field: &str) -> Option<&Record> {
        self.get(field).as_object()
    }

    /// Returns the foreign collection attached to a field.
    #[must_use]
    pub fn collection(&self, field: &str) -> Option<&ForeignCollection> {
        self.collections.get(field)
    }

    /// Attaches a foreign collection to a field.
    pub fn set_collection(&mut self, field: &str, collection: ForeignCollection) {
        self.collections.insert(field.to_string(), collection);
    }

    /// Iterates over the set field values in field-name order.
    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }
}

/// Records compare by table and field values. Attached collections are handles onto other
/// rows and take no part in equality.
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.values == other.values
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("table", &self.table)
            .field("values", &self.values)
            .field("collections", &self.collections.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accessors() {
        let mut account = Record::new("account").with("name", "foo").with("id", 7_i64);
        assert_eq!(account.get("name"), &Value::Text("foo".to_string()));
        assert_eq!(account.get("missing"), &Value::Null);
        assert!(account.contains("id"));

        account.set("name", Option::<String>::None);
        assert!(!account.contains("name"));
        assert_eq!(account.take("id"), Value::Long(7));
    }

    #[test]
    fn literal_display() {
        let ts = NaiveDateTime::parse_from_str("2024-01-15 10:30:45", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(Value::DateTime(ts).to_string(), "2024-01-15 10:30:45.000000");
        assert_eq!(Value::Long(-3).to_string(), "-3");
        assert_eq!(Value::Text("bar".to_string()).to_string(), "bar");
    }

    #[test]
    fn equality_ignores_collections() {
        let left = Record::new("account").with("id", 1_i64);
        let mut right = left.clone();
        right.set_collection("orders", ForeignCollection::empty("order"));
        assert_eq!(left, right);
    }
}
