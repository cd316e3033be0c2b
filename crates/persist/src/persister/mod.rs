//! Type persisters: converters between native values and SQL arguments.
//!
//! Every persisted field resolves to exactly one [`Persister`]. Built-in persisters are indexed
//! by [`NativeType`] in the [`PersisterRegistry`]; other built-ins are only reachable through an
//! explicit [`DataType`] on the field configuration.

mod builtin;
mod registry;

use std::fmt;
use std::sync::Arc;

pub use self::builtin::*;
pub use self::registry::PersisterRegistry;
use crate::config::FieldConfig;
use crate::connection::DatabaseResults;
use crate::error::Result;
use crate::value::{NativeType, Value};

/// Kind of SQL argument a persister produces and binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    /// Short text.
    String,
    /// Unbounded text.
    LongString,
    /// Timestamp.
    Date,
    /// Boolean.
    Boolean,
    /// Single character.
    Char,
    /// 8-bit integer.
    Byte,
    /// Byte array.
    ByteArray,
    /// 16-bit integer.
    Short,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Serialized structure.
    Serializable,
    /// Binary large object.
    Blob,
    /// Arbitrary precision number.
    BigDecimal,
    /// Native UUID column.
    Uuid,
    /// Vendor specific.
    Other,
    /// Not known.
    Unknown,
}

/// Converter for one native type (or one storage strategy of it).
///
/// Persisters are stateless; any per-field information (format strings, enum variants) comes
/// from the [`FieldConfig`] passed to each call.
pub trait Persister: Send + Sync + fmt::Debug {
    /// Stable name, used in error messages.
    fn name(&self) -> &'static str;

    /// SQL argument kind produced by [`Persister::to_arg`].
    fn sql_type(&self) -> SqlType;

    /// Native types this persister serves when looked up through the registry.
    fn native_types(&self) -> &'static [NativeType] {
        &[]
    }

    /// Converts a non-null native value into its SQL argument.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the value is not of the expected kind.
    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value>;

    /// Reads the SQL argument at `column` of the current result row. Returns
    /// [`Value::Null`] for SQL NULL.
    ///
    /// # Errors
    ///
    /// Returns an error when the column cannot be read as this persister's kind.
    fn from_result(
        &self, field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value>;

    /// Converts a non-null SQL argument back into its native value.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the argument cannot be represented natively.
    fn to_native(&self, _field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        Ok(arg)
    }

    /// Parses a configured default value into its native value.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the string cannot be parsed.
    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value>;

    /// Whether literal values are quoted when inlined into SQL.
    fn is_escaped_value(&self) -> bool {
        true
    }

    /// Whether the type may appear in a comparison.
    fn is_comparable(&self) -> bool {
        true
    }

    /// Whether the type may be used for an id field.
    fn is_appropriate_id(&self) -> bool {
        true
    }

    /// Whether values must always be bound through an argument holder rather than inlined.
    fn is_arg_holder_required(&self) -> bool {
        false
    }

    /// Whether the native value is a primitive that cannot itself be null.
    fn is_primitive(&self) -> bool {
        false
    }

    /// Whether the database may generate ids of this type.
    fn is_valid_generated_type(&self) -> bool {
        false
    }

    /// Whether ids of this type are generated in-process rather than by the database.
    fn is_self_generated_id(&self) -> bool {
        false
    }

    /// Generates a new id value for self-generated ids.
    fn generate_id(&self) -> Option<Value> {
        None
    }

    /// Whether the type may be used for a version field.
    fn is_valid_for_version(&self) -> bool {
        false
    }

    /// Returns the version value that follows `current` (`Null` when unset).
    fn next_version(&self, _current: &Value) -> Option<Value> {
        None
    }

    /// Whether the result column can only be read once.
    fn is_stream_type(&self) -> bool {
        false
    }
}

/// Built-in persister selector used on a field to override the native-type lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    /// Text.
    String,
    /// Unbounded text.
    LongString,
    /// Text stored as UTF-8 bytes.
    StringBytes,
    /// Boolean.
    Boolean,
    /// Boolean stored as a character from the field format (default `"10"`).
    BooleanChar,
    /// Boolean stored as 1/0.
    BooleanInteger,
    /// Character.
    Char,
    /// 8-bit integer.
    Byte,
    /// 16-bit integer.
    Short,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Byte array.
    ByteArray,
    /// Timestamp column.
    Date,
    /// Timestamp stored as epoch milliseconds.
    DateLong,
    /// Timestamp stored as epoch seconds.
    DateInteger,
    /// Timestamp stored as formatted text.
    DateString,
    /// UUID stored as text.
    Uuid,
    /// UUID stored in a native UUID column.
    NativeUuid,
    /// Decimal stored as text.
    DecimalString,
    /// Decimal stored as a numeric column.
    DecimalNumeric,
    /// Enum stored by variant name.
    EnumString,
    /// Enum stored by variant position.
    EnumInteger,
    /// Structure stored as serialized bytes.
    Serializable,
}

impl DataType {
    /// Returns the built-in persister for this data type.
    #[must_use]
    pub fn persister(self) -> Arc<dyn Persister> {
        match self {
            Self::String => Arc::new(StringPersister),
            Self::LongString => Arc::new(LongStringPersister),
            Self::StringBytes => Arc::new(StringBytesPersister),
            Self::Boolean => Arc::new(BooleanPersister),
            Self::BooleanChar => Arc::new(BooleanCharPersister),
            Self::BooleanInteger => Arc::new(BooleanIntegerPersister),
            Self::Char => Arc::new(CharPersister),
            Self::Byte => Arc::new(BytePersister),
            Self::Short => Arc::new(ShortPersister),
            Self::Integer => Arc::new(IntPersister),
            Self::Long => Arc::new(LongPersister),
            Self::Float => Arc::new(FloatPersister),
            Self::Double => Arc::new(DoublePersister),
            Self::ByteArray => Arc::new(ByteArrayPersister),
            Self::Date => Arc::new(DateTimePersister),
            Self::DateLong => Arc::new(DateLongPersister),
            Self::DateInteger => Arc::new(DateIntegerPersister),
            Self::DateString => Arc::new(DateStringPersister),
            Self::Uuid => Arc::new(UuidPersister),
            Self::NativeUuid => Arc::new(NativeUuidPersister),
            Self::DecimalString => Arc::new(DecimalStringPersister),
            Self::DecimalNumeric => Arc::new(DecimalNumericPersister),
            Self::EnumString => Arc::new(EnumStringPersister),
            Self::EnumInteger => Arc::new(EnumIntegerPersister),
            Self::Serializable => Arc::new(SerializablePersister),
        }
    }

    /// Every built-in data type.
    pub const ALL: [Self; 25] = [
        Self::String,
        Self::LongString,
        Self::StringBytes,
        Self::Boolean,
        Self::BooleanChar,
        Self::BooleanInteger,
        Self::Char,
        Self::Byte,
        Self::Short,
        Self::Integer,
        Self::Long,
        Self::Float,
        Self::Double,
        Self::ByteArray,
        Self::Date,
        Self::DateLong,
        Self::DateInteger,
        Self::DateString,
        Self::Uuid,
        Self::NativeUuid,
        Self::DecimalString,
        Self::DecimalNumeric,
        Self::EnumString,
        Self::EnumInteger,
        Self::Serializable,
    ];
}
