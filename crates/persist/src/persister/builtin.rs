//! Built-in persisters.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Persister, SqlType};
use crate::config::FieldConfig;
use crate::connection::DatabaseResults;
use crate::error::Result;
use crate::value::{NativeType, TIMESTAMP_FORMAT, Value};
use crate::conversion_err;

const DEFAULT_BOOLEAN_CHARS: &str = "10";

fn unexpected(persister: &dyn Persister, field: &FieldConfig, value: &Value) -> crate::Error {
    conversion_err!(
        "{} cannot convert {} value for field '{}'",
        persister.name(),
        value.kind(),
        field.name
    )
}

fn or_null<T: Into<Value>>(value: Option<T>) -> Value {
    value.map_or(Value::Null, Into::into)
}

fn parse_number<T: FromStr>(field: &FieldConfig, default: &str) -> Result<T> {
    default.trim().parse::<T>().map_err(|_parse| {
        conversion_err!("Problems with field '{}' parsing default number string '{default}'", field.name)
    })
}

fn parse_timestamp(field: &FieldConfig, text: &str) -> Result<NaiveDateTime> {
    let format = field.format.as_deref().unwrap_or(TIMESTAMP_FORMAT);
    NaiveDateTime::parse_from_str(text, format)
        .or_else(|_e| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .or_else(|_e| DateTime::parse_from_rfc3339(text).map(|dt| dt.naive_utc()))
        .map_err(|_e| {
            conversion_err!(
                "Problems with field '{}' parsing date-string '{text}' using '{format}'",
                field.name
            )
        })
}

fn now() -> Value {
    Value::DateTime(Utc::now().naive_utc())
}

fn bump(current: &Value) -> Option<Value> {
    match current {
        Value::Null => Some(Value::Long(1)),
        Value::Short(v) => Some(Value::Short(v.wrapping_add(1))),
        Value::Int(v) => Some(Value::Int(v.wrapping_add(1))),
        Value::Long(v) => Some(Value::Long(v.wrapping_add(1))),
        _ => None,
    }
}

/// Text.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringPersister;

impl Persister for StringPersister {
    fn name(&self) -> &'static str {
        "StringPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::String
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::String]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Text(_) => Ok(value.clone()),
            Value::Char(c) => Ok(Value::Text(c.to_string())),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_string(column)?))
    }

    fn parse_default(&self, _field: &FieldConfig, default: &str) -> Result<Value> {
        Ok(Value::Text(default.to_string()))
    }
}

/// Unbounded text. Not usable as an id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LongStringPersister;

impl Persister for LongStringPersister {
    fn name(&self) -> &'static str {
        "LongStringPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::LongString
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        StringPersister.to_arg(field, value)
    }

    fn from_result(
        &self, field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        StringPersister.from_result(field, results, column)
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        StringPersister.parse_default(field, default)
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }
}

/// Text stored as UTF-8 bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringBytesPersister;

impl Persister for StringBytesPersister {
    fn name(&self) -> &'static str {
        "StringBytesPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::ByteArray
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Text(text) => Ok(Value::Bytes(text.as_bytes().to_vec())),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_bytes(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        match arg {
            Value::Bytes(bytes) => String::from_utf8(bytes).map(Value::Text).map_err(|_utf8| {
                conversion_err!("field '{}' holds bytes that are not valid UTF-8", field.name)
            }),
            other => Err(unexpected(self, field, &other)),
        }
    }

    fn parse_default(&self, _field: &FieldConfig, default: &str) -> Result<Value> {
        Ok(Value::Text(default.to_string()))
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }

    fn is_arg_holder_required(&self) -> bool {
        true
    }
}

/// Boolean.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanPersister;

impl Persister for BooleanPersister {
    fn name(&self) -> &'static str {
        "BooleanPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Boolean
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Bool]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_boolean(column)?))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        match default.trim() {
            d if d.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            d if d.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            _ => Err(conversion_err!(
                "Problems with field '{}' parsing default boolean '{default}'",
                field.name
            )),
        }
    }

    fn is_escaped_value(&self) -> bool {
        false
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }

    fn is_primitive(&self) -> bool {
        true
    }
}

/// Boolean stored as one of two characters taken from the field format, true first.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanCharPersister;

impl BooleanCharPersister {
    fn chars(field: &FieldConfig) -> Result<(char, char)> {
        let format = field.format.as_deref().unwrap_or(DEFAULT_BOOLEAN_CHARS);
        let mut chars = format.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(t), Some(f), None) => Ok((t, f)),
            _ => Err(conversion_err!(
                "Invalid boolean format string '{format}' for field '{}'",
                field.name
            )),
        }
    }
}

impl Persister for BooleanCharPersister {
    fn name(&self) -> &'static str {
        "BooleanCharPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Char
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        let (t, f) = Self::chars(field)?;
        match value {
            Value::Bool(b) => Ok(Value::Char(if *b { t } else { f })),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_char(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        let (t, _) = Self::chars(field)?;
        match arg {
            Value::Char(c) => Ok(Value::Bool(c == t)),
            other => Err(unexpected(self, field, &other)),
        }
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        BooleanPersister.parse_default(field, default)
    }

    fn is_escaped_value(&self) -> bool {
        true
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }

    fn is_primitive(&self) -> bool {
        true
    }
}

/// Boolean stored as 1 or 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanIntegerPersister;

impl Persister for BooleanIntegerPersister {
    fn name(&self) -> &'static str {
        "BooleanIntegerPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Integer
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Bool(b) => Ok(Value::Int(i32::from(*b))),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_int(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        arg.as_i64().map(|v| Value::Bool(v != 0)).ok_or_else(|| unexpected(self, field, &arg))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        BooleanPersister.parse_default(field, default)
    }

    fn is_escaped_value(&self) -> bool {
        false
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }

    fn is_primitive(&self) -> bool {
        true
    }
}

/// Single character.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharPersister;

impl Persister for CharPersister {
    fn name(&self) -> &'static str {
        "CharPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Char
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Char]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Char(_) => Ok(value.clone()),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_char(column)?))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        let mut chars = default.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(Value::Char(c)),
            _ => Err(conversion_err!(
                "Problems with field '{}', default string to long for Character: '{default}'",
                field.name
            )),
        }
    }

    fn is_primitive(&self) -> bool {
        true
    }
}

macro_rules! integral_persister {
    (
        $(#[$meta:meta])*
        $name:ident, $rust:ty, $variant:ident, $sql:ident, $getter:ident, $native:ident,
        generated = $generated:literal, version = $version:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Persister for $name {
            fn name(&self) -> &'static str {
                stringify!($name)
            }

            fn sql_type(&self) -> SqlType {
                SqlType::$sql
            }

            fn native_types(&self) -> &'static [NativeType] {
                &[NativeType::$native]
            }

            fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
                let Some(wide) = value.as_i64() else {
                    return Err(unexpected(self, field, value));
                };
                <$rust>::try_from(wide).map(Value::$variant).map_err(|_range| {
                    conversion_err!("value {wide} is out of range for field '{}'", field.name)
                })
            }

            fn from_result(
                &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
            ) -> Result<Value> {
                Ok(or_null(results.$getter(column)?))
            }

            fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
                parse_number::<$rust>(field, default).map(Value::$variant)
            }

            fn is_escaped_value(&self) -> bool {
                false
            }

            fn is_primitive(&self) -> bool {
                true
            }

            fn is_valid_generated_type(&self) -> bool {
                $generated
            }

            fn is_valid_for_version(&self) -> bool {
                $version
            }

            fn next_version(&self, current: &Value) -> Option<Value> {
                if !$version {
                    return None;
                }
                let next = bump(current)?;
                let wide = next.as_i64()?;
                <$rust>::try_from(wide).ok().map(Value::$variant)
            }
        }
    };
}

integral_persister! {
    /// 8-bit integer.
    BytePersister, i8, Byte, Byte, get_byte, Byte, generated = false, version = false
}

integral_persister! {
    /// 16-bit integer.
    ShortPersister, i16, Short, Short, get_short, Short, generated = false, version = true
}

integral_persister! {
    /// 32-bit integer.
    IntPersister, i32, Int, Integer, get_int, Int, generated = true, version = true
}

integral_persister! {
    /// 64-bit integer.
    LongPersister, i64, Long, Long, get_long, Long, generated = true, version = true
}

/// 32-bit float.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatPersister;

impl Persister for FloatPersister {
    fn name(&self) -> &'static str {
        "FloatPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Float
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Float]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Float(_) => Ok(value.clone()),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_float(column)?))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        parse_number::<f32>(field, default).map(Value::Float)
    }

    fn is_escaped_value(&self) -> bool {
        false
    }

    fn is_primitive(&self) -> bool {
        true
    }
}

/// 64-bit float.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoublePersister;

impl Persister for DoublePersister {
    fn name(&self) -> &'static str {
        "DoublePersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Double
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Double]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Double(_) => Ok(value.clone()),
            Value::Float(v) => Ok(Value::Double(f64::from(*v))),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_double(column)?))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        parse_number::<f64>(field, default).map(Value::Double)
    }

    fn is_escaped_value(&self) -> bool {
        false
    }

    fn is_primitive(&self) -> bool {
        true
    }
}

/// Byte array.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteArrayPersister;

impl Persister for ByteArrayPersister {
    fn name(&self) -> &'static str {
        "ByteArrayPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::ByteArray
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Bytes]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Bytes(_) => Ok(value.clone()),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_bytes(column)?))
    }

    fn parse_default(&self, _field: &FieldConfig, default: &str) -> Result<Value> {
        Ok(Value::Bytes(default.as_bytes().to_vec()))
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }

    fn is_arg_holder_required(&self) -> bool {
        true
    }
}

/// Timestamp column.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimePersister;

impl Persister for DateTimePersister {
    fn name(&self) -> &'static str {
        "DateTimePersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Date
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::DateTime]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::DateTime(_) => Ok(value.clone()),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_timestamp(column)?))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        parse_timestamp(field, default).map(Value::DateTime)
    }

    fn is_valid_for_version(&self) -> bool {
        true
    }

    fn next_version(&self, _current: &Value) -> Option<Value> {
        Some(now())
    }
}

/// Timestamp stored as epoch milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateLongPersister;

impl Persister for DateLongPersister {
    fn name(&self) -> &'static str {
        "DateLongPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Long
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::DateTime(ts) => Ok(Value::Long(ts.and_utc().timestamp_millis())),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_long(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        arg.as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| Value::DateTime(dt.naive_utc()))
            .ok_or_else(|| unexpected(self, field, &arg))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        let millis = parse_number::<i64>(field, default)?;
        self.to_native(field, Value::Long(millis), 0)
    }

    fn is_escaped_value(&self) -> bool {
        false
    }

    fn is_valid_for_version(&self) -> bool {
        true
    }

    fn next_version(&self, _current: &Value) -> Option<Value> {
        Some(now())
    }
}

/// Timestamp stored as epoch seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateIntegerPersister;

impl Persister for DateIntegerPersister {
    fn name(&self) -> &'static str {
        "DateIntegerPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Integer
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::DateTime(ts) => i32::try_from(ts.and_utc().timestamp())
                .map(Value::Int)
                .map_err(|_range| conversion_err!("timestamp out of range for field '{}'", field.name)),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_int(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        arg.as_i64()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|dt| Value::DateTime(dt.naive_utc()))
            .ok_or_else(|| unexpected(self, field, &arg))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        let secs = parse_number::<i32>(field, default)?;
        self.to_native(field, Value::Int(secs), 0)
    }

    fn is_escaped_value(&self) -> bool {
        false
    }

    fn is_valid_for_version(&self) -> bool {
        true
    }

    fn next_version(&self, _current: &Value) -> Option<Value> {
        Some(now())
    }
}

/// Timestamp stored as text in the field format (default [`TIMESTAMP_FORMAT`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct DateStringPersister;

impl Persister for DateStringPersister {
    fn name(&self) -> &'static str {
        "DateStringPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::String
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        let format = field.format.as_deref().unwrap_or(TIMESTAMP_FORMAT);
        match value {
            Value::DateTime(ts) => Ok(Value::Text(ts.format(format).to_string())),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_string(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        match arg {
            Value::Text(text) => parse_timestamp(field, &text).map(Value::DateTime),
            other => Err(unexpected(self, field, &other)),
        }
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        parse_timestamp(field, default).map(Value::DateTime)
    }

    fn is_valid_for_version(&self) -> bool {
        true
    }

    fn next_version(&self, _current: &Value) -> Option<Value> {
        Some(now())
    }
}

/// UUID stored as text. Ids of this type are generated in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidPersister;

impl UuidPersister {
    fn parse(field: &FieldConfig, text: &str) -> Result<Value> {
        Uuid::parse_str(text)
            .map(Value::Uuid)
            .map_err(|_e| conversion_err!("Problems with field '{}' parsing UUID '{text}'", field.name))
    }
}

impl Persister for UuidPersister {
    fn name(&self) -> &'static str {
        "UuidPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::String
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Uuid]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Uuid(id) => Ok(Value::Text(id.to_string())),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_string(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        match arg {
            Value::Text(text) => Self::parse(field, &text),
            Value::Uuid(_) => Ok(arg),
            other => Err(unexpected(self, field, &other)),
        }
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        Self::parse(field, default)
    }

    fn is_valid_generated_type(&self) -> bool {
        true
    }

    fn is_self_generated_id(&self) -> bool {
        true
    }

    fn generate_id(&self) -> Option<Value> {
        Some(Value::Uuid(Uuid::new_v4()))
    }
}

/// UUID bound as a native UUID argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeUuidPersister;

impl Persister for NativeUuidPersister {
    fn name(&self) -> &'static str {
        "NativeUuidPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Uuid
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Uuid(_) => Ok(value.clone()),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        UuidPersister.from_result(field, results, column)
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, column: usize) -> Result<Value> {
        UuidPersister.to_native(field, arg, column)
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        UuidPersister::parse(field, default)
    }

    fn is_valid_generated_type(&self) -> bool {
        true
    }

    fn is_self_generated_id(&self) -> bool {
        true
    }

    fn generate_id(&self) -> Option<Value> {
        Some(Value::Uuid(Uuid::new_v4()))
    }
}

fn parse_decimal(field: &FieldConfig, text: &str) -> Result<Value> {
    Decimal::from_str(text.trim())
        .map(Value::Decimal)
        .map_err(|_e| conversion_err!("Problems with field '{}' parsing decimal '{text}'", field.name))
}

/// Decimal stored as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalStringPersister;

impl Persister for DecimalStringPersister {
    fn name(&self) -> &'static str {
        "DecimalStringPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::String
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Decimal]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Decimal(d) => Ok(Value::Text(d.to_string())),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_string(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        match arg {
            Value::Text(text) => parse_decimal(field, &text),
            other => Err(unexpected(self, field, &other)),
        }
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        parse_decimal(field, default)
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }
}

/// Decimal stored in a numeric column.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecimalNumericPersister;

impl Persister for DecimalNumericPersister {
    fn name(&self) -> &'static str {
        "DecimalNumericPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::BigDecimal
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Decimal(_) => Ok(value.clone()),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_decimal(column)?))
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        parse_decimal(field, default)
    }

    fn is_escaped_value(&self) -> bool {
        false
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }
}

/// Resolves a stored variant name against the field's known variants, falling back to the
/// configured unknown-variant name.
fn resolve_variant(field: &FieldConfig, name: &str) -> Result<Value> {
    let variants = &field.enum_variants;
    if variants.is_empty() || variants.iter().any(|v| v == name) {
        return Ok(Value::Enum(name.to_string()));
    }
    field.unknown_enum_name.as_ref().map_or_else(
        || {
            Err(conversion_err!(
                "Cannot get enum value of '{name}' for field '{}'",
                field.name
            ))
        },
        |fallback| Ok(Value::Enum(fallback.to_string())),
    )
}

/// Enum stored by variant name.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumStringPersister;

impl Persister for EnumStringPersister {
    fn name(&self) -> &'static str {
        "EnumStringPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::String
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Enum(name) | Value::Text(name) => Ok(Value::Text(name.clone())),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_string(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        match arg {
            Value::Text(name) => resolve_variant(field, &name),
            other => Err(unexpected(self, field, &other)),
        }
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        resolve_variant(field, default)
    }
}

/// Enum stored by variant position in the field's variant list.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnumIntegerPersister;

impl Persister for EnumIntegerPersister {
    fn name(&self) -> &'static str {
        "EnumIntegerPersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Integer
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        let Value::Enum(name) = value else {
            return Err(unexpected(self, field, value));
        };
        field
            .enum_variants
            .iter()
            .position(|v| v == name)
            .and_then(|pos| i32::try_from(pos).ok())
            .map(Value::Int)
            .ok_or_else(|| {
                conversion_err!("'{name}' is not a known variant for field '{}'", field.name)
            })
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_int(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        let Some(pos) = arg.as_i64() else {
            return Err(unexpected(self, field, &arg));
        };
        let variant = usize::try_from(pos).ok().and_then(|p| field.enum_variants.get(p));
        match (variant, field.unknown_enum_name.as_ref()) {
            (Some(name), _) | (None, Some(name)) => Ok(Value::Enum(name.clone())),
            (None, None) => Err(conversion_err!(
                "Cannot get enum value of '{pos}' for field '{}'",
                field.name
            )),
        }
    }

    fn parse_default(&self, field: &FieldConfig, default: &str) -> Result<Value> {
        resolve_variant(field, default)
    }

    fn is_escaped_value(&self) -> bool {
        false
    }
}

/// Structured value stored as serialized JSON bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerializablePersister;

impl Persister for SerializablePersister {
    fn name(&self) -> &'static str {
        "SerializablePersister"
    }

    fn sql_type(&self) -> SqlType {
        SqlType::Serializable
    }

    fn native_types(&self) -> &'static [NativeType] {
        &[NativeType::Json]
    }

    fn to_arg(&self, field: &FieldConfig, value: &Value) -> Result<Value> {
        match value {
            Value::Json(json) => serde_json::to_vec(json).map(Value::Bytes).map_err(|e| {
                conversion_err!("Could not write serialized object for field '{}': {e}", field.name)
            }),
            _ => Err(unexpected(self, field, value)),
        }
    }

    fn from_result(
        &self, _field: &FieldConfig, results: &dyn DatabaseResults, column: usize,
    ) -> Result<Value> {
        Ok(or_null(results.get_bytes(column)?))
    }

    fn to_native(&self, field: &FieldConfig, arg: Value, _column: usize) -> Result<Value> {
        match arg {
            Value::Bytes(bytes) => serde_json::from_slice(&bytes).map(Value::Json).map_err(|e| {
                conversion_err!("Could not read serialized object for field '{}': {e}", field.name)
            }),
            other => Err(unexpected(self, field, &other)),
        }
    }

    fn parse_default(&self, field: &FieldConfig, _default: &str) -> Result<Value> {
        Err(conversion_err!(
            "Default values for serializable types are not supported (field '{}')",
            field.name
        ))
    }

    fn is_comparable(&self) -> bool {
        false
    }

    fn is_appropriate_id(&self) -> bool {
        false
    }

    fn is_arg_holder_required(&self) -> bool {
        true
    }

    fn is_stream_type(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;

    #[test]
    fn integral_range_checked() {
        let field = FieldConfig::new("count");
        assert_eq!(IntPersister.to_arg(&field, &Value::Long(7)).unwrap(), Value::Int(7));
        let err = BytePersister.to_arg(&field, &Value::Long(1_000)).unwrap_err();
        assert_eq!(err.to_string(), "conversion error: value 1000 is out of range for field 'count'");
    }

    #[test]
    fn boolean_char_uses_format() {
        let field = FieldConfig::new("active").format("YN");
        assert_eq!(BooleanCharPersister.to_arg(&field, &Value::Bool(false)).unwrap(), Value::Char('N'));
        assert_eq!(
            BooleanCharPersister.to_native(&field, Value::Char('Y'), 0).unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn char_default_must_be_single() {
        let field = FieldConfig::new("grade");
        assert_eq!(CharPersister.parse_default(&field, "A").unwrap(), Value::Char('A'));
        let err = CharPersister.parse_default(&field, "AB").unwrap_err();
        assert!(err.to_string().contains("default string to long for Character: 'AB'"));
    }

    #[test]
    fn enum_unknown_falls_back() {
        let field = FieldConfig::new("color").enum_variants(["RED", "GREEN"]);
        let err = EnumStringPersister.to_native(&field, Value::Text("BLUE".into()), 0).unwrap_err();
        assert!(err.to_string().contains("Cannot get enum value of 'BLUE'"));

        let field = field.unknown_enum_name("RED");
        assert_eq!(
            EnumStringPersister.to_native(&field, Value::Text("BLUE".into()), 0).unwrap(),
            Value::Enum("RED".into())
        );
        assert_eq!(
            EnumIntegerPersister.to_arg(&field, &Value::Enum("GREEN".into())).unwrap(),
            Value::Int(1)
        );
    }

    #[test]
    fn date_long_millis() {
        let field = FieldConfig::new("created");
        let ts = NaiveDateTime::parse_from_str("2024-01-15 10:30:45", "%Y-%m-%d %H:%M:%S").unwrap();
        let arg = DateLongPersister.to_arg(&field, &Value::DateTime(ts)).unwrap();
        assert_eq!(arg, Value::Long(1_705_314_645_000));
        assert_eq!(DateLongPersister.to_native(&field, arg, 0).unwrap(), Value::DateTime(ts));
    }

    #[test]
    fn version_increments() {
        assert_eq!(LongPersister.next_version(&Value::Long(4)), Some(Value::Long(5)));
        assert_eq!(IntPersister.next_version(&Value::Null), Some(Value::Int(1)));
        assert_eq!(BytePersister.next_version(&Value::Byte(1)), None);
    }

    #[test]
    fn serializable_flags() {
        assert!(!SerializablePersister.is_comparable());
        assert!(SerializablePersister.is_arg_holder_required());
        let field = FieldConfig::new("payload");
        assert!(SerializablePersister.parse_default(&field, "{}").is_err());
    }
}
