//! Row to JSON decoding for the relational backends.
//!
//! A column is classified once from its declared type name, then decoded by
//! trying a short list of Rust types for that class. Values the model cannot
//! use natively (decimals, binary, temporal types) become strings so that
//! serialized size stays predictable.

use crate::models::{DatabaseType, Record};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::{Column, Decode, Row, Type, TypeInfo, ValueRef};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Time,
    Unknown,
}

/// Substring rules, first match wins. Text precedes Integer for "tinytext".
const SUBSTRING_RULES: &[(&[&str], TypeCategory)] = &[
    (&["decimal", "numeric"], TypeCategory::Decimal),
    (&["blob", "binary"], TypeCategory::Binary),
    (&["char", "text"], TypeCategory::Text),
    (&["int", "serial", "tiny"], TypeCategory::Integer),
    (&["float", "double"], TypeCategory::Float),
];

/// Classify a declared column type name.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    match lower.as_str() {
        "bool" | "boolean" => TypeCategory::Boolean,
        "json" | "jsonb" => TypeCategory::Json,
        "uuid" => TypeCategory::Uuid,
        "bytea" => TypeCategory::Binary,
        "name" => TypeCategory::Text,
        "real" => TypeCategory::Float,
        "interval" | "point" => TypeCategory::Unknown,
        "timestamptz" => TypeCategory::TimestampTz,
        // MySQL TIMESTAMP is stored in UTC
        "timestamp" if db == DatabaseType::MySQL => TypeCategory::TimestampTz,
        "timestamp" | "datetime" => TypeCategory::Timestamp,
        "date" => TypeCategory::Date,
        "time" => TypeCategory::Time,
        name => SUBSTRING_RULES
            .iter()
            .find(|(needles, _)| needles.iter().any(|needle| name.contains(needle)))
            .map(|(_, category)| *category)
            .unwrap_or(TypeCategory::Unknown),
    }
}

/// DECIMAL/NUMERIC kept in the database's own text representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        matches!(categorize_type(ty.name(), DatabaseType::MySQL), TypeCategory::Decimal)
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <&str as Decode<sqlx::MySql>>::decode(value).map(|s| RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        matches!(
            categorize_type(ty.name(), DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        )
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        <&str as Decode<sqlx::Postgres>>::decode(value).map(|s| RawDecimal(s.to_string()))
    }
}

/// Valid UTF-8 is returned as text; anything else is base64 encoded.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

fn float32_value(v: f32) -> JsonValue {
    float_value(f64::from(v))
}

fn binary(v: Vec<u8>) -> JsonValue {
    decode_binary_value(&v)
}

fn raw_decimal(v: RawDecimal) -> JsonValue {
    JsonValue::String(v.0)
}

fn rfc3339(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn display<T: std::fmt::Display>(v: T) -> JsonValue {
    JsonValue::String(v.to_string())
}

/// First listed type that decodes the cell, converted to JSON.
macro_rules! first_decoded {
    ($row:expr, $idx:expr; $($ty:ty => $convert:expr),+ $(,)?) => {
        'decoded: {
            $(
                if let Ok(v) = $row.try_get::<$ty, _>($idx) {
                    break 'decoded Some(($convert)(v));
                }
            )+
            None
        }
    };
}

/// Trait for converting database rows to JSON records.
pub trait RowToJson {
    fn to_record(&self) -> Record;
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decode:ident) => {
        impl RowToJson for $row {
            fn to_record(&self) -> Record {
                self.columns()
                    .iter()
                    .map(|col| {
                        let idx = col.ordinal();
                        let is_null = self.try_get_raw(idx).map(|v| v.is_null()).unwrap_or(true);
                        let value = if is_null {
                            JsonValue::Null
                        } else {
                            $decode(self, idx, categorize_type(col.type_info().name(), $db))
                        };
                        (col.name().to_string(), value)
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(MySqlRow, DatabaseType::MySQL, decode_mysql);
impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, decode_postgres);

/// Decode one non-NULL MySQL cell.
fn decode_mysql(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
    let value = match category {
        TypeCategory::Decimal => first_decoded!(row, idx; RawDecimal => raw_decimal),
        // i64 covers every signed width, u64 every UNSIGNED one
        TypeCategory::Integer => first_decoded!(row, idx; i64 => JsonValue::from, u64 => JsonValue::from),
        TypeCategory::Boolean => first_decoded!(row, idx; bool => JsonValue::Bool),
        TypeCategory::Float => first_decoded!(row, idx; f64 => float_value, f32 => float32_value),
        TypeCategory::Binary => first_decoded!(row, idx; Vec<u8> => binary),
        TypeCategory::Json => first_decoded!(row, idx; JsonValue => std::convert::identity),
        TypeCategory::TimestampTz => {
            first_decoded!(row, idx; DateTime<Utc> => rfc3339, NaiveDateTime => display)
        }
        TypeCategory::Timestamp => first_decoded!(row, idx; NaiveDateTime => display),
        TypeCategory::Date => first_decoded!(row, idx; NaiveDate => display),
        TypeCategory::Time => first_decoded!(row, idx; NaiveTime => display),
        TypeCategory::Text | TypeCategory::Uuid | TypeCategory::Unknown => {
            first_decoded!(row, idx; String => JsonValue::String)
        }
    };

    // Types without a checked decoder come back as raw bytes
    value.unwrap_or_else(|| {
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|v| decode_binary_value(&v))
            .unwrap_or(JsonValue::Null)
    })
}

/// Decode one non-NULL PostgreSQL cell.
fn decode_postgres(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
    let value = match category {
        TypeCategory::Decimal => first_decoded!(row, idx; RawDecimal => raw_decimal),
        TypeCategory::Integer => {
            first_decoded!(row, idx; i32 => JsonValue::from, i64 => JsonValue::from, i16 => JsonValue::from)
        }
        TypeCategory::Boolean => first_decoded!(row, idx; bool => JsonValue::Bool),
        TypeCategory::Float => first_decoded!(row, idx; f64 => float_value, f32 => float32_value),
        TypeCategory::Binary => first_decoded!(row, idx; Vec<u8> => binary),
        TypeCategory::Json => first_decoded!(row, idx; JsonValue => std::convert::identity),
        TypeCategory::Uuid => first_decoded!(row, idx; uuid::Uuid => display),
        TypeCategory::TimestampTz => first_decoded!(row, idx; DateTime<Utc> => rfc3339),
        TypeCategory::Timestamp => first_decoded!(row, idx; NaiveDateTime => display),
        TypeCategory::Date => first_decoded!(row, idx; NaiveDate => display),
        TypeCategory::Time => first_decoded!(row, idx; NaiveTime => display),
        TypeCategory::Text | TypeCategory::Unknown => {
            first_decoded!(row, idx; String => JsonValue::String)
        }
    };

    // Enums, intervals and other types sent as text
    value.unwrap_or_else(|| {
        row.try_get_unchecked::<String, _>(idx)
            .map(JsonValue::String)
            .unwrap_or(JsonValue::Null)
    })
}
