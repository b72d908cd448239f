use std::collections::HashSet;

use ::duckdb::types::Value as DuckValue;
use time::Date;

use crate::schema::{ColumnKind, TableSchema};
use crate::{EntityCode, WarehouseError};

/// One typed cell of a keyed table.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Number(f64),
    Integer(i64),
    Text(String),
    Date(Date),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            Self::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<Date> {
        match self {
            Self::Date(value) => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn fits(&self, kind: ColumnKind) -> bool {
        match self {
            Self::Null => true,
            Self::Number(_) => kind == ColumnKind::Double,
            Self::Integer(_) => kind.is_numeric(),
            Self::Text(_) => kind == ColumnKind::Text,
            Self::Date(_) => kind == ColumnKind::Date,
        }
    }

    /// Bind form. Dates travel as ISO text and are cast in SQL.
    pub(crate) fn to_duck(&self) -> DuckValue {
        match self {
            Self::Null => DuckValue::Null,
            Self::Number(value) if value.is_nan() => DuckValue::Null,
            Self::Number(value) => DuckValue::Double(*value),
            Self::Integer(value) => DuckValue::BigInt(*value),
            Self::Text(value) => DuckValue::Text(value.clone()),
            Self::Date(value) => DuckValue::Text(value.to_string()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Date> for FieldValue {
    fn from(value: Date) -> Self {
        Self::Date(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// A row of one keyed table; `values` follow the schema's column order.
/// The `last_updated` stamp is added by the store and never carried here.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub code: EntityCode,
    pub date: Date,
    pub values: Vec<FieldValue>,
}

impl SeriesRow {
    pub fn new(code: EntityCode, date: Date, values: Vec<FieldValue>) -> Self {
        Self { code, date, values }
    }

    pub fn get(&self, schema: &TableSchema, field: &str) -> Option<&FieldValue> {
        schema.position(field).and_then(|index| self.values.get(index))
    }

    pub fn number(&self, schema: &TableSchema, field: &str) -> Option<f64> {
        self.get(schema, field).and_then(FieldValue::as_f64)
    }
}

/// Reject rows whose shape or types disagree with the schema, and batches
/// carrying the same key twice.
pub(crate) fn validate_batch(schema: &TableSchema, rows: &[SeriesRow]) -> Result<(), WarehouseError> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        if row.values.len() != schema.width() {
            return Err(WarehouseError::RowShape {
                table: schema.name.to_string(),
                code: row.code.to_string(),
                date: row.date,
                expected: schema.width(),
                actual: row.values.len(),
            });
        }

        for (value, column) in row.values.iter().zip(schema.columns) {
            if !value.fits(column.kind) {
                return Err(WarehouseError::TypeMismatch {
                    table: schema.name.to_string(),
                    column: column.code.to_string(),
                    code: row.code.to_string(),
                    date: row.date,
                });
            }
        }

        if !seen.insert((&row.code, row.date)) {
            return Err(WarehouseError::DuplicateKey {
                table: schema.name.to_string(),
                code: row.code.to_string(),
                date: row.date,
            });
        }
    }
    Ok(())
}
