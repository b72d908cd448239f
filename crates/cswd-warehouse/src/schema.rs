//! Static description of every table keyed by `(code, date)`.
//!
//! Each column carries its storage code, a semantic name and a type. The
//! catalogue is the single source the store uses to build statements, check
//! row shapes and resolve field names; migrations create the same columns.

use crate::WarehouseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Double,
    BigInt,
    Text,
    Date,
}

impl ColumnKind {
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Double | Self::BigInt)
    }

    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Double => "DOUBLE",
            Self::BigInt => "BIGINT",
            Self::Text => "TEXT",
            Self::Date => "DATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name in storage.
    pub code: &'static str,
    /// Semantic name used by callers.
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(code: &'static str, name: &'static str, kind: ColumnKind) -> ColumnDef {
    ColumnDef { code, name, kind }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
}

impl TableSchema {
    /// Position of a field, matched against the storage code first and then
    /// the semantic name.
    pub fn position(&self, field: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.code == field)
            .or_else(|| self.columns.iter().position(|column| column.name == field))
    }

    pub fn column(&self, field: &str) -> Result<(usize, &'static ColumnDef), WarehouseError> {
        let index = self
            .position(field)
            .ok_or_else(|| WarehouseError::UnknownField {
                table: self.name.to_string(),
                field: field.to_string(),
            })?;
        Ok((index, &self.columns[index]))
    }

    pub fn numeric_column(&self, field: &str) -> Result<&'static ColumnDef, WarehouseError> {
        let (_, column) = self.column(field)?;
        if !column.kind.is_numeric() {
            return Err(WarehouseError::NotNumeric {
                table: self.name.to_string(),
                field: field.to_string(),
            });
        }
        Ok(column)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

use ColumnKind::{BigInt, Date, Double, Text};

pub const STOCK_DAILY: TableSchema = TableSchema {
    name: "stock_daily",
    columns: &[
        col("short_name", "short_name", Text),
        col("open", "open", Double),
        col("high", "high", Double),
        col("low", "low", Double),
        col("close", "close", Double),
        col("prev_close", "prev_close", Double),
        col("change_pct", "change_pct", Double),
        col("volume", "volume", BigInt),
        col("amount", "amount", Double),
        col("turnover", "turnover", Double),
        col("tmv", "total_market_value", Double),
        col("cmv", "circulating_market_value", Double),
    ],
};

pub const INDEX_DAILY: TableSchema = TableSchema {
    name: "index_daily",
    columns: &[
        col("open", "open", Double),
        col("high", "high", Double),
        col("low", "low", Double),
        col("close", "close", Double),
        col("volume", "volume", BigInt),
        col("amount", "amount", Double),
        col("change_pct", "change_pct", Double),
    ],
};

pub const ADJUSTMENTS: TableSchema = TableSchema {
    name: "adjustments",
    columns: &[
        col("annual", "annual", Text),
        col("amount", "amount", Double),
        col("ratio", "ratio", Double),
        col("record_date", "record_date", Date),
        col("pay_date", "pay_date", Date),
        col("listing_date", "listing_date", Date),
    ],
};

/// Periodic statement items. The leading letter is the statement (A balance
/// sheet, B income statement, C cash flow, D indicators), the digits the item.
pub const FINANCE_REPORTS: TableSchema = TableSchema {
    name: "finance_reports",
    columns: &[
        col("announcement_date", "announcement_date", Date),
        col("A001", "cash_and_equivalents", Double),
        col("A025", "total_current_assets", Double),
        col("A052", "total_assets", Double),
        col("A094", "total_liabilities", Double),
        col("A108", "total_equity", Double),
        col("B001", "total_operating_revenue", Double),
        col("B027", "net_profit", Double),
        col("C025", "net_operating_cash_flow", Double),
        col("D001", "basic_eps", Double),
        col("D010", "roe", Double),
    ],
};

pub const CATALOGUE: &[TableSchema] = &[STOCK_DAILY, INDEX_DAILY, ADJUSTMENTS, FINANCE_REPORTS];

pub fn table(name: &str) -> Result<&'static TableSchema, WarehouseError> {
    CATALOGUE
        .iter()
        .find(|schema| schema.name == name)
        .ok_or_else(|| WarehouseError::UnknownTable(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_fields_by_code_or_name() {
        assert_eq!(FINANCE_REPORTS.position("A052"), Some(3));
        assert_eq!(FINANCE_REPORTS.position("total_assets"), Some(3));
        assert_eq!(STOCK_DAILY.position("tmv"), STOCK_DAILY.position("total_market_value"));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let err = STOCK_DAILY.column("vwap").expect_err("must fail");
        assert!(matches!(err, WarehouseError::UnknownField { .. }));
    }

    #[test]
    fn text_fields_are_not_pivotable() {
        let err = ADJUSTMENTS.numeric_column("annual").expect_err("must fail");
        assert!(matches!(err, WarehouseError::NotNumeric { .. }));
        assert!(ADJUSTMENTS.numeric_column("amount").is_ok());
    }

    #[test]
    fn catalogue_lookup() {
        assert_eq!(table("index_daily").expect("known table").width(), 7);
        assert!(matches!(table("quotes"), Err(WarehouseError::UnknownTable(_))));
    }

    #[test]
    fn column_codes_are_unique_per_table() {
        for schema in CATALOGUE {
            for (index, column) in schema.columns.iter().enumerate() {
                assert_eq!(
                    schema.columns.iter().position(|c| c.code == column.code),
                    Some(index),
                    "{}.{} is duplicated",
                    schema.name,
                    column.code
                );
            }
        }
    }
}
