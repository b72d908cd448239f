use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ::duckdb::params_from_iter;
use ::duckdb::types::Value as DuckValue;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::{parse_iso_date, EntityCode, Warehouse, WarehouseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Appended,
    Empty,
    Skipped,
    Failed,
}

impl RefreshOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Appended => "appended",
            Self::Empty => "empty",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl Display for RefreshOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshOutcome {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "appended" => Ok(Self::Appended),
            "empty" => Ok(Self::Empty),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// One logged refresh attempt for a table, per code or for the whole table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub table: String,
    pub code: Option<EntityCode>,
    pub outcome: RefreshOutcome,
    pub rows: usize,
    pub start: Option<Date>,
    pub end: Option<Date>,
    pub message: Option<String>,
}

impl Warehouse {
    pub fn log_refresh(&self, record: &RefreshRecord) -> Result<(), WarehouseError> {
        let params = [
            DuckValue::Text(record.table.clone()),
            record
                .code
                .as_ref()
                .map_or(DuckValue::Null, |code| DuckValue::Text(code.to_string())),
            DuckValue::Text(record.outcome.as_str().to_string()),
            DuckValue::BigInt(i64::try_from(record.rows).unwrap_or(i64::MAX)),
            optional_date(record.start),
            optional_date(record.end),
            record
                .message
                .as_ref()
                .map_or(DuckValue::Null, |message| DuckValue::Text(message.clone())),
        ];
        self.connection().execute(
            "INSERT INTO refresh_log (table_name, code, outcome, row_count, start_date, end_date, message) \
             VALUES (?, ?, ?, ?, CAST(? AS DATE), CAST(? AS DATE), ?)",
            params_from_iter(params.iter()),
        )?;
        Ok(())
    }

    /// Logged attempts for a table, oldest first.
    pub fn refresh_records(&self, table: &str) -> Result<Vec<RefreshRecord>, WarehouseError> {
        let mut statement = self.connection().prepare(
            "SELECT code, outcome, row_count, CAST(start_date AS VARCHAR), CAST(end_date AS VARCHAR), message \
             FROM refresh_log WHERE table_name = ? ORDER BY id",
        )?;
        let mut rows = statement.query([table])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let outcome: String = row.get(1)?;
            let rows_written: i64 = row.get(2)?;
            let start: Option<String> = row.get(3)?;
            let end: Option<String> = row.get(4)?;

            records.push(RefreshRecord {
                table: table.to_string(),
                code: row
                    .get::<_, Option<String>>(0)?
                    .map(|raw| EntityCode::parse(&raw))
                    .transpose()?,
                outcome: outcome.parse().map_err(|value| WarehouseError::InvalidValue {
                    table: String::from("refresh_log"),
                    column: String::from("outcome"),
                    value,
                })?,
                rows: usize::try_from(rows_written).unwrap_or_default(),
                start: start
                    .map(|raw| parse_iso_date("refresh_log", "start_date", &raw))
                    .transpose()?,
                end: end
                    .map(|raw| parse_iso_date("refresh_log", "end_date", &raw))
                    .transpose()?,
                message: row.get(5)?,
            });
        }
        Ok(records)
    }
}

fn optional_date(date: Option<Date>) -> DuckValue {
    date.map_or(DuckValue::Null, |date| DuckValue::Text(date.to_string()))
}
