use std::fmt::{Display, Formatter};
use std::str::FromStr;

use ::duckdb::params_from_iter;
use ::duckdb::types::Value as DuckValue;
use serde::{Deserialize, Serialize};

use crate::{EntityCode, ValidationError, Warehouse, WarehouseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentKind {
    Stock,
    Index,
}

impl InstrumentKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Index => "index",
        }
    }
}

impl Display for InstrumentKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstrumentKind {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stock" => Ok(Self::Stock),
            "index" => Ok(Self::Index),
            _ => Err(ValidationError::InvalidKind {
                value: value.to_string(),
            }),
        }
    }
}

/// Listing state as published by the exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Unlisted,
    InTrading,
    Suspended,
    Delisted,
}

impl ListingStatus {
    pub const fn code(self) -> i16 {
        match self {
            Self::Unlisted => 0,
            Self::InTrading => 1,
            Self::Suspended => 2,
            Self::Delisted => 3,
        }
    }

    pub fn from_code(code: i16) -> Result<Self, ValidationError> {
        match code {
            0 => Ok(Self::Unlisted),
            1 => Ok(Self::InTrading),
            2 => Ok(Self::Suspended),
            3 => Ok(Self::Delisted),
            other => Err(ValidationError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub code: EntityCode,
    pub name: String,
    pub kind: InstrumentKind,
    pub status: ListingStatus,
}

impl Warehouse {
    /// Insert or update registry entries. Entries are keyed by code and kind,
    /// so a stock and an index may share a code.
    pub fn register_instruments(&self, instruments: &[Instrument]) -> Result<usize, WarehouseError> {
        if instruments.is_empty() {
            return Ok(0);
        }

        let written = self.transaction(|connection| {
            let mut statement = connection.prepare(
                "INSERT OR REPLACE INTO instruments (code, name, kind, status, updated_at) \
                 VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)",
            )?;
            for instrument in instruments {
                let params = [
                    DuckValue::Text(instrument.code.to_string()),
                    DuckValue::Text(instrument.name.clone()),
                    DuckValue::Text(instrument.kind.as_str().to_string()),
                    DuckValue::SmallInt(instrument.status.code()),
                ];
                statement.execute(params_from_iter(params.iter()))?;
            }
            Ok(instruments.len())
        })?;
        tracing::info!(rows = written, "instruments registered");
        Ok(written)
    }

    /// Registered codes of one kind, optionally restricted to a status,
    /// in ascending order.
    pub fn codes(
        &self,
        kind: InstrumentKind,
        status: Option<ListingStatus>,
    ) -> Result<Vec<EntityCode>, WarehouseError> {
        let mut sql = String::from("SELECT code FROM instruments WHERE kind = ?");
        let mut params = vec![DuckValue::Text(kind.as_str().to_string())];
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            params.push(DuckValue::SmallInt(status.code()));
        }
        sql.push_str(" ORDER BY code");

        let mut statement = self.connection().prepare(&sql)?;
        let mut rows = statement.query(params_from_iter(params.iter()))?;
        let mut codes = Vec::new();
        while let Some(row) = rows.next()? {
            codes.push(EntityCode::parse(&row.get::<_, String>(0)?)?);
        }
        Ok(codes)
    }

    pub fn instrument(
        &self,
        kind: InstrumentKind,
        code: &EntityCode,
    ) -> Result<Option<Instrument>, WarehouseError> {
        let mut statement = self
            .connection()
            .prepare("SELECT name, status FROM instruments WHERE code = ? AND kind = ?")?;
        let mut rows = statement.query([code.as_str(), kind.as_str()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let name: String = row.get(0)?;
        let status: i16 = row.get(1)?;
        Ok(Some(Instrument {
            code: code.clone(),
            name,
            kind,
            status: ListingStatus::from_code(status)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument(code: &str, kind: InstrumentKind, status: ListingStatus) -> Instrument {
        Instrument {
            code: EntityCode::parse(code).expect("code"),
            name: format!("name {code}"),
            kind,
            status,
        }
    }

    #[test]
    fn filters_codes_by_kind_and_status() {
        let warehouse = Warehouse::open_in_memory().expect("open");
        warehouse
            .register_instruments(&[
                instrument("600000", InstrumentKind::Stock, ListingStatus::InTrading),
                instrument("000002", InstrumentKind::Stock, ListingStatus::InTrading),
                instrument("000003", InstrumentKind::Stock, ListingStatus::Delisted),
                instrument("399001", InstrumentKind::Index, ListingStatus::InTrading),
            ])
            .expect("register");

        let listed = warehouse
            .codes(InstrumentKind::Stock, Some(ListingStatus::InTrading))
            .expect("codes");
        let listed: Vec<&str> = listed.iter().map(EntityCode::as_str).collect();
        assert_eq!(listed, ["000002", "600000"]);

        assert_eq!(warehouse.codes(InstrumentKind::Stock, None).expect("codes").len(), 3);
        assert_eq!(warehouse.codes(InstrumentKind::Index, None).expect("codes").len(), 1);
    }

    #[test]
    fn re_registering_updates_status() {
        let warehouse = Warehouse::open_in_memory().expect("open");
        let mut entry = instrument("600000", InstrumentKind::Stock, ListingStatus::InTrading);
        warehouse.register_instruments(&[entry.clone()]).expect("register");
        entry.status = ListingStatus::Suspended;
        warehouse.register_instruments(&[entry.clone()]).expect("register");

        assert_eq!(
            warehouse.instrument(entry.kind, &entry.code).expect("lookup"),
            Some(entry)
        );
    }

    #[test]
    fn stock_and_index_may_share_a_code() {
        let warehouse = Warehouse::open_in_memory().expect("open");
        let stock = instrument("000001", InstrumentKind::Stock, ListingStatus::InTrading);
        let index = instrument("000001", InstrumentKind::Index, ListingStatus::InTrading);
        warehouse.register_instruments(&[stock.clone()]).expect("register");
        warehouse.register_instruments(&[index.clone()]).expect("register");

        let code = EntityCode::parse("000001").expect("code");
        assert_eq!(warehouse.codes(InstrumentKind::Stock, None).expect("codes"), [code.clone()]);
        assert_eq!(warehouse.codes(InstrumentKind::Index, None).expect("codes"), [code.clone()]);
        assert_eq!(warehouse.instrument(InstrumentKind::Stock, &code).expect("lookup"), Some(stock));
        assert_eq!(warehouse.instrument(InstrumentKind::Index, &code).expect("lookup"), Some(index));
    }

    #[test]
    fn status_codes_round_trip_and_reject_unknown() {
        assert_eq!(ListingStatus::from_code(2), Ok(ListingStatus::Suspended));
        assert!(ListingStatus::from_code(9).is_err());
        assert_eq!("Index".parse::<InstrumentKind>(), Ok(InstrumentKind::Index));
    }
}
