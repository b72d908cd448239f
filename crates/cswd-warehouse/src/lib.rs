pub mod calendar;
pub mod entity;
pub mod instruments;
pub mod migrations;
pub mod panel;
pub mod period;
pub mod refresh_log;
pub mod row;
pub mod schema;
pub mod series;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use thiserror::Error;
use time::Date;

pub use calendar::TradingCalendar;
pub use entity::{EntityCode, ValidationError};
pub use instruments::{Instrument, InstrumentKind, ListingStatus};
pub use panel::Panel;
pub use refresh_log::{RefreshOutcome, RefreshRecord};
pub use row::{FieldValue, SeriesRow};
pub use schema::{ColumnDef, ColumnKind, TableSchema};
pub use series::{resume_date, DateRange, RowFilter};

/// Largest number of codes bound into a single `IN (...)` list.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown field '{field}' in table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("field '{field}' of table '{table}' is not numeric")]
    NotNumeric { table: String, field: String },

    #[error("{table} row {code}@{date} has {actual} values, expected {expected}")]
    RowShape {
        table: String,
        code: String,
        date: Date,
        expected: usize,
        actual: usize,
    },

    #[error("{table}.{column} has the wrong type for {code}@{date}")]
    TypeMismatch {
        table: String,
        column: String,
        code: String,
        date: Date,
    },

    #[error("{table} already stores {code}@{date}")]
    KeyExists {
        table: String,
        code: String,
        date: Date,
    },

    #[error("{table} batch carries {code}@{date} more than once")]
    DuplicateKey {
        table: String,
        code: String,
        date: Date,
    },

    #[error("invalid value '{value}' stored in {table}.{column}")]
    InvalidValue {
        table: String,
        column: String,
        value: String,
    },
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub home: PathBuf,
    pub db_path: PathBuf,
    pub chunk_size: usize,
}

impl WarehouseConfig {
    pub fn under(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("database").join("stock.duckdb");
        Self {
            home,
            db_path,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::under(resolve_home())
    }
}

/// Single-writer DuckDB store holding every keyed table, the trading
/// calendar, the instrument registry and the refresh log.
pub struct Warehouse {
    config: WarehouseConfig,
    connection: Connection,
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let connection = Connection::open(&config.db_path)?;
        let warehouse = Self { config, connection };
        warehouse.initialize()?;
        tracing::debug!(path = %warehouse.db_path().display(), "warehouse opened");
        Ok(warehouse)
    }

    pub fn open_in_memory() -> Result<Self, WarehouseError> {
        let connection = Connection::open_in_memory()?;
        let warehouse = Self {
            config: WarehouseConfig::under("."),
            connection,
        };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        migrations::apply_migrations(&self.connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.config.db_path.as_path()
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.config.chunk_size.max(1)
    }

    /// Run `body` inside one transaction; any error rolls the whole call back.
    pub(crate) fn transaction<T>(
        &self,
        body: impl FnOnce(&Connection) -> Result<T, WarehouseError>,
    ) -> Result<T, WarehouseError> {
        self.connection.execute_batch("BEGIN TRANSACTION")?;
        let result = body(&self.connection);
        finalize_transaction(&self.connection, result)
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Data root: `CSWD_HOME`, else `$HOME/stockdata`, else `./stockdata`.
pub fn resolve_home() -> PathBuf {
    if let Some(path) = env::var_os("CSWD_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join("stockdata");
    }

    PathBuf::from("stockdata")
}

pub(crate) fn parse_iso_date(
    table: &str,
    column: &str,
    raw: &str,
) -> Result<Date, WarehouseError> {
    let format = time::macros::format_description!("[year]-[month]-[day]");
    Date::parse(raw, format).map_err(|_| WarehouseError::InvalidValue {
        table: table.to_string(),
        column: column.to_string(),
        value: raw.to_string(),
    })
}
