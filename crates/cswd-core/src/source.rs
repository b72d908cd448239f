use cswd_warehouse::{TradingCalendar, Warehouse, WarehouseError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::Date;

use crate::error::FetchError;

/// A remote data operation with a fixed argument shape. Implementations do
/// the scraping; the cache only sees the name, the arguments and the
/// returned payload.
pub trait SourceFetcher {
    type Args: Serialize;
    type Output: Serialize + DeserializeOwned;

    /// Stable operation name, used as the cache directory.
    fn name(&self) -> &str;

    fn fetch(&self, args: &Self::Args) -> Result<Self::Output, FetchError>;
}

/// Trading days as published by the exchange.
pub trait CalendarSource {
    fn trading_dates(&self, start: Date, end: Date) -> Result<TradingCalendar, WarehouseError>;

    /// Most recent trading day at or before `today`.
    fn last_trading_date(&self, today: Date) -> Result<Option<Date>, WarehouseError>;
}

impl CalendarSource for Warehouse {
    fn trading_dates(&self, start: Date, end: Date) -> Result<TradingCalendar, WarehouseError> {
        self.trading_calendar(start, end)
    }

    fn last_trading_date(&self, today: Date) -> Result<Option<Date>, WarehouseError> {
        self.last_trading_date_on_or_before(today)
    }
}

impl CalendarSource for TradingCalendar {
    fn trading_dates(&self, start: Date, end: Date) -> Result<TradingCalendar, WarehouseError> {
        Ok(self.between(start, end))
    }

    fn last_trading_date(&self, today: Date) -> Result<Option<Date>, WarehouseError> {
        Ok(self.last_on_or_before(today))
    }
}
