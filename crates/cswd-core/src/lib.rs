//! Core of the stock data warehouse.
//!
//! This crate contains:
//! - The staleness-aware fetch cache
//! - Corporate-action merging and percentage-change price adjustment
//! - Refresh strategies and the driver that composes them
//! - Source fetcher and trading calendar contracts

pub mod adjustment;
pub mod cache;
pub mod error;
pub mod query;
pub mod refresh;
pub mod settings;
pub mod source;
pub mod throttling;

pub use adjustment::{
    adjusted_bars, adjusted_series, fill_suspended_prices, merge_duplicate_effective_dates,
    AdjustedBar, CorporateAction, DailyBar, Ohlc, PriceField,
};
pub use cache::{
    CacheKey, CacheMode, Clock, FetchCache, Frequency, FreshnessPolicy, ManualClock,
    OperationStats, SystemClock,
};
pub use cswd_warehouse::{
    EntityCode, FieldValue, Instrument, InstrumentKind, ListingStatus, Panel, RefreshOutcome,
    RefreshRecord, SeriesRow, TableSchema, TradingCalendar, ValidationError, Warehouse,
    WarehouseConfig, WarehouseError,
};
pub use error::{AdjustmentError, CacheError, CoreError, FetchError, FetchErrorKind, RefreshError};
pub use query::{adjusted_ohlc, daily_bars, normalized_close};
pub use refresh::{
    CorporateActionTask, FinanceReportTask, IndexDailyTask, RangeArgs, RefreshDriver,
    RefreshReport, RefreshState, RefreshTask, ReportPeriod, ResumePoint, StockDailyTask,
};
pub use settings::{Settings, MARKET_EPOCH};
pub use source::{CalendarSource, SourceFetcher};
pub use throttling::{Throttle, ThrottlePolicy};
