//! Per-table refresh strategies composed by the driver.

use std::collections::BTreeMap;

use cswd_warehouse::period::{next_quarter_end, quarter_end};
use cswd_warehouse::schema::{ADJUSTMENTS, FINANCE_REPORTS, INDEX_DAILY, STOCK_DAILY};
use cswd_warehouse::{
    resume_date, EntityCode, FieldValue, InstrumentKind, SeriesRow, TableSchema, Warehouse,
    WarehouseError,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::adjustment::{fill_suspended_prices, merge_duplicate_effective_dates, CorporateAction, DailyBar};
use crate::error::{FetchError, RefreshError};
use crate::source::SourceFetcher;

/// Cache arguments of a date-range fetch for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeArgs {
    pub code: EntityCode,
    pub start: Date,
    pub end: Date,
}

/// Where an entity's next refresh starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumePoint {
    pub last_stored: Option<Date>,
    pub resume: Date,
}

pub trait RefreshTask {
    type Payload: Serialize + DeserializeOwned;

    fn schema(&self) -> &'static TableSchema;

    fn kind(&self) -> InstrumentKind;

    /// Cache operation name of the underlying fetch.
    fn operation(&self) -> &str;

    /// Resume points of every code, from one chunked last-date query.
    fn resume_points(
        &self,
        warehouse: &Warehouse,
        codes: &[EntityCode],
        epoch: Date,
        as_of: Date,
    ) -> Result<BTreeMap<EntityCode, ResumePoint>, WarehouseError> {
        Ok(warehouse
            .last_dates_before(self.schema(), codes, as_of)?
            .into_iter()
            .map(|(code, last_stored)| {
                let resume = resume_date(last_stored, epoch);
                (code, ResumePoint { last_stored, resume })
            })
            .collect())
    }

    fn fetch_range(&self, args: &RangeArgs) -> Result<Self::Payload, FetchError>;

    /// Turn a payload into rows not yet stored.
    fn prepare(
        &self,
        code: &EntityCode,
        payload: Self::Payload,
        point: &ResumePoint,
    ) -> Result<Vec<SeriesRow>, RefreshError>;

    fn write(&self, warehouse: &Warehouse, rows: &[SeriesRow]) -> Result<usize, WarehouseError> {
        warehouse.write(self.schema(), rows)
    }
}

fn is_new(date: Date, point: &ResumePoint) -> bool {
    date >= point.resume && point.last_stored.map_or(true, |last| date > last)
}

/// Daily stock quotes. Suspended days are stored with the previous close.
pub struct StockDailyTask<F> {
    fetcher: F,
}

impl<F> StockDailyTask<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

impl<F> RefreshTask for StockDailyTask<F>
where
    F: SourceFetcher<Args = RangeArgs, Output = Vec<DailyBar>>,
{
    type Payload = Vec<DailyBar>;

    fn schema(&self) -> &'static TableSchema {
        &STOCK_DAILY
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Stock
    }

    fn operation(&self) -> &str {
        self.fetcher.name()
    }

    fn fetch_range(&self, args: &RangeArgs) -> Result<Self::Payload, FetchError> {
        self.fetcher.fetch(args)
    }

    fn prepare(
        &self,
        code: &EntityCode,
        payload: Self::Payload,
        point: &ResumePoint,
    ) -> Result<Vec<SeriesRow>, RefreshError> {
        let mut bars: Vec<DailyBar> = payload
            .into_iter()
            .filter(|bar| is_new(bar.date, point))
            .collect();
        fill_suspended_prices(&mut bars)?;
        Ok(bars.iter().map(|bar| bar.to_stock_row(code)).collect())
    }
}

pub struct IndexDailyTask<F> {
    fetcher: F,
}

impl<F> IndexDailyTask<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

impl<F> RefreshTask for IndexDailyTask<F>
where
    F: SourceFetcher<Args = RangeArgs, Output = Vec<DailyBar>>,
{
    type Payload = Vec<DailyBar>;

    fn schema(&self) -> &'static TableSchema {
        &INDEX_DAILY
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Index
    }

    fn operation(&self) -> &str {
        self.fetcher.name()
    }

    fn fetch_range(&self, args: &RangeArgs) -> Result<Self::Payload, FetchError> {
        self.fetcher.fetch(args)
    }

    fn prepare(
        &self,
        code: &EntityCode,
        payload: Self::Payload,
        point: &ResumePoint,
    ) -> Result<Vec<SeriesRow>, RefreshError> {
        Ok(payload
            .iter()
            .filter(|bar| is_new(bar.date, point))
            .map(|bar| bar.to_index_row(code))
            .collect())
    }
}

/// Dividends and share distributions. Raw events sharing an effective date
/// are merged before storage and events distributing nothing are dropped.
pub struct CorporateActionTask<F> {
    fetcher: F,
}

impl<F> CorporateActionTask<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }
}

impl<F> RefreshTask for CorporateActionTask<F>
where
    F: SourceFetcher<Args = RangeArgs, Output = Vec<CorporateAction>>,
{
    type Payload = Vec<CorporateAction>;

    fn schema(&self) -> &'static TableSchema {
        &ADJUSTMENTS
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Stock
    }

    fn operation(&self) -> &str {
        self.fetcher.name()
    }

    /// Events are announced ahead of their effective date, so the last
    /// stored event may lie after `as_of`. Such entities are still fetched
    /// and only events after the stored one are kept.
    fn resume_points(
        &self,
        warehouse: &Warehouse,
        codes: &[EntityCode],
        epoch: Date,
        as_of: Date,
    ) -> Result<BTreeMap<EntityCode, ResumePoint>, WarehouseError> {
        Ok(warehouse
            .last_dates(&ADJUSTMENTS, codes)?
            .into_iter()
            .map(|(code, last_stored)| {
                let resume = match last_stored {
                    Some(last) if last > as_of => as_of,
                    _ => resume_date(last_stored, epoch),
                };
                (code, ResumePoint { last_stored, resume })
            })
            .collect())
    }

    fn fetch_range(&self, args: &RangeArgs) -> Result<Self::Payload, FetchError> {
        self.fetcher.fetch(args)
    }

    fn prepare(
        &self,
        code: &EntityCode,
        payload: Self::Payload,
        point: &ResumePoint,
    ) -> Result<Vec<SeriesRow>, RefreshError> {
        Ok(merge_duplicate_effective_dates(&payload, point.last_stored)
            .iter()
            .filter(|event| !event.is_empty())
            .map(|event| event.to_row(code))
            .collect())
    }
}

/// One reporting period of a company's statements. `items` follow the
/// item columns of the finance report table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub period_end: Date,
    #[serde(default)]
    pub announcement_date: Option<Date>,
    pub items: Vec<Option<f64>>,
}

/// Quarterly statements. Refreshes resume at the quarter end after the last
/// stored report.
pub struct FinanceReportTask<F> {
    fetcher: F,
}

impl<F> FinanceReportTask<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    fn item_count() -> usize {
        FINANCE_REPORTS.width() - 1
    }

    fn to_rows(
        code: &EntityCode,
        periods: &[ReportPeriod],
        point: Option<&ResumePoint>,
    ) -> Result<Vec<SeriesRow>, RefreshError> {
        let mut rows = Vec::new();
        for period in periods {
            if point.is_some_and(|point| !is_new(period.period_end, point)) {
                continue;
            }
            if period.items.len() != Self::item_count() {
                return Err(RefreshError::SchemaMismatch {
                    code: code.to_string(),
                    expected: Self::item_count(),
                    actual: period.items.len(),
                });
            }

            let mut values = Vec::with_capacity(FINANCE_REPORTS.width());
            values.push(FieldValue::from(period.announcement_date));
            values.extend(period.items.iter().map(|item| FieldValue::from(*item)));
            rows.push(SeriesRow::new(code.clone(), period.period_end, values));
        }
        Ok(rows)
    }
}

impl<F> FinanceReportTask<F>
where
    F: SourceFetcher<Args = RangeArgs, Output = Vec<ReportPeriod>>,
{
    /// Replace already stored periods with restated figures.
    pub fn apply_correction(
        &self,
        warehouse: &Warehouse,
        code: &EntityCode,
        periods: &[ReportPeriod],
    ) -> Result<usize, RefreshError> {
        let rows = Self::to_rows(code, periods, None)?;
        let (Some(first), Some(last)) = (
            rows.iter().map(|row| row.date).min(),
            rows.iter().map(|row| row.date).max(),
        ) else {
            return Ok(0);
        };
        Ok(warehouse.replace(&FINANCE_REPORTS, code, first, last, &rows)?)
    }
}

impl<F> RefreshTask for FinanceReportTask<F>
where
    F: SourceFetcher<Args = RangeArgs, Output = Vec<ReportPeriod>>,
{
    type Payload = Vec<ReportPeriod>;

    fn schema(&self) -> &'static TableSchema {
        &FINANCE_REPORTS
    }

    fn kind(&self) -> InstrumentKind {
        InstrumentKind::Stock
    }

    fn operation(&self) -> &str {
        self.fetcher.name()
    }

    fn resume_points(
        &self,
        warehouse: &Warehouse,
        codes: &[EntityCode],
        epoch: Date,
        as_of: Date,
    ) -> Result<BTreeMap<EntityCode, ResumePoint>, WarehouseError> {
        Ok(warehouse
            .last_dates_before(&FINANCE_REPORTS, codes, as_of)?
            .into_iter()
            .map(|(code, last_stored)| {
                let resume = last_stored.map_or_else(|| quarter_end(epoch), next_quarter_end);
                (code, ResumePoint { last_stored, resume })
            })
            .collect())
    }

    fn fetch_range(&self, args: &RangeArgs) -> Result<Self::Payload, FetchError> {
        self.fetcher.fetch(args)
    }

    fn prepare(
        &self,
        code: &EntityCode,
        payload: Self::Payload,
        point: &ResumePoint,
    ) -> Result<Vec<SeriesRow>, RefreshError> {
        Self::to_rows(code, &payload, Some(point))
    }
}
