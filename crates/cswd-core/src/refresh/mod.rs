//! Incremental refresh of the keyed tables from remote sources.

pub mod state;
pub mod tasks;

use std::collections::BTreeMap;
use std::time::Duration;

use cswd_warehouse::{
    EntityCode, ListingStatus, RefreshOutcome, RefreshRecord, Warehouse,
};
use time::{Date, UtcOffset};

pub use state::RefreshState;
pub use tasks::{
    CorporateActionTask, FinanceReportTask, IndexDailyTask, RangeArgs, RefreshTask, ReportPeriod,
    ResumePoint, StockDailyTask,
};

use crate::cache::{Clock, FetchCache, SystemClock};
use crate::error::RefreshError;
use crate::settings::Settings;
use crate::source::CalendarSource;
use crate::throttling::Throttle;

/// Counts of one batch plus the state of every entity it visited, before
/// and after the batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub table: String,
    pub last_trading_date: Option<Date>,
    pub appended: usize,
    pub rows: usize,
    pub empty: usize,
    pub skipped: usize,
    pub failed: usize,
    pub previous: BTreeMap<EntityCode, RefreshState>,
    pub states: BTreeMap<EntityCode, RefreshState>,
}

impl RefreshReport {
    pub fn state(&self, code: &EntityCode) -> Option<RefreshState> {
        self.states.get(code).copied()
    }

    /// State derived from stored data when the batch started.
    pub fn previous_state(&self, code: &EntityCode) -> Option<RefreshState> {
        self.previous.get(code).copied()
    }
}

/// Runs a refresh task over a list of entities, one at a time, in code
/// order. Failures stay with their entity; only storage failures end the
/// batch early.
pub struct RefreshDriver<'a, C: Clock = SystemClock> {
    warehouse: &'a Warehouse,
    cache: &'a FetchCache<C>,
    throttle: Throttle,
    sleeper: Box<dyn FnMut(Duration) + 'a>,
    epoch: Date,
    offset: UtcOffset,
}

impl<'a, C: Clock> RefreshDriver<'a, C> {
    pub fn new(warehouse: &'a Warehouse, cache: &'a FetchCache<C>, settings: &Settings) -> Self {
        Self {
            warehouse,
            cache,
            throttle: Throttle::new(&settings.throttle),
            sleeper: Box::new(std::thread::sleep),
            epoch: settings.market_epoch,
            offset: settings.freshness.offset,
        }
    }

    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Replace the real sleep taken when the throttle asks for a pause.
    pub fn with_sleeper(mut self, sleeper: impl FnMut(Duration) + 'a) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Refresh every registered instrument of the task's kind, optionally
    /// only those with the given listing status.
    pub fn refresh<T: RefreshTask>(
        &mut self,
        task: &T,
        status: Option<ListingStatus>,
    ) -> Result<RefreshReport, RefreshError> {
        let codes = self.warehouse.codes(task.kind(), status)?;
        self.refresh_codes(task, &codes)
    }

    pub fn refresh_codes<T: RefreshTask>(
        &mut self,
        task: &T,
        codes: &[EntityCode],
    ) -> Result<RefreshReport, RefreshError> {
        let table = task.schema().name;
        let today = self.cache.clock().now().to_offset(self.offset).date();
        let last_trading = match self.warehouse.last_trading_date(today)? {
            Some(day) => day,
            None => {
                tracing::warn!(table, %today, "no trading calendar stored, using today");
                today
            }
        };

        let mut report = RefreshReport {
            table: table.to_string(),
            last_trading_date: Some(last_trading),
            ..RefreshReport::default()
        };
        let points = task.resume_points(self.warehouse, codes, self.epoch, last_trading)?;
        tracing::info!(table, entities = points.len(), last_trading = %last_trading, "refresh started");

        for (code, point) in &points {
            report
                .previous
                .insert(code.clone(), RefreshState::classify(point.last_stored, last_trading));

            if point.resume > last_trading {
                report.skipped += 1;
                report.states.insert(code.clone(), RefreshState::UpToDate);
                tracing::debug!(table, code = %code, resume = %point.resume, "up to date, skipped");
                self.warehouse.log_refresh(&record(table, code, RefreshOutcome::Skipped, 0, None, None))?;
                continue;
            }

            let (outcome, rows, message) = match self.refresh_one(task, code, point, last_trading) {
                Ok(0) => {
                    report.empty += 1;
                    tracing::info!(table, code = %code, start = %point.resume, end = %last_trading, "nothing to append");
                    (RefreshOutcome::Empty, 0, None)
                }
                Ok(rows) => {
                    report.appended += 1;
                    report.rows += rows;
                    tracing::info!(table, code = %code, rows, start = %point.resume, end = %last_trading, "rows appended");
                    (RefreshOutcome::Appended, rows, None)
                }
                Err(error) if error.is_fatal() => {
                    tracing::error!(table, code = %code, %error, "refresh aborted");
                    return Err(error);
                }
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(table, code = %code, %error, "refresh failed, retried next batch");
                    (RefreshOutcome::Failed, 0, Some(error.to_string()))
                }
            };

            let next = if outcome == RefreshOutcome::Failed {
                RefreshState::Failed
            } else {
                RefreshState::UpToDate
            };
            report.states.insert(code.clone(), next);

            let mut entry = record(table, code, outcome, rows, Some(point.resume), Some(last_trading));
            entry.message = message;
            self.warehouse.log_refresh(&entry)?;
        }

        tracing::info!(
            table,
            appended = report.appended,
            rows = report.rows,
            empty = report.empty,
            skipped = report.skipped,
            failed = report.failed,
            "refresh finished"
        );
        Ok(report)
    }

    fn refresh_one<T: RefreshTask>(
        &mut self,
        task: &T,
        code: &EntityCode,
        point: &ResumePoint,
        last_trading: Date,
    ) -> Result<usize, RefreshError> {
        let args = RangeArgs {
            code: code.clone(),
            start: point.resume,
            end: last_trading,
        };
        let cache = self.cache;
        let payload = cache.read(task.operation(), &args, |args| {
            self.pace();
            task.fetch_range(args)
        })?;

        let rows = task.prepare(code, payload, point)?;
        if rows.is_empty() {
            return Ok(0);
        }
        Ok(task.write(self.warehouse, &rows)?)
    }

    fn pace(&mut self) {
        if let Err(pause) = self.throttle.acquire() {
            tracing::debug!(pause_ms = pause.as_millis() as u64, "pausing before next fetch");
            (self.sleeper)(pause);
        }
    }
}

fn record(
    table: &str,
    code: &EntityCode,
    outcome: RefreshOutcome,
    rows: usize,
    start: Option<Date>,
    end: Option<Date>,
) -> RefreshRecord {
    RefreshRecord {
        table: table.to_string(),
        code: Some(code.clone()),
        outcome,
        rows,
        start,
        end,
        message: None,
    }
}
