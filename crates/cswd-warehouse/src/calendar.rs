use ::duckdb::params_from_iter;
use ::duckdb::types::Value as DuckValue;
use time::Date;

use crate::{parse_iso_date, Warehouse, WarehouseError};

/// Sorted, deduplicated trading dates used as the date axis of panels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradingCalendar {
    days: Vec<Date>,
}

impl TradingCalendar {
    pub fn new(days: impl IntoIterator<Item = Date>) -> Self {
        let mut days: Vec<Date> = days.into_iter().collect();
        days.sort_unstable();
        days.dedup();
        Self { days }
    }

    pub fn days(&self) -> &[Date] {
        &self.days
    }

    pub fn first(&self) -> Option<Date> {
        self.days.first().copied()
    }

    pub fn last(&self) -> Option<Date> {
        self.days.last().copied()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn contains(&self, day: Date) -> bool {
        self.days.binary_search(&day).is_ok()
    }

    pub fn between(&self, start: Date, end: Date) -> Self {
        Self {
            days: self
                .days
                .iter()
                .copied()
                .filter(|day| *day >= start && *day <= end)
                .collect(),
        }
    }

    pub fn last_on_or_before(&self, day: Date) -> Option<Date> {
        let upper = self.days.partition_point(|candidate| *candidate <= day);
        upper.checked_sub(1).map(|index| self.days[index])
    }
}

impl Warehouse {
    /// Store calendar flags. The calendar only grows forward: days before the
    /// last stored day are ignored, while the last stored day and anything
    /// after it are (re)stamped.
    pub fn append_calendar(&self, entries: &[(Date, bool)]) -> Result<usize, WarehouseError> {
        let stored_last = self.stored_calendar_end()?;
        let mut fresh: Vec<(Date, bool)> = entries
            .iter()
            .copied()
            .filter(|(day, _)| stored_last.map_or(true, |last| *day >= last))
            .collect();
        fresh.sort_by_key(|(day, _)| *day);
        fresh.dedup_by_key(|(day, _)| *day);

        let ignored = entries.len() - fresh.len();
        if ignored > 0 {
            tracing::debug!(ignored, "calendar entries before the stored end ignored");
        }
        if fresh.is_empty() {
            return Ok(0);
        }

        let written = self.transaction(|connection| {
            let mut statement = connection.prepare(
                "INSERT OR REPLACE INTO trading_calendar (date, is_trading, last_updated) \
                 VALUES (CAST(? AS DATE), ?, CURRENT_TIMESTAMP)",
            )?;
            for (day, is_trading) in &fresh {
                let params = [DuckValue::Text(day.to_string()), DuckValue::Boolean(*is_trading)];
                statement.execute(params_from_iter(params.iter()))?;
            }
            Ok(fresh.len())
        })?;
        tracing::info!(rows = written, "trading calendar appended");
        Ok(written)
    }

    /// Trading days inside `[start, end]`.
    pub fn trading_calendar(&self, start: Date, end: Date) -> Result<TradingCalendar, WarehouseError> {
        let mut statement = self.connection().prepare(
            "SELECT CAST(date AS VARCHAR) FROM trading_calendar \
             WHERE is_trading AND date BETWEEN CAST(? AS DATE) AND CAST(? AS DATE) ORDER BY date",
        )?;
        let mut rows = statement.query([start.to_string(), end.to_string()])?;
        let mut days = Vec::new();
        while let Some(row) = rows.next()? {
            days.push(parse_iso_date("trading_calendar", "date", &row.get::<_, String>(0)?)?);
        }
        Ok(TradingCalendar { days })
    }

    pub fn last_trading_date_on_or_before(&self, day: Date) -> Result<Option<Date>, WarehouseError> {
        self.calendar_bound(
            "SELECT CAST(MAX(date) AS VARCHAR) FROM trading_calendar \
             WHERE is_trading AND date <= CAST(? AS DATE)",
            day,
        )
    }

    /// Trading day strictly before `day`.
    pub fn previous_trading_date(&self, day: Date) -> Result<Option<Date>, WarehouseError> {
        self.calendar_bound(
            "SELECT CAST(MAX(date) AS VARCHAR) FROM trading_calendar \
             WHERE is_trading AND date < CAST(? AS DATE)",
            day,
        )
    }

    fn stored_calendar_end(&self) -> Result<Option<Date>, WarehouseError> {
        let raw: Option<String> = self.connection().query_row(
            "SELECT CAST(MAX(date) AS VARCHAR) FROM trading_calendar",
            [],
            |row| row.get(0),
        )?;
        raw.map(|raw| parse_iso_date("trading_calendar", "date", &raw))
            .transpose()
    }

    fn calendar_bound(&self, sql: &str, day: Date) -> Result<Option<Date>, WarehouseError> {
        let raw: Option<String> = self
            .connection()
            .query_row(sql, [day.to_string()], |row| row.get(0))?;
        raw.map(|raw| parse_iso_date("trading_calendar", "date", &raw))
            .transpose()
    }
}
