//! Long-to-wide reshaping of one numeric field onto a trading calendar.

use std::collections::{BTreeMap, HashSet};

use time::Date;

use crate::period::quarter_ends_between;
use crate::schema::TableSchema;
use crate::series::RowFilter;
use crate::{EntityCode, TradingCalendar, Warehouse, WarehouseError};

/// Date axis × entity matrix. Rows follow the calendar, columns the codes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Panel {
    dates: Vec<Date>,
    codes: Vec<EntityCode>,
    cells: Vec<Vec<Option<f64>>>,
}

impl Panel {
    pub fn dates(&self) -> &[Date] {
        &self.dates
    }

    pub fn codes(&self) -> &[EntityCode] {
        &self.codes
    }

    /// Number of rows (calendar dates).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn row(&self, date: Date) -> Option<&[Option<f64>]> {
        let index = self.dates.binary_search(&date).ok()?;
        Some(self.cells[index].as_slice())
    }

    pub fn value(&self, date: Date, code: &EntityCode) -> Option<f64> {
        let column = self.codes.iter().position(|candidate| candidate == code)?;
        self.row(date).and_then(|row| row[column])
    }

    pub fn column(&self, code: &EntityCode) -> Option<Vec<Option<f64>>> {
        let column = self.codes.iter().position(|candidate| candidate == code)?;
        Some(self.cells.iter().map(|row| row[column]).collect())
    }
}

impl Warehouse {
    /// Pivot `field` to one column per code on exactly the calendar's dates.
    /// Each cell holds the last non-null value stored at or before its date,
    /// so listing gaps and suspensions are forward-filled.
    ///
    /// With `codes = None` the columns are every code found in the table.
    pub fn pivot_column(
        &self,
        schema: &TableSchema,
        codes: Option<&[EntityCode]>,
        field: &str,
        calendar: &TradingCalendar,
    ) -> Result<Panel, WarehouseError> {
        let column = schema.numeric_column(field)?;
        let Some(last) = calendar.last() else {
            return Ok(empty_panel(codes));
        };

        let values = self.field_values(schema, column, codes, &RowFilter::Through(last))?;
        Ok(assemble(codes, values, calendar))
    }

    /// Pivot for quarterly data: only rows within a day of the quarter ends
    /// covering the calendar are read, then forward-filled onto every
    /// calendar date.
    pub fn period_aligned(
        &self,
        schema: &TableSchema,
        codes: Option<&[EntityCode]>,
        field: &str,
        calendar: &TradingCalendar,
    ) -> Result<Panel, WarehouseError> {
        let column = schema.numeric_column(field)?;
        let (Some(first), Some(last)) = (calendar.first(), calendar.last()) else {
            return Ok(empty_panel(codes));
        };

        let filter = RowFilter::Near {
            dates: quarter_ends_between(first, last),
            tolerance_days: 1,
        };
        let values = self.field_values(schema, column, codes, &filter)?;
        Ok(assemble(codes, values, calendar))
    }
}

fn requested_columns(codes: &[EntityCode]) -> Vec<EntityCode> {
    let mut seen = HashSet::new();
    codes
        .iter()
        .filter(|code| seen.insert(*code))
        .cloned()
        .collect()
}

fn empty_panel(codes: Option<&[EntityCode]>) -> Panel {
    Panel {
        codes: codes.map(requested_columns).unwrap_or_default(),
        ..Panel::default()
    }
}

fn assemble(
    codes: Option<&[EntityCode]>,
    values: Vec<(EntityCode, Date, Option<f64>)>,
    calendar: &TradingCalendar,
) -> Panel {
    let mut series: BTreeMap<EntityCode, Vec<(Date, f64)>> = BTreeMap::new();
    for (code, date, value) in values {
        let points = series.entry(code).or_default();
        if let Some(value) = value.filter(|value| !value.is_nan()) {
            points.push((date, value));
        }
    }
    for points in series.values_mut() {
        points.sort_by_key(|(date, _)| *date);
    }

    let columns = match codes {
        Some(codes) => requested_columns(codes),
        None => series.keys().cloned().collect(),
    };

    let mut cursors = vec![0_usize; columns.len()];
    let mut cells = Vec::with_capacity(calendar.len());
    for day in calendar.days() {
        let row = columns
            .iter()
            .zip(cursors.iter_mut())
            .map(|(code, cursor)| {
                let points = series.get(code)?;
                while *cursor < points.len() && points[*cursor].0 <= *day {
                    *cursor += 1;
                }
                cursor.checked_sub(1).map(|index| points[index].1)
            })
            .collect();
        cells.push(row);
    }

    Panel {
        dates: calendar.days().to_vec(),
        codes: columns,
        cells,
    }
}
