use cswd_warehouse::schema::STOCK_DAILY;
use cswd_warehouse::{EntityCode, Warehouse};
use time::Date;

use crate::adjustment::{adjusted_bars, fill_suspended_prices, AdjustedBar, DailyBar, PriceField};
use crate::error::CoreError;

/// Stored daily bars of one stock in `[start, end]`, with suspended days
/// filled from the previous close.
pub fn daily_bars(
    warehouse: &Warehouse,
    code: &EntityCode,
    start: Date,
    end: Date,
) -> Result<Vec<DailyBar>, CoreError> {
    let rows = warehouse.query_window(&STOCK_DAILY, code, start, end)?;
    let mut bars: Vec<DailyBar> = rows.iter().map(DailyBar::from_stock_row).collect();
    fill_suspended_prices(&mut bars)?;
    Ok(bars)
}

/// Percentage-change adjusted OHLC over the window. The first day of the
/// window anchors the series; an empty window yields no bars.
pub fn adjusted_ohlc(
    warehouse: &Warehouse,
    code: &EntityCode,
    start: Date,
    end: Date,
    normalize: bool,
) -> Result<Vec<AdjustedBar>, CoreError> {
    let bars = daily_bars(warehouse, code, start, end)?;
    if bars.is_empty() {
        return Ok(Vec::new());
    }
    Ok(adjusted_bars(&bars, PriceField::Close, normalize)?)
}

/// Closing price relative to the first day of the window (which is 1.0).
pub fn normalized_close(
    warehouse: &Warehouse,
    code: &EntityCode,
    start: Date,
    end: Date,
) -> Result<Vec<(Date, f64)>, CoreError> {
    Ok(adjusted_ohlc(warehouse, code, start, end, true)?
        .into_iter()
        .map(|bar| (bar.date, bar.close))
        .collect())
}
