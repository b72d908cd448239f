//! Corporate-action reconciliation and percentage-change price adjustment.
//!
//! The adjusted series produced here is a relative comparison series driven
//! only by the reported day-over-day percentage change. It is not a
//! dividend- or split-restated price.

use std::collections::BTreeMap;

use cswd_warehouse::schema::{ADJUSTMENTS, INDEX_DAILY, STOCK_DAILY};
use cswd_warehouse::{EntityCode, FieldValue, SeriesRow};
use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::AdjustmentError;
use crate::settings::MARKET_EPOCH;

/// One day of raw trading data as reported by the exchange feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: Date,
    #[serde(default)]
    pub short_name: Option<String>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub prev_close: Option<f64>,
    #[serde(default)]
    pub change_pct: Option<f64>,
    #[serde(default)]
    pub volume: Option<i64>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub turnover: Option<f64>,
    #[serde(default)]
    pub total_market_value: Option<f64>,
    #[serde(default)]
    pub circulating_market_value: Option<f64>,
}

impl DailyBar {
    pub fn ohlc(&self) -> Ohlc {
        Ohlc {
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
        }
    }

    pub fn to_stock_row(&self, code: &EntityCode) -> SeriesRow {
        SeriesRow::new(
            code.clone(),
            self.date,
            vec![
                self.short_name.clone().into(),
                self.open.into(),
                self.high.into(),
                self.low.into(),
                self.close.into(),
                self.prev_close.into(),
                self.change_pct.into(),
                self.volume.into(),
                self.amount.into(),
                self.turnover.into(),
                self.total_market_value.into(),
                self.circulating_market_value.into(),
            ],
        )
    }

    pub fn to_index_row(&self, code: &EntityCode) -> SeriesRow {
        SeriesRow::new(
            code.clone(),
            self.date,
            vec![
                self.open.into(),
                self.high.into(),
                self.low.into(),
                self.close.into(),
                self.volume.into(),
                self.amount.into(),
                self.change_pct.into(),
            ],
        )
    }

    /// Rebuild a bar from a `stock_daily` row. Missing prices read as zero,
    /// the feed's own placeholder for a day without trading.
    pub fn from_stock_row(row: &SeriesRow) -> Self {
        let number = |field| row.number(&STOCK_DAILY, field);
        Self {
            date: row.date,
            short_name: row
                .get(&STOCK_DAILY, "short_name")
                .and_then(FieldValue::as_text)
                .map(str::to_string),
            open: number("open").unwrap_or(0.0),
            high: number("high").unwrap_or(0.0),
            low: number("low").unwrap_or(0.0),
            close: number("close").unwrap_or(0.0),
            prev_close: number("prev_close"),
            change_pct: number("change_pct"),
            volume: match row.get(&STOCK_DAILY, "volume") {
                Some(FieldValue::Integer(volume)) => Some(*volume),
                _ => None,
            },
            amount: number("amount"),
            turnover: number("turnover"),
            total_market_value: number("tmv"),
            circulating_market_value: number("cmv"),
        }
    }

    pub fn from_index_row(row: &SeriesRow) -> Self {
        let number = |field| row.number(&INDEX_DAILY, field);
        Self {
            date: row.date,
            short_name: None,
            open: number("open").unwrap_or(0.0),
            high: number("high").unwrap_or(0.0),
            low: number("low").unwrap_or(0.0),
            close: number("close").unwrap_or(0.0),
            prev_close: None,
            change_pct: number("change_pct"),
            volume: match row.get(&INDEX_DAILY, "volume") {
                Some(FieldValue::Integer(volume)) => Some(*volume),
                _ => None,
            },
            amount: number("amount"),
            turnover: None,
            total_market_value: None,
            circulating_market_value: None,
        }
    }
}

/// A dividend or share distribution taking effect on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateAction {
    pub date: Date,
    #[serde(default)]
    pub annual: Option<String>,
    /// Cash per share.
    pub amount: f64,
    /// Shares distributed per share held.
    pub ratio: f64,
    #[serde(default)]
    pub record_date: Option<Date>,
    #[serde(default)]
    pub pay_date: Option<Date>,
    #[serde(default)]
    pub listing_date: Option<Date>,
}

impl CorporateAction {
    /// Neither cash nor shares are distributed.
    pub fn is_empty(&self) -> bool {
        self.amount == 0.0 && self.ratio == 0.0
    }

    pub fn to_row(&self, code: &EntityCode) -> SeriesRow {
        SeriesRow::new(
            code.clone(),
            self.date,
            vec![
                self.annual.clone().into(),
                self.amount.into(),
                self.ratio.into(),
                self.record_date.into(),
                self.pay_date.into(),
                self.listing_date.into(),
            ],
        )
    }

    pub fn from_row(row: &SeriesRow) -> Self {
        let date = |field| row.get(&ADJUSTMENTS, field).and_then(FieldValue::as_date);
        Self {
            date: row.date,
            annual: row
                .get(&ADJUSTMENTS, "annual")
                .and_then(FieldValue::as_text)
                .map(str::to_string),
            amount: row.number(&ADJUSTMENTS, "amount").unwrap_or(0.0),
            ratio: row.number(&ADJUSTMENTS, "ratio").unwrap_or(0.0),
            record_date: date("record_date"),
            pay_date: date("pay_date"),
            listing_date: date("listing_date"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ohlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Ohlc {
    pub fn get(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
        }
    }

    fn map(self, mut adjust: impl FnMut(f64) -> f64) -> Self {
        Self {
            open: adjust(self.open),
            high: adjust(self.high),
            low: adjust(self.low),
            close: adjust(self.close),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceField {
    Open,
    High,
    Low,
    #[default]
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdjustedBar {
    pub date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Keep events after `start` (the market epoch when `None`) and collapse
/// events sharing an effective date into one: numeric fields are summed,
/// the other fields come from the last event of the group. Output is
/// ordered by date.
pub fn merge_duplicate_effective_dates(
    events: &[CorporateAction],
    start: Option<Date>,
) -> Vec<CorporateAction> {
    let start = start.unwrap_or(MARKET_EPOCH);
    let mut merged: BTreeMap<Date, CorporateAction> = BTreeMap::new();

    for event in events.iter().filter(|event| event.date > start) {
        match merged.get_mut(&event.date) {
            Some(existing) => {
                let amount = existing.amount + event.amount;
                let ratio = existing.ratio + event.ratio;
                *existing = CorporateAction {
                    amount,
                    ratio,
                    ..event.clone()
                };
            }
            None => {
                merged.insert(event.date, event.clone());
            }
        }
    }

    merged.into_values().collect()
}

/// Replace the zero-price placeholder of suspended days with the previous
/// close. Only a zero close marks a suspended day.
pub fn fill_suspended_prices(bars: &mut [DailyBar]) -> Result<usize, AdjustmentError> {
    let mut filled = 0;
    for bar in bars.iter_mut().filter(|bar| bar.close == 0.0) {
        let prev_close = bar
            .prev_close
            .filter(|price| !price.is_nan())
            .ok_or(AdjustmentError::NoPreviousClose { date: bar.date })?;
        bar.open = prev_close;
        bar.high = prev_close;
        bar.low = prev_close;
        bar.close = prev_close;
        filled += 1;
    }
    Ok(filled)
}

/// Chain percentage changes into a cumulative factor `f` and rescale every
/// price field by it relative to the `base` field of the same day:
/// `f[t] * raw[p][t] / raw[base][t]`. With `normalize` the base field starts
/// at 1.0; without it the result is multiplied by the first raw base price.
///
/// The first change is ignored and missing changes count as zero.
pub fn adjusted_series(
    raw: &[Ohlc],
    pct_change: &[Option<f64>],
    base: PriceField,
    normalize: bool,
) -> Result<Vec<Ohlc>, AdjustmentError> {
    let Some(first) = raw.first() else {
        return Err(AdjustmentError::Empty);
    };
    if pct_change.len() != raw.len() {
        return Err(AdjustmentError::LengthMismatch {
            expected: raw.len(),
            actual: pct_change.len(),
        });
    }

    let scale = if normalize { 1.0 } else { first.get(base) };
    let mut factor = 1.0;
    let mut adjusted = Vec::with_capacity(raw.len());

    for (index, (prices, change)) in raw.iter().zip(pct_change).enumerate() {
        let change = match change {
            Some(change) if index > 0 && !change.is_nan() => *change,
            _ => 0.0,
        };
        factor *= 1.0 + change / 100.0;

        let base_price = prices.get(base);
        if base_price == 0.0 {
            return Err(AdjustmentError::ZeroBase { index });
        }
        adjusted.push(prices.map(|price| factor * price / base_price * scale));
    }

    Ok(adjusted)
}

/// `adjusted_series` over bars, using each bar's own percentage change.
pub fn adjusted_bars(
    bars: &[DailyBar],
    base: PriceField,
    normalize: bool,
) -> Result<Vec<AdjustedBar>, AdjustmentError> {
    let raw: Vec<Ohlc> = bars.iter().map(DailyBar::ohlc).collect();
    let changes: Vec<Option<f64>> = bars.iter().map(|bar| bar.change_pct).collect();
    let adjusted = adjusted_series(&raw, &changes, base, normalize)?;

    Ok(bars
        .iter()
        .zip(adjusted)
        .map(|(bar, prices)| AdjustedBar {
            date: bar.date,
            open: prices.open,
            high: prices.high,
            low: prices.low,
            close: prices.close,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::date;

    fn bar(date: Date, close: f64, prev_close: Option<f64>, change_pct: Option<f64>) -> DailyBar {
        DailyBar {
            date,
            short_name: None,
            open: close,
            high: close,
            low: close,
            close,
            prev_close,
            change_pct,
            volume: None,
            amount: None,
            turnover: None,
            total_market_value: None,
            circulating_market_value: None,
        }
    }

    fn action(date: Date, amount: f64, ratio: f64, annual: &str) -> CorporateAction {
        CorporateAction {
            date,
            annual: Some(annual.to_string()),
            amount,
            ratio,
            record_date: None,
            pay_date: None,
            listing_date: None,
        }
    }

    #[test]
    fn merges_events_sharing_a_date() {
        let merged = merge_duplicate_effective_dates(
            &[
                action(date!(2016 - 06 - 16), 1.0, 0.0, "2015 interim"),
                action(date!(2016 - 06 - 16), 0.5, 0.3, "2015 final"),
            ],
            None,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].amount, 1.5);
        assert_eq!(merged[0].ratio, 0.3);
        assert_eq!(merged[0].annual.as_deref(), Some("2015 final"));
    }

    #[test]
    fn merge_filters_strictly_after_start_and_sorts() {
        let events = [
            action(date!(2015 - 07 - 01), 0.2, 0.0, "b"),
            action(date!(2014 - 04 - 30), 2.0, 1.5, "a"),
        ];
        let all = merge_duplicate_effective_dates(&events, None);
        assert_eq!(
            all.iter().map(|event| event.date).collect::<Vec<_>>(),
            vec![date!(2014 - 04 - 30), date!(2015 - 07 - 01)]
        );

        let later = merge_duplicate_effective_dates(&events, Some(date!(2014 - 04 - 30)));
        assert_eq!(later.len(), 1);
        assert_eq!(later[0].date, date!(2015 - 07 - 01));
    }

    #[test]
    fn fills_zero_close_from_previous_close() {
        let mut bars = vec![
            bar(date!(2024 - 01 - 02), 10.0, Some(9.9), Some(1.0)),
            bar(date!(2024 - 01 - 03), 0.0, Some(9.80), None),
        ];
        assert_eq!(fill_suspended_prices(&mut bars).expect("fill"), 1);
        assert_eq!(bars[0].close, 10.0);
        assert_eq!(bars[1].ohlc(), Ohlc { open: 9.80, high: 9.80, low: 9.80, close: 9.80 });
    }

    #[test]
    fn zero_close_without_previous_close_is_an_error() {
        let mut bars = vec![bar(date!(2024 - 01 - 03), 0.0, None, None)];
        assert_eq!(
            fill_suspended_prices(&mut bars),
            Err(AdjustmentError::NoPreviousClose {
                date: date!(2024 - 01 - 03)
            })
        );
    }

    #[test]
    fn compounds_percentage_changes() {
        let raw = vec![
            Ohlc { open: 10.0, high: 10.0, low: 10.0, close: 10.0 },
            Ohlc { open: 5.0, high: 6.0, low: 5.0, close: 5.5 },
            Ohlc { open: 5.5, high: 5.5, low: 5.5, close: 5.5 },
        ];
        let changes = [Some(3.0), Some(10.0), Some(-50.0)];

        let normalized = adjusted_series(&raw, &changes, PriceField::Close, true).expect("adjust");
        assert_eq!(normalized[0].close, 1.0);
        assert!((normalized[1].close - 1.1).abs() < 1e-12);
        assert!((normalized[2].close - 0.55).abs() < 1e-12);
        assert!((normalized[1].high - 1.1 * 6.0 / 5.5).abs() < 1e-12);

        let scaled = adjusted_series(&raw, &changes, PriceField::Close, false).expect("adjust");
        assert_eq!(scaled[0].close, 10.0);
        assert!((scaled[1].close - 11.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            adjusted_series(&[], &[], PriceField::Close, true),
            Err(AdjustmentError::Empty)
        );
        let raw = [Ohlc { open: 1.0, high: 1.0, low: 1.0, close: 1.0 }];
        assert_eq!(
            adjusted_series(&raw, &[None, None], PriceField::Close, true),
            Err(AdjustmentError::LengthMismatch { expected: 1, actual: 2 })
        );
        let zero = [Ohlc { open: 1.0, high: 1.0, low: 1.0, close: 0.0 }];
        assert_eq!(
            adjusted_series(&zero, &[None], PriceField::Close, true),
            Err(AdjustmentError::ZeroBase { index: 0 })
        );
    }

    #[test]
    fn row_conversions_keep_fields() {
        let code = EntityCode::parse("600000").expect("code");
        let mut original = bar(date!(2024 - 01 - 02), 10.0, Some(9.9), Some(1.01));
        original.volume = Some(12_000);
        original.short_name = Some(String::from("PFYH"));
        assert_eq!(DailyBar::from_stock_row(&original.to_stock_row(&code)), original);

        let event = action(date!(2016 - 06 - 16), 1.5, 0.3, "2015");
        assert_eq!(CorporateAction::from_row(&event.to_row(&code)), event);
    }

    proptest! {
        #[test]
        fn normalized_base_starts_at_one(
            closes in proptest::collection::vec(0.5_f64..500.0, 1..40),
            changes in proptest::collection::vec(proptest::option::of(-10.0_f64..10.0), 40),
        ) {
            let raw: Vec<Ohlc> = closes
                .iter()
                .map(|close| Ohlc { open: *close, high: *close, low: *close, close: *close })
                .collect();
            let adjusted = adjusted_series(&raw, &changes[..raw.len()], PriceField::Close, true)
                .expect("adjust");
            prop_assert_eq!(adjusted.len(), raw.len());
            prop_assert_eq!(adjusted[0].close, 1.0);
        }

        #[test]
        fn flat_changes_keep_a_constant_close(close in 0.5_f64..500.0, days in 1_usize..30) {
            let raw = vec![Ohlc { open: close, high: close, low: close, close }; days];
            let mut changes = vec![Some(0.0); days];
            changes[0] = Some(f64::NAN);

            let scaled = adjusted_series(&raw, &changes, PriceField::Close, false).expect("adjust");
            for prices in &scaled {
                prop_assert!((prices.close - close).abs() < 1e-9);
            }
            let normalized = adjusted_series(&raw, &changes, PriceField::Close, true).expect("adjust");
            for prices in &normalized {
                prop_assert_eq!(prices.close, 1.0);
            }
        }
    }
}
