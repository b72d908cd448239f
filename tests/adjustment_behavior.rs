//! Behavior-driven tests for corporate actions and price adjustment
//!
//! These tests verify HOW raw exchange data is reconciled before storage
//! and how adjusted comparison series are derived from stored quotes.

use cswd_core::{
    adjusted_ohlc, adjusted_series, fill_suspended_prices, merge_duplicate_effective_dates,
    normalized_close, AdjustmentError, CoreError, CorporateAction, DailyBar, EntityCode, Ohlc,
    PriceField, Warehouse,
};
use cswd_warehouse::schema::STOCK_DAILY;
use time::macros::date;
use time::Date;

fn code() -> EntityCode {
    EntityCode::parse("000001").expect("valid code")
}

fn action(date: Date, amount: f64, ratio: f64, annual: &str, pay_date: Option<Date>) -> CorporateAction {
    CorporateAction {
        date,
        annual: Some(annual.to_string()),
        amount,
        ratio,
        record_date: None,
        pay_date,
        listing_date: None,
    }
}

fn bar(date: Date, open: f64, close: f64, prev_close: Option<f64>, change_pct: Option<f64>) -> DailyBar {
    DailyBar {
        date,
        short_name: Some(String::from("PAYH")),
        open,
        high: open.max(close),
        low: open.min(close),
        close,
        prev_close,
        change_pct,
        volume: Some(10_000),
        amount: None,
        turnover: None,
        total_market_value: None,
        circulating_market_value: None,
    }
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}

fn seeded(bars: &[DailyBar]) -> Warehouse {
    let warehouse = Warehouse::open_in_memory().expect("open");
    let rows: Vec<_> = bars.iter().map(|bar| bar.to_stock_row(&code())).collect();
    warehouse.write(&STOCK_DAILY, &rows).expect("write");
    warehouse
}

// =============================================================================
// Corporate Actions: Merging
// =============================================================================

#[test]
fn when_two_events_share_an_effective_date_they_become_one() {
    // Given: Two cash distributions taking effect on the same day
    let events = [
        action(date!(2016 - 06 - 16), 1.0, 0.0, "2015 interim", Some(date!(2016 - 06 - 15))),
        action(date!(2016 - 06 - 16), 0.5, 0.2, "2015 final", Some(date!(2016 - 06 - 17))),
    ];

    // When: Merging
    let merged = merge_duplicate_effective_dates(&events, None);

    // Then: Amounts are summed and the other fields come from the last event
    assert_eq!(merged.len(), 1);
    assert_close(merged[0].amount, 1.5);
    assert_close(merged[0].ratio, 0.2);
    assert_eq!(merged[0].annual.as_deref(), Some("2015 final"));
    assert_eq!(merged[0].pay_date, Some(date!(2016 - 06 - 17)));
}

#[test]
fn events_on_or_before_the_start_date_are_dropped() {
    let events = [action(date!(2014 - 04 - 30), 2.0, 1.5, "2013 final", None)];

    let from_epoch = merge_duplicate_effective_dates(&events, None);
    let from_may = merge_duplicate_effective_dates(&events, Some(date!(2014 - 05 - 01)));
    let from_same_day = merge_duplicate_effective_dates(&events, Some(date!(2014 - 04 - 30)));

    assert_eq!(from_epoch.len(), 1);
    assert!(from_may.is_empty());
    assert!(from_same_day.is_empty());
}

// =============================================================================
// Daily Quotes: Suspended Days
// =============================================================================

#[test]
fn when_close_is_zero_prices_take_the_previous_close() {
    // Given: A suspended day reported as zero prices
    let mut bars = [
        bar(date!(2024 - 01 - 04), 9.70, 9.80, Some(9.70), Some(1.03)),
        bar(date!(2024 - 01 - 05), 0.0, 0.0, Some(9.80), None),
    ];

    // When: Filling
    let filled = fill_suspended_prices(&mut bars).expect("fill");

    // Then: All four prices equal the previous close
    assert_eq!(filled, 1);
    let suspended = &bars[1];
    for price in [suspended.open, suspended.high, suspended.low, suspended.close] {
        assert_close(price, 9.80);
    }
    assert_close(bars[0].close, 9.80);
}

#[test]
fn suspended_day_without_previous_close_is_an_error() {
    let mut bars = [bar(date!(2024 - 01 - 05), 0.0, 0.0, None, None)];

    let error = fill_suspended_prices(&mut bars).expect_err("must fail");

    assert!(matches!(
        error,
        AdjustmentError::NoPreviousClose { date } if date == date!(2024 - 01 - 05)
    ));
}

// =============================================================================
// Adjustment: Percentage-Change Series
// =============================================================================

#[test]
fn flat_series_stays_at_its_price() {
    // Given: Three days at 12.5 with no change and no first-day change
    let raw = vec![
        Ohlc {
            open: 12.5,
            high: 12.5,
            low: 12.5,
            close: 12.5,
        };
        3
    ];
    let changes = vec![Some(f64::NAN), Some(0.0), Some(0.0)];

    // When: Adjusting with and without normalization
    let plain = adjusted_series(&raw, &changes, PriceField::Close, false).expect("plain");
    let normalized = adjusted_series(&raw, &changes, PriceField::Close, true).expect("normalized");

    // Then: The plain series stays at the price and the normalized one at 1.0
    assert!(plain.iter().all(|day| (day.close - 12.5).abs() < 1e-9));
    assert!(normalized.iter().all(|day| (day.close - 1.0).abs() < 1e-9));
}

#[test]
fn ex_dividend_gap_is_absorbed_by_the_reported_change() {
    // Given: A price drop on an ex-dividend day reported as zero change
    let bars = [
        bar(date!(2016 - 06 - 14), 10.0, 10.0, Some(10.0), None),
        bar(date!(2016 - 06 - 15), 10.0, 11.0, Some(10.0), Some(10.0)),
        bar(date!(2016 - 06 - 16), 9.5, 9.5, Some(11.0), Some(0.0)),
    ];
    let warehouse = seeded(&bars);

    // When: Reading the adjusted series over the window
    let adjusted = adjusted_ohlc(
        &warehouse,
        &code(),
        date!(2016 - 06 - 14),
        date!(2016 - 06 - 16),
        false,
    )
    .expect("adjusted");

    // Then: The series follows the compounded changes, not the raw gap
    assert_eq!(adjusted.len(), 3);
    assert_close(adjusted[0].close, 10.0);
    assert_close(adjusted[1].close, 11.0);
    assert_close(adjusted[2].close, 11.0);
    // And: Intraday shape is kept relative to the close
    assert_close(adjusted[1].open, 10.0);
}

#[test]
fn normalized_close_starts_at_one() {
    let bars = [
        bar(date!(2024 - 01 - 02), 20.0, 20.0, Some(20.0), Some(3.0)),
        bar(date!(2024 - 01 - 03), 20.0, 21.0, Some(20.0), Some(5.0)),
        bar(date!(2024 - 01 - 04), 21.0, 0.0, Some(21.0), None),
        bar(date!(2024 - 01 - 05), 21.0, 22.05, Some(21.0), Some(5.0)),
    ];
    let warehouse = seeded(&bars);

    let series = normalized_close(&warehouse, &code(), date!(2024 - 01 - 02), date!(2024 - 01 - 05))
        .expect("normalized");

    let values: Vec<f64> = series.iter().map(|(_, close)| *close).collect();
    assert_eq!(series[0].0, date!(2024 - 01 - 02));
    assert_close(values[0], 1.0);
    assert_close(values[1], 1.05);
    assert_close(values[2], 1.05);
    assert_close(values[3], 1.1025);
}

#[test]
fn window_anchor_moves_with_the_start_date() {
    let bars = [
        bar(date!(2024 - 01 - 02), 20.0, 20.0, None, None),
        bar(date!(2024 - 01 - 03), 21.0, 21.0, Some(20.0), Some(5.0)),
        bar(date!(2024 - 01 - 04), 22.05, 22.05, Some(21.0), Some(5.0)),
    ];
    let warehouse = seeded(&bars);

    let later = adjusted_ohlc(&warehouse, &code(), date!(2024 - 01 - 03), date!(2024 - 01 - 04), false)
        .expect("adjusted");

    assert_close(later[0].close, 21.0);
    assert_close(later[1].close, 22.05);
}

#[test]
fn empty_window_yields_no_bars() {
    let warehouse = seeded(&[bar(date!(2024 - 01 - 02), 20.0, 20.0, None, None)]);

    let adjusted = adjusted_ohlc(&warehouse, &code(), date!(2023 - 01 - 01), date!(2023 - 12 - 31), true)
        .expect("adjusted");

    assert!(adjusted.is_empty());
}

#[test]
fn stored_suspension_without_previous_close_surfaces_as_adjustment_error() {
    let warehouse = seeded(&[bar(date!(2024 - 01 - 02), 0.0, 0.0, None, None)]);

    let result = adjusted_ohlc(&warehouse, &code(), date!(2024 - 01 - 01), date!(2024 - 01 - 31), true);

    assert!(matches!(
        result,
        Err(CoreError::Adjustment(AdjustmentError::NoPreviousClose { .. }))
    ));
}

#[test]
fn mismatched_change_series_is_rejected() {
    let raw = [Ohlc {
        open: 1.0,
        high: 1.0,
        low: 1.0,
        close: 1.0,
    }];

    let error = adjusted_series(&raw, &[], PriceField::Close, true).expect_err("must fail");

    assert!(matches!(
        error,
        AdjustmentError::LengthMismatch {
            expected: 1,
            actual: 0
        }
    ));
}
