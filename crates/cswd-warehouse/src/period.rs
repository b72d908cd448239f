//! Calendar-quarter arithmetic for periodically reported data.

use time::{Date, Month};

fn first_of_month(year: i32, month: u8) -> Date {
    Month::try_from(month)
        .ok()
        .and_then(|month| Date::from_calendar_date(year, month, 1).ok())
        .unwrap_or(Date::MAX)
}

fn quarter_index(date: Date) -> u8 {
    (u8::from(date.month()) - 1) / 3
}

fn day_before(date: Date) -> Date {
    date.previous_day().unwrap_or(Date::MIN)
}

pub fn quarter_start(date: Date) -> Date {
    first_of_month(date.year(), quarter_index(date) * 3 + 1)
}

pub fn quarter_end(date: Date) -> Date {
    let next_start = match quarter_index(date) {
        3 => first_of_month(date.year() + 1, 1),
        q => first_of_month(date.year(), q * 3 + 4),
    };
    day_before(next_start)
}

/// First quarter end strictly after `date`.
pub fn next_quarter_end(date: Date) -> Date {
    let end = quarter_end(date);
    if end > date {
        end
    } else {
        date.next_day().map_or(end, quarter_end)
    }
}

/// Last quarter end strictly before `date`.
pub fn previous_quarter_end(date: Date) -> Date {
    day_before(quarter_start(date))
}

/// Quarter ends falling inside `[first, last]`. A window too narrow to
/// contain one steps back to the quarter end preceding `first`.
pub fn quarter_ends_between(first: Date, last: Date) -> Vec<Date> {
    let mut ends = Vec::new();
    let mut end = quarter_end(first);
    while end <= last {
        ends.push(end);
        match end.next_day() {
            Some(next) => end = quarter_end(next),
            None => break,
        }
    }

    if ends.is_empty() {
        ends.push(previous_quarter_end(first));
    }
    ends
}
