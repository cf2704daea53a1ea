use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Next weekday after `date`. Exchange holidays are not modelled.
pub fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let step = match date.weekday() {
        Weekday::Fri => 3,
        Weekday::Sat => 2,
        _ => 1,
    };
    date.checked_add_days(Days::new(step)).unwrap_or(date)
}
