use crate::error::{AnalyticsError, Result};
use chrono::{Datelike, Month, Months, NaiveDate};

/// First day of the calendar month containing `date`.
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn next_month_start(date: NaiveDate) -> Option<NaiveDate> {
    month_start(date).checked_add_months(Months::new(1))
}

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.checked_add_months(Months::new(1)))
        .and_then(|d| d.pred_opt())
}

/// Every month start from the month of `start` through the month of `end`, inclusive.
/// Empty when `end` falls in an earlier month than `start`.
pub fn month_starts_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let last = month_start(end);

    let mut current = Some(month_start(start));
    while let Some(date) = current {
        if date > last {
            break;
        }
        dates.push(date);
        current = next_month_start(date);
    }

    dates
}

/// English month name for a 1-based month number ("January" for 1).
pub fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
        .unwrap_or("Unknown")
}

/// Parses a period string in the format "YYYY-MM" or "YYYY-MM:YYYY-MM"
/// Returns (start_date, end_date) covering the whole first and last month.
pub fn parse_period_string(period: &str) -> Result<(NaiveDate, NaiveDate)> {
    let parts: Vec<&str> = period.split(':').collect();

    let (first, last) = match parts.as_slice() {
        [single] => (*single, *single),
        [first, last] => (*first, *last),
        _ => {
            return Err(AnalyticsError::DateError(format!(
                "Invalid period format: {}. Expected 'YYYY-MM' or 'YYYY-MM:YYYY-MM'",
                period
            )))
        }
    };

    let start_date = parse_year_month(first)?;
    let end_ref = parse_year_month(last)?;
    let end_date = last_day_of_month(end_ref.year(), end_ref.month()).ok_or_else(|| {
        AnalyticsError::DateError(format!("Cannot resolve end of month for {}", last))
    })?;

    if end_date < start_date {
        return Err(AnalyticsError::DateError(format!(
            "Period '{}' ends before it starts",
            period
        )));
    }

    Ok((start_date, end_date))
}

fn parse_year_month(value: &str) -> Result<NaiveDate> {
    let candidate = format!("{}-01", value.trim());
    NaiveDate::parse_from_str(&candidate, "%Y-%m-%d").map_err(|_| {
        AnalyticsError::DateError(format!(
            "Invalid date format in period: {}. Expected YYYY-MM",
            value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_month_start() {
        let date = NaiveDate::from_ymd_opt(2023, 1, 31).unwrap();
        assert_eq!(
            next_month_start(date),
            NaiveDate::from_ymd_opt(2023, 2, 1)
        );

        let date = NaiveDate::from_ymd_opt(2023, 12, 15).unwrap();
        assert_eq!(
            next_month_start(date),
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn test_last_day_of_month() {
        assert_eq!(last_day_of_month(2023, 2), NaiveDate::from_ymd_opt(2023, 2, 28));
        assert_eq!(last_day_of_month(2024, 2), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(last_day_of_month(2023, 12), NaiveDate::from_ymd_opt(2023, 12, 31));
        assert_eq!(last_day_of_month(2023, 13), None);
    }

    #[test]
    fn test_month_starts_in_range_crosses_year() {
        let start = NaiveDate::from_ymd_opt(2019, 11, 20).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 2, 3).unwrap();
        let months = month_starts_in_range(start, end);
        assert_eq!(
            months,
            vec![
                NaiveDate::from_ymd_opt(2019, 11, 1).unwrap(),
                NaiveDate::from_ymd_opt(2019, 12, 1).unwrap(),
                NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2020, 2, 1).unwrap(),
            ]
        );

        assert!(month_starts_in_range(end, start).is_empty());
    }

    #[test]
    fn test_month_name() {
        assert_eq!(month_name(1), "January");
        assert_eq!(month_name(12), "December");
        assert_eq!(month_name(0), "Unknown");
    }

    #[test]
    fn test_parse_period_string_month_and_range() {
        let (start, end) = parse_period_string("2023-02").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 2, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 2, 28).unwrap());

        let (start, end) = parse_period_string("2023-01:2023-03").unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 3, 31).unwrap());

        assert!(parse_period_string("2023-05:2023-01").is_err());
        assert!(parse_period_string("2023-01:2023-02:2023-03").is_err());
        assert!(parse_period_string("March").is_err());
    }
}
