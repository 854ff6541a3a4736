//! Expiry date arithmetic
//!
//! Converts between calendar dates and relative day counts, and classifies
//! the time left before expiry into urgency bands.
//!
//! Day-count input typed by users is coerced, never rejected: anything that
//! does not start with a non-negative integer becomes 0 and is logged.

use crate::config::{CRITICAL_MAX_DAYS, EXPIRING_SOON_MAX_DAYS};
use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Today's calendar date in the local time zone
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Signed number of whole days from `reference` to `expiry_date`.
///
/// Negative means already past, zero means due today.
pub fn days_until_expiry(expiry_date: NaiveDate, reference: NaiveDate) -> i64 {
    expiry_date.signed_duration_since(reference).num_days()
}

/// Date `days` days after `reference`, where `days` is raw user input.
pub fn date_from_day_offset(days: &str, reference: NaiveDate) -> NaiveDate {
    add_days(reference, coerce_day_count(days))
}

/// Date `days` days after `reference`.
pub fn add_days(reference: NaiveDate, days: u32) -> NaiveDate {
    match reference.checked_add_days(Days::new(u64::from(days))) {
        Some(date) => date,
        None => {
            tracing::warn!("Day offset {} overflows the calendar, using {}", days, reference);
            reference
        }
    }
}

/// Parse a day count from text, falling back to 0.
///
/// The leading integer part is used, so `"2.7"` is 2 and `"3 days"` is 3.
pub fn coerce_day_count(input: &str) -> u32 {
    match leading_integer(input) {
        Some(value) => value,
        None => {
            tracing::warn!("Invalid day count {:?}, treating as 0", input);
            0
        }
    }
}

/// Parse an item quantity from text; anything below 1 becomes 1.
pub fn coerce_quantity(input: &str) -> u32 {
    match leading_integer(input) {
        Some(value) if value >= 1 => value,
        _ => {
            tracing::warn!("Invalid quantity {:?}, treating as 1", input);
            1
        }
    }
}

fn leading_integer(input: &str) -> Option<u32> {
    let trimmed = input.trim();
    let trimmed = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());

    if digits_end == 0 {
        return None;
    }

    trimmed[..digits_end].parse().ok()
}

/// Classification of the time left before expiry.
///
/// Uses fixed thresholds, unlike the attention queue which uses each
/// item's own `notify_days_before`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Expired,
    Critical,
    Warning,
    Safe,
}

impl Urgency {
    pub fn classify(days_until_expiry: i64) -> Self {
        if days_until_expiry < 0 {
            Urgency::Expired
        } else if days_until_expiry <= CRITICAL_MAX_DAYS {
            Urgency::Critical
        } else if days_until_expiry <= EXPIRING_SOON_MAX_DAYS {
            Urgency::Warning
        } else {
            Urgency::Safe
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Expired => "expired",
            Urgency::Critical => "critical",
            Urgency::Warning => "warning",
            Urgency::Safe => "safe",
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_until_expiry_relative_to_reference() {
        let today = date(2024, 3, 10);

        assert_eq!(days_until_expiry(today, today), 0);
        assert_eq!(days_until_expiry(date(2024, 3, 15), today), 5);
        assert_eq!(days_until_expiry(date(2024, 3, 7), today), -3);
    }

    #[test]
    fn test_days_until_expiry_across_month_and_leap_day() {
        let today = date(2024, 2, 28);

        assert_eq!(days_until_expiry(date(2024, 3, 1), today), 2);
        assert_eq!(days_until_expiry(date(2023, 2, 28), today), -365);
    }

    #[test]
    fn test_date_from_day_offset() {
        let today = date(2024, 12, 30);

        assert_eq!(date_from_day_offset("3", today), date(2025, 1, 2));
        assert_eq!(date_from_day_offset("0", today), today);
        assert_eq!(date_from_day_offset(" 7 ", today), date(2025, 1, 6));
    }

    #[test]
    fn test_date_from_day_offset_degrades_to_reference() {
        let today = date(2024, 6, 1);

        assert_eq!(date_from_day_offset("", today), today);
        assert_eq!(date_from_day_offset("soon", today), today);
        assert_eq!(date_from_day_offset("-4", today), today);
    }

    #[test]
    fn test_coerce_day_count() {
        assert_eq!(coerce_day_count("2.7"), 2);
        assert_eq!(coerce_day_count("+5"), 5);
        assert_eq!(coerce_day_count("3 days"), 3);
        assert_eq!(coerce_day_count("abc"), 0);
        assert_eq!(coerce_day_count("-1"), 0);
        assert_eq!(coerce_day_count("99999999999999"), 0);
    }

    #[test]
    fn test_coerce_quantity_never_below_one() {
        assert_eq!(coerce_quantity("4"), 4);
        assert_eq!(coerce_quantity("0"), 1);
        assert_eq!(coerce_quantity(""), 1);
        assert_eq!(coerce_quantity("two"), 1);
    }

    #[test]
    fn test_urgency_bands() {
        assert_eq!(Urgency::classify(-1), Urgency::Expired);
        assert_eq!(Urgency::classify(0), Urgency::Critical);
        assert_eq!(Urgency::classify(1), Urgency::Critical);
        assert_eq!(Urgency::classify(2), Urgency::Warning);
        assert_eq!(Urgency::classify(4), Urgency::Warning);
        assert_eq!(Urgency::classify(5), Urgency::Safe);
    }

    #[test]
    fn test_urgency_serializes_lowercase() {
        let json = serde_json::to_string(&Urgency::Critical).unwrap();
        assert_eq!(json, "\"critical\"");
        assert_eq!(Urgency::Warning.to_string(), "warning");
    }
}
