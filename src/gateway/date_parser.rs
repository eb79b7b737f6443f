//! Date policy for incoming rows.
//!
//! A value is tried against every accepted format. Formats are year-first or
//! day-first; month-first input is not accepted, so `03/04/2025` is 3 April.
//! Candidates outside the accepted year range are discarded. Exactly one
//! distinct remaining date is accepted; more than one is rejected rather than
//! guessed.

use crate::constants::{MAX_ACCEPTED_YEAR, MIN_ACCEPTED_YEAR};
use crate::domain::RejectionReason;
use chrono::{Datelike, NaiveDate};

pub const ACCEPTED_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d-%B-%Y",
];

pub fn parse_date(raw: &str) -> Result<NaiveDate, RejectionReason> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(RejectionReason::MissingField {
            column: crate::constants::COL_DATE.to_string(),
        });
    }

    let mut parsed: Vec<NaiveDate> = ACCEPTED_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .collect();
    parsed.sort();
    parsed.dedup();

    if parsed.is_empty() {
        return Err(RejectionReason::UnparseableDate {
            value: value.to_string(),
        });
    }

    let candidates: Vec<NaiveDate> = parsed
        .into_iter()
        .filter(|d| (MIN_ACCEPTED_YEAR..=MAX_ACCEPTED_YEAR).contains(&d.year()))
        .collect();

    match candidates.as_slice() {
        [] => Err(RejectionReason::DateOutOfRange {
            value: value.to_string(),
        }),
        [single] => Ok(*single),
        _ => Err(RejectionReason::AmbiguousDate {
            value: value.to_string(),
            candidates,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_iso_and_day_first_agree() {
        assert_eq!(parse_date("2025-03-15"), Ok(ymd(2025, 3, 15)));
        assert_eq!(parse_date("15-03-2025"), Ok(ymd(2025, 3, 15)));
        assert_eq!(parse_date("15.03.2025"), Ok(ymd(2025, 3, 15)));
        assert_eq!(parse_date("20250315"), Ok(ymd(2025, 3, 15)));
        assert_eq!(parse_date("15-Mar-2025"), Ok(ymd(2025, 3, 15)));
    }

    #[test]
    fn test_slash_date_with_day_above_twelve_is_day_first() {
        assert_eq!(parse_date("13/04/2025"), Ok(ymd(2025, 4, 13)));
        // Month-first input is not an accepted format
        assert!(matches!(
            parse_date("04/13/2025"),
            Err(RejectionReason::UnparseableDate { .. })
        ));
    }

    #[test]
    fn test_slash_date_with_small_day_reads_day_first() {
        assert_eq!(parse_date("03/04/2025"), Ok(ymd(2025, 4, 3)));
        assert_eq!(parse_date("12/01/2025"), Ok(ymd(2025, 1, 12)));
        assert_eq!(parse_date("01/12/2025"), Ok(ymd(2025, 12, 1)));
    }

    #[test]
    fn test_same_day_and_month_is_not_ambiguous() {
        assert_eq!(parse_date("05/05/2025"), Ok(ymd(2025, 5, 5)));
    }

    #[test]
    fn test_two_digit_year_is_out_of_range() {
        assert!(matches!(
            parse_date("15-03-25"),
            Err(RejectionReason::DateOutOfRange { .. })
        ));
    }

    #[test]
    fn test_garbage_and_empty_values() {
        assert!(matches!(
            parse_date("yesterday"),
            Err(RejectionReason::UnparseableDate { .. })
        ));
        assert!(matches!(
            parse_date("31-02-2025"),
            Err(RejectionReason::UnparseableDate { .. })
        ));
        assert!(matches!(
            parse_date("   "),
            Err(RejectionReason::MissingField { .. })
        ));
    }
}
