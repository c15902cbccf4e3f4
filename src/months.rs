// === Module Header (agents-tooling) START ===
// header: Parsed by scripts/check_module_headers.sh for purpose/role presence; keep keys on single-line entries.
// purpose: Calendar month enumeration and half-open [start, end) month intervals used to slice issue counts
// role: windowing/months
// inputs: year (i32) plus a Month or an English month name
// outputs: MonthInterval with YYYY-MM-DD rendering and a JQL created-date clause
// invariants:
// - start is always the 1st; end is the 1st of the following month (December wraps to next year)
// - month names resolve through a fixed table, never through the process locale
// errors: InvalidMonthName for unknown names; InvalidYear when chrono cannot represent the date
// tie_breakers: contracts > orchestration > correctness > performance > minimal_diffs
// === Module Header END ===

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ReportError;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum Tz {
  Local,
  Utc,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum Month {
  January,
  February,
  March,
  April,
  May,
  June,
  July,
  August,
  September,
  October,
  November,
  December,
}

impl Month {
  /// Calendar order, January first.
  pub const ALL: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
  ];

  pub fn name(self) -> &'static str {
    match self {
      Month::January => "January",
      Month::February => "February",
      Month::March => "March",
      Month::April => "April",
      Month::May => "May",
      Month::June => "June",
      Month::July => "July",
      Month::August => "August",
      Month::September => "September",
      Month::October => "October",
      Month::November => "November",
      Month::December => "December",
    }
  }

  /// Ordinal 1..=12.
  pub fn number(self) -> u32 {
    self as u32 + 1
  }

  /// Zero-based column offset among the month columns.
  pub fn index(self) -> usize {
    self as usize
  }

  /// Half-open interval covering this month of `year`.
  pub fn interval(self, year: i32) -> Result<MonthInterval, ReportError> {
    let m = self.number();
    let (next_y, next_m) = if m == 12 { (year.checked_add(1), 1) } else { (Some(year), m + 1) };

    let start = NaiveDate::from_ymd_opt(year, m, 1).ok_or(ReportError::InvalidYear(year))?;
    let end = next_y
      .and_then(|y| NaiveDate::from_ymd_opt(y, next_m, 1))
      .ok_or(ReportError::InvalidYear(year))?;

    Ok(MonthInterval { start, end })
  }
}

impl fmt::Display for Month {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for Month {
  type Err = ReportError;

  /// Case-sensitive match against the full English month names.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Month::ALL
      .iter()
      .copied()
      .find(|m| m.name() == s)
      .ok_or_else(|| ReportError::InvalidMonthName(s.to_string()))
  }
}

/// `[start, end)` with `end` = first day of the following month.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct MonthInterval {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl MonthInterval {
  pub fn days(&self) -> i64 {
    (self.end - self.start).num_days()
  }

  pub fn start_str(&self) -> String {
    self.start.format("%Y-%m-%d").to_string()
  }

  pub fn end_str(&self) -> String {
    self.end.format("%Y-%m-%d").to_string()
  }

  /// Created-date filter understood by JQL.
  pub fn jql_clause(&self) -> String {
    format!("created >= '{}' AND created < '{}'", self.start_str(), self.end_str())
  }
}

/// Resolve `month_name` and compute its interval in `year`.
pub fn month_range(year: i32, month_name: &str) -> Result<MonthInterval, ReportError> {
  month_name.parse::<Month>()?.interval(year)
}

/// Calendar year of "now" in the requested zone.
pub fn current_year(now: DateTime<Local>, tz: Tz) -> i32 {
  match tz {
    Tz::Local => now.year(),
    Tz::Utc => now.with_timezone(&Utc).year(),
  }
}

/// Parse a `--now-override` string into a local DateTime.
/// Accepts RFC3339 (e.g. 2025-08-15T12:00:00Z) or a naive local timestamp
/// formatted as `%Y-%m-%dT%H:%M:%S`.
pub fn parse_now_override(s: Option<&str>) -> Option<DateTime<Local>> {
  s.and_then(|raw| {
    chrono::DateTime::parse_from_rfc3339(raw)
      .ok()
      .map(|dt| dt.with_timezone(&Local))
      .or_else(|| {
        chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
          .ok()
          .and_then(|ndt| ndt.and_local_timezone(Local).single())
      })
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use proptest::prelude::*;

  fn expected_days(year: i32, month: u32) -> i64 {
    let leap = (year % 4 == 0 && year % 100 != 0) || year % 400 == 0;
    match month {
      2 if leap => 29,
      2 => 28,
      4 | 6 | 9 | 11 => 30,
      _ => 31,
    }
  }

  #[test]
  fn month_range_basic() {
    let iv = month_range(2025, "August").unwrap();
    assert_eq!(iv.start_str(), "2025-08-01");
    assert_eq!(iv.end_str(), "2025-09-01");
  }

  #[test]
  fn december_wraps_to_next_year() {
    let iv = month_range(2023, "December").unwrap();
    assert_eq!(iv.start, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
    assert_eq!(iv.end, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
  }

  #[test]
  fn february_follows_leap_rules() {
    assert_eq!(month_range(2024, "February").unwrap().days(), 29);
    assert_eq!(month_range(2023, "February").unwrap().days(), 28);
    assert_eq!(month_range(1900, "February").unwrap().days(), 28);
    assert_eq!(month_range(2000, "February").unwrap().days(), 29);
  }

  #[test]
  fn unknown_or_miscased_names_are_rejected() {
    assert_eq!(
      month_range(2024, "march"),
      Err(ReportError::InvalidMonthName("march".into()))
    );
    assert!(month_range(2024, "Mar").is_err());
    assert!(month_range(2024, "").is_err());
    assert!(month_range(2024, "Smarch").is_err());
  }

  #[test]
  fn out_of_range_year_is_an_error() {
    assert_eq!(Month::January.interval(i32::MAX), Err(ReportError::InvalidYear(i32::MAX)));
  }

  #[test]
  fn all_is_in_calendar_order() {
    let numbers: Vec<u32> = Month::ALL.iter().map(|m| m.number()).collect();
    assert_eq!(numbers, (1..=12).collect::<Vec<_>>());
    assert_eq!(Month::March.index(), 2);
    assert_eq!(Month::December.to_string(), "December");
  }

  #[test]
  fn jql_clause_uses_quoted_iso_dates() {
    let iv = Month::March.interval(2024).unwrap();
    assert_eq!(iv.jql_clause(), "created >= '2024-03-01' AND created < '2024-04-01'");
  }

  #[test]
  fn now_override_accepts_rfc3339_and_naive() {
    assert!(parse_now_override(Some("2025-08-15T12:00:00Z")).is_some());
    assert!(parse_now_override(Some("2025-08-15T12:00:00")).is_some());
    assert!(parse_now_override(Some("not a date")).is_none());
    assert!(parse_now_override(None).is_none());
  }

  #[test]
  fn current_year_in_utc_and_local() {
    let now = parse_now_override(Some("2025-06-15T12:00:00Z")).unwrap();
    assert_eq!(current_year(now, Tz::Utc), 2025);
    assert_eq!(current_year(now, Tz::Local), 2025);
  }

  proptest! {
    #[test]
    fn interval_spans_exactly_one_month(year in 1600i32..2600, idx in 0usize..12) {
      let month = Month::ALL[idx];
      let iv = month_range(year, month.name()).unwrap();
      prop_assert_eq!(iv.start.day(), 1);
      prop_assert_eq!(iv.end.day(), 1);
      prop_assert_eq!(iv.start.month(), month.number());
      prop_assert_eq!(iv.days(), expected_days(year, month.number()));
      let last = iv.end.pred_opt().unwrap();
      prop_assert_eq!(last.month(), month.number());
      prop_assert_eq!(last.day() as i64, expected_days(year, month.number()));
    }
  }
}
