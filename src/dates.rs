//! Date Algebra
//!
//! Pure operations on the three date token shapes used throughout the
//! pipeline's filenames:
//!
//! - `YYYY` (a year)
//! - `YYYYMM` (a "yearmon", the primary time axis)
//! - `YYYYMMDD` (a day, used for forecast issue dates)
//!
//! Binary operations require operands of the same length. A range
//! expression `[BEGIN:END:STEP]` uses the unit implied by the token length
//! and may appear literally inside filenames; see [`format_range`].

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{Error, Result};

/// A parsed date token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct DateToken {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

/// Parses a `YYYY`, `YYYYMM` or `YYYYMMDD` token.
///
/// # Example
///
/// ```
/// use wsim_planner::dates::parse;
///
/// let tok = parse("201702").unwrap();
/// assert_eq!(tok.year, 2017);
/// assert_eq!(tok.month, Some(2));
/// assert_eq!(tok.day, None);
/// ```
pub fn parse(tok: &str) -> Result<DateToken> {
    if !tok.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::InvalidDate(tok.to_string()));
    }

    let bad = || Error::InvalidDate(tok.to_string());

    let year: i32 = match tok.len() {
        4 | 6 | 8 => tok[0..4].parse().map_err(|_| bad())?,
        _ => return Err(bad()),
    };

    let month = if tok.len() >= 6 {
        let m: u32 = tok[4..6].parse().map_err(|_| bad())?;
        if !(1..=12).contains(&m) {
            return Err(bad());
        }
        Some(m)
    } else {
        None
    };

    let day = if tok.len() == 8 {
        let d: u32 = tok[6..8].parse().map_err(|_| bad())?;
        NaiveDate::from_ymd_opt(year, month.unwrap_or(1), d).ok_or_else(bad)?;
        Some(d)
    } else {
        None
    };

    Ok(DateToken { year, month, day })
}

/// Formats a token from its parts, zero-padded.
pub fn format(year: i32, month: Option<u32>, day: Option<u32>) -> String {
    match (month, day) {
        (Some(m), Some(d)) => format!("{:04}{:02}{:02}", year, m, d),
        (Some(m), None) => format!("{:04}{:02}", year, m),
        _ => format!("{:04}", year),
    }
}

/// Formats a yearmon token.
pub fn format_yearmon(year: i32, month: u32) -> String {
    format(year, Some(month), None)
}

/// Formats a range expression understood by the external tools.
pub fn format_range(begin: &str, end: &str, step: u32) -> String {
    format!("[{}:{}:{}]", begin, end, step)
}

fn parse_yearmon(tok: &str) -> Result<(i32, u32)> {
    let parsed = parse(tok)?;
    match (parsed.month, parsed.day) {
        (Some(m), None) => Ok((parsed.year, m)),
        _ => Err(Error::InvalidDate(tok.to_string())),
    }
}

fn parse_day(tok: &str) -> Result<NaiveDate> {
    let parsed = parse(tok)?;
    match (parsed.month, parsed.day) {
        (Some(m), Some(d)) => {
            NaiveDate::from_ymd_opt(parsed.year, m, d).ok_or_else(|| Error::InvalidDate(tok.to_string()))
        }
        _ => Err(Error::InvalidDate(tok.to_string())),
    }
}

fn month_index(year: i32, month: u32) -> i64 {
    year as i64 * 12 + (month as i64 - 1)
}

fn from_month_index(idx: i64) -> String {
    format_yearmon(idx.div_euclid(12) as i32, (idx.rem_euclid(12) + 1) as u32)
}

fn format_day(date: NaiveDate) -> String {
    format(date.year(), Some(date.month()), Some(date.day()))
}

fn same_length(a: &str, b: &str) -> Result<()> {
    if a.len() != b.len() {
        return Err(Error::DateMismatch(a.to_string(), b.to_string()));
    }
    Ok(())
}

/// Returns the month (1-12) of a yearmon.
pub fn month_of(yearmon: &str) -> Result<u32> {
    Ok(parse_yearmon(yearmon)?.1)
}

/// Returns the year of any date token.
pub fn year_of(tok: &str) -> Result<i32> {
    Ok(parse(tok)?.year)
}

/// The yearmon following `yearmon`.
pub fn next_yearmon(yearmon: &str) -> Result<String> {
    add_months(yearmon, 1)
}

/// The yearmon preceding `yearmon`.
pub fn previous_yearmon(yearmon: &str) -> Result<String> {
    add_months(yearmon, -1)
}

/// Adds `n` months (possibly negative) to a yearmon.
///
/// ```
/// use wsim_planner::dates::add_months;
///
/// assert_eq!(add_months("199606", 96).unwrap(), "200406");
/// assert_eq!(add_months("200001", -1).unwrap(), "199912");
/// ```
pub fn add_months(yearmon: &str, n: i64) -> Result<String> {
    let (y, m) = parse_yearmon(yearmon)?;
    Ok(from_month_index(month_index(y, m) + n))
}

/// Adds `n` days (possibly negative) to a `YYYYMMDD` token.
///
/// ```
/// use wsim_planner::dates::add_days;
///
/// assert_eq!(add_days("20000301", -1).unwrap(), "20000229");
/// ```
pub fn add_days(day: &str, n: i64) -> Result<String> {
    let date = parse_day(day)?;
    let shifted = Duration::try_days(n)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or_else(|| Error::InvalidRange(format!("{} shifted by {} days", day, n)))?;
    Ok(format_day(shifted))
}

/// Adds `n` years to a token of any length.
///
/// February 29 maps onto February 28 in non-leap years.
pub fn add_years(tok: &str, n: i32) -> Result<String> {
    let parsed = parse(tok)?;
    let year = parsed.year + n;
    let day = match (parsed.month, parsed.day) {
        (Some(m), Some(d)) => {
            let last = days_in_month(year, m);
            Some(d.min(last))
        }
        _ => None,
    };
    Ok(format(year, parsed.month, day))
}

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(ny, nm, 1)
        .and_then(|first_of_next| first_of_next.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

/// Number of months from `start` to `stop` (negative when stop precedes start).
pub fn months_between(start: &str, stop: &str) -> Result<i64> {
    let (y0, m0) = parse_yearmon(start)?;
    let (y1, m1) = parse_yearmon(stop)?;
    Ok(month_index(y1, m1) - month_index(y0, m0))
}

/// The `n` consecutive yearmons ending at `end` (inclusive), oldest first.
pub fn rolling_window(end: &str, n: u32) -> Result<Vec<String>> {
    let (y, m) = parse_yearmon(end)?;
    let last = month_index(y, m);
    Ok((0..n as i64)
        .rev()
        .map(|back| from_month_index(last - back))
        .collect())
}

/// Iterator over consecutive yearmons; see [`get_yearmons`].
#[derive(Debug, Clone)]
pub struct YearmonIter {
    next: i64,
    last: i64,
}

impl Iterator for YearmonIter {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next > self.last {
            return None;
        }
        let current = from_month_index(self.next);
        self.next += 1;
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.last - self.next + 1).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for YearmonIter {}

/// Yearmons from `start` to `stop`, inclusive at both ends.
pub fn get_yearmons(start: &str, stop: &str) -> Result<YearmonIter> {
    let (y0, m0) = parse_yearmon(start)?;
    let (y1, m1) = parse_yearmon(stop)?;
    let first = month_index(y0, m0);
    let last = month_index(y1, m1);
    if first > last {
        return Err(Error::InvalidRange(format!("{} is after {}", start, stop)));
    }
    Ok(YearmonIter { next: first, last })
}

/// Every yearmon of the years `start_year..=end_year`.
pub fn yearmons_of_years(start_year: i32, end_year: i32) -> Vec<String> {
    if start_year > end_year {
        return Vec::new();
    }
    (month_index(start_year, 1)..=month_index(end_year, 12))
        .map(from_month_index)
        .collect()
}

/// Expands `start..=stop` with the given step, in the unit implied by the
/// token length. Values past `stop` are discarded.
pub fn expand_date_range(start: &str, stop: &str, step: u32) -> Result<Vec<String>> {
    same_length(start, stop)?;
    if step == 0 {
        return Err(Error::InvalidRange(format!("[{}:{}:0] has a zero step", start, stop)));
    }

    let out = match start.len() {
        4 => {
            let (a, b) = (year_of(start)?, year_of(stop)?);
            (a..=b).step_by(step as usize).map(|y| format(y, None, None)).collect()
        }
        6 => {
            let (y0, m0) = parse_yearmon(start)?;
            let (y1, m1) = parse_yearmon(stop)?;
            (month_index(y0, m0)..=month_index(y1, m1))
                .step_by(step as usize)
                .map(from_month_index)
                .collect()
        }
        _ => {
            let (a, b) = (parse_day(start)?, parse_day(stop)?);
            let mut days = Vec::new();
            let delta = Duration::days(i64::from(step));
            let mut current = Some(a);
            while let Some(day) = current.filter(|d| *d <= b) {
                days.push(format_day(day));
                current = day.checked_add_signed(delta);
            }
            days
        }
    };

    Ok(out)
}

/// The earliest yearmon at or after `yearmon` whose month is `month`.
pub fn next_occurrence_of_month(yearmon: &str, month: u32) -> Result<String> {
    if !(1..=12).contains(&month) {
        return Err(Error::argument(format!("month {} outside 1-12", month)));
    }
    let (y, m) = parse_yearmon(yearmon)?;
    if m <= month {
        Ok(format_yearmon(y, month))
    } else {
        Ok(format_yearmon(y + 1, month))
    }
}

/// The range of yearmons for which a `window`-month integration ending in
/// `month` (or in any month, when `None`) can be computed from
/// observations covering `start_year..=end_year`.
///
/// ```
/// use wsim_planner::dates::available_yearmon_range;
///
/// assert_eq!(
///     available_yearmon_range(6, Some(3), 2015, 2017).unwrap(),
///     "[201603:201703:12]"
/// );
/// ```
pub fn available_yearmon_range(
    window: u32,
    month: Option<u32>,
    start_year: i32,
    end_year: i32,
) -> Result<String> {
    let (begin, end, step) = available_yearmon_bounds(window, month, start_year, end_year)?;
    Ok(format_range(&begin, &end, step))
}

/// Bounds behind [`available_yearmon_range`], as `(begin, end, step)`.
pub fn available_yearmon_bounds(
    window: u32,
    month: Option<u32>,
    start_year: i32,
    end_year: i32,
) -> Result<(String, String, u32)> {
    if window == 0 {
        return Err(Error::argument("integration window must be at least one month"));
    }

    let first_complete = add_months(&format_yearmon(start_year, 1), window as i64 - 1)?;

    let (begin, end, step) = match month {
        None => (first_complete, format_yearmon(end_year, 12), 1),
        Some(m) => (
            next_occurrence_of_month(&first_complete, m)?,
            format_yearmon(end_year, m),
            12,
        ),
    };

    if begin > end {
        return Err(Error::InvalidRange(format!(
            "a {}-month window does not fit in {}-{}",
            window, start_year, end_year
        )));
    }

    Ok((begin, end, step))
}

/// Months from forecast issue to forecast target.
pub fn get_lead_months(issue: &str, target: &str) -> Result<u32> {
    let lead = months_between(issue, target)?;
    if lead < 0 {
        return Err(Error::contract(format!(
            "forecast target {} precedes issue {}",
            target, issue
        )));
    }
    Ok(lead as u32)
}

/// Returns true if the token parses as a yearmon.
pub fn is_yearmon(tok: &str) -> bool {
    parse_yearmon(tok).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_lengths() {
        assert_eq!(
            parse("2017").unwrap(),
            DateToken { year: 2017, month: None, day: None }
        );
        assert_eq!(parse("201702").unwrap().month, Some(2));
        assert_eq!(parse("20170228").unwrap().day, Some(28));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse("20171").is_err());
        assert!(parse("201713").is_err());
        assert!(parse("20170230").is_err());
        assert!(parse("2017-01").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn test_format_zero_pads() {
        assert_eq!(format(987, Some(3), None), "098703");
        assert_eq!(format(2017, Some(1), Some(5)), "20170105");
    }

    #[test]
    fn test_add_months() {
        assert_eq!(add_months("199606", 96).unwrap(), "200406");
        assert_eq!(add_months("201612", 1).unwrap(), "201701");
        assert_eq!(add_months("201701", -13).unwrap(), "201512");
    }

    #[test]
    fn test_next_previous_roll_year() {
        assert_eq!(next_yearmon("201612").unwrap(), "201701");
        assert_eq!(previous_yearmon("201701").unwrap(), "201612");
    }

    #[test]
    fn test_add_days_leap_year() {
        assert_eq!(add_days("20000301", -1).unwrap(), "20000229");
        assert_eq!(add_days("19990301", -1).unwrap(), "19990228");
        assert_eq!(add_days("20161231", 1).unwrap(), "20170101");
    }

    #[test]
    fn test_add_days_out_of_range() {
        assert!(matches!(add_days("20000101", i64::MAX), Err(Error::InvalidRange(_))));
        assert!(matches!(add_days("20000101", 1 << 40), Err(Error::InvalidRange(_))));
    }

    #[test]
    fn test_add_years() {
        assert_eq!(add_years("2016", -10).unwrap(), "2006");
        assert_eq!(add_years("201602", 1).unwrap(), "201702");
        assert_eq!(add_years("20160229", 1).unwrap(), "20170228");
    }

    #[test]
    fn test_rolling_window() {
        assert_eq!(
            rolling_window("201702", 3).unwrap(),
            vec!["201612", "201701", "201702"]
        );
    }

    #[test]
    fn test_get_yearmons_inclusive() {
        let yms: Vec<String> = get_yearmons("201611", "201702").unwrap().collect();
        assert_eq!(yms, vec!["201611", "201612", "201701", "201702"]);

        assert_eq!(get_yearmons("201701", "201701").unwrap().len(), 1);
        assert!(get_yearmons("201702", "201701").is_err());
    }

    #[test]
    fn test_expand_date_range_units() {
        assert_eq!(
            expand_date_range("2000", "2004", 2).unwrap(),
            vec!["2000", "2002", "2004"]
        );
        assert_eq!(
            expand_date_range("201603", "201803", 12).unwrap(),
            vec!["201603", "201703", "201803"]
        );
        assert_eq!(
            expand_date_range("20000227", "20000302", 2).unwrap(),
            vec!["20000227", "20000229", "20000302"]
        );
    }

    #[test]
    fn test_expand_date_range_discards_overshoot() {
        assert_eq!(
            expand_date_range("201601", "201606", 4).unwrap(),
            vec!["201601", "201605"]
        );
    }

    #[test]
    fn test_expand_date_range_mismatched_lengths() {
        let err = expand_date_range("2016", "201601", 1).unwrap_err();
        assert!(matches!(err, Error::DateMismatch(_, _)));
    }

    #[test]
    fn test_next_occurrence_of_month() {
        assert_eq!(next_occurrence_of_month("201603", 3).unwrap(), "201603");
        assert_eq!(next_occurrence_of_month("201604", 3).unwrap(), "201703");
        assert_eq!(next_occurrence_of_month("201601", 12).unwrap(), "201612");
    }

    #[test]
    fn test_available_yearmon_range() {
        assert_eq!(
            available_yearmon_range(6, Some(3), 2015, 2017).unwrap(),
            "[201603:201703:12]"
        );
        assert_eq!(
            available_yearmon_range(6, None, 2015, 2017).unwrap(),
            "[201506:201712:1]"
        );
        assert_eq!(
            available_yearmon_range(1, Some(1), 1950, 2009).unwrap(),
            "[195001:200901:12]"
        );
    }

    #[test]
    fn test_available_yearmon_range_too_long() {
        assert!(available_yearmon_range(36, None, 2015, 2016).is_err());
        assert!(available_yearmon_range(24, Some(3), 2016, 2017).is_err());
    }

    #[test]
    fn test_get_lead_months() {
        assert_eq!(get_lead_months("201701", "201701").unwrap(), 0);
        assert_eq!(get_lead_months("201701", "201710").unwrap(), 9);
        assert!(get_lead_months("201701", "201612").is_err());
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2000, 2), 29);
        assert_eq!(days_in_month(1900, 2), 28);
        assert_eq!(days_in_month(2017, 12), 31);
    }

    #[test]
    fn test_yearmons_of_years() {
        let yms = yearmons_of_years(2015, 2016);
        assert_eq!(yms.len(), 24);
        assert_eq!(yms.first().unwrap(), "201501");
        assert_eq!(yms.last().unwrap(), "201612");
    }
}
