//! Range Expression Detection and Expansion
//!
//! Filenames may carry a date range expression `[BEGIN:END:STEP]`, the
//! notation the scientific tools use to read or write a series of files in
//! one invocation. Commands keep the expression verbatim; targets and
//! dependencies are expanded into one concrete path per date so the build
//! graph sees every file.

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dates;
use crate::error::{Error, Result};

static RANGE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[(\d+):(\d+):(\d+)\]").expect("range pattern is a valid regex")
});

/// A parsed range expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub begin: String,
    pub end: String,
    pub step: u32,
}

impl DateRange {
    /// Every date covered by the range.
    pub fn dates(&self) -> Result<Vec<String>> {
        dates::expand_date_range(&self.begin, &self.end, self.step)
    }
}

/// Checks if a string contains a range expression.
///
/// ```
/// use wsim_planner::workflow::ranges::has_range;
///
/// assert!(has_range("results_[195001:200901:12].nc"));
/// assert!(!has_range("results_195001.nc"));
/// ```
pub fn has_range(text: &str) -> bool {
    RANGE_PATTERN.is_match(text)
}

/// Extracts the first range expression of `text`.
pub fn extract_range(text: &str) -> Result<Option<DateRange>> {
    let Some(caps) = RANGE_PATTERN.captures(text) else {
        return Ok(None);
    };

    let step = caps[3]
        .parse()
        .map_err(|_| Error::InvalidRange(caps[0].to_string()))?;

    Ok(Some(DateRange {
        begin: caps[1].to_string(),
        end: caps[2].to_string(),
        step,
    }))
}

/// Expands every range expression in `path` into concrete paths.
///
/// A path without ranges expands to itself. Multiple ranges expand to
/// their cartesian product, leftmost range varying slowest.
///
/// ```
/// use wsim_planner::workflow::ranges::expand_ranges;
///
/// let paths = expand_ranges("rp_[201603:201803:12].nc").unwrap();
/// assert_eq!(paths, vec!["rp_201603.nc", "rp_201703.nc", "rp_201803.nc"]);
/// ```
pub fn expand_ranges(path: &str) -> Result<Vec<String>> {
    let Some(m) = RANGE_PATTERN.find(path) else {
        return Ok(vec![path.to_string()]);
    };

    let range = extract_range(m.as_str())?
        .ok_or_else(|| Error::InvalidRange(m.as_str().to_string()))?;

    let (head, tail) = (&path[..m.start()], &path[m.end()..]);

    let covered = range.dates()?;
    if covered.is_empty() {
        return Err(Error::InvalidRange(m.as_str().to_string()));
    }

    let mut expanded = Vec::new();
    for date in covered {
        for rest in expand_ranges(tail)? {
            expanded.push(format!("{}{}{}", head, date, rest));
        }
    }

    debug!("Expanded '{}' into {} paths", path, expanded.len());
    Ok(expanded)
}
