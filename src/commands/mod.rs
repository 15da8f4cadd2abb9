//! Command Library
//!
//! Typed constructors producing [`Step`](crate::workflow::Step)s that invoke
//! the external programs of the pipeline. Inputs given as `FILE::VAR` keep
//! their qualifier in the command and contribute `FILE` to the dependencies.
//!
//! # Structure
//!
//! - [`wsim`]: the WSIM scientific tools (`wsim_lsm`, `wsim_fit`, ...)
//! - [`external`]: download, archive, GDAL, NCO and wgrib2 helpers

pub mod external;
pub mod wsim;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::workflow::step::Command;

pub use wsim::{
    wsim_anom, wsim_composite, wsim_correct, wsim_fit, wsim_flow, wsim_lsm, wsim_merge,
    wsim_polygon_summary, Integrate, LsmStatics, ZonalStats,
};

/// Placeholder substituted with the installation directory at emit time.
pub const BINDIR: &str = "{BINDIR}";

static ATTRIBUTE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((\w+|\*):)?\w+(=[^\s]+)?$").expect("attribute pattern is a valid regex")
});

/// Path of a script under the installation directory.
pub fn bin(script: &str) -> String {
    format!("{}/{}", BINDIR, script)
}

/// Checks an attribute string such as `yearmon=201701` or
/// `Ws:units=mm`.
///
/// ```
/// use wsim_planner::commands::validate_attribute;
///
/// assert!(validate_attribute("*:integration_period=6").is_ok());
/// assert!(validate_attribute("bad attribute").is_err());
/// ```
pub fn validate_attribute(attr: &str) -> Result<()> {
    if ATTRIBUTE_PATTERN.is_match(attr) {
        Ok(())
    } else {
        Err(Error::InvalidAttribute(attr.to_string()))
    }
}

pub fn validate_attributes<S: AsRef<str>>(attrs: &[S]) -> Result<()> {
    attrs.iter().try_for_each(|a| validate_attribute(a.as_ref()))
}

/// Turns string slices into a command.
pub fn command<S: AsRef<str>>(tokens: &[S]) -> Command {
    tokens.iter().map(|t| t.as_ref().to_string()).collect()
}

/// Appends `flag value` for every value.
pub(crate) fn push_each<S: AsRef<str>>(cmd: &mut Command, flag: &str, values: &[S]) {
    for v in values {
        cmd.push(flag.to_string());
        cmd.push(v.as_ref().to_string());
    }
}

pub(crate) fn require_some<S>(tool: &str, what: &str, values: &[S]) -> Result<()> {
    if values.is_empty() {
        Err(Error::argument(format!("{} requires at least one {}", tool, what)))
    } else {
        Ok(())
    }
}
