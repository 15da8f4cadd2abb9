//! Variable references inside multi-variable files.
//!
//! The scientific tools accept `FILE::VAR` to read one variable from a
//! netCDF file, `FILE::VAR->NEW` to read it under another name, and
//! `FILE::VAR@transform` to apply a transform on read.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Separator between a file path and its variable list.
pub const VAR_SEPARATOR: &str = "::";

/// A (file, variable) pair.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Vardef {
    pub file: String,
    pub var: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transforms: Vec<String>,
}

impl Vardef {
    /// A reference to `var` within `file`.
    pub fn new(file: impl Into<String>, var: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            var: Some(var.into()),
            transforms: Vec::new(),
        }
    }

    /// A reference to a whole file.
    pub fn whole(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            var: None,
            transforms: Vec::new(),
        }
    }

    /// Adds a transform applied when the variable is read.
    pub fn with_transform(mut self, transform: impl Into<String>) -> Self {
        self.transforms.push(transform.into());
        self
    }

    /// Renaming form: `FILE::VAR->NEW`.
    ///
    /// ```
    /// use wsim_planner::paths::Vardef;
    ///
    /// let v = Vardef::new("/fig/rp/rp_201701.nc", "Ws_rp");
    /// assert_eq!(v.read_as("Ws"), "/fig/rp/rp_201701.nc::Ws_rp->Ws");
    /// ```
    pub fn read_as(&self, new_name: &str) -> String {
        format!("{}->{}", self, new_name)
    }
}

impl fmt::Display for Vardef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.var {
            None => write!(f, "{}", self.file),
            Some(var) => {
                write!(f, "{}{}{}", self.file, VAR_SEPARATOR, var)?;
                for t in &self.transforms {
                    write!(f, "@{}", t)?;
                }
                Ok(())
            }
        }
    }
}

/// Multi-variable read: `FILE::A,B,C`. An empty list reads the whole file.
pub fn read_vars<S: AsRef<str>>(file: &str, vars: &[S]) -> String {
    if vars.is_empty() {
        return file.to_string();
    }
    let joined: Vec<&str> = vars.iter().map(|v| v.as_ref()).collect();
    format!("{}{}{}", file, VAR_SEPARATOR, joined.join(","))
}

/// The file part of a (possibly qualified) reference.
pub fn strip_qualifier(token: &str) -> &str {
    match token.find(VAR_SEPARATOR) {
        Some(idx) => &token[..idx],
        None => token,
    }
}
