//! Build Graph Emitters
//!
//! Render a validated step list in the syntax of a build tool. The planner
//! knows nothing about the output format; each emitter turns one
//! [`Step`] at a time into text.
//!
//! # Structure
//!
//! - [`make`]: GNU make rules
//! - [`snakemake`]: Snakemake rules with `input`/`output`/`shell` blocks
//! - [`json`]: one JSON record per step, for inspection

pub mod json;
pub mod make;
pub mod snakemake;

use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Error, Result};
use crate::workflow::Step;

pub use json::JsonEmitter;
pub use make::MakeEmitter;
pub use snakemake::SnakemakeEmitter;

/// Values for the `{KEY}` placeholders of command tokens.
pub type Substitutions = BTreeMap<String, String>;

/// Characters a shell word may contain without quoting.
static SHELL_SAFE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_@%+=:,./-]+$").expect("shell-safe pattern is a valid regex")
});

/// Writes steps in one build-graph syntax.
pub trait Emitter {
    /// Text preceding the first step.
    fn header(&self) -> String;

    /// One step, with command tokens passed through [`substitute`].
    fn write_step(&mut self, step: &Step, substitutions: &Substitutions) -> Result<String>;
}

/// Available output syntaxes.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitterKind {
    #[default]
    Make,
    Snakemake,
    Json,
}

impl EmitterKind {
    pub fn create(self) -> Box<dyn Emitter> {
        match self {
            Self::Make => Box::new(MakeEmitter::new()),
            Self::Snakemake => Box::new(SnakemakeEmitter::new()),
            Self::Json => Box::new(JsonEmitter::new()),
        }
    }
}

impl fmt::Display for EmitterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Make => write!(f, "make"),
            Self::Snakemake => write!(f, "snakemake"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Replaces every `{KEY}` in `token` with its value. `{{` and `}}` stand
/// for literal braces. A key without a value is an error.
///
/// ```
/// use wsim_planner::emit::{substitute, Substitutions};
///
/// let subs = Substitutions::from([("BINDIR".to_string(), "/wsim".to_string())]);
/// assert_eq!(substitute("{BINDIR}/wsim_anom.R", &subs).unwrap(), "/wsim/wsim_anom.R");
/// assert!(substitute("{OTHER}/x", &subs).is_err());
/// ```
pub fn substitute(token: &str, substitutions: &Substitutions) -> Result<String> {
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut key = String::new();
                let mut closed = false;
                for k in chars.by_ref() {
                    if k == '}' {
                        closed = true;
                        break;
                    }
                    key.push(k);
                }
                let value = substitutions.get(&key).filter(|_| closed).ok_or_else(|| {
                    Error::Template {
                        key: key.clone(),
                        token: token.to_string(),
                    }
                })?;
                out.push_str(value);
            }
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// Quotes `word` for a POSIX shell when it holds anything beyond plain
/// path characters.
pub fn shell_quote(word: &str) -> String {
    if SHELL_SAFE.is_match(word) {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Renders `steps` with the given emitter.
pub fn render(
    steps: &[Step],
    emitter: &mut dyn Emitter,
    substitutions: &Substitutions,
) -> Result<String> {
    info!("Rendering {} steps", steps.len());
    let mut out = emitter.header();
    for step in steps {
        out.push_str(&emitter.write_step(step, substitutions)?);
    }
    debug!("Rendered {} bytes", out.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn subs() -> Substitutions {
        Substitutions::from([("BINDIR".to_string(), "/opt/wsim".to_string())])
    }

    #[test]
    fn test_substitute_keys_and_escapes() {
        assert_eq!(substitute("{BINDIR}/a.R", &subs()).unwrap(), "/opt/wsim/a.R");
        assert_eq!(substitute("{{x}}", &subs()).unwrap(), "{x}");
        assert_eq!(substitute("plain", &subs()).unwrap(), "plain");
    }

    #[test]
    fn test_substitute_is_strict() {
        match substitute("{BINDIR}/{TOOLS}/a.R", &subs()) {
            Err(Error::Template { key, token }) => {
                assert_eq!(key, "TOOLS");
                assert_eq!(token, "{BINDIR}/{TOOLS}/a.R");
            }
            other => panic!("expected a template error, got {:?}", other),
        }
        assert!(substitute("{BINDIR", &subs()).is_err());
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/out/rp/rp_201701.nc::Ws"), "/out/rp/rp_201701.nc::Ws");
        assert_eq!(shell_quote("a.nc::PETmE@negate->Neg_PETmE"), "'a.nc::PETmE@negate->Neg_PETmE'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_render_concatenates_header_and_steps() {
        let step = Step::builder()
            .with_target("/out/a.nc")
            .with_command(["touch", "/out/a.nc"])
            .build()
            .unwrap();
        let mut emitter = JsonEmitter::new();
        let text = render(&[step.clone(), step], &mut emitter, &subs()).unwrap();
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_emitter_kind_names() {
        assert_eq!(EmitterKind::default().to_string(), "make");
        assert_eq!(EmitterKind::Snakemake.to_string(), "snakemake");
    }
}
