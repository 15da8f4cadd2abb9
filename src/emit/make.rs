//! GNU make output.

use crate::error::Result;
use crate::workflow::Step;

use super::{shell_quote, substitute, Emitter, Substitutions};

/// Make's automatic variables, passed through unescaped.
const AUTOMATIC_VARIABLES: [&str; 3] = ["$<", "$@", "$^"];

#[derive(Debug, Default)]
pub struct MakeEmitter;

impl MakeEmitter {
    pub fn new() -> Self {
        Self
    }
}

/// Position of the extension dot within the file name of `path`.
fn extension_dot(path: &str) -> Option<usize> {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    path[name_start..].rfind('.').map(|i| name_start + i)
}

/// Turns the extension dot of a file name into `%` so that a rule with
/// several targets runs once for all of them.
fn patternize(path: &str) -> String {
    match extension_dot(path) {
        Some(dot) => format!("{}%{}", &path[..dot], &path[dot + 1..]),
        None => path.to_string(),
    }
}

/// Escapes `$` for make, leaving automatic variables alone.
fn escape_dollars(word: &str) -> String {
    let mut out = String::with_capacity(word.len());
    let mut rest = word;
    while let Some(i) = rest.find('$') {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        match AUTOMATIC_VARIABLES.iter().find(|v| tail.starts_with(*v)) {
            Some(var) => {
                out.push_str(var);
                rest = &tail[var.len()..];
            }
            None => {
                out.push_str("$$");
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn recipe_line(command: &[String], substitutions: &Substitutions) -> Result<String> {
    let words = command
        .iter()
        .map(|token| Ok(escape_dollars(&shell_quote(&substitute(token, substitutions)?))))
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("\t{}\n", words.join(" ")))
}

impl Emitter for MakeEmitter {
    fn header(&self) -> String {
        [
            "# Generated by wsim-planner. Do not edit.",
            ".DELETE_ON_ERROR:",
            ".SECONDARY:",
            ".SUFFIXES:",
            "",
            "",
        ]
        .join("\n")
    }

    fn write_step(&mut self, step: &Step, substitutions: &Substitutions) -> Result<String> {
        let mut out = String::new();
        if let Some(comment) = step.comment() {
            for line in comment.lines() {
                out.push_str(&format!("# {}\n", line));
            }
        }

        let targets: Vec<&String> = step.targets().iter().collect();
        let deps: Vec<&String> = step.dependencies().iter().collect();

        if step.is_meta() {
            let name = targets.iter().map(|t| t.as_str()).collect::<Vec<_>>().join(" ");
            out.push_str(&format!(".PHONY: {}\n", name));
            out.push_str(&format!(
                "{} : {}\n\n",
                name,
                deps.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(" ")
            ));
            return Ok(out);
        }

        // A pattern rule needs every target to be a pattern; otherwise the
        // targets are grouped explicitly (GNU make 4.3).
        let pattern = targets.len() > 1 && targets.iter().all(|t| extension_dot(t).is_some());
        let separator = if targets.len() > 1 && !pattern { "&:" } else { ":" };
        let (targets, deps): (Vec<String>, Vec<String>) = if pattern {
            (
                targets.iter().map(|t| patternize(t)).collect(),
                deps.iter().map(|d| patternize(d)).collect(),
            )
        } else {
            (
                targets.iter().map(|t| t.to_string()).collect(),
                deps.iter().map(|d| d.to_string()).collect(),
            )
        };
        out.push_str(
            &format!("{} {} {}\n", targets.join(" "), separator, deps.join(" ")).replace(" \n", "\n"),
        );

        for command in step.get_mkdir_commands().iter().chain(step.commands()) {
            out.push_str(&recipe_line(command, substitutions)?);
        }
        out.push('\n');
        Ok(out)
    }
}
