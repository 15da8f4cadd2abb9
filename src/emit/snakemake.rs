//! Snakemake output.
//!
//! Command tokens naming a dependency or target are written as
//! `{input[i]}` / `{output[i]}` back-references; any other brace is doubled
//! so that Snakemake's formatter leaves it alone.

use crate::error::Result;
use crate::paths::strip_qualifier;
use crate::workflow::Step;

use super::{shell_quote, substitute, Emitter, Substitutions};

const INDENT: &str = "    ";

#[derive(Debug, Default)]
pub struct SnakemakeEmitter {
    rules: usize,
}

impl SnakemakeEmitter {
    pub fn new() -> Self {
        Self::default()
    }
}

fn escape_braces(word: &str) -> String {
    word.replace('{', "{{").replace('}', "}}")
}

/// Rewrites a token whose file part is one of `files` as a back-reference
/// into `block`.
fn back_reference(token: &str, block: &str, files: &[&String]) -> Option<String> {
    let file = strip_qualifier(token);
    let index = files.iter().position(|f| f.as_str() == file)?;
    let reference = format!("{{{}[{}]}}", block, index);
    match &token[file.len()..] {
        "" => Some(reference),
        qualifier => Some(format!("{}{}", reference, escape_braces(&shell_quote(qualifier)))),
    }
}

fn shell_word(
    token: &str,
    inputs: &[&String],
    outputs: &[&String],
    substitutions: &Substitutions,
) -> Result<String> {
    let token = substitute(token, substitutions)?;
    let word = back_reference(&token, "output", outputs)
        .or_else(|| back_reference(&token, "input", inputs))
        .unwrap_or_else(|| escape_braces(&shell_quote(&token)));
    Ok(word)
}

fn file_block(out: &mut String, block: &str, files: &[&String]) {
    if files.is_empty() {
        return;
    }
    out.push_str(&format!("{}{}:\n", INDENT, block));
    for file in files {
        out.push_str(&format!("{}{}\"{}\",\n", INDENT, INDENT, file));
    }
}

impl Emitter for SnakemakeEmitter {
    fn header(&self) -> String {
        "# Generated by wsim-planner. Do not edit.\n\n".to_string()
    }

    fn write_step(&mut self, step: &Step, substitutions: &Substitutions) -> Result<String> {
        let inputs: Vec<&String> = step.dependencies().iter().collect();
        let outputs: Vec<&String> = step.targets().iter().collect();

        let mut out = String::new();
        if let Some(comment) = step.comment() {
            for line in comment.lines() {
                out.push_str(&format!("# {}\n", line));
            }
        }

        if step.is_meta() {
            let name = outputs.iter().map(|t| t.as_str()).collect::<Vec<_>>().join("_");
            out.push_str(&format!("rule {}:\n", name));
            file_block(&mut out, "input", &inputs);
            out.push('\n');
            return Ok(out);
        }

        self.rules += 1;
        out.push_str(&format!("rule step_{}:\n", self.rules));
        file_block(&mut out, "input", &inputs);
        file_block(&mut out, "output", &outputs);

        out.push_str(&format!("{}shell:\n{}{}\"\"\"\n", INDENT, INDENT, INDENT));
        for command in step.get_mkdir_commands().iter().chain(step.commands()) {
            let words = command
                .iter()
                .map(|token| shell_word(token, &inputs, &outputs, substitutions))
                .collect::<Result<Vec<_>>>()?;
            out.push_str(&format!("{}{}{}\n", INDENT, INDENT, words.join(" ")));
        }
        out.push_str(&format!("{}{}\"\"\"\n\n", INDENT, INDENT));
        Ok(out)
    }
}
