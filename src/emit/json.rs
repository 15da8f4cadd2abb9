//! JSON lines output: one record per step.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::error::Result;
use crate::workflow::{Command, Step, StepKind};

use super::{substitute, Emitter, Substitutions};

#[derive(Debug, Default)]
pub struct JsonEmitter;

impl JsonEmitter {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct Record<'a> {
    kind: StepKind,
    targets: &'a BTreeSet<String>,
    dependencies: &'a BTreeSet<String>,
    commands: Vec<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

impl Emitter for JsonEmitter {
    fn header(&self) -> String {
        String::new()
    }

    fn write_step(&mut self, step: &Step, substitutions: &Substitutions) -> Result<String> {
        let commands = step
            .get_mkdir_commands()
            .iter()
            .chain(step.commands())
            .map(|command| {
                command
                    .iter()
                    .map(|token| substitute(token, substitutions))
                    .collect::<Result<Command>>()
            })
            .collect::<Result<Vec<_>>>()?;

        let record = Record {
            kind: step.kind(),
            targets: step.targets(),
            dependencies: step.dependencies(),
            commands,
            comment: step.comment(),
        };
        Ok(format!("{}\n", serde_json::to_string(&record)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_record_substitutes_commands() {
        let step = Step::builder()
            .with_target("/out/a.nc")
            .with_command(["{BINDIR}/tool.R", "/out/a.nc"])
            .build()
            .unwrap();
        let subs = Substitutions::from([("BINDIR".to_string(), "/wsim".to_string())]);

        let line = JsonEmitter::new().write_step(&step, &subs).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["kind"], "rule");
        assert_eq!(value["targets"][0], "/out/a.nc");
        assert_eq!(value["commands"][1][0], "/wsim/tool.R");
        assert!(value.get("comment").is_none());
    }

    #[test]
    fn test_missing_key_fails() {
        let step = Step::builder()
            .with_target("/out/a.nc")
            .with_command(["{BINDIR}/tool.R"])
            .build()
            .unwrap();
        assert!(JsonEmitter::new()
            .write_step(&step, &Substitutions::new())
            .is_err());
    }
}
