//! Build Rule Model
//!
//! A [`Step`] is one node of the emitted dependency graph: the files it
//! produces, the files it needs, and the commands that turn one into the
//! other. Steps are values: the algebraic operations ([`Step::merge`],
//! [`Step::replace_targets_with_tag_file`], [`Step::replace_dependencies`])
//! return fresh steps and leave their inputs untouched.
//!
//! # Example
//!
//! ```
//! use wsim_planner::workflow::Step;
//!
//! let step = Step::builder()
//!     .with_target("/fig/rp/rp_201701.nc")
//!     .with_dependency("/fig/results/results_201701.nc::Ws")
//!     .with_command(["wsim_anom", "--obs", "/fig/results/results_201701.nc::Ws"])
//!     .with_comment("Return periods")
//!     .build()
//!     .unwrap();
//!
//! assert!(step.dependencies().contains("/fig/results/results_201701.nc"));
//! assert!(step.working_directories().contains("/fig/rp"));
//! ```

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::strip_qualifier;

use super::ranges::expand_ranges;

/// One command: executable followed by its arguments.
pub type Command = Vec<String>;

/// Path that stands for "no file" and never enters the graph.
const DEV_NULL: &str = "/dev/null";

/// Whether a step runs commands or only names a group of targets.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    #[default]
    Rule,
    /// Named collector with no commands.
    Meta,
}

/// A node of the build graph.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Step {
    targets: BTreeSet<String>,
    dependencies: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    consumes: BTreeSet<String>,
    commands: Vec<Command>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    working_directories: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lock: Option<String>,
    #[serde(default)]
    kind: StepKind,
}

impl Hash for Step {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.targets.hash(state);
    }
}

/// Collects the raw fields of a [`Step`] before normalization.
#[derive(Debug, Clone, Default)]
pub struct StepBuilder {
    targets: Vec<String>,
    dependencies: Vec<String>,
    consumes: Vec<String>,
    commands: Vec<Command>,
    working_directories: Vec<String>,
    comment: Option<String>,
    lock: Option<String>,
}

impl StepBuilder {
    /// Adds an output path.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.targets.push(target.into());
        self
    }

    /// Adds several output paths.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Adds an input path. A `::VAR` qualifier is accepted and stripped.
    pub fn with_dependency(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Adds several input paths.
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Marks inputs that the commands delete.
    pub fn with_consumes<I, S>(mut self, consumes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumes.extend(consumes.into_iter().map(Into::into));
        self
    }

    /// Appends a command.
    pub fn with_command<I, S>(mut self, command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.push(command.into_iter().map(Into::into).collect());
        self
    }

    /// Appends several commands in order.
    pub fn with_commands(mut self, commands: Vec<Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    /// Requires a directory beyond the target directories.
    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directories.push(dir.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_lock(mut self, lock: impl Into<String>) -> Self {
        self.lock = Some(lock.into());
        self
    }

    /// Validates and normalizes the collected fields.
    ///
    /// Range expressions in targets, dependencies and consumes are expanded,
    /// `::VAR` qualifiers stripped, `/dev/null` dropped, and the directory of
    /// every target added to the working directories.
    pub fn build(self) -> Result<Step> {
        if self.commands.is_empty() {
            return Err(Error::argument("a step requires at least one command"));
        }
        for command in &self.commands {
            if command.is_empty() {
                return Err(Error::argument("a command requires an executable"));
            }
            if command.iter().any(|t| t.is_empty()) {
                return Err(Error::argument(format!("empty token in command {:?}", command)));
            }
        }

        let targets = normalize_paths(&self.targets)?;
        if targets.is_empty() {
            return Err(Error::argument("a step requires at least one target"));
        }

        let dependencies = normalize_paths(&self.dependencies)?;
        let consumes = normalize_paths(&self.consumes)?;

        let mut working_directories = normalize_paths(&self.working_directories)?;
        working_directories.extend(targets.iter().filter_map(|t| parent_dir(t)));

        Ok(Step {
            targets,
            dependencies,
            consumes,
            commands: self.commands,
            working_directories,
            comment: self.comment,
            lock: self.lock,
            kind: StepKind::Rule,
        })
    }
}

/// Strips qualifiers, drops `/dev/null`, expands ranges.
fn normalize_paths(paths: &[String]) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for raw in paths {
        let path = strip_qualifier(raw.trim());
        if path.is_empty() {
            return Err(Error::argument(format!("empty path in '{}'", raw)));
        }
        if path == DEV_NULL {
            continue;
        }
        out.extend(expand_ranges(path)?);
    }
    Ok(out)
}

fn parent_dir(path: &str) -> Option<String> {
    Path::new(path)
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
}

impl Step {
    /// Starts a new rule.
    pub fn builder() -> StepBuilder {
        StepBuilder::default()
    }

    /// A named collector with no commands.
    pub fn meta(name: impl Into<String>) -> Self {
        Self {
            targets: BTreeSet::from([name.into()]),
            dependencies: BTreeSet::new(),
            consumes: BTreeSet::new(),
            commands: Vec::new(),
            working_directories: BTreeSet::new(),
            comment: None,
            lock: None,
            kind: StepKind::Meta,
        }
    }

    pub fn targets(&self) -> &BTreeSet<String> {
        &self.targets
    }

    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    pub fn consumes(&self) -> &BTreeSet<String> {
        &self.consumes
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn working_directories(&self) -> &BTreeSet<String> {
        &self.working_directories
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn lock(&self) -> Option<&str> {
        self.lock.as_deref()
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    /// Returns true for collectors without commands.
    pub fn is_meta(&self) -> bool {
        self.kind == StepKind::Meta && self.commands.is_empty()
    }

    /// Returns a copy with a different comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Combines this step with `others` into one step that runs all
    /// commands in order.
    ///
    /// Targets, dependencies and working directories are unioned.
    /// Dependencies produced by an earlier step in the sequence become
    /// internal and leave the dependency set; anything consumed by any step
    /// leaves the target set and is recorded in the combined `consumes`.
    pub fn merge(&self, others: &[Step]) -> Result<Step> {
        let all: Vec<&Step> = std::iter::once(self).chain(others.iter()).collect();

        if all.iter().any(|s| s.lock.is_some()) {
            return Err(Error::contract("steps holding a lock cannot be merged"));
        }
        if all.iter().any(|s| s.kind == StepKind::Meta) {
            return Err(Error::contract("meta steps cannot be merged"));
        }

        let mut targets = BTreeSet::new();
        let mut dependencies = BTreeSet::new();
        let mut consumes = BTreeSet::new();
        let mut commands = Vec::new();
        let mut working_directories = BTreeSet::new();
        let mut comments = Vec::new();

        for step in all {
            dependencies.extend(
                step.dependencies
                    .iter()
                    .filter(|d| !targets.contains(*d))
                    .cloned(),
            );
            targets.extend(step.targets.iter().cloned());
            consumes.extend(step.consumes.iter().cloned());
            commands.extend(step.commands.iter().cloned());
            working_directories.extend(step.working_directories.iter().cloned());
            if let Some(c) = &step.comment {
                comments.push(c.clone());
            }
        }

        targets.retain(|t| !consumes.contains(t));

        Ok(Step {
            targets,
            dependencies,
            consumes,
            commands,
            working_directories,
            comment: if comments.is_empty() { None } else { Some(comments.join("; ")) },
            lock: None,
            kind: StepKind::Rule,
        })
    }

    /// Adds the targets of `steps` to this step's dependencies and hands
    /// the steps back, so a collector can be fed while they are collected.
    pub fn require(&mut self, steps: Vec<Step>) -> Vec<Step> {
        for step in &steps {
            self.dependencies.extend(step.targets.iter().cloned());
        }
        steps
    }

    /// Replaces the targets by a single tag file touched after the
    /// commands complete.
    pub fn replace_targets_with_tag_file(&self, tag_path: &str) -> Step {
        let mut step = self.clone();
        step.commands.push(vec!["touch".to_string(), tag_path.to_string()]);
        step.targets = BTreeSet::from([tag_path.to_string()]);
        if let Some(dir) = parent_dir(tag_path) {
            step.working_directories.insert(dir);
        }
        step
    }

    /// Swaps the whole dependency set.
    pub fn replace_dependencies<I, S>(&self, dependencies: I) -> Result<Step>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw: Vec<String> = dependencies.into_iter().map(Into::into).collect();
        let mut step = self.clone();
        step.dependencies = normalize_paths(&raw)?;
        Ok(step)
    }

    /// A single `mkdir -p` over the sorted working directories.
    pub fn get_mkdir_commands(&self) -> Vec<Command> {
        if self.working_directories.is_empty() {
            return Vec::new();
        }
        let mut command = vec!["mkdir".to_string(), "-p".to_string()];
        command.extend(self.working_directories.iter().cloned());
        vec![command]
    }
}
