//! Build Graph Validation
//!
//! Checks run once all steps have been generated:
//! - every target has exactly one producing step
//! - every step can be reached from external inputs
//!
//! Meta steps without commands take part in neither check. Problems are
//! collected and reported together rather than failing on the first one.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use log::{debug, info};

use super::step::Step;

/// Graph-level problems, one per offending item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateTarget { target: String, producers: usize },
    Unbuildable { target: String, dependency: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateTarget { target, producers } => {
                write!(f, "Duplicate target '{}' produced by {} steps", target, producers)
            }
            Self::Unbuildable { target, dependency } => {
                write!(
                    f,
                    "Target '{}' cannot be built: no way to produce '{}'",
                    target, dependency
                )
            }
        }
    }
}

/// Targets produced by more than one step, in sorted order.
pub fn find_duplicate_targets(steps: &[Step]) -> Vec<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for step in steps.iter().filter(|s| !s.is_meta()) {
        for target in step.targets() {
            *counts.entry(target.as_str()).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(t, _)| t.to_string())
        .collect()
}

/// Depth of a step in the graph; `None` stands for "unreachable".
type Depth = Option<usize>;

#[derive(Clone, Copy)]
enum Visit {
    InProgress,
    Done(Depth),
}

struct DepthFinder<'a, F> {
    steps: &'a [Step],
    producers: HashMap<&'a str, usize>,
    is_external: F,
    visits: HashMap<usize, Visit>,
}

impl<'a, F: Fn(&str) -> bool> DepthFinder<'a, F> {
    fn new(steps: &'a [Step], is_external: F) -> Self {
        let mut producers = HashMap::new();
        for (idx, step) in steps.iter().enumerate().filter(|(_, s)| !s.is_meta()) {
            for target in step.targets() {
                producers.insert(target.as_str(), idx);
            }
        }
        Self {
            steps,
            producers,
            is_external,
            visits: HashMap::new(),
        }
    }

    /// 0 without dependencies, one more than the deepest producer otherwise.
    fn depth(&mut self, idx: usize) -> Depth {
        match self.visits.get(&idx) {
            Some(Visit::Done(d)) => return *d,
            // A cycle can never be built.
            Some(Visit::InProgress) => return None,
            None => {}
        }
        self.visits.insert(idx, Visit::InProgress);

        let mut deepest = 0;
        let mut depth = Some(0);
        for dep in self.steps[idx].dependencies() {
            if (self.is_external)(dep) {
                continue;
            }
            let Some(&producer) = self.producers.get(dep.as_str()) else {
                depth = None;
                break;
            };
            match self.depth(producer) {
                Some(d) => {
                    deepest = deepest.max(d + 1);
                    depth = Some(deepest);
                }
                None => {
                    depth = None;
                    break;
                }
            }
        }

        self.visits.insert(idx, Visit::Done(depth));
        depth
    }

    /// First dependency of a step that blocks it.
    fn blocker(&mut self, idx: usize) -> String {
        let deps: Vec<&String> = self.steps[idx].dependencies().iter().collect();
        for dep in deps {
            if (self.is_external)(dep) {
                continue;
            }
            match self.producers.get(dep.as_str()).copied() {
                None => return dep.clone(),
                Some(p) if self.depth(p).is_none() => return dep.clone(),
                Some(_) => {}
            }
        }
        String::new()
    }
}

/// Steps that can never be built because some dependency has no producer,
/// directly or transitively. `is_external` names files that exist before
/// the build starts.
pub fn unbuildable_targets<'a, F>(steps: &'a [Step], is_external: F) -> Vec<&'a Step>
where
    F: Fn(&str) -> bool,
{
    let mut finder = DepthFinder::new(steps, is_external);
    let mut max_depth = 0;
    let mut unbuildable = Vec::new();

    for (idx, step) in steps.iter().enumerate().filter(|(_, s)| !s.is_meta()) {
        match finder.depth(idx) {
            Some(d) => max_depth = max_depth.max(d),
            None => unbuildable.push(step),
        }
    }

    debug!("Build graph depth: {}", max_depth);
    unbuildable
}

/// Runs every graph check and reports all problems found.
pub fn validate_steps<F>(steps: &[Step], is_external: F) -> Result<(), Vec<ValidationError>>
where
    F: Fn(&str) -> bool,
{
    info!("Validating build graph with {} steps", steps.len());

    let mut errors: Vec<ValidationError> = Vec::new();

    let producers_of = |target: &str| {
        steps
            .iter()
            .filter(|s| !s.is_meta() && s.targets().contains(target))
            .count()
    };
    for target in find_duplicate_targets(steps) {
        let producers = producers_of(&target);
        errors.push(ValidationError::DuplicateTarget { target, producers });
    }

    let mut finder = DepthFinder::new(steps, &is_external);
    for (idx, step) in steps.iter().enumerate().filter(|(_, s)| !s.is_meta()) {
        if finder.depth(idx).is_none() {
            let dependency = finder.blocker(idx);
            for target in step.targets() {
                errors.push(ValidationError::Unbuildable {
                    target: target.clone(),
                    dependency: dependency.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        info!("Build graph validated");
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(targets: &[&str], deps: &[&str]) -> Step {
        Step::builder()
            .with_targets(targets.iter().copied())
            .with_dependencies(deps.iter().copied())
            .with_command(["true"])
            .build()
            .unwrap()
    }

    fn no_externals(_: &str) -> bool {
        false
    }

    #[test]
    fn test_no_duplicates() {
        let steps = vec![step(&["a"], &[]), step(&["b"], &["a"])];
        assert!(find_duplicate_targets(&steps).is_empty());
    }

    #[test]
    fn test_duplicate_target() {
        let steps = vec![step(&["a", "b"], &[]), step(&["b"], &[]), step(&["c"], &[])];
        assert_eq!(find_duplicate_targets(&steps), vec!["b".to_string()]);
    }

    #[test]
    fn test_meta_steps_excluded() {
        let mut meta = Step::meta("all");
        let steps = meta.require(vec![step(&["a"], &[])]);
        let mut all = steps;
        all.push(meta);
        all.push(Step::meta("all"));
        assert!(find_duplicate_targets(&all).is_empty());
        assert!(unbuildable_targets(&all, no_externals).is_empty());
    }

    #[test]
    fn test_unbuildable_missing_producer() {
        let steps = vec![
            step(&["a"], &[]),
            step(&["b"], &["a", "missing"]),
            step(&["c"], &["b"]),
            step(&["d"], &["a"]),
        ];
        let bad: Vec<&str> = unbuildable_targets(&steps, no_externals)
            .into_iter()
            .flat_map(|s| s.targets().iter().map(String::as_str))
            .collect();
        assert_eq!(bad, vec!["b", "c"]);
    }

    #[test]
    fn test_external_inputs_are_buildable() {
        let steps = vec![step(&["b"], &["/source/raw.nc"])];
        assert_eq!(unbuildable_targets(&steps, no_externals).len(), 1);
        assert!(unbuildable_targets(&steps, |p| p.starts_with("/source")).is_empty());
    }

    #[test]
    fn test_cycle_is_unbuildable() {
        let steps = vec![step(&["a"], &["b"]), step(&["b"], &["a"])];
        assert_eq!(unbuildable_targets(&steps, no_externals).len(), 2);
    }

    #[test]
    fn test_validate_steps_reports_everything() {
        let steps = vec![step(&["a"], &[]), step(&["a"], &[]), step(&["c"], &["x"])];
        let errors = validate_steps(&steps, no_externals).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::DuplicateTarget {
                    target: "a".to_string(),
                    producers: 2
                },
                ValidationError::Unbuildable {
                    target: "c".to_string(),
                    dependency: "x".to_string()
                },
            ]
        );
        assert!(errors[1].to_string().contains("'x'"));
    }

    #[test]
    fn test_validate_steps_ok() {
        let steps = vec![step(&["a"], &[]), step(&["b"], &["a"])];
        assert!(validate_steps(&steps, no_externals).is_ok());
    }
}
