//! Named collector steps shared by the phase builders.

use std::collections::BTreeMap;

use log::debug;

use super::step::Step;

/// Meta steps keyed by name. Phase builders attach their outputs to a
/// collector while generating them; the collectors join the graph last.
#[derive(Debug, Default)]
pub struct MetaStepRegistry {
    steps: BTreeMap<String, Step>,
}

impl MetaStepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The collector named `name`, created on first use.
    pub fn get(&mut self, name: &str) -> &mut Step {
        self.steps
            .entry(name.to_string())
            .or_insert_with(|| Step::meta(name))
    }

    /// Makes `name` depend on the targets of `steps` and hands them back.
    pub fn require(&mut self, name: &str, steps: Vec<Step>) -> Vec<Step> {
        debug!("Collecting {} steps under '{}'", steps.len(), name);
        self.get(name).require(steps)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// All collectors, in name order.
    pub fn into_steps(self) -> Vec<Step> {
        self.steps.into_values().collect()
    }
}
