//! Workflow Graph Module
//!
//! Data structures and utilities for assembling and checking the build graph
//! of a monthly run.
//!
//! # Structure
//!
//! - [`step`]: Build steps and their construction
//! - [`ranges`]: Date range expressions in filenames
//! - [`registry`]: Named collector steps
//! - [`validator`]: Duplicate and unbuildable target detection
//! - [`planner`]: Assembly of the complete step list

pub mod planner;
pub mod ranges;
pub mod registry;
pub mod step;
pub mod validator;

pub use planner::{PlanOptions, WorkflowPlanner};
pub use ranges::{expand_ranges, has_range};
pub use registry::MetaStepRegistry;
pub use step::{Command, Step, StepBuilder, StepKind};
pub use validator::{validate_steps, ValidationError};
