//! wsim-planner - Build Graph Generator for WSIM
//!
//! Generates the dependency graph of a monthly run of the Water Security
//! Indicator Model: data preparation, land-surface model spinup,
//! distribution fitting, return periods, composite indicators, forecast
//! ensembles and sector overlays. The graph is written for an external
//! build tool, which does the actual work.
//!
//! # Architecture
//!
//! - [`dates`]: yearmon arithmetic and range expressions
//! - [`grid`]: model grid descriptor
//! - [`paths`]: variable references and the output tree
//! - [`workflow`]: build steps, collectors, validation and the planner
//! - [`commands`]: constructors for the external tools
//! - [`sources`]: observed, forecast and static data sources
//! - [`config`]: configurations and their loader
//! - [`phases`]: spinup, observed and forecast step builders
//! - [`sectors`]: electric power and agriculture overlays
//! - [`emit`]: build-tool output formats
//!
//! # Example
//!
//! ```rust,no_run
//! use wsim_planner::emit::{render, EmitterKind, Substitutions};
//! use wsim_planner::workflow::PlanOptions;
//! use wsim_planner::{load_config, WorkflowPlanner};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("configs/cfs.yaml", "/mnt/source", "/mnt/fcst", &[])?;
//!
//!     let planner = WorkflowPlanner::new(config.as_ref(), PlanOptions::new("201701", "201701"));
//!     let steps = planner.plan()?;
//!
//!     let subs = Substitutions::from([("BINDIR".to_string(), "/wsim".to_string())]);
//!     let makefile = render(&steps, EmitterKind::Make.create().as_mut(), &subs)?;
//!     std::fs::write("Makefile", makefile)?;
//!     Ok(())
//! }
//! ```

pub mod commands;
pub mod config;
pub mod dates;
pub mod emit;
pub mod error;
pub mod grid;
pub mod paths;
pub mod phases;
pub mod sectors;
pub mod sources;
pub mod workflow;

// Re-export commonly used types
pub use config::{load_config, Config};
pub use error::{Error, Result};
pub use workflow::{Step, WorkflowPlanner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "wsim-planner";
