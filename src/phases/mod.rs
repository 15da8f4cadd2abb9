//! Phase Builders
//!
//! Generate the steps of each phase of a monthly run from a configuration.
//!
//! # Structure
//!
//! - [`actions`]: Step builders shared by all phases
//! - [`spinup`]: One-time model spinup and distribution fitting
//! - [`observed`]: Steps for one month of observations
//! - [`forecast`]: Steps for the forecasts issued in one month

pub mod actions;
pub mod forecast;
pub mod observed;
pub mod spinup;

pub use actions::Realization;
pub use forecast::{ensemble_members, forecast_steps, monthly_forecast};
pub use observed::monthly_observed;
pub use spinup::spinup;
