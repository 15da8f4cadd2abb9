//! Workspace path generation.
//!
//! Directory contract:
//!
//! ```text
//! <root>[/<sector>][/<distsubdir>]/[basis_]<kind>[_method][_integrated][_summary][_annual]
//! ```
//!
//! Filename contract:
//!
//! ```text
//! [basis_]<kind>[_method][_summary][_model][_Nmo][_month_MM][_TIME][_trgtYYYYMM][_fcstMODEL_MEMBER].nc
//! ```
//!
//! `<distsubdir>` (`<distribution>_<fit start>_<fit end>`) is inserted only
//! for artifacts derived from distribution fits.

use std::path::Path;

use crate::dates;
use crate::error::{Error, Result};

use super::{Basis, Method, Sector};

/// Facets identifying one artifact within its kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facets {
    pub yearmon: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub window: Option<u32>,
    pub target: Option<String>,
    pub model: Option<String>,
    pub member: Option<String>,
    pub summary: bool,
    pub basis: Basis,
    pub sector: Option<Sector>,
    pub method: Option<Method>,
    pub temporary: bool,
}

impl Facets {
    /// Facets for the given yearmon.
    pub fn at(yearmon: impl Into<String>) -> Self {
        Self {
            yearmon: Some(yearmon.into()),
            ..Self::default()
        }
    }

    pub fn window(mut self, window: u32) -> Self {
        self.window = Some(window);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Ensemble-aggregated artifact.
    pub fn summary(mut self) -> Self {
        self.summary = true;
        self
    }

    pub fn basis(mut self, basis: Basis) -> Self {
        self.basis = basis;
        self
    }

    pub fn sector(mut self, sector: Sector) -> Self {
        self.sector = Some(sector);
        self
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    /// Routes the artifact under the temporary root.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    /// Forecast facets for one ensemble member.
    pub fn forecast(self, target: &str, model: &str, member: &str) -> Self {
        self.target(target).model(model).member(member)
    }

    fn effective_window(&self) -> u32 {
        self.window.unwrap_or(1)
    }
}

/// Artifact kinds with workspace-assigned paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Forcing,
    Results,
    ResultsAnnual,
    State,
    ReturnPeriod,
    StandardAnomaly,
    Composite,
    CompositeAnomaly,
    CompositeAnomalyRp,
    CompositeAdjusted,
    Loss,
    YieldAnomaly,
}

impl Kind {
    fn stem(&self) -> &'static str {
        match self {
            Self::Forcing => "forcing",
            Self::Results | Self::ResultsAnnual => "results",
            Self::State => "state",
            Self::ReturnPeriod => "rp",
            Self::StandardAnomaly => "anom",
            Self::Composite => "composite",
            Self::CompositeAnomaly => "composite_anom",
            Self::CompositeAnomalyRp => "composite_anom_rp",
            Self::CompositeAdjusted => "composite_adjusted",
            Self::Loss => "loss",
            Self::YieldAnomaly => "yield_anom",
        }
    }

    fn derived_from_fit(&self) -> bool {
        matches!(
            self,
            Self::ReturnPeriod
                | Self::StandardAnomaly
                | Self::Composite
                | Self::CompositeAnomaly
                | Self::CompositeAnomalyRp
                | Self::CompositeAdjusted
                | Self::Loss
        )
    }

    fn annual(&self) -> bool {
        matches!(self, Self::ResultsAnnual)
    }
}

/// Owner of the output tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    outputs: String,
    tempdir: String,
    distribution_subdir: Option<String>,
}

impl Workspace {
    /// Creates a workspace rooted at `root`, with temporaries under `root/.tmp`.
    pub fn new(root: impl Into<String>) -> Self {
        let outputs = root.into().trim_end_matches('/').to_string();
        let tempdir = join(&outputs, ".tmp");
        Self {
            outputs,
            tempdir,
            distribution_subdir: None,
        }
    }

    /// Overrides the temporary root.
    pub fn with_tempdir(mut self, tempdir: impl Into<String>) -> Self {
        self.tempdir = tempdir.into().trim_end_matches('/').to_string();
        self
    }

    /// Places fit-derived artifacts under `<distribution>_<start>_<end>`.
    pub fn with_distribution(mut self, distribution: &str, fit_start: i32, fit_end: i32) -> Self {
        self.distribution_subdir = Some(format!("{}_{}_{}", distribution, fit_start, fit_end));
        self
    }

    pub fn root(&self) -> &str {
        &self.outputs
    }

    pub fn tempdir(&self) -> &str {
        &self.tempdir
    }

    pub fn distribution_subdir(&self) -> Option<&str> {
        self.distribution_subdir.as_deref()
    }

    pub fn forcing(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::Forcing, f)
    }

    pub fn results(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::Results, f)
    }

    /// Annual aggregate of monthly (or sub-annual integrated) results.
    pub fn results_annual(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::ResultsAnnual, f)
    }

    /// Model state at the start of the month.
    pub fn state(&self, f: &Facets) -> Result<String> {
        if f.effective_window() > 1 {
            return Err(Error::contract("state files are not time-integrated"));
        }
        self.make_path(Kind::State, f)
    }

    pub fn return_period(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::ReturnPeriod, f)
    }

    pub fn standard_anomaly(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::StandardAnomaly, f)
    }

    pub fn composite(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::Composite, f)
    }

    pub fn composite_anomaly(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::CompositeAnomaly, f)
    }

    pub fn composite_anomaly_rp(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::CompositeAnomalyRp, f)
    }

    pub fn composite_adjusted(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::CompositeAdjusted, f)
    }

    /// Loss-factor tables (electric power).
    pub fn loss_factors(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::Loss, f)
    }

    /// Crop yield anomalies (agriculture).
    pub fn yield_anomaly(&self, f: &Facets) -> Result<String> {
        self.make_path(Kind::YieldAnomaly, f)
    }

    /// Distribution fit of `var` for a calendar month (`f.month`) or of an
    /// annual statistic (`annual_stat`); exactly one must be given.
    pub fn fit_obs(&self, var: &str, f: &Facets, annual_stat: Option<&str>) -> Result<String> {
        match (f.month, annual_stat) {
            (Some(_), Some(_)) | (None, None) => {
                return Err(Error::contract(format!(
                    "fit of '{}' requires exactly one of month or annual_stat",
                    var
                )))
            }
            _ => {}
        }
        if f.yearmon.is_some() || f.target.is_some() || f.member.is_some() {
            return Err(Error::contract("fits are not time- or member-specific"));
        }
        if let Some(m) = f.month {
            if !(1..=12).contains(&m) {
                return Err(Error::argument(format!("month {} outside 1-12", m)));
            }
        }

        let dir = self.directory(f, true, &with_prefix(f.basis, "fits"));

        let mut name = with_prefix(f.basis, var);
        let window = f.effective_window();
        if window > 1 {
            name.push_str(&format!("_{}mo", window));
        }
        match (f.month, annual_stat) {
            (Some(m), _) => name.push_str(&format!("_month_{:02}", m)),
            (None, Some(stat)) => name.push_str(&format!("_annual_{}", stat)),
            _ => {}
        }

        Ok(join(&dir, &format!("{}.nc", name)))
    }

    /// Fit of a composite-anomaly indicator (`deficit` or `surplus`).
    pub fn fit_composite_anomalies(&self, indicator: &str, window: u32, month: u32) -> Result<String> {
        self.fit_obs(
            &format!("composite_anom_{}", indicator),
            &Facets::default().window(window).month(month),
            None,
        )
    }

    /// Initial spinup state built from soil water capacity.
    pub fn initial_state(&self) -> String {
        join(&self.spinup_dir(), "initial_state.nc")
    }

    /// Climate-normal forcing for one calendar month.
    pub fn climate_norm_forcing(&self, month: u32) -> String {
        join(
            &join(&self.spinup_dir(), "climate_norm_forcing"),
            &format!("climate_norm_forcing_month_{:02}.nc", month),
        )
    }

    /// State after the looped climate-normal run.
    pub fn final_norm_state(&self) -> String {
        join(&self.spinup_dir(), "final_state_norms.nc")
    }

    /// Final climate-normal state, stamped with the first historical yearmon.
    pub fn final_norm_state_at(&self, yearmon: &str) -> String {
        join(&self.spinup_dir(), &format!("final_state_norms_{}.nc", yearmon))
    }

    /// State from the first forward pass over the historical record. May be
    /// a range expression.
    pub fn spinup_state(&self, yearmon: &str) -> String {
        join(
            &join(&self.spinup_dir(), "spinup_state"),
            &format!("spinup_state_{}.nc", yearmon),
        )
    }

    /// Mean of the first-pass states for one calendar month.
    pub fn spinup_mean_state(&self, month: u32) -> String {
        join(
            &join(&self.spinup_dir(), "spinup_mean_state"),
            &format!("spinup_mean_state_month_{:02}.nc", month),
        )
    }

    /// Sector-level artifact computed once during spinup (storage tables,
    /// enriched point layers, ...).
    pub fn sector_spinup(&self, sector: Sector, name: &str) -> String {
        join(&join(&join(&self.outputs, sector.name()), "spinup"), name)
    }

    /// Tag file standing in for a large set of targets.
    pub fn tag(&self, name: &str) -> String {
        join(&join(&self.tempdir, "tags"), &format!("{}.tag", name))
    }

    fn spinup_dir(&self) -> String {
        join(&self.outputs, "spinup")
    }

    fn directory(&self, f: &Facets, derived: bool, leaf: &str) -> String {
        let mut dir = if f.temporary {
            self.tempdir.clone()
        } else {
            self.outputs.clone()
        };
        if let Some(sector) = f.sector {
            dir = join(&dir, sector.name());
        }
        if derived {
            if let Some(sub) = &self.distribution_subdir {
                dir = join(&dir, sub);
            }
        }
        join(&dir, leaf)
    }

    fn make_path(&self, kind: Kind, f: &Facets) -> Result<String> {
        check_facets(kind, f)?;

        let window = f.effective_window();
        let stem = with_prefix(f.basis, kind.stem());

        let mut dirname = stem.clone();
        if let Some(method) = f.method {
            dirname.push('_');
            dirname.push_str(method.name());
        }
        if window > 1 {
            dirname.push_str("_integrated");
        }
        if f.summary {
            dirname.push_str("_summary");
        }
        if kind.annual() {
            dirname.push_str("_annual");
        }

        let mut name = stem;
        if let Some(method) = f.method {
            name.push('_');
            name.push_str(method.name());
        }
        if f.summary {
            name.push_str("_summary");
        }
        if let (Some(model), None) = (&f.model, &f.member) {
            name.push('_');
            name.push_str(&model.to_lowercase());
        }
        if window > 1 {
            name.push_str(&format!("_{}mo", window));
        }
        if let Some(m) = f.month {
            name.push_str(&format!("_month_{:02}", m));
        }
        if let Some(ym) = &f.yearmon {
            name.push('_');
            name.push_str(ym);
        }
        if let Some(y) = f.year {
            name.push_str(&format!("_{}", dates::format(y, None, None)));
        }
        if let Some(target) = &f.target {
            name.push_str("_trgt");
            name.push_str(target);
        }
        if let (Some(model), Some(member)) = (&f.model, &f.member) {
            name.push_str(&format!("_fcst{}_{}", model.to_lowercase(), member));
        }

        let dir = self.directory(f, kind.derived_from_fit(), &dirname);
        Ok(join(&dir, &format!("{}.nc", name)))
    }
}

fn check_facets(kind: Kind, f: &Facets) -> Result<()> {
    if f.member.is_some() && f.model.is_none() {
        return Err(Error::contract("specifying a member requires a model"));
    }
    if f.target.is_some() && f.member.is_none() && !f.summary {
        return Err(Error::contract(
            "specifying a forecast target requires a member or a summary",
        ));
    }
    if f.summary && f.member.is_some() {
        return Err(Error::contract("an ensemble summary cannot name a member"));
    }
    if f.yearmon.is_some() && f.year.is_some() {
        return Err(Error::contract("specify either a yearmon or a year, not both"));
    }
    if f.method.is_some() && f.sector != Some(Sector::Agriculture) {
        return Err(Error::contract("cultivation method applies only to agriculture"));
    }
    if f.window == Some(0) {
        return Err(Error::argument("integration window must be at least one month"));
    }
    if kind.annual() {
        if f.effective_window() >= 12 {
            return Err(Error::contract(format!(
                "annual summaries of {}-month integrations are not defined",
                f.effective_window()
            )));
        }
        if f.year.is_none() {
            return Err(Error::contract("annual artifacts require a year"));
        }
    } else if f.year.is_some() {
        return Err(Error::contract("only annual artifacts are indexed by year"));
    }
    if let Some(ym) = &f.yearmon {
        // Range expressions pass through verbatim for the external tools.
        if !ym.starts_with('[') && !dates::is_yearmon(ym) {
            return Err(Error::InvalidDate(ym.clone()));
        }
    }
    if let Some(t) = &f.target {
        if !dates::is_yearmon(t) {
            return Err(Error::InvalidDate(t.clone()));
        }
    }
    Ok(())
}

fn with_prefix(basis: Basis, stem: &str) -> String {
    match basis.prefix() {
        Some(prefix) => format!("{}_{}", prefix, stem),
        None => stem.to_string(),
    }
}

fn join(dir: &str, name: &str) -> String {
    Path::new(dir).join(name).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    fn workspace() -> Workspace {
        Workspace::new("/mnt/fig").with_distribution("gev", 1950, 2009)
    }

    #[test]
    fn test_return_period_integrated() {
        let ws = workspace();
        assert_eq!(
            ws.return_period(&Facets::at("201612").window(24)).unwrap(),
            "/mnt/fig/gev_1950_2009/rp_integrated/rp_24mo_201612.nc"
        );
    }

    #[test]
    fn test_results_not_derived() {
        let ws = workspace();
        assert_eq!(
            ws.results(&Facets::at("201701")).unwrap(),
            "/mnt/fig/results/results_201701.nc"
        );
        assert_eq!(
            ws.results(&Facets::at("201701").window(1)).unwrap(),
            "/mnt/fig/results/results_201701.nc"
        );
    }

    #[test]
    fn test_forecast_member_path() {
        let ws = workspace();
        assert_eq!(
            ws.results(&Facets::at("201701").window(3).forecast("201703", "CFSv2", "2017012506"))
                .unwrap(),
            "/mnt/fig/results_integrated/results_3mo_201701_trgt201703_fcstcfsv2_2017012506.nc"
        );
    }

    #[test]
    fn test_summary_and_model_summary() {
        let ws = workspace();
        assert_eq!(
            ws.standard_anomaly(&Facets::at("201701").target("201704").summary())
                .unwrap(),
            "/mnt/fig/gev_1950_2009/anom_summary/anom_summary_201701_trgt201704.nc"
        );
        assert_eq!(
            ws.results(&Facets::at("201701").target("201704").summary().model("CFSv2"))
                .unwrap(),
            "/mnt/fig/results_summary/results_summary_cfsv2_201701_trgt201704.nc"
        );
    }

    #[test]
    fn test_sector_basis_and_method() {
        let ws = workspace();
        assert_eq!(
            ws.return_period(
                &Facets::at("201701")
                    .window(12)
                    .basis(Basis::Basin)
                    .sector(Sector::ElectricPower)
            )
            .unwrap(),
            "/mnt/fig/electric_power/gev_1950_2009/basin_rp_integrated/basin_rp_12mo_201701.nc"
        );
        assert_eq!(
            ws.yield_anomaly(
                &Facets::at("201701")
                    .sector(Sector::Agriculture)
                    .method(Method::Irrigated)
            )
            .unwrap(),
            "/mnt/fig/agriculture/yield_anom_irrigated/yield_anom_irrigated_201701.nc"
        );
    }

    #[test]
    fn test_temporary_root() {
        let ws = workspace();
        let path = ws
            .results(&Facets::at("201701").basis(Basis::Basin).temporary())
            .unwrap();
        assert_eq!(path, "/mnt/fig/.tmp/basin_results/basin_results_201701.nc");
    }

    #[test]
    fn test_fit_paths() {
        let ws = workspace();
        assert_eq!(
            ws.fit_obs("Bt_RO_sum", &Facets::default().window(6).month(3), None)
                .unwrap(),
            "/mnt/fig/gev_1950_2009/fits/Bt_RO_sum_6mo_month_03.nc"
        );
        assert_eq!(
            ws.fit_obs(
                "Bt_RO",
                &Facets::default().basis(Basis::Basin).sector(Sector::ElectricPower),
                Some("sum")
            )
            .unwrap(),
            "/mnt/fig/electric_power/gev_1950_2009/basin_fits/basin_Bt_RO_annual_sum.nc"
        );
        assert_eq!(
            ws.fit_composite_anomalies("deficit", 3, 12).unwrap(),
            "/mnt/fig/gev_1950_2009/fits/composite_anom_deficit_3mo_month_12.nc"
        );
    }

    #[test]
    fn test_fit_requires_exactly_one_of_month_or_stat() {
        let ws = workspace();
        assert!(ws.fit_obs("T", &Facets::default(), None).is_err());
        assert!(ws
            .fit_obs("T", &Facets::default().month(1), Some("sum"))
            .is_err());
    }

    #[test]
    fn test_member_requires_model() {
        let ws = workspace();
        let err = ws
            .results(&Facets::at("201701").target("201702").member("2017012500"))
            .unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
    }

    #[test]
    fn test_target_requires_member_or_summary() {
        let ws = workspace();
        assert!(ws.results(&Facets::at("201701").target("201702")).is_err());
        assert!(ws
            .results(&Facets::at("201701").target("201702").summary())
            .is_ok());
    }

    #[test]
    fn test_annual_forbids_long_windows() {
        let ws = workspace();
        assert!(ws
            .results_annual(&Facets::default().year(2000).window(12))
            .is_err());
        assert_eq!(
            ws.results_annual(&Facets::default().year(2000).basis(Basis::Basin).sector(Sector::ElectricPower))
                .unwrap(),
            "/mnt/fig/electric_power/basin_results_annual/basin_results_2000.nc"
        );
    }

    #[test]
    fn test_method_requires_agriculture() {
        let ws = workspace();
        assert!(ws
            .results(&Facets::at("201701").method(Method::Rainfed))
            .is_err());
    }

    #[test]
    fn test_range_expression_passes_through() {
        let ws = workspace();
        assert_eq!(
            ws.results(&Facets::at("[195001:200901:12]").window(1)).unwrap(),
            "/mnt/fig/results/results_[195001:200901:12].nc"
        );
    }

    #[test]
    fn test_paths_deterministic() {
        let ws = workspace();
        let f = Facets::at("201701").window(6).forecast("201705", "CFSv2", "2017012812");
        assert_eq!(ws.composite(&f).unwrap(), ws.composite(&f).unwrap());
    }

    #[test]
    fn test_facet_product_is_collision_free() {
        let ws = workspace();
        let mut seen = HashSet::new();
        let mut count = 0;

        for window in [1, 3, 6, 12] {
            for target in [None, Some("201702"), Some("201703")] {
                for member in [None, Some("2017012500"), Some("2017012506")] {
                    for summary in [false, true] {
                        for basis in [Basis::Pixel, Basis::Basin, Basis::Country] {
                            let mut f = Facets::at("201701").window(window).basis(basis);
                            if let Some(t) = target {
                                f = f.target(t);
                            }
                            if let Some(m) = member {
                                f = f.model("CFSv2").member(m);
                            }
                            if summary {
                                f = f.summary();
                            }
                            for path in [ws.return_period(&f), ws.results(&f), ws.composite(&f)]
                                .into_iter()
                                .flatten()
                            {
                                count += 1;
                                assert!(seen.insert(path.clone()), "collision: {}", path);
                            }
                        }
                    }
                }
            }
        }

        assert!(count > 0);
    }

    #[test]
    fn test_spinup_paths() {
        let ws = workspace();
        assert_eq!(
            ws.climate_norm_forcing(3),
            "/mnt/fig/spinup/climate_norm_forcing/climate_norm_forcing_month_03.nc"
        );
        assert_eq!(
            ws.spinup_mean_state(1),
            "/mnt/fig/spinup/spinup_mean_state/spinup_mean_state_month_01.nc"
        );
        assert_eq!(ws.tag("spinup_states"), "/mnt/fig/.tmp/tags/spinup_states.tag");
    }
}
