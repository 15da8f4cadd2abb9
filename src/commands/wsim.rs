//! Constructors for the WSIM scientific tools.

use crate::error::{Error, Result};
use crate::workflow::step::Step;

use super::{bin, push_each, require_some, validate_attributes};

/// Static inputs every LSM run reads.
#[derive(Debug, Clone, PartialEq)]
pub struct LsmStatics {
    /// Soil water holding capacity, `FILE::VAR`.
    pub wc: String,
    pub flowdir: String,
    pub elevation: String,
}

/// Computes return periods and/or standard anomalies of observed values
/// against fitted distributions.
pub fn wsim_anom<S: AsRef<str>>(
    fits: &[S],
    obs: &[S],
    rp: Option<&str>,
    sa: Option<&str>,
) -> Result<Step> {
    require_some("wsim_anom", "fit", fits)?;
    require_some("wsim_anom", "observation", obs)?;
    if rp.is_none() && sa.is_none() {
        return Err(Error::argument(
            "wsim_anom requires a return period or standard anomaly output",
        ));
    }

    let mut cmd = vec![bin("wsim_anom.R")];
    push_each(&mut cmd, "--fits", fits);
    push_each(&mut cmd, "--obs", obs);

    let mut builder = Step::builder()
        .with_dependencies(fits.iter().map(|f| f.as_ref()))
        .with_dependencies(obs.iter().map(|o| o.as_ref()));

    if let Some(rp) = rp {
        cmd.extend(["--rp".to_string(), rp.to_string()]);
        builder = builder.with_target(rp);
    }
    if let Some(sa) = sa {
        cmd.extend(["--sa".to_string(), sa.to_string()]);
        builder = builder.with_target(sa);
    }

    builder.with_command(cmd).build()
}

/// Fits a statistical distribution to a series of observations.
pub fn wsim_fit<S: AsRef<str>>(
    distribution: &str,
    inputs: &[S],
    output: &str,
    window: u32,
    attrs: &[S],
) -> Result<Step> {
    require_some("wsim_fit", "input", inputs)?;
    validate_attributes(attrs)?;

    let mut cmd = vec![
        bin("wsim_fit.R"),
        "--distribution".to_string(),
        distribution.to_string(),
    ];
    push_each(&mut cmd, "--input", inputs);
    cmd.extend(["--output".to_string(), output.to_string()]);
    cmd.extend([
        "--attr".to_string(),
        format!("integration_window_months={}", window),
    ]);
    push_each(&mut cmd, "--attr", attrs);

    Step::builder()
        .with_target(output)
        .with_dependencies(inputs.iter().map(|i| i.as_ref()))
        .with_command(cmd)
        .build()
}

/// Runs the land-surface model from `state` over each forcing file.
///
/// `forcing`, `results` and `next_state` may be range expressions. With
/// `loops`, the forcing sequence is repeated that many times and only the
/// final state is written.
pub fn wsim_lsm<S: AsRef<str>>(
    statics: &LsmStatics,
    state: &str,
    forcing: &[S],
    results: Option<&str>,
    next_state: Option<&str>,
    loops: Option<u32>,
) -> Result<Step> {
    require_some("wsim_lsm", "forcing", forcing)?;
    if results.is_none() && next_state.is_none() {
        return Err(Error::argument("wsim_lsm produces neither results nor states"));
    }

    let mut cmd = vec![
        bin("wsim_lsm.R"),
        "--state".to_string(),
        state.to_string(),
        "--elevation".to_string(),
        statics.elevation.clone(),
        "--flowdir".to_string(),
        statics.flowdir.clone(),
        "--wc".to_string(),
        statics.wc.clone(),
    ];
    push_each(&mut cmd, "--forcing", forcing);

    let mut builder = Step::builder()
        .with_dependency(state)
        .with_dependencies([&statics.elevation, &statics.flowdir, &statics.wc])
        .with_dependencies(forcing.iter().map(|f| f.as_ref()));

    if let Some(results) = results {
        cmd.extend(["--results".to_string(), results.to_string()]);
        builder = builder.with_target(results);
    }
    if let Some(next_state) = next_state {
        cmd.extend(["--next_state".to_string(), next_state.to_string()]);
        builder = builder.with_target(next_state);
    }
    if let Some(n) = loops {
        cmd.extend(["--loop".to_string(), n.to_string()]);
    }

    builder.with_command(cmd).build()
}

/// Combines variables from several files into one.
pub fn wsim_merge<S: AsRef<str>>(inputs: &[S], output: &str, attrs: &[S]) -> Result<Step> {
    require_some("wsim_merge", "input", inputs)?;
    validate_attributes(attrs)?;

    let mut cmd = vec![bin("wsim_merge.R")];
    push_each(&mut cmd, "--input", inputs);
    cmd.extend(["--output".to_string(), output.to_string()]);
    push_each(&mut cmd, "--attr", attrs);

    Step::builder()
        .with_target(output)
        .with_dependencies(inputs.iter().map(|i| i.as_ref()))
        .with_command(cmd)
        .build()
}

/// Quantile-maps a raw forecast variable from the retrospective forecast
/// distribution onto the observed one. With `append` the variable is added
/// to an existing output file.
pub fn wsim_correct(
    retro: &str,
    obs: &str,
    forecast: &str,
    output: &str,
    append: bool,
) -> Result<Step> {
    let mut cmd = vec![
        bin("wsim_correct.R"),
        "--retro".to_string(),
        retro.to_string(),
        "--obs".to_string(),
        obs.to_string(),
        "--forecast".to_string(),
        forecast.to_string(),
        "--output".to_string(),
        output.to_string(),
    ];
    if append {
        cmd.push("--append".to_string());
    }

    Step::builder()
        .with_target(output)
        .with_dependencies([retro, obs, forecast])
        .with_command(cmd)
        .build()
}

/// Arguments of a `wsim_integrate` invocation.
///
/// Used for rolling time integration, climatological means and weighted
/// ensemble summaries alike.
#[derive(Debug, Clone, Default)]
pub struct Integrate {
    inputs: Vec<String>,
    stats: Vec<String>,
    output: String,
    window: Option<u32>,
    weights: Vec<f64>,
    attrs: Vec<String>,
    keep_varnames: bool,
}

impl Integrate {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs.extend(inputs.into_iter().map(Into::into));
        self
    }

    /// Statistics, either bare (`q50`) or restricted to variables
    /// (`sum::Pr,RO_mm`).
    pub fn with_stats<I, S>(mut self, stats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stats.extend(stats.into_iter().map(Into::into));
        self
    }

    /// Rolling window length; input and output may then be range expressions.
    pub fn with_window(mut self, window: u32) -> Self {
        self.window = Some(window);
        self
    }

    /// One weight per input, in input order.
    pub fn with_weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_attrs<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs.extend(attrs.into_iter().map(Into::into));
        self
    }

    /// Keeps input variable names instead of suffixing the statistic.
    pub fn keep_varnames(mut self) -> Self {
        self.keep_varnames = true;
        self
    }

    pub fn build(self) -> Result<Step> {
        require_some("wsim_integrate", "input", &self.inputs)?;
        require_some("wsim_integrate", "statistic", &self.stats)?;
        validate_attributes(&self.attrs)?;
        if !self.weights.is_empty() && self.weights.len() != self.inputs.len() {
            return Err(Error::argument(format!(
                "wsim_integrate got {} weights for {} inputs",
                self.weights.len(),
                self.inputs.len()
            )));
        }
        if self.window == Some(0) {
            return Err(Error::argument("integration window must be positive"));
        }

        let mut cmd = vec![bin("wsim_integrate.R")];
        push_each(&mut cmd, "--stat", &self.stats);
        push_each(&mut cmd, "--input", &self.inputs);
        let weights: Vec<String> = self.weights.iter().map(|w| w.to_string()).collect();
        push_each(&mut cmd, "--weight", &weights);
        if let Some(window) = self.window {
            cmd.extend(["--window".to_string(), window.to_string()]);
        }
        if self.keep_varnames {
            cmd.push("--keepvarnames".to_string());
        }
        push_each(&mut cmd, "--attr", &self.attrs);
        cmd.extend(["--output".to_string(), self.output.clone()]);

        Step::builder()
            .with_target(self.output)
            .with_dependencies(self.inputs)
            .with_command(cmd)
            .build()
    }
}

/// Combines return periods (or anomalies) of several variables into
/// surplus, deficit and both indicators.
pub fn wsim_composite<S: AsRef<str>>(
    surplus: &[S],
    deficit: &[S],
    both_threshold: f64,
    mask: Option<&str>,
    output: &str,
) -> Result<Step> {
    require_some("wsim_composite", "surplus variable", surplus)?;
    require_some("wsim_composite", "deficit variable", deficit)?;

    let mut cmd = vec![bin("wsim_composite.R")];
    push_each(&mut cmd, "--surplus", surplus);
    push_each(&mut cmd, "--deficit", deficit);
    cmd.extend(["--both_threshold".to_string(), both_threshold.to_string()]);

    let mut builder = Step::builder()
        .with_target(output)
        .with_dependencies(surplus.iter().map(|s| s.as_ref()))
        .with_dependencies(deficit.iter().map(|d| d.as_ref()));

    if let Some(mask) = mask {
        cmd.extend(["--mask".to_string(), mask.to_string()]);
        builder = builder.with_dependency(mask);
    }
    cmd.extend(["--output".to_string(), output.to_string()]);

    builder.with_command(cmd).build()
}

/// Accumulates a runoff variable downstream, over a flow-direction grid
/// or a basin downstream-id table.
pub fn wsim_flow(input: &str, flowdir: &str, varname: &str, output: &str) -> Result<Step> {
    Step::builder()
        .with_target(output)
        .with_dependencies([input, flowdir])
        .with_command([
            bin("wsim_flow.R").as_str(),
            "--input",
            input,
            "--flowdir",
            flowdir,
            "--varname",
            varname,
            "--output",
            output,
        ])
        .build()
}

/// Aggregates point records into polygon summaries keyed by `id_field`.
pub fn wsim_polygon_summary(
    input: &str,
    id_field: &str,
    stats: &[&str],
    output: &str,
) -> Result<Step> {
    require_some("wsim_polygon_summary", "statistic", stats)?;

    let mut cmd = vec![
        bin("wsim_polygon_summary.R"),
        "--input".to_string(),
        input.to_string(),
        "--id".to_string(),
        id_field.to_string(),
    ];
    push_each(&mut cmd, "--stat", stats);
    cmd.extend(["--output".to_string(), output.to_string()]);

    Step::builder()
        .with_target(output)
        .with_dependency(input)
        .with_command(cmd)
        .build()
}

/// Zonal statistics of rasters over polygons with `exactextract`.
#[derive(Debug, Clone)]
pub struct ZonalStats {
    polygons: String,
    id_field: String,
    rasters: Vec<(String, String, Option<String>)>,
    weights: Option<(String, String)>,
    stats: Vec<String>,
    output: String,
}

impl ZonalStats {
    pub fn new(polygons: impl Into<String>, id_field: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            polygons: polygons.into(),
            id_field: id_field.into(),
            rasters: Vec::new(),
            weights: None,
            stats: Vec::new(),
            output: output.into(),
        }
    }

    /// Adds a raster under `name`, optionally one netCDF variable of it.
    pub fn with_raster(mut self, name: &str, file: &str, var: Option<&str>) -> Self {
        self.rasters
            .push((name.to_string(), file.to_string(), var.map(str::to_string)));
        self
    }

    pub fn with_weights(mut self, name: &str, file: &str) -> Self {
        self.weights = Some((name.to_string(), file.to_string()));
        self
    }

    pub fn with_stat(mut self, stat: impl Into<String>) -> Self {
        self.stats.push(stat.into());
        self
    }

    pub fn build(self) -> Result<Step> {
        require_some("exactextract", "raster", &self.rasters)?;
        require_some("exactextract", "statistic", &self.stats)?;

        let mut cmd = vec![
            "exactextract".to_string(),
            "-p".to_string(),
            self.polygons.clone(),
            "-f".to_string(),
            self.id_field.clone(),
        ];
        let mut deps = vec![self.polygons.clone()];

        for (name, file, var) in &self.rasters {
            let source = match var {
                Some(v) => format!("{}:NETCDF:{}:{}", name, file, v),
                None => format!("{}:{}", name, file),
            };
            cmd.extend(["-r".to_string(), source]);
            deps.push(file.clone());
        }
        if let Some((name, file)) = &self.weights {
            cmd.extend(["-w".to_string(), format!("{}:{}", name, file)]);
            deps.push(file.clone());
        }
        push_each(&mut cmd, "-s", &self.stats);
        cmd.extend(["-o".to_string(), self.output.clone()]);

        Step::builder()
            .with_target(self.output)
            .with_dependencies(deps)
            .with_command(cmd)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn statics() -> LsmStatics {
        LsmStatics {
            wc: "/src/wc.nc::Wc".to_string(),
            flowdir: "/src/flowdir.nc::flowdir".to_string(),
            elevation: "/src/elev.nc::elevation".to_string(),
        }
    }

    #[test]
    fn test_wsim_anom_strips_qualifiers_in_dependencies() {
        let step = wsim_anom(
            &["/fits/Ws_month_01.nc", "/fits/T_month_01.nc"],
            &["/results/results_201701.nc::Ws", "/forcing/forcing_201701.nc::T"],
            Some("/rp/rp_201701.nc"),
            Some("/anom/anom_201701.nc"),
        )
        .unwrap();

        assert!(step.dependencies().contains("/results/results_201701.nc"));
        assert!(step.commands()[0].contains(&"/results/results_201701.nc::Ws".to_string()));
        assert_eq!(step.targets().len(), 2);
        assert_eq!(step.commands()[0][0], "{BINDIR}/wsim_anom.R");
    }

    #[test]
    fn test_wsim_anom_requires_output() {
        assert!(wsim_anom(&["f"], &["o"], None, None).is_err());
        assert!(wsim_anom::<&str>(&[], &["o"], Some("rp"), None).is_err());
    }

    #[test]
    fn test_wsim_fit_command() {
        let step = wsim_fit(
            "gev",
            &["/r/results_[195001:200901:12].nc::Ws"],
            "/fits/Ws_month_01.nc",
            1,
            &[],
        )
        .unwrap();
        assert_eq!(step.dependencies().len(), 60);
        assert_eq!(
            step.commands()[0],
            vec![
                "{BINDIR}/wsim_fit.R",
                "--distribution",
                "gev",
                "--input",
                "/r/results_[195001:200901:12].nc::Ws",
                "--output",
                "/fits/Ws_month_01.nc",
                "--attr",
                "integration_window_months=1",
            ]
        );
    }

    #[test]
    fn test_wsim_lsm_loop() {
        let step = wsim_lsm(
            &statics(),
            "/spinup/initial_state.nc",
            &["/f/m01.nc", "/f/m02.nc"],
            None,
            Some("/spinup/final_state_norms.nc"),
            Some(100),
        )
        .unwrap();
        assert!(step.dependencies().contains("/src/wc.nc"));
        assert!(step.dependencies().contains("/f/m02.nc"));
        assert_eq!(step.targets().len(), 1);
        let cmd = &step.commands()[0];
        assert_eq!(&cmd[cmd.len() - 2..], ["--loop", "100"]);
    }

    #[test]
    fn test_wsim_lsm_requires_output() {
        assert!(wsim_lsm(&statics(), "s", &["f"], None, None, None).is_err());
    }

    #[test]
    fn test_wsim_merge_validates_attributes() {
        assert!(wsim_merge(&["a.nc::T"], "out.nc", &["yearmon=201701"]).is_ok());
        let err = wsim_merge(&["a.nc::T"], "out.nc", &["year mon"]).unwrap_err();
        assert!(matches!(err, Error::InvalidAttribute(_)));
    }

    #[test]
    fn test_wsim_correct_append_merges_into_one_step() {
        let t = wsim_correct("/h/retro_T.nc", "/h/obs_T.nc", "/raw/f.nc::tmp2m->T", "/c/out.nc", false)
            .unwrap();
        let pr = wsim_correct("/h/retro_Pr.nc", "/h/obs_Pr.nc", "/raw/f.nc::prate->Pr", "/c/out.nc", true)
            .unwrap();
        let merged = t.merge(&[pr]).unwrap();

        assert_eq!(merged.commands().len(), 2);
        assert_eq!(merged.commands()[1].last().unwrap(), "--append");
        assert_eq!(merged.targets().len(), 1);
        assert_eq!(merged.dependencies().len(), 5);
    }

    #[test]
    fn test_integrate_weights() {
        let step = Integrate::new("/s/summary.nc")
            .with_inputs(["/m/a.nc", "/m/b.nc"])
            .with_stats(["q25", "q50", "q75"])
            .with_weights(vec![0.5, 0.25])
            .build()
            .unwrap();
        let cmd = &step.commands()[0];
        assert_eq!(cmd.iter().filter(|t| *t == "--weight").count(), 2);
        assert!(cmd.contains(&"0.25".to_string()));

        assert!(Integrate::new("/s/x.nc")
            .with_inputs(["a"])
            .with_stats(["ave"])
            .with_weights(vec![0.5, 0.5])
            .build()
            .is_err());
        assert!(Integrate::new("/s/x.nc").with_inputs(["a"]).build().is_err());
    }

    #[test]
    fn test_integrate_window_ranges() {
        let step = Integrate::new("/r/results_3mo_[200003:200012:1].nc")
            .with_inputs(["/r/results_[200001:200012:1].nc::Ws"])
            .with_stats(["ave::Ws"])
            .with_window(3)
            .build()
            .unwrap();
        assert_eq!(step.targets().len(), 10);
        assert_eq!(step.dependencies().len(), 12);
    }

    #[test]
    fn test_wsim_composite_mask() {
        let step = wsim_composite(
            &["/rp/rp_201701.nc::Bt_RO_rp"],
            &["/rp/rp_201701.nc::PETmE_rp@negate->Neg_PETmE_rp"],
            3.0,
            Some("/src/wc.nc::Wc"),
            "/c/composite_201701.nc",
        )
        .unwrap();
        assert!(step.dependencies().contains("/src/wc.nc"));
        assert!(step.commands()[0].contains(&"3".to_string()));
    }

    #[test]
    fn test_zonal_stats() {
        let step = ZonalStats::new("/src/countries.shp", "GID_0", "/o/country_composite.csv")
            .with_raster("deficit", "/o/composite.nc", Some("deficit"))
            .with_weights("pop", "/src/pop.tif")
            .with_stat("weighted_mean(deficit)")
            .build()
            .unwrap();
        assert_eq!(step.dependencies().len(), 3);
        assert!(step.commands()[0].contains(&"deficit:NETCDF:/o/composite.nc:deficit".to_string()));
    }
}
