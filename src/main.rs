//! wsim-planner CLI Entry Point
//!
//! Plans a monthly WSIM run and writes its build graph.
//!
//! # Usage
//!
//! ```bash
//! # Makefile for January 2017, spinup included
//! wsim-planner --config configs/cfs.yaml --source /mnt/source --workspace /mnt/fcst --start 201701
//!
//! # Several months, Snakemake syntax, no spinup
//! wsim-planner --config configs/cfs.yaml --start 201701 --stop 201703 \
//!     --emitter snakemake --output Snakefile --no-spinup
//!
//! # Override configuration options
//! wsim-planner --config configs/cfs.yaml --start 201701 --set distribution=pe3
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use log::{debug, error, info};

use wsim_planner::emit::{render, EmitterKind, Substitutions};
use wsim_planner::workflow::PlanOptions;
use wsim_planner::{load_config, WorkflowPlanner, APP_NAME, VERSION};

/// Default output file.
const DEFAULT_OUTPUT: &str = "Makefile";

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "wsim-planner", version, about = "Generate the build graph of a WSIM run")]
struct Cli {
    /// Configuration file (YAML)
    #[arg(long)]
    config: PathBuf,

    /// Directory holding downloaded and prepared inputs
    #[arg(long, default_value = "/mnt/fig/WSIM/source")]
    source: String,

    /// Directory receiving derived outputs
    #[arg(long, default_value = "/mnt/fig/WSIM/derived")]
    workspace: String,

    /// First timestep (YYYYMM)
    #[arg(long)]
    start: String,

    /// Last timestep (YYYYMM); defaults to --start
    #[arg(long)]
    stop: Option<String>,

    /// Output file, or '-' for standard output
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    output: String,

    /// Build graph syntax
    #[arg(long, value_enum, default_value_t = EmitterKind::Make)]
    emitter: EmitterKind,

    /// Installation directory of the WSIM tools ({BINDIR})
    #[arg(long, default_value = "/wsim")]
    bindir: String,

    /// Omit spinup and distribution fitting
    #[arg(long)]
    no_spinup: bool,

    /// Ignore forecast members issued within this many hours
    #[arg(long)]
    forecast_lag_hours: Option<u32>,

    /// Override a configuration option (KEY=VALUE, repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Files that exist before the build starts: anything under the source
/// directory or already on disk.
fn is_external(source: &str, path: &str) -> bool {
    Path::new(path).starts_with(source) || Path::new(path).exists()
}

/// Main application entry point.
fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    info!("{} v{}", APP_NAME, VERSION);

    let config = load_config(&cli.config, &cli.source, &cli.workspace, &cli.overrides)
        .map_err(|e| {
            error!("Failed to load configuration: {}", e);
            format!("Could not load configuration from '{}': {}", cli.config.display(), e)
        })?;

    let stop = cli.stop.clone().unwrap_or_else(|| cli.start.clone());
    let options = PlanOptions::new(&cli.start, stop)
        .with_spinup(!cli.no_spinup)
        .with_forecast_lag_hours(cli.forecast_lag_hours);
    let planner = WorkflowPlanner::new(config.as_ref(), options);

    let steps = planner.plan()?;

    if let Err(errors) = planner.validate(&steps, |p| is_external(&cli.source, p)) {
        for e in &errors {
            eprintln!("{} {}", "error:".red().bold(), e);
        }
        return Err(format!("build graph has {} problems", errors.len()).into());
    }

    let substitutions = Substitutions::from([("BINDIR".to_string(), cli.bindir.clone())]);
    let mut emitter = cli.emitter.create();
    let text = render(&steps, emitter.as_mut(), &substitutions)?;

    if cli.output == "-" {
        print!("{}", text);
    } else {
        fs::write(&cli.output, &text)?;
        info!("Wrote {} steps to {} ({})", steps.len(), cli.output, cli.emitter);
    }
    debug!("Done");

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["wsim-planner", "--config", "c.yaml", "--start", "201701"]);
        assert_eq!(cli.output, DEFAULT_OUTPUT);
        assert_eq!(cli.emitter, EmitterKind::Make);
        assert!(cli.stop.is_none());
        assert!(!cli.no_spinup);
    }

    #[test]
    fn test_cli_repeated_overrides() {
        let cli = Cli::parse_from([
            "wsim-planner",
            "--config",
            "c.yaml",
            "--start",
            "201701",
            "--set",
            "distribution=pe3",
            "--set",
            "forecast_lag_hours=12",
            "--emitter",
            "snakemake",
        ]);
        assert_eq!(cli.overrides, vec!["distribution=pe3", "forecast_lag_hours=12"]);
        assert_eq!(cli.emitter, EmitterKind::Snakemake);
    }

    #[test]
    fn test_source_files_are_external() {
        assert!(is_external("/mnt/source", "/mnt/source/cpc/raw.nc"));
        assert!(!is_external("/mnt/source", "/mnt/derived/never/there.nc"));
    }

    #[test]
    fn test_run_writes_graph() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("fldas.yaml");
        fs::write(&config, "config: fldas\n").unwrap();
        let output = dir.path().join("Makefile");

        let cli = Cli::parse_from([
            "wsim-planner",
            "--config",
            config.to_str().unwrap(),
            "--source",
            "/src",
            "--workspace",
            "/out",
            "--start",
            "201701",
            "--no-spinup",
            "--output",
            output.to_str().unwrap(),
        ]);
        // Without spinup the fits are missing, so validation must fail.
        assert!(run(cli).is_err());
        assert!(!output.exists());
    }
}
