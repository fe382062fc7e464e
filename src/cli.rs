//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{gap_policy, optional, required_date, validate_config};
use crate::domain::error::PortoptError;
use crate::domain::evolution::DEFAULT_ROLLING_WINDOW;
use crate::domain::frontier::{self, FrontierConfig, FrontierSample, DEFAULT_SAMPLES};
use crate::domain::optimizer::{
    OptimizerConfig, DEFAULT_MAX_INNER_ITERATIONS, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE,
};
use crate::domain::pipeline::{build_model, run_analysis, PortfolioAnalysis};
use crate::domain::request::OptimizationRequest;
use crate::domain::universe::parse_assets;
use crate::ports::config_port::{parse_bool, ConfigPort};
use crate::ports::report_port::ReportPort;

/// Exit code when the optimizer stops without a converged allocation.
pub const EXIT_NOT_CONVERGED: u8 = 7;

const DEFAULT_OUTPUT_DIR: &str = "report";

#[derive(Parser, Debug)]
#[command(name = "portopt", about = "Mean-variance portfolio optimizer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find the highest-return allocation within the risk cap
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Comma-separated asset list, replaces [portfolio] assets
        #[arg(long)]
        assets: Option<String>,
        #[arg(long)]
        risk_max: Option<f64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        samples: Option<usize>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Sample random allocations and write the risk/return cloud
    Frontier {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        samples: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file and check price files exist
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Optimize {
            config,
            assets,
            risk_max,
            output,
            seed,
            samples,
            dry_run,
        } => {
            let overrides = Overrides {
                assets,
                risk_max,
                seed,
                samples,
            };
            if dry_run {
                run_dry_run(&config, &overrides)
            } else {
                run_optimize(&config, &overrides, output.as_deref())
            }
        }
        Command::Frontier {
            config,
            samples,
            seed,
            output,
        } => {
            let overrides = Overrides {
                samples,
                seed,
                ..Overrides::default()
            };
            run_frontier(&config, &overrides, output.as_deref())
        }
        Command::Validate { config } => run_validate(&config),
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub assets: Option<String>,
    pub risk_max: Option<f64>,
    pub seed: Option<u64>,
    pub samples: Option<usize>,
}

/// A [`ConfigPort`] view with command-line overrides layered on top.
pub struct LayeredConfig<'a> {
    base: &'a dyn ConfigPort,
    values: Vec<(&'static str, &'static str, String)>,
}

impl<'a> LayeredConfig<'a> {
    pub fn new(base: &'a dyn ConfigPort, overrides: &Overrides) -> Self {
        let mut values = Vec::new();
        if let Some(assets) = &overrides.assets {
            values.push(("portfolio", "assets", assets.clone()));
        }
        if let Some(risk_max) = overrides.risk_max {
            values.push(("portfolio", "risk_max", risk_max.to_string()));
        }
        if let Some(seed) = overrides.seed {
            values.push(("frontier", "seed", seed.to_string()));
        }
        if let Some(samples) = overrides.samples {
            values.push(("frontier", "samples", samples.to_string()));
        }
        Self { base, values }
    }

    fn overridden(&self, section: &str, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(s, k, _)| *s == section && *k == key)
            .map(|(_, _, v)| v.as_str())
    }
}

impl ConfigPort for LayeredConfig<'_> {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        match self.overridden(section, key) {
            Some(v) => Some(v.to_string()),
            None => self.base.get_string(section, key),
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.overridden(section, key) {
            Some(v) => parse_bool(v).unwrap_or(default),
            None => self.base.get_bool(section, key, default),
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PortoptError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Build a run description from a validated configuration.
pub fn build_request(config: &dyn ConfigPort) -> Result<OptimizationRequest, PortoptError> {
    let assets = config
        .get_non_empty("portfolio", "assets")
        .ok_or_else(|| PortoptError::ConfigMissing {
            section: "portfolio".into(),
            key: "assets".into(),
        })?;
    let universe = parse_assets(&assets)?;

    let start_date = required_date(config, "start_date")?;
    let end_date = required_date(config, "end_date")?;
    let risk_max = optional::<f64>(config, "portfolio", "risk_max")?.ok_or_else(|| {
        PortoptError::ConfigMissing {
            section: "portfolio".into(),
            key: "risk_max".into(),
        }
    })?;

    let mut request = OptimizationRequest::new(universe, start_date, end_date, risk_max);
    request.gap_policy = gap_policy(config)?;
    request.optimizer = OptimizerConfig {
        max_iterations: optional(config, "optimizer", "max_iterations")?
            .unwrap_or(DEFAULT_MAX_ITERATIONS),
        max_inner_iterations: optional(config, "optimizer", "max_inner_iterations")?
            .unwrap_or(DEFAULT_MAX_INNER_ITERATIONS),
        tolerance: optional(config, "optimizer", "tolerance")?.unwrap_or(DEFAULT_TOLERANCE),
        initial_guess: None,
    };
    request.frontier = FrontierConfig {
        samples: optional(config, "frontier", "samples")?.unwrap_or(DEFAULT_SAMPLES),
        seed: optional(config, "frontier", "seed")?,
    };
    request.rolling_window =
        optional(config, "report", "rolling_window")?.unwrap_or(DEFAULT_ROLLING_WINDOW);
    Ok(request)
}

/// Load, layer and validate a config, then build the request and price adapter.
fn prepare(
    config_path: &Path,
    overrides: &Overrides,
) -> Result<(FileConfigAdapter, OptimizationRequest, CsvPriceAdapter), ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;
    let layered = LayeredConfig::new(&adapter, overrides);

    let built = validate_config(&layered).and_then(|()| build_request(&layered));
    let request = built.map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })?;

    let data_path = layered
        .get_non_empty("data", "path")
        .map(PathBuf::from)
        .unwrap_or_default();
    Ok((adapter, request, CsvPriceAdapter::new(data_path)))
}

fn output_dir(config: &dyn ConfigPort, output: Option<&Path>) -> PathBuf {
    match output {
        Some(p) => p.to_path_buf(),
        None => config
            .get_non_empty("report", "output_dir")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
    }
}

fn run_optimize(config_path: &Path, overrides: &Overrides, output: Option<&Path>) -> ExitCode {
    let (adapter, request, data_port) = match prepare(config_path, overrides) {
        Ok(p) => p,
        Err(code) => return code,
    };

    eprintln!(
        "Optimizing {} assets, {} to {}, risk cap {:.4}",
        request.universe.len(),
        request.start_date,
        request.end_date,
        request.risk_max,
    );

    let analysis = match run_analysis(&data_port, &request) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    print_summary(&analysis);

    let dir = output_dir(&adapter, output);
    let reporter = CsvReportAdapter::new(adapter.get_bool("report", "include_weights", false));
    if let Err(e) = reporter.write(&analysis, &dir) {
        eprintln!("error: failed to write report: {e}");
        return (&e).into();
    }
    eprintln!("\nReport written to: {}", dir.display());

    match analysis.optimization.failure_reason() {
        None => ExitCode::SUCCESS,
        Some(reason) => {
            eprintln!("warning: optimizer did not converge ({reason}); report holds the best iterate");
            ExitCode::from(EXIT_NOT_CONVERGED)
        }
    }
}

fn print_summary(analysis: &PortfolioAnalysis) {
    let opt = &analysis.optimization;

    if !analysis.gaps.is_empty() {
        eprintln!(
            "\nPrice gaps: {} filled, {} leading dates dropped",
            analysis.gaps.filled_count(),
            analysis.gaps.dropped_dates.len()
        );
    }

    eprintln!("\n=== Optimal Allocation ===");
    for (asset, weight) in analysis.allocation() {
        eprintln!("  {:<10} {:>7.2}%", asset, weight * 100.0);
    }
    eprintln!("\nExpected Return:  {:.2}%", opt.metrics.expected_return * 100.0);
    eprintln!("Risk:             {:.2}%", opt.metrics.risk * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", opt.metrics.sharpe);
    eprintln!("Iterations:       {}", opt.iterations);
    if let Some(diag) = &opt.diagnostic {
        eprintln!("Status:           {} ({})", diag.reason, diag.detail);
    } else {
        eprintln!("Status:           converged");
    }

    eprintln!("\n=== Frontier ({} samples, seed {}) ===", analysis.frontier.len(), analysis.frontier.seed);
    if let Some(s) = analysis.frontier.best_sharpe() {
        print_sample("Best Sharpe", s);
    }
    if let Some(s) = analysis.frontier.min_risk() {
        print_sample("Min Risk", s);
    }
}

fn print_sample(label: &str, sample: &FrontierSample) {
    eprintln!(
        "  {:<12} return {:.2}%, risk {:.2}%, sharpe {:.2}",
        label,
        sample.expected_return * 100.0,
        sample.risk * 100.0,
        sample.sharpe
    );
}

pub fn run_dry_run(config_path: &Path, overrides: &Overrides) -> ExitCode {
    let (adapter, request, _) = match prepare(config_path, overrides) {
        Ok(p) => p,
        Err(code) => return code,
    };

    eprintln!("Config validated successfully");
    eprintln!("\nUniverse:");
    eprintln!("  assets: {}", request.universe.assets().join(", "));
    eprintln!("  window: {} to {}", request.start_date, request.end_date);
    eprintln!("\nOptimizer:");
    eprintln!("  risk_max:             {}", request.risk_max);
    eprintln!("  gap_policy:           {:?}", request.gap_policy);
    eprintln!("  max_iterations:       {}", request.optimizer.max_iterations);
    eprintln!("  max_inner_iterations: {}", request.optimizer.max_inner_iterations);
    eprintln!("  tolerance:            {:e}", request.optimizer.tolerance);
    eprintln!("\nFrontier:");
    eprintln!("  samples: {}", request.frontier.samples);
    match request.frontier.seed {
        Some(seed) => eprintln!("  seed:    {}", seed),
        None => eprintln!("  seed:    random"),
    }
    eprintln!("\nReport: {}", output_dir(&adapter, None).display());

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_frontier(config_path: &Path, overrides: &Overrides, output: Option<&Path>) -> ExitCode {
    let (adapter, request, data_port) = match prepare(config_path, overrides) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let dataset = match build_model(&data_port, &request)
        .and_then(|(model, _)| frontier::sample(&model, &request.frontier))
    {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\n=== Frontier ({} samples, seed {}) ===", dataset.len(), dataset.seed);
    if let Some(s) = dataset.best_sharpe() {
        print_sample("Best Sharpe", s);
    }
    if let Some(s) = dataset.min_risk() {
        print_sample("Min Risk", s);
    }
    if let Some(s) = dataset.best_within(request.risk_max) {
        print_sample("Best <= cap", s);
    }

    let dir = output_dir(&adapter, output);
    let reporter = CsvReportAdapter::new(adapter.get_bool("report", "include_weights", false));
    match reporter.write_frontier(request.universe.assets(), &dataset, &dir) {
        Ok(()) => {
            eprintln!("\nFrontier written to: {}", dir.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: failed to write frontier: {e}");
            (&e).into()
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    let (_, request, data_port) = match prepare(config_path, &Overrides::default()) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let available = match data_port.list_assets() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("error: cannot list price files: {e}");
            return ExitCode::from(3);
        }
    };

    eprintln!("\nPrice files:");
    let mut missing = Vec::new();
    for asset in request.universe.iter() {
        if available.iter().any(|a| a == asset) {
            eprintln!("  {}: found", asset);
        } else {
            eprintln!("  {}: missing", asset);
            missing.push(asset);
        }
    }

    if let Some(first) = missing.first() {
        let err = PortoptError::DataUnavailable {
            asset: first.to_string(),
            reason: format!("{} of {} price files missing", missing.len(), request.universe.len()),
        };
        eprintln!("error: {err}");
        return (&err).into();
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
