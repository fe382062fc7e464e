//! CSV report adapter.
//!
//! Writes one file per dataset into the output directory:
//! `allocation.csv`, `frontier.csv`, `evolution.csv`, `summary.csv`, plus
//! `gaps.csv` when any price gap was resolved.

use crate::domain::error::PortoptError;
use crate::domain::frontier::FrontierDataset;
use crate::domain::pipeline::PortfolioAnalysis;
use crate::domain::price_history::GapResolution;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::Path;

pub const ALLOCATION_FILE: &str = "allocation.csv";
pub const FRONTIER_FILE: &str = "frontier.csv";
pub const EVOLUTION_FILE: &str = "evolution.csv";
pub const SUMMARY_FILE: &str = "summary.csv";
pub const GAPS_FILE: &str = "gaps.csv";

#[derive(Debug, Clone, Default)]
pub struct CsvReportAdapter {
    /// Append one weight column per asset to `frontier.csv`.
    pub include_weights: bool,
}

#[derive(Serialize)]
struct AllocationRow<'a> {
    asset: &'a str,
    weight: f64,
}

#[derive(Serialize)]
struct EvolutionRow {
    date: NaiveDate,
    portfolio_return: f64,
    cumulative_growth: f64,
    rolling_volatility: Option<f64>,
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    metric: &'a str,
    value: String,
}

#[derive(Serialize)]
struct GapRow<'a> {
    asset: &'a str,
    date: NaiveDate,
    resolution: &'a str,
}

fn csv_error(err: csv::Error) -> PortoptError {
    PortoptError::Io(err.into())
}

impl CsvReportAdapter {
    pub fn new(include_weights: bool) -> Self {
        Self { include_weights }
    }

    fn write_allocation(&self, analysis: &PortfolioAnalysis, dir: &Path) -> Result<(), PortoptError> {
        let mut wtr = csv::Writer::from_path(dir.join(ALLOCATION_FILE)).map_err(csv_error)?;
        for (asset, weight) in analysis.allocation() {
            wtr.serialize(AllocationRow { asset, weight }).map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write only `frontier.csv`, creating `dir` if needed.
    pub fn write_frontier(
        &self,
        assets: &[String],
        dataset: &FrontierDataset,
        dir: &Path,
    ) -> Result<(), PortoptError> {
        fs::create_dir_all(dir)?;
        let mut wtr = csv::Writer::from_path(dir.join(FRONTIER_FILE)).map_err(csv_error)?;

        let mut header = vec!["risk".to_string(), "return".to_string(), "sharpe".to_string()];
        if self.include_weights {
            header.extend(assets.iter().map(|a| format!("w_{}", a)));
        }
        wtr.write_record(&header).map_err(csv_error)?;

        for sample in &dataset.samples {
            let mut record = vec![
                sample.risk.to_string(),
                sample.expected_return.to_string(),
                sample.sharpe.to_string(),
            ];
            if self.include_weights {
                record.extend(sample.weights.iter().map(f64::to_string));
            }
            wtr.write_record(&record).map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_evolution(&self, analysis: &PortfolioAnalysis, dir: &Path) -> Result<(), PortoptError> {
        let mut wtr = csv::Writer::from_path(dir.join(EVOLUTION_FILE)).map_err(csv_error)?;
        for point in &analysis.evolution {
            wtr.serialize(EvolutionRow {
                date: point.date,
                portfolio_return: point.portfolio_return,
                cumulative_growth: point.cumulative_growth,
                rolling_volatility: point.rolling_volatility,
            })
            .map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_summary(&self, analysis: &PortfolioAnalysis, dir: &Path) -> Result<(), PortoptError> {
        let opt = &analysis.optimization;
        let status = match opt.failure_reason() {
            None => "converged".to_string(),
            Some(reason) => format!("not converged: {}", reason),
        };
        let violation = opt
            .diagnostic
            .as_ref()
            .map(|d| d.constraint_violation)
            .unwrap_or(0.0);

        let rows = [
            ("status", status),
            ("expected_return", opt.metrics.expected_return.to_string()),
            ("risk", opt.metrics.risk.to_string()),
            ("sharpe", opt.metrics.sharpe.to_string()),
            ("risk_max", analysis.risk_max.to_string()),
            ("iterations", opt.iterations.to_string()),
            ("constraint_violation", violation.to_string()),
            ("frontier_samples", analysis.frontier.len().to_string()),
            ("frontier_seed", analysis.frontier.seed.to_string()),
            ("gaps_filled", analysis.gaps.filled_count().to_string()),
            ("dates_dropped", analysis.gaps.dropped_dates.len().to_string()),
        ];

        let mut wtr = csv::Writer::from_path(dir.join(SUMMARY_FILE)).map_err(csv_error)?;
        for (metric, value) in rows {
            wtr.serialize(SummaryRow { metric, value }).map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_gaps(&self, analysis: &PortfolioAnalysis, dir: &Path) -> Result<(), PortoptError> {
        let mut wtr = csv::Writer::from_path(dir.join(GAPS_FILE)).map_err(csv_error)?;
        for record in &analysis.gaps.records {
            let resolution = match record.resolution {
                GapResolution::ForwardFilled => "forward_filled",
                GapResolution::Dropped => "dropped",
            };
            wtr.serialize(GapRow {
                asset: &record.asset,
                date: record.date,
                resolution,
            })
            .map_err(csv_error)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, analysis: &PortfolioAnalysis, output_dir: &Path) -> Result<(), PortoptError> {
        fs::create_dir_all(output_dir)?;
        self.write_allocation(analysis, output_dir)?;
        self.write_frontier(analysis.universe.assets(), &analysis.frontier, output_dir)?;
        self.write_evolution(analysis, output_dir)?;
        self.write_summary(analysis, output_dir)?;
        if !analysis.gaps.is_empty() {
            self.write_gaps(analysis, output_dir)?;
        }
        tracing::info!(dir = %output_dir.display(), "wrote CSV report");
        Ok(())
    }
}
