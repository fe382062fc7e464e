//! Explicit description of one optimization run.

use crate::domain::error::PortoptError;
use crate::domain::evolution::DEFAULT_ROLLING_WINDOW;
use crate::domain::frontier::FrontierConfig;
use crate::domain::optimizer::OptimizerConfig;
use crate::domain::price_history::GapPolicy;
use crate::domain::universe::AssetUniverse;
use chrono::NaiveDate;

/// Accepted date forms: `dd/mm/yyyy` and ISO `yyyy-mm-dd`.
const DATE_FORMATS: [&str; 2] = ["%d/%m/%Y", "%Y-%m-%d"];

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationRequest {
    pub universe: AssetUniverse,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Annualized volatility cap.
    pub risk_max: f64,
    pub gap_policy: GapPolicy,
    pub optimizer: OptimizerConfig,
    pub frontier: FrontierConfig,
    pub rolling_window: usize,
}

impl OptimizationRequest {
    /// Request with default solver, sampler and gap settings.
    pub fn new(
        universe: AssetUniverse,
        start_date: NaiveDate,
        end_date: NaiveDate,
        risk_max: f64,
    ) -> Self {
        Self {
            universe,
            start_date,
            end_date,
            risk_max,
            gap_policy: GapPolicy::ForwardFill,
            optimizer: OptimizerConfig::default(),
            frontier: FrontierConfig::default(),
            rolling_window: DEFAULT_ROLLING_WINDOW,
        }
    }

    pub fn validate(&self) -> Result<(), PortoptError> {
        if self.start_date >= self.end_date {
            return Err(PortoptError::InvalidInput {
                reason: format!(
                    "start date {} must be before end date {}",
                    self.start_date, self.end_date
                ),
            });
        }
        if !self.risk_max.is_finite() || self.risk_max <= 0.0 {
            return Err(PortoptError::InvalidInput {
                reason: format!("risk_max must be positive and finite, got {}", self.risk_max),
            });
        }
        if self.rolling_window < 2 {
            return Err(PortoptError::InvalidInput {
                reason: format!("rolling window must be at least 2, got {}", self.rolling_window),
            });
        }
        Ok(())
    }
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}
