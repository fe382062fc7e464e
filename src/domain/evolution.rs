//! Historical evolution of a fixed allocation.

use crate::domain::error::PortoptError;
use crate::domain::return_model::{ReturnModel, TRADING_DAYS_PER_YEAR};
use chrono::NaiveDate;

pub const DEFAULT_ROLLING_WINDOW: usize = 21;

#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionPoint {
    pub date: NaiveDate,
    pub portfolio_return: f64,
    /// Value of one unit invested before the first period.
    pub cumulative_growth: f64,
    /// Annualized sample volatility over the trailing window; absent until
    /// the window fills.
    pub rolling_volatility: Option<f64>,
}

/// Replay `weights` over the model's period returns.
pub fn portfolio_evolution(
    model: &ReturnModel,
    weights: &[f64],
    window: usize,
) -> Result<Vec<EvolutionPoint>, PortoptError> {
    if weights.len() != model.asset_count() {
        return Err(PortoptError::InvalidInput {
            reason: format!(
                "{} weights for {} assets",
                weights.len(),
                model.asset_count()
            ),
        });
    }
    if window < 2 {
        return Err(PortoptError::InvalidInput {
            reason: format!("rolling window must be at least 2, got {}", window),
        });
    }

    let returns: Vec<f64> = model
        .period_returns()
        .iter()
        .map(|row| row.iter().zip(weights).map(|(r, w)| r * w).sum())
        .collect();

    let mut growth = 1.0;
    let mut points = Vec::with_capacity(returns.len());
    for (i, (date, r)) in model.return_dates().iter().zip(&returns).enumerate() {
        growth *= 1.0 + r;
        let rolling_volatility = if i + 1 >= window {
            Some(sample_std(&returns[i + 1 - window..=i]) * TRADING_DAYS_PER_YEAR.sqrt())
        } else {
            None
        };
        points.push(EvolutionPoint {
            date: *date,
            portfolio_return: *r,
            cumulative_growth: growth,
            rolling_volatility,
        });
    }
    Ok(points)
}

fn sample_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (n - 1.0)).sqrt()
}
