//! Annualized return and covariance estimation.
//!
//! Period returns are simple fractional changes `p[t] / p[t-1] - 1`.
//! Expected return is their arithmetic mean, covariance their sample
//! covariance (denominator `T - 1`), both scaled by 252 trading days.

use crate::domain::error::PortoptError;
use crate::domain::price_history::PriceHistory;
use chrono::NaiveDate;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Sample covariance needs at least two return periods.
pub const MIN_RETURN_PERIODS: usize = 2;

/// Label used when a shortfall belongs to the aligned grid rather than one asset.
pub const ALIGNED_HISTORY: &str = "aligned history";

const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Annualized N×N covariance matrix, symmetric with a non-negative diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    values: Vec<Vec<f64>>,
}

impl CovarianceMatrix {
    pub fn new(values: Vec<Vec<f64>>) -> Result<Self, PortoptError> {
        let n = values.len();
        if n == 0 {
            return Err(PortoptError::InvalidInput {
                reason: "covariance matrix is empty".into(),
            });
        }
        for (i, row) in values.iter().enumerate() {
            if row.len() != n {
                return Err(PortoptError::InvalidInput {
                    reason: format!("covariance row {} has {} columns, expected {}", i, row.len(), n),
                });
            }
            if let Some(v) = row.iter().find(|v| !v.is_finite()) {
                return Err(PortoptError::InvalidInput {
                    reason: format!("covariance row {} contains non-finite value {}", i, v),
                });
            }
            if row[i] < 0.0 {
                return Err(PortoptError::InvalidInput {
                    reason: format!("negative variance {} on diagonal {}", row[i], i),
                });
            }
        }
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (values[i][j], values[j][i]);
                let scale = 1.0_f64.max(a.abs()).max(b.abs());
                if (a - b).abs() > SYMMETRY_TOLERANCE * scale {
                    return Err(PortoptError::InvalidInput {
                        reason: format!("covariance not symmetric at ({}, {}): {} vs {}", i, j, a, b),
                    });
                }
            }
        }
        Ok(Self { values })
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i][j]
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.values
    }

    pub fn variance(&self, i: usize) -> f64 {
        self.values[i][i]
    }

    /// Σ·w
    pub fn mul_vec(&self, w: &[f64]) -> Vec<f64> {
        self.values
            .iter()
            .map(|row| row.iter().zip(w).map(|(a, b)| a * b).sum())
            .collect()
    }

    /// wᵀ·Σ·w, unclamped.
    pub fn quadratic_form(&self, w: &[f64]) -> f64 {
        self.mul_vec(w).iter().zip(w).map(|(a, b)| a * b).sum()
    }

    /// Gershgorin bound on the largest eigenvalue.
    pub fn spectral_bound(&self) -> f64 {
        self.values
            .iter()
            .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }
}

/// Annualized estimates for one run, shared read-only by the optimizer and
/// the frontier sampler.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnModel {
    assets: Vec<String>,
    expected_returns: Vec<f64>,
    covariance: CovarianceMatrix,
    return_dates: Vec<NaiveDate>,
    period_returns: Vec<Vec<f64>>,
}

impl ReturnModel {
    /// Estimate from a gap-free history. Apply a gap policy first.
    pub fn estimate(history: &PriceHistory) -> Result<Self, PortoptError> {
        let prices = match history.complete_rows() {
            Some(rows) => rows,
            None => {
                let (asset, date) = history
                    .gaps()
                    .into_iter()
                    .next()
                    .ok_or_else(|| PortoptError::InvalidInput {
                        reason: "price history reported gaps but none were found".into(),
                    })?;
                return Err(PortoptError::DataGap { asset, date });
            }
        };

        if prices.len() < MIN_RETURN_PERIODS + 1 {
            return Err(PortoptError::InsufficientHistory {
                asset: ALIGNED_HISTORY.to_string(),
                observations: prices.len(),
                minimum: MIN_RETURN_PERIODS + 1,
            });
        }

        let returns = period_returns(&prices);
        let n = history.asset_count();
        let periods = returns.len() as f64;

        let means: Vec<f64> = (0..n)
            .map(|i| returns.iter().map(|r| r[i]).sum::<f64>() / periods)
            .collect();

        let mut cov = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in i..n {
                let sum: f64 = returns
                    .iter()
                    .map(|r| (r[i] - means[i]) * (r[j] - means[j]))
                    .sum();
                let value = sum / (periods - 1.0) * TRADING_DAYS_PER_YEAR;
                cov[i][j] = value;
                cov[j][i] = value;
            }
        }

        let expected_returns = means.iter().map(|m| m * TRADING_DAYS_PER_YEAR).collect();

        tracing::debug!(
            assets = n,
            periods = returns.len(),
            "estimated annualized return model"
        );

        Ok(Self {
            assets: history.assets().to_vec(),
            expected_returns,
            covariance: CovarianceMatrix::new(cov)?,
            return_dates: history.dates()[1..].to_vec(),
            period_returns: returns,
        })
    }

    /// Build a model from known annualized estimates, without a return series.
    pub fn from_parts(
        assets: Vec<String>,
        expected_returns: Vec<f64>,
        covariance: CovarianceMatrix,
    ) -> Result<Self, PortoptError> {
        if expected_returns.len() != assets.len() || covariance.dim() != assets.len() {
            return Err(PortoptError::InvalidInput {
                reason: format!(
                    "{} assets, {} expected returns, {}x{} covariance",
                    assets.len(),
                    expected_returns.len(),
                    covariance.dim(),
                    covariance.dim()
                ),
            });
        }
        if let Some(r) = expected_returns.iter().find(|r| !r.is_finite()) {
            return Err(PortoptError::InvalidInput {
                reason: format!("non-finite expected return {}", r),
            });
        }
        Ok(Self {
            assets,
            expected_returns,
            covariance,
            return_dates: Vec::new(),
            period_returns: Vec::new(),
        })
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn expected_returns(&self) -> &[f64] {
        &self.expected_returns
    }

    pub fn covariance(&self) -> &CovarianceMatrix {
        &self.covariance
    }

    /// Date of each period return (the later of the two prices).
    pub fn return_dates(&self) -> &[NaiveDate] {
        &self.return_dates
    }

    /// Un-annualized period returns, one row per date.
    pub fn period_returns(&self) -> &[Vec<f64>] {
        &self.period_returns
    }
}

/// Fractional period-over-period changes of a gap-free price matrix.
pub fn period_returns(prices: &[Vec<f64>]) -> Vec<Vec<f64>> {
    prices
        .windows(2)
        .map(|w| {
            w[0].iter()
                .zip(&w[1])
                .map(|(prev, curr)| curr / prev - 1.0)
                .collect()
        })
        .collect()
}
