//! Monte Carlo sampling of the risk/return surface.
//!
//! Each sample draws one uniform value per asset and normalizes by the sum.
//! This covers the simplex but is not uniform over it; it is a cheap,
//! reproducible picture of what allocations can achieve. Samples ignore the
//! risk cap.

use crate::domain::error::PortoptError;
use crate::domain::metrics::PortfolioMetrics;
use crate::domain::return_model::{CovarianceMatrix, ReturnModel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_SAMPLES: usize = 10_000;
pub const MAX_SAMPLES: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct FrontierConfig {
    pub samples: usize,
    /// Fixed seed for reproducible datasets; drawn from entropy when absent.
    pub seed: Option<u64>,
}

impl Default for FrontierConfig {
    fn default() -> Self {
        Self {
            samples: DEFAULT_SAMPLES,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrontierSample {
    pub weights: Vec<f64>,
    pub risk: f64,
    pub expected_return: f64,
    pub sharpe: f64,
}

/// Unordered sample cloud plus the seed that reproduces it.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierDataset {
    pub samples: Vec<FrontierSample>,
    pub seed: u64,
}

impl FrontierDataset {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Highest finite Sharpe ratio.
    pub fn best_sharpe(&self) -> Option<&FrontierSample> {
        self.samples
            .iter()
            .filter(|s| s.sharpe.is_finite())
            .max_by(|a, b| a.sharpe.total_cmp(&b.sharpe))
    }

    pub fn min_risk(&self) -> Option<&FrontierSample> {
        self.samples.iter().min_by(|a, b| a.risk.total_cmp(&b.risk))
    }

    /// Best return among samples whose risk stays within `risk_max`.
    pub fn best_within(&self, risk_max: f64) -> Option<&FrontierSample> {
        self.samples
            .iter()
            .filter(|s| s.risk <= risk_max)
            .max_by(|a, b| a.expected_return.total_cmp(&b.expected_return))
    }
}

/// Draw `samples` random allocations from `rng` and evaluate each.
pub fn sample_frontier<R: Rng + ?Sized>(
    returns: &[f64],
    covariance: &CovarianceMatrix,
    samples: usize,
    rng: &mut R,
) -> Result<Vec<FrontierSample>, PortoptError> {
    let n = returns.len();
    if n < 2 {
        return Err(PortoptError::InvalidInput {
            reason: format!("frontier sampling needs at least 2 assets, got {}", n),
        });
    }
    if covariance.dim() != n {
        return Err(PortoptError::InvalidInput {
            reason: format!("{} returns for a {}x{} covariance", n, covariance.dim(), covariance.dim()),
        });
    }
    if samples == 0 || samples > MAX_SAMPLES {
        return Err(PortoptError::InvalidInput {
            reason: format!("sample count must be in 1..={}, got {}", MAX_SAMPLES, samples),
        });
    }

    let mut out = Vec::with_capacity(samples);
    for _ in 0..samples {
        let weights = random_weights(n, rng);
        let m = PortfolioMetrics::compute(&weights, returns, covariance);
        out.push(FrontierSample {
            weights,
            risk: m.risk,
            expected_return: m.expected_return,
            sharpe: m.sharpe,
        });
    }
    Ok(out)
}

/// Seeded sampling over a return model.
pub fn sample(model: &ReturnModel, config: &FrontierConfig) -> Result<FrontierDataset, PortoptError> {
    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let samples = sample_frontier(
        model.expected_returns(),
        model.covariance(),
        config.samples,
        &mut rng,
    )?;
    tracing::info!(samples = samples.len(), seed, "sampled frontier");
    Ok(FrontierDataset { samples, seed })
}

/// Uniform draws normalized to sum to one. An all-zero draw is redrawn.
pub fn random_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<f64> {
    loop {
        let raw: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..1.0)).collect();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            return raw.into_iter().map(|w| w / total).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{is_valid_weight_vector, WEIGHT_TOLERANCE};
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn three_asset() -> ReturnModel {
        let cov = CovarianceMatrix::new(vec![
            vec![0.04, 0.006, 0.0],
            vec![0.006, 0.09, 0.01],
            vec![0.0, 0.01, 0.16],
        ])
        .unwrap();
        ReturnModel::from_parts(
            vec!["A".into(), "B".into(), "C".into()],
            vec![0.05, 0.10, 0.15],
            cov,
        )
        .unwrap()
    }

    #[test]
    fn produces_exactly_k_valid_samples() {
        let config = FrontierConfig {
            samples: 1000,
            seed: Some(7),
        };
        let dataset = sample(&three_asset(), &config).unwrap();

        assert_eq!(dataset.len(), 1000);
        for s in &dataset.samples {
            assert_eq!(s.weights.len(), 3);
            assert_abs_diff_eq!(s.weights.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
            assert!(is_valid_weight_vector(&s.weights, WEIGHT_TOLERANCE));
            assert!(s.risk >= 0.0);
        }
    }

    #[test]
    fn same_seed_reproduces_dataset() {
        let config = FrontierConfig {
            samples: 50,
            seed: Some(42),
        };
        let a = sample(&three_asset(), &config).unwrap();
        let b = sample(&three_asset(), &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_differ() {
        let a = sample(&three_asset(), &FrontierConfig { samples: 5, seed: Some(1) }).unwrap();
        let b = sample(&three_asset(), &FrontierConfig { samples: 5, seed: Some(2) }).unwrap();
        assert_ne!(a.samples, b.samples);
    }

    #[test]
    fn unseeded_run_records_its_seed() {
        let a = sample(&three_asset(), &FrontierConfig { samples: 10, seed: None }).unwrap();
        let b = sample(
            &three_asset(),
            &FrontierConfig {
                samples: 10,
                seed: Some(a.seed),
            },
        )
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sample_metrics_match_portfolio_metrics() {
        let model = three_asset();
        let dataset = sample(&model, &FrontierConfig { samples: 20, seed: Some(3) }).unwrap();
        for s in &dataset.samples {
            let m = PortfolioMetrics::compute(&s.weights, model.expected_returns(), model.covariance());
            assert_eq!(m.risk, s.risk);
            assert_eq!(m.expected_return, s.expected_return);
        }
    }

    #[test]
    fn rejects_zero_samples() {
        let err = sample(&three_asset(), &FrontierConfig { samples: 0, seed: Some(1) }).unwrap_err();
        assert!(matches!(err, PortoptError::InvalidInput { .. }));
    }

    #[test]
    fn rejects_sample_count_above_cap() {
        let config = FrontierConfig {
            samples: MAX_SAMPLES + 1,
            seed: Some(1),
        };
        assert!(sample(&three_asset(), &config).is_err());
    }

    #[test]
    fn rejects_single_asset() {
        let cov = CovarianceMatrix::new(vec![vec![0.04]]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let err = sample_frontier(&[0.1], &cov, 10, &mut rng).unwrap_err();
        assert!(matches!(err, PortoptError::InvalidInput { .. }));
    }

    #[test]
    fn dataset_queries() {
        let dataset = sample(&three_asset(), &FrontierConfig { samples: 500, seed: Some(9) }).unwrap();
        let best = dataset.best_sharpe().unwrap();
        assert!(dataset.samples.iter().all(|s| s.sharpe <= best.sharpe));
        let low = dataset.min_risk().unwrap();
        assert!(dataset.samples.iter().all(|s| s.risk >= low.risk));
        let capped = dataset.best_within(0.25).unwrap();
        assert!(capped.risk <= 0.25);
    }

    proptest! {
        #[test]
        fn random_weights_lie_on_the_simplex(n in 2usize..12, seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let w = random_weights(n, &mut rng);
            prop_assert_eq!(w.len(), n);
            prop_assert!(w.iter().all(|x| (0.0..=1.0).contains(x)));
            prop_assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }
}
