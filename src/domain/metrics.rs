//! Portfolio metrics: expected return, risk and Sharpe ratio.
//!
//! All three are pure functions of a weight vector and the annualized
//! estimates. The Sharpe ratio carries no risk-free offset.

use crate::domain::return_model::CovarianceMatrix;

/// Tolerance used when checking weight-vector invariants.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioMetrics {
    pub expected_return: f64,
    pub risk: f64,
    pub sharpe: f64,
}

impl PortfolioMetrics {
    pub fn compute(weights: &[f64], returns: &[f64], covariance: &CovarianceMatrix) -> Self {
        let expected_return = expected_return(weights, returns);
        let risk = risk(weights, covariance);
        Self {
            expected_return,
            risk,
            sharpe: sharpe_ratio(expected_return, risk),
        }
    }
}

/// w · r
pub fn expected_return(weights: &[f64], returns: &[f64]) -> f64 {
    weights.iter().zip(returns).map(|(w, r)| w * r).sum()
}

/// sqrt(wᵀΣw). A slightly negative quadratic form from rounding is clamped
/// to zero.
pub fn risk(weights: &[f64], covariance: &CovarianceMatrix) -> f64 {
    covariance.quadratic_form(weights).max(0.0).sqrt()
}

pub fn sharpe(weights: &[f64], returns: &[f64], covariance: &CovarianceMatrix) -> f64 {
    sharpe_ratio(expected_return(weights, returns), risk(weights, covariance))
}

/// Return per unit of risk.
///
/// Zero risk never errors: the result is `+inf` for a positive return,
/// `-inf` for a negative one and `NaN` when the return is zero too.
pub fn sharpe_ratio(expected_return: f64, risk: f64) -> f64 {
    if risk > 0.0 {
        expected_return / risk
    } else if expected_return > 0.0 {
        f64::INFINITY
    } else if expected_return < 0.0 {
        f64::NEG_INFINITY
    } else {
        f64::NAN
    }
}

/// Every component in [0, 1] and the sum within `tolerance` of one.
pub fn is_valid_weight_vector(weights: &[f64], tolerance: f64) -> bool {
    !weights.is_empty()
        && weights
            .iter()
            .all(|w| w.is_finite() && (0.0..=1.0).contains(w))
        && (weights.iter().sum::<f64>() - 1.0).abs() <= tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn diag_cov() -> CovarianceMatrix {
        CovarianceMatrix::new(vec![vec![0.04, 0.0], vec![0.0, 0.09]]).unwrap()
    }

    #[test]
    fn expected_return_is_dot_product() {
        assert_abs_diff_eq!(
            expected_return(&[0.25, 0.75], &[0.10, 0.20]),
            0.175,
            epsilon = 1e-12
        );
    }

    #[test]
    fn risk_of_single_asset_is_its_volatility() {
        assert_abs_diff_eq!(risk(&[0.0, 1.0], &diag_cov()), 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(risk(&[1.0, 0.0], &diag_cov()), 0.2, epsilon = 1e-12);
    }

    #[test]
    fn risk_clamps_negative_quadratic_form() {
        // Symmetric but indefinite: wᵀΣw < 0 for w = [0.5, 0.5].
        let cov = CovarianceMatrix::new(vec![vec![0.0, -0.01], vec![-0.01, 0.0]]).unwrap();
        assert_eq!(risk(&[0.5, 0.5], &cov), 0.0);
    }

    #[test]
    fn zero_risk_only_for_zero_variance_allocation() {
        let cov = CovarianceMatrix::new(vec![vec![0.0, 0.0], vec![0.0, 0.09]]).unwrap();
        assert_eq!(risk(&[1.0, 0.0], &cov), 0.0);
        assert!(risk(&[0.9, 0.1], &cov) > 0.0);
    }

    #[test]
    fn sharpe_divides_return_by_risk() {
        let s = sharpe(&[0.0, 1.0], &[0.10, 0.20], &diag_cov());
        assert_abs_diff_eq!(s, 0.20 / 0.3, epsilon = 1e-12);
    }

    #[test]
    fn sharpe_sentinels_at_zero_risk() {
        assert_eq!(sharpe_ratio(0.1, 0.0), f64::INFINITY);
        assert_eq!(sharpe_ratio(-0.1, 0.0), f64::NEG_INFINITY);
        assert!(sharpe_ratio(0.0, 0.0).is_nan());
    }

    #[test]
    fn metrics_bundle_matches_functions() {
        let m = PortfolioMetrics::compute(&[0.5, 0.5], &[0.10, 0.20], &diag_cov());
        assert_abs_diff_eq!(m.expected_return, 0.15, epsilon = 1e-12);
        assert_abs_diff_eq!(m.risk, (0.25 * 0.04 + 0.25 * 0.09_f64).sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(m.sharpe, m.expected_return / m.risk, epsilon = 1e-12);
    }

    #[test]
    fn weight_vector_validation() {
        assert!(is_valid_weight_vector(&[0.3, 0.7], WEIGHT_TOLERANCE));
        assert!(!is_valid_weight_vector(&[0.3, 0.6], WEIGHT_TOLERANCE));
        assert!(!is_valid_weight_vector(&[-0.1, 1.1], WEIGHT_TOLERANCE));
        assert!(!is_valid_weight_vector(&[], WEIGHT_TOLERANCE));
    }

    proptest! {
        #[test]
        fn expected_return_is_linear(
            a in 0.0f64..=1.0,
            w1 in prop::collection::vec(0.0f64..1.0, 3),
            w2 in prop::collection::vec(0.0f64..1.0, 3),
            r in prop::collection::vec(-1.0f64..1.0, 3),
        ) {
            let mixed: Vec<f64> = w1.iter().zip(&w2).map(|(x, y)| a * x + (1.0 - a) * y).collect();
            let lhs = expected_return(&mixed, &r);
            let rhs = a * expected_return(&w1, &r) + (1.0 - a) * expected_return(&w2, &r);
            prop_assert!((lhs - rhs).abs() < 1e-12);
        }

        #[test]
        fn risk_is_non_negative(w in prop::collection::vec(0.0f64..1.0, 2)) {
            let cov = CovarianceMatrix::new(vec![vec![0.04, 0.018], vec![0.018, 0.09]]).unwrap();
            prop_assert!(risk(&w, &cov) >= 0.0);
        }
    }
}
