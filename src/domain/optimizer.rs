//! Risk-capped return maximization.
//!
//! Solves
//!
//! ```text
//! maximize    r·w
//! subject to  sum(w) = 1,  0 <= w_i <= 1,  sqrt(wᵀΣw) <= risk_max
//! ```
//!
//! by a parametric Lagrangian method. For a trade-off `θ >= 0` the
//! subproblem `minimize wᵀΣw - θ·r·w` over the simplex is solved with
//! accelerated projected gradient steps. The risk of the subproblem solution
//! grows with `θ`, so `θ` is bracketed and bisected until the risk cap binds,
//! then the answer is polished along the segment between the feasible and the
//! infeasible bracket solutions.

use crate::domain::error::PortoptError;
use crate::domain::metrics::{self, PortfolioMetrics, WEIGHT_TOLERANCE};
use crate::domain::return_model::{CovarianceMatrix, ReturnModel};
use std::fmt;

pub const DEFAULT_MAX_ITERATIONS: usize = 200;
pub const DEFAULT_MAX_INNER_ITERATIONS: usize = 10_000;
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

const INNER_STEP_TOLERANCE: f64 = 1e-13;
const TIE_TOLERANCE: f64 = 1e-12;
const POLISH_STEPS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// Bound on bracketing plus bisection steps.
    pub max_iterations: usize,
    /// Bound on gradient steps per subproblem.
    pub max_inner_iterations: usize,
    /// Feasibility tolerance for the sum, bound and risk constraints.
    pub tolerance: f64,
    /// Starting allocation; uniform `1/N` when absent.
    pub initial_guess: Option<Vec<f64>>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_inner_iterations: DEFAULT_MAX_INNER_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            initial_guess: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The risk cap lies below the minimum-variance portfolio's risk.
    Infeasible,
    MaxIterationsExceeded,
    /// Non-finite iterates or a covariance matrix that is not PSD.
    NumericalFailure,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::Infeasible => "infeasible",
            FailureReason::MaxIterationsExceeded => "max iterations exceeded",
            FailureReason::NumericalFailure => "numerical failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolverDiagnostic {
    pub reason: FailureReason,
    /// Largest of |sum(w) - 1| and the risk excess over the cap.
    pub constraint_violation: f64,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    /// Solution when converged, best iterate otherwise. Always within [0, 1].
    pub weights: Vec<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub gradient_steps: usize,
    pub metrics: PortfolioMetrics,
    pub diagnostic: Option<SolverDiagnostic>,
}

impl OptimizationResult {
    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.diagnostic.as_ref().map(|d| d.reason)
    }
}

/// Maximize expected return under a volatility cap.
///
/// Malformed input (fewer than 2 assets, a non-positive cap) is an error; every
/// solver outcome, including non-convergence, is an `Ok` result.
pub fn maximize_return(
    model: &ReturnModel,
    risk_max: f64,
    config: &OptimizerConfig,
) -> Result<OptimizationResult, PortoptError> {
    if !risk_max.is_finite() || risk_max <= 0.0 {
        return Err(PortoptError::InvalidInput {
            reason: format!("risk_max must be positive, got {}", risk_max),
        });
    }
    if config.tolerance.is_nan() || config.tolerance <= 0.0 {
        return Err(PortoptError::InvalidInput {
            reason: format!("tolerance must be positive, got {}", config.tolerance),
        });
    }
    if config.max_iterations == 0 || config.max_inner_iterations == 0 {
        return Err(PortoptError::InvalidInput {
            reason: "iteration limits must be at least 1".into(),
        });
    }

    let n = model.asset_count();
    if n < 2 {
        return Err(PortoptError::InvalidInput {
            reason: format!("optimization needs at least 2 assets, got {}", n),
        });
    }
    let start = match &config.initial_guess {
        Some(guess) => {
            if guess.len() != n {
                return Err(PortoptError::InvalidInput {
                    reason: format!("initial guess has {} weights for {} assets", guess.len(), n),
                });
            }
            if guess.iter().any(|w| !w.is_finite()) {
                return Err(PortoptError::InvalidInput {
                    reason: "initial guess contains non-finite weights".into(),
                });
            }
            project_onto_simplex(guess)
        }
        None => vec![1.0 / n as f64; n],
    };

    let solver = Solver {
        returns: model.expected_returns(),
        covariance: model.covariance(),
        risk_max,
        config,
        lipschitz: (2.0 * model.covariance().spectral_bound()).max(f64::EPSILON),
        gradient_steps: 0,
    };
    Ok(solver.run(start))
}

struct Solver<'a> {
    returns: &'a [f64],
    covariance: &'a CovarianceMatrix,
    risk_max: f64,
    config: &'a OptimizerConfig,
    lipschitz: f64,
    gradient_steps: usize,
}

impl Solver<'_> {
    fn run(mut self, start: Vec<f64>) -> OptimizationResult {
        let tol = self.config.tolerance;

        let corner = max_return_allocation(self.returns);
        let max_return = metrics::expected_return(&corner, self.returns);
        if metrics::risk(&corner, self.covariance) <= self.risk_max {
            tracing::debug!("maximum-return allocation is within the risk cap");
            return self.finish(corner, 0, None);
        }

        let mut iterations = 1;
        let min_var = self.solve_subproblem(0.0, &start);
        if let Some(diag) = self.numerical_check(&min_var) {
            return self.finish(start, iterations, Some(diag));
        }
        let min_risk = metrics::risk(&min_var, self.covariance);
        if min_risk > self.risk_max + tol {
            let detail = format!(
                "minimum achievable risk {:.6} exceeds cap {:.6}",
                min_risk, self.risk_max
            );
            return self.fail(min_var, iterations, FailureReason::Infeasible, detail);
        }

        // Bracket: `lo` side feasible, `hi` side over the cap.
        let (mut lo, mut w_lo) = (0.0_f64, min_var);
        let mut hi = 1.0_f64;
        let mut w_hi = None;
        while iterations < self.config.max_iterations {
            iterations += 1;
            let w = self.solve_subproblem(hi, &w_lo);
            if let Some(diag) = self.numerical_check(&w) {
                return self.finish(w_lo, iterations, Some(diag));
            }
            if metrics::risk(&w, self.covariance) > self.risk_max {
                w_hi = Some(w);
                break;
            }
            lo = hi;
            w_lo = w;
            if metrics::expected_return(&w_lo, self.returns) >= max_return - tol {
                tracing::debug!(theta = lo, "reached maximum return inside the cap");
                return self.finish(w_lo, iterations, None);
            }
            hi *= 2.0;
        }

        let Some(mut w_hi) = w_hi else {
            let detail = format!("risk cap not bracketed after {} iterations", iterations);
            return self.fail(w_lo, iterations, FailureReason::MaxIterationsExceeded, detail);
        };

        let mut settled = false;
        while iterations < self.config.max_iterations {
            if self.risk_max - metrics::risk(&w_lo, self.covariance) <= tol
                || hi - lo <= f64::EPSILON * hi
            {
                settled = true;
                break;
            }
            iterations += 1;
            let mid = 0.5 * (lo + hi);
            let w = self.solve_subproblem(mid, &w_lo);
            if let Some(diag) = self.numerical_check(&w) {
                return self.finish(w_lo, iterations, Some(diag));
            }
            let r = metrics::risk(&w, self.covariance);
            tracing::debug!(iteration = iterations, theta = mid, risk = r, "bisection step");
            if r > self.risk_max {
                hi = mid;
                w_hi = w;
            } else {
                lo = mid;
                w_lo = w;
            }
        }

        let polished = self.polish(&w_lo, &w_hi);
        if !settled {
            let detail = format!(
                "risk gap {:.3e} after {} iterations",
                self.risk_max - metrics::risk(&polished, self.covariance),
                iterations
            );
            return self.fail(polished, iterations, FailureReason::MaxIterationsExceeded, detail);
        }
        self.finish(polished, iterations, None)
    }

    /// Minimize wᵀΣw - θ·r·w over the simplex (FISTA with adaptive restart).
    fn solve_subproblem(&mut self, theta: f64, start: &[f64]) -> Vec<f64> {
        let step = 1.0 / self.lipschitz;
        let mut x = start.to_vec();
        let mut y = x.clone();
        let mut t = 1.0_f64;

        for _ in 0..self.config.max_inner_iterations {
            self.gradient_steps += 1;
            let sigma_y = self.covariance.mul_vec(&y);
            let trial: Vec<f64> = y
                .iter()
                .zip(&sigma_y)
                .zip(self.returns)
                .map(|((yi, sy), ri)| yi - step * (2.0 * sy - theta * ri))
                .collect();
            let x_next = project_onto_simplex(&trial);

            let delta = x_next
                .iter()
                .zip(&x)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            if !delta.is_finite() {
                return x_next;
            }

            let restart = y
                .iter()
                .zip(&x_next)
                .zip(&x)
                .map(|((yi, xn), xo)| (yi - xn) * (xn - xo))
                .sum::<f64>()
                > 0.0;

            if restart {
                t = 1.0;
                y = x_next.clone();
            } else {
                let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
                let momentum = (t - 1.0) / t_next;
                y = x_next
                    .iter()
                    .zip(&x)
                    .map(|(xn, xo)| xn + momentum * (xn - xo))
                    .collect();
                t = t_next;
            }
            x = x_next;

            if delta <= INNER_STEP_TOLERANCE {
                return x;
            }
        }

        tracing::debug!(theta, "subproblem hit the inner iteration limit");
        x
    }

    /// Largest feasible step from `feasible` towards `infeasible`.
    fn polish(&self, feasible: &[f64], infeasible: &[f64]) -> Vec<f64> {
        let gain = metrics::expected_return(infeasible, self.returns)
            - metrics::expected_return(feasible, self.returns);
        if gain <= 0.0 {
            return feasible.to_vec();
        }

        let mix = |alpha: f64| -> Vec<f64> {
            feasible
                .iter()
                .zip(infeasible)
                .map(|(a, b)| (1.0 - alpha) * a + alpha * b)
                .collect()
        };

        let (mut lo, mut hi) = (0.0_f64, 1.0_f64);
        for _ in 0..POLISH_STEPS {
            let mid = 0.5 * (lo + hi);
            if metrics::risk(&mix(mid), self.covariance) <= self.risk_max {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        mix(lo)
    }

    fn numerical_check(&self, w: &[f64]) -> Option<SolverDiagnostic> {
        if w.iter().any(|v| !v.is_finite()) {
            return Some(SolverDiagnostic {
                reason: FailureReason::NumericalFailure,
                constraint_violation: f64::NAN,
                detail: "solver produced non-finite weights".into(),
            });
        }
        let q = self.covariance.quadratic_form(w);
        if q < -self.config.tolerance {
            return Some(SolverDiagnostic {
                reason: FailureReason::NumericalFailure,
                constraint_violation: self.constraint_violation(w),
                detail: format!("covariance is not positive semidefinite (wᵀΣw = {:.3e})", q),
            });
        }
        None
    }

    fn constraint_violation(&self, w: &[f64]) -> f64 {
        let sum_gap = (w.iter().sum::<f64>() - 1.0).abs();
        let risk_gap = (metrics::risk(w, self.covariance) - self.risk_max).max(0.0);
        sum_gap.max(risk_gap)
    }

    fn fail(
        &self,
        weights: Vec<f64>,
        iterations: usize,
        reason: FailureReason,
        detail: String,
    ) -> OptimizationResult {
        let diagnostic = SolverDiagnostic {
            reason,
            constraint_violation: self.constraint_violation(&weights),
            detail,
        };
        self.finish(weights, iterations, Some(diagnostic))
    }

    fn finish(
        &self,
        weights: Vec<f64>,
        iterations: usize,
        diagnostic: Option<SolverDiagnostic>,
    ) -> OptimizationResult {
        let weights: Vec<f64> = weights
            .into_iter()
            .map(|w| if w.is_finite() { w.clamp(0.0, 1.0) } else { 0.0 })
            .collect();

        // A clean exit still has to pass the feasibility check.
        let diagnostic = diagnostic.or_else(|| {
            let violation = self.constraint_violation(&weights);
            if metrics::is_valid_weight_vector(&weights, WEIGHT_TOLERANCE.max(self.config.tolerance))
                && violation <= self.config.tolerance
            {
                None
            } else {
                Some(SolverDiagnostic {
                    reason: FailureReason::NumericalFailure,
                    constraint_violation: violation,
                    detail: "solution violates constraints beyond tolerance".into(),
                })
            }
        });

        let summary = PortfolioMetrics::compute(&weights, self.returns, self.covariance);
        match &diagnostic {
            None => tracing::info!(
                iterations,
                gradient_steps = self.gradient_steps,
                expected_return = summary.expected_return,
                risk = summary.risk,
                "optimizer converged"
            ),
            Some(d) => tracing::warn!(
                iterations,
                reason = %d.reason,
                violation = d.constraint_violation,
                "optimizer did not converge: {}",
                d.detail
            ),
        }

        OptimizationResult {
            converged: diagnostic.is_none(),
            weights,
            iterations,
            gradient_steps: self.gradient_steps,
            metrics: summary,
            diagnostic,
        }
    }
}

/// All weight on the highest-return asset, split evenly across exact ties.
fn max_return_allocation(returns: &[f64]) -> Vec<f64> {
    let best = returns.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let ties = returns.iter().filter(|r| best - **r <= TIE_TOLERANCE).count();
    returns
        .iter()
        .map(|r| {
            if best - *r <= TIE_TOLERANCE {
                1.0 / ties as f64
            } else {
                0.0
            }
        })
        .collect()
}

/// Euclidean projection onto the probability simplex.
pub fn project_onto_simplex(v: &[f64]) -> Vec<f64> {
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumulative = 0.0;
    let mut threshold = 0.0;
    for (i, u) in sorted.iter().enumerate() {
        cumulative += u;
        let candidate = (cumulative - 1.0) / (i + 1) as f64;
        if u - candidate > 0.0 {
            threshold = candidate;
        }
    }

    v.iter().map(|x| (x - threshold).max(0.0)).collect()
}
