//! End-to-end analysis: fetch, clean, estimate, optimize, sample, replay.

use crate::domain::error::PortoptError;
use crate::domain::evolution::{portfolio_evolution, EvolutionPoint};
use crate::domain::frontier::{self, FrontierDataset};
use crate::domain::optimizer::{maximize_return, OptimizationResult};
use crate::domain::price_history::GapReport;
use crate::domain::request::OptimizationRequest;
use crate::domain::return_model::ReturnModel;
use crate::domain::universe::AssetUniverse;
use crate::ports::market_data_port::MarketDataPort;

/// Everything a run produces. Reports are rendered from this alone.
#[derive(Debug, Clone)]
pub struct PortfolioAnalysis {
    pub universe: AssetUniverse,
    pub risk_max: f64,
    pub model: ReturnModel,
    pub optimization: OptimizationResult,
    pub frontier: FrontierDataset,
    pub evolution: Vec<EvolutionPoint>,
    pub gaps: GapReport,
}

impl PortfolioAnalysis {
    /// Optimal weights keyed by asset, in universe order.
    pub fn allocation(&self) -> Vec<(&str, f64)> {
        self.universe
            .iter()
            .zip(&self.optimization.weights)
            .map(|(a, w)| (a, *w))
            .collect()
    }
}

/// Estimate the return model for a request. Market data is fetched once and
/// the request's gap policy applied before estimation.
pub fn build_model(
    port: &dyn MarketDataPort,
    request: &OptimizationRequest,
) -> Result<(ReturnModel, GapReport), PortoptError> {
    request.validate()?;

    let history = port.fetch(&request.universe, request.start_date, request.end_date)?;
    tracing::info!(
        assets = history.asset_count(),
        dates = history.len(),
        "loaded price history"
    );

    let (history, gaps) = history.apply_gap_policy(request.gap_policy)?;
    let model = ReturnModel::estimate(&history)?;
    Ok((model, gaps))
}

/// Run the whole analysis. Never writes files; non-convergence is carried in
/// the result, not returned as an error.
pub fn run_analysis(
    port: &dyn MarketDataPort,
    request: &OptimizationRequest,
) -> Result<PortfolioAnalysis, PortoptError> {
    let (model, gaps) = build_model(port, request)?;

    let optimization = maximize_return(&model, request.risk_max, &request.optimizer)?;
    let frontier = frontier::sample(&model, &request.frontier)?;
    let evolution = portfolio_evolution(&model, &optimization.weights, request.rolling_window)?;

    tracing::info!(
        converged = optimization.converged,
        expected_return = optimization.metrics.expected_return,
        risk = optimization.metrics.risk,
        samples = frontier.len(),
        "analysis complete"
    );

    Ok(PortfolioAnalysis {
        universe: request.universe.clone(),
        risk_max: request.risk_max,
        model,
        optimization,
        frontier,
        evolution,
        gaps,
    })
}
