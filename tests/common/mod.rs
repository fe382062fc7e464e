#![allow(dead_code)]

use chrono::NaiveDate;
use portopt::domain::error::PortoptError;
pub use portopt::domain::price_history::PricePoint;
use portopt::domain::request::OptimizationRequest;
use portopt::domain::universe::parse_assets;
use portopt::ports::market_data_port::MarketDataPort;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::HashMap;

pub struct MockMarketDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
    pub calls: RefCell<Vec<String>>,
}

impl MockMarketDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn with_series(mut self, asset: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(asset.to_string(), points);
        self
    }

    pub fn with_error(mut self, asset: &str, reason: &str) -> Self {
        self.errors.insert(asset.to_string(), reason.to_string());
        self
    }
}

impl MarketDataPort for MockMarketDataPort {
    fn fetch_series(
        &self,
        asset: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, PortoptError> {
        self.calls.borrow_mut().push(asset.to_string());
        if let Some(reason) = self.errors.get(asset) {
            return Err(PortoptError::DataUnavailable {
                asset: asset.to_string(),
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(asset)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.date >= start_date && p.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Consecutive daily points starting at `start`.
pub fn make_series(start: NaiveDate, closes: &[f64]) -> Vec<PricePoint> {
    closes
        .iter()
        .enumerate()
        .map(|(i, c)| PricePoint::new(start + chrono::Duration::days(i as i64), *c))
        .collect()
}

/// Seeded random walk: each step multiplies by `1 + drift + vol * u`,
/// `u` uniform in [-1, 1).
pub fn generate_prices(
    start: NaiveDate,
    count: usize,
    start_price: f64,
    drift: f64,
    vol: f64,
    seed: u64,
) -> Vec<PricePoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut price = start_price;
    (0..count)
        .map(|i| {
            if i > 0 {
                price *= 1.0 + drift + vol * rng.gen_range(-1.0..1.0);
            }
            PricePoint::new(start + chrono::Duration::days(i as i64), price)
        })
        .collect()
}

/// Three assets over 250 days; drift and volatility both rise from LOW to HIGH.
pub fn three_asset_port() -> MockMarketDataPort {
    let start = date(2024, 1, 1);
    MockMarketDataPort::new()
        .with_series("LOW", generate_prices(start, 250, 100.0, 0.0002, 0.005, 1))
        .with_series("MID", generate_prices(start, 250, 50.0, 0.0015, 0.012, 2))
        .with_series("HIGH", generate_prices(start, 250, 20.0, 0.004, 0.025, 3))
}

pub fn sample_request(assets: &str, risk_max: f64) -> OptimizationRequest {
    let mut request = OptimizationRequest::new(
        parse_assets(assets).unwrap(),
        date(2024, 1, 1),
        date(2024, 12, 31),
        risk_max,
    );
    request.frontier.samples = 500;
    request.frontier.seed = Some(42);
    request
}
